//! Bare metal server network interfaces and the matching data source
//!
//! PCI interfaces can only be added to or removed from a stopped server.
//! With `hard_stop` set (the default) a running server is stopped, changed,
//! and started again while holding the server's lock, so two interfaces on
//! one server never race their stop/start cycles. Without it the API takes
//! the request and the interface stays `pci_pending` until the next restart.

use std::collections::HashMap;
use std::time::Duration;

use chrono::Utc;
use ibmvpc_core::provider::{ProviderError, ProviderResult};
use ibmvpc_core::resource::{CompoundId, Resource, ResourceId, State, Value, join_id};
use log::info;

use crate::convert::network_interface_to_map;
use crate::error::NotFoundExt;
use crate::models::{
    BareMetalServerNetworkInterface, Identity, InterfaceType, NetworkInterfacePatch,
    NetworkInterfacePrototype, NetworkInterfacePrototypeCommon, PrimaryIpPrototype,
};
use crate::provider::{
    IbmVpcProvider, carry_over, changed, int_list, optional_string, required_str, string_list,
};
use crate::waiters;

const ID_PARTS: [&str; 2] = ["bare_metal_server", "network_interface"];

fn interface_type(resource: &Resource) -> ProviderResult<InterfaceType> {
    let name = resource.get_str("interface_type").unwrap_or("pci");
    InterfaceType::parse(name)
        .ok_or_else(|| ProviderError::new(format!("Unknown interface type '{}'", name)))
}

/// Reject attributes that do not apply to the interface type
fn check_interface_fields(resource: &Resource, kind: InterfaceType) -> ProviderResult<()> {
    let has = |key: &str| resource.attributes.contains_key(key);
    let misplaced: &[&str] = match kind {
        InterfaceType::Pci => &["vlan", "allow_interface_to_float"],
        InterfaceType::Vlan => &["allowed_vlans"],
        InterfaceType::Hipersocket => &["allowed_vlans", "vlan", "allow_interface_to_float"],
    };
    if let Some(key) = misplaced.iter().find(|k| has(k)) {
        return Err(ProviderError::new(format!(
            "'{}' cannot be set on a {} interface",
            key,
            kind.as_str()
        )));
    }
    if kind == InterfaceType::Vlan && !has("vlan") {
        return Err(ProviderError::new("'vlan' is required for a vlan interface"));
    }
    Ok(())
}

fn network_interface_prototype(resource: &Resource) -> ProviderResult<NetworkInterfacePrototype> {
    let kind = interface_type(resource)?;
    check_interface_fields(resource, kind)?;

    let primary_ip = resource
        .attributes
        .get("primary_ip")
        .and_then(Value::as_map)
        .map(|ip| PrimaryIpPrototype {
            address: ip.get("address").and_then(Value::as_str).map(str::to_string),
            name: ip.get("name").and_then(Value::as_str).map(str::to_string),
            auto_delete: None,
        });
    let common = NetworkInterfacePrototypeCommon {
        subnet: Identity::new(required_str(resource, "subnet")?),
        name: optional_string(resource, "name"),
        allow_ip_spoofing: resource.get_bool("allow_ip_spoofing"),
        enable_infrastructure_nat: resource.get_bool("enable_infrastructure_nat"),
        security_groups: string_list(resource, "security_groups")
            .into_iter()
            .map(Identity::new)
            .collect(),
        primary_ip,
    };

    Ok(match kind {
        InterfaceType::Pci => NetworkInterfacePrototype::Pci {
            common,
            allowed_vlans: int_list(resource, "allowed_vlans"),
        },
        InterfaceType::Vlan => NetworkInterfacePrototype::Vlan {
            common,
            vlan: resource
                .get_int("vlan")
                .ok_or_else(|| ProviderError::new("'vlan' must be an integer"))?,
            allow_interface_to_float: resource.get_bool("allow_interface_to_float"),
        },
        InterfaceType::Hipersocket => NetworkInterfacePrototype::Hipersocket { common },
    })
}

fn network_interface_state(
    id: ResourceId,
    server_id: &str,
    nic: &BareMetalServerNetworkInterface,
    resource: Option<&Resource>,
) -> State {
    let mut attributes = network_interface_to_map(nic);
    attributes.insert(
        "bare_metal_server".to_string(),
        Value::String(server_id.to_string()),
    );
    if let Some(resource) = resource {
        carry_over(&mut attributes, resource, &["hard_stop"]);
    }
    State::existing(id, attributes).with_identifier(join_id(&[server_id, nic.id()]))
}

impl IbmVpcProvider {
    pub(crate) async fn read_network_interface(
        &self,
        id: &ResourceId,
        identifier: &str,
    ) -> ProviderResult<State> {
        let [server_id, nic_id] = CompoundId::split(identifier, ID_PARTS)?;
        let nic = self
            .client
            .get_bare_metal_server_network_interface(&server_id, &nic_id)
            .await
            .optional()
            .map_err(|e| {
                e.context(format!(
                    "Error getting bare metal server ({}) network interface ({})",
                    server_id, nic_id
                ))
            })?;

        Ok(match nic {
            Some(nic) => network_interface_state(id.clone(), &server_id, &nic, None),
            None => State::not_found(id.clone()),
        })
    }

    pub(crate) async fn create_network_interface(&self, resource: &Resource) -> ProviderResult<State> {
        let server_id = required_str(resource, "bare_metal_server")?;
        let prototype = network_interface_prototype(resource)?;
        let timeout = self.timeouts_for(resource).create;

        let nic = if prototype.interface_type() == InterfaceType::Pci {
            let _guard = self.locks.lock(server_id).await;
            let stopped = resource.get_bool("hard_stop").unwrap_or(true)
                && self
                    .stop_bare_metal_server_if_running(server_id, timeout)
                    .await?;

            let nic = self
                .create_network_interface_and_wait(server_id, &prototype, timeout)
                .await?;

            if stopped {
                self.start_bare_metal_server_and_wait(server_id, timeout)
                    .await?;
                // A restart moves pci_pending interfaces to available
                self.client
                    .get_bare_metal_server_network_interface(server_id, nic.id())
                    .await
                    .map_err(|e| {
                        e.context(format!(
                            "Error getting bare metal server ({}) network interface ({})",
                            server_id,
                            nic.id()
                        ))
                    })?
            } else {
                nic
            }
        } else {
            self.create_network_interface_and_wait(server_id, &prototype, timeout)
                .await?
        };

        Ok(network_interface_state(
            resource.id.clone(),
            server_id,
            &nic,
            Some(resource),
        ))
    }

    async fn create_network_interface_and_wait(
        &self,
        server_id: &str,
        prototype: &NetworkInterfacePrototype,
        timeout: Duration,
    ) -> ProviderResult<BareMetalServerNetworkInterface> {
        let created = self
            .client
            .create_bare_metal_server_network_interface(server_id, prototype)
            .await
            .map_err(|e| {
                e.context(format!(
                    "Error creating network interface on bare metal server ({})",
                    server_id
                ))
            })?;
        info!(
            "Created {} network interface ({}) on bare metal server ({})",
            prototype.interface_type().as_str(),
            created.id(),
            server_id
        );

        waiters::network_interface_available(
            &self.client,
            &self.poll,
            server_id,
            created.id(),
            timeout,
        )
        .await
    }

    pub(crate) async fn update_network_interface(
        &self,
        identifier: &str,
        from: &State,
        to: &Resource,
    ) -> ProviderResult<State> {
        let [server_id, nic_id] = CompoundId::split(identifier, ID_PARTS)?;
        check_interface_fields(to, interface_type(to)?)?;

        let mut patch = NetworkInterfacePatch::default();
        if changed(from, to, "name") {
            patch.name = optional_string(to, "name");
        }
        if changed(from, to, "allow_ip_spoofing") {
            patch.allow_ip_spoofing = to.get_bool("allow_ip_spoofing");
        }
        if changed(from, to, "enable_infrastructure_nat") {
            patch.enable_infrastructure_nat = to.get_bool("enable_infrastructure_nat");
        }
        if changed(from, to, "allowed_vlans") {
            patch.allowed_vlans = Some(int_list(to, "allowed_vlans"));
        }

        let nic = if patch.is_empty() {
            self.client
                .get_bare_metal_server_network_interface(&server_id, &nic_id)
                .await
                .map_err(|e| {
                    e.context(format!(
                        "Error getting bare metal server ({}) network interface ({})",
                        server_id, nic_id
                    ))
                })?
        } else {
            self.client
                .update_bare_metal_server_network_interface(&server_id, &nic_id, &patch)
                .await
                .map_err(|e| {
                    e.context(format!(
                        "Error updating bare metal server ({}) network interface ({})",
                        server_id, nic_id
                    ))
                })?;
            let timeout = self.timeouts_for(to).update;
            waiters::network_interface_available(
                &self.client,
                &self.poll,
                &server_id,
                &nic_id,
                timeout,
            )
            .await?
        };

        Ok(network_interface_state(
            to.id.clone(),
            &server_id,
            &nic,
            Some(to),
        ))
    }

    pub(crate) async fn delete_network_interface(
        &self,
        identifier: &str,
        resource: &Resource,
    ) -> ProviderResult<()> {
        let [server_id, nic_id] = CompoundId::split(identifier, ID_PARTS)?;
        let timeout = self.timeouts_for(resource).delete;

        let nic = self
            .client
            .get_bare_metal_server_network_interface(&server_id, &nic_id)
            .await
            .optional()
            .map_err(|e| {
                e.context(format!(
                    "Error getting bare metal server ({}) network interface ({})",
                    server_id, nic_id
                ))
            })?;
        let Some(nic) = nic else {
            info!(
                "Network interface ({}) on bare metal server ({}) is already gone",
                nic_id, server_id
            );
            return Ok(());
        };

        if nic.interface_type() != InterfaceType::Pci {
            return self
                .delete_network_interface_and_wait(&server_id, &nic_id, timeout)
                .await;
        }

        let _guard = self.locks.lock(&server_id).await;
        let stopped = resource.get_bool("hard_stop").unwrap_or(true)
            && self
                .stop_bare_metal_server_if_running(&server_id, timeout)
                .await?;
        self.delete_network_interface_and_wait(&server_id, &nic_id, timeout)
            .await?;
        if stopped {
            self.start_bare_metal_server_and_wait(&server_id, timeout)
                .await?;
        }
        Ok(())
    }

    async fn delete_network_interface_and_wait(
        &self,
        server_id: &str,
        nic_id: &str,
        timeout: Duration,
    ) -> ProviderResult<()> {
        self.client
            .delete_bare_metal_server_network_interface(server_id, nic_id)
            .await
            .optional()
            .map_err(|e| {
                e.context(format!(
                    "Error deleting bare metal server ({}) network interface ({})",
                    server_id, nic_id
                ))
            })?;
        waiters::network_interface_deleted(&self.client, &self.poll, server_id, nic_id, timeout)
            .await
    }

    // =========================================================================
    // Data source
    // =========================================================================

    pub(crate) async fn read_network_interfaces(&self, resource: &Resource) -> ProviderResult<State> {
        let server_id = required_str(resource, "bare_metal_server")?;
        let nics = self
            .client
            .list_bare_metal_server_network_interfaces(server_id)
            .await
            .map_err(|e| {
                e.context(format!(
                    "Error listing network interfaces of bare metal server ({})",
                    server_id
                ))
            })?;

        let mut attributes: HashMap<String, Value> = resource.attributes.clone();
        attributes.insert(
            "network_interfaces".to_string(),
            Value::List(
                nics.iter()
                    .map(|nic| Value::Map(network_interface_to_map(nic)))
                    .collect(),
            ),
        );
        Ok(State::existing(resource.id.clone(), attributes).with_identifier(Utc::now().to_rfc3339()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderConfig;
    use crate::resources::{BARE_METAL_SERVER_NETWORK_INTERFACE, BARE_METAL_SERVER_NETWORK_INTERFACES};
    use crate::testing::ScriptedTransport;
    use crate::transport::Method;
    use ibmvpc_core::provider::Provider;
    use serde_json::json;
    use std::sync::Arc;

    const SERVER: &str = "/bare_metal_servers/s1";
    const NICS: &str = "/bare_metal_servers/s1/network_interfaces";
    const NIC: &str = "/bare_metal_servers/s1/network_interfaces/n1";

    fn provider(transport: Arc<ScriptedTransport>) -> IbmVpcProvider {
        IbmVpcProvider::with_transport(transport, &ProviderConfig::default())
    }

    fn server(status: &str) -> serde_json::Value {
        json!({"id": "s1", "name": "bms-1", "status": status})
    }

    fn pci(status: &str) -> serde_json::Value {
        json!({
            "id": "n1",
            "name": "eth1",
            "status": status,
            "interface_type": "pci",
            "allowed_vlans": [100, 200],
            "primary_ip": {"address": "10.240.0.5", "id": "0717-ip"},
            "subnet": {"id": "0717-subnet"}
        })
    }

    fn vlan(status: &str) -> serde_json::Value {
        json!({
            "id": "n2",
            "name": "vlan100",
            "status": status,
            "interface_type": "vlan",
            "vlan": 100,
            "allow_interface_to_float": true
        })
    }

    fn pci_resource() -> Resource {
        Resource::new(BARE_METAL_SERVER_NETWORK_INTERFACE, "eth1")
            .with_attribute("bare_metal_server", Value::from("s1"))
            .with_attribute("subnet", Value::from("0717-subnet"))
            .with_attribute("name", Value::from("eth1"))
            .with_attribute(
                "allowed_vlans",
                Value::List(vec![Value::Int(100), Value::Int(200)]),
            )
    }

    #[tokio::test(start_paused = true)]
    async fn test_pci_create_stops_and_restarts_running_server() {
        let transport = ScriptedTransport::new();
        transport
            .ok(Method::Get, SERVER, server("running"))
            .ok(Method::Get, SERVER, server("stopped"))
            .ok(Method::Get, SERVER, server("running"))
            .no_content(Method::Post, "/bare_metal_servers/s1/stop")
            .no_content(Method::Post, "/bare_metal_servers/s1/start")
            .ok(Method::Post, NICS, pci("pending"))
            .ok(Method::Get, NIC, pci("available"));
        let provider = provider(transport.clone());

        let state = provider.create(&pci_resource()).await.unwrap();

        assert_eq!(state.identifier.as_deref(), Some("s1/n1"));
        assert_eq!(state.attributes["status"], Value::from("available"));
        assert_eq!(state.attributes["hard_stop"], Value::Bool(true));

        let mutations: Vec<String> = transport
            .requests()
            .into_iter()
            .filter(|r| r.method == Method::Post)
            .map(|r| r.path)
            .collect();
        assert_eq!(
            mutations,
            vec![
                "/bare_metal_servers/s1/stop".to_string(),
                NICS.to_string(),
                "/bare_metal_servers/s1/start".to_string(),
            ]
        );
        assert_eq!(provider.locks().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pci_create_without_hard_stop_accepts_pci_pending() {
        let transport = ScriptedTransport::new();
        transport
            .ok(Method::Post, NICS, pci("pending"))
            .ok(Method::Get, NIC, pci("pci_pending"));
        let provider = provider(transport.clone());

        let resource = pci_resource().with_attribute("hard_stop", Value::Bool(false));
        let state = provider.create(&resource).await.unwrap();

        assert_eq!(state.attributes["status"], Value::from("pci_pending"));
        assert_eq!(transport.count(Method::Get, SERVER), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_vlan_create_leaves_server_running() {
        let transport = ScriptedTransport::new();
        transport
            .ok(Method::Post, NICS, vlan("pending"))
            .ok(Method::Get, "/bare_metal_servers/s1/network_interfaces/n2", vlan("available"));
        let provider = provider(transport.clone());

        let resource = Resource::new(BARE_METAL_SERVER_NETWORK_INTERFACE, "vlan100")
            .with_attribute("bare_metal_server", Value::from("s1"))
            .with_attribute("subnet", Value::from("0717-subnet"))
            .with_attribute("interface_type", Value::from("vlan"))
            .with_attribute("vlan", Value::Int(100))
            .with_attribute("allow_interface_to_float", Value::Bool(true));
        let state = provider.create(&resource).await.unwrap();

        assert_eq!(state.identifier.as_deref(), Some("s1/n2"));
        assert_eq!(state.attributes["vlan"], Value::Int(100));
        assert_eq!(transport.count(Method::Get, SERVER), 0);

        let body = transport.requests()[0].body.clone().unwrap();
        assert_eq!(body["interface_type"], json!("vlan"));
        assert_eq!(body["vlan"], json!(100));
        assert_eq!(body["subnet"], json!({"id": "0717-subnet"}));
    }

    #[tokio::test]
    async fn test_vlan_interface_requires_vlan() {
        let provider = provider(ScriptedTransport::new());
        let resource = Resource::new(BARE_METAL_SERVER_NETWORK_INTERFACE, "vlan")
            .with_attribute("bare_metal_server", Value::from("s1"))
            .with_attribute("subnet", Value::from("0717-subnet"))
            .with_attribute("interface_type", Value::from("vlan"));
        let err = provider.create(&resource).await.unwrap_err();
        assert_eq!(err.message, "'vlan' is required for a vlan interface");

        let resource = pci_resource().with_attribute("vlan", Value::Int(10));
        let err = provider.create(&resource).await.unwrap_err();
        assert_eq!(err.message, "'vlan' cannot be set on a pci interface");
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_patches_changed_fields_only() {
        let transport = ScriptedTransport::new();
        transport
            .ok(Method::Patch, NIC, pci("available"))
            .ok(Method::Get, NIC, pci("available"));
        let provider = provider(transport.clone());

        let id = ResourceId::new(BARE_METAL_SERVER_NETWORK_INTERFACE, "eth1");
        let from = State::existing(
            id.clone(),
            HashMap::from([
                ("name".to_string(), Value::from("eth1")),
                (
                    "allowed_vlans".to_string(),
                    Value::List(vec![Value::Int(100), Value::Int(200)]),
                ),
            ]),
        );
        let to = pci_resource().with_attribute("name", Value::from("eth-renamed"));
        provider.update(&id, "s1/n1", &from, &to).await.unwrap();

        let patch = transport
            .requests()
            .into_iter()
            .find(|r| r.method == Method::Patch)
            .and_then(|r| r.body)
            .unwrap();
        assert_eq!(patch, json!({"name": "eth-renamed"}));
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_pci_on_stopped_server() {
        let transport = ScriptedTransport::new();
        transport
            .ok(Method::Get, NIC, pci("available"))
            .ok(Method::Get, NIC, pci("deleting"))
            .not_found(Method::Get, NIC)
            .ok(Method::Get, SERVER, server("stopped"))
            .no_content(Method::Delete, NIC);
        let provider = provider(transport.clone());

        let id = ResourceId::new(BARE_METAL_SERVER_NETWORK_INTERFACE, "eth1");
        provider.delete(&id, "s1/n1", &pci_resource()).await.unwrap();

        assert_eq!(transport.count(Method::Delete, NIC), 1);
        assert_eq!(transport.count(Method::Post, "/bare_metal_servers/s1/start"), 0);
    }

    #[tokio::test]
    async fn test_delete_missing_interface_is_noop() {
        let transport = ScriptedTransport::new();
        transport.not_found(Method::Get, NIC);
        let provider = provider(transport.clone());

        let id = ResourceId::new(BARE_METAL_SERVER_NETWORK_INTERFACE, "eth1");
        provider.delete(&id, "s1/n1", &pci_resource()).await.unwrap();
        assert_eq!(transport.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_read_maps_interface() {
        let transport = ScriptedTransport::new();
        transport.ok(Method::Get, NIC, pci("available"));
        let provider = provider(transport);

        let id = ResourceId::new(BARE_METAL_SERVER_NETWORK_INTERFACE, "eth1");
        let state = provider.read(&id, "s1/n1").await.unwrap();

        assert_eq!(state.attributes["bare_metal_server"], Value::from("s1"));
        assert_eq!(state.attributes["subnet"], Value::from("0717-subnet"));
        let primary_ip = state.attributes["primary_ip"].as_map().unwrap();
        assert_eq!(primary_ip["reserved_ip"], Value::from("0717-ip"));
    }

    #[tokio::test]
    async fn test_network_interfaces_data_source() {
        let transport = ScriptedTransport::new();
        transport.ok(
            Method::Get,
            NICS,
            json!({"network_interfaces": [pci("available"), vlan("available")]}),
        );
        let provider = provider(transport);

        let resource = Resource::new(BARE_METAL_SERVER_NETWORK_INTERFACES, "all")
            .with_attribute("bare_metal_server", Value::from("s1"))
            .with_read_only(true);
        let state = provider.read_data_source(&resource).await.unwrap();

        let nics = state.attributes["network_interfaces"].as_list().unwrap();
        assert_eq!(nics.len(), 2);
        assert_eq!(
            nics[1].as_map().unwrap()["interface_type"],
            Value::from("vlan")
        );
    }
}

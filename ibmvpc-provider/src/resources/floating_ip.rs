//! Floating IPs bound to bare metal server network interfaces, and the
//! `is_floating_ips` data source

use chrono::Utc;
use ibmvpc_core::provider::ProviderResult;
use ibmvpc_core::resource::{CompoundId, Resource, ResourceId, State, Value, join_id};
use log::info;

use crate::convert::floating_ip_to_map;
use crate::error::NotFoundExt;
use crate::models::FloatingIp;
use crate::provider::{IbmVpcProvider, carry_over, optional_string, required_str};
use crate::waiters;

const ID_PARTS: [&str; 3] = ["bare_metal_server", "network_interface", "floating_ip"];

fn floating_ip_state(id: ResourceId, server_id: &str, nic_id: &str, fip: &FloatingIp) -> State {
    let mut attributes = floating_ip_to_map(fip);
    attributes.insert(
        "bare_metal_server".to_string(),
        Value::String(server_id.to_string()),
    );
    attributes.insert(
        "network_interface".to_string(),
        Value::String(nic_id.to_string()),
    );
    State::existing(id, attributes).with_identifier(join_id(&[server_id, nic_id, &fip.id]))
}

impl IbmVpcProvider {
    pub(crate) async fn read_network_interface_floating_ip(
        &self,
        id: &ResourceId,
        identifier: &str,
    ) -> ProviderResult<State> {
        let [server_id, nic_id, fip_id] = CompoundId::split(identifier, ID_PARTS)?;
        let fip = self
            .client
            .get_bare_metal_server_network_interface_floating_ip(&server_id, &nic_id, &fip_id)
            .await
            .optional()
            .map_err(|e| {
                e.context(format!(
                    "Error getting floating IP ({}) on bare metal server ({}) network interface ({})",
                    fip_id, server_id, nic_id
                ))
            })?;

        Ok(match fip {
            Some(fip) => floating_ip_state(id.clone(), &server_id, &nic_id, &fip),
            None => State::not_found(id.clone()),
        })
    }

    pub(crate) async fn create_network_interface_floating_ip(
        &self,
        resource: &Resource,
    ) -> ProviderResult<State> {
        let server_id = required_str(resource, "bare_metal_server")?;
        let nic_id = required_str(resource, "network_interface")?;
        let fip_id = required_str(resource, "floating_ip")?;

        self.client
            .add_bare_metal_server_network_interface_floating_ip(server_id, nic_id, fip_id)
            .await
            .map_err(|e| {
                e.context(format!(
                    "Error adding floating IP ({}) to bare metal server ({}) network interface ({})",
                    fip_id, server_id, nic_id
                ))
            })?;
        info!(
            "Bound floating IP ({}) to network interface ({})",
            fip_id, nic_id
        );

        let timeout = self.timeouts_for(resource).create;
        let fip = waiters::network_interface_floating_ip_available(
            &self.client,
            &self.poll,
            server_id,
            nic_id,
            fip_id,
            timeout,
        )
        .await?;

        let mut state = floating_ip_state(resource.id.clone(), server_id, nic_id, &fip);
        carry_over(&mut state.attributes, resource, &[]);
        Ok(state)
    }

    pub(crate) async fn delete_network_interface_floating_ip(
        &self,
        identifier: &str,
        resource: &Resource,
    ) -> ProviderResult<()> {
        let [server_id, nic_id, fip_id] = CompoundId::split(identifier, ID_PARTS)?;

        let removed = self
            .client
            .remove_bare_metal_server_network_interface_floating_ip(&server_id, &nic_id, &fip_id)
            .await
            .optional()
            .map_err(|e| {
                e.context(format!(
                    "Error removing floating IP ({}) from bare metal server ({}) network interface ({})",
                    fip_id, server_id, nic_id
                ))
            })?;
        if removed.is_none() {
            info!("Floating IP ({}) is already unbound", fip_id);
            return Ok(());
        }

        let timeout = self.timeouts_for(resource).delete;
        waiters::network_interface_floating_ip_removed(
            &self.client,
            &self.poll,
            &server_id,
            &nic_id,
            &fip_id,
            timeout,
        )
        .await?;
        waiters::floating_ip_released(&self.client, &self.poll, &fip_id, timeout).await
    }

    // =========================================================================
    // Data source
    // =========================================================================

    pub(crate) async fn read_floating_ips(&self, resource: &Resource) -> ProviderResult<State> {
        let mut filters = Vec::new();
        if let Some(group) = optional_string(resource, "resource_group") {
            filters.push(("resource_group.id".to_string(), group));
        }

        let mut fips = self
            .client
            .list_floating_ips(&filters)
            .await
            .map_err(|e| e.context("Error listing floating IPs"))?;
        // The list endpoint has no name filter
        if let Some(name) = resource.get_str("name") {
            fips.retain(|fip| fip.name == name);
        }

        let mut attributes = resource.attributes.clone();
        attributes.insert(
            "floating_ips".to_string(),
            Value::List(
                fips.iter()
                    .map(|fip| Value::Map(floating_ip_to_map(fip)))
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
    use crate::resources::{BARE_METAL_SERVER_NETWORK_INTERFACE_FLOATING_IP, FLOATING_IPS};
    use crate::testing::ScriptedTransport;
    use crate::transport::Method;
    use ibmvpc_core::provider::Provider;
    use serde_json::json;
    use std::sync::Arc;

    const FIP: &str = "/bare_metal_servers/s1/network_interfaces/n1/floating_ips/f1";

    fn provider(transport: Arc<ScriptedTransport>) -> IbmVpcProvider {
        IbmVpcProvider::with_transport(transport, &ProviderConfig::default())
    }

    fn fip(status: &str) -> serde_json::Value {
        json!({
            "id": "f1",
            "address": "169.48.1.10",
            "name": "fip-1",
            "status": status,
            "zone": {"name": "us-south-1"},
            "target": {"id": "n1"}
        })
    }

    fn resource() -> Resource {
        Resource::new(BARE_METAL_SERVER_NETWORK_INTERFACE_FLOATING_IP, "fip")
            .with_attribute("bare_metal_server", Value::from("s1"))
            .with_attribute("network_interface", Value::from("n1"))
            .with_attribute("floating_ip", Value::from("f1"))
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_binds_and_waits() {
        let transport = ScriptedTransport::new();
        transport
            .ok(Method::Put, FIP, fip("pending"))
            .ok(Method::Get, FIP, fip("pending"))
            .ok(Method::Get, FIP, fip("available"));
        let provider = provider(transport.clone());

        let state = provider.create(&resource()).await.unwrap();

        assert_eq!(state.identifier.as_deref(), Some("s1/n1/f1"));
        assert_eq!(state.attributes["address"], Value::from("169.48.1.10"));
        assert_eq!(state.attributes["target"], Value::from("n1"));
        assert_eq!(transport.count(Method::Get, FIP), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_waits_until_unbound() {
        let transport = ScriptedTransport::new();
        transport
            .no_content(Method::Delete, FIP)
            .ok(Method::Get, FIP, fip("deleting"))
            .not_found(Method::Get, FIP)
            .ok(Method::Get, "/floating_ips/f1", fip("pending"))
            .ok(Method::Get, "/floating_ips/f1", fip("available"));
        let provider = provider(transport.clone());

        let id = ResourceId::new(BARE_METAL_SERVER_NETWORK_INTERFACE_FLOATING_IP, "fip");
        provider.delete(&id, "s1/n1/f1", &resource()).await.unwrap();
        assert_eq!(transport.count(Method::Get, FIP), 2);
        assert_eq!(transport.count(Method::Get, "/floating_ips/f1"), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_reports_failed_release() {
        let transport = ScriptedTransport::new();
        transport
            .no_content(Method::Delete, FIP)
            .not_found(Method::Get, FIP)
            .ok(Method::Get, "/floating_ips/f1", fip("failed"));
        let provider = provider(transport);

        let id = ResourceId::new(BARE_METAL_SERVER_NETWORK_INTERFACE_FLOATING_IP, "fip");
        let err = provider.delete(&id, "s1/n1/f1", &resource()).await.unwrap_err();
        assert!(err.message.contains("Floating IP (f1) entered failed state"));
    }

    #[tokio::test]
    async fn test_delete_already_unbound() {
        let transport = ScriptedTransport::new();
        transport.not_found(Method::Delete, FIP);
        let provider = provider(transport.clone());

        let id = ResourceId::new(BARE_METAL_SERVER_NETWORK_INTERFACE_FLOATING_IP, "fip");
        provider.delete(&id, "s1/n1/f1", &resource()).await.unwrap();
        assert_eq!(transport.count(Method::Get, FIP), 0);
    }

    #[tokio::test]
    async fn test_read_gone_and_error() {
        let id = ResourceId::new(BARE_METAL_SERVER_NETWORK_INTERFACE_FLOATING_IP, "fip");

        let gone = ScriptedTransport::new();
        gone.not_found(Method::Get, FIP);
        let state = provider(gone).read(&id, "s1/n1/f1").await.unwrap();
        assert!(!state.exists);

        let broken = ScriptedTransport::new();
        broken.fail(Method::Get, FIP, 500);
        let err = provider(broken).read(&id, "s1/n1/f1").await.unwrap_err();
        assert!(err.message.starts_with("Error getting floating IP (f1)"));
    }

    #[tokio::test]
    async fn test_floating_ips_data_source_filters_by_name() {
        let transport = ScriptedTransport::new();
        let mut other = fip("available");
        other["id"] = json!("f2");
        other["name"] = json!("fip-2");
        transport.ok(
            Method::Get,
            "/floating_ips",
            json!({"floating_ips": [fip("available"), other]}),
        );
        let provider = provider(transport);

        let resource = Resource::new(FLOATING_IPS, "named")
            .with_attribute("name", Value::from("fip-2"))
            .with_read_only(true);
        let state = provider.read_data_source(&resource).await.unwrap();

        let fips = state.attributes["floating_ips"].as_list().unwrap();
        assert_eq!(fips.len(), 1);
        assert_eq!(fips[0].as_map().unwrap()["floating_ip"], Value::from("f2"));
    }
}

//! IBM Cloud VPC Provider implementation
//!
//! This module contains the provider struct, the dispatch from resource type
//! names to the CRUD methods in [`crate::resources`], and helpers shared by
//! those methods.

use std::sync::Arc;

use ibmvpc_core::lock::KeyedLocks;
use ibmvpc_core::provider::{ProviderError, ProviderResult};
use ibmvpc_core::resource::{Resource, ResourceId, State, Value};
use ibmvpc_core::timeouts::{TIMEOUTS_ATTRIBUTE, Timeouts};
use log::debug;

use crate::client::VpcClient;
use crate::config::ProviderConfig;
use crate::resources::{self, *};
use crate::transport::{HttpTransport, Transport};
use crate::waiters::PollSettings;

/// IBM Cloud VPC Provider
pub struct IbmVpcProvider {
    pub(crate) client: VpcClient,
    /// Serialises mutations that share a remote parent (e.g. one load balancer)
    pub(crate) locks: KeyedLocks,
    pub(crate) poll: PollSettings,
    pub(crate) timeouts: Timeouts,
}

impl IbmVpcProvider {
    /// Create a provider talking to the VPC API over HTTPS
    pub fn new(config: &ProviderConfig) -> ProviderResult<Self> {
        config
            .validate()
            .map_err(|e| ProviderError::new(e.to_string()).with_cause(e))?;
        let transport =
            HttpTransport::new(config).map_err(|e| e.context("Failed to initialise VPC client"))?;
        Ok(Self::with_transport(Arc::new(transport), config))
    }

    /// Create a provider over an arbitrary transport
    pub fn with_transport(transport: Arc<dyn Transport>, config: &ProviderConfig) -> Self {
        Self {
            client: VpcClient::new(transport),
            locks: KeyedLocks::new(),
            poll: PollSettings::from_config(config),
            timeouts: config.timeouts,
        }
    }

    pub fn client(&self) -> &VpcClient {
        &self.client
    }

    pub fn locks(&self) -> &KeyedLocks {
        &self.locks
    }

    /// Provider timeouts with the resource's own overrides applied
    pub(crate) fn timeouts_for(&self, resource: &Resource) -> Timeouts {
        self.timeouts.with_overrides(resource)
    }

    // =========================================================================
    // Validation
    // =========================================================================

    /// Apply schema defaults and validate attributes
    pub(crate) fn prepare(&self, resource: &Resource) -> ProviderResult<Resource> {
        let resource_type = resources::resource_type(&resource.id.resource_type)
            .ok_or_else(|| unknown_type(&resource.id))?;
        if resource_type.is_data_source() != resource.is_data_source() {
            let kind = if resource_type.is_data_source() {
                "a data source"
            } else {
                "a resource"
            };
            return Err(ProviderError::new(format!(
                "{} is {}",
                resource.id.resource_type, kind
            ))
            .for_resource(resource.id.clone()));
        }

        let schema = resource_type.schema();
        let mut prepared = resource.clone();
        schema.apply_defaults(&mut prepared.attributes);
        schema.validate(&prepared.attributes).map_err(|errors| {
            let messages: Vec<String> = errors.iter().map(ToString::to_string).collect();
            ProviderError::new(format!("Invalid attributes: {}", messages.join("; ")))
                .for_resource(resource.id.clone())
        })?;
        Ok(prepared)
    }

    /// Reject in-place changes to attributes that force replacement
    fn check_force_new(&self, from: &State, to: &Resource) -> ProviderResult<()> {
        let Some(resource_type) = resources::resource_type(&to.id.resource_type) else {
            return Err(unknown_type(&to.id));
        };
        let schema = resource_type.schema();
        let changed: Vec<&str> = schema
            .force_new_attributes()
            .into_iter()
            .filter(|name| match (from.attributes.get(*name), to.attributes.get(*name)) {
                (Some(old), Some(new)) => !matches_recorded(old, new),
                _ => false,
            })
            .collect();

        if changed.is_empty() {
            Ok(())
        } else {
            Err(ProviderError::new(format!(
                "Cannot update {} in place; the resource must be replaced",
                changed.join(", ")
            ))
            .for_resource(to.id.clone()))
        }
    }

    // =========================================================================
    // Dispatch
    // =========================================================================

    pub async fn read_resource(&self, id: &ResourceId, identifier: &str) -> ProviderResult<State> {
        debug!("Reading {} ({})", id, identifier);
        let result = match id.resource_type.as_str() {
            BARE_METAL_SERVER_ACTION => self.read_bare_metal_server_action(id, identifier).await,
            BARE_METAL_SERVER_NETWORK_INTERFACE => {
                self.read_network_interface(id, identifier).await
            }
            BARE_METAL_SERVER_NETWORK_INTERFACE_FLOATING_IP => {
                self.read_network_interface_floating_ip(id, identifier)
                    .await
            }
            VPN_GATEWAY_CONNECTION => self.read_vpn_gateway_connection(id, identifier).await,
            LB_LISTENER_POLICY_RULE => self.read_lb_listener_policy_rule(id, identifier).await,
            _ => Err(unknown_type(id)),
        };
        result.map_err(|e| with_resource(e, id))
    }

    pub async fn create_resource(&self, resource: Resource) -> ProviderResult<State> {
        let resource = self.prepare(&resource)?;
        let id = resource.id.clone();
        debug!("Creating {}", id);
        let result = match id.resource_type.as_str() {
            BARE_METAL_SERVER_ACTION => self.create_bare_metal_server_action(&resource).await,
            BARE_METAL_SERVER_NETWORK_INTERFACE => self.create_network_interface(&resource).await,
            BARE_METAL_SERVER_NETWORK_INTERFACE_FLOATING_IP => {
                self.create_network_interface_floating_ip(&resource).await
            }
            VPN_GATEWAY_CONNECTION => self.create_vpn_gateway_connection(&resource).await,
            LB_LISTENER_POLICY_RULE => self.create_lb_listener_policy_rule(&resource).await,
            _ => Err(unknown_type(&id)),
        };
        result.map_err(|e| with_resource(e, &id))
    }

    pub async fn update_resource(
        &self,
        id: &ResourceId,
        identifier: &str,
        from: &State,
        to: Resource,
    ) -> ProviderResult<State> {
        let to = self.prepare(&to)?;
        self.check_force_new(from, &to)?;
        debug!("Updating {} ({})", id, identifier);
        let result = match id.resource_type.as_str() {
            BARE_METAL_SERVER_ACTION => {
                self.update_bare_metal_server_action(identifier, from, &to)
                    .await
            }
            BARE_METAL_SERVER_NETWORK_INTERFACE => {
                self.update_network_interface(identifier, from, &to).await
            }
            // Every argument forces replacement
            BARE_METAL_SERVER_NETWORK_INTERFACE_FLOATING_IP => {
                self.read_network_interface_floating_ip(id, identifier)
                    .await
            }
            VPN_GATEWAY_CONNECTION => {
                self.update_vpn_gateway_connection(identifier, from, &to)
                    .await
            }
            LB_LISTENER_POLICY_RULE => {
                self.update_lb_listener_policy_rule(identifier, from, &to)
                    .await
            }
            _ => Err(unknown_type(id)),
        };
        result.map_err(|e| with_resource(e, id))
    }

    pub async fn delete_resource(
        &self,
        id: &ResourceId,
        identifier: &str,
        resource: &Resource,
    ) -> ProviderResult<()> {
        debug!("Deleting {} ({})", id, identifier);
        let result = match id.resource_type.as_str() {
            BARE_METAL_SERVER_ACTION => {
                self.delete_bare_metal_server_action(identifier);
                Ok(())
            }
            BARE_METAL_SERVER_NETWORK_INTERFACE => {
                self.delete_network_interface(identifier, resource).await
            }
            BARE_METAL_SERVER_NETWORK_INTERFACE_FLOATING_IP => {
                self.delete_network_interface_floating_ip(identifier, resource)
                    .await
            }
            VPN_GATEWAY_CONNECTION => {
                self.delete_vpn_gateway_connection(identifier, resource)
                    .await
            }
            LB_LISTENER_POLICY_RULE => {
                self.delete_lb_listener_policy_rule(identifier, resource)
                    .await
            }
            _ => Err(unknown_type(id)),
        };
        result.map_err(|e| with_resource(e, id))
    }

    pub async fn read_data_source_resource(&self, resource: Resource) -> ProviderResult<State> {
        let resource = self.prepare(&resource)?;
        let id = resource.id.clone();
        debug!("Reading data source {}", id);
        let result = match id.resource_type.as_str() {
            BARE_METAL_SERVERS => self.read_bare_metal_servers(&resource).await,
            BARE_METAL_SERVER_NETWORK_INTERFACES => {
                self.read_network_interfaces(&resource).await
            }
            FLOATING_IPS => self.read_floating_ips(&resource).await,
            _ => Err(unknown_type(&id)),
        };
        result.map_err(|e| with_resource(e, &id))
    }
}

// =============================================================================
// Helpers shared by resources
// =============================================================================

/// True if `desired` agrees with what the API recorded
///
/// Maps only compare the keys the caller set, since the API adds its own
/// (a primary IP gains its reserved IP ID).
fn matches_recorded(recorded: &Value, desired: &Value) -> bool {
    match (recorded, desired) {
        (Value::Map(recorded), Value::Map(desired)) => desired
            .iter()
            .all(|(k, v)| recorded.get(k).is_some_and(|r| matches_recorded(r, v))),
        _ => recorded == desired,
    }
}

fn unknown_type(id: &ResourceId) -> ProviderError {
    ProviderError::new(format!("Unknown resource type: {}", id.resource_type)).for_resource(id.clone())
}

fn with_resource(e: ProviderError, id: &ResourceId) -> ProviderError {
    if e.resource_id.is_some() {
        e
    } else {
        e.for_resource(id.clone())
    }
}

/// Get a string attribute the schema marks as required
pub(crate) fn required_str<'a>(resource: &'a Resource, key: &str) -> ProviderResult<&'a str> {
    resource
        .get_str(key)
        .ok_or_else(|| ProviderError::new(format!("Required attribute '{}' is missing", key)))
}

/// Get an optional string attribute as an owned value
pub(crate) fn optional_string(resource: &Resource, key: &str) -> Option<String> {
    resource.get_str(key).map(str::to_string)
}

/// Get a list of strings; non-string items are skipped
pub(crate) fn string_list(resource: &Resource, key: &str) -> Vec<String> {
    resource
        .attributes
        .get(key)
        .and_then(Value::as_list)
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

/// Get a list of integers; non-integer items are skipped
pub(crate) fn int_list(resource: &Resource, key: &str) -> Vec<i64> {
    resource
        .attributes
        .get(key)
        .and_then(Value::as_list)
        .map(|items| items.iter().filter_map(Value::as_int).collect())
        .unwrap_or_default()
}

/// True if `key` is set on `to` and differs from the recorded state
pub(crate) fn changed(from: &State, to: &Resource, key: &str) -> bool {
    match to.attributes.get(key) {
        Some(new) => from.attributes.get(key) != Some(new),
        None => false,
    }
}

/// Copy caller-supplied attributes that the API does not echo back
pub(crate) fn carry_over(
    attributes: &mut std::collections::HashMap<String, Value>,
    resource: &Resource,
    keys: &[&str],
) {
    for key in keys.iter().chain(std::iter::once(&TIMEOUTS_ATTRIBUTE)) {
        if let Some(value) = resource.attributes.get(*key) {
            attributes
                .entry(key.to_string())
                .or_insert_with(|| value.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedTransport;

    fn provider() -> IbmVpcProvider {
        IbmVpcProvider::with_transport(ScriptedTransport::new(), &ProviderConfig::default())
    }

    #[test]
    fn test_new_validates_config() {
        let err = IbmVpcProvider::new(&ProviderConfig::default()).err().unwrap();
        assert_eq!(
            err.message,
            "API key is required: set IC_API_KEY or IBMCLOUD_API_KEY"
        );
    }

    #[test]
    fn test_prepare_applies_defaults() {
        let resource = Resource::new(BARE_METAL_SERVER_ACTION, "stop")
            .with_attribute("bare_metal_server", Value::from("s1"))
            .with_attribute("action", Value::from("stop"));
        let prepared = provider().prepare(&resource).unwrap();
        assert_eq!(prepared.get_str("stop_type"), Some("hard"));
    }

    #[test]
    fn test_prepare_reports_all_errors() {
        let resource = Resource::new(BARE_METAL_SERVER_ACTION, "bad")
            .with_attribute("action", Value::from("reboot"));
        let err = provider().prepare(&resource).unwrap_err();
        assert!(err.message.starts_with("Invalid attributes: "));
        assert!(err.message.contains("'bare_metal_server' is missing"));
        assert!(err.message.contains("Invalid enum variant 'reboot'"));
        assert_eq!(err.resource_id, Some(resource.id.clone()));
    }

    #[test]
    fn test_prepare_rejects_data_source_mismatch() {
        let resource = Resource::new(FLOATING_IPS, "all");
        let err = provider().prepare(&resource).unwrap_err();
        assert_eq!(err.message, "is_floating_ips is a data source");

        let resource = Resource::new("is_instance", "vsi");
        let err = provider().prepare(&resource).unwrap_err();
        assert_eq!(err.message, "Unknown resource type: is_instance");
    }

    #[test]
    fn test_check_force_new() {
        let provider = provider();
        let id = ResourceId::new(VPN_GATEWAY_CONNECTION, "conn");
        let from = State::existing(
            id.clone(),
            std::collections::HashMap::from([
                ("vpn_gateway".to_string(), Value::from("gw-1")),
                ("name".to_string(), Value::from("conn")),
            ]),
        );

        let rename = Resource::new(VPN_GATEWAY_CONNECTION, "conn")
            .with_attribute("vpn_gateway", Value::from("gw-1"))
            .with_attribute("name", Value::from("conn-2"));
        assert!(provider.check_force_new(&from, &rename).is_ok());

        let move_gateway = Resource::new(VPN_GATEWAY_CONNECTION, "conn")
            .with_attribute("vpn_gateway", Value::from("gw-2"));
        let err = provider.check_force_new(&from, &move_gateway).unwrap_err();
        assert_eq!(
            err.message,
            "Cannot update vpn_gateway in place; the resource must be replaced"
        );
    }

    #[test]
    fn test_matches_recorded_map_subset() {
        let recorded = Value::Map(std::collections::HashMap::from([
            ("address".to_string(), Value::from("10.240.0.5")),
            ("reserved_ip".to_string(), Value::from("0717-ip")),
        ]));
        let same = Value::Map(std::collections::HashMap::from([(
            "address".to_string(),
            Value::from("10.240.0.5"),
        )]));
        let other = Value::Map(std::collections::HashMap::from([(
            "address".to_string(),
            Value::from("10.240.0.6"),
        )]));
        assert!(matches_recorded(&recorded, &same));
        assert!(!matches_recorded(&recorded, &other));
    }

    #[test]
    fn test_changed() {
        let id = ResourceId::new(VPN_GATEWAY_CONNECTION, "conn");
        let from = State::existing(
            id,
            std::collections::HashMap::from([("name".to_string(), Value::from("a"))]),
        );
        let to = Resource::new(VPN_GATEWAY_CONNECTION, "conn")
            .with_attribute("name", Value::from("b"))
            .with_attribute("admin_state_up", Value::Bool(true));

        assert!(changed(&from, &to, "name"));
        assert!(changed(&from, &to, "admin_state_up"));
        assert!(!changed(&from, &to, "peer_address"));
    }
}

//! Resource type definitions and schemas
//!
//! The CRUD operations for each type live in the submodules as methods on
//! [`IbmVpcProvider`](crate::IbmVpcProvider).

mod bare_metal_server;
mod floating_ip;
mod lb_listener_policy_rule;
mod network_interface;
mod vpn_gateway_connection;

use std::sync::LazyLock;

use ibmvpc_core::provider::ResourceType;
use ibmvpc_core::resource::Value;
use ibmvpc_core::schema::{AttributeSchema, AttributeType, ResourceSchema, types};
use ibmvpc_core::timeouts::TIMEOUTS_ATTRIBUTE;
use regex::Regex;

// =============================================================================
// Type names
// =============================================================================

pub const BARE_METAL_SERVER_ACTION: &str = "is_bare_metal_server_action";
pub const BARE_METAL_SERVER_NETWORK_INTERFACE: &str = "is_bare_metal_server_network_interface";
pub const BARE_METAL_SERVER_NETWORK_INTERFACE_FLOATING_IP: &str =
    "is_bare_metal_server_network_interface_floating_ip";
pub const VPN_GATEWAY_CONNECTION: &str = "is_vpn_gateway_connection";
pub const LB_LISTENER_POLICY_RULE: &str = "is_lb_listener_policy_rule";

pub const BARE_METAL_SERVERS: &str = "is_bare_metal_servers";
pub const BARE_METAL_SERVER_NETWORK_INTERFACES: &str = "is_bare_metal_server_network_interfaces";
pub const FLOATING_IPS: &str = "is_floating_ips";

// =============================================================================
// Resource types
// =============================================================================

/// Macro to define resource types
macro_rules! define_resource_type {
    ($name:ident, $type_name:expr, $schema:ident) => {
        pub struct $name;
        impl ResourceType for $name {
            fn name(&self) -> &'static str {
                $type_name
            }
            fn schema(&self) -> ResourceSchema {
                $schema()
            }
        }
    };
    ($name:ident, $type_name:expr, $schema:ident, data_source) => {
        pub struct $name;
        impl ResourceType for $name {
            fn name(&self) -> &'static str {
                $type_name
            }
            fn schema(&self) -> ResourceSchema {
                $schema()
            }
            fn is_data_source(&self) -> bool {
                true
            }
        }
    };
}

define_resource_type!(
    BareMetalServerActionType,
    BARE_METAL_SERVER_ACTION,
    bare_metal_server_action_schema
);
define_resource_type!(
    BareMetalServerNetworkInterfaceType,
    BARE_METAL_SERVER_NETWORK_INTERFACE,
    network_interface_schema
);
define_resource_type!(
    BareMetalServerNetworkInterfaceFloatingIpType,
    BARE_METAL_SERVER_NETWORK_INTERFACE_FLOATING_IP,
    network_interface_floating_ip_schema
);
define_resource_type!(
    VpnGatewayConnectionType,
    VPN_GATEWAY_CONNECTION,
    vpn_gateway_connection_schema
);
define_resource_type!(
    LbListenerPolicyRuleType,
    LB_LISTENER_POLICY_RULE,
    lb_listener_policy_rule_schema
);
define_resource_type!(
    BareMetalServersType,
    BARE_METAL_SERVERS,
    bare_metal_servers_schema,
    data_source
);
define_resource_type!(
    BareMetalServerNetworkInterfacesType,
    BARE_METAL_SERVER_NETWORK_INTERFACES,
    network_interfaces_schema,
    data_source
);
define_resource_type!(FloatingIpsType, FLOATING_IPS, floating_ips_schema, data_source);

/// Returns all resource and data source types
pub fn resource_types() -> Vec<Box<dyn ResourceType>> {
    vec![
        Box::new(BareMetalServerActionType),
        Box::new(BareMetalServerNetworkInterfaceType),
        Box::new(BareMetalServerNetworkInterfaceFloatingIpType),
        Box::new(VpnGatewayConnectionType),
        Box::new(LbListenerPolicyRuleType),
        Box::new(BareMetalServersType),
        Box::new(BareMetalServerNetworkInterfacesType),
        Box::new(FloatingIpsType),
    ]
}

/// Find a type by name
pub fn resource_type(name: &str) -> Option<Box<dyn ResourceType>> {
    resource_types().into_iter().find(|t| t.name() == name)
}

// =============================================================================
// Attribute types
// =============================================================================

static NAME_PATTERN: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"^([a-z]|[a-z][-a-z0-9]*[a-z0-9])$"));

/// User-chosen name of a VPC object: lowercase, digits and dashes, at most 63 characters
pub fn name_type() -> AttributeType {
    AttributeType::Custom {
        name: "Name".to_string(),
        base: Box::new(AttributeType::String),
        validate: |value| {
            let Value::String(s) = value else {
                return Err("Expected string".to_string());
            };
            let re = NAME_PATTERN.as_ref().map_err(|e| e.to_string())?;
            if s.len() > 63 {
                Err(format!("Name '{}' is longer than 63 characters", s))
            } else if !re.is_match(s) {
                Err(format!(
                    "Name '{}' must start with a lowercase letter and contain only lowercase letters, digits and dashes",
                    s
                ))
            } else {
                Ok(())
            }
        },
    }
}

/// 802.1Q VLAN ID (1-4094)
pub fn vlan_id() -> AttributeType {
    AttributeType::Custom {
        name: "VlanId".to_string(),
        base: Box::new(AttributeType::Int),
        validate: |value| match value {
            Value::Int(n) if (1..=4094).contains(n) => Ok(()),
            Value::Int(n) => Err(format!("VLAN {} must be between 1 and 4094", n)),
            _ => Err("Expected integer".to_string()),
        },
    }
}

fn timeouts_attribute() -> AttributeSchema {
    AttributeSchema::new(TIMEOUTS_ATTRIBUTE, types::timeouts())
        .with_description("Operation timeouts in seconds (create, update, delete)")
}

fn computed(name: &str, attr_type: AttributeType) -> AttributeSchema {
    AttributeSchema::new(name, attr_type).computed()
}

// =============================================================================
// Schemas
// =============================================================================

pub fn bare_metal_server_action_schema() -> ResourceSchema {
    ResourceSchema::new(BARE_METAL_SERVER_ACTION)
        .with_description("Start, stop or restart a bare metal server")
        .attribute(
            AttributeSchema::new("bare_metal_server", AttributeType::String)
                .required()
                .force_new(),
        )
        .attribute(
            AttributeSchema::new(
                "action",
                AttributeType::enumeration(&["start", "stop", "restart"]),
            )
            .required(),
        )
        .attribute(
            AttributeSchema::new("stop_type", AttributeType::enumeration(&["hard", "soft"]))
                .with_default(Value::from("hard")),
        )
        .attribute(computed("status", AttributeType::String))
        .attribute(timeouts_attribute())
}

pub fn network_interface_schema() -> ResourceSchema {
    ResourceSchema::new(BARE_METAL_SERVER_NETWORK_INTERFACE)
        .with_description("Network interface of a bare metal server")
        .attribute(
            AttributeSchema::new("bare_metal_server", AttributeType::String)
                .required()
                .force_new(),
        )
        .attribute(
            AttributeSchema::new("subnet", AttributeType::String)
                .required()
                .force_new(),
        )
        .attribute(AttributeSchema::new("name", name_type()))
        .attribute(
            AttributeSchema::new(
                "interface_type",
                AttributeType::enumeration(&["pci", "vlan", "hipersocket"]),
            )
            .force_new()
            .with_default(Value::from("pci")),
        )
        .attribute(
            AttributeSchema::new("allowed_vlans", AttributeType::List(Box::new(vlan_id())))
                .with_description("VLAN IDs a PCI interface accepts"),
        )
        .attribute(AttributeSchema::new("vlan", vlan_id()).force_new())
        .attribute(AttributeSchema::new("allow_interface_to_float", AttributeType::Bool).force_new())
        .attribute(AttributeSchema::new("allow_ip_spoofing", AttributeType::Bool))
        .attribute(AttributeSchema::new("enable_infrastructure_nat", AttributeType::Bool))
        .attribute(
            AttributeSchema::new(
                "security_groups",
                AttributeType::List(Box::new(AttributeType::String)),
            )
            .force_new(),
        )
        .attribute(
            AttributeSchema::new("primary_ip", AttributeType::Map(Box::new(AttributeType::String)))
                .force_new()
                .with_description("Primary IP with optional 'address' and 'name'"),
        )
        .attribute(
            AttributeSchema::new("hard_stop", AttributeType::Bool)
                .with_default(Value::Bool(true))
                .with_description("Stop the server while adding or removing a PCI interface"),
        )
        .attribute(computed("network_interface", AttributeType::String))
        .attribute(computed("status", AttributeType::String))
        .attribute(computed("mac_address", AttributeType::String))
        .attribute(computed("port_speed", AttributeType::Int))
        .attribute(computed("type", AttributeType::String))
        .attribute(computed("href", AttributeType::String))
        .attribute(computed("created_at", AttributeType::String))
        .attribute(computed(
            "floating_ips",
            AttributeType::List(Box::new(AttributeType::Map(Box::new(AttributeType::String)))),
        ))
        .attribute(timeouts_attribute())
}

pub fn network_interface_floating_ip_schema() -> ResourceSchema {
    let mut schema = ResourceSchema::new(BARE_METAL_SERVER_NETWORK_INTERFACE_FLOATING_IP)
        .with_description("Floating IP bound to a bare metal server network interface");
    for name in ["bare_metal_server", "network_interface", "floating_ip"] {
        schema = schema.attribute(
            AttributeSchema::new(name, AttributeType::String)
                .required()
                .force_new(),
        );
    }
    for name in ["address", "name", "status", "zone", "target", "crn", "href", "created_at"] {
        schema = schema.attribute(computed(name, AttributeType::String));
    }
    schema.attribute(timeouts_attribute())
}

pub fn vpn_gateway_connection_schema() -> ResourceSchema {
    ResourceSchema::new(VPN_GATEWAY_CONNECTION)
        .with_description("Connection of a VPN gateway to a peer")
        .attribute(
            AttributeSchema::new("vpn_gateway", AttributeType::String)
                .required()
                .force_new(),
        )
        .attribute(AttributeSchema::new("name", name_type()).required())
        .attribute(AttributeSchema::new("peer_address", AttributeType::String).required())
        .attribute(AttributeSchema::new("preshared_key", AttributeType::String).required())
        .attribute(
            AttributeSchema::new("admin_state_up", AttributeType::Bool)
                .with_default(Value::Bool(false)),
        )
        .attribute(
            AttributeSchema::new(
                "action",
                AttributeType::enumeration(&["restart", "clear", "hold", "none"]),
            )
            .with_default(Value::from("restart"))
            .with_description("Dead peer detection action"),
        )
        .attribute(
            AttributeSchema::new("interval", types::positive_int())
                .with_default(Value::Int(2))
                .with_description("Dead peer detection interval in seconds"),
        )
        .attribute(
            AttributeSchema::new("timeout", types::positive_int())
                .with_default(Value::Int(10))
                .with_description("Dead peer detection timeout in seconds"),
        )
        .attribute(AttributeSchema::new("ike_policy", AttributeType::String).force_new())
        .attribute(AttributeSchema::new("ipsec_policy", AttributeType::String).force_new())
        .attribute(
            AttributeSchema::new("local_cidrs", AttributeType::List(Box::new(types::cidr())))
                .force_new(),
        )
        .attribute(
            AttributeSchema::new("peer_cidrs", AttributeType::List(Box::new(types::cidr())))
                .force_new(),
        )
        .attribute(computed("gateway_connection", AttributeType::String))
        .attribute(computed("status", AttributeType::String))
        .attribute(computed("mode", AttributeType::String))
        .attribute(computed("authentication_mode", AttributeType::String))
        .attribute(computed("href", AttributeType::String))
        .attribute(computed("created_at", AttributeType::String))
        .attribute(timeouts_attribute())
}

/// Rule types whose `field` names a header, query parameter or body field
pub const RULE_TYPES_WITH_FIELD: &[&str] = &["header", "query", "body"];

pub fn lb_listener_policy_rule_schema() -> ResourceSchema {
    let mut schema = ResourceSchema::new(LB_LISTENER_POLICY_RULE)
        .with_description("Rule of a load balancer listener policy");
    for name in ["lb", "listener", "policy"] {
        schema = schema.attribute(
            AttributeSchema::new(name, AttributeType::String)
                .required()
                .force_new(),
        );
    }
    schema
        .attribute(
            AttributeSchema::new(
                "condition",
                AttributeType::enumeration(&["contains", "equals", "matches_regex"]),
            )
            .required(),
        )
        .attribute(
            AttributeSchema::new(
                "type",
                AttributeType::enumeration(&[
                    "body",
                    "header",
                    "hostname",
                    "path",
                    "query",
                    "sni_hostname",
                ]),
            )
            .required(),
        )
        .attribute(AttributeSchema::new("value", AttributeType::String).required())
        .attribute(
            AttributeSchema::new("field", AttributeType::String)
                .with_description("Required for header, query and body rules"),
        )
        .attribute(computed("rule", AttributeType::String))
        .attribute(computed("provisioning_status", AttributeType::String))
        .attribute(computed("href", AttributeType::String))
        .attribute(computed("created_at", AttributeType::String))
        .attribute(timeouts_attribute())
}

fn list_of_maps() -> AttributeType {
    AttributeType::List(Box::new(AttributeType::Map(Box::new(AttributeType::String))))
}

pub fn bare_metal_servers_schema() -> ResourceSchema {
    ResourceSchema::new(BARE_METAL_SERVERS)
        .with_description("Bare metal servers in the region")
        .attribute(AttributeSchema::new("name", name_type()))
        .attribute(AttributeSchema::new("vpc", AttributeType::String))
        .attribute(AttributeSchema::new("resource_group", AttributeType::String))
        .attribute(computed("bare_metal_servers", list_of_maps()))
}

pub fn network_interfaces_schema() -> ResourceSchema {
    ResourceSchema::new(BARE_METAL_SERVER_NETWORK_INTERFACES)
        .with_description("Network interfaces of a bare metal server")
        .attribute(AttributeSchema::new("bare_metal_server", AttributeType::String).required())
        .attribute(computed("network_interfaces", list_of_maps()))
}

pub fn floating_ips_schema() -> ResourceSchema {
    ResourceSchema::new(FLOATING_IPS)
        .with_description("Floating IPs in the region")
        .attribute(AttributeSchema::new("name", name_type()))
        .attribute(AttributeSchema::new("resource_group", AttributeType::String))
        .attribute(computed("floating_ips", list_of_maps()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_resource_types_are_unique_and_schemas_match() {
        let types = resource_types();
        let mut names: Vec<&str> = types.iter().map(|t| t.name()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), types.len());

        for t in &types {
            assert_eq!(t.schema().resource_type, t.name());
        }
    }

    #[test]
    fn test_data_sources_are_flagged() {
        assert!(resource_type(FLOATING_IPS).unwrap().is_data_source());
        assert!(
            !resource_type(VPN_GATEWAY_CONNECTION)
                .unwrap()
                .is_data_source()
        );
        assert!(resource_type("is_instance").is_none());
    }

    #[test]
    fn test_name_type() {
        let t = name_type();
        assert!(t.validate(&Value::from("my-conn-1")).is_ok());
        assert!(t.validate(&Value::from("a")).is_ok());
        assert!(t.validate(&Value::from("My-Conn")).is_err());
        assert!(t.validate(&Value::from("conn-")).is_err());
        assert!(t.validate(&Value::from("1conn")).is_err());
        assert!(t.validate(&Value::from("a".repeat(64))).is_err());
        assert!(t.validate(&Value::Int(1)).is_err());
    }

    #[test]
    fn test_vlan_id() {
        assert!(vlan_id().validate(&Value::Int(4094)).is_ok());
        assert!(vlan_id().validate(&Value::Int(0)).is_err());
        assert!(vlan_id().validate(&Value::Int(4095)).is_err());
    }

    #[test]
    fn test_vpn_connection_schema_defaults_and_required() {
        let schema = vpn_gateway_connection_schema();
        let mut attrs = HashMap::from([
            ("vpn_gateway".to_string(), Value::from("r006-gw")),
            ("name".to_string(), Value::from("conn")),
            ("peer_address".to_string(), Value::from("169.21.50.5")),
        ]);
        schema.apply_defaults(&mut attrs);
        assert_eq!(attrs.get("interval"), Some(&Value::Int(2)));
        assert_eq!(attrs.get("action"), Some(&Value::from("restart")));

        let errors = schema.validate(&attrs).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(
            errors[0].to_string(),
            "Required attribute 'preshared_key' is missing"
        );
    }

    #[test]
    fn test_computed_attributes_cannot_be_set() {
        let schema = lb_listener_policy_rule_schema();
        let attrs = HashMap::from([
            ("lb".to_string(), Value::from("lb")),
            ("listener".to_string(), Value::from("l")),
            ("policy".to_string(), Value::from("p")),
            ("condition".to_string(), Value::from("equals")),
            ("type".to_string(), Value::from("hostname")),
            ("value".to_string(), Value::from("example.com")),
            ("provisioning_status".to_string(), Value::from("active")),
        ]);
        let errors = schema.validate(&attrs).unwrap_err();
        assert!(errors[0].to_string().contains("provisioning_status"));
    }

    #[test]
    fn test_force_new_attributes() {
        assert_eq!(
            network_interface_floating_ip_schema().force_new_attributes(),
            vec!["bare_metal_server", "floating_ip", "network_interface"]
        );
    }
}

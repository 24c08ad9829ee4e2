//! Typed models of the VPC API objects the provider manages

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// References
// =============================================================================

/// Reference to another API object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reference {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crn: Option<String>,
}

/// Reference to an object identified by name only (zones, profiles)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NameReference {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
}

/// Identity used in request bodies
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
}

impl Identity {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

/// Reserved IP bound to a network interface
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReservedIpReference {
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusReason {
    pub code: String,
    pub message: String,
}

// =============================================================================
// Bare metal servers
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BareMetalServer {
    pub id: String,
    pub name: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bandwidth: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<NameReference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone: Option<NameReference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vpc: Option<Reference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_group: Option<Reference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_network_interface: Option<Reference>,
    #[serde(default)]
    pub network_interfaces: Vec<Reference>,
    #[serde(default)]
    pub status_reasons: Vec<StatusReason>,
}

/// Body of `POST /bare_metal_servers/{id}/stop`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopType {
    Hard,
    Soft,
}

impl StopType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StopType::Hard => "hard",
            StopType::Soft => "soft",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "hard" => Some(StopType::Hard),
            "soft" => Some(StopType::Soft),
            _ => None,
        }
    }
}

// =============================================================================
// Bare metal server network interfaces
// =============================================================================

/// Fields shared by every network interface type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkInterfaceCommon {
    pub id: String,
    pub name: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mac_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port_speed: Option<i64>,
    #[serde(default)]
    pub allow_ip_spoofing: bool,
    #[serde(default)]
    pub enable_infrastructure_nat: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_ip: Option<ReservedIpReference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subnet: Option<Reference>,
    #[serde(default)]
    pub security_groups: Vec<Reference>,
    #[serde(default)]
    pub floating_ips: Vec<FloatingIpReference>,
    /// `primary` or `secondary`
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

/// Network interface of a bare metal server, discriminated by `interface_type`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "interface_type", rename_all = "snake_case")]
pub enum BareMetalServerNetworkInterface {
    /// Physical interface; carries the VLANs it may accept
    Pci {
        #[serde(flatten)]
        common: NetworkInterfaceCommon,
        #[serde(default)]
        allowed_vlans: Vec<i64>,
    },
    /// Virtual interface bound to one VLAN tag on a PCI interface
    Vlan {
        #[serde(flatten)]
        common: NetworkInterfaceCommon,
        vlan: i64,
        #[serde(default)]
        allow_interface_to_float: bool,
    },
    /// s390x HiperSocket interface
    Hipersocket {
        #[serde(flatten)]
        common: NetworkInterfaceCommon,
    },
}

impl BareMetalServerNetworkInterface {
    pub fn common(&self) -> &NetworkInterfaceCommon {
        match self {
            Self::Pci { common, .. } | Self::Vlan { common, .. } | Self::Hipersocket { common } => {
                common
            }
        }
    }

    pub fn id(&self) -> &str {
        &self.common().id
    }

    pub fn status(&self) -> &str {
        &self.common().status
    }

    pub fn interface_type(&self) -> InterfaceType {
        match self {
            Self::Pci { .. } => InterfaceType::Pci,
            Self::Vlan { .. } => InterfaceType::Vlan,
            Self::Hipersocket { .. } => InterfaceType::Hipersocket,
        }
    }
}

/// Discriminant of [`BareMetalServerNetworkInterface`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterfaceType {
    Pci,
    Vlan,
    Hipersocket,
}

impl InterfaceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            InterfaceType::Pci => "pci",
            InterfaceType::Vlan => "vlan",
            InterfaceType::Hipersocket => "hipersocket",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pci" => Some(InterfaceType::Pci),
            "vlan" => Some(InterfaceType::Vlan),
            "hipersocket" => Some(InterfaceType::Hipersocket),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PrimaryIpPrototype {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_delete: Option<bool>,
}

/// Fields shared by every network interface prototype
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkInterfacePrototypeCommon {
    pub subnet: Identity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_ip_spoofing: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_infrastructure_nat: Option<bool>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub security_groups: Vec<Identity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_ip: Option<PrimaryIpPrototype>,
}

/// Body of `POST /bare_metal_servers/{id}/network_interfaces`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "interface_type", rename_all = "snake_case")]
pub enum NetworkInterfacePrototype {
    Pci {
        #[serde(flatten)]
        common: NetworkInterfacePrototypeCommon,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        allowed_vlans: Vec<i64>,
    },
    Vlan {
        #[serde(flatten)]
        common: NetworkInterfacePrototypeCommon,
        vlan: i64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        allow_interface_to_float: Option<bool>,
    },
    Hipersocket {
        #[serde(flatten)]
        common: NetworkInterfacePrototypeCommon,
    },
}

impl NetworkInterfacePrototype {
    pub fn interface_type(&self) -> InterfaceType {
        match self {
            Self::Pci { .. } => InterfaceType::Pci,
            Self::Vlan { .. } => InterfaceType::Vlan,
            Self::Hipersocket { .. } => InterfaceType::Hipersocket,
        }
    }
}

/// Body of `PATCH /bare_metal_servers/{id}/network_interfaces/{id}`
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NetworkInterfacePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow_ip_spoofing: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_infrastructure_nat: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_vlans: Option<Vec<i64>>,
}

impl NetworkInterfacePatch {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

// =============================================================================
// Floating IPs
// =============================================================================

/// Floating IP as listed on a network interface
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FloatingIpReference {
    pub id: String,
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crn: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FloatingIp {
    pub id: String,
    pub address: String,
    pub name: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone: Option<NameReference>,
    /// Network interface the floating IP is bound to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<Reference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_group: Option<Reference>,
}

// =============================================================================
// VPN gateway connections
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadPeerDetection {
    /// `clear`, `hold`, `none` or `restart`
    pub action: String,
    pub interval: i64,
    pub timeout: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VpnGatewayConnection {
    pub id: String,
    pub name: String,
    /// `up` or `down`
    pub status: String,
    pub peer_address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub psk: Option<String>,
    pub admin_state_up: bool,
    /// `policy` or `route`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authentication_mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dead_peer_detection: Option<DeadPeerDetection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ike_policy: Option<Reference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipsec_policy: Option<Reference>,
    #[serde(default)]
    pub local_cidrs: Vec<String>,
    #[serde(default)]
    pub peer_cidrs: Vec<String>,
}

/// Body of `POST /vpn_gateways/{id}/connections`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VpnGatewayConnectionPrototype {
    pub peer_address: String,
    pub psk: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin_state_up: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dead_peer_detection: Option<DeadPeerDetection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ike_policy: Option<Identity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ipsec_policy: Option<Identity>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub local_cidrs: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub peer_cidrs: Vec<String>,
}

/// Body of `PATCH /vpn_gateways/{id}/connections/{id}`
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct VpnGatewayConnectionPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub peer_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub psk: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin_state_up: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dead_peer_detection: Option<DeadPeerDetection>,
}

impl VpnGatewayConnectionPatch {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

// =============================================================================
// Load balancers
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadBalancer {
    pub id: String,
    pub name: String,
    pub provisioning_status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operating_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    #[serde(default)]
    pub is_public: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub listeners: Vec<Reference>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadBalancerListenerPolicyRule {
    pub id: String,
    /// `contains`, `equals` or `matches_regex`
    pub condition: String,
    /// `body`, `header`, `hostname`, `path`, `query` or `sni_hostname`
    #[serde(rename = "type")]
    pub rule_type: String,
    pub value: String,
    pub provisioning_status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

/// Body of `POST .../policies/{id}/rules`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadBalancerListenerPolicyRulePrototype {
    pub condition: String,
    #[serde(rename = "type")]
    pub rule_type: String,
    pub value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

/// Body of `PATCH .../policies/{id}/rules/{id}`
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LoadBalancerListenerPolicyRulePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub rule_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl LoadBalancerListenerPolicyRulePatch {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn nic_json(interface_type: &str) -> serde_json::Value {
        json!({
            "id": "0717-nic",
            "name": "eth1",
            "status": "available",
            "href": "https://us-south.iaas.cloud.ibm.com/v1/bare_metal_servers/s1/network_interfaces/0717-nic",
            "created_at": "2024-03-01T12:00:00Z",
            "mac_address": "02:00:04:00:C4:6A",
            "port_speed": 100000,
            "allow_ip_spoofing": false,
            "enable_infrastructure_nat": true,
            "primary_ip": {"address": "10.240.0.5", "id": "0717-ip"},
            "subnet": {"id": "0717-subnet", "name": "subnet-1"},
            "security_groups": [{"id": "r006-sg"}],
            "floating_ips": [],
            "type": "secondary",
            "interface_type": interface_type,
            "allowed_vlans": [100, 102],
            "vlan": 100,
            "allow_interface_to_float": true,
        })
    }

    #[test]
    fn test_nic_dispatches_on_interface_type() {
        let pci: BareMetalServerNetworkInterface =
            serde_json::from_value(nic_json("pci")).unwrap();
        match &pci {
            BareMetalServerNetworkInterface::Pci {
                common,
                allowed_vlans,
            } => {
                assert_eq!(common.id, "0717-nic");
                assert_eq!(allowed_vlans, &vec![100, 102]);
                assert_eq!(common.role.as_deref(), Some("secondary"));
                assert!(common.created_at.is_some());
            }
            other => panic!("Expected Pci, got {:?}", other),
        }

        let vlan: BareMetalServerNetworkInterface =
            serde_json::from_value(nic_json("vlan")).unwrap();
        match &vlan {
            BareMetalServerNetworkInterface::Vlan {
                vlan,
                allow_interface_to_float,
                ..
            } => {
                assert_eq!(*vlan, 100);
                assert!(*allow_interface_to_float);
            }
            other => panic!("Expected Vlan, got {:?}", other),
        }

        let hs: BareMetalServerNetworkInterface =
            serde_json::from_value(nic_json("hipersocket")).unwrap();
        assert_eq!(hs.interface_type(), InterfaceType::Hipersocket);
        assert_eq!(hs.status(), "available");
    }

    #[test]
    fn test_nic_unknown_interface_type_is_rejected() {
        let result = serde_json::from_value::<BareMetalServerNetworkInterface>(nic_json("sriov"));
        assert!(result.is_err());
    }

    #[test]
    fn test_nic_prototype_serialization() {
        let prototype = NetworkInterfacePrototype::Vlan {
            common: NetworkInterfacePrototypeCommon {
                subnet: Identity::new("0717-subnet"),
                name: Some("vlan-100".to_string()),
                allow_ip_spoofing: None,
                enable_infrastructure_nat: Some(true),
                security_groups: vec![],
                primary_ip: None,
            },
            vlan: 100,
            allow_interface_to_float: Some(false),
        };

        let body = serde_json::to_value(&prototype).unwrap();
        assert_eq!(
            body,
            json!({
                "interface_type": "vlan",
                "subnet": {"id": "0717-subnet"},
                "name": "vlan-100",
                "enable_infrastructure_nat": true,
                "vlan": 100,
                "allow_interface_to_float": false,
            })
        );
    }

    #[test]
    fn test_patch_skips_unset_fields() {
        let patch = VpnGatewayConnectionPatch {
            admin_state_up: Some(false),
            ..Default::default()
        };
        assert!(!patch.is_empty());
        assert_eq!(
            serde_json::to_value(&patch).unwrap(),
            json!({"admin_state_up": false})
        );
        assert!(VpnGatewayConnectionPatch::default().is_empty());
    }

    #[test]
    fn test_rule_type_field_is_renamed() {
        let rule: LoadBalancerListenerPolicyRule = serde_json::from_value(json!({
            "id": "r006-rule",
            "condition": "equals",
            "type": "header",
            "field": "x-env",
            "value": "prod",
            "provisioning_status": "active",
        }))
        .unwrap();
        assert_eq!(rule.rule_type, "header");
        assert_eq!(rule.field.as_deref(), Some("x-env"));
    }
}

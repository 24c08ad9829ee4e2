//! Conversion between API models and resource attributes

use std::collections::HashMap;

use ibmvpc_core::resource::Value;
use serde_json::json;

use crate::models::{
    BareMetalServer, BareMetalServerNetworkInterface, FloatingIp,
    LoadBalancerListenerPolicyRule, Reference, VpnGatewayConnection,
};

/// Convert JSON value to attribute Value
///
/// `null` yields `None`; null fields of objects are dropped.
pub fn json_to_value(value: &serde_json::Value) -> Option<Value> {
    match value {
        serde_json::Value::String(s) => Some(Value::String(s.clone())),
        serde_json::Value::Bool(b) => Some(Value::Bool(*b)),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(Value::Int(i))
            } else {
                n.as_f64().map(|f| Value::Int(f as i64))
            }
        }
        serde_json::Value::Array(arr) => {
            let items: Vec<Value> = arr.iter().filter_map(json_to_value).collect();
            Some(Value::List(items))
        }
        serde_json::Value::Object(obj) => {
            let map: HashMap<String, Value> = obj
                .iter()
                .filter_map(|(k, v)| json_to_value(v).map(|v| (k.clone(), v)))
                .collect();
            Some(Value::Map(map))
        }
        serde_json::Value::Null => None,
    }
}

/// Convert attribute Value to JSON value
pub fn value_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::String(s) => json!(s),
        Value::Bool(b) => json!(b),
        Value::Int(i) => json!(i),
        Value::List(items) => serde_json::Value::Array(items.iter().map(value_to_json).collect()),
        Value::Map(map) => serde_json::Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), value_to_json(v)))
                .collect(),
        ),
    }
}

/// Attribute map under construction; `None` values are skipped
#[derive(Default)]
struct Attributes(HashMap<String, Value>);

impl Attributes {
    fn set(&mut self, key: &str, value: impl Into<Value>) -> &mut Self {
        self.0.insert(key.to_string(), value.into());
        self
    }

    fn opt<V: Into<Value>>(&mut self, key: &str, value: Option<V>) -> &mut Self {
        if let Some(v) = value {
            self.set(key, v);
        }
        self
    }

    fn strings(&mut self, key: &str, values: &[String]) -> &mut Self {
        self.set(
            key,
            Value::List(values.iter().map(|v| Value::String(v.clone())).collect()),
        )
    }

    fn ids(&mut self, key: &str, refs: &[Reference]) -> &mut Self {
        self.set(
            key,
            Value::List(refs.iter().map(|r| Value::String(r.id.clone())).collect()),
        )
    }

    fn build(&mut self) -> HashMap<String, Value> {
        std::mem::take(&mut self.0)
    }
}

pub fn bare_metal_server_to_map(server: &BareMetalServer) -> HashMap<String, Value> {
    let mut attrs = Attributes::default();
    attrs
        .set("id", server.id.as_str())
        .set("name", server.name.as_str())
        .set("status", server.status.as_str())
        .opt("crn", server.crn.clone())
        .opt("href", server.href.clone())
        .opt("created_at", server.created_at.map(|t| t.to_rfc3339()))
        .opt("bandwidth", server.bandwidth)
        .opt("memory", server.memory)
        .opt("profile", server.profile.as_ref().map(|p| p.name.clone()))
        .opt("zone", server.zone.as_ref().map(|z| z.name.clone()))
        .opt("vpc", server.vpc.as_ref().map(|v| v.id.clone()))
        .opt(
            "resource_group",
            server.resource_group.as_ref().map(|r| r.id.clone()),
        )
        .opt(
            "primary_network_interface",
            server.primary_network_interface.as_ref().map(|n| n.id.clone()),
        )
        .ids("network_interfaces", &server.network_interfaces);
    if !server.status_reasons.is_empty() {
        let reasons = server
            .status_reasons
            .iter()
            .map(|r| {
                Value::Map(HashMap::from([
                    ("code".to_string(), Value::String(r.code.clone())),
                    ("message".to_string(), Value::String(r.message.clone())),
                ]))
            })
            .collect();
        attrs.set("status_reasons", Value::List(reasons));
    }
    attrs.build()
}

pub fn network_interface_to_map(nic: &BareMetalServerNetworkInterface) -> HashMap<String, Value> {
    let common = nic.common();
    let mut attrs = Attributes::default();
    attrs
        .set("network_interface", common.id.as_str())
        .set("name", common.name.as_str())
        .set("status", common.status.as_str())
        .set("interface_type", nic.interface_type().as_str())
        .set("allow_ip_spoofing", common.allow_ip_spoofing)
        .set("enable_infrastructure_nat", common.enable_infrastructure_nat)
        .opt("href", common.href.clone())
        .opt("created_at", common.created_at.map(|t| t.to_rfc3339()))
        .opt("mac_address", common.mac_address.clone())
        .opt("port_speed", common.port_speed)
        .opt("type", common.role.clone())
        .opt("subnet", common.subnet.as_ref().map(|s| s.id.clone()))
        .ids("security_groups", &common.security_groups);

    if let Some(ip) = &common.primary_ip {
        let mut primary_ip = Attributes::default();
        primary_ip
            .set("address", ip.address.as_str())
            .opt("reserved_ip", ip.id.clone())
            .opt("name", ip.name.clone());
        attrs.set("primary_ip", Value::Map(primary_ip.build()));
    }

    let floating_ips = common
        .floating_ips
        .iter()
        .map(|f| {
            Value::Map(HashMap::from([
                ("id".to_string(), Value::String(f.id.clone())),
                ("address".to_string(), Value::String(f.address.clone())),
            ]))
        })
        .collect();
    attrs.set("floating_ips", Value::List(floating_ips));

    match nic {
        BareMetalServerNetworkInterface::Pci { allowed_vlans, .. } => {
            attrs.set(
                "allowed_vlans",
                Value::List(allowed_vlans.iter().map(|v| Value::Int(*v)).collect()),
            );
        }
        BareMetalServerNetworkInterface::Vlan {
            vlan,
            allow_interface_to_float,
            ..
        } => {
            attrs
                .set("vlan", *vlan)
                .set("allow_interface_to_float", *allow_interface_to_float);
        }
        BareMetalServerNetworkInterface::Hipersocket { .. } => {}
    }
    attrs.build()
}

pub fn floating_ip_to_map(fip: &FloatingIp) -> HashMap<String, Value> {
    let mut attrs = Attributes::default();
    attrs
        .set("floating_ip", fip.id.as_str())
        .set("address", fip.address.as_str())
        .set("name", fip.name.as_str())
        .set("status", fip.status.as_str())
        .opt("crn", fip.crn.clone())
        .opt("href", fip.href.clone())
        .opt("created_at", fip.created_at.map(|t| t.to_rfc3339()))
        .opt("zone", fip.zone.as_ref().map(|z| z.name.clone()))
        .opt("target", fip.target.as_ref().map(|t| t.id.clone()))
        .opt(
            "resource_group",
            fip.resource_group.as_ref().map(|r| r.id.clone()),
        );
    attrs.build()
}

pub fn vpn_gateway_connection_to_map(conn: &VpnGatewayConnection) -> HashMap<String, Value> {
    let mut attrs = Attributes::default();
    attrs
        .set("gateway_connection", conn.id.as_str())
        .set("name", conn.name.as_str())
        .set("status", conn.status.as_str())
        .set("peer_address", conn.peer_address.as_str())
        .set("admin_state_up", conn.admin_state_up)
        .opt("preshared_key", conn.psk.clone())
        .opt("mode", conn.mode.clone())
        .opt("authentication_mode", conn.authentication_mode.clone())
        .opt("href", conn.href.clone())
        .opt("created_at", conn.created_at.map(|t| t.to_rfc3339()))
        .opt("ike_policy", conn.ike_policy.as_ref().map(|p| p.id.clone()))
        .opt(
            "ipsec_policy",
            conn.ipsec_policy.as_ref().map(|p| p.id.clone()),
        )
        .strings("local_cidrs", &conn.local_cidrs)
        .strings("peer_cidrs", &conn.peer_cidrs);
    if let Some(dpd) = &conn.dead_peer_detection {
        attrs
            .set("action", dpd.action.as_str())
            .set("interval", dpd.interval)
            .set("timeout", dpd.timeout);
    }
    attrs.build()
}

pub fn load_balancer_listener_policy_rule_to_map(
    rule: &LoadBalancerListenerPolicyRule,
) -> HashMap<String, Value> {
    let mut attrs = Attributes::default();
    attrs
        .set("rule", rule.id.as_str())
        .set("condition", rule.condition.as_str())
        .set("type", rule.rule_type.as_str())
        .set("value", rule.value.as_str())
        .set("provisioning_status", rule.provisioning_status.as_str())
        .opt("field", rule.field.clone())
        .opt("href", rule.href.clone())
        .opt("created_at", rule.created_at.map(|t| t.to_rfc3339()));
    attrs.build()
}

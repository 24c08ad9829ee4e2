//! Client - Typed accessors for the VPC API
//!
//! One method per remote call. Methods return [`ApiError`] unchanged;
//! callers decide whether a 404 is an error.

use std::sync::Arc;

use log::debug;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{ApiError, ApiResult};
use crate::models::{
    BareMetalServer, BareMetalServerNetworkInterface, FloatingIp, LoadBalancer,
    LoadBalancerListenerPolicyRule, LoadBalancerListenerPolicyRulePatch,
    LoadBalancerListenerPolicyRulePrototype, NetworkInterfacePatch, NetworkInterfacePrototype,
    StopType, VpnGatewayConnection, VpnGatewayConnectionPatch, VpnGatewayConnectionPrototype,
};
use crate::transport::{ApiRequest, Transport};

/// Page size requested from list endpoints
pub const PAGE_LIMIT: u32 = 50;

/// Typed client over a [`Transport`]
#[derive(Clone)]
pub struct VpcClient {
    transport: Arc<dyn Transport>,
}

impl VpcClient {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    async fn call<T: DeserializeOwned>(&self, request: ApiRequest) -> ApiResult<T> {
        let body = self
            .transport
            .send(request)
            .await?
            .ok_or_else(|| ApiError::Decode("empty response body".to_string()))?;
        serde_json::from_value(body).map_err(|e| ApiError::Decode(e.to_string()))
    }

    async fn call_empty(&self, request: ApiRequest) -> ApiResult<()> {
        self.transport.send(request).await.map(|_| ())
    }

    /// Fetch every page of a collection
    ///
    /// Follows the `start` token of `next.href` until the API stops
    /// returning one and concatenates the `collection` arrays.
    pub async fn list_all<T: DeserializeOwned>(
        &self,
        path: &str,
        collection: &str,
        filters: &[(String, String)],
    ) -> ApiResult<Vec<T>> {
        let mut items = Vec::new();
        let mut start: Option<String> = None;

        loop {
            let mut request = ApiRequest::get(path).with_query("limit", PAGE_LIMIT.to_string());
            for (key, value) in filters {
                request = request.with_query(key.as_str(), value.as_str());
            }
            if let Some(token) = &start {
                request = request.with_query("start", token.as_str());
            }

            let page = self
                .transport
                .send(request)
                .await?
                .ok_or_else(|| ApiError::Decode(format!("empty page for {}", path)))?;

            let entries = page
                .get(collection)
                .cloned()
                .unwrap_or_else(|| serde_json::Value::Array(Vec::new()));
            let mut page_items: Vec<T> =
                serde_json::from_value(entries).map_err(|e| ApiError::Decode(e.to_string()))?;
            debug!("{}: fetched {} {}", path, page_items.len(), collection);
            items.append(&mut page_items);

            let next = page
                .get("next")
                .and_then(|n| n.get("href"))
                .and_then(|h| h.as_str())
                .and_then(start_from_href);
            match next {
                Some(token) if start.as_deref() == Some(token.as_str()) => {
                    return Err(ApiError::Decode(format!(
                        "pagination of {} did not advance past start '{}'",
                        path, token
                    )));
                }
                Some(token) => start = Some(token),
                None => return Ok(items),
            }
        }
    }

    // =========================================================================
    // Bare metal servers
    // =========================================================================

    pub async fn get_bare_metal_server(&self, id: &str) -> ApiResult<BareMetalServer> {
        self.call(ApiRequest::get(format!("/bare_metal_servers/{}", id)))
            .await
    }

    pub async fn list_bare_metal_servers(
        &self,
        filters: &[(String, String)],
    ) -> ApiResult<Vec<BareMetalServer>> {
        self.list_all("/bare_metal_servers", "bare_metal_servers", filters)
            .await
    }

    pub async fn start_bare_metal_server(&self, id: &str) -> ApiResult<()> {
        self.call_empty(ApiRequest::post(format!("/bare_metal_servers/{}/start", id)))
            .await
    }

    pub async fn stop_bare_metal_server(&self, id: &str, stop_type: StopType) -> ApiResult<()> {
        let request = ApiRequest::post(format!("/bare_metal_servers/{}/stop", id))
            .with_body(serde_json::json!({ "type": stop_type.as_str() }));
        self.call_empty(request).await
    }

    pub async fn restart_bare_metal_server(&self, id: &str) -> ApiResult<()> {
        self.call_empty(ApiRequest::post(format!(
            "/bare_metal_servers/{}/restart",
            id
        )))
        .await
    }

    // =========================================================================
    // Bare metal server network interfaces
    // =========================================================================

    pub async fn get_bare_metal_server_network_interface(
        &self,
        server_id: &str,
        nic_id: &str,
    ) -> ApiResult<BareMetalServerNetworkInterface> {
        self.call(ApiRequest::get(nic_path(server_id, nic_id))).await
    }

    pub async fn list_bare_metal_server_network_interfaces(
        &self,
        server_id: &str,
    ) -> ApiResult<Vec<BareMetalServerNetworkInterface>> {
        self.list_all(
            &format!("/bare_metal_servers/{}/network_interfaces", server_id),
            "network_interfaces",
            &[],
        )
        .await
    }

    pub async fn create_bare_metal_server_network_interface(
        &self,
        server_id: &str,
        prototype: &NetworkInterfacePrototype,
    ) -> ApiResult<BareMetalServerNetworkInterface> {
        let request =
            ApiRequest::post(format!("/bare_metal_servers/{}/network_interfaces", server_id))
                .with_body(encode(prototype)?);
        self.call(request).await
    }

    pub async fn update_bare_metal_server_network_interface(
        &self,
        server_id: &str,
        nic_id: &str,
        patch: &NetworkInterfacePatch,
    ) -> ApiResult<BareMetalServerNetworkInterface> {
        let request = ApiRequest::patch(nic_path(server_id, nic_id)).with_body(encode(patch)?);
        self.call(request).await
    }

    pub async fn delete_bare_metal_server_network_interface(
        &self,
        server_id: &str,
        nic_id: &str,
    ) -> ApiResult<()> {
        self.call_empty(ApiRequest::delete(nic_path(server_id, nic_id)))
            .await
    }

    pub async fn get_bare_metal_server_network_interface_floating_ip(
        &self,
        server_id: &str,
        nic_id: &str,
        floating_ip_id: &str,
    ) -> ApiResult<FloatingIp> {
        self.call(ApiRequest::get(nic_floating_ip_path(
            server_id,
            nic_id,
            floating_ip_id,
        )))
        .await
    }

    pub async fn add_bare_metal_server_network_interface_floating_ip(
        &self,
        server_id: &str,
        nic_id: &str,
        floating_ip_id: &str,
    ) -> ApiResult<FloatingIp> {
        self.call(ApiRequest::put(nic_floating_ip_path(
            server_id,
            nic_id,
            floating_ip_id,
        )))
        .await
    }

    pub async fn remove_bare_metal_server_network_interface_floating_ip(
        &self,
        server_id: &str,
        nic_id: &str,
        floating_ip_id: &str,
    ) -> ApiResult<()> {
        self.call_empty(ApiRequest::delete(nic_floating_ip_path(
            server_id,
            nic_id,
            floating_ip_id,
        )))
        .await
    }

    // =========================================================================
    // Floating IPs
    // =========================================================================

    pub async fn get_floating_ip(&self, id: &str) -> ApiResult<FloatingIp> {
        self.call(ApiRequest::get(format!("/floating_ips/{}", id)))
            .await
    }

    pub async fn list_floating_ips(
        &self,
        filters: &[(String, String)],
    ) -> ApiResult<Vec<FloatingIp>> {
        self.list_all("/floating_ips", "floating_ips", filters).await
    }

    // =========================================================================
    // VPN gateway connections
    // =========================================================================

    pub async fn get_vpn_gateway_connection(
        &self,
        gateway_id: &str,
        connection_id: &str,
    ) -> ApiResult<VpnGatewayConnection> {
        self.call(ApiRequest::get(vpn_connection_path(gateway_id, connection_id)))
            .await
    }

    pub async fn create_vpn_gateway_connection(
        &self,
        gateway_id: &str,
        prototype: &VpnGatewayConnectionPrototype,
    ) -> ApiResult<VpnGatewayConnection> {
        let request = ApiRequest::post(format!("/vpn_gateways/{}/connections", gateway_id))
            .with_body(encode(prototype)?);
        self.call(request).await
    }

    pub async fn update_vpn_gateway_connection(
        &self,
        gateway_id: &str,
        connection_id: &str,
        patch: &VpnGatewayConnectionPatch,
    ) -> ApiResult<VpnGatewayConnection> {
        let request = ApiRequest::patch(vpn_connection_path(gateway_id, connection_id))
            .with_body(encode(patch)?);
        self.call(request).await
    }

    pub async fn delete_vpn_gateway_connection(
        &self,
        gateway_id: &str,
        connection_id: &str,
    ) -> ApiResult<()> {
        self.call_empty(ApiRequest::delete(vpn_connection_path(
            gateway_id,
            connection_id,
        )))
        .await
    }

    // =========================================================================
    // Load balancers
    // =========================================================================

    pub async fn get_load_balancer(&self, id: &str) -> ApiResult<LoadBalancer> {
        self.call(ApiRequest::get(format!("/load_balancers/{}", id)))
            .await
    }

    pub async fn get_load_balancer_listener_policy_rule(
        &self,
        rule: &RulePath<'_>,
    ) -> ApiResult<LoadBalancerListenerPolicyRule> {
        self.call(ApiRequest::get(rule.rule())).await
    }

    pub async fn create_load_balancer_listener_policy_rule(
        &self,
        rule: &RulePath<'_>,
        prototype: &LoadBalancerListenerPolicyRulePrototype,
    ) -> ApiResult<LoadBalancerListenerPolicyRule> {
        let request = ApiRequest::post(rule.collection()).with_body(encode(prototype)?);
        self.call(request).await
    }

    pub async fn update_load_balancer_listener_policy_rule(
        &self,
        rule: &RulePath<'_>,
        patch: &LoadBalancerListenerPolicyRulePatch,
    ) -> ApiResult<LoadBalancerListenerPolicyRule> {
        let request = ApiRequest::patch(rule.rule()).with_body(encode(patch)?);
        self.call(request).await
    }

    pub async fn delete_load_balancer_listener_policy_rule(
        &self,
        rule: &RulePath<'_>,
    ) -> ApiResult<()> {
        self.call_empty(ApiRequest::delete(rule.rule())).await
    }
}

/// Location of a listener policy rule
///
/// `rule_id` is empty when addressing the policy's rule collection.
#[derive(Debug, Clone, Copy)]
pub struct RulePath<'a> {
    pub load_balancer_id: &'a str,
    pub listener_id: &'a str,
    pub policy_id: &'a str,
    pub rule_id: &'a str,
}

impl RulePath<'_> {
    pub fn collection(&self) -> String {
        format!(
            "/load_balancers/{}/listeners/{}/policies/{}/rules",
            self.load_balancer_id, self.listener_id, self.policy_id
        )
    }

    pub fn rule(&self) -> String {
        format!("{}/{}", self.collection(), self.rule_id)
    }
}

fn nic_path(server_id: &str, nic_id: &str) -> String {
    format!(
        "/bare_metal_servers/{}/network_interfaces/{}",
        server_id, nic_id
    )
}

fn nic_floating_ip_path(server_id: &str, nic_id: &str, floating_ip_id: &str) -> String {
    format!(
        "{}/floating_ips/{}",
        nic_path(server_id, nic_id),
        floating_ip_id
    )
}

fn vpn_connection_path(gateway_id: &str, connection_id: &str) -> String {
    format!("/vpn_gateways/{}/connections/{}", gateway_id, connection_id)
}

fn encode<T: Serialize>(body: &T) -> ApiResult<serde_json::Value> {
    serde_json::to_value(body).map_err(|e| ApiError::Encode(e.to_string()))
}

/// Extract the `start` query parameter of a pagination href
fn start_from_href(href: &str) -> Option<String> {
    let url = reqwest::Url::parse(href).ok()?;
    url.query_pairs()
        .find(|(key, _)| key == "start")
        .map(|(_, value)| value.into_owned())
}

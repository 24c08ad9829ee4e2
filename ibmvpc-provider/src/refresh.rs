//! Refresh functions
//!
//! Each function performs exactly one GET and reports the object together
//! with the status label waiters match on. A 404 is not an error: the
//! object is reported gone with the `deleted` label. Every other failure
//! is returned as an error and ends the poll.

use ibmvpc_core::provider::ProviderResult;
use ibmvpc_core::wait::Observation;

use crate::client::{RulePath, VpcClient};
use crate::error::{ApiResult, NotFoundExt};
use crate::models::{
    BareMetalServer, BareMetalServerNetworkInterface, FloatingIp, LoadBalancer,
    LoadBalancerListenerPolicyRule, VpnGatewayConnection,
};
use crate::status;

fn observe<T>(
    result: ApiResult<T>,
    label: impl FnOnce(&T) -> String,
    context: impl FnOnce() -> String,
) -> ProviderResult<Observation<T>> {
    match result.optional() {
        Ok(Some(object)) => {
            let status = label(&object);
            Ok(Observation::new(object, status))
        }
        Ok(None) => Ok(Observation::gone(status::DELETED)),
        Err(e) => Err(e.context(context())),
    }
}

pub async fn bare_metal_server(
    client: &VpcClient,
    id: &str,
) -> ProviderResult<Observation<BareMetalServer>> {
    observe(
        client.get_bare_metal_server(id).await,
        |server| server.status.clone(),
        || format!("Error getting bare metal server ({})", id),
    )
}

pub async fn bare_metal_server_network_interface(
    client: &VpcClient,
    server_id: &str,
    nic_id: &str,
) -> ProviderResult<Observation<BareMetalServerNetworkInterface>> {
    observe(
        client
            .get_bare_metal_server_network_interface(server_id, nic_id)
            .await,
        |nic| nic.status().to_string(),
        || {
            format!(
                "Error getting bare metal server ({}) network interface ({})",
                server_id, nic_id
            )
        },
    )
}

pub async fn bare_metal_server_network_interface_floating_ip(
    client: &VpcClient,
    server_id: &str,
    nic_id: &str,
    floating_ip_id: &str,
) -> ProviderResult<Observation<FloatingIp>> {
    observe(
        client
            .get_bare_metal_server_network_interface_floating_ip(server_id, nic_id, floating_ip_id)
            .await,
        |fip| fip.status.clone(),
        || {
            format!(
                "Error getting floating IP ({}) on bare metal server ({}) network interface ({})",
                floating_ip_id, server_id, nic_id
            )
        },
    )
}

pub async fn floating_ip(client: &VpcClient, id: &str) -> ProviderResult<Observation<FloatingIp>> {
    observe(
        client.get_floating_ip(id).await,
        |fip| fip.status.clone(),
        || format!("Error getting floating IP ({})", id),
    )
}

/// Folds `up`/`down` into `done`; any other remote status reads as `provisioning`
pub async fn vpn_gateway_connection(
    client: &VpcClient,
    gateway_id: &str,
    connection_id: &str,
) -> ProviderResult<Observation<VpnGatewayConnection>> {
    observe(
        client
            .get_vpn_gateway_connection(gateway_id, connection_id)
            .await,
        |conn| status::vpn_gateway_connection::label(&conn.status).to_string(),
        || {
            format!(
                "Error getting VPN gateway ({}) connection ({})",
                gateway_id, connection_id
            )
        },
    )
}

/// Reports `deleting` for as long as the connection can still be fetched
pub async fn vpn_gateway_connection_deleting(
    client: &VpcClient,
    gateway_id: &str,
    connection_id: &str,
) -> ProviderResult<Observation<VpnGatewayConnection>> {
    observe(
        client
            .get_vpn_gateway_connection(gateway_id, connection_id)
            .await,
        |_| status::vpn_gateway_connection::DELETING.to_string(),
        || {
            format!(
                "Error getting VPN gateway ({}) connection ({})",
                gateway_id, connection_id
            )
        },
    )
}

pub async fn load_balancer(client: &VpcClient, id: &str) -> ProviderResult<Observation<LoadBalancer>> {
    observe(
        client.get_load_balancer(id).await,
        |lb| lb.provisioning_status.clone(),
        || format!("Error getting load balancer ({})", id),
    )
}

pub async fn load_balancer_listener_policy_rule(
    client: &VpcClient,
    rule: &RulePath<'_>,
) -> ProviderResult<Observation<LoadBalancerListenerPolicyRule>> {
    observe(
        client.get_load_balancer_listener_policy_rule(rule).await,
        |r| r.provisioning_status.clone(),
        || format!("Error getting load balancer listener policy rule ({})", rule.rule()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ApiError;
    use crate::testing::ScriptedTransport;
    use crate::transport::Method;
    use serde_json::json;

    const NIC_PATH: &str = "/bare_metal_servers/s1/network_interfaces/n1";

    #[tokio::test]
    async fn test_not_found_maps_to_deleted() {
        let transport = ScriptedTransport::new();
        transport.not_found(Method::Get, NIC_PATH);
        let client = VpcClient::new(transport.clone());

        let observation = bare_metal_server_network_interface(&client, "s1", "n1")
            .await
            .unwrap();
        assert!(observation.object.is_none());
        assert_eq!(observation.status, "deleted");
        assert_eq!(transport.count(Method::Get, NIC_PATH), 1);
    }

    #[tokio::test]
    async fn test_other_errors_are_returned_with_context() {
        let transport = ScriptedTransport::new();
        transport.fail(Method::Get, NIC_PATH, 500);
        let client = VpcClient::new(transport);

        let err = bare_metal_server_network_interface(&client, "s1", "n1")
            .await
            .unwrap_err();
        assert!(
            err.message
                .starts_with("Error getting bare metal server (s1) network interface (n1): ")
        );
        assert_eq!(err.cause_as::<ApiError>().and_then(ApiError::status_code), Some(500));
    }

    #[tokio::test]
    async fn test_status_is_reported_verbatim() {
        let transport = ScriptedTransport::new();
        transport.ok(
            Method::Get,
            "/bare_metal_servers/s1",
            json!({"id": "s1", "name": "bms", "status": "stopping"}),
        );
        let client = VpcClient::new(transport);

        let observation = bare_metal_server(&client, "s1").await.unwrap();
        assert_eq!(observation.status, "stopping");
        assert_eq!(observation.object.unwrap().id, "s1");
    }

    #[tokio::test]
    async fn test_vpn_connection_label() {
        let transport = ScriptedTransport::new();
        transport
            .ok(
                Method::Get,
                "/vpn_gateways/gw/connections/c1",
                json!({"id": "c1", "name": "conn", "status": "pending", "peer_address": "169.21.50.5", "admin_state_up": true}),
            )
            .ok(
                Method::Get,
                "/vpn_gateways/gw/connections/c1",
                json!({"id": "c1", "name": "conn", "status": "down", "peer_address": "169.21.50.5", "admin_state_up": true}),
            );
        let client = VpcClient::new(transport);

        let first = vpn_gateway_connection(&client, "gw", "c1").await.unwrap();
        assert_eq!(first.status, "provisioning");
        let second = vpn_gateway_connection(&client, "gw", "c1").await.unwrap();
        assert_eq!(second.status, "done");
        assert_eq!(second.object.unwrap().status, "down");
    }

    #[tokio::test]
    async fn test_load_balancer_uses_provisioning_status() {
        let transport = ScriptedTransport::new();
        transport.ok(
            Method::Get,
            "/load_balancers/lb",
            json!({"id": "lb", "name": "lb", "provisioning_status": "update_pending", "operating_status": "online"}),
        );
        let client = VpcClient::new(transport);

        let observation = load_balancer(&client, "lb").await.unwrap();
        assert_eq!(observation.status, "update_pending");
    }

    #[tokio::test]
    async fn test_floating_ip_states() {
        let transport = ScriptedTransport::new();
        transport
            .ok(
                Method::Get,
                "/floating_ips/fip1",
                json!({"id": "fip1", "address": "169.61.10.4", "name": "edge", "status": "pending"}),
            )
            .not_found(Method::Get, "/floating_ips/fip1");
        let client = VpcClient::new(transport);

        let first = floating_ip(&client, "fip1").await.unwrap();
        assert_eq!(first.status, "pending");
        let second = floating_ip(&client, "fip1").await.unwrap();
        assert!(second.object.is_none());
        assert_eq!(second.status, "deleted");
    }

    #[tokio::test]
    async fn test_vpn_connection_label_while_deleting() {
        let transport = ScriptedTransport::new();
        transport
            .ok(
                Method::Get,
                "/vpn_gateways/gw/connections/c1",
                json!({"id": "c1", "name": "conn", "status": "up", "peer_address": "169.21.50.5", "admin_state_up": true}),
            )
            .not_found(Method::Get, "/vpn_gateways/gw/connections/c1");
        let client = VpcClient::new(transport);

        let first = vpn_gateway_connection_deleting(&client, "gw", "c1").await.unwrap();
        assert!(status::vpn_gateway_connection::DELETE_PENDING.contains(&first.status.as_str()));
        let second = vpn_gateway_connection_deleting(&client, "gw", "c1").await.unwrap();
        assert!(status::vpn_gateway_connection::DELETE_TARGET.contains(&second.status.as_str()));
    }
}

//! VPN gateway connections

use ibmvpc_core::provider::ProviderResult;
use ibmvpc_core::resource::{CompoundId, Resource, ResourceId, State, Value, join_id};
use log::info;

use crate::convert::vpn_gateway_connection_to_map;
use crate::error::NotFoundExt;
use crate::models::{
    DeadPeerDetection, Identity, VpnGatewayConnection, VpnGatewayConnectionPatch,
    VpnGatewayConnectionPrototype,
};
use crate::provider::{IbmVpcProvider, carry_over, changed, optional_string, required_str, string_list};
use crate::waiters;

const ID_PARTS: [&str; 2] = ["vpn_gateway", "gateway_connection"];

fn dead_peer_detection(resource: &Resource) -> DeadPeerDetection {
    DeadPeerDetection {
        action: resource.get_str("action").unwrap_or("restart").to_string(),
        interval: resource.get_int("interval").unwrap_or(2),
        timeout: resource.get_int("timeout").unwrap_or(10),
    }
}

fn connection_state(id: ResourceId, gateway_id: &str, conn: &VpnGatewayConnection) -> State {
    let mut attributes = vpn_gateway_connection_to_map(conn);
    attributes.insert(
        "vpn_gateway".to_string(),
        Value::String(gateway_id.to_string()),
    );
    State::existing(id, attributes).with_identifier(join_id(&[gateway_id, &conn.id]))
}

impl IbmVpcProvider {
    pub(crate) async fn read_vpn_gateway_connection(
        &self,
        id: &ResourceId,
        identifier: &str,
    ) -> ProviderResult<State> {
        let [gateway_id, connection_id] = CompoundId::split(identifier, ID_PARTS)?;
        let conn = self
            .client
            .get_vpn_gateway_connection(&gateway_id, &connection_id)
            .await
            .optional()
            .map_err(|e| {
                e.context(format!(
                    "Error getting VPN gateway ({}) connection ({})",
                    gateway_id, connection_id
                ))
            })?;

        Ok(match conn {
            Some(conn) => connection_state(id.clone(), &gateway_id, &conn),
            None => State::not_found(id.clone()),
        })
    }

    pub(crate) async fn create_vpn_gateway_connection(
        &self,
        resource: &Resource,
    ) -> ProviderResult<State> {
        let gateway_id = required_str(resource, "vpn_gateway")?;
        let prototype = VpnGatewayConnectionPrototype {
            peer_address: required_str(resource, "peer_address")?.to_string(),
            psk: required_str(resource, "preshared_key")?.to_string(),
            name: optional_string(resource, "name"),
            admin_state_up: resource.get_bool("admin_state_up"),
            dead_peer_detection: Some(dead_peer_detection(resource)),
            ike_policy: resource.get_str("ike_policy").map(Identity::new),
            ipsec_policy: resource.get_str("ipsec_policy").map(Identity::new),
            local_cidrs: string_list(resource, "local_cidrs"),
            peer_cidrs: string_list(resource, "peer_cidrs"),
        };

        let created = self
            .client
            .create_vpn_gateway_connection(gateway_id, &prototype)
            .await
            .map_err(|e| {
                e.context(format!(
                    "Error creating connection on VPN gateway ({})",
                    gateway_id
                ))
            })?;
        info!(
            "Created connection ({}) on VPN gateway ({})",
            created.id, gateway_id
        );

        let timeout = self.timeouts_for(resource).create;
        let conn = waiters::vpn_gateway_connection_available(
            &self.client,
            &self.poll,
            gateway_id,
            &created.id,
            timeout,
        )
        .await?;

        let mut state = connection_state(resource.id.clone(), gateway_id, &conn);
        carry_over(&mut state.attributes, resource, &["preshared_key"]);
        Ok(state)
    }

    pub(crate) async fn update_vpn_gateway_connection(
        &self,
        identifier: &str,
        from: &State,
        to: &Resource,
    ) -> ProviderResult<State> {
        let [gateway_id, connection_id] = CompoundId::split(identifier, ID_PARTS)?;

        let mut patch = VpnGatewayConnectionPatch::default();
        if changed(from, to, "name") {
            patch.name = optional_string(to, "name");
        }
        if changed(from, to, "peer_address") {
            patch.peer_address = optional_string(to, "peer_address");
        }
        if changed(from, to, "preshared_key") {
            patch.psk = optional_string(to, "preshared_key");
        }
        if changed(from, to, "admin_state_up") {
            patch.admin_state_up = to.get_bool("admin_state_up");
        }
        if ["action", "interval", "timeout"]
            .iter()
            .any(|key| changed(from, to, key))
        {
            patch.dead_peer_detection = Some(dead_peer_detection(to));
        }

        let conn = if patch.is_empty() {
            self.client
                .get_vpn_gateway_connection(&gateway_id, &connection_id)
                .await
                .map_err(|e| {
                    e.context(format!(
                        "Error getting VPN gateway ({}) connection ({})",
                        gateway_id, connection_id
                    ))
                })?
        } else {
            self.client
                .update_vpn_gateway_connection(&gateway_id, &connection_id, &patch)
                .await
                .map_err(|e| {
                    e.context(format!(
                        "Error updating VPN gateway ({}) connection ({})",
                        gateway_id, connection_id
                    ))
                })?;
            let timeout = self.timeouts_for(to).update;
            waiters::vpn_gateway_connection_available(
                &self.client,
                &self.poll,
                &gateway_id,
                &connection_id,
                timeout,
            )
            .await?
        };

        let mut state = connection_state(to.id.clone(), &gateway_id, &conn);
        carry_over(&mut state.attributes, to, &["preshared_key"]);
        Ok(state)
    }

    pub(crate) async fn delete_vpn_gateway_connection(
        &self,
        identifier: &str,
        resource: &Resource,
    ) -> ProviderResult<()> {
        let [gateway_id, connection_id] = CompoundId::split(identifier, ID_PARTS)?;

        let deleted = self
            .client
            .delete_vpn_gateway_connection(&gateway_id, &connection_id)
            .await
            .optional()
            .map_err(|e| {
                e.context(format!(
                    "Error deleting VPN gateway ({}) connection ({})",
                    gateway_id, connection_id
                ))
            })?;
        if deleted.is_none() {
            info!(
                "VPN gateway ({}) connection ({}) is already gone",
                gateway_id, connection_id
            );
            return Ok(());
        }

        let timeout = self.timeouts_for(resource).delete;
        waiters::vpn_gateway_connection_deleted(
            &self.client,
            &self.poll,
            &gateway_id,
            &connection_id,
            timeout,
        )
        .await
    }
}

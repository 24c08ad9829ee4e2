//! Waiters - Poll sessions for each resource lifecycle transition
//!
//! Every waiter is a [`StateChangeConf`] over a refresh function from
//! [`crate::refresh`] and a pending/target pair from [`crate::status`].
//! Reaching the `failed` label counts as an error.

use std::time::Duration;

use ibmvpc_core::provider::{ProviderError, ProviderResult};
use ibmvpc_core::wait::StateChangeConf;
use log::info;

use crate::client::{RulePath, VpcClient};
use crate::config::ProviderConfig;
use crate::models::{
    BareMetalServer, BareMetalServerNetworkInterface, FloatingIp, LoadBalancer,
    LoadBalancerListenerPolicyRule, VpnGatewayConnection,
};
use crate::refresh;
use crate::status::{self, FAILED};

/// Timing shared by every wait a provider performs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub delay: Duration,
    pub min_timeout: Duration,
}

impl PollSettings {
    pub fn from_config(config: &ProviderConfig) -> Self {
        Self {
            delay: config.wait_delay,
            min_timeout: config.wait_min_timeout,
        }
    }

    pub fn conf(&self, pending: &[&str], target: &[&str], timeout: Duration) -> StateChangeConf {
        StateChangeConf::new(pending, target, timeout)
            .with_delay(self.delay)
            .with_min_timeout(self.min_timeout)
    }
}

/// Final object of a wait whose target is a live state
fn settle<T>(object: Option<T>, label: impl Fn(&T) -> &str, what: String) -> ProviderResult<T> {
    match object {
        Some(o) if label(&o) == FAILED => {
            Err(ProviderError::new(format!("{} entered failed state", what)))
        }
        Some(o) => Ok(o),
        None => Err(ProviderError::new(format!(
            "{} disappeared while waiting",
            what
        ))),
    }
}

/// Final object of a wait whose target is `deleted`
fn settle_deleted<T>(object: Option<T>, label: impl Fn(&T) -> &str, what: String) -> ProviderResult<()> {
    match object {
        Some(o) if label(&o) == FAILED => Err(ProviderError::new(format!(
            "{} entered failed state while deleting",
            what
        ))),
        _ => Ok(()),
    }
}

// =============================================================================
// Bare metal servers
// =============================================================================

pub async fn bare_metal_server_running(
    client: &VpcClient,
    poll: &PollSettings,
    id: &str,
    timeout: Duration,
) -> ProviderResult<BareMetalServer> {
    info!("Waiting for bare metal server ({}) to be running", id);
    let conf = poll.conf(
        status::bare_metal_server::RUNNING_PENDING,
        status::bare_metal_server::RUNNING_TARGET,
        timeout,
    );
    let object = conf
        .wait_for_state(move || refresh::bare_metal_server(client, id))
        .await?;
    settle(
        object,
        |s| &s.status,
        format!("Bare metal server ({})", id),
    )
}

pub async fn bare_metal_server_stopped(
    client: &VpcClient,
    poll: &PollSettings,
    id: &str,
    timeout: Duration,
) -> ProviderResult<BareMetalServer> {
    info!("Waiting for bare metal server ({}) to be stopped", id);
    let conf = poll.conf(
        status::bare_metal_server::STOPPED_PENDING,
        status::bare_metal_server::STOPPED_TARGET,
        timeout,
    );
    let object = conf
        .wait_for_state(move || refresh::bare_metal_server(client, id))
        .await?;
    settle(
        object,
        |s| &s.status,
        format!("Bare metal server ({})", id),
    )
}

// =============================================================================
// Network interfaces
// =============================================================================

pub async fn network_interface_available(
    client: &VpcClient,
    poll: &PollSettings,
    server_id: &str,
    nic_id: &str,
    timeout: Duration,
) -> ProviderResult<BareMetalServerNetworkInterface> {
    let conf = poll.conf(
        status::network_interface::CREATE_PENDING,
        status::network_interface::CREATE_TARGET,
        timeout,
    );
    let object = conf
        .wait_for_state(move || {
            refresh::bare_metal_server_network_interface(client, server_id, nic_id)
        })
        .await?;
    settle(
        object,
        |nic| nic.status(),
        format!(
            "Bare metal server ({}) network interface ({})",
            server_id, nic_id
        ),
    )
}

pub async fn network_interface_deleted(
    client: &VpcClient,
    poll: &PollSettings,
    server_id: &str,
    nic_id: &str,
    timeout: Duration,
) -> ProviderResult<()> {
    let conf = poll.conf(
        status::network_interface::DELETE_PENDING,
        status::network_interface::DELETE_TARGET,
        timeout,
    );
    let object = conf
        .wait_for_state(move || {
            refresh::bare_metal_server_network_interface(client, server_id, nic_id)
        })
        .await?;
    settle_deleted(
        object,
        |nic| nic.status(),
        format!(
            "Bare metal server ({}) network interface ({})",
            server_id, nic_id
        ),
    )
}

pub async fn network_interface_floating_ip_available(
    client: &VpcClient,
    poll: &PollSettings,
    server_id: &str,
    nic_id: &str,
    floating_ip_id: &str,
    timeout: Duration,
) -> ProviderResult<FloatingIp> {
    let conf = poll.conf(
        status::floating_ip::ATTACH_PENDING,
        status::floating_ip::ATTACH_TARGET,
        timeout,
    );
    let object = conf
        .wait_for_state(move || {
            refresh::bare_metal_server_network_interface_floating_ip(
                client,
                server_id,
                nic_id,
                floating_ip_id,
            )
        })
        .await?;
    settle(
        object,
        |fip| &fip.status,
        format!("Floating IP ({})", floating_ip_id),
    )
}

pub async fn network_interface_floating_ip_removed(
    client: &VpcClient,
    poll: &PollSettings,
    server_id: &str,
    nic_id: &str,
    floating_ip_id: &str,
    timeout: Duration,
) -> ProviderResult<()> {
    let conf = poll.conf(
        status::floating_ip::DETACH_PENDING,
        status::floating_ip::DETACH_TARGET,
        timeout,
    );
    let object = conf
        .wait_for_state(move || {
            refresh::bare_metal_server_network_interface_floating_ip(
                client,
                server_id,
                nic_id,
                floating_ip_id,
            )
        })
        .await?;
    settle_deleted(
        object,
        |fip| &fip.status,
        format!("Floating IP ({})", floating_ip_id),
    )
}

pub async fn floating_ip_released(
    client: &VpcClient,
    poll: &PollSettings,
    floating_ip_id: &str,
    timeout: Duration,
) -> ProviderResult<()> {
    let conf = poll.conf(
        status::floating_ip::RELEASE_PENDING,
        status::floating_ip::RELEASE_TARGET,
        timeout,
    );
    let object = conf
        .wait_for_state(move || refresh::floating_ip(client, floating_ip_id))
        .await?;
    settle_deleted(
        object,
        |fip| &fip.status,
        format!("Floating IP ({})", floating_ip_id),
    )
}

// =============================================================================
// VPN gateway connections
// =============================================================================

pub async fn vpn_gateway_connection_available(
    client: &VpcClient,
    poll: &PollSettings,
    gateway_id: &str,
    connection_id: &str,
    timeout: Duration,
) -> ProviderResult<VpnGatewayConnection> {
    let conf = poll.conf(
        status::vpn_gateway_connection::AVAILABLE_PENDING,
        status::vpn_gateway_connection::AVAILABLE_TARGET,
        timeout,
    );
    let object = conf
        .wait_for_state(move || refresh::vpn_gateway_connection(client, gateway_id, connection_id))
        .await?;
    settle(
        object,
        |conn| status::vpn_gateway_connection::label(&conn.status),
        format!(
            "VPN gateway ({}) connection ({})",
            gateway_id, connection_id
        ),
    )
}

pub async fn vpn_gateway_connection_deleted(
    client: &VpcClient,
    poll: &PollSettings,
    gateway_id: &str,
    connection_id: &str,
    timeout: Duration,
) -> ProviderResult<()> {
    let conf = poll.conf(
        status::vpn_gateway_connection::DELETE_PENDING,
        status::vpn_gateway_connection::DELETE_TARGET,
        timeout,
    );
    let object = conf
        .wait_for_state(move || {
            refresh::vpn_gateway_connection_deleting(client, gateway_id, connection_id)
        })
        .await?;
    settle_deleted(
        object,
        |conn| status::vpn_gateway_connection::label(&conn.status),
        format!(
            "VPN gateway ({}) connection ({})",
            gateway_id, connection_id
        ),
    )
}

// =============================================================================
// Load balancers
// =============================================================================

pub async fn load_balancer_available(
    client: &VpcClient,
    poll: &PollSettings,
    id: &str,
    timeout: Duration,
) -> ProviderResult<LoadBalancer> {
    let conf = poll.conf(
        status::load_balancer::AVAILABLE_PENDING,
        status::load_balancer::AVAILABLE_TARGET,
        timeout,
    );
    let object = conf
        .wait_for_state(move || refresh::load_balancer(client, id))
        .await?;
    settle(
        object,
        |lb| &lb.provisioning_status,
        format!("Load balancer ({})", id),
    )
}

pub async fn load_balancer_listener_policy_rule_available(
    client: &VpcClient,
    poll: &PollSettings,
    rule: &RulePath<'_>,
    timeout: Duration,
) -> ProviderResult<LoadBalancerListenerPolicyRule> {
    let conf = poll.conf(
        status::load_balancer::AVAILABLE_PENDING,
        status::load_balancer::AVAILABLE_TARGET,
        timeout,
    );
    let object = conf
        .wait_for_state(move || refresh::load_balancer_listener_policy_rule(client, rule))
        .await?;
    settle(
        object,
        |r| &r.provisioning_status,
        format!("Load balancer listener policy rule ({})", rule.rule_id),
    )
}

pub async fn load_balancer_listener_policy_rule_deleted(
    client: &VpcClient,
    poll: &PollSettings,
    rule: &RulePath<'_>,
    timeout: Duration,
) -> ProviderResult<()> {
    let conf = poll.conf(
        status::load_balancer::DELETE_PENDING_SET,
        status::load_balancer::DELETE_TARGET,
        timeout,
    );
    let object = conf
        .wait_for_state(move || refresh::load_balancer_listener_policy_rule(client, rule))
        .await?;
    settle_deleted(
        object,
        |r| &r.provisioning_status,
        format!("Load balancer listener policy rule ({})", rule.rule_id),
    )
}

//! Status vocabularies and the pending/target sets waiters poll with
//!
//! Each resource type reports a closed set of status labels. A waiter
//! is defined by which labels keep it polling and which end it.

/// Label refresh functions report once an object returns 404
pub const DELETED: &str = "deleted";
/// Label every type uses for an unrecoverable state
pub const FAILED: &str = "failed";

pub mod bare_metal_server {
    pub const PENDING: &str = "pending";
    pub const STARTING: &str = "starting";
    pub const RUNNING: &str = "running";
    pub const STOPPING: &str = "stopping";
    pub const STOPPED: &str = "stopped";
    pub const RESTARTING: &str = "restarting";
    pub const DELETING: &str = "deleting";
    pub const FAILED: &str = super::FAILED;
    pub const MAINTENANCE: &str = "maintenance";

    pub const RUNNING_PENDING: &[&str] = &[PENDING, STARTING, RESTARTING];
    pub const RUNNING_TARGET: &[&str] = &[RUNNING, FAILED];

    pub const STOPPED_PENDING: &[&str] = &[PENDING, RUNNING, STOPPING];
    pub const STOPPED_TARGET: &[&str] = &[STOPPED, FAILED];
}

pub mod network_interface {
    pub const PENDING: &str = "pending";
    pub const AVAILABLE: &str = "available";
    /// PCI interface created while its server was running
    pub const PCI_PENDING: &str = "pci_pending";
    pub const DELETING: &str = "deleting";
    pub const DELETED: &str = super::DELETED;
    pub const FAILED: &str = super::FAILED;

    pub const CREATE_PENDING: &[&str] = &[PENDING];
    pub const CREATE_TARGET: &[&str] = &[AVAILABLE, PCI_PENDING, FAILED];

    pub const DELETE_PENDING: &[&str] = &[AVAILABLE, DELETING, PENDING];
    pub const DELETE_TARGET: &[&str] = &[DELETED, FAILED];
}

pub mod floating_ip {
    pub const PENDING: &str = "pending";
    pub const AVAILABLE: &str = "available";
    pub const DELETING: &str = "deleting";
    pub const DELETED: &str = super::DELETED;
    pub const FAILED: &str = super::FAILED;

    pub const ATTACH_PENDING: &[&str] = &[PENDING];
    pub const ATTACH_TARGET: &[&str] = &[AVAILABLE, FAILED];

    pub const DETACH_PENDING: &[&str] = &[AVAILABLE, DELETING, PENDING];
    pub const DETACH_TARGET: &[&str] = &[DELETED, FAILED];

    /// Once unbound, the floating IP itself settles back to `available`
    pub const RELEASE_PENDING: &[&str] = &[PENDING, DELETING];
    pub const RELEASE_TARGET: &[&str] = &[AVAILABLE, DELETED, FAILED];
}

/// VPN connections report `up` or `down`; the refresh folds both into
/// [`DONE`](vpn_gateway_connection::DONE) and anything else into
/// [`PROVISIONING`](vpn_gateway_connection::PROVISIONING).
pub mod vpn_gateway_connection {
    pub const UP: &str = "up";
    pub const DOWN: &str = "down";

    pub const DONE: &str = "done";
    pub const PROVISIONING: &str = "provisioning";
    pub const RETRY: &str = "retry";
    pub const CREATE_PENDING: &str = "create_pending";
    pub const UPDATE_PENDING: &str = "update_pending";
    pub const MAINTENANCE_PENDING: &str = "maintenance_pending";
    pub const DELETING: &str = "deleting";
    pub const DELETED: &str = super::DELETED;

    pub const AVAILABLE_PENDING: &[&str] = &[
        RETRY,
        PROVISIONING,
        CREATE_PENDING,
        UPDATE_PENDING,
        MAINTENANCE_PENDING,
    ];
    pub const AVAILABLE_TARGET: &[&str] = &[DONE];

    pub const DELETE_PENDING: &[&str] = &[DELETING];
    pub const DELETE_TARGET: &[&str] = &[DELETED];

    /// Label reported for a connection whose remote status is `status`
    pub fn label(status: &str) -> &'static str {
        match status {
            UP | DOWN => DONE,
            _ => PROVISIONING,
        }
    }
}

/// Shared by load balancers and their listener policy rules
pub mod load_balancer {
    pub const ACTIVE: &str = "active";
    pub const CREATE_PENDING: &str = "create_pending";
    pub const UPDATE_PENDING: &str = "update_pending";
    pub const MAINTENANCE_PENDING: &str = "maintenance_pending";
    pub const MIGRATE_PENDING: &str = "migrate_pending";
    pub const DELETE_PENDING: &str = "delete_pending";
    pub const DELETED: &str = super::DELETED;
    pub const FAILED: &str = super::FAILED;

    pub const AVAILABLE_PENDING: &[&str] = &[
        CREATE_PENDING,
        UPDATE_PENDING,
        MAINTENANCE_PENDING,
        MIGRATE_PENDING,
    ];
    pub const AVAILABLE_TARGET: &[&str] = &[ACTIVE, FAILED];

    pub const DELETE_PENDING_SET: &[&str] = &[DELETE_PENDING];
    pub const DELETE_TARGET: &[&str] = &[DELETED, FAILED];
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vpn_label_folding() {
        assert_eq!(vpn_gateway_connection::label("up"), "done");
        assert_eq!(vpn_gateway_connection::label("down"), "done");
        assert_eq!(vpn_gateway_connection::label("pending"), "provisioning");
        assert_eq!(vpn_gateway_connection::label(""), "provisioning");
    }

    #[test]
    fn test_pending_and_target_sets_are_disjoint() {
        let sets: &[(&[&str], &[&str])] = &[
            (
                bare_metal_server::RUNNING_PENDING,
                bare_metal_server::RUNNING_TARGET,
            ),
            (
                bare_metal_server::STOPPED_PENDING,
                bare_metal_server::STOPPED_TARGET,
            ),
            (
                network_interface::CREATE_PENDING,
                network_interface::CREATE_TARGET,
            ),
            (
                network_interface::DELETE_PENDING,
                network_interface::DELETE_TARGET,
            ),
            (floating_ip::ATTACH_PENDING, floating_ip::ATTACH_TARGET),
            (floating_ip::DETACH_PENDING, floating_ip::DETACH_TARGET),
            (
                vpn_gateway_connection::AVAILABLE_PENDING,
                vpn_gateway_connection::AVAILABLE_TARGET,
            ),
            (
                vpn_gateway_connection::DELETE_PENDING,
                vpn_gateway_connection::DELETE_TARGET,
            ),
            (
                load_balancer::AVAILABLE_PENDING,
                load_balancer::AVAILABLE_TARGET,
            ),
            (
                load_balancer::DELETE_PENDING_SET,
                load_balancer::DELETE_TARGET,
            ),
        ];

        for (pending, target) in sets {
            for label in *pending {
                assert!(!target.contains(label), "'{}' is both pending and target", label);
            }
        }
    }

    #[test]
    fn test_delete_targets_include_deleted() {
        assert!(network_interface::DELETE_TARGET.contains(&DELETED));
        assert!(floating_ip::DETACH_TARGET.contains(&DELETED));
        assert!(vpn_gateway_connection::DELETE_TARGET.contains(&DELETED));
        assert!(load_balancer::DELETE_TARGET.contains(&DELETED));
    }
}

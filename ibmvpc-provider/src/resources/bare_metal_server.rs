//! Bare metal server power actions and the `is_bare_metal_servers` data source

use std::collections::HashMap;
use std::time::Duration;

use chrono::Utc;
use ibmvpc_core::provider::{ProviderError, ProviderResult};
use ibmvpc_core::resource::{CompoundId, Resource, ResourceId, State, Value};
use log::info;

use crate::convert::bare_metal_server_to_map;
use crate::error::NotFoundExt;
use crate::models::{BareMetalServer, StopType};
use crate::provider::{IbmVpcProvider, carry_over, changed, optional_string, required_str};
use crate::status::bare_metal_server::{RUNNING, STOPPED};
use crate::waiters;

/// Action that leaves a server in `status`, if any
fn action_for_status(status: &str) -> Option<&'static str> {
    match status {
        RUNNING => Some("start"),
        STOPPED => Some("stop"),
        _ => None,
    }
}

impl IbmVpcProvider {
    pub(crate) async fn read_bare_metal_server_action(
        &self,
        id: &ResourceId,
        identifier: &str,
    ) -> ProviderResult<State> {
        let [server_id] = CompoundId::split(identifier, ["bare_metal_server"])?;
        let server = self
            .client
            .get_bare_metal_server(&server_id)
            .await
            .optional()
            .map_err(|e| e.context(format!("Error getting bare metal server ({})", server_id)))?;

        let Some(server) = server else {
            return Ok(State::not_found(id.clone()));
        };

        let mut attributes = HashMap::new();
        attributes.insert(
            "bare_metal_server".to_string(),
            Value::String(server.id.clone()),
        );
        attributes.insert("status".to_string(), Value::String(server.status.clone()));
        if let Some(action) = action_for_status(&server.status) {
            attributes.insert("action".to_string(), Value::from(action));
        }
        Ok(State::existing(id.clone(), attributes).with_identifier(server.id))
    }

    pub(crate) async fn create_bare_metal_server_action(
        &self,
        resource: &Resource,
    ) -> ProviderResult<State> {
        let server_id = required_str(resource, "bare_metal_server")?;
        let timeout = self.timeouts_for(resource).create;
        let server = self
            .run_bare_metal_server_action(server_id, resource, timeout)
            .await?;
        Ok(action_state(resource, &server))
    }

    pub(crate) async fn update_bare_metal_server_action(
        &self,
        identifier: &str,
        from: &State,
        to: &Resource,
    ) -> ProviderResult<State> {
        let [server_id] = CompoundId::split(identifier, ["bare_metal_server"])?;
        let server = if changed(from, to, "action") || changed(from, to, "stop_type") {
            let timeout = self.timeouts_for(to).update;
            self.run_bare_metal_server_action(&server_id, to, timeout)
                .await?
        } else {
            self.client
                .get_bare_metal_server(&server_id)
                .await
                .map_err(|e| e.context(format!("Error getting bare metal server ({})", server_id)))?
        };
        Ok(action_state(to, &server))
    }

    /// Power actions have no remote object to remove
    pub(crate) fn delete_bare_metal_server_action(&self, identifier: &str) {
        info!(
            "Forgetting action on bare metal server ({}); the server is left as is",
            identifier
        );
    }

    async fn run_bare_metal_server_action(
        &self,
        server_id: &str,
        resource: &Resource,
        timeout: Duration,
    ) -> ProviderResult<BareMetalServer> {
        let action = required_str(resource, "action")?;
        let stop_type = resource
            .get_str("stop_type")
            .and_then(StopType::parse)
            .unwrap_or(StopType::Hard);

        match action {
            "start" => {
                if self.bare_metal_server_status(server_id).await? == RUNNING {
                    info!("Bare metal server ({}) is already running", server_id);
                } else {
                    self.client
                        .start_bare_metal_server(server_id)
                        .await
                        .map_err(|e| {
                            e.context(format!("Error starting bare metal server ({})", server_id))
                        })?;
                }
                waiters::bare_metal_server_running(&self.client, &self.poll, server_id, timeout)
                    .await
            }
            "stop" => {
                if self.bare_metal_server_status(server_id).await? == STOPPED {
                    info!("Bare metal server ({}) is already stopped", server_id);
                } else {
                    self.client
                        .stop_bare_metal_server(server_id, stop_type)
                        .await
                        .map_err(|e| {
                            e.context(format!("Error stopping bare metal server ({})", server_id))
                        })?;
                }
                waiters::bare_metal_server_stopped(&self.client, &self.poll, server_id, timeout)
                    .await
            }
            "restart" => {
                self.client
                    .restart_bare_metal_server(server_id)
                    .await
                    .map_err(|e| {
                        e.context(format!("Error restarting bare metal server ({})", server_id))
                    })?;
                waiters::bare_metal_server_running(&self.client, &self.poll, server_id, timeout)
                    .await
            }
            other => Err(ProviderError::new(format!(
                "Unknown bare metal server action '{}'",
                other
            ))),
        }
    }

    async fn bare_metal_server_status(&self, server_id: &str) -> ProviderResult<String> {
        self.client
            .get_bare_metal_server(server_id)
            .await
            .map(|server| server.status)
            .map_err(|e| e.context(format!("Error getting bare metal server ({})", server_id)))
    }

    /// Hard-stop a running server and wait until it is stopped
    ///
    /// Returns true if the server was running and has been stopped by this call.
    pub(crate) async fn stop_bare_metal_server_if_running(
        &self,
        server_id: &str,
        timeout: Duration,
    ) -> ProviderResult<bool> {
        if self.bare_metal_server_status(server_id).await? != RUNNING {
            return Ok(false);
        }

        info!("Stopping bare metal server ({})", server_id);
        self.client
            .stop_bare_metal_server(server_id, StopType::Hard)
            .await
            .map_err(|e| e.context(format!("Error stopping bare metal server ({})", server_id)))?;
        waiters::bare_metal_server_stopped(&self.client, &self.poll, server_id, timeout).await?;
        Ok(true)
    }

    /// Start a server and wait until it is running
    pub(crate) async fn start_bare_metal_server_and_wait(
        &self,
        server_id: &str,
        timeout: Duration,
    ) -> ProviderResult<()> {
        info!("Starting bare metal server ({})", server_id);
        self.client
            .start_bare_metal_server(server_id)
            .await
            .map_err(|e| e.context(format!("Error starting bare metal server ({})", server_id)))?;
        waiters::bare_metal_server_running(&self.client, &self.poll, server_id, timeout).await?;
        Ok(())
    }

    // =========================================================================
    // Data source
    // =========================================================================

    pub(crate) async fn read_bare_metal_servers(&self, resource: &Resource) -> ProviderResult<State> {
        let mut filters = Vec::new();
        for (attribute, query) in [
            ("name", "name"),
            ("vpc", "vpc.id"),
            ("resource_group", "resource_group.id"),
        ] {
            if let Some(value) = optional_string(resource, attribute) {
                filters.push((query.to_string(), value));
            }
        }

        let servers = self
            .client
            .list_bare_metal_servers(&filters)
            .await
            .map_err(|e| e.context("Error listing bare metal servers"))?;

        let mut attributes = resource.attributes.clone();
        attributes.insert(
            "bare_metal_servers".to_string(),
            Value::List(
                servers
                    .iter()
                    .map(|s| Value::Map(bare_metal_server_to_map(s)))
                    .collect(),
            ),
        );
        Ok(State::existing(resource.id.clone(), attributes).with_identifier(Utc::now().to_rfc3339()))
    }
}

fn action_state(resource: &Resource, server: &BareMetalServer) -> State {
    let mut attributes = HashMap::new();
    attributes.insert(
        "bare_metal_server".to_string(),
        Value::String(server.id.clone()),
    );
    attributes.insert("status".to_string(), Value::String(server.status.clone()));
    carry_over(&mut attributes, resource, &["action", "stop_type"]);
    State::existing(resource.id.clone(), attributes).with_identifier(server.id.clone())
}

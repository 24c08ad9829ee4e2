//! ibmvpc IBM Cloud VPC Provider
//!
//! Manages bare metal server power state and network interfaces, floating
//! IP bindings, VPN gateway connections and load balancer listener policy
//! rules through the VPC REST API.
//!
//! ## Module Structure
//!
//! - `config` - Region, credentials, endpoints and default timeouts
//! - `transport` / `client` - HTTP plumbing and typed API calls
//! - `models` - API objects, including the network interface union
//! - `status` / `refresh` / `waiters` - Polling until a target status
//! - `resources` - Resource type definitions and CRUD operations
//! - `provider` - IbmVpcProvider and dispatch by resource type

pub mod client;
pub mod config;
pub mod convert;
pub mod error;
pub mod models;
pub mod provider;
pub mod refresh;
pub mod resources;
pub mod status;
pub mod transport;
pub mod waiters;

#[cfg(test)]
mod testing;

// Re-export main types
pub use config::ProviderConfig;
pub use provider::IbmVpcProvider;

use ibmvpc_core::provider::{BoxFuture, Provider, ProviderResult, ResourceType};
use ibmvpc_core::resource::{Resource, ResourceId, State};

// =============================================================================
// Provider Trait Implementation
// =============================================================================

impl Provider for IbmVpcProvider {
    fn name(&self) -> &'static str {
        "ibm"
    }

    fn resource_types(&self) -> Vec<Box<dyn ResourceType>> {
        resources::resource_types()
    }

    fn read(&self, id: &ResourceId, identifier: &str) -> BoxFuture<'_, ProviderResult<State>> {
        let id = id.clone();
        let identifier = identifier.to_string();
        Box::pin(async move { self.read_resource(&id, &identifier).await })
    }

    fn create(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
        let resource = resource.clone();
        Box::pin(async move { self.create_resource(resource).await })
    }

    fn update(
        &self,
        id: &ResourceId,
        identifier: &str,
        from: &State,
        to: &Resource,
    ) -> BoxFuture<'_, ProviderResult<State>> {
        let id = id.clone();
        let identifier = identifier.to_string();
        let from = from.clone();
        let to = to.clone();
        Box::pin(async move { self.update_resource(&id, &identifier, &from, to).await })
    }

    fn delete(
        &self,
        id: &ResourceId,
        identifier: &str,
        resource: &Resource,
    ) -> BoxFuture<'_, ProviderResult<()>> {
        let id = id.clone();
        let identifier = identifier.to_string();
        let resource = resource.clone();
        Box::pin(async move { self.delete_resource(&id, &identifier, &resource).await })
    }

    fn read_data_source(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
        let resource = resource.clone();
        Box::pin(async move { self.read_data_source_resource(resource).await })
    }
}

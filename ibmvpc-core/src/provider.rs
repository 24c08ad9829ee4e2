//! Provider - Trait abstracting resource operations
//!
//! A Provider defines operations for a specific infrastructure API.
//! It is responsible for converting requested changes into actual API calls
//! and for waiting until the remote side has settled.

use std::future::Future;
use std::pin::Pin;

use crate::resource::{IdError, Resource, ResourceId, State};
use crate::schema::ResourceSchema;
use crate::wait::WaitError;

/// Error type for Provider operations
#[derive(Debug)]
pub struct ProviderError {
    pub message: String,
    pub resource_id: Option<ResourceId>,
    pub cause: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl std::fmt::Display for ProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(ref id) = self.resource_id {
            write!(f, "[{}.{}] {}", id.resource_type, id.name, self.message)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

impl std::error::Error for ProviderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_ref()
            .map(|e| e.as_ref() as &dyn std::error::Error)
    }
}

impl ProviderError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            resource_id: None,
            cause: None,
        }
    }

    pub fn for_resource(mut self, id: ResourceId) -> Self {
        self.resource_id = Some(id);
        self
    }

    pub fn with_cause(mut self, cause: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    /// Returns the cause downcast to `E`, if it is one
    pub fn cause_as<E: std::error::Error + 'static>(&self) -> Option<&E> {
        self.cause.as_ref().and_then(|c| c.downcast_ref::<E>())
    }
}

impl From<IdError> for ProviderError {
    fn from(e: IdError) -> Self {
        ProviderError::new(e.to_string()).with_cause(e)
    }
}

impl From<WaitError> for ProviderError {
    fn from(e: WaitError) -> Self {
        match e {
            // A refresh that failed with a ProviderError keeps its own context
            WaitError::Refresh(cause) => match cause.downcast::<ProviderError>() {
                Ok(inner) => *inner,
                Err(cause) => {
                    let e = WaitError::Refresh(cause);
                    ProviderError::new(e.to_string()).with_cause(e)
                }
            },
            e => ProviderError::new(e.to_string()).with_cause(e),
        }
    }
}

pub type ProviderResult<T> = Result<T, ProviderError>;

/// Return type for async operations
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Definition of resource types that a Provider can handle
pub trait ResourceType: Send + Sync {
    /// Resource type name (e.g., "is_vpn_gateway_connection")
    fn name(&self) -> &'static str;

    /// Attribute schema for this resource type
    fn schema(&self) -> ResourceSchema {
        ResourceSchema::new(self.name())
    }

    /// True if this type is a read-only data source
    fn is_data_source(&self) -> bool {
        false
    }
}

/// Main Provider trait
///
/// Each infrastructure provider implements this trait.
/// All operations are async and involve side effects.
pub trait Provider: Send + Sync {
    /// Name of this Provider (e.g., "ibm")
    fn name(&self) -> &'static str;

    /// List of resource and data source types this Provider can handle
    fn resource_types(&self) -> Vec<Box<dyn ResourceType>>;

    /// Get the current state of a resource
    ///
    /// Returns `State::not_found()` if the resource does not exist.
    fn read(&self, id: &ResourceId, identifier: &str) -> BoxFuture<'_, ProviderResult<State>>;

    /// Create a resource
    ///
    /// Returns State with identifier set to the provider ID, possibly compound
    fn create(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>>;

    /// Update a resource in place
    fn update(
        &self,
        id: &ResourceId,
        identifier: &str,
        from: &State,
        to: &Resource,
    ) -> BoxFuture<'_, ProviderResult<State>>;

    /// Delete a resource
    ///
    /// A resource that is already gone is not an error.
    fn delete(
        &self,
        id: &ResourceId,
        identifier: &str,
        resource: &Resource,
    ) -> BoxFuture<'_, ProviderResult<()>>;

    /// Read a data source
    fn read_data_source(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>>;
}

/// Provider implementation for Box<dyn Provider>
/// This enables dynamic dispatch for Providers
impl Provider for Box<dyn Provider> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn resource_types(&self) -> Vec<Box<dyn ResourceType>> {
        (**self).resource_types()
    }

    fn read(&self, id: &ResourceId, identifier: &str) -> BoxFuture<'_, ProviderResult<State>> {
        (**self).read(id, identifier)
    }

    fn create(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
        (**self).create(resource)
    }

    fn update(
        &self,
        id: &ResourceId,
        identifier: &str,
        from: &State,
        to: &Resource,
    ) -> BoxFuture<'_, ProviderResult<State>> {
        (**self).update(id, identifier, from, to)
    }

    fn delete(
        &self,
        id: &ResourceId,
        identifier: &str,
        resource: &Resource,
    ) -> BoxFuture<'_, ProviderResult<()>> {
        (**self).delete(id, identifier, resource)
    }

    fn read_data_source(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
        (**self).read_data_source(resource)
    }
}

//! ibmvpc Core
//!
//! Provider-independent building blocks: the resource model, compound
//! identifiers, attribute schemas, the Provider trait, the poll-until-state
//! driver and keyed locks.

pub mod lock;
pub mod provider;
pub mod resource;
pub mod schema;
pub mod timeouts;
pub mod wait;

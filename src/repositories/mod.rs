//! Data access layer.
//!
//! Services reach stored metadata only through [`RepositoryGateway`].
//! [`InMemoryRepository`] is the gateway used by the command line and tests.

mod gateway;
mod memory;

pub use gateway::{ExternalSource, NewEntity, NewRelationship, RepositoryGateway, RequestOptions};
pub use memory::{Fixture, InMemoryRepository};

//! The repository gateway: the only way this crate reads or writes metadata.
//!
//! Storage, authorization and type validation all live behind
//! [`RepositoryGateway`]. Implementations decide how instances are stored;
//! callers only see entities, relationships and classifications.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::models::{Classification, EntityStatus, Properties, TypeDef, Entity, Relationship};

/// Request-wide flags passed through to every gateway call unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestOptions {
    /// Point in time the request is evaluated at; `None` means now.
    pub effective_time: Option<DateTime<Utc>>,
    pub for_lineage: bool,
    pub for_duplicate_processing: bool,
}

/// The external metadata source that owns newly created instances.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalSource {
    pub guid: String,
    pub name: String,
}

/// Everything needed to create an entity.
#[derive(Debug, Clone)]
pub struct NewEntity {
    pub type_guid: String,
    pub type_name: String,
    pub external_source: Option<ExternalSource>,
    pub properties: Properties,
    pub classifications: Vec<Classification>,
    pub status: EntityStatus,
}

/// Everything needed to create a relationship from `end_one_guid` to `end_two_guid`.
#[derive(Debug, Clone)]
pub struct NewRelationship {
    pub type_guid: String,
    pub type_name: String,
    pub external_source: Option<ExternalSource>,
    pub end_one_guid: String,
    pub end_two_guid: String,
    pub properties: Properties,
    pub effective_from: Option<DateTime<Utc>>,
    pub effective_to: Option<DateTime<Utc>>,
}

/// Access to stored entities and relationships on behalf of a user.
///
/// Every call is authorized against `user_id` by the implementation; an
/// authorization failure surfaces as [`AppError::Unauthorized`].
#[async_trait]
pub trait RepositoryGateway: Send + Sync {
    /// Retrieves an entity by GUID.
    ///
    /// When `expected_type` is given the entity must be of that type or one
    /// of its subtypes, otherwise [`AppError::TypeMismatch`] is returned.
    async fn get_entity(
        &self,
        user_id: &str,
        guid: &str,
        expected_type: Option<&str>,
        options: &RequestOptions,
    ) -> Result<Entity, AppError>;

    /// Creates an entity and returns its GUID.
    async fn create_entity(
        &self,
        user_id: &str,
        entity: NewEntity,
        options: &RequestOptions,
    ) -> Result<String, AppError>;

    /// Adds a classification to an entity, replacing one of the same name.
    async fn classify_entity(
        &self,
        user_id: &str,
        guid: &str,
        classification: Classification,
        options: &RequestOptions,
    ) -> Result<(), AppError>;

    /// Creates a relationship and returns its GUID.
    async fn create_relationship(
        &self,
        user_id: &str,
        relationship: NewRelationship,
        options: &RequestOptions,
    ) -> Result<String, AppError>;

    /// Lists one page of the relationships attached to an entity at either end.
    ///
    /// Pages are stable: the same arguments return the same relationships in
    /// the same order while nothing new is attached to the entity.
    async fn list_relationships(
        &self,
        user_id: &str,
        entity_guid: &str,
        type_filter: Option<&str>,
        start_from: usize,
        page_size: usize,
        options: &RequestOptions,
    ) -> Result<Vec<Relationship>, AppError>;

    /// Looks up a type definition by name.
    async fn get_type(&self, type_name: &str) -> Result<TypeDef, AppError>;

    /// Whether `type_name` is `super_type` or inherits from it.
    async fn is_type_of(&self, type_name: &str, super_type: &str) -> Result<bool, AppError> {
        let mut current = Some(type_name.to_string());
        let mut hops = 0;
        while let Some(name) = current {
            if name == super_type {
                return Ok(true);
            }
            // Guards against a cyclic type catalog.
            hops += 1;
            if hops > 64 {
                break;
            }
            current = self.get_type(&name).await?.super_type;
        }
        Ok(false)
    }
}

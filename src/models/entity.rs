//! Entity model: typed, versioned records in the metadata repository.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use super::{Classification, Classified, Properties, QUALIFIED_NAME};

/// Lifecycle status of an entity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityStatus {
    Draft,
    Prepared,
    Proposed,
    Approved,
    #[default]
    Active,
    Deprecated,
    Deleted,
}

/// A typed record identified by its GUID.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    pub guid: String,
    pub type_guid: String,
    pub type_name: String,
    #[serde(default = "first_version")]
    pub version: i64,
    #[serde(default)]
    pub status: EntityStatus,
    #[serde(default)]
    pub properties: Properties,
    #[serde(default)]
    pub classifications: Vec<Classification>,
    /// Identifier of the external source that owns the entity, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata_collection_id: Option<String>,
    #[serde(default)]
    pub created_by: String,
    #[serde(default = "Utc::now")]
    pub create_time: DateTime<Utc>,
}

fn first_version() -> i64 {
    1
}

impl Entity {
    /// Creates an active, version-one entity with no properties.
    pub fn new(guid: &str, type_guid: &str, type_name: &str) -> Self {
        Self {
            guid: guid.to_string(),
            type_guid: type_guid.to_string(),
            type_name: type_name.to_string(),
            version: 1,
            status: EntityStatus::Active,
            properties: Properties::new(),
            classifications: Vec::new(),
            metadata_collection_id: None,
            created_by: String::new(),
            create_time: Utc::now(),
        }
    }

    pub fn qualified_name(&self) -> Option<&str> {
        self.properties.get_str(QUALIFIED_NAME)
    }

    /// The lightweight reference used at relationship ends.
    pub fn proxy(&self) -> EntityProxy {
        EntityProxy {
            guid: self.guid.clone(),
            type_name: self.type_name.clone(),
            classifications: self.classifications.clone(),
        }
    }

    /// Adds a classification, replacing any existing one of the same name.
    pub fn set_classification(&mut self, classification: Classification) {
        self.classifications
            .retain(|c| c.name() != classification.name());
        self.classifications.push(classification);
    }
}

impl Classified for Entity {
    fn classifications(&self) -> &[Classification] {
        &self.classifications
    }
}

/// One end of a relationship.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityProxy {
    pub guid: String,
    pub type_name: String,
    #[serde(default)]
    pub classifications: Vec<Classification>,
}

impl Classified for EntityProxy {
    fn classifications(&self) -> &[Classification] {
        &self.classifications
    }
}

/// Generates a new GUID.
pub fn generate_guid() -> String {
    Ulid::new().to_string().to_lowercase()
}

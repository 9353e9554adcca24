//! Type definitions known to a repository.

use serde::{Deserialize, Serialize};

/// What kind of instance a type describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeCategory {
    Entity,
    Relationship,
    Classification,
}

/// A named type, optionally inheriting from a super type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeDef {
    pub guid: String,
    pub name: String,
    pub category: TypeCategory,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub super_type: Option<String>,
}

impl TypeDef {
    /// A type whose GUID is derived from its name.
    pub fn new(name: &str, category: TypeCategory, super_type: Option<&str>) -> Self {
        Self {
            guid: format!("{}-type", name.to_lowercase()),
            name: name.to_string(),
            category,
            super_type: super_type.map(str::to_string),
        }
    }
}

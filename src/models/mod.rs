//! Domain models for the metadata repository.

mod classification;
mod entity;
mod properties;
mod relationship;
mod types;

pub use classification::{
    AnchorsProperties, Classification, Classified, TemplateProperties, ANCHORS, LATEST_CHANGE,
    TEMPLATE, TEMPLATE_SUBSTITUTE, ZONE_MEMBERSHIP,
};
pub use entity::{generate_guid, Entity, EntityProxy, EntityStatus};
pub use properties::{Properties, PropertyValue};
pub use relationship::{Relationship, RelationshipEnd};
pub use types::{TypeCategory, TypeDef};

/// Property holding an element's unique name.
pub const QUALIFIED_NAME: &str = "qualifiedName";

/// Root of the entity types that carry a unique qualified name.
pub const REFERENCEABLE: &str = "Referenceable";

/// Traceability link from a copy to the template it was made from.
pub const SOURCED_FROM: &str = "SourcedFrom";

/// Property on [`SOURCED_FROM`] recording the template version copied.
pub const SOURCE_VERSION_NUMBER: &str = "sourceVersionNumber";

/// Links a template to the specification properties that describe it.
pub const SPECIFICATION_PROPERTY_ASSIGNMENT: &str = "SpecificationPropertyAssignment";

//! Classifications: named, property-bearing tags attached to entities.
//!
//! Known classifications get a typed variant; anything else is kept as an
//! opaque [`Classification::Other`]. On the wire every classification is a
//! `{ "name": ..., "properties": {...} }` record.

use serde::{Deserialize, Serialize};

use super::{Properties, PropertyValue};

pub const ANCHORS: &str = "Anchors";
pub const TEMPLATE: &str = "Template";
pub const TEMPLATE_SUBSTITUTE: &str = "TemplateSubstitute";
pub const LATEST_CHANGE: &str = "LatestChange";
pub const ZONE_MEMBERSHIP: &str = "AssetZoneMembership";

const ANCHOR_GUID: &str = "anchorGUID";
const ANCHOR_TYPE_NAME: &str = "anchorTypeName";
const ANCHOR_DOMAIN_NAME: &str = "anchorDomainName";
const TEMPLATE_NAME: &str = "name";
const TEMPLATE_DESCRIPTION: &str = "description";
const TEMPLATE_VERSION: &str = "versionIdentifier";
const ZONES: &str = "zoneMembership";

/// Which aggregate root an entity belongs to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnchorsProperties {
    pub anchor_guid: Option<String>,
    pub anchor_type_name: Option<String>,
    pub anchor_domain_name: Option<String>,
}

/// Marks an entity as a reusable copy source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateProperties {
    pub name: Option<String>,
    pub description: Option<String>,
    pub version_identifier: Option<String>,
}

/// A named tag attached to an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "ClassificationRecord", into = "ClassificationRecord")]
pub enum Classification {
    Anchors(AnchorsProperties),
    Template(TemplateProperties),
    TemplateSubstitute,
    /// Transient change bookkeeping.
    LatestChange(Properties),
    ZoneMembership { zones: Vec<String> },
    Other { name: String, properties: Properties },
}

impl Classification {
    /// An anchors classification pointing at the given aggregate root.
    pub fn anchored_to(guid: &str, type_name: &str) -> Self {
        Classification::Anchors(AnchorsProperties {
            anchor_guid: Some(guid.to_string()),
            anchor_type_name: Some(type_name.to_string()),
            anchor_domain_name: None,
        })
    }

    pub fn name(&self) -> &str {
        match self {
            Classification::Anchors(_) => ANCHORS,
            Classification::Template(_) => TEMPLATE,
            Classification::TemplateSubstitute => TEMPLATE_SUBSTITUTE,
            Classification::LatestChange(_) => LATEST_CHANGE,
            Classification::ZoneMembership { .. } => ZONE_MEMBERSHIP,
            Classification::Other { name, .. } => name,
        }
    }

    /// Control-plane classifications that a copy never inherits from its template.
    pub fn is_reserved(&self) -> bool {
        matches!(
            self,
            Classification::Anchors(_)
                | Classification::Template(_)
                | Classification::TemplateSubstitute
                | Classification::LatestChange(_)
        )
    }

    /// Flattens the classification into its property bag.
    pub fn properties(&self) -> Properties {
        let mut props = Properties::new();
        match self {
            Classification::Anchors(a) => {
                put_opt(&mut props, ANCHOR_GUID, &a.anchor_guid);
                put_opt(&mut props, ANCHOR_TYPE_NAME, &a.anchor_type_name);
                put_opt(&mut props, ANCHOR_DOMAIN_NAME, &a.anchor_domain_name);
            }
            Classification::Template(t) => {
                put_opt(&mut props, TEMPLATE_NAME, &t.name);
                put_opt(&mut props, TEMPLATE_DESCRIPTION, &t.description);
                put_opt(&mut props, TEMPLATE_VERSION, &t.version_identifier);
            }
            Classification::TemplateSubstitute => {}
            Classification::LatestChange(p) => props = p.clone(),
            Classification::ZoneMembership { zones } => {
                props.insert(ZONES, zones.clone());
            }
            Classification::Other { properties, .. } => props = properties.clone(),
        }
        props
    }

    /// Builds the typed variant for a name and property bag.
    ///
    /// Values of an unexpected type are ignored rather than rejected.
    pub fn from_parts(name: &str, properties: Properties) -> Self {
        match name {
            ANCHORS => Classification::Anchors(AnchorsProperties {
                anchor_guid: string_prop(&properties, ANCHOR_GUID),
                anchor_type_name: string_prop(&properties, ANCHOR_TYPE_NAME),
                anchor_domain_name: string_prop(&properties, ANCHOR_DOMAIN_NAME),
            }),
            TEMPLATE => Classification::Template(TemplateProperties {
                name: string_prop(&properties, TEMPLATE_NAME),
                description: string_prop(&properties, TEMPLATE_DESCRIPTION),
                version_identifier: string_prop(&properties, TEMPLATE_VERSION),
            }),
            TEMPLATE_SUBSTITUTE => Classification::TemplateSubstitute,
            LATEST_CHANGE => Classification::LatestChange(properties),
            ZONE_MEMBERSHIP => {
                let zones = match properties.get(ZONES) {
                    Some(PropertyValue::Array(values)) => values
                        .iter()
                        .filter_map(|v| v.as_str().map(str::to_string))
                        .collect(),
                    _ => Vec::new(),
                };
                Classification::ZoneMembership { zones }
            }
            _ => Classification::Other {
                name: name.to_string(),
                properties,
            },
        }
    }
}

fn put_opt(props: &mut Properties, name: &str, value: &Option<String>) {
    if let Some(value) = value {
        props.insert(name, value.as_str());
    }
}

fn string_prop(props: &Properties, name: &str) -> Option<String> {
    props.get_str(name).map(str::to_string)
}

/// Wire form of a classification.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ClassificationRecord {
    name: String,
    #[serde(default)]
    properties: Properties,
}

impl From<ClassificationRecord> for Classification {
    fn from(record: ClassificationRecord) -> Self {
        Classification::from_parts(&record.name, record.properties)
    }
}

impl From<Classification> for ClassificationRecord {
    fn from(classification: Classification) -> Self {
        ClassificationRecord {
            name: classification.name().to_string(),
            properties: classification.properties(),
        }
    }
}

/// Access to the classifications of an entity or entity proxy.
pub trait Classified {
    fn classifications(&self) -> &[Classification];

    /// Looks up a classification by name.
    fn classification(&self, name: &str) -> Option<&Classification> {
        self.classifications().iter().find(|c| c.name() == name)
    }

    fn has_classification(&self, name: &str) -> bool {
        self.classification(name).is_some()
    }

    /// GUID recorded by the anchors classification, if any.
    fn anchor_guid(&self) -> Option<&str> {
        match self.classification(ANCHORS) {
            Some(Classification::Anchors(a)) => a.anchor_guid.as_deref(),
            _ => None,
        }
    }

    fn is_template_substitute(&self) -> bool {
        self.has_classification(TEMPLATE_SUBSTITUTE)
    }
}

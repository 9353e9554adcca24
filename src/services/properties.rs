//! Property and classification assembly for new instances.
//!
//! A new instance's properties come from up to two layers, highest priority last:
//!
//! 1. values copied from a template, with `{{placeholder}}` tokens rewritten
//! 2. values set explicitly by the caller
//!
//! Classifications merge the same way, except that reserved control-plane
//! classifications are never inherited from a template.

use std::collections::{BTreeMap, HashMap};

use crate::models::{Classification, Properties, PropertyValue};

/// Placeholder name to replacement text.
pub type PlaceholderMap = HashMap<String, String>;

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

/// Rewrites every `{{name}}` token whose name is in `placeholders`.
///
/// Whitespace just inside the braces is ignored. Tokens naming an unknown
/// placeholder and an unterminated `{{` are left as written.
pub fn substitute_placeholders(text: &str, placeholders: &PlaceholderMap) -> String {
    if placeholders.is_empty() || !text.contains(OPEN) {
        return text.to_string();
    }

    let mut result = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find(OPEN) {
        result.push_str(&rest[..start]);
        let after_open = &rest[start + OPEN.len()..];
        let Some(end) = after_open.find(CLOSE) else {
            result.push_str(&rest[start..]);
            return result;
        };

        let name = after_open[..end].trim();
        match placeholders.get(name) {
            Some(value) => result.push_str(value),
            None => result.push_str(&rest[start..start + OPEN.len() + end + CLOSE.len()]),
        }
        rest = &after_open[end + CLOSE.len()..];
    }
    result.push_str(rest);
    result
}

fn substitute_value(value: &PropertyValue, placeholders: &PlaceholderMap) -> PropertyValue {
    match value {
        PropertyValue::String(s) => PropertyValue::String(substitute_placeholders(s, placeholders)),
        PropertyValue::Array(values) => PropertyValue::Array(
            values
                .iter()
                .map(|v| substitute_value(v, placeholders))
                .collect(),
        ),
        PropertyValue::Map(map) => PropertyValue::Map(
            map.iter()
                .map(|(k, v)| (k.clone(), substitute_value(v, placeholders)))
                .collect::<BTreeMap<_, _>>(),
        ),
        other => other.clone(),
    }
}

/// Copies template properties, rewriting placeholders in string values.
pub fn apply_template_properties(template: &Properties, placeholders: &PlaceholderMap) -> Properties {
    template
        .iter()
        .map(|(name, value)| (name.clone(), substitute_value(value, placeholders)))
        .collect()
}

/// Copies every non-reserved template classification, rewriting placeholders
/// in their properties.
pub fn apply_template_classifications(
    template: &[Classification],
    placeholders: &PlaceholderMap,
) -> Vec<Classification> {
    template
        .iter()
        .filter(|c| !c.is_reserved())
        .map(|c| {
            Classification::from_parts(
                c.name(),
                apply_template_properties(&c.properties(), placeholders),
            )
        })
        .collect()
}

/// Assembles the properties and classifications of one new instance.
#[derive(Debug, Clone, Default)]
pub struct PropertyBuilder {
    template_properties: Properties,
    template_classifications: Vec<Classification>,
    properties: Properties,
    classifications: Vec<Classification>,
}

impl PropertyBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses a template's properties as the lowest-priority layer.
    pub fn with_template_properties(
        mut self,
        template: &Properties,
        placeholders: &PlaceholderMap,
    ) -> Self {
        self.template_properties = apply_template_properties(template, placeholders);
        self
    }

    /// Uses a template's classifications as the lowest-priority layer.
    pub fn with_template_classifications(
        mut self,
        template: &[Classification],
        placeholders: &PlaceholderMap,
    ) -> Self {
        self.template_classifications = apply_template_classifications(template, placeholders);
        self
    }

    pub fn with_property(mut self, name: &str, value: impl Into<PropertyValue>) -> Self {
        self.properties.insert(name, value);
        self
    }

    pub fn with_properties(mut self, properties: &Properties) -> Self {
        self.properties.overlay(properties);
        self
    }

    /// Sets a classification, replacing an earlier one of the same name.
    pub fn with_classification(mut self, classification: Classification) -> Self {
        self.classifications
            .retain(|c| c.name() != classification.name());
        self.classifications.push(classification);
        self
    }

    pub fn with_classifications(self, classifications: &[Classification]) -> Self {
        classifications
            .iter()
            .cloned()
            .fold(self, |builder, c| builder.with_classification(c))
    }

    /// Merges the layers; caller-set values win over template values.
    pub fn build(self) -> (Properties, Vec<Classification>) {
        let mut properties = self.template_properties;
        properties.overlay(&self.properties);

        let mut classifications: Vec<Classification> = self
            .template_classifications
            .into_iter()
            .filter(|t| !self.classifications.iter().any(|c| c.name() == t.name()))
            .collect();
        classifications.extend(self.classifications);

        (properties, classifications)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TemplateProperties;
    use pretty_assertions::assert_eq;

    fn placeholders(pairs: &[(&str, &str)]) -> PlaceholderMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_substitute_known_placeholder() {
        let map = placeholders(&[("suffix", "v2")]);
        assert_eq!(substitute_placeholders("Table_{{suffix}}", &map), "Table_v2");
        assert_eq!(substitute_placeholders("{{ suffix }}-{{suffix}}", &map), "v2-v2");
    }

    #[test]
    fn test_unknown_and_malformed_left_verbatim() {
        let map = placeholders(&[("suffix", "v2")]);
        assert_eq!(
            substitute_placeholders("{{other}}_{{suffix}}", &map),
            "{{other}}_v2"
        );
        assert_eq!(substitute_placeholders("{{suffix}}_{{open", &map), "v2_{{open");
        assert_eq!(substitute_placeholders("a }} b", &map), "a }} b");
    }

    #[test]
    fn test_empty_map_copies_verbatim() {
        let template = Properties::new()
            .with("qualifiedName", "Table_{{suffix}}")
            .with("count", 4i64)
            .with("ratio", 0.25)
            .with("flags", vec!["x".to_string()]);

        let copy = apply_template_properties(&template, &PlaceholderMap::new());
        assert_eq!(copy, template);
    }

    #[test]
    fn test_substitution_reaches_nested_values() {
        let mut nested = BTreeMap::new();
        nested.insert("k".to_string(), PropertyValue::from("{{env}}"));
        let mut template = Properties::new().with("list", vec!["{{env}}-a".to_string()]);
        template.insert("map", PropertyValue::Map(nested));

        let copy = apply_template_properties(&template, &placeholders(&[("env", "prod")]));

        assert_eq!(
            copy.get("list"),
            Some(&PropertyValue::Array(vec![PropertyValue::from("prod-a")]))
        );
        match copy.get("map") {
            Some(PropertyValue::Map(map)) => assert_eq!(map.get("k"), Some(&PropertyValue::from("prod"))),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_reserved_classifications_not_inherited() {
        let template = vec![
            Classification::anchored_to("a", "Asset"),
            Classification::Template(TemplateProperties::default()),
            Classification::TemplateSubstitute,
            Classification::LatestChange(Properties::new()),
            Classification::Other {
                name: "Confidentiality".to_string(),
                properties: Properties::new().with("owner", "{{team}}"),
            },
        ];

        let copied = apply_template_classifications(&template, &placeholders(&[("team", "ops")]));

        assert_eq!(
            copied,
            vec![Classification::Other {
                name: "Confidentiality".to_string(),
                properties: Properties::new().with("owner", "ops"),
            }]
        );
    }

    #[test]
    fn test_builder_caller_wins() {
        let template_props = Properties::new()
            .with("qualifiedName", "template")
            .with("description", "from template");
        let template_classes = vec![
            Classification::ZoneMembership { zones: vec!["a".to_string()] },
            Classification::Other {
                name: "Criticality".to_string(),
                properties: Properties::new(),
            },
        ];

        let (properties, classifications) = PropertyBuilder::new()
            .with_template_properties(&template_props, &PlaceholderMap::new())
            .with_template_classifications(&template_classes, &PlaceholderMap::new())
            .with_property("qualifiedName", "copy")
            .with_classification(Classification::ZoneMembership { zones: vec!["b".to_string()] })
            .build();

        assert_eq!(properties.get_str("qualifiedName"), Some("copy"));
        assert_eq!(properties.get_str("description"), Some("from template"));
        assert_eq!(
            classifications,
            vec![
                Classification::Other {
                    name: "Criticality".to_string(),
                    properties: Properties::new(),
                },
                Classification::ZoneMembership { zones: vec!["b".to_string()] },
            ]
        );
    }
}

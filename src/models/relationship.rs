//! Relationship model: typed, directed edges between two entities.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{EntityProxy, Properties};

/// Which end of a relationship an entity sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationshipEnd {
    One,
    Two,
}

/// A typed, property-bearing edge from `end_one` to `end_two`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Relationship {
    pub guid: String,
    pub type_guid: String,
    pub type_name: String,
    #[serde(default = "first_version")]
    pub version: i64,
    pub end_one: EntityProxy,
    pub end_two: EntityProxy,
    #[serde(default)]
    pub properties: Properties,
    /// Start of the window in which the link is active; `None` is unbounded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effective_from: Option<DateTime<Utc>>,
    /// End of the window in which the link is active; `None` is unbounded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effective_to: Option<DateTime<Utc>>,
}

fn first_version() -> i64 {
    1
}

impl Relationship {
    /// Returns the end opposite `guid` and the end `guid` itself occupies.
    ///
    /// For a relationship from an entity to itself the far end is end two.
    pub fn far_end(&self, guid: &str) -> Option<(&EntityProxy, RelationshipEnd)> {
        if self.end_one.guid == guid {
            Some((&self.end_two, RelationshipEnd::One))
        } else if self.end_two.guid == guid {
            Some((&self.end_one, RelationshipEnd::Two))
        } else {
            None
        }
    }

    /// Whether the effectivity window contains `time`.
    pub fn is_effective_at(&self, time: DateTime<Utc>) -> bool {
        self.effective_from.map_or(true, |from| from <= time)
            && self.effective_to.map_or(true, |to| time < to)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn proxy(guid: &str) -> EntityProxy {
        EntityProxy {
            guid: guid.to_string(),
            type_name: "Port".to_string(),
            classifications: Vec::new(),
        }
    }

    fn relationship(one: &str, two: &str) -> Relationship {
        Relationship {
            guid: "r1".to_string(),
            type_guid: "t".to_string(),
            type_name: "PortDelegation".to_string(),
            version: 1,
            end_one: proxy(one),
            end_two: proxy(two),
            properties: Properties::new(),
            effective_from: None,
            effective_to: None,
        }
    }

    #[test]
    fn test_far_end_from_either_side() {
        let rel = relationship("a", "b");

        let (far, end) = rel.far_end("a").unwrap();
        assert_eq!(far.guid, "b");
        assert_eq!(end, RelationshipEnd::One);

        let (far, end) = rel.far_end("b").unwrap();
        assert_eq!(far.guid, "a");
        assert_eq!(end, RelationshipEnd::Two);

        assert!(rel.far_end("c").is_none());
    }

    #[test]
    fn test_effectivity_window() {
        let now = Utc::now();
        let mut rel = relationship("a", "b");
        assert!(rel.is_effective_at(now));

        rel.effective_from = Some(now + Duration::hours(1));
        assert!(!rel.is_effective_at(now));

        rel.effective_from = Some(now - Duration::hours(2));
        rel.effective_to = Some(now - Duration::hours(1));
        assert!(!rel.is_effective_at(now));

        rel.effective_to = Some(now + Duration::hours(1));
        assert!(rel.is_effective_at(now));
    }
}

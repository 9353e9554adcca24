//! Element handler behaviour against the in-memory repository.

use std::sync::Arc;

use chrono::{Duration, Utc};

use anchored_templates::config::{Config, VisibilityConfig};
use anchored_templates::context::Context;
use anchored_templates::error::AppError;
use anchored_templates::models::{Classification, Entity, Properties, Relationship, QUALIFIED_NAME};
use anchored_templates::repositories::{InMemoryRepository, RequestOptions};
use anchored_templates::services::{
    Converter, ElementHandler, ElementSummary, SummaryConverter, TemplateRequest,
};
use pretty_assertions::assert_eq;

const USER: &str = "calliequartile";

fn entity(guid: &str, type_name: &str, anchor: Option<(&str, &str)>) -> Entity {
    let mut entity = Entity::new(guid, &format!("{}-type", type_name.to_lowercase()), type_name);
    entity.properties.insert(QUALIFIED_NAME, guid);
    if let Some((anchor, anchor_type)) = anchor {
        entity.set_classification(Classification::anchored_to(anchor, anchor_type));
    }
    entity
}

fn link(repo: &InMemoryRepository, guid: &str, type_name: &str, one: &str, two: &str) {
    repo.add_relationship(Relationship {
        guid: guid.to_string(),
        type_guid: format!("{}-type", type_name.to_lowercase()),
        type_name: type_name.to_string(),
        version: 1,
        end_one: repo.entity(one).unwrap().proxy(),
        end_two: repo.entity(two).unwrap().proxy(),
        properties: Properties::new(),
        effective_from: None,
        effective_to: None,
    })
    .unwrap();
}

/// A deployed API template with one operation and a shared endpoint.
fn api_repository() -> Arc<InMemoryRepository> {
    let repo = Arc::new(InMemoryRepository::with_standard_types());
    repo.add_entity(entity("api", "DeployedAPI", Some(("api", "DeployedAPI"))));
    repo.add_entity(entity("op", "APIOperation", Some(("api", "DeployedAPI"))));
    repo.add_entity(entity("endpoint", "Endpoint", None));
    link(&repo, "r1", "APIOperations", "api", "op");
    link(&repo, "r2", "APIEndpoint", "api", "endpoint");
    repo
}

fn handler(repo: &Arc<InMemoryRepository>) -> ElementHandler {
    Context::new(repo.clone(), Config::default()).resolve()
}

#[tokio::test]
async fn test_create_then_get_element() {
    let repo = api_repository();
    let handler = handler(&repo);

    let guid = handler
        .create_from_template(
            USER,
            TemplateRequest::new("api")
                .with_unique_key("payments-api")
                .with_property("name", "Payments")
                .deep_copy(true),
        )
        .await
        .unwrap();
    let summary = handler
        .get_element(USER, &guid, Some("Asset"), &RequestOptions::default())
        .await.unwrap();

    assert_eq!(summary.guid, guid);
    assert_eq!(summary.type_name, "DeployedAPI");
    assert_eq!(summary.qualified_name.as_deref(), Some("payments-api"));
    assert_eq!(summary.display_name.as_deref(), Some("Payments"));
    assert_eq!(summary.anchor_guid.as_deref(), Some(guid.as_str()));

    let mut related: Vec<(String, String)> = summary
        .related
        .iter()
        .map(|r| (r.relationship_type.clone(), r.type_name.clone()))
        .collect();
    related.sort();
    assert_eq!(
        related,
        vec![
            ("APIEndpoint".to_string(), "Endpoint".to_string()),
            ("APIOperations".to_string(), "APIOperation".to_string()),
            ("SourcedFrom".to_string(), "DeployedAPI".to_string()),
        ]
    );
    let endpoint = summary
        .related
        .iter()
        .find(|r| r.relationship_type == "APIEndpoint")
        .unwrap();
    assert_eq!(endpoint.guid, "endpoint");
}

#[tokio::test]
async fn test_get_element_checks_type() {
    let repo = api_repository();

    let err = handler(&repo)
        .get_element(USER, "endpoint", Some("Asset"), &RequestOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::TypeMismatch { .. }));
}

#[tokio::test]
async fn test_get_element_hidden_by_anchor_zone() {
    let repo = api_repository();
    let mut api = repo.entity("api").unwrap();
    api.set_classification(Classification::ZoneMembership {
        zones: vec!["restricted".to_string()],
    });
    repo.add_entity(api);
    let config = Config {
        visibility: VisibilityConfig {
            supported_zones: vec!["public".to_string()],
        },
        ..Config::default()
    };
    let handler: ElementHandler = Context::new(repo.clone(), config).resolve();

    let options = RequestOptions::default();
    let err = handler.get_element(USER, "op", None, &options).await.unwrap_err();
    assert!(matches!(err, AppError::InvisibleEntity(guid) if guid == "op"));

    assert!(handler.get_element(USER, "endpoint", None, &options).await.is_ok());
}

#[tokio::test]
async fn test_template_source() {
    let repo = api_repository();
    let handler = handler(&repo);
    let guid = handler
        .create_from_template(USER, TemplateRequest::new("api").with_unique_key("copy"))
        .await
        .unwrap();

    let options = RequestOptions::default();
    let source = handler
        .template_source(USER, &guid, &options)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(source.template.guid, "api");
    assert_eq!(source.source_version, Some(1));

    assert!(handler
        .template_source(USER, "api", &options)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_template_source_honours_effective_time() {
    let repo = api_repository();
    repo.add_entity(entity("copy", "DeployedAPI", Some(("copy", "DeployedAPI"))));
    let retired = Utc::now() - Duration::days(1);
    let mut provenance = Properties::new();
    provenance.insert("sourceVersionNumber", 3_i64);
    repo.add_relationship(Relationship {
        guid: "sf".to_string(),
        type_guid: "sourcedfrom-type".to_string(),
        type_name: "SourcedFrom".to_string(),
        version: 1,
        end_one: repo.entity("copy").unwrap().proxy(),
        end_two: repo.entity("api").unwrap().proxy(),
        properties: provenance,
        effective_from: None,
        effective_to: Some(retired),
    })
    .unwrap();
    let handler = handler(&repo);

    let now = RequestOptions::default();
    assert!(handler
        .template_source(USER, "copy", &now)
        .await
        .unwrap()
        .is_none());
    let summary = handler.get_element(USER, "copy", None, &now).await.unwrap();
    assert!(summary.related.is_empty());

    let before_retirement = RequestOptions {
        effective_time: Some(retired - Duration::hours(1)),
        ..RequestOptions::default()
    };
    let source = handler
        .template_source(USER, "copy", &before_retirement)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(source.template.guid, "api");
    assert_eq!(source.source_version, Some(3));
    let summary = handler
        .get_element(USER, "copy", None, &before_retirement)
        .await
        .unwrap();
    assert_eq!(summary.related.len(), 1);
    assert_eq!(summary.related[0].relationship_type, "SourcedFrom");
}

/// Reports only the names of related elements' types.
#[derive(Default)]
struct RelatedTypes;

impl Converter for RelatedTypes {
    type Bean = Vec<String>;

    fn convert(&self, entity: &Entity, relationships: &[Relationship]) -> Result<Vec<String>, AppError> {
        let mut types: Vec<String> = relationships
            .iter()
            .filter_map(|r| r.far_end(&entity.guid))
            .map(|(far, _)| far.type_name.clone())
            .collect();
        types.sort();
        Ok(types)
    }
}

#[tokio::test]
async fn test_custom_converter() {
    let repo = api_repository();
    let ctx = Context::new(repo.clone(), Config::default());

    let handler: ElementHandler<RelatedTypes> = ctx.resolve();
    let options = RequestOptions::default();
    let types = handler.get_element(USER, "api", None, &options).await.unwrap();
    assert_eq!(types, vec!["APIOperation".to_string(), "Endpoint".to_string()]);

    let summaries: ElementHandler<SummaryConverter> = ctx.resolve();
    let summary: ElementSummary = summaries.get_element(USER, "op", None, &options).await.unwrap();
    assert_eq!(summary.anchor_guid.as_deref(), Some("api"));
}

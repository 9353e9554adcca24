//! In-memory repository gateway.
//!
//! Holds the whole repository in process behind a single lock. Used by the
//! command line to replicate templates from a JSON fixture and by tests to
//! observe exactly what a replication run created.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::models::{
    generate_guid, Classification, Entity, EntityProxy, Properties, Relationship, TypeCategory,
    TypeDef, REFERENCEABLE, SOURCED_FROM, SPECIFICATION_PROPERTY_ASSIGNMENT,
};
use crate::repositories::gateway::{NewEntity, NewRelationship, RepositoryGateway, RequestOptions};

/// Entity types registered by [`InMemoryRepository::with_standard_types`], with their super type.
const STANDARD_ENTITY_TYPES: &[(&str, Option<&str>)] = &[
    (REFERENCEABLE, None),
    ("Asset", Some(REFERENCEABLE)),
    ("DataSet", Some("Asset")),
    ("DeployedAPI", Some("Asset")),
    ("Process", Some("Asset")),
    ("APIOperation", Some(REFERENCEABLE)),
    ("Port", Some(REFERENCEABLE)),
    ("PortImplementation", Some("Port")),
    ("PortAlias", Some("Port")),
    ("SchemaElement", Some(REFERENCEABLE)),
    ("SchemaType", Some("SchemaElement")),
    ("ComplexSchemaType", Some("SchemaType")),
    ("SchemaAttribute", Some("SchemaElement")),
    ("Connection", Some(REFERENCEABLE)),
    ("ConnectorType", Some(REFERENCEABLE)),
    ("Endpoint", Some(REFERENCEABLE)),
    ("ExternalReference", Some(REFERENCEABLE)),
    ("Comment", Some(REFERENCEABLE)),
    ("Like", None),
    ("Rating", None),
];

/// Relationship types registered by [`InMemoryRepository::with_standard_types`].
const STANDARD_RELATIONSHIP_TYPES: &[&str] = &[
    SOURCED_FROM,
    SPECIFICATION_PROPERTY_ASSIGNMENT,
    "APIOperations",
    "APIEndpoint",
    "ProcessPort",
    "PortDelegation",
    "PortSchema",
    "AssetSchemaType",
    "AttributeForSchema",
    "NestedSchemaAttribute",
    "SchemaAttributeType",
    "ConnectionEndpoint",
    "ConnectionConnectorType",
    "ConnectionToAsset",
    "ExternalReferenceLink",
    "AttachedComment",
    "AttachedLike",
    "AttachedRating",
];

/// Serialized repository contents used to seed an [`InMemoryRepository`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Fixture {
    #[serde(default)]
    pub types: Vec<TypeDef>,
    #[serde(default)]
    pub entities: Vec<Entity>,
    #[serde(default)]
    pub relationships: Vec<Relationship>,
}

/// A relationship as stored: ends are kept by GUID and resolved on read.
#[derive(Debug, Clone)]
struct StoredRelationship {
    guid: String,
    type_guid: String,
    type_name: String,
    version: i64,
    end_one: String,
    end_two: String,
    properties: Properties,
    effective_from: Option<DateTime<Utc>>,
    effective_to: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct MemoryState {
    types: HashMap<String, TypeDef>,
    entities: HashMap<String, Entity>,
    /// Creation order, which is also listing order.
    relationships: Vec<StoredRelationship>,
    denied_users: HashSet<String>,
    /// `(user, type)` pairs that may not create that type or its subtypes.
    creation_restrictions: Vec<(String, String)>,
    /// Creates left before every further create fails.
    remaining_creates: Option<usize>,
}

impl MemoryState {
    fn is_type_of(&self, type_name: &str, super_type: &str) -> bool {
        let mut current = Some(type_name);
        let mut hops = 0;
        while let Some(name) = current {
            if name == super_type {
                return true;
            }
            hops += 1;
            if hops > 64 {
                break;
            }
            current = self
                .types
                .get(name)
                .and_then(|t| t.super_type.as_deref());
        }
        false
    }

    fn authorize(&self, user_id: &str, action: &str) -> Result<(), AppError> {
        if self.denied_users.contains(user_id) {
            return Err(AppError::Unauthorized {
                user_id: user_id.to_string(),
                action: action.to_string(),
            });
        }
        Ok(())
    }

    fn authorize_creation(&self, user_id: &str, type_name: &str) -> Result<(), AppError> {
        let action = format!("create {}", type_name);
        self.authorize(user_id, &action)?;
        let restricted = self
            .creation_restrictions
            .iter()
            .any(|(user, restricted)| user == user_id && self.is_type_of(type_name, restricted));
        if restricted {
            return Err(AppError::Unauthorized {
                user_id: user_id.to_string(),
                action,
            });
        }
        Ok(())
    }

    fn require_type(&self, type_name: &str, category: TypeCategory) -> Result<&TypeDef, AppError> {
        self.types
            .get(type_name)
            .filter(|t| t.category == category)
            .ok_or_else(|| AppError::UnknownType(type_name.to_string()))
    }

    fn consume_create(&mut self) -> Result<(), AppError> {
        match self.remaining_creates {
            Some(0) => Err(AppError::Repository(
                "repository refused further creates".to_string(),
            )),
            Some(ref mut n) => {
                *n -= 1;
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn proxy(&self, guid: &str) -> EntityProxy {
        match self.entities.get(guid) {
            Some(entity) => entity.proxy(),
            None => EntityProxy {
                guid: guid.to_string(),
                type_name: String::new(),
                classifications: Vec::new(),
            },
        }
    }

    fn materialize(&self, stored: &StoredRelationship) -> Relationship {
        Relationship {
            guid: stored.guid.clone(),
            type_guid: stored.type_guid.clone(),
            type_name: stored.type_name.clone(),
            version: stored.version,
            end_one: self.proxy(&stored.end_one),
            end_two: self.proxy(&stored.end_two),
            properties: stored.properties.clone(),
            effective_from: stored.effective_from,
            effective_to: stored.effective_to,
        }
    }
}

/// A [`RepositoryGateway`] that keeps everything in memory.
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    state: RwLock<MemoryState>,
}

impl InMemoryRepository {
    /// An empty repository with no types registered.
    pub fn new() -> Self {
        Self::default()
    }

    /// A repository preloaded with the standard type catalog.
    pub fn with_standard_types() -> Self {
        let repo = Self::new();
        for (name, super_type) in STANDARD_ENTITY_TYPES {
            repo.register_type(TypeDef::new(name, TypeCategory::Entity, *super_type));
        }
        for name in STANDARD_RELATIONSHIP_TYPES {
            repo.register_type(TypeDef::new(name, TypeCategory::Relationship, None));
        }
        repo
    }

    /// A repository with the standard types plus everything in the fixture.
    pub fn from_fixture(fixture: Fixture) -> Result<Self, AppError> {
        let repo = Self::with_standard_types();
        for type_def in fixture.types {
            repo.register_type(type_def);
        }
        for entity in fixture.entities {
            repo.add_entity(entity);
        }
        for relationship in fixture.relationships {
            repo.add_relationship(relationship)?;
        }
        Ok(repo)
    }

    pub fn register_type(&self, type_def: TypeDef) {
        self.state
            .write()
            .types
            .insert(type_def.name.clone(), type_def);
    }

    /// Stores an entity as-is, bypassing authorization and type checks.
    pub fn add_entity(&self, entity: Entity) {
        self.state
            .write()
            .entities
            .insert(entity.guid.clone(), entity);
    }

    /// Stores a relationship as-is; both ends must already exist.
    pub fn add_relationship(&self, relationship: Relationship) -> Result<(), AppError> {
        let mut state = self.state.write();
        for end in [&relationship.end_one, &relationship.end_two] {
            if !state.entities.contains_key(&end.guid) {
                return Err(AppError::EntityNotFound(end.guid.clone()));
            }
        }
        state.relationships.push(StoredRelationship {
            guid: relationship.guid,
            type_guid: relationship.type_guid,
            type_name: relationship.type_name,
            version: relationship.version,
            end_one: relationship.end_one.guid,
            end_two: relationship.end_two.guid,
            properties: relationship.properties,
            effective_from: relationship.effective_from,
            effective_to: relationship.effective_to,
        });
        Ok(())
    }

    /// Rejects every call made by `user_id`.
    pub fn deny_user(&self, user_id: &str) {
        self.state.write().denied_users.insert(user_id.to_string());
    }

    /// Rejects creation of `type_name` (and its subtypes) by `user_id`.
    pub fn restrict_creation(&self, user_id: &str, type_name: &str) {
        self.state
            .write()
            .creation_restrictions
            .push((user_id.to_string(), type_name.to_string()));
    }

    /// Lets `count` more creates succeed, then fails every create after that.
    pub fn fail_after_creates(&self, count: usize) {
        self.state.write().remaining_creates = Some(count);
    }

    pub fn entity(&self, guid: &str) -> Option<Entity> {
        self.state.read().entities.get(guid).cloned()
    }

    pub fn entities(&self) -> Vec<Entity> {
        let mut entities: Vec<Entity> = self.state.read().entities.values().cloned().collect();
        entities.sort_by(|a, b| a.guid.cmp(&b.guid));
        entities
    }

    pub fn entities_of_type(&self, type_name: &str) -> Vec<Entity> {
        self.entities()
            .into_iter()
            .filter(|e| e.type_name == type_name)
            .collect()
    }

    /// Every relationship in creation order.
    pub fn relationships(&self) -> Vec<Relationship> {
        let state = self.state.read();
        state
            .relationships
            .iter()
            .map(|r| state.materialize(r))
            .collect()
    }

    /// Every relationship attached to `guid` at either end, in creation order.
    pub fn relationships_of(&self, guid: &str) -> Vec<Relationship> {
        self.relationships()
            .into_iter()
            .filter(|r| r.end_one.guid == guid || r.end_two.guid == guid)
            .collect()
    }
}

#[async_trait]
impl RepositoryGateway for InMemoryRepository {
    async fn get_entity(
        &self,
        user_id: &str,
        guid: &str,
        expected_type: Option<&str>,
        _options: &RequestOptions,
    ) -> Result<Entity, AppError> {
        let state = self.state.read();
        state.authorize(user_id, &format!("read entity {}", guid))?;

        let entity = state
            .entities
            .get(guid)
            .ok_or_else(|| AppError::EntityNotFound(guid.to_string()))?;

        if let Some(expected) = expected_type {
            if !state.types.contains_key(expected) {
                return Err(AppError::UnknownType(expected.to_string()));
            }
            if !state.is_type_of(&entity.type_name, expected) {
                return Err(AppError::TypeMismatch {
                    guid: guid.to_string(),
                    expected: expected.to_string(),
                    actual: entity.type_name.clone(),
                });
            }
        }

        Ok(entity.clone())
    }

    async fn create_entity(
        &self,
        user_id: &str,
        entity: NewEntity,
        _options: &RequestOptions,
    ) -> Result<String, AppError> {
        let mut state = self.state.write();
        state.authorize_creation(user_id, &entity.type_name)?;
        let type_guid = state
            .require_type(&entity.type_name, TypeCategory::Entity)?
            .guid
            .clone();
        state.consume_create()?;

        let guid = generate_guid();
        let stored = Entity {
            guid: guid.clone(),
            type_guid,
            type_name: entity.type_name,
            version: 1,
            status: entity.status,
            properties: entity.properties,
            classifications: entity.classifications,
            metadata_collection_id: entity.external_source.map(|s| s.guid),
            created_by: user_id.to_string(),
            create_time: Utc::now(),
        };
        state.entities.insert(guid.clone(), stored);

        Ok(guid)
    }

    async fn classify_entity(
        &self,
        user_id: &str,
        guid: &str,
        classification: Classification,
        _options: &RequestOptions,
    ) -> Result<(), AppError> {
        let mut state = self.state.write();
        state.authorize(user_id, &format!("classify entity {}", guid))?;

        let entity = state
            .entities
            .get_mut(guid)
            .ok_or_else(|| AppError::EntityNotFound(guid.to_string()))?;
        entity.set_classification(classification);
        entity.version += 1;

        Ok(())
    }

    async fn create_relationship(
        &self,
        user_id: &str,
        relationship: NewRelationship,
        _options: &RequestOptions,
    ) -> Result<String, AppError> {
        let mut state = self.state.write();
        state.authorize_creation(user_id, &relationship.type_name)?;
        let type_guid = state
            .require_type(&relationship.type_name, TypeCategory::Relationship)?
            .guid
            .clone();
        for end in [&relationship.end_one_guid, &relationship.end_two_guid] {
            if !state.entities.contains_key(end.as_str()) {
                return Err(AppError::EntityNotFound(end.clone()));
            }
        }
        state.consume_create()?;

        let guid = generate_guid();
        state.relationships.push(StoredRelationship {
            guid: guid.clone(),
            type_guid,
            type_name: relationship.type_name,
            version: 1,
            end_one: relationship.end_one_guid,
            end_two: relationship.end_two_guid,
            properties: relationship.properties,
            effective_from: relationship.effective_from,
            effective_to: relationship.effective_to,
        });

        Ok(guid)
    }

    async fn list_relationships(
        &self,
        user_id: &str,
        entity_guid: &str,
        type_filter: Option<&str>,
        start_from: usize,
        page_size: usize,
        options: &RequestOptions,
    ) -> Result<Vec<Relationship>, AppError> {
        let state = self.state.read();
        state.authorize(user_id, &format!("list relationships of {}", entity_guid))?;
        if !state.entities.contains_key(entity_guid) {
            return Err(AppError::EntityNotFound(entity_guid.to_string()));
        }

        let at = options.effective_time.unwrap_or_else(Utc::now);
        let page = state
            .relationships
            .iter()
            .filter(|r| r.end_one == entity_guid || r.end_two == entity_guid)
            .filter(|r| type_filter.map_or(true, |t| state.is_type_of(&r.type_name, t)))
            .map(|r| state.materialize(r))
            .filter(|r| r.is_effective_at(at))
            .skip(start_from)
            .take(page_size)
            .collect();

        Ok(page)
    }

    async fn get_type(&self, type_name: &str) -> Result<TypeDef, AppError> {
        self.state
            .read()
            .types
            .get(type_name)
            .cloned()
            .ok_or_else(|| AppError::UnknownType(type_name.to_string()))
    }

    async fn is_type_of(&self, type_name: &str, super_type: &str) -> Result<bool, AppError> {
        let state = self.state.read();
        if !state.types.contains_key(type_name) {
            return Err(AppError::UnknownType(type_name.to_string()));
        }
        Ok(state.is_type_of(type_name, super_type))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EntityStatus;

    const USER: &str = "garygeeke";

    fn new_port(name: &str) -> NewEntity {
        NewEntity {
            type_guid: String::new(),
            type_name: "Port".to_string(),
            external_source: None,
            properties: Properties::new().with("qualifiedName", name),
            classifications: Vec::new(),
            status: EntityStatus::Active,
        }
    }

    fn link(type_name: &str, one: &str, two: &str) -> NewRelationship {
        NewRelationship {
            type_guid: String::new(),
            type_name: type_name.to_string(),
            external_source: None,
            end_one_guid: one.to_string(),
            end_two_guid: two.to_string(),
            properties: Properties::new(),
            effective_from: None,
            effective_to: None,
        }
    }

    #[tokio::test]
    async fn test_create_and_get_entity() {
        let repo = InMemoryRepository::with_standard_types();
        let options = RequestOptions::default();

        let guid = repo.create_entity(USER, new_port("p1"), &options).await.unwrap();
        let entity = repo.get_entity(USER, &guid, Some(REFERENCEABLE), &options).await.unwrap();

        assert_eq!(entity.type_name, "Port");
        assert_eq!(entity.type_guid, "port-type");
        assert_eq!(entity.created_by, USER);
        assert_eq!(entity.qualified_name(), Some("p1"));
    }

    #[tokio::test]
    async fn test_get_entity_type_mismatch() {
        let repo = InMemoryRepository::with_standard_types();
        let options = RequestOptions::default();
        let guid = repo.create_entity(USER, new_port("p1"), &options).await.unwrap();

        let err = repo
            .get_entity(USER, &guid, Some("Asset"), &options)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::TypeMismatch { .. }));
    }

    #[tokio::test]
    async fn test_unknown_entity_type_rejected() {
        let repo = InMemoryRepository::with_standard_types();
        let mut entity = new_port("p1");
        entity.type_name = "Spaceship".to_string();

        let err = repo
            .create_entity(USER, entity, &RequestOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::UnknownType(name) if name == "Spaceship"));
    }

    #[tokio::test]
    async fn test_list_relationships_pages_in_creation_order() {
        let repo = InMemoryRepository::with_standard_types();
        let options = RequestOptions::default();
        let hub = repo.create_entity(USER, new_port("hub"), &options).await.unwrap();
        let mut spokes = Vec::new();
        for i in 0..5 {
            let spoke = repo
                .create_entity(USER, new_port(&format!("spoke{}", i)), &options)
                .await
                .unwrap();
            repo.create_relationship(USER, link("PortDelegation", &spoke, &hub), &options)
                .await
                .unwrap();
            spokes.push(spoke);
        }

        let first = repo.list_relationships(USER, &hub, None, 0, 2, &options).await.unwrap();
        let rest = repo.list_relationships(USER, &hub, None, 2, 10, &options).await.unwrap();

        assert_eq!(first.len(), 2);
        assert_eq!(rest.len(), 3);
        assert_eq!(first[0].end_one.guid, spokes[0]);
        assert_eq!(rest[2].end_one.guid, spokes[4]);
    }

    #[tokio::test]
    async fn test_list_relationships_type_filter_and_effectivity() {
        let repo = InMemoryRepository::with_standard_types();
        let options = RequestOptions::default();
        let a = repo.create_entity(USER, new_port("a"), &options).await.unwrap();
        let b = repo.create_entity(USER, new_port("b"), &options).await.unwrap();

        repo.create_relationship(USER, link("PortDelegation", &a, &b), &options)
            .await
            .unwrap();
        repo.create_relationship(USER, link(SOURCED_FROM, &a, &b), &options)
            .await
            .unwrap();
        let mut expired = link("PortSchema", &a, &b);
        expired.effective_to = Some(Utc::now() - chrono::Duration::days(1));
        repo.create_relationship(USER, expired, &options).await.unwrap();

        let all = repo.list_relationships(USER, &a, None, 0, 10, &options).await.unwrap();
        assert_eq!(all.len(), 2);

        let sourced = repo
            .list_relationships(USER, &b, Some(SOURCED_FROM), 0, 10, &options)
            .await
            .unwrap();
        assert_eq!(sourced.len(), 1);
        assert_eq!(sourced[0].type_name, SOURCED_FROM);
    }

    #[tokio::test]
    async fn test_denied_user() {
        let repo = InMemoryRepository::with_standard_types();
        repo.deny_user("mallory");

        let err = repo
            .create_entity("mallory", new_port("p"), &RequestOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "UNAUTHORIZED");
    }

    #[tokio::test]
    async fn test_creation_restriction_covers_subtypes() {
        let repo = InMemoryRepository::with_standard_types();
        repo.restrict_creation(USER, "Port");
        let mut alias = new_port("alias");
        alias.type_name = "PortAlias".to_string();

        let err = repo
            .create_entity(USER, alias, &RequestOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Unauthorized { .. }));
    }

    #[tokio::test]
    async fn test_fail_after_creates() {
        let repo = InMemoryRepository::with_standard_types();
        let options = RequestOptions::default();
        repo.fail_after_creates(1);

        assert!(repo.create_entity(USER, new_port("a"), &options).await.is_ok());
        let err = repo.create_entity(USER, new_port("b"), &options).await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(repo.entities().len(), 1);
    }

    #[tokio::test]
    async fn test_classify_replaces_and_bumps_version() {
        let repo = InMemoryRepository::with_standard_types();
        let options = RequestOptions::default();
        let guid = repo.create_entity(USER, new_port("a"), &options).await.unwrap();

        repo.classify_entity(USER, &guid, Classification::anchored_to(&guid, "Port"), &options)
            .await
            .unwrap();
        let entity = repo.entity(&guid).unwrap();

        assert_eq!(entity.version, 2);
        assert_eq!(entity.classifications.len(), 1);
    }

    #[test]
    fn test_fixture_relationship_requires_ends() {
        let fixture: Fixture = serde_json::from_value(serde_json::json!({
            "entities": [{"guid": "a", "typeGuid": "port-type", "typeName": "Port"}],
            "relationships": [{
                "guid": "r",
                "typeGuid": "portdelegation-type",
                "typeName": "PortDelegation",
                "endOne": {"guid": "a", "typeName": "Port"},
                "endTwo": {"guid": "missing", "typeName": "Port"}
            }]
        }))
        .unwrap();

        let err = InMemoryRepository::from_fixture(fixture).unwrap_err();
        assert!(matches!(err, AppError::EntityNotFound(guid) if guid == "missing"));
    }
}

//! Anchor resolution and anchor-based visibility.

use std::sync::Arc;

use crate::config::Config;
use crate::context::{AppGateway, Context};
use crate::di::FromContext;
use crate::error::AppError;
use crate::models::{Classification, Classified, Entity, ZONE_MEMBERSHIP};
use crate::repositories::RequestOptions;

/// Finds the aggregate root an entity belongs to.
#[derive(FromContext, Clone)]
pub struct AnchorResolver {
    gateway: AppGateway,
    config: Arc<Config>,
}

impl AnchorResolver {
    pub fn new(gateway: AppGateway, config: Arc<Config>) -> Self {
        Self { gateway, config }
    }

    /// GUID of the anchor recorded on an entity or proxy, without any lookup.
    pub fn anchor_guid(element: &impl Classified) -> Option<String> {
        element.anchor_guid().map(str::to_string)
    }

    /// Returns the anchor entity, or `None` for a free-standing entity.
    ///
    /// A self-anchored entity is its own anchor. An anchor that no longer
    /// exists is treated as absent.
    pub async fn resolve_anchor(
        &self,
        user_id: &str,
        entity: &Entity,
        options: &RequestOptions,
    ) -> Result<Option<Entity>, AppError> {
        let Some(anchor_guid) = entity.anchor_guid() else {
            return Ok(None);
        };
        if anchor_guid == entity.guid {
            return Ok(Some(entity.clone()));
        }

        match self
            .gateway
            .get_entity(user_id, anchor_guid, None, options)
            .await
        {
            Ok(anchor) => Ok(Some(anchor)),
            Err(AppError::EntityNotFound(_)) => {
                tracing::warn!(
                    entity = %entity.guid,
                    anchor = %anchor_guid,
                    "Anchor entity is missing, treating entity as unanchored"
                );
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    /// Whether the entity's zone membership overlaps the supported zones.
    ///
    /// Entities without zones, and deployments without supported zones,
    /// are unrestricted.
    pub fn is_visible(&self, entity: &Entity) -> bool {
        let supported = &self.config.visibility.supported_zones;
        if supported.is_empty() {
            return true;
        }
        match entity.classification(ZONE_MEMBERSHIP) {
            Some(Classification::ZoneMembership { zones }) if !zones.is_empty() => {
                zones.iter().any(|zone| supported.contains(zone))
            }
            _ => true,
        }
    }

    /// Fails unless both the entity and its anchor are visible.
    ///
    /// Returns the resolved anchor so callers need not look it up again.
    pub async fn validate_visibility(
        &self,
        user_id: &str,
        entity: &Entity,
        options: &RequestOptions,
    ) -> Result<Option<Entity>, AppError> {
        if !self.is_visible(entity) {
            return Err(AppError::InvisibleEntity(entity.guid.clone()));
        }
        let anchor = self.resolve_anchor(user_id, entity, options).await?;
        if let Some(anchor) = &anchor {
            if !self.is_visible(anchor) {
                return Err(AppError::InvisibleEntity(entity.guid.clone()));
            }
        }
        Ok(anchor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VisibilityConfig;
    use crate::repositories::InMemoryRepository;

    const USER: &str = "erinoverview";

    fn resolver(repo: Arc<InMemoryRepository>, zones: &[&str]) -> AnchorResolver {
        let config = Config {
            visibility: VisibilityConfig {
                supported_zones: zones.iter().map(|z| z.to_string()).collect(),
            },
            ..Config::default()
        };
        AnchorResolver::new(repo, Arc::new(config))
    }

    fn asset(guid: &str) -> Entity {
        Entity::new(guid, "asset-type", "Asset")
    }

    #[tokio::test]
    async fn test_unanchored_entity() {
        let repo = Arc::new(InMemoryRepository::with_standard_types());
        let entity = asset("a");
        repo.add_entity(entity.clone());

        let anchor = resolver(repo, &[])
            .resolve_anchor(USER, &entity, &RequestOptions::default())
            .await
            .unwrap();
        assert!(anchor.is_none());
    }

    #[tokio::test]
    async fn test_self_and_foreign_anchor() {
        let repo = Arc::new(InMemoryRepository::with_standard_types());
        let mut root = asset("root");
        root.set_classification(Classification::anchored_to("root", "Asset"));
        let mut child = Entity::new("child", "port-type", "Port");
        child.set_classification(Classification::anchored_to("root", "Asset"));
        repo.add_entity(root.clone());
        repo.add_entity(child.clone());
        let resolver = resolver(repo, &[]);
        let options = RequestOptions::default();

        let own = resolver.resolve_anchor(USER, &root, &options).await.unwrap();
        assert_eq!(own.map(|e| e.guid), Some("root".to_string()));

        let parent = resolver.resolve_anchor(USER, &child, &options).await.unwrap();
        assert_eq!(parent.map(|e| e.guid), Some("root".to_string()));
        assert_eq!(AnchorResolver::anchor_guid(&child.proxy()), Some("root".to_string()));
    }

    #[tokio::test]
    async fn test_dangling_anchor_is_absent() {
        let repo = Arc::new(InMemoryRepository::with_standard_types());
        let mut child = asset("child");
        child.set_classification(Classification::anchored_to("gone", "Asset"));
        repo.add_entity(child.clone());

        let anchor = resolver(repo, &[])
            .resolve_anchor(USER, &child, &RequestOptions::default())
            .await
            .unwrap();
        assert!(anchor.is_none());
    }

    #[tokio::test]
    async fn test_invisible_anchor_hides_entity() {
        let repo = Arc::new(InMemoryRepository::with_standard_types());
        let mut root = asset("root");
        root.set_classification(Classification::ZoneMembership {
            zones: vec!["hr".to_string()],
        });
        let mut child = Entity::new("child", "port-type", "Port");
        child.set_classification(Classification::anchored_to("root", "Asset"));
        repo.add_entity(root);
        repo.add_entity(child.clone());

        let err = resolver(repo.clone(), &["sales"])
            .validate_visibility(USER, &child, &RequestOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvisibleEntity(guid) if guid == "child"));

        let anchor = resolver(repo, &["hr"])
            .validate_visibility(USER, &child, &RequestOptions::default())
            .await
            .unwrap();
        assert_eq!(anchor.map(|e| e.guid), Some("root".to_string()));
    }
}

//! Element retrieval and creation on top of the template engine.
//!
//! [`ElementHandler`] pairs the template engine with a [`Converter`] that turns
//! a stored entity and its relationships into the bean a caller works with.

use std::sync::Arc;

use serde::Serialize;

use crate::config::Config;
use crate::context::{AppGateway, Context};
use crate::di::FromContext;
use crate::error::AppError;
use crate::models::{
    Classified, Entity, EntityStatus, Relationship, SOURCED_FROM, SOURCE_VERSION_NUMBER,
};
use crate::repositories::RequestOptions;
use crate::services::anchors::AnchorResolver;
use crate::services::template::{TemplateHandler, TemplateRequest};

/// Turns a stored entity into a caller-facing bean.
pub trait Converter: Send + Sync {
    type Bean;

    fn convert(&self, entity: &Entity, relationships: &[Relationship])
        -> Result<Self::Bean, AppError>;
}

/// An element at the other end of one of a summary's relationships.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelatedElement {
    pub relationship_guid: String,
    pub relationship_type: String,
    pub guid: String,
    pub type_name: String,
}

/// A flattened view of an element.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ElementSummary {
    pub guid: String,
    pub type_name: String,
    pub version: i64,
    pub status: EntityStatus,
    pub qualified_name: Option<String>,
    pub display_name: Option<String>,
    pub anchor_guid: Option<String>,
    pub template_substitute: bool,
    pub related: Vec<RelatedElement>,
}

/// Builds [`ElementSummary`] beans.
#[derive(Debug, Clone, Copy, Default)]
pub struct SummaryConverter;

impl Converter for SummaryConverter {
    type Bean = ElementSummary;

    fn convert(
        &self,
        entity: &Entity,
        relationships: &[Relationship],
    ) -> Result<ElementSummary, AppError> {
        let related = relationships
            .iter()
            .filter_map(|r| {
                let (far, _) = r.far_end(&entity.guid)?;
                Some(RelatedElement {
                    relationship_guid: r.guid.clone(),
                    relationship_type: r.type_name.clone(),
                    guid: far.guid.clone(),
                    type_name: far.type_name.clone(),
                })
            })
            .collect();

        Ok(ElementSummary {
            guid: entity.guid.clone(),
            type_name: entity.type_name.clone(),
            version: entity.version,
            status: entity.status,
            qualified_name: entity.qualified_name().map(str::to_string),
            display_name: entity
                .properties
                .get_str("displayName")
                .or_else(|| entity.properties.get_str("name"))
                .map(str::to_string),
            anchor_guid: entity.anchor_guid().map(str::to_string),
            template_substitute: entity.is_template_substitute(),
            related,
        })
    }
}

/// The template an element was copied from.
#[derive(Debug, Clone, Serialize)]
pub struct TemplateSource {
    pub template: Entity,
    /// Template version at the time of the copy, when recorded.
    pub source_version: Option<i64>,
}

/// Creates elements from templates and reads them back as beans.
#[derive(FromContext, Clone)]
pub struct ElementHandler<C: Converter = SummaryConverter> {
    gateway: AppGateway,
    anchors: AnchorResolver,
    templates: TemplateHandler,
    config: Arc<Config>,
    #[from_context(default)]
    converter: C,
}

impl<C: Converter> ElementHandler<C> {
    pub fn new(gateway: AppGateway, config: Arc<Config>, converter: C) -> Self {
        Self {
            anchors: AnchorResolver::new(gateway.clone(), config.clone()),
            templates: TemplateHandler::new(gateway.clone(), config.clone()),
            gateway,
            config,
            converter,
        }
    }

    /// Creates an element from a template and returns its GUID.
    pub async fn create_from_template(
        &self,
        user_id: &str,
        request: TemplateRequest,
    ) -> Result<String, AppError> {
        self.templates.create_from_template(user_id, request).await
    }

    /// Retrieves a visible element, optionally checking its type.
    pub async fn get_element(
        &self,
        user_id: &str,
        guid: &str,
        type_name: Option<&str>,
        options: &RequestOptions,
    ) -> Result<C::Bean, AppError> {
        let entity = self
            .gateway
            .get_entity(user_id, guid, type_name, options)
            .await?;
        self.anchors
            .validate_visibility(user_id, &entity, options)
            .await?;

        let relationships = self.relationships(user_id, guid, None, options).await?;
        self.converter.convert(&entity, &relationships)
    }

    /// Follows an element's `SourcedFrom` link back to its template.
    ///
    /// Returns `None` for elements that were not created from a template.
    pub async fn template_source(
        &self,
        user_id: &str,
        guid: &str,
        options: &RequestOptions,
    ) -> Result<Option<TemplateSource>, AppError> {
        let links = self
            .relationships(user_id, guid, Some(SOURCED_FROM), options)
            .await?;
        let Some(link) = links.into_iter().find(|r| r.end_one.guid == guid) else {
            return Ok(None);
        };

        let template = self
            .gateway
            .get_entity(user_id, &link.end_two.guid, None, options)
            .await?;
        Ok(Some(TemplateSource {
            template,
            source_version: link
                .properties
                .get(SOURCE_VERSION_NUMBER)
                .and_then(|v| v.as_i64()),
        }))
    }

    async fn relationships(
        &self,
        user_id: &str,
        guid: &str,
        type_filter: Option<&str>,
        options: &RequestOptions,
    ) -> Result<Vec<Relationship>, AppError> {
        let page_size = self.config.replication.page_size.max(1);
        let mut all = Vec::new();
        loop {
            let page = self
                .gateway
                .list_relationships(user_id, guid, type_filter, all.len(), page_size, options)
                .await?;
            let fetched = page.len();
            all.extend(page);
            if fetched < page_size {
                break;
            }
        }
        Ok(all)
    }
}

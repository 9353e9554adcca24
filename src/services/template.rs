//! Template-based replication of anchored entity graphs.
//!
//! A template is an existing entity together with everything anchored to the
//! same aggregate that can be reached from it through relationships.
//! Replicating a template creates a new root entity from it and, for a deep
//! copy, walks the template graph once:
//!
//! - entities that belong to the template's aggregate are copied, and the
//!   relationships between them are recreated between the copies
//! - entities anchored elsewhere (or not anchored at all) are shared: the new
//!   copies are linked to the original entity instead
//!
//! Every copy is anchored to the same bean anchor (the new root, or the
//! template root's own anchor if it already belonged to another aggregate) and
//! carries a `SourcedFrom` link back to the entity it was copied from.
//!
//! The walk uses an explicit stack of frames bounded by
//! [`ReplicationConfig::max_depth`](crate::config::ReplicationConfig). Nothing
//! created before a failure is rolled back.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use serde::Serialize;

use crate::config::Config;
use crate::context::{AppGateway, Context};
use crate::di::FromContext;
use crate::error::AppError;
use crate::models::{
    Classification, Classified, Entity, EntityStatus, Properties, PropertyValue, Relationship,
    QUALIFIED_NAME, REFERENCEABLE, SOURCED_FROM, SOURCE_VERSION_NUMBER,
};
use crate::repositories::{ExternalSource, NewEntity, NewRelationship, RequestOptions};
use crate::services::anchors::AnchorResolver;
use crate::services::properties::{apply_template_properties, PlaceholderMap, PropertyBuilder};

// ============================================================================
// Request and Outcome
// ============================================================================

/// Parameters for creating an element from a template.
#[derive(Debug, Clone)]
pub struct TemplateRequest {
    /// GUID of the template entity (or of a template substitute).
    pub template_guid: String,
    /// Type the template must be an instance of.
    pub type_hint: Option<String>,
    /// Qualified name of the new root; also the prefix for nested copies.
    pub unique_key: Option<String>,
    /// Properties overriding the template's on the new root.
    pub properties: Properties,
    /// Classifications added to the new root.
    pub classifications: Vec<Classification>,
    /// Replacement text for `{{name}}` tokens in template values.
    pub placeholders: PlaceholderMap,
    /// Copy the template's anchored sub-graph, not just the template entity.
    pub deep_copy: bool,
    /// Mark the new root as a template substitute.
    pub as_substitute: bool,
    /// Status of every created entity.
    pub status: EntityStatus,
    pub external_source: Option<ExternalSource>,
    pub options: RequestOptions,
}

impl TemplateRequest {
    pub fn new(template_guid: &str) -> Self {
        Self {
            template_guid: template_guid.to_string(),
            type_hint: None,
            unique_key: None,
            properties: Properties::new(),
            classifications: Vec::new(),
            placeholders: PlaceholderMap::new(),
            deep_copy: false,
            as_substitute: false,
            status: EntityStatus::Active,
            external_source: None,
            options: RequestOptions::default(),
        }
    }

    pub fn with_type_hint(mut self, type_name: &str) -> Self {
        self.type_hint = Some(type_name.to_string());
        self
    }

    pub fn with_unique_key(mut self, qualified_name: &str) -> Self {
        self.unique_key = Some(qualified_name.to_string());
        self
    }

    pub fn with_property(mut self, name: &str, value: impl Into<PropertyValue>) -> Self {
        self.properties.insert(name, value);
        self
    }

    pub fn with_properties(mut self, properties: Properties) -> Self {
        self.properties.overlay(&properties);
        self
    }

    pub fn with_classification(mut self, classification: Classification) -> Self {
        self.classifications.push(classification);
        self
    }

    pub fn with_placeholder(mut self, name: &str, value: &str) -> Self {
        self.placeholders.insert(name.to_string(), value.to_string());
        self
    }

    pub fn with_placeholders(mut self, placeholders: PlaceholderMap) -> Self {
        self.placeholders.extend(placeholders);
        self
    }

    pub fn deep_copy(mut self, deep_copy: bool) -> Self {
        self.deep_copy = deep_copy;
        self
    }

    pub fn as_substitute(mut self, as_substitute: bool) -> Self {
        self.as_substitute = as_substitute;
        self
    }

    pub fn with_status(mut self, status: EntityStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_external_source(mut self, source: ExternalSource) -> Self {
        self.external_source = Some(source);
        self
    }

    pub fn with_options(mut self, options: RequestOptions) -> Self {
        self.options = options;
        self
    }
}

/// A template entity and the copy made from it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CopiedEntity {
    pub template_guid: String,
    pub guid: String,
    pub type_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qualified_name: Option<String>,
}

/// What a replication run created.
#[derive(Debug, Clone, Serialize)]
pub struct TemplateOutcome {
    /// GUID of the new root.
    pub guid: String,
    /// Anchor shared by every copy.
    pub anchor_guid: String,
    /// Version of the template root that was copied.
    pub template_version: i64,
    /// Copies in creation order; the root comes first.
    pub copies: Vec<CopiedEntity>,
    /// Every relationship created, including `SourcedFrom` links.
    pub created_relationships: Vec<String>,
    /// Pre-existing entities the copies were linked to without being copied.
    pub relinked: Vec<String>,
}

// ============================================================================
// Run State
// ============================================================================

/// Identity of the aggregate root stamped onto every copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnchorRef {
    pub guid: String,
    pub type_name: String,
}

/// Bookkeeping for one replication run.
#[derive(Debug, Default)]
pub struct TemplateProgress {
    /// Most recently created entity.
    pub new_guid: Option<String>,
    /// Version of the template root.
    pub template_version: Option<i64>,
    /// Template entity the current one was reached from.
    pub previous_template_guid: Option<String>,
    /// Template GUID to the GUID of its copy.
    pub covered_guids: HashMap<String, String>,
    /// Template relationships already recreated (or deliberately skipped).
    pub covered_relationships: HashSet<String>,
    /// Anchors whose members belong to the aggregate being copied.
    pub template_anchor_guids: HashSet<String>,
    pub bean_anchor: Option<AnchorRef>,
    sourced_from_type_guid: String,
    /// Times each generated qualified name has been handed out.
    qualified_names: HashMap<String, usize>,
    copies: Vec<CopiedEntity>,
    created_relationships: Vec<String>,
    relinked: Vec<String>,
}

impl TemplateProgress {
    /// Hands out `base`, or `base_<n>` when `base` was already used `n - 1` times.
    fn unique_name(&mut self, base: String) -> String {
        let count = self.qualified_names.entry(base.clone()).or_insert(0);
        *count += 1;
        if *count == 1 {
            base
        } else {
            format!("{}_{}", base, count)
        }
    }

    fn into_outcome(self) -> Result<TemplateOutcome, AppError> {
        let root = self
            .copies
            .first()
            .ok_or_else(|| AppError::Repository("replication created no entity".to_string()))?;
        let anchor = self
            .bean_anchor
            .as_ref()
            .ok_or_else(|| AppError::Repository("replication produced no anchor".to_string()))?;

        Ok(TemplateOutcome {
            guid: root.guid.clone(),
            anchor_guid: anchor.guid.clone(),
            template_version: self.template_version.unwrap_or(1),
            copies: self.copies,
            created_relationships: self.created_relationships,
            relinked: self.relinked,
        })
    }
}

/// A copied entity whose attachments are being walked.
struct Frame {
    template: Entity,
    new_guid: String,
    /// Qualified name given to the copy.
    unique_key: Option<String>,
    arrived_from: Option<String>,
    relationships: VecDeque<Relationship>,
    /// Relationship waiting for the frame above to finish copying its far end.
    pending: Option<Relationship>,
}

/// What to do with one template relationship.
enum EdgePlan {
    Skip,
    /// Recreate the relationship against an existing entity (a copy or a shared original).
    Link { far_guid: String },
    /// Copy the far end first, then recreate the relationship against the copy.
    Copy {
        far: Entity,
        unique_key: Option<String>,
    },
}

// ============================================================================
// Template Handler
// ============================================================================

/// Creates new elements by replicating templates.
#[derive(FromContext, Clone)]
pub struct TemplateHandler {
    gateway: AppGateway,
    anchors: AnchorResolver,
    config: Arc<Config>,
}

impl TemplateHandler {
    pub fn new(gateway: AppGateway, config: Arc<Config>) -> Self {
        Self {
            anchors: AnchorResolver::new(gateway.clone(), config.clone()),
            gateway,
            config,
        }
    }

    /// Creates a new element from a template and returns its GUID.
    pub async fn create_from_template(
        &self,
        user_id: &str,
        request: TemplateRequest,
    ) -> Result<String, AppError> {
        Ok(self.replicate(user_id, request).await?.guid)
    }

    /// Creates a new element from a template and reports everything created.
    pub async fn replicate(
        &self,
        user_id: &str,
        request: TemplateRequest,
    ) -> Result<TemplateOutcome, AppError> {
        if user_id.trim().is_empty() {
            return Err(AppError::invalid("user_id", "must not be empty"));
        }
        if request.template_guid.trim().is_empty() {
            return Err(AppError::invalid("template_guid", "must not be empty"));
        }
        let options = &request.options;

        let template = self
            .gateway
            .get_entity(
                user_id,
                &request.template_guid,
                request.type_hint.as_deref(),
                options,
            )
            .await?;
        let template = self.resolve_substitute(user_id, template, options).await?;
        let template_anchor = self
            .anchors
            .validate_visibility(user_id, &template, options)
            .await?;

        let unique_key = request
            .unique_key
            .clone()
            .filter(|key| !key.trim().is_empty());
        if request.deep_copy
            && unique_key.is_none()
            && self
                .gateway
                .is_type_of(&template.type_name, REFERENCEABLE)
                .await?
        {
            return Err(AppError::invalid(
                "unique_key",
                "required when deep copying a referenceable template",
            ));
        }

        tracing::info!(
            template = %template.guid,
            type_name = %template.type_name,
            deep_copy = request.deep_copy,
            "Creating element from template"
        );

        let mut progress = TemplateProgress {
            sourced_from_type_guid: self.gateway.get_type(SOURCED_FROM).await?.guid,
            template_version: Some(template.version),
            ..TemplateProgress::default()
        };
        // Entities anchored to the template root are part of the copy even
        // when the root records no anchor of its own.
        progress.template_anchor_guids.insert(template.guid.clone());
        if let Some(anchor) = template_anchor {
            if anchor.guid != template.guid {
                progress.bean_anchor = Some(AnchorRef {
                    guid: anchor.guid.clone(),
                    type_name: anchor.type_name.clone(),
                });
            }
            progress.template_anchor_guids.insert(anchor.guid);
        }

        let root = self
            .copy_entity(user_id, &request, &mut progress, template, unique_key, None)
            .await?;
        if request.deep_copy {
            self.copy_attachments(user_id, &request, &mut progress, root)
                .await?;
        }

        let outcome = progress.into_outcome()?;
        tracing::info!(
            guid = %outcome.guid,
            anchor = %outcome.anchor_guid,
            copies = outcome.copies.len(),
            relationships = outcome.created_relationships.len(),
            relinked = outcome.relinked.len(),
            "Created element from template"
        );
        Ok(outcome)
    }

    /// Follows a template substitute's `SourcedFrom` link to the real template.
    ///
    /// Only one hop is taken. A substitute without a link stands in for itself.
    async fn resolve_substitute(
        &self,
        user_id: &str,
        entity: Entity,
        options: &RequestOptions,
    ) -> Result<Entity, AppError> {
        if !entity.is_template_substitute() {
            return Ok(entity);
        }

        let links = self
            .gateway
            .list_relationships(
                user_id,
                &entity.guid,
                Some(SOURCED_FROM),
                0,
                self.config.replication.page_size.max(1),
                options,
            )
            .await?;
        let source = links
            .iter()
            .find(|r| r.end_one.guid == entity.guid)
            .map(|r| r.end_two.guid.clone());

        match source {
            Some(guid) => {
                tracing::debug!(substitute = %entity.guid, template = %guid, "Resolved template substitute");
                self.gateway.get_entity(user_id, &guid, None, options).await
            }
            None => {
                tracing::warn!(
                    substitute = %entity.guid,
                    "Template substitute has no SourcedFrom link, using it directly"
                );
                Ok(entity)
            }
        }
    }

    /// Creates the copy of one template entity and returns its frame.
    ///
    /// `arrived_from` is `None` only for the template root, whose anchor
    /// bookkeeping is already in `progress`.
    async fn copy_entity(
        &self,
        user_id: &str,
        request: &TemplateRequest,
        progress: &mut TemplateProgress,
        template: Entity,
        unique_key: Option<String>,
        arrived_from: Option<String>,
    ) -> Result<Frame, AppError> {
        let options = &request.options;
        let first = arrived_from.is_none();

        if !first {
            if let Some(anchor_guid) = AnchorResolver::anchor_guid(&template) {
                progress.template_anchor_guids.insert(anchor_guid);
            }
        }

        let mut builder = PropertyBuilder::new()
            .with_template_properties(&template.properties, &request.placeholders)
            .with_template_classifications(&template.classifications, &request.placeholders);
        if let Some(key) = &unique_key {
            builder = builder.with_property(QUALIFIED_NAME, key.as_str());
        }
        if first {
            builder = builder
                .with_properties(&request.properties)
                .with_classifications(&request.classifications);
            if request.as_substitute {
                builder = builder.with_classification(Classification::TemplateSubstitute);
            }
        }
        if let Some(anchor) = &progress.bean_anchor {
            builder = builder
                .with_classification(Classification::anchored_to(&anchor.guid, &anchor.type_name));
        }
        let (properties, classifications) = builder.build();
        let qualified_name = properties.get_str(QUALIFIED_NAME).map(str::to_string);

        let new_guid = self
            .gateway
            .create_entity(
                user_id,
                NewEntity {
                    type_guid: template.type_guid.clone(),
                    type_name: template.type_name.clone(),
                    external_source: request.external_source.clone(),
                    properties,
                    classifications,
                    status: request.status,
                },
                options,
            )
            .await?;

        if progress.bean_anchor.is_none() {
            let anchor = AnchorRef {
                guid: new_guid.clone(),
                type_name: template.type_name.clone(),
            };
            self.gateway
                .classify_entity(
                    user_id,
                    &new_guid,
                    Classification::anchored_to(&anchor.guid, &anchor.type_name),
                    options,
                )
                .await?;
            progress.bean_anchor = Some(anchor);
        }

        let link = self
            .gateway
            .create_relationship(
                user_id,
                NewRelationship {
                    type_guid: progress.sourced_from_type_guid.clone(),
                    type_name: SOURCED_FROM.to_string(),
                    external_source: request.external_source.clone(),
                    end_one_guid: new_guid.clone(),
                    end_two_guid: template.guid.clone(),
                    properties: Properties::new().with(SOURCE_VERSION_NUMBER, template.version),
                    effective_from: None,
                    effective_to: None,
                },
                options,
            )
            .await?;
        progress.created_relationships.push(link);

        tracing::debug!(template = %template.guid, copy = %new_guid, "Copied template entity");
        progress
            .covered_guids
            .insert(template.guid.clone(), new_guid.clone());
        progress.new_guid = Some(new_guid.clone());
        progress.copies.push(CopiedEntity {
            template_guid: template.guid.clone(),
            guid: new_guid.clone(),
            type_name: template.type_name.clone(),
            qualified_name: qualified_name.clone(),
        });

        let relationships = if request.deep_copy {
            self.attachments(user_id, &template.guid, options).await?
        } else {
            VecDeque::new()
        };

        Ok(Frame {
            template,
            new_guid,
            unique_key: qualified_name,
            arrived_from,
            relationships,
            pending: None,
        })
    }

    /// Every structural relationship attached to a template entity, all pages.
    async fn attachments(
        &self,
        user_id: &str,
        guid: &str,
        options: &RequestOptions,
    ) -> Result<VecDeque<Relationship>, AppError> {
        let page_size = self.config.replication.page_size.max(1);
        let mut relationships = VecDeque::new();
        let mut start_from = 0;

        loop {
            let page = self
                .gateway
                .list_relationships(user_id, guid, None, start_from, page_size, options)
                .await?;
            let fetched = page.len();
            relationships.extend(
                page.into_iter()
                    .filter(|r| !self.config.replication.is_excluded(&r.type_name)),
            );
            if fetched < page_size {
                break;
            }
            start_from += fetched;
        }

        Ok(relationships)
    }

    /// Walks the template graph below `root`, depth first.
    async fn copy_attachments(
        &self,
        user_id: &str,
        request: &TemplateRequest,
        progress: &mut TemplateProgress,
        root: Frame,
    ) -> Result<(), AppError> {
        let max_depth = self.config.replication.max_depth.max(1);
        let mut stack = vec![root];
        let mut finished: Option<String> = None;

        while let Some(top) = stack.len().checked_sub(1) {
            if let Some(child_guid) = finished.take() {
                if let Some(relationship) = stack[top].pending.take() {
                    let frame = &stack[top];
                    self.copy_relationship(
                        user_id,
                        request,
                        progress,
                        &relationship,
                        &frame.template.guid,
                        &frame.new_guid,
                        &child_guid,
                    )
                    .await?;
                }
            }

            let Some(relationship) = stack[top].relationships.pop_front() else {
                if let Some(done) = stack.pop() {
                    finished = Some(done.new_guid);
                }
                continue;
            };

            progress.previous_template_guid = stack[top].arrived_from.clone();
            let plan = self
                .plan_edge(user_id, request, progress, &stack[top], &relationship)
                .await?;

            match plan {
                EdgePlan::Skip => {}
                EdgePlan::Link { far_guid } => {
                    let frame = &stack[top];
                    self.copy_relationship(
                        user_id,
                        request,
                        progress,
                        &relationship,
                        &frame.template.guid,
                        &frame.new_guid,
                        &far_guid,
                    )
                    .await?;
                }
                EdgePlan::Copy { far, unique_key } => {
                    if stack.len() >= max_depth {
                        return Err(AppError::DepthExceeded {
                            max_depth,
                            guid: far.guid,
                        });
                    }
                    let arrived_from = Some(stack[top].template.guid.clone());
                    let child = self
                        .copy_entity(user_id, request, progress, far, unique_key, arrived_from)
                        .await?;
                    stack[top].pending = Some(relationship);
                    stack.push(child);
                }
            }
        }

        Ok(())
    }

    /// Decides whether a template relationship is skipped, relinked or
    /// needs its far end copied.
    async fn plan_edge(
        &self,
        user_id: &str,
        request: &TemplateRequest,
        progress: &mut TemplateProgress,
        frame: &Frame,
        relationship: &Relationship,
    ) -> Result<EdgePlan, AppError> {
        if progress.covered_relationships.contains(&relationship.guid) {
            return Ok(EdgePlan::Skip);
        }
        let Some((far_proxy, _)) = relationship.far_end(&frame.template.guid) else {
            tracing::warn!(
                relationship = %relationship.guid,
                entity = %frame.template.guid,
                "Listed relationship is not attached to the template entity"
            );
            return Ok(EdgePlan::Skip);
        };

        let options = &request.options;
        let far = self
            .gateway
            .get_entity(user_id, &far_proxy.guid, None, options)
            .await?;
        let far = self.resolve_substitute(user_id, far, options).await?;

        // The entity we came from handles every relationship it shares with
        // this one once the walk returns to it.
        if progress.previous_template_guid.as_deref() == Some(far.guid.as_str()) {
            return Ok(EdgePlan::Skip);
        }
        progress
            .covered_relationships
            .insert(relationship.guid.clone());

        if let Some(copy) = progress.covered_guids.get(&far.guid) {
            tracing::debug!(relationship = %relationship.guid, far = %far.guid, "Linking to existing copy");
            return Ok(EdgePlan::Link {
                far_guid: copy.clone(),
            });
        }

        match self
            .anchors
            .validate_visibility(user_id, &far, options)
            .await
        {
            Ok(_) => {}
            Err(AppError::InvisibleEntity(_)) => {
                tracing::debug!(relationship = %relationship.guid, far = %far.guid, "Skipping relationship to invisible entity");
                return Ok(EdgePlan::Skip);
            }
            Err(err) => return Err(err),
        }

        // A foreign anchor inherited by the new cluster is shared, never copied.
        let is_bean_anchor = progress
            .bean_anchor
            .as_ref()
            .is_some_and(|anchor| anchor.guid == far.guid);
        let in_aggregate = far
            .anchor_guid()
            .is_some_and(|anchor| progress.template_anchor_guids.contains(anchor));
        if is_bean_anchor || !in_aggregate {
            tracing::debug!(relationship = %relationship.guid, far = %far.guid, "Linking to shared entity");
            progress.relinked.push(far.guid.clone());
            return Ok(EdgePlan::Link { far_guid: far.guid });
        }

        let unique_key = if self
            .gateway
            .is_type_of(&far.type_name, REFERENCEABLE)
            .await?
        {
            // Without any unique key the new root's GUID is the prefix.
            let prefix = frame
                .unique_key
                .clone()
                .or_else(|| {
                    request
                        .unique_key
                        .clone()
                        .filter(|key| !key.trim().is_empty())
                })
                .or_else(|| progress.copies.first().map(|root| root.guid.clone()));
            prefix.map(|key| progress.unique_name(format!("{}::{}", key, far.type_name)))
        } else {
            None
        };

        tracing::debug!(relationship = %relationship.guid, far = %far.guid, "Copying anchored entity");
        Ok(EdgePlan::Copy { far, unique_key })
    }

    /// Recreates a template relationship between new (or shared) ends,
    /// keeping its direction, properties and effectivity window.
    #[allow(clippy::too_many_arguments)]
    async fn copy_relationship(
        &self,
        user_id: &str,
        request: &TemplateRequest,
        progress: &mut TemplateProgress,
        template: &Relationship,
        current_template_guid: &str,
        new_current_guid: &str,
        new_far_guid: &str,
    ) -> Result<(), AppError> {
        let (end_one, end_two) = if template.end_one.guid == current_template_guid {
            (new_current_guid, new_far_guid)
        } else {
            (new_far_guid, new_current_guid)
        };

        let guid = self
            .gateway
            .create_relationship(
                user_id,
                NewRelationship {
                    type_guid: template.type_guid.clone(),
                    type_name: template.type_name.clone(),
                    external_source: request.external_source.clone(),
                    end_one_guid: end_one.to_string(),
                    end_two_guid: end_two.to_string(),
                    properties: apply_template_properties(
                        &template.properties,
                        &request.placeholders,
                    ),
                    effective_from: template.effective_from,
                    effective_to: template.effective_to,
                },
                &request.options,
            )
            .await?;
        progress.created_relationships.push(guid);

        Ok(())
    }
}

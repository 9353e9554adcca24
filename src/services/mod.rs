//! Business logic layer.
//!
//! Services are built from [`Context`](crate::context::Context) with the
//! `FromContext` derive and talk to storage only through the repository gateway.

pub mod anchors;
pub mod element;
pub mod properties;
pub mod template;

pub use anchors::AnchorResolver;
pub use element::{
    Converter, ElementHandler, ElementSummary, RelatedElement, SummaryConverter, TemplateSource,
};
pub use properties::{
    apply_template_classifications, apply_template_properties, substitute_placeholders,
    PlaceholderMap, PropertyBuilder,
};
pub use template::{
    AnchorRef, CopiedEntity, TemplateHandler, TemplateOutcome, TemplateProgress, TemplateRequest,
};

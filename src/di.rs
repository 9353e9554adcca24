//! Dependency injection infrastructure.
//!
//! Services are assembled at compile time through the `FromRef` trait and the
//! derive macros from `di-macros`:
//!
//! - `FromRef<T>`: extracts a value from a reference to `T`
//! - `#[derive(Context)]`: makes each field of the context extractable
//! - `#[derive(FromContext)]`: builds a service by extracting each of its fields
//!
//! # Example
//!
//! ```ignore
//! use crate::di::FromContext;
//!
//! #[derive(FromContext, Clone)]
//! pub struct TemplateHandler {
//!     gateway: AppGateway,      // copied out of Context
//!     anchors: AnchorResolver,  // itself built from Context
//!     config: Arc<Config>,
//! }
//!
//! let handler: TemplateHandler = ctx.resolve();
//! ```

/// Trait for extracting a value from a reference to another type.
pub trait FromRef<T> {
    fn from_ref(input: &T) -> Self;
}

/// Any Clone type can be extracted from itself.
impl<T: Clone> FromRef<T> for T {
    fn from_ref(input: &T) -> Self {
        input.clone()
    }
}

pub use di_macros::{Context, FromContext};

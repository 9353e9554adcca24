//! Compile-time dependency injection macros for anchored-templates.
//!
//! - `#[derive(Context)]` makes every field of a context struct extractable
//! - `#[derive(FromContext)]` builds a struct by extracting each field from a context
//!
//! Generated code refers to `crate::FromRef`, so the consuming crate must
//! define or re-export that trait at its root.

use proc_macro::TokenStream;
use syn::punctuated::Punctuated;
use syn::{Data, DeriveInput, Field, Fields, Token};

mod context;
mod from_context;

/// Derive macro for the DI root.
///
/// Generates `impl FromRef<Self> for FieldType` for each field, cloning the
/// field out of the context. Every field type must be `Clone` and distinct.
///
/// ```ignore
/// #[derive(Context, Clone)]
/// pub struct Context {
///     pub gateway: Arc<dyn RepositoryGateway>,
///     pub config: Arc<Config>,
/// }
/// ```
#[proc_macro_derive(Context)]
pub fn derive_context(input: TokenStream) -> TokenStream {
    context::derive_context_impl(input)
}

/// Derive macro for services built from a context.
///
/// Generates `impl FromRef<Context> for Self` that resolves each field with
/// `FromRef::from_ref(ctx)`. Fields marked `#[from_context(default)]` are
/// initialized with `Default::default()` instead.
///
/// ```ignore
/// #[derive(FromContext, Clone)]
/// pub struct ElementHandler<C: Converter> {
///     templates: TemplateHandler,
///     #[from_context(default)]
///     converter: C,
/// }
/// ```
///
/// The context type defaults to `Context` and can be overridden on the struct:
///
/// ```ignore
/// #[derive(FromContext)]
/// #[from_context(Context = "TestContext")]
/// pub struct AnchorResolver { /* ... */ }
/// ```
#[proc_macro_derive(FromContext, attributes(from_context))]
pub fn derive_from_context(input: TokenStream) -> TokenStream {
    from_context::derive_from_context_impl(input)
}

/// The named fields of a struct, or a compile error naming the derive.
fn named_fields<'a>(
    input: &'a DeriveInput,
    derive: &str,
) -> syn::Result<&'a Punctuated<Field, Token![,]>> {
    match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => Ok(&fields.named),
            _ => Err(syn::Error::new_spanned(
                input,
                format!("{} can only be derived for structs with named fields", derive),
            )),
        },
        _ => Err(syn::Error::new_spanned(
            input,
            format!("{} can only be derived for structs", derive),
        )),
    }
}

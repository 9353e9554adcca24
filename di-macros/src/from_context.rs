//! `#[derive(FromContext)]`.

use proc_macro::TokenStream;
use quote::quote;
use syn::{parse_macro_input, parse_quote, DeriveInput, Field, Type};

use crate::named_fields;

pub fn derive_from_context_impl(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match expand(&input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

fn expand(input: &DeriveInput) -> syn::Result<proc_macro2::TokenStream> {
    let fields = named_fields(input, "FromContext")?;
    let context_type = context_type(input)?;

    let name = &input.ident;
    let mut generics = input.generics.clone();
    let mut field_inits = Vec::with_capacity(fields.len());

    for field in fields {
        let Some(field_name) = field.ident.as_ref() else {
            continue;
        };
        let field_type = &field.ty;
        if is_default(field)? {
            generics
                .make_where_clause()
                .predicates
                .push(parse_quote! { #field_type: ::core::default::Default });
            field_inits.push(quote! {
                #field_name: ::core::default::Default::default()
            });
        } else {
            field_inits.push(quote! {
                #field_name: <#field_type as crate::FromRef<#context_type>>::from_ref(ctx)
            });
        }
    }

    let (impl_generics, ty_generics, where_clause) = generics.split_for_impl();
    Ok(quote! {
        impl #impl_generics crate::FromRef<#context_type> for #name #ty_generics #where_clause {
            fn from_ref(ctx: &#context_type) -> Self {
                Self {
                    #(#field_inits),*
                }
            }
        }
    })
}

/// `#[from_context(Context = "Type")]` on the struct, or `Context`.
fn context_type(input: &DeriveInput) -> syn::Result<Type> {
    let mut context_ty: Option<Type> = None;
    for attr in input.attrs.iter().filter(|a| a.path().is_ident("from_context")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("Context") {
                let value: syn::LitStr = meta.value()?.parse()?;
                context_ty = Some(value.parse()?);
                Ok(())
            } else {
                Err(meta.error("expected `Context = \"Type\"`"))
            }
        })?;
    }
    Ok(context_ty.unwrap_or_else(|| parse_quote! { Context }))
}

/// Whether a field carries `#[from_context(default)]`.
fn is_default(field: &Field) -> syn::Result<bool> {
    let mut default = false;
    for attr in field.attrs.iter().filter(|a| a.path().is_ident("from_context")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("default") {
                default = true;
                Ok(())
            } else {
                Err(meta.error("expected `default`"))
            }
        })?;
    }
    Ok(default)
}

use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{Attribute, Data, DeriveInput, Error, Fields, Ident, LitStr, Result};

use super::{ParsedField, field::skip_meta};

pub(crate) struct ParsedModel {
    ident: Ident,
    model_name: String,
    fields: Vec<ParsedField>,
}

impl ParsedModel {
    pub(crate) fn from_input(input: &DeriveInput) -> Result<Self> {
        if !input.generics.params.is_empty() {
            return Err(Error::new_spanned(&input.generics, "TileModel cannot be derived for generic structs"));
        }

        let mut model_name = None;
        for attr in &input.attrs {
            if attr.path().is_ident("tile") {
                Self::parse_container_attr(attr, &mut model_name)?;
            } else if attr.path().is_ident("serde") {
                Self::check_serde_container_attr(attr)?;
            }
        }

        let fields = match &input.data {
            Data::Struct(data) => match &data.fields {
                Fields::Named(named) => named
                    .named
                    .iter()
                    .map(ParsedField::from_field)
                    .collect::<Result<Vec<_>>>()?,
                _ => return Err(Error::new(input.ident.span(), "TileModel requires named fields")),
            },
            _ => return Err(Error::new(input.ident.span(), "TileModel can only be derived for structs")),
        };

        Ok(Self {
            model_name: model_name.unwrap_or_else(|| input.ident.to_string().to_lowercase()),
            ident: input.ident.clone(),
            fields,
        })
    }

    fn parse_container_attr(attr: &Attribute, model_name: &mut Option<String>) -> Result<()> {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("name") {
                let lit: LitStr = meta.value()?.parse()?;
                let value = lit.value();
                if value.is_empty() || value.contains(':') {
                    return Err(Error::new(lit.span(), "model name must be non-empty and must not contain `:`"));
                }
                *model_name = Some(value);
                Ok(())
            } else {
                Err(meta.error("unsupported tile container attribute; expected `name = \"...\"`"))
            }
        })
    }

    /// Serde container options that change field keys have no stored counterpart.
    fn check_serde_container_attr(attr: &Attribute) -> Result<()> {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("rename_all") || meta.path.is_ident("rename_all_fields") {
                Err(meta.error("TileModel does not support `rename_all`; rename fields individually"))
            } else {
                skip_meta(&meta)
            }
        })
    }

    pub(crate) fn emit(&self) -> TokenStream2 {
        let ident = &self.ident;
        let type_name = ident.to_string();
        let model_name = &self.model_name;
        let specs = self.fields.iter().map(ParsedField::spec_tokens);

        quote! {
            impl ::tileorm::Model for #ident {
                const MODEL_NAME: &'static str = #model_name;

                fn field_specs() -> ::std::vec::Vec<::tileorm::FieldSpec> {
                    ::std::vec![#(#specs),*]
                }
            }

            ::tileorm::inventory::submit! {
                ::tileorm::registry::ModelRegistration {
                    type_name: #type_name,
                    model_name: #model_name,
                    field_specs: <#ident as ::tileorm::Model>::field_specs,
                }
            }
        }
    }
}

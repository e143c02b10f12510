use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{
    Attribute, Error, Expr, Field, GenericArgument, LitInt, LitStr, PathArguments, Result, Token, Type,
    meta::ParseNestedMeta, spanned::Spanned, token,
};

const MAX_GEOHASH_PRECISION: u8 = 12;

/// Storage kind picked by a `#[tile(...)]` field attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FieldAttr {
    Identifier,
    Group,
    Char,
    Json,
    Point,
    GeoHash { precision: Option<u8> },
    Bounds,
}

/// Scalar family of a char field, taken from its Rust type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Scalar {
    String,
    Integer,
    Float,
    Boolean,
}

pub(crate) struct ParsedField {
    pub name: String,
    pub attr: FieldAttr,
    pub nullable: bool,
    pub scalar: Scalar,
}

impl ParsedField {
    pub(crate) fn from_field(field: &Field) -> Result<Self> {
        let ident = field
            .ident
            .clone()
            .ok_or_else(|| Error::new(field.span(), "TileModel requires named fields"))?;
        let mut name = ident.to_string().trim_start_matches("r#").to_string();

        let (nullable, inner) = match unwrap_option(&field.ty) {
            Some(inner) => (true, inner),
            None => (false, &field.ty),
        };

        let mut attr = None;
        for attribute in &field.attrs {
            if attribute.path().is_ident("tile") {
                Self::parse_field_attr(attribute, &mut attr)?;
            } else if attribute.path().is_ident("serde") {
                Self::parse_serde_attr(attribute, &mut name)?;
            }
        }

        Ok(Self {
            name,
            attr: attr.unwrap_or(FieldAttr::Char),
            nullable,
            scalar: classify_scalar(inner),
        })
    }

    fn parse_field_attr(attr: &Attribute, kind: &mut Option<FieldAttr>) -> Result<()> {
        attr.parse_nested_meta(|meta| {
            let parsed = if meta.path.is_ident("identifier") {
                FieldAttr::Identifier
            } else if meta.path.is_ident("group") {
                FieldAttr::Group
            } else if meta.path.is_ident("char") {
                FieldAttr::Char
            } else if meta.path.is_ident("json") {
                FieldAttr::Json
            } else if meta.path.is_ident("point") {
                FieldAttr::Point
            } else if meta.path.is_ident("bounds") {
                FieldAttr::Bounds
            } else if meta.path.is_ident("geohash") {
                let mut precision = None;
                if meta.input.peek(token::Paren) {
                    meta.parse_nested_meta(|inner| {
                        if inner.path.is_ident("precision") {
                            let lit: LitInt = inner.value()?.parse()?;
                            let value: u8 = lit.base10_parse()?;
                            if value == 0 || value > MAX_GEOHASH_PRECISION {
                                return Err(Error::new(
                                    lit.span(),
                                    format!("geohash precision must be between 1 and {MAX_GEOHASH_PRECISION}"),
                                ));
                            }
                            precision = Some(value);
                            Ok(())
                        } else {
                            Err(inner.error("unsupported geohash option; expected `precision = N`"))
                        }
                    })?;
                }
                FieldAttr::GeoHash { precision }
            } else {
                return Err(meta.error(
                    "unsupported tile attribute; expected one of identifier, group, char, json, point, geohash, bounds",
                ));
            };
            if kind.replace(parsed).is_some() {
                return Err(meta.error("a field takes exactly one tile kind attribute"));
            }
            Ok(())
        })
    }

    /// Picks up `#[serde(rename = "...")]` so the field name matches the serialized key.
    ///
    /// Renames that differ between serialization and deserialization, and `flatten`,
    /// cannot be mapped onto a single stored field and are rejected.
    fn parse_serde_attr(attr: &Attribute, name: &mut String) -> Result<()> {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("rename") {
                if meta.input.peek(Token![=]) {
                    let lit: LitStr = meta.value()?.parse()?;
                    *name = lit.value();
                    return Ok(());
                }
                let mut serialize = None;
                let mut deserialize = None;
                meta.parse_nested_meta(|inner| {
                    let lit: LitStr = inner.value()?.parse()?;
                    if inner.path.is_ident("serialize") {
                        serialize = Some(lit.value());
                    } else if inner.path.is_ident("deserialize") {
                        deserialize = Some(lit.value());
                    } else {
                        return Err(inner.error("expected `serialize` or `deserialize`"));
                    }
                    Ok(())
                })?;
                match (serialize, deserialize) {
                    (Some(ser), Some(de)) if ser == de => {
                        *name = ser;
                        Ok(())
                    }
                    _ => Err(meta.error("TileModel fields need one name for both serialize and deserialize")),
                }
            } else if meta.path.is_ident("flatten") {
                Err(meta.error("TileModel does not support flattened fields"))
            } else {
                skip_meta(&meta)
            }
        })
    }

    /// Expression building this field's `tileorm::FieldSpec`.
    pub(crate) fn spec_tokens(&self) -> TokenStream2 {
        let name = &self.name;
        let base = match self.attr {
            FieldAttr::Identifier => quote! { ::tileorm::FieldSpec::identifier(#name) },
            FieldAttr::Group => quote! { ::tileorm::FieldSpec::group(#name) },
            FieldAttr::Json => quote! { ::tileorm::FieldSpec::json(#name) },
            FieldAttr::Point => quote! { ::tileorm::FieldSpec::point(#name) },
            FieldAttr::Bounds => quote! { ::tileorm::FieldSpec::bounds(#name) },
            FieldAttr::GeoHash { precision: None } => quote! { ::tileorm::FieldSpec::geohash(#name) },
            FieldAttr::GeoHash {
                precision: Some(precision),
            } => quote! {
                ::tileorm::FieldSpec::new(#name, ::tileorm::FieldKind::GeoHash { precision: #precision })
            },
            FieldAttr::Char => {
                let scalar = match self.scalar {
                    Scalar::String => quote! { ::tileorm::ScalarType::String },
                    Scalar::Integer => quote! { ::tileorm::ScalarType::Integer },
                    Scalar::Float => quote! { ::tileorm::ScalarType::Float },
                    Scalar::Boolean => quote! { ::tileorm::ScalarType::Boolean },
                };
                quote! { ::tileorm::FieldSpec::char(#name, #scalar) }
            }
        };
        if self.nullable {
            quote! { #base.nullable(true) }
        } else {
            base
        }
    }
}

/// Consumes a serde option this derive does not interpret.
pub(crate) fn skip_meta(meta: &ParseNestedMeta<'_>) -> Result<()> {
    if meta.input.peek(Token![=]) {
        meta.value()?.parse::<Expr>()?;
    } else if meta.input.peek(token::Paren) {
        meta.parse_nested_meta(|inner| skip_meta(&inner))?;
    }
    Ok(())
}

fn unwrap_option(ty: &Type) -> Option<&Type> {
    let Type::Path(path) = ty else {
        return None;
    };
    if path.qself.is_some() {
        return None;
    }
    let segment = path.path.segments.last()?;
    if segment.ident != "Option" {
        return None;
    }
    let PathArguments::AngleBracketed(args) = &segment.arguments else {
        return None;
    };
    match args.args.first()? {
        GenericArgument::Type(inner) => Some(inner),
        _ => None,
    }
}

fn classify_scalar(ty: &Type) -> Scalar {
    let ident = match ty {
        Type::Reference(reference) => return classify_scalar(&reference.elem),
        Type::Path(path) => match path.path.segments.last() {
            Some(segment) => segment.ident.to_string(),
            None => return Scalar::String,
        },
        _ => return Scalar::String,
    };
    match ident.as_str() {
        "i8" | "i16" | "i32" | "i64" | "i128" | "isize" | "u8" | "u16" | "u32" | "u64" | "u128" | "usize" => {
            Scalar::Integer
        }
        "f32" | "f64" => Scalar::Float,
        "bool" => Scalar::Boolean,
        _ => Scalar::String,
    }
}

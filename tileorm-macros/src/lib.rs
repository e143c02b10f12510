use proc_macro::TokenStream;
use syn::{DeriveInput, parse_macro_input};

mod parsed;

use parsed::ParsedModel;

/// Derive `tileorm::Model` for a struct with named fields and register it.
///
/// Container attribute: `#[tile(name = "truck")]` overrides the model name, which
/// defaults to the struct name in lowercase.
///
/// Field attributes pick the storage kind:
/// `#[tile(identifier)]`, `#[tile(group)]`, `#[tile(point)]`, `#[tile(geohash)]`,
/// `#[tile(geohash(precision = 7))]`, `#[tile(bounds)]`, `#[tile(json)]`, `#[tile(char)]`.
/// Unannotated fields are `char` fields typed after their Rust type. `Option<T>` fields are
/// nullable.
#[proc_macro_derive(TileModel, attributes(tile))]
pub fn derive_tile_model(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match ParsedModel::from_input(&input) {
        Ok(parsed) => parsed.emit().into(),
        Err(err) => err.to_compile_error().into(),
    }
}

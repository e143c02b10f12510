//! Process-wide model registry.
//!
//! Every `#[derive(TileModel)]` submits a [`ModelRegistration`] through `inventory`, so
//! all declared models can be listed and checked at startup. Built schemas are cached
//! per Rust type and shared by every repository of that type.

use std::{
    any::TypeId,
    collections::HashMap,
    sync::{Arc, OnceLock, PoisonError, RwLock},
};

use crate::{errors::SchemaError, fields::FieldSpec, repository::Model, schema::Schema};

/// Metadata for a model declared with `#[derive(TileModel)]`.
pub struct ModelRegistration {
    /// Rust type name, e.g. `Truck`.
    pub type_name: &'static str,
    /// Model name used in collection keys, e.g. `truck`.
    pub model_name: &'static str,
    pub field_specs: fn() -> Vec<FieldSpec>,
}

impl ModelRegistration {
    pub fn schema(&self) -> Result<Schema, SchemaError> {
        Schema::new(self.model_name, (self.field_specs)())
    }
}

inventory::collect!(ModelRegistration);

pub fn registered_models() -> impl Iterator<Item = &'static ModelRegistration> {
    inventory::iter::<ModelRegistration>()
}

pub fn get_model_by_name(model_name: &str) -> Option<&'static ModelRegistration> {
    registered_models().find(|registration| registration.model_name == model_name)
}

/// Build every registered schema, returning how many were valid or every error found.
///
/// Call at startup to surface schema errors before the first create/get.
pub fn validate_registered_models() -> Result<usize, Vec<SchemaError>> {
    let mut valid = 0;
    let mut errors = Vec::new();
    for registration in registered_models() {
        match registration.schema() {
            Ok(_) => valid += 1,
            Err(err) => errors.push(err),
        }
    }
    if errors.is_empty() { Ok(valid) } else { Err(errors) }
}

static SCHEMAS: OnceLock<RwLock<HashMap<TypeId, Arc<Schema>>>> = OnceLock::new();

fn schemas() -> &'static RwLock<HashMap<TypeId, Arc<Schema>>> {
    SCHEMAS.get_or_init(|| RwLock::new(HashMap::new()))
}

/// Cached schema of `T`, built on first use.
///
/// Invalid schemas are not cached, so every use of a broken model reports its error.
pub fn schema_for<T: Model>() -> Result<Arc<Schema>, SchemaError> {
    let type_id = TypeId::of::<T>();
    if let Some(schema) = schemas().read().unwrap_or_else(PoisonError::into_inner).get(&type_id) {
        return Ok(Arc::clone(schema));
    }
    let schema = Arc::new(Schema::new(T::MODEL_NAME, T::field_specs())?);
    let mut cache = schemas().write().unwrap_or_else(PoisonError::into_inner);
    Ok(Arc::clone(cache.entry(type_id).or_insert(schema)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(serde::Serialize, serde::Deserialize)]
    struct Beacon {
        id: String,
    }

    impl Model for Beacon {
        const MODEL_NAME: &'static str = "beacon";

        fn field_specs() -> Vec<FieldSpec> {
            vec![FieldSpec::identifier("id")]
        }
    }

    #[derive(serde::Serialize, serde::Deserialize)]
    struct Orphan {
        name: String,
    }

    impl Model for Orphan {
        const MODEL_NAME: &'static str = "orphan";

        fn field_specs() -> Vec<FieldSpec> {
            vec![FieldSpec::char("name", crate::fields::ScalarType::String)]
        }
    }

    #[test]
    fn caches_schema_per_type() {
        let first = schema_for::<Beacon>().unwrap();
        let second = schema_for::<Beacon>().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.model(), "beacon");
    }

    #[test]
    fn broken_schemas_error_on_every_use() {
        for _ in 0..2 {
            assert_eq!(
                schema_for::<Orphan>().unwrap_err(),
                SchemaError::NoIdentifier { model: "orphan".into() }
            );
        }
    }
}

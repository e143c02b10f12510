use std::{marker::PhantomData, sync::Arc};

use log::debug;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};

use crate::{
    errors::{OrmError, SchemaError, ValidationError},
    fields::FieldSpec,
    registry,
    runtime::{
        Store,
        commands::{WriteCommand, build_write, parse_read, read_request},
    },
    schema::Schema,
};

/// A struct mapped onto Tile38 objects.
///
/// Usually implemented with `#[derive(TileModel)]`, which also registers the model with
/// [`crate::registry`].
#[allow(async_fn_in_trait)]
pub trait Model: Serialize + DeserializeOwned + 'static {
    /// Name used as the collection key prefix.
    const MODEL_NAME: &'static str;

    /// Declared fields, in declaration order.
    fn field_specs() -> Vec<FieldSpec>;

    fn schema() -> Result<Arc<Schema>, SchemaError> {
        registry::schema_for::<Self>()
    }

    fn repo() -> Result<Repo<Self>, SchemaError> {
        Repo::new()
    }

    async fn create<S: Store>(store: &S, instance: Self) -> Result<Self, OrmError> {
        Self::repo()?.create(store, instance).await
    }

    async fn get<S: Store>(store: &S, lookup: Lookup) -> Result<Self, OrmError> {
        Self::repo()?.get(store, &lookup).await
    }
}

/// Identifier and group value addressing one stored object.
#[derive(Debug, Clone, PartialEq)]
pub struct Lookup {
    pub id: Value,
    pub group: Option<Value>,
}

impl Lookup {
    pub fn new(id: impl Into<Value>) -> Self {
        Self {
            id: id.into(),
            group: None,
        }
    }

    pub fn group(mut self, value: impl Into<Value>) -> Self {
        self.group = Some(value.into());
        self
    }
}

/// Create/get operations for one model type.
pub struct Repo<T> {
    schema: Arc<Schema>,
    _marker: PhantomData<T>,
}

impl<T> Clone for Repo<T> {
    fn clone(&self) -> Self {
        Self {
            schema: Arc::clone(&self.schema),
            _marker: PhantomData,
        }
    }
}

impl<T> Repo<T>
where
    T: Model,
{
    /// Fails when `T`'s declared fields violate a schema invariant.
    pub fn new() -> Result<Self, SchemaError> {
        Ok(Self {
            schema: registry::schema_for::<T>()?,
            _marker: PhantomData,
        })
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Render `instance` into its `SET` command without touching a store.
    pub fn validate(&self, instance: &T) -> Result<WriteCommand, OrmError> {
        let values = to_map(self.schema.model(), instance)?;
        Ok(build_write(&self.schema, &values)?)
    }

    /// Write `instance` and hand it back. The stored object is not read back.
    pub async fn create<S: Store>(&self, store: &S, instance: T) -> Result<T, OrmError> {
        let command = self.validate(&instance)?;
        debug!("create {} {} in {}", self.schema.model(), command.id, command.key);
        store.set(&command).await?;
        Ok(instance)
    }

    pub async fn get<S: Store>(&self, store: &S, lookup: &Lookup) -> Result<T, OrmError> {
        let (key, id) = self.address(lookup)?;
        debug!("get {} {} from {}", self.schema.model(), id, key);
        let request = read_request(&self.schema, key, id);
        let stored = store.get(&request).await?.ok_or_else(|| OrmError::NotFound {
            key: request.key.clone(),
            id: request.id.clone(),
        })?;
        let values = parse_read(&self.schema, &lookup.id, lookup.group.as_ref(), &stored)?;
        serde_json::from_value(Value::Object(values)).map_err(|err| {
            OrmError::Validation(ValidationError::single(
                self.schema.model(),
                self.schema.model(),
                format!("{}:{}", request.key, request.id),
                format!("failed to deserialize model: {err}"),
            ))
        })
    }

    pub async fn exists<S: Store>(&self, store: &S, lookup: &Lookup) -> Result<bool, OrmError> {
        let (key, id) = self.address(lookup)?;
        Ok(store.exists(&key, &id).await?)
    }

    /// Collection key and rendered identifier for `lookup`.
    pub fn address(&self, lookup: &Lookup) -> Result<(String, String), OrmError> {
        match (self.schema.group(), &lookup.group) {
            (None, Some(_)) => {
                return Err(OrmError::InvalidRequest {
                    message: format!("model `{}` declares no group field", self.schema.model()),
                });
            }
            (Some(group), None) => {
                return Err(OrmError::InvalidRequest {
                    message: format!("model `{}` requires a `{}` value", self.schema.model(), group.name),
                });
            }
            _ => {}
        }
        let key = self
            .schema
            .collection_key(lookup.group.as_ref())
            .map_err(|issue| ValidationError::new([issue]))?;
        let id = self
            .schema
            .identifier()
            .render_key(&lookup.id)
            .map_err(|issue| ValidationError::new([issue]))?;
        Ok((key, id))
    }
}

fn to_map<T: Serialize>(model: &str, instance: &T) -> Result<Map<String, Value>, ValidationError> {
    match serde_json::to_value(instance) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(ValidationError::single(
            model,
            model,
            other.to_string(),
            "model must serialize to a map of fields",
        )),
        Err(err) => Err(ValidationError::single(
            model,
            model,
            "<unserializable>",
            format!("failed to serialize model: {err}"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{fields::ScalarType, runtime::MemoryStore};
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Parcel {
        id: String,
        depot: i64,
        location: (f64, f64),
        label: Option<String>,
    }

    impl Model for Parcel {
        const MODEL_NAME: &'static str = "parcel";

        fn field_specs() -> Vec<FieldSpec> {
            vec![
                FieldSpec::identifier("id"),
                FieldSpec::group("depot"),
                FieldSpec::point("location"),
                FieldSpec::char("label", ScalarType::String).nullable(true),
            ]
        }
    }

    fn parcel() -> Parcel {
        Parcel {
            id: "p-1".into(),
            depot: 4,
            location: (4.5, 52.1),
            label: Some("fragile".into()),
        }
    }

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let store = MemoryStore::new();
        let created = Parcel::create(&store, parcel()).await.unwrap();
        assert_eq!(created, parcel());
        assert_eq!(store.len("parcel:depot=4"), 1);

        let fetched = Parcel::get(&store, Lookup::new("p-1").group(4)).await.unwrap();
        assert_eq!(fetched, parcel());
    }

    #[tokio::test]
    async fn validation_happens_before_the_store_is_touched() {
        let store = MemoryStore::new();
        let mut bad = parcel();
        bad.location = (0.0, 95.0);
        let err = Parcel::create(&store, bad).await.unwrap_err();
        assert!(matches!(&err, OrmError::Validation(v) if v.issue_for("location").is_some()));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn lookups_must_match_the_group_layout() {
        let store = MemoryStore::new();
        let err = Parcel::get(&store, Lookup::new("p-1")).await.unwrap_err();
        assert!(matches!(err, OrmError::InvalidRequest { .. }));
    }

    #[tokio::test]
    async fn missing_objects_are_not_found() {
        let store = MemoryStore::new();
        let err = Parcel::get(&store, Lookup::new("nope").group(4)).await.unwrap_err();
        match err {
            OrmError::NotFound { key, id } => {
                assert_eq!(key, "parcel:depot=4");
                assert_eq!(id, "nope");
            }
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn exists_reflects_created_objects() {
        let store = MemoryStore::new();
        let repo = Parcel::repo().unwrap();
        let lookup = Lookup::new("p-1").group(4);
        assert!(!repo.exists(&store, &lookup).await.unwrap());
        repo.create(&store, parcel()).await.unwrap();
        assert!(repo.exists(&store, &lookup).await.unwrap());
    }
}

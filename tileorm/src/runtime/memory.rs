use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard, PoisonError},
};

use log::debug;
use redis::{ErrorKind, RedisError, RedisResult};
use serde_json::{Value, json};

use crate::{
    geometry::{GeoHash, Point},
    runtime::{
        Store,
        commands::{GeometryPayload, GeometryShape, ReadRequest, StoredGeometry, StoredObject, WriteCommand},
        executor::NULL_MARKER,
    },
};

#[derive(Debug, Clone)]
struct Entry {
    object: Value,
    fields: Vec<(String, Option<String>)>,
}

#[derive(Debug, Default)]
struct State {
    collections: HashMap<String, HashMap<String, Entry>>,
    readonly: bool,
}

/// In-process [`Store`] that mirrors the Tile38 behaviour the model layer depends on.
///
/// Hash writes are decoded to points when stored, writes fail while read-only, and
/// `SET` on an existing id replaces the object and merges its fields.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of objects stored under `key`.
    pub fn len(&self, key: &str) -> usize {
        self.state().collections.get(key).map_or(0, HashMap::len)
    }

    pub fn is_empty(&self) -> bool {
        self.state().collections.values().all(HashMap::is_empty)
    }
}

impl Store for MemoryStore {
    async fn set(&self, command: &WriteCommand) -> RedisResult<()> {
        let mut state = self.state();
        if state.readonly {
            return Err(RedisError::from((ErrorKind::ResponseError, "read only")));
        }
        let object = match &command.geometry {
            GeometryPayload::Object(object) => object.clone(),
            GeometryPayload::Hash(hash) => json!({
                "type": "Point",
                "coordinates": hash.decode().position(),
            }),
        };
        debug!("memory SET {} {}", command.key, command.id);
        let entry = state
            .collections
            .entry(command.key.clone())
            .or_default()
            .entry(command.id.clone())
            .or_insert_with(|| Entry {
                object: Value::Null,
                fields: Vec::new(),
            });
        entry.object = object;
        for (name, value) in &command.fields {
            // The wire carries one token for null and for the literal marker text.
            let value = value.clone().filter(|text| text != NULL_MARKER);
            match entry.fields.iter_mut().find(|(existing, _)| existing == name) {
                Some(slot) => slot.1 = value,
                None => entry.fields.push((name.clone(), value)),
            }
        }
        Ok(())
    }

    async fn get(&self, request: &ReadRequest) -> RedisResult<Option<StoredObject>> {
        let state = self.state();
        let Some(entry) = state
            .collections
            .get(&request.key)
            .and_then(|objects| objects.get(&request.id))
        else {
            return Ok(None);
        };
        let geometry = match request.shape {
            GeometryShape::Object => StoredGeometry::Object(entry.object.clone()),
            GeometryShape::Hash { precision } => {
                let point = object_center(&entry.object).ok_or_else(|| {
                    RedisError::from((ErrorKind::ResponseError, "object has no point to hash"))
                })?;
                let hash = GeoHash::encode(point, precision as usize)
                    .map_err(|err| RedisError::from((ErrorKind::ResponseError, "invalid precision", err.to_string())))?;
                StoredGeometry::Hash(hash)
            }
        };
        let fields = if request.with_fields { entry.fields.clone() } else { Vec::new() };
        Ok(Some(StoredObject { geometry, fields }))
    }

    async fn exists(&self, key: &str, id: &str) -> RedisResult<bool> {
        Ok(self
            .state()
            .collections
            .get(key)
            .is_some_and(|objects| objects.contains_key(id)))
    }

    async fn readonly(&self, enabled: bool) -> RedisResult<()> {
        self.state().readonly = enabled;
        Ok(())
    }

    async fn flushdb(&self) -> RedisResult<()> {
        let mut state = self.state();
        if state.readonly {
            return Err(RedisError::from((ErrorKind::ResponseError, "read only")));
        }
        state.collections.clear();
        Ok(())
    }
}

fn object_center(object: &Value) -> Option<Point> {
    let position = object.get("coordinates")?.as_array()?;
    let lon = position.first()?.as_f64()?;
    let lat = position.get(1)?.as_f64()?;
    Point::new(lon, lat).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command(fields: Vec<(&str, Option<&str>)>) -> WriteCommand {
        WriteCommand {
            key: "truck:group=foo".into(),
            id: "1".into(),
            geometry: GeometryPayload::Hash(GeoHash::new("gcpvn231e").unwrap()),
            fields: fields
                .into_iter()
                .map(|(name, value)| (name.to_string(), value.map(str::to_string)))
                .collect(),
        }
    }

    fn request(shape: GeometryShape) -> ReadRequest {
        ReadRequest {
            key: "truck:group=foo".into(),
            id: "1".into(),
            with_fields: true,
            shape,
        }
    }

    #[tokio::test]
    async fn decodes_hash_writes_to_points() {
        let store = MemoryStore::new();
        store.set(&command(vec![])).await.unwrap();
        let stored = store.get(&request(GeometryShape::Object)).await.unwrap().unwrap();
        let StoredGeometry::Object(object) = stored.geometry else {
            panic!("expected an object");
        };
        assert_eq!(object["type"], "Point");
        let hashed = store.get(&request(GeometryShape::Hash { precision: 9 })).await.unwrap().unwrap();
        assert_eq!(hashed.geometry, StoredGeometry::Hash(GeoHash::new("gcpvn231e").unwrap()));
    }

    #[tokio::test]
    async fn merges_fields_on_overwrite() {
        let store = MemoryStore::new();
        store.set(&command(vec![("a", Some("1")), ("b", None)])).await.unwrap();
        store.set(&command(vec![("b", Some("2"))])).await.unwrap();
        let stored = store.get(&request(GeometryShape::Object)).await.unwrap().unwrap();
        assert_eq!(stored.field("a"), Some(Some("1")));
        assert_eq!(stored.field("b"), Some(Some("2")));
        assert_eq!(store.len("truck:group=foo"), 1);
    }

    #[tokio::test]
    async fn marker_text_reads_back_as_null() {
        let store = MemoryStore::new();
        store.set(&command(vec![("a", Some("null")), ("b", None)])).await.unwrap();
        let stored = store.get(&request(GeometryShape::Object)).await.unwrap().unwrap();
        assert_eq!(stored.field("a"), Some(None));
        assert_eq!(stored.field("b"), Some(None));
    }

    #[tokio::test]
    async fn readonly_rejects_writes() {
        let store = MemoryStore::new();
        store.readonly(true).await.unwrap();
        let err = store.set(&command(vec![])).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ResponseError);
        store.readonly(false).await.unwrap();
        store.set(&command(vec![])).await.unwrap();
        assert!(store.exists("truck:group=foo", "1").await.unwrap());
        store.flushdb().await.unwrap();
        assert!(store.is_empty());
        assert!(!store.exists("truck:group=foo", "1").await.unwrap());
    }
}

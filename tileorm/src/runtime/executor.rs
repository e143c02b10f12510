use log::debug;
use redis::{Cmd, ErrorKind, RedisError, RedisResult, Value, aio::ConnectionManager, cmd, from_redis_value};

use crate::{
    config::Tile38Config,
    geometry::GeoHash,
    runtime::commands::{GeometryPayload, GeometryShape, ReadRequest, StoredGeometry, StoredObject, WriteCommand},
};

/// Wire token sent for, and recognised as, a null field value.
pub const NULL_MARKER: &str = "null";

/// The store operations the model layer relies on.
///
/// Errors are the client's own and are never reinterpreted by callers.
#[allow(async_fn_in_trait)]
pub trait Store {
    async fn set(&self, command: &WriteCommand) -> RedisResult<()>;

    /// `Ok(None)` when the key or the id does not exist.
    async fn get(&self, request: &ReadRequest) -> RedisResult<Option<StoredObject>>;

    async fn exists(&self, key: &str, id: &str) -> RedisResult<bool>;

    async fn readonly(&self, enabled: bool) -> RedisResult<()>;

    async fn flushdb(&self) -> RedisResult<()>;
}

/// [`Store`] backed by a Tile38 server over RESP.
#[derive(Clone)]
pub struct Tile38Store {
    conn: ConnectionManager,
}

impl Tile38Store {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    /// Open a managed connection to the server named by `config`.
    pub async fn connect(config: &Tile38Config) -> RedisResult<Self> {
        let client = redis::Client::open(config.url.as_str())?;
        let conn = client.get_connection_manager().await?;
        debug!("connected to tile38 at {}", config.url);
        Ok(Self::new(conn))
    }

    pub fn connection(&self) -> ConnectionManager {
        self.conn.clone()
    }
}

impl Store for Tile38Store {
    async fn set(&self, command: &WriteCommand) -> RedisResult<()> {
        let set = set_command(command);
        debug!("SET {} {} ({} fields)", command.key, command.id, command.fields.len());
        let mut conn = self.conn.clone();
        set.query_async::<()>(&mut conn).await
    }

    async fn get(&self, request: &ReadRequest) -> RedisResult<Option<StoredObject>> {
        let mut get = cmd("GET");
        get.arg(&request.key).arg(&request.id);
        if request.with_fields {
            get.arg("WITHFIELDS");
        }
        match request.shape {
            GeometryShape::Object => get.arg("OBJECT"),
            GeometryShape::Hash { precision } => get.arg("HASH").arg(precision),
        };
        debug!("GET {} {} {:?}", request.key, request.id, request.shape);
        let mut conn = self.conn.clone();
        let reply = match get.query_async::<Value>(&mut conn).await {
            Ok(reply) => reply,
            Err(err) if is_not_found(&err) => return Ok(None),
            Err(err) => return Err(err),
        };
        parse_get_reply(request.shape, reply)
    }

    async fn exists(&self, key: &str, id: &str) -> RedisResult<bool> {
        let mut conn = self.conn.clone();
        cmd("EXISTS").arg(key).arg(id).query_async(&mut conn).await
    }

    async fn readonly(&self, enabled: bool) -> RedisResult<()> {
        debug!("READONLY {enabled}");
        let mut conn = self.conn.clone();
        cmd("READONLY")
            .arg(if enabled { "yes" } else { "no" })
            .query_async(&mut conn)
            .await
    }

    async fn flushdb(&self) -> RedisResult<()> {
        debug!("FLUSHDB");
        let mut conn = self.conn.clone();
        cmd("FLUSHDB").query_async(&mut conn).await
    }
}

/// `SET key id [FIELD name value]... OBJECT <geojson> | HASH <geohash>`
fn set_command(command: &WriteCommand) -> Cmd {
    let mut set = cmd("SET");
    set.arg(&command.key).arg(&command.id);
    for (name, value) in &command.fields {
        set.arg("FIELD").arg(name).arg(value.as_deref().unwrap_or(NULL_MARKER));
    }
    match &command.geometry {
        GeometryPayload::Object(object) => set.arg("OBJECT").arg(object.to_string()),
        GeometryPayload::Hash(hash) => set.arg("HASH").arg(hash.as_str()),
    };
    set
}

fn is_not_found(err: &RedisError) -> bool {
    err.kind() == ErrorKind::ResponseError && err.to_string().contains("not found")
}

fn protocol_error(detail: String) -> RedisError {
    RedisError::from((ErrorKind::TypeError, "unexpected tile38 reply", detail))
}

/// `GET ... WITHFIELDS` replies with `[geometry, [name, value, ...]]`; a plain `GET`
/// replies with the geometry alone.
fn parse_get_reply(shape: GeometryShape, reply: Value) -> RedisResult<Option<StoredObject>> {
    let items = match reply {
        Value::Nil => return Ok(None),
        Value::Array(items) => items,
        bare @ (Value::BulkString(_) | Value::SimpleString(_)) => vec![bare],
        other => return Err(protocol_error(format!("{other:?}"))),
    };
    let mut items = items.into_iter();
    let raw_geometry: String = match items.next() {
        Some(value) => from_redis_value(&value)?,
        None => return Err(protocol_error("empty reply".to_string())),
    };
    let geometry = match shape {
        GeometryShape::Object => serde_json::from_str(&raw_geometry)
            .map(StoredGeometry::Object)
            .map_err(|err| protocol_error(format!("geometry is not JSON: {err}")))?,
        GeometryShape::Hash { .. } => GeoHash::new(raw_geometry)
            .map(StoredGeometry::Hash)
            .map_err(|err| protocol_error(err.to_string()))?,
    };

    let flat: Vec<String> = match items.next() {
        Some(value) => from_redis_value(&value)?,
        None => Vec::new(),
    };
    let fields = flat
        .chunks(2)
        .filter_map(|pair| match pair {
            [name, value] => Some((name.clone(), (value != NULL_MARKER).then(|| value.clone()))),
            _ => None,
        })
        .collect();

    Ok(Some(StoredObject { geometry, fields }))
}

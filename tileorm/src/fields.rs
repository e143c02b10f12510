//! Field descriptors: the closed set of field kinds a model may declare, and the
//! per-kind rules that move a value between its serde form and Tile38's wire form.

use std::fmt;

use serde_json::{Number, Value, json};

use crate::{
    errors::FieldIssue,
    geometry::{Bounds, DEFAULT_GEOHASH_PRECISION, GeoHash, Point},
    runtime::{
        commands::{GeometryPayload, StoredGeometry},
        executor::NULL_MARKER,
    },
};

/// What part of the stored object a field maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldRole {
    Identifier,
    Group,
    Data,
    Geometry,
}

/// Declared Rust type of a scalar data field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ScalarType {
    #[default]
    String,
    Integer,
    Float,
    Boolean,
}

impl ScalarType {
    fn label(self) -> &'static str {
        match self {
            ScalarType::String => "string",
            ScalarType::Integer => "integer",
            ScalarType::Float => "float",
            ScalarType::Boolean => "boolean",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    Identifier,
    Group,
    Char(ScalarType),
    Json,
    Point,
    GeoHash { precision: u8 },
    Bounds,
}

impl FieldKind {
    pub fn role(&self) -> FieldRole {
        match self {
            FieldKind::Identifier => FieldRole::Identifier,
            FieldKind::Group => FieldRole::Group,
            FieldKind::Char(_) | FieldKind::Json => FieldRole::Data,
            FieldKind::Point | FieldKind::GeoHash { .. } | FieldKind::Bounds => FieldRole::Geometry,
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldKind::Identifier => f.write_str("identifier"),
            FieldKind::Group => f.write_str("group"),
            FieldKind::Char(scalar) => write!(f, "char({})", scalar.label()),
            FieldKind::Json => f.write_str("json"),
            FieldKind::Point => f.write_str("point"),
            FieldKind::GeoHash { precision } => write!(f, "geohash({precision})"),
            FieldKind::Bounds => f.write_str("bounds"),
        }
    }
}

/// One declared model attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldKind,
    pub nullable: bool,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            nullable: false,
        }
    }

    pub fn identifier(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Identifier)
    }

    pub fn group(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Group)
    }

    pub fn char(name: impl Into<String>, scalar: ScalarType) -> Self {
        Self::new(name, FieldKind::Char(scalar))
    }

    pub fn json(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Json)
    }

    pub fn point(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Point)
    }

    pub fn geohash(name: impl Into<String>) -> Self {
        Self::new(
            name,
            FieldKind::GeoHash {
                precision: DEFAULT_GEOHASH_PRECISION,
            },
        )
    }

    pub fn bounds(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Bounds)
    }

    pub fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    pub fn role(&self) -> FieldRole {
        self.kind.role()
    }

    fn issue(&self, received: impl fmt::Display, message: impl Into<String>) -> FieldIssue {
        FieldIssue::new(&self.name, self.kind.to_string(), received.to_string(), message)
    }

    /// Text form of an identifier or group value.
    pub fn render_key(&self, value: &Value) -> Result<String, FieldIssue> {
        match (self.kind, value) {
            (FieldKind::Identifier, Value::String(text)) if !text.is_empty() => Ok(text.clone()),
            (FieldKind::Identifier, Value::Number(number)) if number.is_i64() || number.is_u64() => {
                Ok(number.to_string())
            }
            (FieldKind::Identifier, _) => Err(self.issue(value, "identifier must be an integer or a non-empty string")),
            (FieldKind::Group, Value::String(text)) => Ok(text.clone()),
            (FieldKind::Group, Value::Number(_) | Value::Bool(_)) => Ok(value.to_string()),
            (FieldKind::Group, _) => Err(self.issue(value, "group must be a string, number or boolean")),
            _ => Err(self.issue(value, "field is not a key field")),
        }
    }

    /// Wire form of a data field. `None` is the store's explicit null marker.
    pub fn render_data(&self, value: &Value) -> Result<Option<String>, FieldIssue> {
        if value.is_null() {
            return if self.nullable {
                Ok(None)
            } else {
                Err(self.issue(value, "field is not nullable"))
            };
        }
        match self.kind {
            FieldKind::Char(scalar) => {
                let text = render_scalar(scalar, value)
                    .ok_or_else(|| self.issue(value, format!("expected a {} value", scalar.label())))?;
                if text == NULL_MARKER {
                    return Err(self.issue(value, "text equal to the null marker cannot be stored"));
                }
                Ok(Some(text))
            }
            FieldKind::Json => serde_json::to_string(value)
                .map(Some)
                .map_err(|err| self.issue(value, format!("value is not JSON serializable: {err}"))),
            _ => Err(self.issue(value, "field is not a data field")),
        }
    }

    /// Typed value of a data field read back from the store.
    pub fn parse_data(&self, raw: Option<&str>) -> Result<Value, FieldIssue> {
        let Some(raw) = raw else {
            return if self.nullable {
                Ok(Value::Null)
            } else {
                Err(self.issue("null", "store returned null for a non-nullable field"))
            };
        };
        match self.kind {
            FieldKind::Char(scalar) => parse_scalar(scalar, raw)
                .ok_or_else(|| self.issue(raw, format!("stored text is not a {} value", scalar.label()))),
            FieldKind::Json => serde_json::from_str(raw)
                .map_err(|err| self.issue(raw, format!("stored text is not valid JSON: {err}"))),
            _ => Err(self.issue(raw, "field is not a data field")),
        }
    }

    pub fn render_geometry(&self, value: &Value) -> Result<GeometryPayload, FieldIssue> {
        match self.kind {
            FieldKind::Point => {
                let [lon, lat] = coordinates::<2>(value).ok_or_else(|| self.issue(value, "expected [lon, lat]"))?;
                let point = Point::new(lon, lat).map_err(|err| self.issue(value, err.to_string()))?;
                Ok(GeometryPayload::point(point))
            }
            FieldKind::Bounds => {
                let [min_lon, min_lat, max_lon, max_lat] = coordinates::<4>(value)
                    .ok_or_else(|| self.issue(value, "expected [min_lon, min_lat, max_lon, max_lat]"))?;
                let bounds = Bounds::new(min_lon, min_lat, max_lon, max_lat)
                    .map_err(|err| self.issue(value, err.to_string()))?;
                Ok(GeometryPayload::bounds(bounds))
            }
            FieldKind::GeoHash { precision } => {
                let text = value.as_str().ok_or_else(|| self.issue(value, "expected a geohash string"))?;
                let hash = GeoHash::new(text).map_err(|err| self.issue(value, err.to_string()))?;
                // Reads come back at the declared precision.
                if hash.precision() != precision as usize {
                    return Err(self.issue(value, format!("expected a geohash of exactly {precision} characters")));
                }
                Ok(GeometryPayload::Hash(hash))
            }
            _ => Err(self.issue(value, "field is not a geometry field")),
        }
    }

    pub fn parse_geometry(&self, stored: &StoredGeometry) -> Result<Value, FieldIssue> {
        match (self.kind, stored) {
            (FieldKind::Point, StoredGeometry::Object(object)) => {
                let point = self.geojson_point(object)?;
                Ok(json!(point.position()))
            }
            (FieldKind::Point, StoredGeometry::Hash(hash)) => Ok(json!(hash.decode().position())),
            (FieldKind::Bounds, StoredGeometry::Object(object)) => {
                let bounds = self.geojson_bounds(object)?;
                let (min_lon, min_lat, max_lon, max_lat): (f64, f64, f64, f64) = bounds.into();
                Ok(json!([min_lon, min_lat, max_lon, max_lat]))
            }
            (FieldKind::GeoHash { .. }, StoredGeometry::Hash(hash)) => Ok(Value::String(hash.to_string())),
            (FieldKind::GeoHash { precision }, StoredGeometry::Object(object)) => {
                let point = self.geojson_point(object)?;
                let hash = GeoHash::encode(point, precision as usize)
                    .map_err(|err| self.issue(object, err.to_string()))?;
                Ok(Value::String(hash.to_string()))
            }
            (_, StoredGeometry::Hash(hash)) => Err(self.issue(hash, "store returned a geohash for this field")),
            (_, StoredGeometry::Object(object)) => Err(self.issue(object, "field is not a geometry field")),
        }
    }

    fn geojson_point(&self, object: &Value) -> Result<Point, FieldIssue> {
        if object.get("type").and_then(Value::as_str) != Some("Point") {
            return Err(self.issue(object, "expected a GeoJSON Point"));
        }
        let position = object
            .get("coordinates")
            .and_then(Value::as_array)
            .filter(|position| position.len() >= 2)
            .ok_or_else(|| self.issue(object, "point is missing its coordinates"))?;
        let lon = position[0].as_f64();
        let lat = position[1].as_f64();
        match (lon, lat) {
            (Some(lon), Some(lat)) => Point::new(lon, lat).map_err(|err| self.issue(object, err.to_string())),
            _ => Err(self.issue(object, "point coordinates must be numbers")),
        }
    }

    fn geojson_bounds(&self, object: &Value) -> Result<Bounds, FieldIssue> {
        if object.get("type").and_then(Value::as_str) != Some("Polygon") {
            return Err(self.issue(object, "expected a GeoJSON Polygon"));
        }
        let rings = object
            .get("coordinates")
            .and_then(Value::as_array)
            .filter(|rings| rings.len() == 1)
            .ok_or_else(|| self.issue(object, "expected a polygon with exactly one ring"))?;
        let ring: Vec<[f64; 2]> = rings[0]
            .as_array()
            .map(|positions| positions.iter().filter_map(|position| coordinates::<2>(position)).collect())
            .unwrap_or_default();
        if ring.len() != 5 || rings[0].as_array().map(Vec::len) != Some(5) || ring[0] != ring[4] {
            return Err(self.issue(object, "expected a closed ring of five positions"));
        }
        let fold = |pick: fn(f64, f64) -> f64, axis: usize, seed: f64| {
            ring.iter().map(|position| position[axis]).fold(seed, pick)
        };
        let (min_lon, min_lat) = (fold(f64::min, 0, f64::INFINITY), fold(f64::min, 1, f64::INFINITY));
        let (max_lon, max_lat) = (fold(f64::max, 0, f64::NEG_INFINITY), fold(f64::max, 1, f64::NEG_INFINITY));

        // Every vertex is a corner, every corner is visited, and every edge is axis-aligned.
        let corners = [[min_lon, min_lat], [max_lon, min_lat], [max_lon, max_lat], [min_lon, max_lat]];
        let rectangular = ring.iter().all(|position| corners.contains(position))
            && corners.iter().all(|corner| ring[..4].contains(corner))
            && ring.windows(2).all(|edge| edge[0][0] == edge[1][0] || edge[0][1] == edge[1][1]);
        if !rectangular {
            return Err(self.issue(object, "expected an axis-aligned rectangle"));
        }

        Bounds::new(min_lon, min_lat, max_lon, max_lat).map_err(|err| self.issue(object, err.to_string()))
    }
}

fn coordinates<const N: usize>(value: &Value) -> Option<[f64; N]> {
    let items = value.as_array().filter(|items| items.len() == N)?;
    let mut out = [0.0; N];
    for (slot, item) in out.iter_mut().zip(items) {
        *slot = item.as_f64()?;
    }
    Some(out)
}

fn render_scalar(scalar: ScalarType, value: &Value) -> Option<String> {
    match (scalar, value) {
        (ScalarType::String, Value::String(text)) => Some(text.clone()),
        (ScalarType::Integer, Value::Number(number)) if number.is_i64() || number.is_u64() => Some(number.to_string()),
        (ScalarType::Float, Value::Number(number)) => Some(number.to_string()),
        (ScalarType::Boolean, Value::Bool(flag)) => Some(flag.to_string()),
        _ => None,
    }
}

fn parse_scalar(scalar: ScalarType, raw: &str) -> Option<Value> {
    match scalar {
        ScalarType::String => Some(Value::String(raw.to_string())),
        ScalarType::Integer => raw
            .parse::<i64>()
            .map(Value::from)
            .or_else(|_| raw.parse::<u64>().map(Value::from))
            .ok(),
        ScalarType::Float => raw.parse::<f64>().ok().and_then(Number::from_f64).map(Value::Number),
        ScalarType::Boolean => match raw {
            "true" | "1" => Some(Value::Bool(true)),
            "false" | "0" => Some(Value::Bool(false)),
            _ => None,
        },
    }
}

//! Store command shapes plus the pure functions that build them from a model's serde
//! form and parse store responses back into it.

use serde_json::{Map, Value, json};

use crate::{
    errors::{FieldIssue, ValidationError, ValidationResult},
    fields::FieldKind,
    geometry::{Bounds, GeoHash, Point},
    schema::Schema,
};

/// Geometry half of a `SET` command.
#[derive(Debug, Clone, PartialEq)]
pub enum GeometryPayload {
    /// `OBJECT <geojson>`
    Object(Value),
    /// `HASH <geohash>`; the store decodes it to a point.
    Hash(GeoHash),
}

impl GeometryPayload {
    pub fn point(point: Point) -> Self {
        GeometryPayload::Object(json!({
            "type": "Point",
            "coordinates": point.position(),
        }))
    }

    pub fn bounds(bounds: Bounds) -> Self {
        GeometryPayload::Object(json!({
            "type": "Polygon",
            "coordinates": [bounds.ring()],
        }))
    }

    /// Written for models that declare no geometry field.
    pub fn degenerate() -> Self {
        GeometryPayload::Object(json!({
            "type": "Point",
            "coordinates": [0.0, 0.0],
        }))
    }
}

/// Fully rendered `SET` command.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteCommand {
    pub key: String,
    pub id: String,
    pub geometry: GeometryPayload,
    /// Field entries in declaration order. `None` is the explicit null marker.
    pub fields: Vec<(String, Option<String>)>,
}

/// How the store should report an object's geometry on read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeometryShape {
    Object,
    Hash { precision: u8 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReadRequest {
    pub key: String,
    pub id: String,
    pub with_fields: bool,
    pub shape: GeometryShape,
}

/// Geometry as reported by the store.
#[derive(Debug, Clone, PartialEq)]
pub enum StoredGeometry {
    Object(Value),
    Hash(GeoHash),
}

/// An object read back from the store.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredObject {
    pub geometry: StoredGeometry,
    pub fields: Vec<(String, Option<String>)>,
}

impl StoredObject {
    pub fn field(&self, name: &str) -> Option<Option<&str>> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value.as_deref())
    }
}

/// Render a model's serde map into a `SET` command, collecting every field issue.
pub fn build_write(schema: &Schema, values: &Map<String, Value>) -> ValidationResult<WriteCommand> {
    let mut issues = Vec::new();

    let id_field = schema.identifier();
    let id = match values.get(&id_field.name) {
        Some(value) => id_field.render_key(value).map_err(|issue| issues.push(issue)).ok(),
        None => {
            issues.push(missing(&id_field.name, id_field.kind));
            None
        }
    };

    let group_value = schema.group().and_then(|group| values.get(&group.name));
    let key = schema
        .collection_key(group_value)
        .map_err(|issue| issues.push(issue))
        .ok();

    let geometry = match schema.geometry() {
        Some(field) => match values.get(&field.name) {
            Some(value) => field.render_geometry(value).map_err(|issue| issues.push(issue)).ok(),
            None => {
                issues.push(missing(&field.name, field.kind));
                None
            }
        },
        None => Some(GeometryPayload::degenerate()),
    };

    let mut fields = Vec::new();
    for field in schema.data_fields() {
        match values.get(&field.name) {
            Some(value) => match field.render_data(value) {
                Ok(rendered) => fields.push((field.name.clone(), rendered)),
                Err(issue) => issues.push(issue),
            },
            // Omitted nullable fields are not written at all.
            None if field.nullable => {}
            None => issues.push(missing(&field.name, field.kind)),
        }
    }

    match (key, id, geometry) {
        (Some(key), Some(id), Some(geometry)) if issues.is_empty() => Ok(WriteCommand {
            key,
            id,
            geometry,
            fields,
        }),
        _ => Err(ValidationError::new(issues)),
    }
}

/// Read request for an object of this schema.
pub fn read_request(schema: &Schema, key: String, id: String) -> ReadRequest {
    let shape = match schema.geometry().map(|field| field.kind) {
        Some(FieldKind::GeoHash { precision }) => GeometryShape::Hash { precision },
        _ => GeometryShape::Object,
    };
    ReadRequest {
        key,
        id,
        with_fields: true,
        shape,
    }
}

/// Parse a stored object into a model's serde map.
///
/// Identifier and group are not stored as fields, so their values come from the
/// caller's lookup.
pub fn parse_read(
    schema: &Schema,
    id: &Value,
    group: Option<&Value>,
    stored: &StoredObject,
) -> ValidationResult<Map<String, Value>> {
    let mut issues = Vec::new();
    let mut values = Map::new();

    values.insert(schema.identifier().name.clone(), id.clone());
    if let (Some(field), Some(value)) = (schema.group(), group) {
        values.insert(field.name.clone(), value.clone());
    }

    if let Some(field) = schema.geometry() {
        match field.parse_geometry(&stored.geometry) {
            Ok(value) => {
                values.insert(field.name.clone(), value);
            }
            Err(issue) => issues.push(issue),
        }
    }

    for field in schema.data_fields() {
        match stored.field(&field.name) {
            Some(raw) => match field.parse_data(raw) {
                Ok(value) => {
                    values.insert(field.name.clone(), value);
                }
                Err(issue) => issues.push(issue),
            },
            None if field.nullable => {}
            None => issues.push(FieldIssue::new(
                &field.name,
                field.kind.to_string(),
                "<absent>",
                "store response is missing this field",
            )),
        }
    }

    if issues.is_empty() {
        Ok(values)
    } else {
        Err(ValidationError::new(issues))
    }
}

fn missing(name: &str, kind: FieldKind) -> FieldIssue {
    FieldIssue::new(name, kind.to_string(), "<absent>", "required field is missing")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::{FieldSpec, ScalarType};

    fn schema() -> Schema {
        Schema::new(
            "truck",
            vec![
                FieldSpec::identifier("id"),
                FieldSpec::group("group"),
                FieldSpec::point("location"),
                FieldSpec::char("field", ScalarType::String).nullable(true),
                FieldSpec::json("extra"),
            ],
        )
        .unwrap()
    }

    fn values(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn builds_write_command() {
        let input = values(json!({
            "id": 1,
            "group": "foo",
            "location": [0.0, 0.0],
            "field": "bar",
            "extra": [{"test": 1}],
        }));
        let command = build_write(&schema(), &input).unwrap();
        assert_eq!(command.key, "truck:group=foo");
        assert_eq!(command.id, "1");
        assert_eq!(command.geometry, GeometryPayload::point(Point::new(0.0, 0.0).unwrap()));
        assert_eq!(
            command.fields,
            vec![
                ("field".to_string(), Some("bar".to_string())),
                ("extra".to_string(), Some(r#"[{"test":1}]"#.to_string())),
            ]
        );
    }

    #[test]
    fn null_is_written_but_omission_is_not() {
        let with_null = values(json!({"id": 1, "group": "g", "location": [0, 0], "field": null, "extra": {}}));
        let command = build_write(&schema(), &with_null).unwrap();
        assert!(command.fields.contains(&("field".to_string(), None)));

        let omitted = values(json!({"id": 1, "group": "g", "location": [0, 0], "extra": {}}));
        let command = build_write(&schema(), &omitted).unwrap();
        assert!(command.fields.iter().all(|(name, _)| name != "field"));
    }

    #[test]
    fn collects_every_issue() {
        let input = values(json!({"id": 1.5, "location": [200, 0], "field": 3}));
        let err = build_write(&schema(), &input).unwrap_err();
        for name in ["id", "group", "location", "field", "extra"] {
            assert!(err.issue_for(name).is_some(), "expected an issue for {name}");
        }
    }

    #[test]
    fn models_without_geometry_write_a_degenerate_point() {
        let schema = Schema::new("note", vec![FieldSpec::identifier("id")]).unwrap();
        let command = build_write(&schema, &values(json!({"id": "n1"}))).unwrap();
        assert_eq!(command.key, "note");
        assert_eq!(command.geometry, GeometryPayload::degenerate());
    }

    #[test]
    fn read_shape_follows_geometry_kind() {
        let request = read_request(&schema(), "truck:group=foo".into(), "1".into());
        assert_eq!(request.shape, GeometryShape::Object);
        assert!(request.with_fields);

        let hashed = Schema::new("truck", vec![FieldSpec::identifier("id"), FieldSpec::geohash("location")]).unwrap();
        let request = read_request(&hashed, "truck".into(), "1".into());
        assert_eq!(request.shape, GeometryShape::Hash { precision: 9 });
    }

    #[test]
    fn parses_stored_object() {
        let stored = StoredObject {
            geometry: StoredGeometry::Object(json!({"type": "Point", "coordinates": [1.0, 2.0]})),
            fields: vec![
                ("field".into(), None),
                ("extra".into(), Some(r#"{"a":[1,2]}"#.into())),
                ("unknown".into(), Some("ignored".into())),
            ],
        };
        let parsed = parse_read(&schema(), &json!(1), Some(&json!("foo")), &stored).unwrap();
        assert_eq!(
            Value::Object(parsed),
            json!({
                "id": 1,
                "group": "foo",
                "location": [1.0, 2.0],
                "field": null,
                "extra": {"a": [1, 2]},
            })
        );
    }

    #[test]
    fn missing_required_field_is_a_parse_issue() {
        let stored = StoredObject {
            geometry: StoredGeometry::Object(json!({"type": "Point", "coordinates": [1.0, 2.0]})),
            fields: vec![],
        };
        let err = parse_read(&schema(), &json!(1), Some(&json!("foo")), &stored).unwrap_err();
        assert!(err.issue_for("extra").is_some());
        assert!(err.issue_for("field").is_none());
    }
}

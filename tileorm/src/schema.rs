use serde_json::Value;

use crate::{
    errors::{FieldIssue, SchemaError},
    fields::{FieldRole, FieldSpec},
    keys::KeyContext,
};

/// Validated, immutable field layout of one model.
///
/// Built once per model type (see [`crate::registry::schema_for`]) and shared by every
/// create/get call for that type.
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    model: String,
    fields: Vec<FieldSpec>,
    identifier: usize,
    group: Option<usize>,
    geometry: Option<usize>,
}

impl Schema {
    pub fn new(model: impl Into<String>, fields: Vec<FieldSpec>) -> Result<Self, SchemaError> {
        let model = model.into();

        for (idx, field) in fields.iter().enumerate() {
            if fields[..idx].iter().any(|earlier| earlier.name == field.name) {
                return Err(SchemaError::DuplicateField {
                    model,
                    field: field.name.clone(),
                });
            }
        }

        let with_role = |role: FieldRole| -> Vec<usize> {
            fields
                .iter()
                .enumerate()
                .filter(|(_, field)| field.role() == role)
                .map(|(idx, _)| idx)
                .collect()
        };
        let names = |indices: &[usize]| -> Vec<String> {
            indices.iter().map(|idx| fields[*idx].name.clone()).collect()
        };

        let identifiers = with_role(FieldRole::Identifier);
        let identifier = match identifiers.as_slice() {
            [] => return Err(SchemaError::NoIdentifier { model }),
            [only] => *only,
            many => {
                return Err(SchemaError::MultipleIdentifiers {
                    model,
                    fields: names(many),
                });
            }
        };

        let groups = with_role(FieldRole::Group);
        if groups.len() > 1 {
            return Err(SchemaError::MultipleGroups {
                model,
                fields: names(&groups),
            });
        }

        let geometries = with_role(FieldRole::Geometry);
        if geometries.len() > 1 {
            return Err(SchemaError::MultipleGeometries {
                model,
                fields: names(&geometries),
            });
        }

        if let Some(field) = fields.iter().find(|field| field.nullable && field.role() != FieldRole::Data) {
            return Err(SchemaError::NonNullable {
                model,
                field: field.name.clone(),
            });
        }

        Ok(Self {
            model,
            identifier,
            group: groups.first().copied(),
            geometry: geometries.first().copied(),
            fields,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|field| field.name == name)
    }

    pub fn identifier(&self) -> &FieldSpec {
        &self.fields[self.identifier]
    }

    pub fn group(&self) -> Option<&FieldSpec> {
        self.group.map(|idx| &self.fields[idx])
    }

    pub fn geometry(&self) -> Option<&FieldSpec> {
        self.geometry.map(|idx| &self.fields[idx])
    }

    pub fn data_fields(&self) -> impl Iterator<Item = &FieldSpec> {
        self.fields.iter().filter(|field| field.role() == FieldRole::Data)
    }

    pub fn key_context(&self) -> KeyContext<'_> {
        KeyContext::new(&self.model, self.group().map(|field| field.name.as_str()))
    }

    /// Collection key for the given group value.
    ///
    /// Grouped models require a value; ungrouped models always use the bare model name.
    pub fn collection_key(&self, group_value: Option<&Value>) -> Result<String, FieldIssue> {
        let ctx = self.key_context();
        let Some(group) = self.group() else {
            return Ok(ctx.collection(None));
        };
        match group_value {
            Some(value) if !value.is_null() => {
                let rendered = group.render_key(value)?;
                Ok(ctx.collection(Some(&rendered)))
            }
            _ => Err(FieldIssue::new(
                &group.name,
                group.kind.to_string(),
                "null",
                "a group value is required to derive the collection key",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::ScalarType;
    use serde_json::json;

    fn truck_fields() -> Vec<FieldSpec> {
        vec![
            FieldSpec::identifier("id"),
            FieldSpec::group("group"),
            FieldSpec::point("location"),
            FieldSpec::char("field", ScalarType::String),
        ]
    }

    #[test]
    fn classifies_fields_by_role() {
        let schema = Schema::new("truck", truck_fields()).unwrap();
        assert_eq!(schema.identifier().name, "id");
        assert_eq!(schema.group().map(|f| f.name.as_str()), Some("group"));
        assert_eq!(schema.geometry().map(|f| f.name.as_str()), Some("location"));
        let data: Vec<_> = schema.data_fields().map(|f| f.name.as_str()).collect();
        assert_eq!(data, vec!["field"]);
    }

    #[test]
    fn requires_an_identifier() {
        let fields = vec![FieldSpec::point("location"), FieldSpec::group("group")];
        assert_eq!(
            Schema::new("truck", fields),
            Err(SchemaError::NoIdentifier { model: "truck".into() })
        );
    }

    #[test]
    fn rejects_multiple_identifiers() {
        let fields = vec![FieldSpec::identifier("id"), FieldSpec::identifier("id2")];
        assert_eq!(
            Schema::new("truck", fields),
            Err(SchemaError::MultipleIdentifiers {
                model: "truck".into(),
                fields: vec!["id".into(), "id2".into()],
            })
        );
    }

    #[test]
    fn rejects_second_geometry_and_group() {
        let geometries = vec![
            FieldSpec::identifier("id"),
            FieldSpec::point("location"),
            FieldSpec::bounds("area"),
        ];
        assert!(matches!(
            Schema::new("truck", geometries),
            Err(SchemaError::MultipleGeometries { .. })
        ));
        let groups = vec![FieldSpec::identifier("id"), FieldSpec::group("a"), FieldSpec::group("b")];
        assert!(matches!(Schema::new("truck", groups), Err(SchemaError::MultipleGroups { .. })));
    }

    #[test]
    fn rejects_duplicates_and_nullable_keys() {
        let duplicate = vec![FieldSpec::identifier("id"), FieldSpec::json("id")];
        assert!(matches!(
            Schema::new("truck", duplicate),
            Err(SchemaError::DuplicateField { field, .. }) if field == "id"
        ));
        let nullable = vec![FieldSpec::identifier("id"), FieldSpec::point("location").nullable(true)];
        assert!(matches!(
            Schema::new("truck", nullable),
            Err(SchemaError::NonNullable { field, .. }) if field == "location"
        ));
    }

    #[test]
    fn derives_collection_keys() {
        let schema = Schema::new("truck", truck_fields()).unwrap();
        assert_eq!(schema.collection_key(Some(&json!("foo"))).unwrap(), "truck:group=foo");
        assert_eq!(schema.collection_key(Some(&json!(7))).unwrap(), "truck:group=7");
        assert!(schema.collection_key(None).is_err());

        let bare = Schema::new("truck", vec![FieldSpec::identifier("id")]).unwrap();
        assert_eq!(bare.collection_key(None).unwrap(), "truck");
    }
}

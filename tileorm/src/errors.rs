use thiserror::Error;

/// Top-level error type returned by tileorm repositories.
#[derive(Debug, Error)]
pub enum OrmError {
    /// The model's declared fields do not form a valid schema.
    #[error("invalid schema: {0}")]
    Schema(#[from] SchemaError),

    /// Validation failed for one or more fields.
    #[error("validation failed")]
    Validation(#[from] ValidationError),

    /// The store holds no object under the given collection key and identifier.
    #[error("object {id} not found in {key}")]
    NotFound { key: String, id: String },

    /// Invalid input supplied to a repository operation.
    #[error("invalid request: {message}")]
    InvalidRequest { message: String },

    /// Underlying store command failed. Passed through untouched.
    #[error(transparent)]
    Store(#[from] redis::RedisError),
}

impl OrmError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, OrmError::NotFound { .. })
    }
}

/// Schema invariant violations detected while building a [`crate::schema::Schema`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("model `{model}` declares no identifier field")]
    NoIdentifier { model: String },

    #[error("model `{model}` declares more than one identifier field: {fields:?}")]
    MultipleIdentifiers { model: String, fields: Vec<String> },

    #[error("model `{model}` declares more than one group field: {fields:?}")]
    MultipleGroups { model: String, fields: Vec<String> },

    #[error("model `{model}` declares more than one geometry field: {fields:?}")]
    MultipleGeometries { model: String, fields: Vec<String> },

    #[error("model `{model}` declares field `{field}` twice")]
    DuplicateField { model: String, field: String },

    #[error("field `{field}` of model `{model}` carries the object's key or geometry and cannot be nullable")]
    NonNullable { model: String, field: String },
}

/// Construction failures of the geometry value types.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeometryError {
    #[error("longitude {0} is outside [-180, 180]")]
    LongitudeOutOfRange(f64),

    #[error("latitude {0} is outside [-90, 90]")]
    LatitudeOutOfRange(f64),

    #[error("bounds minimum exceeds maximum on the {axis} axis ({min} > {max})")]
    InvertedBounds { axis: &'static str, min: f64, max: f64 },

    #[error("geohash is empty")]
    EmptyGeoHash,

    #[error("geohash `{0}` contains characters outside the base32 geohash alphabet")]
    InvalidGeoHash(String),

    #[error("geohash precision {0} is outside 1..=12")]
    InvalidPrecision(usize),
}

/// Collection of validation issues encountered while rendering or parsing a model.
#[derive(Debug, Error)]
#[error("validation errors: {issues:?}")]
pub struct ValidationError {
    pub issues: Vec<FieldIssue>,
}

impl ValidationError {
    pub fn new<I>(issues: I) -> Self
    where
        I: IntoIterator<Item = FieldIssue>,
    {
        Self {
            issues: issues.into_iter().collect(),
        }
    }

    /// Convenience helper for constructing a single-field validation error.
    pub fn single(
        field: impl Into<String>,
        expected: impl Into<String>,
        received: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::new([FieldIssue::new(field, expected, received, message)])
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    /// Returns the first issue reported for `field`, if any.
    pub fn issue_for(&self, field: &str) -> Option<&FieldIssue> {
        self.issues.iter().find(|issue| issue.field == field)
    }
}

/// Detailed validation failure for a single field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldIssue {
    pub field: String,
    /// Kind the field was declared with, e.g. `point` or `char(integer)`.
    pub expected: String,
    /// Rendering of the offending value.
    pub received: String,
    pub message: String,
}

impl FieldIssue {
    pub fn new(
        field: impl Into<String>,
        expected: impl Into<String>,
        received: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            field: field.into(),
            expected: expected.into(),
            received: received.into(),
            message: message.into(),
        }
    }
}

pub type ValidationResult<T> = Result<T, ValidationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_finds_issue_by_field() {
        let err = ValidationError::new([
            FieldIssue::new("location", "point", "[1]", "expected two coordinates"),
            FieldIssue::new("field", "char(string)", "null", "field is not nullable"),
        ]);
        assert!(!err.is_empty());
        assert_eq!(err.issue_for("field").map(|i| i.expected.as_str()), Some("char(string)"));
        assert!(err.issue_for("id").is_none());
    }

    #[test]
    fn store_errors_pass_through_unchanged() {
        let redis_err = redis::RedisError::from((redis::ErrorKind::ResponseError, "read only"));
        let rendered = redis_err.to_string();
        let err = OrmError::from(redis_err);
        assert_eq!(err.to_string(), rendered);
        assert!(matches!(err, OrmError::Store(_)));
    }
}

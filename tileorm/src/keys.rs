/// Collection key construction for a model.
#[derive(Debug, Clone)]
pub struct KeyContext<'a> {
    pub model: &'a str,
    pub group_field: Option<&'a str>,
}

impl<'a> KeyContext<'a> {
    pub fn new(model: &'a str, group_field: Option<&'a str>) -> Self {
        Self { model, group_field }
    }

    /// `model:group_field=group_value` for grouped models, `model` otherwise.
    ///
    /// A group value is ignored when the model declares no group field.
    pub fn collection(&self, group_value: Option<&str>) -> String {
        match (self.group_field, group_value) {
            (Some(field), Some(value)) => format!("{}:{}={}", self.model, field, value),
            _ => self.model.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_grouped_collection_keys() {
        let ctx = KeyContext::new("truck", Some("group"));
        assert_eq!(ctx.collection(Some("foo")), "truck:group=foo");
    }

    #[test]
    fn ungrouped_models_use_the_bare_name() {
        let ctx = KeyContext::new("truck", None);
        assert_eq!(ctx.collection(None), "truck");
        assert_eq!(ctx.collection(Some("foo")), "truck");
    }
}

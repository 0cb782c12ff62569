use std::collections::BTreeMap;

use crate::error::LibSchemaError;

use super::fields::{table_name, FieldDef};

/// In-memory definition of one model, as produced by replaying operations.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelState {
    pub app: String,
    pub name: String,
    pub fields: Vec<(String, FieldDef)>,
}

impl ModelState {
    pub fn new(app: &str, name: &str, fields: &[(&'static str, FieldDef)]) -> Self {
        Self {
            app: app.to_owned(),
            name: name.to_owned(),
            fields: fields
                .iter()
                .map(|(field_name, def)| (field_name.to_string(), *def))
                .collect(),
        }
    }

    pub fn table(&self) -> String {
        table_name(&self.app, &self.name)
    }

    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields
            .iter()
            .find(|(field_name, _)| field_name == name)
            .map(|(_, def)| def)
    }
}

/// All models known after applying some prefix of the migration plan.
/// Keyed by `(app, lowercase model name)`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProjectState {
    models: BTreeMap<(String, String), ModelState>,
}

impl ProjectState {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(app: &str, model: &str) -> (String, String) {
        (app.to_owned(), model.to_ascii_lowercase())
    }

    pub fn model(&self, app: &str, model: &str) -> Option<&ModelState> {
        self.models.get(&Self::key(app, model))
    }

    pub fn require_model(&self, app: &str, model: &str) -> Result<&ModelState, LibSchemaError> {
        self.model(app, model).ok_or_else(|| {
            LibSchemaError::State(format!("No model '{model}' in app '{app}'"))
        })
    }

    pub fn add_model(&mut self, model: ModelState) -> Result<(), LibSchemaError> {
        let key = Self::key(&model.app, &model.name);
        if self.models.contains_key(&key) {
            return Err(LibSchemaError::State(format!(
                "Model '{}' already exists in app '{}'",
                model.name, model.app
            )));
        }
        self.models.insert(key, model);
        Ok(())
    }

    pub fn add_field(
        &mut self,
        app: &str,
        model: &str,
        name: &str,
        field: FieldDef,
    ) -> Result<(), LibSchemaError> {
        let model_state = self.model_mut(app, model)?;
        if model_state.field(name).is_some() {
            return Err(LibSchemaError::State(format!(
                "Field '{name}' already exists on {app}.{model}"
            )));
        }
        model_state.fields.push((name.to_owned(), field));
        Ok(())
    }

    /// Replaces a field definition in place, keeping column order.
    pub fn alter_field(
        &mut self,
        app: &str,
        model: &str,
        name: &str,
        field: FieldDef,
    ) -> Result<(), LibSchemaError> {
        let model_state = self.model_mut(app, model)?;
        let slot = model_state
            .fields
            .iter_mut()
            .find(|(field_name, _)| field_name == name)
            .ok_or_else(|| {
                LibSchemaError::State(format!("No field '{name}' on {app}.{model}"))
            })?;
        slot.1 = field;
        Ok(())
    }

    fn model_mut(&mut self, app: &str, model: &str) -> Result<&mut ModelState, LibSchemaError> {
        self.models
            .get_mut(&Self::key(app, model))
            .ok_or_else(|| LibSchemaError::State(format!("No model '{model}' in app '{app}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::fields::{FieldDefault, FieldKind};

    fn book_state() -> ProjectState {
        let mut state = ProjectState::new();
        state
            .add_model(ModelState::new(
                "library",
                "Book",
                &[
                    ("id", FieldDef::new(FieldKind::AutoPrimaryKey)),
                    ("best_seller", FieldDef::new(FieldKind::Boolean)),
                ],
            ))
            .unwrap();
        state
    }

    #[test]
    fn test_model_lookup_is_case_insensitive() {
        let state = book_state();
        assert!(state.model("library", "book").is_some());
        assert!(state.model("library", "BOOK").is_some());
        assert!(state.model("other", "book").is_none());
        assert_eq!(state.model("library", "book").unwrap().table(), "library_book");
    }

    #[test]
    fn test_duplicate_model_rejected() {
        let mut state = book_state();
        let result = state.add_model(ModelState::new("library", "book", &[]));
        assert!(matches!(result, Err(LibSchemaError::State(_))));
    }

    #[test]
    fn test_alter_field_keeps_position() {
        let mut state = book_state();
        state
            .add_field(
                "library",
                "book",
                "quantity",
                FieldDef::new(FieldKind::PositiveInteger),
            )
            .unwrap();
        let altered = FieldDef::new(FieldKind::Boolean).default(FieldDefault::Bool(false));
        state
            .alter_field("library", "book", "best_seller", altered)
            .unwrap();

        let model = state.model("library", "book").unwrap();
        let names: Vec<&str> = model.fields.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["id", "best_seller", "quantity"]);
        assert_eq!(model.field("best_seller"), Some(&altered));
    }

    #[test]
    fn test_alter_unknown_field_fails() {
        let mut state = book_state();
        let result = state.alter_field(
            "library",
            "book",
            "missing",
            FieldDef::new(FieldKind::Boolean),
        );
        assert!(matches!(result, Err(LibSchemaError::State(_))));
    }

    #[test]
    fn test_add_duplicate_field_fails() {
        let mut state = book_state();
        let result = state.add_field("library", "book", "id", FieldDef::new(FieldKind::PositiveInteger));
        assert!(matches!(result, Err(LibSchemaError::State(_))));
    }
}

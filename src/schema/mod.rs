pub mod fields;
mod library;
pub mod state;

use rusqlite::Connection;

use crate::db::editor::SchemaEditor;
use crate::error::LibSchemaError;
use fields::FieldDef;
use state::{ModelState, ProjectState};

/// Function type for migration code that transforms data during schema upgrades.
pub type MigrationFn = fn(&Connection) -> Result<(), LibSchemaError>;

/// A single schema or state change inside a migration.
#[derive(Debug, Clone, Copy)]
pub enum Operation {
    CreateModel {
        name: &'static str,
        fields: &'static [(&'static str, FieldDef)],
    },
    AddField {
        model_name: &'static str,
        name: &'static str,
        field: FieldDef,
    },
    /// Replaces the complete definition of an existing field: type,
    /// nullability, default and labels.
    AlterField {
        model_name: &'static str,
        name: &'static str,
        field: FieldDef,
    },
    /// Raw SQL batch. No step in the registry needs one yet.
    #[allow(dead_code)]
    RunSql(&'static str),
    /// Data transformation run against the open transaction.
    #[allow(dead_code)]
    RunCode(MigrationFn),
}

impl Operation {
    pub fn describe(&self) -> String {
        match self {
            Operation::CreateModel { name, .. } => format!("Create model {name}"),
            Operation::AddField {
                model_name, name, ..
            } => format!("Add field {name} to {model_name}"),
            Operation::AlterField {
                model_name, name, ..
            } => format!("Alter field {name} on {model_name}"),
            Operation::RunSql(_) => "Raw SQL operation".to_owned(),
            Operation::RunCode(_) => "Raw Rust operation".to_owned(),
        }
    }

    /// Applies this operation to the in-memory project state.
    pub fn state_forwards(&self, app: &str, state: &mut ProjectState) -> Result<(), LibSchemaError> {
        match self {
            Operation::CreateModel { name, fields } => {
                state.add_model(ModelState::new(app, name, fields))
            }
            Operation::AddField {
                model_name,
                name,
                field,
            } => state.add_field(app, model_name, name, *field),
            Operation::AlterField {
                model_name,
                name,
                field,
            } => state.alter_field(app, model_name, name, *field),
            Operation::RunSql(_) | Operation::RunCode(_) => Ok(()),
        }
    }

    /// Issues the database changes that move the schema from `from_state` to
    /// `to_state`.
    pub fn database_forwards(
        &self,
        app: &str,
        editor: &mut SchemaEditor,
        from_state: &ProjectState,
        to_state: &ProjectState,
    ) -> Result<(), LibSchemaError> {
        match self {
            Operation::CreateModel { name, .. } => {
                editor.create_model(to_state.require_model(app, name)?)
            }
            Operation::AddField {
                model_name, name, ..
            } => editor.add_field(
                from_state.require_model(app, model_name)?,
                to_state.require_model(app, model_name)?,
                name,
            ),
            Operation::AlterField {
                model_name, name, ..
            } => editor.alter_field(
                from_state.require_model(app, model_name)?,
                to_state.require_model(app, model_name)?,
                name,
            ),
            Operation::RunSql(sql) => editor.run_sql(sql),
            Operation::RunCode(code_fn) => editor.run_code(*code_fn),
        }
    }
}

/// Migration descriptor: one versioned step in an app's migration chain.
///
/// `name` carries a four digit prefix that orders the step within its app.
/// `dependencies` lists the `(app, name)` steps that must be applied first.
#[derive(Debug)]
pub struct Migration {
    pub app_label: &'static str,
    pub name: &'static str,
    pub dependencies: &'static [(&'static str, &'static str)],
    pub operations: &'static [Operation],
}

/// Every migration this binary knows about.
pub fn all_migrations() -> Vec<&'static Migration> {
    library::MIGRATIONS.iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use fields::{FieldDefault, FieldKind};

    #[test]
    fn test_operation_descriptions() {
        let alter = Operation::AlterField {
            model_name: "book",
            name: "best_seller",
            field: FieldDef::new(FieldKind::Boolean),
        };
        assert_eq!(alter.describe(), "Alter field best_seller on book");

        let add = Operation::AddField {
            model_name: "book",
            name: "quantity",
            field: FieldDef::new(FieldKind::PositiveInteger),
        };
        assert_eq!(add.describe(), "Add field quantity to book");

        let create = Operation::CreateModel {
            name: "Book",
            fields: &[],
        };
        assert_eq!(create.describe(), "Create model Book");
        assert_eq!(Operation::RunSql("SELECT 1").describe(), "Raw SQL operation");
    }

    #[test]
    fn test_state_forwards_alter_field() {
        const FIELDS: &[(&str, FieldDef)] = &[
            ("id", FieldDef::new(FieldKind::AutoPrimaryKey)),
            ("best_seller", FieldDef::new(FieldKind::Boolean)),
        ];
        let mut state = ProjectState::new();
        Operation::CreateModel {
            name: "Book",
            fields: FIELDS,
        }
        .state_forwards("library", &mut state)
        .unwrap();

        let new_field = FieldDef::new(FieldKind::Boolean)
            .default(FieldDefault::Bool(false))
            .verbose_name("лидер продаж");
        Operation::AlterField {
            model_name: "book",
            name: "best_seller",
            field: new_field,
        }
        .state_forwards("library", &mut state)
        .unwrap();

        let book = state.model("library", "book").unwrap();
        assert_eq!(book.field("best_seller"), Some(&new_field));
    }

    #[test]
    fn test_registry_is_not_empty() {
        let migrations = all_migrations();
        assert!(migrations.iter().all(|m| m.app_label == "library"));
        assert!(migrations
            .iter()
            .any(|m| m.name == "0006_alter_book_best_seller"));
    }
}

use log::debug;
use rusqlite::Connection;

use crate::error::LibSchemaError;
use crate::schema::fields::FieldDef;
use crate::schema::state::ModelState;
use crate::schema::MigrationFn;

/// Turns operations into SQLite DDL.
///
/// With a connection, every statement is executed as it is produced. Without
/// one, statements are only collected (used to render a migration's SQL).
pub struct SchemaEditor<'a> {
    conn: Option<&'a Connection>,
    collected: Vec<String>,
}

impl<'a> SchemaEditor<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self {
            conn: Some(conn),
            collected: Vec::new(),
        }
    }

    pub fn collecting() -> Self {
        Self {
            conn: None,
            collected: Vec::new(),
        }
    }

    pub fn into_sql(self) -> Vec<String> {
        self.collected
    }

    fn execute(&mut self, sql: String) -> Result<(), LibSchemaError> {
        debug!("{}", sql);
        if let Some(conn) = self.conn {
            conn.execute_batch(&sql)?;
        }
        self.collected.push(sql);
        Ok(())
    }

    pub fn create_model(&mut self, model: &ModelState) -> Result<(), LibSchemaError> {
        let table = model.table();
        self.execute(create_table_sql(&table, model))?;
        self.create_relation_indexes(&table, model)
    }

    pub fn add_field(
        &mut self,
        from_model: &ModelState,
        to_model: &ModelState,
        name: &str,
    ) -> Result<(), LibSchemaError> {
        let field = to_model
            .field(name)
            .ok_or_else(|| missing_field(to_model, name))?;

        // SQLite refuses ADD COLUMN for references and for NOT NULL columns
        // without a default.
        if field.is_relation() || (!field.null && field.default.is_none()) {
            return self.remake_table(from_model, to_model);
        }

        self.execute(format!(
            "ALTER TABLE \"{}\" ADD COLUMN {}",
            to_model.table(),
            field.column_sql(&to_model.app, name)
        ))
    }

    /// SQLite has no ALTER COLUMN, so any field change rebuilds the table.
    pub fn alter_field(
        &mut self,
        from_model: &ModelState,
        to_model: &ModelState,
        name: &str,
    ) -> Result<(), LibSchemaError> {
        let old = from_model
            .field(name)
            .ok_or_else(|| missing_field(from_model, name))?;
        let new = to_model
            .field(name)
            .ok_or_else(|| missing_field(to_model, name))?;

        if old.column_sql(&from_model.app, name) == new.column_sql(&to_model.app, name) {
            debug!(
                "Field {}.{} differs only in labels; no database change",
                to_model.table(),
                name
            );
            return Ok(());
        }

        self.remake_table(from_model, to_model)
    }

    pub fn run_sql(&mut self, sql: &str) -> Result<(), LibSchemaError> {
        self.execute(sql.trim().to_owned())
    }

    pub fn run_code(&mut self, code_fn: MigrationFn) -> Result<(), LibSchemaError> {
        match self.conn {
            Some(conn) => code_fn(conn),
            None => {
                self.collected.push("-- Raw Rust operation".to_owned());
                Ok(())
            }
        }
    }

    /// Rebuilds `from_model`'s table with `to_model`'s columns:
    /// create `new__<table>`, copy shared columns, drop the old table, rename,
    /// then recreate indexes.
    fn remake_table(
        &mut self,
        from_model: &ModelState,
        to_model: &ModelState,
    ) -> Result<(), LibSchemaError> {
        let table = to_model.table();
        let temp_table = format!("new__{table}");

        let mut columns = Vec::new();
        let mut selects = Vec::new();
        for (name, new_field) in &to_model.fields {
            let Some(old_field) = from_model.field(name) else {
                continue;
            };
            let column = new_field.column(name);
            columns.push(format!("\"{column}\""));
            selects.push(copy_expression(&old_field.column(name), old_field, new_field));
        }

        self.execute(create_table_sql(&temp_table, to_model))?;
        self.execute(format!(
            "INSERT INTO \"{temp_table}\" ({}) SELECT {} FROM \"{}\"",
            columns.join(", "),
            selects.join(", "),
            from_model.table()
        ))?;
        self.execute(format!("DROP TABLE \"{}\"", from_model.table()))?;
        self.execute(format!(
            "ALTER TABLE \"{temp_table}\" RENAME TO \"{table}\""
        ))?;
        self.create_relation_indexes(&table, to_model)
    }

    fn create_relation_indexes(
        &mut self,
        table: &str,
        model: &ModelState,
    ) -> Result<(), LibSchemaError> {
        for (name, field) in model.fields.iter().filter(|(_, f)| f.is_relation()) {
            let column = field.column(name);
            self.execute(format!(
                "CREATE INDEX \"{table}_{column}_idx\" ON \"{table}\" (\"{column}\")"
            ))?;
        }
        Ok(())
    }
}

fn create_table_sql(table: &str, model: &ModelState) -> String {
    let columns: Vec<String> = model
        .fields
        .iter()
        .map(|(name, field)| field.column_sql(&model.app, name))
        .collect();
    format!("CREATE TABLE \"{table}\" ({})", columns.join(", "))
}

/// Rows that were NULL under a nullable definition take the new default when
/// the column becomes NOT NULL.
fn copy_expression(old_column: &str, old_field: &FieldDef, new_field: &FieldDef) -> String {
    match (&new_field.default, old_field.null && !new_field.null) {
        (Some(default), true) => format!("coalesce(\"{old_column}\", {})", default.sql_literal()),
        _ => format!("\"{old_column}\""),
    }
}

fn missing_field(model: &ModelState, name: &str) -> LibSchemaError {
    LibSchemaError::State(format!("No field '{}' on {}.{}", name, model.app, model.name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::fields::{FieldDefault, FieldKind};
    use pretty_assertions::assert_eq;

    fn book(best_seller: FieldDef) -> ModelState {
        ModelState {
            app: "library".to_owned(),
            name: "Book".to_owned(),
            fields: vec![
                ("id".to_owned(), FieldDef::new(FieldKind::AutoPrimaryKey)),
                (
                    "title".to_owned(),
                    FieldDef::new(FieldKind::Char { max_length: 200 }),
                ),
                ("best_seller".to_owned(), best_seller),
            ],
        }
    }

    fn column_default(conn: &Connection, table: &str, column: &str) -> Option<String> {
        conn.query_row(
            "SELECT dflt_value FROM pragma_table_info(?1) WHERE name = ?2",
            [table, column],
            |row| row.get(0),
        )
        .unwrap()
    }

    #[test]
    fn test_collecting_editor_renders_rebuild() {
        let old = book(FieldDef::new(FieldKind::Boolean));
        let new = book(FieldDef::new(FieldKind::Boolean).default(FieldDefault::Bool(false)));

        let mut editor = SchemaEditor::collecting();
        editor.alter_field(&old, &new, "best_seller").unwrap();

        assert_eq!(
            editor.into_sql(),
            vec![
                "CREATE TABLE \"new__library_book\" (\"id\" integer NOT NULL PRIMARY KEY AUTOINCREMENT, \"title\" varchar(200) NOT NULL, \"best_seller\" bool NOT NULL DEFAULT 0)".to_owned(),
                "INSERT INTO \"new__library_book\" (\"id\", \"title\", \"best_seller\") SELECT \"id\", \"title\", \"best_seller\" FROM \"library_book\"".to_owned(),
                "DROP TABLE \"library_book\"".to_owned(),
                "ALTER TABLE \"new__library_book\" RENAME TO \"library_book\"".to_owned(),
            ]
        );
    }

    #[test]
    fn test_label_only_change_is_noop() {
        let old = book(FieldDef::new(FieldKind::Boolean));
        let new = book(FieldDef::new(FieldKind::Boolean).verbose_name("лидер продаж"));

        let mut editor = SchemaEditor::collecting();
        editor.alter_field(&old, &new, "best_seller").unwrap();
        assert!(editor.into_sql().is_empty());
    }

    #[test]
    fn test_alter_field_preserves_rows_and_sets_default() {
        let conn = Connection::open_in_memory().unwrap();
        let old = book(FieldDef::new(FieldKind::Boolean));
        let new = book(FieldDef::new(FieldKind::Boolean).default(FieldDefault::Bool(false)));

        let mut editor = SchemaEditor::new(&conn);
        editor.create_model(&old).unwrap();
        conn.execute(
            "INSERT INTO library_book (title, best_seller) VALUES ('Война и мир', 1)",
            [],
        )
        .unwrap();
        assert_eq!(column_default(&conn, "library_book", "best_seller"), None);

        editor.alter_field(&old, &new, "best_seller").unwrap();

        assert_eq!(
            column_default(&conn, "library_book", "best_seller"),
            Some("0".to_owned())
        );
        let (title, best_seller): (String, bool) = conn
            .query_row("SELECT title, best_seller FROM library_book", [], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })
            .unwrap();
        assert_eq!(title, "Война и мир");
        assert!(best_seller);
    }

    #[test]
    fn test_nulls_take_new_default() {
        let conn = Connection::open_in_memory().unwrap();
        let old = book(FieldDef::new(FieldKind::Boolean).nullable());
        let new = book(FieldDef::new(FieldKind::Boolean).default(FieldDefault::Bool(false)));

        let mut editor = SchemaEditor::new(&conn);
        editor.create_model(&old).unwrap();
        conn.execute("INSERT INTO library_book (title) VALUES ('Нос')", [])
            .unwrap();

        editor.alter_field(&old, &new, "best_seller").unwrap();

        let best_seller: bool = conn
            .query_row("SELECT best_seller FROM library_book", [], |row| row.get(0))
            .unwrap();
        assert!(!best_seller);
    }

    #[test]
    fn test_add_field_with_default_uses_alter_table() {
        let conn = Connection::open_in_memory().unwrap();
        let old = book(FieldDef::new(FieldKind::Boolean));
        let mut new = old.clone();
        new.fields.push((
            "quantity".to_owned(),
            FieldDef::new(FieldKind::PositiveInteger).default(FieldDefault::Int(1)),
        ));

        let mut editor = SchemaEditor::new(&conn);
        editor.create_model(&old).unwrap();
        conn.execute(
            "INSERT INTO library_book (title, best_seller) VALUES ('Идиот', 0)",
            [],
        )
        .unwrap();
        editor.add_field(&old, &new, "quantity").unwrap();

        let sql = editor.into_sql();
        assert!(sql[1].starts_with("ALTER TABLE \"library_book\" ADD COLUMN \"quantity\""));
        let quantity: i64 = conn
            .query_row("SELECT quantity FROM library_book", [], |row| row.get(0))
            .unwrap();
        assert_eq!(quantity, 1);
    }

    #[test]
    fn test_relation_gets_index() {
        let conn = Connection::open_in_memory().unwrap();
        let order = ModelState {
            app: "library".to_owned(),
            name: "Order".to_owned(),
            fields: vec![
                ("id".to_owned(), FieldDef::new(FieldKind::AutoPrimaryKey)),
                (
                    "book".to_owned(),
                    FieldDef::new(FieldKind::ForeignKey { to: "book" }),
                ),
            ],
        };

        let mut editor = SchemaEditor::new(&conn);
        editor
            .create_model(&book(FieldDef::new(FieldKind::Boolean)))
            .unwrap();
        editor.create_model(&order).unwrap();

        let count: i64 = conn
            .query_row(
                "SELECT count(*) FROM sqlite_master WHERE type = 'index' AND name = 'library_order_book_id_idx'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_run_code_is_skipped_when_collecting() {
        fn touch(_conn: &Connection) -> Result<(), LibSchemaError> {
            Err(LibSchemaError::Error("should not run".to_owned()))
        }

        let mut editor = SchemaEditor::collecting();
        editor.run_code(touch).unwrap();
        assert_eq!(editor.into_sql(), vec!["-- Raw Rust operation".to_owned()]);
    }
}

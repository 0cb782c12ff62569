use serde::Serialize;
use strum::{AsRefStr, Display};

/// Storage kind of a model field. Determines the SQLite column type and any
/// column-level constraint.
#[derive(AsRefStr, Display, Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FieldKind {
    #[strum(serialize = "AutoField")]
    AutoPrimaryKey,
    #[strum(serialize = "BooleanField")]
    Boolean,
    #[strum(serialize = "CharField")]
    Char { max_length: u32 },
    #[strum(serialize = "PositiveIntegerField")]
    PositiveInteger,
    #[strum(serialize = "DateTimeField")]
    DateTime,
    /// Reference to another model of the same app, stored as `<name>_id`.
    #[strum(serialize = "ForeignKey")]
    ForeignKey { to: &'static str },
}

impl FieldKind {
    fn column_type(&self) -> String {
        match self {
            FieldKind::AutoPrimaryKey => "integer".to_owned(),
            FieldKind::Boolean => "bool".to_owned(),
            FieldKind::Char { max_length } => format!("varchar({max_length})"),
            FieldKind::PositiveInteger => "integer unsigned".to_owned(),
            FieldKind::DateTime => "datetime".to_owned(),
            FieldKind::ForeignKey { .. } => "bigint".to_owned(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldDefault {
    Bool(bool),
    Int(i64),
}

impl FieldDefault {
    /// Renders the default as an SQLite literal.
    pub fn sql_literal(&self) -> String {
        match self {
            FieldDefault::Bool(b) => if *b { "1" } else { "0" }.to_owned(),
            FieldDefault::Int(i) => i.to_string(),
        }
    }
}

/// Complete definition of a model field.
///
/// `verbose_name` and `help_text` are presentation metadata. They live in the
/// project state only and never reach the database.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FieldDef {
    pub kind: FieldKind,
    pub null: bool,
    pub default: Option<FieldDefault>,
    pub verbose_name: Option<&'static str>,
    pub help_text: Option<&'static str>,
}

impl FieldDef {
    pub const fn new(kind: FieldKind) -> Self {
        Self {
            kind,
            null: false,
            default: None,
            verbose_name: None,
            help_text: None,
        }
    }

    #[cfg(test)]
    pub const fn nullable(self) -> Self {
        Self { null: true, ..self }
    }

    pub const fn default(self, default: FieldDefault) -> Self {
        Self {
            default: Some(default),
            ..self
        }
    }

    pub const fn verbose_name(self, verbose_name: &'static str) -> Self {
        Self {
            verbose_name: Some(verbose_name),
            ..self
        }
    }

    pub const fn help_text(self, help_text: &'static str) -> Self {
        Self {
            help_text: Some(help_text),
            ..self
        }
    }

    pub fn is_relation(&self) -> bool {
        matches!(self.kind, FieldKind::ForeignKey { .. })
    }

    /// Database column name for a field called `name`.
    pub fn column(&self, name: &str) -> String {
        if self.is_relation() {
            format!("{name}_id")
        } else {
            name.to_owned()
        }
    }

    /// Column definition as it appears inside `CREATE TABLE` or `ADD COLUMN`.
    /// `app` resolves foreign key targets to table names.
    pub fn column_sql(&self, app: &str, name: &str) -> String {
        let column = self.column(name);

        if self.kind == FieldKind::AutoPrimaryKey {
            return format!("\"{column}\" integer NOT NULL PRIMARY KEY AUTOINCREMENT");
        }

        let mut sql = format!("\"{column}\" {}", self.kind.column_type());
        sql.push_str(if self.null { " NULL" } else { " NOT NULL" });

        if let Some(default) = &self.default {
            sql.push_str(" DEFAULT ");
            sql.push_str(&default.sql_literal());
        }

        match self.kind {
            FieldKind::PositiveInteger => {
                sql.push_str(&format!(" CHECK (\"{column}\" >= 0)"));
            }
            FieldKind::ForeignKey { to } => {
                sql.push_str(&format!(
                    " REFERENCES \"{}\" (\"id\") DEFERRABLE INITIALLY DEFERRED",
                    table_name(app, to)
                ));
            }
            _ => {}
        }

        sql
    }
}

/// Table backing `model` in `app`, e.g. `library_book`.
pub fn table_name(app: &str, model: &str) -> String {
    format!("{}_{}", app, model.to_ascii_lowercase())
}

use rusqlite::Error as RusqliteError;
use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LibSchemaError {
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error), // Converts io::Error into LibSchemaError automatically

    #[error("Database error: {0}")]
    DatabaseError(#[from] RusqliteError), // Converts rusqlite::Error automatically

    #[error("Migration graph error: {0}")]
    Graph(String),

    #[error("Project state error: {0}")]
    State(String),

    #[error("Migration {app}.{name} depends on {dep_app}.{dep_name}, which is not applied")]
    Dependency {
        app: String,
        name: String,
        dep_app: String,
        dep_name: String,
    },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Error: {0}")]
    Error(String), // Allows custom application errors
}

use log::{error, info, Level};
use logging_timer::timer;
use rusqlite::Connection;
use serde::Serialize;

use crate::database::Database;
use crate::db::editor::SchemaEditor;
use crate::error::LibSchemaError;
use crate::schema::state::ProjectState;
use crate::schema::{all_migrations, Migration};

use super::graph::{MigrationGraph, MigrationKey};

/// What a `plan` or `migrate` call should bring up to date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    All,
    App(String),
    Step { app: String, name: String },
}

impl Target {
    pub fn from_args(app: Option<String>, name: Option<String>) -> Self {
        match (app, name) {
            (Some(app), Some(name)) => Target::Step { app, name },
            (Some(app), None) => Target::App(app),
            _ => Target::All,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MigrationStatus {
    pub app: &'static str,
    pub name: &'static str,
    pub applied: bool,
    pub applied_at: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlannedMigration {
    pub app: &'static str,
    pub name: &'static str,
    pub operations: Vec<String>,
}

/// Applies migrations to a database and reports on their status.
pub struct Migrator<'a> {
    conn: &'a Connection,
    graph: MigrationGraph,
}

impl<'a> Migrator<'a> {
    pub fn new(conn: &'a Connection) -> Result<Self, LibSchemaError> {
        Self::with_graph(conn, MigrationGraph::build(&all_migrations())?)
    }

    pub fn with_graph(conn: &'a Connection, graph: MigrationGraph) -> Result<Self, LibSchemaError> {
        Database::ensure_tracking_table(conn)?;
        Ok(Self { conn, graph })
    }

    #[cfg(test)]
    pub fn graph(&self) -> &MigrationGraph {
        &self.graph
    }

    fn resolve(&self, app: &str, name: &str) -> Result<MigrationKey, LibSchemaError> {
        self.graph
            .key(app, name)
            .ok_or_else(|| LibSchemaError::NotFound(format!("Migration {app}.{name}")))
    }

    fn migration(&self, key: &MigrationKey) -> Result<&'static Migration, LibSchemaError> {
        self.graph
            .migration(key)
            .ok_or_else(|| LibSchemaError::NotFound(format!("Migration {key}")))
    }

    /// Fails if any applied step has an unapplied dependency.
    pub fn check_consistent_history(&self) -> Result<(), LibSchemaError> {
        let applied = Database::applied_migrations(self.conn)?;
        for key in self.graph.full_plan()? {
            if !applied.contains(&owned(&key)) {
                continue;
            }
            for dep in self.graph.dependencies(&key) {
                if !applied.contains(&owned(dep)) {
                    return Err(dependency_error(&key, dep));
                }
            }
        }
        Ok(())
    }

    /// Every step the target needs, in order, whether applied or not.
    fn target_nodes(&self, target: &Target) -> Result<Vec<MigrationKey>, LibSchemaError> {
        match target {
            Target::All => self.graph.full_plan(),
            Target::App(app) => {
                let leaves = self.graph.leaf_nodes(app);
                if leaves.is_empty() {
                    return Err(LibSchemaError::NotFound(format!("App '{app}' has no migrations")));
                }
                let mut nodes: Vec<MigrationKey> = Vec::new();
                for leaf in leaves {
                    for key in self.graph.forwards_plan(leaf)? {
                        if !nodes.contains(&key) {
                            nodes.push(key);
                        }
                    }
                }
                Ok(nodes)
            }
            Target::Step { app, name } => self.graph.forwards_plan(self.resolve(app, name)?),
        }
    }

    /// Pending steps for `target`, in application order.
    pub fn plan(&self, target: &Target) -> Result<Vec<MigrationKey>, LibSchemaError> {
        let applied = Database::applied_migrations(self.conn)?;
        Ok(self
            .target_nodes(target)?
            .into_iter()
            .filter(|key| !applied.contains(&owned(key)))
            .collect())
    }

    pub fn describe_plan(&self, target: &Target) -> Result<Vec<PlannedMigration>, LibSchemaError> {
        self.plan(target)?
            .into_iter()
            .map(|key| {
                let migration = self.migration(&key)?;
                Ok(PlannedMigration {
                    app: key.app,
                    name: key.name,
                    operations: migration.operations.iter().map(|op| op.describe()).collect(),
                })
            })
            .collect()
    }

    /// Applies every pending step for `target`. Returns the steps applied.
    pub fn migrate(&self, target: &Target) -> Result<Vec<MigrationKey>, LibSchemaError> {
        self.check_consistent_history()?;

        let plan = self.plan(target)?;
        if plan.is_empty() {
            info!("No migrations to apply");
            return Ok(plan);
        }

        self.apply_plan(&plan)
    }

    /// Applies `plan` in order. Steps another runner recorded after the plan
    /// was computed are skipped and left out of the returned list.
    pub fn apply_plan(&self, plan: &[MigrationKey]) -> Result<Vec<MigrationKey>, LibSchemaError> {
        let mut applied = Vec::with_capacity(plan.len());
        for key in plan {
            if self.run_step(*key, true)? {
                applied.push(*key);
            } else {
                info!("Skipping {}: already applied by another runner", key);
            }
        }
        Ok(applied)
    }

    /// Applies a single step. Fails if the step is already recorded.
    pub fn apply_step(&self, key: MigrationKey) -> Result<(), LibSchemaError> {
        self.run_step(key, false).map(|_| ())
    }

    /// Runs one step in its own IMMEDIATE transaction and records it.
    /// Foreign key enforcement is off for the duration, and the transaction
    /// only commits if `foreign_key_check` comes back clean. Returns false
    /// when the step was already recorded and `skip_applied` is set.
    fn run_step(&self, key: MigrationKey, skip_applied: bool) -> Result<bool, LibSchemaError> {
        let migration = self.migration(&key)?;
        let _tmr = timer!(Level::Info; "Migrator::apply_step", "{}", key);

        let mut state = self.state_before(key)?;

        let foreign_keys: bool = self
            .conn
            .query_row("PRAGMA foreign_keys", [], |row| row.get(0))?;
        self.conn.execute_batch("PRAGMA foreign_keys = OFF")?;
        let result = Database::immediate_transaction(self.conn, |conn| {
            for dep in self.graph.dependencies(&key) {
                if !Database::is_applied(conn, dep.app, dep.name)? {
                    return Err(dependency_error(&key, dep));
                }
            }
            if Database::is_applied(conn, key.app, key.name)? {
                if skip_applied {
                    return Ok(false);
                }
                return Err(LibSchemaError::Error(format!("Migration {key} is already applied")));
            }
            info!("Applying {}", key);

            let mut editor = SchemaEditor::new(conn);
            for operation in migration.operations {
                let from_state = state.clone();
                operation.state_forwards(key.app, &mut state)?;
                operation.database_forwards(key.app, &mut editor, &from_state, &state)?;
            }

            check_foreign_keys(conn)?;
            Database::record_applied(conn, key.app, key.name)?;
            Ok(true)
        });

        let restore = if foreign_keys {
            "PRAGMA foreign_keys = ON"
        } else {
            "PRAGMA foreign_keys = OFF"
        };
        if let Err(e) = self.conn.execute_batch(restore) {
            error!("Failed to restore foreign key enforcement after {}: {}", key, e);
        }

        result
    }

    /// Project state with every ancestor of `key` applied, `key` excluded.
    pub fn state_before(&self, key: MigrationKey) -> Result<ProjectState, LibSchemaError> {
        let mut state = ProjectState::new();
        for ancestor in self.graph.forwards_plan(key)? {
            if ancestor == key {
                break;
            }
            for operation in self.migration(&ancestor)?.operations {
                operation.state_forwards(ancestor.app, &mut state)?;
            }
        }
        Ok(state)
    }

    /// Project state right after `key` is applied.
    #[cfg(test)]
    pub fn state_after(&self, key: MigrationKey) -> Result<ProjectState, LibSchemaError> {
        let mut state = self.state_before(key)?;
        for operation in self.migration(&key)?.operations {
            operation.state_forwards(key.app, &mut state)?;
        }
        Ok(state)
    }

    /// Project state with every known step applied.
    pub fn latest_state(&self) -> Result<ProjectState, LibSchemaError> {
        let mut state = ProjectState::new();
        for key in self.graph.full_plan()? {
            for operation in self.migration(&key)?.operations {
                operation.state_forwards(key.app, &mut state)?;
            }
        }
        Ok(state)
    }

    /// SQL a step would run, rendered from project state. The database is
    /// not touched.
    pub fn sql_for(&self, app: &str, name: &str) -> Result<Vec<String>, LibSchemaError> {
        let key = self.resolve(app, name)?;
        let migration = self.migration(&key)?;
        let mut state = self.state_before(key)?;

        let mut editor = SchemaEditor::collecting();
        for operation in migration.operations {
            let from_state = state.clone();
            operation.state_forwards(key.app, &mut state)?;
            operation.database_forwards(key.app, &mut editor, &from_state, &state)?;
        }
        Ok(editor.into_sql())
    }

    pub fn status(&self, app: Option<&str>) -> Result<Vec<MigrationStatus>, LibSchemaError> {
        let mut statuses = Vec::new();
        for key in self.graph.full_plan()? {
            if app.is_some_and(|a| a != key.app) {
                continue;
            }
            let applied_at = Database::applied_at(self.conn, key.app, key.name)?;
            statuses.push(MigrationStatus {
                app: key.app,
                name: key.name,
                applied: applied_at.is_some(),
                applied_at,
            });
        }
        if let Some(app) = app {
            if statuses.is_empty() {
                return Err(LibSchemaError::NotFound(format!("App '{app}' has no migrations")));
            }
        }
        Ok(statuses)
    }
}

fn owned(key: &MigrationKey) -> (String, String) {
    (key.app.to_owned(), key.name.to_owned())
}

fn dependency_error(key: &MigrationKey, dep: &MigrationKey) -> LibSchemaError {
    LibSchemaError::Dependency {
        app: key.app.to_owned(),
        name: key.name.to_owned(),
        dep_app: dep.app.to_owned(),
        dep_name: dep.name.to_owned(),
    }
}

fn check_foreign_keys(conn: &Connection) -> Result<(), LibSchemaError> {
    let mut stmt = conn.prepare("PRAGMA foreign_key_check")?;
    let mut rows = stmt.query([])?;
    if let Some(row) = rows.next()? {
        let table: String = row.get(0)?;
        return Err(LibSchemaError::Error(format!(
            "Foreign key violation in table '{table}'"
        )));
    }
    Ok(())
}

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use directories::ProjectDirs;
use log::info;

use crate::config::CONFIG;
use crate::database::Database;
use crate::db::migration::{Migrator, Target};
use crate::error::LibSchemaError;
use crate::schema::state::ModelState;

#[derive(Parser)]
#[command(
    name = "libschema",
    version,
    about = "Schema migrations for the library database"
)]
pub struct Cli {
    /// Database file (default: configured path, or library.db in the data directory)
    #[arg(long = "db", global = true)]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Apply pending migrations (all apps, one app, or up to one migration)
    Migrate {
        app: Option<String>,
        #[arg(requires = "app")]
        name: Option<String>,
    },

    /// List known migrations and whether each is applied
    #[command(name = "showmigrations")]
    ShowMigrations {
        app: Option<String>,

        /// Print JSON instead of a listing
        #[arg(long = "json", default_value_t = false)]
        json: bool,
    },

    /// Show the migrations `migrate` would apply, without applying them
    Plan {
        app: Option<String>,
        #[arg(requires = "app")]
        name: Option<String>,

        /// Print JSON instead of a listing
        #[arg(long = "json", default_value_t = false)]
        json: bool,
    },

    /// Print the SQL a migration runs
    #[command(name = "sqlmigrate")]
    SqlMigrate { app: String, name: String },

    /// Print a model's fields as of the latest migration
    Inspect { app: String, model: String },
}

impl Cli {
    pub fn handle_command_line(project_dirs: &ProjectDirs) -> Result<(), LibSchemaError> {
        let args = Cli::parse();
        args.run(project_dirs)
    }

    fn run(self, project_dirs: &ProjectDirs) -> Result<(), LibSchemaError> {
        let config = CONFIG
            .get()
            .ok_or_else(|| LibSchemaError::Error("Configuration not loaded".to_owned()))?;
        let db_path = config.db_path(project_dirs, self.db);
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let db = Database::open(&db_path)?;
        let migrator = Migrator::new(db.conn())?;

        match self.command {
            Command::Migrate { app, name } => Self::migrate(&migrator, Target::from_args(app, name)),
            Command::ShowMigrations { app, json } => {
                Self::show_migrations(&migrator, app.as_deref(), json)
            }
            Command::Plan { app, name, json } => {
                Self::plan(&migrator, Target::from_args(app, name), json)
            }
            Command::SqlMigrate { app, name } => {
                for statement in migrator.sql_for(&app, &name)? {
                    println!("{}", sql_line(&statement));
                }
                Ok(())
            }
            Command::Inspect { app, model } => {
                let state = migrator.latest_state()?;
                print!("{}", format_model(state.require_model(&app, &model)?));
                Ok(())
            }
        }
    }

    fn migrate(migrator: &Migrator, target: Target) -> Result<(), LibSchemaError> {
        let applied = migrator.migrate(&target)?;
        if applied.is_empty() {
            println!("No migrations to apply.");
        }
        for key in &applied {
            println!("  Applied {key}");
        }
        info!("Migrate finished: {} applied", applied.len());
        Ok(())
    }

    fn show_migrations(migrator: &Migrator, app: Option<&str>, json: bool) -> Result<(), LibSchemaError> {
        let statuses = migrator.status(app)?;
        if json {
            println!("{}", to_json(&statuses)?);
            return Ok(());
        }

        let mut current_app = "";
        for status in &statuses {
            if status.app != current_app {
                println!("{}", status.app);
                current_app = status.app;
            }
            let mark = if status.applied { "X" } else { " " };
            println!(" [{mark}] {}", status.name);
        }
        Ok(())
    }

    fn plan(migrator: &Migrator, target: Target, json: bool) -> Result<(), LibSchemaError> {
        let plan = migrator.describe_plan(&target)?;
        if json {
            println!("{}", to_json(&plan)?);
            return Ok(());
        }

        if plan.is_empty() {
            println!("No planned migration operations.");
        }
        for step in &plan {
            println!("{}.{}", step.app, step.name);
            for operation in &step.operations {
                println!("    {operation}");
            }
        }
        Ok(())
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, LibSchemaError> {
    serde_json::to_string_pretty(value)
        .map_err(|e| LibSchemaError::Error(format!("Failed to serialize output: {e}")))
}

/// One statement per line, terminated by exactly one `;`.
fn sql_line(statement: &str) -> String {
    format!("{};", statement.trim_end().trim_end_matches(';').trim_end())
}

fn format_model(model: &ModelState) -> String {
    let mut out = format!("{}.{} ({})\n", model.app, model.name, model.table());
    for (name, field) in &model.fields {
        out.push_str(&format!("  {name}: {}", field.kind));
        if field.null {
            out.push_str(", null");
        }
        if let Some(default) = &field.default {
            out.push_str(&format!(", default={}", default.sql_literal()));
        }
        out.push('\n');
        if let Some(verbose_name) = field.verbose_name {
            out.push_str(&format!("      verbose name: {verbose_name}\n"));
        }
        if let Some(help_text) = field.help_text {
            out.push_str(&format!("      help text: {help_text}\n"));
        }
    }
    out
}

use std::fs;
use std::path::PathBuf;

use directories::ProjectDirs;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

pub static CONFIG: OnceCell<Config> = OnceCell::new();

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct LoggingConfig {
    pub libschema: String,
}

impl LoggingConfig {
    const LOG_LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];
    const LIBSCHEMA_LEVEL: &str = "info";

    fn default() -> Self {
        LoggingConfig {
            libschema: Self::LIBSCHEMA_LEVEL.to_string(),
        }
    }

    fn ensure_valid(&mut self) {
        let str_original = self.libschema.clone();
        self.libschema = self.libschema.trim().to_ascii_lowercase();
        if !Self::LOG_LEVELS.contains(&self.libschema.as_str()) {
            eprintln!(
                "Config error: libschema log level of '{}' is invalid - using default of '{}'",
                str_original,
                Self::LIBSCHEMA_LEVEL
            );
            self.libschema = Self::LIBSCHEMA_LEVEL.to_owned();
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct DatabaseConfig {
    /// Database file. Defaults to `library.db` in the data directory.
    pub path: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Config {
    pub logging: LoggingConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
}

impl Config {
    const DB_FILENAME: &str = "library.db";

    fn default_config() -> Self {
        Config {
            logging: LoggingConfig::default(),
            database: DatabaseConfig::default(),
        }
    }

    /// Loads the configuration from a TOML file located in the app's data directory.
    /// If the file is missing or fails to parse, defaults are used.
    /// Additionally, writes the default config to disk if no file exists.
    pub fn load_config(project_dirs: &ProjectDirs) -> Self {
        let config_path = project_dirs.data_local_dir().join("config.toml");
        let default_config = Self::default_config();

        if !config_path.exists() {
            if let Some(parent) = config_path.parent() {
                if let Err(e) = fs::create_dir_all(parent) {
                    eprintln!(
                        "Failed to create configuration directory {}: {}",
                        parent.display(),
                        e
                    );
                }
            }
            match toml::to_string_pretty(&default_config) {
                Ok(toml_string) => {
                    if let Err(e) = fs::write(&config_path, toml_string) {
                        eprintln!(
                            "Failed to write default config to {}: {}",
                            config_path.display(),
                            e
                        );
                    }
                }
                Err(_) => eprintln!("Failed to serialize default config."),
            }
        }

        Self::from_figment(
            Figment::from(Serialized::defaults(default_config.clone()))
                .merge(Toml::file(&config_path))
                .merge(Env::prefixed("LIBSCHEMA_").split("__")),
        )
        .unwrap_or_else(|err| {
            eprintln!(
                "Could not load config file {}: {}. Using default configuration.",
                config_path.display(),
                err
            );
            default_config
        })
    }

    fn from_figment(figment: Figment) -> Result<Self, figment::Error> {
        let mut config: Config = figment.extract()?;
        config.ensure_valid();
        Ok(config)
    }

    fn ensure_valid(&mut self) {
        self.logging.ensure_valid();
    }

    /// Resolves the database file: an explicit override wins, then the
    /// configured path, then `library.db` in the data directory.
    pub fn db_path(&self, project_dirs: &ProjectDirs, cli_override: Option<PathBuf>) -> PathBuf {
        cli_override
            .or_else(|| self.database.path.as_ref().map(PathBuf::from))
            .unwrap_or_else(|| project_dirs.data_local_dir().join(Self::DB_FILENAME))
    }

    pub fn get_log_level() -> String {
        CONFIG
            .get()
            .map(|c| c.logging.libschema.clone())
            .unwrap_or_else(|| LoggingConfig::LIBSCHEMA_LEVEL.to_owned())
    }
}

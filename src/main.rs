mod cli;
mod config;
mod database;
mod db;
mod error;
mod schema;

use cli::Cli;
use config::{Config, CONFIG};
use directories::ProjectDirs;
use flexi_logger::{detailed_format, Logger};
use log::{debug, error};

fn main() {
    let Some(project_dirs) = ProjectDirs::from("", "", "libschema") else {
        eprintln!("Could not determine project directories");
        std::process::exit(1);
    };

    let config = Config::load_config(&project_dirs);
    if CONFIG.set(config).is_err() {
        eprintln!("Configuration was already initialized");
    }

    // RUST_LOG overrides the configured level
    let _logger = match Logger::try_with_env_or_str(Config::get_log_level())
        .and_then(|logger| logger.format(detailed_format).start())
    {
        Ok(handle) => Some(handle),
        Err(e) => {
            eprintln!("Failed to start logger: {e}");
            None
        }
    };

    debug!("Command-line args: {:?}", std::env::args_os().collect::<Vec<_>>());

    if let Err(err) = Cli::handle_command_line(&project_dirs) {
        error!("{:?}", err);
        eprintln!("{}", err);
        std::process::exit(1);
    }
}

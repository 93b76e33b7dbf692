pub mod session;
pub mod utils;

use anyhow::{Context, Result};
use std::path::Path;

use crate::cli::{Args, Commands, LoginMode};
use family_growth::config::{get_config_path, AppConfig};

/// Dispatch a parsed command line
pub fn run(args: Args) -> Result<()> {
    let config_path = match args.config {
        Some(path) => path,
        None => get_config_path()?,
    };

    match args.command {
        Commands::Setup {
            url,
            anon_key,
            state_file,
            force,
        } => {
            utils::init_logging(args.verbose, "info");
            session::setup(&config_path, url, anon_key, state_file, force)
        }
        command => {
            let config = load_config(&config_path)?;
            utils::init_logging(args.verbose, &config.logging.level);
            run_session_command(command, &config)
        }
    }
}

fn run_session_command(command: Commands, config: &AppConfig) -> Result<()> {
    match command {
        Commands::Setup { .. } => anyhow::bail!("setup does not run against an existing configuration"),
        Commands::Login { mode } => match mode {
            LoginMode::Parent { email, password } => session::login_parent(config, &email, &password),
            LoginMode::Kid {
                family_code,
                child_id,
                pin,
            } => session::login_kid(config, &family_code, &child_id, &pin),
        },
        Commands::Logout => session::logout(config),
        Commands::Status { json } => session::status(config, json),
        Commands::Check { route } => session::check(config, &route),
        Commands::Menu => session::menu(config),
        Commands::SelectChild { child_id } => session::select_child(config, child_id.as_deref()),
        Commands::SwitchFamily { family_id } => session::switch_family(config, &family_id),
    }
}

fn load_config(path: &Path) -> Result<AppConfig> {
    AppConfig::load(path).with_context(|| {
        format!(
            "Failed to load configuration from {}. Run 'family-growth setup' first.",
            path.display()
        )
    })
}

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Family Growth session manager
///
/// Signs parents and kids in and out of the Family Growth System and checks
/// which routes the current session may open.
#[derive(Parser, Debug)]
#[command(name = "family-growth")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file (platform default if omitted)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write a configuration file for a Supabase project
    Setup {
        /// Project URL, e.g. https://<ref>.supabase.co
        #[arg(long)]
        url: String,

        /// Public anon key
        #[arg(long)]
        anon_key: String,

        /// Where to keep the session file
        #[arg(long)]
        state_file: Option<PathBuf>,

        /// Overwrite an existing configuration
        #[arg(long)]
        force: bool,
    },
    /// Sign in as a parent or a kid
    Login {
        #[command(subcommand)]
        mode: LoginMode,
    },
    /// End the current session (keeps the family)
    Logout,
    /// Show the current session
    Status {
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Check whether the current session may open a route
    Check {
        /// Route path, e.g. /settings or /kid/quests
        route: String,
    },
    /// Show the navigation menu for the current role
    Menu,
    /// Select which child parent views focus on
    SelectChild {
        /// Child id; omit to clear the selection
        child_id: Option<String>,
    },
    /// Move this device to another family
    SwitchFamily {
        family_id: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum LoginMode {
    /// Parent account (email + password)
    Parent {
        #[arg(long)]
        email: String,

        /// Password (prefer the environment variable)
        #[arg(long, env = "FAMILY_GROWTH_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Kid mode (family code + PIN)
    Kid {
        #[arg(long)]
        family_code: String,

        #[arg(long)]
        child_id: String,

        #[arg(long, env = "FAMILY_GROWTH_PIN", hide_env_values = true)]
        pin: String,
    },
}

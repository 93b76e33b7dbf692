use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use family_growth::config::AppConfig;
use family_growth::guard::{GuardDecision, Navigator, Redirect, RouteGuard};
use family_growth::session::{Role, SelectedChildCache, SessionManager};
use family_growth::store::{FileStorage, SessionKey, SessionStore};
use family_growth::SupabaseAuth;

use super::utils::{format_duration, mask_token};

/// Navigator for the terminal: a redirect is just reported
struct PrintNavigator;

impl Navigator for PrintNavigator {
    fn navigate(&self, to: Redirect) {
        println!("→ Redirect to {}", to);
    }
}

/// Everything a session command needs, wired from the configuration
struct App {
    manager: Arc<SessionManager<SupabaseAuth>>,
    guard: RouteGuard<SupabaseAuth>,
    runtime: tokio::runtime::Runtime,
}

impl App {
    fn open(config: &AppConfig) -> Result<Self> {
        let state_path = config.session.state_path()?;
        tracing::debug!("Session file: {}", state_path.display());

        let store = Arc::new(SessionStore::open(FileStorage::new(state_path)));
        let backend = Arc::new(SupabaseAuth::new(&config.backend)?);

        // A parent token from an earlier run is re-verified before it is trusted
        if let Some(parent) = store.snapshot().parent() {
            backend.restore_session(&parent.auth_token, &parent.user_id);
        }

        let navigator: Arc<dyn Navigator> = Arc::new(PrintNavigator);
        let manager = Arc::new(SessionManager::new(store, backend, navigator.clone()));
        let guard = RouteGuard::new(
            manager.clone(),
            navigator,
            config.session.auth_check_timeout(),
        );

        let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;

        Ok(Self {
            manager,
            guard,
            runtime,
        })
    }

    fn store(&self) -> &Arc<SessionStore> {
        self.manager.store()
    }
}

/// Write a new configuration file
pub fn setup(
    config_path: &Path,
    url: String,
    anon_key: String,
    state_file: Option<PathBuf>,
    force: bool,
) -> Result<()> {
    if config_path.exists() && !force {
        anyhow::bail!(
            "Configuration file already exists: {}\nUse --force to overwrite",
            config_path.display()
        );
    }

    let mut config = AppConfig::new(url, anon_key);
    config.session.state_file = state_file;
    config.validate().context("Invalid configuration")?;
    config.save(config_path)?;

    println!("✓ Configuration saved to: {}", config_path.display());
    println!("  Session file: {}", config.session.state_path()?.display());
    println!();
    println!("Next steps:");
    println!("  family-growth login parent --email <email>");
    println!("  family-growth login kid --family-code <code> --child-id <id>");

    Ok(())
}

pub fn login_parent(config: &AppConfig, email: &str, password: &str) -> Result<()> {
    let app = App::open(config)?;

    let session = app
        .runtime
        .block_on(app.manager.login_parent(email, password))
        .context("Parent login failed")?;

    println!(
        "✓ Signed in as {} (parent)",
        session.display_name.as_deref().unwrap_or(email)
    );
    if let Some(family_id) = app.store().get(SessionKey::FamilyId) {
        println!("  Family: {}", family_id);
    }

    Ok(())
}

pub fn login_kid(config: &AppConfig, family_code: &str, child_id: &str, pin: &str) -> Result<()> {
    let app = App::open(config)?;

    let login = app
        .runtime
        .block_on(app.manager.login_kid(family_code, child_id, pin))
        .context("Kid login failed")?;

    println!("✓ Kid mode for {}", login.child.name);
    println!("  Family: {}", login.child.family_id);

    Ok(())
}

pub fn logout(config: &AppConfig) -> Result<()> {
    let app = App::open(config)?;

    let role = app.store().role();
    app.runtime.block_on(app.manager.end_session());

    if role == Role::None {
        println!("No active session");
    } else {
        println!("✓ Signed out ({} mode ended)", role);
    }
    if let Some(family_id) = app.store().get(SessionKey::FamilyId) {
        println!("  Family {} remembered for next login", family_id);
    }

    Ok(())
}

#[derive(Debug, Serialize)]
struct StatusReport {
    role: Role,
    actor_id: Option<String>,
    display_name: Option<String>,
    family_id: Option<String>,
    session_id: Option<String>,
    selected_child: Option<String>,
    pin_verified_at: Option<String>,
}

pub fn status(config: &AppConfig, json: bool) -> Result<()> {
    let app = App::open(config)?;
    let state = app.store().snapshot();
    let selection = SelectedChildCache::attach(app.store().clone());

    let display_name = match (state.parent(), state.child()) {
        (Some(parent), _) => parent.display_name.clone(),
        (_, Some(child)) => child.child_name.clone(),
        _ => None,
    };

    let report = StatusReport {
        role: state.role(),
        actor_id: state.actor_id().map(String::from),
        display_name,
        family_id: state.family_id.clone(),
        session_id: state.session_id.clone(),
        selected_child: selection.selected(),
        pin_verified_at: state
            .child()
            .and_then(|_| app.store().get(SessionKey::KidPinSession)),
    };

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to serialize status")?
        );
        return Ok(());
    }

    println!("Family Growth Session");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("Role:        {}", report.role);

    if let Some(actor_id) = &report.actor_id {
        println!(
            "Actor:       {} ({})",
            report.display_name.as_deref().unwrap_or("unnamed"),
            actor_id
        );
    }
    println!(
        "Family:      {}",
        report.family_id.as_deref().unwrap_or("not set")
    );
    if let Some(session_id) = &report.session_id {
        println!("Session:     {}", session_id);
    }

    if let Some(parent) = state.parent() {
        println!("Auth token:  {}", mask_token(&parent.auth_token));
        if let Some(selected) = &report.selected_child {
            println!("Selected:    {}", selected);
        }
    }

    if let Some(child) = state.child() {
        if let Some(token) = &child.kid_access_token {
            println!("Kid token:   {}", mask_token(token));
        }
        if let Some(verified) = report
            .pin_verified_at
            .as_deref()
            .and_then(|at| DateTime::parse_from_rfc3339(at).ok())
        {
            let ago = Utc::now() - verified.with_timezone(&Utc);
            println!("PIN checked: {} ago", format_duration(ago));
        }
    }

    Ok(())
}

pub fn check(config: &AppConfig, route: &str) -> Result<()> {
    let app = App::open(config)?;

    match app.runtime.block_on(app.guard.navigate(route)) {
        GuardDecision::Allowed(context) => {
            println!("✓ {} allowed for {}", route, context.role);
        }
        GuardDecision::RedirectParentLogin => {
            println!("✗ {} requires a parent session", route);
        }
        GuardDecision::RedirectKidLogin => {
            println!("✗ {} requires kid mode", route);
        }
    }

    Ok(())
}

pub fn menu(config: &AppConfig) -> Result<()> {
    let app = App::open(config)?;

    let context = app.runtime.block_on(app.guard.context());
    let role = context.role;

    println!("Menu ({})", role);
    for entry in context.menu() {
        println!("  {:<12} {}", entry.label, entry.path);
    }

    Ok(())
}

pub fn select_child(config: &AppConfig, child_id: Option<&str>) -> Result<()> {
    let app = App::open(config)?;

    if app.store().role() != Role::Parent {
        anyhow::bail!("Only a parent session can select a child");
    }

    let selection = SelectedChildCache::attach(app.store().clone());
    match child_id {
        Some(child_id) => {
            selection.select(child_id);
            println!("✓ Selected child {}", child_id);
        }
        None => {
            selection.deselect();
            println!("✓ Selection cleared");
        }
    }

    Ok(())
}

pub fn switch_family(config: &AppConfig, family_id: &str) -> Result<()> {
    let app = App::open(config)?;

    app.manager.switch_family(family_id);
    println!("✓ Family set to {}", family_id);

    Ok(())
}

//! Session commands: login, callback completion, identity, logout.
//!
//! The server session is a cookie. The browser keeps it automatically;
//! a CLI process does not, so the cookie header for the API origin is
//! persisted under the taskdeck state directory and restored into the
//! transport's jar on startup.

use std::path::PathBuf;

use anyhow::{Context, Result};
use console::style;
use taskdeck::session::CallbackParams;
use taskdeck::transport::HttpTransport;
use taskdeck::{Engine, EngineConfig};

fn session_cookie_path() -> Option<PathBuf> {
    EngineConfig::state_dir().map(|dir| dir.join("session"))
}

/// Seed the transport with a previously persisted session cookie.
pub fn restore_session(transport: &HttpTransport) {
    let Some(path) = session_cookie_path() else {
        return;
    };
    if let Ok(cookie) = std::fs::read_to_string(&path) {
        let cookie = cookie.trim();
        if !cookie.is_empty() {
            transport.restore_session_cookie(cookie);
        }
    }
}

fn persist_session(transport: &HttpTransport) -> Result<()> {
    let Some(path) = session_cookie_path() else {
        return Ok(());
    };
    let Some(cookie) = transport.session_cookie() else {
        return Ok(());
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).context("Failed to create state directory")?;
    }
    std::fs::write(&path, cookie).context("Failed to persist session cookie")?;
    Ok(())
}

fn discard_session() {
    if let Some(path) = session_cookie_path() {
        let _ = std::fs::remove_file(path);
    }
}

pub fn cmd_login(engine: &Engine) -> Result<()> {
    let url = engine.session().login_url();
    println!("Opening {url}");
    if let Err(e) = open::that(&url) {
        println!(
            "{} could not open a browser ({e}); visit the URL manually",
            style("!").yellow()
        );
    }
    println!();
    println!("After authorizing, the provider redirects with a ?code= parameter.");
    println!("Finish with: taskdeck callback <code>");
    Ok(())
}

pub async fn cmd_callback(
    engine: &Engine,
    transport: &HttpTransport,
    code: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
) -> Result<()> {
    let session = engine
        .session()
        .handle_callback(CallbackParams {
            code,
            error,
            error_description,
        })
        .await
        .context("Authorization failed")?;

    persist_session(transport)?;
    match session.user {
        Some(user) => println!(
            "{} Signed in as {}",
            style("✓").green(),
            style(user.login).bold()
        ),
        None => println!("{} Session established", style("✓").green()),
    }
    Ok(())
}

pub async fn cmd_whoami(engine: &Engine) -> Result<()> {
    let user = engine
        .current_user()
        .await
        .context("Not authenticated; run 'taskdeck login' first")?;
    println!("{} ({})", style(&user.login).bold(), user.id);
    if let Some(name) = &user.name {
        println!("  {name}");
    }
    Ok(())
}

pub async fn cmd_logout(engine: &Engine) -> Result<()> {
    let result = engine.session().logout().await;
    discard_session();
    match result {
        Ok(()) => println!("{} Signed out", style("✓").green()),
        // Local state is already reset; the remote failure is informational.
        Err(e) => println!(
            "{} Signed out locally; server logout failed: {e}",
            style("!").yellow()
        ),
    }
    Ok(())
}

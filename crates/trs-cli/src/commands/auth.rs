// Login, logout and session inspection commands

use std::io::{self, Write};

use anyhow::Result;
use serde::Serialize;
use tracing::warn;

use trs_core::{Config, ErrorInfo, ErrorKind, SessionState, SessionStore};

use crate::output::{error_lines, print_field, print_profile, report, OutputFormat};

/// Environment variable consulted before prompting for a password
pub const PASSWORD_ENV: &str = "TRS_PASSWORD";

pub async fn login(
    store: &SessionStore,
    config: &mut Config,
    username: Option<String>,
    quiet: bool,
) -> Result<()> {
    let username = match username.or_else(|| config.last_username.clone()) {
        Some(name) => name,
        None => prompt_username()?,
    };
    let password = match std::env::var(PASSWORD_ENV) {
        Ok(password) => password,
        Err(_) => rpassword::prompt_password("Password: ")?,
    };

    match store.login(&username, &password).await {
        Ok(user) => {
            config.last_username = Some(username);
            if let Err(e) = config.save() {
                warn!(error = %e, "Failed to save config");
            }
            if !quiet {
                println!("Logged In Successfully!");
                print_field("Welcome", &user.display_name());
            }
            Ok(())
        }
        Err(e) => {
            let info = store.last_error().unwrap_or_else(|| ErrorInfo::from_error(&e));
            Err(report(e, login_failure_lines(&info)))
        }
    }
}

/// What a failed login shows. Transport and other failures are left to `main`.
fn login_failure_lines(info: &ErrorInfo) -> Vec<String> {
    match info.kind {
        ErrorKind::Validation => error_lines(info),
        ErrorKind::Authentication => vec!["Invalid Credentials".to_string()],
        _ => Vec::new(),
    }
}

pub fn logout(store: &SessionStore, quiet: bool) {
    let was_authenticated = store.is_authenticated();
    store.logout();
    if !quiet {
        if was_authenticated {
            println!("Logged out.");
        } else {
            println!("Not logged in.");
        }
    }
}

#[derive(Serialize)]
struct StatusView {
    state: SessionState,
    username: Option<String>,
    authenticated_at: Option<String>,
    api_url: String,
}

pub fn status(store: &SessionStore, output: OutputFormat) -> Result<()> {
    let session = store.snapshot();
    let view = StatusView {
        state: session.state(),
        username: session.user().map(|u| u.username.clone()),
        authenticated_at: session.authenticated_at().map(|t| t.to_rfc3339()),
        api_url: store.client().base_url().to_string(),
    };

    if !output.is_text() {
        return output.print_value(&view);
    }

    print_field("Status", &view.state.to_string());
    if let Some(ref username) = view.username {
        print_field("User", username);
    }
    if let Some(ref at) = view.authenticated_at {
        print_field("Since", at);
    }
    print_field("Server", &view.api_url);
    Ok(())
}

pub fn whoami(store: &SessionStore, output: OutputFormat) -> Result<()> {
    if !store.is_authenticated() {
        anyhow::bail!("Not logged in. Run `trs login` first.");
    }
    let Some(user) = store.user() else {
        anyhow::bail!("Logged in, but no profile is stored. Run `trs login` to refresh it.");
    };

    if output.is_text() {
        print_profile(&user);
        Ok(())
    } else {
        output.print_value(&user)
    }
}

fn prompt_username() -> Result<String> {
    print!("Username: ");
    io::stdout().flush()?;

    let mut username = String::new();
    io::stdin().read_line(&mut username)?;
    Ok(username.trim().to_string())
}

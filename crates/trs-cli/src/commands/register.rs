// Account registration and lookup commands

use anyhow::Result;
use clap::Args;

use trs_core::{Department, ErrorInfo, ErrorKind, RegistrationRequest, SessionStore};

use crate::output::{error_lines, print_field, report, OutputFormat};

use super::auth::PASSWORD_ENV;

#[derive(Args)]
pub struct RegisterArgs {
    /// Student ID
    #[arg(long, short)]
    pub username: String,

    #[arg(long)]
    pub email: String,

    #[arg(long)]
    pub first_name: String,

    #[arg(long)]
    pub last_name: String,

    #[arg(long)]
    pub phone_number: String,

    /// Department code (CSE, EEE, ETE, PHM)
    #[arg(long, default_value = "CSE")]
    pub department: Department,
}

pub async fn register(store: &SessionStore, args: RegisterArgs, quiet: bool) -> Result<()> {
    let password = match std::env::var(PASSWORD_ENV) {
        Ok(password) => password,
        Err(_) => {
            let password = rpassword::prompt_password("Password: ")?;
            let confirm = rpassword::prompt_password("Confirm password: ")?;
            if password != confirm {
                anyhow::bail!("Passwords do not match");
            }
            password
        }
    };

    let request = RegistrationRequest {
        email: args.email,
        first_name: args.first_name,
        last_name: args.last_name,
        phone_number: args.phone_number,
        department: args.department,
        ..RegistrationRequest::new(args.username, password)
    };

    match store.register(&request).await {
        Ok(user) => {
            if !quiet {
                println!("Registered Successfully!");
                print_field("Username", &user.username);
                println!("Run `trs login --username {}` to sign in.", user.username);
            }
            Ok(())
        }
        Err(e) => {
            let lines = register_failure_lines(&ErrorInfo::from_error(&e));
            Err(report(e, lines))
        }
    }
}

/// Validation failures are shown per field; anything else is left to `main`.
fn register_failure_lines(info: &ErrorInfo) -> Vec<String> {
    match info.kind {
        ErrorKind::Validation => error_lines(info),
        _ => Vec::new(),
    }
}

pub async fn roles(store: &SessionStore, output: OutputFormat) -> Result<()> {
    let roles = store.client().fetch_roles().await?;
    if output.is_text() {
        for role in &roles {
            println!("{:>3}  {}", u16::from(role.id), role.id);
        }
        Ok(())
    } else {
        output.print_value(&roles)
    }
}

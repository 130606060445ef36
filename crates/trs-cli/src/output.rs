// Output formatting for CLI

use clap::ValueEnum;
use serde::Serialize;
use thiserror::Error;

use trs_core::{ErrorInfo, FieldErrors, UserProfile};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    pub fn print_value<T: Serialize>(&self, value: &T) -> anyhow::Result<()> {
        if let Some(rendered) = self.render(value)? {
            println!("{}", rendered);
        }
        Ok(())
    }

    /// JSON rendering of `value`; `None` for text output
    fn render<T: Serialize>(&self, value: &T) -> anyhow::Result<Option<String>> {
        match self {
            OutputFormat::Json => Ok(Some(serde_json::to_string_pretty(value)?)),
            OutputFormat::Text => Ok(None),
        }
    }

    pub fn is_text(&self) -> bool {
        matches!(self, OutputFormat::Text)
    }
}

/// Marks a failure the command has already shown; `main` only sets the exit code.
#[derive(Debug, Error)]
#[error("failure already reported")]
pub struct Reported;

/// Print a simple key-value pair for text output
pub fn print_field(label: &str, value: &str) {
    println!("{:<14} {}", format!("{}:", label), value);
}

pub fn print_profile(user: &UserProfile) {
    print_field("Username", &user.username);
    print_field("Name", &user.display_name());
    print_field("Email", &user.email);
    print_field("Phone", &user.phone_number);
    print_field(
        "Department",
        user.department.as_ref().map(|d| d.code()).unwrap_or("-"),
    );
    print_field("Roles", &user.role_names().join(", "));
    if let Some(ref picture) = user.profile_picture {
        print_field("Picture", picture);
    }
    if let Some(ref cv) = user.cv_document {
        print_field("CV", cv);
    }
}

/// A failed request laid out the way a form shows it: one line per field
/// message, form-level messages unlabelled.
pub fn error_lines(error: &ErrorInfo) -> Vec<String> {
    if error.fields.is_empty() {
        return vec![error.message.clone()];
    }
    let mut lines = Vec::new();
    for (field, messages) in error.fields.iter() {
        for message in messages {
            if FieldErrors::is_general(field) {
                lines.push(message.clone());
            } else {
                lines.push(format!("{:<14} {}", format!("{}:", field), message));
            }
        }
    }
    lines
}

/// Show `lines` on stderr and mark `err` as reported. With nothing to show
/// `err` comes back untouched for `main` to print.
pub fn report(err: anyhow::Error, lines: Vec<String>) -> anyhow::Error {
    if lines.is_empty() {
        return err;
    }
    for line in &lines {
        eprintln!("{}", line);
    }
    err.context(Reported)
}

//! Interactive prompts for secrets and one-time codes.

use console::{Term, style};

use crate::error::CliError;

/// Read a line without echo, e.g. a password or access token.
pub fn secret(label: &str) -> Result<String, CliError> {
    let term = attended_term(label)?;
    term.write_str(&format!("{}: ", style(label).bold()))?;
    let value = term.read_secure_line()?;
    Ok(value.trim().to_string())
}

/// Read a visible line, e.g. a Steam Guard code.
pub fn line(label: &str) -> Result<String, CliError> {
    let term = attended_term(label)?;
    term.write_str(&format!("{}: ", style(label).bold()))?;
    let value = term.read_line()?;
    Ok(value.trim().to_string())
}

fn attended_term(label: &str) -> Result<Term, CliError> {
    let term = Term::stderr();
    if term.features().is_attended() {
        Ok(term)
    } else {
        Err(CliError::Arguments(format!(
            "{label} is required but there is no terminal to ask on"
        )))
    }
}

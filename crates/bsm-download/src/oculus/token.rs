//! Plausibility check of Oculus user access tokens.
//!
//! Users paste these by hand, so common mistakes are caught early: an app
//! token (`OC` + 15 digits) instead of a user token, or a URL-encoded copy.
//! The check only warns; the CDN has the final say.

use std::fmt;

/// Why a token looks wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenIssue {
    Empty,
    /// Contains `%`, i.e. was copied URL-encoded.
    UrlEncoded,
    /// User tokens start with `OC`.
    WrongPrefix,
    /// `|` separates an app id from an app secret.
    ContainsSeparator,
    /// `OC` followed by 15 digits is an app id, not a user token.
    LooksLikeAppId,
}

impl fmt::Display for TokenIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Empty => "token is empty",
            Self::UrlEncoded => "token is URL-encoded",
            Self::WrongPrefix => "token does not start with OC",
            Self::ContainsSeparator => "token contains '|'",
            Self::LooksLikeAppId => "token looks like an app id",
        };
        f.write_str(text)
    }
}

/// Check `token` for the usual copy-paste mistakes.
pub fn is_token_plausible(token: &str) -> Result<(), TokenIssue> {
    if token.is_empty() {
        return Err(TokenIssue::Empty);
    }
    if token.contains('%') {
        return Err(TokenIssue::UrlEncoded);
    }
    if !token.starts_with("OC") {
        return Err(TokenIssue::WrongPrefix);
    }
    if token.contains('|') {
        return Err(TokenIssue::ContainsSeparator);
    }
    if contains_app_id(token) {
        return Err(TokenIssue::LooksLikeAppId);
    }
    Ok(())
}

/// `OC` followed by 15 ASCII digits anywhere in `token`.
fn contains_app_id(token: &str) -> bool {
    token.match_indices("OC").any(|(at, _)| {
        let digits = &token.as_bytes()[at + 2..];
        digits.len() >= 15 && digits[..15].iter().all(u8::is_ascii_digit)
    })
}

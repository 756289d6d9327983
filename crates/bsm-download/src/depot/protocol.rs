//! Line protocol of the external `DepotDownloader` tool.
//!
//! The downloader interleaves ordinary log chatter with machine-readable lines:
//!
//! ```text
//! [Info]|[Progress]|42,5
//! [Error]|[InvalidCredentials]|Invalid password
//! [Warning]|Manifest checksum mismatch
//! ```
//!
//! A line is `[Category]|[SubType]|payload` or, without a subtype,
//! `[Category]|payload`. The payload runs up to the next `[` or the end of the
//! line. Anything that does not resolve against the closed token tables in
//! [`bsm_core::depot`] is dropped.

use bsm_core::depot::{DepotEvent, DepotEventKind};

// ============================================================================
// Parsing
// ============================================================================

/// Parse one line of downloader output.
///
/// Returns `None` for unrecognized lines; those are log chatter, not errors.
/// The function is pure, no state carries over between lines.
pub fn parse_line(raw: &str) -> Option<DepotEvent> {
    let line = raw.trim_end_matches(['\r', '\n']);

    let (category, rest) = bracketed_token(line)?;
    let (subtype, rest) = match rest.strip_prefix('[') {
        Some(_) => match bracketed_token(rest).or_else(|| trailing_token(rest)) {
            Some((sub, after)) => (Some(sub), after),
            None => (None, rest),
        },
        None => (None, rest),
    };

    let payload_end = rest.find('[').unwrap_or(rest.len());
    let data = clean(&rest[..payload_end]);

    let kind = DepotEventKind::resolve(&clean(category), subtype.map(clean).as_deref())?;
    Some(DepotEvent::new(kind, (!data.is_empty()).then_some(data)))
}

/// Parse a percentage payload such as `42,5` or `99.1%`.
///
/// The downloader formats numbers with the host locale, so `,` is accepted as
/// the decimal separator.
pub fn parse_percent(payload: &str) -> Option<f64> {
    let normalized = payload.trim().trim_end_matches('%').trim().replace(',', ".");
    normalized.parse::<f64>().ok().filter(|p| p.is_finite())
}

/// Find the first `[token]|` in `input`, returning the token and what follows
/// the `|`.
fn bracketed_token(input: &str) -> Option<(&str, &str)> {
    let open = input.find('[')?;
    let body = &input[open + 1..];
    let close = body.find("]|")?;
    Some((&body[..close], &body[close + 2..]))
}

/// A subtype that ends the line without a trailing `|`, as in `[Info]|[Finished]`.
fn trailing_token(input: &str) -> Option<(&str, &str)> {
    let token = input.trim_end().strip_prefix('[')?.strip_suffix(']')?;
    (!token.contains(['[', ']'])).then_some((token, ""))
}

fn clean(token: &str) -> String {
    token.replace(['[', ']'], "").trim().to_string()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use bsm_core::depot::{ErrorEvent, InfoEvent, WarningEvent};

    #[test]
    fn parses_three_segment_line() {
        let event = parse_line("[Info]|[Progress]|42,5").unwrap();
        assert_eq!(event.kind, DepotEventKind::Info(InfoEvent::Progress));
        assert_eq!(event.data.as_deref(), Some("42,5"));
    }

    #[test]
    fn trims_tokens_and_payload() {
        let event = parse_line("  [Info] | [SteamID] |  76561198000000000 \r\n");
        // "] |" is not the "]|" separator, so this is chatter
        assert!(event.is_none());

        let event = parse_line("[ Info ]|[ SteamID ]|  76561198000000000 \r\n").unwrap();
        assert_eq!(event.kind, DepotEventKind::Info(InfoEvent::SteamId));
        assert_eq!(event.data.as_deref(), Some("76561198000000000"));
    }

    #[test]
    fn subtype_without_payload() {
        let event = parse_line("[Info]|[Finished]|").unwrap();
        assert_eq!(event.kind, DepotEventKind::Info(InfoEvent::Finished));
        assert_eq!(event.data, None);

        let event = parse_line("[Info]|[Password]|").unwrap();
        assert!(event.is_info(InfoEvent::Password));

        // Trailing separator is optional
        let event = parse_line("[Info]|[Password]\r\n").unwrap();
        assert!(event.is_info(InfoEvent::Password));
        assert_eq!(event.data, None);
    }

    #[test]
    fn two_segment_form_has_no_subtype() {
        let event = parse_line("[Warning]|Manifest checksum mismatch").unwrap();
        assert_eq!(event.kind, DepotEventKind::Warning(WarningEvent::Unknown));
        assert_eq!(event.data.as_deref(), Some("Manifest checksum mismatch"));

        let event = parse_line("[Error]|Something broke").unwrap();
        assert_eq!(event.kind, DepotEventKind::Error(ErrorEvent::Unknown));

        // Info has no catch-all subtype
        assert!(parse_line("[Info]|Connecting to Steam3...").is_none());
    }

    #[test]
    fn payload_stops_at_next_bracket() {
        let event = parse_line("[Info]|[Progress]|12,0[Info]|[Progress]|13,0").unwrap();
        assert_eq!(event.data.as_deref(), Some("12,0"));
    }

    #[test]
    fn leading_chatter_before_first_token() {
        let event = parse_line("12:00:01 [Error]|[401]|Unauthorized").unwrap();
        assert_eq!(event.kind, DepotEventKind::Error(ErrorEvent::Unauthorized));
    }

    #[test]
    fn drops_unrecognized_lines() {
        assert!(parse_line("").is_none());
        assert!(parse_line("Got depot key for 620981 result: OK").is_none());
        assert!(parse_line("[Debug]|[Start]|{}").is_none());
        assert!(parse_line("[Info]|[Unheard]|x").is_none());
        assert!(parse_line("[Info] no separator").is_none());
    }

    #[test]
    fn start_line_carries_json_payload() {
        let event = parse_line(r#"[Info]|[Start]|{"version":"1.29.1"}"#).unwrap();
        assert!(event.is_info(InfoEvent::Start));
        let value: serde_json::Value = serde_json::from_str(event.data.as_deref().unwrap()).unwrap();
        assert_eq!(value["version"], "1.29.1");
    }

    #[test]
    fn parses_percentages() {
        assert_eq!(parse_percent("42,5"), Some(42.5));
        assert_eq!(parse_percent(" 100.00 "), Some(100.0));
        assert_eq!(parse_percent("7%"), Some(7.0));
        assert_eq!(parse_percent("abc"), None);
        assert_eq!(parse_percent("NaN"), None);
    }
}

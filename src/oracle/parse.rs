//! Normalization of oracle output.
//!
//! Oracle responses are loosely structured text that should contain one
//! JSON object. Parsing is deliberately lenient about wrapping (markdown
//! code fences, prose before or after the object) and deliberately strict
//! about shape: anything that does not decode into the expected fields is
//! `Malformed`, a first-class outcome the caller maps to hold. A malformed
//! response never mutates position state and never unwinds as an error.

use crate::core::types::MonitorAction;

use super::{EntryProposal, RiskParams};

#[derive(Debug)]
pub enum ParsedEntry {
    Proposal(EntryProposal),
    Malformed(String),
}

#[derive(Debug)]
pub enum ParsedRisk {
    Params(RiskParams),
    Malformed(String),
}

#[derive(Debug)]
pub enum ParsedMonitor {
    Action(MonitorAction),
    Malformed(String),
}

pub fn parse_entry(text: &str) -> ParsedEntry {
    match extract_object(text).and_then(|json| serde_json::from_str::<EntryProposal>(&json).ok()) {
        Some(proposal) => ParsedEntry::Proposal(proposal),
        None => ParsedEntry::Malformed(truncate(text)),
    }
}

pub fn parse_risk(text: &str) -> ParsedRisk {
    match extract_object(text).and_then(|json| serde_json::from_str::<RiskParams>(&json).ok()) {
        Some(params) => ParsedRisk::Params(params),
        None => ParsedRisk::Malformed(truncate(text)),
    }
}

/// Monitor responses decode into `{action: "hold"|"close", reason}`. There
/// is no side field in the target type, so a response proposing a flip
/// cannot parse as anything but malformed.
pub fn parse_monitor(text: &str) -> ParsedMonitor {
    #[derive(serde::Deserialize)]
    struct Raw {
        action: String,
        #[serde(default)]
        reason: String,
    }

    let raw = match extract_object(text).and_then(|json| serde_json::from_str::<Raw>(&json).ok()) {
        Some(raw) => raw,
        None => return ParsedMonitor::Malformed(truncate(text)),
    };

    match raw.action.as_str() {
        "hold" => ParsedMonitor::Action(MonitorAction::Hold),
        "close" => ParsedMonitor::Action(MonitorAction::Close { reason: raw.reason }),
        _ => ParsedMonitor::Malformed(truncate(text)),
    }
}

/// Pull the first balanced JSON object out of the text, tolerating code
/// fences and surrounding prose.
fn extract_object(text: &str) -> Option<String> {
    let trimmed = text.trim();
    let trimmed = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    let trimmed = trimmed.strip_suffix("```").unwrap_or(trimmed).trim();

    let start = trimmed.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, ch) in trimmed[start..].char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(trimmed[start..start + offset + 1].to_string());
                }
            }
            _ => {}
        }
    }
    None
}

fn truncate(text: &str) -> String {
    const LIMIT: usize = 200;
    if text.len() <= LIMIT {
        text.to_string()
    } else {
        let mut end = LIMIT;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &text[..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::ProposedSide;
    use rust_decimal_macros::dec;

    #[test]
    fn plain_entry_json() {
        let parsed = parse_entry(
            r#"{"side": "long", "pattern": "double bottom", "reason": "retest held", "position_fraction": 0.25}"#,
        );
        match parsed {
            ParsedEntry::Proposal(p) => {
                assert_eq!(p.side, ProposedSide::Long);
                assert_eq!(p.pattern, "double bottom");
                assert_eq!(p.position_fraction, dec!(0.25));
            }
            ParsedEntry::Malformed(raw) => panic!("unexpected malformed: {raw}"),
        }
    }

    #[test]
    fn fenced_json_with_prose() {
        let text = "Here is my analysis.\n```json\n{\"side\": \"flat\", \"reason\": \"chop\"}\n```";
        match parse_entry(text) {
            ParsedEntry::Proposal(p) => assert_eq!(p.side, ProposedSide::Flat),
            ParsedEntry::Malformed(raw) => panic!("unexpected malformed: {raw}"),
        }
    }

    #[test]
    fn garbage_is_malformed() {
        assert!(matches!(parse_entry("I would buy here."), ParsedEntry::Malformed(_)));
        assert!(matches!(parse_entry(""), ParsedEntry::Malformed(_)));
        assert!(matches!(parse_entry("{\"side\": \"sideways\"}"), ParsedEntry::Malformed(_)));
    }

    #[test]
    fn monitor_hold_and_close() {
        match parse_monitor(r#"{"action": "hold", "reason": "thesis intact"}"#) {
            ParsedMonitor::Action(MonitorAction::Hold) => {}
            other => panic!("expected hold, got {other:?}"),
        }
        match parse_monitor(r#"{"action": "close", "reason": "structure reversed"}"#) {
            ParsedMonitor::Action(MonitorAction::Close { reason }) => {
                assert_eq!(reason, "structure reversed")
            }
            other => panic!("expected close, got {other:?}"),
        }
    }

    #[test]
    fn monitor_cannot_express_a_flip() {
        // A response trying to reverse the position does not decode into the
        // monitor shape: there is no side to parse into.
        let parsed = parse_monitor(r#"{"action": "short", "reason": "flip it"}"#);
        assert!(matches!(parsed, ParsedMonitor::Malformed(_)));
    }

    #[test]
    fn risk_params_default_slippage() {
        match parse_risk(r#"{"stop_loss_pct": 1.2, "take_profit_pct": 2.4}"#) {
            ParsedRisk::Params(p) => {
                assert_eq!(p.stop_loss_pct, dec!(1.2));
                assert_eq!(p.max_slippage_pct, dec!(0.5));
            }
            ParsedRisk::Malformed(raw) => panic!("unexpected malformed: {raw}"),
        }
    }

    #[test]
    fn nested_braces_inside_strings() {
        let text = r#"{"action": "close", "reason": "broke {key} level"}"#;
        assert!(matches!(parse_monitor(text), ParsedMonitor::Action(_)));
    }
}

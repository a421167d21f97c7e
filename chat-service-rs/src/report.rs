// chat-service-rs/src/report.rs
//
// Report Normalizer: turns raw model text into a typed reply. Downstream
// code branches on the tagged variant here and nowhere else; absence of
// structure is an expected outcome (the general-conversation branch), not
// an error, so normalize() is total and never panics on arbitrary input.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

/// Structured view of a reply that followed the legal-analysis template
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisReport {
    pub summary_bullets: Vec<String>,
    pub jargon_score: u8,
    pub jargon_rationale: String,
}

/// Typed result of normalizing a raw model reply
#[derive(Debug, Clone, PartialEq)]
pub enum ModelReply {
    Structured(AnalysisReport),
    Plain(String),
}

#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("model output did not contain a parseable report: {0}")]
    Unparseable(String),
}

static JARGON_SCORE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)jargon\s*score\s*[:\-]?\s*(\d{1,3})").unwrap());

const MAX_SUMMARY_BULLETS: usize = 5;

/// Detect the legal-analysis template shape and extract its fields.
///
/// Both section markers must be present, at least one bullet must follow the
/// summary marker, and an integer must sit near the jargon marker; anything
/// less falls through to plain-text passthrough.
pub fn normalize(raw: &str) -> ModelReply {
    let Some(summary_pos) = find_marker(raw, "summary:") else {
        return ModelReply::Plain(raw.to_string());
    };
    let Some(caps) = JARGON_SCORE_RE.captures(raw) else {
        return ModelReply::Plain(raw.to_string());
    };

    let bullets = collect_bullets(&raw[summary_pos..]);
    if bullets.is_empty() {
        return ModelReply::Plain(raw.to_string());
    }

    // The capture group is 1-3 digits, so this parse cannot fail
    let parsed: u32 = caps[1].parse().unwrap_or(0);
    let jargon_score = parsed.clamp(1, 10) as u8;
    let jargon_rationale = extract_rationale(raw, caps.get(0).map(|m| m.end()).unwrap_or(0));

    ModelReply::Structured(AnalysisReport {
        summary_bullets: bullets,
        jargon_score,
        jargon_rationale,
    })
}

// Case-insensitive marker search returning the byte offset past the marker
fn find_marker(raw: &str, marker: &str) -> Option<usize> {
    raw.to_ascii_lowercase()
        .find(marker)
        .map(|pos| pos + marker.len())
}

fn collect_bullets(section: &str) -> Vec<String> {
    section
        .lines()
        .filter_map(|line| {
            let trimmed = line.trim_start();
            let body = trimmed
                .strip_prefix("- ")
                .or_else(|| trimmed.strip_prefix("* "))
                .or_else(|| trimmed.strip_prefix("• "))
                .or_else(|| trimmed.strip_prefix('-'))
                .or_else(|| trimmed.strip_prefix('*'))
                .or_else(|| trimmed.strip_prefix('•'))?;
            let body = body.trim();
            (!body.is_empty()).then(|| body.to_string())
        })
        .take(MAX_SUMMARY_BULLETS)
        .collect()
}

// Rationale is whatever trails the score on its line, minus the "/10" tail
// and separator punctuation.
fn extract_rationale(raw: &str, after_score: usize) -> String {
    let rest = &raw[after_score..];
    let line = rest.lines().next().unwrap_or("");
    line.trim_start_matches(|c: char| {
        c == '/' || c.is_ascii_digit() || c.is_whitespace() || c == '-' || c == ':' || c == '.'
    })
    .trim()
    .to_string()
}

// ---------------------------------------------------------------------------
// Extended four-layer report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyEntity {
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Vitals {
    #[serde(default)]
    pub document_name: String,
    #[serde(default)]
    pub key_entities: Vec<KeyEntity>,
    #[serde(default)]
    pub summary: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Benchmark {
    #[serde(default)]
    pub context: String,
    /// Clause strictness percentile, clamped to 0-100; 0 when the model
    /// produced nothing numeric
    #[serde(default, deserialize_with = "deserialize_percentile")]
    pub percentile: u8,
    #[serde(default)]
    pub insight: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Personalization {
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub flags: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrustStatus {
    Verified,
    Unverified,
}

impl Default for TrustStatus {
    fn default() -> Self {
        TrustStatus::Unverified
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Trust {
    #[serde(default)]
    pub party_name: String,
    #[serde(default)]
    pub status: TrustStatus,
    #[serde(default)]
    pub details: String,
}

/// Four-layer report consumed by the document-scan presentation surface
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ExtendedAnalysisReport {
    #[serde(default)]
    pub vitals: Vitals,
    #[serde(default)]
    pub benchmark: Benchmark,
    #[serde(default)]
    pub personalization: Personalization,
    #[serde(default)]
    pub trust: Trust,
}

// Tolerate numeric strings and floats; anything else becomes the 0 sentinel.
fn deserialize_percentile<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    let numeric = value
        .as_f64()
        .or_else(|| value.as_str().and_then(|s| s.trim().parse::<f64>().ok()));
    Ok(numeric
        .map(|f| f.round().clamp(0.0, 100.0) as u8)
        .unwrap_or(0))
}

/// Parse the structured-extraction reply into the four-layer report.
///
/// The extraction contract asks for bare JSON, but models wrap output in
/// Markdown fences or stray prose often enough that both are stripped before
/// giving up.
pub fn normalize_extended(raw: &str) -> Result<ExtendedAnalysisReport, ExtractionError> {
    let stripped = strip_code_fence(raw);

    let mut report: ExtendedAnalysisReport = serde_json::from_str(stripped)
        .or_else(|_| {
            // Fall back to the outermost JSON object embedded in prose
            match (stripped.find('{'), stripped.rfind('}')) {
                (Some(start), Some(end)) if start < end => {
                    serde_json::from_str(&stripped[start..=end])
                }
                _ => serde_json::from_str(stripped),
            }
        })
        .map_err(|e| ExtractionError::Unparseable(e.to_string()))?;

    if report.benchmark.insight.is_empty() {
        report.benchmark.insight = "No benchmark insight available".to_string();
    }

    Ok(report)
}

fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string ("json") on the opening fence line
    let rest = rest.split_once('\n').map(|(_, body)| body).unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEMPLATE_REPLY: &str = "Summary:\n\
        - Tenant must indemnify the landlord against all third-party claims\n\
        - Rent increases are uncapped after the first year\n\
        - Early termination forfeits the full deposit\n\
        - Subletting requires prior written consent\n\
        - Disputes go to binding arbitration\n\
        Jargon Score: 7/10 - Dense indemnification and arbitration language.";

    #[test]
    fn test_normalize_round_trips_the_template() {
        match normalize(TEMPLATE_REPLY) {
            ModelReply::Structured(report) => {
                assert_eq!(report.summary_bullets.len(), 5);
                assert_eq!(report.jargon_score, 7);
                assert!(report.jargon_rationale.contains("indemnification"));
            }
            ModelReply::Plain(_) => panic!("template reply should normalize as structured"),
        }
    }

    #[test]
    fn test_normalize_caps_bullets_at_five() {
        let reply = format!(
            "Summary:\n{}\nJargon Score: 5/10 - fine.",
            (0..8).map(|i| format!("- bullet {}", i)).collect::<Vec<_>>().join("\n")
        );
        match normalize(&reply) {
            ModelReply::Structured(report) => assert_eq!(report.summary_bullets.len(), 5),
            ModelReply::Plain(_) => panic!("expected structured reply"),
        }
    }

    #[test]
    fn test_normalize_clamps_out_of_range_scores() {
        let reply = "Summary:\n- only bullet\nJargon Score: 12/10 - overshoot.";
        match normalize(reply) {
            ModelReply::Structured(report) => assert_eq!(report.jargon_score, 10),
            ModelReply::Plain(_) => panic!("expected structured reply"),
        }

        let reply = "Summary:\n- only bullet\nJargon Score: 0/10 - undershoot.";
        match normalize(reply) {
            ModelReply::Structured(report) => assert_eq!(report.jargon_score, 1),
            ModelReply::Plain(_) => panic!("expected structured reply"),
        }
    }

    #[test]
    fn test_normalize_falls_back_to_plain_text() {
        let casual = "Hey! Happy to help - what would you like to know?";
        assert_eq!(normalize(casual), ModelReply::Plain(casual.to_string()));
    }

    #[test]
    fn test_normalize_never_panics_on_arbitrary_input() {
        for input in [
            "",
            "Summary:",
            "Summary:\nJargon Score:",
            "Jargon Score: banana",
            "Summary:\n- lone bullet with no score",
            "- stray bullets\n- without markers",
            "Summary: Jargon Score: 5",
            "\u{0000}\u{FFFD} binary-ish noise \n\n\t",
        ] {
            // Worst case is plain passthrough; structure only with both markers
            let _ = normalize(input);
        }
    }

    #[test]
    fn test_normalize_partial_template_is_plain() {
        // Marker present but no numeric score anywhere near it
        let partial = "Summary:\n- one\n- two\nJargon Score: high-ish";
        assert_eq!(normalize(partial), ModelReply::Plain(partial.to_string()));
    }

    const EXTENDED_JSON: &str = r#"{
        "vitals": {
            "documentName": "lease.pdf",
            "keyEntities": [{"label": "Landlord", "value": "Acme Property LLC"}],
            "summary": ["Tenant pays all maintenance costs"]
        },
        "benchmark": {"context": "Standard residential leases", "percentile": 85, "insight": "Stricter than most"},
        "personalization": {"location": "Berlin", "flags": ["Deposit cap exceeds local limit"]},
        "trust": {"partyName": "Acme Property LLC", "status": "Verified", "details": "Registered entity"}
    }"#;

    #[test]
    fn test_normalize_extended_parses_bare_json() {
        let report = normalize_extended(EXTENDED_JSON).unwrap();
        assert_eq!(report.vitals.document_name, "lease.pdf");
        assert_eq!(report.benchmark.percentile, 85);
        assert_eq!(report.trust.status, TrustStatus::Verified);
        assert_eq!(report.personalization.flags.len(), 1);
    }

    #[test]
    fn test_normalize_extended_strips_markdown_fence() {
        let fenced = format!("```json\n{}\n```", EXTENDED_JSON);
        let report = normalize_extended(&fenced).unwrap();
        assert_eq!(report.vitals.document_name, "lease.pdf");
    }

    #[test]
    fn test_normalize_extended_clamps_percentile() {
        let raw = r#"{"benchmark": {"context": "c", "percentile": 250, "insight": "i"}}"#;
        let report = normalize_extended(raw).unwrap();
        assert_eq!(report.benchmark.percentile, 100);
    }

    #[test]
    fn test_normalize_extended_sentinel_on_non_numeric_percentile() {
        let raw = r#"{"benchmark": {"context": "c", "percentile": "very high"}}"#;
        let report = normalize_extended(raw).unwrap();
        assert_eq!(report.benchmark.percentile, 0);
        assert_eq!(report.benchmark.insight, "No benchmark insight available");
    }

    #[test]
    fn test_normalize_extended_rejects_garbage() {
        assert!(normalize_extended("not json at all").is_err());
        assert!(normalize_extended("").is_err());
    }
}

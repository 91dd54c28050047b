//! Turns a model's free-form answer into a `SignalResult`.
//!
//! Model output is not trusted to be valid JSON. Parsing degrades in two
//! tiers: a structured parse of the first JSON object found in the text,
//! then a keyword scan of the raw text. It never fails.

use std::sync::LazyLock;

use quorum_types::{
    truncate_chars, ParseSource, ProviderId, Signal, SignalResult, MAX_REASONING_CHARS,
};
use regex::Regex;
use serde_json::{Map, Value};

/// Prefix of the reasoning attached to keyword-fallback results.
pub const FALLBACK_PREFIX: &str = "[parse fallback] ";

/// Reasoning used when a structured answer carries none.
pub const NO_REASONING: &str = "No reasoning provided";

const FALLBACK_EXCERPT_CHARS: usize = 200;

static NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-?\d+(?:\.\d+)?").expect("number regex is valid"));

// ---------------------------------------------------------------------------
// ParseOutcome
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedSignal {
    pub signal: Signal,
    pub confidence: u8,
    pub reasoning: String,
}

/// Result of parsing one model answer, tagged with how much it can be trusted.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseOutcome {
    /// The answer contained a JSON object.
    Structured(ParsedSignal),
    /// Best-effort keyword salvage.
    Fallback(ParsedSignal),
}

impl ParseOutcome {
    pub fn parsed(&self) -> &ParsedSignal {
        match self {
            ParseOutcome::Structured(p) | ParseOutcome::Fallback(p) => p,
        }
    }

    pub fn is_structured(&self) -> bool {
        matches!(self, ParseOutcome::Structured(_))
    }

    pub fn into_signal_result(self, provider: ProviderId) -> SignalResult {
        let (parsed, source) = match self {
            ParseOutcome::Structured(p) => (p, ParseSource::Structured),
            ParseOutcome::Fallback(p) => (p, ParseSource::Fallback),
        };
        SignalResult {
            signal: parsed.signal,
            confidence: parsed.confidence,
            reasoning: parsed.reasoning,
            provider,
            source,
        }
    }
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

pub fn parse_response(raw: &str) -> ParseOutcome {
    let stripped = strip_code_fences(raw);

    let candidates = [extract_json_object(stripped), Some(stripped)];
    for candidate in candidates.into_iter().flatten() {
        if let Some(obj) = parse_object(candidate) {
            return ParseOutcome::Structured(normalize(&obj));
        }
    }

    tracing::debug!(
        excerpt = %truncate_chars(raw.trim(), 80),
        "Model output is not JSON, using keyword fallback"
    );
    ParseOutcome::Fallback(keyword_fallback(raw))
}

/// Parse `raw` and attribute the result to `provider`.
pub fn parse_signal_response(raw: &str, provider: ProviderId) -> SignalResult {
    parse_response(raw).into_signal_result(provider)
}

// ---------------------------------------------------------------------------
// Extraction
// ---------------------------------------------------------------------------

/// Return the contents of the first Markdown code fence, or the trimmed text
/// when there is none.
fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(start) = trimmed.find("```") else {
        return trimmed;
    };
    let after = &trimmed[start + 3..];
    // language tag, e.g. ```json
    let body = after.trim_start_matches(|c: char| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    let end = body.find("```").unwrap_or(body.len());
    body[..end].trim()
}

/// Locate the first balanced `{...}` span. Braces inside JSON strings are
/// ignored.
fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

fn parse_object(text: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(text).ok()? {
        Value::Object(map) => Some(map),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Normalization
// ---------------------------------------------------------------------------

fn normalize(obj: &Map<String, Value>) -> ParsedSignal {
    let signal = classify_signal(obj.get("signal").and_then(value_text).as_deref());

    let reasoning = ["reasoning", "explanation", "rationale"]
        .iter()
        .filter_map(|key| obj.get(*key).and_then(value_text))
        .find(|text| !text.trim().is_empty())
        .unwrap_or_else(|| NO_REASONING.to_string());

    let mut confidence = obj.get("confidence").map(confidence_value).unwrap_or(0.0);
    if confidence == 0.0 && signal.is_directional() {
        confidence = 50.0;
    }
    if confidence == 0.0 && reasoning.chars().count() > 50 {
        confidence = 40.0;
    }

    ParsedSignal {
        signal,
        confidence: clamp_confidence(confidence),
        reasoning: truncate_chars(&reasoning, MAX_REASONING_CHARS),
    }
}

/// Text of a JSON value: strings as-is, null as absent, anything else as its
/// JSON rendering.
fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn classify_signal(raw: Option<&str>) -> Signal {
    let Some(raw) = raw else {
        return Signal::Neutral;
    };
    let upper = raw.to_uppercase();
    if upper.contains("BULLISH") || upper.contains("BUY") {
        Signal::Bullish
    } else if upper.contains("BEARISH") || upper.contains("SELL") {
        Signal::Bearish
    } else {
        Signal::Neutral
    }
}

fn confidence_value(value: &Value) -> f64 {
    match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => NUMBER_RE
            .find(s)
            .and_then(|m| m.as_str().parse::<f64>().ok())
            .unwrap_or_else(|| qualitative_confidence(s)),
        _ => 0.0,
    }
}

fn qualitative_confidence(text: &str) -> f64 {
    let lower = text.to_lowercase();
    if lower.contains("very low") {
        15.0
    } else if lower.contains("very high") || lower.contains("extremely") {
        90.0
    } else if lower.contains("high") {
        75.0
    } else if lower.contains("moderate") || lower.contains("medium") {
        55.0
    } else if lower.contains("low") {
        35.0
    } else {
        0.0
    }
}

fn clamp_confidence(value: f64) -> u8 {
    if !value.is_finite() {
        return 0;
    }
    value.clamp(0.0, 100.0).round() as u8
}

fn keyword_fallback(raw: &str) -> ParsedSignal {
    let lower = raw.to_lowercase();
    let (signal, confidence) = if lower.contains("bullish") || lower.contains("buy") {
        (Signal::Bullish, 40)
    } else if lower.contains("bearish") || lower.contains("sell") {
        (Signal::Bearish, 40)
    } else {
        (Signal::Neutral, 30)
    };

    ParsedSignal {
        signal,
        confidence,
        reasoning: format!(
            "{FALLBACK_PREFIX}{}",
            truncate_chars(raw.trim(), FALLBACK_EXCERPT_CHARS)
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn structured(raw: &str) -> ParsedSignal {
        match parse_response(raw) {
            ParseOutcome::Structured(p) => p,
            ParseOutcome::Fallback(p) => panic!("expected structured parse, got fallback: {p:?}"),
        }
    }

    #[test]
    fn well_formed_json_round_trips() {
        let result = parse_signal_response(
            r#"{"signal":"bullish","confidence":82,"reasoning":"strong moat"}"#,
            ProviderId::OpenAi,
        );
        assert_eq!(result.signal, Signal::Bullish);
        assert_eq!(result.confidence, 82);
        assert_eq!(result.reasoning, "strong moat");
        assert_eq!(result.provider, ProviderId::OpenAi);
        assert_eq!(result.source, ParseSource::Structured);
    }

    #[test]
    fn strips_code_fences() {
        let raw = "Here is my analysis:\n```json\n{\"signal\": \"BEARISH\", \"confidence\": 64, \"reasoning\": \"margins shrinking\"}\n```\nHope that helps.";
        let p = structured(raw);
        assert_eq!(p.signal, Signal::Bearish);
        assert_eq!(p.confidence, 64);
        assert_eq!(p.reasoning, "margins shrinking");
    }

    #[test]
    fn extracts_object_from_prose_with_nested_braces() {
        let raw = r#"Sure. {"signal": "neutral", "confidence": 51, "reasoning": "range {bound} trading", "meta": {"k": 1}} Anything else?"#;
        let p = structured(raw);
        assert_eq!(p.signal, Signal::Neutral);
        assert_eq!(p.confidence, 51);
        assert_eq!(p.reasoning, "range {bound} trading");
    }

    #[test]
    fn escaped_quotes_inside_strings() {
        let raw = r#"{"signal": "buy", "confidence": 70, "reasoning": "CEO said \"record quarter\" {sic}"}"#;
        let p = structured(raw);
        assert_eq!(p.signal, Signal::Bullish);
        assert_eq!(p.reasoning, r#"CEO said "record quarter" {sic}"#);
    }

    #[test]
    fn signal_classification() {
        let cases = [
            ("STRONG BUY", Signal::Bullish),
            ("Bullish", Signal::Bullish),
            ("sell", Signal::Bearish),
            ("bearish-ish", Signal::Bearish),
            ("hold", Signal::Neutral),
            ("", Signal::Neutral),
        ];
        for (input, expected) in cases {
            let raw = format!(r#"{{"signal": "{input}", "confidence": 60}}"#);
            assert_eq!(structured(&raw).signal, expected, "signal {input:?}");
        }
        assert_eq!(structured(r#"{"confidence": 60}"#).signal, Signal::Neutral);
    }

    #[test]
    fn string_confidence_extracts_number() {
        assert_eq!(structured(r#"{"signal":"bullish","confidence":"75%"}"#).confidence, 75);
        assert_eq!(structured(r#"{"signal":"bullish","confidence":"75 percent"}"#).confidence, 75);
        assert_eq!(structured(r#"{"signal":"bullish","confidence":"about 62.4"}"#).confidence, 62);
    }

    #[test]
    fn qualitative_confidence_buckets() {
        let cases = [
            ("very high", 90),
            ("extremely confident", 90),
            ("High", 75),
            ("moderate", 55),
            ("medium", 55),
            ("low", 35),
            ("very low", 15),
        ];
        for (input, expected) in cases {
            let raw = format!(r#"{{"signal": "bearish", "confidence": "{input}"}}"#);
            assert_eq!(structured(&raw).confidence, expected, "confidence {input:?}");
        }
    }

    #[test]
    fn missing_confidence_defaults() {
        // directional call implies at least moderate conviction
        assert_eq!(structured(r#"{"signal":"bullish"}"#).confidence, 50);
        assert_eq!(structured(r#"{"signal":"sell","confidence":"unsure"}"#).confidence, 50);

        let long = "a".repeat(51);
        let raw = format!(r#"{{"signal":"neutral","reasoning":"{long}"}}"#);
        assert_eq!(structured(&raw).confidence, 40);

        assert_eq!(structured(r#"{"signal":"neutral","reasoning":"short"}"#).confidence, 0);
    }

    #[test]
    fn confidence_is_clamped_and_rounded() {
        assert_eq!(structured(r#"{"signal":"bullish","confidence":150}"#).confidence, 100);
        assert_eq!(structured(r#"{"signal":"bullish","confidence":-20}"#).confidence, 0);
        assert_eq!(structured(r#"{"signal":"bullish","confidence":72.6}"#).confidence, 73);
        assert_eq!(structured(r#"{"signal":"bullish","confidence":72.5}"#).confidence, 73);
    }

    #[test]
    fn reasoning_field_fallbacks() {
        let p = structured(r#"{"signal":"bullish","confidence":60,"explanation":"via explanation"}"#);
        assert_eq!(p.reasoning, "via explanation");

        let p = structured(r#"{"signal":"bullish","confidence":60,"reasoning":"","rationale":"via rationale"}"#);
        assert_eq!(p.reasoning, "via rationale");

        let p = structured(r#"{"signal":"bullish","confidence":60}"#);
        assert_eq!(p.reasoning, NO_REASONING);
    }

    #[test]
    fn reasoning_is_truncated() {
        let long = "x".repeat(1500);
        let raw = format!(r#"{{"signal":"bullish","confidence":60,"reasoning":"{long}"}}"#);
        assert_eq!(structured(&raw).reasoning.chars().count(), MAX_REASONING_CHARS);
    }

    #[test]
    fn fallback_is_deterministic() {
        let raw = "I am fairly bearish on this name given the guidance cut.";
        let first = parse_response(raw);
        let second = parse_response(raw);
        assert_eq!(first, second);
        assert!(!first.is_structured());

        let result = first.into_signal_result(ProviderId::Groq);
        assert_eq!(result.signal, Signal::Bearish);
        assert_eq!(result.confidence, 40);
        assert!(result.reasoning.starts_with(FALLBACK_PREFIX));
        assert_eq!(result.source, ParseSource::Fallback);
    }

    #[test]
    fn fallback_keywords() {
        assert_eq!(parse_response("Strong buy here").parsed().signal, Signal::Bullish);
        assert_eq!(parse_response("Strong buy here").parsed().confidence, 40);

        let neutral = parse_response("No clear view on this one.");
        assert_eq!(neutral.parsed().signal, Signal::Neutral);
        assert_eq!(neutral.parsed().confidence, 30);
    }

    #[test]
    fn fallback_excerpt_is_bounded() {
        let raw = "z".repeat(500);
        let p = parse_response(&raw);
        assert_eq!(
            p.parsed().reasoning.chars().count(),
            FALLBACK_PREFIX.chars().count() + FALLBACK_EXCERPT_CHARS
        );
    }

    #[test]
    fn malformed_or_non_object_json_falls_back() {
        assert!(!parse_response(r#"{"signal": "bullish", "confidence": 80"#).is_structured());
        assert!(!parse_response(r#"["bullish", 80]"#).is_structured());
        assert!(!parse_response("").is_structured());
    }

    #[test]
    fn confidence_always_within_bounds() {
        let inputs = [
            r#"{"signal":"bullish","confidence":1e308}"#,
            r#"{"signal":"bearish","confidence":"-999"}"#,
            r#"{"signal":"neutral","confidence":null}"#,
            r#"{"signal":"bullish","confidence":true}"#,
            r#"{"signal":42,"confidence":[1,2]}"#,
            "garbage",
        ];
        for raw in inputs {
            let p = parse_response(raw);
            assert!(p.parsed().confidence <= 100, "input {raw:?}");
        }
    }
}

//! Score coercion and PDF text extraction for the resume analyzer.

use serde_json::Value;

use crate::models::results::{RawResumeMatch, ResumeMatch};

/// Coerces whatever the provider put in `score` into an integer in 0..=100.
///
/// Numbers are rounded; strings are parsed leniently from their leading
/// integer (`"82"`, `" 82/100"`, `"82%"` all give 82). Anything else is 0.
pub fn coerce_score(raw: &Value) -> u8 {
    let value = match raw {
        Value::Number(n) => n.as_f64().map(|f| f.round() as i64).unwrap_or(0),
        Value::String(s) => parse_leading_int(s).unwrap_or(0),
        _ => 0,
    };
    value.clamp(0, 100) as u8
}

fn parse_leading_int(s: &str) -> Option<i64> {
    let s = s.trim_start();
    let (sign, rest) = match s.strip_prefix('-') {
        Some(rest) => (-1, rest),
        None => (1, s.strip_prefix('+').unwrap_or(s)),
    };
    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }
    // Saturate absurdly long digit runs rather than failing.
    let magnitude = digits.parse::<i64>().unwrap_or(i64::MAX);
    Some(sign * magnitude)
}

impl From<RawResumeMatch> for ResumeMatch {
    fn from(raw: RawResumeMatch) -> Self {
        ResumeMatch {
            score: coerce_score(&raw.score),
            strengths: raw.strengths.trim().to_string(),
            weaknesses: raw.weaknesses.trim().to_string(),
        }
    }
}

/// Extracts plain text from an uploaded PDF resume.
pub fn extract_pdf_text(bytes: &[u8]) -> Result<String, String> {
    let text = pdf_extract::extract_text_from_mem(bytes).map_err(|e| e.to_string())?;
    let text = text.trim().to_string();
    if text.is_empty() {
        return Err("PDF contains no extractable text".to_string());
    }
    Ok(text)
}

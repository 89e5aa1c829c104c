//! Text helpers shared by the adapters: rating strings, review dates,
//! reviewer fit context and HTTP failure classification.

use super::SourceError;
use crate::review::RawRating;
use chrono::NaiveDate;
use regex::Regex;
use reqwest::StatusCode;
use std::sync::OnceLock;

fn out_of_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(\d+(?:[.,]\d+)?)\s*(?:out\s+of|/|of)\s*(\d+(?:[.,]\d+)?)")
            .expect("valid regex")
    })
}

fn stars_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)(\d+(?:[.,]\d+)?)\s*-?\s*stars?\b").expect("valid regex"))
}

fn bare_number_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*(\d+(?:[.,]\d+)?)\s*$").expect("valid regex"))
}

fn parse_number(text: &str) -> Option<f32> {
    text.replace(',', ".").parse::<f32>().ok()
}

/// Parses the rating notations retailers print
///
/// Accepts `4.5 out of 5`, `4/5`, `8 of 10`, `4 stars`, `★★★★☆` and bare
/// numbers. A bare number above 5 is read against a 10 or 100 point scale.
pub fn parse_rating_text(text: &str) -> Option<RawRating> {
    let filled = text.chars().filter(|c| *c == '★').count();
    if filled > 0 {
        let empty = text.chars().filter(|c| *c == '☆').count();
        let scale = (filled + empty).max(5) as f32;
        return Some(RawRating {
            value: filled as f32,
            scale,
        });
    }

    if let Some(caps) = out_of_pattern().captures(text) {
        let value = parse_number(&caps[1])?;
        let scale = parse_number(&caps[2])?;
        if scale > 0.0 && value <= scale {
            return Some(RawRating { value, scale });
        }
    }

    if let Some(caps) = stars_pattern().captures(text) {
        return parse_number(&caps[1]).map(RawRating::stars);
    }

    let caps = bare_number_pattern().captures(text)?;
    let value = parse_number(&caps[1])?;
    let scale = match value {
        v if v <= 5.0 => 5.0,
        v if v <= 10.0 => 10.0,
        v if v <= 100.0 => 100.0,
        _ => return None,
    };
    Some(RawRating { value, scale })
}

/// Converts a JSON rating that may be a number or a rating string
pub fn rating_from_json(value: &serde_json::Value) -> Option<RawRating> {
    match value {
        serde_json::Value::Number(n) => n.as_f64().map(|v| RawRating::stars(v as f32)),
        serde_json::Value::String(s) => parse_rating_text(s),
        _ => None,
    }
}

const DATE_FORMATS: &[&str] = &["%B %d, %Y", "%b %d, %Y", "%Y-%m-%d", "%m/%d/%Y", "%d %B %Y"];

fn date_prefix_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^(?:reviewed\s+(?:in\s+[a-z ]+?\s+)?on|posted(?:\s+on)?|on)\s+")
            .expect("valid regex")
    })
}

/// Parses a review date, tolerating `Reviewed on ...` prefixes
pub fn parse_review_date(text: &str) -> Option<NaiveDate> {
    let trimmed = text.trim();
    let stripped = date_prefix_pattern().replace(trimmed, "");
    let candidate = stripped.trim().trim_end_matches('.');

    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(candidate, format).ok())
}

struct FitPatterns {
    height: Regex,
    weight: Regex,
    usual_size: Regex,
    body: Regex,
}

fn fit_patterns() -> &'static FitPatterns {
    static PATTERNS: OnceLock<FitPatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| FitPatterns {
        height: Regex::new(
            r#"(?i)\b([4-6])\s*(?:'|′|’|\s?ft\.?|\s?foot|\s?feet)\s*(\d{1,2})?\s*(?:"|″|”|''|\s?in(?:ches)?\b)?"#,
        )
        .expect("valid regex"),
        weight: Regex::new(r"(?i)\b(\d{2,3})\s*(lbs?|pounds|kg)\b").expect("valid regex"),
        usual_size: Regex::new(
            r"(?i)\b(?:usually|normally|typically|always)\s+(?:wear|buy|get|order|take)\s+(?:an?\s+|a\s+size\s+|size\s+)?([a-z0-9]{1,7})\b",
        )
        .expect("valid regex"),
        body: Regex::new(
            r"(?i)\b(petite|curvy|athletic build|athletic|tall|plus[- ]size|pear[- ]shaped|hourglass|broad shoulders|long torso|short torso|busty|muscular thighs|postpartum)\b",
        )
        .expect("valid regex"),
    })
}

/// Pulls the reviewer's self-described measurements and usual size out of a
/// review, e.g. `5'4"; 130 lbs; usually wears medium; petite`
pub fn extract_fit_context(text: &str) -> Option<String> {
    let patterns = fit_patterns();
    let mut parts: Vec<String> = Vec::new();

    if let Some(caps) = patterns.height.captures(text) {
        let feet = &caps[1];
        match caps.get(2) {
            Some(inches) => parts.push(format!("{}'{}\"", feet, inches.as_str())),
            None => parts.push(format!("{}'", feet)),
        }
    }

    if let Some(caps) = patterns.weight.captures(text) {
        parts.push(format!("{} {}", &caps[1], caps[2].to_lowercase()));
    }

    if let Some(caps) = patterns.usual_size.captures(text) {
        parts.push(format!("usually wears {}", caps[1].to_lowercase()));
    }

    for caps in patterns.body.captures_iter(text) {
        let descriptor = caps[1].to_lowercase();
        if !parts.contains(&descriptor) {
            parts.push(descriptor);
        }
    }

    if parts.is_empty() {
        None
    } else {
        Some(parts.join("; "))
    }
}

/// Maps a non-success HTTP status to the adapter failure taxonomy
pub fn classify_status(status: StatusCode, body: &str) -> SourceError {
    let detail = format!("HTTP {}: {}", status.as_u16(), snippet(body));
    match status.as_u16() {
        401 | 403 => SourceError::AuthInvalid(detail),
        429 => SourceError::RateLimited(detail),
        408 | 500..=599 => SourceError::Unreachable(detail),
        _ => SourceError::ParseFailure(detail),
    }
}

/// Maps a transport error from reqwest
pub fn classify_transport(err: &reqwest::Error) -> SourceError {
    if let Some(status) = err.status() {
        return classify_status(status, "");
    }
    if err.is_decode() || err.is_body() {
        return SourceError::ParseFailure(err.to_string());
    }
    SourceError::Unreachable(err.to_string())
}

/// Maps an error message embedded in a 200 response body
pub fn classify_api_message(message: &str) -> SourceError {
    let lower = message.to_lowercase();
    if lower.contains("api key") || lower.contains("unauthorized") || lower.contains("forbidden")
    {
        SourceError::AuthInvalid(message.to_string())
    } else if lower.contains("run out of searches")
        || lower.contains("rate limit")
        || lower.contains("too many requests")
    {
        SourceError::RateLimited(message.to_string())
    } else {
        SourceError::ParseFailure(message.to_string())
    }
}

fn snippet(body: &str) -> String {
    let trimmed = body.trim();
    match trimmed.char_indices().nth(200) {
        Some((idx, _)) => format!("{}...", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}

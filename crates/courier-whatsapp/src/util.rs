//! Small helpers shared across the channel.

/// Maximum length of message text to log
const MAX_LOG_TEXT_LENGTH: usize = 50;

/// Sensitive patterns to mask
const SENSITIVE_PATTERNS: &[&str] = &[
    "password",
    "secret",
    "token",
    "api_key",
    "bearer",
    "credential",
    "private",
];

/// Mask message text for logging.
#[must_use]
pub fn mask_for_logging(text: &str) -> String {
    let lower = text.to_lowercase();
    for pattern in SENSITIVE_PATTERNS {
        if lower.contains(pattern) {
            return "[REDACTED]".to_string();
        }
    }
    if text.chars().count() > MAX_LOG_TEXT_LENGTH {
        let head: String = text.chars().take(MAX_LOG_TEXT_LENGTH).collect();
        format!("{head}...")
    } else {
        text.to_string()
    }
}

/// Strip `+`, spaces and dashes from a recipient number.
#[must_use]
pub fn normalize_phone(number: &str) -> String {
    number
        .chars()
        .filter(|c| !matches!(c, '+' | ' ' | '-'))
        .collect()
}

/// Title-case a provider type name (`"interactive"` -> `"Interactive"`,
/// `"order_status"` -> `"Order Status"`).
#[must_use]
pub fn title_case(s: &str) -> String {
    s.split(['_', ' '])
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

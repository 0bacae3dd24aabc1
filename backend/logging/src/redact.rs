//! Log Redaction Layer
//!
//! Scrubs API keys, bearer tokens, and password-like fields from strings
//! before they reach the log.

use regex::Regex;
use std::sync::LazyLock;

static API_KEY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(sk-[a-zA-Z0-9]{32,})|(Bearer\s+[a-zA-Z0-9\-\._~+/]+=*)")
        .expect("api key pattern is valid")
});
static SECRET_FIELD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)"(password|secret|token|api_?key)"\s*:\s*"[^"]*""#)
        .expect("secret field pattern is valid")
});

/// Redacts sensitive patterns in a string.
pub fn redact_sensitive_data(input: &str) -> String {
    let redacted = API_KEY_RE.replace_all(input, "[REDACTED_TOKEN]");
    SECRET_FIELD_RE
        .replace_all(&redacted, "\"$1\":\"[REDACTED]\"")
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redacts_bearer_tokens() {
        let raw = "calling upstream with Bearer eyJhbGciOiJIUzI1NiIsInR5cCI6IkpXVCJ9";
        let clean = redact_sensitive_data(raw);
        assert!(!clean.contains("eyJhbGciOiJIUzI1NiIsInR5cCI6IkpXVCJ9"));
        assert!(clean.contains("[REDACTED_TOKEN]"));
    }

    #[test]
    fn test_redacts_secret_json_fields() {
        let raw = r#"{"user":"ana","password":"hunter2","apiKey":"abc"}"#;
        let clean = redact_sensitive_data(raw);
        assert!(!clean.contains("hunter2"));
        assert!(!clean.contains("\"abc\""));
        assert!(clean.contains("\"user\":\"ana\""));
    }
}

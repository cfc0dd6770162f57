use serde::Serialize;
use thiserror::Error;

use crate::connection::Profile;

/// Substring of collaborator errors that signal a stale integration
const NULL_DEREFERENCE: &str = "Cannot read properties of null";

/// Note attached to results recovered from a failed lookup
pub const RECOVERED_NOTE: &str = "Data recovered after a non-critical library error.";

/// One incoming search
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupRequest {
    /// Number as given by the caller
    pub raw_number: String,
    /// Region code for the lookup
    pub country_code: String,
    /// `raw_number` with everything but digits and a leading `+` removed
    pub sanitized_number: String,
}

impl LookupRequest {
    /// Build a request, falling back to `default_country` when `country` is
    /// absent or blank
    pub fn new(raw_number: &str, country: Option<&str>, default_country: &str) -> Self {
        let country_code = country
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .unwrap_or(default_country)
            .to_string();

        Self {
            raw_number: raw_number.to_string(),
            country_code,
            sanitized_number: normalize_number(raw_number),
        }
    }
}

/// Strip everything except ASCII digits and a single leading `+`
pub fn normalize_number(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if c.is_ascii_digit() || (c == '+' && out.is_empty()) {
            out.push(c);
        }
    }
    out
}

/// Stable projection of a collaborator profile
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LookupResult {
    pub name: Option<String>,
    pub phone_number: Option<String>,
    pub provider: Option<String>,
}

impl From<Profile> for LookupResult {
    fn from(profile: Profile) -> Self {
        Self {
            name: profile.name,
            phone_number: profile.phone_number,
            provider: profile.provider,
        }
    }
}

/// Successful search
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchOutcome {
    /// The collaborator returned a profile
    Found(LookupResult),
    /// The collaborator failed after producing a usable profile
    Recovered {
        result: LookupResult,
        note: &'static str,
    },
}

/// Rejected or failed search
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupError {
    /// Missing number, or one with no digits left after normalization
    #[error("Parameter \"number\" is required. Example: /search?number=08123456789")]
    MissingNumber,

    /// The query string could not be decoded
    #[error("Invalid query string. Example: /search?number=08123456789")]
    InvalidQuery { detail: String },

    /// The session is not authenticated yet
    #[error("Service is not ready. Scan the QR code on the home page if needed.")]
    NotReady,

    /// The collaborator dereferenced null; its integration is outdated
    #[error("Lookup failed. The provider has probably changed; the integration needs updating.")]
    StaleIntegration { detail: String },

    /// Any other collaborator failure
    #[error("Internal server error.")]
    CollaboratorFailed { detail: String },
}

impl LookupError {
    /// Classify a collaborator error message that came without a profile
    pub fn from_collaborator(message: &str) -> Self {
        if message.contains(NULL_DEREFERENCE) {
            LookupError::StaleIntegration {
                detail: message.to_string(),
            }
        } else {
            LookupError::CollaboratorFailed {
                detail: message.to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_normalize_strips_punctuation() {
        assert_eq!(normalize_number("0812-3456 (789)"), "08123456789");
    }

    #[test]
    fn test_normalize_keeps_leading_plus() {
        assert_eq!(normalize_number("+62 812 345"), "+62812345");
    }

    #[test]
    fn test_normalize_drops_inner_plus() {
        assert_eq!(normalize_number("62+812+"), "62812");
        assert_eq!(normalize_number("  +62"), "+62");
    }

    #[test]
    fn test_normalize_drops_non_ascii_digits() {
        assert_eq!(normalize_number("٠٨١٢ 0812"), "0812");
        assert_eq!(normalize_number("abc"), "");
    }

    #[test]
    fn test_request_defaults_country() {
        let request = LookupRequest::new("0811", None, "ID");
        assert_eq!(request.country_code, "ID");
        let request = LookupRequest::new("0811", Some(" "), "ID");
        assert_eq!(request.country_code, "ID");
        let request = LookupRequest::new("0811", Some("MY"), "ID");
        assert_eq!(request.country_code, "MY");
    }

    #[test]
    fn test_projection_drops_extra_fields() {
        let profile: Profile = serde_json::from_str(
            r#"{"name":"A","phone_number":"0811","provider":"X","tags":["a"],"raw":{}}"#,
        )
        .unwrap();
        let result = LookupResult::from(profile);
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"name": "A", "phone_number": "0811", "provider": "X"})
        );
    }

    #[test]
    fn test_classify_null_dereference() {
        let err = LookupError::from_collaborator(
            "TypeError: Cannot read properties of null (reading 'textContent')",
        );
        assert!(matches!(err, LookupError::StaleIntegration { .. }));

        let err = LookupError::from_collaborator("Navigation timeout of 30000 ms exceeded");
        assert_eq!(
            err,
            LookupError::CollaboratorFailed {
                detail: "Navigation timeout of 30000 ms exceeded".to_string()
            }
        );
    }
}

//! Scanning extractor for flat server response bodies.
//!
//! Server responses are single-level objects of scalar fields. Instead of a
//! general JSON parser, fields are located by scanning for the quoted key and
//! reading up to the next structural delimiter. Nested objects and arrays are
//! not supported; the protocol never sends them.

use thiserror::Error;

/// Returned by [`extract_int_field`] when the key is absent or not numeric.
pub const INT_ABSENT: i64 = -1;

/// A response body that does not fit the protocol.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("response has no `{0}` field")]
    MissingField(&'static str),

    #[error("response field `{field}` has unexpected value `{value}`")]
    InvalidField { field: &'static str, value: String },
}

/// Return the raw text of `key`'s value, without surrounding quotes.
pub fn extract_field<'a>(body: &'a str, key: &str) -> Option<&'a str> {
    if key.is_empty() {
        return None;
    }
    let mut search_from = 0;
    while let Some(found) = body[search_from..].find(key) {
        let key_start = search_from + found;
        let key_end = key_start + key.len();
        search_from = key_end;

        // The key token must be quoted on both sides and followed by a colon,
        // otherwise this is a value or a longer key that happens to match.
        if key_start == 0 || !body[..key_start].ends_with('"') {
            continue;
        }
        let Some(after_key) = body[key_end..].strip_prefix('"') else {
            continue;
        };
        let Some(value) = after_key.trim_start().strip_prefix(':') else {
            continue;
        };
        return Some(read_value(value.trim_start()));
    }
    None
}

fn read_value(value: &str) -> &str {
    if let Some(quoted) = value.strip_prefix('"') {
        let end = quoted.find('"').unwrap_or(quoted.len());
        return &quoted[..end];
    }
    let end = value.find([',', '}', '"']).unwrap_or(value.len());
    value[..end].trim_end()
}

/// Parse the leading integer of `key`'s value, or [`INT_ABSENT`].
pub fn extract_int_field(body: &str, key: &str) -> i64 {
    let Some(value) = extract_field(body, key) else {
        return INT_ABSENT;
    };
    let digits_start = usize::from(value.starts_with('-') || value.starts_with('+'));
    let digits_len = value[digits_start..]
        .bytes()
        .take_while(u8::is_ascii_digit)
        .count();
    if digits_len == 0 {
        return INT_ABSENT;
    }
    value[..digits_start + digits_len]
        .parse()
        .unwrap_or(INT_ABSENT)
}

/// Parse `key`'s value as a boolean literal.
pub fn extract_bool_field(body: &str, key: &str) -> Option<bool> {
    match extract_field(body, key)? {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

/// Fields any protocol response may carry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerResponse {
    pub success: bool,
    pub session_id: Option<String>,
    pub resume_offset: Option<u64>,
    pub verified: Option<bool>,
}

impl ServerResponse {
    /// Extract the protocol fields from a response body.
    ///
    /// `success` is mandatory; the remaining fields are optional and a
    /// non-numeric or negative `resumeOffset` reads as absent.
    pub fn parse(body: &str) -> Result<Self, ProtocolError> {
        let success = match extract_field(body, "success") {
            None => return Err(ProtocolError::MissingField("success")),
            Some("true") => true,
            Some("false") => false,
            Some(other) => {
                return Err(ProtocolError::InvalidField {
                    field: "success",
                    value: other.to_string(),
                });
            }
        };

        let session_id = extract_field(body, "sessionId")
            .filter(|v| !v.is_empty() && *v != "null")
            .map(str::to_string);
        let resume_offset = u64::try_from(extract_int_field(body, "resumeOffset")).ok();
        let verified = extract_bool_field(body, "verified");

        Ok(Self {
            success,
            session_id,
            resume_offset,
            verified,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_field() {
        let body = r#"{"sessionId":"abc123","success":true}"#;
        assert_eq!(extract_field(body, "sessionId"), Some("abc123"));
        assert_eq!(extract_field(body, "success"), Some("true"));
        assert_eq!(extract_field(body, "missingKey"), None);
    }

    #[test]
    fn test_extract_field_empty_key() {
        assert_eq!(extract_field(r#"{"success":true}"#, ""), None);
        assert_eq!(extract_field(r#"{"":1}"#, ""), None);
        assert_eq!(extract_int_field(r#"{"success":true}"#, ""), INT_ABSENT);
    }

    #[test]
    fn test_extract_field_tolerates_whitespace() {
        let body = "{ \"sessionId\" :  \"abc 123\" ,\n  \"resumeOffset\" : 4096 }";
        assert_eq!(extract_field(body, "sessionId"), Some("abc 123"));
        assert_eq!(extract_field(body, "resumeOffset"), Some("4096"));
    }

    #[test]
    fn test_extract_field_skips_values_and_longer_keys() {
        let body = r#"{"note":"success","lastsessionId":"x","sessionId":"y","success":false}"#;
        assert_eq!(extract_field(body, "success"), Some("false"));
        assert_eq!(extract_field(body, "sessionId"), Some("y"));
    }

    #[test]
    fn test_extract_int_field() {
        assert_eq!(
            extract_int_field(r#"{"resumeOffset":4096}"#, "resumeOffset"),
            4096
        );
        assert_eq!(extract_int_field(r#"{"success":true}"#, "resumeOffset"), INT_ABSENT);
        assert_eq!(
            extract_int_field(r#"{"resumeOffset":"soon"}"#, "resumeOffset"),
            INT_ABSENT
        );
        assert_eq!(
            extract_int_field(r#"{"resumeOffset":"8192"}"#, "resumeOffset"),
            8192
        );
        assert_eq!(extract_int_field(r#"{"resumeOffset":12.5}"#, "resumeOffset"), 12);
    }

    #[test]
    fn test_extract_bool_field() {
        let body = r#"{"success":true,"verified":false,"other":1}"#;
        assert_eq!(extract_bool_field(body, "success"), Some(true));
        assert_eq!(extract_bool_field(body, "verified"), Some(false));
        assert_eq!(extract_bool_field(body, "other"), None);
    }

    #[test]
    fn test_server_response_parse() {
        let parsed =
            ServerResponse::parse(r#"{"success":true,"resumeOffset":16384}"#).unwrap();
        assert!(parsed.success);
        assert_eq!(parsed.resume_offset, Some(16384));
        assert_eq!(parsed.session_id, None);

        let parsed = ServerResponse::parse(r#"{"success":false,"resumeOffset":-1}"#).unwrap();
        assert!(!parsed.success);
        assert_eq!(parsed.resume_offset, None);

        assert_eq!(
            ServerResponse::parse("<html>502 Bad Gateway</html>"),
            Err(ProtocolError::MissingField("success"))
        );
        assert!(matches!(
            ServerResponse::parse(r#"{"success":"maybe"}"#),
            Err(ProtocolError::InvalidField { field: "success", .. })
        ));
    }
}

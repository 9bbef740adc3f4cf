//! Message encodings and their Connect content types.

/// The serialization format used for request and response messages.
///
/// JSON is the default for broader compatibility; protobuf is more compact
/// and cheaper to parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MessageEncoding {
    #[default]
    Json,
    Proto,
}

impl MessageEncoding {
    /// Short name, as used in tracing fields.
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageEncoding::Json => "json",
            MessageEncoding::Proto => "proto",
        }
    }

    /// `Content-Type` for unary requests and responses.
    pub fn unary_content_type(&self) -> &'static str {
        match self {
            MessageEncoding::Json => "application/json",
            MessageEncoding::Proto => "application/proto",
        }
    }

    /// `Content-Type` for streaming requests and responses.
    pub fn streaming_content_type(&self) -> &'static str {
        match self {
            MessageEncoding::Json => "application/connect+json",
            MessageEncoding::Proto => "application/connect+proto",
        }
    }

    /// Check a received `Content-Type` against the expected value,
    /// ignoring any parameters (e.g. `; charset=utf-8`).
    pub fn matches_content_type(expected: &str, received: &str) -> bool {
        let essence = received.split(';').next().unwrap_or("").trim();
        essence.eq_ignore_ascii_case(expected)
    }
}

impl std::fmt::Display for MessageEncoding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_types() {
        assert_eq!(MessageEncoding::Json.unary_content_type(), "application/json");
        assert_eq!(
            MessageEncoding::Proto.unary_content_type(),
            "application/proto"
        );
        assert_eq!(
            MessageEncoding::Json.streaming_content_type(),
            "application/connect+json"
        );
        assert_eq!(
            MessageEncoding::Proto.streaming_content_type(),
            "application/connect+proto"
        );
    }

    #[test]
    fn test_matches_content_type() {
        assert!(MessageEncoding::matches_content_type(
            "application/json",
            "application/json"
        ));
        assert!(MessageEncoding::matches_content_type(
            "application/json",
            "application/json; charset=utf-8"
        ));
        assert!(MessageEncoding::matches_content_type(
            "application/proto",
            "Application/Proto"
        ));
        assert!(!MessageEncoding::matches_content_type(
            "application/proto",
            "application/json"
        ));
    }
}

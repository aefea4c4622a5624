use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Username and password must not be empty")]
    EmptyCredentials,

    #[error("Login rejected: {0}")]
    InvalidCredentials(String),

    #[error("No access token stored - not logged in")]
    NoToken,

    #[error("Token refresh failed - session terminated")]
    RefreshFailed,

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Maximum length for error response bodies quoted in messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl ApiError {
    /// Truncate a response body to avoid dragging large payloads into logs.
    /// The cut lands on a char boundary so multi-byte bodies cannot panic.
    pub(crate) fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            return body.to_string();
        }
        let mut end = MAX_ERROR_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!(
            "{}... (truncated, {} total bytes)",
            &body[..end],
            body.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_body_leaves_short_bodies_alone() {
        assert_eq!(ApiError::truncate_body("token expired"), "token expired");
    }

    #[test]
    fn test_truncate_body_backs_off_to_a_char_boundary() {
        // 1 ascii byte followed by 250 two-byte chars = 501 bytes, with byte
        // 500 falling inside the final 'é'
        let body = format!("a{}", "é".repeat(250));
        let truncated = ApiError::truncate_body(&body);

        assert!(truncated.starts_with("aé"));
        assert!(truncated.ends_with("... (truncated, 501 total bytes)"));
        assert_eq!(truncated.find("..."), Some(499));
    }

    #[test]
    fn test_truncate_body_keeps_full_budget_for_ascii() {
        let body = "x".repeat(600);
        let truncated = ApiError::truncate_body(&body);
        assert_eq!(truncated.find("..."), Some(MAX_ERROR_BODY_LENGTH));
        assert!(truncated.ends_with("(truncated, 600 total bytes)"));
    }
}

use serde_json::Value;
use thiserror::Error;

/// No response was obtained at all (connect failure, timeout, broken body).
#[derive(Error, Debug, Clone)]
#[error("Network error for {url}: {message}")]
pub struct TransportError {
    pub url: String,
    pub message: String,
}

impl TransportError {
    pub fn new(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            message: message.into(),
        }
    }
}

/// Failure of one logical call through the `Dispatcher`.
#[derive(Error, Debug, Clone)]
pub enum DispatchError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("No route for {path} under any path or scheme variant")]
    RoutingExhausted { path: String },

    #[error("Unauthorized - every credential scheme was rejected for {path}")]
    AuthorizationExhausted { path: String },

    #[error("Request rejected with status {status}: {}", truncate_body(&payload_text(.payload)))]
    Application { status: u16, payload: Value },
}

impl DispatchError {
    /// The one error class that must escalate to a forced sign-out.
    pub fn is_authorization(&self) -> bool {
        matches!(self, DispatchError::AuthorizationExhausted { .. })
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, DispatchError::Transport(_))
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            DispatchError::Application { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// How the dispatcher treats a response status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    Success,
    /// 401 / 403: try another path or scheme
    Authorization,
    /// 404 / 405: the path shape probably does not match the backend's routing
    Routing,
    /// Anything else: surfaced to the caller as-is
    Application,
}

impl StatusClass {
    pub fn from_status(status: u16) -> Self {
        match status {
            200..=299 => StatusClass::Success,
            401 | 403 => StatusClass::Authorization,
            404 | 405 => StatusClass::Routing,
            _ => StatusClass::Application,
        }
    }
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

fn payload_text(payload: &Value) -> String {
    match payload {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Truncate a response body to avoid logging excessive data
pub(crate) fn truncate_body(body: &str) -> String {
    if body.len() <= MAX_ERROR_BODY_LENGTH {
        body.to_string()
    } else {
        let mut end = MAX_ERROR_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classes() {
        assert_eq!(StatusClass::from_status(204), StatusClass::Success);
        assert_eq!(StatusClass::from_status(401), StatusClass::Authorization);
        assert_eq!(StatusClass::from_status(403), StatusClass::Authorization);
        assert_eq!(StatusClass::from_status(404), StatusClass::Routing);
        assert_eq!(StatusClass::from_status(405), StatusClass::Routing);
        assert_eq!(StatusClass::from_status(422), StatusClass::Application);
        assert_eq!(StatusClass::from_status(500), StatusClass::Application);
    }

    #[test]
    fn test_truncate_body_respects_char_boundaries() {
        let body = "é".repeat(400);
        let truncated = truncate_body(&body);
        assert!(truncated.contains("truncated, 800 total bytes"));
    }

    #[test]
    fn test_application_error_message() {
        let err = DispatchError::Application {
            status: 422,
            payload: serde_json::json!({"name": ["required"]}),
        };
        assert_eq!(err.status(), Some(422));
        assert!(err.to_string().contains("422"));
        assert!(!err.is_authorization());
    }
}

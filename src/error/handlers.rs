//! Standardized mapping of HTTP statuses, network failures and tool output to [`MirrorError`]

use crate::error::MirrorError;
use reqwest::StatusCode;

/// Markers that upstream registries and copy tools use to signal throttling
const RATE_LIMIT_MARKERS: &[&str] = &["toomanyrequests", "too many requests"];

/// Standard error handler for HTTP responses
pub struct HttpErrorHandler;

impl HttpErrorHandler {
    /// Handle registry-related HTTP errors
    pub fn handle_registry_error(status: StatusCode, error_text: &str, operation: &str) -> MirrorError {
        let code = status.as_u16();
        let message = match code {
            401 => format!("Unauthorized to perform {}: {}", operation, error_text),
            403 => format!("Forbidden: insufficient permissions for {}: {}", operation, error_text),
            404 => format!("Resource not found for {}: {}", operation, error_text),
            429 => return MirrorError::RateLimited(format!("{}: {}", operation, error_text)),
            500 => format!("Registry server error during {}: {}", operation, error_text),
            502 | 503 => format!("Registry unavailable for {}: {}", operation, error_text),
            504 => return MirrorError::Timeout(format!("Gateway timeout during {}", operation)),
            _ => format!("{} failed: {}", operation, error_text),
        };

        MirrorError::Registry { status: code, message }
    }

    /// Handle authentication-related HTTP errors
    pub fn handle_auth_error(status: StatusCode, error_text: &str) -> MirrorError {
        let message = match status.as_u16() {
            400 => "Invalid login request parameters".to_string(),
            401 => "Invalid credentials provided".to_string(),
            403 => "Access denied - account may require two-factor token".to_string(),
            429 => return MirrorError::RateLimited(format!("login: {}", error_text)),
            _ => format!("Authentication failed (status {}): {}", status, error_text),
        };

        MirrorError::Auth(message)
    }
}

/// Network error categorization and handling
pub struct NetworkErrorHandler;

impl NetworkErrorHandler {
    /// Categorize and format network errors with helpful context
    pub fn handle_network_error(error: &reqwest::Error, context: &str) -> MirrorError {
        if let Some(status) = error.status() {
            return HttpErrorHandler::handle_registry_error(status, &error.to_string(), context);
        }

        if error.is_timeout() {
            MirrorError::Timeout(format!("{} timeout: {}", context, error))
        } else if error.is_connect() {
            MirrorError::Network(format!("Connection error during {}: {}", context, error))
        } else if error.is_decode() {
            MirrorError::Parse(format!("Malformed response during {}: {}", context, error))
        } else if error.to_string().contains("certificate") {
            MirrorError::Network(format!("TLS certificate error during {}: {}", context, error))
        } else {
            MirrorError::Network(format!("{} network error: {}", context, error))
        }
    }
}

/// Classification of external copy tool failures
pub struct ToolErrorHandler;

impl ToolErrorHandler {
    /// True when the tool output carries an upstream throttling signal
    pub fn is_rate_limited(output: &str) -> bool {
        let lower = output.to_lowercase();
        RATE_LIMIT_MARKERS.iter().any(|marker| lower.contains(marker))
            || lower
                .split(|c: char| !c.is_ascii_alphanumeric())
                .any(|word| word == "429")
    }

    /// Turn a failed tool invocation into an error, keeping the last few output lines
    pub fn handle_tool_failure(tool: &str, exit_code: Option<i32>, output: &str) -> MirrorError {
        if Self::is_rate_limited(output) {
            return MirrorError::RateLimited(format!("{} reported: {}", tool, Self::tail(output)));
        }

        let code = exit_code.map_or_else(|| "signal".to_string(), |c| c.to_string());
        MirrorError::Transfer(format!("{} exited with {}: {}", tool, code, Self::tail(output)))
    }

    fn tail(output: &str) -> String {
        let lines: Vec<&str> = output.lines().filter(|l| !l.trim().is_empty()).collect();
        let start = lines.len().saturating_sub(3);
        lines[start..].join(" | ")
    }
}

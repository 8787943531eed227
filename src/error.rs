//! Error types for the TweekIT MCP server

use thiserror::Error;

/// Result type alias for the TweekIT MCP server
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the TweekIT MCP server
#[derive(Error, Debug)]
pub enum Error {
    /// API key and/or secret missing from both the call and the environment
    #[error("Missing TweekIT API credentials: {}", fields.join(", "))]
    MissingCredentials { fields: Vec<&'static str> },

    /// URL scheme other than http/https
    #[error("Unsupported URL scheme: {scheme}")]
    UnsupportedScheme { scheme: String },

    /// URL could not be parsed
    #[error("Invalid URL: {reason}")]
    InvalidUrl { reason: String },

    /// Caller-supplied request header could not be used
    #[error("Invalid request header: {name}")]
    InvalidHeader { name: String },

    /// Transport-level failure (DNS, connect, timeout)
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Transport-level failure outside reqwest (name resolution, redirect handling)
    #[error("Network error: {reason}")]
    Transport { reason: String },

    /// Non-2xx status while downloading remote content
    #[error("Remote server returned HTTP {status}")]
    RemoteStatus { status: u16, detail: Option<String> },

    /// Non-2xx status from the upstream conversion service
    #[error("HTTP {status} from TweekIT")]
    UpstreamStatus { status: u16, detail: Option<String> },

    /// Remote content had a zero-length body
    #[error("Downloaded content was empty")]
    EmptyContent,

    /// No input extension could be determined
    #[error("Could not determine input extension: {reason}")]
    Resolution { reason: String },

    /// Response content type matched no known classification
    #[error("Unsupported content type in response: '{content_type}'")]
    UnsupportedContentType { content_type: String },

    /// Base64 decode error
    #[error("Invalid base64 data: {0}")]
    Base64Decode(#[from] base64::DecodeError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Path access denied (outside allowed resource directories)
    #[error("Path access denied: {path}")]
    PathAccessDenied { path: String },

    /// SSRF blocked (URL resolves to private/reserved IP)
    #[error("SSRF blocked: {url}")]
    SsrfBlocked { url: String },

    /// Download too large
    #[error("Download too large: {size} bytes (max: {max_size} bytes)")]
    DownloadTooLarge { size: u64, max_size: u64 },

    /// Anything else
    #[error("Unexpected error: {reason}")]
    Unexpected { reason: String },
}

impl Error {
    /// Stable snake_case tag identifying the error class.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::MissingCredentials { .. } => "credential_error",
            Error::UnsupportedScheme { .. } => "scheme_error",
            Error::InvalidUrl { .. } | Error::InvalidHeader { .. } => "invalid_request",
            Error::Network(_) | Error::Transport { .. } => "network_error",
            Error::RemoteStatus { .. } | Error::UpstreamStatus { .. } => "upstream_status_error",
            Error::EmptyContent => "empty_content",
            Error::Resolution { .. } => "resolution_error",
            Error::UnsupportedContentType { .. } => "content_type_error",
            Error::Base64Decode(_) => "invalid_request",
            Error::PathAccessDenied { .. } | Error::SsrfBlocked { .. } => "access_denied",
            Error::DownloadTooLarge { .. } => "download_too_large",
            Error::Io(_) | Error::Serialization(_) | Error::Unexpected { .. } => {
                "unexpected_error"
            }
        }
    }

    /// Upstream-derived detail carried by HTTP-status errors.
    pub fn detail(&self) -> Option<&str> {
        match self {
            Error::RemoteStatus { detail, .. } | Error::UpstreamStatus { detail, .. } => {
                detail.as_deref()
            }
            _ => None,
        }
    }

    /// Return a sanitized error message safe to send to clients.
    /// Network and library failures are reported generically; status errors
    /// keep the status code. Full details should be logged via tracing first.
    pub fn client_message(&self) -> String {
        match self {
            Error::MissingCredentials { fields } => {
                format!("Missing TweekIT API credentials: {}", fields.join(", "))
            }
            Error::UnsupportedScheme { .. } => {
                "Unsupported URL scheme. Use http or https.".to_string()
            }
            Error::InvalidUrl { .. } => "Invalid URL".to_string(),
            Error::InvalidHeader { name } => format!("Invalid request header: {}", name),
            Error::Network(_) | Error::Transport { .. } => "Network error".to_string(),
            Error::RemoteStatus { status, .. } => {
                format!("Failed to download remote content. Status: {}", status)
            }
            Error::UpstreamStatus { status, .. } => format!("HTTP {} from TweekIT", status),
            Error::EmptyContent => "Downloaded content was empty.".to_string(),
            Error::Resolution { reason } => {
                format!("Could not determine input extension: {}", reason)
            }
            Error::UnsupportedContentType { content_type } => {
                format!("Unsupported content type in response: '{}'", content_type)
            }
            Error::Base64Decode(_) => "Invalid base64 data".to_string(),
            Error::Io(_) => "I/O error".to_string(),
            Error::Serialization(_) => "Serialization error".to_string(),
            Error::PathAccessDenied { .. } => "Access denied".to_string(),
            Error::SsrfBlocked { .. } => "URL not allowed".to_string(),
            Error::DownloadTooLarge { max_size, .. } => {
                format!("Download exceeds maximum size of {} bytes", max_size)
            }
            Error::Unexpected { .. } => "An unexpected error occurred".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_credentials_names_fields() {
        let err = Error::MissingCredentials {
            fields: vec!["apiKey", "apiSecret"],
        };
        assert_eq!(err.kind(), "credential_error");
        assert_eq!(
            err.client_message(),
            "Missing TweekIT API credentials: apiKey, apiSecret"
        );
    }

    #[test]
    fn test_status_errors_carry_detail() {
        let err = Error::UpstreamStatus {
            status: 500,
            detail: Some("bad input".to_string()),
        };
        assert_eq!(err.detail(), Some("bad input"));
        assert_eq!(err.client_message(), "HTTP 500 from TweekIT");

        let err = Error::RemoteStatus {
            status: 404,
            detail: None,
        };
        assert_eq!(err.detail(), None);
        assert_eq!(
            err.client_message(),
            "Failed to download remote content. Status: 404"
        );
    }

    #[test]
    fn test_scheme_error_message() {
        let err = Error::UnsupportedScheme {
            scheme: "ftp".to_string(),
        };
        assert_eq!(err.kind(), "scheme_error");
        assert!(err.client_message().contains("http or https"));
    }

    #[test]
    fn test_transport_error_is_network_error() {
        let err = Error::Transport {
            reason: "DNS resolution failed for no-such-host.invalid".to_string(),
        };
        assert_eq!(err.kind(), "network_error");
        assert_eq!(err.client_message(), "Network error");
    }

    #[test]
    fn test_unexpected_error_hides_reason() {
        let err = Error::Unexpected {
            reason: "panic in worker at 10.0.0.3".to_string(),
        };
        assert!(!err.client_message().contains("10.0.0.3"));
    }
}

//! Upstream response classification
//!
//! Maps an HTTP response (status, headers, body) to exactly one
//! [`ConversionResult`] variant. Classification is pure so it can be tested
//! without a network; only the response readers touch I/O.

use super::extension::{media_type, normalize_extension, UNKNOWN_EXTENSION};
use super::request::RequestEcho;
use crate::error::Error;
use futures_util::StreamExt;
use serde::Serialize;
use serde_json::{Map, Value};

/// Header name prefixes the upstream service uses for debug hints
const DEBUG_HEADER_PREFIXES: &[&str] = &["x-mediagen", "x-tweekit"];

/// Most bytes of an error body kept for detail extraction
pub const ERROR_BODY_LIMIT: usize = 64 * 1024;

/// A fully-read HTTP response
#[derive(Debug, Clone, Default)]
pub struct UpstreamResponse {
    pub status: u16,
    /// Header names are stored lowercase
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl UpstreamResponse {
    pub fn new(status: u16, headers: Vec<(String, String)>, body: Vec<u8>) -> Self {
        let headers = headers
            .into_iter()
            .map(|(name, value)| (name.to_ascii_lowercase(), value))
            .collect();
        Self {
            status,
            headers,
            body,
        }
    }

    /// Capture status, headers and body from a reqwest response.
    pub async fn read(response: reqwest::Response) -> crate::error::Result<Self> {
        let status = response.status().as_u16();
        let headers = Self::collect_headers(&response);
        let body = response.bytes().await?.to_vec();
        Ok(Self::new(status, headers, body))
    }

    /// Like [`read`](Self::read), but keeps at most `limit` body bytes and
    /// stops reading once that many have arrived. Used for error bodies.
    pub async fn read_limited(
        response: reqwest::Response,
        limit: usize,
    ) -> crate::error::Result<Self> {
        let status = response.status().as_u16();
        let headers = Self::collect_headers(&response);

        let mut body = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            let room = limit.saturating_sub(body.len());
            body.extend_from_slice(&chunk[..chunk.len().min(room)]);
            if body.len() >= limit {
                break;
            }
        }
        Ok(Self::new(status, headers, body))
    }

    fn collect_headers(response: &reqwest::Response) -> Vec<(String, String)> {
        response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        let name = name.to_ascii_lowercase();
        self.headers
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).to_string()
    }
}

/// Structured error returned in place of a converted document
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorPayload {
    pub error: String,
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request: Option<RequestEcho>,
}

impl ErrorPayload {
    pub fn new(kind: &str, error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            kind: kind.to_string(),
            details: None,
            request: None,
        }
    }

    pub fn with_details(mut self, details: Option<String>) -> Self {
        self.details = details;
        self
    }

    pub fn with_request(mut self, request: Option<RequestEcho>) -> Self {
        self.request = request;
        self
    }
}

impl From<&Error> for ErrorPayload {
    fn from(err: &Error) -> Self {
        ErrorPayload::new(err.kind(), err.client_message())
            .with_details(err.detail().map(str::to_string))
    }
}

/// Outcome of one conversion
#[derive(Debug, Clone, PartialEq)]
pub enum ConversionResult {
    Image { data: Vec<u8>, format: String },
    File { data: Vec<u8>, format: String },
    Json(Value),
    Error(ErrorPayload),
}

impl ConversionResult {
    pub fn is_error(&self) -> bool {
        matches!(self, ConversionResult::Error(_))
    }
}

impl From<Error> for ConversionResult {
    fn from(err: Error) -> Self {
        ConversionResult::Error(ErrorPayload::from(&err))
    }
}

/// Classify a conversion response.
///
/// `outfmt` is the requested output format; it labels generic binary
/// responses. `request` is echoed on HTTP error statuses.
pub fn classify(
    response: &UpstreamResponse,
    outfmt: &str,
    request: Option<RequestEcho>,
) -> ConversionResult {
    if !response.is_success() {
        let err = Error::UpstreamStatus {
            status: response.status,
            detail: extract_error_detail(response),
        };
        tracing::warn!(
            status = response.status,
            detail = err.detail().unwrap_or_default(),
            "TweekIT convert error"
        );
        return ConversionResult::Error(ErrorPayload::from(&err).with_request(request));
    }

    let raw_content_type = response.content_type().unwrap_or_default();
    let essence = media_type(raw_content_type);
    let requested = normalize_extension(outfmt);

    if let Some(subtype) = essence.strip_prefix("image/") {
        return ConversionResult::Image {
            data: response.body.clone(),
            format: subtype.to_string(),
        };
    }

    let ambiguous = essence.is_empty() || essence == mime::APPLICATION_OCTET_STREAM.essence_str();
    if essence == mime::APPLICATION_PDF.essence_str() || (requested == "pdf" && ambiguous) {
        return ConversionResult::File {
            data: response.body.clone(),
            format: "pdf".to_string(),
        };
    }

    if essence.contains("json") {
        if let Ok(value) = serde_json::from_slice::<Value>(&response.body) {
            return ConversionResult::Json(value);
        }
    }

    if essence.starts_with("application/") {
        let format = if requested.is_empty() {
            UNKNOWN_EXTENSION.to_string()
        } else {
            requested
        };
        return ConversionResult::File {
            data: response.body.clone(),
            format,
        };
    }

    if let Some(detail) = extract_error_detail(response) {
        return ConversionResult::Error(ErrorPayload::new("content_type_error", detail));
    }

    let content_type = if raw_content_type.is_empty() {
        "unknown".to_string()
    } else {
        raw_content_type.to_string()
    };
    Error::UnsupportedContentType { content_type }.into()
}

/// Classify content retrieved by the `fetch` tool. There is no requested
/// output format here, so other binaries are labelled [`UNKNOWN_EXTENSION`].
pub fn classify_fetched(
    url: &str,
    status: u16,
    content_type: Option<&str>,
    data: Vec<u8>,
) -> ConversionResult {
    let raw = content_type.unwrap_or_default().to_lowercase();
    let essence = media_type(&raw);

    if let Some(subtype) = essence.strip_prefix("image/") {
        return ConversionResult::Image {
            format: subtype.to_string(),
            data,
        };
    }
    if essence == mime::APPLICATION_PDF.essence_str() {
        return ConversionResult::File {
            data,
            format: "pdf".to_string(),
        };
    }
    if essence.starts_with("text/") || essence.contains("json") {
        return ConversionResult::Json(serde_json::json!({
            "url": url,
            "status": status,
            "content_type": raw,
            "text": String::from_utf8_lossy(&data),
        }));
    }
    ConversionResult::File {
        format: UNKNOWN_EXTENSION.to_string(),
        data,
    }
}

/// Read at most `limit` bytes of a failed response and extract its detail.
pub async fn read_error_detail(
    response: reqwest::Response,
    limit: usize,
) -> crate::error::Result<Option<String>> {
    let failed = UpstreamResponse::read_limited(response, limit).await?;
    Ok(extract_error_detail(&failed))
}

/// Pull a human-usable error description out of a response.
///
/// JSON objects yield their `message`/`error` field, or the whole object
/// (with vendor debug headers under `debugHeaders`) when neither is set.
/// JSON arrays are serialized; anything else is the trimmed body text.
pub fn extract_error_detail(response: &UpstreamResponse) -> Option<String> {
    let hints: Map<String, Value> = response
        .headers
        .iter()
        .filter(|(name, _)| {
            DEBUG_HEADER_PREFIXES
                .iter()
                .any(|prefix| name.starts_with(prefix))
        })
        .map(|(name, value)| (name.clone(), Value::String(value.clone())))
        .collect();

    match serde_json::from_slice::<Value>(&response.body) {
        Ok(Value::Object(mut obj)) => {
            let message = ["message", "error"]
                .iter()
                .find_map(|field| obj.get(*field).and_then(detail_string));
            if let Some(message) = message {
                return Some(message);
            }
            if !hints.is_empty() {
                obj.insert("debugHeaders".to_string(), Value::Object(hints));
            }
            return Some(Value::Object(obj).to_string());
        }
        Ok(array @ Value::Array(_)) => return Some(array.to_string()),
        _ => {}
    }

    let text = response.text().trim().to_string();
    if !text.is_empty() {
        return Some(text);
    }
    if !hints.is_empty() {
        return Some(Value::Object(hints).to_string());
    }
    None
}

/// Non-empty string form of a detail field; null, false and "" are skipped.
fn detail_string(value: &Value) -> Option<String> {
    match value {
        Value::Null | Value::Bool(false) => None,
        Value::String(s) if s.trim().is_empty() => None,
        Value::String(s) => Some(s.clone()),
        Value::Object(o) if o.is_empty() => None,
        Value::Array(a) if a.is_empty() => None,
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn response(status: u16, content_type: Option<&str>, body: &[u8]) -> UpstreamResponse {
        let headers = content_type
            .map(|ct| vec![("Content-Type".to_string(), ct.to_string())])
            .unwrap_or_default();
        UpstreamResponse::new(status, headers, body.to_vec())
    }

    #[test]
    fn test_image_response() {
        let resp = response(200, Some("image/webp"), b"RIFFxxxx");
        assert_eq!(
            classify(&resp, "webp", None),
            ConversionResult::Image {
                data: b"RIFFxxxx".to_vec(),
                format: "webp".to_string()
            }
        );
    }

    #[test]
    fn test_image_subtype_drops_parameters() {
        let resp = response(200, Some("Image/PNG; charset=binary"), b"png");
        match classify(&resp, "png", None) {
            ConversionResult::Image { format, .. } => assert_eq!(format, "png"),
            other => panic!("expected image, got {other:?}"),
        }
    }

    #[test]
    fn test_pdf_response() {
        let resp = response(200, Some("application/pdf"), b"%PDF-1.7");
        assert_eq!(
            classify(&resp, "png", None),
            ConversionResult::File {
                data: b"%PDF-1.7".to_vec(),
                format: "pdf".to_string()
            }
        );
    }

    #[test]
    fn test_ambiguous_response_for_pdf_request() {
        let resp = response(200, None, b"%PDF-1.7");
        match classify(&resp, ".PDF", None) {
            ConversionResult::File { format, .. } => assert_eq!(format, "pdf"),
            other => panic!("expected file, got {other:?}"),
        }
    }

    #[test]
    fn test_json_response_is_parsed() {
        let resp = response(200, Some("application/json"), br#"{"a":1}"#);
        assert_eq!(classify(&resp, "txt", None), ConversionResult::Json(json!({"a": 1})));
    }

    #[test]
    fn test_invalid_json_falls_through_to_file() {
        let resp = response(200, Some("application/json"), b"{oops");
        match classify(&resp, "TXT", None) {
            ConversionResult::File { format, .. } => assert_eq!(format, "txt"),
            other => panic!("expected file, got {other:?}"),
        }
    }

    #[test]
    fn test_octet_stream_uses_requested_format() {
        let resp = response(200, Some("application/octet-stream"), b"\x00\x01");
        match classify(&resp, "docx", None) {
            ConversionResult::File { format, .. } => assert_eq!(format, "docx"),
            other => panic!("expected file, got {other:?}"),
        }

        match classify(&resp, "", None) {
            ConversionResult::File { format, .. } => assert_eq!(format, "bin"),
            other => panic!("expected file, got {other:?}"),
        }
    }

    #[test]
    fn test_text_body_surfaces_as_error() {
        let resp = response(200, Some("text/plain"), b"  license expired \n");
        match classify(&resp, "png", None) {
            ConversionResult::Error(payload) => {
                assert_eq!(payload.error, "license expired");
                assert_eq!(payload.kind, "content_type_error");
            }
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[test]
    fn test_unsupported_content_type() {
        let resp = response(200, Some("text/plain"), b"");
        match classify(&resp, "png", None) {
            ConversionResult::Error(payload) => assert_eq!(
                payload.error,
                "Unsupported content type in response: 'text/plain'"
            ),
            other => panic!("expected error, got {other:?}"),
        }

        let resp = response(200, None, b"");
        match classify(&resp, "png", None) {
            ConversionResult::Error(payload) => assert_eq!(
                payload.error,
                "Unsupported content type in response: 'unknown'"
            ),
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[test]
    fn test_status_error_with_message() {
        let resp = response(500, Some("application/json"), br#"{"message":"bad input"}"#);
        let echo = RequestEcho {
            doc_data_type: "png".to_string(),
            fmt: "webp".to_string(),
        };
        match classify(&resp, "webp", Some(echo.clone())) {
            ConversionResult::Error(payload) => {
                assert_eq!(payload.error, "HTTP 500 from TweekIT");
                assert_eq!(payload.kind, "upstream_status_error");
                assert_eq!(payload.details.as_deref(), Some("bad input"));
                assert_eq!(payload.request, Some(echo));
            }
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[test]
    fn test_status_error_ignores_image_content_type() {
        let resp = response(422, Some("image/png"), b"Unsupported page");
        let result = classify(&resp, "png", None);
        assert!(result.is_error());
    }

    #[test]
    fn test_detail_prefers_error_field() {
        let resp = response(400, None, br#"{"error":"no such format","code":7}"#);
        assert_eq!(extract_error_detail(&resp).as_deref(), Some("no such format"));
    }

    #[test]
    fn test_detail_merges_debug_headers() {
        let resp = UpstreamResponse::new(
            400,
            vec![
                ("X-TweekIT-Trace".to_string(), "abc".to_string()),
                ("X-Other".to_string(), "ignored".to_string()),
            ],
            br#"{"code":7}"#.to_vec(),
        );
        let detail: Value = serde_json::from_str(&extract_error_detail(&resp).unwrap()).unwrap();
        assert_eq!(
            detail,
            json!({"code": 7, "debugHeaders": {"x-tweekit-trace": "abc"}})
        );
    }

    #[test]
    fn test_detail_from_array_and_headers_only() {
        let resp = response(400, None, br#"["a","b"]"#);
        assert_eq!(extract_error_detail(&resp).as_deref(), Some(r#"["a","b"]"#));

        let resp = UpstreamResponse::new(
            502,
            vec![("x-mediagen-error".to_string(), "timeout".to_string())],
            Vec::new(),
        );
        assert_eq!(
            extract_error_detail(&resp).as_deref(),
            Some(r#"{"x-mediagen-error":"timeout"}"#)
        );

        let resp = response(502, None, b"   ");
        assert_eq!(extract_error_detail(&resp), None);
    }

    #[test]
    fn test_fetched_image_and_pdf() {
        let result = classify_fetched("https://a.test/x", 200, Some("image/gif"), b"GIF".to_vec());
        assert_eq!(
            result,
            ConversionResult::Image {
                data: b"GIF".to_vec(),
                format: "gif".to_string()
            }
        );

        let result = classify_fetched(
            "https://a.test/x",
            200,
            Some("application/pdf; qs=0.001"),
            b"%PDF".to_vec(),
        );
        assert!(matches!(result, ConversionResult::File { ref format, .. } if format == "pdf"));
    }

    #[test]
    fn test_fetched_text_has_metadata() {
        let result = classify_fetched(
            "https://a.test/page",
            200,
            Some("Text/HTML; charset=UTF-8"),
            b"<p>hi</p>".to_vec(),
        );
        assert_eq!(
            result,
            ConversionResult::Json(json!({
                "url": "https://a.test/page",
                "status": 200,
                "content_type": "text/html; charset=utf-8",
                "text": "<p>hi</p>",
            }))
        );
    }

    #[test]
    fn test_fetched_binary_fallback() {
        let result = classify_fetched(
            "https://a.test/archive.zip",
            200,
            Some("application/octet-stream"),
            b"PK".to_vec(),
        );
        assert!(matches!(result, ConversionResult::File { ref format, .. } if format == "bin"));

        let result = classify_fetched("https://a.test/blob", 200, None, b"??".to_vec());
        assert!(matches!(result, ConversionResult::File { ref format, .. } if format == "bin"));
    }

    #[test]
    fn test_error_payload_serialization() {
        let payload = ErrorPayload::new("network_error", "Network error");
        assert_eq!(
            serde_json::to_value(&payload).unwrap(),
            json!({"error": "Network error", "kind": "network_error"})
        );
    }
}

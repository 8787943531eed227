//! Conversion request building and response classification

pub mod classify;
pub mod extension;
pub mod request;

pub use classify::{
    classify, classify_fetched, extract_error_detail, read_error_detail, ConversionResult,
    ErrorPayload, UpstreamResponse, ERROR_BODY_LIMIT,
};
pub use extension::{
    mime_for_extension, normalize_extension, require_extension, resolve_extension,
    resolve_extension_or_bin, UNKNOWN_EXTENSION,
};
pub use request::{parse_color, ConversionOptions, ConversionRequest, RequestEcho};

//! Extension token normalization and inference

use crate::error::{Error, Result};
use mime::Mime;
use std::path::Path;

/// Token used when nothing more specific can be determined
pub const UNKNOWN_EXTENSION: &str = "bin";

const EXTENSION_ALIASES: &[(&str, &str)] = &[
    ("jpeg", "jpg"),
    ("jpe", "jpg"),
    ("tif", "tiff"),
    ("htm", "html"),
];

/// MIME essence to preferred extension. The first entry for an extension
/// is also its canonical MIME type.
const MIME_EXTENSIONS: &[(&str, &str)] = &[
    ("application/pdf", "pdf"),
    ("application/json", "json"),
    ("application/xml", "xml"),
    ("application/zip", "zip"),
    ("application/rtf", "rtf"),
    ("application/postscript", "ps"),
    ("application/octet-stream", "bin"),
    ("application/msword", "doc"),
    ("application/vnd.ms-excel", "xls"),
    ("application/vnd.ms-powerpoint", "ppt"),
    (
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "docx",
    ),
    (
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "xlsx",
    ),
    (
        "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        "pptx",
    ),
    ("application/vnd.oasis.opendocument.text", "odt"),
    ("application/vnd.oasis.opendocument.spreadsheet", "ods"),
    ("application/vnd.oasis.opendocument.presentation", "odp"),
    ("application/epub+zip", "epub"),
    ("image/png", "png"),
    ("image/jpeg", "jpg"),
    ("image/pjpeg", "jpg"),
    ("image/gif", "gif"),
    ("image/webp", "webp"),
    ("image/tiff", "tiff"),
    ("image/bmp", "bmp"),
    ("image/x-ms-bmp", "bmp"),
    ("image/svg+xml", "svg"),
    ("image/x-icon", "ico"),
    ("image/vnd.microsoft.icon", "ico"),
    ("image/heic", "heic"),
    ("image/heif", "heif"),
    ("image/avif", "avif"),
    ("image/vnd.adobe.photoshop", "psd"),
    ("text/plain", "txt"),
    ("text/html", "html"),
    ("text/csv", "csv"),
    ("text/markdown", "md"),
    ("text/xml", "xml"),
    ("text/rtf", "rtf"),
];

/// Normalize an extension: trim, lowercase, strip leading dots, apply aliases.
/// Returns an empty string when nothing is left.
pub fn normalize_extension(ext: &str) -> String {
    let normalized = ext.trim().to_lowercase();
    let normalized = normalized.trim_start_matches('.');
    EXTENSION_ALIASES
        .iter()
        .find(|(alias, _)| *alias == normalized)
        .map(|(_, canonical)| canonical.to_string())
        .unwrap_or_else(|| normalized.to_string())
}

/// Strip parameters from a content type and lowercase it ("image/png; q=1" -> "image/png").
pub fn media_type(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_lowercase()
}

/// Guess an extension from a MIME type using the known table.
pub fn extension_for_mime(content_type: &str) -> Option<&'static str> {
    let essence = media_type(content_type);
    let essence = match essence.parse::<Mime>() {
        Ok(mime) => mime.essence_str().to_string(),
        Err(_) => essence,
    };
    MIME_EXTENSIONS
        .iter()
        .find(|(mime, _)| *mime == essence)
        .map(|(_, ext)| *ext)
}

/// Canonical MIME type for an extension token, `application/octet-stream` if unknown.
pub fn mime_for_extension(ext: &str) -> &'static str {
    let ext = normalize_extension(ext);
    MIME_EXTENSIONS
        .iter()
        .find(|(_, e)| *e == ext)
        .map(|(mime, _)| *mime)
        .unwrap_or("application/octet-stream")
}

/// Extension of the last path segment of a URL, or of a plain path.
fn path_suffix(url_or_path: &str) -> String {
    let path = match url::Url::parse(url_or_path) {
        Ok(url) if url.scheme().len() > 1 => url.path().to_string(),
        // Single-letter "schemes" are Windows drive letters
        _ => url_or_path.to_string(),
    };
    Path::new(&path)
        .extension()
        .map(|ext| normalize_extension(&ext.to_string_lossy()))
        .unwrap_or_default()
}

/// Infer an extension from a content type: table lookup, then the subtype.
fn content_type_extension(content_type: &str) -> Option<String> {
    if let Some(ext) = extension_for_mime(content_type) {
        return Some(normalize_extension(ext));
    }
    let essence = media_type(content_type);
    let (_, subtype) = essence.rsplit_once('/')?;
    let subtype = normalize_extension(subtype);
    (!subtype.is_empty()).then_some(subtype)
}

/// Resolve the input extension. Priority: override, URL/path suffix,
/// content type. `None` when nothing resolves.
pub fn resolve_extension(
    url_or_path: &str,
    override_ext: Option<&str>,
    content_type: Option<&str>,
) -> Option<String> {
    if let Some(candidate) = override_ext.map(normalize_extension) {
        if !candidate.is_empty() {
            return Some(candidate);
        }
    }

    let suffix = path_suffix(url_or_path);
    if !suffix.is_empty() {
        return Some(suffix);
    }

    content_type.and_then(content_type_extension)
}

/// Lenient resolution: falls back to [`UNKNOWN_EXTENSION`].
pub fn resolve_extension_or_bin(
    url_or_path: &str,
    override_ext: Option<&str>,
    content_type: Option<&str>,
) -> String {
    resolve_extension(url_or_path, override_ext, content_type)
        .unwrap_or_else(|| UNKNOWN_EXTENSION.to_string())
}

/// Strict resolution for call sites that need a concrete input type.
pub fn require_extension(
    url_or_path: &str,
    override_ext: Option<&str>,
    content_type: Option<&str>,
) -> Result<String> {
    resolve_extension(url_or_path, override_ext, content_type).ok_or_else(|| Error::Resolution {
        reason: format!("no extension found for '{}'; pass inext explicitly", url_or_path),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("JPEG", "jpg")]
    #[case(".TIF", "tiff")]
    #[case("  .htm ", "html")]
    #[case("jpe", "jpg")]
    #[case("..PNG", "png")]
    #[case("docx", "docx")]
    #[case("", "")]
    #[case(".", "")]
    fn test_normalize_extension(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(normalize_extension(input), expected);
    }

    #[rstest]
    #[case("JPEG")]
    #[case(".TIF")]
    #[case("Htm")]
    #[case("webp")]
    fn test_normalize_is_idempotent(#[case] input: &str) {
        let once = normalize_extension(input);
        assert_eq!(normalize_extension(&once), once);
    }

    #[rstest]
    #[case("https://example.com/a.png", Some("image/gif"))]
    #[case("https://example.com/download?id=1", None)]
    #[case("/tmp/report", Some("application/pdf"))]
    fn test_override_always_wins(#[case] url: &str, #[case] content_type: Option<&str>) {
        assert_eq!(
            resolve_extension(url, Some(".JPEG"), content_type),
            Some("jpg".to_string())
        );
    }

    #[test]
    fn test_blank_override_is_ignored() {
        assert_eq!(
            resolve_extension("https://example.com/file.pdf", Some("  "), None),
            Some("pdf".to_string())
        );
    }

    #[test]
    fn test_url_suffix_beats_content_type() {
        assert_eq!(
            resolve_extension(
                "https://example.com/files/Photo.TIF?size=large#top",
                None,
                Some("image/png")
            ),
            Some("tiff".to_string())
        );
    }

    #[test]
    fn test_query_string_is_not_a_suffix() {
        assert_eq!(
            resolve_extension("https://example.com/download?name=a.pdf", None, None),
            None
        );
    }

    #[test]
    fn test_plain_path_suffix() {
        assert_eq!(
            resolve_extension("/home/user/scan.jpeg", None, None),
            Some("jpg".to_string())
        );
        assert_eq!(resolve_extension("/home/user/.bashrc", None, None), None);
    }

    #[rstest]
    #[case("image/png", "png")]
    #[case("image/jpeg; charset=binary", "jpg")]
    #[case("Application/PDF", "pdf")]
    #[case("text/plain; charset=utf-8", "txt")]
    #[case("image/x-portable-pixmap", "x-portable-pixmap")]
    #[case("application/vnd.custom", "vnd.custom")]
    fn test_content_type_fallback(#[case] content_type: &str, #[case] expected: &str) {
        assert_eq!(
            resolve_extension("https://example.com/download", None, Some(content_type)),
            Some(expected.to_string())
        );
    }

    #[test]
    fn test_lenient_and_strict_resolution() {
        assert_eq!(
            resolve_extension_or_bin("https://example.com/blob", None, None),
            UNKNOWN_EXTENSION
        );
        let err = require_extension("/tmp/blob", None, None).unwrap_err();
        assert!(matches!(err, Error::Resolution { .. }));
    }

    #[test]
    fn test_mime_for_extension() {
        assert_eq!(mime_for_extension("pdf"), "application/pdf");
        assert_eq!(mime_for_extension("JPEG"), "image/jpeg");
        assert_eq!(mime_for_extension("xyz"), "application/octet-stream");
    }

    #[test]
    fn test_media_type() {
        assert_eq!(media_type("Text/HTML; charset=UTF-8"), "text/html");
        assert_eq!(media_type(""), "");
    }
}

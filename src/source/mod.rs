//! Input document resolution (local files, base64 payloads, remote URLs)

pub mod resolver;

pub use resolver::{
    build_headers, check_scheme, fetch_client, resolve_base64, resolve_path, resolve_url,
    ResolvedDocument, MAX_REDIRECTS,
};

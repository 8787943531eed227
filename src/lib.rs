//! TweekIT MCP Server Library
//!
//! This crate exposes the TweekIT conversion API as MCP tools:
//! - `doctype`: Look up supported input formats
//! - `convert`, `convert_url`, `convert_file`: Convert documents and images
//! - `fetch`: Download and normalize a URL
//! - `search`: Web search via DuckDuckGo
//! - `version`: Report the upstream API version

pub mod config;
pub mod convert;
pub mod error;
pub mod search;
pub mod server;
pub mod source;
pub mod upstream;

pub use config::{Credentials, ServerConfig};
pub use convert::{ConversionOptions, ConversionRequest, ConversionResult, ErrorPayload};
pub use error::{Error, Result};
pub use search::{DuckDuckGoHtml, SearchHit, SearchProvider};
pub use server::{
    run_server, run_server_with_config, to_call_result, ConversionParams, ConvertFileParams,
    ConvertParams, ConvertUrlParams, DoctypeParams, FetchParams, SearchParams, SearchResult,
    TweekitServer,
};
pub use upstream::UpstreamClient;

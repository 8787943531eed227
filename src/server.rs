//! MCP Server implementation using rmcp

use crate::config::{Credentials, ServerConfig};
use crate::convert::{
    classify_fetched, mime_for_extension, require_extension, resolve_extension_or_bin,
    ConversionOptions, ConversionRequest, ConversionResult, ErrorPayload,
};
use crate::search::{clamp_max_results, DuckDuckGoHtml, SearchHit, SearchProvider};
use crate::source::{fetch_client, resolve_base64, resolve_path, resolve_url};
use crate::upstream::UpstreamClient;
use anyhow::Result;
use base64::Engine;
use rmcp::{
    handler::server::tool::ToolRouter, handler::server::wrapper::Parameters, model::*,
    schemars::JsonSchema, service::RequestContext, tool, tool_handler, tool_router, RoleServer,
    ServerHandler, ServiceExt,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// URI of the upstream API version resource
pub const UPSTREAM_VERSION_URI: &str = "config://tweekit-version";

/// URI of this server's version resource
pub const SERVER_VERSION_URI: &str = "config://tweekit-mcp-version";

/// TweekIT MCP Server
#[derive(Clone)]
pub struct TweekitServer {
    tool_router: ToolRouter<Self>,
    /// Server configuration
    config: Arc<ServerConfig>,
    /// Non-redirecting client for downloads; `resolve_url` checks each hop
    fetch_http: reqwest::Client,
    upstream: UpstreamClient,
    search_provider: Arc<dyn SearchProvider>,
}

// ============================================================================
// Request/Response types for doctype
// ============================================================================

#[derive(Debug, Deserialize, JsonSchema)]
pub struct DoctypeParams {
    /// TweekIT API key passed via the ApiKey header (defaults to TWEEKIT_API_KEY)
    #[serde(default, rename = "apiKey")]
    pub api_key: Option<String>,
    /// TweekIT API secret paired with the apiKey (defaults to TWEEKIT_API_SECRET)
    #[serde(default, rename = "apiSecret")]
    pub api_secret: Option<String>,
    /// File extension to inspect; use '*' to list all supported inputs
    #[serde(default = "default_extension")]
    pub extension: String,
}

fn default_extension() -> String {
    "*".to_string()
}

// ============================================================================
// Request types for the convert tools
// ============================================================================

/// Geometry and rendering options shared by every convert tool
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ConversionParams {
    /// Ask TweekIT to skip rasterization (only meaningful for pdf output)
    #[serde(default, rename = "noRasterize")]
    pub no_rasterize: bool,
    /// Optional pixel width for the converted output (0 = keep)
    #[serde(default)]
    pub width: u32,
    /// Optional pixel height for the converted output (0 = keep)
    #[serde(default)]
    pub height: u32,
    /// Left crop coordinate in source pixels (negative pads)
    #[serde(default)]
    pub x1: i32,
    /// Top crop coordinate in source pixels (negative pads)
    #[serde(default)]
    pub y1: i32,
    /// Right crop coordinate in source pixels
    #[serde(default)]
    pub x2: i32,
    /// Bottom crop coordinate in source pixels
    #[serde(default)]
    pub y2: i32,
    /// Page number to convert for multi-page inputs (default: 1)
    #[serde(default = "default_page")]
    pub page: u32,
    /// Preserve alpha transparency when producing raster formats (default: true)
    #[serde(default = "default_true")]
    pub alpha: bool,
    /// Background color (hex RGB, e.g. "#FFFFFF") behind transparent pixels
    #[serde(default, rename = "bgColor")]
    pub bg_color: String,
}

fn default_page() -> u32 {
    1
}

fn default_true() -> bool {
    true
}

impl Default for ConversionParams {
    fn default() -> Self {
        Self {
            no_rasterize: false,
            width: 0,
            height: 0,
            x1: 0,
            y1: 0,
            x2: 0,
            y2: 0,
            page: default_page(),
            alpha: default_true(),
            bg_color: String::new(),
        }
    }
}

impl ConversionParams {
    fn to_options(&self, outfmt: &str) -> ConversionOptions {
        ConversionOptions {
            outfmt: outfmt.to_string(),
            no_rasterize: self.no_rasterize,
            width: self.width,
            height: self.height,
            x1: self.x1,
            y1: self.y1,
            x2: self.x2,
            y2: self.y2,
            page: self.page,
            alpha: self.alpha,
            bg_color: self.bg_color.clone(),
        }
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ConvertParams {
    /// TweekIT API key passed via the ApiKey header (defaults to TWEEKIT_API_KEY)
    #[serde(default, rename = "apiKey")]
    pub api_key: Option<String>,
    /// TweekIT API secret paired with the apiKey (defaults to TWEEKIT_API_SECRET)
    #[serde(default, rename = "apiSecret")]
    pub api_secret: Option<String>,
    /// Input file extension (e.g., pdf, docx, png)
    pub inext: String,
    /// Requested output format (e.g., png, webp, pdf)
    pub outfmt: String,
    /// Base64 encoded document payload
    pub blob: String,
    #[serde(flatten)]
    pub options: ConversionParams,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ConvertUrlParams {
    /// TweekIT API key passed via the ApiKey header (defaults to TWEEKIT_API_KEY)
    #[serde(default, rename = "apiKey")]
    pub api_key: Option<String>,
    /// TweekIT API secret paired with the apiKey (defaults to TWEEKIT_API_SECRET)
    #[serde(default, rename = "apiSecret")]
    pub api_secret: Option<String>,
    /// Direct download URL for the source document or image
    pub url: String,
    /// Requested output format (e.g., png, webp, pdf)
    pub outfmt: String,
    /// Override for the detected input extension (e.g., pdf)
    #[serde(default)]
    pub inext: Option<String>,
    /// Optional HTTP headers to include when downloading the URL
    #[serde(default, rename = "fetchHeaders")]
    pub fetch_headers: Option<HashMap<String, String>>,
    #[serde(flatten)]
    pub options: ConversionParams,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ConvertFileParams {
    /// TweekIT API key passed via the ApiKey header (defaults to TWEEKIT_API_KEY)
    #[serde(default, rename = "apiKey")]
    pub api_key: Option<String>,
    /// TweekIT API secret paired with the apiKey (defaults to TWEEKIT_API_SECRET)
    #[serde(default, rename = "apiSecret")]
    pub api_secret: Option<String>,
    /// Path of a local file readable by the server
    pub path: String,
    /// Requested output format (e.g., png, webp, pdf)
    pub outfmt: String,
    /// Override for the input extension when the file name has none
    #[serde(default)]
    pub inext: Option<String>,
    #[serde(flatten)]
    pub options: ConversionParams,
}

// ============================================================================
// Request/Response types for fetch and search
// ============================================================================

#[derive(Debug, Deserialize, JsonSchema)]
pub struct FetchParams {
    /// HTTP or HTTPS URL to retrieve and normalize
    pub url: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SearchParams {
    /// Search keywords to send to DuckDuckGo
    pub query: String,
    /// Maximum number of results to return (1-10, default: 5)
    #[serde(default = "default_max_results")]
    pub max_results: i64,
}

fn default_max_results() -> i64 {
    5
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct SearchResult {
    pub query: String,
    pub results: Vec<SearchHit>,
}

// ============================================================================
// Tool implementations
// ============================================================================

#[tool_router]
impl TweekitServer {
    pub fn new() -> Self {
        Self::with_config(ServerConfig::default())
    }

    /// Create a new TweekitServer with full configuration
    pub fn with_config(config: ServerConfig) -> Self {
        let http = build_http_client(&config);
        let provider = DuckDuckGoHtml::new(
            http.clone(),
            config.search_url.clone(),
            config.user_agent.clone(),
            config.search_timeout,
        );
        Self::assemble(config, http, Arc::new(provider))
    }

    /// Create a new TweekitServer with a custom search backend
    pub fn with_search_provider(
        config: ServerConfig,
        search_provider: Arc<dyn SearchProvider>,
    ) -> Self {
        let http = build_http_client(&config);
        Self::assemble(config, http, search_provider)
    }

    /// Look up supported input formats
    #[tool(
        description = "Retrieve the list of supported input formats, or map a file extension to its TweekIT document type. Use extension '*' (default) to list everything."
    )]
    async fn doctype(&self, Parameters(params): Parameters<DoctypeParams>) -> String {
        let response = self.process_doctype(&params).await.unwrap_or_else(|e| {
            tracing::warn!(error = %e, extension = %params.extension, "doctype failed");
            error_value(&e)
        });
        serde_json::to_string_pretty(&response).unwrap_or_default()
    }

    /// Convert a base64 payload
    #[tool(
        description = "Convert a base64 encoded document with TweekIT.

The output can be resized (width/height), cropped (x1/y1/x2/y2, negative values pad), and a single page selected for multi-page inputs. For raster outputs, alpha/bgColor control transparency. noRasterize asks for a paginated pdf instead of a raster image.

Returns an image, an embedded file, parsed JSON, or an error object."
    )]
    async fn convert(
        &self,
        Parameters(params): Parameters<ConvertParams>,
    ) -> std::result::Result<CallToolResult, ErrorData> {
        let result = self.process_convert(&params).await.unwrap_or_else(|e| {
            tracing::warn!(error = %e, inext = %params.inext, "convert failed");
            e.into()
        });
        Ok(to_call_result(result))
    }

    /// Download then convert
    #[tool(
        description = "Download a remote file and convert it with TweekIT in one step.

The input extension is taken from inext, else the URL path, else the response content type. Supply fetchHeaders when the remote resource needs authentication. Accepts the same geometry options as convert."
    )]
    async fn convert_url(
        &self,
        Parameters(params): Parameters<ConvertUrlParams>,
    ) -> std::result::Result<CallToolResult, ErrorData> {
        let result = self.process_convert_url(&params).await.unwrap_or_else(|e| {
            tracing::warn!(error = %e, url = %params.url, "convert_url failed");
            e.into()
        });
        Ok(to_call_result(result))
    }

    /// Read a local file then convert
    #[tool(
        description = "Convert a local file with TweekIT. The input extension comes from inext or the file name; files without either are rejected. Accepts the same geometry options as convert."
    )]
    async fn convert_file(
        &self,
        Parameters(params): Parameters<ConvertFileParams>,
    ) -> std::result::Result<CallToolResult, ErrorData> {
        let result = self.process_convert_file(&params).await.unwrap_or_else(|e| {
            tracing::warn!(error = %e, path = %params.path, "convert_file failed");
            e.into()
        });
        Ok(to_call_result(result))
    }

    /// Fetch a URL
    #[tool(
        description = "Fetch an http(s) URL. Images return as image content, PDFs and other binaries as embedded files, and text/JSON as {url, status, content_type, text}."
    )]
    async fn fetch(
        &self,
        Parameters(params): Parameters<FetchParams>,
    ) -> std::result::Result<CallToolResult, ErrorData> {
        let result = self.process_fetch(&params).await.unwrap_or_else(|e| {
            tracing::warn!(error = %e, url = %params.url, "fetch failed");
            e.into()
        });
        Ok(to_call_result(result))
    }

    /// Web search
    #[tool(
        description = "Simple web search using the DuckDuckGo HTML endpoint. Returns up to max_results (1-10) {title, url, snippet} objects. Best-effort parsing."
    )]
    async fn search(&self, Parameters(params): Parameters<SearchParams>) -> String {
        let response = match self.process_search(&params).await {
            Ok(result) => serde_json::to_value(&result).unwrap_or_default(),
            Err(e) => {
                tracing::warn!(error = %e, "search failed");
                error_value(&e)
            }
        };
        serde_json::to_string_pretty(&response).unwrap_or_default()
    }

    /// Upstream API version
    #[tool(description = "Get the current version of the TweekIT API.")]
    async fn version(&self) -> String {
        self.process_version().await
    }
}

impl TweekitServer {
    fn assemble(
        config: ServerConfig,
        http: reqwest::Client,
        search_provider: Arc<dyn SearchProvider>,
    ) -> Self {
        let config = Arc::new(config);
        Self {
            tool_router: Self::tool_router(),
            fetch_http: fetch_client(&config),
            upstream: UpstreamClient::new(http, config.clone()),
            config,
            search_provider,
        }
    }

    fn credentials(
        &self,
        api_key: &Option<String>,
        api_secret: &Option<String>,
    ) -> crate::error::Result<Credentials> {
        self.config
            .credentials(api_key.as_deref(), api_secret.as_deref())
    }

    /// Validate that a path is within allowed resource directories.
    /// If no resource_dirs are configured, all paths are allowed.
    fn validate_path_access(&self, path: &str) -> crate::error::Result<std::path::PathBuf> {
        if self.config.resource_dirs.is_empty() {
            return Ok(std::path::PathBuf::from(path));
        }

        let canonical = std::fs::canonicalize(path).map_err(|_| {
            crate::error::Error::PathAccessDenied {
                path: path.to_string(),
            }
        })?;

        for dir in &self.config.resource_dirs {
            if let Ok(canonical_dir) = std::fs::canonicalize(dir) {
                if canonical.starts_with(&canonical_dir) {
                    return Ok(canonical);
                }
            }
        }

        Err(crate::error::Error::PathAccessDenied {
            path: path.to_string(),
        })
    }

    pub async fn process_doctype(
        &self,
        params: &DoctypeParams,
    ) -> crate::error::Result<serde_json::Value> {
        let credentials = self.credentials(&params.api_key, &params.api_secret)?;
        let extension = match params.extension.trim() {
            "" => "*",
            ext => ext,
        };
        self.upstream.doctype(&credentials, extension).await
    }

    /// Build and send one conversion; `inext` must already be resolved.
    async fn convert_document(
        &self,
        credentials: &Credentials,
        inext: &str,
        data: Vec<u8>,
        options: ConversionOptions,
    ) -> crate::error::Result<ConversionResult> {
        let request = ConversionRequest::build(inext, data, &options);
        self.upstream.convert(credentials, &request).await
    }

    pub async fn process_convert(
        &self,
        params: &ConvertParams,
    ) -> crate::error::Result<ConversionResult> {
        let credentials = self.credentials(&params.api_key, &params.api_secret)?;
        let inext = require_extension("", Some(&params.inext), None)?;
        let document = resolve_base64(&params.blob)?;

        self.convert_document(
            &credentials,
            &inext,
            document.data,
            params.options.to_options(&params.outfmt),
        )
        .await
    }

    pub async fn process_convert_url(
        &self,
        params: &ConvertUrlParams,
    ) -> crate::error::Result<ConversionResult> {
        let credentials = self.credentials(&params.api_key, &params.api_secret)?;
        let document = resolve_url(
            &self.fetch_http,
            &self.config,
            &params.url,
            params.fetch_headers.as_ref(),
        )
        .await?;

        let inext = resolve_extension_or_bin(
            &params.url,
            params.inext.as_deref(),
            document.content_type.as_deref(),
        );
        tracing::debug!(url = %params.url, %inext, "resolved remote input extension");

        self.convert_document(
            &credentials,
            &inext,
            document.data,
            params.options.to_options(&params.outfmt),
        )
        .await
    }

    pub async fn process_convert_file(
        &self,
        params: &ConvertFileParams,
    ) -> crate::error::Result<ConversionResult> {
        let credentials = self.credentials(&params.api_key, &params.api_secret)?;
        let path = self.validate_path_access(&params.path)?;
        let inext = require_extension(&params.path, params.inext.as_deref(), None)?;
        let document = tokio::task::spawn_blocking(move || resolve_path(&path))
            .await
            .map_err(|e| crate::error::Error::Unexpected {
                reason: format!("Task join error: {}", e),
            })??;

        self.convert_document(
            &credentials,
            &inext,
            document.data,
            params.options.to_options(&params.outfmt),
        )
        .await
    }

    pub async fn process_fetch(
        &self,
        params: &FetchParams,
    ) -> crate::error::Result<ConversionResult> {
        let document = resolve_url(&self.fetch_http, &self.config, &params.url, None).await?;
        Ok(classify_fetched(
            &params.url,
            document.status.unwrap_or(200),
            document.content_type.as_deref(),
            document.data,
        ))
    }

    pub async fn process_search(
        &self,
        params: &SearchParams,
    ) -> crate::error::Result<SearchResult> {
        let max_results = clamp_max_results(params.max_results);
        let results = self
            .search_provider
            .search(&params.query, max_results)
            .await?;
        Ok(SearchResult {
            query: params.query.clone(),
            results: results.into_iter().take(max_results).collect(),
        })
    }

    /// Upstream version, or "unavailable: <reason>"
    pub async fn process_version(&self) -> String {
        match self.upstream.version().await {
            Ok(version) => version,
            Err(e) => {
                tracing::warn!(error = %e, "version lookup failed");
                format!("unavailable: {}", e.client_message())
            }
        }
    }
}

impl Default for TweekitServer {
    fn default() -> Self {
        Self::new()
    }
}

fn build_http_client(config: &ServerConfig) -> reqwest::Client {
    reqwest::Client::builder()
        .connect_timeout(config.connect_timeout)
        .redirect(reqwest::redirect::Policy::limited(10))
        .user_agent(config.user_agent.clone())
        .build()
        .unwrap_or_else(|e| {
            tracing::warn!(error = %e, "falling back to default HTTP client");
            reqwest::Client::new()
        })
}

/// `{"error": ..., "kind": ...}` value for JSON-returning tools
fn error_value(err: &crate::error::Error) -> serde_json::Value {
    serde_json::to_value(ErrorPayload::from(err)).unwrap_or_default()
}

/// Render a conversion result as MCP content. Errors set `is_error` and
/// never carry binary data.
pub fn to_call_result(result: ConversionResult) -> CallToolResult {
    let engine = base64::engine::general_purpose::STANDARD;
    match result {
        ConversionResult::Image { data, format } => CallToolResult::success(vec![Content::image(
            engine.encode(&data),
            format!("image/{}", format),
        )]),
        ConversionResult::File { data, format } => {
            CallToolResult::success(vec![Content::resource(
                ResourceContents::BlobResourceContents {
                    uri: format!("file:///converted.{}", format),
                    mime_type: Some(mime_for_extension(&format).to_string()),
                    blob: engine.encode(&data),
                    meta: Default::default(),
                },
            )])
        }
        ConversionResult::Json(value) => CallToolResult::success(vec![Content::text(
            serde_json::to_string_pretty(&value).unwrap_or_default(),
        )]),
        ConversionResult::Error(payload) => CallToolResult::error(vec![Content::text(
            serde_json::to_string_pretty(&payload).unwrap_or_default(),
        )]),
    }
}

#[tool_handler]
impl ServerHandler for TweekitServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder()
                .enable_tools()
                .enable_resources()
                .build(),
            server_info: Implementation::from_build_env(),
            instructions: Some(
                "TweekIT MCP Server normalizes almost any file for AI ingestion. \
                 Use doctype to discover supported inputs, convert/convert_url/convert_file \
                 to transform documents, and fetch/search to gather sources."
                    .into(),
            ),
        }
    }

    /// List the version resources
    async fn list_resources(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> std::result::Result<ListResourcesResult, ErrorData> {
        let entries = [
            (
                UPSTREAM_VERSION_URI,
                "tweekit-version",
                "Current version of the TweekIT API",
            ),
            (
                SERVER_VERSION_URI,
                "tweekit-mcp-version",
                "Version of this TweekIT MCP server",
            ),
        ];

        let resources = entries
            .into_iter()
            .map(|(uri, name, description)| {
                let mut resource = RawResource::new(uri, name);
                resource.mime_type = Some("text/plain".to_string());
                resource.description = Some(description.to_string());
                Annotated {
                    raw: resource,
                    annotations: None,
                }
            })
            .collect();

        Ok(ListResourcesResult {
            resources,
            next_cursor: None,
            meta: Default::default(),
        })
    }

    /// Read a version resource
    async fn read_resource(
        &self,
        request: ReadResourceRequestParams,
        _context: RequestContext<RoleServer>,
    ) -> std::result::Result<ReadResourceResult, ErrorData> {
        let uri = &request.uri;

        let text = match uri.as_str() {
            UPSTREAM_VERSION_URI => self.upstream.version().await.map_err(|e| {
                tracing::warn!(error = %e, "read_resource failed");
                ErrorData::internal_error(e.client_message(), None)
            })?,
            SERVER_VERSION_URI => env!("CARGO_PKG_VERSION").to_string(),
            _ => {
                return Err(ErrorData::resource_not_found(
                    format!("Unknown resource: {}", uri),
                    None,
                ))
            }
        };

        Ok(ReadResourceResult {
            contents: vec![ResourceContents::TextResourceContents {
                uri: uri.clone(),
                mime_type: Some("text/plain".to_string()),
                text,
                meta: Default::default(),
            }],
        })
    }
}

/// Run the MCP server with configuration from the environment
pub async fn run_server() -> Result<()> {
    run_server_with_config(ServerConfig::from_env()).await
}

/// Run the MCP server with full configuration
pub async fn run_server_with_config(config: ServerConfig) -> Result<()> {
    tracing::info!(
        base_url = %config.base_url,
        default_credentials = config.default_api_key.is_some() && config.default_api_secret.is_some(),
        "TweekIT MCP Server ready, waiting for connections..."
    );

    let server = TweekitServer::with_config(config);
    let service = server.serve(rmcp::transport::io::stdio()).await?;
    service.waiting().await?;

    Ok(())
}

//! Source resolution for input documents

use crate::config::ServerConfig;
use crate::convert::{read_error_detail, ERROR_BODY_LIMIT};
use crate::error::{Error, Result};
use base64::Engine;
use futures_util::StreamExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE, LOCATION};
use std::collections::HashMap;
use std::net::IpAddr;
use std::path::Path;

/// Resolved document bytes plus what is known about them
#[derive(Debug, Clone)]
pub struct ResolvedDocument {
    pub data: Vec<u8>,
    pub source_name: String,
    pub content_type: Option<String>,
    /// HTTP status for remote sources
    pub status: Option<u16>,
}

/// Read a local file
pub fn resolve_path<P: AsRef<Path>>(path: P) -> Result<ResolvedDocument> {
    let path = path.as_ref();

    if !path.is_file() {
        return Err(Error::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("file not found: {}", path.display()),
        )));
    }

    let data = std::fs::read(path)?;
    if data.is_empty() {
        return Err(Error::EmptyContent);
    }

    Ok(ResolvedDocument {
        data,
        source_name: path.display().to_string(),
        content_type: None,
        status: None,
    })
}

/// Decode a base64 payload. ASCII whitespace (line wrapping) is ignored.
pub fn resolve_base64(base64_data: &str) -> Result<ResolvedDocument> {
    let compact: String = base64_data
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();
    let engine = base64::engine::general_purpose::STANDARD;
    let data = engine.decode(compact)?;

    if data.is_empty() {
        return Err(Error::EmptyContent);
    }

    Ok(ResolvedDocument {
        data,
        source_name: "<base64>".to_string(),
        content_type: None,
        status: None,
    })
}

/// Parse a URL and require the http or https scheme. Never touches the network.
pub fn check_scheme(url_str: &str) -> Result<url::Url> {
    let parsed = url::Url::parse(url_str).map_err(|e| Error::InvalidUrl {
        reason: format!("{}: {}", url_str, e),
    })?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        other => Err(Error::UnsupportedScheme {
            scheme: other.to_string(),
        }),
    }
}

/// Check if an IP address is private/reserved (loopback, link-local, private ranges, etc.)
fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()                           // 127.0.0.0/8
                || v4.is_private()                     // 10/8, 172.16/12, 192.168/16
                || v4.is_link_local()                  // 169.254/16 (cloud metadata!)
                || v4.is_broadcast()                   // 255.255.255.255
                || v4.is_unspecified()                 // 0.0.0.0
                || v4.octets()[0] == 100 && (v4.octets()[1] & 0xC0) == 64  // CGNAT 100.64/10
        }
        IpAddr::V6(v6) => {
            v6.is_loopback()                           // ::1
                || v6.is_unspecified()                 // ::
                || {
                    let segments = v6.segments();
                    // fc00::/7 (unique local)
                    (segments[0] & 0xFE00) == 0xFC00
                    // fe80::/10 (link-local)
                    || (segments[0] & 0xFFC0) == 0xFE80
                }
        }
    }
}

/// Check URL for SSRF by resolving DNS and verifying IPs are public
async fn check_ssrf(parsed: &url::Url) -> Result<()> {
    let host = parsed.host_str().ok_or_else(|| Error::InvalidUrl {
        reason: "URL has no host".to_string(),
    })?;

    let port = parsed.port_or_known_default().unwrap_or(443);
    let addr_str = format!("{}:{}", host, port);

    let addrs = tokio::net::lookup_host(&addr_str).await.map_err(|e| {
        tracing::debug!(host, error = %e, "DNS resolution failed");
        Error::Transport {
            reason: format!("DNS resolution failed for {}", host),
        }
    })?;

    for addr in addrs {
        if is_private_ip(&addr.ip()) {
            return Err(Error::SsrfBlocked {
                url: parsed.to_string(),
            });
        }
    }

    Ok(())
}

/// Turn caller-supplied header pairs into a header map.
pub fn build_headers(headers: Option<&HashMap<String, String>>) -> Result<HeaderMap> {
    let mut map = HeaderMap::new();
    for (name, value) in headers.into_iter().flatten() {
        let header_name =
            HeaderName::from_bytes(name.trim().as_bytes()).map_err(|_| Error::InvalidHeader {
                name: name.clone(),
            })?;
        let header_value = HeaderValue::from_str(value).map_err(|_| Error::InvalidHeader {
            name: name.clone(),
        })?;
        map.insert(header_name, header_value);
    }
    Ok(map)
}

/// Most redirects followed by [`resolve_url`]
pub const MAX_REDIRECTS: usize = 10;

/// HTTP client for [`resolve_url`]. Redirects are left to the caller so
/// every hop goes through the destination checks.
pub fn fetch_client(config: &ServerConfig) -> reqwest::Client {
    reqwest::Client::builder()
        .connect_timeout(config.connect_timeout)
        .redirect(reqwest::redirect::Policy::none())
        .user_agent(config.user_agent.clone())
        .build()
        .unwrap_or_else(|e| {
            tracing::warn!(error = %e, "falling back to minimal fetch client");
            reqwest::Client::builder()
                .redirect(reqwest::redirect::Policy::none())
                .build()
                .unwrap_or_default()
        })
}

/// Scheme and SSRF checks for one request destination
async fn check_destination(url: &url::Url, config: &ServerConfig) -> Result<()> {
    if !matches!(url.scheme(), "http" | "https") {
        return Err(Error::UnsupportedScheme {
            scheme: url.scheme().to_string(),
        });
    }
    if !config.allow_private_urls {
        check_ssrf(url).await?;
    }
    Ok(())
}

/// Target of a redirect response, resolved against the current URL.
fn redirect_target(current: &url::Url, response: &reqwest::Response) -> Result<url::Url> {
    let location = response
        .headers()
        .get(LOCATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| Error::Transport {
            reason: format!("redirect from {} without a usable Location", current),
        })?;
    current.join(location).map_err(|e| Error::InvalidUrl {
        reason: format!("{}: {}", location, e),
    })
}

/// Download a remote document with scheme restriction, SSRF protection and
/// download size limits. Non-2xx statuses and empty bodies are errors.
///
/// Redirects are followed here, up to [`MAX_REDIRECTS`], and each target is
/// checked like the original URL. Caller headers are only sent to the
/// original origin. `client` must not follow redirects itself (see
/// [`fetch_client`]).
pub async fn resolve_url(
    client: &reqwest::Client,
    config: &ServerConfig,
    url: &str,
    headers: Option<&HashMap<String, String>>,
) -> Result<ResolvedDocument> {
    let parsed = check_scheme(url)?;
    let headers = build_headers(headers)?;
    let origin = parsed.origin();

    let mut current = parsed;
    let mut redirects = 0;
    let response = loop {
        check_destination(&current, config).await?;
        tracing::debug!(url = %current, "downloading remote document");

        let mut request = client.get(current.clone()).timeout(config.transfer_timeout);
        if current.origin() == origin {
            request = request.headers(headers.clone());
        }
        let response = request.send().await?;

        if !matches!(response.status().as_u16(), 301 | 302 | 303 | 307 | 308) {
            break response;
        }
        if redirects == MAX_REDIRECTS {
            return Err(Error::Transport {
                reason: format!("more than {} redirects from {}", MAX_REDIRECTS, url),
            });
        }
        redirects += 1;
        current = redirect_target(&current, &response)?;
    };

    let status = response.status().as_u16();
    let max_download_bytes = config.max_download_bytes;

    if !response.status().is_success() {
        let limit = usize::try_from(max_download_bytes)
            .unwrap_or(usize::MAX)
            .min(ERROR_BODY_LIMIT);
        return Err(Error::RemoteStatus {
            status,
            detail: read_error_detail(response, limit).await?,
        });
    }

    // Check Content-Length header for early rejection
    if let Some(content_length) = response.content_length() {
        if content_length > max_download_bytes {
            return Err(Error::DownloadTooLarge {
                size: content_length,
                max_size: max_download_bytes,
            });
        }
    }

    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let final_url = response.url().to_string();

    // Stream the response body with incremental size checking to prevent OOM
    let mut data = Vec::new();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        data.extend_from_slice(&chunk);
        if data.len() as u64 > max_download_bytes {
            return Err(Error::DownloadTooLarge {
                size: data.len() as u64,
                max_size: max_download_bytes,
            });
        }
    }

    if data.is_empty() {
        return Err(Error::EmptyContent);
    }

    Ok(ResolvedDocument {
        data,
        source_name: final_url,
        content_type,
        status: Some(status),
    })
}

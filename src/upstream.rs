//! Client for the upstream TweekIT conversion API

use crate::config::{Credentials, ServerConfig};
use crate::convert::{
    classify, read_error_detail, ConversionRequest, ConversionResult, UpstreamResponse,
    ERROR_BODY_LIMIT,
};
use crate::error::{Error, Result};
use serde_json::Value;
use std::sync::Arc;

/// Typed access to the `version`, `doctype` and convert endpoints
#[derive(Clone)]
pub struct UpstreamClient {
    http: reqwest::Client,
    config: Arc<ServerConfig>,
}

impl UpstreamClient {
    pub fn new(http: reqwest::Client, config: Arc<ServerConfig>) -> Self {
        Self { http, config }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url, path)
    }

    /// `GET {base}version`, trimmed body text
    pub async fn version(&self) -> Result<String> {
        let url = self.endpoint("version");
        tracing::debug!(%url, "fetching TweekIT version");

        let response = self
            .http
            .get(&url)
            .timeout(self.config.metadata_timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::UpstreamStatus {
                status: status.as_u16(),
                detail: read_error_detail(response, ERROR_BODY_LIMIT).await?,
            });
        }
        Ok(response.text().await?.trim().to_string())
    }

    /// `GET {base}doctype?extension=...`. Non-object JSON is wrapped as `{"result": ...}`.
    pub async fn doctype(&self, credentials: &Credentials, extension: &str) -> Result<Value> {
        let url = self.endpoint("doctype");
        tracing::debug!(%url, extension, "querying TweekIT doctype");

        let response = self
            .http
            .get(&url)
            .header("ApiKey", &credentials.key)
            .header("ApiSecret", &credentials.secret)
            .query(&[("extension", extension)])
            .timeout(self.config.metadata_timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::UpstreamStatus {
                status: status.as_u16(),
                detail: read_error_detail(response, ERROR_BODY_LIMIT).await?,
            });
        }

        let data: Value = serde_json::from_slice(&response.bytes().await?)?;
        Ok(match data {
            Value::Object(_) => data,
            other => serde_json::json!({ "result": other }),
        })
    }

    /// `POST {base}` with the canonical request, classified by content type.
    pub async fn convert(
        &self,
        credentials: &Credentials,
        request: &ConversionRequest,
    ) -> Result<ConversionResult> {
        let url = self.endpoint("");
        tracing::debug!(
            %url,
            inext = %request.doc_data_type,
            outfmt = %request.fmt,
            bytes = request.doc_data.len(),
            "sending conversion request"
        );

        let response = self
            .http
            .post(&url)
            .header("ApiKey", &credentials.key)
            .header("ApiSecret", &credentials.secret)
            .json(request)
            .timeout(self.config.transfer_timeout)
            .send()
            .await?;

        let response = UpstreamResponse::read(response).await?;
        Ok(classify(&response, &request.fmt, Some(request.echo())))
    }
}

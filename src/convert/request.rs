//! Canonical upstream conversion request

use super::extension::normalize_extension;
use base64::Engine;
use serde::{Serialize, Serializer};

/// Caller-facing conversion options shared by the convert tools
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionOptions {
    pub outfmt: String,
    pub no_rasterize: bool,
    pub width: u32,
    pub height: u32,
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
    pub page: u32,
    pub alpha: bool,
    pub bg_color: String,
}

impl Default for ConversionOptions {
    fn default() -> Self {
        Self {
            outfmt: String::new(),
            no_rasterize: false,
            width: 0,
            height: 0,
            x1: 0,
            y1: 0,
            x2: 0,
            y2: 0,
            page: 1,
            alpha: true,
            bg_color: String::new(),
        }
    }
}

/// Request body for `POST {base}`, field names as the upstream API expects
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ConversionRequest {
    pub fmt: String,
    pub width: u32,
    pub height: u32,
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
    pub bg: u32,
    pub alpha: bool,
    pub page: u32,
    pub no_rasterize: bool,
    pub doc_data_type: String,
    #[serde(serialize_with = "serialize_base64")]
    pub doc_data: Vec<u8>,
}

/// The request fields that may be echoed back in error reports
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct RequestEcho {
    pub doc_data_type: String,
    pub fmt: String,
}

impl ConversionRequest {
    /// Build the upstream request. Pure; `noRasterize` is not checked
    /// against the output format.
    pub fn build(inext: &str, doc_data: Vec<u8>, options: &ConversionOptions) -> Self {
        Self {
            fmt: options.outfmt.clone(),
            width: options.width,
            height: options.height,
            x1: options.x1,
            y1: options.y1,
            x2: options.x2,
            y2: options.y2,
            bg: parse_color(&options.bg_color),
            alpha: options.alpha,
            page: options.page,
            no_rasterize: options.no_rasterize,
            doc_data_type: normalize_extension(inext),
            doc_data,
        }
    }

    /// Format fields only, never the payload.
    pub fn echo(&self) -> RequestEcho {
        RequestEcho {
            doc_data_type: self.doc_data_type.clone(),
            fmt: self.fmt.clone(),
        }
    }
}

/// Parse a hex RGB color ("#00ff00", "FFFFFF") into a packed integer.
/// Empty, malformed or wider-than-24-bit input yields 0 (black).
pub fn parse_color(color: &str) -> u32 {
    let hex = color.trim().trim_start_matches('#');
    if hex.is_empty() {
        return 0;
    }
    match u32::from_str_radix(hex, 16) {
        Ok(value) if value <= 0xFF_FF_FF => value,
        _ => 0,
    }
}

fn serialize_base64<S: Serializer>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&base64::engine::general_purpose::STANDARD.encode(data))
}

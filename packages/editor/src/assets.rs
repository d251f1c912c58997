//! Media checks and the image compression collaborator.
//!
//! Everything here runs before the tree is touched: an asset that fails a
//! check never reaches a transaction.

use std::future::Future;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

use crate::config::AssetConfig;
use crate::errors::AssetError;

/// Decoded header of a `data:` URI
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataUri {
    pub mime: String,
    /// Decoded payload size in bytes
    pub size: usize,
}

pub fn is_data_uri(src: &str) -> bool {
    src.starts_with("data:")
}

/// Reject mime types outside the allow-list.
pub fn check_mime(config: &AssetConfig, mime: &str) -> Result<(), AssetError> {
    let mime = mime.trim().to_ascii_lowercase();
    if config.allowed_types.iter().any(|t| t.eq_ignore_ascii_case(&mime)) {
        Ok(())
    } else {
        Err(AssetError::UnsupportedType(mime))
    }
}

pub fn check_size(config: &AssetConfig, size: usize) -> Result<(), AssetError> {
    if size > config.max_bytes {
        return Err(AssetError::TooLarge {
            size,
            max: config.max_bytes,
        });
    }
    Ok(())
}

/// Parse `data:<mime>;base64,<payload>` and check it against `config`.
pub fn validate_data_uri(config: &AssetConfig, src: &str) -> Result<DataUri, AssetError> {
    let rest = src.strip_prefix("data:").ok_or(AssetError::InvalidDataUri)?;
    let (header, payload) = rest.split_once(',').ok_or(AssetError::InvalidDataUri)?;
    let mime = header.strip_suffix(";base64").ok_or(AssetError::InvalidDataUri)?;
    check_mime(config, mime)?;

    // Size is checked on the encoded length first so oversized payloads are
    // never decoded.
    let estimated = payload.len() / 4 * 3;
    check_size(config, estimated.saturating_sub(2))?;
    let bytes = STANDARD
        .decode(payload.trim())
        .map_err(|_| AssetError::InvalidDataUri)?;
    check_size(config, bytes.len())?;

    Ok(DataUri {
        mime: mime.to_ascii_lowercase(),
        size: bytes.len(),
    })
}

/// Turns raw image bytes into a `data:` URI.
pub trait ImageCompressor {
    fn compress(&self, bytes: Vec<u8>, mime: &str) -> impl Future<Output = Result<String, AssetError>>;
}

/// Encodes the bytes as they are.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassThroughCompressor;

impl ImageCompressor for PassThroughCompressor {
    fn compress(&self, bytes: Vec<u8>, mime: &str) -> impl Future<Output = Result<String, AssetError>> {
        let uri = format!("data:{};base64,{}", mime.to_ascii_lowercase(), STANDARD.encode(bytes));
        async move { Ok(uri) }
    }
}

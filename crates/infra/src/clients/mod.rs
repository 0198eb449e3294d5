//! HTTP adapters for the mapping service and both systems of record

mod mapping_service;
mod source_api;
mod target_api;

pub use mapping_service::MappingServiceClient;
pub use source_api::SourceApiClient;
pub use target_api::TargetApiClient;

use reqwest::Url;
use syncbridge_domain::{Result, SyncBridgeError};

/// Parse a configured base URL.
pub(crate) fn parse_base(base_url: &str) -> Result<Url> {
    Url::parse(base_url.trim())
        .map_err(|e| SyncBridgeError::Config(format!("invalid base URL {base_url}: {e}")))
}

/// Append path segments to `base`, percent-encoding each one.
pub(crate) fn endpoint(base: &Url, segments: &[&str]) -> Result<Url> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|()| SyncBridgeError::Config(format!("base URL cannot have a path: {base}")))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

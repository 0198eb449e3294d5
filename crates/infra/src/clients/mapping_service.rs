//! Client for the external mapping service

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, StatusCode, Url};
use serde::Deserialize;
use syncbridge_core::MappingStore;
use syncbridge_domain::{
    DuplicateMapping, Mapping, MappingServiceConfig, MappingWriteOutcome, Result, SyncBridgeError,
};
use tracing::{debug, instrument, warn};

use super::{endpoint, parse_base};
use crate::errors::classify_status;
use crate::http::HttpClient;

/// 409 body. The service wraps the diagnostic in `moreInfo`; a bare body is
/// accepted too.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ConflictBody {
    Wrapped {
        #[serde(rename = "moreInfo")]
        more_info: DuplicateMapping,
    },
    Bare(DuplicateMapping),
}

impl From<ConflictBody> for DuplicateMapping {
    fn from(body: ConflictBody) -> Self {
        match body {
            ConflictBody::Wrapped { more_info } => more_info,
            ConflictBody::Bare(duplicate) => duplicate,
        }
    }
}

/// `MappingStore` over `{base}/mapping`.
#[derive(Clone)]
pub struct MappingServiceClient {
    http: HttpClient,
    endpoint: Url,
}

impl MappingServiceClient {
    pub fn new(http: HttpClient, base_url: &str) -> Result<Self> {
        let base = parse_base(base_url)?;
        Ok(Self { http, endpoint: endpoint(&base, &["mapping"])? })
    }

    pub fn from_config(config: &MappingServiceConfig) -> Result<Self> {
        let http = HttpClient::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .bearer_token(config.token.clone())
            .build()?;
        Self::new(http, &config.base_url)
    }

    /// Resolve a 409 into the duplicate diagnostic, falling back to a lookup
    /// when the body is missing or malformed.
    async fn conflict(&self, mapping: &Mapping, body: &[u8]) -> MappingWriteOutcome {
        if let Ok(parsed) = serde_json::from_slice::<ConflictBody>(body) {
            return MappingWriteOutcome::Conflict(parsed.into());
        }

        debug!(source_id = %mapping.source_id, "409 without a readable body, looking up existing mapping");
        match self.find_by_source_id(&mapping.source_id).await {
            Ok(Some(existing)) => MappingWriteOutcome::Conflict(DuplicateMapping {
                duplicate: mapping.clone(),
                existing,
            }),
            Ok(None) => MappingWriteOutcome::TransientError(SyncBridgeError::Transient(format!(
                "mapping for {} reported as duplicate but not found",
                mapping.source_id
            ))),
            Err(e) => MappingWriteOutcome::from_error(e),
        }
    }
}

#[async_trait]
impl MappingStore for MappingServiceClient {
    #[instrument(skip(self))]
    async fn find_by_source_id(&self, source_id: &str) -> Result<Option<Mapping>> {
        let request = self
            .http
            .request(Method::GET, self.endpoint.clone())
            .query(&[("sourceId", source_id)]);

        match self.http.send_json::<Mapping>(request, "GET mapping").await {
            Ok(mapping) => Ok(Some(mapping)),
            Err(SyncBridgeError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    #[instrument(skip(self, mapping), fields(source_id = %mapping.source_id, target_id = %mapping.target_id))]
    async fn create(&self, mapping: &Mapping) -> MappingWriteOutcome {
        let request = self.http.request(Method::POST, self.endpoint.clone()).json(mapping);

        let response = match self.http.send(request).await {
            Ok(response) => response,
            Err(e) => return MappingWriteOutcome::from_error(e),
        };

        let status = response.status();
        if status.is_success() {
            return MappingWriteOutcome::Created;
        }
        if status == StatusCode::CONFLICT {
            let body = response.bytes().await.unwrap_or_default();
            return self.conflict(mapping, &body).await;
        }

        let error = classify_status(status, "POST mapping");
        warn!(status = status.as_u16(), error = %error, "mapping write rejected");
        MappingWriteOutcome::from_error(error)
    }

    #[instrument(skip(self))]
    async fn delete_by_source_id(&self, source_id: &str) -> Result<()> {
        let request = self
            .http
            .request(Method::DELETE, self.endpoint.clone())
            .query(&[("sourceId", source_id)]);
        self.http.send_checked(request, "DELETE mapping").await?;
        Ok(())
    }
}

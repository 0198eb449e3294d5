//! Client for the source-of-truth API

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, Url};
use serde_json::Value;
use syncbridge_core::SourceSystemClient;
use syncbridge_domain::{Page, Result, SourceConfig, SourceEntity, SourceEntityRef};
use tracing::instrument;

use super::{endpoint, parse_base};
use crate::http::HttpClient;

/// `SourceSystemClient` over `{base}/{resource}`.
#[derive(Clone)]
pub struct SourceApiClient {
    http: HttpClient,
    collection: Url,
}

impl SourceApiClient {
    pub fn new(http: HttpClient, base_url: &str, resource: &str) -> Result<Self> {
        let base = parse_base(base_url)?;
        Ok(Self { http, collection: endpoint(&base, &[resource])? })
    }

    pub fn from_config(config: &SourceConfig) -> Result<Self> {
        let http = HttpClient::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .bearer_token(config.token.clone())
            .build()?;
        Self::new(http, &config.base_url, &config.resource)
    }
}

#[async_trait]
impl SourceSystemClient for SourceApiClient {
    #[instrument(skip(self))]
    async fn get_entity(&self, id: &str) -> Result<SourceEntity> {
        let url = endpoint(&self.collection, &[id])?;
        let payload: Value =
            self.http.send_json(self.http.request(Method::GET, url), "GET source entity").await?;
        Ok(SourceEntity { id: id.to_string(), payload })
    }

    #[instrument(skip(self))]
    async fn list_entities(&self, page: u64, size: u64) -> Result<Page<SourceEntityRef>> {
        let request = self
            .http
            .request(Method::GET, self.collection.clone())
            .query(&[("page", page), ("size", size)]);
        self.http.send_json(request, "GET source page").await
    }
}

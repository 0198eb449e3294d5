//! Client for the legacy target system

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, Url};
use serde::Deserialize;
use serde_json::Value;
use syncbridge_core::TargetSystemClient;
use syncbridge_domain::{Page, Result, TargetConfig, TargetEntity, TargetEntityRef, TargetId};
use tracing::instrument;

use super::{endpoint, parse_base};
use crate::http::HttpClient;

#[derive(Debug, Deserialize)]
struct Created {
    id: TargetId,
}

/// `TargetSystemClient` over `{base}/{resource}`.
#[derive(Clone)]
pub struct TargetApiClient {
    http: HttpClient,
    collection: Url,
}

impl TargetApiClient {
    pub fn new(http: HttpClient, base_url: &str, resource: &str) -> Result<Self> {
        let base = parse_base(base_url)?;
        Ok(Self { http, collection: endpoint(&base, &[resource])? })
    }

    pub fn from_config(config: &TargetConfig) -> Result<Self> {
        let http = HttpClient::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .bearer_token(config.token.clone())
            .build()?;
        Self::new(http, &config.base_url, &config.resource)
    }

    fn item(&self, id: &TargetId) -> Result<Url> {
        endpoint(&self.collection, &[&id.as_key()])
    }
}

#[async_trait]
impl TargetSystemClient for TargetApiClient {
    #[instrument(skip(self), fields(target_id = %id))]
    async fn get_entity(&self, id: &TargetId) -> Result<TargetEntity> {
        let request = self.http.request(Method::GET, self.item(id)?);
        let payload: Value = self.http.send_json(request, "GET target entity").await?;
        Ok(TargetEntity { id: id.clone(), payload })
    }

    #[instrument(skip(self, payload))]
    async fn create_entity(&self, payload: &Value) -> Result<TargetId> {
        let request = self.http.request(Method::POST, self.collection.clone()).json(payload);
        let created: Created = self.http.send_json(request, "POST target entity").await?;
        Ok(created.id)
    }

    #[instrument(skip(self, payload), fields(target_id = %id))]
    async fn update_entity(&self, id: &TargetId, payload: &Value) -> Result<()> {
        let request = self.http.request(Method::PUT, self.item(id)?).json(payload);
        self.http.send_checked(request, "PUT target entity").await?;
        Ok(())
    }

    #[instrument(skip(self), fields(target_id = %id))]
    async fn delete_entity(&self, id: &TargetId) -> Result<()> {
        let request = self.http.request(Method::DELETE, self.item(id)?);
        self.http.send_checked(request, "DELETE target entity").await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn list_ids(&self, page: u64, size: u64) -> Result<Page<TargetEntityRef>> {
        let request = self
            .http
            .request(Method::GET, endpoint(&self.collection, &["ids"])?)
            .query(&[("page", page), ("size", size)]);
        self.http.send_json(request, "GET target ids").await
    }
}

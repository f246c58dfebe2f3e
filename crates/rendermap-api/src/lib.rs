mod error;

pub use error::ApiError;

use async_trait::async_trait;
use rendermap_core::{EnvVar, KeyValueInstance, PostgresInstance, Service};
use rendermap_infer::EnvVarSource;
use serde::de::DeserializeOwned;
use serde_json::Value;

const DEFAULT_BASE_URL: &str = "https://api.render.com/v1";
const PAGE_LIMIT: usize = 100;

/// Authenticated client for the hosting provider's REST API. List endpoints
/// return pages of `{ cursor, <resourceKey>: {...} }` envelopes; the client
/// unwraps them and follows cursors until a short page.
pub struct RenderClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl RenderClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_base_url(api_key, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        RenderClient {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    async fn get<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T, ApiError> {
        let res = self
            .http
            .get(format!("{}/{}", self.base_url, endpoint))
            .bearer_auth(&self.api_key)
            .header("Accept", "application/json")
            .send()
            .await?;

        let status = res.status();
        if !status.is_success() {
            let message = res
                .json::<Value>()
                .await
                .ok()
                .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
                .unwrap_or_else(|| "Unknown error".to_string());
            return Err(ApiError::Http {
                status: status.as_u16(),
                message,
            });
        }

        Ok(res.json::<T>().await?)
    }

    /// Follow cursor pagination on a list endpoint, unwrapping the resource
    /// envelope on every item.
    pub async fn fetch_all_pages<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        resource_key: &str,
        owner_id: Option<&str>,
    ) -> Result<Vec<T>, ApiError> {
        let mut items = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let mut query = format!("limit={}", PAGE_LIMIT);
            if let Some(owner) = owner_id {
                query.push_str(&format!("&ownerId={}", owner));
            }
            if let Some(c) = &cursor {
                query.push_str(&format!("&cursor={}", c));
            }

            let page: Vec<Value> = self.get(&format!("{}?{}", endpoint, query)).await?;
            if page.is_empty() {
                break;
            }
            let short_page = page.len() < PAGE_LIMIT;

            let (resources, next_cursor) = unwrap_page(&page, resource_key)?;
            items.extend(resources);
            cursor = next_cursor;

            if short_page || cursor.is_none() {
                break;
            }
        }

        Ok(items)
    }

    pub async fn list_services(&self, owner_id: Option<&str>) -> Result<Vec<Service>, ApiError> {
        self.fetch_all_pages("services", "service", owner_id).await
    }

    pub async fn list_postgres(
        &self,
        owner_id: Option<&str>,
    ) -> Result<Vec<PostgresInstance>, ApiError> {
        self.fetch_all_pages("postgres", "postgres", owner_id).await
    }

    pub async fn list_key_value(
        &self,
        owner_id: Option<&str>,
    ) -> Result<Vec<KeyValueInstance>, ApiError> {
        self.fetch_all_pages("key-value", "keyValue", owner_id).await
    }

    /// Environment variables for one service. The endpoint wraps each
    /// variable in a `{ envVar, cursor }` envelope.
    pub async fn env_vars(&self, service_id: &str) -> Result<Vec<EnvVar>, ApiError> {
        let items: Vec<Value> = self
            .get(&format!("services/{}/env-vars", service_id))
            .await?;
        Ok(unwrap_env_vars(&items))
    }
}

#[async_trait]
impl EnvVarSource for RenderClient {
    async fn env_vars(&self, service_id: &str) -> Result<Vec<EnvVar>, String> {
        RenderClient::env_vars(self, service_id)
            .await
            .map_err(|e| e.to_string())
    }
}

/// Split one page of list results into unwrapped resources and the cursor to
/// resume from. Items missing the resource key are skipped.
fn unwrap_page<T: DeserializeOwned>(
    page: &[Value],
    resource_key: &str,
) -> Result<(Vec<T>, Option<String>), ApiError> {
    let mut resources = Vec::with_capacity(page.len());
    let mut cursor = None;
    for item in page {
        if let Some(resource) = item.get(resource_key) {
            resources.push(serde_json::from_value(resource.clone())?);
        }
        cursor = item
            .get("cursor")
            .and_then(|c| c.as_str())
            .map(str::to_string);
    }
    Ok((resources, cursor))
}

fn unwrap_env_vars(items: &[Value]) -> Vec<EnvVar> {
    items
        .iter()
        .filter_map(|item| item.get("envVar"))
        .filter_map(|v| serde_json::from_value(v.clone()).ok())
        .collect()
}

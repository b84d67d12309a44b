//! Magento REST client
//!
//! Talks to `<base_url>/rest/V1` with a bearer integration token. Idempotent
//! requests are retried with exponential backoff on transient failures;
//! creates are only retried when the connection could not be opened.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;
use serde_json::{Map, Value};

use super::types::{PlatformError, StoreView};
use super::PlatformApi;
use crate::config::PlatformConfig;
use crate::content::{ContentRecord, ContentType};

const RETRY_BASE_DELAY: Duration = Duration::from_millis(500);

/// Upper bound on search pages fetched for one content type
const MAX_PAGES: u32 = 1000;

/// Magento admin API client
#[derive(Clone)]
pub struct MagentoClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
    max_retries: u32,
    page_size: u32,
    max_pages: u32,
}

impl MagentoClient {
    pub fn new(base_url: &str, token: &str, config: &PlatformConfig) -> Result<Self, PlatformError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| PlatformError::Transport(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            max_retries: config.max_retries,
            page_size: config.page_size.max(1),
            max_pages: MAX_PAGES,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/rest/V1/{}", self.base_url, path)
    }

    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Value, PlatformError> {
        let url = self.endpoint(path);
        let idempotent = method != Method::POST;
        let mut attempt = 0;

        loop {
            let mut builder = self
                .http
                .request(method.clone(), &url)
                .bearer_auth(&self.token);
            if let Some(body) = body {
                builder = builder.json(body);
            }

            let result = match builder.send().await {
                Ok(response) => read_response(response).await,
                Err(e) => Err(transport_error(&e)),
            };

            match result {
                Err(err) if attempt < self.max_retries && should_retry(&err, idempotent) => {
                    let delay = RETRY_BASE_DELAY * 2u32.saturating_pow(attempt);
                    tracing::warn!(
                        method = %method,
                        url = %url,
                        attempt = attempt + 1,
                        error = %err,
                        "Platform request failed, retrying in {:?}",
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    /// Resolve the platform entity id behind a natural key
    async fn find_entity_id(&self, content_type: ContentType, key: &str) -> Result<i64, PlatformError> {
        let query = search_query(1, 1, Some((content_type.natural_key(), key)));
        let path = format!("{}/search?{}", api_path(content_type), query);
        let body = self.request(Method::GET, &path, None).await?;

        body.get("items")
            .and_then(Value::as_array)
            .and_then(|items| items.first())
            .cloned()
            .and_then(ContentRecord::from_json)
            .and_then(|record| record.entity_id(content_type))
            .ok_or_else(|| {
                PlatformError::NotFound(format!(
                    "{} '{}' not found",
                    content_type.entity_name(),
                    key
                ))
            })
    }
}

#[async_trait]
impl PlatformApi for MagentoClient {
    async fn check_connection(&self) -> Result<Vec<StoreView>, PlatformError> {
        let body = self.request(Method::GET, "store/storeViews", None).await?;
        serde_json::from_value(body)
            .map_err(|e| PlatformError::InvalidResponse(format!("Unexpected store views payload: {}", e)))
    }

    async fn fetch_all(&self, content_type: ContentType) -> Result<Vec<ContentRecord>, PlatformError> {
        let mut records = Vec::new();
        let mut fetched = 0u64;

        for page in 1..=self.max_pages {
            let path = format!(
                "{}/search?{}",
                api_path(content_type),
                search_query(self.page_size, page, None)
            );
            let body = self.request(Method::GET, &path, None).await?;

            let items = body
                .get("items")
                .and_then(Value::as_array)
                .ok_or_else(|| PlatformError::InvalidResponse("Search result has no items".into()))?;
            let total = body.get("total_count").and_then(Value::as_u64);

            fetched += items.len() as u64;
            let short_page = items.len() < self.page_size as usize;

            let before = records.len();
            records.extend(items.iter().cloned().filter_map(ContentRecord::from_json));
            let skipped = items.len() - (records.len() - before);
            if skipped > 0 {
                tracing::warn!(
                    content_type = %content_type,
                    page,
                    skipped,
                    "Skipped search results that are not objects"
                );
            }

            // Magento repeats the last page when asked past the end
            if short_page || total.is_some_and(|t| fetched >= t) {
                tracing::debug!(
                    content_type = %content_type,
                    count = records.len(),
                    "Fetched content from {}",
                    self.base_url
                );
                return Ok(records);
            }
        }

        Err(PlatformError::InvalidResponse(format!(
            "{} search did not end within {} pages of {}",
            content_type.entity_name(),
            self.max_pages,
            self.page_size
        )))
    }

    async fn create(
        &self,
        content_type: ContentType,
        payload: &Map<String, Value>,
    ) -> Result<ContentRecord, PlatformError> {
        let mut envelope = Map::new();
        envelope.insert(content_type.entity_name().to_string(), Value::Object(payload.clone()));

        let body = self
            .request(Method::POST, api_path(content_type), Some(&Value::Object(envelope)))
            .await?;

        ContentRecord::from_json(body)
            .ok_or_else(|| PlatformError::InvalidResponse("Create returned no record".into()))
    }

    async fn update(
        &self,
        content_type: ContentType,
        key: &str,
        fields: &Map<String, Value>,
    ) -> Result<ContentRecord, PlatformError> {
        let id = self.find_entity_id(content_type, key).await?;

        let mut entity = fields.clone();
        entity.insert("id".to_string(), Value::from(id));
        let mut envelope = Map::new();
        envelope.insert(content_type.entity_name().to_string(), Value::Object(entity));

        let path = format!("{}/{}", api_path(content_type), id);
        let body = self
            .request(Method::PUT, &path, Some(&Value::Object(envelope)))
            .await?;

        ContentRecord::from_json(body)
            .ok_or_else(|| PlatformError::InvalidResponse("Update returned no record".into()))
    }
}

fn api_path(content_type: ContentType) -> &'static str {
    match content_type {
        ContentType::Blocks => "cmsBlock",
        ContentType::Pages => "cmsPage",
    }
}

/// Build a `searchCriteria` query string
fn search_query(page_size: u32, page: u32, filter: Option<(&str, &str)>) -> String {
    let mut params = vec![
        ("searchCriteria[pageSize]".to_string(), page_size.to_string()),
        ("searchCriteria[currentPage]".to_string(), page.to_string()),
    ];

    if let Some((field, value)) = filter {
        let prefix = "searchCriteria[filter_groups][0][filters][0]";
        params.push((format!("{}[field]", prefix), field.to_string()));
        params.push((format!("{}[value]", prefix), value.to_string()));
        params.push((format!("{}[condition_type]", prefix), "eq".to_string()));
    }

    params
        .iter()
        .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

fn should_retry(err: &PlatformError, idempotent: bool) -> bool {
    match err {
        PlatformError::Unreachable(_) => true,
        _ => idempotent && err.is_transient(),
    }
}

fn transport_error(err: &reqwest::Error) -> PlatformError {
    if err.is_timeout() {
        PlatformError::Timeout(err.to_string())
    } else if err.is_connect() {
        PlatformError::Unreachable(err.to_string())
    } else {
        PlatformError::Transport(err.to_string())
    }
}

async fn read_response(response: reqwest::Response) -> Result<Value, PlatformError> {
    let status = response.status();
    let text = response
        .text()
        .await
        .map_err(|e| PlatformError::InvalidResponse(format!("Failed to read body: {}", e)))?;

    if status.is_success() {
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        return serde_json::from_str(&text)
            .map_err(|e| PlatformError::InvalidResponse(format!("Malformed JSON: {}", e)));
    }

    let message = serde_json::from_str::<Value>(&text)
        .ok()
        .and_then(|body| {
            let message = body.get("message")?.as_str()?;
            Some(format_message(message, body.get("parameters")))
        })
        .unwrap_or_else(|| {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                status.canonical_reason().unwrap_or("Unknown error").to_string()
            } else {
                trimmed.to_string()
            }
        });

    Err(PlatformError::from_status(status.as_u16(), message))
}

/// Substitute Magento `%1` / `%name` placeholders
fn format_message(message: &str, parameters: Option<&Value>) -> String {
    let mut formatted = message.to_string();

    match parameters {
        Some(Value::Array(values)) => {
            // Replace from the highest index so %1 does not clobber %10
            for (i, value) in values.iter().enumerate().rev() {
                formatted = formatted.replace(&format!("%{}", i + 1), &param_text(value));
            }
        }
        Some(Value::Object(values)) => {
            for (name, value) in values {
                formatted = formatted.replace(&format!("%{}", name), &param_text(value));
            }
        }
        _ => {}
    }

    formatted
}

fn param_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

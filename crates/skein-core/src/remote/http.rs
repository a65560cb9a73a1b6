//! HTTP remote store client

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;

use super::{Filter, RemoteStore};
use crate::error::{Error, Result};
use crate::util::{compact_text, is_http_url, normalize_text_option};

/// REST client over the remote CRUD boundary.
///
/// Speaks a plain `/v1/{table}` dialect: equality filters become query
/// parameters, single records live at `/v1/{table}/{id}`.
#[derive(Clone)]
pub struct HttpRemoteStore {
    client: reqwest::Client,
    base_url: String,
}

impl HttpRemoteStore {
    /// Create a client against the given base URL.
    pub fn new(
        base_url: impl Into<String>,
        auth_token: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let base_url = normalize_base_url(base_url.into())?;

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        if let Some(token) = normalize_text_option(auth_token) {
            let mut value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|_| Error::InvalidInput("auth token contains invalid bytes".into()))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        Ok(Self {
            client: reqwest::Client::builder()
                .timeout(timeout)
                .default_headers(headers)
                .build()?,
            base_url,
        })
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/v1/{table}", self.base_url)
    }

    fn record_url(&self, table: &str, id: &str) -> String {
        format!("{}/v1/{table}/{id}", self.base_url)
    }
}

#[async_trait]
impl RemoteStore for HttpRemoteStore {
    async fn select(&self, table: &str, filter: &Filter) -> Result<Vec<Value>> {
        let mut query: Vec<(String, String)> = filter
            .eq_pairs()
            .iter()
            .map(|(field, value)| (field.clone(), query_param_value(value)))
            .collect();
        if let Some(limit) = filter.row_limit() {
            query.push(("limit".to_string(), limit.to_string()));
        }

        let response = self
            .client
            .get(self.table_url(table))
            .query(&query)
            .send()
            .await?;
        let response = ensure_success(response).await?;
        Ok(response.json::<Vec<Value>>().await?)
    }

    async fn insert(&self, table: &str, record: &Value) -> Result<()> {
        let response = self
            .client
            .post(self.table_url(table))
            .json(record)
            .send()
            .await?;
        ensure_success(response).await?;
        Ok(())
    }

    async fn update(&self, table: &str, id: &str, record: &Value) -> Result<()> {
        let response = self
            .client
            .patch(self.record_url(table, id))
            .json(record)
            .send()
            .await?;
        ensure_success(response).await?;
        Ok(())
    }

    async fn delete(&self, table: &str, id: &str) -> Result<()> {
        let response = self
            .client
            .delete(self.record_url(table, id))
            .send()
            .await?;
        // A delete for an id the remote never saw is not a failure
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        ensure_success(response).await?;
        Ok(())
    }
}

/// Pass 2xx responses through; everything else becomes a `RemoteRejection`
/// with the message pulled out of the JSON error body when there is one.
async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    Err(Error::RemoteRejection {
        status: status.as_u16(),
        message: parse_api_error(status, &body),
    })
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<String>,
    message: Option<String>,
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ApiErrorBody>(body) {
        if let Some(message) = payload.message.or(payload.error) {
            return message.trim().to_string();
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        compact_text(trimmed)
    }
}

/// Filter values become query parameters: strings as-is, everything else in
/// its JSON text form.
fn query_param_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn normalize_base_url(raw: String) -> Result<String> {
    let url = normalize_text_option(Some(raw))
        .ok_or_else(|| Error::InvalidInput("remote base URL must not be empty".to_string()))?;
    if is_http_url(&url) {
        Ok(url.trim_end_matches('/').to_string())
    } else {
        Err(Error::InvalidInput(
            "remote base URL must include http:// or https://".to_string(),
        ))
    }
}

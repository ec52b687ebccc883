//! Remote store backed by a JSON document API.
//!
//! Layout: `{base}/v1/{collection}/{id}` for single documents and
//! `{base}/v1/{collection}?field=value` for filtered listings. Broadcast
//! statuses live under `broadcasts/{broadcast_id}/statuses`.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use std::marker::PhantomData;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::filter::Filter;
use crate::models::{RecordId, SyncedRecord};
use crate::sync::{RemoteStore, RemoteSubscription};
use crate::util::{compact_text, is_http_url, normalize_text_option};

const REQUEST_TIMEOUT_SECS: u64 = 10;

/// Default delay between polls of an observed collection
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

pub struct HttpRemoteStore<T> {
    base_url: String,
    collection: String,
    auth_token: Option<String>,
    poll_interval: Duration,
    client: reqwest::Client,
    _record: PhantomData<fn() -> T>,
}

impl<T> Clone for HttpRemoteStore<T> {
    fn clone(&self) -> Self {
        Self {
            base_url: self.base_url.clone(),
            collection: self.collection.clone(),
            auth_token: self.auth_token.clone(),
            poll_interval: self.poll_interval,
            client: self.client.clone(),
            _record: PhantomData,
        }
    }
}

impl<T> std::fmt::Debug for HttpRemoteStore<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpRemoteStore")
            .field("base_url", &self.base_url)
            .field("collection", &self.collection)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "[REDACTED]"))
            .field("poll_interval", &self.poll_interval)
            .finish_non_exhaustive()
    }
}

/// Why a poll produced no snapshot
enum PollError {
    /// Worth retrying on the next tick
    Transient(String),
    /// The subscription can never succeed
    Permanent(String),
}

impl<T: SyncedRecord> HttpRemoteStore<T> {
    pub fn new(base_url: impl Into<String>, auth_token: Option<String>) -> Result<Self> {
        let base_url = normalize_endpoint(base_url.into())?;
        Ok(Self {
            base_url,
            collection: T::KIND.collection().to_string(),
            auth_token: normalize_text_option(auth_token),
            poll_interval: DEFAULT_POLL_INTERVAL,
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
                .build()?,
            _record: PhantomData,
        })
    }

    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Address the sub-collection owned by `parent_id`
    pub fn nested_under(mut self, parent_id: &RecordId) -> Result<Self> {
        let parent = T::KIND.parent().ok_or_else(|| {
            Error::InvalidInput(format!("{} is not a nested collection", T::KIND))
        })?;
        self.collection = format!(
            "{}/{}/{}",
            parent.collection(),
            urlencoding::encode(parent_id.as_str()),
            T::KIND.collection()
        );
        Ok(self)
    }

    pub fn collection_url(&self) -> String {
        format!("{}/v1/{}", self.base_url, self.collection)
    }

    pub fn document_url(&self, id: &RecordId) -> String {
        format!(
            "{}/{}",
            self.collection_url(),
            urlencoding::encode(id.as_str())
        )
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let request = request.header(reqwest::header::ACCEPT, "application/json");
        match &self.auth_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn list(&self, filter: &Filter) -> std::result::Result<Vec<T>, PollError> {
        let response = self
            .authorize(self.client.get(self.collection_url()))
            .query(&filter.to_query_pairs())
            .send()
            .await
            .map_err(|error| PollError::Transient(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = parse_api_error(status, &body);
            return Err(if is_permanent(status) {
                PollError::Permanent(message)
            } else {
                PollError::Transient(message)
            });
        }

        let mut records = response
            .json::<Vec<T>>()
            .await
            .map_err(|error| PollError::Transient(format!("invalid listing payload: {error}")))?;
        records.sort_by(T::display_order);
        Ok(records)
    }
}

#[async_trait]
impl<T: SyncedRecord> RemoteStore<T> for HttpRemoteStore<T> {
    async fn save(&self, record: &T) -> Result<()> {
        let response = self
            .authorize(self.client.put(self.document_url(record.id())))
            .json(&record.for_remote())
            .send()
            .await?;
        check_status(response).await?;
        tracing::debug!("Saved {} {} remotely", T::KIND, record.id());
        Ok(())
    }

    async fn delete(&self, id: &RecordId) -> Result<()> {
        let response = self
            .authorize(self.client.delete(self.document_url(id)))
            .send()
            .await?;
        // Already gone counts as deleted
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        check_status(response).await
    }

    fn observe(&self, filter: Filter) -> RemoteSubscription<T> {
        let (publisher, subscription) = RemoteSubscription::channel();
        let store = self.clone();
        tokio::spawn(async move {
            loop {
                match store.list(&filter).await {
                    Ok(records) => {
                        publisher.publish(records);
                    }
                    Err(PollError::Permanent(message)) => {
                        tracing::warn!("Polling {} stopped: {message}", store.collection);
                        publisher.fail(message);
                        break;
                    }
                    Err(PollError::Transient(message)) => {
                        tracing::debug!("Polling {} stalled: {message}", store.collection);
                    }
                }

                tokio::select! {
                    () = publisher.closed() => break,
                    () = tokio::time::sleep(store.poll_interval) => {}
                }
            }
        });
        subscription
    }

    async fn fetch_once(&self, filter: &Filter) -> Result<Vec<T>> {
        self.list(filter).await.map_err(|error| match error {
            PollError::Transient(message) | PollError::Permanent(message) => Error::Remote(message),
        })
    }
}

async fn check_status(response: reqwest::Response) -> Result<()> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    let body = response.text().await.unwrap_or_default();
    Err(Error::Remote(parse_api_error(status, &body)))
}

/// Statuses after which polling can never succeed
const fn is_permanent(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::NOT_FOUND | StatusCode::GONE
    )
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<String>,
    message: Option<String>,
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ApiErrorBody>(body) {
        if let Some(message) = payload.message.or(payload.error) {
            return format!("{} ({})", message.trim(), status.as_u16());
        }
    }

    let trimmed = compact_text(body);
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{} ({})", trimmed, status.as_u16())
    }
}

fn normalize_endpoint(raw: String) -> Result<String> {
    let endpoint = normalize_text_option(Some(raw))
        .ok_or_else(|| Error::Config("remote base URL must not be empty".to_string()))?;
    if is_http_url(&endpoint) {
        Ok(endpoint.trim_end_matches('/').to_string())
    } else {
        Err(Error::Config(
            "remote base URL must include http:// or https://".to_string(),
        ))
    }
}

//! REST implementation of [`RemoteApi`]
//!
//! Endpoints live under `{base_url}/v1/{collection}`:
//! `GET ?owner=`, `POST`, `PUT /{id}` and `DELETE /{id}`. Responses may be
//! bare JSON or wrapped as `{"data": ...}`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::{RemoteApi, RemoteError, RemoteResult};
use crate::auth::AuthState;
use crate::models::Syncable;
use crate::util::{compact_text, is_http_url, normalize_text_option};

const HTTP_TIMEOUT_SECS: u64 = 15;

#[derive(Clone)]
pub struct HttpRemoteApi {
    base_url: String,
    client: Client,
}

impl HttpRemoteApi {
    pub fn new(base_url: impl Into<String>) -> RemoteResult<Self> {
        let base_url = normalize_base_url(base_url.into())?;
        let client = Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()
            .map_err(|error| RemoteError::Unexpected(format!("failed to build client: {error}")))?;
        Ok(Self { base_url, client })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn collection_url<T: Syncable>(&self) -> String {
        format!("{}/v1/{}", self.base_url, T::KIND.collection())
    }

    fn item_url<T: Syncable>(&self, item: &T) -> String {
        format!("{}/{}", self.collection_url::<T>(), item.id())
    }
}

#[async_trait]
impl<T: Syncable> RemoteApi<T> for HttpRemoteApi {
    async fn fetch(&self, owner: &str, auth: &AuthState) -> RemoteResult<Vec<T>> {
        let request = self
            .client
            .get(self.collection_url::<T>())
            .query(&[("owner", owner)]);
        let body = send(with_auth(request, auth)).await?;
        decode(&body)
    }

    async fn create(&self, item: &T, auth: &AuthState) -> RemoteResult<T> {
        let request = self.client.post(self.collection_url::<T>()).json(item);
        let body = send(with_auth(request, auth)).await?;
        decode_or(&body, item)
    }

    async fn update(&self, item: &T, auth: &AuthState) -> RemoteResult<T> {
        let request = self.client.put(self.item_url(item)).json(item);
        let body = send(with_auth(request, auth)).await?;
        decode_or(&body, item)
    }

    async fn delete(&self, item: &T, auth: &AuthState) -> RemoteResult<()> {
        let request = self.client.delete(self.item_url(item));
        send(with_auth(request, auth)).await?;
        Ok(())
    }
}

fn with_auth(request: RequestBuilder, auth: &AuthState) -> RequestBuilder {
    let request = request.header(reqwest::header::ACCEPT, "application/json");
    match auth.bearer() {
        Some(token) => request.bearer_auth(token),
        None => request,
    }
}

/// Send a request and return the body of a successful response.
async fn send(request: RequestBuilder) -> RemoteResult<String> {
    let response = request
        .send()
        .await
        .map_err(|error| RemoteError::Network(error.to_string()))?;

    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|error| RemoteError::Network(format!("failed to read response body: {error}")))?;

    if status.is_success() {
        Ok(body)
    } else {
        Err(classify_status(status, &body))
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Payload<D> {
    Wrapped { data: D },
    Bare(D),
}

impl<D> Payload<D> {
    fn into_inner(self) -> D {
        match self {
            Self::Wrapped { data } | Self::Bare(data) => data,
        }
    }
}

fn decode<D: DeserializeOwned>(body: &str) -> RemoteResult<D> {
    serde_json::from_str::<Payload<D>>(body)
        .map(Payload::into_inner)
        .map_err(|error| RemoteError::Decode(error.to_string()))
}

/// Servers may answer writes with an empty body; echo the sent item then.
fn decode_or<T: Syncable>(body: &str, sent: &T) -> RemoteResult<T> {
    if body.trim().is_empty() {
        Ok(sent.clone())
    } else {
        decode(body)
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<String>,
    message: Option<String>,
}

fn classify_status(status: StatusCode, body: &str) -> RemoteError {
    let message = parse_api_error(status, body);
    match status.as_u16() {
        400 | 422 => RemoteError::Validation(message),
        401 | 403 => RemoteError::Unauthorized(message),
        404 => RemoteError::NotFound(message),
        409 => RemoteError::Conflict(message),
        _ => RemoteError::Unexpected(message),
    }
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

fn normalize_base_url(raw: String) -> RemoteResult<String> {
    let url = normalize_text_option(Some(raw))
        .ok_or_else(|| RemoteError::Validation("base URL must not be empty".to_string()))?;
    if is_http_url(&url) {
        Ok(url.trim_end_matches('/').to_string())
    } else {
        Err(RemoteError::Validation(
            "base URL must include http:// or https://".to_string(),
        ))
    }
}

//! REST and RPC client for backend tables.

use std::sync::Arc;

use reqwest::{Method, RequestBuilder, Response, StatusCode};
use secrecy::ExposeSecret;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::instrument;

use super::{BackendError, Bearer, Query};
use crate::config::BackendConfig;

/// Error body returned by the REST layer.
#[derive(Debug, serde::Deserialize)]
struct RestErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    details: Option<String>,
}

/// Client for the backend's REST tables and RPC functions.
///
/// Cheap to clone; all clones share one connection pool.
#[derive(Clone)]
pub struct BackendClient {
    inner: Arc<BackendClientInner>,
}

struct BackendClientInner {
    client: reqwest::Client,
    rest_url: String,
    anon_key: String,
}

impl BackendClient {
    /// Create a new backend client.
    #[must_use]
    pub fn new(config: &BackendConfig) -> Self {
        let base = config.url.as_str().trim_end_matches('/');
        Self {
            inner: Arc::new(BackendClientInner {
                client: reqwest::Client::new(),
                rest_url: format!("{base}/rest/v1"),
                anon_key: config.anon_key.expose_secret().to_string(),
            }),
        }
    }

    /// Read rows matching `query`.
    ///
    /// # Errors
    ///
    /// Returns `BackendError` if the request fails or rows cannot be parsed.
    #[instrument(skip(self, bearer), fields(table = %query.table_name()))]
    pub async fn select<T: DeserializeOwned>(
        &self,
        query: &Query,
        bearer: Bearer<'_>,
    ) -> Result<Vec<T>, BackendError> {
        let response = self.table_request(Method::GET, query, bearer).send().await?;
        let body = read_body(response).await?;
        parse_body(&body)
    }

    /// Read the first row matching `query`, if any.
    ///
    /// A "no rows" response is `Ok(None)`, not an error.
    ///
    /// # Errors
    ///
    /// Returns `BackendError` if the request fails or the row cannot be parsed.
    pub async fn select_one<T: DeserializeOwned>(
        &self,
        query: &Query,
        bearer: Bearer<'_>,
    ) -> Result<Option<T>, BackendError> {
        match self.select::<T>(query, bearer).await {
            Ok(rows) => Ok(rows.into_iter().next()),
            Err(e) if e.is_no_rows() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Insert `body` (a row or an array of rows) without reading it back.
    ///
    /// # Errors
    ///
    /// Returns `BackendError` if the request fails.
    #[instrument(skip(self, body, bearer), fields(table = %query.table_name()))]
    pub async fn insert<B: Serialize + Sync + ?Sized>(
        &self,
        query: &Query,
        body: &B,
        bearer: Bearer<'_>,
    ) -> Result<(), BackendError> {
        let response = self
            .table_request(Method::POST, query, bearer)
            .header("Prefer", "return=minimal")
            .json(body)
            .send()
            .await?;
        read_body(response).await.map(drop)
    }

    /// Insert `body` and return the stored rows.
    ///
    /// # Errors
    ///
    /// Returns `BackendError` if the request fails or rows cannot be parsed.
    #[instrument(skip(self, body, bearer), fields(table = %query.table_name()))]
    pub async fn insert_returning<B, T>(
        &self,
        query: &Query,
        body: &B,
        bearer: Bearer<'_>,
    ) -> Result<Vec<T>, BackendError>
    where
        B: Serialize + Sync + ?Sized,
        T: DeserializeOwned,
    {
        let response = self
            .table_request(Method::POST, query, bearer)
            .header("Prefer", "return=representation")
            .json(body)
            .send()
            .await?;
        let body = read_body(response).await?;
        parse_body(&body)
    }

    /// Insert or merge `body` on the query's `on_conflict` target.
    ///
    /// # Errors
    ///
    /// Returns `BackendError` if the request fails.
    #[instrument(skip(self, body, bearer), fields(table = %query.table_name()))]
    pub async fn upsert<B: Serialize + Sync + ?Sized>(
        &self,
        query: &Query,
        body: &B,
        bearer: Bearer<'_>,
    ) -> Result<(), BackendError> {
        let response = self
            .table_request(Method::POST, query, bearer)
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(body)
            .send()
            .await?;
        read_body(response).await.map(drop)
    }

    /// Patch rows matching the query's filters.
    ///
    /// # Errors
    ///
    /// Returns `BackendError` if the request fails.
    #[instrument(skip(self, body, bearer), fields(table = %query.table_name()))]
    pub async fn update<B: Serialize + Sync + ?Sized>(
        &self,
        query: &Query,
        body: &B,
        bearer: Bearer<'_>,
    ) -> Result<(), BackendError> {
        let response = self
            .table_request(Method::PATCH, query, bearer)
            .header("Prefer", "return=minimal")
            .json(body)
            .send()
            .await?;
        read_body(response).await.map(drop)
    }

    /// Update rows matching the query's filters and return them.
    ///
    /// # Errors
    ///
    /// Returns `BackendError` if the request fails or the response cannot be
    /// parsed.
    #[instrument(skip(self, body, bearer), fields(table = %query.table_name()))]
    pub async fn update_returning<B, T>(
        &self,
        query: &Query,
        body: &B,
        bearer: Bearer<'_>,
    ) -> Result<Vec<T>, BackendError>
    where
        B: Serialize + Sync + ?Sized,
        T: DeserializeOwned,
    {
        let response = self
            .table_request(Method::PATCH, query, bearer)
            .header("Prefer", "return=representation")
            .json(body)
            .send()
            .await?;
        let body = read_body(response).await?;
        parse_body(&body)
    }

    /// Delete rows matching the query's filters.
    ///
    /// # Errors
    ///
    /// Returns `BackendError` if the request fails.
    #[instrument(skip(self, bearer), fields(table = %query.table_name()))]
    pub async fn delete(&self, query: &Query, bearer: Bearer<'_>) -> Result<(), BackendError> {
        let response = self
            .table_request(Method::DELETE, query, bearer)
            .send()
            .await?;
        read_body(response).await.map(drop)
    }

    /// Call a remote procedure.
    ///
    /// Void functions answer with an empty body, which parses as `null`, so
    /// `T` may be `()`, `Option<_>`, or `serde_json::Value` for them.
    ///
    /// # Errors
    ///
    /// Returns `BackendError` if the call fails or the result cannot be parsed.
    #[instrument(skip(self, args, bearer))]
    pub async fn rpc<A, T>(
        &self,
        function: &str,
        args: &A,
        bearer: Bearer<'_>,
    ) -> Result<T, BackendError>
    where
        A: Serialize + Sync + ?Sized,
        T: DeserializeOwned,
    {
        let url = format!("{}/rpc/{function}", self.inner.rest_url);
        let response = self
            .authorized(self.inner.client.post(url), bearer)
            .json(args)
            .send()
            .await?;
        let body = read_body(response).await?;
        if body.trim().is_empty() {
            return Ok(serde_json::from_str("null")?);
        }
        parse_body(&body)
    }

    /// Cheapest possible round trip, used by the connectivity heartbeat.
    ///
    /// # Errors
    ///
    /// Returns `BackendError` if the backend is unreachable or rejects the request.
    pub async fn ping(&self) -> Result<(), BackendError> {
        let query = Query::table("profiles").select("id").limit(1);
        self.select::<serde_json::Value>(&query, Bearer::Anon)
            .await
            .map(drop)
    }

    fn table_request(&self, method: Method, query: &Query, bearer: Bearer<'_>) -> RequestBuilder {
        let url = format!("{}/{}", self.inner.rest_url, query.table_name());
        let builder = self.inner.client.request(method, url).query(query.params());
        self.authorized(builder, bearer)
    }

    fn authorized(&self, builder: RequestBuilder, bearer: Bearer<'_>) -> RequestBuilder {
        let token = match bearer {
            Bearer::Anon => self.inner.anon_key.as_str(),
            Bearer::User(token) => token,
        };
        builder
            .header("apikey", &self.inner.anon_key)
            .bearer_auth(token)
    }
}

/// Read a response body, mapping non-success statuses to `BackendError`.
async fn read_body(response: Response) -> Result<String, BackendError> {
    let status = response.status();

    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get("Retry-After")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(1);
        return Err(BackendError::RateLimited(retry_after));
    }

    // Get response body as text first for better error diagnostics
    let text = response.text().await?;

    if !status.is_success() {
        let error = api_error(status, &text);
        if error.is_no_rows() {
            tracing::debug!(status = %status, "Backend lookup matched no rows");
        } else {
            tracing::error!(
                status = %status,
                body = %text.chars().take(500).collect::<String>(),
                "Backend returned non-success status"
            );
        }
        return Err(error);
    }

    Ok(text)
}

fn parse_body<T: DeserializeOwned>(body: &str) -> Result<T, BackendError> {
    serde_json::from_str(body).map_err(|e| {
        tracing::error!(
            error = %e,
            body = %body.chars().take(500).collect::<String>(),
            "Failed to parse backend response"
        );
        BackendError::Parse(e)
    })
}

fn api_error(status: StatusCode, body: &str) -> BackendError {
    let parsed: Option<RestErrorBody> = serde_json::from_str(body).ok();
    let (code, message) = match parsed {
        Some(err) => {
            let message = err
                .message
                .or(err.details)
                .unwrap_or_else(|| status.to_string());
            (err.code, message)
        }
        None => (None, body.chars().take(200).collect()),
    };
    BackendError::Api {
        status: status.as_u16(),
        code,
        message,
    }
}

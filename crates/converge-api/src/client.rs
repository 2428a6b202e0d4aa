// Remote API client: the trait the engine consumes, plus a JSON/REST
// implementation over reqwest.
//
// Base path: {endpoint}/v1/
// Auth: `Authorization: Bearer <token>` header

use std::future::Future;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use crate::Error;
use crate::kind::ResourceKind;
use crate::transport::TransportConfig;
use crate::types::Page;

const DEFAULT_PAGE_SIZE: i32 = 50;

// ── RemoteApi ────────────────────────────────────────────────────────

/// Filter for `list` calls.
#[derive(Debug, Clone)]
pub struct ListFilter {
    pub name: Option<String>,
    pub status: Option<String>,
    pub page_size: i32,
}

impl Default for ListFilter {
    fn default() -> Self {
        Self {
            name: None,
            status: None,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl ListFilter {
    fn query(&self) -> Vec<(&'static str, String)> {
        let mut params = Vec::new();
        if let Some(ref name) = self.name {
            params.push(("name", name.clone()));
        }
        if let Some(ref status) = self.status {
            params.push(("status", status.clone()));
        }
        params
    }
}

/// Request/response access to remote resources.
///
/// Every call is a single exchange: mutations return as soon as the
/// remote side accepted them, long before the resource settles. Waiting
/// is the caller's job.
///
/// Implementations must be safe for concurrent use and must not hold
/// mutable per-request state.
#[async_trait]
pub trait RemoteApi: Send + Sync {
    async fn create<K: ResourceKind>(
        &self,
        collection: &str,
        request: &K::Create,
    ) -> Result<K::Entity, Error>;

    async fn get<K: ResourceKind>(&self, path: &str) -> Result<K::Entity, Error>;

    async fn update<K: ResourceKind>(
        &self,
        path: &str,
        patch: &K::Patch,
    ) -> Result<K::Entity, Error>;

    async fn delete<K: ResourceKind>(&self, path: &str) -> Result<(), Error>;

    async fn list<K: ResourceKind>(
        &self,
        collection: &str,
        filter: &ListFilter,
    ) -> Result<Vec<K::Entity>, Error>;
}

// ── Error response shape ─────────────────────────────────────────────

#[derive(serde::Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    code: Option<String>,
}

// ── HttpClient ───────────────────────────────────────────────────────

/// JSON/REST implementation of [`RemoteApi`].
///
/// Cheap to clone: `reqwest::Client` is reference counted internally.
#[derive(Debug, Clone)]
pub struct HttpClient {
    http: reqwest::Client,
    base_url: Url,
}

impl HttpClient {
    // ── Constructors ─────────────────────────────────────────────────

    /// Build from a bearer token and transport config.
    ///
    /// Injects `Authorization` as a sensitive default header on every request.
    pub fn from_token(
        base_url: &str,
        token: &SecretString,
        transport: &TransportConfig,
    ) -> Result<Self, Error> {
        let mut headers = HeaderMap::new();
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", token.expose_secret()))
            .map_err(|e| Error::Authentication {
                message: format!("invalid token header value: {e}"),
            })?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);

        let http = transport.build_client_with_headers(headers)?;
        let base_url = Self::normalize_base_url(base_url)?;

        Ok(Self { http, base_url })
    }

    /// Wrap an existing `reqwest::Client` (caller manages auth headers).
    pub fn from_reqwest(base_url: &str, http: reqwest::Client) -> Result<Self, Error> {
        let base_url = Self::normalize_base_url(base_url)?;
        Ok(Self { http, base_url })
    }

    /// Ensure the base URL ends with `/` so relative joins keep its path.
    fn normalize_base_url(raw: &str) -> Result<Url, Error> {
        let mut url = Url::parse(raw)?;
        let path = url.path().trim_end_matches('/').to_owned();
        url.set_path(&format!("{path}/"));
        Ok(url)
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    // ── URL builder ──────────────────────────────────────────────────

    fn url(&self, path: &str) -> Result<Url, Error> {
        Ok(self.base_url.join(path.trim_start_matches('/'))?)
    }

    // ── HTTP verbs ───────────────────────────────────────────────────

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, Error> {
        let url = self.url(path)?;
        debug!("GET {url}");

        let resp = self.http.get(url).send().await?;
        self.handle_response(resp).await
    }

    async fn get_with_params<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T, Error> {
        let url = self.url(path)?;
        debug!("GET {url} params={params:?}");

        let resp = self.http.get(url).query(params).send().await?;
        self.handle_response(resp).await
    }

    async fn post<T: DeserializeOwned, B: Serialize + Sync>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, Error> {
        let url = self.url(path)?;
        debug!("POST {url}");

        let resp = self.http.post(url).json(body).send().await?;
        self.handle_response(resp).await
    }

    async fn patch<T: DeserializeOwned, B: Serialize + Sync>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, Error> {
        let url = self.url(path)?;
        debug!("PATCH {url}");

        let resp = self.http.patch(url).json(body).send().await?;
        self.handle_response(resp).await
    }

    async fn delete_empty(&self, path: &str) -> Result<(), Error> {
        let url = self.url(path)?;
        debug!("DELETE {url}");

        let resp = self.http.delete(url).send().await?;
        self.handle_empty(resp).await
    }

    // ── Response handling ────────────────────────────────────────────

    async fn handle_response<T: DeserializeOwned>(
        &self,
        resp: reqwest::Response,
    ) -> Result<T, Error> {
        let status = resp.status();
        if status.is_success() {
            let body = resp.text().await?;
            serde_json::from_str(&body).map_err(|e| {
                let preview: String = body.chars().take(200).collect();
                Error::Deserialization {
                    message: format!("{e} (body preview: {preview:?})"),
                    body,
                }
            })
        } else {
            Err(self.parse_error(status, resp).await)
        }
    }

    async fn handle_empty(&self, resp: reqwest::Response) -> Result<(), Error> {
        let status = resp.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(self.parse_error(status, resp).await)
        }
    }

    async fn parse_error(&self, status: reqwest::StatusCode, resp: reqwest::Response) -> Error {
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Error::Authentication {
                message: "token rejected by endpoint".into(),
            };
        }

        let raw = resp.text().await.unwrap_or_default();

        if let Ok(err) = serde_json::from_str::<ErrorResponse>(&raw) {
            Error::Api {
                status: status.as_u16(),
                message: err.message.unwrap_or_else(|| status.to_string()),
                code: err.code,
            }
        } else {
            Error::Api {
                status: status.as_u16(),
                message: if raw.is_empty() {
                    status.to_string()
                } else {
                    raw
                },
                code: None,
            }
        }
    }

    // ── Pagination helper ────────────────────────────────────────────

    /// Collect all pages into a single `Vec<T>`.
    pub async fn paginate_all<T, F, Fut>(&self, limit: i32, fetch: F) -> Result<Vec<T>, Error>
    where
        F: Fn(i64, i32) -> Fut,
        Fut: Future<Output = Result<Page<T>, Error>>,
    {
        let mut all = Vec::new();
        let mut offset: i64 = 0;

        loop {
            let page = fetch(offset, limit).await?;
            let received = page.data.len();
            all.extend(page.data);

            let limit_usize = usize::try_from(limit).unwrap_or(0);
            if received == 0
                || received < limit_usize
                || i64::try_from(all.len()).unwrap_or(i64::MAX) >= page.total_count
            {
                break;
            }

            offset += i64::try_from(received).unwrap_or(i64::MAX);
        }

        Ok(all)
    }
}

#[async_trait]
impl RemoteApi for HttpClient {
    async fn create<K: ResourceKind>(
        &self,
        collection: &str,
        request: &K::Create,
    ) -> Result<K::Entity, Error> {
        debug!(kind = K::KIND, "create");
        self.post(collection, request).await
    }

    async fn get<K: ResourceKind>(&self, path: &str) -> Result<K::Entity, Error> {
        self.get_json(path).await
    }

    async fn update<K: ResourceKind>(
        &self,
        path: &str,
        patch: &K::Patch,
    ) -> Result<K::Entity, Error> {
        debug!(kind = K::KIND, "update");
        self.patch(path, patch).await
    }

    async fn delete<K: ResourceKind>(&self, path: &str) -> Result<(), Error> {
        debug!(kind = K::KIND, "delete");
        self.delete_empty(path).await
    }

    async fn list<K: ResourceKind>(
        &self,
        collection: &str,
        filter: &ListFilter,
    ) -> Result<Vec<K::Entity>, Error> {
        let extra = filter.query();
        self.paginate_all(filter.page_size, |offset, limit| {
            let mut params = extra.clone();
            params.push(("offset", offset.to_string()));
            params.push(("limit", limit.to_string()));
            async move {
                self.get_with_params::<Page<K::Entity>>(collection, &params)
                    .await
            }
        })
        .await
    }
}

//! Outbound HTTP plumbing shared by every service client.
//!
//! Service clients build [`UpstreamRequest`]s and hand them to an [`HttpTransport`].
//! Production uses reqwest with a uniform per-call timeout; tests swap in a scripted
//! transport. Batch helpers ([`settled`], [`enrich_each`]) implement the
//! "settle everything, default the failures" policy of the aggregation handlers.

use async_trait::async_trait;
use futures::future::join_all;
use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct UpstreamRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(&'static str, String)>,
    pub form: Option<Vec<(&'static str, String)>>,
}

impl UpstreamRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            url: url.into(),
            headers: Vec::new(),
            form: None,
        }
    }

    pub fn post_form(url: impl Into<String>, form: Vec<(&'static str, String)>) -> Self {
        Self {
            method: Method::POST,
            url: url.into(),
            headers: Vec::new(),
            form: Some(form),
        }
    }

    pub fn header(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.headers.push((name, value.into()));
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct UpstreamResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl UpstreamResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// First header value matching `name`, case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn looks_like_html(&self) -> bool {
        let content_type_html = self
            .header("content-type")
            .is_some_and(|ct| ct.contains("text/html"));
        let body = self.body.trim_start();
        content_type_html
            || body.starts_with("<!DOCTYPE")
            || body.starts_with("<!doctype")
            || body.starts_with("<html")
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, UpstreamError> {
        serde_json::from_str(&self.body).map_err(|e| {
            if self.looks_like_html() {
                UpstreamError::Decode("received HTML where JSON was expected".to_string())
            } else {
                UpstreamError::Decode(e.to_string())
            }
        })
    }
}

#[derive(thiserror::Error, Debug, Clone)]
pub enum UpstreamError {
    #[error("request to {0} timed out")]
    Timeout(String),

    #[error("connection failed: {0}")]
    Transport(String),

    #[error("upstream returned HTTP {status}")]
    Status { status: u16, body: String },

    #[error("unexpected response: {0}")]
    Decode(String),
}

#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn execute(&self, request: UpstreamRequest) -> Result<UpstreamResponse, UpstreamError>;
}

/// reqwest-backed transport. The client-level timeout bounds every call.
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("dasharr/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn execute(&self, request: UpstreamRequest) -> Result<UpstreamResponse, UpstreamError> {
        let mut builder = self.client.request(request.method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(*name, value);
        }
        if let Some(form) = &request.form {
            builder = builder.form(form);
        }

        let resp = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                UpstreamError::Timeout(request.url.clone())
            } else {
                UpstreamError::Transport(e.to_string())
            }
        })?;

        let status = resp.status().as_u16();
        let headers = resp
            .headers()
            .iter()
            .filter_map(|(k, v)| Some((k.as_str().to_string(), v.to_str().ok()?.to_string())))
            .collect();
        let body = resp.text().await.map_err(|e| {
            if e.is_timeout() {
                UpstreamError::Timeout(request.url.clone())
            } else {
                UpstreamError::Transport(e.to_string())
            }
        })?;

        Ok(UpstreamResponse {
            status,
            headers,
            body,
        })
    }
}

/// Cheap handle over the shared transport.
#[derive(Clone)]
pub struct Upstream {
    transport: Arc<dyn HttpTransport>,
}

impl Upstream {
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self { transport }
    }

    /// Sends the request without interpreting the status code.
    pub async fn raw(&self, request: UpstreamRequest) -> Result<UpstreamResponse, UpstreamError> {
        self.transport.execute(request).await
    }

    /// Sends the request and turns non-2xx into [`UpstreamError::Status`].
    pub async fn send(&self, request: UpstreamRequest) -> Result<UpstreamResponse, UpstreamError> {
        let resp = self.transport.execute(request).await?;
        if !resp.is_success() {
            return Err(UpstreamError::Status {
                status: resp.status,
                body: resp.body.chars().take(200).collect(),
            });
        }
        Ok(resp)
    }

    pub async fn get_json<T: DeserializeOwned>(
        &self,
        request: UpstreamRequest,
    ) -> Result<T, UpstreamError> {
        self.send(request).await?.json()
    }

    pub async fn get_text(&self, request: UpstreamRequest) -> Result<String, UpstreamError> {
        Ok(self.send(request).await?.body)
    }
}

/// Unwraps one settled batch member. A rejection is logged and becomes `None`.
pub fn settled<T>(instance: &str, call: &'static str, result: Result<T, UpstreamError>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(instance, call, error = %e, "upstream call failed, using default");
            None
        }
    }
}

/// Like [`settled`] but substitutes `T::default()` for a rejection.
pub fn settled_or_default<T: Default>(
    instance: &str,
    call: &'static str,
    result: Result<T, UpstreamError>,
) -> T {
    settled(instance, call, result).unwrap_or_default()
}

/// Runs one lookup per item concurrently and folds each result into its item.
///
/// Items whose lookup is skipped (`lookup` returns `None`) or fails are returned
/// untouched, in their original position.
pub async fn enrich_each<T, E, L, Fut, A>(instance: &str, items: Vec<T>, lookup: L, apply: A) -> Vec<T>
where
    L: Fn(&T) -> Option<Fut>,
    Fut: Future<Output = Result<E, UpstreamError>>,
    A: Fn(T, E) -> T,
{
    let lookup = &lookup;
    let apply = &apply;
    join_all(items.into_iter().map(|item| async move {
        let Some(pending) = lookup(&item) else {
            return item;
        };
        match pending.await {
            Ok(extra) => apply(item, extra),
            Err(e) => {
                tracing::debug!(instance, error = %e, "enrichment lookup failed");
                item
            }
        }
    }))
    .await
}

#[cfg(test)]
pub mod mock {
    //! Scripted transport used by handler and router tests.

    use super::*;
    use serde_json::Value;
    use std::sync::Mutex;

    #[derive(Clone)]
    enum Reply {
        Json(u16, Value),
        Text(u16, String, Vec<(String, String)>),
        Fail,
        Timeout,
    }

    /// Routes are matched against the request path, or against a `key=value`
    /// query fragment for query-dispatched APIs. Unmatched requests get a 404.
    #[derive(Default)]
    pub struct MockTransport {
        routes: Mutex<Vec<(String, Reply)>>,
        calls: Mutex<Vec<String>>,
    }

    impl MockTransport {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn json(self, route: &str, body: Value) -> Self {
            self.push(route, Reply::Json(200, body))
        }

        pub fn status(self, route: &str, status: u16, body: Value) -> Self {
            self.push(route, Reply::Json(status, body))
        }

        pub fn text(self, route: &str, status: u16, body: &str) -> Self {
            self.push(route, Reply::Text(status, body.to_string(), Vec::new()))
        }

        pub fn text_with_headers(
            self,
            route: &str,
            status: u16,
            body: &str,
            headers: &[(&str, &str)],
        ) -> Self {
            let headers = headers
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect();
            self.push(route, Reply::Text(status, body.to_string(), headers))
        }

        pub fn fail(self, route: &str) -> Self {
            self.push(route, Reply::Fail)
        }

        pub fn timeout(self, route: &str) -> Self {
            self.push(route, Reply::Timeout)
        }

        fn push(self, route: &str, reply: Reply) -> Self {
            self.routes.lock().unwrap().push((route.to_string(), reply));
            self
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        pub fn into_upstream(self) -> (Upstream, Arc<MockTransport>) {
            let mock = Arc::new(self);
            (Upstream::new(mock.clone()), mock)
        }
    }

    fn split(url: &str) -> (&str, &str) {
        let without_scheme = url.split_once("://").map(|(_, rest)| rest).unwrap_or(url);
        let path_and_query = without_scheme
            .find('/')
            .map(|i| &without_scheme[i..])
            .unwrap_or("/");
        path_and_query
            .split_once('?')
            .unwrap_or((path_and_query, ""))
    }

    fn matches(route: &str, path: &str, query: &str) -> bool {
        if route.contains('=') {
            query.split('&').any(|pair| pair == route)
        } else {
            route == path
        }
    }

    #[async_trait]
    impl HttpTransport for MockTransport {
        async fn execute(&self, request: UpstreamRequest) -> Result<UpstreamResponse, UpstreamError> {
            self.calls.lock().unwrap().push(request.url.clone());
            let (path, query) = split(&request.url);
            let reply = self
                .routes
                .lock()
                .unwrap()
                .iter()
                .find(|(route, _)| matches(route, path, query))
                .map(|(_, reply)| reply.clone());
            match reply {
                Some(Reply::Json(status, body)) => Ok(UpstreamResponse {
                    status,
                    headers: vec![("content-type".into(), "application/json".into())],
                    body: body.to_string(),
                }),
                Some(Reply::Text(status, body, headers)) => Ok(UpstreamResponse {
                    status,
                    headers,
                    body,
                }),
                Some(Reply::Fail) => Err(UpstreamError::Transport("connection refused".into())),
                Some(Reply::Timeout) => Err(UpstreamError::Timeout(request.url.clone())),
                None => Ok(UpstreamResponse {
                    status: 404,
                    headers: Vec::new(),
                    body: "not found".into(),
                }),
            }
        }
    }
}

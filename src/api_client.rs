//! HTTP adapter over a preconfigured endpoint.

use crate::error::{ClientError, StepError};
use crate::model::{HttpMethod, RequestInfo};
use crate::validator;
use reqwest::{Client, Method as ReqMethod};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, instrument};
use url::Url;

/// Reusable request configuration shared by every step.
#[derive(Debug, Clone)]
pub struct RequestSpec {
    pub base_url: String,
    pub base_path: String,
    /// Appended to every request, before any per-call parameters.
    pub default_query: Vec<(String, String)>,
    pub content_type: String,
    /// `None` leaves the transport default in place.
    pub timeout: Option<Duration>,
}

impl RequestSpec {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            base_path: String::new(),
            default_query: Vec::new(),
            content_type: "application/json".to_string(),
            timeout: None,
        }
    }

    pub fn base_path(mut self, base_path: impl Into<String>) -> Self {
        self.base_path = base_path.into();
        self
    }

    pub fn query_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_query.push((name.into(), value.into()));
        self
    }

    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// `base_url + base_path + resource` without query parameters.
    pub fn endpoint(&self, resource: &str) -> String {
        let mut url = self.base_url.trim_end_matches('/').to_string();
        for part in [self.base_path.as_str(), resource] {
            let part = part.trim_matches('/');
            if !part.is_empty() {
                url.push('/');
                url.push_str(part);
            }
        }
        url
    }
}

/// A response as seen by a step.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: String,
    /// Parsed body, when it is JSON.
    pub json: Option<Value>,
    pub request: RequestInfo,
}

impl ApiResponse {
    pub fn json_path(&self, path: &str) -> Option<&Value> {
        self.json
            .as_ref()
            .and_then(|json| validator::get_by_json_path(json, path))
    }

    /// Scalar at `path` as text; `None` when missing or `null`.
    pub fn string_at(&self, path: &str) -> Option<String> {
        self.json_path(path).and_then(validator::value_as_string)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn expect_status(&self, expected: u16) -> Result<(), StepError> {
        if self.status == expected {
            return Ok(());
        }
        Err(StepError::UnexpectedStatus {
            expected,
            actual: self.status,
            body: self.body.chars().take(500).collect(),
        })
    }

    /// Parsed body or a [`StepError::MalformedResponse`].
    pub fn require_json(&self) -> Result<&Value, StepError> {
        self.json.as_ref().ok_or_else(|| {
            StepError::MalformedResponse(self.body.chars().take(200).collect())
        })
    }
}

/// Executes requests against a [`RequestSpec`].
#[derive(Debug, Clone)]
pub struct ApiClient {
    spec: RequestSpec,
    http: Client,
}

impl ApiClient {
    pub fn new(spec: RequestSpec) -> Result<Self, ClientError> {
        let mut builder = Client::builder();
        if let Some(timeout) = spec.timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build().map_err(ClientError::Build)?;
        Ok(Self { spec, http })
    }

    pub fn spec(&self) -> &RequestSpec {
        &self.spec
    }

    fn convert_method(method: HttpMethod) -> ReqMethod {
        match method {
            HttpMethod::Get => ReqMethod::GET,
            HttpMethod::Post => ReqMethod::POST,
            HttpMethod::Put => ReqMethod::PUT,
            HttpMethod::Delete => ReqMethod::DELETE,
        }
    }

    /// Full URL for `resource`, including default and extra query
    /// parameters.
    pub fn url_for(
        &self,
        resource: &str,
        extra_query: &[(&str, &str)],
    ) -> Result<Url, ClientError> {
        let endpoint = self.spec.endpoint(resource);
        let mut url = Url::parse(&endpoint).map_err(|source| ClientError::InvalidUrl {
            url: endpoint.clone(),
            source,
        })?;
        {
            let mut pairs = url.query_pairs_mut();
            for (k, v) in &self.spec.default_query {
                pairs.append_pair(k, v);
            }
            for (k, v) in extra_query {
                pairs.append_pair(k, v);
            }
        }
        if url.query() == Some("") {
            url.set_query(None);
        }
        Ok(url)
    }

    /// Perform one call. Non-2xx statuses are returned as normal
    /// responses; only transport failures are errors.
    #[instrument(skip(self, method, body, extra_query), fields(method = %method))]
    pub async fn send(
        &self,
        method: HttpMethod,
        resource: &str,
        body: Option<&str>,
        extra_query: &[(&str, &str)],
    ) -> Result<ApiResponse, ClientError> {
        let url = self.url_for(resource, extra_query)?;

        let mut req_builder = self.http.request(Self::convert_method(method), url.clone());
        let mut req_headers = HashMap::new();
        if let Some(body) = body {
            req_headers.insert("Content-Type".to_string(), self.spec.content_type.clone());
            req_builder = req_builder
                .header("Content-Type", self.spec.content_type.as_str())
                .body(body.to_string());
        }

        let request = RequestInfo {
            method: method.to_string(),
            url: url.to_string(),
            headers: req_headers,
            body: body.map(str::to_string),
        };

        let method_name = method.to_string();
        let transport = |source: reqwest::Error| {
            ClientError::transport(&method_name, url.as_str(), source)
        };

        debug!("Sending request to {}", url);
        let response = req_builder.send().await.map_err(transport)?;
        let status = response.status().as_u16();
        debug!("Received response with status: {}", status);

        let headers: HashMap<String, String> = response
            .headers()
            .iter()
            .map(|(name, value)| (name.to_string(), value.to_str().unwrap_or("").to_string()))
            .collect();

        let body = response.text().await.map_err(transport)?;
        let json = serde_json::from_str::<Value>(&body).ok();

        Ok(ApiResponse {
            status,
            headers,
            body,
            json,
            request,
        })
    }
}

//! `reqwest`-backed [`HttpTransport`].

use std::collections::BTreeMap;
use std::time::Duration;

use flowrun_core::router::{AuthScheme, HttpRequest, HttpResponse, HttpTransport, RequestError};
use flowrun_types::config::HttpConfig;
use reqwest::Client;

/// Sends routed requests over a shared `reqwest::Client`.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Build a client with the configured timeout and user agent.
    pub fn from_config(config: &HttpConfig) -> Result<Self, RequestError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| RequestError::Transport(e.to_string()))?;
        Ok(Self::new(client))
    }
}

impl HttpTransport for ReqwestTransport {
    async fn send(
        &self,
        mut request: HttpRequest,
        auth: Option<&AuthScheme>,
    ) -> Result<HttpResponse, RequestError> {
        if let Some(auth) = auth {
            auth.apply(&mut request);
        }

        let method = reqwest::Method::from_bytes(request.method.as_bytes())
            .map_err(|_| RequestError::InvalidRouting(format!("invalid HTTP method {}", request.method)))?;
        let query = request.query_pairs();

        let mut builder = self.client.request(method, &request.url);
        if !query.is_empty() {
            builder = builder.query(&query);
        }
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        tracing::debug!(method = %request.method, url = %request.url, "sending request");
        let response = builder.send().await.map_err(map_reqwest_error)?;

        let status = response.status().as_u16();
        let mut headers = BTreeMap::new();
        for (key, value) in response.headers() {
            if let Ok(value) = value.to_str() {
                headers.insert(key.as_str().to_string(), value.to_string());
            }
        }
        let raw = response.bytes().await.map_err(map_reqwest_error)?;

        Ok(HttpResponse::from_bytes(status, headers, raw.to_vec()))
    }
}

fn map_reqwest_error(err: reqwest::Error) -> RequestError {
    if err.is_timeout() {
        RequestError::Transport(format!("request timed out: {err}"))
    } else {
        RequestError::Transport(err.to_string())
    }
}

use std::fmt;
use reqwest::{Method, StatusCode};
use rfdk_custom_resource::backoff::{BackoffConfigError, BackoffGenerator, BackoffGeneratorOptions};
use serde_derive::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

pub const DEFAULT_RETRIES: u32 = 3;
pub const DEFAULT_RETRY_WAIT_MS: u64 = 10_000;

#[derive(Debug, Error)]
pub enum DeadlineError {
    #[error("Invalid Deadline connection: {0}")]
    Config(String),
    #[error("{method} {path} returned {status}: {body}")]
    Status {
        method: Method,
        path: String,
        status: u16,
        body: String,
    },
    #[error("{method} {path} was still unavailable after {retries} retries")]
    Unavailable { method: Method, path: String, retries: u32 },
    #[error("Unexpected response from {path}: {message}")]
    UnexpectedResponse { path: String, message: String },
    #[error("Request to Deadline failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Backoff(#[from] BackoffConfigError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Protocol {
    Http,
    Https,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Http => write!(f, "http"),
            Protocol::Https => write!(f, "https"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct DeadlineClientOptions {
    pub host: String,
    pub port: u16,
    pub protocol: Protocol,
    /// PEM CA that the render queue's certificate must chain to, in place of
    /// the public roots.
    pub ca_pem: Option<String>,
    /// Retries of a request answered with 503.
    pub retries: u32,
    pub retry_wait_ms: u64,
}

impl DeadlineClientOptions {
    pub fn new(host: impl Into<String>, port: u16, protocol: Protocol) -> Self {
        DeadlineClientOptions {
            host: host.into(),
            port,
            protocol,
            ca_pem: None,
            retries: DEFAULT_RETRIES,
            retry_wait_ms: DEFAULT_RETRY_WAIT_MS,
        }
    }
}

/// JSON client for the Deadline Render Client Service REST API.
#[derive(Clone, Debug)]
pub struct DeadlineClient {
    http: reqwest::Client,
    base_url: String,
    retries: u32,
    retry_wait_ms: u64,
}

impl DeadlineClient {
    pub fn new(options: DeadlineClientOptions) -> Result<Self, DeadlineError> {
        let mut builder = reqwest::Client::builder();
        if let Some(pem) = &options.ca_pem {
            if options.protocol != Protocol::Https {
                return Err(DeadlineError::Config(
                    "a CA certificate can only be used with HTTPS".to_string(),
                ));
            }
            let ca = reqwest::Certificate::from_pem(pem.as_bytes())?;
            builder = builder.tls_built_in_root_certs(false).add_root_certificate(ca);
        }
        Ok(DeadlineClient {
            http: builder.build()?,
            base_url: format!("{}://{}:{}", options.protocol, options.host, options.port),
            retries: options.retries,
            retry_wait_ms: options.retry_wait_ms,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn get_request(&self, path: &str) -> Result<Value, DeadlineError> {
        self.request(Method::GET, path, None).await
    }

    pub async fn post_request(&self, path: &str, body: &Value) -> Result<Value, DeadlineError> {
        self.request(Method::POST, path, Some(body)).await
    }

    async fn request(&self, method: Method, path: &str, body: Option<&Value>) -> Result<Value, DeadlineError> {
        // Fixed wait between retries: the interval never grows past its base.
        let mut backoff = BackoffGenerator::new(BackoffGeneratorOptions {
            base_ms: self.retry_wait_ms,
            max_interval_ms: self.retry_wait_ms,
            max_attempts: Some(self.retries),
            ..Default::default()
        })?;
        let url = format!("{}{}", &self.base_url, path);
        loop {
            let mut request = self.http.request(method.clone(), &url);
            if let Some(body) = body {
                request = request.json(body);
            }
            let response = request.send().await?;
            let status = response.status();
            debug!("{} {} -> {}", &method, path, status);

            if status == StatusCode::SERVICE_UNAVAILABLE {
                if !backoff.should_continue() {
                    return Err(DeadlineError::Unavailable {
                        method,
                        path: path.to_string(),
                        retries: self.retries,
                    });
                }
                warn!(
                    "{} {} returned 503. Will retry after {} ms, retries left: {}",
                    &method,
                    path,
                    self.retry_wait_ms,
                    self.retries - backoff.attempt()
                );
                backoff.backoff().await;
                continue;
            }

            let text = response.text().await?;
            if !status.is_success() {
                return Err(DeadlineError::Status {
                    method,
                    path: path.to_string(),
                    status: status.as_u16(),
                    body: text,
                });
            }
            if text.trim().is_empty() {
                return Ok(Value::Null);
            }
            return Ok(serde_json::from_str(&text).unwrap_or_else(|_| Value::String(text)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer, retries: u32) -> DeadlineClient {
        let address = server.address();
        DeadlineClient::new(DeadlineClientOptions {
            retries,
            retry_wait_ms: 10,
            ..DeadlineClientOptions::new(address.ip().to_string(), address.port(), Protocol::Http)
        })
        .unwrap()
    }

    #[tokio::test]
    async fn posts_json_and_parses_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/db/settings/collections/pools/save"))
            .and(body_json(json!({"Pool": ["a"]})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .expect(1)
            .mount(&server)
            .await;
        let response = client(&server, 3)
            .post_request("/db/settings/collections/pools/save", &json!({"Pool": ["a"]}))
            .await
            .unwrap();
        assert_eq!(response, json!({"ok": true}));
    }

    #[tokio::test]
    async fn empty_and_plain_text_bodies() {
        let server = MockServer::start().await;
        Mock::given(path("/empty"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        Mock::given(path("/text"))
            .respond_with(ResponseTemplate::new(200).set_body_string("Success"))
            .mount(&server)
            .await;
        let client = client(&server, 3);
        assert_eq!(client.get_request("/empty").await.unwrap(), Value::Null);
        assert_eq!(client.get_request("/text").await.unwrap(), json!("Success"));
    }

    #[tokio::test]
    async fn retries_service_unavailable() {
        let server = MockServer::start().await;
        Mock::given(path("/busy"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(path("/busy"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;
        assert_eq!(client(&server, 3).get_request("/busy").await.unwrap(), json!([]));
        assert_eq!(server.received_requests().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn gives_up_after_configured_retries() {
        let server = MockServer::start().await;
        Mock::given(path("/down"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        let err = client(&server, 2).get_request("/down").await.unwrap_err();
        assert!(matches!(err, DeadlineError::Unavailable { retries: 2, .. }));
        assert_eq!(server.received_requests().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn other_errors_are_not_retried() {
        let server = MockServer::start().await;
        Mock::given(path("/bad"))
            .respond_with(ResponseTemplate::new(400).set_body_string("nope"))
            .mount(&server)
            .await;
        let err = client(&server, 3).get_request("/bad").await.unwrap_err();
        match err {
            DeadlineError::Status { status, body, .. } => {
                assert_eq!(status, 400);
                assert_eq!(body, "nope");
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(server.received_requests().await.unwrap().len(), 1);
    }

    #[test]
    fn ca_requires_https() {
        let options = DeadlineClientOptions {
            ca_pem: Some("-----BEGIN CERTIFICATE-----".to_string()),
            ..DeadlineClientOptions::new("rq", 4433, Protocol::Http)
        };
        assert!(matches!(DeadlineClient::new(options), Err(DeadlineError::Config(_))));
    }

    #[test]
    fn protocol_decodes_uppercase() {
        assert_eq!(serde_json::from_str::<Protocol>("\"HTTPS\"").unwrap(), Protocol::Https);
        assert_eq!(Protocol::Http.to_string(), "http");
    }
}

//! HTTP client for the custodia server.

use serde_json::Value;
use thiserror::Error;

/// Default request timeout.
const TIMEOUT_SECS: u64 = 30;

/// Errors that can occur talking to the server.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Could not reach the server.
    #[error("request failed: {0}")]
    Transport(Box<ureq::Error>),

    /// The server answered with an error status.
    #[error("{code}: {message} (HTTP {status})")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Enumerated error code from the body.
        code: String,
        /// Human-readable message from the body.
        message: String,
    },

    /// The response body could not be decoded.
    #[error("invalid response: {0}")]
    Decode(#[from] std::io::Error),
}

/// Client bound to one server and (optionally) one session token.
pub struct Client {
    base_url: String,
    token: Option<String>,
    agent: ureq::Agent,
}

impl Client {
    /// Creates a client for the given base URL.
    #[must_use]
    pub fn new(base_url: &str, token: Option<String>) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
            agent: ureq::AgentBuilder::new()
                .timeout(std::time::Duration::from_secs(TIMEOUT_SECS))
                .build(),
        }
    }

    /// Sends a GET request.
    ///
    /// # Errors
    ///
    /// Returns transport, API, or decode errors.
    pub fn get(&self, path: &str) -> Result<Value, ClientError> {
        let request = self.prepare(self.agent.get(&format!("{}{path}", self.base_url)));
        Self::finish(request.call())
    }

    /// Sends a POST request with a JSON body (or empty).
    ///
    /// # Errors
    ///
    /// Returns transport, API, or decode errors.
    pub fn post(&self, path: &str, body: Option<Value>) -> Result<Value, ClientError> {
        let request = self.prepare(self.agent.post(&format!("{}{path}", self.base_url)));
        let result = match body {
            Some(body) => request.send_json(body),
            None => request.call(),
        };
        Self::finish(result)
    }

    fn prepare(&self, request: ureq::Request) -> ureq::Request {
        match &self.token {
            Some(token) => request.set("Authorization", &format!("Bearer {token}")),
            None => request,
        }
    }

    fn finish(result: Result<ureq::Response, ureq::Error>) -> Result<Value, ClientError> {
        match result {
            Ok(response) => Self::read_body(response),
            Err(ureq::Error::Status(status, response)) => {
                let body = Self::read_body(response).unwrap_or(Value::Null);
                Err(ClientError::Api {
                    status,
                    code: body["error"].as_str().unwrap_or("error").to_string(),
                    message: body["message"].as_str().unwrap_or("no detail").to_string(),
                })
            },
            Err(other) => Err(ClientError::Transport(Box::new(other))),
        }
    }

    fn read_body(response: ureq::Response) -> Result<Value, ClientError> {
        let text = response.into_string()?;
        if text.is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text).unwrap_or(Value::String(text)))
    }
}

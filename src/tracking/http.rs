use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder, Response};
use serde::Serialize;
use serde_json::Value;

use crate::error::TrackerError;
use crate::tracking::config::RemoteConfig;

/// Blocking JSON client shared by the remote backends.
pub(crate) struct HttpClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpClient {
    pub(crate) fn new(config: &RemoteConfig, field: &str) -> Result<Self, TrackerError> {
        let base_url = config
            .url
            .as_deref()
            .ok_or_else(|| TrackerError::Backend(format!("{field} is not set")))?
            .trim_end_matches('/')
            .to_string();
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()?;
        Ok(HttpClient { client, base_url, api_key: config.api_key.clone() })
    }

    pub(crate) fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.base_url, endpoint)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    pub(crate) fn get_json(&self, endpoint: &str, query: &[(&str, &str)]) -> Result<Value, TrackerError> {
        let request = self.client.get(self.url(endpoint)).query(query);
        let response = self.authorize(request).send()?;
        read_json(endpoint, response)
    }

    pub(crate) fn post_json<B: Serialize + ?Sized>(&self, endpoint: &str, body: &B) -> Result<Value, TrackerError> {
        let request = self.client.post(self.url(endpoint)).json(body);
        let response = self.authorize(request).send()?;
        read_json(endpoint, response)
    }

    pub(crate) fn put_bytes(&self, endpoint: &str, bytes: Vec<u8>) -> Result<(), TrackerError> {
        let request = self
            .client
            .put(self.url(endpoint))
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(bytes);
        let response = self.authorize(request).send()?;
        read_json(endpoint, response).map(|_| ())
    }
}

/// Maps non-2xx responses to `TrackerError::Rejected`; an empty 2xx body
/// reads as `null`.
fn read_json(endpoint: &str, response: Response) -> Result<Value, TrackerError> {
    let status = response.status();
    let body = response.text()?;
    if !status.is_success() {
        return Err(TrackerError::Rejected {
            endpoint: endpoint.to_string(),
            status: status.as_u16(),
            body,
        });
    }
    if body.trim().is_empty() {
        return Ok(Value::Null);
    }
    Ok(serde_json::from_str(&body)?)
}

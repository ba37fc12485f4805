//! Minimal client for the HTTP API of a hosted Gradio space.
//!
//! A prediction is a queued call: `POST {prefix}/call/{endpoint}` returns an
//! event id, and `GET {prefix}/call/{endpoint}/{event_id}` streams events
//! until `complete` (carrying the output list) or `error`.

use crate::error::ProviderError;
use crate::fetch::{read_capped, BodyError};
use crate::{Error, Result};
use eventsource_stream::{EventStreamError, Eventsource};
use futures_util::{Stream, StreamExt};
use reqwest::multipart::{Form, Part};
use reqwest::{header, Client, RequestBuilder, Response, Url};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::pin::pin;
use std::time::Duration;

/// Upper bound for a downloaded result image.
pub const MAX_RESULT_BYTES: usize = 20 * 1024 * 1024;

#[derive(Debug, Deserialize)]
struct SpaceConfig {
    #[serde(default)]
    api_prefix: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CallResponse {
    event_id: String,
}

#[derive(Debug, Serialize)]
struct CallRequest<'a> {
    data: &'a [Value],
}

/// Reference to a file already uploaded to the space.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileData {
    pub path: String,
    pub orig_name: String,
    pub mime_type: String,
    pub meta: FileMeta,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileMeta {
    #[serde(rename = "_type")]
    pub kind: String,
}

impl FileData {
    pub fn new(path: String, orig_name: &str, mime_type: &str) -> Self {
        Self {
            path,
            orig_name: orig_name.to_string(),
            mime_type: mime_type.to_string(),
            meta: FileMeta {
                kind: "gradio.FileData".to_string(),
            },
        }
    }
}

pub struct GradioClient {
    client: Client,
    base_url: String,
    api_prefix: String,
    token: Option<String>,
    timeout: Duration,
}

impl GradioClient {
    /// Open a session by reading the space configuration.
    pub async fn connect(
        client: Client,
        base_url: &str,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let mut gradio = Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_prefix: String::new(),
            token,
            timeout,
        };

        let url = format!("{}/config", gradio.base_url);
        let body = gradio.send(gradio.client.get(&url)).await?;
        let config: SpaceConfig = serde_json::from_str(&body).map_err(|e| {
            ProviderError::upstream(format!("Failed to parse space config: {}", e))
        })?;

        gradio.api_prefix = config
            .api_prefix
            .map(|p| format!("/{}", p.trim_matches('/')))
            .filter(|p| p != "/")
            .unwrap_or_default();

        tracing::debug!(
            "Connected to Gradio space {} (api prefix '{}')",
            gradio.base_url,
            gradio.api_prefix
        );
        Ok(gradio)
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}{}{}", self.base_url, self.api_prefix, path)
    }

    /// URL under which the space serves an output file path.
    pub fn file_url(&self, path: &str) -> String {
        self.api_url(&format!("/file={}", path))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.header(header::AUTHORIZATION, format!("Bearer {}", token)),
            None => request,
        }
    }

    /// The bearer token only goes to the space's own origin (scheme, host and port).
    fn is_space_origin(&self, url: &Url) -> bool {
        Url::parse(&self.base_url)
            .map(|base| base.origin() == url.origin())
            .unwrap_or(false)
    }

    async fn execute(&self, request: RequestBuilder) -> Result<Response> {
        let response = self
            .authorize(request)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                tracing::error!("Failed to send request to Gradio space: {}", e);
                e
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await?;
            tracing::error!("Gradio space error (status {}): {}", status, error_text);
            return Err(ProviderError::upstream(format!(
                "Space request failed (status {}): {}",
                status.as_u16(),
                error_text
            ))
            .into());
        }

        Ok(response)
    }

    async fn send(&self, request: RequestBuilder) -> Result<String> {
        Ok(self.execute(request).await?.text().await?)
    }

    pub async fn upload(&self, bytes: Vec<u8>, file_name: &str, mime_type: &str) -> Result<FileData> {
        let part = Part::bytes(bytes)
            .file_name(file_name.to_string())
            .mime_str(mime_type)?;
        let form = Form::new().part("files", part);

        let body = self
            .send(self.client.post(self.api_url("/upload")).multipart(form))
            .await?;
        let paths: Vec<String> = serde_json::from_str(&body).map_err(|e| {
            ProviderError::upstream(format!("Failed to parse upload response: {}", e))
        })?;

        let path = paths
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::upstream("Upload returned no file path"))?;
        Ok(FileData::new(path, file_name, mime_type))
    }

    /// Run `endpoint` with positional inputs and return its output list.
    pub async fn predict(&self, endpoint: &str, data: &[Value]) -> Result<Vec<Value>> {
        let call_url = self.api_url(&format!("/call/{}", endpoint));
        let body = self
            .send(self.client.post(&call_url).json(&CallRequest { data }))
            .await?;
        let call: CallResponse = serde_json::from_str(&body).map_err(|e| {
            ProviderError::upstream(format!("Failed to parse call response: {}", e))
        })?;

        tracing::debug!("Queued Gradio call {} as event {}", endpoint, call.event_id);

        let response = self
            .execute(self.client.get(format!("{}/{}", call_url, call.event_id)))
            .await?;
        read_event_stream(response.bytes_stream()).await
    }

    /// Download a result file of at most [`MAX_RESULT_BYTES`].
    pub async fn download(&self, url: &str) -> Result<(Vec<u8>, Option<String>)> {
        let url = Url::parse(url).map_err(|e| {
            ProviderError::upstream(format!("Invalid result image URL '{}': {}", url, e))
        })?;

        let mut request = self.client.get(url.clone()).timeout(self.timeout);
        if self.is_space_origin(&url) {
            request = self.authorize(request);
        } else {
            tracing::debug!("Downloading result from foreign host {} without token", url);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            return Err(ProviderError::upstream(format!(
                "Failed to download result image (status {})",
                status.as_u16()
            ))
            .into());
        }

        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = read_capped(response, MAX_RESULT_BYTES)
            .await
            .map_err(|e| match e {
                BodyError::Read(e) => Error::Http(e),
                too_large => ProviderError::upstream(format!("Result image {}", too_large)).into(),
            })?;
        Ok((bytes, content_type))
    }
}

/// Read a Gradio event stream until it yields the output list of a
/// `complete` event, or fails with the detail of an `error` event.
pub async fn read_event_stream<S, B, E>(stream: S) -> Result<Vec<Value>>
where
    S: Stream<Item = std::result::Result<B, E>>,
    B: AsRef<[u8]>,
    E: Into<Error> + fmt::Display,
{
    let mut events = pin!(stream.eventsource());

    while let Some(event) = events.next().await {
        let event = match event {
            Ok(event) => event,
            Err(EventStreamError::Transport(e)) => return Err(e.into()),
            Err(e) => {
                return Err(
                    ProviderError::upstream(format!("Malformed space event stream: {}", e)).into(),
                )
            }
        };

        match event.event.as_str() {
            "complete" => {
                return serde_json::from_str(&event.data).map_err(|e| {
                    ProviderError::upstream(format!("Failed to parse space output: {}", e)).into()
                })
            }
            "error" => {
                let data = event.data.trim();
                let detail = if data.is_empty() || data == "null" {
                    "unknown error"
                } else {
                    data
                };
                return Err(
                    ProviderError::upstream(format!("Space reported an error: {}", detail)).into(),
                );
            }
            other => tracing::trace!("Skipping space event '{}'", other),
        }
    }

    Err(ProviderError::upstream("Space event stream ended without a result").into())
}

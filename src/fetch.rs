//! Server-side download of product images.

use crate::ai::mime::resolve_image_mime;
use crate::models::ImagePayload;
use crate::url_guard::UrlGuard;
use crate::{Error, Result};
use base64::Engine as _;
use futures_util::StreamExt;
use reqwest::{header, redirect, Client, Response, Url};
use std::fmt;
use std::pin::pin;
use std::sync::Arc;
use std::time::Duration;

const MAX_REDIRECTS: usize = 5;

pub struct ImageFetcher {
    client: Client,
    max_bytes: usize,
}

impl ImageFetcher {
    /// Every redirect hop is checked against `guard`; an untrusted hop stops
    /// the fetch.
    pub fn new(guard: Arc<UrlGuard>, timeout: Duration, max_bytes: usize) -> Result<Self> {
        let policy = redirect::Policy::custom(move |attempt| {
            if attempt.previous().len() >= MAX_REDIRECTS {
                attempt.error("too many redirects")
            } else if let Err(reason) = guard.check_url(attempt.url()) {
                tracing::warn!("Refusing product image redirect: {}", reason);
                attempt.stop()
            } else {
                attempt.follow()
            }
        });

        let client = Client::builder()
            .timeout(timeout)
            .redirect(policy)
            .build()?;

        Ok(Self { client, max_bytes })
    }

    pub async fn fetch(&self, url: Url) -> Result<ImagePayload> {
        tracing::debug!("Fetching product image from {}", url);

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| Error::ProductImage(format!("request to {} failed: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::ProductImage(format!(
                "{} answered with status {}",
                url, status
            )));
        }

        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let bytes = read_capped(response, self.max_bytes)
            .await
            .map_err(|e| Error::ProductImage(format!("reading {} failed: {}", url, e)))?;

        if bytes.is_empty() {
            return Err(Error::ProductImage(format!("{} returned an empty body", url)));
        }

        let mime_type = resolve_image_mime(content_type.as_deref(), &bytes);
        let data = base64::engine::general_purpose::STANDARD.encode(&bytes);
        Ok(ImagePayload::new(data, mime_type))
    }
}

#[derive(Debug)]
pub enum BodyError {
    TooLarge(usize),
    Read(reqwest::Error),
}

impl fmt::Display for BodyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BodyError::TooLarge(limit) => write!(f, "body exceeds the {} byte limit", limit),
            BodyError::Read(e) => write!(f, "{}", e),
        }
    }
}

/// Read a response body, stopping as soon as it grows past `max_bytes`.
pub async fn read_capped(
    response: Response,
    max_bytes: usize,
) -> std::result::Result<Vec<u8>, BodyError> {
    if let Some(length) = response.content_length() {
        if length > max_bytes as u64 {
            return Err(BodyError::TooLarge(max_bytes));
        }
    }

    let mut body = Vec::new();
    let mut chunks = pin!(response.bytes_stream());
    while let Some(chunk) = chunks.next().await {
        let chunk = chunk.map_err(BodyError::Read)?;
        if body.len() + chunk.len() > max_bytes {
            return Err(BodyError::TooLarge(max_bytes));
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const JPEG_BYTES: [u8; 4] = [0xFF, 0xD8, 0xFF, 0xE0];

    fn fetcher(trusted: &[&str], max_bytes: usize) -> ImageFetcher {
        let guard = UrlGuard::new(trusted.iter().map(|d| d.to_string()).collect());
        ImageFetcher::new(Arc::new(guard), Duration::from_secs(5), max_bytes).unwrap()
    }

    fn url(server: &MockServer, p: &str) -> Url {
        Url::parse(&format!("{}{}", server.uri(), p)).unwrap()
    }

    #[tokio::test]
    async fn test_fetch_encodes_image() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/shirt.jpg"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "image/jpeg")
                    .set_body_bytes(JPEG_BYTES.to_vec()),
            )
            .mount(&server)
            .await;

        let payload = fetcher(&["127.0.0.1"], 1024)
            .fetch(url(&server, "/shirt.jpg"))
            .await
            .unwrap();

        assert_eq!(payload.mime_type, "image/jpeg");
        assert_eq!(
            payload.data,
            base64::engine::general_purpose::STANDARD.encode(JPEG_BYTES)
        );
    }

    #[tokio::test]
    async fn test_fetch_sniffs_mime_without_image_header() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/shirt"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "application/octet-stream")
                    .set_body_bytes(vec![0x89, 0x50, 0x4E, 0x47]),
            )
            .mount(&server)
            .await;

        let payload = fetcher(&["127.0.0.1"], 1024)
            .fetch(url(&server, "/shirt"))
            .await
            .unwrap();
        assert_eq!(payload.mime_type, "image/png");
    }

    #[tokio::test]
    async fn test_fetch_rejects_error_status_and_empty_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing.jpg"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/empty.jpg"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let fetcher = fetcher(&["127.0.0.1"], 1024);
        let err = fetcher.fetch(url(&server, "/missing.jpg")).await.unwrap_err();
        assert!(matches!(err, Error::ProductImage(_)));
        let err = fetcher.fetch(url(&server, "/empty.jpg")).await.unwrap_err();
        assert!(matches!(err, Error::ProductImage(_)));
    }

    #[tokio::test]
    async fn test_fetch_enforces_size_limit() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/huge.jpg"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0xFF; 64]))
            .mount(&server)
            .await;

        let err = fetcher(&["127.0.0.1"], 16)
            .fetch(url(&server, "/huge.jpg"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ProductImage(_)));
    }

    #[tokio::test]
    async fn test_redirect_to_untrusted_host_is_not_followed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/redirect.jpg"))
            .respond_with(
                ResponseTemplate::new(302)
                    .insert_header("location", "http://169.254.169.254/latest/meta-data/"),
            )
            .mount(&server)
            .await;

        let err = fetcher(&["127.0.0.1"], 1024)
            .fetch(url(&server, "/redirect.jpg"))
            .await
            .unwrap_err();
        match err {
            Error::ProductImage(reason) => assert!(reason.contains("302")),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test]
    async fn test_redirect_within_trusted_host_is_followed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/old.jpg"))
            .respond_with(
                ResponseTemplate::new(301)
                    .insert_header("location", format!("{}/new.jpg", server.uri()).as_str()),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/new.jpg"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(JPEG_BYTES.to_vec()))
            .mount(&server)
            .await;

        let payload = fetcher(&["127.0.0.1"], 1024)
            .fetch(url(&server, "/old.jpg"))
            .await
            .unwrap();
        assert_eq!(payload.mime_type, "image/jpeg");
    }

    /// Serves an endless-looking chunked body and reports how much of it was
    /// written before the client hung up.
    async fn chunked_server(total: usize) -> (String, tokio::task::JoinHandle<usize>) {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                match socket.read(&mut buf).await {
                    Ok(0) | Err(_) => return 0,
                    Ok(n) => request.extend_from_slice(&buf[..n]),
                }
            }

            let head = "HTTP/1.1 200 OK\r\ncontent-type: image/jpeg\r\ntransfer-encoding: chunked\r\n\r\n";
            if socket.write_all(head.as_bytes()).await.is_err() {
                return 0;
            }

            let chunk = vec![0xFFu8; 64 * 1024];
            let mut written = 0;
            while written < total {
                let mut frame = format!("{:x}\r\n", chunk.len()).into_bytes();
                frame.extend_from_slice(&chunk);
                frame.extend_from_slice(b"\r\n");
                if socket.write_all(&frame).await.is_err() {
                    break;
                }
                written += chunk.len();
            }
            let _ = socket.write_all(b"0\r\n\r\n").await;
            written
        });

        (format!("http://{}", addr), handle)
    }

    #[tokio::test]
    async fn test_chunked_body_is_cut_off_at_limit() {
        let total = 256 * 1024 * 1024;
        let (base, server) = chunked_server(total).await;

        let err = fetcher(&["127.0.0.1"], 16)
            .fetch(Url::parse(&format!("{}/huge.jpg", base)).unwrap())
            .await
            .unwrap_err();

        match err {
            Error::ProductImage(reason) => assert!(reason.contains("16 byte limit"), "{}", reason),
            other => panic!("unexpected error: {}", other),
        }
        let written = server.await.unwrap();
        assert!(written < total, "server wrote the whole {} byte body", written);
    }
}

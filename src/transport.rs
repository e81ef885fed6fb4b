use crate::config::Config;
use crate::error::{ChatError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Request body for one exchange. Built fresh for every send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExchangePayload {
    pub message: String,
    pub session_id: String,
    pub file_content: Option<String>,
    pub file_mime_type: Option<String>,
}

/// Successful reply from the chat service
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ExchangeReply {
    #[serde(rename = "response")]
    pub response_text: String,
    /// Session id the service considers authoritative
    pub session_id: String,
}

/// Sends a single exchange to the chat service. No retries.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn send(&self, payload: &ExchangePayload) -> Result<ExchangeReply>;
}

/// `POST {base_url}/chat` over HTTP with a JSON body
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    url: String,
}

impl HttpTransport {
    pub fn new(config: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| ChatError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: config.chat_url(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl ChatTransport for HttpTransport {
    async fn send(&self, payload: &ExchangePayload) -> Result<ExchangeReply> {
        debug!(
            url = %self.url,
            session_id = %payload.session_id,
            has_file = payload.file_content.is_some(),
            "sending exchange"
        );

        let response = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .json(payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), body = %error_text, "chat service returned an error");
            return Err(ChatError::transport(
                format!("chat service responded with {}", status),
                Some(status.as_u16()),
            ));
        }

        let body = response.text().await?;
        let reply: ExchangeReply = serde_json::from_str(&body)?;
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    /// Accept one connection, answer it with a canned response and hand back
    /// the request body that was received.
    async fn serve_once(status_line: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 4096];

            let header_end = loop {
                let n = socket.read(&mut chunk).await.unwrap();
                assert!(n > 0, "connection closed before headers");
                buf.extend_from_slice(&chunk[..n]);
                if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                    break pos + 4;
                }
            };

            let headers = String::from_utf8_lossy(&buf[..header_end]).to_lowercase();
            let content_length = headers
                .lines()
                .find_map(|line| line.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0);

            while buf.len() < header_end + content_length {
                let n = socket.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&chunk[..n]);
            }

            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status_line,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();

            String::from_utf8_lossy(&buf[header_end..]).to_string()
        });

        (base_url, handle)
    }

    fn transport_for(base_url: String) -> HttpTransport {
        let mut config = Config::default();
        config.set_base_url(base_url);
        config.request_timeout_secs = 5;
        HttpTransport::new(&config).unwrap()
    }

    fn payload() -> ExchangePayload {
        ExchangePayload {
            message: "hello".to_string(),
            session_id: "S1".to_string(),
            file_content: None,
            file_mime_type: None,
        }
    }

    #[tokio::test]
    async fn successful_exchange() {
        let (base_url, server) =
            serve_once("200 OK", r#"{"response":"hi there","session_id":"S2"}"#).await;
        let transport = transport_for(base_url);
        assert!(transport.url().ends_with("/chat"));

        let reply = transport.send(&payload()).await.unwrap();
        assert_eq!(reply.response_text, "hi there");
        assert_eq!(reply.session_id, "S2");

        let sent: serde_json::Value = serde_json::from_str(&server.await.unwrap()).unwrap();
        assert_eq!(
            sent,
            serde_json::json!({
                "message": "hello",
                "session_id": "S1",
                "file_content": null,
                "file_mime_type": null
            })
        );
    }

    #[tokio::test]
    async fn file_fields_are_serialized() {
        let (base_url, server) =
            serve_once("200 OK", r#"{"response":"nice picture","session_id":"S1"}"#).await;
        let transport = transport_for(base_url);

        let mut with_file = payload();
        with_file.file_content = Some("iVBORw==".to_string());
        with_file.file_mime_type = Some("image/png".to_string());
        transport.send(&with_file).await.unwrap();

        let sent: serde_json::Value = serde_json::from_str(&server.await.unwrap()).unwrap();
        assert_eq!(sent["file_content"], "iVBORw==");
        assert_eq!(sent["file_mime_type"], "image/png");
    }

    #[tokio::test]
    async fn non_success_status_is_transport_error() {
        let (base_url, _server) =
            serve_once("500 Internal Server Error", r#"{"detail":"boom"}"#).await;
        let err = transport_for(base_url).send(&payload()).await.unwrap_err();
        assert!(matches!(err, ChatError::Transport { status: Some(500), .. }));
    }

    #[tokio::test]
    async fn unexpected_body_is_protocol_error() {
        let (base_url, _server) = serve_once("200 OK", r#"{"reply":"wrong field"}"#).await;
        let err = transport_for(base_url).send(&payload()).await.unwrap_err();
        assert!(matches!(err, ChatError::Protocol(_)));
    }

    #[tokio::test]
    async fn unreachable_service_is_transport_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);

        let err = transport_for(base_url).send(&payload()).await.unwrap_err();
        assert!(matches!(err, ChatError::Transport { .. }));
    }
}

//! WebSocket transport for live log subscriptions

use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, trace};
use url::Url;

use crate::error::ApiError;

pub const DEFAULT_STREAM_URL: &str = "wss://api.render.com/v1/logs/subscribe";

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// A data frame received from the log stream
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SocketFrame {
    Text(String),
    Binary(Vec<u8>),
}

/// An open log subscription socket
#[async_trait]
pub trait LogSocket: Send {
    /// Next data frame; `None` once the peer has closed the stream
    async fn recv(&mut self) -> Option<Result<SocketFrame, ApiError>>;

    async fn send_text(&mut self, text: String) -> Result<(), ApiError>;

    /// Close the socket from our side
    async fn close(&mut self) -> Result<(), ApiError>;
}

/// Opens log subscription sockets
#[async_trait]
pub trait SocketConnector: Send + Sync {
    async fn connect(&self, resource_ids: &[String]) -> Result<Box<dyn LogSocket>, ApiError>;
}

/// Connector for Render's log subscription endpoint
#[derive(Clone, Debug)]
pub struct RenderSocketConnector {
    stream_url: Url,
    api_key: String,
    owner_id: Option<String>,
    limit: u32,
    direction: String,
    connect_timeout: Duration,
}

impl RenderSocketConnector {
    pub fn new(api_key: &str, stream_url: &str) -> Result<Self, ApiError> {
        let stream_url = Url::parse(stream_url)?;
        if !matches!(stream_url.scheme(), "ws" | "wss") {
            return Err(ApiError::InvalidUrl(format!(
                "{stream_url}: must start with ws:// or wss://"
            )));
        }
        Ok(Self {
            stream_url,
            api_key: api_key.trim().to_string(),
            owner_id: None,
            limit: 100,
            direction: "backward".to_string(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        })
    }

    pub fn with_owner_id(mut self, owner_id: Option<String>) -> Self {
        self.owner_id = owner_id;
        self
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    /// Subscription URL for a set of resources
    pub fn subscribe_url(&self, resource_ids: &[String]) -> Url {
        let mut url = self.stream_url.clone();
        {
            let mut pairs = url.query_pairs_mut();
            if let Some(owner_id) = &self.owner_id {
                pairs.append_pair("ownerId", owner_id);
            }
            for id in resource_ids {
                pairs.append_pair("resource", id);
            }
            pairs.append_pair("limit", &self.limit.to_string());
            pairs.append_pair("direction", &self.direction);
        }
        url
    }
}

fn map_ws_error(err: tungstenite::Error) -> ApiError {
    match err {
        tungstenite::Error::Http(response) => {
            let status = response.status();
            let message = response
                .body()
                .as_ref()
                .map(|body| String::from_utf8_lossy(body).into_owned())
                .filter(|body| !body.is_empty())
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("handshake rejected").to_string());
            ApiError::from_status(status.as_u16(), message)
        }
        tungstenite::Error::Url(e) => ApiError::InvalidUrl(e.to_string()),
        other => ApiError::Socket(other.to_string()),
    }
}

#[async_trait]
impl SocketConnector for RenderSocketConnector {
    async fn connect(&self, resource_ids: &[String]) -> Result<Box<dyn LogSocket>, ApiError> {
        let url = self.subscribe_url(resource_ids);
        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(map_ws_error)?;
        let bearer = HeaderValue::from_str(&format!("Bearer {}", self.api_key))
            .map_err(|_| ApiError::Socket("API key contains invalid characters".into()))?;
        request.headers_mut().insert(AUTHORIZATION, bearer);

        debug!(resources = resource_ids.len(), "Connecting to log stream");
        let (ws, _response) = timeout(self.connect_timeout, connect_async(request))
            .await
            .map_err(|_| ApiError::Timeout(self.connect_timeout))?
            .map_err(map_ws_error)?;

        Ok(Box::new(TungsteniteSocket { ws }))
    }
}

/// [`LogSocket`] over a tokio-tungstenite stream
struct TungsteniteSocket {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl LogSocket for TungsteniteSocket {
    async fn recv(&mut self) -> Option<Result<SocketFrame, ApiError>> {
        loop {
            let message = match self.ws.next().await? {
                Ok(message) => message,
                Err(tungstenite::Error::ConnectionClosed) => return None,
                Err(err) => return Some(Err(map_ws_error(err))),
            };
            match message {
                Message::Text(text) => return Some(Ok(SocketFrame::Text(text))),
                Message::Binary(bytes) => return Some(Ok(SocketFrame::Binary(bytes))),
                Message::Close(frame) => {
                    trace!(?frame, "Log stream closed by server");
                    return None;
                }
                // tungstenite answers pings on its own
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => continue,
            }
        }
    }

    async fn send_text(&mut self, text: String) -> Result<(), ApiError> {
        self.ws.send(Message::Text(text)).await.map_err(map_ws_error)
    }

    async fn close(&mut self) -> Result<(), ApiError> {
        match self.ws.close(None).await {
            Ok(()) | Err(tungstenite::Error::ConnectionClosed) | Err(tungstenite::Error::AlreadyClosed) => Ok(()),
            Err(err) => Err(map_ws_error(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscribe_url_params() {
        let connector = RenderSocketConnector::new("key", DEFAULT_STREAM_URL)
            .unwrap()
            .with_owner_id(Some("own-1".into()))
            .with_limit(20);
        let url = connector.subscribe_url(&["srv-1".to_string(), "srv-2".to_string()]);
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(
            pairs,
            vec![
                ("ownerId".to_string(), "own-1".to_string()),
                ("resource".to_string(), "srv-1".to_string()),
                ("resource".to_string(), "srv-2".to_string()),
                ("limit".to_string(), "20".to_string()),
                ("direction".to_string(), "backward".to_string()),
            ]
        );
    }

    #[test]
    fn test_rejects_http_scheme() {
        assert!(matches!(
            RenderSocketConnector::new("key", "https://api.render.com/v1/logs/subscribe"),
            Err(ApiError::InvalidUrl(_))
        ));
    }
}

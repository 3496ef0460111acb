//! Push channel transport.
//!
//! [`Connector`] opens one connection and yields its text frames; the
//! supervising loop in [`crate::services::channel`] owns retries. The
//! session credential is always passed in explicitly.

use std::fmt;

use futures::future::BoxFuture;
use futures::stream::BoxStream;
use futures::StreamExt;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::COOKIE;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::tungstenite::Message;
use tracing::debug;
use uuid::Uuid;

use crate::error::ChannelError;

pub const CLIENT_ID_HEADER: &str = "x-client-id";

/// Credential and identity of one client session.
#[derive(Clone)]
pub struct Session {
    pub cookie: Option<String>,
    pub client_id: Uuid,
}

impl Session {
    pub fn new(cookie: Option<String>) -> Self {
        Session {
            cookie,
            client_id: Uuid::new_v4(),
        }
    }

    pub fn anonymous() -> Self {
        Self::new(None)
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("cookie", &self.cookie.as_ref().map(|_| "<redacted>"))
            .field("client_id", &self.client_id)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct Endpoint {
    pub url: String,
    pub session: Session,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url)
    }
}

pub type FrameStream = BoxStream<'static, Result<String, ChannelError>>;

/// Opens a single connection. The stream ends when the connection closes.
pub trait Connector: Send + Sync + 'static {
    fn connect<'a>(&'a self, endpoint: &'a Endpoint) -> BoxFuture<'a, Result<FrameStream, ChannelError>>;
}

/// WebSocket connector.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

impl Connector for WsConnector {
    fn connect<'a>(&'a self, endpoint: &'a Endpoint) -> BoxFuture<'a, Result<FrameStream, ChannelError>> {
        Box::pin(async move {
            let mut request = endpoint
                .url
                .as_str()
                .into_client_request()
                .map_err(|e| ChannelError::InvalidEndpoint(e.to_string()))?;

            let headers = request.headers_mut();
            if let Some(cookie) = &endpoint.session.cookie {
                let value = HeaderValue::from_str(cookie)
                    .map_err(|e| ChannelError::InvalidEndpoint(format!("session cookie: {}", e)))?;
                headers.insert(COOKIE, value);
            }
            let client_id = HeaderValue::from_str(&endpoint.session.client_id.to_string())
                .map_err(|e| ChannelError::InvalidEndpoint(e.to_string()))?;
            headers.insert(HeaderName::from_static(CLIENT_ID_HEADER), client_id);

            let (socket, _response) = tokio_tungstenite::connect_async(request)
                .await
                .map_err(|e| ChannelError::Connect(e.to_string()))?;

            let frames = socket.filter_map(|message| async move {
                match message {
                    Ok(Message::Text(text)) => Some(Ok(text)),
                    Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
                        Ok(text) => Some(Ok(text)),
                        Err(_) => {
                            debug!("dropping non-UTF-8 binary frame");
                            None
                        }
                    },
                    Ok(_) => None,
                    Err(e) => Some(Err(ChannelError::Transport(e.to_string()))),
                }
            });
            Ok(frames.boxed())
        })
    }
}

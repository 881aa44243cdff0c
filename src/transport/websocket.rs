//! WebSocket subscriber for the beacon api
//!
//! The device dials `ws(s)://<api>/register` presenting its shared secret in
//! the authorization header. Each websocket message (binary or text) is one
//! protobuf envelope. Heartbeats go out as text frames.

use super::traits::{Pinger, Subscriber};
use super::endpoint;
use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use beacon_shared::api;
use bytes::BytesMut;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use reqwest::{Client, StatusCode};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info};
use url::Url;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsTx = SplitSink<WsStream, Message>;
type WsRx = SplitStream<WsStream>;

/// Where to subscribe and which secret to present
#[derive(Debug, Clone)]
pub struct WebsocketConfig {
    pub api_home: Url,
    /// Hex encoded device public key
    pub secret: String,
}

#[derive(Debug, Serialize)]
struct RegistrationRequest<'a> {
    name: &'a str,
    shared_secret: &'a str,
}

/// Websocket implementation of [`Subscriber`] and [`Pinger`]
pub struct WebsocketSubscriber {
    config: WebsocketConfig,
    http: Client,
    tx: Mutex<Option<WsTx>>,
    rx: Mutex<Option<WsRx>>,
    connected: AtomicBool,
}

impl WebsocketSubscriber {
    pub fn new(config: WebsocketConfig) -> Self {
        Self {
            config,
            http: Client::new(),
            tx: Mutex::new(None),
            rx: Mutex::new(None),
            connected: AtomicBool::new(false),
        }
    }

    pub fn registration_address(&self) -> Url {
        endpoint(&self.config.api_home, api::REGISTRATION_ENDPOINT)
    }

    /// Registration address with its scheme mapped http -> ws, https -> wss
    pub fn websocket_address(&self) -> Result<Url> {
        let mut url = self.registration_address();
        let scheme = match url.scheme() {
            "https" => "wss",
            _ => "ws",
        };

        url.set_scheme(scheme)
            .map_err(|_| anyhow!("Unable to map {} to {}", url, scheme))?;
        Ok(url)
    }

    fn disconnected(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }
}

#[async_trait]
impl Subscriber for WebsocketSubscriber {
    async fn connect(&self) -> Result<()> {
        let reopening = self.tx.lock().await.is_some();
        if reopening {
            if let Err(e) = self.close().await {
                debug!("Error closing previous connection: {}", e);
            }
        }

        let address = self.websocket_address()?;
        let mut request = address.as_str().into_client_request()?;
        request.headers_mut().insert(
            api::AUTHORIZATION_HEADER,
            HeaderValue::from_str(&self.config.secret)?,
        );

        let (stream, _) = connect_async(request).await?;
        let (tx, rx) = stream.split();

        *self.tx.lock().await = Some(tx);
        *self.rx.lock().await = Some(rx);
        self.connected.store(true, Ordering::SeqCst);

        info!("Subscribed to {}", address);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.disconnected();

        let tx = self.tx.lock().await.take();
        self.rx.lock().await.take();

        if let Some(mut tx) = tx {
            tx.close().await?;
        }

        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn read_into(&self, sink: &mut BytesMut) -> Result<()> {
        let mut guard = self.rx.lock().await;
        let rx = guard.as_mut().ok_or_else(|| anyhow!("Connection closed"))?;

        loop {
            match rx.next().await {
                Some(Ok(Message::Binary(data))) => {
                    sink.extend_from_slice(&data);
                    return Ok(());
                }
                Some(Ok(Message::Text(text))) => {
                    sink.extend_from_slice(text.as_str().as_bytes());
                    return Ok(());
                }
                Some(Ok(Message::Close(_))) | None => {
                    self.disconnected();
                    bail!("Server closed connection");
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    self.disconnected();
                    return Err(e.into());
                }
            }
        }
    }

    async fn preregister(&self, name: &str) -> Result<()> {
        let request = RegistrationRequest {
            name,
            shared_secret: &self.config.secret,
        };

        let response = self
            .http
            .post(self.registration_address())
            .json(&request)
            .send()
            .await?;

        if response.status() != StatusCode::OK {
            bail!("Invalid response from server: {}", response.status());
        }

        Ok(())
    }
}

#[async_trait]
impl Pinger for WebsocketSubscriber {
    async fn ping(&self, data: &[u8]) -> Result<()> {
        let mut guard = self.tx.lock().await;
        let tx = guard.as_mut().ok_or_else(|| anyhow!("Connection closed"))?;

        let text = String::from_utf8_lossy(data).into_owned();
        if let Err(e) = tx.send(Message::text(text)).await {
            self.disconnected();
            return Err(e.into());
        }

        Ok(())
    }
}

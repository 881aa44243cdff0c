//! Transport trait abstraction for the api connection

use anyhow::Result;
use async_trait::async_trait;
use bytes::BytesMut;

/// A persistent connection that delivers whole messages from the api
#[async_trait]
pub trait Subscriber: Send + Sync {
    /// Open (or reopen) the connection
    async fn connect(&self) -> Result<()>;

    /// Close the connection gracefully
    async fn close(&self) -> Result<()>;

    /// Whether the last connect succeeded and no read/write has failed since
    fn is_connected(&self) -> bool;

    /// Block until the next message arrives and append it to `sink`
    async fn read_into(&self, sink: &mut BytesMut) -> Result<()>;

    /// Reserve `name` for this device's shared secret
    async fn preregister(&self, name: &str) -> Result<()>;
}

/// Something that can carry a liveness ping to the api
#[async_trait]
pub trait Pinger: Send + Sync {
    async fn ping(&self, data: &[u8]) -> Result<()>;
}

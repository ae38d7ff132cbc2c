use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;

use crate::keys::KeyError;
use crate::linked_data::{Cid, CodecError, Ipld};

/// Streaming body produced by a capability call. Chunks surface as
/// io errors so they can flow straight into a response body.
pub type ByteStream = Pin<Box<dyn Stream<Item = std::io::Result<Bytes>> + Send + Sync + 'static>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Directory,
    Raw,
}

/// What a CAN path resolves to.
#[derive(Debug, Clone)]
pub struct Entry {
    pub cid: Cid,
    pub kind: EntryKind,
    pub size: u64,
    /// MIME recorded on the link at write time, if any.
    pub mime: Option<String>,
}

/// One child of a directory node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirEntry {
    pub name: String,
    pub kind: EntryKind,
    pub size: u64,
}

/// A keypair known to the local key set: a caller-chosen alias and
/// the base36 public identifier it maps to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyInfo {
    pub name: String,
    pub id: String,
}

/// One message delivered on a pubsub topic.
#[derive(Debug, Clone)]
pub struct PubsubMessage {
    pub from: String,
    pub seq: u64,
    pub data: Bytes,
}

/// An active pubsub listener. Dropping the subscription releases the
/// underlying topic registration.
pub struct Subscription {
    pub topic: String,
    pub messages: Pin<Box<dyn Stream<Item = PubsubMessage> + Send + Sync + 'static>>,
    // Held only for its Drop impl.
    pub guard: Box<dyn std::any::Any + Send + Sync>,
}

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
    #[error("key error: {0}")]
    Key(#[from] KeyError),
    #[error("client error: {0}")]
    Default(#[from] anyhow::Error),
}

/// Capabilities the adapter invokes on the embedded CAN client.
///
/// Paths are canonical CAN paths: `/content/<cid>/<seg>/…` for
/// immutable roots, `/adapter-tmp/<id>/<seg>/…` for scratch
/// workspaces staging a copy-on-write mutation. Every call may
/// suspend on network or disk.
#[async_trait]
pub trait CanClient: Send + Sync + 'static {
    // blocks
    async fn block_get(&self, cid: &Cid) -> Result<Bytes, ClientError>;

    // stat / export
    async fn stat(&self, path: &str) -> Result<Entry, ClientError>;
    async fn cat(
        &self,
        path: &str,
        offset: Option<u64>,
        length: Option<u64>,
    ) -> Result<ByteStream, ClientError>;
    async fn ls(&self, path: &str) -> Result<Vec<DirEntry>, ClientError>;
    async fn export_car(&self, cid: &Cid) -> Result<ByteStream, ClientError>;
    async fn import_car(&self, data: Bytes) -> Result<Vec<Cid>, ClientError>;

    // scratch tree
    async fn tree_copy(&self, from: &str, to: &str) -> Result<(), ClientError>;
    async fn tree_write(&self, path: &str, data: Bytes) -> Result<(), ClientError>;
    async fn tree_remove(&self, path: &str) -> Result<(), ClientError>;
    async fn tree_stat(&self, path: &str) -> Result<Entry, ClientError>;

    // linked data
    async fn dag_get(&self, cid: &Cid, path: &[String]) -> Result<Ipld, ClientError>;
    async fn dag_put(&self, value: &Ipld, codec: u64) -> Result<Cid, ClientError>;

    // key lifecycle
    async fn key_list(&self) -> Result<Vec<KeyInfo>, ClientError>;
    async fn key_gen(&self, name: &str) -> Result<KeyInfo, ClientError>;
    async fn key_remove(&self, name: &str) -> Result<KeyInfo, ClientError>;

    // mutable naming
    async fn name_resolve(&self, name: &str) -> Result<String, ClientError>;
    async fn name_publish(&self, key: &str, path: &str) -> Result<(), ClientError>;

    // pubsub
    async fn peer_id(&self) -> Result<String, ClientError>;
    async fn pubsub_subscribe(&self, topic: &str) -> Result<Subscription, ClientError>;
    async fn pubsub_publish(&self, topic: &str, data: Bytes) -> Result<(), ClientError>;
    async fn pubsub_subscribed(&self, topic: &str) -> Result<bool, ClientError>;
}

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream;
use parking_lot::Mutex;
use tokio::sync::broadcast;

use crate::client::{
    ByteStream, CanClient, ClientError, DirEntry, Entry, EntryKind, KeyInfo, PubsubMessage,
    Subscription,
};
use crate::keys::{PublicKey, SecretKey};
use crate::linked_data::{
    self, cid_base36, BlockEncoded, Cid, Ipld, DAG_CBOR_CODEC, RAW_CODEC,
};
use crate::node::{MaybeMime, Node, NodeLink};

const PUBSUB_CHANNEL_CAPACITY: usize = 256;

/// In-process CAN client over an in-memory block store.
///
/// Blocks are addressed by sha2-256 CIDs; directory trees are
/// dag-cbor [`Node`] blocks; scratch workspaces map a workspace name
/// to its current root. Name records are Ed25519-signed and verified
/// on resolve. Pubsub topics are broadcast channels.
#[derive(Clone)]
pub struct MemoryClient(Arc<Inner>);

struct Inner {
    secret: SecretKey,
    blocks: Mutex<HashMap<Cid, Bytes>>,
    // workspace name -> current root node
    scratch: Mutex<HashMap<String, Cid>>,
    keys: Mutex<BTreeMap<String, SecretKey>>,
    // base36 public id -> signed record
    records: Mutex<HashMap<String, NameRecord>>,
    // dns-style name -> CAN path
    dns: Mutex<HashMap<String, String>>,
    topics: Mutex<HashMap<String, TopicState>>,
}

struct NameRecord {
    path: String,
    seq: u64,
    signature: ed25519_dalek::Signature,
    key: PublicKey,
}

struct TopicState {
    sender: broadcast::Sender<PubsubMessage>,
    subscribers: usize,
    seq: u64,
}

// Releases the topic registration when a subscription is dropped.
struct SubscriptionGuard {
    inner: Arc<Inner>,
    topic: String,
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        let mut topics = self.inner.topics.lock();
        if let Some(state) = topics.get_mut(&self.topic) {
            state.subscribers = state.subscribers.saturating_sub(1);
            tracing::debug!(topic = %self.topic, subscribers = state.subscribers, "unsubscribed");
        }
    }
}

impl Default for MemoryClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryClient {
    pub fn new() -> Self {
        MemoryClient(Arc::new(Inner {
            secret: SecretKey::generate(),
            blocks: Mutex::new(HashMap::new()),
            scratch: Mutex::new(HashMap::new()),
            keys: Mutex::new(BTreeMap::new()),
            records: Mutex::new(HashMap::new()),
            dns: Mutex::new(HashMap::new()),
            topics: Mutex::new(HashMap::new()),
        }))
    }

    /// Register a DNS-style name pointing at a CAN path.
    pub fn set_dns(&self, name: &str, path: &str) {
        self.0.dns.lock().insert(name.to_string(), path.to_string());
    }
}

/// Split `/content/<cid>/<seg>/…` into root CID and segments.
fn parse_content_path(path: &str) -> Result<(Cid, Vec<String>), ClientError> {
    let mut parts = path.trim_start_matches('/').split('/');
    match parts.next() {
        Some("content") => {}
        _ => return Err(ClientError::InvalidInput(format!("not a content path: {}", path))),
    }
    let root = parts
        .next()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ClientError::InvalidInput(format!("missing root in path: {}", path)))?;
    let cid = Cid::try_from(root)
        .map_err(|e| ClientError::InvalidInput(format!("invalid cid {}: {}", root, e)))?;
    let segments = parts.filter(|s| !s.is_empty()).map(str::to_string).collect();
    Ok((cid, segments))
}

/// Split `/adapter-tmp/<workspace>/<seg>/…` into workspace and segments.
fn parse_scratch_path(path: &str) -> Result<(String, Vec<String>), ClientError> {
    let mut parts = path.trim_start_matches('/').split('/');
    match parts.next() {
        Some("adapter-tmp") => {}
        _ => return Err(ClientError::InvalidInput(format!("not a scratch path: {}", path))),
    }
    let workspace = parts
        .next()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ClientError::InvalidInput(format!("missing workspace in path: {}", path)))?;
    let segments = parts.filter(|s| !s.is_empty()).map(str::to_string).collect();
    Ok((workspace.to_string(), segments))
}

fn entry_from_link(link: &NodeLink) -> Entry {
    match link {
        NodeLink::File { link, size, mime } => Entry {
            cid: *link,
            kind: EntryKind::File,
            size: *size,
            mime: mime.0.as_ref().map(|m| m.to_string()),
        },
        NodeLink::Dir { link } => Entry {
            cid: *link,
            kind: EntryKind::Directory,
            size: 0,
            mime: None,
        },
    }
}

impl Inner {
    fn put_block(&self, codec: u64, data: Vec<u8>) -> Cid {
        let cid = linked_data::digest(codec, &data);
        self.blocks.lock().insert(cid, Bytes::from(data));
        cid
    }

    fn get_block(&self, cid: &Cid) -> Result<Bytes, ClientError> {
        if linked_data::is_inline(cid) {
            return Ok(Bytes::copy_from_slice(cid.hash().digest()));
        }
        self.blocks
            .lock()
            .get(cid)
            .cloned()
            .ok_or_else(|| ClientError::NotFound(format!("block {}", cid)))
    }

    fn put_node(&self, node: &Node) -> Result<Cid, ClientError> {
        let data = node.encode()?;
        Ok(self.put_block(DAG_CBOR_CODEC, data))
    }

    // Inline roots decode as the empty directory; anything else must
    // be a dag-cbor node block.
    fn load_node(&self, cid: &Cid) -> Result<Node, ClientError> {
        if linked_data::is_inline(cid) {
            return Ok(Node::new());
        }
        match cid.codec() {
            DAG_CBOR_CODEC => {
                let data = self.get_block(cid)?;
                Ok(Node::decode(&data)?)
            }
            other => Err(ClientError::InvalidInput(format!(
                "not a directory node: codec 0x{:x}",
                other
            ))),
        }
    }

    /// Resolve the link a path points at. Empty segments resolve the
    /// root itself.
    fn resolve_link(&self, root: &Cid, segments: &[String]) -> Result<NodeLink, ClientError> {
        if segments.is_empty() {
            if root.codec() == RAW_CODEC {
                let size = self.get_block(root)?.len() as u64;
                return Ok(NodeLink::File {
                    link: *root,
                    size,
                    mime: MaybeMime(None),
                });
            }
            return Ok(NodeLink::new_dir(*root));
        }
        let mut node = self.load_node(root)?;
        for (i, segment) in segments.iter().enumerate() {
            let link = node
                .get_link(segment)
                .ok_or_else(|| ClientError::NotFound(format!("path segment {}", segment)))?;
            if i == segments.len() - 1 {
                return Ok(link.clone());
            }
            match link {
                NodeLink::Dir { link } => node = self.load_node(link)?,
                NodeLink::File { .. } => {
                    return Err(ClientError::NotFound(format!(
                        "{} is not a directory",
                        segment
                    )))
                }
            }
        }
        unreachable!("segments checked non-empty")
    }

    /// Rebuild the tree with `link` written (or removed, when `None`)
    /// at the path, creating missing parents on writes. Returns the
    /// updated node; intermediate nodes land in the block store.
    fn set_path(
        &self,
        node: &Node,
        segments: &[String],
        link: Option<NodeLink>,
    ) -> Result<Node, ClientError> {
        let name = &segments[0];
        if segments.len() == 1 {
            let mut updated = node.clone();
            match link {
                Some(link) => {
                    updated.insert(name.clone(), link);
                }
                None => {
                    updated
                        .del(name)
                        .ok_or_else(|| ClientError::NotFound(format!("path segment {}", name)))?;
                }
            }
            return Ok(updated);
        }
        let child = match node.get_link(name) {
            Some(NodeLink::Dir { link }) => self.load_node(link)?,
            Some(NodeLink::File { .. }) => {
                return Err(ClientError::InvalidInput(format!(
                    "{} is not a directory",
                    name
                )))
            }
            None if link.is_some() => Node::new(),
            None => return Err(ClientError::NotFound(format!("path segment {}", name))),
        };
        let updated_child = self.set_path(&child, &segments[1..], link)?;
        let child_cid = self.put_node(&updated_child)?;
        let mut updated = node.clone();
        updated.insert(name.clone(), NodeLink::new_dir(child_cid));
        Ok(updated)
    }

    fn scratch_root(&self, workspace: &str) -> Result<Cid, ClientError> {
        if let Some(cid) = self.scratch.lock().get(workspace) {
            return Ok(*cid);
        }
        // an untouched workspace is an empty directory
        let cid = self.put_node(&Node::new())?;
        self.scratch.lock().insert(workspace.to_string(), cid);
        Ok(cid)
    }

    fn secret_for(&self, key: &str) -> Result<(String, SecretKey), ClientError> {
        let keys = self.keys.lock();
        if let Some(secret) = keys.get(key) {
            return Ok((key.to_string(), secret.clone()));
        }
        for (name, secret) in keys.iter() {
            if secret.public().id_string() == key {
                return Ok((name.clone(), secret.clone()));
            }
        }
        Err(ClientError::NotFound(format!("key {}", key)))
    }

    fn collect_blocks(
        &self,
        cid: &Cid,
        seen: &mut HashSet<Cid>,
        out: &mut Vec<(Cid, Bytes)>,
    ) -> Result<(), ClientError> {
        if !seen.insert(*cid) || linked_data::is_inline(cid) {
            return Ok(());
        }
        let data = self.get_block(cid)?;
        out.push((*cid, data.clone()));
        if cid.codec() == DAG_CBOR_CODEC {
            let value = linked_data::decode_ipld(&data, DAG_CBOR_CODEC)?;
            let mut links = Vec::new();
            walk_links(&value, &mut links);
            for child in links {
                self.collect_blocks(&child, seen, out)?;
            }
        }
        Ok(())
    }
}

fn walk_links(value: &Ipld, out: &mut Vec<Cid>) {
    match value {
        Ipld::Link(cid) => out.push(*cid),
        Ipld::List(items) => items.iter().for_each(|v| walk_links(v, out)),
        Ipld::Map(map) => map.values().for_each(|v| walk_links(v, out)),
        _ => {}
    }
}

fn single_chunk(data: Bytes) -> ByteStream {
    Box::pin(stream::iter([Ok(data)]))
}

#[async_trait]
impl CanClient for MemoryClient {
    async fn block_get(&self, cid: &Cid) -> Result<Bytes, ClientError> {
        self.0.get_block(cid)
    }

    async fn stat(&self, path: &str) -> Result<Entry, ClientError> {
        let (root, segments) = parse_content_path(path)?;
        if segments.is_empty() && root.codec() == RAW_CODEC {
            let size = self.0.get_block(&root)?.len() as u64;
            return Ok(Entry {
                cid: root,
                kind: EntryKind::Raw,
                size,
                mime: None,
            });
        }
        let link = self.0.resolve_link(&root, &segments)?;
        if link.is_dir() {
            // surface missing blocks now rather than on first read
            self.0.load_node(link.cid())?;
        }
        Ok(entry_from_link(&link))
    }

    async fn cat(
        &self,
        path: &str,
        offset: Option<u64>,
        length: Option<u64>,
    ) -> Result<ByteStream, ClientError> {
        let (root, segments) = parse_content_path(path)?;
        let link = self.0.resolve_link(&root, &segments)?;
        let data = match link {
            NodeLink::File { link, .. } => self.0.get_block(&link)?,
            NodeLink::Dir { .. } => {
                return Err(ClientError::InvalidInput(format!("{} is not a file", path)))
            }
        };
        let start = (offset.unwrap_or(0) as usize).min(data.len());
        let end = match length {
            Some(len) => (start + len as usize).min(data.len()),
            None => data.len(),
        };
        Ok(single_chunk(data.slice(start..end)))
    }

    async fn ls(&self, path: &str) -> Result<Vec<DirEntry>, ClientError> {
        let (root, segments) = parse_content_path(path)?;
        let link = self.0.resolve_link(&root, &segments)?;
        if !link.is_dir() {
            return Err(ClientError::InvalidInput(format!(
                "{} is not a directory",
                path
            )));
        }
        let node = self.0.load_node(link.cid())?;
        Ok(node
            .links()
            .iter()
            .map(|(name, link)| DirEntry {
                name: name.clone(),
                kind: if link.is_dir() {
                    EntryKind::Directory
                } else {
                    EntryKind::File
                },
                size: link.size(),
            })
            .collect())
    }

    async fn export_car(&self, cid: &Cid) -> Result<ByteStream, ClientError> {
        let header = Ipld::Map(BTreeMap::from([
            ("roots".to_string(), Ipld::List(vec![Ipld::Link(*cid)])),
            ("version".to_string(), Ipld::Integer(1)),
        ]));
        let header = linked_data::encode_ipld(&header, DAG_CBOR_CODEC)?;

        let mut blocks = Vec::new();
        self.0
            .collect_blocks(cid, &mut HashSet::new(), &mut blocks)?;

        let mut out = Vec::new();
        let mut buf = unsigned_varint::encode::u64_buffer();
        out.extend_from_slice(unsigned_varint::encode::u64(header.len() as u64, &mut buf));
        out.extend_from_slice(&header);
        for (cid, data) in blocks {
            let cid_bytes = cid.to_bytes();
            let frame_len = (cid_bytes.len() + data.len()) as u64;
            out.extend_from_slice(unsigned_varint::encode::u64(frame_len, &mut buf));
            out.extend_from_slice(&cid_bytes);
            out.extend_from_slice(&data);
        }
        Ok(single_chunk(Bytes::from(out)))
    }

    async fn import_car(&self, data: Bytes) -> Result<Vec<Cid>, ClientError> {
        let truncated = || ClientError::InvalidInput("truncated archive".to_string());
        let (header_len, mut rest) = unsigned_varint::decode::u64(&data)
            .map_err(|e| ClientError::InvalidInput(format!("bad archive header: {}", e)))?;
        let header = rest.get(..header_len as usize).ok_or_else(truncated)?;
        rest = &rest[header_len as usize..];

        let header = linked_data::decode_ipld(header, DAG_CBOR_CODEC)?;
        let roots = match header {
            Ipld::Map(map) => match map.get("roots") {
                Some(Ipld::List(items)) => items
                    .iter()
                    .map(|item| match item {
                        Ipld::Link(cid) => Ok(*cid),
                        _ => Err(ClientError::InvalidInput("bad archive root".to_string())),
                    })
                    .collect::<Result<Vec<_>, _>>()?,
                _ => return Err(ClientError::InvalidInput("archive has no roots".to_string())),
            },
            _ => return Err(ClientError::InvalidInput("bad archive header".to_string())),
        };

        while !rest.is_empty() {
            let (frame_len, tail) = unsigned_varint::decode::u64(rest)
                .map_err(|e| ClientError::InvalidInput(format!("bad archive frame: {}", e)))?;
            let frame = tail.get(..frame_len as usize).ok_or_else(truncated)?;
            rest = &tail[frame_len as usize..];

            let mut cursor = std::io::Cursor::new(frame);
            let cid = Cid::read_bytes(&mut cursor)
                .map_err(|e| ClientError::InvalidInput(format!("bad frame cid: {}", e)))?;
            let body = Bytes::copy_from_slice(&frame[cursor.position() as usize..]);
            let mut blocks = self.0.blocks.lock();
            // version-0 roots stay reachable through their version-1
            // spelling, which is what returned URLs carry
            blocks.insert(linked_data::as_v1(&cid), body.clone());
            blocks.insert(cid, body);
        }

        if roots.is_empty() {
            return Err(ClientError::InvalidInput("archive has no roots".to_string()));
        }
        Ok(roots)
    }

    async fn tree_copy(&self, from: &str, to: &str) -> Result<(), ClientError> {
        let (root, segments) = parse_content_path(from)?;
        let (workspace, to_segments) = parse_scratch_path(to)?;
        if !to_segments.is_empty() {
            return Err(ClientError::InvalidInput(
                "copy target must be a workspace root".to_string(),
            ));
        }
        let link = self.0.resolve_link(&root, &segments)?;
        if !link.is_dir() {
            return Err(ClientError::InvalidInput(format!(
                "{} is not a directory",
                from
            )));
        }
        // validate the source decodes before adopting it
        self.0.load_node(link.cid())?;
        self.0.scratch.lock().insert(workspace, *link.cid());
        Ok(())
    }

    async fn tree_write(&self, path: &str, data: Bytes) -> Result<(), ClientError> {
        let (workspace, segments) = parse_scratch_path(path)?;
        if segments.is_empty() {
            return Err(ClientError::InvalidInput(
                "write requires a file path".to_string(),
            ));
        }
        let root_cid = self.0.scratch_root(&workspace)?;
        let root = self.0.load_node(&root_cid)?;

        let size = data.len() as u64;
        let leaf = self.0.put_block(RAW_CODEC, data.to_vec());
        let name = segments.last().expect("segments checked non-empty");
        let link = NodeLink::new_file_from_path(leaf, size, Path::new(name));

        let updated = self.0.set_path(&root, &segments, Some(link))?;
        let updated_cid = self.0.put_node(&updated)?;
        self.0.scratch.lock().insert(workspace, updated_cid);
        Ok(())
    }

    async fn tree_remove(&self, path: &str) -> Result<(), ClientError> {
        let (workspace, segments) = parse_scratch_path(path)?;
        if segments.is_empty() {
            // releasing the workspace itself is idempotent
            self.0.scratch.lock().remove(&workspace);
            return Ok(());
        }
        let root_cid = self.0.scratch_root(&workspace)?;
        let root = self.0.load_node(&root_cid)?;
        let updated = self.0.set_path(&root, &segments, None)?;
        let updated_cid = self.0.put_node(&updated)?;
        self.0.scratch.lock().insert(workspace, updated_cid);
        Ok(())
    }

    async fn tree_stat(&self, path: &str) -> Result<Entry, ClientError> {
        let (workspace, segments) = parse_scratch_path(path)?;
        let root = self.0.scratch_root(&workspace)?;
        if segments.is_empty() {
            return Ok(Entry {
                cid: root,
                kind: EntryKind::Directory,
                size: 0,
                mime: None,
            });
        }
        let link = self.0.resolve_link(&root, &segments)?;
        Ok(entry_from_link(&link))
    }

    async fn dag_get(&self, cid: &Cid, path: &[String]) -> Result<Ipld, ClientError> {
        let data = self.0.get_block(cid)?;
        let mut value = linked_data::decode_ipld(&data, cid.codec())?;
        for segment in path {
            // links are traversed transparently
            while let Ipld::Link(next) = value {
                let data = self.0.get_block(&next)?;
                value = linked_data::decode_ipld(&data, next.codec())?;
            }
            value = match value {
                Ipld::Map(mut map) => map
                    .remove(segment)
                    .ok_or_else(|| ClientError::NotFound(format!("no key {}", segment)))?,
                Ipld::List(items) => {
                    let index: usize = segment
                        .parse()
                        .map_err(|_| ClientError::NotFound(format!("no index {}", segment)))?;
                    items
                        .into_iter()
                        .nth(index)
                        .ok_or_else(|| ClientError::NotFound(format!("no index {}", segment)))?
                }
                _ => {
                    return Err(ClientError::NotFound(format!(
                        "cannot descend into scalar at {}",
                        segment
                    )))
                }
            };
        }
        Ok(value)
    }

    async fn dag_put(&self, value: &Ipld, codec: u64) -> Result<Cid, ClientError> {
        let data = linked_data::encode_ipld(value, codec)?;
        Ok(self.0.put_block(codec, data))
    }

    async fn key_list(&self) -> Result<Vec<KeyInfo>, ClientError> {
        Ok(self
            .0
            .keys
            .lock()
            .iter()
            .map(|(name, secret)| KeyInfo {
                name: name.clone(),
                id: secret.public().id_string(),
            })
            .collect())
    }

    async fn key_gen(&self, name: &str) -> Result<KeyInfo, ClientError> {
        let mut keys = self.0.keys.lock();
        let secret = keys
            .entry(name.to_string())
            .or_insert_with(SecretKey::generate);
        let info = KeyInfo {
            name: name.to_string(),
            id: secret.public().id_string(),
        };
        tracing::debug!(name = %info.name, id = %info.id, "key ready");
        Ok(info)
    }

    async fn key_remove(&self, name: &str) -> Result<KeyInfo, ClientError> {
        let secret = self
            .0
            .keys
            .lock()
            .remove(name)
            .ok_or_else(|| ClientError::NotFound(format!("key {}", name)))?;
        Ok(KeyInfo {
            name: name.to_string(),
            id: secret.public().id_string(),
        })
    }

    async fn name_resolve(&self, name: &str) -> Result<String, ClientError> {
        if name.contains('.') {
            return self
                .0
                .dns
                .lock()
                .get(name)
                .cloned()
                .ok_or_else(|| ClientError::NotFound(format!("no dns record for {}", name)));
        }
        let cid = Cid::try_from(name)
            .map_err(|e| ClientError::InvalidInput(format!("invalid name {}: {}", name, e)))?;
        let id = cid_base36(&cid);
        let records = self.0.records.lock();
        let record = records
            .get(&id)
            .ok_or_else(|| ClientError::NotFound(format!("no record for {}", id)))?;
        let msg = format!("{}:{}", record.seq, record.path);
        record
            .key
            .verify(msg.as_bytes(), &record.signature)
            .map_err(|_| anyhow::anyhow!("record signature invalid for {}", id))?;
        Ok(record.path.clone())
    }

    async fn name_publish(&self, key: &str, path: &str) -> Result<(), ClientError> {
        let (_, secret) = self.0.secret_for(key)?;
        let id = secret.public().id_string();
        let mut records = self.0.records.lock();
        let seq = records.get(&id).map(|r| r.seq + 1).unwrap_or(1);
        let msg = format!("{}:{}", seq, path);
        let record = NameRecord {
            path: path.to_string(),
            seq,
            signature: secret.sign(msg.as_bytes()),
            key: secret.public(),
        };
        tracing::debug!(id = %id, seq, path = %path, "published record");
        records.insert(id, record);
        Ok(())
    }

    async fn peer_id(&self) -> Result<String, ClientError> {
        Ok(self.0.secret.public().id_string())
    }

    async fn pubsub_subscribe(&self, topic: &str) -> Result<Subscription, ClientError> {
        let receiver = {
            let mut topics = self.0.topics.lock();
            let state = topics.entry(topic.to_string()).or_insert_with(|| TopicState {
                sender: broadcast::channel(PUBSUB_CHANNEL_CAPACITY).0,
                subscribers: 0,
                seq: 0,
            });
            state.subscribers += 1;
            state.sender.subscribe()
        };
        let messages = Box::pin(stream::unfold(receiver, |mut receiver| async move {
            loop {
                match receiver.recv().await {
                    Ok(message) => return Some((message, receiver)),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "subscription lagged");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        }));
        Ok(Subscription {
            topic: topic.to_string(),
            messages,
            guard: Box::new(SubscriptionGuard {
                inner: self.0.clone(),
                topic: topic.to_string(),
            }),
        })
    }

    async fn pubsub_publish(&self, topic: &str, data: Bytes) -> Result<(), ClientError> {
        let from = self.0.secret.public().id_string();
        let mut topics = self.0.topics.lock();
        let state = topics.entry(topic.to_string()).or_insert_with(|| TopicState {
            sender: broadcast::channel(PUBSUB_CHANNEL_CAPACITY).0,
            subscribers: 0,
            seq: 0,
        });
        state.seq += 1;
        // no receivers is fine
        let _ = state.sender.send(PubsubMessage {
            from,
            seq: state.seq,
            data,
        });
        Ok(())
    }

    async fn pubsub_subscribed(&self, topic: &str) -> Result<bool, ClientError> {
        Ok(self
            .0
            .topics
            .lock()
            .get(topic)
            .map(|state| state.subscribers > 0)
            .unwrap_or(false))
    }
}

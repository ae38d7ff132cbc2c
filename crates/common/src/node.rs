use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;

use mime::Mime;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::linked_data::{BlockEncoded, Cid};

/**
 * Nodes
 * =====
 * Nodes are the building blocks of a content tree.
 *  A node is a description of links to other nodes,
 *  in two categories:
 *  - File links: terminal leaves, raw block bytes
 *  - Dir links: other nodes
 * Nodes are always dag-cbor encoded.
 */

// MIME types recorded on file links at write time. Serialized as a
// plain string so the node encoding stays codec-agnostic.
#[derive(Debug, Clone, PartialEq)]
pub struct MaybeMime(pub Option<Mime>);

impl MaybeMime {
    pub fn from_path(path: &Path) -> Self {
        MaybeMime(mime_guess::from_path(path).first())
    }
}

impl Serialize for MaybeMime {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match &self.0 {
            Some(mime) => serializer.serialize_str(mime.as_ref()),
            None => serializer.serialize_none(),
        }
    }
}

impl<'de> Deserialize<'de> for MaybeMime {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let opt: Option<String> = Option::deserialize(deserializer)?;
        match opt {
            Some(s) => {
                let mime = Mime::from_str(&s).map_err(serde::de::Error::custom)?;
                Ok(MaybeMime(Some(mime)))
            }
            None => Ok(MaybeMime(None)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NodeLink {
    File { link: Cid, size: u64, mime: MaybeMime },
    Dir { link: Cid },
}

impl NodeLink {
    /// A file link with the MIME type detected from its path.
    pub fn new_file_from_path(link: Cid, size: u64, path: &Path) -> Self {
        NodeLink::File {
            link,
            size,
            mime: MaybeMime::from_path(path),
        }
    }

    pub fn new_dir(link: Cid) -> Self {
        NodeLink::Dir { link }
    }

    pub fn cid(&self) -> &Cid {
        match self {
            NodeLink::File { link, .. } => link,
            NodeLink::Dir { link } => link,
        }
    }

    pub fn size(&self) -> u64 {
        match self {
            NodeLink::File { size, .. } => *size,
            NodeLink::Dir { .. } => 0,
        }
    }

    pub fn mime(&self) -> Option<&Mime> {
        match self {
            NodeLink::File { mime, .. } => mime.0.as_ref(),
            NodeLink::Dir { .. } => None,
        }
    }

    pub fn is_dir(&self) -> bool {
        matches!(self, NodeLink::Dir { .. })
    }

    pub fn is_file(&self) -> bool {
        matches!(self, NodeLink::File { .. })
    }
}

// A node is just a map of names to links. When traversing the tree,
// paths are /-joined names of links in nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Node {
    links: BTreeMap<String, NodeLink>,
}

impl BlockEncoded for Node {}

impl Node {
    pub fn new() -> Self {
        Node {
            links: BTreeMap::new(),
        }
    }

    pub fn get_link(&self, name: &str) -> Option<&NodeLink> {
        self.links.get(name)
    }

    pub fn insert(&mut self, name: String, link: NodeLink) -> Option<NodeLink> {
        self.links.insert(name, link)
    }

    pub fn del(&mut self, name: &str) -> Option<NodeLink> {
        self.links.remove(name)
    }

    pub fn links(&self) -> &BTreeMap<String, NodeLink> {
        &self.links
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }
}

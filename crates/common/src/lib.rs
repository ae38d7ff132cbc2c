/**
 * Capability surface of the embedded CAN client.
 *  The fetch adapter only ever talks to the network
 *  through the `CanClient` trait defined here.
 */
pub mod client;
/**
 * Ed25519 keypairs backing mutable names.
 *  A key's public identifier is a version-1 CID
 *  with the libp2p-key codec, rendered in base36.
 */
pub mod keys;
/**
 * Wrapper around IPLD, CIDs and the block codecs
 *  (dag-cbor, dag-json, raw) used across the tree.
 */
pub mod linked_data;
/**
 * A complete in-process CAN client over an in-memory
 *  block store. Backs tests, demos and the gateway
 *  binary.
 */
pub mod memory;
/**
 * Directory DAG node model. A node is a map of names
 *  to links; file links carry size and an optional
 *  MIME type detected at write time.
 */
pub mod node;
/**
 * Helpers for seeding a memory client in tests.
 */
pub mod testkit;

pub mod prelude {
    pub use crate::client::{
        ByteStream, CanClient, ClientError, DirEntry, Entry, EntryKind, KeyInfo, PubsubMessage,
        Subscription,
    };
    pub use crate::keys::{PublicKey, SecretKey};
    pub use crate::linked_data::{Cid, CodecError, Ipld};
    pub use crate::memory::MemoryClient;
}

use std::sync::LazyLock;

use multihash_codetable::{Code, MultihashDigest};
use serde::de::DeserializeOwned;
use serde::Serialize;

pub use cid::Cid;
pub use ipld_core::ipld::Ipld;
pub use multibase;

/// Raw block bytes, no structure.
pub const RAW_CODEC: u64 = 0x55;
/// Legacy protobuf directory encoding; only the inline empty
/// directory sentinel is ever seen with this codec.
pub const DAG_PB_CODEC: u64 = 0x70;
/// Deterministic CBOR, the default store codec for linked data.
pub const DAG_CBOR_CODEC: u64 = 0x71;
/// Public keys addressed as CIDs.
pub const LIBP2P_KEY_CODEC: u64 = 0x72;
/// Deterministic JSON.
pub const DAG_JSON_CODEC: u64 = 0x0129;

/// Identity multihash; the digest is the data itself.
pub const IDENTITY_HASH: u64 = 0x00;

/// The well-known inline encoding of an empty directory. Callers
/// may use it as the base for a first write.
pub static EMPTY_DIR_CID: LazyLock<Cid> =
    LazyLock::new(|| Cid::try_from("bafyaabakaieac").expect("valid sentinel cid"));

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("encode error: {0}")]
    Encode(String),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("unknown codec: 0x{0:x}")]
    UnknownCodec(u64),
    #[error("cid error: {0}")]
    Cid(#[from] cid::Error),
}

/// Hash `data` with sha2-256 and address it under `codec`.
pub fn digest(codec: u64, data: &[u8]) -> Cid {
    Cid::new_v1(codec, Code::Sha2_256.digest(data))
}

/// True when the block's bytes are inlined in the identifier itself.
pub fn is_inline(cid: &Cid) -> bool {
    cid.hash().code() == IDENTITY_HASH
}

/// Upgrade a version-0 identifier to its version-1 equivalent.
pub fn as_v1(cid: &Cid) -> Cid {
    match cid.version() {
        cid::Version::V1 => *cid,
        _ => Cid::new_v1(cid.codec(), *cid.hash()),
    }
}

/// Stable base32 rendering used for content roots in returned URLs.
/// Always version-1.
pub fn cid_base32(cid: &Cid) -> String {
    let cid = as_v1(cid);
    cid.to_string_of_base(multibase::Base::Base32Lower)
        .unwrap_or_else(|_| cid.to_string())
}

/// Stable base36 rendering used for mutable-name public ids.
pub fn cid_base36(cid: &Cid) -> String {
    cid.to_string_of_base(multibase::Base::Base36Lower)
        .unwrap_or_else(|_| cid.to_string())
}

/// Encode an IPLD value under the given codec.
pub fn encode_ipld(value: &Ipld, codec: u64) -> Result<Vec<u8>, CodecError> {
    match codec {
        DAG_CBOR_CODEC => {
            serde_ipld_dagcbor::to_vec(value).map_err(|e| CodecError::Encode(e.to_string()))
        }
        DAG_JSON_CODEC => {
            serde_ipld_dagjson::to_vec(value).map_err(|e| CodecError::Encode(e.to_string()))
        }
        other => Err(CodecError::UnknownCodec(other)),
    }
}

/// Decode a block under the given codec into an IPLD value.
pub fn decode_ipld(data: &[u8], codec: u64) -> Result<Ipld, CodecError> {
    match codec {
        DAG_CBOR_CODEC => {
            serde_ipld_dagcbor::from_slice(data).map_err(|e| CodecError::Decode(e.to_string()))
        }
        DAG_JSON_CODEC => {
            serde_ipld_dagjson::from_slice(data).map_err(|e| CodecError::Decode(e.to_string()))
        }
        RAW_CODEC => Ok(Ipld::Bytes(data.to_vec())),
        other => Err(CodecError::UnknownCodec(other)),
    }
}

/// Bridge an IPLD value into a plain JSON value through the
/// deterministic JSON encoding. Links become `{"/": <cid>}` maps.
pub fn to_json_value(value: &Ipld) -> Result<serde_json::Value, CodecError> {
    let bytes =
        serde_ipld_dagjson::to_vec(value).map_err(|e| CodecError::Encode(e.to_string()))?;
    serde_json::from_slice(&bytes).map_err(|e| CodecError::Decode(e.to_string()))
}

/// Bridge a plain JSON value back into IPLD.
pub fn from_json_value(value: &serde_json::Value) -> Result<Ipld, CodecError> {
    let bytes = serde_json::to_vec(value).map_err(|e| CodecError::Encode(e.to_string()))?;
    serde_ipld_dagjson::from_slice(&bytes).map_err(|e| CodecError::Decode(e.to_string()))
}

/// Types that are stored as dag-cbor blocks.
pub trait BlockEncoded: Serialize + DeserializeOwned {
    fn encode(&self) -> Result<Vec<u8>, CodecError> {
        serde_ipld_dagcbor::to_vec(self).map_err(|e| CodecError::Encode(e.to_string()))
    }

    fn decode(data: &[u8]) -> Result<Self, CodecError> {
        serde_ipld_dagcbor::from_slice(data).map_err(|e| CodecError::Decode(e.to_string()))
    }
}

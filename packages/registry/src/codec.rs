//! Record codecs.
//!
//! Leaves outlive the processes that wrote them, so an encoding must stay
//! readable across restarts and across nodes. Two are provided:
//! - [`BinaryCodec`]: compact length-prefixed layout (the default)
//! - [`JsonCodec`]: `serde_json`, handy when inspecting a store by hand

use std::sync::Arc;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use crate::error::{RegistryError, Result};
use crate::record::RegistrationInfo;

/// Symmetric encode/decode of a single registration record.
pub trait RegistrationCodec: Send + Sync {
    fn encode(&self, record: &RegistrationInfo) -> Result<Bytes>;

    fn decode(&self, bytes: &[u8]) -> Result<RegistrationInfo>;

    /// Short name for logs.
    fn name(&self) -> &'static str;
}

impl<T: RegistrationCodec + ?Sized> RegistrationCodec for Arc<T> {
    fn encode(&self, record: &RegistrationInfo) -> Result<Bytes> {
        self.as_ref().encode(record)
    }

    fn decode(&self, bytes: &[u8]) -> Result<RegistrationInfo> {
        self.as_ref().decode(bytes)
    }

    fn name(&self) -> &'static str {
        self.as_ref().name()
    }
}

impl<T: RegistrationCodec + ?Sized> RegistrationCodec for Box<T> {
    fn encode(&self, record: &RegistrationInfo) -> Result<Bytes> {
        self.as_ref().encode(record)
    }

    fn decode(&self, bytes: &[u8]) -> Result<RegistrationInfo> {
        self.as_ref().decode(bytes)
    }

    fn name(&self) -> &'static str {
        self.as_ref().name()
    }
}

/// Which codec a registry uses, as named in configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodecKind {
    #[default]
    Binary,
    Json,
}

impl CodecKind {
    /// Parse a configuration value; unknown names yield `None`.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "binary" => Some(CodecKind::Binary),
            "json" => Some(CodecKind::Json),
            _ => None,
        }
    }

    pub fn build(self) -> Arc<dyn RegistrationCodec> {
        match self {
            CodecKind::Binary => Arc::new(BinaryCodec),
            CodecKind::Json => Arc::new(JsonCodec),
        }
    }
}

/// Length-prefixed big-endian layout:
///
/// ```text
/// u32 node_id_len | node_id (utf-8) | u64 seq | u8 local_only | u32 payload_len | payload
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct BinaryCodec;

impl BinaryCodec {
    fn take_len(buf: &mut &[u8], what: &str) -> Result<usize> {
        if buf.remaining() < 4 {
            return Err(RegistryError::decode(format!("truncated {} length", what)));
        }
        let len = buf.get_u32() as usize;
        if buf.remaining() < len {
            return Err(RegistryError::decode(format!(
                "truncated {}: need {} bytes, have {}",
                what,
                len,
                buf.remaining()
            )));
        }
        Ok(len)
    }
}

impl RegistrationCodec for BinaryCodec {
    fn encode(&self, record: &RegistrationInfo) -> Result<Bytes> {
        let node_id = record.node_id().as_bytes();
        let payload = record.payload();
        let node_id_len = u32::try_from(node_id.len())
            .map_err(|_| RegistryError::encode("node id too long"))?;
        let payload_len =
            u32::try_from(payload.len()).map_err(|_| RegistryError::encode("payload too long"))?;

        let mut buf = BytesMut::with_capacity(4 + node_id.len() + 8 + 1 + 4 + payload.len());
        buf.put_u32(node_id_len);
        buf.put_slice(node_id);
        buf.put_u64(record.seq());
        buf.put_u8(u8::from(record.is_local_only()));
        buf.put_u32(payload_len);
        buf.put_slice(payload);
        Ok(buf.freeze())
    }

    fn decode(&self, bytes: &[u8]) -> Result<RegistrationInfo> {
        let mut buf = bytes;

        let len = Self::take_len(&mut buf, "node id")?;
        let node_id = std::str::from_utf8(&buf[..len])
            .map_err(|e| RegistryError::decode(format!("node id is not utf-8: {}", e)))?
            .to_string();
        buf.advance(len);

        if buf.remaining() < 9 {
            return Err(RegistryError::decode("truncated seq or flag"));
        }
        let seq = buf.get_u64();
        let local_only = match buf.get_u8() {
            0 => false,
            1 => true,
            other => {
                return Err(RegistryError::decode(format!(
                    "invalid local-only flag {}",
                    other
                )))
            }
        };

        let len = Self::take_len(&mut buf, "payload")?;
        let payload = Bytes::copy_from_slice(&buf[..len]);
        buf.advance(len);

        if buf.has_remaining() {
            return Err(RegistryError::decode(format!(
                "{} trailing bytes",
                buf.remaining()
            )));
        }

        RegistrationInfo::new(node_id, seq, local_only, payload)
            .map_err(|e| RegistryError::decode(e.to_string()))
    }

    fn name(&self) -> &'static str {
        "binary"
    }
}

/// `serde_json` encoding of the record.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl RegistrationCodec for JsonCodec {
    fn encode(&self, record: &RegistrationInfo) -> Result<Bytes> {
        serde_json::to_vec(record)
            .map(Bytes::from)
            .map_err(|e| RegistryError::encode(e.to_string()))
    }

    fn decode(&self, bytes: &[u8]) -> Result<RegistrationInfo> {
        let record: RegistrationInfo =
            serde_json::from_slice(bytes).map_err(|e| RegistryError::decode(e.to_string()))?;
        record
            .validate()
            .map_err(|e| RegistryError::decode(e.to_string()))?;
        Ok(record)
    }

    fn name(&self) -> &'static str {
        "json"
    }
}

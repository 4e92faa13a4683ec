//! Commit log record codec
//!
//! Encodes and decodes a single mutation record. Pure functions, no I/O.
//!
//! ## Header Layout (16 bytes, big-endian)
//! ```text
//! ┌──────────────────┬────────┬───────────────────┬────────────────────┐
//! │ timestamp (64)   │ op (4) │ key_len (28)      │ value_len (32)     │
//! └──────────────────┴────────┴───────────────────┴────────────────────┘
//! followed by key_len bytes of key, then value_len bytes of value
//! ```

use bytes::{Buf, BufMut, BytesMut};

use crate::error::{CfgError, Result};

/// Fixed-width header: timestamp (8) + op/key_len (4) + value_len (4)
pub const HEADER_SIZE: usize = 16;

/// Largest key accepted (keys must stay below 1 MiB)
pub const MAX_KEY_LEN: usize = (1 << 20) - 1;

/// Largest value accepted (values must stay below 1 GiB)
pub const MAX_VALUE_LEN: usize = (1 << 30) - 1;

/// Largest possible encoded record, fits the u32 index entry
pub const MAX_RECORD_LEN: usize = HEADER_SIZE + MAX_KEY_LEN + MAX_VALUE_LEN;

const OP_SHIFT: u32 = 28;
const KEY_LEN_MASK: u32 = (1 << OP_SHIFT) - 1;

/// Size of the UNLOCK payload (the big-endian lock token)
pub(crate) const TOKEN_LEN: usize = 8;

/// Mutation kind, stored in the top 4 bits of the second header word
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OpType {
    Insert = 0,
    Delete = 1,
    Lock = 2,
    Unlock = 3,
}

impl OpType {
    fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            0 => Some(OpType::Insert),
            1 => Some(OpType::Delete),
            2 => Some(OpType::Lock),
            3 => Some(OpType::Unlock),
            _ => None,
        }
    }
}

/// One durable mutation event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    /// Creation time, strictly increasing within one log
    pub timestamp: u64,

    /// The operation this record describes
    pub op: OpType,

    pub key: Vec<u8>,

    /// Empty for DELETE and LOCK; the 8-byte token for UNLOCK
    pub value: Vec<u8>,
}

impl LogRecord {
    pub fn insert(timestamp: u64, key: Vec<u8>, value: Vec<u8>) -> Self {
        Self { timestamp, op: OpType::Insert, key, value }
    }

    pub fn delete(timestamp: u64, key: Vec<u8>) -> Self {
        Self { timestamp, op: OpType::Delete, key, value: Vec::new() }
    }

    pub fn lock(timestamp: u64, key: Vec<u8>) -> Self {
        Self { timestamp, op: OpType::Lock, key, value: Vec::new() }
    }

    /// UNLOCK carries the token (timestamp) of the LOCK record it releases
    pub fn unlock(timestamp: u64, key: Vec<u8>, token: u64) -> Self {
        Self {
            timestamp,
            op: OpType::Unlock,
            key,
            value: token.to_be_bytes().to_vec(),
        }
    }

    /// Byte count of the fixed-width portion
    pub const fn header_size() -> usize {
        HEADER_SIZE
    }

    /// Total encoded size: header + key + value
    pub fn encoded_len(&self) -> usize {
        HEADER_SIZE + self.key.len() + self.value.len()
    }

    /// The lock token stored in an UNLOCK record
    pub fn unlock_token(&self) -> Option<u64> {
        if self.op != OpType::Unlock {
            return None;
        }
        let bytes: [u8; TOKEN_LEN] = self.value.as_slice().try_into().ok()?;
        Some(u64::from_be_bytes(bytes))
    }

    /// Check field limits before anything is written
    pub fn validate(&self) -> Result<()> {
        if self.key.len() > MAX_KEY_LEN {
            return Err(CfgError::InvalidRecord(format!(
                "key length {} exceeds maximum {}",
                self.key.len(),
                MAX_KEY_LEN
            )));
        }
        if self.value.len() > MAX_VALUE_LEN {
            return Err(CfgError::InvalidRecord(format!(
                "value length {} exceeds maximum {}",
                self.value.len(),
                MAX_VALUE_LEN
            )));
        }
        match self.op {
            OpType::Delete | OpType::Lock if !self.value.is_empty() => {
                Err(CfgError::InvalidRecord(format!("{:?} record must not carry a value", self.op)))
            }
            OpType::Unlock if self.value.len() != TOKEN_LEN => Err(CfgError::InvalidRecord(
                "UNLOCK record must carry an 8-byte token".to_string(),
            )),
            _ => Ok(()),
        }
    }

    /// Encode to the on-disk layout. Deterministic, no padding.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.encode_into(&mut buf)?;
        Ok(buf.to_vec())
    }

    /// Encode, appending to an existing buffer
    pub fn encode_into(&self, buf: &mut BytesMut) -> Result<()> {
        self.validate()?;

        let op_and_key = ((self.op as u32) << OP_SHIFT) | (self.key.len() as u32 & KEY_LEN_MASK);

        buf.reserve(self.encoded_len());
        buf.put_u64(self.timestamp);
        buf.put_u32(op_and_key);
        buf.put_u32(self.value.len() as u32);
        buf.put_slice(&self.key);
        buf.put_slice(&self.value);
        Ok(())
    }

    /// Decode one record from the start of `bytes`.
    ///
    /// Trailing bytes after the record are ignored; use
    /// [`RecordHeader::record_len`] to step to the next record.
    pub fn decode(bytes: &[u8]) -> Result<LogRecord> {
        Self::decode_at(bytes, 0)
    }

    /// Decode with `base_offset` reported in corruption errors
    pub(crate) fn decode_at(bytes: &[u8], base_offset: u64) -> Result<LogRecord> {
        let header = RecordHeader::parse(bytes, base_offset)?;
        let total = header.record_len();
        if bytes.len() < total {
            return Err(CfgError::corrupt(
                base_offset,
                format!("declared length {} exceeds remaining {} bytes", total, bytes.len()),
            ));
        }
        header.into_record(&bytes[HEADER_SIZE..total], base_offset)
    }
}

/// Parsed fixed-width header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    pub timestamp: u64,
    pub op: OpType,
    pub key_len: u32,
    pub value_len: u32,
}

impl RecordHeader {
    /// Parse the first HEADER_SIZE bytes of `bytes`
    pub fn parse(bytes: &[u8], offset: u64) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(CfgError::corrupt(
                offset,
                format!("incomplete header: {} of {} bytes", bytes.len(), HEADER_SIZE),
            ));
        }

        let mut buf = &bytes[..HEADER_SIZE];
        let timestamp = buf.get_u64();
        let op_and_key = buf.get_u32();
        let value_len = buf.get_u32();

        let op_bits = (op_and_key >> OP_SHIFT) as u8;
        let op = OpType::from_bits(op_bits)
            .ok_or_else(|| CfgError::corrupt(offset, format!("unknown op type {}", op_bits)))?;

        let key_len = op_and_key & KEY_LEN_MASK;
        if key_len as usize > MAX_KEY_LEN {
            return Err(CfgError::corrupt(offset, format!("key length {} over limit", key_len)));
        }
        if value_len as usize > MAX_VALUE_LEN {
            return Err(CfgError::corrupt(offset, format!("value length {} over limit", value_len)));
        }

        Ok(Self { timestamp, op, key_len, value_len })
    }

    /// Bytes following the header
    pub fn body_len(&self) -> usize {
        self.key_len as usize + self.value_len as usize
    }

    /// Header plus body
    pub fn record_len(&self) -> usize {
        HEADER_SIZE + self.body_len()
    }

    /// Combine with the body bytes (exactly `body_len()` long)
    pub(crate) fn into_record(self, body: &[u8], offset: u64) -> Result<LogRecord> {
        let key_len = self.key_len as usize;
        let record = LogRecord {
            timestamp: self.timestamp,
            op: self.op,
            key: body[..key_len].to_vec(),
            value: body[key_len..self.body_len()].to_vec(),
        };
        record
            .validate()
            .map_err(|e| CfgError::corrupt(offset, e.to_string()))?;
        Ok(record)
    }
}

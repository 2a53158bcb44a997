use deb_types::Transaction;

use crate::error::{BlockError, BlockResult};

/// Block magic bytes.
pub const BLOCK_MAGIC: &[u8; 4] = b"DEBB";

/// Current block format version.
pub const FORMAT_VERSION: u32 = 1;

/// Header size: 4 bytes magic + 4 bytes format version.
const HEADER_SIZE: usize = 8;

/// bincode length prefix of the transaction sequence.
const LENGTH_PREFIX_SIZE: usize = 8;

/// Trailer size: CRC32 of the payload.
const TRAILER_SIZE: usize = 4;

/// Encoded size of a block holding no transactions.
pub const EMPTY_BLOCK_SIZE: usize = HEADER_SIZE + LENGTH_PREFIX_SIZE + TRAILER_SIZE;

/// Exact number of bytes `tx` adds to an encoded block.
pub fn transaction_size(tx: &Transaction) -> BlockResult<usize> {
    Ok(bincode::serialized_size(tx)? as usize)
}

/// An ordered run of transactions stored as one record.
///
/// Encoded format:
/// ```text
/// [4 bytes: magic "DEBB"]
/// [4 bytes: format version (big-endian u32)]
/// [N bytes: bincode Vec<Transaction> (u64 length + items)]
/// [4 bytes: CRC32 of the N payload bytes (little-endian u32)]
/// ```
///
/// The encoded size is tracked incrementally and is exact, so the packer
/// never has to serialize a block to learn whether the next transaction fits.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DataBlock {
    transactions: Vec<Transaction>,
    encoded_len: usize,
}

impl DataBlock {
    pub fn new() -> Self {
        Self {
            transactions: Vec::new(),
            encoded_len: EMPTY_BLOCK_SIZE,
        }
    }

    pub fn from_transactions(transactions: Vec<Transaction>) -> BlockResult<Self> {
        let mut encoded_len = EMPTY_BLOCK_SIZE;
        for tx in &transactions {
            encoded_len += transaction_size(tx)?;
        }
        Ok(Self {
            transactions,
            encoded_len,
        })
    }

    /// Exact size of [`DataBlock::encode`]'s output.
    pub fn encoded_len(&self) -> usize {
        self.encoded_len
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    pub fn into_transactions(self) -> Vec<Transaction> {
        self.transactions
    }

    /// Append a transaction whose size was already measured.
    pub(crate) fn push_measured(&mut self, tx: Transaction, size: usize) {
        self.transactions.push(tx);
        self.encoded_len += size;
    }

    pub fn encode(&self) -> BlockResult<Vec<u8>> {
        let payload = bincode::serialize(&self.transactions)?;
        let mut out = Vec::with_capacity(HEADER_SIZE + payload.len() + TRAILER_SIZE);
        out.extend_from_slice(BLOCK_MAGIC);
        out.extend_from_slice(&FORMAT_VERSION.to_be_bytes());
        out.extend_from_slice(&payload);
        out.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
        debug_assert_eq!(out.len(), self.encoded_len);
        Ok(out)
    }

    pub fn decode(bytes: &[u8]) -> BlockResult<Self> {
        if bytes.len() < EMPTY_BLOCK_SIZE {
            return Err(BlockError::Corrupt(format!(
                "block of {} bytes is shorter than the {EMPTY_BLOCK_SIZE}-byte minimum",
                bytes.len()
            )));
        }
        if &bytes[0..4] != BLOCK_MAGIC {
            return Err(BlockError::InvalidMagic {
                expected: String::from_utf8_lossy(BLOCK_MAGIC).into(),
                actual: String::from_utf8_lossy(&bytes[0..4]).into(),
            });
        }
        let format = u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        if format != FORMAT_VERSION {
            return Err(BlockError::UnsupportedFormat(format));
        }

        let payload_end = bytes.len() - TRAILER_SIZE;
        let payload = &bytes[HEADER_SIZE..payload_end];
        let trailer = &bytes[payload_end..];
        let stored = u32::from_le_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]);
        let computed = crc32fast::hash(payload);
        if stored != computed {
            return Err(BlockError::ChecksumMismatch { stored, computed });
        }

        let transactions: Vec<Transaction> = bincode::deserialize(payload)?;
        Ok(Self {
            transactions,
            encoded_len: bytes.len(),
        })
    }
}

impl Default for DataBlock {
    fn default() -> Self {
        Self::new()
    }
}

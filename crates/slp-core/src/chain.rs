//! Block headers and the block-store abstraction the retarget engine reads.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::hash::{double_sha256, hash_to_display_hex};
use crate::network::MEDIAN_TIME_SPAN;

/// Block-store lookup errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The store does not (yet) hold a block at this height.
    #[error("no stored block at height {height}")]
    NotFound { height: u32 },
    /// The store itself failed.
    #[error("block store failure: {0}")]
    Backend(String),
}

/// A block header (80 bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub version: i32,
    /// Hash of the previous block (internal byte order).
    pub prev_block_hash: [u8; 32],
    /// Merkle root of all transactions.
    pub merkle_root: [u8; 32],
    /// Block timestamp (Unix time).
    pub timestamp: u32,
    /// Difficulty target in compact "bits" format.
    pub bits: u32,
    pub nonce: u32,
}

impl BlockHeader {
    /// Serialize the block header to 80 bytes.
    pub fn serialize(&self) -> [u8; 80] {
        let mut header = [0u8; 80];
        header[0..4].copy_from_slice(&self.version.to_le_bytes());
        header[4..36].copy_from_slice(&self.prev_block_hash);
        header[36..68].copy_from_slice(&self.merkle_root);
        header[68..72].copy_from_slice(&self.timestamp.to_le_bytes());
        header[72..76].copy_from_slice(&self.bits.to_le_bytes());
        header[76..80].copy_from_slice(&self.nonce.to_le_bytes());
        header
    }

    /// Parse an 80-byte header.
    pub fn deserialize(bytes: &[u8; 80]) -> Self {
        let word = |at: usize| [bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]];
        let mut prev_block_hash = [0u8; 32];
        prev_block_hash.copy_from_slice(&bytes[4..36]);
        let mut merkle_root = [0u8; 32];
        merkle_root.copy_from_slice(&bytes[36..68]);

        BlockHeader {
            version: i32::from_le_bytes(word(0)),
            prev_block_hash,
            merkle_root,
            timestamp: u32::from_le_bytes(word(68)),
            bits: u32::from_le_bytes(word(72)),
            nonce: u32::from_le_bytes(word(76)),
        }
    }

    /// Compute the block hash (double SHA256).
    pub fn hash(&self) -> [u8; 32] {
        double_sha256(&self.serialize())
    }

    pub fn hash_hex(&self) -> String {
        hash_to_display_hex(&self.hash())
    }
}

/// A header together with its height in the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredBlock {
    pub header: BlockHeader,
    pub height: u32,
}

impl StoredBlock {
    pub fn new(header: BlockHeader, height: u32) -> Self {
        StoredBlock { header, height }
    }

    /// Block timestamp as a signed value for time arithmetic.
    pub fn time(&self) -> i64 {
        self.header.timestamp as i64
    }

    pub fn bits(&self) -> u32 {
        self.header.bits
    }
}

/// Lookup of blocks on the branch being evaluated, by height.
///
/// Implementations may block on storage. A block the store has not seen
/// must be reported as [`StoreError::NotFound`].
pub trait AncestorSource {
    fn ancestor(&self, height: u32) -> Result<StoredBlock, StoreError>;
}

impl<T: AncestorSource + ?Sized> AncestorSource for &T {
    fn ancestor(&self, height: u32) -> Result<StoredBlock, StoreError> {
        (**self).ancestor(height)
    }
}

/// A contiguous run of blocks held in memory.
///
/// The run may start above genesis, as it does for a wallet that only keeps
/// recent headers.
#[derive(Debug, Clone, Default)]
pub struct MemoryChain {
    start_height: u32,
    blocks: Vec<StoredBlock>,
}

impl MemoryChain {
    /// An empty chain whose first block will be at `start_height`.
    pub fn new(start_height: u32) -> Self {
        MemoryChain { start_height, blocks: Vec::new() }
    }

    /// Append a header, linking it to the current tip.
    pub fn push(&mut self, mut header: BlockHeader) -> StoredBlock {
        if let Some(tip) = self.blocks.last() {
            header.prev_block_hash = tip.header.hash();
        }
        let block = StoredBlock::new(header, self.start_height + self.blocks.len() as u32);
        self.blocks.push(block);
        block
    }

    pub fn tip(&self) -> Option<&StoredBlock> {
        self.blocks.last()
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn start_height(&self) -> u32 {
        self.start_height
    }
}

impl AncestorSource for MemoryChain {
    fn ancestor(&self, height: u32) -> Result<StoredBlock, StoreError> {
        height
            .checked_sub(self.start_height)
            .and_then(|offset| self.blocks.get(offset as usize))
            .copied()
            .ok_or(StoreError::NotFound { height })
    }
}

/// Median timestamp of `block` and up to ten of its predecessors.
///
/// Fewer blocks are used only near genesis; a gap in the store is an error.
pub fn median_time_past<S: AncestorSource + ?Sized>(source: &S, block: &StoredBlock) -> Result<i64, StoreError> {
    let mut times = Vec::with_capacity(MEDIAN_TIME_SPAN as usize);
    times.push(block.time());

    let mut height = block.height;
    while times.len() < MEDIAN_TIME_SPAN as usize && height > 0 {
        height -= 1;
        times.push(source.ancestor(height)?.time());
    }

    times.sort_unstable();
    Ok(times[times.len() / 2])
}

#[cfg(test)]
mod tests {
    use super::*;

    const GENESIS_HEADER: &str = "0100000000000000000000000000000000000000000000000000000000000000000000003ba3edfd7a7b12b27ac72c3e67768f617fc81bc3888a51323a9fb8aa4b1e5e4a29ab5f49ffff001d1dac2b7c";

    fn header_at(timestamp: u32) -> BlockHeader {
        BlockHeader {
            version: 0x2000_0000,
            prev_block_hash: [0u8; 32],
            merkle_root: [0x34u8; 32],
            timestamp,
            bits: 0x1d00ffff,
            nonce: 0,
        }
    }

    #[test]
    fn test_genesis_header() {
        let bytes: [u8; 80] = hex::decode(GENESIS_HEADER).unwrap().try_into().unwrap();
        let header = BlockHeader::deserialize(&bytes);

        assert_eq!(header.version, 1);
        assert_eq!(header.timestamp, 1231006505);
        assert_eq!(header.bits, 0x1d00ffff);
        assert_eq!(header.nonce, 2083236893);
        assert_eq!(header.serialize(), bytes);
        assert_eq!(header.hash_hex(), "000000000019d6689c085ae165831e934ff763ae46a2a6c172b3f1b60a8ce26f");
    }

    #[test]
    fn test_header_serialization_layout() {
        let mut header = header_at(1_700_000_000);
        header.nonce = 0xDEADBEEF;
        let serialized = header.serialize();

        assert_eq!(&serialized[0..4], &[0x00, 0x00, 0x00, 0x20]);
        assert_eq!(&serialized[36..68], &[0x34u8; 32][..]);
        assert_eq!(&serialized[76..80], &[0xEF, 0xBE, 0xAD, 0xDE]);
    }

    #[test]
    fn test_memory_chain_links_and_lookup() {
        let mut chain = MemoryChain::new(100);
        let first = chain.push(header_at(1000));
        let second = chain.push(header_at(1600));

        assert_eq!(first.height, 100);
        assert_eq!(second.height, 101);
        assert_eq!(second.header.prev_block_hash, first.header.hash());
        assert_eq!(chain.ancestor(101).unwrap(), second);
        assert_eq!(chain.ancestor(99), Err(StoreError::NotFound { height: 99 }));
        assert_eq!(chain.ancestor(102), Err(StoreError::NotFound { height: 102 }));
        assert_eq!(chain.tip(), Some(&second));
    }

    #[test]
    fn test_median_time_past() {
        let mut chain = MemoryChain::new(0);
        // Out-of-order timestamps: the median is taken after sorting.
        let times = [10, 50, 20, 40, 30, 60, 90, 70, 80, 100, 110, 5];
        for t in times {
            chain.push(header_at(t));
        }

        // Genesis alone.
        let genesis = chain.ancestor(0).unwrap();
        assert_eq!(median_time_past(&chain, &genesis).unwrap(), 10);

        // Heights 0..=10 hold 10..=110 in some order; the median is 60.
        let tenth = chain.ancestor(10).unwrap();
        assert_eq!(median_time_past(&chain, &tenth).unwrap(), 60);

        // Heights 1..=11 replace 10 with 5; sorted middle is still 60.
        let tip = *chain.tip().unwrap();
        assert_eq!(median_time_past(&chain, &tip).unwrap(), 60);
    }

    #[test]
    fn test_median_time_past_needs_history() {
        let mut chain = MemoryChain::new(50);
        let block = chain.push(header_at(1000));
        assert_eq!(median_time_past(&chain, &block), Err(StoreError::NotFound { height: 49 }));
    }
}

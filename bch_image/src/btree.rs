//! B-tree node loading and the per-node bset list.

use crate::bkey::{BkeyFormat, KeyTuple};
use crate::byteview::pack_extract;
use crate::error::{BchError, Result};

const CSUM_SIZE: usize = 16;
const NODE_HEADER_FIXED: usize = 16 /* csum */ + 8 /* magic */ + 8 /* flags */ + 20 /* min_key */ + 20 /* max_key */ + 8 /* _ptr */;
const MIN_KEY_OFF: usize = 16 + 8 + 8;
const MAX_KEY_OFF: usize = MIN_KEY_OFF + 20;
const FORMAT_OFF: usize = NODE_HEADER_FIXED;
const FIRST_BSET_OFF: usize = FORMAT_OFF + BkeyFormat::SIZE;

const BSET_HEADER_SIZE: usize = 8 /* seq */ + 8 /* journal_seq */ + 4 /* flags */ + 2 /* version */ + 2 /* u64s */;
const BSET_U64S_OFF_IN_HEADER: usize = 22;

/// One ordered run of keys within a loaded node buffer.
#[derive(Debug, Clone, Copy)]
pub struct Bset {
    /// Absolute offset of the bset header (`seq` field).
    pub header_start: usize,
    /// Absolute offset of the first key (`start[]`).
    pub keys_start: usize,
    /// Absolute offset one past the last key byte (`keys_start + u64s*8`).
    pub keys_end: usize,
}

/// A fully-buffered b-tree node: owned bytes plus its parsed format
/// descriptor and the list of bsets found within it, oldest first.
pub struct BtreeNode {
    pub buf: Vec<u8>,
    pub format: BkeyFormat,
    pub min_key: KeyTuple,
    pub max_key: KeyTuple,
    /// Oldest-to-newest; the last entry is the newest bset.
    pub bsets: Vec<Bset>,
    /// Absolute byte offset this node was read from, for projecting
    /// value-relative offsets (e.g. inline_data) back into image space.
    pub node_offset: u64,
}

pub(crate) fn parse_bpos(buf: &[u8], off: usize) -> Result<KeyTuple> {
    let snapshot = pack_extract(buf, off, 32)? as u32;
    let offset = pack_extract(buf, off + 4, 64)?;
    let inode = pack_extract(buf, off + 12, 64)?;
    Ok(KeyTuple { inode, offset, snapshot, size: 0, version_hi: 0, version_lo: 0 })
}

impl BtreeNode {
    /// Parse a node out of an owned, block-size-padded buffer.
    pub fn parse(buf: Vec<u8>, block_size: usize) -> Result<BtreeNode> {
        if buf.len() < FIRST_BSET_OFF + BSET_HEADER_SIZE {
            return Err(BchError::TruncatedNode);
        }
        let min_key = parse_bpos(&buf, MIN_KEY_OFF)?;
        let max_key = parse_bpos(&buf, MAX_KEY_OFF)?;
        let format = BkeyFormat::parse(&buf, FORMAT_OFF)?;

        let mut bsets = Vec::new();
        let mut header_start = FIRST_BSET_OFF;
        loop {
            if header_start + BSET_HEADER_SIZE > buf.len() {
                break;
            }
            let u64s = pack_extract(&buf, header_start + BSET_U64S_OFF_IN_HEADER, 16)? as usize;
            let keys_start = header_start + BSET_HEADER_SIZE;
            let keys_end = keys_start + u64s * 8;
            if keys_end > buf.len() {
                break;
            }
            if u64s != 0 {
                bsets.push(Bset { header_start, keys_start, keys_end });
            }

            // Round up to the next block_size boundary, then skip one checksum.
            let round_target = {
                let rem = keys_end % block_size;
                if rem == 0 { keys_end } else { keys_end + (block_size - rem) }
            };
            let next_header = round_target + CSUM_SIZE;
            if next_header <= header_start || next_header >= buf.len() {
                break;
            }
            header_start = next_header;
            if u64s == 0 {
                // An empty bset terminates the node; don't keep scanning past it.
                break;
            }
        }

        Ok(BtreeNode { buf, format, min_key, max_key, bsets, node_offset: 0 })
    }
}

/// Read a node's bytes out of a fully-buffered image at `node_offset`,
/// copying `sectors_written*512` bytes and zero-padding the remainder of
/// `node_size`.
pub fn read_node(
    image: &[u8],
    node_offset: u64,
    sectors_written: u16,
    node_size: usize,
    block_size: usize,
) -> Result<BtreeNode> {
    let start = node_offset as usize;
    let written = sectors_written as usize * 512;
    let end = start.checked_add(written).ok_or(BchError::TruncatedNode)?;
    if end > image.len() {
        return Err(BchError::TruncatedNode);
    }
    let mut buf = vec![0u8; node_size.max(written)];
    buf[..written].copy_from_slice(&image[start..end]);
    let mut node = BtreeNode::parse(buf, block_size)?;
    node.node_offset = node_offset;
    Ok(node)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_node(block_size: usize, key_bytes: &[u8]) -> Vec<u8> {
        let mut buf = vec![0u8; FIRST_BSET_OFF + BSET_HEADER_SIZE + key_bytes.len()];
        // format: key_u64s=3, bits_per_field = {64,64,32,0,0,0}
        buf[FORMAT_OFF] = 3;
        buf[FORMAT_OFF + 1] = 6;
        buf[FORMAT_OFF + 2] = 64;
        buf[FORMAT_OFF + 3] = 64;
        buf[FORMAT_OFF + 4] = 32;
        let u64s = (key_bytes.len() / 8) as u16;
        buf[FIRST_BSET_OFF + BSET_U64S_OFF_IN_HEADER..FIRST_BSET_OFF + BSET_U64S_OFF_IN_HEADER + 2]
            .copy_from_slice(&u64s.to_le_bytes());
        buf[FIRST_BSET_OFF + BSET_HEADER_SIZE..].copy_from_slice(key_bytes);
        let total = buf.len();
        if total % block_size != 0 {
            buf.resize(total + (block_size - total % block_size), 0);
        }
        buf
    }

    #[test]
    fn finds_single_bset() {
        let key = current_key_bytes(5, 8, 4096, 0);
        let buf = build_node(512, &key);
        let node = BtreeNode::parse(buf, 512).unwrap();
        assert_eq!(node.bsets.len(), 1);
        assert_eq!(node.bsets[0].keys_start, FIRST_BSET_OFF + BSET_HEADER_SIZE);
    }

    fn current_key_bytes(u64s: u8, key_type: u8, inode: u64, offset: u64) -> Vec<u8> {
        let mut buf = vec![0u8; (u64s as usize) * 8];
        buf[0] = u64s;
        buf[1] = 1; // KEY_FORMAT_CURRENT
        buf[2] = key_type;
        buf[24..32].copy_from_slice(&offset.to_le_bytes());
        buf[32..40].copy_from_slice(&inode.to_le_bytes());
        buf
    }
}

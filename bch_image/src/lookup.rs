//! Directed point lookup (§4.11): descend from a tree root to the single
//! key matching a reference tuple, using child `min_key` to decide whether
//! to recurse.

use crate::bkey::{parse_bkey, KeyTuple, KEY_TYPE_BTREE_PTR_V2, KEY_TYPE_DELETED, KEY_TYPE_HASH_WHITEOUT};
use crate::btree::{read_node, BtreeNode};
use crate::error::Result;
use crate::merge::{btree_ptr_target, DecodedKey, Frame};

/// Descend from `root` to the live key whose `start_of_range()` tuple
/// equals `target`, or `None` if no such key exists.
pub fn find(image: &[u8], block_size: usize, node_size: usize, root: BtreeNode, target: KeyTuple) -> Result<Option<DecodedKey>> {
    let mut frame = Frame::new(root);
    loop {
        let pos = match frame.pick_next()? {
            Some(p) => p,
            None => return Ok(None),
        };
        let key = parse_bkey(&frame.node.buf, pos, &frame.node.format)?;
        if key.key_type == KEY_TYPE_DELETED || key.key_type == KEY_TYPE_HASH_WHITEOUT {
            continue;
        }
        let k = key.tuple.start_of_range();
        if k < target {
            continue;
        }

        if key.key_type == KEY_TYPE_BTREE_PTR_V2 {
            let child_ptr = match btree_ptr_target(&frame.node.buf, pos, &frame.node.format)? {
                Some(c) => c,
                None => continue,
            };
            // Some images store `min_key.offset` one past the true
            // minimum; the source decrements it when nonzero (spec §9).
            let mut min = KeyTuple::pos(child_ptr.min_key.inode, child_ptr.min_key.offset);
            if min.offset != 0 {
                min.offset -= 1;
            }
            if min <= target {
                let child = read_node(image, child_ptr.node_offset, child_ptr.sectors_written, node_size, block_size)?;
                if let Some(found) = find(image, block_size, node_size, child, target)? {
                    return Ok(Some(found));
                }
                continue;
            }
            continue;
        }

        if k == target {
            let value = frame.node.buf[key.value_start..key.value_end].to_vec();
            let value_image_offset = frame.node.node_offset + key.value_start as u64;
            return Ok(Some(DecodedKey { tuple: key.tuple, key_type: key.key_type, value, value_image_offset }));
        }
        if k > target {
            return Ok(None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bkey::BkeyFormat;

    const FIRST_BSET_OFF: usize = 16 + 8 + 8 + 20 + 20 + 8 + BkeyFormat::SIZE;
    const BSET_HEADER_SIZE: usize = 8 + 8 + 4 + 2 + 2;
    const BSET_U64S_OFF_IN_HEADER: usize = 22;
    const FORMAT_OFF: usize = 16 + 8 + 8 + 20 + 20 + 8;

    fn current_key_bytes(u64s: u8, key_type: u8, inode: u64, offset: u64) -> Vec<u8> {
        let mut buf = vec![0u8; (u64s as usize) * 8];
        buf[0] = u64s;
        buf[1] = 1; // KEY_FORMAT_CURRENT
        buf[2] = key_type;
        buf[24..32].copy_from_slice(&offset.to_le_bytes());
        buf[32..40].copy_from_slice(&inode.to_le_bytes());
        buf
    }

    fn build_single_bset_node(block_size: usize, key_bytes: &[u8]) -> BtreeNode {
        let mut buf = vec![0u8; FIRST_BSET_OFF + BSET_HEADER_SIZE + key_bytes.len()];
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
        BtreeNode::parse(buf, block_size).unwrap()
    }

    #[test]
    fn finds_exact_match_in_leaf_node() {
        use crate::bkey::KEY_TYPE_INODE;
        let mut keys = Vec::new();
        keys.extend(current_key_bytes(5, KEY_TYPE_INODE, 4096, 0));
        keys.extend(current_key_bytes(5, KEY_TYPE_INODE, 4200, 0));
        let node = build_single_bset_node(512, &keys);

        let found = find(&[], 512, 512, node, KeyTuple::pos(4200, 0)).unwrap().unwrap();
        assert_eq!(found.tuple.inode, 4200);
    }

    #[test]
    fn miss_returns_none() {
        use crate::bkey::KEY_TYPE_INODE;
        let keys = current_key_bytes(5, KEY_TYPE_INODE, 4096, 0);
        let node = build_single_bset_node(512, &keys);
        let found = find(&[], 512, 512, node, KeyTuple::pos(9999, 0)).unwrap();
        assert!(found.is_none());
    }
}

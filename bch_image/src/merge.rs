//! Newest-wins bset merge, recursing through interior `btree_ptr_v2`
//! pointers so callers see one flat, strictly-increasing key stream per
//! tree.

use crate::bkey::{parse_bkey, KeyTuple, KEY_TYPE_BTREE_PTR_V2, KEY_TYPE_DELETED, KEY_TYPE_HASH_WHITEOUT};
use crate::bkey::BkeyFormat;
use crate::btree::{parse_bpos, read_node, BtreeNode};
use crate::byteview::{flag_bits, pack_extract};
use crate::error::Result;
use crate::walk::{next_sibling, U64sSpec};

/// One live key, with its value bytes copied out of the node buffer it
/// was found in.
#[derive(Debug, Clone)]
pub struct DecodedKey {
    pub tuple: KeyTuple,
    pub key_type: u8,
    pub value: Vec<u8>,
    /// Absolute image byte offset of `value[0]`, for kinds (`inline_data`)
    /// whose decoded record needs the value's own address rather than a
    /// pointed-to one.
    pub value_image_offset: u64,
}

/// The child a `btree_ptr_v2` key points at: where to read it from, how
/// much of it is written, and the minimum key it declares for itself.
pub(crate) struct BtreePtrChild {
    pub node_offset: u64,
    pub sectors_written: u16,
    pub min_key: KeyTuple,
}

pub(crate) struct Frame {
    pub(crate) node: BtreeNode,
    cursors: Vec<Option<usize>>,
    last: Option<KeyTuple>,
}

impl Frame {
    pub(crate) fn new(node: BtreeNode) -> Frame {
        let cursors = node
            .bsets
            .iter()
            .map(|b| if b.keys_start < b.keys_end { Some(b.keys_start) } else { None })
            .collect();
        Frame { node, cursors, last: None }
    }

    /// Advance past any key `<= last` and return the newest-wins minimum
    /// candidate's byte offset, or `None` when the node is exhausted.
    pub(crate) fn pick_next(&mut self) -> Result<Option<usize>> {
        let n = self.node.bsets.len();
        let mut best: Option<(usize, KeyTuple)> = None;
        for i in (0..n).rev() {
            loop {
                let pos = match self.cursors[i] {
                    Some(p) => p,
                    None => break,
                };
                let k = parse_bkey(&self.node.buf, pos, &self.node.format)?;
                if let Some(last) = self.last {
                    if k.tuple <= last {
                        self.cursors[i] = self.advance(i, pos)?;
                        continue;
                    }
                }
                match &best {
                    None => best = Some((i, k.tuple)),
                    Some((_, bt)) => {
                        if k.tuple < *bt {
                            best = Some((i, k.tuple));
                        }
                    }
                }
                break;
            }
        }
        let (bi, tuple) = match best {
            None => return Ok(None),
            Some(x) => x,
        };
        let pos = self.cursors[bi].unwrap();
        self.cursors[bi] = self.advance(bi, pos)?;
        self.last = Some(tuple);
        Ok(Some(pos))
    }

    fn advance(&self, bset_idx: usize, pos: usize) -> Result<Option<usize>> {
        let end = self.node.bsets[bset_idx].keys_end;
        Ok(next_sibling(&self.node.buf, 0, 0, end, Some(pos), U64sSpec::BKEY))
    }
}

/// Decode a `btree_ptr_v2` key's value: its declared `min_key` plus the
/// first replica pointer whose `unused` bit is clear.
pub(crate) fn btree_ptr_target(buf: &[u8], key_start: usize, format: &BkeyFormat) -> Result<Option<BtreePtrChild>> {
    let key = parse_bkey(buf, key_start, format)?;
    let v = key.value_start;
    if v + 20 > key.value_end {
        return Ok(None);
    }
    let sectors_written = pack_extract(buf, v + 16, 16)? as u16;
    let min_key_off = v + 20;
    let min_key = parse_bpos(buf, min_key_off)?;
    let ptrs_start = min_key_off + 20;
    let mut p = ptrs_start;
    while p + 8 <= key.value_end {
        let raw = pack_extract(buf, p, 64)?;
        let unused = (raw >> 2) & 1;
        if unused == 0 {
            let node_offset = flag_bits(raw, 4, 48) * 512;
            return Ok(Some(BtreePtrChild { node_offset, sectors_written, min_key }));
        }
        p += 8;
    }
    Ok(None)
}

/// Merges every bset of every node reachable from a tree root into one
/// ordered stream, transparently descending `btree_ptr_v2` pointers.
pub struct MergeIter<'a> {
    image: &'a [u8],
    block_size: usize,
    node_size: usize,
    stack: Vec<Frame>,
}

impl<'a> MergeIter<'a> {
    pub fn new(image: &'a [u8], block_size: usize, node_size: usize, root: BtreeNode) -> MergeIter<'a> {
        MergeIter { image, block_size, node_size, stack: vec![Frame::new(root)] }
    }
}

impl<'a> Iterator for MergeIter<'a> {
    type Item = Result<DecodedKey>;

    /// On any decode error, drops the descent stack so every later call
    /// returns `None` instead of retrying the same faulty position.
    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let frame = self.stack.last_mut()?;
            let pos = match frame.pick_next() {
                Ok(Some(p)) => p,
                Ok(None) => {
                    self.stack.pop();
                    continue;
                }
                Err(e) => {
                    self.stack.clear();
                    return Some(Err(e));
                }
            };

            let frame = self.stack.last().unwrap();
            let key = match parse_bkey(&frame.node.buf, pos, &frame.node.format) {
                Ok(k) => k,
                Err(e) => {
                    self.stack.clear();
                    return Some(Err(e));
                }
            };

            if key.key_type == KEY_TYPE_BTREE_PTR_V2 {
                let target = match btree_ptr_target(&frame.node.buf, pos, &frame.node.format) {
                    Ok(t) => t,
                    Err(e) => {
                        self.stack.clear();
                        return Some(Err(e));
                    }
                };
                let child_ptr = match target {
                    Some(t) => t,
                    None => continue,
                };
                let child = match read_node(
                    self.image,
                    child_ptr.node_offset,
                    child_ptr.sectors_written,
                    self.node_size,
                    self.block_size,
                ) {
                    Ok(n) => n,
                    Err(e) => {
                        self.stack.clear();
                        return Some(Err(e));
                    }
                };
                self.stack.push(Frame::new(child));
                continue;
            }

            if key.key_type == KEY_TYPE_DELETED || key.key_type == KEY_TYPE_HASH_WHITEOUT {
                continue;
            }

            let value = frame.node.buf[key.value_start..key.value_end].to_vec();
            let value_image_offset = frame.node.node_offset + key.value_start as u64;
            return Some(Ok(DecodedKey { tuple: key.tuple, key_type: key.key_type, value, value_image_offset }));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bkey::KEY_TYPE_INODE;

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
    fn merges_single_node_in_order() {
        let mut keys = Vec::new();
        keys.extend(current_key_bytes(5, KEY_TYPE_INODE, 4200, 0));
        keys.extend(current_key_bytes(5, KEY_TYPE_INODE, 4096, 0));
        let node = build_single_bset_node(512, &keys);
        let iter = MergeIter::new(&[], 512, 512, node);
        let tuples: Vec<u64> = iter.map(|k| k.unwrap().tuple.inode).collect();
        assert_eq!(tuples, vec![4096, 4200]);
    }

    #[test]
    fn decode_error_fuses_the_iterator() {
        let mut key = current_key_bytes(5, KEY_TYPE_INODE, 4096, 0);
        key[1] = 2; // neither packed (0) nor current (1): BadBkeyFormat
        let node = build_single_bset_node(512, &key);
        let mut iter = MergeIter::new(&[], 512, 512, node);
        assert!(iter.next().unwrap().is_err());
        assert!(iter.next().is_none());
    }
}

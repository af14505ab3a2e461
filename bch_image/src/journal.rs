//! Jset entries inside the superblock's `clean` field, and extraction of
//! b-tree root pointers from them.

use crate::bkey::{parse_bkey, BkeyFormat, KeyTuple};
use crate::byteview::pack_extract;
use crate::error::{BchError, Result};
use crate::walk::{next_sibling, U64sSpec};

const CLEAN_HEADER_SIZE: usize = 4 /* flags */ + 2 /* read_clock */ + 2 /* write_clock */ + 8 /* journal_seq */;
const JSET_ENTRY_HEADER: usize = 8;

const JSET_ENTRY_BTREE_ROOT: u8 = 1;

pub struct JsetEntry<'a> {
    pub btree_id: u8,
    pub entry_type: u8,
    pub payload: &'a [u8],
    pub payload_start: usize,
}

pub struct JsetEntryIter<'a> {
    buf: &'a [u8],
    parent: usize,
    parent_end: usize,
    current: Option<usize>,
}

pub fn jset_entries(buf: &[u8], clean_field_start: usize, clean_field_end: usize) -> JsetEntryIter<'_> {
    JsetEntryIter { buf, parent: clean_field_start, parent_end: clean_field_end, current: None }
}

impl<'a> Iterator for JsetEntryIter<'a> {
    type Item = Result<JsetEntry<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        let next = next_sibling(
            self.buf,
            self.parent,
            CLEAN_HEADER_SIZE,
            self.parent_end,
            self.current,
            U64sSpec::JSET_ENTRY,
        )?;
        self.current = Some(next);

        let u64s = match pack_extract(self.buf, next, 16) {
            Ok(v) => v,
            Err(e) => return Some(Err(e)),
        };
        let btree_id = self.buf.get(next + 2).copied().unwrap_or(0);
        let entry_type = self.buf.get(next + 4).copied().unwrap_or(0);
        let payload_start = next + JSET_ENTRY_HEADER;
        let payload_end = next + (1 + u64s as usize) * 8;
        if payload_end > self.buf.len() || payload_start > payload_end {
            return Some(Err(BchError::TruncatedNode));
        }
        Some(Ok(JsetEntry {
            btree_id,
            entry_type,
            payload: &self.buf[payload_start..payload_end],
            payload_start,
        }))
    }
}

/// A decoded root pointer: the tree it belongs to, where to read the root
/// node from, and the child's declared minimum key.
pub struct RootPtr {
    pub btree_id: u8,
    /// Absolute byte offset of the root node within the image.
    pub node_offset: u64,
    pub sectors_written: u16,
    pub min_key: KeyTuple,
}

const BCH_SECTOR_SIZE: u64 = 512;

/// Scan the `clean` field's jset entries for the root pointer of every
/// known tree (extents/inodes/dirents), returning whichever are present.
pub fn find_roots(image: &[u8], clean_payload: &[u8], clean_payload_abs_start: usize) -> Result<Vec<RootPtr>> {
    let mut roots = Vec::new();
    let end = clean_payload_abs_start + clean_payload.len();
    for entry in jset_entries(image, clean_payload_abs_start, end) {
        let entry = entry?;
        if entry.entry_type != JSET_ENTRY_BTREE_ROOT {
            continue;
        }
        if let Some(root) = decode_root_key(image, entry.payload_start, entry.btree_id)? {
            roots.push(root);
        }
    }
    Ok(roots)
}

/// The root jset entry's payload starts with one self-describing
/// ("current" format) bkey whose value is a `btree_ptr_v2`: `mem_ptr:u64,
/// seq:u64, sectors_written:u16, flags:u16, min_key:bpos,
/// start[bch_extent_ptr]`. Take the first extent pointer with its
/// `unused` bit clear.
fn decode_root_key(image: &[u8], key_start: usize, btree_id: u8) -> Result<Option<RootPtr>> {
    // Root keys are always self-describing; an empty format suffices
    // since parse_bkey only consults it for packed (format==0) keys.
    let dummy_format = BkeyFormat { key_u64s: 0, bits_per_field: [0; 6], field_offset: [0; 6] };
    let key = parse_bkey(image, key_start, &dummy_format)?;

    let v = key.value_start;
    if v + 20 > key.value_end {
        return Ok(None);
    }
    let sectors_written = pack_extract(image, v + 16, 16)? as u16;
    let min_key_off = v + 20;
    let snapshot = pack_extract(image, min_key_off, 32)? as u32;
    let offset = pack_extract(image, min_key_off + 4, 64)?;
    let inode = pack_extract(image, min_key_off + 12, 64)?;
    let min_key = KeyTuple { inode, offset, snapshot, size: 0, version_hi: 0, version_lo: 0 };

    let ptrs_start = min_key_off + 20;
    let mut p = ptrs_start;
    while p + 8 <= key.value_end {
        let raw = pack_extract(image, p, 64)?;
        let unused = (raw >> 2) & 1;
        if unused == 0 {
            let sector_offset = crate::byteview::flag_bits(raw, 4, 48);
            return Ok(Some(RootPtr {
                btree_id,
                node_offset: sector_offset * BCH_SECTOR_SIZE,
                sectors_written,
                min_key,
            }));
        }
        p += 8;
    }
    Ok(None)
}

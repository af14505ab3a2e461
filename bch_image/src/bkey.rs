//! Polymorphic b-key decoding: bit-packed (node-local) and
//! self-describing ("current") key layouts both collapse to one
//! canonical tuple.

use crate::byteview::pack_extract;
use crate::error::{BchError, Result};

pub const KEY_TYPE_DELETED: u8 = 0;
pub const KEY_TYPE_DISCARD: u8 = 1;
pub const KEY_TYPE_HASH_WHITEOUT: u8 = 4;
pub const KEY_TYPE_BTREE_PTR: u8 = 5;
pub const KEY_TYPE_EXTENT: u8 = 6;
pub const KEY_TYPE_INODE: u8 = 8;
pub const KEY_TYPE_DIRENT: u8 = 10;
pub const KEY_TYPE_INLINE_DATA: u8 = 17;
pub const KEY_TYPE_BTREE_PTR_V2: u8 = 18;

const KEY_FORMAT_LOCAL_BTREE: u8 = 0;
const KEY_FORMAT_CURRENT: u8 = 1;

/// Canonical key size (in u64 units) of the self-describing "current" layout.
pub const BKEY_CURRENT_U64S: u64 = 5;

const BKEY_NR_FIELDS: usize = 6;
const FIELD_INODE: usize = 0;
const FIELD_OFFSET: usize = 1;
const FIELD_SNAPSHOT: usize = 2;
const FIELD_SIZE: usize = 3;
const FIELD_VERSION_HI: usize = 4;
const FIELD_VERSION_LO: usize = 5;

/// A node-local packed-key layout descriptor (`struct bkey_format`).
#[derive(Debug, Clone, Copy)]
pub struct BkeyFormat {
    pub key_u64s: u8,
    pub bits_per_field: [u8; BKEY_NR_FIELDS],
    pub field_offset: [u64; BKEY_NR_FIELDS],
}

impl BkeyFormat {
    /// Parse a `bkey_format` record: `key_u64s:u8, nr_fields:u8,
    /// bits_per_field[6]:u8, field_offset[6]:u64`.
    pub fn parse(buf: &[u8], off: usize) -> Result<BkeyFormat> {
        if buf.len() < off + 2 + 6 + 48 {
            return Err(BchError::TruncatedNode);
        }
        let key_u64s = buf[off];
        let mut bits_per_field = [0u8; BKEY_NR_FIELDS];
        bits_per_field.copy_from_slice(&buf[off + 2..off + 2 + 6]);
        let mut field_offset = [0u64; BKEY_NR_FIELDS];
        for i in 0..BKEY_NR_FIELDS {
            let o = off + 8 + i * 8;
            field_offset[i] = pack_extract(buf, o, 64)?;
        }
        Ok(BkeyFormat { key_u64s, bits_per_field, field_offset })
    }

    /// Total on-disk size of this descriptor in bytes.
    pub const SIZE: usize = 2 + 6 + 48;
}

/// The canonical six-field key tuple, totally ordered lexicographically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct KeyTuple {
    pub inode: u64,
    pub offset: u64,
    pub snapshot: u32,
    pub size: u32,
    pub version_hi: u32,
    pub version_lo: u64,
}

impl KeyTuple {
    pub fn start_of_range(&self) -> KeyTuple {
        KeyTuple {
            inode: self.inode,
            offset: self.offset.wrapping_sub(self.size as u64),
            snapshot: 0,
            size: 0,
            version_hi: 0,
            version_lo: 0,
        }
    }

    /// A bare `(inode, offset)` tuple for point-lookup comparisons, with
    /// the remaining fields zeroed.
    pub fn pos(inode: u64, offset: u64) -> KeyTuple {
        KeyTuple { inode, offset, snapshot: 0, size: 0, version_hi: 0, version_lo: 0 }
    }
}

/// A decoded b-key: its tuple, type, `needs_whiteout` flag, and the
/// absolute byte range of its inline value.
#[derive(Debug, Clone, Copy)]
pub struct Bkey {
    pub tuple: KeyTuple,
    pub key_type: u8,
    pub needs_whiteout: bool,
    /// Absolute offset of this key's header (`key`), for relative math.
    pub key_start: usize,
    /// Absolute offset of this key's value area.
    pub value_start: usize,
    /// Absolute offset one past this key's value area (== one past the
    /// whole key+value record).
    pub value_end: usize,
}

/// Decode the b-key at absolute offset `key_start` in `buf`, using
/// `format` for packed (format==0) keys.
pub fn parse_bkey(buf: &[u8], key_start: usize, format: &BkeyFormat) -> Result<Bkey> {
    if key_start + 3 > buf.len() {
        return Err(BchError::TruncatedNode);
    }
    let u64s = buf[key_start] as u64;
    let format_byte = buf[key_start + 1];
    let key_type = buf[key_start + 2];
    let key_format = format_byte & 0x7F;
    let needs_whiteout = (format_byte & 0x80) != 0;

    let value_end = key_start
        .checked_add((u64s as usize) * 8)
        .ok_or(BchError::TruncatedNode)?;
    if value_end > buf.len() {
        return Err(BchError::TruncatedNode);
    }

    match key_format {
        KEY_FORMAT_CURRENT => {
            let value_start = key_start + (BKEY_CURRENT_U64S as usize) * 8;
            if value_start > value_end {
                return Err(BchError::TruncatedNode);
            }
            let version_hi = pack_extract(buf, key_start + 4, 32)? as u32;
            let version_lo = pack_extract(buf, key_start + 8, 64)?;
            let size = pack_extract(buf, key_start + 16, 32)? as u32;
            let snapshot = pack_extract(buf, key_start + 20, 32)? as u32;
            let offset = pack_extract(buf, key_start + 24, 64)?;
            let inode = pack_extract(buf, key_start + 32, 64)?;
            Ok(Bkey {
                tuple: KeyTuple { inode, offset, snapshot, size, version_hi, version_lo },
                key_type,
                needs_whiteout,
                key_start,
                value_start,
                value_end,
            })
        }
        KEY_FORMAT_LOCAL_BTREE => {
            let key_area_end = key_start + (format.key_u64s as usize) * 8;
            if key_area_end > buf.len() || key_area_end < key_start + 3 {
                return Err(BchError::TruncatedNode);
            }
            let mut p = key_area_end;
            let mut fields = [0u64; BKEY_NR_FIELDS];
            for i in 0..BKEY_NR_FIELDS {
                let width_bytes = (format.bits_per_field[i] / 8) as usize;
                p = p.checked_sub(width_bytes).ok_or(BchError::TruncatedNode)?;
                if p < key_start {
                    return Err(BchError::TruncatedNode);
                }
                let width_bits = format.bits_per_field[i] as u32;
                let raw = if width_bits == 0 { 0 } else { pack_extract(buf, p, width_bits)? };
                fields[i] = format.field_offset[i].wrapping_add(raw);
            }
            Ok(Bkey {
                tuple: KeyTuple {
                    inode: fields[FIELD_INODE],
                    offset: fields[FIELD_OFFSET],
                    snapshot: fields[FIELD_SNAPSHOT] as u32,
                    size: fields[FIELD_SIZE] as u32,
                    version_hi: fields[FIELD_VERSION_HI] as u32,
                    version_lo: fields[FIELD_VERSION_LO],
                },
                key_type,
                needs_whiteout,
                key_start,
                value_start: key_area_end,
                value_end,
            })
        }
        other => Err(BchError::BadBkeyFormat(other)),
    }
}

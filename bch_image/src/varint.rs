//! Decode the size field out of a packed inode's variable-length fields
//! area, bit-exact to the v2 ("new_varint") inode field encoding.

use crate::byteview::pack_extract;
use crate::error::{BchError, Result};

const BCH_INODE_FLAG_NEW_VARINT: u32 = 1 << 31;

/// Length-dependent right-shift applied to the trailing 8-byte word that
/// holds a varint's value, indexed by `len - 1`.
const SHIFT_TABLE: [u32; 9] = [57, 50, 43, 36, 29, 22, 15, 8, 0];

fn ctz64(x: u64) -> u32 {
    if x == 0 {
        64
    } else {
        x.trailing_zeros()
    }
}

/// Byte length of the varint whose first byte is `first_byte`.
fn varint_len(first_byte: u8) -> usize {
    (ctz64((first_byte as u64) | 0x100) + 1) as usize
}

/// Decode `bi_size` from an inode's `fields` byte range `[start, end)`,
/// given the inode's `bi_flags`.
pub fn unpack_inode_size(buf: &[u8], start: usize, end: usize, bi_flags: u32) -> Result<u64> {
    if bi_flags & BCH_INODE_FLAG_NEW_VARINT == 0 {
        return Err(BchError::UnsupportedInodeEncoding);
    }
    let nr_fields = (bi_flags >> 24) & 0x7F;
    if end < start || end - start < nr_fields as usize {
        return Err(BchError::TruncatedInode);
    }
    if nr_fields < 5 {
        return Ok(0);
    }

    let mut r = start;
    let mut len = 0usize;
    for _ in 0..9 {
        if r >= end {
            return Err(BchError::TruncatedInode);
        }
        let first_byte = buf[r];
        len = varint_len(first_byte);
        r += len;
        if r > end {
            return Err(BchError::TruncatedInode);
        }
    }

    if r < 8 {
        return Err(BchError::TruncatedInode);
    }
    let word = pack_extract(buf, r - 8, 64)?;
    let shift = SHIFT_TABLE[(len - 1).min(8)];
    Ok(word >> shift)
}

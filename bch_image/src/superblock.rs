//! Superblock load and its variable-length field list.

use crate::byteview::{flag_bits, pack_extract};
use crate::error::{BchError, Result};
use crate::walk::{next_sibling, U64sSpec};

/// Byte offset of the superblock within the image.
pub const SB_OFFSET: usize = 8 * 512;

/// `c68573f6-4e1a-45ca-8265-f57f48ba6d81`, little-endian on disk.
pub const BCACHEFS_MAGIC: [u8; 16] = [
    0xf6, 0x73, 0x85, 0xc6, 0x1a, 0x4e, 0xca, 0x45, 0x82, 0x65, 0xf5, 0x7f, 0x48, 0xba, 0x6d, 0x81,
];

const MAGIC_OFF: usize = 24;
const UUID_OFF: usize = 40;
const BLOCK_SIZE_OFF: usize = 120;
const SB_U64S_OFF: usize = 124;
const FLAGS_OFF: usize = 144;
const FIELDS_OFF: usize = 496;

pub const SB_FIELD_TYPE_CLEAN: u32 = 6;

/// Known b-tree ids (spec §6); others are ignored.
pub const BTREE_ID_EXTENTS: u8 = 0;
pub const BTREE_ID_INODES: u8 = 1;
pub const BTREE_ID_DIRENTS: u8 = 2;

pub struct Superblock {
    pub uuid: [u8; 16],
    pub block_size: usize,
    pub node_size: usize,
    /// Absolute byte offset (within the image) of the field list.
    pub fields_start: usize,
    /// Absolute byte offset one past the last valid byte of the superblock.
    pub end: usize,
}

impl Superblock {
    /// Parse the superblock out of a fully-buffered image.
    pub fn parse(image: &[u8]) -> Result<Superblock> {
        if image.len() < SB_OFFSET + FIELDS_OFF {
            return Err(BchError::BadSuperblock("image too small".into()));
        }
        let sb = &image[SB_OFFSET..];

        let magic = &sb[MAGIC_OFF..MAGIC_OFF + 16];
        if magic != BCACHEFS_MAGIC {
            return Err(BchError::BadSuperblock("magic mismatch".into()));
        }

        let mut uuid = [0u8; 16];
        uuid.copy_from_slice(&sb[UUID_OFF..UUID_OFF + 16]);

        let block_size_sectors = pack_extract(sb, BLOCK_SIZE_OFF, 16)?;
        let u64s = pack_extract(sb, SB_U64S_OFF, 32)?;
        let flags0 = pack_extract(sb, FLAGS_OFF, 64)?;
        let node_size_sectors = flag_bits(flags0, 12, 28);

        let fields_start = SB_OFFSET + FIELDS_OFF;
        let total = FIELDS_OFF as u64 + u64s * 8;
        let end = SB_OFFSET
            .checked_add(total as usize)
            .ok_or_else(|| BchError::BadSuperblock("u64s overflow".into()))?;
        if end > image.len() {
            return Err(BchError::BadSuperblock("truncated field list".into()));
        }

        Ok(Superblock {
            uuid,
            block_size: block_size_sectors as usize * 512,
            node_size: node_size_sectors as usize * 512,
            fields_start,
            end,
        })
    }

    /// Iterate the `(type, payload_start, payload_end)` of every sb-field.
    pub fn fields<'a>(&self, image: &'a [u8]) -> SbFieldIter<'a> {
        SbFieldIter {
            image,
            parent: self.fields_start,
            parent_end: self.end,
            current: None,
        }
    }

    /// Locate the `clean` field's payload and its absolute byte offset
    /// within `image`, or `NotClean` if absent.
    pub fn clean_field<'a>(&self, image: &'a [u8]) -> Result<(&'a [u8], usize)> {
        for field in self.fields(image) {
            let field = field?;
            if field.field_type == SB_FIELD_TYPE_CLEAN {
                return Ok((field.payload, field.payload_start));
            }
        }
        Err(BchError::NotClean)
    }
}

pub struct SbField<'a> {
    pub field_type: u32,
    pub payload: &'a [u8],
    pub payload_start: usize,
}

pub struct SbFieldIter<'a> {
    image: &'a [u8],
    parent: usize,
    parent_end: usize,
    current: Option<usize>,
}

const SB_FIELD_HEADER: usize = 8;

impl<'a> Iterator for SbFieldIter<'a> {
    type Item = Result<SbField<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        let next = next_sibling(
            self.image,
            self.parent,
            0,
            self.parent_end,
            self.current,
            U64sSpec::SB_FIELD,
        )?;
        self.current = Some(next);

        let u64s = match pack_extract(self.image, next, 32) {
            Ok(v) => v,
            Err(e) => return Some(Err(e)),
        };
        let field_type = match pack_extract(self.image, next + 4, 32) {
            Ok(v) => v as u32,
            Err(e) => return Some(Err(e)),
        };
        let payload_start = next + SB_FIELD_HEADER;
        let payload_end = next + (u64s as usize) * 8;
        if payload_end > self.image.len() || payload_start > payload_end {
            return Some(Err(BchError::TruncatedNode));
        }
        Some(Ok(SbField {
            field_type,
            payload: &self.image[payload_start..payload_end],
            payload_start,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_minimal_sb(node_size_sectors: u64, block_size_sectors: u16) -> Vec<u8> {
        let mut img = vec![0u8; SB_OFFSET + FIELDS_OFF];
        let sb = &mut img[SB_OFFSET..];
        sb[MAGIC_OFF..MAGIC_OFF + 16].copy_from_slice(&BCACHEFS_MAGIC);
        sb[BLOCK_SIZE_OFF..BLOCK_SIZE_OFF + 2].copy_from_slice(&block_size_sectors.to_le_bytes());
        sb[SB_U64S_OFF..SB_U64S_OFF + 4].copy_from_slice(&0u32.to_le_bytes());
        let flags0 = node_size_sectors << 12;
        sb[FLAGS_OFF..FLAGS_OFF + 8].copy_from_slice(&flags0.to_le_bytes());
        img
    }

    #[test]
    fn parses_valid_superblock() {
        let img = build_minimal_sb(16, 8);
        let sb = Superblock::parse(&img).unwrap();
        assert_eq!(sb.block_size, 8 * 512);
        assert_eq!(sb.node_size, 16 * 512);
    }

    #[test]
    fn rejects_bad_magic() {
        let mut img = build_minimal_sb(16, 8);
        img[SB_OFFSET + MAGIC_OFF] ^= 0xff;
        assert!(matches!(Superblock::parse(&img), Err(BchError::BadSuperblock(_))));
    }

    #[test]
    fn missing_clean_field_is_not_clean() {
        let img = build_minimal_sb(16, 8);
        let sb = Superblock::parse(&img).unwrap();
        assert!(matches!(sb.clean_field(&img), Err(BchError::NotClean)));
    }
}

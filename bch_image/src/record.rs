//! Projects a merged, live `DecodedKey` into one of the three public
//! record kinds (§4.9): `Extent`, `Inode`, `Dirent`.

use crate::bkey::{KEY_TYPE_DIRENT, KEY_TYPE_EXTENT, KEY_TYPE_INLINE_DATA, KEY_TYPE_INODE};
use crate::byteview::{flag_bits, pack_extract};
use crate::error::Result;
use crate::merge::DecodedKey;
use crate::varint::unpack_inode_size;

/// The well-known inode number the dirents tree is rooted at.
pub const ROOT_INODE: u64 = 4096;
/// `DT_DIR`, the type of the synthetic root dirent.
pub const ROOT_DIRENT_TYPE: u8 = 4;

const SECTOR: u64 = 512;

/// A decoded file extent: a logical byte range mapped onto a physical one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Extent {
    pub inode: u64,
    pub file_offset: u64,
    pub offset: u64,
    pub size: u64,
}

/// A decoded inode: its number, extracted size, and dirent hash seed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Inode {
    pub inode: u64,
    pub size: u64,
    pub hash_seed: u64,
}

/// A decoded directory entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dirent {
    pub parent_inode: u64,
    pub inode: u64,
    pub dtype: u8,
    pub name: Vec<u8>,
}

impl Dirent {
    /// The synthetic entry bcachefs does not actually store: the root
    /// directory pointing at itself.
    pub fn synthetic_root() -> Dirent {
        Dirent {
            parent_inode: ROOT_INODE,
            inode: ROOT_INODE,
            dtype: ROOT_DIRENT_TYPE,
            name: Vec::new(),
        }
    }

    pub fn name_str(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.name)
    }
}

/// Accept `extent`/`inline_data` keys only; every other key type yields
/// `None` rather than a zeroed record.
pub fn make_extent(key: &DecodedKey) -> Result<Option<Extent>> {
    match key.key_type {
        KEY_TYPE_EXTENT => {
            if key.value.len() < 8 {
                return Ok(None);
            }
            let ptr = pack_extract(&key.value, 0, 64)?;
            let sector = flag_bits(ptr, 4, 48);
            let size_sectors = key.tuple.size as u64;
            Ok(Some(Extent {
                inode: key.tuple.inode,
                file_offset: key.tuple.offset.wrapping_sub(size_sectors) * SECTOR,
                offset: sector * SECTOR,
                size: size_sectors * SECTOR,
            }))
        }
        KEY_TYPE_INLINE_DATA => {
            let size_sectors = key.tuple.size as u64;
            Ok(Some(Extent {
                inode: key.tuple.inode,
                file_offset: key.tuple.offset.wrapping_sub(size_sectors) * SECTOR,
                offset: key.value_image_offset,
                size: key.value.len() as u64,
            }))
        }
        _ => Ok(None),
    }
}

/// `bch_inode` value layout (current/v2): `bi_hash_seed:u64, bi_flags:u32,
/// bi_mode:u16, fields[]`.
const INODE_VALUE_HEADER: usize = 8 + 4 + 2;

/// Accept `inode` keys only.
pub fn make_inode(key: &DecodedKey) -> Result<Option<Inode>> {
    if key.key_type != KEY_TYPE_INODE {
        return Ok(None);
    }
    if key.value.len() < INODE_VALUE_HEADER {
        return Err(crate::error::BchError::TruncatedInode);
    }
    let hash_seed = pack_extract(&key.value, 0, 64)?;
    let bi_flags = pack_extract(&key.value, 8, 32)? as u32;
    let size = unpack_inode_size(&key.value, INODE_VALUE_HEADER, key.value.len(), bi_flags)?;
    Ok(Some(Inode { inode: key.tuple.offset, size, hash_seed }))
}

/// `bch_dirent` value layout: `d_inum:u64, d_type:u8, d_name[]`.
const DIRENT_VALUE_HEADER: usize = 8 + 1;

/// Accept `dirent` keys only.
pub fn make_dirent(key: &DecodedKey) -> Option<Dirent> {
    if key.key_type != KEY_TYPE_DIRENT {
        return None;
    }
    if key.value.len() < DIRENT_VALUE_HEADER {
        return None;
    }
    let inode = pack_extract(&key.value, 0, 64).ok()?;
    let dtype = key.value[8];
    let name_area = &key.value[DIRENT_VALUE_HEADER..];
    let name_len = name_area.iter().position(|&b| b == 0).unwrap_or(name_area.len());
    Some(Dirent {
        parent_inode: key.tuple.inode,
        inode,
        dtype,
        name: name_area[..name_len].to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bkey::{KeyTuple, KEY_TYPE_DELETED};

    fn key(key_type: u8, tuple: KeyTuple, value: Vec<u8>) -> DecodedKey {
        DecodedKey { tuple, key_type, value, value_image_offset: 0 }
    }

    #[test]
    fn extent_maker_rejects_other_kinds() {
        let k = key(KEY_TYPE_DELETED, KeyTuple::pos(1, 1), vec![]);
        assert_eq!(make_extent(&k).unwrap(), None);
    }

    #[test]
    fn extent_maker_decodes_offset_and_size() {
        let mut tuple = KeyTuple::pos(10, 100);
        tuple.size = 8; // 8 sectors = 4096 bytes
        let ptr_offset_sectors: u64 = 2000;
        let raw = ptr_offset_sectors << 4;
        let e = make_extent(&key(KEY_TYPE_EXTENT, tuple, raw.to_le_bytes().to_vec())).unwrap().unwrap();
        assert_eq!(e.inode, 10);
        assert_eq!(e.file_offset, (100 - 8) * 512);
        assert_eq!(e.offset, ptr_offset_sectors * 512);
        assert_eq!(e.size, 8 * 512);
    }

    #[test]
    fn inode_maker_rejects_missing_new_varint() {
        let tuple = KeyTuple::pos(0, ROOT_INODE);
        let mut value = vec![0u8; INODE_VALUE_HEADER];
        value[8..12].copy_from_slice(&(6u32 << 24).to_le_bytes());
        let err = make_inode(&key(KEY_TYPE_INODE, tuple, value)).unwrap_err();
        assert!(matches!(err, crate::error::BchError::UnsupportedInodeEncoding));
    }

    #[test]
    fn dirent_maker_reads_name_up_to_nul() {
        let tuple = KeyTuple::pos(ROOT_INODE, 55);
        let mut value = vec![0u8; DIRENT_VALUE_HEADER];
        value[0..8].copy_from_slice(&42u64.to_le_bytes());
        value[8] = 8; // DT_REG
        value.extend_from_slice(b"hello\0garbage");
        let d = make_dirent(&key(KEY_TYPE_DIRENT, tuple, value)).unwrap();
        assert_eq!(d.parent_inode, ROOT_INODE);
        assert_eq!(d.inode, 42);
        assert_eq!(d.name, b"hello");
    }

    #[test]
    fn synthetic_root_dirent_matches_spec() {
        let d = Dirent::synthetic_root();
        assert_eq!(d.parent_inode, ROOT_INODE);
        assert_eq!(d.inode, ROOT_INODE);
        assert_eq!(d.dtype, ROOT_DIRENT_TYPE);
        assert!(d.name.is_empty());
    }
}

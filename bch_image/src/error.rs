use thiserror::Error;

#[derive(Error, Debug)]
pub enum BchError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid superblock: {0}")]
    BadSuperblock(String),
    #[error("filesystem was not cleanly shut down (no clean superblock field)")]
    NotClean,
    #[error("no root for btree {0}")]
    NoSuchTree(u8),
    #[error("truncated btree node")]
    TruncatedNode,
    #[error("unrecognized bkey format: {0}")]
    BadBkeyFormat(u8),
    #[error("unsupported inode size encoding")]
    UnsupportedInodeEncoding,
    #[error("truncated inode fields")]
    TruncatedInode,
}

pub type Result<T> = std::result::Result<T, BchError>;

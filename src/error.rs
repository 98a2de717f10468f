use std::io;

use thiserror::Error;

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum FsError {
    #[error("file descriptor {0} is invalid")]
    InvalidDescriptor(usize),
    #[error("inumber {0} is invalid")]
    InvalidInumber(u32),
    #[error("file {0} does not exist")]
    NotAllocated(u32),
    #[error("no free file descriptor")]
    NoFreeDescriptor,
    #[error("out of files")]
    NoFreeInode,
    #[error("file system is full")]
    DiskFull,
    #[error("logical block {0} is beyond the largest supported file")]
    FileTooLarge(u64),
    #[error("cannot seek to offset {0} < 0")]
    InvalidSeek(i64),
    #[error("cannot delete open file {inum} (fd = {fd})")]
    FileOpen { inum: u32, fd: usize },
    #[error("format rejected: {0}")]
    FormatRejected(String),
    #[error("block {0} is not a data block")]
    BadBlock(u32),
    #[error("bad super block: {0}")]
    BadSuperBlock(String),
    #[error("device I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("bad on-disk record: {0}")]
    Codec(#[from] bincode::Error),
}

pub type Result<T> = std::result::Result<T, FsError>;

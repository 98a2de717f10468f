use super::*;

use std::any::Any;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Mutex;

/// Fixed-size block storage underneath the file system.
///
/// Every transfer is exactly one block of [`BSIZE`] bytes. Indices at or past
/// [`BlockDevice::num_blocks`] fail with [`io::ErrorKind::InvalidInput`].
pub trait BlockDevice: Send + Sync + Any {
    fn read_block(&self, blockno: usize, buf: &mut [u8]) -> io::Result<()>;
    fn write_block(&self, blockno: usize, buf: &[u8]) -> io::Result<()>;
    /// capacity in blocks
    fn num_blocks(&self) -> usize;
    fn stop(&self, flush: bool) -> io::Result<()>;
}

fn check_access(blockno: usize, num_blocks: usize, len: usize) -> io::Result<()> {
    if blockno >= num_blocks {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("block {blockno} is beyond the device ({num_blocks} blocks)"),
        ));
    }
    if len != BSIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("buffer of {len} bytes is not a block"),
        ));
    }
    Ok(())
}

/// Zero-initialized device kept in memory.
pub struct MemDisk {
    blocks: Mutex<Vec<[u8; BSIZE]>>,
}

impl MemDisk {
    pub fn new(num_blocks: usize) -> Self {
        Self {
            blocks: Mutex::new(vec![[0u8; BSIZE]; num_blocks]),
        }
    }
}

impl BlockDevice for MemDisk {
    fn read_block(&self, blockno: usize, buf: &mut [u8]) -> io::Result<()> {
        let blocks = self.blocks.lock().unwrap();
        check_access(blockno, blocks.len(), buf.len())?;
        buf.copy_from_slice(&blocks[blockno]);
        Ok(())
    }

    fn write_block(&self, blockno: usize, buf: &[u8]) -> io::Result<()> {
        let mut blocks = self.blocks.lock().unwrap();
        check_access(blockno, blocks.len(), buf.len())?;
        blocks[blockno].copy_from_slice(buf);
        Ok(())
    }

    fn num_blocks(&self) -> usize {
        self.blocks.lock().unwrap().len()
    }

    fn stop(&self, _flush: bool) -> io::Result<()> {
        Ok(())
    }
}

/// Device backed by a disk image on the host file system.
pub struct FileDisk {
    file: Mutex<File>,
    num_blocks: usize,
}

impl FileDisk {
    /// Create (or truncate) an image of `num_blocks` zeroed blocks.
    pub fn create<P: AsRef<Path>>(path: P, num_blocks: usize) -> io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.set_len((num_blocks * BSIZE) as u64)?;
        Ok(Self {
            file: Mutex::new(file),
            num_blocks,
        })
    }

    /// Open an existing image; its length decides the capacity.
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let num_blocks = (file.metadata()?.len() / BSIZE as u64) as usize;
        Ok(Self {
            file: Mutex::new(file),
            num_blocks,
        })
    }
}

impl BlockDevice for FileDisk {
    fn read_block(&self, blockno: usize, buf: &mut [u8]) -> io::Result<()> {
        check_access(blockno, self.num_blocks, buf.len())?;
        let mut file = self.file.lock().unwrap();
        file.seek(SeekFrom::Start((blockno * BSIZE) as u64))?;
        file.read_exact(buf)
    }

    fn write_block(&self, blockno: usize, buf: &[u8]) -> io::Result<()> {
        check_access(blockno, self.num_blocks, buf.len())?;
        let mut file = self.file.lock().unwrap();
        file.seek(SeekFrom::Start((blockno * BSIZE) as u64))?;
        file.write_all(buf)
    }

    fn num_blocks(&self) -> usize {
        self.num_blocks
    }

    fn stop(&self, flush: bool) -> io::Result<()> {
        if flush {
            self.file.lock().unwrap().sync_all()?;
        }
        Ok(())
    }
}

use super::*;
use bitmap::FreeMap;
use block_device::BlockDevice;
use bmap::{bmap, free_all, lookup};
use buf::Buffer;
use disk::{SuperBlock, SUPER_BLOCK_NO};
use error::{FsError, Result};
use file_table::FileTable;
use inode::{DInode, InodeBlock, IndirectBlock};

use log::{debug, info, warn};
use std::io::SeekFrom;
use std::sync::Arc;

/// File descriptor
pub type Fd = usize;

/// A mounted volume.
///
/// Not thread-safe: every call runs to completion against the device, and
/// callers sharing one instance must synchronize externally.
pub struct FileSystem {
    dev: Arc<dyn BlockDevice>,
    sb: SuperBlock,
    free_map: FreeMap,
    files: FileTable,
}

impl FileSystem {
    /// Read the super block and free map of `dev`. A blank device mounts as
    /// an empty volume that still has to be formatted.
    pub fn mount(dev: Arc<dyn BlockDevice>) -> Result<Self> {
        let sb = SuperBlock::load(dev.as_ref())?;
        let free_map = FreeMap::load(dev.as_ref(), &sb)?;
        let free = free_map.free_count();
        if sb.size == 0 {
            warn!("mount: volume is not formatted");
        } else {
            info!(
                "mount: {} blocks, {} inode blocks, {} free map blocks, {free} free",
                sb.size, sb.isize, sb.msize
            );
        }
        Ok(Self {
            dev,
            sb,
            free_map,
            files: FileTable::new(),
        })
    }

    pub fn format(&mut self, size: u32, isize: u32) -> Result<()> {
        let sb = SuperBlock::layout(size, isize, self.dev.num_blocks())?;

        let open = self.files.open_fds();
        if !open.is_empty() {
            warn!("format: dropping open descriptors {open:?}");
        }
        self.files.clear();

        let dev = self.dev.as_ref();
        let mut buf = Buffer::zeroed(SUPER_BLOCK_NO);
        sb.encode(&mut buf)?;
        buf.bwrite(dev)?;
        for blockno in sb.mblock0()..sb.dblock0() {
            Buffer::zeroed(blockno).bwrite(dev)?;
        }

        self.free_map = FreeMap::load(dev, &sb)?;
        self.sb = sb;
        info!(
            "format: {size} blocks, {isize} inode blocks, {} free map blocks, data from {}",
            sb.msize,
            sb.dblock0()
        );
        Ok(())
    }

    /// Persist the free map, close every open file and stop the device.
    pub fn shutdown(mut self) -> Result<()> {
        self.free_map.save(self.dev.as_ref())?;
        for fd in self.files.open_fds() {
            self.close(fd)?;
        }
        self.dev.stop(true)?;
        info!("shutdown");
        Ok(())
    }

    pub fn create(&mut self) -> Result<Fd> {
        let fd = self.files.allocate().ok_or_else(|| {
            warn!("create: no free file descriptor");
            FsError::NoFreeDescriptor
        })?;

        match self.alloc_inode() {
            Ok(Some((inum, inode))) => {
                debug!("create: inode {inum} on fd {fd}");
                self.files.bind(fd, inode, inum);
                Ok(fd)
            }
            Ok(None) => {
                self.files.release(fd);
                warn!("create: out of files");
                Err(FsError::NoFreeInode)
            }
            Err(e) => {
                self.files.release(fd);
                Err(e)
            }
        }
    }

    /// First free inode in inumber order, marked allocated on disk.
    fn alloc_inode(&self) -> Result<Option<(u32, DInode)>> {
        let dev = self.dev.as_ref();
        for (n, blockno) in (self.sb.iblock0()..self.sb.dblock0()).enumerate() {
            let mut block = InodeBlock::load(dev, blockno)?;
            let Some(slot) = block.inodes.iter().position(|inode| !inode.is_allocated()) else {
                continue;
            };
            let inum = (n * IPB + slot + 1) as u32;
            if !self.sb.inum_is_valid(inum) {
                return Ok(None);
            }
            block.inodes[slot].allocate();
            block.store(dev)?;
            return Ok(Some((inum, block.inodes[slot].clone())));
        }
        Ok(None)
    }

    pub fn open(&mut self, inum: u32) -> Result<Fd> {
        self.check_inum(inum)?;
        let fd = self.files.allocate().ok_or_else(|| {
            warn!("open: no free file descriptor");
            FsError::NoFreeDescriptor
        })?;

        let inode = match self.read_inode(inum) {
            Ok(inode) if inode.is_allocated() => inode,
            Ok(_) => {
                self.files.release(fd);
                warn!("open: file {inum} does not exist");
                return Err(FsError::NotAllocated(inum));
            }
            Err(e) => {
                self.files.release(fd);
                return Err(e);
            }
        };
        debug!("open: inode {inum} on fd {fd}");
        self.files.bind(fd, inode, inum);
        Ok(fd)
    }

    pub fn inumber(&self, fd: Fd) -> Result<u32> {
        Ok(self.files.get(fd)?.inum)
    }

    /// Working copy of the inode behind `fd`.
    pub fn inode(&self, fd: Fd) -> Result<&DInode> {
        Ok(&self.files.get(fd)?.inode)
    }

    /// On-disk copy of inode `inum`.
    pub fn stat(&self, inum: u32) -> Result<DInode> {
        self.check_inum(inum)?;
        self.read_inode(inum)
    }

    pub fn super_block(&self) -> &SuperBlock {
        &self.sb
    }

    pub fn free_blocks(&self) -> usize {
        self.free_map.free_count()
    }

    pub fn is_allocated(&self, blockno: u32) -> bool {
        self.free_map.is_allocated(blockno)
    }

    /// Read from the cursor up to the end of the file. Holes read as zeros.
    pub fn read(&mut self, fd: Fd, buffer: &mut [u8]) -> Result<usize> {
        let dev = self.dev.as_ref();
        let file = self.files.get_mut(fd)?;
        let rest = file.inode.size.saturating_sub(file.cursor);
        let limit = buffer.len().min(rest.try_into().unwrap_or(usize::MAX));

        let mut off = 0;
        while off < limit {
            let m = lookup(dev, &file.inode, file.cursor)?;
            let len = (BSIZE - m.offset).min(limit - off);
            let dst = &mut buffer[off..off + len];
            match m.target {
                None => dst.fill(0),
                Some(blockno) => {
                    let block = Buffer::bread(dev, blockno as usize)?;
                    dst.copy_from_slice(&block.data[m.offset..m.offset + len]);
                }
            }
            off += len;
            file.cursor += len as u64;
        }
        Ok(limit)
    }

    /// Write at the cursor, allocating blocks as needed.
    ///
    /// Running out of space fails the call, but whatever was already copied
    /// stays: the cursor and size cover the written prefix.
    pub fn write(&mut self, fd: Fd, buffer: &[u8]) -> Result<usize> {
        self.files.get(fd)?;
        let result = self.write_blocks(fd, buffer);
        self.free_map.save(self.dev.as_ref())?;
        result
    }

    fn write_blocks(&mut self, fd: Fd, buffer: &[u8]) -> Result<usize> {
        let dev = self.dev.as_ref();

        let mut off = 0;
        while off < buffer.len() {
            let file = self.files.get_mut(fd)?;
            let m = bmap(dev, &mut self.free_map, &mut file.inode, file.cursor)
                .inspect_err(|e| warn!("write: fd {fd} stopped after {off} bytes: {e}"))?;
            let mut block = if m.target.fresh {
                Buffer::zeroed(m.target.blockno as usize)
            } else {
                Buffer::bread(dev, m.target.blockno as usize)?
            };
            let len = (BSIZE - m.offset).min(buffer.len() - off);
            block.data[m.offset..m.offset + len].copy_from_slice(&buffer[off..off + len]);
            block.bwrite(dev)?;

            off += len;
            file.cursor += len as u64;
            let cursor = file.cursor;
            self.files.set_minimum_size(fd, cursor)?;
        }
        Ok(buffer.len())
    }

    /// Move the cursor. Going past the end is fine; the size limit is only
    /// checked by the next read or write.
    pub fn seek(&mut self, fd: Fd, pos: SeekFrom) -> Result<u64> {
        let file = self.files.get_mut(fd)?;
        let (base, offset) = match pos {
            SeekFrom::Start(offset) => (0, i64::try_from(offset).unwrap_or(i64::MAX)),
            SeekFrom::End(offset) => (file.inode.size as i64, offset),
            SeekFrom::Current(offset) => (file.cursor as i64, offset),
        };
        let ptr = base.saturating_add(offset);
        if ptr < 0 {
            warn!("seek: cannot seek to offset < 0");
            return Err(FsError::InvalidSeek(ptr));
        }
        file.cursor = ptr as u64;
        Ok(file.cursor)
    }

    /// Write the working inode back and free the descriptor.
    pub fn close(&mut self, fd: Fd) -> Result<()> {
        let file = self.files.get(fd)?;
        self.write_inode(file.inum, &file.inode)?;
        debug!("close: fd {fd}, inode {}", file.inum);
        self.files.release(fd);
        Ok(())
    }

    pub fn delete(&mut self, inum: u32) -> Result<()> {
        if let Some(fd) = self.files.fd_of(inum) {
            warn!("delete: cannot delete open file (fd = {fd})");
            return Err(FsError::FileOpen { inum, fd });
        }
        self.check_inum(inum)?;

        let inode = self.read_inode(inum)?;
        if !inode.is_allocated() {
            warn!("delete: file {inum} does not exist");
            return Err(FsError::NotAllocated(inum));
        }

        let dev = self.dev.as_ref();
        free_all(dev, &mut self.free_map, &inode)?;
        self.free_map.save(dev)?;

        self.write_inode(inum, &DInode::default())?;
        debug!("delete: inode {inum}");
        Ok(())
    }

    fn check_inum(&self, inum: u32) -> Result<()> {
        if !self.sb.inum_is_valid(inum) {
            warn!("inumber {inum} is invalid");
            return Err(FsError::InvalidInumber(inum));
        }
        Ok(())
    }

    fn read_inode(&self, inum: u32) -> Result<DInode> {
        let block = InodeBlock::load(self.dev.as_ref(), self.sb.iblock(inum))?;
        Ok(block.inodes[self.sb.ioffset(inum)].clone())
    }

    fn write_inode(&self, inum: u32, inode: &DInode) -> Result<()> {
        let dev = self.dev.as_ref();
        let mut block = InodeBlock::load(dev, self.sb.iblock(inum))?;
        block.inodes[self.sb.ioffset(inum)] = inode.clone();
        block.store(dev)
    }

    /// Indirect block `blockno` as stored on disk.
    pub fn indirect_block(&self, blockno: u32) -> Result<IndirectBlock> {
        IndirectBlock::load(self.dev.as_ref(), blockno)
    }
}

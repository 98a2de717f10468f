use super::*;
use block_device::BlockDevice;
use buf::Buffer;
use disk::{SuperBlock, SUPER_BLOCK_NO};
use error::{FsError, Result};

use log::{debug, warn};

/// In-memory copy of the free map. Bit `n` tracks data block `start + n`,
/// a set bit means in use.
///
/// The first [`INLINE_MAP_BITS`] bits live in the tail of the super block,
/// the rest in the `msize` blocks that follow it. All of them are loaded at
/// mount and written back by [`FreeMap::save`].
pub struct FreeMap {
    /// first data block
    start: usize,
    /// # of data blocks
    blocks: usize,
    /// super block first, then the free map blocks
    segments: Vec<Buffer>,
    /// no free bit below this one
    hint: usize,
}

impl FreeMap {
    pub fn load(dev: &dyn BlockDevice, sb: &SuperBlock) -> Result<Self> {
        let mut segments = vec![Buffer::bread(dev, SUPER_BLOCK_NO)?];
        for blockno in sb.mblock0()..sb.iblock0() {
            segments.push(Buffer::bread(dev, blockno)?);
        }
        Ok(Self {
            start: sb.dblock0(),
            blocks: sb.data_blocks(),
            segments,
            hint: 0,
        })
    }

    /// bit -> (segment, byte, mask)
    fn locate(bno: usize) -> (usize, usize, u8) {
        let (bi, bj, base) = if bno < INLINE_MAP_BITS {
            (0, bno, SB_HEADER_SIZE)
        } else {
            let rest = bno - INLINE_MAP_BITS;
            (1 + rest / BPB, rest % BPB, 0)
        };
        (bi, base + bj / 8, 1 << (bj % 8))
    }

    fn test(&self, bno: usize) -> bool {
        let (bi, byte, mask) = Self::locate(bno);
        self.segments[bi].data[byte] & mask != 0
    }

    /// Take the lowest free data block, or `None` when the volume is full.
    pub fn alloc(&mut self) -> Option<u32> {
        for bno in self.hint..self.blocks {
            let (bi, byte, mask) = Self::locate(bno);
            let segment = &mut self.segments[bi];
            if segment.data[byte] & mask == 0 {
                segment.data[byte] |= mask;
                segment.dirty = true;
                self.hint = bno + 1;
                let blockno = (self.start + bno) as u32;
                debug!("alloc block {blockno}");
                return Some(blockno);
            }
        }
        self.hint = self.blocks;
        None
    }

    /// Return `blockno` to the pool. Freeing a free block only logs.
    pub fn dealloc(&mut self, blockno: u32) -> Result<()> {
        let bno = self.bit_of(blockno)?;
        let (bi, byte, mask) = Self::locate(bno);
        let segment = &mut self.segments[bi];
        if segment.data[byte] & mask == 0 {
            warn!("dealloc: block {blockno} is already free");
            return Ok(());
        }
        segment.data[byte] &= !mask;
        segment.dirty = true;
        self.hint = self.hint.min(bno);
        debug!("free block {blockno}");
        Ok(())
    }

    pub fn is_allocated(&self, blockno: u32) -> bool {
        self.bit_of(blockno).is_ok_and(|bno| self.test(bno))
    }

    pub fn free_count(&self) -> usize {
        (0..self.blocks).filter(|&bno| !self.test(bno)).count()
    }

    /// Write every modified segment back to the device.
    pub fn save(&mut self, dev: &dyn BlockDevice) -> Result<()> {
        for segment in self.segments.iter_mut() {
            segment.flush(dev)?;
        }
        Ok(())
    }

    fn bit_of(&self, blockno: u32) -> Result<usize> {
        let blockno = blockno as usize;
        if blockno < self.start || blockno >= self.start + self.blocks {
            return Err(FsError::BadBlock(blockno as u32));
        }
        Ok(blockno - self.start)
    }
}

use super::*;
use block_device::BlockDevice;
use error::Result;

/// One device block held in memory.
pub struct Buffer {
    pub blockno: usize,
    /// modified since it was last written?
    pub dirty: bool,
    pub data: [u8; BSIZE],
}

impl Buffer {
    pub fn zeroed(blockno: usize) -> Self {
        Buffer {
            blockno,
            dirty: false,
            data: [0; BSIZE],
        }
    }

    /// block(disk) -> block(mem)
    pub fn bread(dev: &dyn BlockDevice, blockno: usize) -> Result<Self> {
        let mut buf = Buffer::zeroed(blockno);
        dev.read_block(blockno, &mut buf.data)?;
        Ok(buf)
    }

    /// block(mem) -> block(disk), whether dirty or not
    pub fn bwrite(&mut self, dev: &dyn BlockDevice) -> Result<()> {
        dev.write_block(self.blockno, &self.data)?;
        self.dirty = false;
        Ok(())
    }

    /// write back only if modified
    pub fn flush(&mut self, dev: &dyn BlockDevice) -> Result<()> {
        if self.dirty {
            self.bwrite(dev)?;
        }
        Ok(())
    }
}

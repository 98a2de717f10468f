use super::*;
use block_device::BlockDevice;
use buf::Buffer;
use error::Result;

use serde::{Deserialize, Serialize};

#[repr(C)]
#[derive(Clone, Serialize, Deserialize, Default, Debug, PartialEq, Eq)]
// inode on disk
pub struct DInode {
    /// non-zero once allocated
    pub flags: u32,
    /// Size of file (bytes)
    pub size: u64,
    /// Data block addresses: NDIRECT direct, then single, double, triple indirect.
    /// 0 means "not allocated".
    pub addrs: [u32; NADDRS],
}

impl DInode {
    pub fn is_allocated(&self) -> bool {
        self.flags != 0
    }

    /// Reset to a fresh, empty, allocated file.
    pub fn allocate(&mut self) {
        *self = DInode {
            flags: 1,
            ..Default::default()
        };
    }
}

/// One block of the inode area.
pub struct InodeBlock {
    pub blockno: usize,
    pub inodes: Vec<DInode>,
}

impl InodeBlock {
    pub fn load(dev: &dyn BlockDevice, blockno: usize) -> Result<Self> {
        let buf = Buffer::bread(dev, blockno)?;
        let inodes = buf
            .data
            .chunks_exact(DINODE_SIZE)
            .map(|raw| bincode::deserialize::<DInode>(raw))
            .collect::<bincode::Result<Vec<_>>>()?;
        Ok(Self { blockno, inodes })
    }

    pub fn store(&self, dev: &dyn BlockDevice) -> Result<()> {
        let mut buf = Buffer::zeroed(self.blockno);
        for (slot, inode) in buf.data.chunks_exact_mut(DINODE_SIZE).zip(&self.inodes) {
            bincode::serialize_into(slot, inode)?;
        }
        buf.bwrite(dev)
    }
}

/// A block of pointers to the next level of the tree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndirectBlock {
    pub ptrs: [u32; NINDIRECT],
}

impl IndirectBlock {
    pub fn zeroed() -> Self {
        Self {
            ptrs: [0; NINDIRECT],
        }
    }

    pub fn load(dev: &dyn BlockDevice, blockno: u32) -> Result<Self> {
        let buf = Buffer::bread(dev, blockno as usize)?;
        let mut ptrs = [0u32; NINDIRECT];
        for (ptr, bytes) in ptrs.iter_mut().zip(buf.data.chunks_exact(4)) {
            *ptr = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        }
        Ok(Self { ptrs })
    }

    pub fn store(&self, dev: &dyn BlockDevice, blockno: u32) -> Result<()> {
        let mut buf = Buffer::zeroed(blockno as usize);
        for (ptr, bytes) in self.ptrs.iter().zip(buf.data.chunks_exact_mut(4)) {
            bytes.copy_from_slice(&ptr.to_le_bytes());
        }
        buf.bwrite(dev)
    }
}

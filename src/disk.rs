//! Disk layout:
//! [ super block + inline free map | free map blocks(msize) | inode blocks(isize) | data blocks ]
//! `size` blocks in total, the rest of the device is unused

use super::*;
use block_device::BlockDevice;
use buf::Buffer;
use error::{FsError, Result};

use log::warn;
use serde::{Deserialize, Serialize};

pub const SUPER_BLOCK_NO: usize = 0;

#[repr(C)]
#[derive(Serialize, Deserialize, Default, Debug, Clone, Copy, PartialEq, Eq)]
pub struct SuperBlock {
    /// Size of file system image (blocks)
    pub size: u32,
    /// Number of inode blocks
    pub isize: u32,
    /// Number of free map blocks following the super block
    pub msize: u32,
}

impl SuperBlock {
    /// Geometry for a volume of `size` blocks with `isize` inode blocks on a
    /// device of `capacity` blocks.
    pub fn layout(size: u32, isize: u32, capacity: usize) -> Result<Self> {
        if size as usize > capacity {
            warn!("format: size exceeds disk size of {capacity}");
            return Err(FsError::FormatRejected(format!(
                "{size} blocks exceed the device capacity of {capacity}"
            )));
        }

        let msize = Self::map_blocks(size, isize) as i64;

        if size as i64 - msize - isize as i64 - 1 < 0 {
            warn!("format: metadata will not fit in file system");
            return Err(FsError::FormatRejected(format!(
                "metadata of {} blocks does not fit in {size} blocks",
                1 + msize + isize as i64
            )));
        }

        Ok(SuperBlock {
            size,
            isize,
            msize: msize as u32,
        })
    }

    /// Free map blocks needed for the bits the tail of the super block
    /// cannot hold.
    fn map_blocks(size: u32, isize: u32) -> u32 {
        let needed = size as i64 - isize as i64 - 1;
        let extra = (needed - INLINE_MAP_BITS as i64).max(0);
        ((extra + BPB as i64 - 1) / BPB as i64) as u32
    }

    /// first free map block
    pub fn mblock0(&self) -> usize {
        1
    }

    /// first inode block
    pub fn iblock0(&self) -> usize {
        self.mblock0() + self.msize as usize
    }

    /// first data block
    pub fn dblock0(&self) -> usize {
        self.iblock0() + self.isize as usize
    }

    /// Number of blocks the allocator manages.
    pub fn data_blocks(&self) -> usize {
        (self.size as usize).saturating_sub(self.dblock0())
    }

    /// Upper bound (exclusive) of valid inumbers.
    pub fn ninodes(&self) -> u32 {
        self.isize * IPB as u32
    }

    pub fn inum_is_valid(&self, inum: u32) -> bool {
        inum > 0 && inum < self.ninodes()
    }

    /// Block holding inode `inum`.
    pub fn iblock(&self, inum: u32) -> usize {
        self.iblock0() + (inum as usize - 1) / IPB
    }

    /// Slot of inode `inum` inside its block.
    pub fn ioffset(&self, inum: u32) -> usize {
        (inum as usize - 1) % IPB
    }

    /// Read and sanity check the super block of `dev`.
    pub fn load(dev: &dyn BlockDevice) -> Result<Self> {
        let buf = Buffer::bread(dev, SUPER_BLOCK_NO)?;
        let sb: SuperBlock = bincode::deserialize(&buf.data[..SB_HEADER_SIZE])?;
        if sb.size as usize > dev.num_blocks() {
            return Err(FsError::BadSuperBlock(format!(
                "{} blocks on a device of {}",
                sb.size,
                dev.num_blocks()
            )));
        }
        if sb.size > 0 && sb.msize != Self::map_blocks(sb.size, sb.isize) {
            return Err(FsError::BadSuperBlock(format!(
                "{} free map blocks for {} blocks and {} inode blocks",
                sb.msize, sb.size, sb.isize
            )));
        }
        if sb.size > 0 && sb.dblock0() > sb.size as usize {
            return Err(FsError::BadSuperBlock(format!(
                "data region starts at {} past the end {}",
                sb.dblock0(),
                sb.size
            )));
        }
        Ok(sb)
    }

    /// Encode the header into the front of a super block buffer.
    pub fn encode(&self, buf: &mut Buffer) -> Result<()> {
        bincode::serialize_into(&mut buf.data[..SB_HEADER_SIZE], self)?;
        buf.dirty = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use block_device::MemDisk;

    #[test]
    fn header_fits_reserved_bytes() {
        let sb = SuperBlock::default();
        assert_eq!(bincode::serialized_size(&sb).unwrap(), SB_HEADER_SIZE as u64);
    }

    #[test]
    fn small_volume_keeps_free_map_inline() {
        let sb = SuperBlock::layout(64, 2, FSSIZE).unwrap();
        assert_eq!(sb.msize, 0);
        assert_eq!(sb.iblock0(), 1);
        assert_eq!(sb.dblock0(), 3);
        assert_eq!(sb.data_blocks(), 61);
        assert_eq!(sb.ninodes(), 64);
    }

    #[test]
    fn large_volume_needs_free_map_blocks() {
        let size = (INLINE_MAP_BITS + 3 + 1) as u32;
        let sb = SuperBlock::layout(size, 3, usize::MAX).unwrap();
        assert_eq!(sb.msize, 0);

        let size = (INLINE_MAP_BITS + 3 + 2) as u32;
        let sb = SuperBlock::layout(size, 3, usize::MAX).unwrap();
        assert_eq!(sb.msize, 1);

        let size = (INLINE_MAP_BITS + BPB + 3 + 2) as u32;
        let sb = SuperBlock::layout(size, 3, usize::MAX).unwrap();
        assert_eq!(sb.msize, 2);
    }

    #[test]
    fn rejects_bad_geometry() {
        assert!(matches!(
            SuperBlock::layout(65, 2, 64),
            Err(FsError::FormatRejected(_))
        ));
        assert!(matches!(
            SuperBlock::layout(3, 3, 64),
            Err(FsError::FormatRejected(_))
        ));
        assert!(SuperBlock::layout(4, 3, 64).is_ok());
    }

    #[test]
    fn regions_cover_metadata_exactly() {
        for size in [1u32, 2, 17, 64, 1000, 40_000] {
            for isize in 0..4u32 {
                let Ok(sb) = SuperBlock::layout(size, isize, usize::MAX) else {
                    continue;
                };
                assert!(sb.dblock0() <= size as usize);
                assert_eq!(sb.mblock0(), SUPER_BLOCK_NO + 1);
                assert_eq!(sb.iblock0() - sb.mblock0(), sb.msize as usize);
                assert_eq!(sb.dblock0() - sb.iblock0(), sb.isize as usize);
                let bits = INLINE_MAP_BITS + sb.msize as usize * BPB;
                assert!(bits >= sb.data_blocks());
            }
        }
    }

    #[test]
    fn inumber_addressing() {
        let sb = SuperBlock::layout(64, 2, FSSIZE).unwrap();
        assert!(!sb.inum_is_valid(0));
        assert!(sb.inum_is_valid(1));
        assert!(sb.inum_is_valid(63));
        assert!(!sb.inum_is_valid(64));
        assert_eq!((sb.iblock(1), sb.ioffset(1)), (1, 0));
        assert_eq!((sb.iblock(32), sb.ioffset(32)), (1, 31));
        assert_eq!((sb.iblock(33), sb.ioffset(33)), (2, 0));
    }

    #[test]
    fn load_round_trips_header() {
        let disk = MemDisk::new(64);
        let sb = SuperBlock::layout(64, 2, 64).unwrap();
        let mut buf = Buffer::zeroed(SUPER_BLOCK_NO);
        sb.encode(&mut buf).unwrap();
        buf.bwrite(&disk).unwrap();
        assert_eq!(SuperBlock::load(&disk).unwrap(), sb);
    }

    #[test]
    fn blank_device_loads_as_empty_volume() {
        let disk = MemDisk::new(8);
        let sb = SuperBlock::load(&disk).unwrap();
        assert_eq!(sb, SuperBlock::default());
        assert_eq!(sb.data_blocks(), 0);
        assert_eq!(sb.ninodes(), 0);
    }

    #[test]
    fn load_rejects_oversized_volume() {
        let disk = MemDisk::new(8);
        let mut buf = Buffer::zeroed(SUPER_BLOCK_NO);
        SuperBlock { size: 64, isize: 2, msize: 0 }
            .encode(&mut buf)
            .unwrap();
        buf.bwrite(&disk).unwrap();
        assert!(matches!(
            SuperBlock::load(&disk),
            Err(FsError::BadSuperBlock(_))
        ));
    }

    #[test]
    fn load_rejects_free_map_of_the_wrong_size() {
        let disk = MemDisk::new(64);
        for msize in [1, 5] {
            let mut buf = Buffer::zeroed(SUPER_BLOCK_NO);
            SuperBlock { size: 64, isize: 2, msize }
                .encode(&mut buf)
                .unwrap();
            buf.bwrite(&disk).unwrap();
            assert!(matches!(
                SuperBlock::load(&disk),
                Err(FsError::BadSuperBlock(_))
            ));
        }
    }
}

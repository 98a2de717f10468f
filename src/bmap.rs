//! Logical block -> physical block, through the inode's direct slots or up to
//! three levels of indirect blocks.

use super::*;
use bitmap::FreeMap;
use block_device::BlockDevice;
use error::{FsError, Result};
use inode::{DInode, IndirectBlock};

use log::{debug, warn};

/// Where the byte at a cursor lives: `target` is the block (or `None` for a
/// hole on lookup) and `offset` the byte inside it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Mapping<T> {
    pub target: T,
    pub offset: usize,
}

/// Block handed out by [`bmap`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Allocated {
    pub blockno: u32,
    /// allocated by this call, contents are garbage until zeroed
    pub fresh: bool,
}

fn split(cursor: u64) -> (u64, usize) {
    (cursor / BSIZE as u64, (cursor % BSIZE as u64) as usize)
}

/// Route to logical block `lbn`: the inode slot to start from, and one index
/// per indirect block below it (empty for direct blocks).
pub fn route(lbn: u64) -> Result<(usize, Vec<usize>)> {
    let (slot, base, levels) = if lbn < SINGLE_BOUND {
        return Ok((lbn as usize, Vec::new()));
    } else if lbn < DOUBLE_BOUND {
        (SINGLE_SLOT, SINGLE_BOUND, 1)
    } else if lbn < TRIPLE_BOUND {
        (SINGLE_SLOT + 1, DOUBLE_BOUND, 2)
    } else if lbn < MAXFILE {
        (SINGLE_SLOT + 2, TRIPLE_BOUND, 3)
    } else {
        return Err(FsError::FileTooLarge(lbn));
    };

    let idx = lbn - base;
    let p = NINDIRECT as u64;
    let path = (0..levels)
        .rev()
        .map(|depth| ((idx / p.pow(depth)) % p) as usize)
        .collect();
    Ok((slot, path))
}

fn alloc(free_map: &mut FreeMap) -> Result<u32> {
    free_map.alloc().ok_or_else(|| {
        warn!("bmap: file system is full");
        FsError::DiskFull
    })
}

/// Allocate an indirect block and put zeros on disk right away, so a later
/// walk through it never sees stale pointers.
fn alloc_table(dev: &dyn BlockDevice, free_map: &mut FreeMap) -> Result<u32> {
    let blockno = alloc(free_map)?;
    IndirectBlock::zeroed().store(dev, blockno)?;
    Ok(blockno)
}

/// Block holding byte `cursor` of `inode`, `None` where nothing is mapped.
/// Never allocates.
pub fn lookup(
    dev: &dyn BlockDevice,
    inode: &DInode,
    cursor: u64,
) -> Result<Mapping<Option<u32>>> {
    let (lbn, offset) = split(cursor);
    let (slot, path) = route(lbn)?;

    let mut blockno = inode.addrs[slot];
    for &idx in path.iter() {
        if blockno == 0 {
            break;
        }
        blockno = IndirectBlock::load(dev, blockno)?.ptrs[idx];
    }
    Ok(Mapping {
        target: (blockno != 0).then_some(blockno),
        offset,
    })
}

/// Block holding byte `cursor` of `inode`, allocating and linking in every
/// missing block on the way down.
///
/// New pointers in the inode itself only reach the disk when the caller
/// writes the inode back. If the free map runs dry half way, the indirect
/// blocks already linked stay with the file.
pub fn bmap(
    dev: &dyn BlockDevice,
    free_map: &mut FreeMap,
    inode: &mut DInode,
    cursor: u64,
) -> Result<Mapping<Allocated>> {
    let (lbn, offset) = split(cursor);
    let (slot, path) = route(lbn)?;

    let mut fresh = false;
    let mut blockno = inode.addrs[slot];
    if blockno == 0 {
        blockno = if path.is_empty() {
            alloc(free_map)?
        } else {
            alloc_table(dev, free_map)?
        };
        inode.addrs[slot] = blockno;
        fresh = true;
    }

    for (depth, &idx) in path.iter().enumerate() {
        let mut table = if fresh {
            IndirectBlock::zeroed()
        } else {
            IndirectBlock::load(dev, blockno)?
        };
        let mut next = table.ptrs[idx];
        fresh = next == 0;
        if fresh {
            next = if depth + 1 == path.len() {
                alloc(free_map)?
            } else {
                alloc_table(dev, free_map)?
            };
            table.ptrs[idx] = next;
            table.store(dev, blockno)?;
        }
        blockno = next;
    }

    debug!("bmap: lbn {lbn} -> block {blockno} (fresh: {fresh})");
    Ok(Mapping {
        target: Allocated { blockno, fresh },
        offset,
    })
}

/// Release every block reachable from `inode`, indirect blocks included.
pub fn free_all(dev: &dyn BlockDevice, free_map: &mut FreeMap, inode: &DInode) -> Result<()> {
    for (slot, &blockno) in inode.addrs.iter().enumerate() {
        let levels = slot.saturating_sub(SINGLE_SLOT - 1);
        free_tree(dev, free_map, blockno, levels)?;
    }
    Ok(())
}

/// Free `blockno` and, for `levels > 0`, everything below it.
fn free_tree(
    dev: &dyn BlockDevice,
    free_map: &mut FreeMap,
    blockno: u32,
    levels: usize,
) -> Result<()> {
    if blockno == 0 {
        return Ok(());
    }
    if levels > 0 {
        let table = IndirectBlock::load(dev, blockno)?;
        for &child in table.ptrs.iter() {
            free_tree(dev, free_map, child, levels - 1)?;
        }
    }
    free_map.dealloc(blockno)
}

#[cfg(test)]
mod tests {
    use super::*;
    use block_device::MemDisk;
    use buf::Buffer;
    use disk::{SuperBlock, SUPER_BLOCK_NO};

    const P: u64 = NINDIRECT as u64;

    fn volume(size: u32) -> (MemDisk, FreeMap) {
        let disk = MemDisk::new(size as usize);
        let sb = SuperBlock::layout(size, 1, size as usize).unwrap();
        let mut buf = Buffer::zeroed(SUPER_BLOCK_NO);
        sb.encode(&mut buf).unwrap();
        buf.bwrite(&disk).unwrap();
        let free_map = FreeMap::load(&disk, &sb).unwrap();
        (disk, free_map)
    }

    fn at(lbn: u64) -> u64 {
        lbn * BSIZE as u64
    }

    #[test]
    fn routes_every_level() {
        assert_eq!(route(0).unwrap(), (0, vec![]));
        assert_eq!(route(9).unwrap(), (9, vec![]));
        assert_eq!(route(10).unwrap(), (10, vec![0]));
        assert_eq!(route(137).unwrap(), (10, vec![127]));
        assert_eq!(route(138).unwrap(), (11, vec![0, 0]));
        assert_eq!(route(138 + P + 5).unwrap(), (11, vec![1, 5]));
        assert_eq!(route(TRIPLE_BOUND - 1).unwrap(), (11, vec![127, 127]));
        assert_eq!(route(TRIPLE_BOUND).unwrap(), (12, vec![0, 0, 0]));
        assert_eq!(
            route(TRIPLE_BOUND + P * P + 2 * P + 3).unwrap(),
            (12, vec![1, 2, 3])
        );
        assert_eq!(route(MAXFILE - 1).unwrap(), (12, vec![127, 127, 127]));
        assert!(matches!(route(MAXFILE), Err(FsError::FileTooLarge(l)) if l == MAXFILE));
    }

    #[test]
    fn lookup_of_unmapped_blocks_is_a_hole() {
        let (disk, _) = volume(32);
        let inode = DInode::default();
        for lbn in [0, 9, 10, 137, 138, TRIPLE_BOUND + 7] {
            let m = lookup(&disk, &inode, at(lbn) + 3).unwrap();
            assert_eq!(m.target, None);
            assert_eq!(m.offset, 3);
        }
    }

    #[test]
    fn direct_write_allocates_once() {
        let (disk, mut free_map) = volume(32);
        let mut inode = DInode::default();
        let m = bmap(&disk, &mut free_map, &mut inode, 100).unwrap();
        assert!(m.target.fresh);
        let blockno = m.target.blockno;
        assert_eq!(inode.addrs[0], blockno);

        let m = bmap(&disk, &mut free_map, &mut inode, 200).unwrap();
        assert_eq!(m.target, Allocated { blockno, fresh: false });
        let m = lookup(&disk, &inode, 200).unwrap();
        assert_eq!(m.target, Some(blockno));
    }

    #[test]
    fn single_and_double_boundary() {
        let (disk, mut free_map) = volume(32);
        let mut inode = DInode::default();

        bmap(&disk, &mut free_map, &mut inode, at(137)).unwrap();
        assert_ne!(inode.addrs[10], 0);
        assert_eq!(inode.addrs[11], 0);

        bmap(&disk, &mut free_map, &mut inode, at(138)).unwrap();
        assert_ne!(inode.addrs[11], 0);
        assert_eq!(inode.addrs[12], 0);
    }

    #[test]
    fn triple_indirect_links_every_level() {
        let (disk, mut free_map) = volume(32);
        let mut inode = DInode::default();
        let before = free_map.free_count();
        let lbn = TRIPLE_BOUND + P * P + 2 * P + 3;
        let m = bmap(&disk, &mut free_map, &mut inode, at(lbn)).unwrap();
        assert_eq!(free_map.free_count(), before - 4);

        let top = IndirectBlock::load(&disk, inode.addrs[12]).unwrap();
        let mid = IndirectBlock::load(&disk, top.ptrs[1]).unwrap();
        let low = IndirectBlock::load(&disk, mid.ptrs[2]).unwrap();
        assert_eq!(
            m.target,
            Allocated {
                blockno: low.ptrs[3],
                fresh: true
            }
        );
        assert_eq!(top.ptrs.iter().filter(|&&p| p != 0).count(), 1);

        let again = lookup(&disk, &inode, at(lbn)).unwrap();
        assert_eq!(again.target, Some(low.ptrs[3]));
        let neighbour = lookup(&disk, &inode, at(lbn + 1)).unwrap();
        assert_eq!(neighbour.target, None);
    }

    #[test]
    fn beyond_triple_range_is_an_error() {
        let (disk, mut free_map) = volume(32);
        let mut inode = DInode::default();
        let before = free_map.free_count();
        let err = bmap(&disk, &mut free_map, &mut inode, at(MAXFILE)).unwrap_err();
        assert!(matches!(err, FsError::FileTooLarge(_)));
        assert_eq!(free_map.free_count(), before);

        assert!(bmap(&disk, &mut free_map, &mut inode, at(MAXFILE) - 1).is_ok());
    }

    #[test]
    fn partial_allocation_is_kept() {
        // two data blocks: enough for the double-indirect table and one more
        let (disk, mut free_map) = volume(4);
        assert_eq!(free_map.free_count(), 2);
        let mut inode = DInode::default();

        let err = bmap(&disk, &mut free_map, &mut inode, at(138)).unwrap_err();
        assert!(matches!(err, FsError::DiskFull));
        assert_eq!(free_map.free_count(), 0);
        assert_ne!(inode.addrs[11], 0);

        let top = IndirectBlock::load(&disk, inode.addrs[11]).unwrap();
        assert_ne!(top.ptrs[0], 0);
        let low = IndirectBlock::load(&disk, top.ptrs[0]).unwrap();
        assert_eq!(low, IndirectBlock::zeroed());

        free_all(&disk, &mut free_map, &inode).unwrap();
        assert_eq!(free_map.free_count(), 2);
    }

    #[test]
    fn free_all_releases_indirect_blocks() {
        let (disk, mut free_map) = volume(64);
        let before = free_map.free_count();
        let mut inode = DInode::default();
        for lbn in [0, 9, 10, 137, 138, 138 + P, TRIPLE_BOUND, MAXFILE - 1] {
            bmap(&disk, &mut free_map, &mut inode, at(lbn)).unwrap();
        }
        // 2 direct, single(1+2), double(1+2+2), triple(2 * (1+1+1) + 1)
        assert_eq!(before - free_map.free_count(), 2 + 3 + 5 + 7);

        free_all(&disk, &mut free_map, &inode).unwrap();
        assert_eq!(free_map.free_count(), before);
    }
}

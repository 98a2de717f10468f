/// block size
pub const BSIZE: usize = 2048;

/// direct blocks in inode
pub const NDIRECT: usize = 10;

/// pointers held by one indirect block
pub const NINDIRECT: usize = 128;

/// pointer slots in inode: direct, single, double, triple
pub const NADDRS: usize = NDIRECT + 3;

/// slot of the single-indirect pointer
pub const SINGLE_SLOT: usize = NDIRECT;

/// on-disk size of one inode record
pub const DINODE_SIZE: usize = 64;

/// inodes per block
pub const IPB: usize = BSIZE / DINODE_SIZE;

/// bitmap per block
pub const BPB: usize = BSIZE * 8;

/// size, isize, msize
pub const SB_HEADER_SIZE: usize = 12;

/// bits of free map living in the tail of the super block
pub const INLINE_MAP_BITS: usize = (BSIZE - SB_HEADER_SIZE) * 8;

/// max # of open files
pub const MAX_OPEN_FILES: usize = 21;

/// default size of a new disk image in blocks
pub const FSSIZE: usize = 1000;

/// first logical block reached through the single-indirect pointer
pub const SINGLE_BOUND: u64 = NDIRECT as u64;

/// first logical block reached through the double-indirect pointer
pub const DOUBLE_BOUND: u64 = SINGLE_BOUND + NINDIRECT as u64;

/// first logical block reached through the triple-indirect pointer
pub const TRIPLE_BOUND: u64 = DOUBLE_BOUND + (NINDIRECT * NINDIRECT) as u64;

/// max # of logical blocks a file can have
pub const MAXFILE: u64 = TRIPLE_BOUND + (NINDIRECT * NINDIRECT * NINDIRECT) as u64;

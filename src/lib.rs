//! A single-volume inode file system on a fixed-size block device.
//!
//! Files are reached by inumber and read or written through descriptors
//! handed out by [`FileSystem`]; data blocks hang off ten direct pointers and
//! single, double and triple indirect blocks.

mod bitmap; // free map
mod bmap; // logical -> physical block
mod block_device;
mod buf;
mod common;
mod disk; // super block and layout
mod error;
mod file_table; // open files
mod fs;
mod inode;


pub use block_device::{BlockDevice, FileDisk, MemDisk};
pub use common::*;
pub use disk::SuperBlock;
pub use error::{FsError, Result};
pub use fs::{Fd, FileSystem};
pub use inode::{DInode, IndirectBlock};

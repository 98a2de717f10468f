use super::*;
use error::{FsError, Result};
use inode::DInode;

/// An open file: which inode, a working copy of it, and where the next
/// read or write starts.
#[derive(Clone, Debug)]
pub struct OpenFile {
    pub inum: u32,
    pub inode: DInode,
    pub cursor: u64,
}

#[derive(Clone, Debug)]
enum Slot {
    Free,
    /// handed out by `allocate`, not bound yet
    Reserved,
    Open(OpenFile),
}

pub struct FileTable(Vec<Slot>);

impl Default for FileTable {
    fn default() -> Self {
        Self::new()
    }
}

impl FileTable {
    pub fn new() -> Self {
        Self(vec![Slot::Free; MAX_OPEN_FILES])
    }

    /// Reserve the lowest free descriptor.
    pub fn allocate(&mut self) -> Option<usize> {
        let fd = self.0.iter().position(|slot| matches!(slot, Slot::Free))?;
        self.0[fd] = Slot::Reserved;
        Some(fd)
    }

    pub fn bind(&mut self, fd: usize, inode: DInode, inum: u32) {
        self.0[fd] = Slot::Open(OpenFile {
            inum,
            inode,
            cursor: 0,
        });
    }

    pub fn release(&mut self, fd: usize) -> Option<OpenFile> {
        match std::mem::replace(self.0.get_mut(fd)?, Slot::Free) {
            Slot::Open(file) => Some(file),
            _ => None,
        }
    }

    pub fn get(&self, fd: usize) -> Result<&OpenFile> {
        match self.0.get(fd) {
            Some(Slot::Open(file)) => Ok(file),
            _ => Err(FsError::InvalidDescriptor(fd)),
        }
    }

    pub fn get_mut(&mut self, fd: usize) -> Result<&mut OpenFile> {
        match self.0.get_mut(fd) {
            Some(Slot::Open(file)) => Ok(file),
            _ => Err(FsError::InvalidDescriptor(fd)),
        }
    }

    /// Grow the recorded size to `size`; never shrinks it.
    pub fn set_minimum_size(&mut self, fd: usize, size: u64) -> Result<()> {
        let file = self.get_mut(fd)?;
        file.inode.size = file.inode.size.max(size);
        Ok(())
    }

    /// Descriptor of `inum` if it is open.
    pub fn fd_of(&self, inum: u32) -> Option<usize> {
        self.0
            .iter()
            .position(|slot| matches!(slot, Slot::Open(file) if file.inum == inum))
    }

    pub fn open_fds(&self) -> Vec<usize> {
        (0..self.0.len())
            .filter(|&fd| matches!(self.0[fd], Slot::Open(_)))
            .collect()
    }

    /// Forget every open file without writing anything back.
    pub fn clear(&mut self) {
        self.0.fill(Slot::Free);
    }
}

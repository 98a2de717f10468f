use clap::{Parser, Subcommand};
use inode_fs::FSSIZE;
use std::path::PathBuf;

#[derive(Parser)]
#[command(version, about = "Inspect and fill inode-fs disk images")]
pub struct Cli {
    /// Disk image
    pub image: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create a fresh image and format it
    Format {
        /// Blocks in the file system
        #[arg(long, short)]
        blocks: u32,

        /// Blocks reserved for inodes
        #[arg(long, short, default_value_t = 1)]
        inode_blocks: u32,

        /// Size of the image in blocks
        #[arg(long, short, default_value_t = FSSIZE)]
        capacity: usize,
    },
    /// Copy a host file into a new inode and print its inumber
    Put { source: PathBuf },
    /// Copy the contents of an inode to a host file, or stdout
    Get {
        inumber: u32,

        #[arg(long, short)]
        out: Option<PathBuf>,
    },
    /// Delete an inode and release its blocks
    Rm { inumber: u32 },
    /// Show the volume geometry
    Info,
}

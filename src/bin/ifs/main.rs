mod cli;

use std::error::Error;
use std::fs;
use std::io::{self, SeekFrom, Write};
use std::sync::Arc;

use clap::Parser;
use cli::{Cli, Command};
use inode_fs::{BlockDevice, FileDisk, FileSystem, BSIZE, MAXFILE};
use log::warn;

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();
    let cli = Cli::parse();

    if let Command::Format {
        blocks,
        inode_blocks,
        capacity,
    } = cli.command
    {
        let disk: Arc<dyn BlockDevice> = Arc::new(FileDisk::create(&cli.image, capacity)?);
        let mut volume = FileSystem::mount(disk)?;
        volume.format(blocks, inode_blocks)?;
        println!(
            "formatted {:?}: {} blocks of {} bytes, {} inodes",
            cli.image,
            blocks,
            BSIZE,
            volume.super_block().ninodes().saturating_sub(1)
        );
        return Ok(volume.shutdown()?);
    }

    let disk: Arc<dyn BlockDevice> = Arc::new(FileDisk::open(&cli.image)?);
    let mut volume = FileSystem::mount(disk)?;
    let result = run(&mut volume, cli.command);
    volume.shutdown()?;
    result
}

fn run(volume: &mut FileSystem, command: Command) -> Result<(), Box<dyn Error>> {
    match command {
        Command::Format { .. } => unreachable!("format is handled before mount"),
        Command::Put { source } => {
            let data = fs::read(&source)?;
            println!("{}", put(volume, &data)?);
        }
        Command::Get { inumber, out } => {
            let fd = volume.open(inumber)?;
            let size = volume.seek(fd, SeekFrom::End(0))?;
            volume.seek(fd, SeekFrom::Start(0))?;
            let mut data = vec![0u8; usize::try_from(size)?];
            volume.read(fd, &mut data)?;
            volume.close(fd)?;
            match out {
                Some(path) => fs::write(path, &data)?,
                None => io::stdout().write_all(&data)?,
            }
        }
        Command::Rm { inumber } => volume.delete(inumber)?,
        Command::Info => {
            let sb = *volume.super_block();
            println!("block size:       {BSIZE}");
            println!("blocks:           {}", sb.size);
            println!("free map blocks:  {}", sb.msize);
            println!("inode blocks:     {}", sb.isize);
            println!("inodes:           {}", sb.ninodes().saturating_sub(1));
            println!("data blocks:      {} ({} free)", sb.data_blocks(), volume.free_blocks());
            println!("max file size:    {} bytes", MAXFILE * BSIZE as u64);
        }
    }
    Ok(())
}

/// Store `data` as a new file and return its inumber. A file that cannot be
/// written completely is deleted again, blocks included.
fn put(volume: &mut FileSystem, data: &[u8]) -> inode_fs::Result<u32> {
    let fd = volume.create()?;
    let inum = volume.inumber(fd)?;
    if let Err(e) = volume.write(fd, data) {
        warn!("put: dropping partial file {inum}");
        volume.close(fd)?;
        volume.delete(inum)?;
        return Err(e);
    }
    volume.close(fd)?;
    Ok(inum)
}

//! Superblock, region map, and the `FileSystem` session value that owns the
//! block device plus the layout derived from it.
//!
//! `format()` writes a fresh superblock and zeroes both bitmap blocks;
//! `mount()` reads block 0 back and verifies the magic number.

use std::path::Path;

use crate::block::BlockDevice;
use crate::error::{FsError, FsResult};
use crate::inode::DiskInode;
use crate::util::{as_bytes, as_bytes_mut, ceil_div};

/// Block size in bytes.
pub const BLOCK_SIZE: u32 = 4096;
/// Total disk image size in bytes (32 MiB).
pub const DISK_SIZE: u64 = 32 * 1024 * 1024;
/// Magic tag identifying a tinyfs image.
pub const MAGIC: u32 = 0x7466_5331; // "tfS1"

/// Maximum number of inodes the inode bitmap can track.
pub const MAX_INUM: u32 = 1024;

/// Block holding the inode allocation bitmap.
pub const INODE_BITMAP_BLK: u32 = 1;
/// Block holding the data-block allocation bitmap.
pub const DATA_BITMAP_BLK: u32 = 2;
/// First block of the inode region.
pub const INODE_REGION_START: u32 = 3;

/// Size in bytes of one packed on-disk inode.
pub const INODE_SIZE: usize = std::mem::size_of::<DiskInode>();
/// Number of inodes packed into one block.
pub const INODES_PER_BLOCK: u32 = BLOCK_SIZE / INODE_SIZE as u32;
/// Number of blocks the inode region occupies.
pub const INODE_REGION_BLOCKS: u32 = ceil_div(MAX_INUM, INODES_PER_BLOCK);
/// First block of the data region.
pub const DATA_REGION_START: u32 = INODE_REGION_START + INODE_REGION_BLOCKS;

/// Total number of blocks in the disk image.
pub const TOTAL_BLOCKS: u32 = (DISK_SIZE / BLOCK_SIZE as u64) as u32;
/// Maximum number of data blocks the data bitmap can track.
pub const MAX_DNUM: u32 = TOTAL_BLOCKS - DATA_REGION_START;

/// The inode number of the root directory.
pub const ROOT_INO: u32 = 0;

/// On-disk superblock, the block-0 layout descriptor.
#[repr(C, packed)]
#[derive(Clone, Copy)]
struct SuperblockDisk {
	magic: u32,
	max_inum: u32,
	max_dnum: u32,
	i_bitmap_blk: u32,
	d_bitmap_blk: u32,
	i_start_blk: u32,
	d_start_blk: u32,
}

/// A mounted tinyfs session: the block device plus the region map read from
/// (or written to) its superblock.
///
/// Both allocation bitmaps are re-read from the device before every
/// allocation decision and written back immediately after: this trades
/// I/O for never diverging from on-disk state.
pub struct FileSystem {
	pub(crate) dev: BlockDevice,
	pub(crate) max_inum: u32,
	pub(crate) max_dnum: u32,
	pub(crate) i_bitmap_blk: u32,
	pub(crate) d_bitmap_blk: u32,
	pub(crate) i_start_blk: u32,
	pub(crate) d_start_blk: u32,
}

impl FileSystem {
	/// Creates a fresh image at `path`: writes the superblock, zeroes both
	/// bitmaps, and initializes the root directory inode.
	pub fn format(path: &Path) -> FsResult<Self> {
		let mut dev = BlockDevice::init(path)?;

		let sb = SuperblockDisk {
			magic: MAGIC,
			max_inum: MAX_INUM,
			max_dnum: MAX_DNUM,
			i_bitmap_blk: INODE_BITMAP_BLK,
			d_bitmap_blk: DATA_BITMAP_BLK,
			i_start_blk: INODE_REGION_START,
			d_start_blk: DATA_REGION_START,
		};
		let mut sb_block = vec![0u8; BLOCK_SIZE as usize];
		sb_block[..std::mem::size_of::<SuperblockDisk>()]
			.copy_from_slice(unsafe { as_bytes(&sb) });
		dev.write(0, &sb_block)?;

		let zero = vec![0u8; BLOCK_SIZE as usize];
		dev.write(INODE_BITMAP_BLK, &zero)?;
		dev.write(DATA_BITMAP_BLK, &zero)?;

		let mut fs = Self {
			dev,
			max_inum: MAX_INUM,
			max_dnum: MAX_DNUM,
			i_bitmap_blk: INODE_BITMAP_BLK,
			d_bitmap_blk: DATA_BITMAP_BLK,
			i_start_blk: INODE_REGION_START,
			d_start_blk: DATA_REGION_START,
		};
		fs.init_root()?;
		Ok(fs)
	}

	/// Opens an existing image at `path`, verifying the magic number.
	pub fn mount(path: &Path) -> FsResult<Self> {
		let mut dev = BlockDevice::open(path)?;
		let mut sb_block = vec![0u8; BLOCK_SIZE as usize];
		dev.read(0, &mut sb_block)?;

		let mut sb = SuperblockDisk {
			magic: 0,
			max_inum: 0,
			max_dnum: 0,
			i_bitmap_blk: 0,
			d_bitmap_blk: 0,
			i_start_blk: 0,
			d_start_blk: 0,
		};
		unsafe { as_bytes_mut(&mut sb) }
			.copy_from_slice(&sb_block[..std::mem::size_of::<SuperblockDisk>()]);

		if sb.magic != MAGIC {
			return Err(FsError::BadFs);
		}

		Ok(Self {
			dev,
			max_inum: sb.max_inum,
			max_dnum: sb.max_dnum,
			i_bitmap_blk: sb.i_bitmap_blk,
			d_bitmap_blk: sb.d_bitmap_blk,
			i_start_blk: sb.i_start_blk,
			d_start_blk: sb.d_start_blk,
		})
	}

	pub fn max_inum(&self) -> u32 {
		self.max_inum
	}

	pub fn max_dnum(&self) -> u32 {
		self.max_dnum
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::tempdir;

	#[test]
	fn format_then_mount_round_trips_layout() {
		let dir = tempdir().unwrap();
		let path = dir.path().join("DISKFILE");
		{
			let _fs = FileSystem::format(&path).unwrap();
		}
		let fs = FileSystem::mount(&path).unwrap();
		assert_eq!(fs.max_inum(), MAX_INUM);
		assert_eq!(fs.max_dnum(), MAX_DNUM);
	}

	#[test]
	fn mount_rejects_bad_magic() {
		let dir = tempdir().unwrap();
		let path = dir.path().join("DISKFILE");
		{
			let mut dev = BlockDevice::init(&path).unwrap();
			dev.write(0, &vec![0u8; BLOCK_SIZE as usize]).unwrap();
		}
		assert!(matches!(FileSystem::mount(&path), Err(FsError::BadFs)));
	}

	#[test]
	fn region_math_is_consistent() {
		assert!(INODES_PER_BLOCK > 0);
		assert!(DATA_REGION_START > INODE_REGION_START);
		assert!(MAX_DNUM > 0);
		assert_eq!(TOTAL_BLOCKS, DATA_REGION_START + MAX_DNUM);
	}
}

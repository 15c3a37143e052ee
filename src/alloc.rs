//! The inode and data-block allocators.
//!
//! Each allocation re-reads its bitmap block from disk, scans for the
//! lowest clear bit, sets it, and writes the block back; freeing does the
//! mirror operation. This costs two I/Os per call but never risks an
//! in-memory bitmap cache diverging from what is actually on disk.

use crate::bitmap;
use crate::error::{FsError, FsResult};
use crate::layout::{BLOCK_SIZE, FileSystem};

impl FileSystem {
	/// Allocates the lowest-numbered free inode, returning its number.
	pub fn alloc_inode(&mut self) -> FsResult<u32> {
		let mut buf = vec![0u8; BLOCK_SIZE as usize];
		self.dev.read(self.i_bitmap_blk, &mut buf)?;
		let ino = bitmap::find_first_clear(&buf, self.max_inum as usize)
			.ok_or(FsError::NoSpace)?;
		bitmap::set(&mut buf, ino);
		self.dev.write(self.i_bitmap_blk, &buf)?;
		Ok(ino as u32)
	}

	/// Clears inode `ino`'s bit.
	pub fn free_inode(&mut self, ino: u32) -> FsResult<()> {
		let mut buf = vec![0u8; BLOCK_SIZE as usize];
		self.dev.read(self.i_bitmap_blk, &mut buf)?;
		bitmap::clear(&mut buf, ino as usize);
		self.dev.write(self.i_bitmap_blk, &buf)?;
		Ok(())
	}

	/// Allocates the lowest-numbered free data block, returning a number
	/// relative to the data region start (physical block is
	/// `d_start_blk + bno`).
	pub fn alloc_block(&mut self) -> FsResult<u32> {
		let mut buf = vec![0u8; BLOCK_SIZE as usize];
		self.dev.read(self.d_bitmap_blk, &mut buf)?;
		let bno = bitmap::find_first_clear(&buf, self.max_dnum as usize)
			.ok_or(FsError::NoSpace)?;
		bitmap::set(&mut buf, bno);
		self.dev.write(self.d_bitmap_blk, &buf)?;
		Ok(bno as u32)
	}

	/// Clears data block `bno`'s bit (relative to the data region start).
	pub fn free_block(&mut self, bno: u32) -> FsResult<()> {
		let mut buf = vec![0u8; BLOCK_SIZE as usize];
		self.dev.read(self.d_bitmap_blk, &mut buf)?;
		bitmap::clear(&mut buf, bno as usize);
		self.dev.write(self.d_bitmap_blk, &buf)?;
		Ok(())
	}

	/// Counts free inodes, for `statfs` and tests.
	pub fn free_inode_count(&mut self) -> FsResult<u32> {
		let mut buf = vec![0u8; BLOCK_SIZE as usize];
		self.dev.read(self.i_bitmap_blk, &mut buf)?;
		Ok(self.max_inum - bitmap::count_set(&buf, self.max_inum as usize) as u32)
	}

	/// Counts free data blocks, for `statfs` and tests.
	pub fn free_block_count(&mut self) -> FsResult<u32> {
		let mut buf = vec![0u8; BLOCK_SIZE as usize];
		self.dev.read(self.d_bitmap_blk, &mut buf)?;
		Ok(self.max_dnum - bitmap::count_set(&buf, self.max_dnum as usize) as u32)
	}

	/// Reads a physical data-region block given a region-relative number.
	pub(crate) fn read_data_block(&mut self, bno: u32, buf: &mut [u8]) -> FsResult<()> {
		self.dev.read(self.d_start_blk + bno, buf)?;
		Ok(())
	}

	/// Writes a physical data-region block given a region-relative number.
	pub(crate) fn write_data_block(&mut self, bno: u32, buf: &[u8]) -> FsResult<()> {
		self.dev.write(self.d_start_blk + bno, buf)?;
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::tempdir;

	#[test]
	fn alloc_then_free_restores_bitmap() {
		let dir = tempdir().unwrap();
		let path = dir.path().join("DISKFILE");
		let mut fs = FileSystem::format(&path).unwrap();

		let before = fs.free_block_count().unwrap();
		let bno = fs.alloc_block().unwrap();
		assert_eq!(fs.free_block_count().unwrap(), before - 1);
		fs.free_block(bno).unwrap();
		assert_eq!(fs.free_block_count().unwrap(), before);
	}

	#[test]
	fn alloc_inode_returns_lowest_free() {
		let dir = tempdir().unwrap();
		let path = dir.path().join("DISKFILE");
		let mut fs = FileSystem::format(&path).unwrap();

		// ino 0 was consumed by the root directory at format time.
		let first = fs.alloc_inode().unwrap();
		assert_eq!(first, 1);
		let second = fs.alloc_inode().unwrap();
		assert_eq!(second, 2);
		fs.free_inode(first).unwrap();
		let reused = fs.alloc_inode().unwrap();
		assert_eq!(reused, 1);
	}

	#[test]
	fn alloc_block_fails_when_exhausted() {
		let dir = tempdir().unwrap();
		let path = dir.path().join("DISKFILE");
		let mut fs = FileSystem::format(&path).unwrap();

		let total = fs.free_block_count().unwrap();
		for _ in 0..total {
			fs.alloc_block().unwrap();
		}
		assert!(matches!(fs.alloc_block(), Err(FsError::NoSpace)));
	}
}

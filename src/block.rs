//! Fixed-size block I/O over a regular backing file.
//!
//! The block device is oblivious to everything above it: it knows only a
//! total size in bytes and a block size, and reads/writes whole blocks by
//! index. Blocks are indexed from 0.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::layout::{BLOCK_SIZE, DISK_SIZE};

/// A fixed-size, block-addressed backing file.
pub struct BlockDevice {
	file: File,
}

impl BlockDevice {
	/// Creates (or truncates) the backing file at `path` and sizes it to
	/// exactly `DISK_SIZE` bytes.
	pub fn init(path: &Path) -> io::Result<Self> {
		let file = OpenOptions::new()
			.read(true)
			.write(true)
			.create(true)
			.truncate(true)
			.open(path)?;
		file.set_len(DISK_SIZE)?;
		Ok(Self { file })
	}

	/// Opens an existing backing file at `path`.
	///
	/// Fails if the file does not exist, or exists but is smaller than
	/// `DISK_SIZE`: a truncated or foreign file must not silently succeed.
	pub fn open(path: &Path) -> io::Result<Self> {
		let file = OpenOptions::new().read(true).write(true).open(path)?;
		let len = file.metadata()?.len();
		if len < DISK_SIZE {
			return Err(io::Error::new(
				io::ErrorKind::InvalidData,
				format!("{}: image too small ({len} < {DISK_SIZE} bytes)", path.display()),
			));
		}
		Ok(Self { file })
	}

	/// Reads exactly one block into `buf`.
	///
	/// `buf` must be exactly `BLOCK_SIZE` bytes long.
	pub fn read(&mut self, block_no: u32, buf: &mut [u8]) -> io::Result<()> {
		debug_assert_eq!(buf.len(), BLOCK_SIZE as usize);
		self.file.seek(SeekFrom::Start(Self::offset(block_no)))?;
		self.file.read_exact(buf)
	}

	/// Writes exactly one block from `buf`.
	///
	/// `buf` must be exactly `BLOCK_SIZE` bytes long.
	pub fn write(&mut self, block_no: u32, buf: &[u8]) -> io::Result<()> {
		debug_assert_eq!(buf.len(), BLOCK_SIZE as usize);
		self.file.seek(SeekFrom::Start(Self::offset(block_no)))?;
		self.file.write_all(buf)?;
		self.file.flush()
	}

	/// Flushes buffered writes and drops the file handle.
	pub fn close(self) -> io::Result<()> {
		Ok(())
	}

	fn offset(block_no: u32) -> u64 {
		block_no as u64 * BLOCK_SIZE as u64
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::tempdir;

	#[test]
	fn init_then_read_write_round_trips() {
		let dir = tempdir().unwrap();
		let path = dir.path().join("DISKFILE");
		let mut dev = BlockDevice::init(&path).unwrap();

		let mut buf = vec![0xAB; BLOCK_SIZE as usize];
		dev.write(5, &buf).unwrap();
		buf.fill(0);
		dev.read(5, &mut buf).unwrap();
		assert!(buf.iter().all(|&b| b == 0xAB));
	}

	#[test]
	fn open_rejects_missing_file() {
		let dir = tempdir().unwrap();
		let path = dir.path().join("DISKFILE");
		assert!(BlockDevice::open(&path).is_err());
	}

	#[test]
	fn open_rejects_truncated_file() {
		let dir = tempdir().unwrap();
		let path = dir.path().join("DISKFILE");
		File::create(&path).unwrap().set_len(BLOCK_SIZE as u64).unwrap();
		assert!(BlockDevice::open(&path).is_err());
	}
}

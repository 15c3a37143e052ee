//! The path-based file-operation layer sitting on top of the inode-indexed
//! engine: `getattr`, `readdir`, `mkdir`, `rmdir`, `create`, `read`,
//! `write`, `unlink`, `utimens`, `statfs`.
//!
//! Every entry point here resolves a path through [`crate::namei`] and then
//! drives the inode/directory engine directly; none of it knows about FUSE.

use log::{debug, trace, warn};

use crate::dirent::NAME_MAX;
use crate::error::{FsError, FsResult};
use crate::inode::{DiskInode, FileType, MAX_FILE_SIZE};
use crate::layout::{BLOCK_SIZE, FileSystem};

/// Aggregate counts reported by `statfs`.
pub struct StatFs {
	pub total_blocks: u32,
	pub free_blocks: u32,
	pub total_inodes: u32,
	pub free_inodes: u32,
	pub block_size: u32,
}

fn check_name_len(name: &str) -> FsResult<()> {
	if name.len() > NAME_MAX {
		return Err(FsError::TooLarge);
	}
	Ok(())
}

impl FileSystem {
	/// Resolves `path` and returns its inode (attributes plus bookkeeping
	/// fields live on the `DiskInode` itself).
	pub fn getattr(&mut self, path: &str) -> FsResult<DiskInode> {
		let ino = self.namei(path)?;
		self.read_inode(ino)
	}

	/// Lists the entries of the directory at `path`.
	pub fn readdir(&mut self, path: &str) -> FsResult<Vec<(u32, String)>> {
		let ino = self.namei(path)?;
		let inode = self.read_inode(ino)?;
		if inode.kind() != FileType::Directory {
			return Err(FsError::NotFound);
		}
		self.dir_list(ino)
	}

	/// Creates a new directory at `path`, wired up with `/`, `.`, `..`.
	pub fn mkdir(&mut self, path: &str, mode: u16) -> FsResult<u32> {
		let (parent_ino, name) = self.namei_parent(path)?;
		self.mkdir_in(parent_ino, name, mode)
	}

	/// Creates a new directory named `name` inside `parent_ino`, wired up
	/// with `/`, `.`, `..`. Shared by the path-based [`Self::mkdir`] and the
	/// FUSE adapter, which already holds the parent inode number.
	pub fn mkdir_in(&mut self, parent_ino: u32, name: &str, mode: u16) -> FsResult<u32> {
		trace!("mkdir parent={parent_ino} name={name}");
		check_name_len(name)?;

		let ino = self.alloc_inode().inspect_err(|_| warn!("mkdir: no free inode"))?;
		let inode = DiskInode::new(ino, FileType::Directory, mode);
		self.write_inode(ino, &inode)?;

		if let Err(e) = self.dir_add(parent_ino, ino, name) {
			self.free_inode(ino)?;
			return Err(e);
		}
		self.dir_add(ino, ino, "/")?;
		self.dir_add(ino, ino, ".")?;
		self.dir_add(ino, parent_ino, "..")?;
		debug!("mkdir: created ino={ino} under parent={parent_ino} as {name}");
		Ok(ino)
	}

	/// Removes the empty directory at `path`. Fails with
	/// [`FsError::NotEmpty`] unless only `/`, `.`, `..` remain.
	pub fn rmdir(&mut self, path: &str) -> FsResult<()> {
		let (parent_ino, name) = self.namei_parent(path)?;
		self.rmdir_in(parent_ino, name)
	}

	/// Removes the empty directory named `name` inside `parent_ino`.
	pub fn rmdir_in(&mut self, parent_ino: u32, name: &str) -> FsResult<()> {
		trace!("rmdir parent={parent_ino} name={name}");
		let ino = self.dir_find(parent_ino, name)?;
		let inode = self.read_inode(ino)?;
		if inode.kind() != FileType::Directory {
			return Err(FsError::NotFound);
		}
		if self.dir_list(ino)?.len() > 3 {
			return Err(FsError::NotEmpty);
		}

		self.dir_remove(ino, "/")?;
		self.dir_remove(ino, ".")?;
		self.dir_remove(ino, "..")?;
		self.free_all_blocks(&inode)?;
		self.clear_inode_slot(ino)?;
		self.free_inode(ino)?;
		self.dir_remove(parent_ino, name)?;
		debug!("rmdir: removed ino={ino} from parent={parent_ino}");
		Ok(())
	}

	/// Creates a new, empty regular file at `path`.
	pub fn create(&mut self, path: &str, mode: u16) -> FsResult<u32> {
		let (parent_ino, name) = self.namei_parent(path)?;
		self.create_in(parent_ino, name, mode)
	}

	/// Creates a new, empty regular file named `name` inside `parent_ino`.
	pub fn create_in(&mut self, parent_ino: u32, name: &str, mode: u16) -> FsResult<u32> {
		trace!("create parent={parent_ino} name={name}");
		check_name_len(name)?;

		let ino = self.alloc_inode().inspect_err(|_| warn!("create: no free inode"))?;
		let inode = DiskInode::new(ino, FileType::File, mode);
		self.write_inode(ino, &inode)?;

		if let Err(e) = self.dir_add(parent_ino, ino, name) {
			self.free_inode(ino)?;
			return Err(e);
		}
		debug!("create: created ino={ino} under parent={parent_ino} as {name}");
		Ok(ino)
	}

	/// Removes the directory entry at `path` and, once its link count
	/// reaches zero, frees the inode and its data blocks.
	pub fn unlink(&mut self, path: &str) -> FsResult<()> {
		let (parent_ino, name) = self.namei_parent(path)?;
		self.unlink_in(parent_ino, name)
	}

	/// Removes the directory entry named `name` inside `parent_ino` and,
	/// once its link count reaches zero, frees the inode and its blocks.
	pub fn unlink_in(&mut self, parent_ino: u32, name: &str) -> FsResult<()> {
		trace!("unlink parent={parent_ino} name={name}");
		let ino = self.dir_find(parent_ino, name)?;
		let inode = self.read_inode(ino)?;
		if inode.kind() != FileType::File {
			return Err(FsError::NotFound);
		}

		self.dir_remove(parent_ino, name)?;
		self.free_all_blocks(&inode)?;
		self.clear_inode_slot(ino)?;
		self.free_inode(ino)?;
		debug!("unlink: freed ino={ino} from parent={parent_ino}");
		Ok(())
	}

	/// Reads up to `buf.len()` bytes starting at `offset` from the file at
	/// `path`, returning the number of bytes actually read (0 at or past
	/// EOF, since the pointer walk stops at the first unmapped block).
	pub fn read(&mut self, path: &str, offset: u64, buf: &mut [u8]) -> FsResult<usize> {
		let ino = self.namei(path)?;
		self.read_ino(ino, offset, buf)
	}

	pub(crate) fn read_ino(&mut self, ino: u32, offset: u64, buf: &mut [u8]) -> FsResult<usize> {
		let mut inode = self.read_inode(ino)?;
		if inode.kind() != FileType::File {
			return Err(FsError::NotFound);
		}
		if offset + buf.len() as u64 > MAX_FILE_SIZE {
			return Err(FsError::TooLarge);
		}
		if offset >= inode.size as u64 {
			return Ok(0);
		}

		let to_read = buf.len().min((inode.size as u64 - offset) as usize);
		let mut done = 0;
		while done < to_read {
			let pos = offset + done as u64;
			let l = (pos / BLOCK_SIZE as u64) as usize;
			let within = (pos % BLOCK_SIZE as u64) as usize;
			let chunk = (BLOCK_SIZE as usize - within).min(to_read - done);

			match self.map_logical_block(&inode, l)? {
				Some(bno) => {
					let mut block = vec![0u8; BLOCK_SIZE as usize];
					self.read_data_block(bno, &mut block)?;
					buf[done..done + chunk].copy_from_slice(&block[within..within + chunk]);
				}
				None => buf[done..done + chunk].fill(0),
			}
			done += chunk;
		}

		inode.touch_atime();
		self.write_inode(ino, &inode)?;
		Ok(done)
	}

	/// Writes `data` at `offset` into the file at `path`, allocating blocks
	/// on demand and growing `size` as needed. Fails with
	/// [`FsError::TooLarge`] if the range would exceed `MAX_FILE_SIZE`.
	pub fn write(&mut self, path: &str, offset: u64, data: &[u8]) -> FsResult<usize> {
		let ino = self.namei(path)?;
		self.write_ino(ino, offset, data)
	}

	pub(crate) fn write_ino(&mut self, ino: u32, offset: u64, data: &[u8]) -> FsResult<usize> {
		let mut inode = self.read_inode(ino)?;
		if inode.kind() != FileType::File {
			return Err(FsError::NotFound);
		}
		let end = offset + data.len() as u64;
		if end > MAX_FILE_SIZE {
			return Err(FsError::TooLarge);
		}

		let mut done = 0;
		while done < data.len() {
			let pos = offset + done as u64;
			let l = (pos / BLOCK_SIZE as u64) as usize;
			let within = (pos % BLOCK_SIZE as u64) as usize;
			let chunk = (BLOCK_SIZE as usize - within).min(data.len() - done);

			let bno = self
				.block_for_write(ino, &mut inode, l)
				.inspect_err(|_| warn!("write: ino={ino} ran out of space at logical block {l}"))?;
			let mut block = vec![0u8; BLOCK_SIZE as usize];
			self.read_data_block(bno, &mut block)?;
			block[within..within + chunk].copy_from_slice(&data[done..done + chunk]);
			self.write_data_block(bno, &block)?;
			done += chunk;
		}

		if end > inode.size as u64 {
			inode.size = end as u32;
		}
		inode.touch_mtime();
		self.write_inode(ino, &inode)?;
		Ok(done)
	}

	/// Sets the access and modification times of the file at `path`.
	pub fn utimens(
		&mut self,
		path: &str,
		atime: Option<(i64, u32)>,
		mtime: Option<(i64, u32)>,
	) -> FsResult<()> {
		let ino = self.namei(path)?;
		let mut inode = self.read_inode(ino)?;
		if let Some((sec, nsec)) = atime {
			inode.attrs.atime_sec = sec;
			inode.attrs.atime_nsec = nsec;
		}
		if let Some((sec, nsec)) = mtime {
			inode.attrs.mtime_sec = sec;
			inode.attrs.mtime_nsec = nsec;
		}
		self.write_inode(ino, &inode)
	}

	/// Reports aggregate allocator occupancy for the `statfs` FUSE call.
	pub fn statfs(&mut self) -> FsResult<StatFs> {
		Ok(StatFs {
			total_blocks: self.max_dnum(),
			free_blocks: self.free_block_count()?,
			total_inodes: self.max_inum(),
			free_inodes: self.free_inode_count()?,
			block_size: BLOCK_SIZE,
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::tempdir;

	fn new_fs() -> (tempfile::TempDir, FileSystem) {
		let dir = tempdir().unwrap();
		let path = dir.path().join("DISKFILE");
		let fs = FileSystem::format(&path).unwrap();
		(dir, fs)
	}

	#[test]
	fn create_write_read_round_trips() {
		let (_tmp, mut fs) = new_fs();
		fs.create("/a.txt", 0o644).unwrap();
		let n = fs.write("/a.txt", 0, b"hello world").unwrap();
		assert_eq!(n, 11);

		let mut buf = [0u8; 11];
		let n = fs.read("/a.txt", 0, &mut buf).unwrap();
		assert_eq!(n, 11);
		assert_eq!(&buf, b"hello world");
	}

	#[test]
	fn write_straddling_a_block_boundary() {
		let (_tmp, mut fs) = new_fs();
		fs.create("/big.bin", 0o644).unwrap();
		let data = vec![0xAB; BLOCK_SIZE as usize + 100];
		fs.write("/big.bin", BLOCK_SIZE as u64 - 50, &data).unwrap();

		let mut buf = vec![0u8; data.len()];
		fs.read("/big.bin", BLOCK_SIZE as u64 - 50, &mut buf).unwrap();
		assert_eq!(buf, data);
	}

	#[test]
	fn mkdir_then_readdir_then_rmdir() {
		let (_tmp, mut fs) = new_fs();
		fs.mkdir("/sub", 0o755).unwrap();
		let names: Vec<_> = fs.readdir("/sub").unwrap().into_iter().map(|(_, n)| n).collect();
		assert!(names.contains(&".".to_string()));
		assert!(names.contains(&"..".to_string()));

		fs.rmdir("/sub").unwrap();
		assert!(matches!(fs.namei("/sub"), Err(FsError::NotFound)));
	}

	#[test]
	fn rmdir_rejects_nonempty() {
		let (_tmp, mut fs) = new_fs();
		fs.mkdir("/sub", 0o755).unwrap();
		fs.create("/sub/f", 0o644).unwrap();
		assert!(matches!(fs.rmdir("/sub"), Err(FsError::NotEmpty)));
	}

	#[test]
	fn unlink_removes_file_and_frees_space() {
		let (_tmp, mut fs) = new_fs();
		fs.create("/f", 0o644).unwrap();
		fs.write("/f", 0, &vec![1u8; BLOCK_SIZE as usize * 2]).unwrap();
		let before = fs.free_block_count().unwrap();

		fs.unlink("/f").unwrap();
		let after = fs.free_block_count().unwrap();
		assert_eq!(after, before + 2);
		assert!(matches!(fs.namei("/f"), Err(FsError::NotFound)));
	}

	#[test]
	fn write_past_max_file_size_is_too_large() {
		let (_tmp, mut fs) = new_fs();
		fs.create("/f", 0o644).unwrap();
		let r = fs.write("/f", MAX_FILE_SIZE, b"x");
		assert!(matches!(r, Err(FsError::TooLarge)));
	}

	#[test]
	fn name_too_long_is_rejected() {
		let (_tmp, mut fs) = new_fs();
		let name = "x".repeat(NAME_MAX + 1);
		let r = fs.create(&format!("/{name}"), 0o644);
		assert!(matches!(r, Err(FsError::TooLarge)));
	}

	#[test]
	fn read_past_max_file_size_is_too_large() {
		let (_tmp, mut fs) = new_fs();
		fs.create("/f", 0o644).unwrap();
		let mut buf = [0u8; 1];
		let r = fs.read("/f", MAX_FILE_SIZE, &mut buf);
		assert!(matches!(r, Err(FsError::TooLarge)));
	}

	#[test]
	fn read_write_at_last_byte_boundary_succeeds() {
		let (_tmp, mut fs) = new_fs();
		fs.create("/f", 0o644).unwrap();
		let offset = MAX_FILE_SIZE - 1;
		fs.write("/f", offset, b"z").unwrap();
		let mut buf = [0u8; 1];
		assert_eq!(fs.read("/f", offset, &mut buf).unwrap(), 1);
		assert_eq!(&buf, b"z");
	}

	#[test]
	fn mkdir_and_rmdir_include_self_entry() {
		let (_tmp, mut fs) = new_fs();
		fs.mkdir("/sub", 0o755).unwrap();
		let mut names: Vec<_> = fs.readdir("/sub").unwrap().into_iter().map(|(_, n)| n).collect();
		names.sort();
		assert_eq!(names, vec!["..", ".", "/"]);
		fs.rmdir("/sub").unwrap();
	}
}

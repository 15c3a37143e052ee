//! Directory entries and the directory engine: `dir_find`, `dir_add`, and
//! `dir_remove`, operating on a directory inode's data blocks.
//!
//! Within one data block, valid entries occupy a prefix: scanning a block
//! stops at the first invalid slot. Across the pointer walk, allocated
//! pointer slots occupy a prefix too, so [`crate::inode::PointerWalk`]
//! already stops in the right place.

use crate::error::{FsError, FsResult};
use crate::inode::PointerWalk;
use crate::layout::{BLOCK_SIZE, FileSystem};
use crate::util::{as_bytes, as_bytes_mut};

/// Length, in bytes, of the fixed name field (NUL-terminated).
const NAME_LEN: usize = 252;
/// Longest name this design accepts (leaving room for the NUL).
pub const NAME_MAX: usize = NAME_LEN - 1;

/// A packed on-disk directory entry.
#[repr(C, packed)]
#[derive(Clone, Copy)]
pub struct DiskDirent {
	pub ino: u16,
	pub valid: u16,
	name: [u8; NAME_LEN],
}

/// Number of directory entries packed into one block.
pub const DIRENTS_PER_BLOCK: usize = BLOCK_SIZE as usize / std::mem::size_of::<DiskDirent>();

impl DiskDirent {
	fn empty() -> Self {
		Self {
			ino: 0,
			valid: 0,
			name: [0; NAME_LEN],
		}
	}

	fn new(ino: u32, name: &str) -> Self {
		let mut n = [0u8; NAME_LEN];
		let bytes = name.as_bytes();
		n[..bytes.len()].copy_from_slice(bytes);
		Self {
			ino: ino as u16,
			valid: 1,
			name: n,
		}
	}

	/// The entry's name, decoded up to its NUL terminator.
	pub fn name(&self) -> &str {
		let end = self.name.iter().position(|&b| b == 0).unwrap_or(NAME_LEN);
		std::str::from_utf8(&self.name[..end]).unwrap_or("")
	}
}

fn read_dirent(buf: &[u8], slot: usize) -> DiskDirent {
	let off = slot * std::mem::size_of::<DiskDirent>();
	let mut d = DiskDirent::empty();
	unsafe { as_bytes_mut(&mut d) }.copy_from_slice(&buf[off..off + std::mem::size_of::<DiskDirent>()]);
	d
}

fn write_dirent(buf: &mut [u8], slot: usize, d: &DiskDirent) {
	let off = slot * std::mem::size_of::<DiskDirent>();
	buf[off..off + std::mem::size_of::<DiskDirent>()].copy_from_slice(unsafe { as_bytes(d) });
}

/// The location of a found directory entry: which logical block it lives
/// in, that block's data-region-relative number, its slot, and the inode
/// number it names.
struct FoundEntry {
	l: usize,
	rel_bno: u32,
	slot: usize,
	child_ino: u32,
}

impl FileSystem {
	fn find_entry(&mut self, dir_ino: u32, name: &str) -> FsResult<Option<FoundEntry>> {
		let dir_inode = self.read_inode(dir_ino)?;
		let mut walk = PointerWalk::new(&dir_inode);
		while let Some((l, rel_bno)) = walk.next(self)? {
			let mut buf = vec![0u8; BLOCK_SIZE as usize];
			self.read_data_block(rel_bno, &mut buf)?;
			for slot in 0..DIRENTS_PER_BLOCK {
				let d = read_dirent(&buf, slot);
				if d.valid == 0 {
					break;
				}
				if d.name() == name {
					return Ok(Some(FoundEntry {
						l,
						rel_bno,
						slot,
						child_ino: d.ino as u32,
					}));
				}
			}
		}
		Ok(None)
	}

	/// Looks up `name` inside directory `dir_ino`, returning the entry's
	/// target inode number.
	pub fn dir_find(&mut self, dir_ino: u32, name: &str) -> FsResult<u32> {
		self.find_entry(dir_ino, name)
			.map(|found| found.map(|f| f.child_ino))?
			.ok_or(FsError::NotFound)
	}

	/// Lists every valid entry in `dir_ino`, in pointer-walk order.
	pub fn dir_list(&mut self, dir_ino: u32) -> FsResult<Vec<(u32, String)>> {
		let dir_inode = self.read_inode(dir_ino)?;
		let mut out = Vec::new();
		let mut walk = PointerWalk::new(&dir_inode);
		while let Some((_, rel_bno)) = walk.next(self)? {
			let mut buf = vec![0u8; BLOCK_SIZE as usize];
			self.read_data_block(rel_bno, &mut buf)?;
			for slot in 0..DIRENTS_PER_BLOCK {
				let d = read_dirent(&buf, slot);
				if d.valid == 0 {
					break;
				}
				out.push((d.ino as u32, d.name().to_string()));
			}
		}
		Ok(out)
	}

	/// Adds a `name -> child_ino` entry to directory `dir_ino`.
	///
	/// Fails with [`FsError::Exists`] if the name is already taken. Places
	/// the entry into the first invalid slot of an existing block, or
	/// allocates a new one if every existing block is full.
	pub fn dir_add(&mut self, dir_ino: u32, child_ino: u32, name: &str) -> FsResult<()> {
		if self.find_entry(dir_ino, name)?.is_some() {
			return Err(FsError::Exists);
		}

		let mut dir_inode = self.read_inode(dir_ino)?;
		let mut walk = PointerWalk::new(&dir_inode);
		let mut mapped_count = 0usize;
		let mut placed = false;

		while let Some((l, rel_bno)) = walk.next(self)? {
			mapped_count = l + 1;
			let mut buf = vec![0u8; BLOCK_SIZE as usize];
			self.read_data_block(rel_bno, &mut buf)?;
			for slot in 0..DIRENTS_PER_BLOCK {
				if read_dirent(&buf, slot).valid == 0 {
					write_dirent(&mut buf, slot, &DiskDirent::new(child_ino, name));
					self.write_data_block(rel_bno, &buf)?;
					placed = true;
					break;
				}
			}
			if placed {
				break;
			}
		}

		if !placed {
			let l = mapped_count;
			let rel_bno = self.block_for_write(dir_ino, &mut dir_inode, l)?;
			let mut buf = vec![0u8; BLOCK_SIZE as usize];
			write_dirent(&mut buf, 0, &DiskDirent::new(child_ino, name));
			self.write_data_block(rel_bno, &buf)?;
			dir_inode.size += BLOCK_SIZE;
		}

		dir_inode.link += 1;
		self.write_inode(dir_ino, &dir_inode)
	}

	/// Removes the `name` entry from directory `dir_ino`, shifting later
	/// valid entries in the same block down by one to preserve the prefix
	/// invariant, and freeing the block if it becomes the empty tail.
	pub fn dir_remove(&mut self, dir_ino: u32, name: &str) -> FsResult<()> {
		let found = self.find_entry(dir_ino, name)?.ok_or(FsError::NotFound)?;

		let mut buf = vec![0u8; BLOCK_SIZE as usize];
		self.read_data_block(found.rel_bno, &mut buf)?;

		let mut slot = found.slot;
		loop {
			if slot + 1 >= DIRENTS_PER_BLOCK {
				write_dirent(&mut buf, slot, &DiskDirent::empty());
				break;
			}
			let next = read_dirent(&buf, slot + 1);
			if next.valid == 0 {
				write_dirent(&mut buf, slot, &DiskDirent::empty());
				break;
			}
			write_dirent(&mut buf, slot, &next);
			slot += 1;
		}
		self.write_data_block(found.rel_bno, &buf)?;

		let mut remaining = 0;
		for s in 0..DIRENTS_PER_BLOCK {
			if read_dirent(&buf, s).valid == 0 {
				break;
			}
			remaining += 1;
		}

		let mut dir_inode = self.read_inode(dir_ino)?;
		if remaining == 0 {
			let mapped = self.mapped_block_count(&dir_inode)?;
			if found.l + 1 == mapped {
				self.unmap_block(dir_ino, &mut dir_inode, found.l)?;
				dir_inode.size = dir_inode.size.saturating_sub(BLOCK_SIZE);
			}
		}

		dir_inode.link -= 1;
		self.write_inode(dir_ino, &dir_inode)
	}
}

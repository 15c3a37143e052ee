//! Packed on-disk inodes and the direct/indirect pointer-walk abstraction.
//!
//! The pointer walk is the piece shared by the directory engine, `read`,
//! `write`, and `unlink`: a virtual logical block index `L` in
//! `[0, MAX_BLOCKS_PER_FILE)`, mapped through 16 direct pointers and 8
//! indirect pointers (each indirect pointer addressing a block of 16
//! further direct pointers). A pointer value of `-1` means "unused".

use crate::error::FsResult;
use crate::layout::{BLOCK_SIZE, FileSystem, INODE_SIZE, INODES_PER_BLOCK, ROOT_INO};
use crate::util::{as_bytes, as_bytes_mut, now};

/// Number of direct pointer slots per inode.
pub const NUM_DIRECT: usize = 16;
/// Number of indirect pointer slots per inode.
pub const NUM_INDIRECT: usize = 8;
/// Number of direct pointers packed into one indirect pointer block.
pub const PTRS_PER_INDIRECT_BLOCK: usize = 16;
/// Maximum number of data blocks reachable from one inode.
pub const MAX_BLOCKS_PER_FILE: usize = NUM_DIRECT + NUM_INDIRECT * PTRS_PER_INDIRECT_BLOCK;
/// Maximum file size in bytes (`MAX_BLOCKS_PER_FILE * BLOCK_SIZE`).
pub const MAX_FILE_SIZE: u64 = MAX_BLOCKS_PER_FILE as u64 * BLOCK_SIZE as u64;

/// An inode's type: a regular file or a directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum FileType {
	File = 0,
	Directory = 1,
}

impl FileType {
	fn from_u32(v: u32) -> Self {
		match v {
			1 => Self::Directory,
			_ => Self::File,
		}
	}
}

/// The embedded POSIX stat-shaped attribute block.
#[repr(C, packed)]
#[derive(Clone, Copy)]
pub struct Attrs {
	pub mode: u16,
	pub uid: u32,
	pub gid: u32,
	pub atime_sec: i64,
	pub atime_nsec: u32,
	pub mtime_sec: i64,
	pub mtime_nsec: u32,
	pub ctime_sec: i64,
	pub ctime_nsec: u32,
	pub blksize: u32,
}

impl Attrs {
	fn new(mode: u16) -> Self {
		let (sec, nsec) = now();
		Self {
			mode,
			uid: 0,
			gid: 0,
			atime_sec: sec,
			atime_nsec: nsec,
			mtime_sec: sec,
			mtime_nsec: nsec,
			ctime_sec: sec,
			ctime_nsec: nsec,
			blksize: BLOCK_SIZE,
		}
	}
}

/// A packed on-disk inode record.
#[repr(C, packed)]
#[derive(Clone, Copy)]
pub struct DiskInode {
	pub ino: u16,
	pub valid: u16,
	pub size: u32,
	pub kind: u32,
	pub link: u32,
	pub direct_ptr: [i32; NUM_DIRECT],
	pub indirect_ptr: [i32; NUM_INDIRECT],
	pub attrs: Attrs,
}

impl DiskInode {
	fn empty() -> Self {
		Self {
			ino: 0,
			valid: 0,
			size: 0,
			kind: FileType::File as u32,
			link: 0,
			direct_ptr: [-1; NUM_DIRECT],
			indirect_ptr: [-1; NUM_INDIRECT],
			attrs: Attrs::new(0),
		}
	}

	pub fn new(ino: u32, kind: FileType, mode: u16) -> Self {
		Self {
			ino: ino as u16,
			valid: 1,
			size: 0,
			kind: kind as u32,
			link: 0,
			direct_ptr: [-1; NUM_DIRECT],
			indirect_ptr: [-1; NUM_INDIRECT],
			attrs: Attrs::new(mode),
		}
	}

	pub fn kind(&self) -> FileType {
		FileType::from_u32(self.kind)
	}

	pub fn is_valid(&self) -> bool {
		self.valid != 0
	}

	pub fn touch_mtime(&mut self) {
		let (sec, nsec) = now();
		self.attrs.mtime_sec = sec;
		self.attrs.mtime_nsec = nsec;
		self.attrs.ctime_sec = sec;
		self.attrs.ctime_nsec = nsec;
	}

	pub fn touch_atime(&mut self) {
		let (sec, nsec) = now();
		self.attrs.atime_sec = sec;
		self.attrs.atime_nsec = nsec;
	}
}

/// A block of 16 indirect data-block pointers.
#[repr(C, packed)]
#[derive(Clone, Copy)]
struct IndirectBlock {
	ptr: [i32; PTRS_PER_INDIRECT_BLOCK],
}

impl IndirectBlock {
	fn empty() -> Self {
		Self {
			ptr: [-1; PTRS_PER_INDIRECT_BLOCK],
		}
	}

	fn read_from(fs: &mut FileSystem, bno: u32) -> FsResult<Self> {
		let mut buf = vec![0u8; BLOCK_SIZE as usize];
		fs.read_data_block(bno, &mut buf)?;
		let mut block = Self::empty();
		unsafe { as_bytes_mut(&mut block) }
			.copy_from_slice(&buf[..std::mem::size_of::<Self>()]);
		Ok(block)
	}

	fn write_to(&self, fs: &mut FileSystem, bno: u32) -> FsResult<()> {
		let mut buf = vec![0u8; BLOCK_SIZE as usize];
		buf[..std::mem::size_of::<Self>()].copy_from_slice(unsafe { as_bytes(self) });
		fs.write_data_block(bno, &buf)
	}
}

/// Enumerates the data blocks reachable from one inode in logical order,
/// stopping at the first unmapped slot.
pub struct PointerWalk {
	direct: [i32; NUM_DIRECT],
	indirect: [i32; NUM_INDIRECT],
	l: usize,
}

impl PointerWalk {
	pub fn new(inode: &DiskInode) -> Self {
		Self {
			direct: inode.direct_ptr,
			indirect: inode.indirect_ptr,
			l: 0,
		}
	}

	/// Returns the next `(logical_index, data_region_relative_block_no)`
	/// pair, or `None` once the first unmapped slot is reached.
	pub fn next(&mut self, fs: &mut FileSystem) -> FsResult<Option<(usize, u32)>> {
		if self.l >= MAX_BLOCKS_PER_FILE {
			return Ok(None);
		}
		let l = self.l;
		if l < NUM_DIRECT {
			let p = self.direct[l];
			if p < 0 {
				return Ok(None);
			}
			self.l += 1;
			Ok(Some((l, p as u32)))
		} else {
			let l2 = l - NUM_DIRECT;
			let i = l2 / PTRS_PER_INDIRECT_BLOCK;
			let j = l2 % PTRS_PER_INDIRECT_BLOCK;
			let ind = self.indirect[i];
			if ind < 0 {
				return Ok(None);
			}
			let block = IndirectBlock::read_from(fs, ind as u32)?;
			let p = block.ptr[j];
			if p < 0 {
				return Ok(None);
			}
			self.l += 1;
			Ok(Some((l, p as u32)))
		}
	}
}

impl FileSystem {
	fn inode_location(&self, ino: u32) -> (u32, usize) {
		let blk = self.i_start_blk + ino / INODES_PER_BLOCK;
		let slot = (ino % INODES_PER_BLOCK) as usize;
		(blk, slot)
	}

	/// Reads inode `ino` out of its packed inode-region block.
	pub fn read_inode(&mut self, ino: u32) -> FsResult<DiskInode> {
		let (blk, slot) = self.inode_location(ino);
		let mut buf = vec![0u8; BLOCK_SIZE as usize];
		self.dev.read(blk, &mut buf)?;
		let off = slot * INODE_SIZE;
		let mut inode = DiskInode::empty();
		unsafe { as_bytes_mut(&mut inode) }.copy_from_slice(&buf[off..off + INODE_SIZE]);
		Ok(inode)
	}

	/// Writes inode `ino` back into its slot, read-modify-write so sibling
	/// inodes packed into the same block are preserved.
	pub fn write_inode(&mut self, ino: u32, inode: &DiskInode) -> FsResult<()> {
		let (blk, slot) = self.inode_location(ino);
		let mut buf = vec![0u8; BLOCK_SIZE as usize];
		self.dev.read(blk, &mut buf)?;
		let off = slot * INODE_SIZE;
		buf[off..off + INODE_SIZE].copy_from_slice(unsafe { as_bytes(inode) });
		self.dev.write(blk, &buf)
	}

	/// Clears inode `ino`'s on-disk slot (all-zero, `valid = 0`).
	pub(crate) fn clear_inode_slot(&mut self, ino: u32) -> FsResult<()> {
		self.write_inode(ino, &DiskInode::empty())
	}

	/// Maps logical block `l` of `inode` to a data-region-relative block
	/// number, without allocating.
	pub(crate) fn map_logical_block(
		&mut self,
		inode: &DiskInode,
		l: usize,
	) -> FsResult<Option<u32>> {
		if l < NUM_DIRECT {
			let p = inode.direct_ptr[l];
			Ok((p >= 0).then_some(p as u32))
		} else {
			let l2 = l - NUM_DIRECT;
			let i = l2 / PTRS_PER_INDIRECT_BLOCK;
			let j = l2 % PTRS_PER_INDIRECT_BLOCK;
			let ind = inode.indirect_ptr[i];
			if ind < 0 {
				return Ok(None);
			}
			let block = IndirectBlock::read_from(self, ind as u32)?;
			let p = block.ptr[j];
			Ok((p >= 0).then_some(p as u32))
		}
	}

	/// Returns the data-region-relative block number backing logical block
	/// `l` of `inode`, allocating (and zeroing) it first if unmapped.
	///
	/// Persists any newly allocated indirect-pointer block, and the inode
	/// itself, in the required order: new data block written before its
	/// parent pointer is updated; indirect block written before the inode
	/// that points to it.
	pub(crate) fn block_for_write(
		&mut self,
		ino: u32,
		inode: &mut DiskInode,
		l: usize,
	) -> FsResult<u32> {
		if l < NUM_DIRECT {
			if inode.direct_ptr[l] < 0 {
				let bno = self.alloc_block()?;
				let zero = vec![0u8; BLOCK_SIZE as usize];
				self.write_data_block(bno, &zero)?;
				inode.direct_ptr[l] = bno as i32;
				self.write_inode(ino, inode)?;
			}
			Ok(inode.direct_ptr[l] as u32)
		} else {
			let l2 = l - NUM_DIRECT;
			let i = l2 / PTRS_PER_INDIRECT_BLOCK;
			let j = l2 % PTRS_PER_INDIRECT_BLOCK;

			if inode.indirect_ptr[i] < 0 {
				let ind_bno = self.alloc_block()?;
				IndirectBlock::empty().write_to(self, ind_bno)?;
				inode.indirect_ptr[i] = ind_bno as i32;
				self.write_inode(ino, inode)?;
			}
			let ind_bno = inode.indirect_ptr[i] as u32;
			let mut block = IndirectBlock::read_from(self, ind_bno)?;
			if block.ptr[j] < 0 {
				let bno = self.alloc_block()?;
				let zero = vec![0u8; BLOCK_SIZE as usize];
				self.write_data_block(bno, &zero)?;
				block.ptr[j] = bno as i32;
				block.write_to(self, ind_bno)?;
			}
			Ok(block.ptr[j] as u32)
		}
	}

	/// Frees every data block and indirect-pointer block reachable from
	/// `inode`, in allocate-ordering's mirror: zero the pointer, then clear
	/// the bit.
	pub(crate) fn free_all_blocks(&mut self, inode: &DiskInode) -> FsResult<()> {
		for i in 0..NUM_DIRECT {
			if inode.direct_ptr[i] >= 0 {
				self.free_block(inode.direct_ptr[i] as u32)?;
			}
		}
		for i in 0..NUM_INDIRECT {
			let ind = inode.indirect_ptr[i];
			if ind < 0 {
				continue;
			}
			let block = IndirectBlock::read_from(self, ind as u32)?;
			for p in block.ptr {
				if p >= 0 {
					self.free_block(p as u32)?;
				}
			}
			self.free_block(ind as u32)?;
		}
		Ok(())
	}

	/// Counts the data blocks currently reachable from `inode`.
	pub(crate) fn mapped_block_count(&mut self, inode: &DiskInode) -> FsResult<usize> {
		let mut walk = PointerWalk::new(inode);
		let mut n = 0;
		while walk.next(self)?.is_some() {
			n += 1;
		}
		Ok(n)
	}

	/// Unmaps logical block `l` of `inode` (clearing the owning direct or
	/// indirect-block slot) and frees its bit, zeroing the pointer before
	/// the bit is cleared.
	pub(crate) fn unmap_block(&mut self, ino: u32, inode: &mut DiskInode, l: usize) -> FsResult<u32> {
		let freed = if l < NUM_DIRECT {
			let bno = inode.direct_ptr[l] as u32;
			inode.direct_ptr[l] = -1;
			self.write_inode(ino, inode)?;
			bno
		} else {
			let l2 = l - NUM_DIRECT;
			let i = l2 / PTRS_PER_INDIRECT_BLOCK;
			let j = l2 % PTRS_PER_INDIRECT_BLOCK;
			let ind_bno = inode.indirect_ptr[i] as u32;
			let mut block = IndirectBlock::read_from(self, ind_bno)?;
			let bno = block.ptr[j] as u32;
			block.ptr[j] = -1;
			block.write_to(self, ind_bno)?;
			bno
		};
		self.free_block(freed)?;
		Ok(freed)
	}

	/// Allocates the root inode (number 0) as an empty directory. Callers
	/// still need to add `/`, `.`, `..` through the directory engine.
	pub(crate) fn init_root(&mut self) -> FsResult<()> {
		let ino = self.alloc_inode()?;
		debug_assert_eq!(ino, ROOT_INO);
		let inode = DiskInode::new(ino, FileType::Directory, 0o755);
		self.write_inode(ino, &inode)?;
		self.dir_add(ino, ino, "/")?;
		self.dir_add(ino, ino, ".")?;
		self.dir_add(ino, ino, "..")?;
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::tempdir;

	#[test]
	fn write_then_read_inode_round_trips() {
		let dir = tempdir().unwrap();
		let path = dir.path().join("DISKFILE");
		let mut fs = FileSystem::format(&path).unwrap();

		let ino = fs.alloc_inode().unwrap();
		let inode = DiskInode::new(ino, FileType::File, 0o644);
		fs.write_inode(ino, &inode).unwrap();
		let back = fs.read_inode(ino).unwrap();
		assert!(back.is_valid());
		assert_eq!(back.kind(), FileType::File);
		assert_eq!({ back.attrs.mode }, 0o644);
	}

	#[test]
	fn write_inode_preserves_sibling_slots() {
		let dir = tempdir().unwrap();
		let path = dir.path().join("DISKFILE");
		let mut fs = FileSystem::format(&path).unwrap();

		let a = fs.alloc_inode().unwrap();
		let b = fs.alloc_inode().unwrap();
		fs.write_inode(a, &DiskInode::new(a, FileType::File, 0o600))
			.unwrap();
		fs.write_inode(b, &DiskInode::new(b, FileType::Directory, 0o755))
			.unwrap();

		let a_back = fs.read_inode(a).unwrap();
		let b_back = fs.read_inode(b).unwrap();
		assert_eq!(a_back.kind(), FileType::File);
		assert_eq!(b_back.kind(), FileType::Directory);
	}

	#[test]
	fn block_for_write_crosses_into_indirect_region() {
		let dir = tempdir().unwrap();
		let path = dir.path().join("DISKFILE");
		let mut fs = FileSystem::format(&path).unwrap();

		let ino = fs.alloc_inode().unwrap();
		let mut inode = DiskInode::new(ino, FileType::File, 0o644);
		// Fill all 16 direct slots.
		for l in 0..NUM_DIRECT {
			fs.block_for_write(ino, &mut inode, l).unwrap();
		}
		let indirect = inode.indirect_ptr;
		assert!(indirect.iter().all(|&p| p < 0));

		// The 17th block must cross into the first indirect pointer block.
		fs.block_for_write(ino, &mut inode, NUM_DIRECT).unwrap();
		assert!(inode.indirect_ptr[0] >= 0);
	}

	#[test]
	fn pointer_walk_stops_at_first_gap() {
		let dir = tempdir().unwrap();
		let path = dir.path().join("DISKFILE");
		let mut fs = FileSystem::format(&path).unwrap();

		let ino = fs.alloc_inode().unwrap();
		let mut inode = DiskInode::new(ino, FileType::File, 0o644);
		fs.block_for_write(ino, &mut inode, 0).unwrap();
		fs.block_for_write(ino, &mut inode, 1).unwrap();

		let mut walk = PointerWalk::new(&inode);
		assert!(walk.next(&mut fs).unwrap().is_some());
		assert!(walk.next(&mut fs).unwrap().is_some());
		assert!(walk.next(&mut fs).unwrap().is_none());
	}
}

//! The `fuser::Filesystem` adapter: translates FUSE's inode-indexed,
//! 1-based protocol onto the engine's path-based, 0-based (root = 0) one.
//!
//! FUSE inode numbers are this design's inode numbers plus one, since
//! `fuser` reserves `0` as "no inode" and fixes the root at `1`. Every
//! method on this type converts at its boundary and nowhere else.
//! `lookup(parent, name)` is exactly one step of `namei`'s component walk.

use std::ffi::OsStr;
use std::path::Path;
use std::time::Duration;

use fuser::{
	FileAttr, FileType as FuseFileType, Filesystem, ReplyAttr, ReplyCreate, ReplyData,
	ReplyDirectory, ReplyEmpty, ReplyEntry, ReplyStatfs, ReplyWrite, Request,
};
use log::{debug, info};

use crate::inode::{DiskInode, FileType};
use crate::layout::FileSystem;

const TTL: Duration = Duration::from_secs(1);

fn to_fuse_ino(ino: u32) -> u64 {
	ino as u64 + 1
}

fn to_engine_ino(fuse_ino: u64) -> u32 {
	(fuse_ino - 1) as u32
}

fn file_attr(fuse_ino: u64, inode: &DiskInode) -> FileAttr {
	let kind = match inode.kind() {
		FileType::Directory => FuseFileType::Directory,
		FileType::File => FuseFileType::RegularFile,
	};
	let atime = std::time::UNIX_EPOCH + Duration::new(inode.attrs.atime_sec as u64, inode.attrs.atime_nsec);
	let mtime = std::time::UNIX_EPOCH + Duration::new(inode.attrs.mtime_sec as u64, inode.attrs.mtime_nsec);
	let ctime = std::time::UNIX_EPOCH + Duration::new(inode.attrs.ctime_sec as u64, inode.attrs.ctime_nsec);
	let nlink = if inode.kind() == FileType::Directory {
		inode.link.max(2)
	} else {
		1
	};
	FileAttr {
		ino: fuse_ino,
		size: inode.size as u64,
		blocks: (inode.size as u64).div_ceil(inode.attrs.blksize as u64),
		atime,
		mtime,
		ctime,
		crtime: ctime,
		kind,
		perm: inode.attrs.mode,
		nlink,
		uid: inode.attrs.uid,
		gid: inode.attrs.gid,
		rdev: 0,
		blksize: inode.attrs.blksize,
		flags: 0,
	}
}

/// Owns the mounted `FileSystem` session and implements `fuser::Filesystem`
/// against it.
pub struct TinyFs {
	fs: FileSystem,
}

impl TinyFs {
	pub fn new(fs: FileSystem) -> Self {
		Self { fs }
	}

	fn lookup_child(&mut self, parent_ino: u32, name: &str) -> Result<(u32, DiskInode), i32> {
		let child = self.fs.dir_find(parent_ino, name).map_err(|e| e.to_errno())?;
		let inode = self.fs.read_inode(child).map_err(|e| e.to_errno())?;
		Ok((child, inode))
	}
}

impl Filesystem for TinyFs {
	fn init(
		&mut self,
		_req: &Request<'_>,
		_config: &mut fuser::KernelConfig,
	) -> Result<(), libc::c_int> {
		debug!("mounted");
		Ok(())
	}

	fn destroy(&mut self) {
		debug!("unmounted");
	}

	fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
		let parent_ino = to_engine_ino(parent);
		let Some(name) = name.to_str() else {
			reply.error(libc::EINVAL);
			return;
		};
		match self.lookup_child(parent_ino, name) {
			Ok((ino, inode)) => reply.entry(&TTL, &file_attr(to_fuse_ino(ino), &inode), 0),
			Err(errno) => reply.error(errno),
		}
	}

	fn getattr(&mut self, _req: &Request<'_>, ino: u64, reply: ReplyAttr) {
		match self.fs.read_inode(to_engine_ino(ino)) {
			Ok(inode) => reply.attr(&TTL, &file_attr(ino, &inode)),
			Err(e) => reply.error(e.to_errno()),
		}
	}

	fn setattr(
		&mut self,
		_req: &Request<'_>,
		ino: u64,
		_mode: Option<u32>,
		_uid: Option<u32>,
		_gid: Option<u32>,
		_size: Option<u64>,
		atime: Option<fuser::TimeOrNow>,
		mtime: Option<fuser::TimeOrNow>,
		_ctime: Option<std::time::SystemTime>,
		_fh: Option<u64>,
		_crtime: Option<std::time::SystemTime>,
		_chgtime: Option<std::time::SystemTime>,
		_bkuptime: Option<std::time::SystemTime>,
		_flags: Option<u32>,
		reply: ReplyAttr,
	) {
		let engine_ino = to_engine_ino(ino);
		let as_pair = |t: fuser::TimeOrNow| match t {
			fuser::TimeOrNow::SpecificTime(t) => {
				let d = t.duration_since(std::time::UNIX_EPOCH).unwrap_or_default();
				(d.as_secs() as i64, d.subsec_nanos())
			}
			fuser::TimeOrNow::Now => crate::util::now(),
		};

		let mut inode = match self.fs.read_inode(engine_ino) {
			Ok(i) => i,
			Err(e) => return reply.error(e.to_errno()),
		};
		if let Some(t) = atime {
			let (s, n) = as_pair(t);
			inode.attrs.atime_sec = s;
			inode.attrs.atime_nsec = n;
		}
		if let Some(t) = mtime {
			let (s, n) = as_pair(t);
			inode.attrs.mtime_sec = s;
			inode.attrs.mtime_nsec = n;
		}
		match self.fs.write_inode(engine_ino, &inode) {
			Ok(()) => reply.attr(&TTL, &file_attr(ino, &inode)),
			Err(e) => reply.error(e.to_errno()),
		}
	}

	fn mkdir(
		&mut self,
		_req: &Request<'_>,
		parent: u64,
		name: &OsStr,
		mode: u32,
		_umask: u32,
		reply: ReplyEntry,
	) {
		let parent_ino = to_engine_ino(parent);
		let Some(name) = name.to_str() else {
			reply.error(libc::EINVAL);
			return;
		};
		match self.fs.mkdir_in(parent_ino, name, mode as u16) {
			Ok(ino) => match self.fs.read_inode(ino) {
				Ok(inode) => reply.entry(&TTL, &file_attr(to_fuse_ino(ino), &inode), 0),
				Err(e) => reply.error(e.to_errno()),
			},
			Err(e) => reply.error(e.to_errno()),
		}
	}

	fn rmdir(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
		let parent_ino = to_engine_ino(parent);
		let Some(name) = name.to_str() else {
			reply.error(libc::EINVAL);
			return;
		};
		match self.fs.rmdir_in(parent_ino, name) {
			Ok(()) => reply.ok(),
			Err(e) => reply.error(e.to_errno()),
		}
	}

	fn create(
		&mut self,
		_req: &Request<'_>,
		parent: u64,
		name: &OsStr,
		mode: u32,
		_umask: u32,
		_flags: i32,
		reply: ReplyCreate,
	) {
		let parent_ino = to_engine_ino(parent);
		let Some(name) = name.to_str() else {
			reply.error(libc::EINVAL);
			return;
		};
		match self.fs.create_in(parent_ino, name, mode as u16) {
			Ok(ino) => match self.fs.read_inode(ino) {
				Ok(inode) => reply.created(&TTL, &file_attr(to_fuse_ino(ino), &inode), 0, 0, 0),
				Err(e) => reply.error(e.to_errno()),
			},
			Err(e) => reply.error(e.to_errno()),
		}
	}

	fn unlink(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
		let parent_ino = to_engine_ino(parent);
		let Some(name) = name.to_str() else {
			reply.error(libc::EINVAL);
			return;
		};
		match self.fs.unlink_in(parent_ino, name) {
			Ok(()) => reply.ok(),
			Err(e) => reply.error(e.to_errno()),
		}
	}

	fn open(&mut self, _req: &Request<'_>, _ino: u64, _flags: i32, reply: fuser::ReplyOpen) {
		reply.opened(0, 0);
	}

	fn opendir(&mut self, _req: &Request<'_>, _ino: u64, _flags: i32, reply: fuser::ReplyOpen) {
		reply.opened(0, 0);
	}

	fn releasedir(
		&mut self,
		_req: &Request<'_>,
		_ino: u64,
		_fh: u64,
		_flags: i32,
		reply: ReplyEmpty,
	) {
		reply.ok();
	}

	fn read(
		&mut self,
		_req: &Request<'_>,
		ino: u64,
		_fh: u64,
		offset: i64,
		size: u32,
		_flags: i32,
		_lock_owner: Option<u64>,
		reply: ReplyData,
	) {
		let engine_ino = to_engine_ino(ino);
		let mut buf = vec![0u8; size as usize];
		match self.fs.read_ino(engine_ino, offset as u64, &mut buf) {
			Ok(n) => reply.data(&buf[..n]),
			Err(e) => reply.error(e.to_errno()),
		}
	}

	fn write(
		&mut self,
		_req: &Request<'_>,
		ino: u64,
		_fh: u64,
		offset: i64,
		data: &[u8],
		_write_flags: u32,
		_flags: i32,
		_lock_owner: Option<u64>,
		reply: ReplyWrite,
	) {
		let engine_ino = to_engine_ino(ino);
		match self.fs.write_ino(engine_ino, offset as u64, data) {
			Ok(n) => reply.written(n as u32),
			Err(e) => reply.error(e.to_errno()),
		}
	}

	fn readdir(
		&mut self,
		_req: &Request<'_>,
		ino: u64,
		_fh: u64,
		offset: i64,
		mut reply: ReplyDirectory,
	) {
		let engine_ino = to_engine_ino(ino);
		let entries = match self.fs.dir_list(engine_ino) {
			Ok(e) => e,
			Err(e) => return reply.error(e.to_errno()),
		};
		for (i, (child_ino, name)) in entries.into_iter().enumerate().skip(offset as usize) {
			let kind = match self.fs.read_inode(child_ino) {
				Ok(inode) if inode.kind() == FileType::Directory => FuseFileType::Directory,
				_ => FuseFileType::RegularFile,
			};
			if reply.add(to_fuse_ino(child_ino), (i + 1) as i64, kind, &name) {
				break;
			}
		}
		reply.ok();
	}

	fn statfs(&mut self, _req: &Request<'_>, _ino: u64, reply: ReplyStatfs) {
		match self.fs.statfs() {
			Ok(s) => reply.statfs(
				s.total_blocks as u64,
				s.free_blocks as u64,
				s.free_blocks as u64,
				s.total_inodes as u64,
				s.free_inodes as u64,
				s.block_size,
				255,
				s.block_size,
			),
			Err(e) => reply.error(e.to_errno()),
		}
	}
}

/// Mounts `fs` at `mountpoint` with the given raw `-o` mount options,
/// blocking until the file system is unmounted.
pub fn mount(fs: FileSystem, mountpoint: &Path, options: Vec<fuser::MountOption>) -> std::io::Result<()> {
	info!("mounting at {}", mountpoint.display());
	fuser::mount2(TinyFs::new(fs), mountpoint, &options)
}

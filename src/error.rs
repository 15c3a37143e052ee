//! Error taxonomy for the file system engine.
//!
//! Every internal operation returns `Result<T, FsError>`. The FUSE adapter
//! translates each variant into a POSIX errno at the reply boundary; the CLI
//! translates `BadFs` into a non-zero process exit since it can only occur
//! before a mount session exists.

use std::fmt;
use std::io;

/// A tagged error covering every failure mode the engine can report.
#[derive(Debug)]
pub enum FsError {
	/// The inode or data-block bitmap has no clear bit left.
	NoSpace,
	/// The block device failed to read or write a block.
	Io(io::Error),
	/// A path component (or a `dir_find` lookup) did not resolve.
	NotFound,
	/// `dir_add` found an entry already using the requested name.
	Exists,
	/// `rmdir` was called on a directory with entries besides `/`, `.`, `..`.
	NotEmpty,
	/// A read or write range exceeds `144 * B`.
	TooLarge,
	/// The superblock's magic number did not match on mount.
	BadFs,
}

impl fmt::Display for FsError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::NoSpace => write!(f, "no space left on device"),
			Self::Io(e) => write!(f, "I/O error: {e}"),
			Self::NotFound => write!(f, "no such file or directory"),
			Self::Exists => write!(f, "file exists"),
			Self::NotEmpty => write!(f, "directory not empty"),
			Self::TooLarge => write!(f, "file too large"),
			Self::BadFs => write!(f, "bad magic number: not a tinyfs image"),
		}
	}
}

impl std::error::Error for FsError {
	fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
		match self {
			Self::Io(e) => Some(e),
			_ => None,
		}
	}
}

impl From<io::Error> for FsError {
	fn from(e: io::Error) -> Self {
		Self::Io(e)
	}
}

impl FsError {
	/// Maps this error onto the errno the FUSE boundary should reply with.
	pub fn to_errno(&self) -> i32 {
		match self {
			Self::NoSpace => libc::ENOSPC,
			Self::Io(_) => libc::EIO,
			Self::NotFound => libc::ENOENT,
			Self::Exists => libc::EEXIST,
			Self::NotEmpty => libc::ENOTEMPTY,
			Self::TooLarge => libc::EFBIG,
			// Should never reach a live FUSE reply; mount() fails first.
			Self::BadFs => libc::EIO,
		}
	}
}

pub type FsResult<T> = Result<T, FsError>;

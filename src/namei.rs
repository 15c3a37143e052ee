//! Path resolution: splits a path on `/` and walks `dir_find` component by
//! component, starting from the root inode.

use crate::error::{FsError, FsResult};
use crate::layout::{FileSystem, ROOT_INO};

impl FileSystem {
	/// Resolves an absolute path to an inode number by walking `dir_find`
	/// from the root, one component at a time.
	///
	/// `"/"`, `""`, and paths consisting only of `/` separators resolve to
	/// the root inode directly.
	pub fn namei(&mut self, path: &str) -> FsResult<u32> {
		let mut ino = ROOT_INO;
		for component in path.split('/').filter(|c| !c.is_empty()) {
			ino = self.dir_find(ino, component)?;
		}
		Ok(ino)
	}

	/// Resolves the parent directory and final component name of `path`,
	/// for operations that create or remove an entry (`mkdir`, `create`,
	/// `unlink`, `rmdir`).
	pub fn namei_parent<'a>(&mut self, path: &'a str) -> FsResult<(u32, &'a str)> {
		let trimmed = path.trim_end_matches('/');
		let (parent_path, name) = match trimmed.rfind('/') {
			Some(idx) => (&trimmed[..idx], &trimmed[idx + 1..]),
			None => ("", trimmed),
		};
		if name.is_empty() {
			return Err(FsError::NotFound);
		}
		let parent_ino = if parent_path.is_empty() {
			ROOT_INO
		} else {
			self.namei(parent_path)?
		};
		Ok((parent_ino, name))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::inode::{DiskInode, FileType};
	use tempfile::tempdir;

	fn new_fs() -> (tempfile::TempDir, FileSystem) {
		let dir = tempdir().unwrap();
		let path = dir.path().join("DISKFILE");
		let fs = FileSystem::format(&path).unwrap();
		(dir, fs)
	}

	#[test]
	fn root_resolves_to_root_ino() {
		let (_tmp, mut fs) = new_fs();
		assert_eq!(fs.namei("/").unwrap(), ROOT_INO);
		assert_eq!(fs.namei("").unwrap(), ROOT_INO);
	}

	#[test]
	fn nested_path_walks_each_component() {
		let (_tmp, mut fs) = new_fs();
		let sub = fs.alloc_inode().unwrap();
		fs.write_inode(sub, &DiskInode::new(sub, FileType::Directory, 0o755))
			.unwrap();
		fs.dir_add(ROOT_INO, sub, "a").unwrap();

		let leaf = fs.alloc_inode().unwrap();
		fs.write_inode(leaf, &DiskInode::new(leaf, FileType::File, 0o644))
			.unwrap();
		fs.dir_add(sub, leaf, "b").unwrap();

		assert_eq!(fs.namei("/a").unwrap(), sub);
		assert_eq!(fs.namei("/a/b").unwrap(), leaf);
	}

	#[test]
	fn missing_component_is_not_found() {
		let (_tmp, mut fs) = new_fs();
		assert!(matches!(fs.namei("/nope"), Err(FsError::NotFound)));
	}

	#[test]
	fn namei_parent_splits_last_component() {
		let (_tmp, mut fs) = new_fs();
		let (parent, name) = fs.namei_parent("/foo").unwrap();
		assert_eq!(parent, ROOT_INO);
		assert_eq!(name, "foo");
	}
}

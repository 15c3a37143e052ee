//! Black-box scenarios driven entirely through the path-based `ops.rs` API
//! against a temp-file-backed image, mirroring the end-to-end walkthroughs
//! this design is meant to satisfy.

use tinyfs::error::FsError;
use tinyfs::layout::{BLOCK_SIZE, FileSystem};
use tinyfs::inode::{FileType, MAX_BLOCKS_PER_FILE};

fn new_image() -> (tempfile::TempDir, std::path::PathBuf) {
	let dir = tempfile::tempdir().unwrap();
	let path = dir.path().join("DISKFILE");
	(dir, path)
}

#[test]
fn format_and_mount() {
	let (_tmp, path) = new_image();
	{
		let mut fs = FileSystem::format(&path).unwrap();
		let root = fs.getattr("/").unwrap();
		assert_eq!(root.kind(), FileType::Directory);
		assert_eq!({ root.attrs.mode }, 0o755);
		assert!({ root.link } >= 2);
	}
	let mut fs = FileSystem::mount(&path).unwrap();
	let free_inodes = fs.free_inode_count().unwrap();
	assert_eq!(free_inodes, fs.max_inum() - 1);
}

#[test]
fn create_and_readdir() {
	let (_tmp, path) = new_image();
	let mut fs = FileSystem::format(&path).unwrap();
	fs.create("/a", 0o644).unwrap();
	fs.create("/b", 0o644).unwrap();
	fs.create("/c", 0o644).unwrap();

	let mut names: Vec<_> = fs.readdir("/").unwrap().into_iter().map(|(_, n)| n).collect();
	names.sort();
	let mut expected = vec!["/", ".", "..", "a", "b", "c"];
	expected.sort();
	assert_eq!(names, expected);
}

#[test]
fn write_remount_read() {
	let (_tmp, path) = new_image();
	{
		let mut fs = FileSystem::format(&path).unwrap();
		fs.create("/x", 0o644).unwrap();
		fs.write("/x", 0, b"HELLO").unwrap();
	}
	let mut fs = FileSystem::mount(&path).unwrap();
	let attrs = fs.getattr("/x").unwrap();
	assert_eq!({ attrs.size }, 5);

	let mut buf = [0u8; 5];
	assert_eq!(fs.read("/x", 0, &mut buf).unwrap(), 5);
	assert_eq!(&buf, b"HELLO");
}

#[test]
fn straddling_write_covers_three_blocks() {
	let (_tmp, path) = new_image();
	let mut fs = FileSystem::format(&path).unwrap();
	fs.create("/y", 0o644).unwrap();

	let data = vec![0u8; 8192];
	let offset = BLOCK_SIZE as u64 - 1;
	fs.write("/y", offset, &data).unwrap();

	let inode = fs.getattr("/y").unwrap();
	assert_eq!({ inode.size } as u64, offset + 8192);
	assert!(inode.direct_ptr[0] >= 0);
	assert!(inode.direct_ptr[1] >= 0);
	assert!(inode.direct_ptr[2] >= 0);
}

#[test]
fn deep_directories_rmdir_ordering() {
	let (_tmp, path) = new_image();
	let mut fs = FileSystem::format(&path).unwrap();
	fs.mkdir("/d1", 0o755).unwrap();
	fs.mkdir("/d1/d2", 0o755).unwrap();
	fs.mkdir("/d1/d2/d3", 0o755).unwrap();

	let mut names: Vec<_> = fs.readdir("/d1/d2").unwrap().into_iter().map(|(_, n)| n).collect();
	names.sort();
	let mut expected = vec!["/", ".", "..", "d3"];
	expected.sort();
	assert_eq!(names, expected);

	assert!(matches!(fs.rmdir("/d1/d2"), Err(FsError::NotEmpty)));
	fs.rmdir("/d1/d2/d3").unwrap();
	fs.rmdir("/d1/d2").unwrap();
	fs.rmdir("/d1").unwrap();
}

#[test]
fn allocator_saturation_and_recovery() {
	let (_tmp, path) = new_image();
	let mut fs = FileSystem::format(&path).unwrap();

	fs.create("/filler", 0o644).unwrap();
	let free = fs.free_block_count().unwrap();
	let data = vec![1u8; BLOCK_SIZE as usize];
	let mut written = 0u64;
	while (written / BLOCK_SIZE as u64) < free as u64 {
		fs.write("/filler", written, &data).unwrap();
		written += BLOCK_SIZE as u64;
		if (written / BLOCK_SIZE as u64) as usize >= MAX_BLOCKS_PER_FILE {
			break;
		}
	}

	fs.create("/overflow", 0o644).unwrap();
	let r = fs.write("/overflow", 0, b"x");
	if fs.free_block_count().unwrap() == 0 {
		assert!(matches!(r, Err(FsError::NoSpace)));

		fs.unlink("/filler").unwrap();
		assert!(fs.free_block_count().unwrap() > 0);
		fs.write("/overflow", 0, b"x").unwrap();
	}
}

#[test]
fn round_trip_mkdir_rmdir_restores_counts() {
	let (_tmp, path) = new_image();
	let mut fs = FileSystem::format(&path).unwrap();

	let free_inodes_before = fs.free_inode_count().unwrap();
	let free_blocks_before = fs.free_block_count().unwrap();

	fs.mkdir("/tmp", 0o755).unwrap();
	fs.rmdir("/tmp").unwrap();

	assert_eq!(fs.free_inode_count().unwrap(), free_inodes_before);
	assert_eq!(fs.free_block_count().unwrap(), free_blocks_before);
}

#[test]
fn round_trip_create_unlink_restores_counts() {
	let (_tmp, path) = new_image();
	let mut fs = FileSystem::format(&path).unwrap();

	let free_inodes_before = fs.free_inode_count().unwrap();
	let free_blocks_before = fs.free_block_count().unwrap();

	fs.create("/f", 0o644).unwrap();
	fs.write("/f", 0, &vec![9u8; BLOCK_SIZE as usize]).unwrap();
	fs.unlink("/f").unwrap();

	assert_eq!(fs.free_inode_count().unwrap(), free_inodes_before);
	assert_eq!(fs.free_block_count().unwrap(), free_blocks_before);
}

//! A small block-based file system: fixed-size blocks, a bitmap allocator,
//! direct/indirect pointer inodes, and packed directory entries, exposed
//! through a FUSE mount point.

pub mod alloc;
pub mod bitmap;
pub mod block;
pub mod dirent;
pub mod error;
pub mod fuse_fs;
pub mod inode;
pub mod layout;
pub mod namei;
pub mod ops;
pub mod util;

pub use error::{FsError, FsResult};
pub use layout::FileSystem;

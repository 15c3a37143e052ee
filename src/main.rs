//! `tinyfs` command-line entry point: parses mount flags the way the
//! teacher's own tools walk `ArgsOs` by hand, formats the backing image on
//! first use, then hands the mounted session to the FUSE loop.

use std::env;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use fuser::MountOption;
use tinyfs::FileSystem;

struct Args {
	mountpoint: PathBuf,
	image: PathBuf,
	foreground: bool,
	debug: bool,
	options: Vec<MountOption>,
}

fn print_usage() {
	eprintln!("usage: tinyfs [-f] [-d] [-o OPT[,OPT...]] [--image PATH] <mountpoint>");
}

fn error(msg: &str) -> ! {
	eprintln!("tinyfs: {msg}");
	std::process::exit(1);
}

fn parse_args() -> Args {
	let mut mountpoint = None;
	let mut image = PathBuf::from("DISKFILE");
	let mut foreground = false;
	let mut debug = false;
	let mut options = Vec::new();

	let mut args = env::args_os();
	args.next();
	while let Some(arg) = args.next() {
		let Some(arg) = arg.to_str() else {
			error("argument is not valid UTF-8");
		};
		match arg {
			"-f" => foreground = true,
			"-d" => debug = true,
			"--image" => {
				let Some(path) = args.next() else {
					error("--image requires a path");
				};
				image = PathBuf::from(path);
			}
			"-o" => {
				let Some(opts) = args.next().and_then(|s| s.into_string().ok()) else {
					error("-o requires a comma-separated option list");
				};
				for opt in opts.split(',') {
					options.push(match opt {
						"ro" => MountOption::RO,
						"rw" => MountOption::RW,
						"allow_other" => MountOption::AllowOther,
						"allow_root" => MountOption::AllowRoot,
						other => MountOption::CUSTOM(other.to_string()),
					});
				}
			}
			_ if mountpoint.is_none() => mountpoint = Some(PathBuf::from(arg)),
			_ => {
				print_usage();
				std::process::exit(1);
			}
		}
	}

	let Some(mountpoint) = mountpoint else {
		print_usage();
		std::process::exit(1);
	};

	Args {
		mountpoint,
		image,
		foreground,
		debug,
		options,
	}
}

fn open_or_format(image: &Path) -> FileSystem {
	if !image.exists() {
		return FileSystem::format(image).unwrap_or_else(|e| error(&format!("format failed: {e}")));
	}
	FileSystem::mount(image).unwrap_or_else(|e| error(&format!("{}: {e}", image.display())))
}

fn main() -> ExitCode {
	env_logger::init();
	let args = parse_args();
	if args.debug {
		log::set_max_level(log::LevelFilter::Debug);
	}
	if args.foreground {
		log::info!("running in foreground, image {}", args.image.display());
	}

	let fs = open_or_format(&args.image);

	let mut options = args.options;
	options.push(MountOption::FSName("tinyfs".to_string()));

	match tinyfs::fuse_fs::mount(fs, &args.mountpoint, options) {
		Ok(()) => ExitCode::SUCCESS,
		Err(e) => {
			eprintln!("tinyfs: mount failed: {e}");
			ExitCode::FAILURE
		}
	}
}

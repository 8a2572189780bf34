//! Running code inside another network namespace.
//!
//! The network namespace is a property of the OS thread, so work that must
//! happen "inside" runs on a dedicated thread that enters the namespace
//! first and is discarded afterwards. Nothing else is ever scheduled on it.

use std::{
	fs::File,
	io,
	os::unix::io::AsRawFd,
	path::{Path, PathBuf},
	thread,
};

use log::debug;
use nix::sched::{setns, CloneFlags};

use crate::error::{AppError, AppResult};

#[derive(Debug)]
pub struct NetNs {
	path: PathBuf,
	file: File,
}

impl NetNs {
	/// Opens a namespace by path, e.g. `/var/run/netns/<name>` or
	/// `/proc/<pid>/ns/net`.
	pub fn open(path: &Path) -> io::Result<Self> {
		let file = File::open(path)?;
		debug!("opened netns {} as fd {}", path.display(), file.as_raw_fd());
		Ok(Self {
			path: path.to_owned(),
			file,
		})
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	fn error(&self, err: impl Into<gofer_cni::error::BoxError>) -> AppError {
		AppError::Namespace {
			path: self.path.clone(),
			err: err.into(),
		}
	}

	/// Runs `f` on a fresh thread that has entered this namespace, and waits
	/// for it.
	///
	/// Blocks the calling thread. Anything `f` creates that's bound to a
	/// namespace at creation time (sockets, links) belongs to this one.
	pub fn run<F, T>(&self, f: F) -> AppResult<T>
	where
		F: FnOnce() -> AppResult<T> + Send + 'static,
		T: Send + 'static,
	{
		let fd = self.file.as_raw_fd();
		let path = self.path.clone();

		let worker = thread::Builder::new()
			.name("netns".into())
			.spawn(move || -> AppResult<T> {
				setns(fd, CloneFlags::CLONE_NEWNET).map_err(|err| AppError::Namespace {
					path,
					err: Box::new(err),
				})?;
				f()
			})
			.map_err(|err| self.error(err))?;

		// the fd stays open until after the join, as self is borrowed
		worker
			.join()
			.map_err(|_| self.error("namespace worker panicked"))?
	}
}

//! Per-container records, kept between ADD and DEL.
//!
//! One JSON file per container ID under the state directory:
//!
//! ```json
//! {"ip":"10.255.0.7","neutron_port_id":"ebe69f1e-bc26-4db5-bed0-c0afb4afe3db"}
//! ```

use std::{
	fs,
	io,
	net::IpAddr,
	path::{Path, PathBuf},
};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

#[derive(Clone, Debug, Deserialize, Serialize, Eq, PartialEq)]
pub struct AttachmentRecord {
	pub ip: IpAddr,
	pub neutron_port_id: String,
}

#[derive(Clone, Debug)]
pub struct StateStore {
	dir: PathBuf,
}

impl StateStore {
	pub fn new(dir: impl Into<PathBuf>) -> Self {
		Self { dir: dir.into() }
	}

	pub fn dir(&self) -> &Path {
		&self.dir
	}

	/// The container ID has already been checked against the runtime's ID
	/// pattern, so it can't escape the directory.
	fn path(&self, container_id: &str) -> PathBuf {
		self.dir.join(container_id)
	}

	/// Writes the record, replacing any previous one for this container.
	pub fn save(&self, container_id: &str, record: &AttachmentRecord) -> AppResult<()> {
		let path = self.path(container_id);
		debug!("state: saving {:?} to {}", record, path.display());

		fs::create_dir_all(&self.dir).map_err(|err| state_error(container_id, err))?;
		let json = serde_json::to_vec(record).map_err(|err| state_error(container_id, err))?;
		fs::write(&path, json).map_err(|err| state_error(container_id, err))?;
		Ok(())
	}

	pub fn load(&self, container_id: &str) -> AppResult<AttachmentRecord> {
		let path = self.path(container_id);
		debug!("state: loading {}", path.display());

		let bytes = fs::read(&path).map_err(|err| state_error(container_id, err))?;
		serde_json::from_slice(&bytes).map_err(|err| state_error(container_id, err))
	}

	/// Deletes the record. A missing record is an error.
	pub fn remove(&self, container_id: &str) -> AppResult<()> {
		let path = self.path(container_id);
		debug!("state: removing {}", path.display());

		fs::remove_file(&path).map_err(|err| state_error(container_id, err))
	}

	#[cfg(test)]
	pub fn exists(&self, container_id: &str) -> bool {
		self.path(container_id).is_file()
	}
}

fn state_error(
	container_id: &str,
	err: impl std::error::Error + Send + Sync + 'static,
) -> AppError {
	AppError::State {
		container_id: container_id.into(),
		err: Box::new(err),
	}
}

pub(crate) fn is_missing(err: &AppError) -> bool {
	match err {
		AppError::State { err, .. } => err
			.downcast_ref::<io::Error>()
			.map_or(false, |e| e.kind() == io::ErrorKind::NotFound),
		_ => false,
	}
}

use std::path::PathBuf;

use gofer_cni::{
	error::{BoxError, CniError},
	reply::ErrorReply,
};
use semver::Version;
use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
	#[error(transparent)]
	Cni(#[from] CniError),

	#[error("{0}")]
	Config(String),

	#[error("network namespace {path:?}: {err}")]
	Namespace {
		path: PathBuf,
		#[source]
		err: BoxError,
	},

	#[error("{step}: {err}")]
	Attachment {
		step: String,
		#[source]
		err: BoxError,
	},
}

impl AppError {
	pub fn config(msg: impl Into<String>) -> Self {
		Self::Config(msg.into())
	}

	pub fn attachment(
		step: impl Into<String>,
		err: impl Into<BoxError>,
	) -> Self {
		Self::Attachment {
			step: step.into(),
			err: err.into(),
		}
	}

	pub fn into_reply(self, cni_version: Version) -> ErrorReply<'static> {
		match self {
			Self::Cni(e) => e.into_reply(cni_version),
			e @ AppError::Config(_) => ErrorReply {
				cni_version,
				code: 7,
				msg: "Invalid network config",
				details: e.to_string(),
			},
			e @ AppError::Namespace { .. } => ErrorReply {
				cni_version,
				code: 120,
				msg: "Cannot enter network namespace",
				details: e.to_string(),
			},
			e @ AppError::Attachment { .. } => ErrorReply {
				cni_version,
				code: 121,
				msg: "Attachment failed",
				details: e.to_string(),
			},
		}
	}
}

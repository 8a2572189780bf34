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

	#[error("keystone: {0}")]
	Auth(#[source] ApiError),

	#[error("neutron {op}: {err}")]
	NeutronApi {
		op: &'static str,
		#[source]
		err: ApiError,
	},

	#[error("neutron port {port} was created with {count} fixed IPs, expected exactly one")]
	Allocation { port: String, count: usize },

	#[error("delegate: {0}")]
	Delegate(#[source] CniError),

	#[error("state for container {container_id}: {err}")]
	State {
		container_id: String,
		#[source]
		err: BoxError,
	},
}

/// Failure of a single control-plane HTTP call.
#[derive(Debug, Error)]
pub enum ApiError {
	#[error(transparent)]
	Url(#[from] url::ParseError),

	#[error("transport: {0}")]
	Transport(BoxError),

	#[error("not found")]
	NotFound,

	#[error("unexpected status {status}: {body}")]
	Status { status: u16, body: String },

	#[error("invalid response: {0}")]
	Decode(String),
}

impl ApiError {
	pub fn is_not_found(&self) -> bool {
		matches!(self, Self::NotFound)
	}
}

impl From<surf::Error> for ApiError {
	fn from(err: surf::Error) -> Self {
		Self::Transport(err.into())
	}
}

impl AppError {
	pub fn config(msg: impl Into<String>) -> Self {
		Self::Config(msg.into())
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
			e @ AppError::Auth(_) => ErrorReply {
				cni_version,
				code: 110,
				msg: "Authentication failed",
				details: e.to_string(),
			},
			e @ AppError::NeutronApi { .. } => ErrorReply {
				cni_version,
				code: 111,
				msg: "Neutron API error",
				details: e.to_string(),
			},
			e @ AppError::Allocation { .. } => ErrorReply {
				cni_version,
				code: 112,
				msg: "Address allocation failed",
				details: e.to_string(),
			},
			e @ AppError::Delegate(_) => ErrorReply {
				cni_version,
				code: 113,
				msg: "Delegate failed",
				details: e.to_string(),
			},
			e @ AppError::State { .. } => ErrorReply {
				cni_version,
				code: 114,
				msg: "Container state",
				details: e.to_string(),
			},
		}
	}
}

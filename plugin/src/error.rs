//! Framework errors and their conversion to CNI error documents.

use std::env::VarError;

use regex::Regex;
use semver::Version;
use thiserror::Error;

use crate::reply::ErrorReply;

/// Boxed error type used for sources which may cross threads.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors raised by the framework itself.
///
/// Plugins wrap this in their own error type with `#[from]` and delegate to
/// [`CniError::into_reply`] for the variants they don't own.
#[derive(Debug, Error)]
pub enum CniError {
	/// Reading STDIN or spawning a process failed.
	#[error(transparent)]
	Io(#[from] std::io::Error),

	/// A JSON document could not be (de)serialised.
	#[error(transparent)]
	Json(#[from] serde_json::Error),

	/// The configuration declares a `cniVersion` this plugin doesn't speak.
	#[error("plugin does not understand CNI version: {0}")]
	Incompatible(Version),

	/// The runtime asked for a command the legacy protocol doesn't define.
	#[error("command {0} is not supported by CNI versions 0.1.0 and 0.2.0")]
	UnsupportedCommand(&'static str),

	/// Nothing was provided on STDIN.
	#[error("missing input network config")]
	MissingInput,

	/// A required environment variable is unset.
	#[error("missing environment variable: {var}: {err}")]
	MissingEnv {
		/// Name of the variable.
		var: &'static str,
		/// Underlying error.
		#[source]
		err: VarError,
	},

	/// An environment variable is set but malformed.
	#[error("environment variable has invalid format: {var}: {err}")]
	InvalidEnv {
		/// Name of the variable.
		var: &'static str,
		/// Why it was rejected.
		#[source]
		err: BoxError,
	},

	/// The current working directory could not be read.
	#[error("cannot obtain current working directory")]
	NoCwd,

	/// The delegate plugin couldn't be found on the plugin search path.
	#[error("missing plugin {name}: {err}")]
	MissingPlugin {
		/// Name (type) of the plugin.
		name: String,
		/// Lookup error.
		#[source]
		err: which::Error,
	},

	/// A delegate plugin failed.
	#[error("delegated plugin {plugin}: {err}")]
	Delegated {
		/// Name (type) of the plugin.
		plugin: String,
		/// What went wrong.
		#[source]
		err: Box<CniError>,
	},

	/// A delegate plugin produced no output where some was expected.
	#[error("delegated plugin produced no output")]
	MissingOutput,

	/// Catch-all with a message.
	#[error("{0}")]
	Generic(String),
}

impl CniError {
	/// Converts into the error document printed on STDOUT.
	pub fn into_reply(self, cni_version: Version) -> ErrorReply<'static> {
		match self {
			Self::Io(e) => ErrorReply {
				cni_version,
				code: 5,
				msg: "I/O error",
				details: e.to_string(),
			},
			Self::Json(e) => ErrorReply {
				cni_version,
				code: 6,
				msg: "Cannot decode JSON payload",
				details: e.to_string(),
			},
			e @ Self::Incompatible(_) => ErrorReply {
				cni_version,
				code: 1,
				msg: "Incompatible CNI version",
				details: e.to_string(),
			},
			e @ Self::UnsupportedCommand(_) => ErrorReply {
				cni_version,
				code: 4,
				msg: "Unsupported command",
				details: e.to_string(),
			},
			e @ Self::MissingInput => ErrorReply {
				cni_version,
				code: 7,
				msg: "Missing payload",
				details: e.to_string(),
			},
			e @ Self::MissingEnv { .. } => ErrorReply {
				cni_version,
				code: 4,
				msg: "Missing environment variable",
				details: e.to_string(),
			},
			e @ Self::InvalidEnv { .. } => ErrorReply {
				cni_version,
				code: 4,
				msg: "Invalid environment variable",
				details: e.to_string(),
			},
			e @ Self::NoCwd => ErrorReply {
				cni_version,
				code: 5,
				msg: "Bad workdir",
				details: e.to_string(),
			},
			e @ Self::MissingPlugin { .. } => ErrorReply {
				cni_version,
				code: 5,
				msg: "Missing plugin",
				details: e.to_string(),
			},
			e @ Self::Delegated { .. } => ErrorReply {
				cni_version,
				code: 5,
				msg: "Delegated plugin failed",
				details: e.to_string(),
			},
			e @ Self::MissingOutput => ErrorReply {
				cni_version,
				code: 5,
				msg: "Missing output",
				details: e.to_string(),
			},
			e @ Self::Generic(_) => ErrorReply {
				cni_version,
				code: 100,
				msg: "ERROR",
				details: e.to_string(),
			},
		}
	}
}

/// Unknown `CNI_COMMAND` value.
#[derive(Clone, Copy, Debug, Error)]
#[error("must be one of ADD, DEL, CHECK, VERSION")]
pub struct InvalidCommandError;

/// A value that must not be empty was empty.
#[derive(Clone, Copy, Debug, Error)]
#[error("must not be empty")]
pub struct EmptyValueError;

/// A value didn't match the expected pattern.
#[derive(Clone, Debug, Error)]
#[error("must match regex: {0}")]
pub struct RegexValueError(pub Regex);

/// A `CNI_ARGS` item was not a `KEY=value` pair.
#[derive(Clone, Debug, Error)]
#[error("invalid key/value pair: {0:?}")]
pub struct ArgsPairError(pub String);

use std::str::FromStr;

use crate::error::InvalidCommandError;

/// The verb a plugin was invoked with, from `CNI_COMMAND`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Command {
	/// Attach the container to the network.
	Add,

	/// Detach the container and release what ADD acquired.
	Del,

	/// Verify an existing attachment.
	///
	/// Parsed so it can be refused with a precise error: the protocol versions
	/// spoken here predate it.
	Check,

	/// Report the supported protocol versions.
	Version,
}

impl FromStr for Command {
	type Err = InvalidCommandError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"ADD" => Ok(Self::Add),
			"DEL" => Ok(Self::Del),
			"CHECK" => Ok(Self::Check),
			"VERSION" => Ok(Self::Version),
			_ => Err(InvalidCommandError),
		}
	}
}

impl AsRef<str> for Command {
	fn as_ref(&self) -> &'static str {
		match self {
			Command::Add => "ADD",
			Command::Del => "DEL",
			Command::Check => "CHECK",
			Command::Version => "VERSION",
		}
	}
}

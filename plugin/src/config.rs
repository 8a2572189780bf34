//! The network configuration payload.
//!
//! Only the well-known header is read here. Each plugin parses the rest
//! itself, so a malformed document is reported as that plugin's
//! configuration error.

use semver::Version;
use serde::Deserialize;

use crate::version::default_version;

/// Raw configuration from STDIN, with the header fields pre-read.
#[derive(Clone, Debug)]
pub struct Payload {
	/// Declared `cniVersion`, or the oldest legacy version when absent or
	/// unreadable.
	pub cni_version: Version,

	/// Declared network `name`, if any.
	pub name: Option<String>,

	/// Whether `cniVersion` was present and parseable.
	pub(crate) declared_version: bool,

	/// The document exactly as received.
	pub bytes: Vec<u8>,
}

#[derive(Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Header {
	#[serde(default)]
	cni_version: Option<String>,
	#[serde(default)]
	name: Option<String>,
}

impl Payload {
	/// Reads the header leniently; never fails.
	pub fn new(bytes: Vec<u8>) -> Self {
		let header: Header = serde_json::from_slice(&bytes).unwrap_or_default();
		let parsed = header
			.cni_version
			.as_deref()
			.and_then(|v| Version::parse(v).ok());

		Self {
			declared_version: parsed.is_some(),
			cni_version: parsed.unwrap_or_else(default_version),
			name: header.name,
			bytes,
		}
	}
}

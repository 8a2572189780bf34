//! Result and error documents, and the final write to STDOUT.

use std::{io::stdout, net::IpAddr, process::exit};

use ipnetwork::IpNetwork;
use log::debug;
use semver::Version;
use serde::{Deserialize, Serialize};

pub use crate::version::VersionReply;

/// A document a plugin can end its life by printing.
pub trait ReplyPayload<'de>: std::fmt::Debug + Serialize + Deserialize<'de> {
	/// The process exit code that goes with this document.
	fn code(&self) -> i32 {
		0
	}
}

/// The error document.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorReply<'msg> {
	/// Protocol version of the invocation.
	#[serde(deserialize_with = "crate::version::deserialize_version")]
	#[serde(serialize_with = "crate::version::serialize_version")]
	pub cni_version: Version,

	/// Error code; also used as the exit code.
	pub code: i32,

	/// Short summary.
	pub msg: &'msg str,

	/// Full error message.
	pub details: String,
}

impl<'de> ReplyPayload<'de> for ErrorReply<'de> {
	fn code(&self) -> i32 {
		self.code
	}
}

/// Success result for protocol versions 0.1.0 and 0.2.0.
///
/// ```json
/// {"ip4": {"ip": "10.255.0.7/32", "routes": [{"dst": "10.255.0.0/16"}]}, "dns": {}}
/// ```
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct LegacyReply {
	/// IPv4 configuration.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub ip4: Option<IpConfigReply>,

	/// IPv6 configuration.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub ip6: Option<IpConfigReply>,

	/// DNS settings; always present, possibly empty.
	#[serde(default)]
	pub dns: DnsReply,
}

impl<'de> ReplyPayload<'de> for LegacyReply {}

/// Address configuration of one family.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct IpConfigReply {
	/// Assigned address with its prefix.
	pub ip: IpNetwork,

	/// Default gateway, if any.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub gateway: Option<IpAddr>,

	/// Routes installed, in order.
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub routes: Vec<RouteReply>,
}

/// DNS settings.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct DnsReply {
	/// Nameservers, priority-ordered.
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub nameservers: Vec<IpAddr>,

	/// Local domain.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub domain: Option<String>,

	/// Search domains.
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub search: Vec<String>,

	/// Resolver options.
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub options: Vec<String>,
}

/// A route.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct RouteReply {
	/// Destination network.
	pub dst: IpNetwork,

	/// Next hop; absent for on-link routes.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub gw: Option<IpAddr>,
}

/// Prints the document on STDOUT and exits with its code.
pub fn reply<'de, T>(result: T) -> !
where
	T: ReplyPayload<'de>,
{
	debug!("replying with {:#?}", result);
	serde_json::to_writer(stdout(), &result)
		.expect("Error writing result to stdout... chances are you won't get this either");

	exit(result.code());
}

//! MAC addresses.

use std::{fmt, net::Ipv4Addr, str::FromStr};

use macaddr::{MacAddr6, ParseError};
use serde::{de::Error, Deserialize, Deserializer, Serialize, Serializer};

/// Prefix of MACs derived from IPv4 addresses: locally administered, unicast.
const DERIVED_PREFIX: [u8; 2] = [0x0a, 0x58];

/// A MAC address, (de)serialised as its `aa:bb:cc:dd:ee:ff` string form.
#[derive(Debug, Default, Hash, Eq, PartialEq, Ord, PartialOrd, Copy, Clone)]
pub struct MacAddr(pub MacAddr6);

impl MacAddr {
	/// Derives a stable MAC from an IPv4 address: `0a:58:` then the four
	/// octets.
	///
	/// Two interfaces get the same MAC only if they get the same address, so
	/// no separate MAC allocation is needed.
	pub fn from_ipv4(ip: Ipv4Addr) -> Self {
		let [a, b, c, d] = ip.octets();
		Self(MacAddr6::new(DERIVED_PREFIX[0], DERIVED_PREFIX[1], a, b, c, d))
	}

	/// The address a MAC was derived from with [`from_ipv4`](Self::from_ipv4),
	/// or `None` if it wasn't derived that way.
	pub fn derived_ipv4(&self) -> Option<Ipv4Addr> {
		match *self.0.as_bytes() {
			[p0, p1, a, b, c, d] if [p0, p1] == DERIVED_PREFIX => Some(Ipv4Addr::new(a, b, c, d)),
			_ => None,
		}
	}

	/// The six raw bytes.
	pub fn as_bytes(&self) -> &[u8] {
		self.0.as_bytes()
	}
}

impl From<MacAddr6> for MacAddr {
	fn from(m: MacAddr6) -> Self {
		Self(m)
	}
}

impl From<MacAddr> for MacAddr6 {
	fn from(m: MacAddr) -> Self {
		m.0
	}
}

impl fmt::Display for MacAddr {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		// lowercase, as ovs-ofctl prints it back
		let b = self.0.as_bytes();
		write!(
			f,
			"{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
			b[0], b[1], b[2], b[3], b[4], b[5]
		)
	}
}

impl FromStr for MacAddr {
	type Err = ParseError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		MacAddr6::from_str(s).map(Self)
	}
}

impl Serialize for MacAddr {
	fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		self.to_string().serialize(serializer)
	}
}

impl<'de> Deserialize<'de> for MacAddr {
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
	where
		D: Deserializer<'de>,
	{
		let j = String::deserialize(deserializer)?;
		Self::from_str(&j).map_err(Error::custom)
	}
}

use std::{collections::BTreeMap, str::FromStr};

use crate::error::ArgsPairError;

/// Parsed `CNI_ARGS`: `KEY=value;KEY=value`.
///
/// These used to carry an auth token and network ID straight from the
/// scheduler. Credentials now live in the network config; the args are only
/// kept for logging.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CniArgs(pub BTreeMap<String, String>);

impl CniArgs {
	/// Looks up a single key.
	#[cfg(test)]
	pub fn get(&self, key: &str) -> Option<&str> {
		self.0.get(key).map(String::as_str)
	}

	/// True when no args were passed.
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}
}

impl FromStr for CniArgs {
	type Err = ArgsPairError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let mut map = BTreeMap::new();
		for item in s.split(';').filter(|item| !item.is_empty()) {
			let mut kv = item.splitn(2, '=');
			match (kv.next(), kv.next()) {
				(Some(k), Some(v)) if !k.is_empty() && !v.contains('=') => {
					map.insert(k.to_owned(), v.to_owned());
				}
				_ => return Err(ArgsPairError(item.to_owned())),
			}
		}

		Ok(Self(map))
	}
}

#[cfg(test)]
mod tests {
	use super::CniArgs;

	#[test]
	fn empty_string_is_empty_map() {
		let args: CniArgs = "".parse().unwrap();
		assert!(args.is_empty());
	}

	#[test]
	fn parses_pairs() {
		let args: CniArgs = "IgnoreUnknown=1;NETWORK_ID=abc".parse().unwrap();
		assert_eq!(args.get("IgnoreUnknown"), Some("1"));
		assert_eq!(args.get("NETWORK_ID"), Some("abc"));
		assert_eq!(args.get("AUTH_TOKEN"), None);
	}

	#[test]
	fn tolerates_trailing_separator() {
		let args: CniArgs = "A=1;".parse().unwrap();
		assert_eq!(args.0.len(), 1);
	}

	#[test]
	fn rejects_malformed_pairs() {
		assert!("A".parse::<CniArgs>().is_err());
		assert!("A=1=2".parse::<CniArgs>().is_err());
		assert!("=1".parse::<CniArgs>().is_err());
	}
}

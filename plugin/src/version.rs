use std::str::FromStr;

use semver::Version;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::reply::ReplyPayload;

/// Protocol versions whose result format (`ip4`/`ip6`/`dns`) we emit.
pub(crate) const SUPPORTED_VERSIONS: &[&str] = &["0.1.0", "0.2.0"];

/// Version assumed when a document doesn't declare one.
pub(crate) const DEFAULT_VERSION: &str = "0.1.0";

pub(crate) fn default_version() -> Version {
	// UNWRAP: constant is valid semver
	Version::parse(DEFAULT_VERSION).unwrap()
}

pub(crate) fn latest_version() -> Version {
	// UNWRAP: constant list is non-empty and valid semver
	Version::parse(SUPPORTED_VERSIONS[SUPPORTED_VERSIONS.len() - 1]).unwrap()
}

pub(crate) fn is_supported(version: &Version) -> bool {
	SUPPORTED_VERSIONS
		.iter()
		.any(|v| Version::parse(v).map_or(false, |v| &v == version))
}

#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct VersionPayload {
	#[serde(deserialize_with = "deserialize_version")]
	pub cni_version: Version,
}

/// Reply to the VERSION command.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionReply {
	/// Version of the reply format itself.
	#[serde(deserialize_with = "deserialize_version")]
	#[serde(serialize_with = "serialize_version")]
	pub cni_version: Version,

	/// Every version this plugin can be driven with.
	#[serde(deserialize_with = "deserialize_version_list")]
	#[serde(serialize_with = "serialize_version_list")]
	pub supported_versions: Vec<Version>,
}

impl VersionReply {
	pub(crate) fn supported() -> Self {
		Self {
			cni_version: latest_version(),
			supported_versions: SUPPORTED_VERSIONS
				.iter()
				.filter_map(|v| Version::parse(v).ok())
				.collect(),
		}
	}
}

impl<'de> ReplyPayload<'de> for VersionReply {}

pub(crate) fn serialize_version<S>(version: &Version, serializer: S) -> Result<S::Ok, S::Error>
where
	S: Serializer,
{
	version.to_string().serialize(serializer)
}

pub(crate) fn serialize_version_list<S>(
	list: &[Version],
	serializer: S,
) -> Result<S::Ok, S::Error>
where
	S: Serializer,
{
	list.iter()
		.map(Version::to_string)
		.collect::<Vec<String>>()
		.serialize(serializer)
}

pub(crate) fn deserialize_version<'de, D>(deserializer: D) -> Result<Version, D::Error>
where
	D: Deserializer<'de>,
{
	use serde::de::Error;
	let j = String::deserialize(deserializer)?;
	Version::from_str(&j).map_err(Error::custom)
}

pub(crate) fn deserialize_version_list<'de, D>(deserializer: D) -> Result<Vec<Version>, D::Error>
where
	D: Deserializer<'de>,
{
	use serde::de::Error;
	let j = Vec::<String>::deserialize(deserializer)?;
	j.iter()
		.map(|s| Version::from_str(s).map_err(Error::custom))
		.collect()
}

#[cfg(test)]
mod tests {
	use semver::Version;

	use super::*;

	#[test]
	fn legacy_versions_only() {
		assert!(is_supported(&Version::parse("0.2.0").unwrap()));
		assert!(is_supported(&Version::parse("0.1.0").unwrap()));
		assert!(!is_supported(&Version::parse("0.4.0").unwrap()));
		assert!(!is_supported(&Version::parse("1.0.0").unwrap()));
	}

	#[test]
	fn version_reply_shape() {
		let reply = serde_json::to_value(VersionReply::supported()).unwrap();
		assert_eq!(
			reply,
			serde_json::json!({
				"cniVersion": "0.2.0",
				"supportedVersions": ["0.1.0", "0.2.0"],
			})
		);
	}
}

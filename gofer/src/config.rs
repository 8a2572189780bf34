//! Loading and validating the network configuration.
//!
//! ```json
//! {
//!   "cniVersion": "0.2.0",
//!   "name": "cni-neutron-ovs",
//!   "type": "gofer",
//!   "neutron_url": "https://somehost:9696",
//!   "keystone_url": "https://somehost:5000",
//!   "keystone_username": "admin",
//!   "keystone_password": "secret",
//!   "delegate": { "type": "ovs", "bridge": "br-int" },
//!   "metadata": { "network_name": "space-guid" }
//! }
//! ```

use std::{
	fmt,
	net::Ipv4Addr,
	path::{Path, PathBuf},
};

use ipnetwork::{IpNetwork, Ipv4Network};
use log::debug;
use serde::Deserialize;
use serde_json::{Map, Value};
use url::Url;

use crate::error::{AppError, AppResult};

pub const DEFAULT_STATE_DIR: &str = "/var/lib/cni/gofer";
pub const DEFAULT_KEYSTONE_DOMAIN: &str = "Default";

#[derive(Clone, Debug)]
pub struct GoferConfig {
	pub neutron_url: Url,
	pub keystone: Option<KeystoneConfig>,
	pub state_dir: PathBuf,
	pub delegate: DelegateConfig,
	pub metadata: Map<String, Value>,
	pub network: NetworkPolicy,
	pub subnet: SubnetDefaults,
}

#[derive(Clone, Debug)]
pub struct KeystoneConfig {
	pub url: Url,
	pub credentials: Credentials,
}

#[derive(Clone, Eq, PartialEq)]
pub struct Credentials {
	pub username: String,
	pub password: String,
	pub domain: String,
}

impl fmt::Debug for Credentials {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Credentials")
			.field("username", &self.username)
			.field("password", &"<redacted>")
			.field("domain", &self.domain)
			.finish()
	}
}

/// The chained plugin's own configuration document.
///
/// Only the `type` discriminator is interpreted here; everything else is
/// passed through to the delegate untouched.
#[derive(Clone, Debug, PartialEq)]
pub struct DelegateConfig {
	pub plugin: String,
	document: Map<String, Value>,
}

impl DelegateConfig {
	fn from_value(value: Value) -> AppResult<Self> {
		let document = match value {
			Value::Object(map) if !map.is_empty() => map,
			Value::Object(_) | Value::Null => {
				return Err(AppError::config("missing 'delegate' in CNI net config"))
			}
			_ => return Err(AppError::config("'delegate' must be an object")),
		};

		let plugin = match document.get("type") {
			Some(Value::String(t)) if !t.is_empty() => t.clone(),
			Some(_) => return Err(AppError::config("'delegate.type' must be a non-empty string")),
			None => return Err(AppError::config("missing 'delegate.type' in CNI net config")),
		};

		Ok(Self { plugin, document })
	}

	/// Copies a parent field into the delegate document unless it sets its own.
	fn inherit(&mut self, key: &str, value: Option<&str>) {
		if let Some(value) = value {
			self.document
				.entry(key)
				.or_insert_with(|| Value::String(value.into()));
		}
	}

	/// The document for ADD, carrying the allocated address and local subnet.
	pub fn add_document(&self, ip: IpNetwork, cidr: Ipv4Network) -> Value {
		let mut document = self.document.clone();
		document.insert("ip".into(), Value::String(ip.to_string()));
		document.insert("cidr".into(), Value::String(cidr.to_string()));
		Value::Object(document)
	}

	/// The document for DEL, as configured.
	pub fn del_document(&self) -> Value {
		Value::Object(self.document.clone())
	}
}

/// How the logical network is named.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct NetworkPolicy {
	/// Metadata key holding the network name.
	#[serde(default = "default_name_key")]
	pub name_key: String,

	/// Used when the metadata doesn't carry a name, e.g. when the scheduler
	/// attaches containers before it has filled in its metadata.
	#[serde(default = "default_network_name")]
	pub default_name: String,
}

impl Default for NetworkPolicy {
	fn default() -> Self {
		Self {
			name_key: default_name_key(),
			default_name: default_network_name(),
		}
	}
}

fn default_name_key() -> String {
	"network_name".into()
}

fn default_network_name() -> String {
	"gofer-default".into()
}

/// The network name to use, and whether it came from the metadata.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum NetworkName<'c> {
	Hinted(&'c str),
	Fallback(&'c str),
}

impl<'c> NetworkName<'c> {
	pub fn as_str(&self) -> &'c str {
		match self {
			Self::Hinted(n) | Self::Fallback(n) => n,
		}
	}
}

/// Parameters of the subnet created alongside a new network.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct SubnetDefaults {
	#[serde(default = "default_cidr")]
	pub cidr: Ipv4Network,
	#[serde(default = "default_pool_start")]
	pub pool_start: Ipv4Addr,
	#[serde(default = "default_pool_end")]
	pub pool_end: Ipv4Addr,
}

impl Default for SubnetDefaults {
	fn default() -> Self {
		Self {
			cidr: default_cidr(),
			pool_start: default_pool_start(),
			pool_end: default_pool_end(),
		}
	}
}

fn default_cidr() -> Ipv4Network {
	// UNWRAP: prefix is in range
	Ipv4Network::new(Ipv4Addr::new(10, 255, 0, 0), 16).unwrap()
}

fn default_pool_start() -> Ipv4Addr {
	Ipv4Addr::new(10, 255, 0, 2)
}

fn default_pool_end() -> Ipv4Addr {
	Ipv4Addr::new(10, 255, 255, 254)
}

impl SubnetDefaults {
	fn validate(self) -> AppResult<Self> {
		if !self.cidr.contains(self.pool_start) || !self.cidr.contains(self.pool_end) {
			return Err(AppError::config(format!(
				"subnet pool {}-{} is outside of {}",
				self.pool_start, self.pool_end, self.cidr
			)));
		}

		if self.pool_start > self.pool_end {
			return Err(AppError::config(format!(
				"subnet pool start {} is after its end {}",
				self.pool_start, self.pool_end
			)));
		}

		Ok(self)
	}
}

#[derive(Debug, Deserialize)]
struct RawConfig {
	#[serde(default, rename = "cniVersion")]
	cni_version: Option<String>,
	#[serde(default)]
	name: Option<String>,
	#[serde(default, alias = "neutronURL")]
	neutron_url: Option<String>,
	#[serde(default)]
	keystone_url: Option<String>,
	#[serde(default)]
	keystone_username: Option<String>,
	#[serde(default)]
	keystone_password: Option<String>,
	#[serde(default)]
	keystone_domain: Option<String>,
	#[serde(default, alias = "stateDir")]
	state_dir: Option<PathBuf>,
	#[serde(default)]
	delegate: Value,
	#[serde(default)]
	metadata: Option<Map<String, Value>>,
	#[serde(default)]
	network: NetworkPolicy,
	#[serde(default)]
	subnet: SubnetDefaults,
}

impl GoferConfig {
	/// Parses and validates the raw document from STDIN.
	pub fn load(bytes: &[u8]) -> AppResult<Self> {
		let raw: RawConfig = serde_json::from_slice(bytes)
			.map_err(|err| AppError::config(format!("failed to load netconf: {}", err)))?;
		debug!("neutron_url={:?} delegate={}", raw.neutron_url, raw.delegate);

		let neutron_url = match raw.neutron_url.as_deref() {
			Some(u) if !u.is_empty() => base_url("neutron_url", u)?,
			_ => return Err(AppError::config("missing 'neutron_url' in CNI net config")),
		};

		let mut delegate = DelegateConfig::from_value(raw.delegate)?;
		delegate.inherit("cniVersion", raw.cni_version.as_deref());
		delegate.inherit("name", raw.name.as_deref());

		let keystone = match raw.keystone_url.as_deref() {
			None | Some("") => None,
			Some(u) => Some(KeystoneConfig {
				url: base_url("keystone_url", u)?,
				credentials: Credentials {
					username: required(raw.keystone_username, "keystone_username")?,
					password: required(raw.keystone_password, "keystone_password")?,
					domain: raw
						.keystone_domain
						.filter(|d| !d.is_empty())
						.unwrap_or_else(|| DEFAULT_KEYSTONE_DOMAIN.into()),
				},
			}),
		};

		if raw.network.default_name.is_empty() {
			return Err(AppError::config("'network.default_name' must not be empty"));
		}

		Ok(Self {
			neutron_url,
			keystone,
			state_dir: raw
				.state_dir
				.filter(|d| !d.as_os_str().is_empty())
				.unwrap_or_else(|| PathBuf::from(DEFAULT_STATE_DIR)),
			delegate,
			metadata: raw.metadata.unwrap_or_default(),
			network: raw.network,
			subnet: raw.subnet.validate()?,
		})
	}

	/// Picks the network name from the metadata, or falls back to the
	/// configured default.
	pub fn network_name(&self) -> NetworkName<'_> {
		match self.metadata.get(&self.network.name_key) {
			Some(Value::String(name)) if !name.is_empty() => NetworkName::Hinted(name),
			_ => NetworkName::Fallback(&self.network.default_name),
		}
	}

	pub fn state_dir(&self) -> &Path {
		&self.state_dir
	}
}

fn required(value: Option<String>, key: &'static str) -> AppResult<String> {
	value
		.filter(|v| !v.is_empty())
		.ok_or_else(|| AppError::config(format!("missing '{}' in CNI net config", key)))
}

/// Parses a base URL so that `join` appends to it rather than replacing its
/// last segment.
fn base_url(key: &'static str, raw: &str) -> AppResult<Url> {
	let mut url = Url::parse(raw)
		.map_err(|err| AppError::config(format!("invalid '{}' {:?}: {}", key, raw, err)))?;
	if !url.path().ends_with('/') {
		let path = format!("{}/", url.path());
		url.set_path(&path);
	}
	Ok(url)
}

//! The attacher's network configuration.
//!
//! ```json
//! {
//!   "cniVersion": "0.2.0",
//!   "name": "cni-neutron-ovs",
//!   "type": "ovs",
//!   "bridge": "ovs-bridge",
//!   "ip": "10.255.0.7/32",
//!   "cidr": "10.255.0.0/16"
//! }
//! ```
//!
//! `ip` and `cidr` are filled in by the plugin delegating to this one.

use std::{net::Ipv4Addr, path::PathBuf};

use ipnetwork::Ipv4Network;
use log::debug;
use serde::Deserialize;

use crate::error::{AppError, AppResult};

pub const DEFAULT_BRIDGE: &str = "ovs-bridge";
pub const DEFAULT_BIN_PATH: &str = "/var/vcap/packages/openvswitch/bin";
pub const DEFAULT_TUNNEL_ID: u32 = 101;
pub const DEFAULT_OFPORT: u16 = 10;

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct OvsConfig {
	#[serde(default = "default_bridge")]
	pub bridge: String,

	/// Directory holding `ovs-vsctl` and `ovs-ofctl`.
	#[serde(default = "default_bin_path")]
	pub bin_path: PathBuf,

	#[serde(default)]
	pub mtu: Option<u32>,

	#[serde(default = "default_tunnel_id")]
	pub tunnel_id: u32,

	/// OpenFlow port number requested for the host-side interface.
	#[serde(default = "default_ofport")]
	pub ofport: u16,

	#[serde(default)]
	pub ip: Option<Ipv4Network>,

	/// The local subnet, routed on-link inside the container.
	#[serde(default)]
	pub cidr: Option<Ipv4Network>,

	#[serde(default)]
	pub gateway: Option<Ipv4Addr>,
}

fn default_bridge() -> String {
	DEFAULT_BRIDGE.into()
}

fn default_bin_path() -> PathBuf {
	DEFAULT_BIN_PATH.into()
}

fn default_tunnel_id() -> u32 {
	DEFAULT_TUNNEL_ID
}

fn default_ofport() -> u16 {
	DEFAULT_OFPORT
}

impl OvsConfig {
	pub fn load(bytes: &[u8]) -> AppResult<Self> {
		let config: Self = serde_json::from_slice(bytes)
			.map_err(|err| AppError::config(format!("failed to load netconf: {}", err)))?;
		debug!("ovs config: {:?}", config);

		if config.bridge.is_empty() {
			return Err(AppError::config("'bridge' must not be empty"));
		}

		if config.ofport == 0 {
			return Err(AppError::config("'ofport' must be a port number, not 0"));
		}

		if config.mtu == Some(0) {
			return Err(AppError::config("'mtu' must not be 0"));
		}

		if let Some(gw) = config.gateway {
			match config.cidr {
				Some(cidr) if cidr.contains(gw) => {}
				Some(cidr) => {
					return Err(AppError::config(format!(
						"gateway {} is not within cidr {}",
						gw, cidr
					)))
				}
				None => return Err(AppError::config("'gateway' needs a 'cidr' to reach it")),
			}
		}

		Ok(config)
	}

	/// The container's address; only ADD needs it.
	pub fn address(&self) -> AppResult<Ipv4Network> {
		self.ip
			.ok_or_else(|| AppError::config("missing 'ip' in CNI net config"))
	}
}

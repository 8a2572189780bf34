//! ADD and DEL for the data plane.

use std::{
	io,
	net::{IpAddr, Ipv4Addr},
	path::Path,
};

use async_std::task::block_on;
use gofer_cni::{
	macaddr::MacAddr,
	reply::{IpConfigReply, LegacyReply, RouteReply},
};
use ipnetwork::{IpNetwork, Ipv4Network};
use log::{info, warn};

use crate::{
	config::OvsConfig,
	error::{AppError, AppResult},
	netns::NetNs,
	switch::{FlowRule, Switch},
	veth::{self, ContainerLink},
};

/// Name of the host-side interface for an address: `o` and the address in
/// hex, so it's unique per container and fits in `IFNAMSIZ`.
pub fn host_ifname(ip: Ipv4Addr) -> String {
	format!("o{:08x}", u32::from(ip))
}

#[derive(Clone, Debug, PartialEq)]
pub struct AttachmentResult {
	pub host_ifname: String,
	pub mac: MacAddr,
	pub address: Ipv4Network,
	pub gateway: Option<Ipv4Addr>,
	/// In installation order.
	pub routes: Vec<(Ipv4Network, Option<Ipv4Addr>)>,
}

impl AttachmentResult {
	fn plan(config: &OvsConfig, address: Ipv4Network) -> Self {
		let mut routes = Vec::new();
		if let Some(cidr) = config.cidr {
			routes.push((cidr, None));
		}
		if let Some(gw) = config.gateway {
			// UNWRAP: 0 is a valid prefix
			routes.push((Ipv4Network::new(Ipv4Addr::UNSPECIFIED, 0).unwrap(), Some(gw)));
		}

		Self {
			host_ifname: host_ifname(address.ip()),
			mac: MacAddr::from_ipv4(address.ip()),
			address,
			gateway: config.gateway,
			routes,
		}
	}

	pub fn into_reply(self) -> LegacyReply {
		LegacyReply {
			ip4: Some(IpConfigReply {
				ip: IpNetwork::V4(self.address),
				gateway: self.gateway.map(IpAddr::V4),
				routes: self
					.routes
					.into_iter()
					.map(|(dst, gw)| RouteReply {
						dst: IpNetwork::V4(dst),
						gw: gw.map(IpAddr::V4),
					})
					.collect(),
			}),
			..LegacyReply::default()
		}
	}
}

/// Wires the container into the bridge.
///
/// Stops at the first failure without undoing earlier steps.
pub async fn add(config: &OvsConfig, ifname: &str, netns: &Path) -> AppResult<AttachmentResult> {
	let address = config.address()?;
	let result = AttachmentResult::plan(config, address);

	let ns = NetNs::open(netns).map_err(|err| AppError::Namespace {
		path: netns.into(),
		err: Box::new(err),
	})?;
	info!("entering {}", ns.path().display());

	let link = ContainerLink {
		ifname: ifname.into(),
		host_ifname: result.host_ifname.clone(),
		mac: result.mac,
		address,
		cidr: config.cidr,
		gateway: config.gateway,
		mtu: config.mtu,
	};
	ns.run(move || {
		block_on(async {
			let handle = veth::connect().await?;
			link.create(&handle).await
		})
	})?;
	info!("left {}", ns.path().display());

	let switch = Switch::new(&config.bin_path, &config.bridge);
	switch.add_port(&result.host_ifname, config.ofport).await?;
	let ofport = switch.ofport(&result.host_ifname).await?;
	if ofport != config.ofport {
		warn!(
			"{} asked for port {} but got {}",
			result.host_ifname, config.ofport, ofport
		);
	}
	for rule in &FlowRule::for_port(config.tunnel_id, result.mac, address.ip(), ofport) {
		switch.add_flow(rule).await?;
	}

	// the index changed when the link moved over, so this goes by name
	let handle = veth::connect().await?;
	veth::set_up(&handle, &result.host_ifname).await?;

	Ok(result)
}

/// Host-side name for the container end of a pair, from the MAC it was
/// given on ADD.
fn peer_ifname(mac: MacAddr) -> Option<String> {
	mac.derived_ipv4().map(host_ifname)
}

/// Removes the container's interface, which takes its host-side peer with it,
/// then the peer's port record on the bridge.
///
/// A namespace, interface, or port that's already gone is nothing to clean up.
pub async fn del(config: &OvsConfig, ifname: &str, netns: Option<&Path>) -> AppResult<()> {
	let from_config = config.ip.map(|ip| host_ifname(ip.ip()));
	let from_link = match netns {
		Some(path) => delete_container_link(ifname, path).await?,
		None => {
			info!("no namespace given, no interface to delete");
			None
		}
	};

	match from_link.or(from_config) {
		Some(host) => {
			Switch::new(&config.bin_path, &config.bridge)
				.del_port(&host)
				.await
		}
		None => {
			info!("no address known for {}, leaving the bridge alone", ifname);
			Ok(())
		}
	}
}

/// Deletes the container end of the pair. Returns the host end's name if it
/// can be told from the link.
async fn delete_container_link(ifname: &str, path: &Path) -> AppResult<Option<String>> {
	let ns = match NetNs::open(path) {
		Ok(ns) => ns,
		Err(err) if err.kind() == io::ErrorKind::NotFound => {
			info!("namespace {} is gone, no interface to delete", path.display());
			return Ok(None);
		}
		Err(err) => {
			return Err(AppError::Namespace {
				path: path.into(),
				err: Box::new(err),
			})
		}
	};

	let name = ifname.to_owned();
	let (mac, deleted) = ns.run(move || {
		block_on(async {
			let handle = veth::connect().await?;
			let mac = veth::find_mac(&handle, &name).await?;
			let deleted = veth::delete(&handle, &name).await?;
			Ok((mac, deleted))
		})
	})?;

	if deleted {
		info!("deleted {} in {}", ifname, path.display());
	} else {
		info!("no {} in {}, nothing to delete", ifname, path.display());
	}
	Ok(mac.and_then(peer_ifname))
}

//! Control-plane side: tokens, networks, and ports.

use std::net::IpAddr;

use ipnetwork::{IpNetwork, Ipv4Network};
use log::{debug, info, warn};

use crate::{
	config::GoferConfig,
	error::{ApiError, AppError, AppResult},
	keystone::TokenService,
	neutron::{AllocationPool, Auth, Network, NeutronApi, NewNetwork, NewPort, NewSubnet},
};

/// A port bound to a container, with its one address.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Allocation {
	pub port_id: String,
	pub ip: IpAddr,
	/// Empty if Neutron didn't say which subnet the address came from.
	pub subnet_id: String,
}

impl Allocation {
	/// The address as a single-host network.
	pub fn host_network(&self) -> IpNetwork {
		// UNWRAP: max_prefix is valid for its own family
		IpNetwork::new(self.ip, max_prefix(self.ip)).unwrap()
	}
}

fn max_prefix(ip: IpAddr) -> u8 {
	match ip {
		IpAddr::V4(_) => 32,
		IpAddr::V6(_) => 128,
	}
}

pub struct Resolver<'a> {
	config: &'a GoferConfig,
	tokens: &'a dyn TokenService,
	neutron: &'a dyn NeutronApi,
}

impl<'a> Resolver<'a> {
	pub fn new(
		config: &'a GoferConfig,
		tokens: &'a dyn TokenService,
		neutron: &'a dyn NeutronApi,
	) -> Self {
		Self {
			config,
			tokens,
			neutron,
		}
	}

	/// Obtains a token, or goes anonymous if no identity service is configured.
	pub async fn authenticate(&self) -> AppResult<Auth> {
		match &self.config.keystone {
			None => {
				debug!("no keystone_url, calling neutron without a token");
				Ok(Auth::Anonymous)
			}
			Some(keystone) => self
				.tokens
				.issue_token(keystone)
				.await
				.map(Auth::Token)
				.map_err(AppError::Auth),
		}
	}

	/// Finds the network with this name, or creates it along with a subnet.
	///
	/// Not atomic: two concurrent first calls can each create a network.
	pub async fn resolve_network(&self, auth: &Auth, name: &str) -> AppResult<Network> {
		let existing = self
			.neutron
			.list_networks(auth, name)
			.await
			.map_err(api_error("list networks"))?;

		if let Some(network) = existing.into_iter().next() {
			debug!("found network {} ({})", network.name, network.id);
			return Ok(network);
		}

		info!("no network named {:?}, creating it", name);
		let mut network = self
			.neutron
			.create_network(
				auth,
				&NewNetwork {
					name: name.into(),
					admin_state_up: true,
				},
			)
			.await
			.map_err(api_error("create network"))?;
		if network.name.is_empty() {
			network.name = name.into();
		}

		let defaults = &self.config.subnet;
		let subnet = self
			.neutron
			.create_subnet(
				auth,
				&NewSubnet {
					network_id: network.id.clone(),
					name: format!("{}-subnet", name),
					ip_version: 4,
					cidr: defaults.cidr,
					allocation_pools: vec![AllocationPool {
						start: defaults.pool_start,
						end: defaults.pool_end,
					}],
				},
			)
			.await
			.map_err(api_error("create subnet"))?;
		info!(
			"created network {} ({}) with subnet {}",
			network.name, network.id, subnet.id
		);

		if !network.subnets.contains(&subnet.id) {
			network.subnets.push(subnet.id);
		}
		Ok(network)
	}

	/// Creates a port for the container and returns its address.
	///
	/// A port that doesn't come back with exactly one address is an error, and
	/// is left in place for an operator to look at.
	pub async fn allocate_port(
		&self,
		auth: &Auth,
		network_id: &str,
		container_id: &str,
	) -> AppResult<Allocation> {
		let port = self
			.neutron
			.create_port(
				auth,
				&NewPort {
					network_id: network_id.into(),
					name: container_id.into(),
					device_id: container_id.into(),
					admin_state_up: true,
				},
			)
			.await
			.map_err(api_error("create port"))?;

		match port.fixed_ips.as_slice() {
			[only] => {
				info!("allocated {} on port {}", only.ip_address, port.id);
				Ok(Allocation {
					ip: only.ip_address,
					subnet_id: only.subnet_id.clone(),
					port_id: port.id,
				})
			}
			ips => Err(AppError::Allocation {
				port: port.id,
				count: ips.len(),
			}),
		}
	}

	/// The prefix of the subnet the allocated address belongs to.
	///
	/// `None` if the port didn't name its subnet or the subnet has no cidr.
	pub async fn subnet_cidr(
		&self,
		auth: &Auth,
		allocation: &Allocation,
	) -> AppResult<Option<Ipv4Network>> {
		if allocation.subnet_id.is_empty() {
			return Ok(None);
		}

		let subnet = self
			.neutron
			.get_subnet(auth, &allocation.subnet_id)
			.await
			.map_err(api_error("get subnet"))?;
		debug!("address {} is in subnet {:?}", allocation.ip, subnet);

		let id = subnet.id;
		subnet
			.cidr
			.map(|cidr| {
				cidr.parse().map_err(|err| AppError::NeutronApi {
					op: "get subnet",
					err: ApiError::Decode(format!("subnet {} cidr {:?}: {}", id, cidr, err)),
				})
			})
			.transpose()
	}

	/// Deletes the port. A port that's already gone counts as released.
	pub async fn release_port(&self, auth: &Auth, port_id: &str) -> AppResult<()> {
		match self.neutron.delete_port(auth, port_id).await {
			Ok(()) => {
				info!("released port {}", port_id);
				Ok(())
			}
			Err(err) if err.is_not_found() => {
				warn!("port {} was already gone", port_id);
				Ok(())
			}
			Err(err) => Err(AppError::NeutronApi {
				op: "delete port",
				err,
			}),
		}
	}
}

fn api_error(op: &'static str) -> impl FnOnce(ApiError) -> AppError {
	move |err| AppError::NeutronApi { op, err }
}

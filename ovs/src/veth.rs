//! Link, address, and route operations over rtnetlink.
//!
//! A netlink socket talks to the namespace it was opened in, so callers open
//! a fresh connection with [`connect`] on whichever side they're working.

use std::{
	convert::TryInto,
	net::{IpAddr, Ipv4Addr},
	process,
};

use async_std::task::spawn;
use futures::TryStreamExt;
use gofer_cni::macaddr::MacAddr;
use macaddr::MacAddr6;
use ipnetwork::Ipv4Network;
use log::{debug, info};
use nix::errno::Errno;
use rtnetlink::{sys::SmolSocket, Handle};

use crate::error::{AppError, AppResult};

pub async fn connect() -> AppResult<Handle> {
	let (conn, handle, _) = rtnetlink::new_connection_with_socket::<SmolSocket>()
		.map_err(|err| AppError::attachment("open netlink socket", err))?;
	spawn(conn);
	Ok(handle)
}

fn is_errno(err: &rtnetlink::Error, errno: Errno) -> bool {
	matches!(err, rtnetlink::Error::NetlinkError(msg) if -msg.code == errno as i32)
}

/// Index of the link with this name, if there is one.
pub async fn find_link(handle: &Handle, name: &str) -> AppResult<Option<u32>> {
	let mut links = handle.link().get().match_name(name.into()).execute();
	match links.try_next().await {
		Ok(Some(link)) => Ok(Some(link.header.index)),
		Ok(None) => Ok(None),
		Err(err) if is_errno(&err, Errno::ENODEV) => Ok(None),
		Err(err) => Err(AppError::attachment(format!("look up link {}", name), err)),
	}
}

/// Hardware address of the link with this name, if there is such a link.
pub async fn find_mac(handle: &Handle, name: &str) -> AppResult<Option<MacAddr>> {
	use rtnetlink::packet::rtnl::link::nlas::Nla;

	let mut links = handle.link().get().match_name(name.into()).execute();
	let link = match links.try_next().await {
		Ok(Some(link)) => link,
		Ok(None) => return Ok(None),
		Err(err) if is_errno(&err, Errno::ENODEV) => return Ok(None),
		Err(err) => return Err(AppError::attachment(format!("look up link {}", name), err)),
	};

	let bytes = link
		.nlas
		.into_iter()
		.find_map(|n| match n {
			Nla::Address(bytes) => Some(bytes),
			_ => None,
		})
		.ok_or_else(|| AppError::attachment(format!("read mac of {}", name), "no address on link"))?;

	let bytes: [u8; 6] = bytes.try_into().map_err(|bytes| {
		AppError::attachment(
			format!("read mac of {}", name),
			format!("not 6 bytes: {:?}", bytes),
		)
	})?;
	Ok(Some(MacAddr6::from(bytes).into()))
}

async fn link(handle: &Handle, name: &str) -> AppResult<u32> {
	find_link(handle, name)
		.await?
		.ok_or_else(|| AppError::attachment(format!("look up link {}", name), "no such link"))
}

/// The container side of a veth pair, as it should end up.
#[derive(Clone, Debug)]
pub struct ContainerLink {
	pub ifname: String,
	pub host_ifname: String,
	pub mac: MacAddr,
	pub address: Ipv4Network,
	pub cidr: Option<Ipv4Network>,
	pub gateway: Option<Ipv4Addr>,
	pub mtu: Option<u32>,
}

impl ContainerLink {
	/// Creates the pair in the current namespace, sends the host end to the
	/// namespace of this process, and configures the container end.
	///
	/// Must be called from inside the container's namespace.
	pub async fn create(&self, handle: &Handle) -> AppResult<()> {
		handle
			.link()
			.add()
			.veth(self.ifname.clone(), self.host_ifname.clone())
			.execute()
			.await
			.map_err(|err| {
				if is_errno(&err, Errno::EEXIST) {
					AppError::attachment(
						format!("create veth {}", self.ifname),
						"interface already exists in the container namespace",
					)
				} else {
					AppError::attachment(format!("create veth {}", self.ifname), err)
				}
			})?;
		info!("created veth {} <-> {}", self.ifname, self.host_ifname);

		let index = link(handle, &self.ifname).await?;
		let host_index = link(handle, &self.host_ifname).await?;

		if let Some(mtu) = self.mtu {
			for (name, index) in &[(&self.ifname, index), (&self.host_ifname, host_index)] {
				handle
					.link()
					.set(*index)
					.mtu(mtu)
					.execute()
					.await
					.map_err(|err| AppError::attachment(format!("set mtu {} on {}", mtu, name), err))?;
			}
			debug!("set mtu {}", mtu);
		}

		handle
			.link()
			.set(host_index)
			.setns_by_pid(process::id())
			.execute()
			.await
			.map_err(|err| {
				AppError::attachment(format!("move {} to host namespace", self.host_ifname), err)
			})?;
		debug!("moved {} to host namespace", self.host_ifname);

		self.configure(handle, index).await
	}

	async fn configure(&self, handle: &Handle, index: u32) -> AppResult<()> {
		handle
			.link()
			.set(index)
			.address(self.mac.as_bytes().to_vec())
			.execute()
			.await
			.map_err(|err| {
				AppError::attachment(format!("set mac {} on {}", self.mac, self.ifname), err)
			})?;

		handle
			.address()
			.add(index, IpAddr::V4(self.address.ip()), self.address.prefix())
			.execute()
			.await
			.map_err(|err| {
				AppError::attachment(format!("add address {} to {}", self.address, self.ifname), err)
			})?;

		handle
			.link()
			.set(index)
			.up()
			.execute()
			.await
			.map_err(|err| AppError::attachment(format!("set {} up", self.ifname), err))?;
		info!(
			"{} is up with {} and mac {}",
			self.ifname, self.address, self.mac
		);

		if let Some(cidr) = self.cidr {
			match handle
				.route()
				.add()
				.v4()
				.destination_prefix(cidr.network(), cidr.prefix())
				.output_interface(index)
				.execute()
				.await
			{
				Ok(()) => info!("routed {} via {}", cidr, self.ifname),
				// the address's own prefix route already covers it
				Err(err) if is_errno(&err, Errno::EEXIST) => debug!("route to {} exists", cidr),
				Err(err) => {
					return Err(AppError::attachment(format!("add route to {}", cidr), err))
				}
			}
		}

		if let Some(gateway) = self.gateway {
			handle
				.route()
				.add()
				.v4()
				.gateway(gateway)
				.output_interface(index)
				.execute()
				.await
				.map_err(|err| AppError::attachment(format!("add default route via {}", gateway), err))?;
			info!("default route via {}", gateway);
		}

		Ok(())
	}
}

/// Sets a link up, looking it up by name.
pub async fn set_up(handle: &Handle, name: &str) -> AppResult<()> {
	let index = link(handle, name).await?;
	handle
		.link()
		.set(index)
		.up()
		.execute()
		.await
		.map_err(|err| AppError::attachment(format!("set {} up", name), err))?;
	info!("{} is up", name);
	Ok(())
}

/// Deletes a link by name. Returns whether there was one.
pub async fn delete(handle: &Handle, name: &str) -> AppResult<bool> {
	let index = match find_link(handle, name).await? {
		Some(index) => index,
		None => return Ok(false),
	};

	match handle.link().del(index).execute().await {
		Ok(()) => Ok(true),
		Err(err) if is_errno(&err, Errno::ENODEV) => Ok(false),
		Err(err) => Err(AppError::attachment(format!("delete link {}", name), err)),
	}
}

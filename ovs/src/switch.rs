//! Open vSwitch port binding and flow programming, through the `ovs-vsctl`
//! and `ovs-ofctl` tools.

use std::{
	convert::TryFrom,
	fmt,
	net::Ipv4Addr,
	path::{Path, PathBuf},
};

use async_process::Command;
use gofer_cni::macaddr::MacAddr;
use log::{debug, info};

use crate::error::{AppError, AppResult};

/// One OpenFlow rule, in `ovs-ofctl add-flow` syntax.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FlowRule {
	pub table: u8,
	pub matches: Vec<String>,
	pub actions: String,
}

impl fmt::Display for FlowRule {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "table={}", self.table)?;
		for m in &self.matches {
			write!(f, ",{}", m)?;
		}
		write!(f, ",actions={}", self.actions)
	}
}

impl FlowRule {
	/// Frames for this MAC on this tunnel go out the port.
	pub fn deliver_unicast(tunnel_id: u32, mac: MacAddr, ofport: u16) -> Self {
		Self {
			table: 1,
			matches: vec![format!("tun_id={}", tunnel_id), format!("dl_dst={}", mac)],
			actions: format!("output:{}", ofport),
		}
	}

	/// ARP for this address on this tunnel goes out the port.
	pub fn deliver_arp(tunnel_id: u32, ip: Ipv4Addr, ofport: u16) -> Self {
		Self {
			table: 1,
			matches: vec![
				format!("tun_id={}", tunnel_id),
				"arp".into(),
				format!("nw_dst={}", ip),
			],
			actions: format!("output:{}", ofport),
		}
	}

	/// Traffic from the port is tagged with the tunnel and looked up again
	/// in table 1.
	pub fn tag_ingress(tunnel_id: u32, ofport: u16) -> Self {
		Self {
			table: 0,
			matches: vec![format!("in_port={}", ofport)],
			actions: format!("set_field:{}->tun_id,resubmit(,1)", tunnel_id),
		}
	}

	/// The rules for one container, in installation order.
	pub fn for_port(tunnel_id: u32, mac: MacAddr, ip: Ipv4Addr, ofport: u16) -> [Self; 3] {
		[
			Self::deliver_unicast(tunnel_id, mac, ofport),
			Self::deliver_arp(tunnel_id, ip, ofport),
			Self::tag_ingress(tunnel_id, ofport),
		]
	}
}

#[derive(Clone, Debug)]
pub struct Switch {
	bin_path: PathBuf,
	bridge: String,
}

impl Switch {
	pub fn new(bin_path: &Path, bridge: &str) -> Self {
		Self {
			bin_path: bin_path.into(),
			bridge: bridge.into(),
		}
	}

	fn add_port_args(&self, ifname: &str, ofport: u16) -> Vec<String> {
		vec![
			"--may-exist".into(),
			"add-port".into(),
			self.bridge.clone(),
			ifname.into(),
			"--".into(),
			"set".into(),
			"interface".into(),
			ifname.into(),
			format!("ofport_request={}", ofport),
		]
	}

	/// Adds the interface to the bridge, asking for a specific port number.
	///
	/// A record left over for the same interface is reused.
	pub async fn add_port(&self, ifname: &str, ofport: u16) -> AppResult<()> {
		self.run("ovs-vsctl", self.add_port_args(ifname, ofport))
			.await?;
		info!("added {} to {}, requested port {}", ifname, self.bridge, ofport);
		Ok(())
	}

	/// The port number OVS actually gave the interface.
	pub async fn ofport(&self, ifname: &str) -> AppResult<u16> {
		let step = format!("ovs-vsctl get Interface {} ofport", ifname);
		let out = self
			.run(
				"ovs-vsctl",
				vec!["get".into(), "Interface".into(), ifname.into(), "ofport".into()],
			)
			.await?;

		let out = out.trim();
		match out.parse::<i32>() {
			Ok(-1) => Err(AppError::attachment(
				step,
				format!("{} has no port number, see its error column", ifname),
			)),
			Ok(n) => u16::try_from(n)
				.ok()
				.filter(|n| *n > 0)
				.ok_or_else(|| AppError::attachment(step, format!("port number {} out of range", n))),
			Err(err) => Err(AppError::attachment(step, format!("{:?}: {}", out, err))),
		}
	}

	/// Removes the interface's port record, if there is one.
	pub async fn del_port(&self, ifname: &str) -> AppResult<()> {
		self.run(
			"ovs-vsctl",
			vec![
				"--if-exists".into(),
				"del-port".into(),
				self.bridge.clone(),
				ifname.into(),
			],
		)
		.await?;
		info!("removed {} from {}", ifname, self.bridge);
		Ok(())
	}

	pub async fn add_flow(&self, rule: &FlowRule) -> AppResult<()> {
		self.run(
			"ovs-ofctl",
			vec!["add-flow".into(), self.bridge.clone(), rule.to_string()],
		)
		.await?;
		info!("added flow {}", rule);
		Ok(())
	}

	/// Runs a tool without a shell, failing on a non-zero exit. Returns stdout.
	async fn run(&self, tool: &str, args: Vec<String>) -> AppResult<String> {
		let program = self.bin_path.join(tool);
		let step = format!("{} {}", tool, args.join(" "));
		debug!("running {} {:?}", program.display(), args);

		let output = Command::new(&program)
			.args(&args)
			.output()
			.await
			.map_err(|err| AppError::attachment(step.clone(), err))?;

		if output.status.success() {
			Ok(String::from_utf8_lossy(&output.stdout).into_owned())
		} else {
			let stderr = String::from_utf8_lossy(&output.stderr);
			Err(AppError::attachment(
				step,
				format!("{}: {}", output.status, stderr.trim()),
			))
		}
	}
}

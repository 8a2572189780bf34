//! In-memory collaborators for tests.

use std::{
	cell::{Cell, RefCell},
	net::{IpAddr, Ipv4Addr},
	path::Path,
};

use async_trait::async_trait;
use gofer_cni::{
	error::CniError,
	reply::{IpConfigReply, LegacyReply},
};
use ipnetwork::IpNetwork;
use serde_json::{json, Value};

use crate::{
	config::{GoferConfig, KeystoneConfig},
	delegate::Delegate,
	error::{ApiError, AppError, AppResult},
	keystone::TokenService,
	neutron::{Auth, FixedIp, Network, NeutronApi, NewNetwork, NewPort, NewSubnet, Port, Subnet},
};

pub fn document() -> Value {
	json!({
		"cniVersion": "0.2.0",
		"name": "cni-neutron-noop",
		"type": "gofer",
		"neutron_url": "http://127.0.0.1:9696",
		"delegate": {"type": "noop", "some": "other data"},
		"metadata": {"network_name": "space-1"},
	})
}

pub fn config() -> GoferConfig {
	load(document())
}

pub fn config_in(state_dir: &Path) -> GoferConfig {
	let mut doc = document();
	doc["state_dir"] = json!(state_dir);
	load(doc)
}

pub fn keystone_config() -> GoferConfig {
	let mut doc = document();
	doc["keystone_url"] = json!("http://127.0.0.1:5000");
	doc["keystone_username"] = json!("admin");
	doc["keystone_password"] = json!("secret");
	load(doc)
}

pub fn load(doc: Value) -> GoferConfig {
	GoferConfig::load(&serde_json::to_vec(&doc).unwrap()).unwrap()
}

#[derive(Debug, Default)]
pub struct FakeKeystone {
	token: Option<String>,
	calls: Cell<usize>,
}

impl FakeKeystone {
	pub fn issuing(token: &str) -> Self {
		Self {
			token: Some(token.into()),
			..Self::default()
		}
	}

	pub fn rejecting() -> Self {
		Self::default()
	}

	pub fn calls(&self) -> usize {
		self.calls.get()
	}
}

#[async_trait(?Send)]
impl TokenService for FakeKeystone {
	async fn issue_token(&self, _keystone: &KeystoneConfig) -> Result<String, ApiError> {
		self.calls.set(self.calls.get() + 1);
		self.token.clone().ok_or_else(|| ApiError::Status {
			status: 401,
			body: "The request you have made requires authentication.".into(),
		})
	}
}

#[derive(Debug, Default)]
struct Cloud {
	next_id: usize,
	next_host: u32,
	networks: Vec<Network>,
	subnets: Vec<Subnet>,
	ports: Vec<Port>,
	fixed_ips: Option<Vec<IpAddr>>,
	fail_deletes: bool,
	calls: Vec<&'static str>,
	auths: Vec<Auth>,
}

impl Cloud {
	fn id(&mut self, kind: &str) -> String {
		self.next_id += 1;
		format!("{}-{:04}", kind, self.next_id)
	}

	fn record(&mut self, call: &'static str, auth: &Auth) {
		self.calls.push(call);
		self.auths.push(auth.clone());
	}
}

/// A Neutron that keeps everything in memory and hands out addresses from
/// 10.255.0.2 upwards.
#[derive(Debug, Default)]
pub struct FakeNeutron {
	cloud: RefCell<Cloud>,
}

impl FakeNeutron {
	pub fn seed_network(&self, name: &str) -> String {
		let mut cloud = self.cloud.borrow_mut();
		let id = cloud.id("net");
		cloud.networks.push(Network {
			id: id.clone(),
			name: name.into(),
			admin_state_up: true,
			subnets: Vec::new(),
		});
		id
	}

	/// A network that already has one subnet with this cidr.
	pub fn seed_network_with_subnet(&self, name: &str, cidr: &str) -> String {
		let id = self.seed_network(name);
		let mut cloud = self.cloud.borrow_mut();
		let subnet = Subnet {
			id: cloud.id("subnet"),
			name: format!("{}-subnet", name),
			network_id: id.clone(),
			cidr: Some(cidr.into()),
		};
		if let Some(network) = cloud.networks.iter_mut().find(|n| n.id == id) {
			network.subnets.push(subnet.id.clone());
		}
		cloud.subnets.push(subnet);
		id
	}

	/// Every port created from now on gets exactly these addresses.
	pub fn set_fixed_ips(&self, ips: Vec<IpAddr>) {
		self.cloud.borrow_mut().fixed_ips = Some(ips);
	}

	pub fn fail_deletes(&self) {
		self.cloud.borrow_mut().fail_deletes = true;
	}

	pub fn network_count(&self) -> usize {
		self.cloud.borrow().networks.len()
	}

	pub fn port_count(&self) -> usize {
		self.cloud.borrow().ports.len()
	}

	pub fn subnet(&self, id: &str) -> Option<Subnet> {
		self.cloud.borrow().subnets.iter().find(|s| s.id == id).cloned()
	}

	pub fn port(&self, id: &str) -> Option<Port> {
		self.cloud.borrow().ports.iter().find(|p| p.id == id).cloned()
	}

	pub fn calls(&self) -> Vec<&'static str> {
		self.cloud.borrow().calls.clone()
	}

	pub fn auths(&self) -> Vec<Auth> {
		self.cloud.borrow().auths.clone()
	}
}

#[async_trait(?Send)]
impl NeutronApi for FakeNeutron {
	async fn list_networks(&self, auth: &Auth, name: &str) -> Result<Vec<Network>, ApiError> {
		let mut cloud = self.cloud.borrow_mut();
		cloud.record("list networks", auth);
		Ok(cloud
			.networks
			.iter()
			.filter(|n| n.name == name)
			.cloned()
			.collect())
	}

	async fn create_network(&self, auth: &Auth, network: &NewNetwork) -> Result<Network, ApiError> {
		let mut cloud = self.cloud.borrow_mut();
		cloud.record("create network", auth);
		let created = Network {
			id: cloud.id("net"),
			name: network.name.clone(),
			admin_state_up: network.admin_state_up,
			subnets: Vec::new(),
		};
		cloud.networks.push(created.clone());
		Ok(created)
	}

	async fn create_subnet(&self, auth: &Auth, subnet: &NewSubnet) -> Result<Subnet, ApiError> {
		let mut cloud = self.cloud.borrow_mut();
		cloud.record("create subnet", auth);
		let created = Subnet {
			id: cloud.id("subnet"),
			name: subnet.name.clone(),
			network_id: subnet.network_id.clone(),
			cidr: Some(subnet.cidr.to_string()),
		};
		let network = cloud
			.networks
			.iter_mut()
			.find(|n| n.id == subnet.network_id)
			.ok_or(ApiError::NotFound)?;
		network.subnets.push(created.id.clone());
		cloud.subnets.push(created.clone());
		Ok(created)
	}

	async fn get_subnet(&self, auth: &Auth, id: &str) -> Result<Subnet, ApiError> {
		let mut cloud = self.cloud.borrow_mut();
		cloud.record("get subnet", auth);
		cloud
			.subnets
			.iter()
			.find(|s| s.id == id)
			.cloned()
			.ok_or(ApiError::NotFound)
	}

	async fn create_port(&self, auth: &Auth, port: &NewPort) -> Result<Port, ApiError> {
		let mut cloud = self.cloud.borrow_mut();
		cloud.record("create port", auth);
		let subnet_id = match cloud.networks.iter().find(|n| n.id == port.network_id) {
			Some(network) => network.subnets.first().cloned().unwrap_or_default(),
			None => return Err(ApiError::NotFound),
		};

		let ips = match cloud.fixed_ips.clone() {
			Some(ips) => ips,
			None => {
				let host = cloud.next_host;
				cloud.next_host += 1;
				vec![IpAddr::V4(Ipv4Addr::from(u32::from(Ipv4Addr::new(10, 255, 0, 2)) + host))]
			}
		};

		let created = Port {
			id: cloud.id("port"),
			name: port.name.clone(),
			network_id: port.network_id.clone(),
			admin_state_up: port.admin_state_up,
			fixed_ips: ips
				.into_iter()
				.map(|ip_address| FixedIp {
					ip_address,
					subnet_id: subnet_id.clone(),
				})
				.collect(),
		};
		cloud.ports.push(created.clone());
		Ok(created)
	}

	async fn delete_port(&self, auth: &Auth, id: &str) -> Result<(), ApiError> {
		let mut cloud = self.cloud.borrow_mut();
		cloud.record("delete port", auth);
		if cloud.fail_deletes {
			return Err(ApiError::Status {
				status: 503,
				body: "maintenance".into(),
			});
		}

		let before = cloud.ports.len();
		cloud.ports.retain(|p| p.id != id);
		if cloud.ports.len() == before {
			Err(ApiError::NotFound)
		} else {
			Ok(())
		}
	}
}

/// Behaves like the `noop` plugin: echoes the injected address back.
#[derive(Debug, Default)]
pub struct FakeDelegate {
	fail_add: bool,
	fail_del: bool,
	calls: RefCell<Vec<(&'static str, Value)>>,
}

impl FakeDelegate {
	pub fn failing_add() -> Self {
		Self {
			fail_add: true,
			..Self::default()
		}
	}

	pub fn failing_del() -> Self {
		Self {
			fail_del: true,
			..Self::default()
		}
	}

	pub fn calls(&self) -> Vec<(&'static str, Value)> {
		self.calls.borrow().clone()
	}
}

#[async_trait(?Send)]
impl Delegate for FakeDelegate {
	async fn add(&self, plugin: &str, document: &Value) -> AppResult<LegacyReply> {
		assert_eq!(document["type"], json!(plugin));
		self.calls.borrow_mut().push(("ADD", document.clone()));
		if self.fail_add {
			return Err(AppError::Delegate(CniError::Generic("bridge is down".into())));
		}

		let ip: IpNetwork = document["ip"]
			.as_str()
			.ok_or(CniError::MissingOutput)?
			.parse()
			.map_err(|_| CniError::MissingOutput)?;
		Ok(LegacyReply {
			ip4: Some(IpConfigReply {
				ip,
				gateway: None,
				routes: Vec::new(),
			}),
			..LegacyReply::default()
		})
	}

	async fn del(&self, plugin: &str, document: &Value) -> AppResult<()> {
		assert_eq!(document["type"], json!(plugin));
		self.calls.borrow_mut().push(("DEL", document.clone()));
		if self.fail_del {
			Err(AppError::Delegate(CniError::Generic("ovs-vsctl exited 1".into())))
		} else {
			Ok(())
		}
	}
}

//! ADD and DEL, end to end.

use std::fmt;

use gofer_cni::reply::LegacyReply;
use log::{error, info, warn};

use crate::{
	config::{GoferConfig, NetworkName},
	delegate::Delegate,
	error::AppResult,
	keystone::TokenService,
	neutron::{Auth, NeutronApi},
	resolver::{Allocation, Resolver},
	state::{self, AttachmentRecord, StateStore},
};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Step {
	Authenticating,
	ResolvingNetwork,
	AllocatingPort,
	ReadingSubnet,
	Delegating,
	RollingBack,
	PersistingState,
	LoadingState,
	ReleasingPort,
	RemovingState,
}

impl fmt::Display for Step {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			Self::Authenticating => "authenticating",
			Self::ResolvingNetwork => "resolving network",
			Self::AllocatingPort => "allocating port",
			Self::ReadingSubnet => "reading subnet",
			Self::Delegating => "delegating",
			Self::RollingBack => "rolling back",
			Self::PersistingState => "persisting state",
			Self::LoadingState => "loading state",
			Self::ReleasingPort => "releasing port",
			Self::RemovingState => "removing state",
		})
	}
}

pub struct Gofer<'a> {
	config: &'a GoferConfig,
	resolver: Resolver<'a>,
	delegate: &'a dyn Delegate,
	store: StateStore,
}

impl<'a> Gofer<'a> {
	pub fn new(
		config: &'a GoferConfig,
		tokens: &'a dyn TokenService,
		neutron: &'a dyn NeutronApi,
		delegate: &'a dyn Delegate,
	) -> Self {
		Self {
			config,
			resolver: Resolver::new(config, tokens, neutron),
			delegate,
			store: StateStore::new(config.state_dir()),
		}
	}

	fn step(&self, command: &str, container_id: &str, step: Step) {
		info!("{} {}: {}", command, container_id, step);
	}

	/// Puts the container on its network.
	///
	/// If the subnet lookup or the delegate fails, the port is released again
	/// before that error is returned. Failures before that leave nothing to
	/// undo, except for a network created along the way, which is kept.
	pub async fn add(&self, container_id: &str) -> AppResult<LegacyReply> {
		self.step("ADD", container_id, Step::Authenticating);
		let auth = self.resolver.authenticate().await?;

		self.step("ADD", container_id, Step::ResolvingNetwork);
		let name = self.config.network_name();
		if let NetworkName::Fallback(n) = name {
			warn!(
				"no {:?} in metadata, using network {:?}",
				self.config.network.name_key, n
			);
		}
		let network = self.resolver.resolve_network(&auth, name.as_str()).await?;

		self.step("ADD", container_id, Step::AllocatingPort);
		let allocation = self
			.resolver
			.allocate_port(&auth, &network.id, container_id)
			.await?;

		let reply = match self.attach(&auth, container_id, &allocation).await {
			Ok(reply) => reply,
			Err(err) => {
				self.step("ADD", container_id, Step::RollingBack);
				warn!(
					"could not attach {}, releasing port {}: {}",
					container_id, allocation.port_id, err
				);
				if let Err(release) = self.resolver.release_port(&auth, &allocation.port_id).await {
					error!(
						"could not release port {} after failed attach, it is now orphaned: {}",
						allocation.port_id, release
					);
				}
				return Err(err);
			}
		};

		self.step("ADD", container_id, Step::PersistingState);
		self.store.save(
			container_id,
			&AttachmentRecord {
				ip: allocation.ip,
				neutron_port_id: allocation.port_id,
			},
		)?;

		info!("ADD {}: attached with {}", container_id, allocation.ip);
		Ok(reply)
	}

	/// Hands the allocated address, and the prefix of the subnet it came
	/// from, to the delegate.
	async fn attach(
		&self,
		auth: &Auth,
		container_id: &str,
		allocation: &Allocation,
	) -> AppResult<LegacyReply> {
		self.step("ADD", container_id, Step::ReadingSubnet);
		let cidr = match self.resolver.subnet_cidr(auth, allocation).await? {
			Some(cidr) => cidr,
			None => {
				warn!(
					"no subnet cidr for {} on port {}, using {}",
					allocation.ip, allocation.port_id, self.config.subnet.cidr
				);
				self.config.subnet.cidr
			}
		};

		self.step("ADD", container_id, Step::Delegating);
		let delegate = &self.config.delegate;
		let document = delegate.add_document(allocation.host_network(), cidr);
		self.delegate.add(&delegate.plugin, &document).await
	}

	/// Takes the container off its network.
	///
	/// Stops at the first failure; what was already done stays done.
	pub async fn del(&self, container_id: &str) -> AppResult<()> {
		self.step("DEL", container_id, Step::Delegating);
		let delegate = &self.config.delegate;
		self.delegate
			.del(&delegate.plugin, &delegate.del_document())
			.await?;

		self.step("DEL", container_id, Step::Authenticating);
		let auth = self.resolver.authenticate().await?;

		self.step("DEL", container_id, Step::LoadingState);
		let record = self.store.load(container_id).map_err(|err| {
			if state::is_missing(&err) {
				warn!(
					"no record for {} in {}, it was never added here",
					container_id,
					self.store.dir().display()
				);
			}
			err
		})?;

		self.step("DEL", container_id, Step::ReleasingPort);
		self.resolver
			.release_port(&auth, &record.neutron_port_id)
			.await?;

		self.step("DEL", container_id, Step::RemovingState);
		self.store.remove(container_id)?;

		info!("DEL {}: detached {}", container_id, record.ip);
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use std::fs;

	use async_std::task::block_on;
	use serde_json::{json, Value};
	use tempfile::TempDir;

	use super::*;
	use crate::{
		error::{ApiError, AppError},
		fake::{self, FakeDelegate, FakeKeystone, FakeNeutron},
	};

	const CONTAINER: &str = "some-container-id";

	fn state_file(tmp: &TempDir) -> Option<Value> {
		fs::read(tmp.path().join(CONTAINER))
			.ok()
			.map(|b| serde_json::from_slice(&b).unwrap())
	}

	#[test]
	fn add_with_noop_delegate() {
		let tmp = TempDir::new().unwrap();
		let config = fake::config_in(tmp.path());
		let (ks, neutron, delegate) = (
			FakeKeystone::default(),
			FakeNeutron::default(),
			FakeDelegate::default(),
		);
		neutron.set_fixed_ips(vec!["1.2.3.4".parse().unwrap()]);
		let gofer = Gofer::new(&config, &ks, &neutron, &delegate);

		let reply = block_on(gofer.add(CONTAINER)).unwrap();
		assert_eq!(
			serde_json::to_value(&reply).unwrap(),
			json!({"ip4": {"ip": "1.2.3.4/32"}, "dns": {}})
		);

		let calls = delegate.calls();
		assert_eq!(calls.len(), 1);
		let (cmd, doc) = &calls[0];
		assert_eq!(*cmd, "ADD");
		assert_eq!(doc["ip"], json!("1.2.3.4/32"));
		assert_eq!(doc["cidr"], json!("10.255.0.0/16"));
		assert_eq!(doc["some"], json!("other data"));
		assert_eq!(doc["cniVersion"], json!("0.2.0"));

		let state = state_file(&tmp).unwrap();
		assert_eq!(state["ip"], json!("1.2.3.4"));
		let port_id = state["neutron_port_id"].as_str().unwrap();
		assert_eq!(neutron.port(port_id).unwrap().name, CONTAINER);
	}

	#[test]
	fn del_after_add() {
		let tmp = TempDir::new().unwrap();
		let config = fake::config_in(tmp.path());
		let (ks, neutron, delegate) = (
			FakeKeystone::default(),
			FakeNeutron::default(),
			FakeDelegate::default(),
		);
		let gofer = Gofer::new(&config, &ks, &neutron, &delegate);

		block_on(gofer.add(CONTAINER)).unwrap();
		assert_eq!(neutron.port_count(), 1);

		block_on(gofer.del(CONTAINER)).unwrap();
		assert_eq!(neutron.port_count(), 0);
		assert!(state_file(&tmp).is_none());

		let calls = delegate.calls();
		assert_eq!(calls.len(), 2);
		assert_eq!(calls[1].0, "DEL");
		assert!(calls[1].1.get("ip").is_none());
		assert_eq!(calls[1].1["type"], json!("noop"));
	}

	#[test]
	fn adds_share_one_network() {
		let tmp = TempDir::new().unwrap();
		let config = fake::config_in(tmp.path());
		let (ks, neutron, delegate) = (
			FakeKeystone::default(),
			FakeNeutron::default(),
			FakeDelegate::default(),
		);
		let gofer = Gofer::new(&config, &ks, &neutron, &delegate);

		block_on(gofer.add("c1")).unwrap();
		block_on(gofer.add("c2")).unwrap();
		assert_eq!(neutron.network_count(), 1);
		assert_eq!(neutron.port_count(), 2);
		assert_ne!(
			fs::read(tmp.path().join("c1")).unwrap(),
			fs::read(tmp.path().join("c2")).unwrap()
		);
	}

	#[test]
	fn unusable_port_stops_before_delegate() {
		let tmp = TempDir::new().unwrap();
		let config = fake::config_in(tmp.path());
		let (ks, neutron, delegate) = (
			FakeKeystone::default(),
			FakeNeutron::default(),
			FakeDelegate::default(),
		);
		neutron.set_fixed_ips(vec![]);
		let gofer = Gofer::new(&config, &ks, &neutron, &delegate);

		let err = block_on(gofer.add(CONTAINER)).unwrap_err();
		assert!(matches!(err, AppError::Allocation { count: 0, .. }));
		assert!(delegate.calls().is_empty());
		assert!(state_file(&tmp).is_none());
		assert!(!neutron.calls().contains(&"delete port"));
	}

	#[test]
	fn delegate_failure_releases_port() {
		let tmp = TempDir::new().unwrap();
		let config = fake::config_in(tmp.path());
		let (ks, neutron, delegate) = (
			FakeKeystone::default(),
			FakeNeutron::default(),
			FakeDelegate::failing_add(),
		);
		let gofer = Gofer::new(&config, &ks, &neutron, &delegate);

		let err = block_on(gofer.add(CONTAINER)).unwrap_err();
		assert!(matches!(err, AppError::Delegate(_)));
		assert!(err.to_string().contains("bridge is down"));
		assert_eq!(neutron.port_count(), 0);
		assert_eq!(neutron.calls().last(), Some(&"delete port"));
		assert!(state_file(&tmp).is_none());
	}

	#[test]
	fn failed_rollback_keeps_delegate_error() {
		let tmp = TempDir::new().unwrap();
		let config = fake::config_in(tmp.path());
		let (ks, neutron, delegate) = (
			FakeKeystone::default(),
			FakeNeutron::default(),
			FakeDelegate::failing_add(),
		);
		neutron.fail_deletes();
		let gofer = Gofer::new(&config, &ks, &neutron, &delegate);

		let err = block_on(gofer.add(CONTAINER)).unwrap_err();
		assert!(matches!(err, AppError::Delegate(_)));
		assert_eq!(neutron.port_count(), 1);
	}

	#[test]
	fn delegate_gets_prefix_of_existing_subnet() {
		let tmp = TempDir::new().unwrap();
		let config = fake::config_in(tmp.path());
		let (ks, neutron, delegate) = (
			FakeKeystone::default(),
			FakeNeutron::default(),
			FakeDelegate::default(),
		);
		neutron.seed_network_with_subnet("space-1", "192.168.5.0/24");
		neutron.set_fixed_ips(vec!["192.168.5.9".parse().unwrap()]);
		let gofer = Gofer::new(&config, &ks, &neutron, &delegate);

		block_on(gofer.add("c1")).unwrap();
		let (_, doc) = &delegate.calls()[0];
		assert_eq!(doc["ip"], json!("192.168.5.9/32"));
		assert_eq!(doc["cidr"], json!("192.168.5.0/24"));
		assert_eq!(neutron.network_count(), 1);
	}

	#[test]
	fn bad_subnet_cidr_releases_port() {
		let tmp = TempDir::new().unwrap();
		let config = fake::config_in(tmp.path());
		let (ks, neutron, delegate) = (
			FakeKeystone::default(),
			FakeNeutron::default(),
			FakeDelegate::default(),
		);
		neutron.seed_network_with_subnet("space-1", "fd00::/64");
		let gofer = Gofer::new(&config, &ks, &neutron, &delegate);

		let err = block_on(gofer.add(CONTAINER)).unwrap_err();
		assert!(matches!(
			err,
			AppError::NeutronApi {
				op: "get subnet",
				err: ApiError::Decode(_)
			}
		));
		assert!(delegate.calls().is_empty());
		assert_eq!(neutron.port_count(), 0);
		assert!(state_file(&tmp).is_none());
	}

	#[test]
	fn auth_failure_makes_no_neutron_calls() {
		let tmp = TempDir::new().unwrap();
		let mut doc = fake::document();
		doc["state_dir"] = json!(tmp.path());
		doc["keystone_url"] = json!("http://127.0.0.1:5000");
		doc["keystone_username"] = json!("admin");
		doc["keystone_password"] = json!("wrong");
		let config = fake::load(doc);
		let (ks, neutron, delegate) = (
			FakeKeystone::rejecting(),
			FakeNeutron::default(),
			FakeDelegate::default(),
		);
		let gofer = Gofer::new(&config, &ks, &neutron, &delegate);

		let err = block_on(gofer.add(CONTAINER)).unwrap_err();
		assert!(matches!(err, AppError::Auth(_)));
		assert!(neutron.calls().is_empty());
		assert!(delegate.calls().is_empty());
	}

	#[test]
	fn token_used_for_every_neutron_call() {
		let tmp = TempDir::new().unwrap();
		let mut doc = fake::document();
		doc["state_dir"] = json!(tmp.path());
		doc["keystone_url"] = json!("http://127.0.0.1:5000");
		doc["keystone_username"] = json!("admin");
		doc["keystone_password"] = json!("secret");
		let config = fake::load(doc);
		let (ks, neutron, delegate) = (
			FakeKeystone::issuing("gAAAAAB"),
			FakeNeutron::default(),
			FakeDelegate::default(),
		);
		let gofer = Gofer::new(&config, &ks, &neutron, &delegate);

		block_on(gofer.add(CONTAINER)).unwrap();
		block_on(gofer.del(CONTAINER)).unwrap();
		assert_eq!(ks.calls(), 2);
		assert!(!neutron.auths().is_empty());
		assert!(neutron
			.auths()
			.iter()
			.all(|a| *a == Auth::Token("gAAAAAB".into())));
	}

	#[test]
	fn fallback_network_name() {
		let tmp = TempDir::new().unwrap();
		let mut doc = fake::document();
		doc["state_dir"] = json!(tmp.path());
		doc.as_object_mut().unwrap().remove("metadata");
		let config = fake::load(doc);
		let (ks, neutron, delegate) = (
			FakeKeystone::default(),
			FakeNeutron::default(),
			FakeDelegate::default(),
		);
		let gofer = Gofer::new(&config, &ks, &neutron, &delegate);

		block_on(gofer.add(CONTAINER)).unwrap();
		let port_id = state_file(&tmp).unwrap()["neutron_port_id"]
			.as_str()
			.unwrap()
			.to_owned();
		let network_id = neutron.port(&port_id).unwrap().network_id;
		let resolver = Resolver::new(&config, &ks, &neutron);
		let net = block_on(resolver.resolve_network(&Auth::Anonymous, "gofer-default")).unwrap();
		assert_eq!(net.id, network_id);
	}

	#[test]
	fn del_without_record() {
		let tmp = TempDir::new().unwrap();
		let config = fake::config_in(tmp.path());
		let (ks, neutron, delegate) = (
			FakeKeystone::default(),
			FakeNeutron::default(),
			FakeDelegate::default(),
		);
		let gofer = Gofer::new(&config, &ks, &neutron, &delegate);

		let err = block_on(gofer.del(CONTAINER)).unwrap_err();
		assert!(matches!(err, AppError::State { .. }));
		assert_eq!(delegate.calls().len(), 1);
		assert!(!neutron.calls().contains(&"delete port"));
	}

	#[test]
	fn del_delegate_failure_keeps_everything() {
		let tmp = TempDir::new().unwrap();
		let config = fake::config_in(tmp.path());
		let (ks, neutron) = (FakeKeystone::default(), FakeNeutron::default());

		let ok = FakeDelegate::default();
		block_on(Gofer::new(&config, &ks, &neutron, &ok).add(CONTAINER)).unwrap();

		let failing = FakeDelegate::failing_del();
		let err = block_on(Gofer::new(&config, &ks, &neutron, &failing).del(CONTAINER)).unwrap_err();
		assert!(matches!(err, AppError::Delegate(_)));
		assert_eq!(neutron.port_count(), 1);
		assert!(state_file(&tmp).is_some());
	}

	#[test]
	fn del_with_port_already_gone() {
		let tmp = TempDir::new().unwrap();
		let config = fake::config_in(tmp.path());
		let (ks, neutron, delegate) = (
			FakeKeystone::default(),
			FakeNeutron::default(),
			FakeDelegate::default(),
		);
		let gofer = Gofer::new(&config, &ks, &neutron, &delegate);
		block_on(gofer.add(CONTAINER)).unwrap();

		let port_id = state_file(&tmp).unwrap()["neutron_port_id"]
			.as_str()
			.unwrap()
			.to_owned();
		block_on(neutron.delete_port(&Auth::Anonymous, &port_id)).unwrap();

		block_on(gofer.del(CONTAINER)).unwrap();
		assert!(state_file(&tmp).is_none());
	}

	#[test]
	fn del_neutron_failure_keeps_record() {
		let tmp = TempDir::new().unwrap();
		let config = fake::config_in(tmp.path());
		let (ks, neutron, delegate) = (
			FakeKeystone::default(),
			FakeNeutron::default(),
			FakeDelegate::default(),
		);
		let gofer = Gofer::new(&config, &ks, &neutron, &delegate);
		block_on(gofer.add(CONTAINER)).unwrap();

		neutron.fail_deletes();
		let err = block_on(gofer.del(CONTAINER)).unwrap_err();
		assert!(matches!(
			err,
			AppError::NeutronApi {
				err: ApiError::Status { status: 503, .. },
				..
			}
		));
		assert!(state_file(&tmp).is_some());
	}
}

//! Neutron v2.0 networking API: the handful of calls needed to put a
//! container on a network.

use std::{fmt, net::IpAddr};

use async_trait::async_trait;
use ipnetwork::Ipv4Network;
use log::debug;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::net::Ipv4Addr;
use url::Url;

use crate::error::ApiError;

const AUTH_TOKEN_HEADER: &str = "X-Auth-Token";

/// Credentials presented on each call.
#[derive(Clone, PartialEq)]
pub enum Auth {
	/// No token; for deployments without Keystone in front of Neutron.
	Anonymous,
	Token(String),
}

impl fmt::Debug for Auth {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Anonymous => f.write_str("Anonymous"),
			Self::Token(_) => f.write_str("Token(<redacted>)"),
		}
	}
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct Network {
	pub id: String,
	#[serde(default)]
	pub name: String,
	#[serde(default)]
	pub admin_state_up: bool,
	#[serde(default)]
	pub subnets: Vec<String>,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct Subnet {
	pub id: String,
	#[serde(default)]
	pub name: String,
	#[serde(default)]
	pub network_id: String,
	#[serde(default)]
	pub cidr: Option<String>,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct Port {
	pub id: String,
	#[serde(default)]
	pub name: String,
	#[serde(default)]
	pub network_id: String,
	#[serde(default)]
	pub admin_state_up: bool,
	#[serde(default)]
	pub fixed_ips: Vec<FixedIp>,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct FixedIp {
	pub ip_address: IpAddr,
	#[serde(default)]
	pub subnet_id: String,
}

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct NewNetwork {
	pub name: String,
	pub admin_state_up: bool,
}

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct NewSubnet {
	pub network_id: String,
	pub name: String,
	pub ip_version: u8,
	pub cidr: Ipv4Network,
	pub allocation_pools: Vec<AllocationPool>,
}

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct AllocationPool {
	pub start: Ipv4Addr,
	pub end: Ipv4Addr,
}

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct NewPort {
	pub network_id: String,
	pub name: String,
	pub device_id: String,
	pub admin_state_up: bool,
}

#[derive(Deserialize)]
struct NetworkList {
	networks: Vec<Network>,
}

#[derive(Deserialize, Serialize)]
struct NetworkBody<T> {
	network: T,
}

#[derive(Deserialize, Serialize)]
struct SubnetBody<T> {
	subnet: T,
}

#[derive(Deserialize, Serialize)]
struct PortBody<T> {
	port: T,
}

/// The networking API as an opaque collaborator.
#[async_trait(?Send)]
pub trait NeutronApi {
	/// Networks whose name is exactly `name`.
	async fn list_networks(&self, auth: &Auth, name: &str) -> Result<Vec<Network>, ApiError>;
	async fn create_network(&self, auth: &Auth, network: &NewNetwork) -> Result<Network, ApiError>;
	async fn create_subnet(&self, auth: &Auth, subnet: &NewSubnet) -> Result<Subnet, ApiError>;
	async fn get_subnet(&self, auth: &Auth, id: &str) -> Result<Subnet, ApiError>;
	async fn create_port(&self, auth: &Auth, port: &NewPort) -> Result<Port, ApiError>;
	/// Fails with [`ApiError::NotFound`] if there's no such port.
	async fn delete_port(&self, auth: &Auth, id: &str) -> Result<(), ApiError>;
}

/// HTTP client for a Neutron endpoint.
#[derive(Clone, Debug)]
pub struct Neutron {
	url: Url,
}

impl Neutron {
	/// `url` must end in `/`; the config loader guarantees it.
	pub fn new(url: Url) -> Self {
		Self { url }
	}

	fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
		Ok(self.url.join("v2.0/")?.join(path)?)
	}
}

fn with_auth(req: surf::RequestBuilder, auth: &Auth) -> surf::RequestBuilder {
	match auth {
		Auth::Anonymous => req,
		Auth::Token(token) => req.header(AUTH_TOKEN_HEADER, token.as_str()),
	}
}

async fn send(req: surf::RequestBuilder) -> Result<surf::Response, ApiError> {
	let mut res = req.await?;
	let status = res.status();
	debug!("neutron: response status={}", status);

	if status == surf::StatusCode::NotFound {
		return Err(ApiError::NotFound);
	}

	if !status.is_success() {
		let body = res.body_string().await.unwrap_or_default();
		return Err(ApiError::Status {
			status: status.into(),
			body,
		});
	}

	Ok(res)
}

async fn send_json<T: DeserializeOwned>(req: surf::RequestBuilder) -> Result<T, ApiError> {
	let mut res = send(req).await?;
	res.body_json()
		.await
		.map_err(|err| ApiError::Decode(err.to_string()))
}

/// The name filter is exact in Neutron, but not in every proxy in front of it.
fn named(networks: Vec<Network>, name: &str) -> Vec<Network> {
	networks.into_iter().filter(|n| n.name == name).collect()
}

#[async_trait(?Send)]
impl NeutronApi for Neutron {
	async fn list_networks(&self, auth: &Auth, name: &str) -> Result<Vec<Network>, ApiError> {
		let mut url = self.endpoint("networks")?;
		url.query_pairs_mut().append_pair("name", name);
		debug!("neutron: GET {}", url);

		let list: NetworkList = send_json(with_auth(surf::get(url), auth)).await?;
		Ok(named(list.networks, name))
	}

	async fn create_network(&self, auth: &Auth, network: &NewNetwork) -> Result<Network, ApiError> {
		let url = self.endpoint("networks")?;
		debug!("neutron: POST {} {:?}", url, network);

		let body = surf::Body::from_json(&NetworkBody { network })?;
		let created: NetworkBody<Network> =
			send_json(with_auth(surf::post(url), auth).body(body)).await?;
		Ok(created.network)
	}

	async fn create_subnet(&self, auth: &Auth, subnet: &NewSubnet) -> Result<Subnet, ApiError> {
		let url = self.endpoint("subnets")?;
		debug!("neutron: POST {} {:?}", url, subnet);

		let body = surf::Body::from_json(&SubnetBody { subnet })?;
		let created: SubnetBody<Subnet> =
			send_json(with_auth(surf::post(url), auth).body(body)).await?;
		Ok(created.subnet)
	}

	async fn get_subnet(&self, auth: &Auth, id: &str) -> Result<Subnet, ApiError> {
		let url = self.endpoint(&format!("subnets/{}", id))?;
		debug!("neutron: GET {}", url);

		let found: SubnetBody<Subnet> = send_json(with_auth(surf::get(url), auth)).await?;
		Ok(found.subnet)
	}

	async fn create_port(&self, auth: &Auth, port: &NewPort) -> Result<Port, ApiError> {
		let url = self.endpoint("ports")?;
		debug!("neutron: POST {} {:?}", url, port);

		let body = surf::Body::from_json(&PortBody { port })?;
		let created: PortBody<Port> = send_json(with_auth(surf::post(url), auth).body(body)).await?;
		Ok(created.port)
	}

	async fn delete_port(&self, auth: &Auth, id: &str) -> Result<(), ApiError> {
		let url = self.endpoint(&format!("ports/{}", id))?;
		debug!("neutron: DELETE {}", url);

		send(with_auth(surf::delete(url), auth)).await?;
		Ok(())
	}
}

use std::process::exit;

use gofer_cni::{
	error::CniError,
	logger,
	reply::{reply, IpConfigReply, LegacyReply},
	Cni, Command, Inputs,
};
use ipnetwork::IpNetwork;
use log::{debug, error, info};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct NoopConfig {
	#[serde(default)]
	ip: Option<IpNetwork>,
}

fn add_result(config: &[u8]) -> Result<LegacyReply, CniError> {
	let config: NoopConfig = serde_json::from_slice(config)?;
	debug!("config={:?}", config);

	let ip = config
		.ip
		.ok_or_else(|| CniError::Generic("missing 'ip' in CNI net config".into()))?;
	let config = IpConfigReply {
		ip,
		gateway: None,
		routes: Vec::new(),
	};

	Ok(match ip {
		IpNetwork::V4(_) => LegacyReply {
			ip4: Some(config),
			..LegacyReply::default()
		},
		IpNetwork::V6(_) => LegacyReply {
			ip6: Some(config),
			..LegacyReply::default()
		},
	})
}

fn main() {
	logger::install("noop.log");
	debug!(
		"{} (CNI plugin) version {}",
		env!("CARGO_PKG_NAME"),
		env!("CARGO_PKG_VERSION")
	);

	// UNWRAP: VERSION is answered and exits inside load()
	let Inputs {
		command, config, ..
	} = Cni::load().into_inputs().unwrap();

	let cni_version = config.cni_version.clone(); // for error
	info!(
		"noop serving CNI v{} for command={:?} network={:?}",
		cni_version, command, config.name
	);

	match command {
		Command::Add => match add_result(&config.bytes) {
			Ok(res) => reply(res),
			Err(res) => {
				error!("error: {}", res);
				reply(res.into_reply(cni_version))
			}
		},
		Command::Del => exit(0),
		Command::Check | Command::Version => unreachable!(),
	}
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	#[test]
	fn echoes_address() {
		let reply = add_result(br#"{"type":"noop","ip":"1.2.3.4/32","some":"other data"}"#).unwrap();
		assert_eq!(
			serde_json::to_value(reply).unwrap(),
			json!({"ip4": {"ip": "1.2.3.4/32"}, "dns": {}})
		);
	}

	#[test]
	fn ipv6() {
		let reply = add_result(br#"{"ip":"fd00::7/128"}"#).unwrap();
		assert!(reply.ip4.is_none());
		assert_eq!(reply.ip6.unwrap().ip.prefix(), 128);
	}

	#[test]
	fn needs_address() {
		assert!(matches!(
			add_result(br#"{"type":"noop"}"#).unwrap_err(),
			CniError::Generic(_)
		));
		assert!(matches!(
			add_result(br#"{"ip":"nope"}"#).unwrap_err(),
			CniError::Json(_)
		));
	}
}

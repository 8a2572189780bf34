use std::process::exit;

use async_std::task::block_on;
use gofer_cni::{logger, reply::reply, Cni, Command, Inputs};
use log::{debug, error, info};

use crate::{config::OvsConfig, error::AppResult};

mod attach;
mod config;
mod error;
mod netns;
mod switch;
mod veth;

fn main() {
	let mut logconfig = logger::default_config();
	logconfig.add_filter_ignore_str("netlink_proto");
	logconfig.add_filter_ignore_str("netlink_sys");
	logger::with_config("ovs.log", logconfig.build());

	debug!(
		"{} (CNI plugin) version {}",
		env!("CARGO_PKG_NAME"),
		env!("CARGO_PKG_VERSION")
	);

	// UNWRAP: VERSION is answered and exits inside load()
	let Inputs {
		command,
		container_id,
		ifname,
		netns,
		config,
		..
	} = Cni::load().into_inputs().unwrap();

	let cni_version = config.cni_version.clone(); // for error
	info!(
		"ovs serving CNI v{} for command={:?} container={} ifname={} network={:?}",
		cni_version, command, container_id, ifname, config.name
	);

	let res: AppResult<Option<_>> = block_on(async move {
		let config = OvsConfig::load(&config.bytes)?;

		match command {
			Command::Add => {
				// UNWRAP: load() requires CNI_NETNS for ADD
				let netns = netns.unwrap();
				let result = attach::add(&config, &ifname, &netns).await?;
				info!(
					"attached {} as {} on {}",
					ifname, result.host_ifname, config.bridge
				);
				Ok(Some(result.into_reply()))
			}
			Command::Del => attach::del(&config, &ifname, netns.as_deref())
				.await
				.map(|_| None),
			Command::Check | Command::Version => unreachable!(),
		}
	});

	match res {
		Ok(Some(res)) => reply(res),
		Ok(None) => exit(0),
		Err(res) => {
			error!("error: {}", res);
			reply(res.into_reply(cni_version))
		}
	}
}

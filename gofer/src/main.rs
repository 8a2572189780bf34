use std::process::exit;

use async_std::task::block_on;
use gofer_cni::{logger, reply::reply, Cni, Command, Inputs};
use log::{debug, error, info};

use crate::{
	config::GoferConfig,
	delegate::ExecDelegate,
	error::AppResult,
	keystone::Keystone,
	neutron::Neutron,
	orchestrator::Gofer,
};

mod config;
mod delegate;
mod error;
mod keystone;
mod neutron;
mod orchestrator;
mod resolver;
mod state;

#[cfg(test)]
mod fake;

fn main() {
	logger::install("gofer.log");
	debug!(
		"{} (CNI plugin) version {}",
		env!("CARGO_PKG_NAME"),
		env!("CARGO_PKG_VERSION")
	);

	// UNWRAP: VERSION is answered and exits inside load()
	let Inputs {
		command,
		container_id,
		path,
		args,
		config,
		..
	} = Cni::load().into_inputs().unwrap();

	let cni_version = config.cni_version.clone(); // for error
	info!(
		"gofer serving CNI v{} for command={:?} container={} network={:?}",
		cni_version, command, container_id, config.name
	);
	if !args.is_empty() {
		debug!("CNI_ARGS (unused): {:?}", args);
	}

	let res: AppResult<Option<_>> = block_on(async move {
		let config = GoferConfig::load(&config.bytes)?;
		let neutron = Neutron::new(config.neutron_url.clone());
		let delegate = ExecDelegate::new(path);
		let gofer = Gofer::new(&config, &Keystone, &neutron, &delegate);

		match command {
			Command::Add => gofer.add(&container_id).await.map(Some),
			Command::Del => gofer.del(&container_id).await.map(|_| None),
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

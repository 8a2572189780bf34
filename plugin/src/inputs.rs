use std::path::PathBuf;

use crate::{args::CniArgs, config::Payload, Cni, Command};

/// The fields of an ADD or DEL invocation, flattened.
#[derive(Clone, Debug)]
pub struct Inputs {
	/// ADD or DEL.
	pub command: Command,
	/// `CNI_CONTAINERID`.
	pub container_id: String,
	/// `CNI_IFNAME`.
	pub ifname: String,
	/// `CNI_NETNS`, always present on ADD.
	pub netns: Option<PathBuf>,
	/// `CNI_PATH`.
	pub path: Vec<PathBuf>,
	/// `CNI_ARGS`.
	pub args: CniArgs,
	/// The network configuration.
	pub config: Payload,
}

impl Cni {
	/// Flattens an ADD or DEL; `None` for VERSION.
	pub fn into_inputs(self) -> Option<Inputs> {
		match self {
			Cni::Add {
				container_id,
				ifname,
				netns,
				path,
				args,
				config,
			} => Some(Inputs {
				command: Command::Add,
				container_id,
				ifname,
				netns: Some(netns),
				path,
				args,
				config,
			}),
			Cni::Del {
				container_id,
				ifname,
				netns,
				path,
				args,
				config,
			} => Some(Inputs {
				command: Command::Del,
				container_id,
				ifname,
				netns,
				path,
				args,
				config,
			}),
			Cni::Version(_) => None,
		}
	}
}

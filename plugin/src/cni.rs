use std::{
	env,
	io::{stdin, Read},
	path::PathBuf,
	str::FromStr,
};

use log::{debug, error};

use crate::{
	args::CniArgs,
	command::Command,
	config::Payload,
	error::{CniError, EmptyValueError, RegexValueError},
	path::CniPath,
	reply::{reply, VersionReply},
	version::{self, VersionPayload},
};

/// One plugin invocation, as read from the environment and STDIN.
#[derive(Clone, Debug)]
pub enum Cni {
	/// Attach.
	Add {
		/// `CNI_CONTAINERID`.
		container_id: String,
		/// `CNI_IFNAME`: interface name to create inside the namespace.
		ifname: String,
		/// `CNI_NETNS`: path to the network namespace.
		netns: PathBuf,
		/// `CNI_PATH`: where to look for delegate plugins.
		path: Vec<PathBuf>,
		/// `CNI_ARGS`.
		args: CniArgs,
		/// The network configuration.
		config: Payload,
	},
	/// Detach.
	Del {
		/// `CNI_CONTAINERID`.
		container_id: String,
		/// `CNI_IFNAME`.
		ifname: String,
		/// `CNI_NETNS`; may be gone already.
		netns: Option<PathBuf>,
		/// `CNI_PATH`.
		path: Vec<PathBuf>,
		/// `CNI_ARGS`.
		args: CniArgs,
		/// The network configuration.
		config: Payload,
	},
	/// Version query. Never returned by [`Cni::load`].
	Version(semver::Version),
}

impl Cni {
	/// Reads the invocation without replying on errors.
	pub fn from_env() -> Result<Self, CniError> {
		fn require_env<T>(var: &'static str) -> Result<T, CniError>
		where
			T: FromStr,
			T::Err: std::error::Error + Send + Sync + 'static,
		{
			env::var(var)
				.map_err(|err| CniError::MissingEnv { var, err })
				.and_then(|val| {
					debug!("read env var {} = {:?}", var, val);
					val.parse().map_err(|err| CniError::InvalidEnv {
						var,
						err: Box::new(err),
					})
				})
		}
		fn load_env<T>(var: &'static str) -> Result<Option<T>, CniError>
		where
			T: FromStr,
			T::Err: std::error::Error + Send + Sync + 'static,
		{
			require_env(var).map(Some).or_else(|err| {
				if let CniError::MissingEnv { .. } = err {
					Ok(None)
				} else {
					Err(err)
				}
			})
		}

		let path: CniPath = load_env("CNI_PATH")?.unwrap_or_default();
		let path = path.0;

		let mut bytes = Vec::with_capacity(1024);
		debug!("reading stdin til EOF...");
		stdin().read_to_end(&mut bytes)?;
		debug!("read payload bytes={}", bytes.len());
		if bytes.is_empty() {
			return Err(CniError::MissingInput);
		}

		let command: Command = require_env("CNI_COMMAND")?;
		if let Command::Version = command {
			let config: VersionPayload = serde_json::from_slice(&bytes)?;
			return Ok(Self::Version(config.cni_version));
		}

		let config = Payload::new(bytes);
		Self::check_version(&config)?;

		let container_id: String = require_env("CNI_CONTAINERID")?;
		check_container_id(&container_id)?;
		let ifname: String = require_env("CNI_IFNAME")?;
		let args: CniArgs = load_env("CNI_ARGS")?.unwrap_or_default();

		match command {
			Command::Add => Ok(Self::Add {
				container_id,
				ifname,
				netns: require_env("CNI_NETNS")?,
				path,
				args,
				config,
			}),
			Command::Del => Ok(Self::Del {
				container_id,
				ifname,
				netns: load_env::<String>("CNI_NETNS")?
					.filter(|ns| !ns.is_empty())
					.map(PathBuf::from),
				path,
				args,
				config,
			}),
			Command::Check => Err(CniError::UnsupportedCommand(Command::Check.as_ref())),
			Command::Version => unreachable!("handled above"),
		}
	}

	/// Reads the invocation, replying and exiting on errors and on VERSION.
	///
	/// The returned value is therefore never [`Cni::Version`].
	pub fn load() -> Self {
		debug!(
			"CNI plugin built with {} crate version {}",
			env!("CARGO_PKG_NAME"),
			env!("CARGO_PKG_VERSION")
		);

		match Self::from_env() {
			Err(e) => {
				error!("{}", e);
				reply(e.into_reply(version::latest_version()))
			}
			Ok(Cni::Version(v)) => Self::handle_version(v),
			Ok(c) => c,
		}
	}

	fn check_version(config: &Payload) -> Result<(), CniError> {
		if config.declared_version && !version::is_supported(&config.cni_version) {
			Err(CniError::Incompatible(config.cni_version.clone()))
		} else {
			Ok(())
		}
	}

	fn handle_version(requested: semver::Version) -> ! {
		debug!("version query for cniVersion={}", requested);
		reply(VersionReply::supported())
	}
}

pub(crate) fn check_container_id(id: &str) -> Result<(), CniError> {
	if id.is_empty() {
		return Err(CniError::InvalidEnv {
			var: "CNI_CONTAINERID",
			err: Box::new(EmptyValueError),
		});
	}

	// UNWRAP: static pattern
	let re = regex::Regex::new(r"^[a-z0-9][a-z0-9_.\-]*$").unwrap();
	if !re.is_match(id) {
		return Err(CniError::InvalidEnv {
			var: "CNI_CONTAINERID",
			err: Box::new(RegexValueError(re)),
		});
	}

	Ok(())
}

//! Logging setup.
//!
//! STDOUT belongs to the result document, so nothing is ever logged there.

use std::{
	fs::OpenOptions,
	path::{Path, PathBuf},
};

use simplelog::{
	ColorChoice, CombinedLogger, Config, ConfigBuilder, LevelFilter, SharedLogger,
	TermLogger, TerminalMode, WriteLogger,
};

/// The default file logger configuration: thread and target shown at `info`.
pub fn default_config() -> ConfigBuilder {
	let mut config = ConfigBuilder::new();
	config.set_thread_level(LevelFilter::Info);
	config.set_target_level(LevelFilter::Info);
	config
}

/// Installs the standard logger under `name`.
///
/// `warn` and `error` always go to STDERR. Everything from `debug` up also
/// goes to `name.log`, in the working directory for debug builds, or in
/// `/var/log/cni` for release builds with the **release-logs** feature.
///
/// Failing to set up the log file is reported on STDERR and otherwise
/// ignored: a plugin must still be able to run on a read-only host.
pub fn install(name: impl AsRef<Path>) {
	with_config(name, default_config().build())
}

/// As [`install`], with a custom configuration for the file logger.
pub fn with_config(name: impl AsRef<Path>, config: Config) {
	let mut loggers: Vec<Box<dyn SharedLogger>> = vec![TermLogger::new(
		LevelFilter::Warn,
		Default::default(),
		TerminalMode::Stderr,
		ColorChoice::Never,
	)];

	if cfg!(any(debug_assertions, feature = "release-logs")) {
		match open_logfile(name.as_ref()) {
			Ok(file) => loggers.push(WriteLogger::new(LevelFilter::Debug, config, file)),
			Err(err) => eprintln!("cannot open log file for {}: {}", name.as_ref().display(), err),
		}
	}

	// Err only if a logger is already installed, in which case it stays.
	CombinedLogger::init(loggers).ok();
}

fn open_logfile(name: &Path) -> std::io::Result<std::fs::File> {
	let logdir = if cfg!(debug_assertions) {
		std::env::current_dir()?
	} else {
		PathBuf::from("/var/log/cni")
	};

	let mut logfile = logdir.join(name);
	logfile.set_extension("log");

	if let Some(dir) = logfile.parent() {
		std::fs::create_dir_all(dir)?;
	}

	OpenOptions::new().append(true).create(true).open(logfile)
}

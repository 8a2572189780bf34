//! Plugin delegation.
//!
//! Only available with the **with-smol** feature.
//!
//! A delegate is run with the same environment as its parent, except for
//! `CNI_COMMAND`, which is set to the requested command, and `CNI_PATH`,
//! which is set explicitly from the search path the parent was given. The
//! configuration document is written to its STDIN and its STDOUT is read
//! back; STDERR is inherited.

use std::{
	env,
	io::Cursor,
	path::{Path, PathBuf},
	process::{ExitStatus, Stdio},
};

use log::{debug, error, info};
use which::which_in;

use crate::{error::CniError, path::CniPath, reply::ReplyPayload, Command};

/// Runs a delegate and decodes its result.
///
/// Unlike some plugin chains, no DEL is issued to the delegate when its ADD
/// fails: compensation is the caller's decision.
///
/// # Errors
///
/// This function errors if:
/// - the current directory can’t be obtained
/// - the search `path` doesn't contain `sub_plugin`
/// - the delegate exits unsuccessfully, or prints nothing, or prints
///   something that doesn't decode as `S`
pub async fn delegate<S>(
	sub_plugin: &str,
	command: Command,
	path: &[PathBuf],
	config: &[u8],
) -> Result<S, CniError>
where
	S: for<'de> ReplyPayload<'de>,
{
	let plugin = find_plugin(sub_plugin, path)?;
	let (status, stdout) = delegate_command(&plugin, command, path, config)
		.await
		.map_err(|err| {
			error!("error running delegate: {}", err);
			delegated(sub_plugin, err)
		})?;

	if !status.success() {
		return Err(delegated(sub_plugin, failure(&stdout)));
	}

	if stdout.is_empty() {
		return Err(delegated(sub_plugin, CniError::MissingOutput));
	}

	serde_json::from_reader(Cursor::new(stdout)).map_err(|err| delegated(sub_plugin, err.into()))
}

/// Runs a delegate for a command that produces no result.
///
/// Anything the delegate prints on success is ignored.
pub async fn delegate_teardown(
	sub_plugin: &str,
	command: Command,
	path: &[PathBuf],
	config: &[u8],
) -> Result<(), CniError> {
	let plugin = find_plugin(sub_plugin, path)?;
	let (status, stdout) = delegate_command(&plugin, command, path, config)
		.await
		.map_err(|err| {
			error!("error running delegate: {}", err);
			delegated(sub_plugin, err)
		})?;

	if status.success() {
		Ok(())
	} else {
		Err(delegated(sub_plugin, failure(&stdout)))
	}
}

fn find_plugin(sub_plugin: &str, path: &[PathBuf]) -> Result<PathBuf, CniError> {
	let cwd = env::current_dir().map_err(|_| CniError::NoCwd)?;
	which_in(sub_plugin, Some(CniPath::to_env(path)), cwd).map_err(|err| {
		CniError::MissingPlugin {
			name: sub_plugin.into(),
			err,
		}
	})
}

fn delegated(plugin: &str, err: CniError) -> CniError {
	CniError::Delegated {
		plugin: plugin.into(),
		err: Box::new(err),
	}
}

/// Prefers the `details` of an error document, falls back to raw output.
fn failure(stdout: &[u8]) -> CniError {
	let details = serde_json::from_slice::<serde_json::Value>(stdout)
		.ok()
		.and_then(|v| {
			v.get("details")
				.or_else(|| v.get("msg"))
				.and_then(|d| d.as_str())
				.map(ToOwned::to_owned)
		})
		.unwrap_or_else(|| String::from_utf8_lossy(stdout).into());
	CniError::Generic(details)
}

async fn delegate_command(
	plugin: impl AsRef<Path>,
	command: impl AsRef<str>,
	path: &[PathBuf],
	stdin_bytes: &[u8],
) -> Result<(ExitStatus, Vec<u8>), CniError> {
	use async_process::Command;
	use futures::io::{copy, AsyncWriteExt, Cursor};

	let plugin = plugin.as_ref();
	let command = command.as_ref();

	info!(
		"delegating to plugin at {} for command={}",
		plugin.display(),
		command
	);

	debug!("spawing child process");
	let mut child = Command::new(plugin)
		.env("CNI_COMMAND", command)
		.env("CNI_PATH", CniPath::to_env(path))
		.stdin(Stdio::piped())
		.stdout(Stdio::piped())
		.stderr(Stdio::inherit())
		.spawn()?;

	{
		debug!("taking child stdin");
		let mut stdin = child.stdin.take().unwrap();
		// UNWRAP: stdin configured above

		debug!("copying bytes={} to stdin", stdin_bytes.len());
		let bytes = Cursor::new(stdin_bytes);
		let written = copy(bytes, &mut stdin).await?;

		debug!("closing stdin");
		stdin.close().await?;

		debug_assert_eq!(written as usize, stdin_bytes.len());
	}

	debug!("awaiting child");
	let output = child.output().await?;

	info!(
		"delegate plugin at {} for command={} has returned with {}; stdout bytes={}",
		plugin.display(),
		command,
		output.status,
		output.stdout.len()
	);
	Ok((output.status, output.stdout))
}

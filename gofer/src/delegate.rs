use std::path::PathBuf;

use async_trait::async_trait;
use gofer_cni::{
	delegation::{delegate, delegate_teardown},
	error::CniError,
	reply::LegacyReply,
	Command,
};
use log::debug;
use serde_json::Value;

use crate::error::{AppError, AppResult};

/// The chained plugin that attaches the container to the data plane.
#[async_trait(?Send)]
pub trait Delegate {
	async fn add(&self, plugin: &str, document: &Value) -> AppResult<LegacyReply>;
	async fn del(&self, plugin: &str, document: &Value) -> AppResult<()>;
}

/// Runs the delegate as a plugin executable found on the CNI search path.
#[derive(Clone, Debug)]
pub struct ExecDelegate {
	path: Vec<PathBuf>,
}

impl ExecDelegate {
	pub fn new(path: Vec<PathBuf>) -> Self {
		Self { path }
	}
}

fn encode(document: &Value) -> AppResult<Vec<u8>> {
	serde_json::to_vec(document).map_err(|err| AppError::Delegate(CniError::Json(err)))
}

#[async_trait(?Send)]
impl Delegate for ExecDelegate {
	async fn add(&self, plugin: &str, document: &Value) -> AppResult<LegacyReply> {
		debug!("delegate ADD to {}: {}", plugin, document);
		delegate(plugin, Command::Add, &self.path, &encode(document)?)
			.await
			.map_err(AppError::Delegate)
	}

	async fn del(&self, plugin: &str, document: &Value) -> AppResult<()> {
		debug!("delegate DEL to {}: {}", plugin, document);
		delegate_teardown(plugin, Command::Del, &self.path, &encode(document)?)
			.await
			.map_err(AppError::Delegate)
	}
}

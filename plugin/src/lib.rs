#![warn(missing_docs)]

//! Shared plumbing for the gofer CNI plugins.
//!
//! Every plugin in this workspace is a short-lived process speaking the
//! legacy (0.1.0 / 0.2.0) CNI invocation protocol: the command and container
//! details arrive as environment variables, the network configuration arrives
//! on STDIN, and a single JSON document (result or error) is printed on STDOUT
//! before exiting.
//!
//! # Quick start
//!
//! ```no_run
//! use gofer_cni::{logger, Cni};
//! logger::install("hello-world");
//! match Cni::load() {
//!     Cni::Add { container_id, ifname, netns, path, args, config } => {}
//!     Cni::Del { container_id, ifname, netns, path, args, config } => {}
//!     Cni::Version(_) => unreachable!()
//! }
//! ```

pub use args::CniArgs;
pub use cni::Cni;
pub use command::Command;
pub use config::Payload;
pub use inputs::Inputs;

pub mod config;
#[cfg(feature = "with-smol")]
pub mod delegation;
pub mod error;
pub mod logger;
pub mod macaddr;
pub mod reply;

mod args;
mod cni;
mod command;
mod inputs;
mod path;
mod version;

use std::{
	convert::Infallible,
	env::{join_paths, split_paths},
	ffi::OsString,
	path::PathBuf,
	str::FromStr,
};

/// The plugin search path from `CNI_PATH`.
#[derive(Clone, Debug, Default)]
pub(crate) struct CniPath(pub Vec<PathBuf>);

impl CniPath {
	/// Re-joins the entries for handing to a child process.
	///
	/// An entry containing the separator can't have come from splitting
	/// `CNI_PATH`, so that case yields an empty path.
	pub fn to_env(paths: &[PathBuf]) -> OsString {
		join_paths(paths.iter()).unwrap_or_default()
	}
}

impl FromStr for CniPath {
	type Err = Infallible;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Ok(Self(split_paths(s).map(PathBuf::from).collect()))
	}
}

#[cfg(test)]
mod tests {
	use std::path::PathBuf;

	use super::CniPath;

	#[test]
	fn splits_and_joins() {
		let path: CniPath = "/opt/cni/bin:/usr/libexec/cni".parse().unwrap();
		assert_eq!(
			path.0,
			vec![
				PathBuf::from("/opt/cni/bin"),
				PathBuf::from("/usr/libexec/cni")
			]
		);
		assert_eq!(
			CniPath::to_env(&path.0),
			std::ffi::OsString::from("/opt/cni/bin:/usr/libexec/cni")
		);
	}
}

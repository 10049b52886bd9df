use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputImageFormat {
	#[default]
	Raw,
	Vhd,
	Vhdx,
	Qcow2,
	Iso,
	PxeDir,
	Tarball,
	Cosi,
}

impl OutputImageFormat {
	/// Only `PxeDir` may legitimately name an existing directory as its
	/// output path; every other format's output path must not be one.
	#[must_use]
	pub const fn allows_directory_output(self) -> bool {
		matches!(self, Self::PxeDir)
	}
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CosiCompression {
	pub level: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct OutputImageConfig {
	pub path: Option<String>,
	pub format: Option<OutputImageFormat>,
	pub cosi: CosiCompression,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct OutputArtifacts {
	pub path: Option<String>,
	pub items: Vec<String>,
}

impl OutputArtifacts {
	#[must_use]
	pub fn path_buf(&self) -> Option<PathBuf> {
		self.path.as_ref().map(PathBuf::from)
	}
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Output {
	pub image: OutputImageConfig,
	pub artifacts: OutputArtifacts,
	pub selinux_policy_path: Option<String>,
}

pub use OutputImageConfig as OutputImage;

//! The declarative configuration data model.
//!
//! `Config` is what a single YAML file deserializes into; `ConfigWithBasePath`
//! is one node of a resolved [`crate::cfgchain`] chain; `ResolvedConfig` is
//! the engine's central record, built by [`crate::resolver`].

mod iso;
mod os;
mod output;
mod pxe;
mod scripts;
mod storage;

pub use iso::{InitramfsType, IsoConfig};
pub use os::{BootLoaderResetType, KernelCommandLine, Os, SelinuxMode, UkiConfig, UkiMode};
pub use output::{CosiCompression, Output, OutputArtifacts, OutputImage, OutputImageFormat};
pub use pxe::PxeConfig;
pub use scripts::{Script, ScriptsConfig};
pub use storage::{BootType, FileSystem, Partition, Storage, VerityDevice};

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Known preview-feature names. `PackageSnapshotTime`, `Convert`, and
/// `CosiCompression` each require their name to appear in
/// [`Config::preview_features`] before the corresponding field is honored.
pub mod preview_features {
	pub const PACKAGE_SNAPSHOT_TIME: &str = "PackageSnapshotTime";
	pub const CONVERT: &str = "Convert";
	pub const COSI_COMPRESSION: &str = "CosiCompression";
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct InputImage {
	pub path: Option<String>,
	pub oci: Option<String>,
	pub azure_linux: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Input {
	pub image: InputImage,
}

/// One YAML configuration file, as loaded from disk. `base_configs` is the
/// only field [`crate::cfgchain`] inspects directly; everything else is
/// opaque to chain-building and only matters to [`crate::resolver`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "camelCase")]
pub struct Config {
	pub base_configs: Vec<String>,

	pub input: Input,
	pub output: Output,
	pub os: Os,
	pub storage: Storage,
	pub scripts: ScriptsConfig,
	pub iso: IsoConfig,
	pub pxe: PxeConfig,

	pub preview_features: Vec<String>,
}

impl Config {
	/// Parse one YAML document. Unknown top-level keys are a hard error
	/// (`deny_unknown_fields`), matching the "unknown top-level keys:
	/// rejected" contract in the external-interfaces section.
	pub fn from_yaml(text: &str) -> color_eyre::Result<Self> {
		Ok(serde_yaml::from_str(text)?)
	}

	pub fn load(path: &Path) -> color_eyre::Result<Self> {
		let text = std::fs::read_to_string(path)?;
		Self::from_yaml(&text)
	}

	#[must_use]
	pub fn has_preview_feature(&self, name: &str) -> bool {
		self.preview_features.iter().any(|f| f == name)
	}
}

/// One node of a resolved configuration chain: the config plus the absolute
/// path of the directory it was loaded from (bases and scripts resolve
/// relative to this).
#[derive(Debug, Clone)]
pub struct ConfigWithBasePath {
	pub config: Config,
	pub base_config_path: PathBuf,
}

/// CLI-supplied overrides. These win over every config value for the fields
/// named in the resolver's "CLI beats config" list.
#[derive(Debug, Clone, Default)]
pub struct CliOptions {
	pub output_format: Option<OutputImageFormat>,
	pub output_file: Option<PathBuf>,
	pub package_snapshot_time: Option<String>,
	pub cosi_compression_level: Option<u32>,
	pub output_selinux_policy_path: Option<PathBuf>,
	pub rpm_sources: Vec<String>,
	pub use_base_image_rpm_repos: bool,
}

/// The engine's central record: a fully resolved configuration plus the
/// runtime context (build directory, image handles) threaded through every
/// subsequent stage.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
	pub base_config_path: PathBuf,
	pub config: Config,
	pub options: CliOptions,
	pub build_dir_abs: PathBuf,
	pub raw_image_file: Option<PathBuf>,
	pub input_image: InputImage,
	pub config_chain: Vec<ConfigWithBasePath>,
	pub customize_os_partitions: bool,
	pub image_uuid: uuid::Uuid,

	pub input_image_file: Option<PathBuf>,
	pub input_image_oci: Option<String>,
	pub output_image_file: PathBuf,
	pub output_image_format: OutputImageFormat,
	pub output_artifacts: OutputArtifacts,
	pub output_selinux_policy_path: Option<PathBuf>,

	pub hostname: Option<String>,
	pub selinux: SelinuxMode,
	pub bootloader_reset: BootLoaderResetType,
	pub uki: UkiConfig,
	pub kernel_command_line: KernelCommandLine,
	pub cosi_compression: CosiCompression,

	pub iso: IsoConfig,
	pub pxe: PxeConfig,
}

impl ResolvedConfig {
	#[must_use]
	pub fn image_uuid_str(&self) -> String {
		self.image_uuid.as_hyphenated().to_string()
	}
}

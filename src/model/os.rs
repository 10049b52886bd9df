use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SelinuxMode {
	#[default]
	Default,
	Disabled,
	ForceEnforcing,
	Permissive,
	Enforcing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BootLoaderResetType {
	#[default]
	None,
	Hard,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BootLoader {
	pub reset_type: BootLoaderResetType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UkiMode {
	#[default]
	Passthrough,
	Modify,
	Create,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UkiConfig {
	pub mode: UkiMode,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct KernelCommandLine {
	pub extra_command_line: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Packages {
	pub install: Vec<String>,
	pub remove: Vec<String>,
	pub update: Vec<String>,
	pub install_lists: Vec<String>,
	pub remove_lists: Vec<String>,
	pub update_lists: Vec<String>,
	pub update_existing_packages: bool,
	pub snapshot_time: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Services {
	pub enable: Vec<String>,
	pub disable: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Os {
	pub hostname: Option<String>,
	pub selinux: SelinuxModeWrapper,
	pub boot_loader: BootLoader,
	pub kernel_command_line: KernelCommandLine,
	pub packages: Packages,
	pub users: Vec<crate::cfg::auth::Auth>,
	pub groups: Vec<String>,
	pub additional_files: Vec<AdditionalFile>,
	pub additional_dirs: Vec<String>,
	pub services: Services,
	pub modules: Modules,
	pub uki: UkiConfig,
	pub image_history: bool,
	pub overlays: Vec<String>,
}

/// Thin wrapper so `os.selinux.mode` reads as a nested field the way the
/// spec's dotted path (`OS{SELinux{Mode}}`) implies, while still letting
/// `SelinuxMode` be used bare wherever only the mode itself is needed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SelinuxModeWrapper {
	pub mode: SelinuxMode,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AdditionalFile {
	pub source: String,
	pub destination: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Modules {
	pub add: Vec<String>,
	pub remove: Vec<String>,
}

use serde::{Deserialize, Serialize};

/// Same shape as [`super::IsoConfig`] — the spec names it "…same…" — kept as
/// its own type rather than a type alias so ISO- and PXE-specific
/// validation can diverge without entangling the two call sites.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PxeConfig {
	pub kernel_command_line: Vec<String>,
	pub additional_files: Vec<String>,
	pub initramfs_type: Option<super::iso::InitramfsType>,
	pub kdump_boot_files: Option<Vec<String>>,
	pub bootstrap_base_url: Option<String>,
	pub bootstrap_file_url: Option<String>,
}

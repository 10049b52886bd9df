use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum InitramfsType {
	Bootstrap,
	FullOs,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct IsoConfig {
	pub kernel_command_line: Vec<String>,
	pub additional_files: Vec<String>,
	pub initramfs_type: Option<InitramfsType>,
	pub kdump_boot_files: Option<Vec<String>>,
	pub bootstrap_base_url: Option<String>,
	pub bootstrap_file_url: Option<String>,
}

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BootType {
	#[default]
	Efi,
	Legacy,
	None,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct VerityDevice {
	pub id: String,
	pub data_device_id: String,
	pub hash_device_id: String,
	pub corruption_option: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Partition {
	pub id: String,
	pub size: Option<bytesize::ByteSize>,
	#[serde(rename = "type")]
	pub kind: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FileSystem {
	pub device_id: String,
	pub mount_point: Option<String>,
	#[serde(rename = "type")]
	pub kind: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Storage {
	pub boot_type: BootType,
	pub verity: Vec<VerityDevice>,
	pub file_systems: Vec<FileSystem>,
	pub partitions: Vec<Partition>,
}

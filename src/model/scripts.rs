use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Script {
	/// Relative to the directory of the config that declared it; must not be
	/// absolute or escape that directory (see [`crate::validator`]).
	pub path: String,
	pub chroot: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ScriptsConfig {
	#[serde(rename = "postCustomization")]
	pub post_customization: Vec<Script>,
	#[serde(rename = "finalizeCustomization")]
	pub finalize_customization: Vec<Script>,
}

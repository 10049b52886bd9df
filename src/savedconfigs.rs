//! Cross-pass persisted state: a YAML side-channel embedded inside the
//! LiveOS artifacts directory so that configuration fragments with no home
//! on the root filesystem (bootstrap URLs, the dracut package that produced
//! the current initrd, …) survive repeated customization passes.

use std::path::Path;

use color_eyre::Result;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::model::SelinuxMode;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LiveOsSaved {
	#[serde(rename = "kernelCommandLine")]
	pub kernel_command_line: KernelCommandLineSaved,
	#[serde(rename = "kdumpBootFiles")]
	pub kdump_boot_files: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct KernelCommandLineSaved {
	#[serde(rename = "extraCommandLine")]
	pub extra_command_line: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PxeSaved {
	#[serde(rename = "bootstrapBaseUrl")]
	pub bootstrap_base_url: Option<String>,
	#[serde(rename = "bootstrapFileUrl")]
	pub bootstrap_file_url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
pub struct OsSaved {
	pub dracut_package: Option<String>,
	pub selinux_requested_mode: Option<SelinuxMode>,
	pub selinux_policy_package: Option<String>,
	pub kernel_version: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SavedConfigs {
	pub liveos: LiveOsSaved,
	pub pxe: PxeSaved,
	pub os: OsSaved,
}

/// The new-this-pass values a [`SavedConfigs::update`] call contributes,
/// before being merged with whatever was already on disk.
#[derive(Debug, Clone, Default)]
pub struct NewSavedConfigs {
	pub extra_command_line: Vec<String>,
	pub kdump_boot_files: Option<Vec<String>>,
	pub bootstrap_base_url: Option<String>,
	pub bootstrap_file_url: Option<String>,
	pub dracut_package_info: Option<String>,
	pub requested_selinux_mode: SelinuxMode,
	pub selinux_package_info: Option<String>,
	pub kernel_version: String,
}

impl SavedConfigs {
	/// Read `path` if it exists; absence is not an error (first pass).
	pub fn read_if_exists(path: &Path) -> Result<Option<Self>> {
		if !path.exists() {
			return Ok(None);
		}
		let text = std::fs::read_to_string(path)?;
		Ok(Some(serde_yaml::from_str(&text)?))
	}

	/// Load any prior file at `path` and merge it with `new` per the
	/// field-by-field precedence rules, returning the merged record without
	/// writing it — callers persist separately with [`Self::persist`].
	#[instrument(skip(new))]
	pub fn load_and_merge(path: &Path, new: NewSavedConfigs) -> Result<Self> {
		let prior = Self::read_if_exists(path)?;

		let mut extra_command_line = Vec::new();
		if let Some(prior) = &prior {
			extra_command_line.extend(prior.liveos.kernel_command_line.extra_command_line.iter().cloned());
		}
		extra_command_line.extend(new.extra_command_line);

		let (mut bootstrap_base_url, mut bootstrap_file_url) = (new.bootstrap_base_url, new.bootstrap_file_url);
		if let Some(prior) = &prior {
			if bootstrap_base_url.as_deref().map(str::is_empty).unwrap_or(true) {
				bootstrap_base_url = prior.pxe.bootstrap_base_url.clone();
			}
			if bootstrap_file_url.as_deref().map(str::is_empty).unwrap_or(true) {
				bootstrap_file_url = prior.pxe.bootstrap_file_url.clone();
			}
		}
		// Enforce the XOR: a freshly supplied non-empty value clears its sibling.
		let new_base_supplied = new_base_nonempty(&new.bootstrap_base_url);
		let new_file_supplied = new_file_nonempty(&new.bootstrap_file_url);
		if new_base_supplied {
			bootstrap_file_url = None;
		}
		if new_file_supplied {
			bootstrap_base_url = None;
		}

		let dracut_package = new.dracut_package_info.or_else(|| prior.as_ref().and_then(|p| p.os.dracut_package.clone()));
		let selinux_requested_mode = if new.requested_selinux_mode == SelinuxMode::Default {
			prior.as_ref().and_then(|p| p.os.selinux_requested_mode).unwrap_or(SelinuxMode::Default)
		} else {
			new.requested_selinux_mode
		};
		let selinux_policy_package =
			new.selinux_package_info.or_else(|| prior.as_ref().and_then(|p| p.os.selinux_policy_package.clone()));
		let kdump_boot_files = new.kdump_boot_files.or_else(|| prior.as_ref().and_then(|p| p.liveos.kdump_boot_files.clone()));
		let kernel_version = if new.kernel_version.is_empty() {
			prior.as_ref().and_then(|p| p.os.kernel_version.clone()).unwrap_or_default()
		} else {
			new.kernel_version
		};

		debug!(?extra_command_line, ?bootstrap_base_url, ?bootstrap_file_url, "merged saved configs");

		Ok(Self {
			liveos: LiveOsSaved {
				kernel_command_line: KernelCommandLineSaved { extra_command_line },
				kdump_boot_files,
			},
			pxe: PxeSaved { bootstrap_base_url, bootstrap_file_url },
			os: OsSaved {
				dracut_package,
				selinux_requested_mode: Some(selinux_requested_mode),
				selinux_policy_package,
				kernel_version: Some(kernel_version).filter(|s| !s.is_empty()),
			},
		})
	}

	/// Persist atomically: `mkdir -p` the parent directory then write the
	/// YAML document.
	pub fn persist(&self, path: &Path) -> Result<()> {
		if let Some(parent) = path.parent() {
			std::fs::create_dir_all(parent)?;
		}
		let serialized = serde_yaml::to_string(self)?;
		std::fs::write(path, serialized)?;
		Ok(())
	}
}

fn new_base_nonempty(v: &Option<String>) -> bool {
	v.as_deref().is_some_and(|s| !s.is_empty())
}
fn new_file_nonempty(v: &Option<String>) -> bool {
	v.as_deref().is_some_and(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
	use tempfile::tempdir;

	use super::{NewSavedConfigs, SavedConfigs};

	#[test]
	fn read_modify_write_is_idempotent() {
		let dir = tempdir().unwrap();
		let path = dir.path().join("saved-configs.yaml");

		let first = SavedConfigs::load_and_merge(
			&path,
			NewSavedConfigs { extra_command_line: vec!["quiet".into()], ..Default::default() },
		)
		.unwrap();
		first.persist(&path).unwrap();

		let identity = SavedConfigs::load_and_merge(&path, NewSavedConfigs::default()).unwrap();
		identity.persist(&path).unwrap();

		let reread = SavedConfigs::read_if_exists(&path).unwrap().unwrap();
		assert_eq!(reread, identity);
		assert_eq!(reread.liveos.kernel_command_line.extra_command_line, vec!["quiet".to_string()]);
	}

	#[test]
	fn extra_command_line_accumulates_across_passes() {
		let dir = tempdir().unwrap();
		let path = dir.path().join("saved-configs.yaml");

		let first = SavedConfigs::load_and_merge(
			&path,
			NewSavedConfigs { extra_command_line: vec!["quiet".into()], ..Default::default() },
		)
		.unwrap();
		first.persist(&path).unwrap();

		let second = SavedConfigs::load_and_merge(
			&path,
			NewSavedConfigs { extra_command_line: vec!["splash".into()], ..Default::default() },
		)
		.unwrap();

		assert_eq!(
			second.liveos.kernel_command_line.extra_command_line,
			vec!["quiet".to_string(), "splash".to_string()]
		);
	}

	#[test]
	fn bootstrap_urls_are_mutually_exclusive() {
		let dir = tempdir().unwrap();
		let path = dir.path().join("saved-configs.yaml");

		let first = SavedConfigs::load_and_merge(
			&path,
			NewSavedConfigs { bootstrap_base_url: Some("http://a/liveos".into()), ..Default::default() },
		)
		.unwrap();
		assert_eq!(first.pxe.bootstrap_base_url.as_deref(), Some("http://a/liveos"));
		assert!(first.pxe.bootstrap_file_url.is_none());
		first.persist(&path).unwrap();

		// Supplying a new file url must clear the prior base url.
		let second = SavedConfigs::load_and_merge(
			&path,
			NewSavedConfigs { bootstrap_file_url: Some("http://b/image.iso".into()), ..Default::default() },
		)
		.unwrap();
		assert_eq!(second.pxe.bootstrap_file_url.as_deref(), Some("http://b/image.iso"));
		assert!(second.pxe.bootstrap_base_url.is_none());
	}
}

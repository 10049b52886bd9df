//! Input/output/script/user/package validation and preview-feature gating.
//! Runs before any I/O against the image — every problem is collected in
//! one pass rather than failing on the first, so a single invocation
//! reports every config mistake at once.

use std::path::Path;

use color_eyre::Result;
use tracing::instrument;

use crate::model::{preview_features, Config, OutputImageFormat, ResolvedConfig};

#[derive(Debug, Clone)]
pub struct ValidationError {
	pub message: String,
}

impl std::fmt::Display for ValidationError {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(&self.message)
	}
}

impl std::error::Error for ValidationError {}

fn err(message: impl Into<String>) -> ValidationError {
	ValidationError { message: message.into() }
}

/// Validate a single config node's structure, independent of the chain it
/// sits in (called once per node while the chain is built — see
/// [`crate::cfgchain`] — and again, in full, against the resolved config).
pub fn validate_config_node(config: &Config) -> Vec<ValidationError> {
	let mut errors = Vec::new();
	for script in config.scripts.post_customization.iter().chain(&config.scripts.finalize_customization) {
		let p = Path::new(&script.path);
		if p.is_absolute() || p.components().any(|c| matches!(c, std::path::Component::ParentDir)) {
			errors.push(err(format!("script path `{}` must be relative and may not escape its config directory", script.path)));
		}
	}
	errors
}

/// Full validation of a [`ResolvedConfig`], run once the chain has been
/// resolved. Aggregates every problem rather than stopping at the first.
#[instrument(skip(rc))]
pub fn validate(rc: &ResolvedConfig) -> Result<(), Vec<ValidationError>> {
	let mut errors = Vec::new();

	// Exactly one input source must resolve.
	let has_cli_path = rc.options.output_file.is_some(); // CLI file path is handled upstream; presence check here is the resolved image.
	let _ = has_cli_path;
	if rc.input_image_file.is_none() && rc.input_image_oci.is_none() && rc.input_image.azure_linux.is_none() {
		errors.push(err("no input image resolved: set input.image.path, input.image.oci, or input.image.azureLinux"));
	}

	// Input-file presence/type check.
	if let Some(path) = &rc.input_image_file {
		if !path.exists() {
			errors.push(err(format!("input image file does not exist: {}", path.display())));
		}
	}

	// Output-file non-directory check, except PxeDir.
	if rc.output_image_file.is_dir() && !rc.output_image_format.allows_directory_output() {
		errors.push(err(format!(
			"output path `{}` is a directory, which is only permitted for PxeDir output",
			rc.output_image_file.display()
		)));
	}

	// Additional-files source existence.
	for f in &rc.config.os.additional_files {
		if !Path::new(&f.source).exists() {
			errors.push(err(format!("additional file source does not exist: {}", f.source)));
		}
	}

	// SSH public key file existence.
	for user in &rc.config.os.users {
		for key in &user.ssh_keys {
			if key.starts_with('/') && !Path::new(key).exists() {
				errors.push(err(format!("SSH public key file does not exist: {key}")));
			}
		}
	}

	// Package-source requirement for install/update/update-existing.
	let pkgs = &rc.config.os.packages;
	let wants_packages = !pkgs.install.is_empty()
		|| !pkgs.update.is_empty()
		|| !pkgs.install_lists.is_empty()
		|| !pkgs.update_lists.is_empty()
		|| pkgs.update_existing_packages;
	if wants_packages && rc.options.rpm_sources.is_empty() && !rc.options.use_base_image_rpm_repos {
		errors.push(err(crate::error::validation::missing_rpm_source().to_string()));
	}

	// Preview-feature gating.
	if pkgs.snapshot_time.is_some() && !rc.config.has_preview_feature(preview_features::PACKAGE_SNAPSHOT_TIME) {
		errors.push(err(format!("`os.packages.snapshotTime` requires preview feature `{}`", preview_features::PACKAGE_SNAPSHOT_TIME)));
	}
	if rc.cosi_compression.level.is_some() && !rc.config.has_preview_feature(preview_features::COSI_COMPRESSION) {
		errors.push(err(format!(
			"`output.image.cosi.compression.level` requires preview feature `{}`",
			preview_features::COSI_COMPRESSION
		)));
	}

	// ISO-vs-non-ISO compatibility.
	let input_is_iso =
		rc.input_image_file.as_ref().is_some_and(|p| p.extension().and_then(|e| e.to_str()) == Some("iso"));
	if input_is_iso {
		let output_ok = matches!(rc.output_image_format, OutputImageFormat::Iso | OutputImageFormat::PxeDir);
		if !output_ok {
			errors.push(err(crate::error::validation::iso_storage_customization_forbidden().to_string()));
		}
		if !rc.config.storage.partitions.is_empty() || !rc.config.storage.file_systems.is_empty() {
			errors.push(err("storage customization is forbidden when the input image is an ISO"));
		}
	}

	if errors.is_empty() {
		Ok(())
	} else {
		Err(errors)
	}
}

#[cfg(test)]
mod tests {
	use std::path::PathBuf;

	use crate::model::{CliOptions, Config, ConfigWithBasePath, OutputImageFormat};

	use super::validate;

	fn minimal_resolved() -> crate::model::ResolvedConfig {
		let config = Config::from_yaml("baseConfigs: []\n").unwrap();
		let node = ConfigWithBasePath { config: config.clone(), base_config_path: PathBuf::from("/tmp") };
		crate::resolver::resolve(vec![node], CliOptions::default(), PathBuf::from("/tmp/build")).unwrap()
	}

	#[test]
	fn missing_input_image_is_rejected() {
		let rc = minimal_resolved();
		let errors = validate(&rc).unwrap_err();
		assert!(errors.iter().any(|e| e.message.contains("no input image resolved")));
	}

	#[test]
	fn non_pxe_directory_output_is_rejected() {
		let mut rc = minimal_resolved();
		rc.input_image_file = Some(PathBuf::from("/dev/null"));
		rc.output_image_file = PathBuf::from("/tmp");
		rc.output_image_format = OutputImageFormat::Raw;
		let errors = validate(&rc).unwrap_err();
		assert!(errors.iter().any(|e| e.message.contains("is a directory")));
	}

	#[test]
	fn pxe_dir_output_allows_directory() {
		let mut rc = minimal_resolved();
		rc.input_image_file = Some(PathBuf::from("/dev/null"));
		rc.output_image_file = PathBuf::from("/tmp");
		rc.output_image_format = OutputImageFormat::PxeDir;
		let errors = validate(&rc).unwrap_err();
		assert!(!errors.iter().any(|e| e.message.contains("is a directory")));
	}
}

//! Stable `Scope:Code` error taxonomy.
//!
//! Every fallible operation in this crate ultimately surfaces as a
//! [`color_eyre::Result`], but the leaf cause is always one of the variants
//! below so that a user-visible failure carries a stable identifier a
//! postmortem can grep for, independent of the prose wrapped around it by
//! `.with_section(...)` at each call site.

use std::fmt;

/// The taxonomy scope a [`KatsuError`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
	Validation,
	Config,
	Boot,
	SELinux,
	LiveOS,
	Uki,
	Fs,
}

impl fmt::Display for Scope {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let s = match self {
			Self::Validation => "Validation",
			Self::Config => "Config",
			Self::Boot => "Boot",
			Self::SELinux => "SELinux",
			Self::LiveOS => "LiveOS",
			Self::Uki => "UKI",
			Self::Fs => "Fs",
		};
		f.write_str(s)
	}
}

/// A tagged, stable error identifier: `Scope:Code`.
///
/// This is the type that crosses module boundaries; callers wrap it into a
/// `color_eyre::Report` with `.with_section(...)` to attach the file path,
/// config key, or GRUB command name that made this particular occurrence
/// actionable.
#[derive(thiserror::Error, Debug)]
#[error("{scope}:{code}")]
pub struct KatsuError {
	pub scope: Scope,
	pub code: &'static str,
	#[source]
	pub source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl KatsuError {
	#[must_use]
	pub fn new(scope: Scope, code: &'static str) -> Self {
		Self { scope, code, source: None }
	}

	#[must_use]
	pub fn wrap(scope: Scope, code: &'static str, source: impl std::error::Error + Send + Sync + 'static) -> Self {
		Self { scope, code, source: Some(Box::new(source)) }
	}
}

/// Shorthand constructors for the codes actually referenced by this crate's
/// operations, grouped by scope so `error::validation::input_image_required()`
/// reads the same way the spec's identifiers do
/// (`Validation:InputImageFileRequired`).
pub mod validation {
	use super::{KatsuError, Scope};

	pub fn input_image_required() -> KatsuError {
		KatsuError::new(Scope::Validation, "InputImageFileRequired")
	}
	pub fn output_path_is_directory() -> KatsuError {
		KatsuError::new(Scope::Validation, "OutputPathIsDirectory")
	}
	pub fn script_path_escapes_config_dir() -> KatsuError {
		KatsuError::new(Scope::Validation, "ScriptPathEscapesConfigDir")
	}
	pub fn missing_rpm_source() -> KatsuError {
		KatsuError::new(Scope::Validation, "MissingRpmSource")
	}
	pub fn preview_feature_required(feature: &'static str) -> KatsuError {
		KatsuError { scope: Scope::Validation, code: feature, source: None }
	}
	pub fn iso_storage_customization_forbidden() -> KatsuError {
		KatsuError::new(Scope::Validation, "IsoStorageCustomizationForbidden")
	}
	pub fn invalid_kdump_boot_files() -> KatsuError {
		KatsuError::new(Scope::Config, "InvalidKdumpBootFiles")
	}
}

pub mod boot {
	use super::{KatsuError, Scope};

	pub fn grub_mkconfig_generation() -> KatsuError {
		KatsuError::new(Scope::Boot, "GrubMkconfigGeneration")
	}
	pub fn cardinality_violation(cmd: &'static str) -> KatsuError {
		KatsuError { scope: Scope::Boot, code: cmd, source: None }
	}
	pub fn default_grub_missing() -> KatsuError {
		KatsuError::new(Scope::Boot, "DefaultGrubMissing")
	}
}

pub mod selinux {
	use super::{KatsuError, Scope};

	pub fn policy_missing() -> KatsuError {
		KatsuError::new(Scope::SELinux, "PolicyMissing")
	}
	pub fn config_file_missing() -> KatsuError {
		KatsuError::new(Scope::SELinux, "ConfigMissing")
	}
}

pub mod liveos {
	use super::{KatsuError, Scope};

	pub fn invalid_initramfs_type() -> KatsuError {
		KatsuError::new(Scope::LiveOS, "InvalidInitramfsType")
	}
	pub fn pxe_not_supported() -> KatsuError {
		KatsuError::new(Scope::LiveOS, "PxeNotSupported")
	}
	pub fn artifact_extraction_failed() -> KatsuError {
		KatsuError::new(Scope::LiveOS, "ArtifactExtractionFailed")
	}
}

pub mod uki {
	use super::{KatsuError, Scope};

	pub fn kernel_modified() -> KatsuError {
		KatsuError::new(Scope::Uki, "KernelModified")
	}
}

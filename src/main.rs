#![warn(clippy::complexity)]
#![warn(clippy::correctness)]
#![warn(clippy::nursery)]
#![warn(clippy::pedantic)]
#![warn(clippy::perf)]
#![warn(clippy::style)]
#![warn(clippy::suspicious)]
// followings are from clippy::restriction
#![warn(clippy::missing_errors_doc)]
#![warn(clippy::missing_panics_doc)]
#![warn(clippy::missing_safety_doc)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::format_push_string)]
#![warn(clippy::get_unwrap)]
#![allow(clippy::missing_inline_in_public_items)]
#![allow(clippy::implicit_return)]
#![allow(clippy::blanket_clippy_restriction_lints)]
#![allow(clippy::pattern_type_mismatch)]

pub mod bootcustomizer;
mod bootloader_orchestrator;
pub mod cfg;
mod cfgchain;
mod error;
mod grubcfg;
mod liveos;
pub mod model;
mod resolver;
mod savedconfigs;
mod util;
mod validator;
mod verity;

use std::path::PathBuf;

use clap::Parser;
use color_eyre::Result;
use serde_derive::{Deserialize, Serialize};
use tracing::{info, instrument, trace};
use tracing_subscriber::{fmt, prelude::*, EnvFilter, Registry};

use model::{CliOptions, OutputImageFormat};

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct SkipPhases(std::collections::HashSet<String>);

impl SkipPhases {
	#[must_use]
	pub fn contains(&self, phase: &str) -> bool {
		self.0.contains(phase)
	}
}

impl From<&str> for SkipPhases {
	fn from(value: &str) -> SkipPhases {
		SkipPhases(value.split(',').map(ToOwned::to_owned).collect())
	}
}

/// The boot-and-image transformation engine's CLI surface: a config file
/// plus the handful of fields the config-resolver's "CLI beats config" list
/// names, matching the shape this codebase's entrypoint has always used.
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct KatsuCli {
	/// Path to the leaf YAML configuration file.
	config: PathBuf,

	#[arg(long, short = 'O')]
	/// Override the output image format.
	output_format: Option<String>,

	#[arg(long, short = 'o')]
	/// Override the output image file (or directory, for PXE directory output).
	output_file: Option<PathBuf>,

	#[arg(long)]
	/// Override the package snapshot timestamp (requires the `PackageSnapshotTime` preview feature).
	package_snapshot_time: Option<String>,

	#[arg(long)]
	/// Override the COSI output compression level (requires the `CosiCompression` preview feature).
	cosi_compression_level: Option<u32>,

	#[arg(long)]
	/// Override the path the effective SELinux policy is written to.
	output_selinux_policy_path: Option<PathBuf>,

	#[arg(long = "rpm-source")]
	/// RPM repository source(s) to use for package installation. Repeatable.
	rpm_sources: Vec<String>,

	#[arg(long)]
	/// Reuse the RPM repositories already configured in the input image.
	use_base_image_rpm_repos: bool,

	#[arg(long, env = "KATSU_SKIP_PHASES", default_value = "")]
	skip_phases: String,
}

impl KatsuCli {
	fn cli_options(&self) -> Result<CliOptions> {
		let output_format = self
			.output_format
			.as_deref()
			.map(|s| match s {
				"raw" => Ok(OutputImageFormat::Raw),
				"vhd" => Ok(OutputImageFormat::Vhd),
				"vhdx" => Ok(OutputImageFormat::Vhdx),
				"qcow2" => Ok(OutputImageFormat::Qcow2),
				"iso" => Ok(OutputImageFormat::Iso),
				"pxe-dir" => Ok(OutputImageFormat::PxeDir),
				"tarball" => Ok(OutputImageFormat::Tarball),
				"cosi" => Ok(OutputImageFormat::Cosi),
				other => Err(color_eyre::eyre::eyre!("unknown output format `{other}`")),
			})
			.transpose()?;

		Ok(CliOptions {
			output_format,
			output_file: self.output_file.clone(),
			package_snapshot_time: self.package_snapshot_time.clone(),
			cosi_compression_level: self.cosi_compression_level,
			output_selinux_policy_path: self.output_selinux_policy_path.clone(),
			rpm_sources: self.rpm_sources.clone(),
			use_base_image_rpm_repos: self.use_base_image_rpm_repos,
		})
	}
}

/// Resolve a fully validated [`model::ResolvedConfig`] from a leaf config
/// path and the CLI overrides: build the config chain, resolve field
/// semantics, then run the full validation pass. This is the "CLI/config →
/// Validator → ConfigChain → ConfigResolver → ResolvedConfig" data flow in
/// one call.
#[instrument(skip(options))]
fn load_and_validate(config_path: &std::path::Path, options: CliOptions, build_dir: &std::path::Path) -> Result<model::ResolvedConfig> {
	let chain = cfgchain::build_config_chain(config_path)?;
	let rc = resolver::resolve(chain, options, build_dir.to_path_buf())?;
	if let Err(errors) = validator::validate(&rc) {
		let detail = errors.iter().map(|e| format!("- {}", e.message)).collect::<Vec<_>>().join("\n");
		return Err(color_eyre::eyre::eyre!("configuration validation failed:\n{detail}"));
	}
	Ok(rc)
}

/// Apply boot-configuration customization (SELinux mode, kernel command
/// line, verity) against a chrooted rootfs, the disk-image flow's portion
/// of the data-flow diagram.
#[instrument(skip(rc))]
fn customize_disk_image(rc: &model::ResolvedConfig, root: &std::path::Path) -> Result<()> {
	let mut boot = bootcustomizer::BootCustomizer::load(root)?;

	if let Some(verity) = rc.config.storage.verity.first() {
		let boot_partition_uuid = rc.image_uuid_str();
		let extra_args = verity::apply_verity(&rc.config.storage, &boot_partition_uuid, &mut boot)?;
		// The user's own `ExtraCommandLine` is applied once, by `orchestrate`
		// below; only the verity-derived args are added here.
		boot.add_kernel_command_line(&extra_args)?;

		let fstab_path = root.join("etc/fstab");
		if fstab_path.exists() {
			let fstab = std::fs::read_to_string(&fstab_path)?;
			std::fs::write(&fstab_path, verity::rewrite_fstab(&fstab, verity))?;
		}
	}

	bootloader_orchestrator::orchestrate(rc, &mut boot, root)?;
	Ok(())
}

/// Extract/generate LiveOS artifacts and emit an ISO and/or PXE directory,
/// persisting [`savedconfigs::SavedConfigs`] across the pass.
#[instrument(skip(rc))]
fn customize_liveos(rc: &model::ResolvedConfig, root: &std::path::Path) -> Result<()> {
	let store = liveos::scan_rootfs_for_artifacts(root)?;

	let has_selinux_blocker =
		store.info.dracut_package_info.is_none() || store.info.selinux_policy_package_info.is_none();
	let selinux_mode = liveos::resolve_liveos_selinux(rc.selinux, has_selinux_blocker)?;

	let new_saved = savedconfigs::NewSavedConfigs {
		extra_command_line: rc.kernel_command_line.extra_command_line.clone(),
		kdump_boot_files: rc.iso.kdump_boot_files.clone(),
		bootstrap_base_url: rc.iso.bootstrap_base_url.clone(),
		bootstrap_file_url: rc.iso.bootstrap_file_url.clone(),
		dracut_package_info: store.info.dracut_package_info.clone(),
		requested_selinux_mode: selinux_mode,
		selinux_package_info: store.info.selinux_policy_package_info.clone(),
		kernel_version: store.info.kernel_version.clone().unwrap_or_default(),
	};
	let saved = liveos::update_saved_configs(&store.files.saved_configs_file_path, new_saved)?;

	if let Some(grub_cfg_path) = &store.files.iso_grub_cfg_path {
		let text = std::fs::read_to_string(grub_cfg_path)?;
		let mut boot = bootcustomizer::BootCustomizer::load(root)?;
		let rewritten = liveos::rewrite_liveos_grub_cfg(
			&text,
			liveos::VOLUME_LABEL,
			boot.is_mkconfig(),
			selinux_mode == model::SelinuxMode::Disabled,
			&saved.liveos.kernel_command_line.extra_command_line,
		)?;
		std::fs::write(grub_cfg_path, &rewritten)?;

		if matches!(rc.output_image_format, OutputImageFormat::PxeDir) {
			let output_base =
				rc.output_image_file.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
			let pxe_cfg = liveos::derive_pxe_grub_cfg(
				&rewritten,
				saved.pxe.bootstrap_base_url.as_deref().unwrap_or(""),
				saved.pxe.bootstrap_file_url.as_deref().unwrap_or(""),
				&output_base,
			)?;
			let pxe_cfg_path = grub_cfg_path.with_file_name("grub-pxe.cfg");
			std::fs::write(&pxe_cfg_path, pxe_cfg)?;
		}
	}

	if matches!(rc.output_image_format, OutputImageFormat::PxeDir) {
		liveos::build_pxe_layout(root)?;
	}

	Ok(())
}

/// Dispatch to the disk-image or LiveOS/PXE flow depending on the resolved
/// output format, then hand off to the external packaging tool for the
/// chosen container format — the only step this engine does not itself
/// perform (see spec.md's external-collaborators list).
#[instrument(skip(rc))]
fn run(rc: &model::ResolvedConfig, root: &std::path::Path) -> Result<()> {
	match rc.output_image_format {
		OutputImageFormat::Iso | OutputImageFormat::PxeDir => customize_liveos(rc, root)?,
		_ => customize_disk_image(rc, root)?,
	}
	Ok(())
}

fn main() -> color_eyre::Result<()> {
	if let Err(e) = dotenvy::dotenv() {
		if !e.not_found() {
			return Err(e.into());
		}
	}

	color_eyre::install()?;

	let filter = EnvFilter::try_from_env("KATSU_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
	let fmtlyr = fmt::layer().pretty().with_filter(filter);
	let subscriber = Registry::default().with(tracing_error::ErrorLayer::default()).with(fmtlyr);
	tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");
	trace!("starting up");

	sudo::escalate_if_needed().expect("Fail to run sudo");

	let cli = KatsuCli::parse();
	let skip_phases = SkipPhases::from(cli.skip_phases.as_str());
	let options = cli.cli_options()?;

	let build_dir = tempfile::tempdir()?;
	let rc = load_and_validate(&cli.config, options, build_dir.path())?;

	trace!(?rc, "resolved configuration");
	if skip_phases.contains("build") {
		info!("build phase skipped via --skip-phases");
		return Ok(());
	}

	let root = rc.input_image_file.clone().unwrap_or_else(|| build_dir.path().to_path_buf());
	info!(output = ?rc.output_image_file, format = ?rc.output_image_format, "building image");
	run(&rc, &root)?;

	Ok(())
}

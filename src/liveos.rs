//! LiveOSBuilder: extracts or generates the artifacts needed to repackage a
//! customized rootfs as a bootable ISO and/or PXE directory, coordinating
//! [`crate::bootcustomizer`]/[`crate::grubcfg`] for the config-text surgery
//! and [`crate::savedconfigs`] for the cross-pass side channel.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use color_eyre::{eyre::bail, Result};
use tracing::{info, instrument, warn};

use crate::model::{InitramfsType, SelinuxMode};
use crate::savedconfigs::{NewSavedConfigs, SavedConfigs};

pub const VOLUME_LABEL: &str = "AZLCORE";
pub const SAVED_CONFIGS_FILENAME: &str = "saved-configs.yaml";

/// Every artifact path the builder cares about, plus the info block
/// describing what's currently installed — mirrors the shape named in the
/// data model regardless of whether it was populated from a raw disk image
/// or an existing ISO.
#[derive(Debug, Clone, Default)]
pub struct IsoArtifactsFiles {
	pub artifacts_dir: PathBuf,
	pub boot_efi_path: Option<PathBuf>,
	pub grub_efi_path: Option<PathBuf>,
	pub iso_grub_cfg_path: Option<PathBuf>,
	pub pxe_grub_cfg_path: Option<PathBuf>,
	pub squashfs_image_path: Option<PathBuf>,
	pub initrd_image_path: Option<PathBuf>,
	pub saved_configs_file_path: PathBuf,
	pub additional_files: HashMap<PathBuf, PathBuf>,
	pub kernel_boot_files: HashMap<String, PathBuf>,
	pub kdump_boot_files: Vec<PathBuf>,
	pub iso_boot_image_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default)]
pub struct IsoArtifactsInfo {
	pub kernel_version: Option<String>,
	pub dracut_package_info: Option<String>,
	pub selinux_policy_package_info: Option<String>,
	pub selinux_mode: SelinuxMode,
}

#[derive(Debug, Clone, Default)]
pub struct IsoArtifactsStore {
	pub files: IsoArtifactsFiles,
	pub info: IsoArtifactsInfo,
}

impl IsoArtifactsStore {
	/// Merge `other` (freshly observed) over `self` (previously observed),
	/// preferring the fresher, non-default value for any field both define.
	#[must_use]
	pub fn merged_with(mut self, other: Self) -> Self {
		macro_rules! prefer_new {
			($field:ident) => {
				if other.files.$field.is_some() {
					self.files.$field = other.files.$field;
				}
			};
		}
		prefer_new!(boot_efi_path);
		prefer_new!(grub_efi_path);
		prefer_new!(iso_grub_cfg_path);
		prefer_new!(pxe_grub_cfg_path);
		prefer_new!(squashfs_image_path);
		prefer_new!(initrd_image_path);
		prefer_new!(iso_boot_image_path);
		self.files.additional_files.extend(other.files.additional_files);
		self.files.kernel_boot_files.extend(other.files.kernel_boot_files);
		if !other.files.kdump_boot_files.is_empty() {
			self.files.kdump_boot_files = other.files.kdump_boot_files;
		}
		if other.info.kernel_version.is_some() {
			self.info.kernel_version = other.info.kernel_version;
		}
		if other.info.dracut_package_info.is_some() {
			self.info.dracut_package_info = other.info.dracut_package_info;
		}
		if other.info.selinux_policy_package_info.is_some() {
			self.info.selinux_policy_package_info = other.info.selinux_policy_package_info;
		}
		if other.info.selinux_mode != SelinuxMode::Default {
			self.info.selinux_mode = other.info.selinux_mode;
		}
		self
	}
}

/// Scan a writeable scratch directory (either a copy of a raw image's
/// rootfs, or an extracted ISO) for the well-known artifact paths. Shared
/// by both LiveOSBuilder entry paths (§4.6 A and B) so the merge step
/// downstream operates on one shape regardless of how we got here.
#[instrument]
pub fn scan_rootfs_for_artifacts(root: &Path) -> Result<IsoArtifactsStore> {
	let mut files = IsoArtifactsFiles { artifacts_dir: root.to_owned(), ..Default::default() };
	files.saved_configs_file_path = root.join("liveos-artifacts").join(SAVED_CONFIGS_FILENAME);

	let candidates: [(&str, &mut Option<PathBuf>); 6] = [
		("boot/vmlinuz", &mut files.boot_efi_path),
		("boot/grub2/efiboot.img", &mut files.iso_boot_image_path),
		("boot/grub2/grub.cfg", &mut files.iso_grub_cfg_path),
		("boot/grub2/grub-pxe.cfg", &mut files.pxe_grub_cfg_path),
		("liveos/rootfs.img", &mut files.squashfs_image_path),
		("boot/initrd.img", &mut files.initrd_image_path),
	];
	for (rel, slot) in candidates {
		let p = root.join(rel);
		if p.exists() {
			*slot = Some(p);
		}
	}

	Ok(IsoArtifactsStore { files, info: IsoArtifactsInfo::default() })
}

/// Extract an existing ISO's contents into `dest` (via the external
/// loopback/mount machinery named in §6) then scan it the same way.
#[instrument]
pub fn extract_from_iso(iso_path: &Path, dest: &Path) -> Result<IsoArtifactsStore> {
	std::fs::create_dir_all(dest)?;
	crate::run!("bsdtar", "-xf", iso_path.to_str().ok_or_else(|| crate::error::liveos::artifact_extraction_failed())?, "-C", dest.to_str().ok_or_else(|| crate::error::liveos::artifact_extraction_failed())?)
		.map_err(|_| crate::error::liveos::artifact_extraction_failed())?;
	scan_rootfs_for_artifacts(dest)
}

/// Decide whether SELinux must be disabled for LiveOS. If the user
/// explicitly requested a non-default, non-disabled mode and a blocker
/// (missing policy/old dracut) exists, this is fatal; otherwise we log and
/// force it disabled.
pub fn resolve_liveos_selinux(requested: SelinuxMode, has_blocker: bool) -> Result<SelinuxMode> {
	if has_blocker {
		let explicit = !matches!(requested, SelinuxMode::Default | SelinuxMode::Disabled);
		if explicit {
			bail!(crate::error::selinux::policy_missing());
		}
		warn!(?requested, "SELinux blocked on LiveOS media; forcing disabled");
		return Ok(SelinuxMode::Disabled);
	}
	Ok(requested)
}

/// LiveOS-mandatory kernel args appended regardless of user configuration
/// (the dmsquash-live/overlay family), plus the merged user extra command
/// line.
#[must_use]
pub fn liveos_mandatory_args() -> Vec<String> {
	vec![
		"rd.live.image".to_string(),
		"rd.live.overlay.overlayfs=1".to_string(),
		"rd.live.dir=LiveOS".to_string(),
	]
}

/// Rewrite the LiveOS `grub.cfg`: point `search` at the volume label,
/// rewrite linux/initrd paths to the ISO's fixed locations, rewrite `root=`
/// to the live label, optionally disable SELinux, and append the mandatory
/// plus user args.
#[instrument(skip(text, extra_command_line))]
pub fn rewrite_liveos_grub_cfg(
	text: &str, volume_label: &str, is_mkconfig: bool, selinux_disabled: bool, extra_command_line: &[String],
) -> Result<String> {
	let text = crate::grubcfg::replace_search_command_all(
		text,
		&format!("search --no-floppy --label --set root {volume_label}"),
	)?;

	let text = if is_mkconfig {
		let (t, _) = crate::grubcfg::set_linux_or_initrd_path_all(&text, "linux", "/boot/vmlinuz", true)?;
		let (t, _) = crate::grubcfg::set_linux_or_initrd_path_all(&t, "initrd", "/boot/initrd.img", true)?;
		t
	} else {
		let (t, _) = crate::grubcfg::set_linux_path(&text, "/boot/vmlinuz")?;
		let (t, _) = crate::grubcfg::set_initrd_path(&t, "/boot/initrd.img")?;
		t
	};

	let text = crate::grubcfg::replace_kernel_command_line_arg_value_all(
		&text,
		"root",
		&format!("live:LABEL={volume_label}"),
	)?;

	let text = if selinux_disabled {
		crate::grubcfg::update_selinux_command_line_all(&text, SelinuxMode::Disabled)?
	} else {
		text
	};

	let mut extra = liveos_mandatory_args();
	extra.extend(extra_command_line.iter().cloned());
	crate::grubcfg::append_kernel_command_line_args_all(&text, &extra)
}

/// Synthesize the `root=live:<url>` value for the PXE grub config: either
/// `bootstrapFileUrl` verbatim, or `bootstrapBaseUrl` joined with the
/// output image's base name.
#[must_use]
pub fn pxe_live_url(bootstrap_base_url: &str, bootstrap_file_url: &str, output_image_base: &str) -> String {
	if !bootstrap_file_url.is_empty() {
		bootstrap_file_url.to_string()
	} else {
		format!("{}/{output_image_base}", bootstrap_base_url.trim_end_matches('/'))
	}
}

/// Derive a PXE `grub-pxe.cfg` from the (already rewritten) ISO grub.cfg:
/// strip `search` commands, replace `root=` with the PXE live URL, and
/// append the dhcp/downloader args.
#[instrument(skip(iso_grub_cfg))]
pub fn derive_pxe_grub_cfg(
	iso_grub_cfg: &str, bootstrap_base_url: &str, bootstrap_file_url: &str, output_image_base: &str,
) -> Result<String> {
	let text = crate::grubcfg::remove_command_all(iso_grub_cfg, "search")?;
	let live_url = pxe_live_url(bootstrap_base_url, bootstrap_file_url, output_image_base);
	let text =
		crate::grubcfg::replace_kernel_command_line_arg_value_all(&text, "root", &format!("live:{live_url}"))?;
	crate::grubcfg::append_kernel_command_line_args_all(
		&text,
		&["ip=dhcp".to_string(), "rd.live.azldownloader=enable".to_string()],
	)
}

/// Resolve the initramfs type: explicit user setting wins; otherwise
/// inherit from the input (an ISO input's detected type); otherwise fall
/// back to a format-dependent default (ISO→bootstrap, PXE→fullOS). Returns
/// the resolved type and whether it differs from the input's (i.e.
/// `convertingInitramfsType`).
#[must_use]
pub fn resolve_initramfs_type(
	user_set: Option<InitramfsType>, input_detected: Option<InitramfsType>, is_pxe_output: bool,
) -> (InitramfsType, bool) {
	let default = if is_pxe_output { InitramfsType::FullOs } else { InitramfsType::Bootstrap };
	let resolved = user_set.or(input_detected).unwrap_or(default);
	let converting = input_detected.is_some_and(|i| i != resolved);
	(resolved, converting)
}

/// Boot image (`efiboot.img`) is required for ISO output, or PXE output
/// whose resolved initramfs type is bootstrap (the PXE payload embeds the
/// ISO itself).
#[must_use]
pub fn boot_image_required(output_is_iso: bool, output_is_pxe: bool, initramfs_type: InitramfsType) -> bool {
	output_is_iso || (output_is_pxe && initramfs_type == InitramfsType::Bootstrap)
}

/// Transform a staged ISO-content tree into its PXE directory layout:
/// rename `grub-pxe.cfg` to `grub.cfg` (replacing the ISO one), relocate
/// bootloader binaries from `efi/boot/{shim,grub}*` to the PXE root, and
/// remove the now-empty `efi/` subtree.
#[instrument]
pub fn build_pxe_layout(staging_dir: &Path) -> Result<()> {
	let grub_cfg = staging_dir.join("boot/grub2/grub.cfg");
	let grub_pxe_cfg = staging_dir.join("boot/grub2/grub-pxe.cfg");
	if grub_pxe_cfg.exists() {
		std::fs::rename(&grub_pxe_cfg, &grub_cfg)?;
	}

	let efi_boot_dir = staging_dir.join("efi/boot");
	if efi_boot_dir.is_dir() {
		for entry in std::fs::read_dir(&efi_boot_dir)? {
			let entry = entry?;
			let name = entry.file_name();
			let name_str = name.to_string_lossy();
			if name_str.starts_with("shim") || name_str.starts_with("grub") || name_str.starts_with("boot") {
				std::fs::rename(entry.path(), staging_dir.join(&name))?;
			}
		}
	}
	let efi_root = staging_dir.join("efi");
	if efi_root.is_dir() && std::fs::read_dir(&efi_root)?.next().is_none() {
		std::fs::remove_dir(&efi_root)?;
	} else if efi_boot_dir.is_dir() && std::fs::read_dir(&efi_boot_dir)?.next().is_none() {
		std::fs::remove_dir(&efi_boot_dir)?;
		if let Ok(mut entries) = std::fs::read_dir(&efi_root) {
			if entries.next().is_none() {
				std::fs::remove_dir(&efi_root)?;
			}
		}
	}

	Ok(())
}

/// Package `dir` as a gzipped tarball at `out`, then remove the staging
/// directory.
#[instrument]
pub fn package_tarball(dir: &Path, out: &Path) -> Result<()> {
	let dir_str = dir.to_str().ok_or_else(|| crate::error::liveos::artifact_extraction_failed())?;
	let out_str = out.to_str().ok_or_else(|| crate::error::liveos::artifact_extraction_failed())?;
	crate::run!("tar", "-czf", out_str, "-C", dir_str, ".").map_err(|_| crate::error::liveos::artifact_extraction_failed())?;
	std::fs::remove_dir_all(dir)?;
	Ok(())
}

/// Load, merge with the new values from this pass, and persist
/// [`SavedConfigs`] in one call.
#[instrument(skip(new))]
pub fn update_saved_configs(path: &Path, new: NewSavedConfigs) -> Result<SavedConfigs> {
	info!(?path, "updating saved configs");
	let merged = SavedConfigs::load_and_merge(path, new)?;
	merged.persist(path)?;
	Ok(merged)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn pxe_url_prefers_file_url() {
		assert_eq!(pxe_live_url("http://a/liveos", "http://b/image.iso", "out.iso"), "http://b/image.iso");
	}

	#[test]
	fn pxe_url_joins_base_and_image_base_scenario() {
		assert_eq!(pxe_live_url("http://192.168.0.1/liveos", "", "image.iso"), "http://192.168.0.1/liveos/image.iso");
	}

	#[test]
	fn derive_pxe_grub_cfg_strips_search_and_appends_dhcp() {
		let iso_cfg = "search --label --set root AZLCORE\nlinux /boot/vmlinuz root=live:LABEL=AZLCORE\n";
		let pxe_cfg = derive_pxe_grub_cfg(iso_cfg, "http://192.168.0.1/liveos", "", "image.iso").unwrap();
		assert!(!pxe_cfg.contains("search"));
		assert!(pxe_cfg.contains("root=live:http://192.168.0.1/liveos/image.iso"));
		assert!(pxe_cfg.contains("ip=dhcp"));
		assert!(pxe_cfg.contains("rd.live.azldownloader=enable"));
	}

	#[test]
	fn initramfs_type_resolution_precedence() {
		assert_eq!(
			resolve_initramfs_type(Some(InitramfsType::FullOs), Some(InitramfsType::Bootstrap), false),
			(InitramfsType::FullOs, true)
		);
		assert_eq!(resolve_initramfs_type(None, Some(InitramfsType::Bootstrap), false), (InitramfsType::Bootstrap, false));
		assert_eq!(resolve_initramfs_type(None, None, false), (InitramfsType::Bootstrap, false));
		assert_eq!(resolve_initramfs_type(None, None, true), (InitramfsType::FullOs, false));
	}

	#[test]
	fn boot_image_necessity() {
		assert!(boot_image_required(true, false, InitramfsType::FullOs));
		assert!(boot_image_required(false, true, InitramfsType::Bootstrap));
		assert!(!boot_image_required(false, true, InitramfsType::FullOs));
		assert!(!boot_image_required(false, false, InitramfsType::FullOs));
	}

	#[test]
	fn selinux_disabled_forced_when_blocked_and_not_explicit() {
		let resolved = resolve_liveos_selinux(SelinuxMode::Default, true).unwrap();
		assert_eq!(resolved, SelinuxMode::Disabled);
	}

	#[test]
	fn selinux_explicit_request_fatal_when_blocked() {
		let err = resolve_liveos_selinux(SelinuxMode::Enforcing, true);
		assert!(err.is_err());
	}

	#[test]
	fn liveos_root_rewrite_end_to_end() {
		let cfg = "search --no-floppy --fs-uuid --set root AAAA-BBBB\nlinux /boot/vmlinuz-1 root=UUID=xyz\ninitrd /initrd-1.img\n";
		let rewritten = rewrite_liveos_grub_cfg(cfg, VOLUME_LABEL, false, false, &["quiet".to_string()]).unwrap();
		assert!(rewritten.contains("search --no-floppy --label --set root AZLCORE"));
		assert!(rewritten.contains("linux /boot/vmlinuz root="));
		assert!(rewritten.contains("live:LABEL=AZLCORE"));
		assert!(rewritten.contains("initrd /boot/initrd.img"));
		assert!(rewritten.contains("rd.live.image"));
		assert!(rewritten.contains("quiet"));
	}
}

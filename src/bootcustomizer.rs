//! High-level boot-configuration operations layered on top of
//! [`crate::grubcfg`]: reads both `/boot/grub2/grub.cfg` (direct) and
//! `/etc/default/grub` (grub-mkconfig systems) from a chroot and decides,
//! once at construction, which style of image it's dealing with.

use std::path::{Path, PathBuf};

use color_eyre::{eyre::bail, Result};
use tracing::{debug, instrument};

use crate::grubcfg;
use crate::model::SelinuxMode;

const GRUB_CFG_PATH: &str = "boot/grub2/grub.cfg";
const DEFAULT_GRUB_PATH: &str = "etc/default/grub";
const SELINUX_CONFIG_PATH: &str = "etc/selinux/config";

/// Whether a grub config file was found, and if so its content — absence is
/// a legitimate condition (UKI-only images), not a fatal error.
enum Maybe {
	Present(String),
	Absent,
}

impl Maybe {
	fn read(path: &Path) -> Result<Self> {
		match std::fs::read_to_string(path) {
			Ok(s) => Ok(Self::Present(s)),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::Absent),
			Err(e) => Err(e.into()),
		}
	}
}

pub struct BootCustomizer {
	chroot: PathBuf,
	grub_cfg: Option<String>,
	default_grub: Option<String>,
	/// Decided once at construction by inspecting `grub.cfg`'s content: a
	/// grub-mkconfig image carries the `### BEGIN /etc/grub.d/` marker
	/// comments that tool emits; a hand-authored direct config does not.
	is_mkconfig: bool,
}

impl BootCustomizer {
	#[instrument]
	pub fn load(chroot: &Path) -> Result<Self> {
		let grub_cfg = match Maybe::read(&chroot.join(GRUB_CFG_PATH))? {
			Maybe::Present(s) => Some(s),
			Maybe::Absent => None,
		};
		let default_grub = match Maybe::read(&chroot.join(DEFAULT_GRUB_PATH))? {
			Maybe::Present(s) => Some(s),
			Maybe::Absent => None,
		};
		let is_mkconfig = grub_cfg.as_deref().is_some_and(|s| s.contains("### BEGIN /etc/grub.d/"));
		debug!(is_mkconfig, has_grub_cfg = grub_cfg.is_some(), has_default_grub = default_grub.is_some());
		Ok(Self { chroot: chroot.to_owned(), grub_cfg, default_grub, is_mkconfig })
	}

	#[must_use]
	pub const fn is_mkconfig(&self) -> bool {
		self.is_mkconfig
	}

	/// Insert `extra` into the kernel command line. On grub-mkconfig images
	/// this rewrites `GRUB_CMDLINE_LINUX`; otherwise every `linux` line in
	/// `grub.cfg`.
	pub fn add_kernel_command_line(&mut self, extra: &[String]) -> Result<()> {
		if extra.is_empty() {
			return Ok(());
		}
		if self.is_mkconfig {
			let Some(text) = &self.default_grub else { bail!(crate::error::boot::default_grub_missing()) };
			let extra_str = extra.join(" ");
			let existing =
				grubcfg::find_command_all(text, "GRUB_CMDLINE_LINUX", false).ok();
			let rewritten = if existing.is_some() {
				// Best-effort: append onto the existing value's closing quote.
				replace_default_grub_cmdline(text, &extra_str)
			} else {
				format!("{text}\nGRUB_CMDLINE_LINUX=\"{extra_str}\"\n")
			};
			self.default_grub = Some(rewritten);
		} else {
			let Some(text) = &self.grub_cfg else { bail!(crate::error::boot::default_grub_missing()) };
			self.grub_cfg = Some(grubcfg::append_kernel_command_line_args_all(text, extra)?);
		}
		Ok(())
	}

	/// Tries grub first; if not determinable or `default`, the caller is
	/// expected to fall back to UKI EFI-binary inspection
	/// ([`crate::bootcustomizer::uki`]), then `/etc/selinux/config`.
	pub fn get_selinux_mode_from_grub(&self) -> Result<Option<SelinuxMode>> {
		let text = if self.is_mkconfig { self.default_grub.as_deref() } else { self.grub_cfg.as_deref() };
		let Some(text) = text else { return Ok(None) };

		if self.is_mkconfig {
			return Ok(parse_default_grub_selinux(text));
		}
		let (args, _) = grubcfg::get_linux_command_line_args(text)?;
		Ok(Some(grubcfg::get_selinux_mode_from_linux_args(&args)))
	}

	/// Reads `SELINUX=<mode>` from `/etc/selinux/config` inside the chroot.
	pub fn get_selinux_mode_from_config_file(&self) -> Result<SelinuxMode> {
		let path = self.chroot.join(SELINUX_CONFIG_PATH);
		let text = std::fs::read_to_string(&path).map_err(|_| crate::error::selinux::config_file_missing())?;
		for line in text.lines() {
			if let Some(value) = line.trim().strip_prefix("SELINUX=") {
				return Ok(match value.trim() {
					"enforcing" => SelinuxMode::Enforcing,
					"permissive" => SelinuxMode::Permissive,
					"disabled" => SelinuxMode::Disabled,
					_ => SelinuxMode::Default,
				});
			}
		}
		Ok(SelinuxMode::Default)
	}

	pub fn update_selinux_command_line(&mut self, mode: SelinuxMode) -> Result<()> {
		self.update_selinux_command_line_inner(mode, false)
	}

	/// The EMU variant additionally emits `enforcing=0` when `mode` is
	/// permissive (used by the LiveOS flow).
	pub fn update_selinux_command_line_for_emu(&mut self, mode: SelinuxMode) -> Result<()> {
		self.update_selinux_command_line_inner(mode, true)
	}

	fn update_selinux_command_line_inner(&mut self, mode: SelinuxMode, emu: bool) -> Result<()> {
		let args = if emu { grubcfg::selinux_mode_to_args_for_emu(mode) } else { grubcfg::selinux_mode_to_args(mode) };
		if self.is_mkconfig {
			let Some(text) = &self.default_grub else { bail!(crate::error::boot::default_grub_missing()) };
			self.default_grub = Some(replace_default_grub_cmdline(text, &args.join(" ")));
		} else {
			let Some(text) = &self.grub_cfg else { bail!(crate::error::boot::default_grub_missing()) };
			let to_remove = ["security".to_string(), "selinux".to_string(), "enforcing".to_string()];
			self.grub_cfg = Some(grubcfg::update_kernel_command_line_args_all(text, &to_remove, &args)?);
		}
		Ok(())
	}

	/// On grub-mkconfig images sets `GRUB_DISABLE_UUID=true` and
	/// `GRUB_DEVICE=/dev/mapper/root`; no-op otherwise.
	pub fn prepare_for_verity(&mut self) -> Result<()> {
		if !self.is_mkconfig {
			return Ok(());
		}
		let Some(text) = self.default_grub.clone() else { bail!(crate::error::boot::default_grub_missing()) };
		let text = set_default_grub_var(&text, "GRUB_DISABLE_UUID", "true");
		let text = set_default_grub_var(&text, "GRUB_DEVICE", "/dev/mapper/root");
		self.default_grub = Some(text);
		Ok(())
	}

	pub fn set_root_device(&mut self, path: &str) -> Result<()> {
		let Some(text) = self.default_grub.clone() else { bail!(crate::error::boot::default_grub_missing()) };
		self.default_grub = Some(set_default_grub_var(&text, "GRUB_DEVICE", path));
		Ok(())
	}

	/// On grub-mkconfig images writes `/etc/default/grub` then invokes the
	/// external `grub2-mkconfig`; otherwise writes `grub.cfg` directly.
	#[instrument(skip(self))]
	pub fn write_to_file(&self) -> Result<()> {
		if self.is_mkconfig {
			let Some(text) = &self.default_grub else { bail!(crate::error::boot::default_grub_missing()) };
			std::fs::write(self.chroot.join(DEFAULT_GRUB_PATH), text)?;
			tiffin::Container::new(self.chroot.clone())
				.run(|| -> color_eyre::Result<()> {
					crate::run!("grub2-mkconfig", "-o", "/boot/grub2/grub.cfg").map(|_| ())
				})
				.and_then(|r| r)
				.map_err(|_| crate::error::boot::grub_mkconfig_generation())?;
		} else {
			let Some(text) = &self.grub_cfg else { bail!(crate::error::boot::default_grub_missing()) };
			std::fs::write(self.chroot.join(GRUB_CFG_PATH), text)?;
		}
		Ok(())
	}
}

fn replace_default_grub_cmdline(text: &str, extra: &str) -> String {
	let mut out = String::new();
	let mut replaced = false;
	for line in text.lines() {
		if let Some(rest) = line.strip_prefix("GRUB_CMDLINE_LINUX=") {
			let inner = rest.trim_matches('"');
			out.push_str(&format!("GRUB_CMDLINE_LINUX=\"{inner} {extra}\""));
			replaced = true;
		} else {
			out.push_str(line);
		}
		out.push('\n');
	}
	if !replaced {
		out.push_str(&format!("GRUB_CMDLINE_LINUX=\"{extra}\"\n"));
	}
	out
}

fn set_default_grub_var(text: &str, name: &str, value: &str) -> String {
	let mut out = String::new();
	let mut replaced = false;
	for line in text.lines() {
		if line.starts_with(&format!("{name}=")) {
			out.push_str(&format!("{name}={value}"));
			replaced = true;
		} else {
			out.push_str(line);
		}
		out.push('\n');
	}
	if !replaced {
		out.push_str(&format!("{name}={value}\n"));
	}
	out
}

fn parse_default_grub_selinux(text: &str) -> Option<SelinuxMode> {
	for line in text.lines() {
		if let Some(rest) = line.strip_prefix("GRUB_CMDLINE_LINUX=") {
			let inner = rest.trim_matches('"');
			let args: Vec<&str> = inner.split_whitespace().collect();
			let find = |name: &str| args.iter().find_map(|a| a.strip_prefix(&format!("{name}="))).map(str::to_string);
			let security = find("security");
			let selinux = find("selinux");
			let enforcing = find("enforcing");
			if security.as_deref() != Some("selinux") || selinux.as_deref() != Some("1") {
				return Some(SelinuxMode::Disabled);
			}
			if enforcing.as_deref() == Some("1") {
				return Some(SelinuxMode::ForceEnforcing);
			}
			return Some(SelinuxMode::Default);
		}
	}
	None
}

/// UKI `.cmdline` PE-section extraction, used as the SELinux-mode fallback
/// when grub is not determinable (or reports `default`).
pub mod uki {
	use std::path::Path;

	use color_eyre::Result;
	use object::{read::pe::PeFile64, Object, ObjectSection};

	/// Read the `.cmdline` section of a UKI EFI binary, the same approach
	/// this domain's other implementations take for inspecting embedded PE
	/// sections of signed EFI binaries.
	pub fn read_cmdline(uki_path: &Path) -> Result<Option<String>> {
		let data = std::fs::read(uki_path)?;
		let Ok(file) = PeFile64::parse(&*data) else { return Ok(None) };
		let Some(section) = file.section_by_name(".cmdline") else { return Ok(None) };
		let Ok(bytes) = section.data() else { return Ok(None) };
		Ok(Some(String::from_utf8_lossy(bytes).trim_end_matches('\0').to_string()))
	}

	/// Scan every file directly under the ESP's `/EFI/Linux` directory for
	/// UKI binaries and return the first parsable `.cmdline`.
	pub fn find_cmdline_under_esp(esp_root: &Path) -> Result<Option<String>> {
		let uki_dir = esp_root.join("EFI/Linux");
		if !uki_dir.is_dir() {
			return Ok(None);
		}
		for entry in std::fs::read_dir(&uki_dir)? {
			let entry = entry?;
			if entry.path().extension().and_then(|e| e.to_str()) == Some("efi") {
				if let Some(cmdline) = read_cmdline(&entry.path())? {
					return Ok(Some(cmdline));
				}
			}
		}
		Ok(None)
	}
}

#[cfg(test)]
mod tests {
	use super::{parse_default_grub_selinux, replace_default_grub_cmdline, set_default_grub_var};

	#[test]
	fn default_grub_cmdline_roundtrips_selinux() {
		let text = "GRUB_CMDLINE_LINUX=\"quiet security=selinux selinux=1 enforcing=1\"\n";
		let mode = parse_default_grub_selinux(text).unwrap();
		assert_eq!(mode, crate::model::SelinuxMode::ForceEnforcing);
	}

	#[test]
	fn replace_cmdline_appends_when_present() {
		let text = "GRUB_CMDLINE_LINUX=\"quiet\"\nGRUB_TIMEOUT=5\n";
		let out = replace_default_grub_cmdline(text, "splash");
		assert!(out.contains("GRUB_CMDLINE_LINUX=\"quiet splash\""));
		assert!(out.contains("GRUB_TIMEOUT=5"));
	}

	#[test]
	fn set_var_replaces_existing_line() {
		let text = "GRUB_DEVICE=/dev/sda1\nGRUB_TIMEOUT=5\n";
		let out = set_default_grub_var(text, "GRUB_DEVICE", "/dev/mapper/root");
		assert!(out.contains("GRUB_DEVICE=/dev/mapper/root"));
		assert!(!out.contains("/dev/sda1"));
	}
}

//! BootLoaderOrchestrator: decides hard-reset vs. incremental grub rewrite
//! and coordinates [`crate::bootcustomizer::BootCustomizer`] with fstab and
//! partition data.

use color_eyre::Result;
use tracing::{info, instrument};

use crate::bootcustomizer::BootCustomizer;
use crate::model::BootLoaderResetType;
use crate::model::{ResolvedConfig, SelinuxMode};

/// On hard reset the engine regenerates grub.cfg from scratch via the
/// external installer and does *not* re-apply SELinux kernel args
/// afterwards. On incremental, it rewrites SELinux args in-place then
/// writes.
#[instrument(skip(rc, boot))]
pub fn orchestrate(rc: &ResolvedConfig, boot: &mut BootCustomizer, root: &std::path::Path) -> Result<()> {
	match rc.bootloader_reset {
		BootLoaderResetType::Hard => {
			info!("hard reset requested: regenerating grub configuration from scratch");
			regenerate_from_scratch(root)?;
		},
		BootLoaderResetType::None => {
			if rc.selinux != SelinuxMode::Default {
				boot.update_selinux_command_line(rc.selinux)?;
			}
			boot.add_kernel_command_line(&rc.kernel_command_line.extra_command_line)?;
			boot.write_to_file()?;
		},
	}
	Ok(())
}

/// Invoke the external `grub2-mkconfig` installer against a freshly
/// chrooted root, the same external-tool boundary this codebase already
/// crosses in `write_to_file`.
fn regenerate_from_scratch(root: &std::path::Path) -> Result<()> {
	tiffin::Container::new(root.to_owned())
		.run(|| -> color_eyre::Result<()> {
			crate::run!("grub2-mkconfig", "-o", "/boot/grub2/grub.cfg").map(|_| ())
		})
		.and_then(|r| r)
		.map_err(|_| crate::error::boot::grub_mkconfig_generation())?;
	Ok(())
}

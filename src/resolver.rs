//! Field-level merge/override resolution: walks a [`ConfigWithBasePath`]
//! chain and produces the engine's central [`ResolvedConfig`] record.

use std::path::PathBuf;

use color_eyre::Result;
use tracing::instrument;

use crate::model::BootLoaderResetType;
use crate::model::{
	CliOptions, Config, ConfigWithBasePath, CosiCompression, InputImage, IsoConfig, KernelCommandLine,
	OutputArtifacts, PxeConfig, ResolvedConfig, SelinuxMode,
};

/// Walk `chain` from leaf (last element) toward base (first element),
/// returning the first non-empty/non-default value `get` produces, or the
/// default if all are empty.
fn resolve_override<T, F>(chain: &[ConfigWithBasePath], get: F) -> T
where
	T: Default,
	F: Fn(&Config) -> Option<T>,
{
	chain.iter().rev().find_map(|node| get(&node.config)).unwrap_or_default()
}

/// Same walk, but for fields whose *resolved* shape is itself `Option<T>`
/// (no default to fall back to — absence is a legitimate resolved value).
fn resolve_override_opt<T, F>(chain: &[ConfigWithBasePath], get: F) -> Option<T>
where
	F: Fn(&Config) -> Option<T>,
{
	chain.iter().rev().find_map(|node| get(&node.config))
}

/// Concatenate a per-node `Vec<T>` field in chain order (base-first).
fn resolve_merge<T: Clone, F>(chain: &[ConfigWithBasePath], get: F) -> Vec<T>
where
	F: Fn(&Config) -> Vec<T>,
{
	chain.iter().flat_map(|node| get(&node.config)).collect()
}

/// Concatenate, deduplicating while preserving first-seen order.
fn resolve_merge_dedup(chain: &[ConfigWithBasePath], get: impl Fn(&Config) -> Vec<String>) -> Vec<String> {
	let mut seen = indexmap::IndexSet::new();
	for node in chain {
		for item in get(&node.config) {
			seen.insert(item);
		}
	}
	seen.into_iter().collect()
}

fn resolve_input_image(chain: &[ConfigWithBasePath]) -> InputImage {
	chain
		.iter()
		.rev()
		.find_map(|node| {
			let img = &node.config.input.image;
			if img.path.is_some() || img.oci.is_some() || img.azure_linux.is_some() {
				Some(img.clone())
			} else {
				None
			}
		})
		.unwrap_or_default()
}

fn resolve_bootloader_reset(chain: &[ConfigWithBasePath]) -> BootLoaderResetType {
	// `Hard` is terminal: once any node (leaf-to-base) sets it, it wins
	// outright; empty values are skipped the same as every other override
	// field.
	for node in chain.iter().rev() {
		match node.config.os.boot_loader.reset_type {
			BootLoaderResetType::Hard => return BootLoaderResetType::Hard,
			BootLoaderResetType::None => {},
		}
	}
	BootLoaderResetType::None
}

fn resolve_iso(chain: &[ConfigWithBasePath]) -> IsoConfig {
	IsoConfig {
		kernel_command_line: resolve_merge(chain, |c| c.iso.kernel_command_line.clone()),
		additional_files: resolve_merge(chain, |c| c.iso.additional_files.clone()),
		initramfs_type: resolve_override_opt(chain, |c| c.iso.initramfs_type),
		kdump_boot_files: chain.iter().rev().find_map(|n| n.config.iso.kdump_boot_files.clone()),
		bootstrap_base_url: chain.iter().rev().find_map(|n| n.config.iso.bootstrap_base_url.clone()),
		bootstrap_file_url: chain.iter().rev().find_map(|n| n.config.iso.bootstrap_file_url.clone()),
	}
}

fn resolve_pxe(chain: &[ConfigWithBasePath]) -> PxeConfig {
	PxeConfig {
		kernel_command_line: resolve_merge(chain, |c| c.pxe.kernel_command_line.clone()),
		additional_files: resolve_merge(chain, |c| c.pxe.additional_files.clone()),
		initramfs_type: chain.iter().rev().find_map(|n| n.config.pxe.initramfs_type),
		kdump_boot_files: chain.iter().rev().find_map(|n| n.config.pxe.kdump_boot_files.clone()),
		bootstrap_base_url: chain.iter().rev().find_map(|n| n.config.pxe.bootstrap_base_url.clone()),
		bootstrap_file_url: chain.iter().rev().find_map(|n| n.config.pxe.bootstrap_file_url.clone()),
	}
}

/// Resolve `chain` (as built by [`crate::cfgchain::build_config_chain`])
/// plus CLI overrides into a [`ResolvedConfig`].
#[instrument(skip(chain, options))]
pub fn resolve(chain: Vec<ConfigWithBasePath>, options: CliOptions, build_dir_abs: PathBuf) -> Result<ResolvedConfig> {
	let leaf = chain.last().expect("chain always has at least the leaf").clone();

	let hostname = resolve_override_opt(&chain, |c| c.os.hostname.clone());
	let selinux = resolve_override(&chain, |c| (c.os.selinux.mode != SelinuxMode::Default).then_some(c.os.selinux.mode));
	let uki = crate::model::UkiConfig { mode: resolve_override(&chain, |c| Some(c.os.uki.mode)) };
	let cosi_compression = CosiCompression {
		level: options.cosi_compression_level.or_else(|| resolve_override_opt(&chain, |c| c.output.image.cosi.level)),
	};

	let kernel_command_line =
		KernelCommandLine { extra_command_line: resolve_merge(&chain, |c| c.os.kernel_command_line.extra_command_line.clone()) };

	let output_artifacts = OutputArtifacts {
		path: resolve_override_opt(&chain, |c| c.output.artifacts.path.clone()),
		items: resolve_merge_dedup(&chain, |c| c.output.artifacts.items.clone()),
	};

	let output_image_format =
		options.output_format.or_else(|| resolve_override_opt(&chain, |c| c.output.image.format)).unwrap_or_default();

	let output_image_file = options
		.output_file
		.clone()
		.or_else(|| resolve_override_opt(&chain, |c| c.output.image.path.clone()).map(PathBuf::from))
		.unwrap_or_default();

	let output_selinux_policy_path = options.output_selinux_policy_path.clone().or_else(|| {
		resolve_override_opt(&chain, |c| c.output.selinux_policy_path.clone()).map(PathBuf::from)
	});

	let bootloader_reset = resolve_bootloader_reset(&chain);
	let iso = resolve_iso(&chain);
	let pxe = resolve_pxe(&chain);

	let input_image = resolve_input_image(&chain);
	let input_image_file = input_image.path.clone().map(PathBuf::from);
	let input_image_oci = input_image.oci.clone();

	Ok(ResolvedConfig {
		base_config_path: leaf.base_config_path.clone(),
		config: leaf.config,
		options,
		build_dir_abs,
		raw_image_file: None,
		input_image,
		customize_os_partitions: true,
		image_uuid: crate::util::new_image_uuid(),
		config_chain: chain,
		input_image_file,
		input_image_oci,
		output_image_file,
		output_image_format,
		output_artifacts,
		output_selinux_policy_path,
		hostname,
		selinux,
		bootloader_reset,
		uki,
		kernel_command_line,
		cosi_compression,
		iso,
		pxe,
	})
}

#[cfg(test)]
mod tests {
	use std::path::PathBuf;

	use crate::model::{CliOptions, Config, ConfigWithBasePath};

	use super::resolve;

	fn node(yaml: &str, dir: &str) -> ConfigWithBasePath {
		ConfigWithBasePath { config: Config::from_yaml(yaml).unwrap(), base_config_path: PathBuf::from(dir) }
	}

	#[test]
	fn hierarchical_input_output_scenario() {
		let base = node(
			r"
baseConfigs: []
input:
  image:
    path: testimages/empty.vhdx
output:
  image:
    path: ./out/output-image-2.vhdx
  artifacts:
    path: ./artifacts-2
    items: [ukis]
os:
  hostname: base-host
",
			"/tests/base",
		);
		let leaf = node(
			r"
baseConfigs: [base.yaml]
os:
  hostname: testname
output:
  artifacts:
    items: [shim]
",
			"/tests/leaf",
		);

		let resolved = resolve(vec![base, leaf], CliOptions::default(), PathBuf::from("/tmp/build")).unwrap();

		assert_eq!(resolved.input_image_file, Some(PathBuf::from("testimages/empty.vhdx")));
		assert_eq!(resolved.output_image_file, PathBuf::from("./out/output-image-2.vhdx"));
		assert_eq!(resolved.output_artifacts.path.as_deref(), Some("./artifacts-2"));
		assert_eq!(resolved.output_artifacts.items, vec!["ukis".to_string(), "shim".to_string()]);
		assert_eq!(resolved.hostname.as_deref(), Some("testname"));
	}

	#[test]
	fn kernel_command_line_merges_in_chain_order() {
		let base = node("baseConfigs: []\nos:\n  kernelCommandLine:\n    extraCommandLine: [quiet]\n", "/b");
		let leaf = node("baseConfigs: [base.yaml]\nos:\n  kernelCommandLine:\n    extraCommandLine: [splash]\n", "/l");

		let resolved = resolve(vec![base, leaf], CliOptions::default(), PathBuf::from("/tmp")).unwrap();
		assert_eq!(resolved.kernel_command_line.extra_command_line, vec!["quiet".to_string(), "splash".to_string()]);
	}

	#[test]
	fn override_field_defaults_when_all_empty() {
		let base = node("baseConfigs: []\n", "/b");
		let leaf = node("baseConfigs: [base.yaml]\n", "/l");
		let resolved = resolve(vec![base, leaf], CliOptions::default(), PathBuf::from("/tmp")).unwrap();
		assert!(resolved.hostname.is_none());
	}
}

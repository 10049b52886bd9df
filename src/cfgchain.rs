//! Hierarchical config loader: resolves `baseConfigs` transitively into a
//! DFS-ordered chain, rejecting cycles with a path-stack (not a global
//! visited set), and deliberately *not* deduplicating diamond inheritance.

use std::path::{Path, PathBuf};

use color_eyre::{
	eyre::{bail, eyre},
	Help, Result, SectionExt,
};
use tracing::trace;

use crate::model::{Config, ConfigWithBasePath};

/// Build the ordered config chain for `leaf_path`. The returned `Vec`'s last
/// element is always the leaf; for every element, all of its (transitive)
/// `baseConfigs` precede it.
#[tracing::instrument]
pub fn build_config_chain(leaf_path: &Path) -> Result<Vec<ConfigWithBasePath>> {
	let leaf_path = leaf_path
		.canonicalize()
		.map_err(|e| eyre!(e))
		.with_section(|| leaf_path.display().to_string().header("Config path:"))?;
	let mut stack = Vec::new();
	let mut chain = Vec::new();
	visit(&leaf_path, &mut stack, &mut chain)?;
	Ok(chain)
}

fn visit(path: &Path, stack: &mut Vec<PathBuf>, chain: &mut Vec<ConfigWithBasePath>) -> Result<()> {
	if stack.contains(&path.to_path_buf()) {
		let mut names: Vec<String> = stack.iter().map(|p| p.display().to_string()).collect();
		names.push(path.display().to_string());
		bail!("cycle detected in baseConfigs: {}", names.join(" -> "));
	}

	let config = Config::load(path)?;
	config
		.validate_syntax()
		.with_section(|| path.display().to_string().header("Config:"))?;

	let dir = path.parent().map_or_else(|| PathBuf::from("."), Path::to_path_buf);

	stack.push(path.to_path_buf());
	for base in &config.base_configs {
		let base_path = dir.join(base);
		let base_path = base_path
			.canonicalize()
			.map_err(|e| eyre!(e))
			.with_section(|| base.clone().header("baseConfigs entry:"))?;
		trace!(?base_path, leaf = ?path, "visiting base config");
		visit(&base_path, stack, chain)?;
	}
	stack.pop();

	chain.push(ConfigWithBasePath { config, base_config_path: dir });
	Ok(())
}

impl Config {
	/// Structural-only validation performed while walking the chain
	/// (referential checks against the filesystem happen later, in
	/// [`crate::validator`]).
	pub fn validate_syntax(&self) -> Result<()> {
		for script in self.scripts.post_customization.iter().chain(&self.scripts.finalize_customization) {
			let p = Path::new(&script.path);
			if p.is_absolute() || p.components().any(|c| matches!(c, std::path::Component::ParentDir)) {
				bail!(crate::error::validation::script_path_escapes_config_dir());
			}
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use std::fs;

	use tempfile::tempdir;

	use super::build_config_chain;

	fn write(dir: &Path, name: &str, contents: &str) -> std::path::PathBuf {
		let p = dir.join(name);
		fs::write(&p, contents).unwrap();
		p
	}

	use std::path::Path;

	#[test]
	fn chain_order_is_dfs_bases_before_leaf() {
		let dir = tempdir().unwrap();
		write(dir.path(), "base.yaml", "baseConfigs: []\n");
		write(dir.path(), "leaf.yaml", "baseConfigs: [base.yaml]\n");

		let chain = build_config_chain(&dir.path().join("leaf.yaml")).unwrap();
		assert_eq!(chain.len(), 2);
		assert!(chain[0].base_config_path == dir.path().canonicalize().unwrap());
		assert_eq!(chain.last().unwrap().config.base_configs, vec!["base.yaml".to_string()]);
	}

	#[test]
	fn cycle_is_rejected() {
		let dir = tempdir().unwrap();
		write(dir.path(), "a.yaml", "baseConfigs: [b.yaml]\n");
		write(dir.path(), "b.yaml", "baseConfigs: [a.yaml]\n");

		let err = build_config_chain(&dir.path().join("a.yaml")).unwrap_err();
		let msg = format!("{err}");
		assert!(msg.contains("cycle detected in baseConfigs"));
	}

	#[test]
	fn diamond_inheritance_is_not_deduplicated() {
		let dir = tempdir().unwrap();
		write(dir.path(), "common.yaml", "baseConfigs: []\n");
		write(dir.path(), "mid_a.yaml", "baseConfigs: [common.yaml]\n");
		write(dir.path(), "mid_b.yaml", "baseConfigs: [common.yaml]\n");
		write(dir.path(), "leaf.yaml", "baseConfigs: [mid_a.yaml, mid_b.yaml]\n");

		let chain = build_config_chain(&dir.path().join("leaf.yaml")).unwrap();
		// common.yaml appears once per distinct path (under mid_a and under mid_b).
		let common_occurrences =
			chain.iter().filter(|c| c.config.base_configs.is_empty() && c.base_config_path.exists()).count();
		assert_eq!(common_occurrences, 2);
		assert_eq!(chain.len(), 5);
	}
}

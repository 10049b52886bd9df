//! GRUB configuration tokenizing, parsing, and surgical rewriting.
//!
//! This is the substrate every higher-level boot-configuration operation
//! (see [`crate::bootcustomizer`]) goes through: a tokenizer rather than
//! regex, so argument positions are exact byte offsets and a rewrite never
//! disturbs surrounding whitespace, comments, or variable expansions it
//! didn't touch.

pub mod ast;
pub mod lexer;
pub mod ops;

pub use ast::{Line, Loc, SubWord, SubWordType, Token, TokenType};
pub use ops::{
	append_kernel_command_line_args_all, find_command_all, get_linux_command_line_args,
	get_selinux_mode_from_linux_args, grub_args_to_string, parse_command_line_args,
	prepend_linux_or_initrd_path_all, remove_command_all, replace_kernel_command_line_arg_value_all,
	replace_search_command_all, replace_set_command_value, replace_token, selinux_mode_to_args,
	selinux_mode_to_args_for_emu, set_initrd_path, set_linux_or_initrd_path_all, set_linux_path,
	update_kernel_command_line_args_all, update_selinux_command_line_all, Arg,
};

#[cfg(test)]
mod tests {
	use super::*;
	use crate::model::SelinuxMode;

	#[test]
	fn test_append_is_noop_on_empty_extra() {
		let s = "linux /boot/vmlinuz-1 root=UUID=aaa quiet\n";
		let r = append_kernel_command_line_args_all(s, &[]).unwrap();
		assert_eq!(r, s);
	}

	#[test]
	fn test_update_identity_is_noop() {
		let s = "linux /boot/vmlinuz-1 root=UUID=aaa quiet\n";
		let r = update_kernel_command_line_args_all(s, &[], &[]).unwrap();
		assert_eq!(r, s);
	}

	#[test]
	fn test_replace_arg_value_single_linux_line() {
		let s = "linux /boot/vmlinuz-1 root=UUID=aaa quiet\n";
		let r = replace_kernel_command_line_arg_value_all(s, "root", "live:LABEL=AZLCORE").unwrap();
		let (args, _) = get_linux_command_line_args(&r).unwrap();
		let root = args.iter().find(|a| a.name == "root").unwrap();
		assert_eq!(root.value.as_deref(), Some("live:LABEL=AZLCORE"));
	}

	#[test]
	fn test_selinux_idempotent_under_composition() {
		let s = "linux /boot/vmlinuz-1 root=UUID=aaa quiet\n";
		for (m1, m2) in [
			(SelinuxMode::Enforcing, SelinuxMode::Disabled),
			(SelinuxMode::Disabled, SelinuxMode::ForceEnforcing),
			(SelinuxMode::ForceEnforcing, SelinuxMode::ForceEnforcing),
		] {
			let once = update_selinux_command_line_all(s, m1).unwrap();
			let composed = update_selinux_command_line_all(&once, m2).unwrap();
			let direct = update_selinux_command_line_all(s, m2).unwrap();
			assert_eq!(composed, direct, "{m1:?} then {m2:?}");
		}
	}

	#[test]
	fn test_selinux_enforcing_insertion_scenario() {
		let s = "linux /boot/vmlinuz-1 root=UUID=aaa quiet\n";
		let r = update_kernel_command_line_args_all(
			s,
			&["security".into(), "selinux".into(), "enforcing".into()],
			&["security=selinux".into(), "selinux=1".into(), "enforcing=1".into()],
		)
		.unwrap();
		assert_eq!(r, "linux /boot/vmlinuz-1 root=UUID=aaa quiet security=selinux selinux=1 enforcing=1\n");
	}

	#[test]
	fn test_liveos_root_rewrite_scenario() {
		let s = "linux /boot/vmlinuz root=UUID=xyz\n";
		let r = replace_kernel_command_line_arg_value_all(s, "root", "live:LABEL=AZLCORE").unwrap();
		assert_eq!(r, "linux /boot/vmlinuz root=live:LABEL=AZLCORE\n");
	}

	#[test]
	fn test_kernelopts_insertion_point() {
		let s = "linux /boot/vmlinuz-1 root=UUID=aaa $kernelopts quiet\n";
		let r = append_kernel_command_line_args_all(s, &["selinux=1".into()]).unwrap();
		assert_eq!(r, "linux /boot/vmlinuz-1 root=UUID=aaa selinux=1 $kernelopts quiet\n");
	}

	#[test]
	fn test_multiple_kernelopts_is_error() {
		let s = "linux /boot/vmlinuz-1 $kernelopts $kernelopts\n";
		assert!(get_linux_command_line_args(s).is_err());
	}

	#[test]
	fn test_find_command_all_cardinality() {
		let s = "linux /boot/vmlinuz-1\nlinux /boot/vmlinuz-2\n";
		assert!(find_command_all(s, "linux", false).is_err());
		assert_eq!(find_command_all(s, "linux", true).unwrap().len(), 2);
		assert!(find_command_all(s, "initrd", true).is_err());
	}

	#[test]
	fn test_replace_token_respects_boundaries() {
		let s = "search --label --set root FOO\nsearchfoo bar\n";
		let r = replace_token(s, "search", "sea");
		assert!(r.starts_with("sea "));
		assert!(r.contains("searchfoo bar"));
	}

	#[test]
	fn test_set_and_get_linux_path() {
		let s = "linux /boot/vmlinuz root=UUID=aaa\n";
		let (r, old) = set_linux_path(s, "/boot/vmlinuz-new").unwrap();
		assert_eq!(old, "/boot/vmlinuz");
		assert!(r.starts_with("linux /boot/vmlinuz-new "));
	}

	#[test]
	fn test_prepend_is_idempotent() {
		let s = "initrd /initrd.img\n";
		let once = prepend_linux_or_initrd_path_all(s, "initrd", "/boot", false).unwrap();
		let twice = prepend_linux_or_initrd_path_all(&once, "initrd", "/boot", false).unwrap();
		assert_eq!(once, twice);
		assert_eq!(once, "initrd /boot/initrd.img\n");
	}

	#[test]
	fn test_replace_set_command_value() {
		let s = "set kernelopts=\"root=UUID=aaa quiet\"\n";
		let r = replace_set_command_value(s, "kernelopts", "\"root=UUID=bbb\"").unwrap();
		assert!(r.contains("set kernelopts=\"root=UUID=bbb\""));
	}

	#[test]
	fn test_grub_args_to_string_quotes_when_needed() {
		let args = vec!["quiet".to_string(), "root=UUID=aaa".to_string(), "foo bar".to_string()];
		let s = grub_args_to_string(&args);
		assert_eq!(s, "quiet root=UUID=aaa \"foo bar\"");
	}
}

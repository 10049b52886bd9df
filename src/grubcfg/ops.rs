//! Pure string→string GRUB configuration operations.
//!
//! Every operation here tokenizes its input, computes one or more byte-range
//! edits against the *original* text, then applies them last-to-first so
//! that earlier offsets are never invalidated by a preceding edit — the
//! span-based text-edit-buffer discipline this module exists to encapsulate.

use color_eyre::{
	eyre::{bail, ensure, eyre},
	Help, Result, SectionExt,
};

use super::ast::{Line, SubWordType, Token};
use super::lexer;
use crate::model::SelinuxMode;

/// One edit against the original source text: replace the half-open byte
/// range `[start, end)` with `replacement`.
#[derive(Debug, Clone)]
struct Edit {
	start: usize,
	end: usize,
	replacement: String,
}

/// Apply a batch of edits to `text`, last-to-first by start offset, so that
/// an edit earlier in the text never shifts the offsets an edit later in the
/// text was computed against.
fn apply_edits(text: &str, mut edits: Vec<Edit>) -> String {
	edits.sort_by(|a, b| b.start.cmp(&a.start));
	let mut out = text.to_string();
	for e in edits {
		out.replace_range(e.start..e.end, &e.replacement);
	}
	out
}

fn lines_of(text: &str) -> Vec<Line> {
	lexer::group_lines(&lexer::tokenize(text))
}

/// Every top-level line whose first token equals `name`.
///
/// # Errors
/// Fails when none are found, or when more than one is found and
/// `allow_multiple` is `false`.
pub fn find_command_all(text: &str, name: &str, allow_multiple: bool) -> Result<Vec<Line>> {
	let matches: Vec<Line> = lines_of(text).into_iter().filter(|l| l.is_command(name)).collect();
	if matches.is_empty() {
		bail!("no `{name}` command found in grub configuration");
	}
	if matches.len() > 1 && !allow_multiple {
		bail!("expected exactly one `{name}` command, found {}", matches.len());
	}
	Ok(matches)
}

/// Replace every `search …` line in its entirety with `new_cmd`.
pub fn replace_search_command_all(text: &str, new_cmd: &str) -> Result<String> {
	let lines = find_command_all(text, "search", true)?;
	let edits = lines
		.iter()
		.filter_map(|l| l.loc())
		.map(|loc| Edit { start: loc.start.index, end: loc.end.index, replacement: new_cmd.to_string() })
		.collect();
	Ok(apply_edits(text, edits))
}

/// Delete every line whose command is `name`, including its terminating
/// newline.
pub fn remove_command_all(text: &str, name: &str) -> Result<String> {
	let lines: Vec<Line> = lines_of(text).into_iter().filter(|l| l.is_command(name)).collect();
	let edits = lines
		.iter()
		.filter_map(|l| l.loc())
		.map(|loc| Edit { start: loc.start.index, end: loc.end.index, replacement: String::new() })
		.collect();
	Ok(apply_edits(text, edits))
}

/// Replace `old` with `new`, but only at token boundaries (preceded and
/// followed by the start/end of text or by tab/space) — a textual
/// replacement that still will not clobber `old` as a substring of some
/// unrelated longer token.
pub fn replace_token(text: &str, old: &str, new: &str) -> String {
	if old.is_empty() {
		return text.to_string();
	}
	let bytes = text.as_bytes();
	let mut edits = Vec::new();
	let mut start = 0;
	while let Some(rel) = text[start..].find(old) {
		let idx = start + rel;
		let end = idx + old.len();
		let before_ok = idx == 0 || matches!(bytes[idx - 1], b' ' | b'\t');
		let after_ok = end == bytes.len() || matches!(bytes[end], b' ' | b'\t' | b'\n');
		if before_ok && after_ok {
			edits.push(Edit { start: idx, end, replacement: new.to_string() });
		}
		start = end.max(idx + 1);
	}
	apply_edits(text, edits)
}

/// Locate the path argument of a `linux`/`initrd` line: the first token
/// after the command name.
fn path_token<'a>(line: &'a Line, cmd: &str) -> Result<&'a Token> {
	ensure!(line.is_command(cmd), "expected a `{cmd}` line");
	line
		.tokens
		.get(1)
		.ok_or_else(|| eyre!("`{cmd}` line has no path argument"))
		.with_section(|| line.tokens.first().map(|t| t.raw.clone()).unwrap_or_default().header("Line:"))
}

/// Rewrite the kernel/initrd binary path argument of the single `linux`/
/// `initrd` line, returning the rewritten text and the old path.
pub fn set_linux_or_initrd_path(text: &str, cmd: &str, new_path: &str) -> Result<(String, String)> {
	let lines = find_command_all(text, cmd, false)?;
	let line = &lines[0];
	let tok = path_token(line, cmd)?;
	let old_path = tok.literal();
	let edit = Edit { start: tok.loc.start.index, end: tok.loc.end.index, replacement: new_path.to_string() };
	Ok((apply_edits(text, vec![edit]), old_path))
}

pub fn set_linux_path(text: &str, new_path: &str) -> Result<(String, String)> {
	set_linux_or_initrd_path(text, "linux", new_path)
}

pub fn set_initrd_path(text: &str, new_path: &str) -> Result<(String, String)> {
	set_linux_or_initrd_path(text, "initrd", new_path)
}

/// Same as [`set_linux_or_initrd_path`] but for every matching line.
pub fn set_linux_or_initrd_path_all(
	text: &str, cmd: &str, new_path: &str, allow_multiple: bool,
) -> Result<(String, Vec<String>)> {
	let lines = find_command_all(text, cmd, allow_multiple)?;
	let mut old_paths = Vec::new();
	let mut edits = Vec::new();
	for line in &lines {
		let tok = path_token(line, cmd)?;
		old_paths.push(tok.literal());
		edits.push(Edit { start: tok.loc.start.index, end: tok.loc.end.index, replacement: new_path.to_string() });
	}
	Ok((apply_edits(text, edits), old_paths))
}

/// Prepend `prefix` to the path argument of every matching `cmd` line,
/// unless the path already starts with it.
pub fn prepend_linux_or_initrd_path_all(text: &str, cmd: &str, prefix: &str, allow_multiple: bool) -> Result<String> {
	let lines = find_command_all(text, cmd, allow_multiple)?;
	let mut edits = Vec::new();
	for line in &lines {
		let tok = path_token(line, cmd)?;
		let old = tok.literal();
		if old.starts_with(prefix) {
			continue;
		}
		edits.push(Edit {
			start: tok.loc.start.index,
			end: tok.loc.end.index,
			replacement: format!("{prefix}{old}"),
		});
	}
	Ok(apply_edits(text, edits))
}

/// One parsed kernel-command-line argument.
#[derive(Debug, Clone)]
pub struct Arg {
	pub name: String,
	pub value: Option<String>,
	pub value_has_var_expansion: bool,
	/// Byte span of the owning token in the original text.
	pub loc: (usize, usize),
}

/// For each `WORD` token, concatenate its literal sub-words; if a variable
/// expansion is reached, mark the arg. If no `=` is present and the arg
/// contains a var expansion, the arg is dropped — best-effort, since its
/// name may itself be expanded and so can't be matched by name at all.
#[must_use]
pub fn parse_command_line_args(tokens: &[Token]) -> Vec<Arg> {
	let mut out = Vec::new();
	for tok in tokens {
		let literal = tok.literal();
		let has_var = tok.has_var_expansion();
		if let Some((name, value)) = literal.split_once('=') {
			out.push(Arg {
				name: name.to_string(),
				value: Some(value.to_string()),
				value_has_var_expansion: has_var,
				loc: tok.loc.span(),
			});
		} else if has_var {
			// no '=' and contains an expansion: name itself may be expanded,
			// can't be resolved — drop it per the best-effort contract.
			continue;
		} else {
			out.push(Arg { name: literal, value: None, value_has_var_expansion: false, loc: tok.loc.span() });
		}
	}
	out
}

/// Returns the args of the single `linux` line and the byte offset at which
/// new args should be inserted (immediately before `$kernelopts` if present,
/// otherwise just after the last arg).
pub fn get_linux_command_line_args(text: &str) -> Result<(Vec<Arg>, usize)> {
	let lines = find_command_all(text, "linux", false)?;
	let line = &lines[0];
	let arg_tokens = &line.tokens[1..];
	let args = parse_command_line_args(arg_tokens);

	let kernelopts_positions: Vec<usize> = arg_tokens
		.iter()
		.enumerate()
		.filter(|(_, t)| {
			t.sub_words.iter().any(|s| {
				matches!(s.kind, SubWordType::VarExpansion | SubWordType::QuotedVarExpansion)
					&& s.value.trim_matches(['$', '{', '}', '"']) == "kernelopts"
			})
		})
		.map(|(i, _)| i)
		.collect();
	ensure!(kernelopts_positions.len() <= 1, "more than one $kernelopts token in `linux` line");

	let insert_at = if let Some(&idx) = kernelopts_positions.first() {
		arg_tokens[idx].loc.start.index
	} else {
		line.tokens.last().map_or(text.len(), |t| t.loc.end.index)
	};

	Ok((args, insert_at))
}

/// Insert `extra` into the `linux` line's argument list per the insertion
/// rule above.
pub fn append_kernel_command_line_args_all(text: &str, extra: &[String]) -> Result<String> {
	if extra.is_empty() {
		return Ok(text.to_string());
	}
	let (_, insert_at) = get_linux_command_line_args(text)?;
	let insertion = format!(" {}", extra.join(" "));
	Ok(apply_edits(text, vec![Edit { start: insert_at, end: insert_at, replacement: insertion }]))
}

/// Replace the value of argument `name` in every `linux` line. Zero or more
/// than one occurrence within a single line is an error.
pub fn replace_kernel_command_line_arg_value_all(text: &str, name: &str, value: &str) -> Result<String> {
	let lines = find_command_all(text, "linux", true)?;
	let mut edits = Vec::new();
	for line in &lines {
		let arg_tokens = &line.tokens[1..];
		let args = parse_command_line_args(arg_tokens);
		let matches: Vec<&Arg> = args.iter().filter(|a| a.name == name).collect();
		ensure!(
			matches.len() == 1,
			"expected exactly one `{name}` argument on `linux` line, found {}",
			matches.len()
		);
		let arg = matches[0];
		edits.push(Edit { start: arg.loc.0, end: arg.loc.1, replacement: format!("{name}={value}") });
	}
	Ok(apply_edits(text, edits))
}

/// Remove every arg named in `to_remove` then insert `new_args`. If at least
/// one match was removed, `new_args` take the position of the *last*
/// matched arg; otherwise they're inserted at the `$kernelopts` point (or
/// end of line).
///
/// Removed args are deleted in contiguous runs, each run absorbing the
/// single separating space on one side (the side that keeps exactly one
/// space between the two surviving neighbors) rather than just its own
/// token span — otherwise the space that used to separate a removed arg
/// from its neighbor is orphaned and left behind.
pub fn update_kernel_command_line_args_all(text: &str, to_remove: &[String], new_args: &[String]) -> Result<String> {
	let (args, insert_at) = get_linux_command_line_args(text)?;
	let is_removed: Vec<bool> = args.iter().map(|a| to_remove.iter().any(|n| n == &a.name)).collect();

	let mut edits = Vec::new();
	let mut last_removed_start: Option<usize> = None;
	let mut i = 0;
	while i < args.len() {
		if !is_removed[i] {
			i += 1;
			continue;
		}
		let run_start = i;
		let mut run_end = i;
		while run_end + 1 < args.len() && is_removed[run_end + 1] {
			run_end += 1;
		}

		let (start, end) = if run_start == 0 {
			// Nothing before the run within the argument list to absorb
			// into, so absorb the gap after it instead.
			let end = if run_end + 1 < args.len() { args[run_end + 1].loc.0 } else { args[run_end].loc.1 };
			(args[run_start].loc.0, end)
		} else {
			(args[run_start - 1].loc.1, args[run_end].loc.1)
		};

		edits.push(Edit { start, end, replacement: String::new() });
		last_removed_start = Some(start);
		i = run_end + 1;
	}

	if !new_args.is_empty() {
		let insertion = format!(" {}", new_args.join(" "));
		let at = last_removed_start.unwrap_or(insert_at);
		edits.push(Edit { start: at, end: at, replacement: insertion });
	}

	Ok(apply_edits(text, edits))
}

/// Rewrite the value of a `set <var>=<value>` statement. Exactly one
/// matching statement must exist.
pub fn replace_set_command_value(text: &str, var_name: &str, new_value: &str) -> Result<String> {
	let lines = find_command_all(text, "set", true)?;
	let matches: Vec<&Line> = lines
		.iter()
		.filter(|l| l.tokens.get(1).is_some_and(|t| t.literal().starts_with(&format!("{var_name}="))))
		.collect();
	ensure!(matches.len() == 1, "expected exactly one `set {var_name}=…` statement, found {}", matches.len());
	let tok = matches[0].tokens[1].clone();
	let edit = Edit {
		start: tok.loc.start.index,
		end: tok.loc.end.index,
		replacement: format!("{var_name}={new_value}"),
	};
	Ok(apply_edits(text, vec![edit]))
}

/// Escape a single argument per GRUB's quoting rules (the same the
/// tokenizer consumes): wrap in double quotes if it contains whitespace,
/// and escape embedded `"`/`\`/`$`.
#[must_use]
fn grub_escape(arg: &str) -> String {
	if !arg.bytes().any(|b| matches!(b, b' ' | b'\t' | b'"' | b'$' | b'\\')) {
		return arg.to_string();
	}
	let mut out = String::with_capacity(arg.len() + 2);
	out.push('"');
	for c in arg.chars() {
		if matches!(c, '"' | '\\' | '$') {
			out.push('\\');
		}
		out.push(c);
	}
	out.push('"');
	out
}

/// Join args with single spaces after escaping each per GRUB's quoting
/// rules.
#[must_use]
pub fn grub_args_to_string(args: &[String]) -> String {
	args.iter().map(|a| grub_escape(a)).collect::<Vec<_>>().join(" ")
}

/// Maps a SELinux mode to the argument set emitted for it (the SELinux
/// argument matrix).
#[must_use]
pub fn selinux_mode_to_args(mode: SelinuxMode) -> Vec<String> {
	match mode {
		SelinuxMode::Disabled => vec!["selinux=0".to_string()],
		SelinuxMode::ForceEnforcing => {
			vec!["security=selinux".to_string(), "selinux=1".to_string(), "enforcing=1".to_string()]
		},
		SelinuxMode::Permissive | SelinuxMode::Enforcing => {
			vec!["security=selinux".to_string(), "selinux=1".to_string()]
		},
		SelinuxMode::Default => vec![],
	}
}

/// `selinux_mode_to_args`'s permissive variant used for LiveOS/emu images,
/// which additionally emits `enforcing=0`.
#[must_use]
pub fn selinux_mode_to_args_for_emu(mode: SelinuxMode) -> Vec<String> {
	let mut args = selinux_mode_to_args(mode);
	if mode == SelinuxMode::Permissive {
		args.push("enforcing=0".to_string());
	}
	args
}

const SELINUX_ARG_NAMES: [&str; 3] = ["security", "selinux", "enforcing"];

/// Apply `mode`'s argument set to every `linux` line using the names
/// `{security, selinux, enforcing}`.
pub fn update_selinux_command_line_all(text: &str, mode: SelinuxMode) -> Result<String> {
	let to_remove: Vec<String> = SELINUX_ARG_NAMES.iter().map(ToString::to_string).collect();
	let new_args = selinux_mode_to_args(mode);
	update_kernel_command_line_args_all(text, &to_remove, &new_args)
}

/// Reads `security`, `selinux`, `enforcing` out of a parsed arg list and
/// infers the SELinux mode they encode.
#[must_use]
pub fn get_selinux_mode_from_linux_args(args: &[Arg]) -> SelinuxMode {
	let find = |name: &str| args.iter().find(|a| a.name == name).and_then(|a| a.value.clone());
	let security = find("security");
	let selinux = find("selinux");
	let enforcing = find("enforcing");

	if security.as_deref() != Some("selinux") || selinux.as_deref() != Some("1") {
		return SelinuxMode::Disabled;
	}
	if enforcing.as_deref() == Some("1") {
		return SelinuxMode::ForceEnforcing;
	}
	SelinuxMode::Default
}

//! GRUB configuration tokens.
//!
//! The tokenizer returns a text-faithful tree: every [`Token`] carries its
//! exact byte span ([`Loc`]) so a rewrite can slice and splice the original
//! string without re-serializing anything it didn't touch. This is the
//! substrate every operation in [`super`] goes through instead of regex.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pos {
	pub index: usize,
	pub line: usize,
	pub col: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Loc {
	pub start: Pos,
	pub end: Pos,
}

impl Loc {
	#[must_use]
	pub const fn span(&self) -> (usize, usize) {
		(self.start.index, self.end.index)
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubWordType {
	/// A bareword or `grub.cfg`-escaped string fragment.
	KeywordString,
	/// A single- or double-quoted string fragment.
	String,
	/// `$var` or `${var}`.
	VarExpansion,
	/// `"$var"` — quoted so word-splitting does not apply, but still an
	/// expansion for the purpose of argument-value detection.
	QuotedVarExpansion,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubWord {
	pub kind: SubWordType,
	pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenType {
	Word,
	Newline,
	Comment,
	Whitespace,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
	pub kind: TokenType,
	pub sub_words: Vec<SubWord>,
	pub loc: Loc,
	pub raw: String,
}

impl Token {
	/// Concatenation of every `KeywordString`/`String` sub-word, i.e. the
	/// token's value with variable-expansion placeholders dropped — this is
	/// what most callers mean by "the token's text".
	#[must_use]
	pub fn literal(&self) -> String {
		self
			.sub_words
			.iter()
			.filter(|s| matches!(s.kind, SubWordType::KeywordString | SubWordType::String))
			.map(|s| s.value.as_str())
			.collect()
	}

	#[must_use]
	pub fn has_var_expansion(&self) -> bool {
		self
			.sub_words
			.iter()
			.any(|s| matches!(s.kind, SubWordType::VarExpansion | SubWordType::QuotedVarExpansion))
	}
}

/// A single logical line: its tokens (excluding the terminating newline) and
/// the newline token that ends it (absent for a final unterminated line).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
	pub tokens: Vec<Token>,
	pub end_token: Option<Token>,
}

impl Line {
	#[must_use]
	pub fn command_name(&self) -> Option<String> {
		self.tokens.first().map(Token::literal)
	}

	#[must_use]
	pub fn is_command(&self, name: &str) -> bool {
		self.tokens.first().is_some_and(|t| t.literal() == name)
	}

	#[must_use]
	pub fn loc(&self) -> Option<Loc> {
		let first = self.tokens.first()?.loc;
		let last = self.end_token.as_ref().map_or_else(
			|| self.tokens.last().map(|t| t.loc),
			|e| Some(e.loc),
		)?;
		Some(Loc { start: first.start, end: last.end })
	}
}

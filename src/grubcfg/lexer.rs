//! Hand-rolled GRUB configuration tokenizer.
//!
//! GRUB's own config-file grammar is shell-like but not shell: bare words,
//! single/double quoted strings, and `$var`/`${var}` expansions may all
//! appear concatenated with no separating whitespace inside a single token
//! (`root=UUID=$uuid`). This scans byte-by-byte rather than line-by-line so
//! that a bareword containing `=` is not mistaken for two tokens, the same
//! character class this domain's sibling implementations use for BLS/kargs
//! parsing (space- or tab-delimited words, quote-aware).

use super::ast::{Line, Loc, Pos, SubWord, SubWordType, Token, TokenType};

struct Cursor<'a> {
	text: &'a str,
	bytes: &'a [u8],
	index: usize,
	line: usize,
	col: usize,
}

impl<'a> Cursor<'a> {
	fn new(text: &'a str) -> Self {
		Self { text, bytes: text.as_bytes(), index: 0, line: 0, col: 0 }
	}

	fn pos(&self) -> Pos {
		Pos { index: self.index, line: self.line, col: self.col }
	}

	fn peek(&self) -> Option<u8> {
		self.bytes.get(self.index).copied()
	}

	fn peek_at(&self, offset: usize) -> Option<u8> {
		self.bytes.get(self.index + offset).copied()
	}

	fn advance(&mut self) -> Option<u8> {
		let c = self.peek()?;
		self.index += 1;
		if c == b'\n' {
			self.line += 1;
			self.col = 0;
		} else {
			self.col += 1;
		}
		Some(c)
	}

	fn slice(&self, start: usize, end: usize) -> &'a str {
		&self.text[start..end]
	}
}

fn is_word_break(c: u8) -> bool {
	c == b' ' || c == b'\t' || c == b'\n' || c == b'\r'
}

/// Tokenize one sub-word run starting at the cursor. Stops at whitespace,
/// newline, or `#` (comment start outside of quotes).
fn lex_subwords(cur: &mut Cursor) -> Vec<SubWord> {
	let mut subs = Vec::new();
	let mut lit_start = cur.index;

	loop {
		let Some(c) = cur.peek() else { break };
		if is_word_break(c) {
			break;
		}
		match c {
			b'#' => break,
			b'$' => {
				if cur.index > lit_start {
					subs.push(SubWord {
						kind: SubWordType::KeywordString,
						value: cur.slice(lit_start, cur.index).to_string(),
					});
				}
				let start = cur.index;
				cur.advance(); // '$'
				let braced = cur.peek() == Some(b'{');
				if braced {
					cur.advance();
				}
				while let Some(c) = cur.peek() {
					if braced {
						if c == b'}' {
							cur.advance();
							break;
						}
					} else if is_word_break(c) || c == b'/' || c == b'=' || c == b'"' {
						break;
					}
					cur.advance();
				}
				subs.push(SubWord {
					kind: SubWordType::VarExpansion,
					value: cur.slice(start, cur.index).to_string(),
				});
				lit_start = cur.index;
			},
			b'\'' | b'"' => {
				if cur.index > lit_start {
					subs.push(SubWord {
						kind: SubWordType::KeywordString,
						value: cur.slice(lit_start, cur.index).to_string(),
					});
				}
				let quote = c;
				let start = cur.index;
				cur.advance();
				let mut contains_var = false;
				while let Some(c) = cur.peek() {
					if c == quote {
						cur.advance();
						break;
					}
					if c == b'\\' && cur.peek_at(1).is_some() {
						cur.advance();
						cur.advance();
						continue;
					}
					if c == b'$' {
						contains_var = true;
					}
					cur.advance();
				}
				let kind =
					if quote == b'"' && contains_var { SubWordType::QuotedVarExpansion } else { SubWordType::String };
				subs.push(SubWord { kind, value: cur.slice(start, cur.index).to_string() });
				lit_start = cur.index;
			},
			_ => {
				cur.advance();
			},
		}
	}

	if cur.index > lit_start {
		subs.push(SubWord { kind: SubWordType::KeywordString, value: cur.slice(lit_start, cur.index).to_string() });
	}

	subs
}

/// Tokenize a whole GRUB configuration text into a flat token stream
/// (words, newlines, and comments interspersed exactly as they appear).
#[must_use]
pub fn tokenize(text: &str) -> Vec<Token> {
	let mut cur = Cursor::new(text);
	let mut tokens = Vec::new();

	loop {
		let Some(c) = cur.peek() else { break };
		let start = cur.pos();
		match c {
			b' ' | b'\t' | b'\r' => {
				while matches!(cur.peek(), Some(b' ' | b'\t' | b'\r')) {
					cur.advance();
				}
				let end = cur.pos();
				tokens.push(Token {
					kind: TokenType::Whitespace,
					sub_words: vec![],
					loc: Loc { start, end },
					raw: cur.slice(start.index, end.index).to_string(),
				});
			},
			b'\n' => {
				cur.advance();
				let end = cur.pos();
				tokens.push(Token {
					kind: TokenType::Newline,
					sub_words: vec![],
					loc: Loc { start, end },
					raw: "\n".to_string(),
				});
			},
			b'#' => {
				while cur.peek().is_some_and(|c| c != b'\n') {
					cur.advance();
				}
				let end = cur.pos();
				tokens.push(Token {
					kind: TokenType::Comment,
					sub_words: vec![],
					loc: Loc { start, end },
					raw: cur.slice(start.index, end.index).to_string(),
				});
			},
			_ => {
				let sub_words = lex_subwords(&mut cur);
				let end = cur.pos();
				tokens.push(Token {
					kind: TokenType::Word,
					sub_words,
					loc: Loc { start, end },
					raw: cur.slice(start.index, end.index).to_string(),
				});
			},
		}
	}

	tokens
}

/// Group a flat token stream into [`Line`]s, dropping whitespace/comment
/// tokens (callers needing byte-exact reconstruction work from the original
/// text and the `Word`/`Newline` token spans, not from the grouped `Line`
/// representation).
#[must_use]
pub fn group_lines(tokens: &[Token]) -> Vec<Line> {
	let mut lines = Vec::new();
	let mut current: Vec<Token> = Vec::new();

	for tok in tokens {
		match tok.kind {
			TokenType::Word => current.push(tok.clone()),
			TokenType::Newline => {
				if !current.is_empty() {
					lines.push(Line { tokens: std::mem::take(&mut current), end_token: Some(tok.clone()) });
				}
			},
			TokenType::Whitespace | TokenType::Comment => {},
		}
	}
	if !current.is_empty() {
		lines.push(Line { tokens: current, end_token: None });
	}

	lines
}

//! Text payload normalization.
//!
//! Some sources store ConfigMap data with control characters round-tripped as
//! literal escapes (`\n` as a backslash and an `n`). Values are decoded back to
//! real control characters, CRLF line endings become LF and non-breaking
//! spaces become plain spaces.

use serde_json::Value;

const NBSP: char = '\u{a0}';

/// Normalize every string reachable from `value`.
pub fn normalize_value(value: &mut Value) {
	match value {
		Value::String(s) => {
			if needs_normalization(s) {
				*s = normalize_str(s);
			}
		}
		Value::Array(items) => items.iter_mut().for_each(normalize_value),
		Value::Object(map) => map.values_mut().for_each(normalize_value),
		_ => {}
	}
}

fn needs_normalization(s: &str) -> bool {
	s.contains('\\') || s.contains('\r') || s.contains(NBSP)
}

/// Decode literal `\n`, `\t`, `\r`, then fold CRLF to LF and NBSP to space.
pub fn normalize_str(input: &str) -> String {
	let mut decoded = String::with_capacity(input.len());
	let mut chars = input.chars().peekable();
	while let Some(c) = chars.next() {
		if c != '\\' {
			decoded.push(c);
			continue;
		}
		let replacement = match chars.peek() {
			Some('n') => '\n',
			Some('t') => '\t',
			Some('r') => '\r',
			_ => {
				decoded.push(c);
				continue;
			}
		};
		chars.next();
		decoded.push(replacement);
	}

	decoded.replace("\r\n", "\n").replace(NBSP, " ")
}

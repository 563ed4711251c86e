//! YAML encoding of backed-up objects.
//!
//! Follows the encoder of jrsonnet's `rtk` (its `yaml` module): the same
//! go-yaml v3 key ordering and serde-saphyr options, so backups of the same
//! object are byte-identical across runs and diff cleanly against kubectl output.

use std::cmp::Ordering;

use serde_json::Value;
use tracing::instrument;

/// Sort object keys recursively using go-yaml v3's natural order.
pub fn sort_keys(value: Value) -> Value {
	match value {
		Value::Object(map) => {
			let mut entries: Vec<(String, Value)> = map.into_iter().collect();
			entries.sort_by(|(a, _), (b, _)| natural_key_cmp(a, b));
			Value::Object(
				entries
					.into_iter()
					.map(|(k, v)| (k, sort_keys(v)))
					.collect(),
			)
		}
		Value::Array(items) => Value::Array(items.into_iter().map(sort_keys).collect()),
		other => other,
	}
}

/// go-yaml v3 key ordering (sorter.go).
///
/// Digit runs compare numerically. Right after a digit, letters sort before
/// other characters; elsewhere non-letters sort first.
fn natural_key_cmp(a: &str, b: &str) -> Ordering {
	let ar: Vec<char> = a.chars().collect();
	let br: Vec<char> = b.chars().collect();
	let mut after_digit = false;

	for i in 0..ar.len().min(br.len()) {
		let (ac, bc) = (ar[i], br[i]);
		if ac == bc {
			after_digit = ac.is_ascii_digit();
			continue;
		}

		let (a_letter, b_letter) = (ac.is_alphabetic(), bc.is_alphabetic());
		if a_letter && b_letter {
			return ac.cmp(&bc);
		}
		if a_letter || b_letter {
			let letters_first = if after_digit { a_letter } else { b_letter };
			return if letters_first {
				Ordering::Less
			} else {
				Ordering::Greater
			};
		}

		// Both non-letters: compare whole digit runs, leading zeros included.
		let mut an: i64 = 0;
		let mut bn: i64 = 0;
		let nonzero_prefix = ar[..i]
			.iter()
			.rev()
			.take_while(|c| c.is_ascii_digit())
			.any(|&c| c != '0');
		if (ac == '0' || bc == '0') && nonzero_prefix {
			an = 1;
			bn = 1;
		}
		let a_end = digit_run_end(&ar, i, &mut an);
		let b_end = digit_run_end(&br, i, &mut bn);

		if an != bn {
			return an.cmp(&bn);
		}
		if a_end != b_end {
			return a_end.cmp(&b_end);
		}
		return ac.cmp(&bc);
	}

	ar.len().cmp(&br.len())
}

fn digit_run_end(chars: &[char], start: usize, acc: &mut i64) -> usize {
	let mut end = start;
	while let Some(d) = chars.get(end).and_then(|c| c.to_digit(10)) {
		*acc = acc.saturating_mul(10).saturating_add(i64::from(d));
		end += 1;
	}
	end
}

/// Encode one object as a block-style YAML document.
#[instrument(skip_all)]
pub fn to_yaml(value: &Value) -> Result<String, serde_saphyr::ser_error::Error> {
	let sorted = sort_keys(value.clone());

	let options = serde_saphyr::SerializerOptions {
		indent_step: 2,
		indent_array: Some(0),
		prefer_block_scalars: true,
		empty_map_as_braces: true,
		empty_array_as_brackets: true,
		line_width: Some(80),
		scientific_notation_threshold: Some(1000000),
		scientific_notation_small_threshold: Some(0.0001),
		quote_ambiguous_keys: true,
		quote_numeric_strings: true,
		..Default::default()
	};

	let mut output = String::new();
	serde_saphyr::to_fmt_writer_with_options(&mut output, &sorted, options)?;
	Ok(output)
}

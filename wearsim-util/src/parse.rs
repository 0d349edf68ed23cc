//! Human-input parsing

// Imports
use {
	anyhow::Context,
	std::{collections::HashMap, fs, path::Path},
};

/// Parses a shorthand magnitude string, e.g. `20B` for 20 billion or `4K`
/// for 4096 bytes.
///
/// `base` selects the magnitude step: 1000 for counts and throughputs,
/// 1024 for byte sizes.
pub fn shorthand_to_u64(s: &str, base: u64) -> Result<u64, anyhow::Error> {
	debug_assert!(base == 1000 || base == 1024);

	let s = s.trim();
	let last = s.chars().next_back().context("Empty value")?;

	let multiplier = match last.to_ascii_uppercase() {
		'K' => base,
		'M' => base.pow(2),
		'B' | 'G' => base.pow(3),
		'T' => base.pow(4),
		'Q' => base.pow(5),
		_ => 1,
	};

	let mant = match multiplier {
		1 => s,
		_ => &s[..s.len() - last.len_utf8()],
	};
	let mant = mant
		.parse::<u64>()
		.with_context(|| format!("Unable to parse {mant:?} as an integer"))?;

	mant.checked_mul(multiplier)
		.with_context(|| format!("Value {s:?} overflows a 64-bit integer"))
}

/// Parses a human-supplied string into a boolean value
pub fn parse_boolean(s: &str) -> Result<bool, anyhow::Error> {
	match s.to_lowercase().as_str() {
		"e" | "enabled" | "on" | "t" | "true" | "y" | "yes" | "1" => Ok(true),
		"d" | "disabled" | "off" | "f" | "false" | "n" | "no" | "0" => Ok(false),
		_ => anyhow::bail!("Unable to parse {s:?} as a boolean"),
	}
}

/// Parses a basic `KEY VALUE` input file, one pair per line, into a map.
///
/// Blank lines are skipped; a key without a value is an error.
pub fn parse_kv_file(path: &Path) -> Result<HashMap<String, String>, anyhow::Error> {
	let contents = fs::read_to_string(path).with_context(|| format!("Unable to read {}", path.display()))?;

	let mut map = HashMap::new();
	for line in contents.lines() {
		let mut tokens = line.split_whitespace();
		let Some(key) = tokens.next() else { continue };
		let value = tokens
			.next()
			.with_context(|| format!("Missing value for key {key:?}"))?;

		map.insert(key.to_owned(), value.to_owned());
	}

	Ok(map)
}

#[cfg(test)]
mod tests {
	// Imports
	use {super::*, std::io::Write};

	#[test]
	fn shorthand_plain() {
		assert_eq!(shorthand_to_u64("17", 1000).unwrap(), 17);
		assert_eq!(shorthand_to_u64(" 42 ", 1024).unwrap(), 42);
	}

	#[test]
	fn shorthand_suffixes() {
		assert_eq!(shorthand_to_u64("20B", 1000).unwrap(), 20_000_000_000);
		assert_eq!(shorthand_to_u64("4K", 1024).unwrap(), 4096);
		assert_eq!(shorthand_to_u64("4k", 1024).unwrap(), 4096);
		assert_eq!(shorthand_to_u64("2G", 1024).unwrap(), 2 * 1024 * 1024 * 1024);
		assert_eq!(shorthand_to_u64("1T", 1000).unwrap(), 1_000_000_000_000);
		assert_eq!(shorthand_to_u64("1Q", 1000).unwrap(), 1_000_000_000_000_000);
	}

	#[test]
	fn shorthand_rejects_garbage() {
		assert!(shorthand_to_u64("", 1000).is_err());
		assert!(shorthand_to_u64("K", 1000).is_err());
		assert!(shorthand_to_u64("12.5K", 1000).is_err());
		assert!(shorthand_to_u64("99999999999999999999Q", 1000).is_err());
	}

	#[test]
	fn booleans() {
		for s in ["e", "enabled", "ON", "t", "True", "y", "yes", "1"] {
			assert_eq!(parse_boolean(s).unwrap(), true, "{s:?}");
		}
		for s in ["d", "disabled", "OFF", "f", "False", "n", "no", "0"] {
			assert_eq!(parse_boolean(s).unwrap(), false, "{s:?}");
		}
		assert!(parse_boolean("maybe").is_err());
	}

	#[test]
	fn kv_file() {
		let mut file = tempfile::NamedTempFile::new().expect("Unable to create temp file");
		writeln!(file, "PAGE_SIZE 4096").expect("Unable to write");
		writeln!(file).expect("Unable to write");
		writeln!(file, "P_BITFLIP_PER_WRITE  0.25").expect("Unable to write");

		let map = parse_kv_file(file.path()).expect("Unable to parse");
		assert_eq!(map["PAGE_SIZE"], "4096");
		assert_eq!(map["P_BITFLIP_PER_WRITE"], "0.25");
		assert_eq!(map.len(), 2);
	}

	#[test]
	fn kv_file_missing_value() {
		let mut file = tempfile::NamedTempFile::new().expect("Unable to create temp file");
		writeln!(file, "PAGE_SIZE").expect("Unable to write");

		assert!(parse_kv_file(file.path()).is_err());
	}
}

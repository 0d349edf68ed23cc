//! Stats reports.
//!
//! Reports are flat `KEY VALUE` listings, echoed to stdout on every dump
//! and written to a file on the terminal dump.

// Imports
use {
	anyhow::Context,
	std::{fmt, fs, path::Path},
};

/// Seconds in a year
pub const SECS_PER_YEAR: f64 = 86400.0 * 365.0;

/// A `KEY VALUE` report
#[derive(Clone, Debug, Default)]
pub struct Report {
	/// All entries, in insertion order
	entries: Vec<(String, String)>,
}

impl Report {
	/// Creates an empty report
	pub fn new() -> Self {
		Self::default()
	}

	/// Appends an entry
	pub fn entry(&mut self, key: &str, value: impl fmt::Display) -> &mut Self {
		self.entries.push((key.to_owned(), value.to_string()));
		self
	}

	/// Writes the report to a file
	pub fn save(&self, path: &Path) -> Result<(), anyhow::Error> {
		fs::write(path, self.to_string()).with_context(|| format!("Unable to write report to {}", path.display()))
	}
}

impl fmt::Display for Report {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		for (key, value) in &self.entries {
			writeln!(f, "{key} {value}")?;
		}

		Ok(())
	}
}

/// Estimates the system lifetime, in seconds, from the most-written slot.
///
/// Scales the simulated time by the inverse of that slot's consumed wear
/// fraction.
pub fn lifetime_est_viamax_s(system_time_s: f64, most_written_bfs: u64, bucket_cap: u64) -> f64 {
	let wear_pct = most_written_bfs as f64 / bucket_cap as f64;
	system_time_s / wear_pct
}

/// Estimates the system lifetime, in seconds, from the average wear.
///
/// Scales the simulated time by the inverse of the fraction of all possible
/// bit-flips performed.
pub fn lifetime_est_viaavg_s(system_time_s: f64, bfs_performed: u64, bfs_possible: u64) -> f64 {
	let frac_bfs = bfs_performed as f64 / bfs_possible as f64;
	system_time_s / frac_bfs
}

//! Arguments

// Imports
use {
	std::path::PathBuf,
	wearsim::bit_track::WriteFactorMode,
	wearsim_util::parse,
};

/// Arguments
#[derive(Debug)]
#[derive(clap::Parser)]
pub struct Args {
	/// Log file
	///
	/// Specifies a file to perform verbose logging to.
	/// You can use `RUST_LOG_FILE` to set filtering options
	#[clap(long = "log-file")]
	pub log_file: Option<PathBuf>,

	/// Whether to append to the log file
	#[clap(long = "log-file-append")]
	pub log_file_append: bool,

	/// Number of wear-leveling queues
	#[clap(short = 'n', long = "buckets", value_parser = parse_count)]
	pub n_buckets: u64,

	/// Cell write endurance (bit-flips per cell; accepts K/M/B/T/Q shorthand)
	#[clap(short = 'c', long = "endurance", value_parser = parse_count)]
	pub cell_write_endurance: u64,

	/// Directory containing bittrack.txt and bittrack.bin
	#[clap(short = 'b', long = "bittrack-dir")]
	pub bittrack_dir: PathBuf,

	/// Directory containing memtrace.bin
	#[clap(short = 'm', long = "memtrace-dir")]
	pub memtrace_dir: PathBuf,

	/// Write factor mode (average|perpage)
	#[clap(short = 'w', long = "write-factor-mode", value_parser = parse_write_factor_mode)]
	pub write_factor_mode: WriteFactorMode,

	/// Wall-clock duration of one full trace pass, in seconds
	#[clap(short = 't', long = "trace-time-s")]
	pub trace_time_s: f64,

	/// Requested memory size in bytes (power of two; accepts K/M/G/T/Q shorthand)
	#[clap(short = 'g', long = "mem-bytes", value_parser = parse_bytes)]
	pub n_bytes_requested: u64,

	/// Maximum number of full trace passes
	#[clap(short = 'i', long = "iterations", value_parser = parse_count)]
	pub n_iterations: Option<u64>,

	/// Number of promotions to write to the event trace
	#[clap(short = 'e', long = "event-trace-promotions", value_parser = parse_count, default_value = "0")]
	pub n_promotions_to_event_trace: u64,

	/// Trace read window size in bytes
	#[clap(long = "trace-buffer-bytes", value_parser = parse_bytes)]
	pub trace_buffer_bytes: Option<u64>,
}

/// Parses a count argument, in base-1000 shorthand
fn parse_count(s: &str) -> Result<u64, anyhow::Error> {
	parse::shorthand_to_u64(s, 1000)
}

/// Parses a byte-size argument, in base-1024 shorthand
fn parse_bytes(s: &str) -> Result<u64, anyhow::Error> {
	parse::shorthand_to_u64(s, 1024)
}

/// Parses the write factor mode
fn parse_write_factor_mode(s: &str) -> Result<WriteFactorMode, anyhow::Error> {
	s.parse()
}

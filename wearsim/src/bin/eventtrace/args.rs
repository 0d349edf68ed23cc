//! Arguments

// Imports
use {
	std::path::PathBuf,
	wearsim::event_trace::TimestampKind,
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

	/// Event timestamp trace file
	#[clap(short = 'f', long = "trace-file")]
	pub trace_file: PathBuf,

	/// Timestamp scalar type (uint64|float64)
	#[clap(short = 't', long = "trace-type", value_parser = parse_trace_type)]
	pub trace_type: TimestampKind,

	/// Time for one event to elapse.
	///
	/// Accepts K/M/B/T/Q shorthand for uint64 traces, and a plain float for
	/// float64 traces
	#[clap(short = 'd', long = "duration")]
	pub duration: String,
}

/// Parses the timestamp scalar type
fn parse_trace_type(s: &str) -> Result<TimestampKind, anyhow::Error> {
	s.parse()
}

//! Arguments

// Imports
use {
	std::path::PathBuf,
	wearsim::jobs::JobTable,
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

	/// Line size in bytes (power of two)
	#[clap(short = 'l', long = "line-size", value_parser = parse_bytes)]
	pub line_size: u64,

	/// Page size in bytes (power of two)
	#[clap(short = 'p', long = "page-size", value_parser = parse_bytes)]
	pub page_size: u64,

	/// Memory size per node in bytes (power of two; accepts K/M/G/T/Q shorthand)
	#[clap(short = 'g', long = "mem-bytes-per-node", value_parser = parse_bytes)]
	pub n_bytes_mem_per_node: u64,

	/// Scheduler time quantum, in seconds
	#[clap(short = 't', long = "quanta-s")]
	pub scheduler_quanta_s: f64,

	/// Whether to perform rotation/rebalancing
	#[clap(short = 'r', long = "rebalance", value_parser = parse_rebalance, action = clap::ArgAction::Set)]
	pub rebalance: bool,

	/// Jobs, one per node, as `bw:rss:wf[,bw:rss:wf…]`
	///
	/// Write bandwidth in bytes/s, resident set size in bytes, and a write
	/// factor within [0.0, 1.0]
	#[clap(short = 'j', long = "jobs", value_parser = parse_jobs)]
	pub jobs: JobTable,

	/// Maximum number of epochs
	#[clap(short = 'i', long = "iterations", value_parser = parse_count)]
	pub n_iterations: Option<u64>,

	/// Number of promotions to write to the event trace
	#[clap(short = 'e', long = "event-trace-promotions", value_parser = parse_count, default_value = "0")]
	pub n_promotions_to_event_trace: u64,
}

/// Parses a count argument, in base-1000 shorthand
fn parse_count(s: &str) -> Result<u64, anyhow::Error> {
	parse::shorthand_to_u64(s, 1000)
}

/// Parses a byte-size argument, in base-1024 shorthand
fn parse_bytes(s: &str) -> Result<u64, anyhow::Error> {
	parse::shorthand_to_u64(s, 1024)
}

/// Parses the rebalance toggle
fn parse_rebalance(s: &str) -> Result<bool, anyhow::Error> {
	parse::parse_boolean(s)
}

/// Parses the job table
fn parse_jobs(s: &str) -> Result<JobTable, anyhow::Error> {
	JobTable::parse(s)
}

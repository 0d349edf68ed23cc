//! Promotion event queue-depth analyzer.
//!
//! Reads a promotion timestamp trace and reports the maximum number of
//! events that were in flight at once, for a given per-event service
//! duration.

// Modules
mod args;

// Imports
use {
	self::args::Args,
	anyhow::Context,
	clap::Parser,
	std::{fmt, path::Path},
	wearsim::{
		event_trace::{self, EventTraceReader, Timestamp, TimestampKind},
		stats::Report,
	},
	wearsim_util::{logger, parse},
};

/// Stats file of the analyzer
const STATS_FILENAME: &str = "eventtrace.txt";

fn main() -> Result<(), anyhow::Error> {
	// Get arguments
	let args = Args::parse();
	logger::pre_init::debug(format!("Args: {args:?}"));

	// Initialize logging
	logger::init(args.log_file.as_deref(), args.log_file_append);

	// The duration is parsed according to the trace's scalar type
	match args.trace_type {
		TimestampKind::Uint64 => {
			let duration = parse::shorthand_to_u64(&args.duration, 1000).context("Unable to parse event duration")?;
			anyhow::ensure!(duration != 0, "Event duration must be non-zero");
			run(&args.trace_file, duration, "UINT64")
		},
		TimestampKind::Float64 => {
			let duration = args
				.duration
				.parse::<f64>()
				.context("Unable to parse event duration")?;
			anyhow::ensure!(duration > 0.0, "Event duration must be positive");
			run(&args.trace_file, duration, "FLOAT64")
		},
	}
}

/// Runs the analysis and dumps its stats
fn run<Ts: Timestamp + fmt::Display>(trace_file: &Path, duration: Ts, type_name: &str) -> Result<(), anyhow::Error> {
	let reader = EventTraceReader::<Ts>::load(trace_file).context("Unable to load event trace")?;
	tracing::info!(n_events = reader.events().len(), "Loaded event trace");

	let max_queue_depth = event_trace::max_queue_depth(reader.events(), duration);

	let mut report = Report::new();
	report
		.entry("INPUT_TRACE_TYPE", type_name)
		.entry("EVENT_DURATION", duration)
		.entry("MAX_QUEUE_DEPTH", max_queue_depth);

	print!("{report}");
	report.save(Path::new(STATS_FILENAME)).context("Unable to write stats file")
}

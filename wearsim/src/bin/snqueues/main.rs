//! Single-node wear-leveling lifetime simulator.
//!
//! Replays a memory trace against a wear-leveled single-node memory and
//! prints progressive estimates of how long the system will last.

// Modules
mod args;

// Imports
use {
	self::args::Args,
	anyhow::Context,
	clap::Parser,
	wearsim::{
		mem_trace,
		sim::{SnConfig, SnSim},
	},
	wearsim_util::logger,
};

fn main() -> Result<(), anyhow::Error> {
	// Get arguments
	let args = Args::parse();
	logger::pre_init::debug(format!("Args: {args:?}"));

	// Initialize logging
	logger::init(args.log_file.as_deref(), args.log_file_append);

	// Build the simulation
	let mut sim = SnSim::new(SnConfig {
		n_buckets: args.n_buckets,
		cell_write_endurance: args.cell_write_endurance,
		bittrack_dir: args.bittrack_dir,
		memtrace_dir: args.memtrace_dir,
		write_factor_mode: args.write_factor_mode,
		trace_time_s: args.trace_time_s,
		n_bytes_requested: args.n_bytes_requested,
		n_iterations: args.n_iterations.unwrap_or(u64::MAX),
		n_promotions_to_event_trace: args.n_promotions_to_event_trace,
		trace_buffer_bytes: args.trace_buffer_bytes.unwrap_or(mem_trace::DEFAULT_BUFFER_SIZE_BYTES),
	})
	.context("Unable to set up simulation")?;

	// Then run it and dump the terminal stats
	sim.run().context("Unable to run simulation")?;
	sim.dump_stats(true).context("Unable to dump stats")?;

	Ok(())
}

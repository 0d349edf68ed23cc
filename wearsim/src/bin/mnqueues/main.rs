//! Multi-node wear-leveling lifetime simulator.
//!
//! Steps a per-node job scheduler against wear-leveled nodes and prints
//! progressive estimates of how long the system will last.

// Modules
mod args;

// Imports
use {
	self::args::Args,
	anyhow::Context,
	clap::Parser,
	wearsim::sim::{MnConfig, MnSim},
	wearsim_util::logger,
};

fn main() -> Result<(), anyhow::Error> {
	// Get arguments
	let args = Args::parse();
	logger::pre_init::debug(format!("Args: {args:?}"));

	// Initialize logging
	logger::init(args.log_file.as_deref(), args.log_file_append);

	// Build the simulation
	let mut sim = MnSim::new(MnConfig {
		n_buckets: args.n_buckets,
		cell_write_endurance: args.cell_write_endurance,
		line_size: args.line_size,
		page_size: args.page_size,
		n_bytes_mem_per_node: args.n_bytes_mem_per_node,
		scheduler_quanta_s: args.scheduler_quanta_s,
		rebalance: args.rebalance,
		jobs: args.jobs,
		n_iterations: args.n_iterations.unwrap_or(u64::MAX),
		n_promotions_to_event_trace: args.n_promotions_to_event_trace,
	})
	.context("Unable to set up simulation")?;

	// Then run it and dump the terminal stats
	sim.run().context("Unable to run simulation")?;
	sim.dump_stats(true).context("Unable to dump stats")?;

	Ok(())
}

//! Simulation drivers.
//!
//! Wires a configured queue engine to its event source and runs it to
//! completion: [`SnSim`] replays a memory trace against per-page frames,
//! [`MnSim`] steps a job scheduler against whole nodes. Both dump
//! incremental stats while running and a terminal report when done.

// Imports
use {
	crate::{
		bit_track::{WearModel, WriteFactorMode},
		event_trace::EventTraceWriter,
		jobs::{self, JobId, JobTable, NoRebalanceEstimate},
		mem_trace::{AccessKind, MemTraceReader, PageAddr},
		queues::{DenseKeyMap, PromotionTrigger, QueueConfig, QueueEngine, WriteOutcome},
		stats::{self, Report},
	},
	anyhow::Context,
	std::path::{Path, PathBuf},
	wearsim_util::DisplayWrapper,
};

/// Stats file of the single-node simulation
const SN_STATS_FILENAME: &str = "snqueues.txt";

/// Event trace of the single-node simulation
const SN_EVENT_TRACE_FILENAME: &str = "snqueues-promotion-timestamps-uint64.bin";

/// Stats file of the multi-node simulation
const MN_STATS_FILENAME: &str = "mnqueues.txt";

/// Event trace of the multi-node simulation
const MN_EVENT_TRACE_FILENAME: &str = "mnqueues-promotion-timestamps-float64.bin";

/// Epochs between incremental stats dumps of the multi-node simulation
const INCREMENTAL_DUMP_EPOCHS: u64 = 100_000_000;

/// Single-node simulation configuration
#[derive(Clone, Debug)]
pub struct SnConfig {
	/// Number of wear-leveling queues
	pub n_buckets: u64,

	/// Bit-flips a cell tolerates before wear-out
	pub cell_write_endurance: u64,

	/// Directory containing `bittrack.txt` and `bittrack.bin`
	pub bittrack_dir: PathBuf,

	/// Directory containing `memtrace.bin`
	pub memtrace_dir: PathBuf,

	/// Write factor mode
	pub write_factor_mode: WriteFactorMode,

	/// Wall-clock duration of one full trace pass (seconds)
	pub trace_time_s: f64,

	/// Requested memory size (bytes, power of two)
	pub n_bytes_requested: u64,

	/// Maximum number of full trace passes
	pub n_iterations: u64,

	/// Promotions to write to the event trace
	pub n_promotions_to_event_trace: u64,

	/// Trace read window size (bytes)
	pub trace_buffer_bytes: u64,
}

/// Single-node simulation
#[derive(Debug)]
pub struct SnSim {
	/// Configuration
	config: SnConfig,

	/// Wear model
	model: WearModel,

	/// Trace reader
	reader: MemTraceReader,

	/// Queue engine over page frames
	engine: QueueEngine<PageAddr>,

	/// Cycle of the last trace record, for scaling timestamps across passes
	trace_end_cycle: u64,

	/// Simulated time (seconds)
	system_time_s: f64,

	// Memory actually simulated, after sizing
	n_bytes_mem: u64,
	n_pages_mem: u64,
}

impl SnSim {
	/// Creates a simulation from its configuration, loading all inputs
	pub fn new(config: SnConfig) -> Result<Self, anyhow::Error> {
		anyhow::ensure!(config.n_buckets > 0, "Bucket count must be non-zero");
		anyhow::ensure!(config.cell_write_endurance > 0, "Cell write endurance must be non-zero");
		anyhow::ensure!(config.trace_time_s > 0.0, "Trace time must be positive");
		anyhow::ensure!(config.n_bytes_requested > 0, "Requested memory size must be non-zero");
		anyhow::ensure!(
			config.n_bytes_requested.is_power_of_two(),
			"Requested memory size must be a power of two"
		);

		let model =
			WearModel::load(&config.bittrack_dir, config.write_factor_mode).context("Unable to load wear model")?;

		let memtrace_path = config.memtrace_dir.join("memtrace.bin");
		let reader = MemTraceReader::load_with_buffer_size(&memtrace_path, config.trace_buffer_bytes)
			.context("Unable to load memory trace")?;
		anyhow::ensure!(
			reader.n_writes_in_trace() > 0,
			"Trace contains no writes; lifetime = infinity"
		);

		let event_trace = EventTraceWriter::create(Path::new(SN_EVENT_TRACE_FILENAME), config.n_promotions_to_event_trace)
			.context("Unable to create event trace")?;
		let engine = QueueEngine::new(
			&QueueConfig {
				n_buckets: config.n_buckets,
				cell_write_endurance: config.cell_write_endurance,
				bits_per_slot: model.summary().bits_per_page(),
				trigger: PromotionTrigger::AtInterval,
			},
			event_trace,
		)?;

		// Remember the last cycle in the trace so timestamps keep growing
		// across passes
		let trace_end_cycle = reader.last_record().cycle;

		tracing::info!(
			n_buckets = config.n_buckets,
			bucket_interval = engine.bucket_interval(),
			bucket_cap = engine.bucket_cap(),
			n_writes_in_trace = reader.n_writes_in_trace(),
			"Starting single-node simulation"
		);

		Ok(Self {
			config,
			model,
			reader,
			engine,
			trace_end_cycle,
			system_time_s: 0.0,
			n_bytes_mem: 0,
			n_pages_mem: 0,
		})
	}

	/// Runs the simulation until wear-out or the pass budget
	pub fn run(&mut self) -> Result<(), anyhow::Error> {
		let summary = *self.model.summary();
		let (line_size_log2, page_size_log2) = (summary.line_size_log2(), summary.page_size_log2());

		// Warm-up pass: one frame per distinct page, all in the coldest queue
		loop {
			let record = self.reader.read_next().context("Unable to read record")?;
			let page_addr = record.page_addr(line_size_log2, page_size_log2);
			if !self.engine.contains(page_addr) {
				self.engine.push_slot(page_addr);
			}

			if self.reader.is_end_of_pass() {
				break;
			}
		}
		self.reader.reset(false).context("Unable to reset trace reader")?;

		// Size the memory: the requested size, or, if the trace's rss is
		// bigger, the next power of two that fits it
		let n_pages_rss = self.engine.n_slots() as u64;
		let n_bytes_rss = n_pages_rss * summary.page_size;
		let n_pages_requested = self.config.n_bytes_requested / summary.page_size;
		self.n_bytes_mem = match n_pages_rss > n_pages_requested {
			true => {
				if !n_bytes_rss.is_power_of_two() {
					tracing::info!("Requested memory size was smaller than the trace rss, rounding up");
				}
				n_bytes_rss.next_power_of_two()
			},
			false => self.config.n_bytes_requested,
		};
		self.n_pages_mem = self.n_bytes_mem / summary.page_size;

		tracing::info!(
			mib_in_memory = self.n_bytes_mem / (1024 * 1024),
			n_pages_rss,
			"Beginning simulation"
		);

		// Prepend the remaining free frames to the coldest queue.
		// Several frames sharing the placeholder address is fine, it's just
		// a filler value.
		for _ in n_pages_rss..self.n_pages_mem {
			self.engine.push_filler_slot(PageAddr::FILLER);
		}

		// Main loop
		loop {
			if self.reader.is_end_of_pass() {
				self.system_time_s += self.config.trace_time_s;
				self.dump_stats(false)?;

				if self.reader.n_full_passes() + 1 == self.config.n_iterations {
					break;
				}
			}

			let record = self.reader.read_next().context("Unable to read record")?;

			// The wear engine only sees writes
			if record.kind == AccessKind::Read {
				continue;
			}

			let page_addr = record.page_addr(line_size_log2, page_size_log2);
			let charge = self.model.bfpw(page_addr);
			let now = record.cycle + self.reader.n_full_passes() * self.trace_end_cycle;

			let outcome = self
				.engine
				.record_write(page_addr, charge, now, &self.model)
				.context("Unable to record write")?;
			if outcome == WriteOutcome::WoreOut {
				break;
			}
		}

		self.engine.finish()
	}

	/// Dumps stats to stdout and, on the terminal dump, to the stats file
	pub fn dump_stats(&self, terminal: bool) -> Result<(), anyhow::Error> {
		let status = match terminal {
			true => "termination",
			false => "incremental",
		};
		println!("-------------------- {status} stats print --------------------");

		tracing::info!(
			"Queue occupancy: {}",
			DisplayWrapper::new(|f| {
				for queue_idx in 0..self.engine.n_queues() {
					write!(f, "{} ", self.engine.queue_len(queue_idx))?;
				}
				Ok(())
			})
		);
		let wear = self
			.engine
			.slots()
			.map(|slot| slot.lifetime_bfs as f64)
			.collect::<average::Variance>();
		tracing::info!("Mean frame wear: {:.4} ± {:.4} bit-flips", wear.mean(), wear.error());

		let most_written = self.engine.most_written().context("No writes were simulated")?;
		let wear_pct = most_written.lifetime_bfs as f64 / self.engine.bucket_cap() as f64;
		let viamax_s = stats::lifetime_est_viamax_s(self.system_time_s, most_written.lifetime_bfs, self.engine.bucket_cap());

		let mut report = Report::new();
		if terminal {
			report
				.entry("QUEUES", self.config.n_buckets)
				.entry("CELL_WRITE_ENDURANCE", self.config.cell_write_endurance)
				.entry("PAGE_SIZE_BYTES", self.model.summary().page_size)
				.entry("MEMORY_BYTES_REQUESTED", self.config.n_bytes_requested)
				.entry("MEMORY_BYTES_INSIM", self.n_bytes_mem)
				.entry("MEMORY_PAGES_INSIM", self.n_pages_mem);
		}
		report
			.entry("FULL_PASSES", self.reader.n_full_passes())
			.entry("SYSTEM_TIME_S", self.system_time_s)
			.entry("MOST_WRITTEN_FRAME_BFS", most_written.lifetime_bfs)
			.entry("MOST_WRITTEN_FRAME_WEAR_PCT", wear_pct)
			.entry("MOST_WRITTEN_FRAME_QUEUE", most_written.queue_idx)
			.entry("LOWEST_ACTIVE_QUEUE", self.engine.lowest_active_queue())
			.entry("TOTAL_BYTES_TRANSFERRED", self.engine.total_bytes_transferred())
			.entry("TOTAL_BYTES_DELAY", self.engine.total_bytes_delay())
			.entry("TOTAL_N_PROMOTIONS", self.engine.total_n_promotions())
			.entry("LIFETIME_EST_VIAMAX_S", viamax_s)
			.entry("LIFETIME_EST_VIAMAX_Y", viamax_s / stats::SECS_PER_YEAR);
		if terminal {
			// The average is taken over the *requested* memory size
			let bfs_possible = self.config.n_bytes_requested * 8 * self.config.cell_write_endurance;
			let viaavg_s = stats::lifetime_est_viaavg_s(self.system_time_s, self.engine.lifetime_bfs_sum(), bfs_possible);
			report
				.entry("LIFETIME_EST_VIAAVG_S", viaavg_s)
				.entry("LIFETIME_EST_VIAAVG_Y", viaavg_s / stats::SECS_PER_YEAR);
		}

		print!("{report}");
		if terminal {
			report.save(Path::new(SN_STATS_FILENAME))?;
		}

		Ok(())
	}

	/// Returns the queue engine
	pub fn engine(&self) -> &QueueEngine<PageAddr> {
		&self.engine
	}

	/// Returns the trace reader
	pub fn reader(&self) -> &MemTraceReader {
		&self.reader
	}

	/// Returns the simulated time, in seconds
	pub fn system_time_s(&self) -> f64 {
		self.system_time_s
	}

	/// Returns the number of pages simulated, after sizing
	pub fn n_pages_mem(&self) -> u64 {
		self.n_pages_mem
	}
}

/// Multi-node simulation configuration
#[derive(Clone, Debug)]
pub struct MnConfig {
	/// Number of wear-leveling queues
	pub n_buckets: u64,

	/// Bit-flips a cell tolerates before wear-out
	pub cell_write_endurance: u64,

	/// Line size (bytes, power of two)
	pub line_size: u64,

	/// Page size (bytes, power of two)
	pub page_size: u64,

	/// Memory behind each node (bytes, power of two)
	pub n_bytes_mem_per_node: u64,

	/// Scheduler quantum (seconds)
	pub scheduler_quanta_s: f64,

	/// Whether to rotate jobs across nodes at all
	pub rebalance: bool,

	/// The jobs, one per node
	pub jobs: JobTable,

	/// Maximum number of epochs
	pub n_iterations: u64,

	/// Promotions to write to the event trace
	pub n_promotions_to_event_trace: u64,
}

/// Multi-node simulation
#[derive(Debug)]
pub struct MnSim {
	/// Configuration
	config: MnConfig,

	/// Queue engine over nodes
	engine: QueueEngine<JobId, DenseKeyMap>,

	/// Bits of memory behind each node
	bits_per_node: u64,

	/// Completed epochs
	epoch: u64,

	/// Simulated time (seconds)
	system_time_s: f64,

	/// Closed-form result when running without rebalancing
	no_rebalance: Option<NoRebalanceEstimate>,
}

impl MnSim {
	/// Creates a simulation from its configuration
	pub fn new(mut config: MnConfig) -> Result<Self, anyhow::Error> {
		anyhow::ensure!(config.n_buckets > 0, "Bucket count must be non-zero");
		anyhow::ensure!(config.cell_write_endurance > 0, "Cell write endurance must be non-zero");
		anyhow::ensure!(config.line_size.is_power_of_two(), "Line size must be a power of two");
		anyhow::ensure!(config.page_size.is_power_of_two(), "Page size must be a power of two");
		anyhow::ensure!(
			config.line_size <= config.page_size,
			"Line size must be at most the page size"
		);
		anyhow::ensure!(
			config.n_bytes_mem_per_node.is_power_of_two(),
			"Per-node memory size must be a power of two"
		);
		anyhow::ensure!(config.scheduler_quanta_s > 0.0, "Scheduler quantum must be positive");
		anyhow::ensure!(!config.jobs.is_empty(), "Job table is empty");

		config.jobs.set_quanta(config.scheduler_quanta_s);

		let bits_per_node = config
			.n_bytes_mem_per_node
			.checked_mul(8)
			.context("Per-node bit count overflows a 64-bit counter")?;

		let event_trace = EventTraceWriter::create(Path::new(MN_EVENT_TRACE_FILENAME), config.n_promotions_to_event_trace)
			.context("Unable to create event trace")?;
		let engine = QueueEngine::new(
			&QueueConfig {
				n_buckets: config.n_buckets,
				cell_write_endurance: config.cell_write_endurance,
				bits_per_slot: bits_per_node,
				trigger: PromotionTrigger::AboveInterval,
			},
			event_trace,
		)?;

		tracing::info!(
			n_buckets = config.n_buckets,
			bucket_interval = engine.bucket_interval(),
			bucket_cap = engine.bucket_cap(),
			n_nodes = config.jobs.len(),
			scheduler_quanta_s = config.scheduler_quanta_s,
			"Starting multi-node simulation"
		);

		Ok(Self {
			config,
			engine,
			bits_per_node,
			epoch: 0,
			system_time_s: 0.0,
			no_rebalance: None,
		})
	}

	/// Runs the simulation until wear-out or the epoch budget
	pub fn run(&mut self) -> Result<(), anyhow::Error> {
		match self.config.rebalance {
			true => self.run_rebalance(),
			false => self.run_no_rebalance(),
		}
	}

	/// Runs the full queue simulation
	fn run_rebalance(&mut self) -> Result<(), anyhow::Error> {
		// Job `i` starts out on node `i`, all nodes in the coldest queue
		for idx in 0..self.config.jobs.len() {
			self.engine.push_slot(idx as JobId);
		}

		tracing::info!(
			mib_per_node = self.config.n_bytes_mem_per_node / (1024 * 1024),
			"Beginning simulation"
		);

		'epochs: while self.epoch < self.config.n_iterations {
			for idx in 0..self.config.jobs.len() {
				let idx = idx as JobId;
				let charge = self.config.jobs.get(idx).bit_writes_per_quanta;

				let outcome = self
					.engine
					.record_write(idx, charge, self.system_time_s, &self.config.jobs)
					.context("Unable to record quantum")?;
				if outcome == WriteOutcome::WoreOut {
					break 'epochs;
				}
			}

			self.system_time_s += self.config.scheduler_quanta_s;
			self.epoch += 1;

			if self.epoch % INCREMENTAL_DUMP_EPOCHS == 0 {
				self.dump_stats(false)?;
			}
		}

		self.engine.finish()
	}

	/// Computes the closed-form lifetime without any rebalancing
	fn run_no_rebalance(&mut self) -> Result<(), anyhow::Error> {
		let est = jobs::no_rebalance_estimate(
			&self.config.jobs,
			self.bits_per_node,
			self.config.cell_write_endurance,
			self.config.scheduler_quanta_s,
		)?;
		tracing::info!(
			job = est.job_idx,
			epochs = est.epochs,
			"Most write-intensive job exhausts its node's write budget"
		);

		self.epoch = est.epochs;
		self.system_time_s = est.system_time_s;
		self.no_rebalance = Some(est);

		Ok(())
	}

	/// Dumps stats to stdout and, on the terminal dump, to the stats file
	pub fn dump_stats(&self, terminal: bool) -> Result<(), anyhow::Error> {
		let status = match terminal {
			true => "termination",
			false => "incremental",
		};
		println!("-------------------- {status} stats print --------------------");

		// Without rebalancing the engine never ran; the estimate stands in
		// for the worn node.
		let (most_written_bfs, most_written_queue) = match &self.no_rebalance {
			Some(est) => (est.lifetime_bfs, 0),
			None => {
				let most_written = self.engine.most_written().context("No epochs were simulated")?;
				(most_written.lifetime_bfs, most_written.queue_idx)
			},
		};
		let wear_pct = most_written_bfs as f64 / self.engine.bucket_cap() as f64;
		let viamax_s = stats::lifetime_est_viamax_s(self.system_time_s, most_written_bfs, self.engine.bucket_cap());

		let mut report = Report::new();
		if terminal {
			report
				.entry("QUEUES", self.config.n_buckets)
				.entry("CELL_WRITE_ENDURANCE", self.config.cell_write_endurance)
				.entry("PAGE_SIZE_BYTES", self.config.page_size)
				.entry("N_NODES", self.config.jobs.len())
				.entry("MEMORY_BYTES_PER_NODE", self.config.n_bytes_mem_per_node);
		}
		report
			.entry("EPOCHS", self.epoch)
			.entry("SYSTEM_TIME_S", self.system_time_s)
			.entry("MOST_WRITTEN_NODE_BFS", most_written_bfs)
			.entry("MOST_WRITTEN_NODE_WEAR_PCT", wear_pct)
			.entry("MOST_WRITTEN_NODE_QUEUE", most_written_queue)
			.entry("LOWEST_ACTIVE_QUEUE", self.engine.lowest_active_queue())
			.entry("TOTAL_BYTES_TRANSFERRED", self.engine.total_bytes_transferred())
			.entry("TOTAL_BYTES_DELAY", self.engine.total_bytes_delay())
			.entry("TOTAL_N_PROMOTIONS", self.engine.total_n_promotions())
			.entry("LIFETIME_EST_VIAMAX_S", viamax_s)
			.entry("LIFETIME_EST_VIAMAX_Y", viamax_s / stats::SECS_PER_YEAR);
		if terminal {
			// Undefined (infinite) without rebalancing, as no per-node wear
			// was simulated
			let bfs_possible = self.bits_per_node * self.config.cell_write_endurance * self.config.jobs.len() as u64;
			let viaavg_s = stats::lifetime_est_viaavg_s(self.system_time_s, self.engine.lifetime_bfs_sum(), bfs_possible);
			report
				.entry("LIFETIME_EST_VIAAVG_S", viaavg_s)
				.entry("LIFETIME_EST_VIAAVG_Y", viaavg_s / stats::SECS_PER_YEAR);
		}

		print!("{report}");
		if terminal {
			report.save(Path::new(MN_STATS_FILENAME))?;
		}

		Ok(())
	}

	/// Returns the queue engine
	pub fn engine(&self) -> &QueueEngine<JobId, DenseKeyMap> {
		&self.engine
	}

	/// Returns the completed epochs
	pub fn epoch(&self) -> u64 {
		self.epoch
	}

	/// Returns the simulated time, in seconds
	pub fn system_time_s(&self) -> f64 {
		self.system_time_s
	}
}

//! Job descriptors for the multi-node simulation.
//!
//! Each node runs one job, described on the command line as
//! `bw:rss:wf[,bw:rss:wf…]`: write bandwidth in bytes/s, resident set size
//! in bytes, and the fraction of written bits that actually flip.

// Imports
use {
	crate::queues,
	anyhow::Context,
	std::slice,
};

/// Job index.
///
/// Jobs are dense: job `i` starts out mapped to node `i`.
pub type JobId = u16;

/// A job
#[derive(Clone, Debug)]
pub struct Job {
	/// Job index
	pub idx: JobId,

	/// Write bandwidth (bytes/s)
	pub write_bw_bytes_s: f64,

	/// Resident set size (bytes)
	pub rss_bytes: u64,

	/// Fraction of written bits that flip, in `[0.0, 1.0]`
	pub write_factor: f64,

	/// Bit-flips this job causes per scheduler quantum.
	///
	/// Zero until [`JobTable::set_quanta`] is called.
	pub bit_writes_per_quanta: u64,
}

/// The job table
#[derive(Clone, Debug)]
pub struct JobTable {
	/// All jobs, by index
	jobs: Vec<Job>,
}

impl JobTable {
	/// Parses a job table from a `bw:rss:wf[,bw:rss:wf…]` descriptor
	pub fn parse(jobs_str: &str) -> Result<Self, anyhow::Error> {
		let mut jobs = vec![];
		for (idx, job_str) in jobs_str.split(',').enumerate() {
			anyhow::ensure!(idx <= JobId::MAX as usize, "Job count exceeds the maximum of {}", JobId::MAX);

			let mut fields = job_str.split(':');
			let write_bw_bytes_s = fields
				.next()
				.with_context(|| format!("Job {idx} is missing its write bandwidth"))?
				.parse::<f64>()
				.with_context(|| format!("Unable to parse job {idx}'s write bandwidth"))?;
			let rss_bytes = fields
				.next()
				.with_context(|| format!("Job {idx} is missing its rss"))?
				.parse::<u64>()
				.with_context(|| format!("Unable to parse job {idx}'s rss"))?;
			let write_factor = fields
				.next()
				.with_context(|| format!("Job {idx} is missing its write factor"))?
				.parse::<f64>()
				.with_context(|| format!("Unable to parse job {idx}'s write factor"))?;
			anyhow::ensure!(fields.next().is_none(), "Job {idx} has extra fields");

			anyhow::ensure!(
				(0.0..=1.0).contains(&write_factor),
				"Job {idx}'s write factor must be within [0.0, 1.0]"
			);

			jobs.push(Job {
				idx: idx as JobId,
				write_bw_bytes_s,
				rss_bytes,
				write_factor,
				bit_writes_per_quanta: 0,
			});
		}

		anyhow::ensure!(!jobs.is_empty(), "Job table is empty");

		Ok(Self { jobs })
	}

	/// Computes every job's per-quantum write budget for a scheduler
	/// quantum of `scheduler_quanta_s`
	pub fn set_quanta(&mut self, scheduler_quanta_s: f64) {
		for job in &mut self.jobs {
			job.bit_writes_per_quanta =
				(scheduler_quanta_s * job.write_bw_bytes_s * 8.0 * job.write_factor) as u64;
			tracing::debug!(
				job = job.idx,
				bit_writes_per_quanta = job.bit_writes_per_quanta,
				"Computed job write budget"
			);
		}
	}

	/// Returns the number of jobs
	pub fn len(&self) -> usize {
		self.jobs.len()
	}

	/// Returns whether the table is empty
	pub fn is_empty(&self) -> bool {
		self.jobs.is_empty()
	}

	/// Returns the job at `idx`
	pub fn get(&self, idx: JobId) -> &Job {
		&self.jobs[idx as usize]
	}

	/// Returns an iterator over all jobs
	pub fn iter(&self) -> slice::Iter<'_, Job> {
		self.jobs.iter()
	}

	/// Returns the job with the largest per-quantum write budget
	pub fn most_write_intensive(&self) -> &Job {
		self.jobs
			.iter()
			.max_by_key(|job| job.bit_writes_per_quanta)
			.expect("Job table is empty")
	}
}

impl queues::WearProfile<JobId> for JobTable {
	fn swap_bfs(&self, id: JobId) -> u64 {
		// Migrating a job rewrites its resident set onto the destination
		// node; the newly-mapped job's write factor approximates the flips.
		let job = self.get(id);
		(job.rss_bytes as f64 * 8.0 * job.write_factor) as u64
	}

	fn swap_bytes(&self, id: JobId) -> u64 {
		self.get(id).rss_bytes
	}
}

/// Closed-form lifetime of a system that never rebalances
#[derive(Clone, Copy, Debug)]
pub struct NoRebalanceEstimate {
	/// The most write-intensive job, which wears its node out first
	pub job_idx: JobId,

	/// Scheduler quanta until that node's write budget is exhausted
	pub epochs: u64,

	/// System time at exhaustion (seconds)
	pub system_time_s: f64,

	/// Lifetime bit-flips of the worn node
	pub lifetime_bfs: u64,
}

/// Estimates the lifetime of a system without rebalancing.
///
/// Without rotation, the most write-intensive job stays put and its node
/// wears out first; no queue mechanics are needed.
pub fn no_rebalance_estimate(
	jobs: &JobTable,
	bits_per_node: u64,
	cell_write_endurance: u64,
	scheduler_quanta_s: f64,
) -> Result<NoRebalanceEstimate, anyhow::Error> {
	let job = jobs.most_write_intensive();
	anyhow::ensure!(
		job.bit_writes_per_quanta > 0,
		"Most write-intensive job writes nothing per quantum; lifetime = infinity"
	);

	let budget = bits_per_node
		.checked_mul(cell_write_endurance)
		.context("Node wear budget overflows a 64-bit counter")?;
	let epochs = budget / job.bit_writes_per_quanta;

	Ok(NoRebalanceEstimate {
		job_idx: job.idx,
		epochs,
		system_time_s: scheduler_quanta_s * epochs as f64,
		lifetime_bfs: epochs * job.bit_writes_per_quanta,
	})
}

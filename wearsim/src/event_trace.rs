//! Promotion event traces.
//!
//! The queue engine emits one fixed-width binary timestamp per counted
//! promotion: `u64` cycles for the single-node simulation, `f64` seconds
//! for the multi-node one. The files have no framing or header. An offline
//! pass reads them back, sorted, to find the maximum number of rotation
//! transfers in flight at once.

// Imports
use {
	anyhow::Context,
	byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt},
	std::{cmp, collections::VecDeque, fs, io, path::Path, str},
};

/// A timestamp scalar in an event trace
pub trait Timestamp: Copy {
	/// Size of this scalar on disk
	const BYTE_SIZE: usize;

	/// Reads a timestamp from a reader
	fn read_from<R: io::Read>(reader: &mut R) -> io::Result<Self>;

	/// Writes this timestamp to a writer
	fn write_to<W: io::Write>(self, writer: &mut W) -> io::Result<()>;

	/// Returns this timestamp advanced by `duration`
	fn advanced_by(self, duration: Self) -> Self;

	/// Totally orders two timestamps
	fn total_order(self, other: Self) -> cmp::Ordering;
}

impl Timestamp for u64 {
	const BYTE_SIZE: usize = 8;

	fn read_from<R: io::Read>(reader: &mut R) -> io::Result<Self> {
		reader.read_u64::<LittleEndian>()
	}

	fn write_to<W: io::Write>(self, writer: &mut W) -> io::Result<()> {
		writer.write_u64::<LittleEndian>(self)
	}

	fn advanced_by(self, duration: Self) -> Self {
		self.saturating_add(duration)
	}

	fn total_order(self, other: Self) -> cmp::Ordering {
		self.cmp(&other)
	}
}

impl Timestamp for f64 {
	const BYTE_SIZE: usize = 8;

	fn read_from<R: io::Read>(reader: &mut R) -> io::Result<Self> {
		reader.read_f64::<LittleEndian>()
	}

	fn write_to<W: io::Write>(self, writer: &mut W) -> io::Result<()> {
		writer.write_f64::<LittleEndian>(self)
	}

	fn advanced_by(self, duration: Self) -> Self {
		self + duration
	}

	fn total_order(self, other: Self) -> cmp::Ordering {
		self.total_cmp(&other)
	}
}

/// Timestamp scalar kind, for choosing at runtime
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimestampKind {
	/// `u64` (cycles)
	Uint64,

	/// `f64` (seconds)
	Float64,
}

impl str::FromStr for TimestampKind {
	type Err = anyhow::Error;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let s = s.to_lowercase();

		if s.contains("int") {
			return Ok(Self::Uint64);
		}
		if s.contains("float") {
			return Ok(Self::Float64);
		}

		anyhow::bail!("Unknown timestamp kind {s:?} (expected `uint64` or `float64`)")
	}
}

/// Event trace writer.
///
/// Writes up to `budget` timestamps, then ignores further emissions. With a
/// zero budget no file is created at all.
#[derive(Debug)]
pub struct EventTraceWriter {
	/// Output stream
	out: Option<io::BufWriter<fs::File>>,

	/// Timestamps to write before going quiet
	budget: u64,

	/// Timestamps written
	n_written: u64,
}

impl EventTraceWriter {
	/// Creates a writer emitting at most `budget` timestamps to `path`
	pub fn create(path: &Path, budget: u64) -> Result<Self, anyhow::Error> {
		let out = match budget {
			0 => None,
			_ => {
				let file =
					fs::File::create(path).with_context(|| format!("Unable to create event trace {}", path.display()))?;
				Some(io::BufWriter::new(file))
			},
		};

		Ok(Self {
			out,
			budget,
			n_written: 0,
		})
	}

	/// Creates a writer that emits nothing
	pub fn disabled() -> Self {
		Self {
			out: None,
			budget: 0,
			n_written: 0,
		}
	}

	/// Emits a timestamp, if within budget
	pub fn emit<Ts: Timestamp>(&mut self, timestamp: Ts) -> Result<(), anyhow::Error> {
		if self.n_written >= self.budget {
			return Ok(());
		}

		if let Some(out) = &mut self.out {
			timestamp.write_to(out).context("Unable to write timestamp")?;
			self.n_written += 1;
		}

		Ok(())
	}

	/// Returns the number of timestamps written
	pub fn n_written(&self) -> u64 {
		self.n_written
	}

	/// Flushes the output
	pub fn finish(&mut self) -> Result<(), anyhow::Error> {
		if let Some(out) = &mut self.out {
			io::Write::flush(out).context("Unable to flush event trace")?;
		}

		Ok(())
	}
}

/// Event trace reader.
///
/// Loads a whole timestamp file and sorts it ascending: generated traces may
/// hold timestamps in not-strictly-ascending order.
#[derive(Clone, Debug)]
pub struct EventTraceReader<Ts> {
	/// All timestamps, ascending
	events: Vec<Ts>,
}

impl<Ts: Timestamp> EventTraceReader<Ts> {
	/// Loads an event trace from a file
	pub fn load(path: &Path) -> Result<Self, anyhow::Error> {
		let file = fs::File::open(path).with_context(|| format!("Unable to open event trace {}", path.display()))?;

		let file_size = file.metadata().context("Unable to get event trace size")?.len();
		anyhow::ensure!(
			file_size % Ts::BYTE_SIZE as u64 == 0,
			"Event trace {} size {file_size} isn't a multiple of the timestamp size",
			path.display()
		);

		let mut reader = io::BufReader::new(file);
		let mut events = (0..file_size / Ts::BYTE_SIZE as u64)
			.map(|_| Ts::read_from(&mut reader))
			.collect::<Result<Vec<_>, _>>()
			.context("Unable to read timestamp")?;
		events.sort_by(|lhs, rhs| lhs.total_order(*rhs));

		Ok(Self { events })
	}

	/// Returns all timestamps, ascending
	pub fn events(&self) -> &[Ts] {
		&self.events
	}
}

/// Returns the maximum queue depth over `events`, for a service taking
/// `duration` per event.
///
/// Walks the (ascending) timestamps, keeping a FIFO of in-flight start
/// times and expiring those whose service has completed. The reported depth
/// doesn't count the just-arrived event itself.
pub fn max_queue_depth<Ts: Timestamp>(events: &[Ts], duration: Ts) -> u64 {
	let mut in_flight = VecDeque::new();
	let mut max_depth = 0;

	for &timestamp in events {
		in_flight.push_back(timestamp);

		while let Some(&start_time) = in_flight.front() {
			match start_time.advanced_by(duration).total_order(timestamp) {
				cmp::Ordering::Greater => break,
				_ => in_flight.pop_front(),
			};
		}

		max_depth = u64::max(max_depth, in_flight.len() as u64 - 1);
	}

	max_depth
}

#[cfg(test)]
mod tests {
	// Imports
	use {
		super::*,
		crate::queues::{PromotionTrigger, QueueConfig, QueueEngine, WearProfile},
		tempfile::TempDir,
	};

	#[test]
	fn depth_counts_overlapping_events() {
		// Events at 0, 1, 2 are all in flight at t=2
		assert_eq!(max_queue_depth(&[0_u64, 1, 2, 10], 3), 2);
	}

	#[test]
	fn depth_of_spread_out_events() {
		assert_eq!(max_queue_depth(&[0_u64, 10, 20], 3), 0);
		assert_eq!(max_queue_depth::<u64>(&[], 3), 0);
	}

	#[test]
	fn depth_with_float_timestamps() {
		assert_eq!(max_queue_depth(&[0.0, 0.5, 1.0, 1.4], 1.0), 2);
	}

	#[test]
	fn round_trip_sorts_ascending() {
		let dir = TempDir::new().expect("Unable to create temp dir");
		let path = dir.path().join("events.bin");

		let mut writer = EventTraceWriter::create(&path, 100).expect("Unable to create writer");
		for timestamp in [5.0, 1.0, 3.0] {
			writer.emit(timestamp).expect("Unable to emit");
		}
		writer.finish().expect("Unable to finish");

		let reader = EventTraceReader::<f64>::load(&path).expect("Unable to load");
		assert_eq!(reader.events(), &[1.0, 3.0, 5.0]);
	}

	#[test]
	fn budget_caps_emissions() {
		let dir = TempDir::new().expect("Unable to create temp dir");
		let path = dir.path().join("events.bin");

		let mut writer = EventTraceWriter::create(&path, 2).expect("Unable to create writer");
		for timestamp in 0..5_u64 {
			writer.emit(timestamp).expect("Unable to emit");
		}
		writer.finish().expect("Unable to finish");
		assert_eq!(writer.n_written(), 2);

		let reader = EventTraceReader::<u64>::load(&path).expect("Unable to load");
		assert_eq!(reader.events(), &[0, 1]);
	}

	#[test]
	fn zero_budget_creates_no_file() {
		let dir = TempDir::new().expect("Unable to create temp dir");
		let path = dir.path().join("events.bin");

		let mut writer = EventTraceWriter::create(&path, 0).expect("Unable to create writer");
		writer.emit(1_u64).expect("Unable to emit");
		writer.finish().expect("Unable to finish");

		assert!(!path.exists());
	}

	#[test]
	fn rejects_truncated_trace() {
		let dir = TempDir::new().expect("Unable to create temp dir");
		let path = dir.path().join("events.bin");
		std::fs::write(&path, [0u8; 7]).expect("Unable to write");

		assert!(EventTraceReader::<u64>::load(&path).is_err());
	}

	/// Free swaps, for driving the engine
	struct FreeProfile;

	impl WearProfile<u64> for FreeProfile {
		fn swap_bfs(&self, _id: u64) -> u64 {
			0
		}

		fn swap_bytes(&self, _id: u64) -> u64 {
			0
		}
	}

	#[test]
	fn engine_emits_one_timestamp_per_counted_promotion() {
		let dir = TempDir::new().expect("Unable to create temp dir");
		let path = dir.path().join("events.bin");

		// 3 single-bit-interval buckets over identities a/b/c; every second
		// write to `a` promotes whichever slot currently holds it
		let writer = EventTraceWriter::create(&path, 2).expect("Unable to create writer");
		let mut engine = QueueEngine::<u64>::new(
			&QueueConfig {
				n_buckets: 3,
				cell_write_endurance: 3,
				bits_per_slot: 1,
				trigger: PromotionTrigger::AtInterval,
			},
			writer,
		)
		.expect("Unable to create engine");
		for id in [0xa, 0xb, 0xc] {
			engine.push_slot(id);
		}

		let mut n_swaps = 0;
		for step in 0..8_u64 {
			let outcome = engine.record_write(0xa, 1, step, &FreeProfile).expect("Unable to record");
			if outcome == (crate::queues::WriteOutcome::Promoted { swapped: true }) {
				n_swaps += 1;
			}
		}
		engine.finish().expect("Unable to finish");
		assert_eq!(n_swaps, engine.total_n_promotions());
		assert!(engine.total_n_promotions() > 2);

		// Only the first two promotions fit the budget
		let reader = EventTraceReader::<u64>::load(&path).expect("Unable to load");
		assert_eq!(reader.events().len(), 2);
	}
}

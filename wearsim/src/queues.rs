//! Wear-leveling queue engine.
//!
//! Slots are kept in `N` FIFO queues, coldest first. Every write charges its
//! slot's interval bit-flip counter; a slot that has absorbed one bucket
//! interval of wear is promoted one queue up and its identity is swapped
//! with the head of the lowest active queue, rotating hot data onto the
//! coldest slot. A promotion out of the last queue is wear-out, the terminal
//! condition of the simulation.
//!
//! The engine is generic over the identity a slot carries: page addresses
//! for the single-node simulation, job ids for the multi-node one.

// Modules
pub mod key_map;
mod slots;

// Exports
pub use self::{
	key_map::{DenseKeyMap, HashKeyMap, KeyMap},
	slots::SlotIdx,
};

// Imports
use {
	crate::event_trace::{EventTraceWriter, Timestamp},
	anyhow::Context,
	self::slots::{FifoList, SlotPool},
};

/// Queue engine configuration
#[derive(Clone, Copy, Debug)]
pub struct QueueConfig {
	/// Number of queues
	pub n_buckets: u64,

	/// Bit-flips a cell tolerates before wear-out
	pub cell_write_endurance: u64,

	/// Bits of memory behind one slot (a page, or a node's memory)
	pub bits_per_slot: u64,

	/// When a slot's interval wear triggers promotion
	pub trigger: PromotionTrigger,
}

/// Promotion trigger comparison.
///
/// Whether a slot promotes once its interval wear reaches the bucket
/// interval, or only once it exceeds it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PromotionTrigger {
	/// Promote at `interval_bfs ≥ bucket_interval`
	#[default]
	AtInterval,

	/// Promote at `interval_bfs > bucket_interval`
	AboveInterval,
}

impl PromotionTrigger {
	/// Returns whether a slot with `interval_bfs` of wear should promote
	fn fires(self, interval_bfs: u64, bucket_interval: u64) -> bool {
		match self {
			Self::AtInterval => interval_bfs >= bucket_interval,
			Self::AboveInterval => interval_bfs > bucket_interval,
		}
	}
}

/// Per-identity wear parameters consulted on rotation swaps
pub trait WearProfile<I> {
	/// Bit-flip charge of migrating `id`'s contents onto a slot
	fn swap_bfs(&self, id: I) -> u64;

	/// Bytes moved when `id` is migrated
	fn swap_bytes(&self, id: I) -> u64;
}

/// Outcome of recording one write
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteOutcome {
	/// The write charged the slot's interval counter
	Charged,

	/// The slot was promoted one queue up
	Promoted {
		/// Whether a rotation swap occurred in the lowest active queue
		swapped: bool,
	},

	/// The slot was promoted out of the last queue: the memory is worn out
	/// and the simulation is over
	WoreOut,
}

/// A read-only view of a slot
#[derive(Clone, Copy, Debug)]
pub struct SlotView<I> {
	/// Identity currently mapped to the slot
	pub identity: I,

	/// Queue the slot belongs to
	pub queue_idx: usize,

	/// Bit-flips accumulated since the last promotion
	pub interval_bfs: u64,

	/// Total bit-flips ever
	pub lifetime_bfs: u64,
}

/// Wear-leveling queue engine
#[derive(Debug)]
pub struct QueueEngine<I, M = HashKeyMap<I>> {
	/// Total wear budget of one slot
	bucket_cap: u64,

	/// Wear that triggers a promotion
	bucket_interval: u64,

	/// Promotion trigger comparison
	trigger: PromotionTrigger,

	/// All slots
	pool: SlotPool<I>,

	/// The queues, coldest first
	queues: Vec<FifoList>,

	/// Identity → slot map
	key_map: M,

	/// Lowest queue that still holds slots.
	///
	/// Only ever advances.
	lowest_active_queue: usize,

	/// Slot with the largest lifetime wear
	most_written: Option<SlotIdx>,

	/// Rotation swaps performed
	total_n_promotions: u64,

	/// Bytes moved by rotation swaps, both directions
	total_bytes_transferred: u64,

	/// Transfer delay in bytes, assuming a full-duplex link
	total_bytes_delay: u64,

	/// Whether a slot was promoted out of the last queue
	worn_out: bool,

	/// Promotion timestamp output
	event_trace: EventTraceWriter,
}

impl<I: Copy, M: KeyMap<I> + Default> QueueEngine<I, M> {
	/// Creates an engine with all queues empty.
	///
	/// Fails if the configuration would let a single write skip a bucket.
	pub fn new(config: &QueueConfig, event_trace: EventTraceWriter) -> Result<Self, anyhow::Error> {
		anyhow::ensure!(config.n_buckets > 0, "Bucket count must be non-zero");
		anyhow::ensure!(config.cell_write_endurance > 0, "Cell write endurance must be non-zero");

		let bucket_cap = config
			.bits_per_slot
			.checked_mul(config.cell_write_endurance)
			.context("Slot wear budget overflows a 64-bit counter")?;
		let bucket_interval = bucket_cap / config.n_buckets;
		anyhow::ensure!(
			bucket_interval >= config.bits_per_slot,
			"Bucket interval {bucket_interval} must be at least the bits per slot {} to avoid skipping buckets",
			config.bits_per_slot,
		);

		Ok(Self {
			bucket_cap,
			bucket_interval,
			trigger: config.trigger,
			pool: SlotPool::new(),
			queues: vec![FifoList::default(); config.n_buckets as usize],
			key_map: M::default(),
			lowest_active_queue: 0,
			most_written: None,
			total_n_promotions: 0,
			total_bytes_transferred: 0,
			total_bytes_delay: 0,
			worn_out: false,
			event_trace,
		})
	}

	/// Adds a slot mapped by `identity` to the tail of the coldest queue
	pub fn push_slot(&mut self, identity: I) -> SlotIdx {
		let idx = self.pool.alloc(identity, 0);
		self.queues[0].push_back(&mut self.pool, idx);
		self.key_map.set(identity, idx);

		idx
	}

	/// Adds a filler slot to the head of the coldest queue.
	///
	/// Filler slots aren't registered in the identity map: several may carry
	/// the same placeholder identity, and they only become addressable once
	/// a rotation swap maps a real identity onto them.
	pub fn push_filler_slot(&mut self, identity: I) -> SlotIdx {
		let idx = self.pool.alloc(identity, 0);
		self.queues[0].push_front(&mut self.pool, idx);

		idx
	}

	/// Returns whether `identity` is mapped to a slot
	pub fn contains(&self, identity: I) -> bool {
		self.key_map.get(identity).is_some()
	}

	/// Records a write of `charge` bit-flips against `identity`'s slot.
	///
	/// If the slot had already absorbed a full bucket interval, it is
	/// instead promoted, swapping identities with the head of the lowest
	/// active queue (and charging both sides for the migration writes, via
	/// `profile`). `now` is emitted to the event trace on counted
	/// promotions.
	pub fn record_write<Ts: Timestamp>(
		&mut self,
		identity: I,
		charge: u64,
		now: Ts,
		profile: &impl WearProfile<I>,
	) -> Result<WriteOutcome, anyhow::Error> {
		anyhow::ensure!(!self.worn_out, "Memory is already worn out");

		let idx = self.key_map.get(identity).context("Identity isn't mapped to any slot")?;

		let outcome = match self.trigger.fires(self.pool[idx].interval_bfs, self.bucket_interval) {
			true => self.promote(idx, now, profile)?,
			false => {
				self.pool[idx].interval_bfs += charge;
				WriteOutcome::Charged
			},
		};

		// Whether the write charged or promoted, it counts against the
		// slot's lifetime
		self.pool[idx].lifetime_bfs += charge;

		// And the slot may have overtaken the most-written one
		match self.most_written {
			Some(most_written) if self.pool[most_written].lifetime_bfs >= self.pool[idx].lifetime_bfs => (),
			_ => self.most_written = Some(idx),
		}

		Ok(outcome)
	}

	/// Promotes the slot at `idx` one queue up, rotation-swapping with the
	/// lowest active queue
	fn promote<Ts: Timestamp>(
		&mut self,
		idx: SlotIdx,
		now: Ts,
		profile: &impl WearProfile<I>,
	) -> Result<WriteOutcome, anyhow::Error> {
		let old_queue_idx = self.pool[idx].queue_idx;
		self.queues[old_queue_idx].unlink(&mut self.pool, idx);

		// The removal may have drained the lowest active queue
		if self.queues[self.lowest_active_queue].is_empty() {
			self.lowest_active_queue += 1;
		}

		let new_queue_idx = old_queue_idx + 1;
		if new_queue_idx == self.queues.len() {
			// Promotion past the last queue: wear-out. The worn slot stays
			// detached from the queues.
			self.worn_out = true;
			tracing::trace!(?idx, "Slot promoted past the last queue, memory is worn out");
			return Ok(WriteOutcome::WoreOut);
		}

		self.queues[new_queue_idx].push_back(&mut self.pool, idx);
		{
			let slot = &mut self.pool[idx];
			slot.queue_idx = new_queue_idx;
			// Carry the residual wear into the next interval
			slot.interval_bfs -= self.bucket_interval;
		}

		// Swaps only happen towards a strictly lower queue
		if self.lowest_active_queue >= new_queue_idx {
			return Ok(WriteOutcome::Promoted { swapped: false });
		}

		// Rotate the head of the lowest active queue to its tail
		let cold = self.queues[self.lowest_active_queue]
			.pop_front(&mut self.pool)
			.expect("Lowest active queue was empty during a rotation swap");
		self.queues[self.lowest_active_queue].push_back(&mut self.pool, cold);

		// Exchange the identities of the promoted and cold slots
		let hot_id = self.pool[idx].identity;
		let cold_id = self.pool[cold].identity;
		self.pool[idx].identity = cold_id;
		self.pool[cold].identity = hot_id;
		self.key_map.set(cold_id, idx);
		self.key_map.set(hot_id, cold);

		// Each side absorbs the migration write of its newly-mapped identity
		let idx_swap_bfs = profile.swap_bfs(cold_id);
		let cold_swap_bfs = profile.swap_bfs(hot_id);
		{
			let slot = &mut self.pool[idx];
			slot.interval_bfs += idx_swap_bfs;
			slot.lifetime_bfs += idx_swap_bfs;
		}
		{
			let slot = &mut self.pool[cold];
			slot.interval_bfs += cold_swap_bfs;
			slot.lifetime_bfs += cold_swap_bfs;
		}

		// Both transfers happen concurrently over a full-duplex link, so the
		// delay only counts the larger side
		let idx_bytes = profile.swap_bytes(cold_id);
		let cold_bytes = profile.swap_bytes(hot_id);
		self.total_bytes_transferred += idx_bytes + cold_bytes;
		self.total_bytes_delay += u64::max(idx_bytes, cold_bytes);

		self.total_n_promotions += 1;
		tracing::trace!(
			?idx,
			new_queue_idx,
			lowest_active_queue = self.lowest_active_queue,
			total_n_promotions = self.total_n_promotions,
			"Promoted and swapped",
		);
		self.event_trace
			.emit(now)
			.context("Unable to write promotion timestamp")?;

		Ok(WriteOutcome::Promoted { swapped: true })
	}

	/// Flushes the event trace
	pub fn finish(&mut self) -> Result<(), anyhow::Error> {
		self.event_trace.finish()
	}

	/// Returns the number of slots
	pub fn n_slots(&self) -> usize {
		self.pool.len()
	}

	/// Returns the number of queues
	pub fn n_queues(&self) -> usize {
		self.queues.len()
	}

	/// Returns the number of slots in queue `queue_idx`
	pub fn queue_len(&self, queue_idx: usize) -> usize {
		self.queues[queue_idx].len()
	}

	/// Returns the lowest queue that still holds slots
	pub fn lowest_active_queue(&self) -> usize {
		self.lowest_active_queue
	}

	/// Returns the total wear budget of one slot
	pub fn bucket_cap(&self) -> u64 {
		self.bucket_cap
	}

	/// Returns the wear that triggers a promotion
	pub fn bucket_interval(&self) -> u64 {
		self.bucket_interval
	}

	/// Returns the number of rotation swaps performed
	pub fn total_n_promotions(&self) -> u64 {
		self.total_n_promotions
	}

	/// Returns the bytes moved by rotation swaps
	pub fn total_bytes_transferred(&self) -> u64 {
		self.total_bytes_transferred
	}

	/// Returns the transfer delay in bytes
	pub fn total_bytes_delay(&self) -> u64 {
		self.total_bytes_delay
	}

	/// Returns whether the memory is worn out
	pub fn is_worn_out(&self) -> bool {
		self.worn_out
	}

	/// Returns a view of the most-written slot
	pub fn most_written(&self) -> Option<SlotView<I>> {
		self.most_written.map(|idx| self.view(idx))
	}

	/// Returns a view of the slot `identity` is mapped to
	pub fn slot_of(&self, identity: I) -> Option<SlotView<I>> {
		self.key_map.get(identity).map(|idx| self.view(idx))
	}

	/// Returns an iterator over views of all slots
	pub fn slots(&self) -> impl Iterator<Item = SlotView<I>> + '_ {
		self.pool.iter().map(|slot| SlotView {
			identity: slot.identity,
			queue_idx: slot.queue_idx,
			interval_bfs: slot.interval_bfs,
			lifetime_bfs: slot.lifetime_bfs,
		})
	}

	/// Returns an iterator over views of the slots in queue `queue_idx`,
	/// head to tail
	pub fn queue_slots(&self, queue_idx: usize) -> impl Iterator<Item = SlotView<I>> + '_ {
		self.queues[queue_idx].iter(&self.pool).map(|idx| self.view(idx))
	}

	/// Returns the sum of lifetime bit-flips over all slots.
	///
	/// Includes the worn-out slot, if any, so the sum always equals the
	/// total charges applied.
	pub fn lifetime_bfs_sum(&self) -> u64 {
		self.pool.iter().map(|slot| slot.lifetime_bfs).sum()
	}

	/// Builds a view of the slot at `idx`
	fn view(&self, idx: SlotIdx) -> SlotView<I> {
		let slot = &self.pool[idx];
		SlotView {
			identity: slot.identity,
			queue_idx: slot.queue_idx,
			interval_bfs: slot.interval_bfs,
			lifetime_bfs: slot.lifetime_bfs,
		}
	}
}

#[cfg(test)]
mod tests {
	// Imports
	use {super::*, crate::event_trace::EventTraceWriter, std::collections::HashMap};

	/// Profile charging the same swap cost for every identity
	struct FixedProfile {
		bfs:   u64,
		bytes: u64,
	}

	impl WearProfile<u64> for FixedProfile {
		fn swap_bfs(&self, _id: u64) -> u64 {
			self.bfs
		}

		fn swap_bytes(&self, _id: u64) -> u64 {
			self.bytes
		}
	}

	/// Profile with per-identity swap costs
	struct TableProfile(HashMap<u64, u64>);

	impl WearProfile<u64> for TableProfile {
		fn swap_bfs(&self, id: u64) -> u64 {
			self.0[&id]
		}

		fn swap_bytes(&self, _id: u64) -> u64 {
			64
		}
	}

	fn engine(n_buckets: u64, cell_write_endurance: u64, bits_per_slot: u64) -> QueueEngine<u64> {
		QueueEngine::new(
			&QueueConfig {
				n_buckets,
				cell_write_endurance,
				bits_per_slot,
				trigger: PromotionTrigger::AtInterval,
			},
			EventTraceWriter::disabled(),
		)
		.expect("Unable to create engine")
	}

	#[test]
	fn rejects_bucket_skipping_config() {
		// interval = 4 * 3 / 16 = 0 < bits_per_slot
		let res = QueueEngine::<u64>::new(
			&QueueConfig {
				n_buckets: 16,
				cell_write_endurance: 3,
				bits_per_slot: 4,
				trigger: PromotionTrigger::AtInterval,
			},
			EventTraceWriter::disabled(),
		);
		assert!(res.is_err());
	}

	#[test]
	fn wear_out_terminates() {
		// One bucket of one bit-flip: the second write promotes past it
		let mut engine = engine(1, 1, 1);
		engine.push_slot(0xa);
		engine.push_slot(0xb);
		let profile = FixedProfile { bfs: 0, bytes: 0 };

		assert_eq!(engine.record_write(0xa, 1, 0_u64, &profile).unwrap(), WriteOutcome::Charged);
		assert_eq!(engine.record_write(0xa, 1, 1_u64, &profile).unwrap(), WriteOutcome::WoreOut);

		assert!(engine.is_worn_out());
		assert_eq!(engine.total_n_promotions(), 0);

		// The worn slot is detached, but still counted in lifetime sums
		assert_eq!(engine.queue_len(0), 1);
		assert_eq!(engine.lifetime_bfs_sum(), 2);
		assert_eq!(engine.most_written().unwrap().lifetime_bfs, 2);

		// No further events are accepted
		assert!(engine.record_write(0xb, 1, 2_u64, &profile).is_err());
	}

	#[test]
	fn promote_and_swap() {
		// Two buckets; interval = 8 * 2 / 2 = 8
		let mut engine = engine(2, 2, 8);
		engine.push_slot(0xa);
		engine.push_slot(0xb);
		let profile = TableProfile(HashMap::from([(0xa, 8), (0xb, 3)]));

		// First write only charges
		assert_eq!(engine.record_write(0xa, 8, 0_u64, &profile).unwrap(), WriteOutcome::Charged);

		// Second write promotes `a`'s slot to queue 1 and swaps identities
		// with the (cold) head of queue 0
		assert_eq!(
			engine.record_write(0xa, 8, 1_u64, &profile).unwrap(),
			WriteOutcome::Promoted { swapped: true },
		);
		assert_eq!(engine.total_n_promotions(), 1);
		assert_eq!(engine.lowest_active_queue(), 0);

		// `a` now lives on the formerly-cold slot in queue 0; `b` on the
		// promoted slot in queue 1
		let a_slot = engine.slot_of(0xa).expect("`a` isn't mapped");
		let b_slot = engine.slot_of(0xb).expect("`b` isn't mapped");
		assert_eq!(a_slot.queue_idx, 0);
		assert_eq!(b_slot.queue_idx, 1);

		// The promoted slot was charged `b`'s swap cost, the cold one `a`'s
		assert_eq!(b_slot.lifetime_bfs, 8 + 8 + 3);
		assert_eq!(a_slot.lifetime_bfs, 8);

		// Conservation: two write charges + both swap charges
		assert_eq!(engine.lifetime_bfs_sum(), 8 + 8 + 3 + 8);

		// Bytes moved in both directions, delay counts one
		assert_eq!(engine.total_bytes_transferred(), 128);
		assert_eq!(engine.total_bytes_delay(), 64);

		assert_eq!(engine.most_written().unwrap().lifetime_bfs, b_slot.lifetime_bfs);
	}

	#[test]
	fn promotion_into_lowest_queue_skips_swap() {
		// Single slot: promoting it empties queue 0, so the promotion lands
		// in the new lowest active queue and nothing can swap
		let mut engine = engine(3, 3, 4);
		engine.push_slot(0xa);
		let profile = FixedProfile { bfs: 0, bytes: 0 };

		assert_eq!(engine.record_write(0xa, 4, 0_u64, &profile).unwrap(), WriteOutcome::Charged);
		assert_eq!(
			engine.record_write(0xa, 4, 1_u64, &profile).unwrap(),
			WriteOutcome::Promoted { swapped: false },
		);

		assert_eq!(engine.lowest_active_queue(), 1);
		assert_eq!(engine.total_n_promotions(), 0);
		assert_eq!(engine.slot_of(0xa).unwrap().queue_idx, 1);
	}

	/// Checks that every slot is in the queue it claims, and that the
	/// identity map agrees with the slots
	fn check_queues_consistent(engine: &QueueEngine<u64>) {
		let mut seen = 0;
		for queue_idx in 0..engine.n_queues() {
			for view in engine.queue_slots(queue_idx) {
				assert_eq!(view.queue_idx, queue_idx);

				let mapped = engine.slot_of(view.identity).expect("Identity isn't mapped");
				assert_eq!(mapped.queue_idx, queue_idx);
				assert_eq!(mapped.lifetime_bfs, view.lifetime_bfs);
				seen += 1;
			}

			// Queues below the lowest active one must be empty
			if queue_idx < engine.lowest_active_queue() {
				assert_eq!(engine.queue_len(queue_idx), 0);
			}
		}
		assert_eq!(seen, engine.n_slots());
	}

	#[test]
	fn queues_stay_consistent_and_wear_is_conserved() {
		// interval = 8 * 4 / 4 = 8
		let mut engine = engine(4, 4, 8);
		for id in 0..3 {
			engine.push_slot(id);
		}
		let profile = FixedProfile { bfs: 5, bytes: 16 };

		let mut charged = 0;
		let mut prev_lowest = engine.lowest_active_queue();
		for step in 0..40_u64 {
			// Skew the writes so slot identities promote at different rates
			let id = match step % 4 {
				0 | 1 | 2 => 0,
				_ => step % 3,
			};

			let outcome = match engine.record_write(id, 6, step, &profile) {
				Ok(outcome) => outcome,
				// Wear-out ends the workload early
				Err(_) => break,
			};
			charged += 6;
			if outcome == (WriteOutcome::Promoted { swapped: true }) {
				charged += 2 * profile.bfs;
			}
			if outcome == WriteOutcome::WoreOut {
				break;
			}

			// The lowest active queue never retreats
			assert!(engine.lowest_active_queue() >= prev_lowest);
			prev_lowest = engine.lowest_active_queue();

			if !engine.is_worn_out() {
				check_queues_consistent(&engine);
			}
		}

		assert_eq!(engine.lifetime_bfs_sum(), charged);
	}

	#[test]
	fn filler_slots_absorb_swaps() {
		let mut engine = engine(2, 2, 8);
		engine.push_slot(0xa);
		engine.push_filler_slot(u64::MAX);
		let profile = FixedProfile { bfs: 2, bytes: 8 };

		// Fillers go to the head of the cold queue, but aren't addressable
		assert_eq!(engine.n_slots(), 2);
		assert!(!engine.contains(u64::MAX));

		// Promoting `a` swaps it onto the filler at the head of queue 0
		engine.record_write(0xa, 8, 0_u64, &profile).unwrap();
		let outcome = engine.record_write(0xa, 8, 1_u64, &profile).unwrap();
		assert_eq!(outcome, WriteOutcome::Promoted { swapped: true });

		let a_slot = engine.slot_of(0xa).expect("`a` isn't mapped");
		assert_eq!(a_slot.queue_idx, 0);
		// The filler slot was charged for receiving `a`'s contents
		assert_eq!(a_slot.lifetime_bfs, 2);
	}

	#[test]
	fn above_interval_trigger() {
		let mut engine = QueueEngine::<u64>::new(
			&QueueConfig {
				n_buckets: 2,
				cell_write_endurance: 2,
				bits_per_slot: 8,
				trigger: PromotionTrigger::AboveInterval,
			},
			EventTraceWriter::disabled(),
		)
		.expect("Unable to create engine");
		engine.push_slot(0xa);
		engine.push_slot(0xb);
		let profile = FixedProfile { bfs: 0, bytes: 0 };

		// interval = 8: reaching it exactly doesn't fire under `>`
		engine.record_write(0xa, 8, 0_u64, &profile).unwrap();
		assert_eq!(engine.record_write(0xa, 1, 1_u64, &profile).unwrap(), WriteOutcome::Charged);
		assert_eq!(
			engine.record_write(0xa, 1, 2_u64, &profile).unwrap(),
			WriteOutcome::Promoted { swapped: true },
		);
	}
}

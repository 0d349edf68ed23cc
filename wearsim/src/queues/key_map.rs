//! Identity → slot lookup.
//!
//! The engine resolves trace keys (page addresses, job ids) to slots through
//! a [`KeyMap`]. Sparse key spaces use [`HashKeyMap`]; dense, small key
//! spaces (job indices) use [`DenseKeyMap`], a plain vector.

// Imports
use {
	super::SlotIdx,
	std::{collections::HashMap, hash::Hash},
};

/// Identity → slot map
pub trait KeyMap<I> {
	/// Returns the slot `key` is mapped to, if any
	fn get(&self, key: I) -> Option<SlotIdx>;

	/// Maps `key` to `slot`, replacing any previous mapping
	fn set(&mut self, key: I, slot: SlotIdx);
}

/// Hash-based key map, for sparse key spaces
#[derive(Clone, Debug)]
pub struct HashKeyMap<I>(HashMap<I, SlotIdx>);

impl<I> Default for HashKeyMap<I> {
	fn default() -> Self {
		Self(HashMap::new())
	}
}

impl<I: Copy + Eq + Hash> KeyMap<I> for HashKeyMap<I> {
	fn get(&self, key: I) -> Option<SlotIdx> {
		self.0.get(&key).copied()
	}

	fn set(&mut self, key: I, slot: SlotIdx) {
		self.0.insert(key, slot);
	}
}

/// Dense key map, for small integer key spaces
#[derive(Clone, Debug, Default)]
pub struct DenseKeyMap(Vec<Option<SlotIdx>>);

impl<I: Copy + Into<usize>> KeyMap<I> for DenseKeyMap {
	fn get(&self, key: I) -> Option<SlotIdx> {
		self.0.get(key.into()).copied().flatten()
	}

	fn set(&mut self, key: I, slot: SlotIdx) {
		let key = key.into();
		if key >= self.0.len() {
			self.0.resize(key + 1, None);
		}

		self.0[key] = Some(slot);
	}
}

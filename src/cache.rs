//! Bounded TTL cache of successful responses keyed by request fingerprint.

mod fingerprint;

pub use fingerprint::*;

// std
use std::sync::atomic::{AtomicU64, Ordering};
// self
use crate::{_prelude::*, config::RuntimeConfig, http::ResponseEnvelope};

const SWEEP_EVERY: u64 = 64;

/// A cached response and the moment it stops being served.
#[derive(Clone, Debug)]
pub struct CacheEntry {
	/// Fingerprint of the request that produced the response.
	pub fingerprint: Fingerprint,
	/// Cached response.
	pub envelope: ResponseEnvelope,
	/// Expiry instant.
	pub expires_at: Instant,
}
impl CacheEntry {
	fn is_expired(&self, now: Instant) -> bool {
		self.expires_at <= now
	}
}

#[derive(Debug)]
struct Slot {
	entry: Mutex<CacheEntry>,
	last_used: AtomicU64,
}

/// Response cache with lazy expiry, periodic sweeps, and LRU eviction.
///
/// Each fingerprint owns a slot with its own lock; the map lock is held only to look up,
/// insert, or remove slots. When both are needed the map lock is taken first.
#[derive(Debug)]
pub struct ResponseCache {
	slots: RwLock<HashMap<Fingerprint, Arc<Slot>>>,
	capacity: usize,
	ttl: Duration,
	tick: AtomicU64,
	writes: AtomicU64,
}
impl ResponseCache {
	/// Creates a cache holding at most `capacity` entries (minimum 1) for `ttl` each by default.
	pub fn new(capacity: usize, ttl: Duration) -> Self {
		Self {
			slots: Default::default(),
			capacity: capacity.max(1),
			ttl,
			tick: AtomicU64::new(0),
			writes: AtomicU64::new(0),
		}
	}

	/// Creates a cache sized from the runtime configuration.
	pub fn from_config(config: &RuntimeConfig) -> Self {
		Self::new(config.cache_capacity, config.cache_ttl)
	}

	/// Default time-to-live.
	pub fn ttl(&self) -> Duration {
		self.ttl
	}

	/// Returns the live response for `fingerprint`; expired entries are dropped on read.
	pub fn get(&self, fingerprint: &Fingerprint) -> Option<ResponseEnvelope> {
		let slot = self.slots.read().get(fingerprint).cloned()?;
		let entry = slot.entry.lock();

		if entry.is_expired(Instant::now()) {
			drop(entry);
			self.remove_if_expired(fingerprint);

			return None;
		}

		slot.last_used.store(self.next_tick(), Ordering::Relaxed);

		Some(entry.envelope.clone())
	}

	/// Stores `envelope` for `ttl`, replacing any previous entry.
	pub fn put(&self, fingerprint: Fingerprint, envelope: ResponseEnvelope, ttl: Duration) {
		let expires_at = Instant::now() + ttl;
		let tick = self.next_tick();
		let existing = self.slots.read().get(&fingerprint).cloned();

		match existing {
			Some(slot) => {
				let mut entry = slot.entry.lock();

				entry.envelope = envelope;
				entry.expires_at = expires_at;

				slot.last_used.store(tick, Ordering::Relaxed);
			},
			None => {
				let mut slots = self.slots.write();
				let slot = Arc::new(Slot {
					entry: Mutex::new(CacheEntry {
						fingerprint: fingerprint.clone(),
						envelope,
						expires_at,
					}),
					last_used: AtomicU64::new(tick),
				});

				slots.insert(fingerprint, slot);

				if slots.len() > self.capacity {
					evict(&mut slots, self.capacity);
				}
			},
		}

		if self.writes.fetch_add(1, Ordering::Relaxed) % SWEEP_EVERY == SWEEP_EVERY - 1 {
			self.sweep();
		}
	}

	/// Removes the entry for `fingerprint`, returning whether one existed.
	pub fn invalidate(&self, fingerprint: &Fingerprint) -> bool {
		self.slots.write().remove(fingerprint).is_some()
	}

	/// Drops every expired entry and returns how many were removed.
	pub fn sweep(&self) -> usize {
		let now = Instant::now();
		let mut slots = self.slots.write();
		let before = slots.len();

		slots.retain(|_, slot| !slot.entry.lock().is_expired(now));

		before - slots.len()
	}

	/// Removes every entry.
	pub fn clear(&self) {
		self.slots.write().clear();
	}

	/// Number of stored entries, including expired ones not yet swept.
	pub fn len(&self) -> usize {
		self.slots.read().len()
	}

	/// Whether the cache holds no entries.
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	fn remove_if_expired(&self, fingerprint: &Fingerprint) {
		let mut slots = self.slots.write();
		let expired = slots
			.get(fingerprint)
			.is_some_and(|slot| slot.entry.lock().is_expired(Instant::now()));

		if expired {
			slots.remove(fingerprint);
		}
	}

	fn next_tick(&self) -> u64 {
		self.tick.fetch_add(1, Ordering::Relaxed)
	}
}

fn evict(slots: &mut HashMap<Fingerprint, Arc<Slot>>, capacity: usize) {
	let now = Instant::now();

	slots.retain(|_, slot| !slot.entry.lock().is_expired(now));

	while slots.len() > capacity {
		let Some(oldest) = slots
			.iter()
			.min_by_key(|(_, slot)| slot.last_used.load(Ordering::Relaxed))
			.map(|(fingerprint, _)| fingerprint.clone())
		else {
			break;
		};

		slots.remove(&oldest);
	}
}

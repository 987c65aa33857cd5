use tracing::debug;

use crate::identity::BeaconIdentity;
use crate::record::BeaconRecord;

/// Bucket count. Ought to be prime and approximately as large as the
/// expected number of tracked beacons.
pub const BUCKET_COUNT: usize = 251;

/// Beacons quiet for this long are freed by the eviction sweep.
pub const MAX_INACTIVE_SECS: f64 = 10.0;

/// What a visitor decided about the record it was handed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Visit {
    Keep,
    /// The record is dead: unlink it now and skip its remaining visitors.
    Evict,
}

pub type Visitor<'a> = &'a mut dyn FnMut(&mut BeaconRecord) -> Visit;

struct Slot {
    record: BeaconRecord,
    prev: Option<usize>,
    next: Option<usize>,
}

/// Fixed-bucket hash table of beacon records with separate chaining.
/// Chains are index links into an arena of slots, so unlinking a record
/// never leaves anything dangling.
pub struct Registry {
    buckets: Vec<Option<usize>>,
    slots: Vec<Option<Slot>>,
    free: Vec<usize>,
    len: usize,
}

impl Default for Registry {
    fn default() -> Registry {
        Registry::new()
    }
}

impl Registry {
    pub fn new() -> Registry {
        Registry::with_buckets(BUCKET_COUNT)
    }

    /// Smaller bucket counts force collisions; only tests want that.
    pub fn with_buckets(buckets: usize) -> Registry {
        Registry {
            buckets: vec![None; buckets],
            slots: Vec::new(),
            free: Vec::new(),
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn bucket_of(&self, identity: &BeaconIdentity) -> usize {
        identity.byte_sum() % self.buckets.len()
    }

    fn slot(&self, index: usize) -> &Slot {
        self.slots[index].as_ref().expect("chain index points at a live slot")
    }

    fn slot_mut(&mut self, index: usize) -> &mut Slot {
        self.slots[index].as_mut().expect("chain index points at a live slot")
    }

    /// Walk one bucket chain; returns the matching slot index, if any,
    /// and the chain tail for appending.
    fn scan_chain(
        &self,
        bucket: usize,
        identity: &BeaconIdentity,
    ) -> (Option<usize>, Option<usize>) {
        let mut tail = None;
        let mut cursor = self.buckets[bucket];
        while let Some(index) = cursor {
            if self.slot(index).record.identity == *identity {
                return (Some(index), tail);
            }
            tail = Some(index);
            cursor = self.slot(index).next;
        }
        (None, tail)
    }

    /// Return the record for `identity`, creating a zeroed one appended
    /// to its chain if this is the first sighting. Idempotent: equal
    /// identities always resolve to the same logical record.
    pub fn find_or_add(&mut self, identity: BeaconIdentity) -> &mut BeaconRecord {
        let bucket = self.bucket_of(&identity);
        let (found, tail) = self.scan_chain(bucket, &identity);
        let index = match found {
            Some(index) => index,
            None => {
                let index = self.alloc(Slot {
                    record: BeaconRecord::new(identity),
                    prev: tail,
                    next: None,
                });
                match tail {
                    Some(tail) => self.slot_mut(tail).next = Some(index),
                    None => self.buckets[bucket] = Some(index),
                }
                self.len += 1;
                debug!(beacon = %identity, "acquired beacon");
                index
            }
        };
        &mut self.slot_mut(index).record
    }

    pub fn find(&self, identity: &BeaconIdentity) -> Option<&BeaconRecord> {
        let bucket = self.bucket_of(identity);
        let (found, _) = self.scan_chain(bucket, identity);
        found.map(|index| &self.slot(index).record)
    }

    /// Remove the record for `identity`, if present.
    pub fn delete(&mut self, identity: &BeaconIdentity) -> bool {
        let bucket = self.bucket_of(identity);
        match self.scan_chain(bucket, identity) {
            (Some(index), _) => {
                self.unlink(bucket, index);
                true
            }
            (None, _) => false,
        }
    }

    /// One full-table pass. Each live record gets the visitors in order;
    /// a `Visit::Evict` unlinks the record immediately, skips its
    /// remaining visitors, and the walk resumes from the successor that
    /// was captured before any visitor ran.
    pub fn visit(&mut self, visitors: &mut [Visitor<'_>]) {
        for bucket in 0..self.buckets.len() {
            let mut cursor = self.buckets[bucket];
            while let Some(index) = cursor {
                let next = self.slot(index).next;
                for visitor in visitors.iter_mut() {
                    if visitor(&mut self.slot_mut(index).record) == Visit::Evict {
                        self.unlink(bucket, index);
                        break;
                    }
                }
                cursor = next;
            }
        }
    }

    fn alloc(&mut self, slot: Slot) -> usize {
        match self.free.pop() {
            Some(index) => {
                self.slots[index] = Some(slot);
                index
            }
            None => {
                self.slots.push(Some(slot));
                self.slots.len() - 1
            }
        }
    }

    fn unlink(&mut self, bucket: usize, index: usize) {
        let (prev, next) = {
            let slot = self.slot(index);
            (slot.prev, slot.next)
        };
        match prev {
            // Head of the chain, sole entry or not.
            None => self.buckets[bucket] = next,
            // Interior or tail.
            Some(prev) => self.slot_mut(prev).next = next,
        }
        if let Some(next) = next {
            self.slot_mut(next).prev = prev;
        }
        self.slots[index] = None;
        self.free.push(index);
        self.len -= 1;
    }
}

/// Eviction visitor: tombstones any record not heard from within
/// `max_inactive` seconds of `now`.
pub fn evict_stale(now: f64, max_inactive: f64) -> impl FnMut(&mut BeaconRecord) -> Visit {
    move |record| {
        if now - record.filter.last_seen > max_inactive {
            debug!(beacon = %record.identity, "beacon pruned");
            Visit::Evict
        } else {
            Visit::Keep
        }
    }
}

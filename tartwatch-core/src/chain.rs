//! Chain head tracking: best and finalized slots, a bounded window of
//! observed blocks and a fork counter.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use tartwatch_events::{AuthoredBlock, BlockRef, EventData, NormalizedEvent};

/// Slots per epoch on the tiny test network.
pub const EPOCH_LENGTH: u64 = 600;

/// Which observation produced a block record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BlockOrigin {
    Best,
    Finalized,
    Authored,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockRecord {
    pub slot: u64,
    /// Lowercase hex, empty when the observation carried no hash.
    pub hash: String,
    pub origin: BlockOrigin,
    pub observed_at: DateTime<Utc>,
}

/// Finalized slot reported ahead of the best slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FinalityAnomaly {
    pub best_slot: u64,
    pub finalized_slot: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChainState {
    pub best_slot: u64,
    pub finalized_slot: u64,
    pub blocks: BTreeMap<u64, BlockRecord>,
    pub fork_count: u64,
}

impl ChainState {
    /// `best_slot - finalized_slot`; negative values are reported, not clamped.
    pub fn finality_lag(&self) -> i128 {
        i128::from(self.best_slot) - i128::from(self.finalized_slot)
    }

    pub fn finality_anomaly(&self) -> Option<FinalityAnomaly> {
        (self.finalized_slot > self.best_slot).then_some(FinalityAnomaly {
            best_slot: self.best_slot,
            finalized_slot: self.finalized_slot,
        })
    }

    /// Newest `limit` records, highest slot first.
    pub fn recent(&self, limit: usize) -> Vec<&BlockRecord> {
        self.blocks.values().rev().take(limit).collect()
    }

    pub fn latest_block(&self) -> Option<&BlockRecord> {
        self.blocks.values().next_back()
    }

    pub fn block(&self, slot: u64) -> Option<&BlockRecord> {
        self.blocks.get(&slot)
    }

    pub const fn epoch(&self) -> u64 {
        self.best_slot / EPOCH_LENGTH
    }

    pub const fn slot_in_epoch(&self) -> u64 {
        self.best_slot % EPOCH_LENGTH
    }
}

/// Effect of one event on the chain state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainUpdate {
    /// Not a block event, or a block event without a slot.
    Ignored,
    /// A record was inserted or replaced.
    Recorded {
        slot: u64,
        origin: BlockOrigin,
        advanced: bool,
    },
    /// The event was consistent with what is already known.
    Unchanged { slot: u64, advanced: bool },
    /// An authored block disagreed with the recorded hash for its slot.
    Fork { slot: u64 },
}

/// Single-writer fold of block events into a [`ChainState`].
#[derive(Debug, Clone)]
pub struct ChainAggregator {
    state: ChainState,
    retention: usize,
}

impl ChainAggregator {
    pub const MIN_RETENTION: usize = 500;

    /// `retention` is raised to [`Self::MIN_RETENTION`] when smaller.
    pub fn new(retention: usize) -> Self {
        Self {
            state: ChainState::default(),
            retention: retention.max(Self::MIN_RETENTION),
        }
    }

    pub fn retention(&self) -> usize {
        self.retention
    }

    pub fn state(&self) -> &ChainState {
        &self.state
    }

    pub fn snapshot(&self) -> ChainState {
        self.state.clone()
    }

    pub fn apply(&mut self, event: &NormalizedEvent) -> ChainUpdate {
        let update = match event.data() {
            EventData::BestBlockChanged(block) => self.apply_best(block, event.timestamp),
            EventData::FinalizedBlockChanged(block) => self.apply_finalized(block, event.timestamp),
            EventData::Authored(block) => self.apply_authored(block, event.timestamp),
            _ => return ChainUpdate::Ignored,
        };
        self.evict();
        update
    }

    fn apply_best(&mut self, block: BlockRef, observed_at: DateTime<Utc>) -> ChainUpdate {
        let advanced = block.slot > self.state.best_slot;
        if advanced {
            self.state.best_slot = block.slot;
        }
        self.upsert(block.slot, block.hash, BlockOrigin::Best, observed_at);
        ChainUpdate::Recorded {
            slot: block.slot,
            origin: BlockOrigin::Best,
            advanced,
        }
    }

    fn apply_finalized(&mut self, block: BlockRef, observed_at: DateTime<Utc>) -> ChainUpdate {
        let advanced = block.slot > self.state.finalized_slot;
        if advanced {
            self.state.finalized_slot = block.slot;
        }

        let holds_best = self
            .state
            .blocks
            .get(&block.slot)
            .is_some_and(|record| record.origin == BlockOrigin::Best);
        if holds_best {
            return ChainUpdate::Unchanged {
                slot: block.slot,
                advanced,
            };
        }

        self.upsert(block.slot, block.hash, BlockOrigin::Finalized, observed_at);
        ChainUpdate::Recorded {
            slot: block.slot,
            origin: BlockOrigin::Finalized,
            advanced,
        }
    }

    fn apply_authored(&mut self, block: AuthoredBlock, observed_at: DateTime<Utc>) -> ChainUpdate {
        let Some(existing) = self.state.blocks.get(&block.slot) else {
            self.upsert(
                block.slot,
                block.header_hash.unwrap_or_default(),
                BlockOrigin::Authored,
                observed_at,
            );
            return ChainUpdate::Recorded {
                slot: block.slot,
                origin: BlockOrigin::Authored,
                advanced: false,
            };
        };

        // A missing hash compares as empty.
        let authored_hash = block.header_hash.as_deref().unwrap_or_default();
        if existing.hash != authored_hash {
            self.state.fork_count = self.state.fork_count.saturating_add(1);
            tracing::info!(
                slot = block.slot,
                recorded = %existing.hash,
                authored = ?block.header_hash,
                fork_count = self.state.fork_count,
                "conflicting block authored"
            );
            ChainUpdate::Fork { slot: block.slot }
        } else {
            ChainUpdate::Unchanged {
                slot: block.slot,
                advanced: false,
            }
        }
    }

    fn upsert(&mut self, slot: u64, hash: String, origin: BlockOrigin, observed_at: DateTime<Utc>) {
        self.state.blocks.insert(
            slot,
            BlockRecord {
                slot,
                hash,
                origin,
                observed_at,
            },
        );
    }

    fn evict(&mut self) {
        while self.state.blocks.len() > self.retention {
            if self.state.blocks.pop_first().is_none() {
                break;
            }
        }
    }
}

impl Default for ChainAggregator {
    fn default() -> Self {
        Self::new(Self::MIN_RETENTION)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::{Value, json};
    use tartwatch_events::{Normalizer, RawEvent, codes};

    fn event(normalizer: &Normalizer, event_type: u16, data: Value) -> NormalizedEvent {
        normalizer.normalize(RawEvent::from_value(&json!({
            "node_id": "node-a",
            "event_type": event_type,
            "timestamp": "2025-03-01T12:00:00Z",
            "data": data,
        })))
    }

    fn best(normalizer: &Normalizer, slot: u64, hash: &str) -> NormalizedEvent {
        event(
            normalizer,
            codes::BEST_BLOCK_CHANGED,
            json!({"BestBlockChanged": {"slot": slot, "hash": hash}}),
        )
    }

    fn finalized(normalizer: &Normalizer, slot: u64, hash: &str) -> NormalizedEvent {
        event(
            normalizer,
            codes::FINALIZED_BLOCK_CHANGED,
            json!({"FinalizedBlockChanged": {"slot": slot, "hash": hash}}),
        )
    }

    fn authored(normalizer: &Normalizer, slot: u64, hash: Option<&str>) -> NormalizedEvent {
        let block = match hash {
            Some(hash) => json!({"slot": slot, "header_hash": hash}),
            None => json!({"slot": slot}),
        };
        event(normalizer, codes::AUTHORED, json!({"Authored": {"block": block}}))
    }

    #[test]
    fn best_and_finalized_slots_only_move_forward() {
        let normalizer = Normalizer::new();
        let mut chain = ChainAggregator::default();

        chain.apply(&best(&normalizer, 10, "0xaa"));
        let update = chain.apply(&best(&normalizer, 8, "0xbb"));
        chain.apply(&finalized(&normalizer, 7, "0xcc"));
        chain.apply(&finalized(&normalizer, 5, "0xdd"));

        let state = chain.state();
        assert_eq!(state.best_slot, 10);
        assert_eq!(state.finalized_slot, 7);
        assert_eq!(state.finality_lag(), 3);
        assert_eq!(
            update,
            ChainUpdate::Recorded {
                slot: 8,
                origin: BlockOrigin::Best,
                advanced: false
            }
        );
        assert_eq!(state.block(8).map(|record| record.hash.as_str()), Some("bb"));
    }

    #[test]
    fn finalized_does_not_replace_best_record() {
        let normalizer = Normalizer::new();
        let mut chain = ChainAggregator::default();

        chain.apply(&best(&normalizer, 10, "0xaa"));
        let update = chain.apply(&finalized(&normalizer, 10, "0xaa"));

        assert_eq!(
            update,
            ChainUpdate::Unchanged {
                slot: 10,
                advanced: true
            }
        );
        assert_eq!(
            chain.state().block(10).map(|record| record.origin),
            Some(BlockOrigin::Best)
        );
        assert_eq!(chain.state().finalized_slot, 10);
    }

    #[test]
    fn conflicting_authored_hash_counts_one_fork() {
        let normalizer = Normalizer::new();
        let mut chain = ChainAggregator::default();

        chain.apply(&best(&normalizer, 100, "0xaaaa"));
        assert_eq!(
            chain.apply(&authored(&normalizer, 100, Some("0xbbbb"))),
            ChainUpdate::Fork { slot: 100 }
        );
        assert_eq!(
            chain.apply(&authored(&normalizer, 100, Some("0xAAAA"))),
            ChainUpdate::Unchanged {
                slot: 100,
                advanced: false
            }
        );

        let state = chain.state();
        assert_eq!(state.fork_count, 1);
        assert_eq!(state.block(100).map(|record| record.hash.as_str()), Some("aaaa"));
    }

    #[test]
    fn missing_hashes_compare_as_empty() {
        let normalizer = Normalizer::new();
        let mut chain = ChainAggregator::default();

        chain.apply(&event(
            &normalizer,
            codes::BEST_BLOCK_CHANGED,
            json!({"BestBlockChanged": {"slot": 5}}),
        ));
        assert_eq!(
            chain.apply(&authored(&normalizer, 5, Some("ab"))),
            ChainUpdate::Fork { slot: 5 }
        );

        chain.apply(&best(&normalizer, 6, "0xcd"));
        assert_eq!(
            chain.apply(&authored(&normalizer, 6, None)),
            ChainUpdate::Fork { slot: 6 }
        );

        chain.apply(&authored(&normalizer, 7, None));
        assert_eq!(
            chain.apply(&authored(&normalizer, 7, None)),
            ChainUpdate::Unchanged {
                slot: 7,
                advanced: false
            }
        );

        assert_eq!(chain.state().fork_count, 2);
    }

    #[test]
    fn authored_block_fills_empty_slot() {
        let normalizer = Normalizer::new();
        let mut chain = ChainAggregator::default();

        let update = chain.apply(&authored(&normalizer, 42, Some("0x01")));
        assert_eq!(
            update,
            ChainUpdate::Recorded {
                slot: 42,
                origin: BlockOrigin::Authored,
                advanced: false
            }
        );
        assert_eq!(chain.state().best_slot, 0);
        assert_eq!(chain.state().fork_count, 0);
    }

    #[test]
    fn unrelated_and_slotless_events_are_ignored() {
        let normalizer = Normalizer::new();
        let mut chain = ChainAggregator::default();

        let status = event(&normalizer, codes::STATUS, json!({"Status": {"num_peers": 3}}));
        let slotless = event(
            &normalizer,
            codes::BEST_BLOCK_CHANGED,
            json!({"BestBlockChanged": {"hash": "0x01"}}),
        );

        assert_eq!(chain.apply(&status), ChainUpdate::Ignored);
        assert_eq!(chain.apply(&slotless), ChainUpdate::Ignored);
        assert_eq!(chain.snapshot(), ChainState::default());
    }

    #[test]
    fn window_evicts_lowest_slots() {
        let normalizer = Normalizer::new();
        let mut chain = ChainAggregator::new(10);
        assert_eq!(chain.retention(), 500);

        for slot in 1..=600 {
            chain.apply(&best(&normalizer, slot, "0x01"));
        }

        let state = chain.state();
        assert_eq!(state.blocks.len(), 500);
        assert_eq!(state.blocks.keys().next(), Some(&101));
        assert_eq!(state.latest_block().map(|record| record.slot), Some(600));
        assert_eq!(
            state.recent(3).iter().map(|record| record.slot).collect::<Vec<_>>(),
            vec![600, 599, 598]
        );
        assert_eq!(state.epoch(), 1);
        assert_eq!(state.slot_in_epoch(), 0);
    }

    #[test]
    fn finalized_ahead_of_best_is_reported() {
        let normalizer = Normalizer::new();
        let mut chain = ChainAggregator::default();

        chain.apply(&best(&normalizer, 5, "0x01"));
        chain.apply(&finalized(&normalizer, 9, "0x02"));

        let state = chain.state();
        assert_eq!(state.finality_lag(), -4);
        assert_eq!(
            state.finality_anomaly(),
            Some(FinalityAnomaly {
                best_slot: 5,
                finalized_slot: 9
            })
        );
    }
}

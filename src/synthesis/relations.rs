//! Relationship wiring between generated events.
//!
//! A share of generated events is linked to one to three others, preferring
//! events of the same process and then events within two weeks. Links are
//! written to both sides' `related_events`, so the relation stays symmetric.

use crate::Result;
use crate::models::Event;
use crate::models::graph::RelationGraph;
use crate::scheduler::seeded_rng;
use crate::storage::Storage;
use chrono::Duration;
use rand::Rng;
use rand::seq::SliceRandom;
use std::collections::{BTreeMap, BTreeSet};

/// Default share of generated events that get relations.
pub const DEFAULT_RELATION_RATIO: f64 = 0.7;

const MAX_RELATED: usize = 3;
const NEARBY_DAYS: i64 = 14;

/// Wire relations among an owner's generated events.
///
/// Whether an event is picked is decided by an RNG seeded from its id, so
/// the same events are picked on every run. Events that already have
/// relations are skipped. Returns the number of new links.
pub fn wire_relationships(storage: &Storage, owner: &str, ratio: f64, seed: u64) -> Result<usize> {
    let ratio = ratio.clamp(0.0, 1.0);
    let mut events: BTreeMap<i64, Event> = storage
        .list_events(owner, None, None)?
        .into_iter()
        .filter(|e| e.is_generated())
        .map(|e| (e.id, e))
        .collect();
    let ids: Vec<i64> = events.keys().copied().collect();
    let mut dirty = BTreeSet::new();
    let mut links = 0;

    for &id in &ids {
        let mut rng = seeded_rng(seed, &format!("relate:{}", id));
        if !rng.random_bool(ratio) {
            continue;
        }
        let Some(event) = events.get(&id) else {
            continue;
        };
        if !event.related_events().is_empty() {
            continue;
        }
        let wanted = rng.random_range(1..=MAX_RELATED);

        let mut same_process: Vec<i64> = Vec::new();
        let mut nearby: Vec<i64> = Vec::new();
        for other in events.values() {
            if other.id == id {
                continue;
            }
            if event.process_id.is_some() && other.process_id == event.process_id {
                same_process.push(other.id);
            } else if (other.start_time - event.start_time).abs() <= Duration::days(NEARBY_DAYS) {
                nearby.push(other.id);
            }
        }
        same_process.shuffle(&mut rng);
        nearby.shuffle(&mut rng);

        let chosen: Vec<i64> = same_process
            .into_iter()
            .chain(nearby)
            .take(wanted)
            .collect();

        for other_id in chosen {
            if link(&mut events, id, other_id) {
                dirty.insert(id);
                dirty.insert(other_id);
                links += 1;
            }
        }
    }

    storage.with_transaction(|s| {
        for id in &dirty {
            if let Some(event) = events.get(id) {
                s.set_event_metadata(event.id, &event.metadata)?;
            }
        }
        Ok(())
    })?;

    tracing::debug!(owner, links, "wired event relations");
    Ok(links)
}

/// Add `a <-> b` on both sides. Returns true if either side changed.
fn link(events: &mut BTreeMap<i64, Event>, a: i64, b: i64) -> bool {
    let mut changed = false;
    if let Some(event) = events.get_mut(&a) {
        changed |= event.add_related(b);
    }
    if let Some(event) = events.get_mut(&b) {
        changed |= event.add_related(a);
    }
    changed
}

/// The relation graph over all of an owner's events.
pub fn relation_graph(storage: &Storage, owner: &str) -> Result<RelationGraph> {
    let events = storage.list_events(owner, None, None)?;
    Ok(RelationGraph::from_lists(
        events.into_iter().map(|e| (e.id, e.related_events())),
    ))
}

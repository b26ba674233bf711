//! Half-cycle ambiguity bookkeeping.
//!
//! Receivers flag carrier phases with an unresolved half-cycle
//! ambiguity; once the receiver commits to an integer offset, all
//! phases recorded during the ambiguous interval need a retroactive
//! ±0.5 cycle correction. The scan pass grows one interval list per
//! (satellite, carrier slot); the convert pass applies the fix.

use std::collections::HashMap;

use log::trace;

use gnss::prelude::SV;
use hifitime::prelude::Epoch;

use crate::{
    constants::DTTOL,
    observation::{LliFlags, ObsData},
};

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub enum HalfCycleStatus {
    /// No ambiguity pending.
    #[default]
    Idle,
    /// Ambiguity raised, resolution unknown yet.
    Unresolved,
    /// Resolved: half cycle was added.
    Added,
    /// Resolved: half cycle was subtracted.
    Subtracted,
    /// Resolved without phase adjustment.
    NoAdjust,
}

/// One ambiguity interval.
#[derive(Debug, Clone)]
pub struct HalfCycleNode {
    pub ts: Epoch,
    pub te: Epoch,
    pub status: HalfCycleStatus,
}

/// Interval lists per (satellite, carrier slot). Within each list the
/// trailing node is the only one that may be idle or unresolved.
#[derive(Debug, Default)]
pub struct HalfCycleTracker {
    lists: HashMap<(SV, usize), Vec<HalfCycleNode>>,
}

impl HalfCycleTracker {
    /// Tracks one scanned observation.
    pub fn update(&mut self, obs: &ObsData) {
        for (slot, band) in obs.bands.iter().enumerate() {
            if band.phase == 0.0 {
                continue;
            }

            let list = self.lists.entry((obs.sv, slot)).or_default();

            if list.is_empty() {
                list.push(HalfCycleNode {
                    ts: obs.time,
                    te: obs.time,
                    status: HalfCycleStatus::Idle,
                });
            }

            let head = list.last_mut().unwrap();

            // a true slip invalidates any pending resolution
            if band.lli.contains(LliFlags::SLIP)
                && !band
                    .lli
                    .intersects(LliFlags::HALF_CYCLE_ADDED | LliFlags::HALF_CYCLE_SUBTRACTED)
            {
                head.status = HalfCycleStatus::Idle;
            }

            if band.lli.contains(LliFlags::HALF_CYCLE) {
                // still unresolved
                if head.status == HalfCycleStatus::Idle {
                    head.ts = obs.time;
                }
                head.te = obs.time;
                head.status = HalfCycleStatus::Unresolved;
            } else if head.status == HalfCycleStatus::Unresolved {
                // resolved at this epoch
                head.status = if band.lli.contains(LliFlags::HALF_CYCLE_ADDED) {
                    HalfCycleStatus::Added
                } else if band.lli.contains(LliFlags::HALF_CYCLE_SUBTRACTED) {
                    HalfCycleStatus::Subtracted
                } else {
                    HalfCycleStatus::NoAdjust
                };

                list.push(HalfCycleNode {
                    ts: obs.time,
                    te: obs.time,
                    status: HalfCycleStatus::Idle,
                });
            }
        }
    }

    /// Applies the retroactive corrections to one outgoing observation:
    /// phases inside a resolved interval shift by ±0.5 cycle and lose
    /// their ambiguity flag. The resolution markers never leave the
    /// scan pass.
    pub fn resolve(&self, obs: &mut ObsData) {
        for (slot, band) in obs.bands.iter_mut().enumerate() {
            if band.phase != 0.0 {
                if let Some(list) = self.lists.get(&(obs.sv, slot)) {
                    for node in list.iter() {
                        let correction = match node.status {
                            HalfCycleStatus::Added => 0.5,
                            HalfCycleStatus::Subtracted => -0.5,
                            _ => continue,
                        };

                        let after_start = (obs.time - node.ts).to_seconds() >= -DTTOL;
                        let before_end = (node.te - obs.time).to_seconds() >= -DTTOL;

                        if after_start && before_end {
                            band.phase += correction;
                            band.lli.remove(LliFlags::HALF_CYCLE);

                            trace!(
                                "{} ({:x}) half-cycle {} on slot {}",
                                obs.time,
                                obs.sv,
                                if correction > 0.0 { "+0.5" } else { "-0.5" },
                                slot,
                            );
                        }
                    }
                }
            }

            band.lli
                .remove(LliFlags::HALF_CYCLE_ADDED | LliFlags::HALF_CYCLE_SUBTRACTED);
        }
    }

    pub fn clear(&mut self) {
        self.lists.clear();
    }

    #[cfg(test)]
    fn list(&self, sv: SV, slot: usize) -> &[HalfCycleNode] {
        self.lists
            .get(&(sv, slot))
            .map(|list| list.as_slice())
            .unwrap_or(&[])
    }
}

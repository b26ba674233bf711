//! Scan-pass observation code inventory.

use itertools::Itertools;

use crate::{
    codes::{self, Code},
    constants::{MAX_CODES_PER_SYSTEM, NUM_SYSTEMS},
    observation::EpochData,
};

/// Bit per measurement kind seen for a code during the scan.
pub const TYPE_PSEUDORANGE: u8 = 0x01;
pub const TYPE_PHASE: u8 = 0x02;
pub const TYPE_DOPPLER: u8 = 0x04;
pub const TYPE_SNR: u8 = 0x08;

/// Accumulates the observation codes actually present in the stream,
/// per system, together with the measurement kinds seen on each code.
#[derive(Debug, Default)]
pub struct CodeScanner {
    codes: [Vec<Code>; NUM_SYSTEMS],
    types: [Vec<u8>; NUM_SYSTEMS],
}

impl CodeScanner {
    /// Folds one decoded epoch into the inventory.
    pub fn update(&mut self, epoch: &EpochData) {
        for obs in epoch.observations.iter() {
            let Some(sys) = codes::system_index(obs.sv.constellation) else {
                continue;
            };

            for band in obs.bands.iter() {
                let Some(code) = band.code else {
                    continue;
                };

                let index = match self.codes[sys].iter().position(|c| *c == code) {
                    Some(index) => index,
                    None => {
                        if self.codes[sys].len() >= MAX_CODES_PER_SYSTEM {
                            continue;
                        }
                        self.codes[sys].push(code);
                        self.types[sys].push(0);
                        self.codes[sys].len() - 1
                    },
                };

                if band.pseudorange != 0.0 {
                    self.types[sys][index] |= TYPE_PSEUDORANGE;
                }
                if band.phase != 0.0 {
                    self.types[sys][index] |= TYPE_PHASE;
                }
                if band.doppler != 0.0 {
                    self.types[sys][index] |= TYPE_DOPPLER;
                }
                if band.snr != 0.0 {
                    self.types[sys][index] |= TYPE_SNR;
                }
            }
        }
    }

    /// Orders each system by carrier slot, then by descending priority.
    /// Ties keep their insertion order; the type masks follow their
    /// codes.
    pub fn sort(&mut self) {
        for sys in 0..NUM_SYSTEMS {
            let order: Vec<usize> = (0..self.codes[sys].len())
                .sorted_by_key(|&i| {
                    let code = self.codes[sys][i];
                    let slot = codes::frequency_index(sys, code).unwrap_or(usize::MAX);
                    let priority = codes::priority(sys, code);
                    (slot, std::cmp::Reverse(priority))
                })
                .collect();

            self.codes[sys] = order.iter().map(|&i| self.codes[sys][i]).collect();
            self.types[sys] = order.iter().map(|&i| self.types[sys][i]).collect();
        }
    }

    pub fn codes(&self, sys: usize) -> &[Code] {
        &self.codes[sys]
    }

    pub fn types(&self, sys: usize) -> &[u8] {
        &self.types[sys]
    }

    pub fn clear(&mut self) {
        for sys in 0..NUM_SYSTEMS {
            self.codes[sys].clear();
            self.types[sys].clear();
        }
    }
}

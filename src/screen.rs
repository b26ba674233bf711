//! Time window screening and duplicate suppression.

use hifitime::prelude::Epoch;

use crate::constants::gpst_seconds;

/// Session time window with sampling quantiser.
#[derive(Debug, Copy, Clone)]
pub struct TimeScreen {
    pub ts: Option<Epoch>,
    pub te: Option<Epoch>,
    /// Output cadence [s], 0 keeps every epoch.
    pub tint: f64,
    /// Comparison tolerance [s].
    pub ttol: f64,
}

impl TimeScreen {
    pub fn new(ts: Option<Epoch>, te: Option<Epoch>, tint: f64, ttol: f64) -> Self {
        Self { ts, te, tint, ttol }
    }

    /// True when the epoch falls on the output cadence and inside the
    /// session window.
    pub fn accepts(&self, t: Epoch) -> bool {
        if self.tint > 0.0 {
            let phase = (gpst_seconds(t) + self.ttol) % self.tint;
            if phase > 2.0 * self.ttol {
                return false;
            }
        }

        if let Some(ts) = self.ts {
            if (t - ts).to_seconds() < -self.ttol {
                return false;
            }
        }

        if let Some(te) = self.te {
            if (t - te).to_seconds() >= self.ttol {
                return false;
            }
        }

        true
    }

    /// Window-only variant used for navigation records, with the start
    /// bound widened by the ephemeris validity span.
    pub fn accepts_windowed(&self, t: Epoch, dtoe: f64) -> bool {
        if let Some(ts) = self.ts {
            if (t - ts).to_seconds() < -dtoe {
                return false;
            }
        }

        if let Some(te) = self.te {
            if (t - te).to_seconds() >= self.ttol {
                return false;
            }
        }

        true
    }
}

/// Per-output-category duplicate guard.
#[derive(Debug, Default, Copy, Clone)]
pub struct DupCursor {
    last: Option<Epoch>,
}

impl DupCursor {
    /// True when the record lands within the tolerance of the last
    /// emitted one.
    pub fn is_duplicate(&self, t: Epoch, ttol: f64) -> bool {
        match self.last {
            Some(last) => (t - last).to_seconds() < ttol,
            None => false,
        }
    }

    /// Advances the cursor; call on emission only.
    pub fn advance(&mut self, t: Epoch) {
        self.last = Some(t);
    }
}

//! Shared numeric constants of the conversion engine.

use gnss::prelude::Constellation;
use hifitime::prelude::{Epoch, TimeScale};

/// Tolerance when comparing two epochs [s].
pub const DTTOL: f64 = 0.025;

/// Carrier frequency slots handled per satellite.
pub const NFREQ: usize = 5;

/// Extended observation slots, beyond the regular carriers.
pub const NEXOBS: usize = 0;

/// Total observation slots carried per satellite.
pub const NUM_BANDS: usize = NFREQ + NEXOBS;

/// Supported systems, in fixed order GPS GLO GAL QZS SBS BDS IRN.
pub const NUM_SYSTEMS: usize = 7;

/// Scanned observation codes are capped, per system.
pub const MAX_CODES_PER_SYSTEM: usize = 32;

/// Output slots: obs, nav, gnav, hnav, qnav, lnav, cnav, inav, sbas log.
pub const NUM_OUTPUTS: usize = 9;

/// Header comment lines are capped.
pub const MAX_COMMENTS: usize = 16;

/// GLONASS frequency channel slots.
pub const NUM_GLO_SLOTS: usize = 27;

pub const SECONDS_PER_WEEK: f64 = 86400.0 * 7.0;

/// Broadcast ephemeris validity span [s], used when screening
/// navigation records against the session time window.
pub fn max_dtoe(constellation: Constellation) -> f64 {
    match constellation {
        Constellation::GPS | Constellation::QZSS | Constellation::IRNSS => 7200.0,
        Constellation::Glonass => 1800.0,
        Constellation::Galileo => 14400.0,
        Constellation::BeiDou => 21600.0,
        c if c.is_sbas() => 360.0,
        _ => 86400.0,
    }
}

/// Absolute GPST seconds of an epoch, sub-nanosecond fraction preserved.
pub fn gpst_seconds(t: Epoch) -> f64 {
    let (week, tow_nanos) = t.to_time_scale(TimeScale::GPST).to_time_of_week();
    week as f64 * SECONDS_PER_WEEK + tow_nanos as f64 * 1.0E-9
}

#[cfg(test)]
mod test {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn gpst_seconds_is_week_aligned() {
        let t = Epoch::from_str("2020-01-01T00:00:00 GPST").unwrap();
        let (week, _) = t.to_time_of_week();
        assert_eq!(gpst_seconds(t), week as f64 * SECONDS_PER_WEEK + 259200.0);
    }

    #[test]
    fn dtoe_per_system() {
        assert_eq!(max_dtoe(Constellation::GPS), 7200.0);
        assert_eq!(max_dtoe(Constellation::Glonass), 1800.0);
        assert_eq!(max_dtoe(Constellation::SBAS), 360.0);
    }
}

//! Broadcast ephemeris shapes and the per-session navigation cache.

use std::collections::HashMap;

use log::debug;

use gnss::prelude::SV;
use hifitime::prelude::Epoch;

use crate::constants::NUM_GLO_SLOTS;

/// Keplerian broadcast ephemeris (GPS, Galileo, QZSS, BeiDou, NavIC).
#[derive(Debug, Clone)]
pub struct Eph {
    pub sv: SV,

    /// Message set: 0 for the primary message, 1 for the alternate
    /// (e.g. Galileo F/NAV versus I/NAV).
    pub set: u8,

    pub iode: i64,
    pub iodc: i64,

    /// SV accuracy [m]
    pub sva: f64,
    /// SV health word
    pub svh: f64,

    pub week: u32,
    /// Codes on carrier (system specific)
    pub code: f64,
    /// Data flags (system specific)
    pub flag: f64,

    pub toe: Epoch,
    pub toc: Epoch,
    /// Transmission time
    pub ttr: Epoch,

    /// Semi major axis [m]
    pub a: f64,
    pub e: f64,
    pub i0: f64,
    pub omg0: f64,
    pub omg: f64,
    pub m0: f64,
    pub deln: f64,
    pub omgd: f64,
    pub idot: f64,

    pub crc: f64,
    pub crs: f64,
    pub cuc: f64,
    pub cus: f64,
    pub cic: f64,
    pub cis: f64,

    /// Toe, seconds of week
    pub toes: f64,
    /// Fit interval [h]
    pub fit: f64,

    /// Clock bias [s], drift [s/s], drift rate [s/s²]
    pub f0: f64,
    pub f1: f64,
    pub f2: f64,

    /// Group delays [s]
    pub tgd: [f64; 4],
}

/// GLONASS broadcast frame, slot indexed.
#[derive(Debug, Clone)]
pub struct Geph {
    pub sv: SV,
    pub iode: i64,

    /// Frequency channel number (-7..+6)
    pub frq: i8,

    pub svh: f64,
    pub sva: f64,
    pub age: f64,

    pub toe: Epoch,
    /// Message frame time
    pub tof: Epoch,

    /// ECEF position [m], velocity [m/s], acceleration [m/s²]
    pub pos: [f64; 3],
    pub vel: [f64; 3],
    pub acc: [f64; 3],

    /// Clock offset [s], relative frequency bias, delay between frequencies [s]
    pub taun: f64,
    pub gamn: f64,
    pub dtaun: f64,
}

/// SBAS short-term ephemeris.
#[derive(Debug, Clone)]
pub struct Seph {
    pub sv: SV,

    pub t0: Epoch,
    pub tof: Epoch,

    pub sva: f64,
    pub svh: f64,

    pub pos: [f64; 3],
    pub vel: [f64; 3],
    pub acc: [f64; 3],

    pub af0: f64,
    pub af1: f64,
}

/// Tagged broadcast ephemeris, one variant per structural shape.
#[derive(Debug, Clone)]
pub enum EphFrame {
    Kepler(Eph),
    Glonass(Geph),
    Sbas(Seph),
}

impl EphFrame {
    pub fn sv(&self) -> SV {
        match self {
            Self::Kepler(eph) => eph.sv,
            Self::Glonass(geph) => geph.sv,
            Self::Sbas(seph) => seph.sv,
        }
    }

    /// Reference time used when screening against the session window.
    pub fn time(&self) -> Epoch {
        match self {
            Self::Kepler(eph) => eph.toe,
            Self::Glonass(geph) => geph.toe,
            Self::Sbas(seph) => seph.t0,
        }
    }
}

/// One raw SBAS frame: 250 bits in 29 padded bytes.
#[derive(Debug, Clone)]
pub struct SbasMessage {
    pub prn: u8,
    pub week: u32,
    /// Time of week [s]
    pub tow: f64,
    pub payload: [u8; 29],

    /// Set when this frame completed a long-term correction update and
    /// a fresh SBAS ephemeris is ready for dispatch.
    pub lt_ephemeris: Option<Seph>,
}

/// Ionosphere / UTC parameters, latched from the decoder.
#[derive(Debug, Default, Clone)]
pub struct IonUtc {
    /// GPS Klobuchar alpha then beta coefficients
    pub ion_gps: [f64; 8],
    /// A0, A1, tot [s], week
    pub utc_gps: [f64; 4],
    pub leap_seconds: Option<i32>,
}

/// Per-session navigation cache. Suppresses unchanged re-broadcasts and
/// harvests GLONASS frequency channel numbers. Signatures are cleared
/// between the scan and convert passes so the convert pass emits each
/// distinct ephemeris exactly once.
#[derive(Debug, Default)]
pub struct NavCache {
    kepler: HashMap<(SV, u8), (i64, Epoch)>,
    glonass: HashMap<u8, (i64, Epoch)>,
    sbas: HashMap<SV, Epoch>,

    /// GLONASS frequency channels, slot indexed.
    pub glo_fcn: [Option<i8>; NUM_GLO_SLOTS],
}

impl NavCache {
    /// Stores the frame signature. Returns false when the frame matches
    /// the cached broadcast and must not be emitted again.
    pub fn accept(&mut self, frame: &EphFrame) -> bool {
        match frame {
            EphFrame::Kepler(eph) => {
                let signature = (eph.iode, eph.toe);
                let previous = self.kepler.insert((eph.sv, eph.set), signature);
                previous != Some(signature)
            },
            EphFrame::Glonass(geph) => {
                let slot = geph.sv.prn;

                if (1..=NUM_GLO_SLOTS as u8).contains(&slot) {
                    let index = (slot - 1) as usize;
                    if self.glo_fcn[index].is_none() {
                        debug!("R{:02} frequency channel {}", slot, geph.frq);
                    }
                    self.glo_fcn[index] = Some(geph.frq);
                }

                let signature = (geph.iode, geph.toe);
                let previous = self.glonass.insert(slot, signature);
                previous != Some(signature)
            },
            EphFrame::Sbas(seph) => {
                let previous = self.sbas.insert(seph.sv, seph.t0);
                previous != Some(seph.t0)
            },
        }
    }

    /// Forgets every stored signature but keeps the harvested frequency
    /// channels. Run between the scan and convert passes.
    pub fn clear_signatures(&mut self) {
        self.kepler.clear();
        self.glonass.clear();
        self.sbas.clear();
    }

    /// Seeds frequency channels from caller-provided values.
    pub fn seed_fcn(&mut self, channels: &[Option<i8>; NUM_GLO_SLOTS]) {
        for (slot, frq) in channels.iter().enumerate() {
            if frq.is_some() {
                self.glo_fcn[slot] = *frq;
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use gnss::prelude::Constellation;
    use std::str::FromStr;

    fn geph(slot: u8, iode: i64, frq: i8) -> EphFrame {
        let toe = Epoch::from_str("2020-01-01T00:15:00 GPST").unwrap();
        EphFrame::Glonass(Geph {
            sv: SV::new(Constellation::Glonass, slot),
            iode,
            frq,
            svh: 0.0,
            sva: 0.0,
            age: 0.0,
            toe,
            tof: toe,
            pos: [0.0; 3],
            vel: [0.0; 3],
            acc: [0.0; 3],
            taun: 0.0,
            gamn: 0.0,
            dtaun: 0.0,
        })
    }

    #[test]
    fn duplicate_suppression_and_fcn_harvest() {
        let mut cache = NavCache::default();

        assert!(cache.accept(&geph(1, 10, -4)));
        assert!(!cache.accept(&geph(1, 10, -4)));
        assert!(cache.accept(&geph(1, 11, -4)));

        assert_eq!(cache.glo_fcn[0], Some(-4));

        cache.clear_signatures();
        // fresh pass re-emits, channels survive
        assert!(cache.accept(&geph(1, 11, -4)));
        assert_eq!(cache.glo_fcn[0], Some(-4));
    }
}

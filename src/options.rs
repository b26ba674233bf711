//! Conversion options and their population from the scan pass.

use bitflags::bitflags;

use log::{debug, warn};

use serde::{Deserialize, Serialize};

use gnss::prelude::{Constellation, SV};
use hifitime::prelude::Epoch;

use crate::{
    codes::{self, SYS_BDS, SYS_GAL, SYS_GLO, SYS_GPS, SYS_QZS},
    constants::{DTTOL, MAX_COMMENTS, NUM_GLO_SLOTS, NUM_SYSTEMS},
    scan::{CodeScanner, TYPE_DOPPLER, TYPE_PHASE, TYPE_PSEUDORANGE, TYPE_SNR},
    station::{DeltaKind, StationInfo, StationList},
};

bitflags! {
    /// Enabled navigation systems.
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    #[derive(Serialize, Deserialize)]
    pub struct SysMask: u8 {
        const GPS = 0x01;
        const GLO = 0x02;
        const GAL = 0x04;
        const QZS = 0x08;
        const SBS = 0x10;
        const BDS = 0x20;
        const IRN = 0x40;
    }
}

impl SysMask {
    pub fn from_constellation(constellation: Constellation) -> Self {
        match codes::system_index(constellation) {
            Some(sys) => Self::from_bits_truncate(1 << sys),
            None => Self::empty(),
        }
    }

    pub fn has_system(&self, sys: usize) -> bool {
        self.bits() & (1 << sys) != 0
    }
}

bitflags! {
    /// Enabled carrier slots.
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    #[derive(Serialize, Deserialize)]
    pub struct FreqMask: u8 {
        const L1 = 0x01;
        const L2 = 0x02;
        const L3 = 0x04;
        const L4 = 0x08;
        const L5 = 0x10;
    }
}

impl FreqMask {
    pub fn has_slot(&self, slot: usize) -> bool {
        self.bits() & (1 << slot) != 0
    }
}

bitflags! {
    /// Enabled measurement kinds.
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    #[derive(Serialize, Deserialize)]
    pub struct ObsKindMask: u8 {
        const PSEUDORANGE = 0x01;
        const PHASE = 0x02;
        const DOPPLER = 0x04;
        const SNR = 0x08;
    }
}

/// Conversion options. Caller-owned: the session driver clones them at
/// entry and copies back time bounds, observation-type lists and
/// comments only.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvOptions {
    /// Time window start, None for open start.
    pub ts: Option<Epoch>,
    /// Time window end, None for open end.
    pub te: Option<Epoch>,

    /// Output sampling interval [s], 0 keeps every epoch.
    pub tint: f64,
    /// Epoch comparison tolerance [s], 0 selects the default.
    pub ttol: f64,
    /// Multi-session window [s].
    pub tunit: Option<f64>,

    /// Target revision ×100 (304 for RINEX 3.04).
    pub rnxver: u16,

    pub navsys: SysMask,
    pub freqtype: FreqMask,
    pub obstype: ObsKindMask,

    /// Per-system code enable mask, '0' disables the code.
    pub mask: [String; NUM_SYSTEMS],

    /// Station ID used in output path keywords.
    pub staid: String,

    pub run_by: String,

    pub marker_name: String,
    pub marker_number: String,
    pub marker_type: String,

    pub observer: String,
    pub agency: String,

    pub receiver_number: String,
    pub receiver_type: String,
    pub receiver_version: String,

    pub antenna_number: String,
    pub antenna_type: String,

    /// Approximate marker position, ECEF [m].
    pub approx_position: Option<[f64; 3]>,

    /// Antenna offset H/E/N [m].
    pub antenna_delta: [f64; 3],

    pub comments: Vec<String>,

    /// Excluded satellites.
    pub exclude: Vec<SV>,

    /// Caller-seeded GLONASS frequency channels.
    pub glo_fcn: [Option<i8>; NUM_GLO_SLOTS],

    /// Approximate reference time handed to RTCM back-ends.
    pub rtcm_reference: Option<Epoch>,

    /// Resolve half-cycle ambiguities retroactively.
    pub halfcyc: bool,
    /// Declare carrier phase shifts in the header.
    pub phshift: bool,
    /// Estimate the approximate position from the stream.
    pub autopos: bool,
    /// One navigation file per system instead of a combined file.
    pub sep_nav: bool,
    /// Gzip compress every output.
    pub gzip: bool,

    /// Per-system observation types, filled by the scan pass.
    #[serde(skip)]
    pub tobs: [Vec<String>; NUM_SYSTEMS],

    /// Per-system phase shifts, (type, cycles).
    #[serde(skip)]
    pub shifts: [Vec<(String, f64)>; NUM_SYSTEMS],

    /// First/last observation of the latest session.
    #[serde(skip)]
    pub tstart: Option<Epoch>,
    #[serde(skip)]
    pub tend: Option<Epoch>,
}

impl Default for ConvOptions {
    fn default() -> Self {
        Self {
            ts: None,
            te: None,
            tint: 0.0,
            ttol: 0.0,
            tunit: None,
            rnxver: 304,
            navsys: SysMask::all(),
            freqtype: FreqMask::all(),
            obstype: ObsKindMask::all(),
            mask: std::array::from_fn(|_| "1".repeat(69)),
            staid: String::new(),
            run_by: String::new(),
            marker_name: String::new(),
            marker_number: String::new(),
            marker_type: String::new(),
            observer: String::new(),
            agency: String::new(),
            receiver_number: String::new(),
            receiver_type: String::new(),
            receiver_version: String::new(),
            antenna_number: String::new(),
            antenna_type: String::new(),
            approx_position: None,
            antenna_delta: [0.0; 3],
            comments: Vec::new(),
            exclude: Vec::new(),
            glo_fcn: [None; NUM_GLO_SLOTS],
            rtcm_reference: None,
            halfcyc: true,
            phshift: true,
            autopos: false,
            sep_nav: false,
            gzip: false,
            tobs: Default::default(),
            shifts: Default::default(),
            tstart: None,
            tend: None,
        }
    }
}

impl ConvOptions {
    /// Effective epoch tolerance [s].
    pub fn ttol(&self) -> f64 {
        if self.ttol > 0.0 { self.ttol } else { DTTOL }
    }

    pub fn is_excluded(&self, sv: SV) -> bool {
        self.exclude.contains(&sv)
    }

    /// Comment lines are capped; further pushes are dropped.
    pub fn push_comment(&mut self, comment: String) {
        if self.comments.len() < MAX_COMMENTS {
            self.comments.push(comment);
        }
    }

    /// Masks systems (and carriers) unknown to old RINEX revisions.
    pub fn apply_version_gate(&mut self) {
        let keep = if self.rnxver <= 210 {
            SysMask::GPS | SysMask::GLO | SysMask::SBS
        } else if self.rnxver <= 211 {
            SysMask::GPS | SysMask::GLO | SysMask::GAL | SysMask::SBS
        } else if self.rnxver <= 212 {
            SysMask::GPS | SysMask::GLO | SysMask::GAL | SysMask::BDS | SysMask::SBS
        } else if self.rnxver <= 300 {
            SysMask::GPS | SysMask::GLO | SysMask::GAL | SysMask::SBS
        } else if self.rnxver <= 301 {
            SysMask::GPS | SysMask::GLO | SysMask::GAL | SysMask::BDS | SysMask::SBS
        } else if self.rnxver <= 302 {
            SysMask::GPS | SysMask::GLO | SysMask::GAL | SysMask::QZS | SysMask::BDS | SysMask::SBS
        } else {
            SysMask::all()
        };

        self.navsys &= keep;

        if self.rnxver <= 210 {
            self.freqtype &= FreqMask::L1 | FreqMask::L2;
        }
    }

    /// Expands the scanned code inventory into header type lists.
    pub fn populate_obs_types(&mut self, scanner: &CodeScanner) {
        self.tobs = Default::default();

        for sys in 0..NUM_SYSTEMS {
            if !self.navsys.has_system(sys) {
                continue;
            }

            for (code, kinds) in scanner.codes(sys).iter().zip(scanner.types(sys).iter()) {
                let Some(slot) = codes::frequency_index(sys, *code) else {
                    continue;
                };

                if !self.freqtype.has_slot(slot) {
                    continue;
                }

                if self.mask[sys].as_bytes().get(code.mask_index()) == Some(&b'0') {
                    continue;
                }

                if self.rnxver >= 300 {
                    match codes::rinex3_minor(sys, *code) {
                        Some(minor) if u16::from(minor) <= self.rnxver - 300 => {},
                        _ => {
                            debug!(
                                "unsupported obs type: ver={} sys={} code={}",
                                self.rnxver,
                                codes::SYSTEM_LETTERS[sys],
                                code,
                            );
                            continue;
                        },
                    }
                }

                let selected = [
                    ('C', TYPE_PSEUDORANGE, ObsKindMask::PSEUDORANGE),
                    ('L', TYPE_PHASE, ObsKindMask::PHASE),
                    ('D', TYPE_DOPPLER, ObsKindMask::DOPPLER),
                    ('S', TYPE_SNR, ObsKindMask::SNR),
                ];

                for (letter, seen, enabled) in selected {
                    if !self.obstype.contains(enabled) || kinds & seen == 0 {
                        continue;
                    }

                    // codeless pseudoranges do not exist
                    if letter == 'C' && code.attribute() == 'N' {
                        continue;
                    }

                    let descriptor = format!("{}{}", letter, code);

                    if self.rnxver < 300 {
                        let ver2 = codes::to_ver2_type(sys, &descriptor);
                        if !self.tobs[0].contains(&ver2) {
                            self.tobs[0].push(ver2);
                        }
                    } else {
                        self.tobs[sys].push(descriptor);
                    }
                }
            }
        }
    }

    /// Declares the fixed carrier phase alignments (RINEX 3.04,
    /// annex 23) for every phase type present.
    pub fn assign_phase_shifts(&mut self) {
        self.shifts = Default::default();

        if !self.phshift || self.rnxver < 300 {
            return;
        }

        for sys in 0..NUM_SYSTEMS {
            for descriptor in self.tobs[sys].iter() {
                if !descriptor.starts_with('L') {
                    continue;
                }
                if let Some(shift) = phase_shift(sys, descriptor) {
                    self.shifts[sys].push((descriptor.clone(), shift));
                }
            }
        }
    }

    /// Pulls marker/antenna/receiver fields from the station history
    /// (or the live decoder snapshot), caller overrides winning, and
    /// appends the station occupation comment block when the stream
    /// carried real station ids.
    pub fn inject_station(&mut self, stations: &StationList, live: &StationInfo) {
        let selected = stations.select(self.ts);

        let info = match selected {
            Some(node) if !node.info.marker_name.is_empty() => &node.info,
            _ => live,
        };

        fill(&mut self.marker_name, &info.marker_name);
        fill(&mut self.marker_number, &info.marker_number);
        fill(&mut self.receiver_number, &info.receiver_serial);
        fill(&mut self.receiver_type, &info.receiver_descriptor);
        fill(&mut self.receiver_version, &info.receiver_version);
        fill(&mut self.antenna_number, &info.antenna_serial);
        fill(&mut self.antenna_type, &info.antenna_descriptor);

        if !self.autopos && self.approx_position.is_none() && info.has_position() {
            self.approx_position = Some(info.position);
        }

        self.derive_antenna_delta(info);

        let real_ids =
            stations.len() > 1 || stations.head().map(|node| node.staid != 0).unwrap_or(false);

        if real_ids {
            self.push_comment(
                "STAID                    TIME OF FIRST OBS        TIME OF LAST OBS".to_string(),
            );
            for node in stations.chronological() {
                self.push_comment(format!(
                    "{:5}  {}  {}",
                    node.staid,
                    timestamp(node.ts),
                    timestamp(node.te),
                ));
            }
        }
    }

    /// Derives the H/E/N antenna delta from the station snapshot,
    /// unless the caller already provided one.
    pub fn derive_antenna_delta(&mut self, info: &StationInfo) {
        if self.antenna_delta.iter().any(|v| *v != 0.0) {
            return;
        }

        if info.has_delta() && info.delta_kind == DeltaKind::Xyz && !info.has_position() {
            warn!("unknown station position, falling back to antenna height");
        }

        self.antenna_delta = station_antenna_delta(info);
    }
}

/// H/E/N antenna delta of a station snapshot.
pub fn station_antenna_delta(info: &StationInfo) -> [f64; 3] {
    if info.has_delta() && info.delta_kind == DeltaKind::Enu {
        let [e, n, u] = info.delta;
        return [u, e, n];
    }

    if info.has_delta() && info.delta_kind == DeltaKind::Xyz && info.has_position() {
        let [e, n, u] = ecef_to_enu(info.position, info.delta);
        return [u, e, n];
    }

    [info.height, 0.0, 0.0]
}

fn fill(field: &mut String, value: &str) {
    if field.is_empty() && !value.is_empty() {
        *field = value.to_string();
    }
}

fn timestamp(t: Epoch) -> String {
    let (y, m, d, hh, mm, ss, nanos) = t.to_gregorian(hifitime::prelude::TimeScale::GPST);
    format!(
        "{:04}/{:02}/{:02} {:02}:{:02}:{:05.2}",
        y,
        m,
        d,
        hh,
        mm,
        ss as f64 + nanos as f64 * 1.0E-9,
    )
}

/// Fixed phase shift [cycles] of one phase type, RINEX 3.04 annex 23.
pub fn phase_shift(sys: usize, descriptor: &str) -> Option<f64> {
    let shift = match sys {
        SYS_GPS => match descriptor {
            "L1S" | "L1L" | "L1X" | "L1P" | "L1W" | "L1N" => 0.25,
            "L2C" | "L2S" | "L2L" | "L2X" | "L5Q" => -0.25,
            _ => return None,
        },
        SYS_GLO => match descriptor {
            "L1P" | "L2P" | "L3Q" => 0.25,
            _ => return None,
        },
        SYS_GAL => match descriptor {
            "L1C" => 0.5,
            "L5Q" | "L7Q" | "L8Q" => -0.25,
            "L6C" => -0.5,
            _ => return None,
        },
        SYS_QZS => match descriptor {
            "L1S" | "L1L" | "L1X" => 0.25,
            "L5Q" | "L5P" => -0.25,
            _ => return None,
        },
        SYS_BDS => match descriptor {
            "L2P" | "L7Q" | "L6Q" => -0.25,
            "L1P" | "L5P" | "L7P" => 0.25,
            _ => return None,
        },
        _ => return None,
    };
    Some(shift)
}

/// ECEF to geodetic latitude/longitude/height, WGS84.
fn ecef_to_geodetic(position: [f64; 3]) -> (f64, f64, f64) {
    const RE: f64 = 6378137.0;
    const FE: f64 = 1.0 / 298.257223563;

    let e2 = FE * (2.0 - FE);
    let r2 = position[0] * position[0] + position[1] * position[1];

    let mut z = position[2];
    let mut zk = 0.0;
    let mut v = RE;

    while (z - zk).abs() >= 1.0E-4 {
        zk = z;
        let sinp = z / (r2 + z * z).sqrt();
        v = RE / (1.0 - e2 * sinp * sinp).sqrt();
        z = position[2] + v * e2 * sinp;
    }

    let lat = if r2 > 1.0E-12 {
        (z / r2.sqrt()).atan()
    } else if position[2] > 0.0 {
        std::f64::consts::FRAC_PI_2
    } else {
        -std::f64::consts::FRAC_PI_2
    };

    let lon = if r2 > 1.0E-12 {
        position[1].atan2(position[0])
    } else {
        0.0
    };

    let height = (r2 + z * z).sqrt() - v;

    (lat, lon, height)
}

/// Rotates an ECEF offset into the local East/North/Up frame at the
/// given ECEF position.
fn ecef_to_enu(position: [f64; 3], offset: [f64; 3]) -> [f64; 3] {
    let (lat, lon, _) = ecef_to_geodetic(position);

    let (sin_lat, cos_lat) = lat.sin_cos();
    let (sin_lon, cos_lon) = lon.sin_cos();

    let [x, y, z] = offset;

    [
        -sin_lon * x + cos_lon * y,
        -sin_lat * cos_lon * x - sin_lat * sin_lon * y + cos_lat * z,
        cos_lat * cos_lon * x + cos_lat * sin_lon * y + sin_lat * z,
    ]
}

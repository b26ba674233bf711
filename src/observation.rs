//! Observation records, as delivered by the decoder back-ends.

use bitflags::bitflags;

use gnss::prelude::SV;
use hifitime::prelude::Epoch;

use crate::{codes::Code, constants::NUM_BANDS};

bitflags! {
    /// Loss-of-lock indicator for one carrier-phase measurement.
    /// Only the low three bits reach the RINEX output; the half-cycle
    /// resolution bits are scan-pass bookkeeping.
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    pub struct LliFlags: u8 {
        /// Lock lost between previous and current observation.
        const SLIP = 0x01;
        /// Half-cycle ambiguity not resolved yet.
        const HALF_CYCLE = 0x02;
        /// Tracking a BOC modulated signal.
        const BOC_TRACKING = 0x04;
        /// Half-cycle resolved, half cycle added by the receiver.
        const HALF_CYCLE_ADDED = 0x40;
        /// Half-cycle resolved, half cycle subtracted by the receiver.
        const HALF_CYCLE_SUBTRACTED = 0x80;
    }
}

impl Default for LliFlags {
    fn default() -> Self {
        Self::empty()
    }
}

impl LliFlags {
    /// Bits that are actually written to the RINEX output.
    pub fn wire_bits(&self) -> u8 {
        self.bits() & 0x07
    }
}

/// One carrier slot of one satellite at one epoch.
/// Zero-valued measurements mean "not observed".
#[derive(Debug, Default, Copy, Clone)]
pub struct SignalBand {
    /// Observation code tracked on this slot.
    pub code: Option<Code>,

    /// Pseudo range [m]
    pub pseudorange: f64,

    /// Carrier phase [cycles]
    pub phase: f64,

    /// Doppler shift [Hz]
    pub doppler: f64,

    /// Signal strength [dB-Hz]
    pub snr: f64,

    /// Loss-of-lock indication for the carrier phase.
    pub lli: LliFlags,
}

/// All carrier slots of one satellite at one epoch.
#[derive(Debug, Clone)]
pub struct ObsData {
    pub time: Epoch,
    pub sv: SV,
    pub bands: [SignalBand; NUM_BANDS],
}

impl ObsData {
    pub fn new(time: Epoch, sv: SV) -> Self {
        Self {
            time,
            sv,
            bands: Default::default(),
        }
    }
}

/// Epoch sanity flag, or event marker, RINEX convention.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub enum EpochFlag {
    /// Epoch is sane
    #[default]
    Ok,
    /// Power failure since previous epoch
    PowerFailure,
    /// Antenna is being moved at current epoch
    AntennaBeingMoved,
    /// Site has changed, receiver has moved since last epoch
    NewSiteOccupation,
    /// New header information follows
    HeaderInformationFollows,
    /// Significant external event at this epoch
    ExternalEvent,
    /// Cycle slip at this epoch
    CycleSlip,
}

impl EpochFlag {
    pub fn digit(&self) -> u8 {
        match self {
            Self::Ok => 0,
            Self::PowerFailure => 1,
            Self::AntennaBeingMoved => 2,
            Self::NewSiteOccupation => 3,
            Self::HeaderInformationFollows => 4,
            Self::ExternalEvent => 5,
            Self::CycleSlip => 6,
        }
    }

    pub fn from_digit(digit: u8) -> Option<Self> {
        match digit {
            0 => Some(Self::Ok),
            1 => Some(Self::PowerFailure),
            2 => Some(Self::AntennaBeingMoved),
            3 => Some(Self::NewSiteOccupation),
            4 => Some(Self::HeaderInformationFollows),
            5 => Some(Self::ExternalEvent),
            6 => Some(Self::CycleSlip),
            _ => None,
        }
    }

    /// Flags 2..5 are RINEX event markers, not observation epochs.
    pub fn is_event(&self) -> bool {
        matches!(
            self,
            Self::AntennaBeingMoved
                | Self::NewSiteOccupation
                | Self::HeaderInformationFollows
                | Self::ExternalEvent
        )
    }
}

impl std::fmt::Display for EpochFlag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.digit())
    }
}

/// One decoded observation epoch.
#[derive(Debug, Clone)]
pub struct EpochData {
    pub time: Epoch,
    pub flag: EpochFlag,

    /// Station identifier; zero for raw receiver formats.
    pub station_id: u32,

    pub observations: Vec<ObsData>,
}

impl EpochData {
    pub fn new(time: Epoch) -> Self {
        Self {
            time,
            flag: EpochFlag::Ok,
            station_id: 0,
            observations: Vec::new(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn lli_wire_bits_strip_resolution_markers() {
        let lli = LliFlags::SLIP | LliFlags::HALF_CYCLE_ADDED;
        assert_eq!(lli.wire_bits(), 0x01);

        let lli = LliFlags::HALF_CYCLE | LliFlags::BOC_TRACKING;
        assert_eq!(lli.wire_bits(), 0x06);
    }

    #[test]
    fn epoch_flag_digits() {
        for digit in 0..=6 {
            let flag = EpochFlag::from_digit(digit).unwrap();
            assert_eq!(flag.digit(), digit);
        }
        assert!(EpochFlag::from_digit(7).is_none());
        assert!(EpochFlag::ExternalEvent.is_event());
        assert!(!EpochFlag::PowerFailure.is_event());
    }
}

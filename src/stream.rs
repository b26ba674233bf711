//! The stream-file façade: one uniform record source over any decoder
//! back-end, carrying the per-session trackers.

use std::collections::HashSet;
use std::path::Path;

use log::debug;

use gnss::prelude::SV;
use hifitime::prelude::Epoch;

use crate::{
    ephemeris::{EphFrame, IonUtc, NavCache, SbasMessage},
    errors::Error,
    halfcycle::HalfCycleTracker,
    observation::EpochData,
    station::{StationInfo, StationList},
};

/// One decoder read outcome, the §6.1 contract shape.
#[derive(Debug, Clone)]
pub enum DecoderEvent {
    /// End of stream.
    Eof,
    /// A message failed to decode; the stream goes on.
    Error,
    /// Bytes consumed, no complete message yet.
    NoMessage,
    Obs(EpochData),
    Eph(EphFrame),
    Sbas(SbasMessage),
    Station { staid: u32, info: StationInfo },
    IonUtc(IonUtc),
}

/// Decoder back-end contract. Implementations must be reusable across
/// `open` calls and reset any bitstream continuation state on `open`:
/// the engine reads every file twice.
pub trait StreamDecoder {
    fn open(&mut self, path: &Path) -> Result<(), Error>;

    fn close(&mut self);

    fn next(&mut self) -> DecoderEvent;

    /// Approximate reference time, needed by wire formats that only
    /// carry time of week.
    fn set_reference_time(&mut self, _t: Epoch) {}
}

/// Record source over one decoder back-end plus the per-session state
/// the conversion passes share: station history, half-cycle intervals,
/// sticky slips and the navigation cache.
pub struct StreamFile {
    decoder: Box<dyn StreamDecoder>,

    /// Time of the last decoded observation.
    pub time: Option<Epoch>,

    /// First observation timestamp ever decoded.
    pub tstart: Option<Epoch>,

    /// Current station id; stays zero for raw receiver formats.
    pub staid: u32,

    pub stations: StationList,
    pub halfcyc: HalfCycleTracker,

    /// Slips latched while epochs are screened out, per (sat, slot).
    pub slips: HashSet<(SV, usize)>,

    pub nav: NavCache,
    pub ionutc: Option<IonUtc>,

    /// Latest station snapshot, regardless of station id.
    pub live_sta: StationInfo,
}

impl StreamFile {
    pub fn new(decoder: Box<dyn StreamDecoder>) -> Self {
        Self {
            decoder,
            time: None,
            tstart: None,
            staid: 0,
            stations: StationList::default(),
            halfcyc: HalfCycleTracker::default(),
            slips: HashSet::new(),
            nav: NavCache::default(),
            ionutc: None,
            live_sta: StationInfo::default(),
        }
    }

    pub fn set_reference_time(&mut self, t: Epoch) {
        self.decoder.set_reference_time(t);
    }

    pub fn open(&mut self, path: &Path) -> Result<(), Error> {
        debug!("opening {}", path.display());
        self.decoder.open(path)
    }

    pub fn close(&mut self) {
        self.decoder.close();
    }

    /// Reads the next record, maintaining the station history, the
    /// navigation cache and the time latches. Re-broadcast ephemerides
    /// surface as [DecoderEvent::NoMessage].
    pub fn read(&mut self) -> DecoderEvent {
        let event = self.decoder.next();

        match event {
            DecoderEvent::Obs(epoch) => {
                self.time = Some(epoch.time);
                if self.tstart.is_none() {
                    self.tstart = Some(epoch.time);
                }

                self.staid = epoch.station_id;
                self.stations.update(epoch.station_id, epoch.time);

                DecoderEvent::Obs(epoch)
            },
            DecoderEvent::Eph(frame) => {
                if self.nav.accept(&frame) {
                    DecoderEvent::Eph(frame)
                } else {
                    DecoderEvent::NoMessage
                }
            },
            DecoderEvent::Station { staid, info } => {
                self.staid = staid;
                self.live_sta = info.clone();
                self.stations.update_info(staid, &info);

                DecoderEvent::Station { staid, info }
            },
            DecoderEvent::IonUtc(ionutc) => {
                self.ionutc = Some(ionutc.clone());
                DecoderEvent::IonUtc(ionutc)
            },
            other => other,
        }
    }

}

#[cfg(test)]
mod test {
    use super::*;
    use std::str::FromStr;

    struct Scripted {
        events: Vec<DecoderEvent>,
        cursor: usize,
    }

    impl StreamDecoder for Scripted {
        fn open(&mut self, _path: &Path) -> Result<(), Error> {
            self.cursor = 0;
            Ok(())
        }

        fn close(&mut self) {}

        fn next(&mut self) -> DecoderEvent {
            let event = self
                .events
                .get(self.cursor)
                .cloned()
                .unwrap_or(DecoderEvent::Eof);
            self.cursor += 1;
            event
        }
    }

    #[test]
    fn tstart_latches_on_first_obs() {
        let t0 = Epoch::from_str("2020-01-01T00:00:00 GPST").unwrap();
        let t1 = Epoch::from_str("2020-01-01T00:00:30 GPST").unwrap();

        let mut first = EpochData::new(t0);
        first.station_id = 5;
        let mut second = EpochData::new(t1);
        second.station_id = 5;

        let mut stream = StreamFile::new(Box::new(Scripted {
            events: vec![DecoderEvent::Obs(first), DecoderEvent::Obs(second)],
            cursor: 0,
        }));

        stream.open(Path::new("scripted")).unwrap();

        assert!(matches!(stream.read(), DecoderEvent::Obs(_)));
        assert!(matches!(stream.read(), DecoderEvent::Obs(_)));
        assert!(matches!(stream.read(), DecoderEvent::Eof));

        assert_eq!(stream.tstart, Some(t0));
        assert_eq!(stream.time, Some(t1));
        assert_eq!(stream.staid, 5);
        assert_eq!(stream.stations.len(), 1);
    }
}

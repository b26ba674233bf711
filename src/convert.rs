//! The convert pass: epoch pipeline, navigation routing, SBAS handling.

use log::{debug, warn};

use gnss::prelude::{Constellation, SV};
use hifitime::prelude::{Epoch, TimeScale};

use crate::{
    codes::{self, SYS_SBS},
    constants::max_dtoe,
    ephemeris::{EphFrame, SbasMessage},
    errors::FormattingError,
    observation::{EpochData, EpochFlag, LliFlags},
    options::ConvOptions,
    rinex::{nav, obs, sbas},
    screen::{DupCursor, TimeScreen},
    session::{OutputSet, PointPositioner, SLOT_OBS, SLOT_SBAS},
    stream::StreamFile,
};

/// SBAS PRN numbering ranges.
const SBAS_PRN_RANGE: std::ops::RangeInclusive<u8> = 120..=158;
const QZS_L1S_PRN_RANGE: std::ops::RangeInclusive<u8> = 183..=191;
const QZS_L1S_PRN_OFFSET: u8 = 10;

/// Per-session convert-pass state.
pub struct ConvertPass<'a> {
    screen: TimeScreen,
    obs_cursor: DupCursor,
    sbas_cursor: DupCursor,

    /// Station of the previous emitted epoch; None before the first.
    staid_prev: Option<u32>,

    positioner: Option<&'a dyn PointPositioner>,

    /// External events seen (epoch flag 5).
    pub events: usize,
}

impl<'a> ConvertPass<'a> {
    pub fn new(screen: TimeScreen, positioner: Option<&'a dyn PointPositioner>) -> Self {
        Self {
            screen,
            obs_cursor: DupCursor::default(),
            sbas_cursor: DupCursor::default(),
            staid_prev: None,
            positioner,
            events: 0,
        }
    }

    /// One observation epoch. The step order is contractual: slips are
    /// latched before screening so none is lost across skipped epochs,
    /// and half-cycle fixes land after the station transition handling.
    pub fn on_obs(
        &mut self,
        opt: &mut ConvOptions,
        stream: &mut StreamFile,
        out: &mut OutputSet,
        mut epoch: EpochData,
    ) -> Result<(), FormattingError> {
        if epoch.observations.is_empty() || !out.has(SLOT_OBS) {
            return Ok(());
        }

        let time = epoch.observations[0].time;
        let ttol = opt.ttol();

        if self.obs_cursor.is_duplicate(time, ttol) {
            return Ok(());
        }

        // latch slips
        for obs in epoch.observations.iter() {
            for (slot, band) in obs.bands.iter().enumerate() {
                if band.lli.contains(LliFlags::SLIP) {
                    stream.slips.insert((obs.sv, slot));
                }
            }
        }

        if !self.screen.accepts(time) {
            return Ok(());
        }

        // restore slips latched across skipped epochs
        for obs in epoch.observations.iter_mut() {
            for (slot, band) in obs.bands.iter_mut().enumerate() {
                if band.phase != 0.0 && stream.slips.remove(&(obs.sv, slot)) {
                    band.lli.insert(LliFlags::SLIP);
                }
            }
        }

        // station transition
        if self.staid_prev != Some(epoch.station_id) {
            if let Some(previous) = self.staid_prev {
                debug!("station transition {} -> {}", previous, epoch.station_id);

                let info = stream
                    .stations
                    .find(previous)
                    .map(|node| node.info.clone())
                    .unwrap_or_default();

                if let Some(w) = out.writer(SLOT_OBS) {
                    obs::write_new_site(w, opt.rnxver, previous, &info)?;
                }

                // phase continuity cannot be assumed across stations
                for obs in epoch.observations.iter_mut() {
                    for band in obs.bands.iter_mut() {
                        if band.phase != 0.0 {
                            band.lli.insert(LliFlags::SLIP);
                        }
                    }
                }
            }
            self.staid_prev = Some(epoch.station_id);
        }

        if opt.halfcyc {
            for obs in epoch.observations.iter_mut() {
                stream.halfcyc.resolve(obs);
            }
        }

        if opt.autopos && opt.approx_position.is_none() {
            if let Some(positioner) = self.positioner {
                opt.approx_position = positioner.solve(&epoch);
            }
        }

        if let Some(w) = out.writer(SLOT_OBS) {
            if obs::write_epoch(w, opt, &epoch)? > 0 {
                out.mark(SLOT_OBS);
            }
        }

        if epoch.flag == EpochFlag::ExternalEvent {
            self.events += 1;
        }
        epoch.flag = EpochFlag::Ok;

        if opt.tstart.is_none() {
            opt.tstart = Some(time);
        }
        opt.tend = Some(time);

        self.obs_cursor.advance(time);
        Ok(())
    }

    /// One decoded ephemeris, routed per system and nav-file policy.
    pub fn on_eph(
        &mut self,
        opt: &ConvOptions,
        out: &mut OutputSet,
        frame: &EphFrame,
    ) -> Result<(), FormattingError> {
        let sv = frame.sv();

        let Some(sys) = codes::system_index(sv.constellation) else {
            return Ok(());
        };

        if !opt.navsys.has_system(sys) || opt.is_excluded(sv) {
            return Ok(());
        }

        if !self
            .screen
            .accepts_windowed(frame.time(), max_dtoe(sv.constellation))
        {
            return Ok(());
        }

        let slot = route_nav(sys, opt.rnxver, opt.sep_nav);

        let Some(w) = out.writer(slot) else {
            return Ok(());
        };

        match frame {
            EphFrame::Kepler(eph) => nav::write_eph(w, opt.rnxver, eph)?,
            EphFrame::Glonass(geph) => nav::write_geph(w, opt.rnxver, geph)?,
            EphFrame::Sbas(seph) => nav::write_seph(w, opt.rnxver, seph)?,
        }

        out.mark(slot);
        Ok(())
    }

    /// One raw SBAS frame: logged, and its long-term-correction
    /// ephemeris dispatched when one completed.
    pub fn on_sbas(
        &mut self,
        opt: &ConvOptions,
        out: &mut OutputSet,
        message: &SbasMessage,
    ) -> Result<(), FormattingError> {
        let tow_nanos = (message.tow * 1.0E9).round() as u64;
        let time = Epoch::from_time_of_week(message.week, tow_nanos, TimeScale::GPST);

        let ttol = opt.ttol();

        if !self.screen.accepts_windowed(time, ttol) {
            return Ok(());
        }

        if self.sbas_cursor.is_duplicate(time, ttol) {
            return Ok(());
        }

        let (constellation, prn) = if SBAS_PRN_RANGE.contains(&message.prn) {
            (Constellation::SBAS, message.prn)
        } else if QZS_L1S_PRN_RANGE.contains(&message.prn) {
            (Constellation::QZSS, message.prn + QZS_L1S_PRN_OFFSET)
        } else {
            warn!("{} - unsupported sbas prn {}", time, message.prn);
            return Ok(());
        };

        if opt.is_excluded(SV::new(constellation, prn)) {
            return Ok(());
        }

        if let Some(w) = out.writer(SLOT_SBAS) {
            sbas::write_message(w, message)?;
            out.mark(SLOT_SBAS);
            self.sbas_cursor.advance(time);
        }

        if opt.navsys.has_system(SYS_SBS) {
            if let Some(seph) = &message.lt_ephemeris {
                self.on_eph(opt, out, &EphFrame::Sbas(seph.clone()))?;
            }
        }

        Ok(())
    }
}

/// Output slot of one system's navigation records. Old revisions
/// cannot mix systems in one file, so they always separate.
pub fn route_nav(sys: usize, rnxver: u16, sep_nav: bool) -> usize {
    use crate::codes::{SYS_BDS, SYS_GAL, SYS_GLO, SYS_IRN, SYS_QZS};

    let separated = rnxver < 300 || sep_nav;
    if !separated {
        return 1;
    }

    match sys {
        SYS_GLO => 2,
        SYS_SBS => 3,
        SYS_QZS => 4,
        SYS_GAL => 5,
        SYS_BDS => 6,
        SYS_IRN => 7,
        _ => 1,
    }
}

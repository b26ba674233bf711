//! Session driver: the two-pass scan/convert loop, session splitting
//! and the output file set lifecycle.

use std::fs;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use log::{info, warn};

use hifitime::prelude::Epoch;

use crate::{
    constants::{NUM_OUTPUTS, gpst_seconds},
    convert::ConvertPass,
    errors::Error,
    fd::FileDescriptor,
    observation::EpochData,
    options::ConvOptions,
    path as path_keywords,
    rinex::{HeaderContext, nav, obs},
    scan::CodeScanner,
    screen::TimeScreen,
    stream::{DecoderEvent, StreamDecoder, StreamFile},
};

pub const SLOT_OBS: usize = 0;
pub const SLOT_SBAS: usize = 8;

/// Records between two abort checks.
const ABORT_CHECK_PERIOD: usize = 11;

/// Status/abort sink: each report may request a cooperative stop by
/// returning true.
pub trait StatusSink {
    fn report(&mut self, line: &str) -> bool;
}

/// Routes status lines to the log, never aborts.
#[derive(Debug, Default)]
pub struct LogSink;

impl StatusSink for LogSink {
    fn report(&mut self, line: &str) -> bool {
        info!("{}", line);
        false
    }
}

/// External single-epoch position estimator, used when `autopos` is
/// requested.
pub trait PointPositioner {
    fn solve(&self, epoch: &EpochData) -> Option<[f64; 3]>;
}

/// Builds one decoder back-end per session.
pub trait DecoderFactory {
    fn format_name(&self) -> &str;
    fn create(&self) -> Box<dyn StreamDecoder>;
}

/// The nine output paths; None or empty suppresses a slot.
pub type OutputPaths = [Option<String>; NUM_OUTPUTS];

#[derive(Debug, Clone)]
pub struct SessionSummary {
    /// Session index: 0 for a single session, 1.. for windows.
    pub index: usize,
    pub window: (Option<Epoch>, Option<Epoch>),
    /// Emitted records per output slot.
    pub counts: [usize; NUM_OUTPUTS],
    pub errors: usize,
    pub events: usize,
}

struct OutFile {
    path: PathBuf,
    writer: Option<BufWriter<FileDescriptor>>,
    count: usize,
}

/// The per-session output files. Headers are written on creation and
/// rewritten with the final inventory on close; files that received no
/// record are removed.
pub struct OutputSet {
    files: [Option<OutFile>; NUM_OUTPUTS],
    gzip: bool,
}

impl OutputSet {
    pub fn create(
        paths: &OutputPaths,
        ctx: &HeaderContext,
        gzip: bool,
    ) -> Result<Self, Error> {
        let mut set = Self {
            files: std::array::from_fn(|_| None),
            gzip,
        };

        for (slot, path) in paths.iter().enumerate() {
            let Some(path) = path else {
                continue;
            };
            if path.is_empty() {
                continue;
            }

            match set.open_slot(slot, Path::new(path), ctx) {
                Ok(()) => {},
                Err(e) => {
                    // roll back whatever is already on disk
                    set.rollback();
                    return Err(e);
                },
            }
        }

        Ok(set)
    }

    fn open_slot(&mut self, slot: usize, path: &Path, ctx: &HeaderContext) -> Result<(), Error> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| Error::Open {
                    path: path.display().to_string(),
                    reason: e.to_string(),
                })?;
            }
        }

        let fd = FileDescriptor::create(self.gzip, path)?;
        let mut writer = BufWriter::new(fd);

        write_slot_header(&mut writer, slot, ctx)?;

        self.files[slot] = Some(OutFile {
            path: path.to_path_buf(),
            writer: Some(writer),
            count: 0,
        });

        Ok(())
    }

    fn rollback(&mut self) {
        for file in self.files.iter_mut().filter_map(|f| f.take()) {
            drop(file.writer);
            let _ = fs::remove_file(&file.path);
        }
    }

    pub fn has(&self, slot: usize) -> bool {
        self.files[slot].is_some()
    }

    pub fn writer(&mut self, slot: usize) -> Option<&mut BufWriter<FileDescriptor>> {
        self.files[slot].as_mut().and_then(|f| f.writer.as_mut())
    }

    pub fn mark(&mut self, slot: usize) {
        if let Some(file) = self.files[slot].as_mut() {
            file.count += 1;
        }
    }

    pub fn counts(&self) -> [usize; NUM_OUTPUTS] {
        std::array::from_fn(|slot| {
            self.files[slot].as_ref().map(|f| f.count).unwrap_or(0)
        })
    }

    /// Flushes everything, rewrites final headers, removes outputs that
    /// stayed empty.
    pub fn close(mut self, ctx: &HeaderContext) -> Result<[usize; NUM_OUTPUTS], Error> {
        let counts = self.counts();

        for (slot, file) in self.files.iter_mut().enumerate() {
            let Some(file) = file.take() else {
                continue;
            };

            if let Some(writer) = file.writer {
                let fd = writer
                    .into_inner()
                    .map_err(|e| Error::StdioError(e.into_error()))?;
                fd.finish()?;
            }

            if file.count == 0 {
                let _ = fs::remove_file(&file.path);
                continue;
            }

            // gzip streams cannot rewind; their header stays as written
            if !self.gzip && slot != SLOT_SBAS {
                rewrite_header(&file.path, slot, ctx)?;
            }
        }

        Ok(counts)
    }
}

fn write_slot_header(
    writer: &mut BufWriter<FileDescriptor>,
    slot: usize,
    ctx: &HeaderContext,
) -> Result<(), Error> {
    match slot {
        SLOT_OBS => obs::write_header(writer, ctx)?,
        SLOT_SBAS => {},
        slot => nav::write_header(writer, ctx, slot)?,
    }
    Ok(())
}

/// Replaces the header of a finished file with its final version.
fn rewrite_header(path: &Path, slot: usize, ctx: &HeaderContext) -> Result<(), Error> {
    let content = fs::read_to_string(path)?;

    let Some(marker) = content.find("END OF HEADER") else {
        return Ok(());
    };
    let body_start = content[marker..]
        .find('\n')
        .map(|offset| marker + offset + 1)
        .unwrap_or(content.len());

    let mut buffer = BufWriter::new(Vec::new());
    match slot {
        SLOT_OBS => obs::write_header(&mut buffer, ctx)?,
        SLOT_SBAS => return Ok(()),
        slot => nav::write_header(&mut buffer, ctx, slot)?,
    }

    let header = buffer
        .into_inner()
        .map_err(|e| Error::StdioError(e.into_error()))?;
    let mut replaced = String::from_utf8(header).unwrap_or_default();
    replaced.push_str(&content[body_start..]);

    fs::write(path, replaced)?;
    Ok(())
}

/// The conversion driver: splits the requested time span into
/// sessions and runs the scan then convert pass on each.
pub struct Converter<'a> {
    pub opt: ConvOptions,
    factory: &'a dyn DecoderFactory,
    sink: &'a mut dyn StatusSink,
    positioner: Option<&'a dyn PointPositioner>,
}

impl<'a> Converter<'a> {
    pub fn new(
        opt: ConvOptions,
        factory: &'a dyn DecoderFactory,
        sink: &'a mut dyn StatusSink,
    ) -> Self {
        Self {
            opt,
            factory,
            sink,
            positioner: None,
        }
    }

    pub fn with_positioner(mut self, positioner: &'a dyn PointPositioner) -> Self {
        self.positioner = Some(positioner);
        self
    }

    /// Runs every session. Stops on the first failing one; an abort
    /// request surfaces as [Error::Aborted].
    pub fn run(
        &mut self,
        inputs: &[String],
        outputs: &OutputPaths,
    ) -> Result<Vec<SessionSummary>, Error> {
        if inputs.is_empty() {
            return Err(Error::Config("no input file".to_string()));
        }

        if let (Some(ts), Some(te)) = (self.opt.ts, self.opt.te) {
            if ts > te {
                return Err(Error::Config("inverted time window".to_string()));
            }
        }

        if let Some(tunit) = self.opt.tunit {
            if tunit <= 0.0 {
                return Err(Error::Config("invalid session unit".to_string()));
            }
        }

        self.opt.apply_version_gate();

        let sessions = self.sessions();
        let caller_comments = self.opt.comments.len();

        let mut summaries = Vec::with_capacity(sessions.len());

        for (index, (ts, te)) in sessions.into_iter() {
            let mut opt = self.opt.clone();
            opt.ts = ts;
            opt.te = te;
            opt.tstart = None;
            opt.tend = None;

            let summary = self.run_session(index, &mut opt, inputs, outputs)?;

            // only time bounds, type lists and comments flow back
            self.opt.tstart = opt.tstart;
            self.opt.tend = opt.tend;
            self.opt.tobs = opt.tobs.clone();
            opt.comments.truncate(caller_comments);
            self.opt.comments = opt.comments;

            summaries.push(summary);
        }

        Ok(summaries)
    }

    /// Session windows: a single open session, or the aligned slices of
    /// the multi-session split.
    fn sessions(&self) -> Vec<(usize, (Option<Epoch>, Option<Epoch>))> {
        let (Some(ts), Some(te), Some(tunit)) = (self.opt.ts, self.opt.te, self.opt.tunit) else {
            return vec![(0, (self.opt.ts, self.opt.te))];
        };

        let unit = tunit.min(86400.0);
        let ttol = self.opt.ttol();

        let ts_seconds = gpst_seconds(ts);
        let te_seconds = gpst_seconds(te);
        let aligned = (ts_seconds / unit).floor() * unit;

        let mut windows = Vec::new();
        let mut index = 1;
        let mut start = aligned;

        while start < te_seconds {
            let window_start = Epoch::from_gpst_seconds(start.max(ts_seconds));
            let window_end = if start + unit >= te_seconds {
                te
            } else {
                // keep adjacent windows disjoint
                Epoch::from_gpst_seconds(start + unit) - hifitime::prelude::Duration::from_seconds(ttol)
            };

            windows.push((index, (Some(window_start), Some(window_end))));
            index += 1;
            start += unit;
        }

        windows
    }

    fn run_session(
        &mut self,
        index: usize,
        opt: &mut ConvOptions,
        inputs: &[String],
        outputs: &OutputPaths,
    ) -> Result<SessionSummary, Error> {
        // input path expansion
        let mut files = Vec::new();
        for input in inputs.iter() {
            let expanded = path_keywords::expand_keywords(input, opt.ts, &opt.staid)?;
            let mut matches = path_keywords::expand_wildcards(&expanded);
            if matches.is_empty() {
                warn!("no file matching {}", expanded);
            }
            files.append(&mut matches);
        }

        if files.is_empty() {
            return Err(Error::Config("no input file".to_string()));
        }

        let mut stream = StreamFile::new(self.factory.create());
        if let Some(t) = opt.rtcm_reference {
            stream.set_reference_time(t);
        }
        stream.nav.seed_fcn(&opt.glo_fcn);

        // scan pass
        let mut scanner = CodeScanner::default();
        let mut produced = vec![false; files.len()];
        let mut records = 0usize;

        for (nth, file) in files.iter().enumerate() {
            if let Err(e) = stream.open(Path::new(file)) {
                warn!("{}", e);
                continue;
            }

            loop {
                match stream.read() {
                    DecoderEvent::Eof => break,
                    DecoderEvent::NoMessage | DecoderEvent::Error => continue,
                    DecoderEvent::Obs(epoch) => {
                        scanner.update(&epoch);
                        if opt.halfcyc {
                            for obs in epoch.observations.iter() {
                                stream.halfcyc.update(obs);
                            }
                        }
                        produced[nth] = true;
                    },
                    _ => {
                        produced[nth] = true;
                    },
                }

                records += 1;
                if records % ABORT_CHECK_PERIOD == 0
                    && self.sink.report(&format!("scanning: {} records", records))
                {
                    stream.close();
                    return Err(Error::Aborted);
                }
            }

            stream.close();
        }

        scanner.sort();

        opt.push_comment(format!("format: {}", self.factory.format_name()));
        for (nth, file) in files.iter().enumerate() {
            if produced[nth] {
                opt.push_comment(format!("log: {}", file));
            }
        }

        opt.populate_obs_types(&scanner);
        opt.inject_station(&stream.stations, &stream.live_sta);
        opt.assign_phase_shifts();
        stream.nav.clear_signatures();

        // output path expansion, collision avoidance
        let reference = opt.ts.or(stream.tstart);
        let mut paths: OutputPaths = std::array::from_fn(|_| None);

        for (slot, output) in outputs.iter().enumerate() {
            let Some(output) = output else {
                continue;
            };
            if output.is_empty() {
                continue;
            }

            let mut expanded = path_keywords::expand_keywords(output, reference, &opt.staid)?;
            if files.iter().any(|input| *input == expanded) {
                expanded.push('_');
            }
            paths[slot] = Some(expanded);
        }

        let gzip = opt.gzip;
        let ctx = HeaderContext {
            opt,
            glo_fcn: &stream.nav.glo_fcn,
            ionutc: stream.ionutc.as_ref(),
            tstart: stream.tstart,
            tend: None,
        };

        let mut out = OutputSet::create(&paths, &ctx, gzip)?;

        // convert pass
        let screen = TimeScreen::new(opt.ts, opt.te, opt.tint, opt.ttol());
        let mut pass = ConvertPass::new(screen, self.positioner);
        let mut errors = 0usize;

        for (nth, file) in files.iter().enumerate() {
            if !produced[nth] {
                continue;
            }

            if let Err(e) = stream.open(Path::new(file)) {
                warn!("{}", e);
                continue;
            }

            loop {
                match stream.read() {
                    DecoderEvent::Eof => break,
                    DecoderEvent::Error => errors += 1,
                    DecoderEvent::NoMessage => continue,
                    DecoderEvent::Obs(epoch) => {
                        pass.on_obs(opt, &mut stream, &mut out, epoch)?;
                    },
                    DecoderEvent::Eph(frame) => {
                        pass.on_eph(opt, &mut out, &frame)?;
                    },
                    DecoderEvent::Sbas(message) => {
                        pass.on_sbas(opt, &mut out, &message)?;
                    },
                    DecoderEvent::Station { .. } | DecoderEvent::IonUtc(_) => {},
                }

                records += 1;
                if records % ABORT_CHECK_PERIOD == 0
                    && self
                        .sink
                        .report(&format!("converting: {} records", records))
                {
                    stream.close();
                    let final_ctx = HeaderContext {
                        opt,
                        glo_fcn: &stream.nav.glo_fcn,
                        ionutc: stream.ionutc.as_ref(),
                        tstart: opt.tstart.or(stream.tstart),
                        tend: opt.tend,
                    };
                    let _ = out.close(&final_ctx);
                    return Err(Error::Aborted);
                }
            }

            stream.close();
        }

        let events = pass.events;
        drop(pass);

        let final_ctx = HeaderContext {
            opt,
            glo_fcn: &stream.nav.glo_fcn,
            ionutc: stream.ionutc.as_ref(),
            tstart: opt.tstart.or(stream.tstart),
            tend: opt.tend,
        };
        let counts = out.close(&final_ctx)?;

        self.sink.report(&format!(
            "session {}: obs={} nav={} sbas={} errors={} events={}",
            index,
            counts[SLOT_OBS],
            counts[1..SLOT_SBAS].iter().sum::<usize>(),
            counts[SLOT_SBAS],
            errors,
            events,
        ));

        Ok(SessionSummary {
            index,
            window: (opt.ts, opt.te),
            counts,
            errors,
            events,
        })
    }
}

//! End-to-end conversion scenarios, driven by a scripted decoder.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use gnss2rinex::prelude::*;

/// Scripted decoder back-end: events keyed by pseudo file path.
#[derive(Default)]
struct ScriptedDecoder {
    scripts: Arc<HashMap<String, Vec<DecoderEvent>>>,
    events: Vec<DecoderEvent>,
    cursor: usize,
}

impl StreamDecoder for ScriptedDecoder {
    fn open(&mut self, path: &Path) -> Result<(), Error> {
        let key = path.display().to_string();
        self.events = self
            .scripts
            .get(&key)
            .cloned()
            .ok_or_else(|| Error::Open {
                path: key,
                reason: "no such script".to_string(),
            })?;
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

struct ScriptedFactory {
    scripts: Arc<HashMap<String, Vec<DecoderEvent>>>,
}

impl ScriptedFactory {
    fn new(scripts: HashMap<String, Vec<DecoderEvent>>) -> Self {
        Self {
            scripts: Arc::new(scripts),
        }
    }
}

impl DecoderFactory for ScriptedFactory {
    fn format_name(&self) -> &str {
        "SCRIPTED"
    }

    fn create(&self) -> Box<dyn StreamDecoder> {
        Box::new(ScriptedDecoder {
            scripts: self.scripts.clone(),
            events: Vec::new(),
            cursor: 0,
        })
    }
}

struct Silent;

impl StatusSink for Silent {
    fn report(&mut self, _line: &str) -> bool {
        false
    }
}

/// Sink that requests an abort at the first opportunity.
struct AbortEarly;

impl StatusSink for AbortEarly {
    fn report(&mut self, _line: &str) -> bool {
        true
    }
}

fn t(s: &str) -> Epoch {
    Epoch::from_str(s).unwrap()
}

fn workspace(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join("gnss2rinex-tests").join(name);
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).unwrap();
    dir
}

struct Band<'a> {
    code: &'a str,
    pseudorange: f64,
    phase: f64,
    doppler: f64,
    snr: f64,
    lli: LliFlags,
}

impl<'a> Band<'a> {
    fn full(code: &'a str) -> Self {
        Self {
            code,
            pseudorange: 2.2E7,
            phase: 1.16E8,
            doppler: 500.0,
            snr: 45.0,
            lli: LliFlags::empty(),
        }
    }

    fn phase_only(code: &'a str, phase: f64, lli: LliFlags) -> Self {
        Self {
            code,
            pseudorange: 2.2E7,
            phase,
            doppler: 0.0,
            snr: 0.0,
            lli,
        }
    }
}

fn observation(time: Epoch, sv: SV, bands: &[Band]) -> ObsData {
    let mut obs = ObsData::new(time, sv);
    for (slot, band) in bands.iter().enumerate() {
        obs.bands[slot].code = Code::from_mnemonic(band.code);
        obs.bands[slot].pseudorange = band.pseudorange;
        obs.bands[slot].phase = band.phase;
        obs.bands[slot].doppler = band.doppler;
        obs.bands[slot].snr = band.snr;
        obs.bands[slot].lli = band.lli;
    }
    obs
}

fn epoch(time: Epoch, station_id: u32, observations: Vec<ObsData>) -> DecoderEvent {
    let mut epoch = EpochData::new(time);
    epoch.station_id = station_id;
    epoch.observations = observations;
    DecoderEvent::Obs(epoch)
}

fn gps_eph(prn: u8, toc: Epoch) -> DecoderEvent {
    let (week, tow_nanos) = toc.to_time_of_week();

    DecoderEvent::Eph(EphFrame::Kepler(Eph {
        sv: SV::new(Constellation::GPS, prn),
        set: 0,
        iode: 17,
        iodc: 17,
        sva: 2.0,
        svh: 0.0,
        week,
        code: 1.0,
        flag: 0.0,
        toe: toc,
        toc,
        ttr: toc,
        a: 5153.6123_f64 * 5153.6123_f64,
        e: 0.01,
        i0: 0.95,
        omg0: 1.0,
        omg: -2.0,
        m0: 0.5,
        deln: 4.0E-9,
        omgd: -8.0E-9,
        idot: 1.0E-10,
        crc: 200.0,
        crs: -50.0,
        cuc: 1.0E-6,
        cus: 2.0E-6,
        cic: -1.0E-7,
        cis: 1.0E-7,
        toes: tow_nanos as f64 * 1.0E-9,
        fit: 4.0,
        f0: 1.0E-4,
        f1: -2.0E-12,
        f2: 0.0,
        tgd: [-1.0E-8, 0.0, 0.0, 0.0],
    }))
}

fn glo_geph(slot: u8, frq: i8, toe: Epoch) -> DecoderEvent {
    DecoderEvent::Eph(EphFrame::Glonass(Geph {
        sv: SV::new(Constellation::Glonass, slot),
        iode: 40,
        frq,
        svh: 0.0,
        sva: 0.0,
        age: 0.0,
        toe,
        tof: toe,
        pos: [12.0E6, -8.0E6, 20.0E6],
        vel: [1000.0, 2000.0, -500.0],
        acc: [0.0; 3],
        taun: 1.0E-5,
        gamn: 0.0,
        dtaun: 0.0,
    }))
}

fn run(
    scripts: HashMap<String, Vec<DecoderEvent>>,
    opt: ConvOptions,
    inputs: &[&str],
    outputs: OutputPaths,
) -> (ConvOptions, Vec<SessionSummary>) {
    let factory = ScriptedFactory::new(scripts);
    let mut sink = Silent;

    let mut converter = Converter::new(opt, &factory, &mut sink);
    let inputs: Vec<String> = inputs.iter().map(|s| s.to_string()).collect();

    let summaries = converter.run(&inputs, &outputs).unwrap();
    (converter.opt.clone(), summaries)
}

fn obs_only(path: &Path) -> OutputPaths {
    let mut outputs: OutputPaths = Default::default();
    outputs[0] = Some(path.display().to_string());
    outputs
}

fn body_of(content: &str) -> String {
    match content.find("END OF HEADER") {
        Some(marker) => {
            let offset = content[marker..].find('\n').unwrap();
            content[marker + offset + 1..].to_string()
        },
        None => content.to_string(),
    }
}

#[test]
fn combined_nav_with_mixed_systems() {
    // one RTCM-like station, GPS dual-frequency + GLONASS, combined
    // navigation file
    let t0 = t("2020-01-01T00:00:00 GPST");
    let t1 = t("2020-01-01T00:00:30 GPST");

    let g01 = SV::new(Constellation::GPS, 1);
    let g02 = SV::new(Constellation::GPS, 2);
    let r01 = SV::new(Constellation::Glonass, 1);
    let r02 = SV::new(Constellation::Glonass, 2);

    let events = vec![
        epoch(
            t0,
            123,
            vec![
                observation(t0, g01, &[Band::full("1C"), Band::full("2W")]),
                observation(t0, g02, &[Band::full("1C"), Band::full("2W")]),
                observation(t0, r01, &[Band::full("1C")]),
                observation(t0, r02, &[Band::full("1C")]),
            ],
        ),
        gps_eph(1, t("2020-01-01T02:00:00 GPST")),
        glo_geph(1, -4, t("2020-01-01T00:15:00 GPST")),
        epoch(
            t1,
            123,
            vec![
                observation(t1, g01, &[Band::full("1C"), Band::full("2W")]),
                observation(t1, r01, &[Band::full("1C")]),
            ],
        ),
    ];

    let dir = workspace("combined-nav");
    let obs_path = dir.join("out.obs");
    let nav_path = dir.join("out.nav");

    let mut outputs = obs_only(&obs_path);
    outputs[1] = Some(nav_path.display().to_string());

    let mut opt = ConvOptions::default();
    opt.navsys = SysMask::GPS | SysMask::GLO | SysMask::GAL;

    let mut scripts = HashMap::new();
    scripts.insert("rtcm.script".to_string(), events);

    let (_, summaries) = run(scripts, opt, &["rtcm.script"], outputs);

    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].counts[0], 2);
    assert_eq!(summaries[0].counts[1], 2);
    assert_eq!(summaries[0].errors, 0);

    let obs = fs::read_to_string(&obs_path).unwrap();

    // full inventory, slot-major then priority order
    assert!(obs.contains("G    8 C1C L1C D1C S1C C2W L2W D2W S2W"));
    assert!(obs.contains("R    4 C1C L1C D1C S1C"));

    // L2W is a reference signal: no phase shift declared for it
    assert!(!obs.contains("G L2W"));

    // harvested frequency channel
    assert!(obs.contains("  1 R01 -4"));

    // both epochs, station 123 never transitions: no event marker
    assert!(obs.contains("> 2020 01 01 00 00  0.0000000  0  4"));
    assert!(obs.contains("> 2020 01 01 00 00 30.0000000  0  2"));
    assert!(!obs.contains(&format!(">{:31}3", "")));

    let nav = fs::read_to_string(&nav_path).unwrap();
    let body = body_of(&nav);
    let lines: Vec<&str> = body.lines().collect();

    // one Kepler record (8 lines) followed by one GLONASS record (4)
    assert_eq!(lines.len(), 12);
    assert!(lines[0].starts_with("G01 2020 01 01 02 00 00"));
    assert!(lines[8].starts_with("R01 "));
}

#[test]
fn phase_shift_declared_for_shifted_signals() {
    let t0 = t("2020-01-01T00:00:00 GPST");
    let g01 = SV::new(Constellation::GPS, 1);

    let events = vec![epoch(
        t0,
        0,
        vec![observation(t0, g01, &[Band::full("1C"), Band::full("2X")])],
    )];

    let dir = workspace("phase-shift");
    let obs_path = dir.join("out.obs");

    let mut scripts = HashMap::new();
    scripts.insert("raw.script".to_string(), events);

    let (_, _) = run(
        scripts,
        ConvOptions::default(),
        &["raw.script"],
        obs_only(&obs_path),
    );

    let obs = fs::read_to_string(&obs_path).unwrap();
    assert!(obs.contains("G L2X -0.25000"));
    assert!(!obs.contains("G L1C"));
}

#[test]
fn station_transitions_emit_events() {
    // RTCM2-like stream alternating between two reference stations
    let times: Vec<Epoch> = (0..4)
        .map(|k| t("2020-01-01T00:00:00 GPST") + Duration::from_seconds(30.0 * k as f64))
        .collect();

    let g01 = SV::new(Constellation::GPS, 1);
    let staids = [1u32, 1, 2, 1];

    let events: Vec<DecoderEvent> = times
        .iter()
        .zip(staids.iter())
        .map(|(time, staid)| {
            epoch(
                *time,
                *staid,
                vec![observation(*time, g01, &[Band::full("1C")])],
            )
        })
        .collect();

    let dir = workspace("station-transitions");
    let obs_path = dir.join("out.obs");

    let mut scripts = HashMap::new();
    scripts.insert("rtcm2.script".to_string(), events);

    let (_, summaries) = run(
        scripts,
        ConvOptions::default(),
        &["rtcm2.script"],
        obs_only(&obs_path),
    );

    assert_eq!(summaries[0].counts[0], 4);

    let obs = fs::read_to_string(&obs_path).unwrap();

    // two transitions, one event block each
    let marker = format!(">{:31}3  5", "");
    assert_eq!(obs.matches(&marker).count(), 2);

    // the event precedes the first epoch of the new station
    let event_at = obs.find(&marker).unwrap();
    let third_epoch = obs.find("> 2020 01 01 00 01  0.0000000").unwrap();
    assert!(event_at < third_epoch);

    // station occupation comment block
    assert!(obs.contains("STAID                    TIME OF FIRST OBS        TIME OF LAST OBS"));
    assert!(obs.contains("    1  2020/01/01 00:00:00.00"));
    assert!(obs.contains("    2  2020/01/01 00:01:00.00"));

    // phases after a transition carry a forced slip
    let after = &obs[third_epoch..];
    let sv_line = after.lines().nth(1).unwrap();
    assert_eq!(sv_line.as_bytes()[3 + 16 + 14] as char, '1');
}

#[test]
fn raw_streams_never_transition() {
    let t0 = t("2020-01-01T00:00:00 GPST");
    let t1 = t("2020-01-01T00:00:30 GPST");
    let g01 = SV::new(Constellation::GPS, 1);

    let events = vec![
        epoch(t0, 0, vec![observation(t0, g01, &[Band::full("1C")])]),
        epoch(t1, 0, vec![observation(t1, g01, &[Band::full("1C")])]),
    ];

    let dir = workspace("raw-no-event");
    let obs_path = dir.join("out.obs");

    let mut scripts = HashMap::new();
    scripts.insert("ubx.script".to_string(), events);

    let (_, _) = run(
        scripts,
        ConvOptions::default(),
        &["ubx.script"],
        obs_only(&obs_path),
    );

    let obs = fs::read_to_string(&obs_path).unwrap();
    assert!(!obs.contains(&format!(">{:31}3", "")));
    // and no station comment block for the null station id
    assert!(!obs.contains("STAID "));
}

#[test]
fn sticky_slip_survives_screening() {
    // 30s cadence; the slip lands on a screened-out epoch and must
    // resurface on the next accepted one
    let t0 = t("2020-01-01T00:00:00 GPST");
    let t_rejected = t("2020-01-01T00:00:10 GPST");
    let t1 = t("2020-01-01T00:00:30 GPST");
    let g01 = SV::new(Constellation::GPS, 1);

    let events = vec![
        epoch(
            t0,
            0,
            vec![observation(
                t0,
                g01,
                &[Band::phase_only("1C", 1.16E8, LliFlags::empty())],
            )],
        ),
        epoch(
            t_rejected,
            0,
            vec![observation(
                t_rejected,
                g01,
                &[Band::phase_only("1C", 1.16E8, LliFlags::SLIP)],
            )],
        ),
        epoch(
            t1,
            0,
            vec![observation(
                t1,
                g01,
                &[Band::phase_only("1C", 1.16E8, LliFlags::empty())],
            )],
        ),
    ];

    let dir = workspace("sticky-slip");
    let obs_path = dir.join("out.obs");

    let mut opt = ConvOptions::default();
    opt.tint = 30.0;

    let mut scripts = HashMap::new();
    scripts.insert("raw.script".to_string(), events);

    let (_, summaries) = run(scripts, opt, &["raw.script"], obs_only(&obs_path));

    // the 10s epoch was dropped
    assert_eq!(summaries[0].counts[0], 2);

    let obs = fs::read_to_string(&obs_path).unwrap();
    assert!(!obs.contains("> 2020 01 01 00 00 10"));

    let block = obs.find("> 2020 01 01 00 00 30").unwrap();
    let sv_line = obs[block..].lines().nth(1).unwrap();

    // LLI digit of the restored slip, right after the phase cell
    assert_eq!(sv_line.as_bytes()[3 + 16 + 14] as char, '1');
}

#[test]
fn half_cycles_resolved_retroactively() {
    let t0 = t("2020-01-01T00:00:00 GPST");
    let t1 = t("2020-01-01T00:00:30 GPST");
    let t2 = t("2020-01-01T00:01:00 GPST");
    let g01 = SV::new(Constellation::GPS, 1);

    let events = vec![
        epoch(
            t0,
            0,
            vec![observation(
                t0,
                g01,
                &[Band::phase_only("1C", 1000.0, LliFlags::HALF_CYCLE)],
            )],
        ),
        epoch(
            t1,
            0,
            vec![observation(
                t1,
                g01,
                &[Band::phase_only("1C", 2000.0, LliFlags::HALF_CYCLE)],
            )],
        ),
        epoch(
            t2,
            0,
            vec![observation(
                t2,
                g01,
                &[Band::phase_only("1C", 3000.0, LliFlags::HALF_CYCLE_ADDED)],
            )],
        ),
    ];

    let dir = workspace("half-cycle");
    let obs_path = dir.join("out.obs");

    let mut scripts = HashMap::new();
    scripts.insert("raw.script".to_string(), events);

    let (_, _) = run(
        scripts,
        ConvOptions::default(),
        &["raw.script"],
        obs_only(&obs_path),
    );

    let obs = fs::read_to_string(&obs_path).unwrap();

    // phases inside the interval gained half a cycle, flag cleared
    assert!(obs.contains("      1000.500"));
    assert!(obs.contains("      2000.500"));
    // the resolution epoch itself is untouched
    assert!(obs.contains("      3000.000"));
    // no HALF_CYCLE digit survives
    assert!(!obs.contains("1000.5002"));
    assert!(!obs.contains("1000.5003"));
}

#[test]
fn empty_outputs_are_removed() {
    // every epoch falls outside the window: headers written, then the
    // empty products removed
    let t0 = t("2020-01-01T06:00:00 GPST");
    let g01 = SV::new(Constellation::GPS, 1);

    let events = vec![
        epoch(t0, 0, vec![observation(t0, g01, &[Band::full("1C")])]),
        gps_eph(1, t("2020-01-01T06:00:00 GPST")),
    ];

    let dir = workspace("empty-cleanup");
    let obs_path = dir.join("out.obs");
    let nav_path = dir.join("out.nav");

    let mut outputs = obs_only(&obs_path);
    outputs[1] = Some(nav_path.display().to_string());

    let mut opt = ConvOptions::default();
    opt.ts = Some(t("2020-01-01T00:00:00 GPST"));
    opt.te = Some(t("2020-01-01T00:00:00 GPST"));
    opt.tint = 30.0;

    let mut scripts = HashMap::new();
    scripts.insert("raw.script".to_string(), events);

    let (_, summaries) = run(scripts, opt, &["raw.script"], outputs);

    assert_eq!(summaries[0].counts[0], 0);
    assert!(!obs_path.exists());
    assert!(!nav_path.exists());
}

#[test]
fn open_window_latches_time_bounds() {
    let t0 = t("2020-01-01T00:00:00 GPST");
    let t1 = t("2020-01-01T00:10:00 GPST");
    let g01 = SV::new(Constellation::GPS, 1);

    let events = vec![
        epoch(t0, 0, vec![observation(t0, g01, &[Band::full("1C")])]),
        epoch(t1, 0, vec![observation(t1, g01, &[Band::full("1C")])]),
    ];

    let dir = workspace("open-window");
    let obs_path = dir.join("out.obs");

    let mut scripts = HashMap::new();
    scripts.insert("raw.script".to_string(), events);

    let (opt, _) = run(
        scripts,
        ConvOptions::default(),
        &["raw.script"],
        obs_only(&obs_path),
    );

    assert_eq!(opt.tstart, Some(t0));
    assert_eq!(opt.tend, Some(t1));
}

#[test]
fn multi_session_splits_and_expands_names() {
    let g01 = SV::new(Constellation::GPS, 1);

    let times = [
        t("2020-01-01T00:30:00 GPST"),
        t("2020-01-01T01:30:00 GPST"),
        t("2020-01-01T02:30:00 GPST"),
    ];

    let events: Vec<DecoderEvent> = times
        .iter()
        .map(|time| epoch(*time, 0, vec![observation(*time, g01, &[Band::full("1C")])]))
        .collect();

    let dir = workspace("multi-session");

    let mut outputs: OutputPaths = Default::default();
    outputs[0] = Some(dir.join("S5_%h.obs").display().to_string());

    let mut opt = ConvOptions::default();
    opt.ts = Some(t("2020-01-01T00:00:00 GPST"));
    opt.te = Some(t("2020-01-01T03:00:00 GPST"));
    opt.tunit = Some(3600.0);

    let mut scripts = HashMap::new();
    scripts.insert("raw.script".to_string(), events);

    let (_, summaries) = run(scripts, opt, &["raw.script"], outputs);

    assert_eq!(summaries.len(), 3);
    for summary in summaries.iter() {
        assert_eq!(summary.counts[0], 1);
    }

    for (hour, time) in ["00", "01", "02"].iter().zip(times.iter()) {
        let path = dir.join(format!("S5_{}.obs", hour));
        let content = fs::read_to_string(&path).unwrap();

        let (_, _, _, hh, mm, _, _) = time.to_gregorian(TimeScale::GPST);
        assert!(content.contains(&format!("> 2020 01 01 {:02} {:02}", hh, mm)));
    }
}

#[test]
fn multi_session_equals_single_session() {
    // one window covering the whole span reproduces the single session
    let g01 = SV::new(Constellation::GPS, 1);

    let times: Vec<Epoch> = (0..6)
        .map(|k| t("2020-01-01T00:10:00 GPST") + Duration::from_seconds(600.0 * k as f64))
        .collect();

    let events: Vec<DecoderEvent> = times
        .iter()
        .map(|time| epoch(*time, 0, vec![observation(*time, g01, &[Band::full("1C")])]))
        .collect();

    let dir = workspace("r2");
    let single_path = dir.join("single.obs");
    let multi_path = dir.join("multi.obs");

    let ts = t("2020-01-01T00:00:00 GPST");
    let te = t("2020-01-01T01:00:00 GPST");

    let mut scripts = HashMap::new();
    scripts.insert("raw.script".to_string(), events);

    let mut single_opt = ConvOptions::default();
    single_opt.ts = Some(ts);
    single_opt.te = Some(te);

    let (_, _) = run(
        scripts.clone(),
        single_opt,
        &["raw.script"],
        obs_only(&single_path),
    );

    let mut multi_opt = ConvOptions::default();
    multi_opt.ts = Some(ts);
    multi_opt.te = Some(te);
    multi_opt.tunit = Some(3600.0);

    let (_, summaries) = run(scripts, multi_opt, &["raw.script"], obs_only(&multi_path));
    assert_eq!(summaries.len(), 1);

    let single = fs::read_to_string(&single_path).unwrap();
    let multi = fs::read_to_string(&multi_path).unwrap();

    assert_eq!(body_of(&single), body_of(&multi));
}

#[test]
fn duplicate_epochs_are_suppressed() {
    let t0 = t("2020-01-01T00:00:00 GPST");
    let t1 = t("2020-01-01T00:00:30 GPST");
    let g01 = SV::new(Constellation::GPS, 1);

    let events = vec![
        epoch(t0, 0, vec![observation(t0, g01, &[Band::full("1C")])]),
        epoch(t0, 0, vec![observation(t0, g01, &[Band::full("1C")])]),
        epoch(t1, 0, vec![observation(t1, g01, &[Band::full("1C")])]),
    ];

    let dir = workspace("duplicates");
    let obs_path = dir.join("out.obs");

    let mut scripts = HashMap::new();
    scripts.insert("raw.script".to_string(), events);

    let (_, summaries) = run(
        scripts,
        ConvOptions::default(),
        &["raw.script"],
        obs_only(&obs_path),
    );

    assert_eq!(summaries[0].counts[0], 2);

    let obs = fs::read_to_string(&obs_path).unwrap();
    assert_eq!(obs.matches("> 2020 01 01 00 00  0.0000000").count(), 1);

    // emitted epochs are strictly increasing
    let mut previous = None;
    for line in body_of(&obs).lines().filter(|l| l.starts_with('>')) {
        let epoch_str = &line[2..29];
        let current = epoch_str.to_string();
        if let Some(previous) = &previous {
            assert!(current > *previous);
        }
        previous = Some(current);
    }
}

#[test]
fn separated_navigation_routing() {
    let events = vec![
        gps_eph(1, t("2020-01-01T02:00:00 GPST")),
        glo_geph(1, -4, t("2020-01-01T00:15:00 GPST")),
    ];

    let dir = workspace("sep-nav");
    let nav_path = dir.join("out.nav");
    let gnav_path = dir.join("out.gnav");

    let mut outputs: OutputPaths = Default::default();
    outputs[1] = Some(nav_path.display().to_string());
    outputs[2] = Some(gnav_path.display().to_string());

    let mut opt = ConvOptions::default();
    opt.sep_nav = true;

    let mut scripts = HashMap::new();
    scripts.insert("raw.script".to_string(), events);

    let (_, summaries) = run(scripts, opt, &["raw.script"], outputs);

    assert_eq!(summaries[0].counts[1], 1);
    assert_eq!(summaries[0].counts[2], 1);

    let nav = fs::read_to_string(&nav_path).unwrap();
    assert!(body_of(&nav).starts_with("G01"));

    let gnav = fs::read_to_string(&gnav_path).unwrap();
    assert!(body_of(&gnav).starts_with("R01"));
}

#[test]
fn sbas_log_and_qzss_remap() {
    let tow = 345600.0;
    let week = t("2020-01-01T00:00:00 GPST").to_time_of_week().0;

    let sbas_frame = DecoderEvent::Sbas(SbasMessage {
        prn: 129,
        week,
        tow,
        payload: [0x53; 29],
        lt_ephemeris: None,
    });

    let qzs_frame = DecoderEvent::Sbas(SbasMessage {
        prn: 184,
        week,
        tow: tow + 1.0,
        payload: [0x9A; 29],
        lt_ephemeris: None,
    });

    let bogus_frame = DecoderEvent::Sbas(SbasMessage {
        prn: 50,
        week,
        tow: tow + 2.0,
        payload: [0; 29],
        lt_ephemeris: None,
    });

    let dir = workspace("sbas-log");
    let log_path = dir.join("out.sbs");

    let mut outputs: OutputPaths = Default::default();
    outputs[8] = Some(log_path.display().to_string());

    let mut scripts = HashMap::new();
    scripts.insert(
        "sbas.script".to_string(),
        vec![sbas_frame, qzs_frame, bogus_frame],
    );

    let (_, summaries) = run(
        scripts,
        ConvOptions::default(),
        &["sbas.script"],
        outputs,
    );

    // the out-of-range PRN is dropped
    assert_eq!(summaries[0].counts[8], 2);

    let log = fs::read_to_string(&log_path).unwrap();
    let lines: Vec<&str> = log.lines().collect();
    assert!(lines[0].contains(" 129 : 5353"));
    assert!(lines[1].contains(" 184 : 9A9A"));
}

#[test]
fn excluded_satellites_never_reach_outputs() {
    let t0 = t("2020-01-01T00:00:00 GPST");
    let g01 = SV::new(Constellation::GPS, 1);
    let g02 = SV::new(Constellation::GPS, 2);

    let events = vec![
        epoch(
            t0,
            0,
            vec![
                observation(t0, g01, &[Band::full("1C")]),
                observation(t0, g02, &[Band::full("1C")]),
            ],
        ),
        gps_eph(1, t("2020-01-01T02:00:00 GPST")),
    ];

    let dir = workspace("exclusions");
    let obs_path = dir.join("out.obs");
    let nav_path = dir.join("out.nav");

    let mut outputs = obs_only(&obs_path);
    outputs[1] = Some(nav_path.display().to_string());

    let mut opt = ConvOptions::default();
    opt.exclude.push(g01);

    let mut scripts = HashMap::new();
    scripts.insert("raw.script".to_string(), events);

    let (_, summaries) = run(scripts, opt, &["raw.script"], outputs);

    let obs = fs::read_to_string(&obs_path).unwrap();
    assert!(!body_of(&obs).contains("G01"));
    assert!(body_of(&obs).contains("G02"));

    // the G01 ephemeris was dropped too: empty file removed
    assert_eq!(summaries[0].counts[1], 0);
    assert!(!nav_path.exists());
}

#[test]
fn abort_requests_stop_the_session() {
    let g01 = SV::new(Constellation::GPS, 1);

    let events: Vec<DecoderEvent> = (0..50)
        .map(|k| {
            let time = t("2020-01-01T00:00:00 GPST") + Duration::from_seconds(30.0 * k as f64);
            epoch(time, 0, vec![observation(time, g01, &[Band::full("1C")])])
        })
        .collect();

    let dir = workspace("abort");
    let obs_path = dir.join("out.obs");

    let mut scripts = HashMap::new();
    scripts.insert("raw.script".to_string(), events);

    let factory = ScriptedFactory::new(scripts);
    let mut sink = AbortEarly;

    let mut converter = Converter::new(ConvOptions::default(), &factory, &mut sink);
    let result = converter.run(
        &["raw.script".to_string()],
        &obs_only(&obs_path),
    );

    assert!(matches!(result, Err(Error::Aborted)));
}

#[test]
fn configuration_errors() {
    let factory = ScriptedFactory::new(HashMap::new());
    let mut sink = Silent;

    let mut converter = Converter::new(ConvOptions::default(), &factory, &mut sink);
    assert!(matches!(
        converter.run(&[], &Default::default()),
        Err(Error::Config(_)),
    ));

    let mut opt = ConvOptions::default();
    opt.ts = Some(t("2020-01-02T00:00:00 GPST"));
    opt.te = Some(t("2020-01-01T00:00:00 GPST"));

    let mut converter = Converter::new(opt, &factory, &mut sink);
    assert!(matches!(
        converter.run(&["x".to_string()], &Default::default()),
        Err(Error::Config(_)),
    ));
}

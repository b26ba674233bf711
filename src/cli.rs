use std::str::FromStr;

use clap::{Arg, ArgAction, ArgMatches, ColorChoice, Command};

use hifitime::prelude::Epoch;

use gnss::prelude::SV;

use gnss2rinex::{
    options::{ConvOptions, SysMask},
    session::OutputPaths,
};

pub struct Cli {
    /// Arguments passed by user
    matches: ArgMatches,
}

impl Cli {
    /// Build new command line interface
    pub fn new() -> Self {
        Self {
            matches: {
                Command::new("gnss2rinex")
                    .author("Guillaume W. Bres, <guillaume.bressaix@gmail.com>")
                    .version(env!("CARGO_PKG_VERSION"))
                    .about("GNSS receiver stream to RINEX converter")
                    .color(ColorChoice::Always)
                    .arg_required_else_help(true)
                    .arg(
                        Arg::new("files")
                            .value_name("FILE")
                            .num_args(1..)
                            .required(true)
                            .help("Input file(s). RINEX observation or navigation, possibly gzip compressed; wildcards and %Y/%m/%d/%r keywords are expanded.")
                    )
                    .next_help_heading("Constellations")
                    .arg(
                        Arg::new("gps")
                            .long("gps")
                            .action(ArgAction::SetTrue)
                            .help("Restrict to GPS constellation."),
                    )
                    .arg(
                        Arg::new("galileo")
                            .long("galileo")
                            .action(ArgAction::SetTrue)
                            .help("Restrict to Galileo constellation."),
                    )
                    .arg(
                        Arg::new("bds")
                            .long("bds")
                            .action(ArgAction::SetTrue)
                            .help("Restrict to BDS (BeiDou) constellation."),
                    )
                    .arg(
                        Arg::new("qzss")
                            .long("qzss")
                            .action(ArgAction::SetTrue)
                            .help("Restrict to QZSS constellation."),
                    )
                    .arg(
                        Arg::new("glonass")
                            .long("glonass")
                            .action(ArgAction::SetTrue)
                            .help("Restrict to Glonass constellation."),
                    )
                    .arg(
                        Arg::new("sbas")
                            .long("sbas")
                            .action(ArgAction::SetTrue)
                            .help("Restrict to SBAS payloads."),
                    )
                    .arg(
                        Arg::new("irnss")
                            .long("irnss")
                            .action(ArgAction::SetTrue)
                            .help("Restrict to IRNSS (NavIC) constellation."),
                    )
                    .arg(
                        Arg::new("exclude")
                            .short('x')
                            .long("exclude")
                            .action(ArgAction::Append)
                            .value_name("SV")
                            .help("Exclude one satellite (e.g. G05). May be repeated."),
                    )
                    .next_help_heading("Time frame")
                    .arg(
                        Arg::new("ts")
                            .long("ts")
                            .value_name("EPOCH")
                            .help("Start of the conversion window, e.g. \"2020-01-01T00:00:00 GPST\"."),
                    )
                    .arg(
                        Arg::new("te")
                            .long("te")
                            .value_name("EPOCH")
                            .help("End of the conversion window."),
                    )
                    .arg(
                        Arg::new("tint")
                            .long("tint")
                            .value_name("SECONDS")
                            .help("Output sampling interval. All epochs are kept by default."),
                    )
                    .arg(
                        Arg::new("tunit")
                            .long("tunit")
                            .value_name("SECONDS")
                            .help("Multi-session window. Requires --ts and --te; capped to one day."),
                    )
                    .next_help_heading("RINEX Collection")
                    .arg(
                        Arg::new("ver")
                            .long("ver")
                            .value_name("REVISION")
                            .help("Target RINEX revision (e.g. 3.04, 2.11). We use 3.04 by default."),
                    )
                    .arg(
                        Arg::new("obs")
                            .short('o')
                            .long("obs")
                            .value_name("FILE")
                            .help("Observation RINEX output."),
                    )
                    .arg(
                        Arg::new("nav")
                            .short('n')
                            .long("nav")
                            .value_name("FILE")
                            .help("Navigation RINEX output (combined, unless --sep-nav)."),
                    )
                    .arg(
                        Arg::new("gnav")
                            .long("gnav")
                            .value_name("FILE")
                            .help("Glonass navigation output (separated mode)."),
                    )
                    .arg(
                        Arg::new("hnav")
                            .long("hnav")
                            .value_name("FILE")
                            .help("SBAS navigation output (separated mode)."),
                    )
                    .arg(
                        Arg::new("qnav")
                            .long("qnav")
                            .value_name("FILE")
                            .help("QZSS navigation output (separated mode)."),
                    )
                    .arg(
                        Arg::new("lnav")
                            .long("lnav")
                            .value_name("FILE")
                            .help("Galileo navigation output (separated mode)."),
                    )
                    .arg(
                        Arg::new("cnav")
                            .long("cnav")
                            .value_name("FILE")
                            .help("BDS navigation output (separated mode)."),
                    )
                    .arg(
                        Arg::new("inav")
                            .long("inav")
                            .value_name("FILE")
                            .help("IRNSS navigation output (separated mode)."),
                    )
                    .arg(
                        Arg::new("sbas-log")
                            .long("sbas-log")
                            .value_name("FILE")
                            .help("SBAS raw message log output."),
                    )
                    .arg(
                        Arg::new("sep-nav")
                            .long("sep-nav")
                            .action(ArgAction::SetTrue)
                            .help("One navigation file per constellation instead of a combined file."),
                    )
                    .arg(
                        Arg::new("no-halfc")
                            .long("no-halfc")
                            .action(ArgAction::SetTrue)
                            .help("Disable retroactive half-cycle ambiguity resolution."),
                    )
                    .arg(
                        Arg::new("no-phshift")
                            .long("no-phshift")
                            .action(ArgAction::SetTrue)
                            .help("Do not declare carrier phase shifts in the header."),
                    )
                    .arg(
                        Arg::new("gzip")
                            .long("gzip")
                            .action(ArgAction::SetTrue)
                            .help("Activate Gzip compression of all outputs."))
                    .next_help_heading("Station")
                    .arg(
                        Arg::new("staid")
                            .long("staid")
                            .value_name("ID")
                            .help("Station ID, expands the %r path keyword."),
                    )
                    .arg(
                        Arg::new("marker")
                            .long("marker")
                            .value_name("NAME")
                            .help("Marker name, overrides whatever the stream carries."),
                    )
                    .arg(
                        Arg::new("observer")
                            .long("observer")
                            .value_name("NAME")
                            .help("Define name of Observer, to be used in all Headers."),
                    )
                    .arg(
                        Arg::new("agency")
                            .long("agency")
                            .value_name("NAME")
                            .help("Define name of your Agency, to be used in all Headers."),
                    )
                    .arg(
                        Arg::new("config")
                            .long("config")
                            .value_name("FILE")
                            .help("Preload conversion options from a JSON file; flags override individual fields."),
                    )
                    .get_matches()
            },
        }
    }

    pub fn filepaths(&self) -> Vec<String> {
        self.matches
            .get_many::<String>("files")
            .unwrap_or_default()
            .cloned()
            .collect()
    }

    fn flag(&self, id: &str) -> bool {
        self.matches.get_flag(id)
    }

    fn string(&self, id: &str) -> Option<&String> {
        self.matches.get_one::<String>(id)
    }

    fn epoch(&self, id: &str) -> Option<Epoch> {
        self.string(id).map(|value| {
            Epoch::from_str(value.trim())
                .unwrap_or_else(|e| panic!("invalid {} epoch: {}", id, e))
        })
    }

    fn seconds(&self, id: &str) -> Option<f64> {
        self.string(id).map(|value| {
            value
                .trim()
                .parse::<f64>()
                .unwrap_or_else(|e| panic!("invalid {} value: {}", id, e))
        })
    }

    /// Conversion options from the command line (and --config preload).
    pub fn conv_options(&self) -> ConvOptions {
        let mut opt = if let Some(path) = self.string("config") {
            let content = std::fs::read_to_string(path)
                .unwrap_or_else(|e| panic!("failed to read {}: {}", path, e));
            serde_json::from_str(&content)
                .unwrap_or_else(|e| panic!("invalid configuration {}: {}", path, e))
        } else {
            ConvOptions::default()
        };

        let mut navsys = SysMask::empty();
        for (flag, mask) in [
            ("gps", SysMask::GPS),
            ("glonass", SysMask::GLO),
            ("galileo", SysMask::GAL),
            ("qzss", SysMask::QZS),
            ("sbas", SysMask::SBS),
            ("bds", SysMask::BDS),
            ("irnss", SysMask::IRN),
        ] {
            if self.flag(flag) {
                navsys |= mask;
            }
        }
        if !navsys.is_empty() {
            opt.navsys = navsys;
        }

        if let Some(version) = self.string("ver") {
            let version = version
                .trim()
                .parse::<f64>()
                .unwrap_or_else(|e| panic!("invalid revision: {}", e));
            opt.rnxver = (version * 100.0).round() as u16;
        }

        opt.ts = self.epoch("ts").or(opt.ts);
        opt.te = self.epoch("te").or(opt.te);

        if let Some(tint) = self.seconds("tint") {
            opt.tint = tint;
        }
        opt.tunit = self.seconds("tunit").or(opt.tunit);

        if self.flag("no-halfc") {
            opt.halfcyc = false;
        }
        if self.flag("no-phshift") {
            opt.phshift = false;
        }
        if self.flag("sep-nav") {
            opt.sep_nav = true;
        }
        if self.flag("gzip") {
            opt.gzip = true;
        }

        if let Some(staid) = self.string("staid") {
            opt.staid = staid.clone();
        }
        if let Some(marker) = self.string("marker") {
            opt.marker_name = marker.clone();
        }
        if let Some(observer) = self.string("observer") {
            opt.observer = observer.clone();
        }
        if let Some(agency) = self.string("agency") {
            opt.agency = agency.clone();
        }

        for sv in self
            .matches
            .get_many::<String>("exclude")
            .unwrap_or_default()
        {
            let sv = SV::from_str(sv.trim())
                .unwrap_or_else(|e| panic!("invalid satellite \"{}\": {:?}", sv, e));
            opt.exclude.push(sv);
        }

        opt
    }

    /// The nine output slots.
    pub fn output_paths(&self) -> OutputPaths {
        let ids = [
            "obs", "nav", "gnav", "hnav", "qnav", "lnav", "cnav", "inav", "sbas-log",
        ];
        std::array::from_fn(|slot| self.string(ids[slot]).cloned())
    }
}

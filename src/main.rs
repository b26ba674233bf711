#![doc(
    html_logo_url = "https://raw.githubusercontent.com/nav-solutions/.github/master/logos/logo2.jpg"
)]

/*
 * GNSS2RINEX is part of the nav-solutions framework.
 * Authors: Guillaume W. Bres <guillaume.bressaix@gmail.com> et al,
 * (cf. https://github.com/nav-solutions/gnss2rinex/graphs/contributors)
 * This framework is shipped under Mozilla Public V2 license.
 *
 * Documentation: https://github.com/nav-solutions/gnss2rinex
 */

extern crate gnss_rs as gnss;

use env_logger::{Builder, Target};

use log::{error, info};

mod cli;

use gnss2rinex::session::{Converter, LogSink, SLOT_OBS, SLOT_SBAS};
use gnss2rinex::rinex::input::RinexInputFactory;

use crate::cli::Cli;

pub fn main() {
    let mut builder = Builder::from_default_env();

    builder
        .target(Target::Stdout)
        .format_timestamp_secs()
        .format_module_path(false)
        .init();

    let cli = Cli::new();

    let inputs = cli.filepaths();
    let outputs = cli.output_paths();
    let opt = cli.conv_options();

    if outputs.iter().all(|path| path.is_none()) {
        error!("no output file: define at least one of --obs, --nav, --sbas-log");
        std::process::exit(1);
    }

    let factory = RinexInputFactory::default();
    let mut sink = LogSink;

    let mut converter = Converter::new(opt, &factory, &mut sink);

    match converter.run(&inputs, &outputs) {
        Ok(summaries) => {
            let obs: usize = summaries.iter().map(|s| s.counts[SLOT_OBS]).sum();
            let nav: usize = summaries
                .iter()
                .map(|s| s.counts[1..SLOT_SBAS].iter().sum::<usize>())
                .sum();
            let errors: usize = summaries.iter().map(|s| s.errors).sum();

            info!(
                "{} session(s): obs={} nav={} errors={}",
                summaries.len(),
                obs,
                nav,
                errors,
            );
        },
        Err(e) => {
            error!("conversion failed: {}", e);
            std::process::exit(1);
        },
    }
}

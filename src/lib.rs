#![doc(
    html_logo_url = "https://raw.githubusercontent.com/nav-solutions/.github/master/logos/logo2.jpg"
)]
#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg))]

/*
 * GNSS2RINEX is part of the nav-solutions framework.
 * Authors: Guillaume W. Bres <guillaume.bressaix@gmail.com> et al,
 * (cf. https://github.com/nav-solutions/gnss2rinex/graphs/contributors)
 * This framework is shipped under Mozilla Public V2 license.
 *
 * Documentation: https://github.com/nav-solutions/gnss2rinex
 */

extern crate gnss_rs as gnss;

pub mod codes;
pub mod constants;
pub mod convert;
pub mod ephemeris;
pub mod errors;
pub mod fd;
pub mod halfcycle;
pub mod observation;
pub mod options;
pub mod path;
pub mod rinex;
pub mod scan;
pub mod screen;
pub mod session;
pub mod station;
pub mod stream;

pub mod prelude {
    pub use crate::codes::Code;
    pub use crate::ephemeris::{Eph, EphFrame, Geph, IonUtc, SbasMessage, Seph};
    pub use crate::errors::Error;
    pub use crate::observation::{EpochData, EpochFlag, LliFlags, ObsData, SignalBand};
    pub use crate::options::{ConvOptions, FreqMask, ObsKindMask, SysMask};
    pub use crate::rinex::input::{RinexDecoder, RinexInputFactory};
    pub use crate::session::{
        Converter, DecoderFactory, LogSink, OutputPaths, PointPositioner, SessionSummary,
        StatusSink,
    };
    pub use crate::station::{DeltaKind, StationInfo};
    pub use crate::stream::{DecoderEvent, StreamDecoder, StreamFile};

    // re-exports
    pub use gnss::prelude::{Constellation, SV};
    pub use hifitime::prelude::{Duration, Epoch, TimeScale};
}

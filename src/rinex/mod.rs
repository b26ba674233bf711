//! RINEX text serdes: header/record writers and the input back-end.

pub mod input;
pub mod nav;
pub mod obs;
pub mod sbas;

use hifitime::prelude::{Epoch, TimeScale};

use crate::{
    constants::{NUM_GLO_SLOTS, SECONDS_PER_WEEK},
    ephemeris::IonUtc,
    options::{ConvOptions, SysMask},
};

/// Everything the header writers need, assembled by the session driver.
pub struct HeaderContext<'a> {
    pub opt: &'a ConvOptions,
    pub glo_fcn: &'a [Option<i8>; NUM_GLO_SLOTS],
    pub ionutc: Option<&'a IonUtc>,
    pub tstart: Option<Epoch>,
    pub tend: Option<Epoch>,
}

/// "2020 01 01 00 00  0.0000000" (v3 epoch body)
pub(crate) fn epoch_v3(t: Epoch) -> String {
    let (y, m, d, hh, mm, ss, nanos) = t.to_time_scale(TimeScale::GPST).to_gregorian(TimeScale::GPST);
    let seconds = ss as f64 + nanos as f64 * 1.0E-9;
    format!("{:04} {:02} {:02} {:02} {:02}{:11.7}", y, m, d, hh, mm, seconds)
}

/// "20  1  1  0  0  0.0000000" (v2 epoch body)
pub(crate) fn epoch_v2(t: Epoch) -> String {
    let (y, m, d, hh, mm, ss, nanos) = t.to_time_scale(TimeScale::GPST).to_gregorian(TimeScale::GPST);
    let seconds = ss as f64 + nanos as f64 * 1.0E-9;
    format!(
        "{:2}{:3}{:3}{:3}{:3}{:11.7}",
        y % 100,
        m,
        d,
        hh,
        mm,
        seconds,
    )
}

/// 19-character scientific notation used by navigation records.
pub(crate) fn nav_f64(value: f64) -> String {
    let formatted = format!("{:.12E}", value);

    let (mantissa, exponent) = formatted.split_once('E').unwrap_or((formatted.as_str(), "0"));
    let exponent: i32 = exponent.parse().unwrap_or(0);

    format!("{:>19}", format!("{}E{:+03}", mantissa, exponent))
}

/// 60-column content, 20-column label.
pub(crate) fn header_line(content: &str, label: &str) -> String {
    format!("{:<60}{}", content, label)
}

/// RINEX signal strength indicator digit.
pub(crate) fn snr_digit(snr: f64) -> Option<char> {
    if snr <= 0.0 {
        return None;
    }
    let digit = ((snr / 6.0).round() as i64).clamp(1, 9);
    char::from_digit(digit as u32, 10)
}

/// Seconds of week relative to a given week number (may exceed one
/// week on rollovers).
pub(crate) fn seconds_of_week(t: Epoch, week: u32) -> f64 {
    let (w, tow_nanos) = t.to_time_scale(TimeScale::GPST).to_time_of_week();
    (w as f64 - week as f64) * SECONDS_PER_WEEK + tow_nanos as f64 * 1.0E-9
}

/// Satellite system annotation of the first header line.
pub(crate) fn system_annotation(navsys: SysMask) -> &'static str {
    if navsys == SysMask::GPS {
        "G: GPS"
    } else if navsys == SysMask::GLO {
        "R: GLONASS"
    } else if navsys == SysMask::GAL {
        "E: Galileo"
    } else if navsys == SysMask::QZS {
        "J: QZSS"
    } else if navsys == SysMask::SBS {
        "S: SBAS Payload"
    } else if navsys == SysMask::BDS {
        "C: BeiDou"
    } else if navsys == SysMask::IRN {
        "I: IRNSS"
    } else {
        "M: Mixed"
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn epoch_formats() {
        let t = Epoch::from_str("2021-01-01T00:00:00 GPST").unwrap();
        assert_eq!(epoch_v3(t), "2021 01 01 00 00  0.0000000");
        assert_eq!(epoch_v2(t), "21  1  1  0  0  0.0000000");

        let t = Epoch::from_str("2017-01-01T09:59:30 GPST").unwrap();
        assert_eq!(epoch_v3(t), "2017 01 01 09 59 30.0000000");
        assert_eq!(epoch_v2(t), "17  1  1  9 59 30.0000000");
    }

    #[test]
    fn nav_float_width() {
        assert_eq!(nav_f64(0.0), " 0.000000000000E+00");
        assert_eq!(nav_f64(-1.234567890123E-5), "-1.234567890123E-05");
        assert_eq!(nav_f64(5153.612345).len(), 19);
        assert_eq!(nav_f64(5153.612345), " 5.153612345000E+03");
    }

    #[test]
    fn snr_digits() {
        assert_eq!(snr_digit(0.0), None);
        assert_eq!(snr_digit(45.0), Some('8'));
        assert_eq!(snr_digit(3.0), Some('1'));
        assert_eq!(snr_digit(99.0), Some('9'));
    }
}

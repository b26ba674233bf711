//! Navigation RINEX formatting: per-system headers and the three
//! broadcast record shapes.

use std::io::{BufWriter, Write};

use hifitime::prelude::{Epoch, TimeScale};

use crate::{
    ephemeris::{Eph, Geph, Seph},
    errors::FormattingError,
    rinex::{HeaderContext, header_line, nav_f64, seconds_of_week, system_annotation},
    rinex::obs::write_program_line,
};

/// File kind annotation per output slot (1..=7).
fn slot_annotation(rnxver: u16, slot: usize) -> (&'static str, &'static str) {
    if rnxver >= 300 {
        let system = match slot {
            2 => "R: GLONASS",
            3 => "S: SBAS Payload",
            4 => "J: QZSS",
            5 => "E: Galileo",
            6 => "C: BeiDou",
            7 => "I: IRNSS",
            _ => "",
        };
        ("N: GNSS NAV DATA", system)
    } else {
        match slot {
            2 => ("G: GLONASS NAV DATA", ""),
            3 => ("H: GEO NAV MSG DATA", ""),
            _ => ("N: GPS NAV DATA", ""),
        }
    }
}

pub fn write_header<W: Write>(
    w: &mut BufWriter<W>,
    ctx: &HeaderContext,
    slot: usize,
) -> Result<(), FormattingError> {
    let opt = ctx.opt;
    let version = opt.rnxver as f64 / 100.0;

    let (kind, mut system) = slot_annotation(opt.rnxver, slot);
    if opt.rnxver >= 300 && system.is_empty() {
        system = system_annotation(opt.navsys);
    }

    writeln!(
        w,
        "{}",
        header_line(
            &format!("{:9.2}{:11}{:<20}{:<20}", version, "", kind, system),
            "RINEX VERSION / TYPE",
        )
    )?;

    write_program_line(w, opt)?;

    for comment in opt.comments.iter() {
        writeln!(w, "{}", header_line(comment, "COMMENT"))?;
    }

    if let Some(ionutc) = ctx.ionutc {
        if slot == 1 {
            write_ionutc(w, opt.rnxver, ionutc)?;
        }

        if let Some(leap) = ionutc.leap_seconds {
            writeln!(w, "{}", header_line(&format!("{:6}", leap), "LEAP SECONDS"))?;
        }
    }

    writeln!(w, "{}", header_line("", "END OF HEADER"))?;

    Ok(())
}

fn write_ionutc<W: Write>(
    w: &mut BufWriter<W>,
    rnxver: u16,
    ionutc: &crate::ephemeris::IonUtc,
) -> Result<(), FormattingError> {
    let fmt4 = |values: &[f64]| -> String {
        values
            .iter()
            .map(|v| format!("{:>12}", short_f64(*v)))
            .collect::<String>()
    };

    if rnxver >= 300 {
        writeln!(
            w,
            "{}",
            header_line(
                &format!("GPSA {}", fmt4(&ionutc.ion_gps[..4])),
                "IONOSPHERIC CORR",
            )
        )?;
        writeln!(
            w,
            "{}",
            header_line(
                &format!("GPSB {}", fmt4(&ionutc.ion_gps[4..])),
                "IONOSPHERIC CORR",
            )
        )?;
        writeln!(
            w,
            "{}",
            header_line(
                &format!(
                    "GPUT {:>17}{:>16}{:7}{:5}",
                    short_f64(ionutc.utc_gps[0]),
                    short_f64(ionutc.utc_gps[1]),
                    ionutc.utc_gps[2] as i64,
                    ionutc.utc_gps[3] as i64,
                ),
                "TIME SYSTEM CORR",
            )
        )?;
    } else {
        writeln!(
            w,
            "{}",
            header_line(&format!("  {}", fmt4(&ionutc.ion_gps[..4])), "ION ALPHA")
        )?;
        writeln!(
            w,
            "{}",
            header_line(&format!("  {}", fmt4(&ionutc.ion_gps[4..])), "ION BETA")
        )?;
        writeln!(
            w,
            "{}",
            header_line(
                &format!(
                    "   {}{}{:9}{:9}",
                    nav_f64(ionutc.utc_gps[0]),
                    nav_f64(ionutc.utc_gps[1]),
                    ionutc.utc_gps[2] as i64,
                    ionutc.utc_gps[3] as i64,
                ),
                "DELTA-UTC: A0,A1,T,W",
            )
        )?;
    }

    Ok(())
}

/// 12-character scientific notation used by ionosphere lines.
fn short_f64(value: f64) -> String {
    let formatted = format!("{:.4E}", value);
    let (mantissa, exponent) = formatted.split_once('E').unwrap_or((formatted.as_str(), "0"));
    let exponent: i32 = exponent.parse().unwrap_or(0);
    format!("{}E{:+03}", mantissa, exponent)
}

fn epoch_prefix(rnxver: u16, sv: gnss::prelude::SV, t: Epoch, scale: TimeScale) -> String {
    let (y, m, d, hh, mm, ss, nanos) = t.to_time_scale(scale).to_gregorian(scale);

    if rnxver >= 300 {
        format!("{:x} {:04} {:02} {:02} {:02} {:02} {:02}", sv, y, m, d, hh, mm, ss)
    } else {
        let seconds = ss as f64 + nanos as f64 * 1.0E-9;
        format!(
            "{:2} {:02} {:2} {:2} {:2} {:2}{:5.1}",
            sv.prn,
            y % 100,
            m,
            d,
            hh,
            mm,
            seconds,
        )
    }
}

fn continuation(rnxver: u16) -> &'static str {
    if rnxver >= 300 { "    " } else { "   " }
}

fn write_fields<W: Write>(
    w: &mut BufWriter<W>,
    rnxver: u16,
    fields: &[f64],
) -> Result<(), FormattingError> {
    for chunk in fields.chunks(4) {
        write!(w, "{}", continuation(rnxver))?;
        for value in chunk {
            write!(w, "{}", nav_f64(*value))?;
        }
        writeln!(w)?;
    }
    Ok(())
}

/// Keplerian broadcast record: epoch + clock line, then seven orbit
/// lines.
pub fn write_eph<W: Write>(
    w: &mut BufWriter<W>,
    rnxver: u16,
    eph: &Eph,
) -> Result<(), FormattingError> {
    writeln!(
        w,
        "{}{}{}{}",
        epoch_prefix(rnxver, eph.sv, eph.toc, TimeScale::GPST),
        nav_f64(eph.f0),
        nav_f64(eph.f1),
        nav_f64(eph.f2),
    )?;

    write_fields(
        w,
        rnxver,
        &[
            eph.iode as f64,
            eph.crs,
            eph.deln,
            eph.m0,
            //
            eph.cuc,
            eph.e,
            eph.cus,
            eph.a.sqrt(),
            //
            eph.toes,
            eph.cic,
            eph.omg0,
            eph.cis,
            //
            eph.i0,
            eph.crc,
            eph.omg,
            eph.omgd,
            //
            eph.idot,
            eph.code,
            eph.week as f64,
            eph.flag,
            //
            eph.sva,
            eph.svh,
            eph.tgd[0],
            eph.iodc as f64,
            //
            seconds_of_week(eph.ttr, eph.week),
            eph.fit,
        ],
    )
}

/// GLONASS broadcast record: epoch expressed in UTC, then the state
/// vector in km.
pub fn write_geph<W: Write>(
    w: &mut BufWriter<W>,
    rnxver: u16,
    geph: &Geph,
) -> Result<(), FormattingError> {
    let (week, _) = geph.toe.to_time_scale(TimeScale::GPST).to_time_of_week();

    writeln!(
        w,
        "{}{}{}{}",
        epoch_prefix(rnxver, geph.sv, geph.toe, TimeScale::UTC),
        nav_f64(-geph.taun),
        nav_f64(geph.gamn),
        nav_f64(seconds_of_week(geph.tof, week)),
    )?;

    write_fields(
        w,
        rnxver,
        &[
            geph.pos[0] * 1.0E-3,
            geph.vel[0] * 1.0E-3,
            geph.acc[0] * 1.0E-3,
            geph.svh,
            //
            geph.pos[1] * 1.0E-3,
            geph.vel[1] * 1.0E-3,
            geph.acc[1] * 1.0E-3,
            geph.frq as f64,
            //
            geph.pos[2] * 1.0E-3,
            geph.vel[2] * 1.0E-3,
            geph.acc[2] * 1.0E-3,
            geph.age,
        ],
    )
}

/// SBAS broadcast record, state vector in km.
pub fn write_seph<W: Write>(
    w: &mut BufWriter<W>,
    rnxver: u16,
    seph: &Seph,
) -> Result<(), FormattingError> {
    let (week, _) = seph.t0.to_time_scale(TimeScale::GPST).to_time_of_week();

    writeln!(
        w,
        "{}{}{}{}",
        epoch_prefix(rnxver, seph.sv, seph.t0, TimeScale::GPST),
        nav_f64(seph.af0),
        nav_f64(seph.af1),
        nav_f64(seconds_of_week(seph.tof, week)),
    )?;

    write_fields(
        w,
        rnxver,
        &[
            seph.pos[0] * 1.0E-3,
            seph.vel[0] * 1.0E-3,
            seph.acc[0] * 1.0E-3,
            seph.svh,
            //
            seph.pos[1] * 1.0E-3,
            seph.vel[1] * 1.0E-3,
            seph.acc[1] * 1.0E-3,
            seph.sva,
            //
            seph.pos[2] * 1.0E-3,
            seph.vel[2] * 1.0E-3,
            seph.acc[2] * 1.0E-3,
            0.0,
        ],
    )
}

#[cfg(test)]
mod test {
    use super::*;
    use gnss::prelude::{Constellation, SV};
    use std::str::FromStr;

    pub(crate) fn gps_eph() -> Eph {
        let toc = Epoch::from_str("2020-01-01T02:00:00 GPST").unwrap();
        let (week, tow_nanos) = toc.to_time_of_week();

        Eph {
            sv: SV::new(Constellation::GPS, 1),
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
        }
    }

    #[test]
    fn kepler_record_shape() {
        let mut buf = BufWriter::new(Vec::new());
        write_eph(&mut buf, 304, &gps_eph()).unwrap();

        let content = String::from_utf8(buf.into_inner().unwrap()).unwrap();
        let lines: Vec<&str> = content.lines().collect();

        assert_eq!(lines.len(), 8);
        assert!(lines[0].starts_with("G01 2020 01 01 02 00 00"));
        // epoch prefix (23) + three 19-char fields
        assert_eq!(lines[0].len(), 23 + 3 * 19);
        // orbit lines: 4-blank prefix + four fields
        assert_eq!(lines[1].len(), 4 + 4 * 19);
        // final line carries two fields only
        assert_eq!(lines[7].len(), 4 + 2 * 19);
    }

    #[test]
    fn v2_prefix() {
        let mut buf = BufWriter::new(Vec::new());
        write_eph(&mut buf, 210, &gps_eph()).unwrap();

        let content = String::from_utf8(buf.into_inner().unwrap()).unwrap();
        let first = content.lines().next().unwrap();
        assert!(first.starts_with(" 1 20  1  1  2  0  0.0"));
    }

    #[test]
    fn glonass_record_shape() {
        let toe = Epoch::from_str("2020-01-01T00:15:00 GPST").unwrap();
        let geph = Geph {
            sv: SV::new(Constellation::Glonass, 3),
            iode: 40,
            frq: -4,
            svh: 0.0,
            sva: 0.0,
            age: 0.0,
            toe,
            tof: toe,
            pos: [12_000_000.0, -8_000_000.0, 20_000_000.0],
            vel: [1000.0, 2000.0, -500.0],
            acc: [0.0; 3],
            taun: 1.0E-5,
            gamn: 0.0,
            dtaun: 0.0,
        };

        let mut buf = BufWriter::new(Vec::new());
        write_geph(&mut buf, 304, &geph).unwrap();

        let content = String::from_utf8(buf.into_inner().unwrap()).unwrap();
        let lines: Vec<&str> = content.lines().collect();

        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("R03 "));
        // x position in km
        assert!(lines[1].contains("1.200000000000E+04"));
        // frequency channel on the second orbit line
        assert!(lines[2].contains("-4.000000000000E+00"));
    }

    #[test]
    fn header_annotations() {
        let opt = crate::options::ConvOptions::default();
        let fcn = [None; crate::constants::NUM_GLO_SLOTS];
        let ctx = HeaderContext {
            opt: &opt,
            glo_fcn: &fcn,
            ionutc: None,
            tstart: None,
            tend: None,
        };

        let mut buf = BufWriter::new(Vec::new());
        write_header(&mut buf, &ctx, 1).unwrap();
        let content = String::from_utf8(buf.into_inner().unwrap()).unwrap();
        assert!(content.contains("N: GNSS NAV DATA"));
        assert!(content.contains("M: Mixed"));

        let mut buf = BufWriter::new(Vec::new());
        write_header(&mut buf, &ctx, 2).unwrap();
        let content = String::from_utf8(buf.into_inner().unwrap()).unwrap();
        assert!(content.contains("R: GLONASS"));
    }
}

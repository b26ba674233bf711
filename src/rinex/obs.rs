//! Observation RINEX formatting: headers, epoch blocks, event records.

use std::io::{BufWriter, Write};

use hifitime::prelude::{Epoch, TimeScale};

use crate::{
    codes::{self, Code, SYS_GLO},
    constants::NUM_SYSTEMS,
    errors::FormattingError,
    observation::{EpochData, EpochFlag, ObsData},
    options::{self, ConvOptions},
    rinex::{HeaderContext, epoch_v2, epoch_v3, header_line, snr_digit, system_annotation},
    station::StationInfo,
};

pub fn write_header<W: Write>(
    w: &mut BufWriter<W>,
    ctx: &HeaderContext,
) -> Result<(), FormattingError> {
    let opt = ctx.opt;
    let version = opt.rnxver as f64 / 100.0;

    writeln!(
        w,
        "{}",
        header_line(
            &format!(
                "{:9.2}{:11}{:<20}{:<20}",
                version,
                "",
                "OBSERVATION DATA",
                system_annotation(opt.navsys),
            ),
            "RINEX VERSION / TYPE",
        )
    )?;

    write_program_line(w, opt)?;

    for comment in opt.comments.iter() {
        writeln!(w, "{}", header_line(comment, "COMMENT"))?;
    }

    writeln!(w, "{}", header_line(&opt.marker_name, "MARKER NAME"))?;

    if !opt.marker_number.is_empty() {
        writeln!(w, "{}", header_line(&opt.marker_number, "MARKER NUMBER"))?;
    }

    if opt.rnxver >= 300 && !opt.marker_type.is_empty() {
        writeln!(w, "{}", header_line(&opt.marker_type, "MARKER TYPE"))?;
    }

    writeln!(
        w,
        "{}",
        header_line(
            &format!("{:<20}{:<40}", opt.observer, opt.agency),
            "OBSERVER / AGENCY",
        )
    )?;

    writeln!(
        w,
        "{}",
        header_line(
            &format!(
                "{:<20}{:<20}{:<20}",
                opt.receiver_number, opt.receiver_type, opt.receiver_version,
            ),
            "REC # / TYPE / VERS",
        )
    )?;

    writeln!(
        w,
        "{}",
        header_line(
            &format!("{:<20}{:<20}", opt.antenna_number, opt.antenna_type),
            "ANT # / TYPE",
        )
    )?;

    let position = ctx.opt.approx_position.unwrap_or_default();
    writeln!(
        w,
        "{}",
        header_line(
            &format!("{:14.4}{:14.4}{:14.4}", position[0], position[1], position[2]),
            "APPROX POSITION XYZ",
        )
    )?;

    writeln!(
        w,
        "{}",
        header_line(
            &format!(
                "{:14.4}{:14.4}{:14.4}",
                opt.antenna_delta[0], opt.antenna_delta[1], opt.antenna_delta[2],
            ),
            "ANTENNA: DELTA H/E/N",
        )
    )?;

    if opt.rnxver >= 300 {
        write_obs_types_v3(w, opt)?;
    } else {
        write_obs_types_v2(w, opt)?;
    }

    if opt.tint > 0.0 {
        writeln!(
            w,
            "{}",
            header_line(&format!("{:10.3}", opt.tint), "INTERVAL")
        )?;
    }

    if let Some(tstart) = ctx.tstart {
        writeln!(
            w,
            "{}",
            header_line(&time_of_obs(tstart), "TIME OF FIRST OBS")
        )?;
    }

    if let Some(tend) = ctx.tend {
        writeln!(w, "{}", header_line(&time_of_obs(tend), "TIME OF LAST OBS"))?;
    }

    if opt.rnxver >= 300 {
        write_phase_shifts(w, opt)?;

        if opt.navsys.has_system(SYS_GLO) {
            write_glonass_slots(w, ctx)?;

            writeln!(
                w,
                "{}",
                header_line(
                    " C1C    0.000 C1P    0.000 C2C    0.000 C2P    0.000",
                    "GLONASS COD/PHS/BIS",
                )
            )?;
        }
    }

    if let Some(leap) = ctx.ionutc.and_then(|ionutc| ionutc.leap_seconds) {
        writeln!(w, "{}", header_line(&format!("{:6}", leap), "LEAP SECONDS"))?;
    }

    writeln!(w, "{}", header_line("", "END OF HEADER"))?;

    Ok(())
}

pub(crate) fn write_program_line<W: Write>(
    w: &mut BufWriter<W>,
    opt: &ConvOptions,
) -> Result<(), FormattingError> {
    let program = format!("gnss2rinex {}", env!("CARGO_PKG_VERSION"));

    let now = Epoch::now().unwrap_or(Epoch::from_gpst_seconds(0.0));
    let (y, m, d, hh, mm, ss, _) = now.to_gregorian(TimeScale::UTC);
    let date = format!("{:04}{:02}{:02} {:02}{:02}{:02} UTC", y, m, d, hh, mm, ss);

    writeln!(
        w,
        "{}",
        header_line(
            &format!("{:<20}{:<20}{:<20}", program, opt.run_by, date),
            "PGM / RUN BY / DATE",
        )
    )?;

    Ok(())
}

fn time_of_obs(t: Epoch) -> String {
    let (y, m, d, hh, mm, ss, nanos) = t.to_time_scale(TimeScale::GPST).to_gregorian(TimeScale::GPST);
    format!(
        "{:6}{:6}{:6}{:6}{:6}{:13.7}{:>8}{:<4}",
        y,
        m,
        d,
        hh,
        mm,
        ss as f64 + nanos as f64 * 1.0E-9,
        "GPS",
        "",
    )
}

fn write_obs_types_v3<W: Write>(
    w: &mut BufWriter<W>,
    opt: &ConvOptions,
) -> Result<(), FormattingError> {
    for sys in 0..NUM_SYSTEMS {
        let types = &opt.tobs[sys];
        if types.is_empty() {
            continue;
        }

        for (nth, chunk) in types.chunks(13).enumerate() {
            let mut content = if nth == 0 {
                format!("{}  {:3}", codes::SYSTEM_LETTERS[sys], types.len())
            } else {
                format!("{:6}", "")
            };

            for descriptor in chunk {
                content.push_str(&format!(" {:>3}", descriptor));
            }

            writeln!(w, "{}", header_line(&content, "SYS / # / OBS TYPES"))?;
        }
    }

    Ok(())
}

fn write_obs_types_v2<W: Write>(
    w: &mut BufWriter<W>,
    opt: &ConvOptions,
) -> Result<(), FormattingError> {
    let types = &opt.tobs[0];
    if types.is_empty() {
        return Ok(());
    }

    for (nth, chunk) in types.chunks(9).enumerate() {
        let mut content = if nth == 0 {
            format!("{:6}", types.len())
        } else {
            format!("{:6}", "")
        };

        for descriptor in chunk {
            content.push_str(&format!("{:>6}", descriptor));
        }

        writeln!(w, "{}", header_line(&content, "# / TYPES OF OBSERV"))?;
    }

    Ok(())
}

fn write_phase_shifts<W: Write>(
    w: &mut BufWriter<W>,
    opt: &ConvOptions,
) -> Result<(), FormattingError> {
    for sys in 0..NUM_SYSTEMS {
        for (descriptor, shift) in opt.shifts[sys].iter() {
            writeln!(
                w,
                "{}",
                header_line(
                    &format!("{} {:<3} {:8.5}", codes::SYSTEM_LETTERS[sys], descriptor, shift),
                    "SYS / PHASE SHIFT",
                )
            )?;
        }
    }

    Ok(())
}

fn write_glonass_slots<W: Write>(
    w: &mut BufWriter<W>,
    ctx: &HeaderContext,
) -> Result<(), FormattingError> {
    let channels: Vec<(usize, i8)> = ctx
        .glo_fcn
        .iter()
        .enumerate()
        .filter_map(|(slot, frq)| frq.map(|frq| (slot + 1, frq)))
        .collect();

    if channels.is_empty() {
        return Ok(());
    }

    for (nth, chunk) in channels.chunks(8).enumerate() {
        let mut content = if nth == 0 {
            format!("{:3}", channels.len())
        } else {
            format!("{:3}", "")
        };

        for (slot, frq) in chunk {
            content.push_str(&format!(" R{:02} {:2}", slot, frq));
        }

        writeln!(w, "{}", header_line(&content, "GLONASS SLOT / FRQ #"))?;
    }

    Ok(())
}

/// One observation epoch block, satellites kept in decoder order.
/// Disabled systems and excluded satellites are dropped here. Returns
/// the number of satellites written.
pub fn write_epoch<W: Write>(
    w: &mut BufWriter<W>,
    opt: &ConvOptions,
    epoch: &EpochData,
) -> Result<usize, FormattingError> {
    let selected: Vec<&ObsData> = epoch
        .observations
        .iter()
        .filter(|obs| {
            codes::system_index(obs.sv.constellation)
                .map(|sys| opt.navsys.has_system(sys))
                .unwrap_or(false)
                && !opt.is_excluded(obs.sv)
        })
        .collect();

    if selected.is_empty() {
        return Ok(0);
    }

    if opt.rnxver >= 300 {
        writeln!(
            w,
            "> {}  {}{:3}",
            epoch_v3(epoch.time),
            epoch.flag,
            selected.len(),
        )?;

        for obs in selected.iter() {
            let sys = codes::system_index(obs.sv.constellation).unwrap();
            write!(w, "{:x}", obs.sv)?;

            for descriptor in opt.tobs[sys].iter() {
                write_cell(w, opt, sys, obs, descriptor)?;
            }
            writeln!(w)?;
        }
    } else {
        write_epoch_line_v2(w, epoch, &selected)?;

        for obs in selected.iter() {
            let sys = codes::system_index(obs.sv.constellation).unwrap();
            let types = &opt.tobs[0];

            for (nth, descriptor) in types.iter().enumerate() {
                write_cell(w, opt, sys, obs, descriptor)?;

                if nth % 5 == 4 && nth < types.len() - 1 {
                    writeln!(w)?;
                }
            }
            writeln!(w)?;
        }
    }

    Ok(selected.len())
}

fn write_epoch_line_v2<W: Write>(
    w: &mut BufWriter<W>,
    epoch: &EpochData,
    selected: &[&ObsData],
) -> Result<(), FormattingError> {
    const SV_PER_LINE: usize = 12;

    write!(
        w,
        " {}  {}{:3}",
        epoch_v2(epoch.time),
        epoch.flag,
        selected.len(),
    )?;

    for (nth, obs) in selected.iter().enumerate() {
        if nth > 0 && nth % SV_PER_LINE == 0 {
            write!(w, "\n{:32}", "")?;
        }
        write!(w, "{:x}", obs.sv)?;
    }
    writeln!(w)?;

    Ok(())
}

/// Finds the observation slot serving one header type descriptor.
pub(crate) fn band_for_type(
    rnxver: u16,
    sys: usize,
    obs: &ObsData,
    descriptor: &str,
) -> Option<(usize, char)> {
    let kind = descriptor.chars().next()?;

    if rnxver >= 300 {
        let code = Code::from_mnemonic(&descriptor[1..])?;
        obs.bands
            .iter()
            .position(|band| band.code == Some(code))
            .map(|slot| (slot, kind))
    } else {
        for (slot, band) in obs.bands.iter().enumerate() {
            let Some(code) = band.code else {
                continue;
            };
            for k in ['C', 'L', 'D', 'S'] {
                if codes::to_ver2_type(sys, &format!("{}{}", k, code)) == descriptor {
                    return Some((slot, k));
                }
            }
        }
        None
    }
}

fn write_cell<W: Write>(
    w: &mut BufWriter<W>,
    opt: &ConvOptions,
    sys: usize,
    obs: &ObsData,
    descriptor: &str,
) -> Result<(), FormattingError> {
    const BLANK: &str = "                ";

    let Some((slot, kind)) = band_for_type(opt.rnxver, sys, obs, descriptor) else {
        write!(w, "{}", BLANK)?;
        return Ok(());
    };

    let band = &obs.bands[slot];
    let value = match kind {
        'C' => band.pseudorange,
        'L' => band.phase,
        'D' => band.doppler,
        'S' => band.snr,
        _ => 0.0,
    };

    if value == 0.0 {
        write!(w, "{}", BLANK)?;
        return Ok(());
    }

    write!(w, "{:14.3}", value)?;

    if kind == 'L' {
        match band.lli.wire_bits() {
            0 => write!(w, " ")?,
            bits => write!(w, "{}", bits)?,
        }
        match snr_digit(band.snr) {
            Some(digit) => write!(w, "{}", digit)?,
            None => write!(w, " ")?,
        }
    } else {
        write!(w, "  ")?;
    }

    Ok(())
}

/// Event start line: blank epoch columns, event digit, line count.
/// External events carry their epoch.
pub fn write_event_marker<W: Write>(
    w: &mut BufWriter<W>,
    rnxver: u16,
    time: Option<Epoch>,
    flag: EpochFlag,
    count: usize,
) -> Result<(), FormattingError> {
    match (rnxver >= 300, time) {
        (true, Some(t)) => writeln!(w, "> {}  {}{:3}", epoch_v3(t), flag, count)?,
        (true, None) => writeln!(w, ">{:31}{}{:3}", "", flag, count)?,
        (false, Some(t)) => writeln!(w, " {}  {}{:3}", epoch_v2(t), flag, count)?,
        (false, None) => writeln!(w, "{:32}{}{:3}", "", flag, count)?,
    }

    Ok(())
}

/// "New site occupation" event: the station parameters of the site
/// being left, as header-style lines.
pub fn write_new_site<W: Write>(
    w: &mut BufWriter<W>,
    rnxver: u16,
    staid: u32,
    info: &StationInfo,
) -> Result<(), FormattingError> {
    write_event_marker(w, rnxver, None, EpochFlag::NewSiteOccupation, 5)?;

    let marker = if info.marker_name.is_empty() {
        format!("{:04}", staid)
    } else {
        info.marker_name.clone()
    };
    writeln!(w, "{}", header_line(&marker, "MARKER NAME"))?;

    writeln!(
        w,
        "{}",
        header_line(
            &format!(
                "{:<20}{:<20}{:<20}",
                info.receiver_serial, info.receiver_descriptor, info.receiver_version,
            ),
            "REC # / TYPE / VERS",
        )
    )?;

    writeln!(
        w,
        "{}",
        header_line(
            &format!("{:<20}{:<20}", info.antenna_serial, info.antenna_descriptor),
            "ANT # / TYPE",
        )
    )?;

    writeln!(
        w,
        "{}",
        header_line(
            &format!(
                "{:14.4}{:14.4}{:14.4}",
                info.position[0], info.position[1], info.position[2],
            ),
            "APPROX POSITION XYZ",
        )
    )?;

    let delta = options::station_antenna_delta(info);
    writeln!(
        w,
        "{}",
        header_line(
            &format!("{:14.4}{:14.4}{:14.4}", delta[0], delta[1], delta[2]),
            "ANTENNA: DELTA H/E/N",
        )
    )?;

    Ok(())
}

//! SBAS message log: one fixed-width line per 250-bit frame.

use std::io::{BufWriter, Write};

use crate::{ephemeris::SbasMessage, errors::FormattingError};

/// "week tow prn : payload hex"
pub fn write_message<W: Write>(
    w: &mut BufWriter<W>,
    message: &SbasMessage,
) -> Result<(), FormattingError> {
    write!(
        w,
        "{:4} {:10.1} {:3} : ",
        message.week, message.tow, message.prn,
    )?;

    for byte in message.payload.iter() {
        write!(w, "{:02X}", byte)?;
    }
    writeln!(w)?;

    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn log_line_shape() {
        let mut payload = [0u8; 29];
        payload[0] = 0x53;
        payload[1] = 0x9A;

        let message = SbasMessage {
            prn: 129,
            week: 2086,
            tow: 345601.0,
            payload,
            lt_ephemeris: None,
        };

        let mut buf = BufWriter::new(Vec::new());
        write_message(&mut buf, &message).unwrap();

        let content = String::from_utf8(buf.into_inner().unwrap()).unwrap();
        assert_eq!(
            content,
            "2086   345601.0 129 : 539A000000000000000000000000000000000000000000000000000000\n",
        );
    }
}

//! Observation code registry: mnemonics, carrier slots, priorities,
//! revision gating and the RINEX v2 type rewrite.

use gnss::prelude::Constellation;

use crate::constants::NUM_SYSTEMS;

/// Fixed system ordering used by all per-system tables.
pub const SYS_GPS: usize = 0;
pub const SYS_GLO: usize = 1;
pub const SYS_GAL: usize = 2;
pub const SYS_QZS: usize = 3;
pub const SYS_SBS: usize = 4;
pub const SYS_BDS: usize = 5;
pub const SYS_IRN: usize = 6;

/// One letter per system, RINEX convention.
pub const SYSTEM_LETTERS: [char; NUM_SYSTEMS] = ['G', 'R', 'E', 'J', 'S', 'C', 'I'];

/// Registered 2-character code mnemonics. Index 0 is the empty code.
const OBS_CODES: [&str; 70] = [
    "", "1C", "1P", "1W", "1Y", "1M", "1N", "1S", "1L", "1E", // 0-9
    "1A", "1B", "1X", "1Z", "2C", "2D", "2S", "2L", "2X", "2P", // 10-19
    "2W", "2Y", "2M", "2N", "5I", "5Q", "5X", "7I", "7Q", "7X", // 20-29
    "6A", "6B", "6C", "6X", "6Z", "6S", "6L", "8L", "8I", "8Q", // 30-39
    "8X", "2I", "2Q", "6I", "6Q", "3I", "3Q", "3X", "1I", "1Q", // 40-49
    "5A", "5B", "5C", "9A", "9B", "9C", "9X", "1D", "5D", "5P", // 50-59
    "5Z", "6E", "7D", "7P", "7Z", "8D", "8P", "4A", "4B", "4X", // 60-69
];

/// Code priority within one carrier slot: earlier in the string wins.
/// One row per system, one string per carrier slot.
const CODE_PRIORITIES: [[&str; 5]; NUM_SYSTEMS] = [
    ["CPYWMNSLX", "PYWCMNDLSX", "IQX", "", ""], // GPS
    ["CPABX", "PCABX", "IQX", "", ""],          // GLO
    ["CABXZ", "IQX", "IQX", "ABCXZ", "IQX"],    // GAL
    ["CLSXZ", "LSX", "IQXDPZ", "LSXEZ", ""],    // QZS
    ["C", "IQX", "", "", ""],                   // SBS
    ["IQXDPAN", "IQXDPZ", "DPX", "IQXA", "DPX"], // BDS
    ["ABCX", "ABCX", "", "", ""],               // IRN
];

/// One registered observation code ("1C", "2W", ...).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Code(u8);

impl Code {
    pub fn from_mnemonic(mnemonic: &str) -> Option<Self> {
        OBS_CODES
            .iter()
            .position(|c| !c.is_empty() && *c == mnemonic)
            .map(|index| Self(index as u8))
    }

    pub fn mnemonic(&self) -> &'static str {
        OBS_CODES[self.0 as usize]
    }

    /// Carrier band character ('1', '2', '5', ...).
    pub fn band(&self) -> char {
        self.mnemonic().chars().next().unwrap_or(' ')
    }

    /// Tracking attribute character ('C', 'W', 'X', ...).
    pub fn attribute(&self) -> char {
        self.mnemonic().chars().nth(1).unwrap_or(' ')
    }

    /// 0-based index into the per-system enable mask.
    pub fn mask_index(&self) -> usize {
        self.0 as usize - 1
    }
}

impl std::fmt::Display for Code {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.mnemonic())
    }
}

impl std::str::FromStr for Code {
    type Err = ();
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_mnemonic(s).ok_or(())
    }
}

/// Position of a system in the fixed 7-system ordering.
pub fn system_index(constellation: Constellation) -> Option<usize> {
    match constellation {
        Constellation::GPS => Some(SYS_GPS),
        Constellation::Glonass => Some(SYS_GLO),
        Constellation::Galileo => Some(SYS_GAL),
        Constellation::QZSS => Some(SYS_QZS),
        Constellation::BeiDou => Some(SYS_BDS),
        Constellation::IRNSS => Some(SYS_IRN),
        c if c.is_sbas() => Some(SYS_SBS),
        _ => None,
    }
}

/// Carrier slot (0..NFREQ) of a code within a system,
/// None when the system does not broadcast on that band.
pub fn frequency_index(sys: usize, code: Code) -> Option<usize> {
    match (sys, code.band()) {
        (SYS_GPS, '1') => Some(0),
        (SYS_GPS, '2') => Some(1),
        (SYS_GPS, '5') => Some(2),
        (SYS_GLO, '1') | (SYS_GLO, '4') => Some(0),
        (SYS_GLO, '2') | (SYS_GLO, '6') => Some(1),
        (SYS_GLO, '3') => Some(2),
        (SYS_GAL, '1') => Some(0),
        (SYS_GAL, '7') => Some(1),
        (SYS_GAL, '5') => Some(2),
        (SYS_GAL, '6') => Some(3),
        (SYS_GAL, '8') => Some(4),
        (SYS_QZS, '1') => Some(0),
        (SYS_QZS, '2') => Some(1),
        (SYS_QZS, '5') => Some(2),
        (SYS_QZS, '6') => Some(3),
        (SYS_SBS, '1') => Some(0),
        (SYS_SBS, '5') => Some(1),
        (SYS_BDS, '1') | (SYS_BDS, '2') => Some(0),
        (SYS_BDS, '7') => Some(1),
        (SYS_BDS, '5') => Some(2),
        (SYS_BDS, '6') => Some(3),
        (SYS_BDS, '8') => Some(4),
        (SYS_IRN, '5') => Some(0),
        (SYS_IRN, '9') => Some(1),
        _ => None,
    }
}

/// Code priority within its carrier slot, higher wins, 0 when unranked.
pub fn priority(sys: usize, code: Code) -> u8 {
    let Some(slot) = frequency_index(sys, code) else {
        return 0;
    };

    match CODE_PRIORITIES[sys][slot].find(code.attribute()) {
        Some(position) => 14 - position as u8,
        None => 0,
    }
}

/// RINEX 3.0x minor revision in which the (system, code) pair appears,
/// None when the pair is not part of RINEX 3 at all.
pub fn rinex3_minor(sys: usize, code: Code) -> Option<u8> {
    let m = code.mnemonic();

    let minor = match sys {
        SYS_GPS => match m {
            "1C" | "1P" | "1W" | "1Y" | "1M" | "1N" | "2C" | "2D" | "2S" | "2L" | "2X" | "2P"
            | "2W" | "2Y" | "2M" | "2N" | "5I" | "5Q" | "5X" => 0,
            "1S" | "1L" | "1X" => 2,
            _ => return None,
        },
        SYS_GLO => match m {
            "1C" | "1P" | "2C" | "2P" => 0,
            "3I" | "3Q" | "3X" => 2,
            "4A" | "4B" | "4X" | "6A" | "6B" | "6X" => 4,
            _ => return None,
        },
        SYS_GAL => match m {
            "1A" | "1B" | "1C" | "1X" | "1Z" | "5I" | "5Q" | "5X" | "7I" | "7Q" | "7X" | "8I"
            | "8Q" | "8X" | "6A" | "6B" | "6C" | "6X" | "6Z" => 0,
            _ => return None,
        },
        SYS_QZS => match m {
            "1C" | "2S" | "2L" | "2X" | "5I" | "5Q" | "5X" | "6S" | "6L" | "6X" => 2,
            "1S" | "1L" | "1X" | "1Z" => 2,
            "5D" | "5P" | "5Z" | "6E" => 4,
            _ => return None,
        },
        SYS_SBS => match m {
            "1C" | "5I" | "5Q" | "5X" => 0,
            _ => return None,
        },
        SYS_BDS => match m {
            "1I" | "1Q" | "1X" => 1,
            "2I" | "2Q" | "2X" | "7I" | "7Q" | "7X" | "6I" | "6Q" | "6X" => 2,
            "1D" | "1P" | "5D" | "5P" | "5X" | "7D" | "7P" | "7Z" | "8D" | "8P" | "8X" | "6A" => 4,
            _ => return None,
        },
        SYS_IRN => match m {
            "5A" | "5B" | "5C" | "5X" | "9A" | "9B" | "9C" | "9X" => 3,
            _ => return None,
        },
        _ => return None,
    };

    Some(minor)
}

/// Rewrites a 3-character type descriptor ("C1C", "L2W", ...) into its
/// RINEX v2 2-character equivalent. The rules apply in order; unknown
/// combinations fall back to kind + band digit.
pub fn to_ver2_type(sys: usize, descriptor: &str) -> String {
    let mut chars = descriptor.chars();
    let kind = chars.next().unwrap_or(' ');
    let band = chars.next().unwrap_or(' ');
    let attribute = chars.next().unwrap_or(' ');
    let code = &descriptor[1..];

    if matches!(sys, SYS_GPS | SYS_QZS | SYS_SBS) && code == "1C" {
        return format!("{}A", kind);
    }
    if matches!(sys, SYS_GPS | SYS_QZS) && matches!(code, "1S" | "1L" | "1X") {
        return format!("{}B", kind);
    }
    if matches!(sys, SYS_GPS | SYS_QZS) && matches!(code, "2S" | "2L" | "2X") {
        return format!("{}C", kind);
    }
    if sys == SYS_GLO && code == "1C" {
        return format!("{}A", kind);
    }
    if sys == SYS_GLO && code == "2C" {
        return format!("{}D", kind);
    }
    if sys == SYS_BDS && matches!(code, "2I" | "2Q" | "2X") {
        return format!("{}2", kind);
    }
    if kind == 'C' && band == '1' && matches!(attribute, 'P' | 'W' | 'Y' | 'N') {
        return "P1".to_string();
    }
    if kind == 'C' && band == '2' && matches!(attribute, 'P' | 'W' | 'Y' | 'N' | 'D') {
        return "P2".to_string();
    }

    format!("{}{}", kind, band)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn mnemonic_roundtrip() {
        for mnemonic in ["1C", "2W", "5Q", "7I", "9A", "4X"] {
            let code = Code::from_mnemonic(mnemonic).unwrap();
            assert_eq!(code.mnemonic(), mnemonic);
        }
        assert!(Code::from_mnemonic("").is_none());
        assert!(Code::from_mnemonic("0Z").is_none());
    }

    #[test]
    fn frequency_slots() {
        let c1c = Code::from_mnemonic("1C").unwrap();
        let c2w = Code::from_mnemonic("2W").unwrap();
        let c7q = Code::from_mnemonic("7Q").unwrap();
        assert_eq!(frequency_index(SYS_GPS, c1c), Some(0));
        assert_eq!(frequency_index(SYS_GPS, c2w), Some(1));
        assert_eq!(frequency_index(SYS_GAL, c7q), Some(1));
        assert_eq!(frequency_index(SYS_SBS, c2w), None);
    }

    #[test]
    fn priorities_follow_strings() {
        let c1c = Code::from_mnemonic("1C").unwrap();
        let c1w = Code::from_mnemonic("1W").unwrap();
        assert!(priority(SYS_GPS, c1c) > priority(SYS_GPS, c1w));
        // unranked codes fall to zero
        let c9a = Code::from_mnemonic("9A").unwrap();
        assert_eq!(priority(SYS_GPS, c9a), 0);
    }

    #[test]
    fn revision_gate() {
        let c1c = Code::from_mnemonic("1C").unwrap();
        let c1x = Code::from_mnemonic("1X").unwrap();
        let c4a = Code::from_mnemonic("4A").unwrap();
        assert_eq!(rinex3_minor(SYS_GPS, c1c), Some(0));
        assert_eq!(rinex3_minor(SYS_GPS, c1x), Some(2));
        assert_eq!(rinex3_minor(SYS_GLO, c4a), Some(4));
        assert_eq!(rinex3_minor(SYS_SBS, c4a), None);
    }

    #[test]
    fn ver2_rewrite() {
        assert_eq!(to_ver2_type(SYS_GPS, "C1C"), "CA");
        assert_eq!(to_ver2_type(SYS_GPS, "L1C"), "LA");
        assert_eq!(to_ver2_type(SYS_GPS, "L2X"), "LC");
        assert_eq!(to_ver2_type(SYS_GLO, "C2C"), "CD");
        assert_eq!(to_ver2_type(SYS_BDS, "C2I"), "C2");
        assert_eq!(to_ver2_type(SYS_GPS, "C1W"), "P1");
        assert_eq!(to_ver2_type(SYS_GPS, "C2D"), "P2");
        assert_eq!(to_ver2_type(SYS_GPS, "L2W"), "L2");
        assert_eq!(to_ver2_type(SYS_GAL, "S5Q"), "S5");
    }
}

//! Single-byte control commands understood by the UM24C/UM25C/UM34C.
//!
//! Every command is one byte written to the link with no reply. The only byte
//! that triggers a response is [`REQUEST_DATA`], which is handled by the
//! session rather than exposed as a command.

use std::fmt;
use std::str::FromStr;

use super::error::{Result, Um25cError};

/// Request a new 130-byte measurement dump.
pub const REQUEST_DATA: u8 = 0xF0;

const NEXT_SCREEN: u8 = 0xF1;
const ROTATE_SCREEN: u8 = 0xF2;
const PREVIOUS_SCREEN: u8 = 0xF3;
const CLEAR_DATA_GROUP: u8 = 0xF4;

const DATA_GROUP_BASE: u8 = 0xA0;
const THRESHOLD_LOW_BASE: u8 = 0xB0; // 0.00 - 0.15 A
const THRESHOLD_HIGH_BASE: u8 = 0xC0; // 0.16 - 0.30 A
const BACKLIGHT_BASE: u8 = 0xD0;
const SCREENSAVER_BASE: u8 = 0xE0;

pub const MAX_DATA_GROUP: u8 = 9;
pub const MAX_THRESHOLD_CENTIAMPS: u8 = 30;
pub const MAX_BACKLIGHT_LEVEL: u8 = 5;
pub const MAX_SCREENSAVER_MINUTES: u8 = 9;

/// Intent of a command, used for logging and grouping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandFamily {
    Navigation,
    DataGroup,
    Threshold,
    Backlight,
    Screensaver,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    NextScreen,
    RotateScreen,
    PreviousScreen,
    ClearDataGroup,
    /// Select the active accumulation group (0-9).
    SelectDataGroup(u8),
    /// Threshold for threshold-based recording, in hundredths of an amp (0-30).
    SetThreshold(u8),
    /// Backlight level 0-5.
    SetBacklight(u8),
    /// Screen timeout in minutes 0-9, 0 disables the screensaver.
    SetScreensaver(u8),
}

impl Command {
    pub fn select_data_group(group: u8) -> Result<Self> {
        if group > MAX_DATA_GROUP {
            return Err(Um25cError::out_of_range("data group", group));
        }
        Ok(Command::SelectDataGroup(group))
    }

    pub fn set_backlight(level: u8) -> Result<Self> {
        if level > MAX_BACKLIGHT_LEVEL {
            return Err(Um25cError::out_of_range("backlight level", level));
        }
        Ok(Command::SetBacklight(level))
    }

    pub fn set_screensaver(minutes: u8) -> Result<Self> {
        if minutes > MAX_SCREENSAVER_MINUTES {
            return Err(Um25cError::out_of_range("screensaver minutes", minutes));
        }
        Ok(Command::SetScreensaver(minutes))
    }

    pub fn disable_screensaver() -> Self {
        Command::SetScreensaver(0)
    }

    pub fn set_threshold_centiamps(centiamps: u8) -> Result<Self> {
        if centiamps > MAX_THRESHOLD_CENTIAMPS {
            return Err(Um25cError::out_of_range(
                "threshold current",
                format!("{:.2} A", f64::from(centiamps) / 100.0),
            ));
        }
        Ok(Command::SetThreshold(centiamps))
    }

    /// Build a threshold command from a value in amps. Only 0.00-0.30 A in
    /// 0.01 A steps is accepted; nothing is clamped or rounded.
    pub fn set_threshold_amps(amps: f64) -> Result<Self> {
        let scaled = amps * 100.0;
        let steps = scaled.round();
        if !amps.is_finite()
            || (scaled - steps).abs() > 1e-6
            || steps < 0.0
            || steps > f64::from(MAX_THRESHOLD_CENTIAMPS)
        {
            return Err(Um25cError::out_of_range("threshold current", format!("{amps} A")));
        }
        Ok(Command::SetThreshold(steps as u8))
    }

    pub fn threshold_amps(&self) -> Option<f64> {
        match self {
            Command::SetThreshold(centiamps) => Some(f64::from(*centiamps) / 100.0),
            _ => None,
        }
    }

    pub fn family(&self) -> CommandFamily {
        match self {
            Command::NextScreen
            | Command::RotateScreen
            | Command::PreviousScreen
            | Command::ClearDataGroup => CommandFamily::Navigation,
            Command::SelectDataGroup(_) => CommandFamily::DataGroup,
            Command::SetThreshold(_) => CommandFamily::Threshold,
            Command::SetBacklight(_) => CommandFamily::Backlight,
            Command::SetScreensaver(_) => CommandFamily::Screensaver,
        }
    }
}

/// Map a command onto its wire byte. Variants built directly with an
/// argument outside the documented range are rejected.
pub fn encode_command(command: &Command) -> Result<u8> {
    let byte = match *command {
        Command::NextScreen => NEXT_SCREEN,
        Command::RotateScreen => ROTATE_SCREEN,
        Command::PreviousScreen => PREVIOUS_SCREEN,
        Command::ClearDataGroup => CLEAR_DATA_GROUP,
        Command::SelectDataGroup(group) => {
            checked_offset(DATA_GROUP_BASE, group, MAX_DATA_GROUP)?
        }
        Command::SetThreshold(centiamps) if centiamps <= 15 => {
            THRESHOLD_LOW_BASE + centiamps
        }
        Command::SetThreshold(centiamps) => {
            checked_offset(THRESHOLD_HIGH_BASE, centiamps - 16, MAX_THRESHOLD_CENTIAMPS - 16)?
        }
        Command::SetBacklight(level) => {
            checked_offset(BACKLIGHT_BASE, level, MAX_BACKLIGHT_LEVEL)?
        }
        Command::SetScreensaver(minutes) => {
            checked_offset(SCREENSAVER_BASE, minutes, MAX_SCREENSAVER_MINUTES)?
        }
    };
    Ok(byte)
}

fn checked_offset(base: u8, offset: u8, max: u8) -> Result<u8> {
    if offset > max {
        return Err(Um25cError::InvalidCommand(base.wrapping_add(offset)));
    }
    Ok(base + offset)
}

impl TryFrom<u8> for Command {
    type Error = Um25cError;

    fn try_from(byte: u8) -> Result<Self> {
        let low = byte & 0x0F;
        let command = match byte {
            NEXT_SCREEN => Command::NextScreen,
            ROTATE_SCREEN => Command::RotateScreen,
            PREVIOUS_SCREEN => Command::PreviousScreen,
            CLEAR_DATA_GROUP => Command::ClearDataGroup,
            0xA0..=0xA9 => Command::SelectDataGroup(low),
            0xB0..=0xBF => Command::SetThreshold(low),
            0xC0..=0xCE => Command::SetThreshold(low + 16),
            0xD0..=0xD5 => Command::SetBacklight(low),
            0xE0..=0xE9 => Command::SetScreensaver(low),
            _ => return Err(Um25cError::InvalidCommand(byte)),
        };
        Ok(command)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::NextScreen => write!(f, "next"),
            Command::RotateScreen => write!(f, "rotate"),
            Command::PreviousScreen => write!(f, "prev"),
            Command::ClearDataGroup => write!(f, "clear"),
            Command::SelectDataGroup(group) => write!(f, "group={group}"),
            Command::SetThreshold(centiamps) => {
                write!(f, "threshold={:.2}", f64::from(*centiamps) / 100.0)
            }
            Command::SetBacklight(level) => write!(f, "backlight={level}"),
            Command::SetScreensaver(minutes) => write!(f, "screensaver={minutes}"),
        }
    }
}

/// Parses the same text the `Display` impl produces, plus raw `0xNN` bytes.
impl FromStr for Command {
    type Err = Um25cError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            let byte = u8::from_str_radix(hex, 16)
                .map_err(|_| Um25cError::out_of_range("command byte", s))?;
            return Command::try_from(byte);
        }

        let (name, value) = match s.split_once('=') {
            Some((name, value)) => (name.trim(), Some(value.trim())),
            None => (s, None),
        };
        let small = |what: &'static str| -> Result<u8> {
            let value = value.ok_or_else(|| Um25cError::out_of_range(what, "missing value"))?;
            value.parse::<u8>().map_err(|_| Um25cError::out_of_range(what, value))
        };

        match name.to_ascii_lowercase().as_str() {
            "next" => Ok(Command::NextScreen),
            "rotate" => Ok(Command::RotateScreen),
            "prev" | "previous" => Ok(Command::PreviousScreen),
            "clear" => Ok(Command::ClearDataGroup),
            "group" => Command::select_data_group(small("data group")?),
            "backlight" => Command::set_backlight(small("backlight level")?),
            "screensaver" => Command::set_screensaver(small("screensaver minutes")?),
            "threshold" => {
                let value = value
                    .ok_or_else(|| Um25cError::out_of_range("threshold current", "missing value"))?;
                let amps = value
                    .parse::<f64>()
                    .map_err(|_| Um25cError::out_of_range("threshold current", value))?;
                Command::set_threshold_amps(amps)
            }
            _ => Err(Um25cError::out_of_range("command", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threshold_uses_two_byte_ranges() {
        let cases = [(0.00, 0xB0), (0.07, 0xB7), (0.15, 0xBF), (0.16, 0xC0), (0.19, 0xC3), (0.30, 0xCE)];
        for (amps, byte) in cases {
            let command = Command::set_threshold_amps(amps).unwrap();
            assert_eq!(encode_command(&command).unwrap(), byte, "{amps} A");
        }
    }

    #[test]
    fn every_threshold_step_decodes_back_to_its_value() {
        for step in 0..=30u8 {
            let amps = f64::from(step) / 100.0;
            let byte = encode_command(&Command::set_threshold_amps(amps).unwrap()).unwrap();
            let decoded = Command::try_from(byte).unwrap();
            assert_eq!(decoded.threshold_amps(), Some(amps));
        }
    }

    #[test]
    fn threshold_outside_range_or_step_is_rejected() {
        for amps in [-0.01, 0.31, 0.125, 1.0, f64::NAN] {
            assert!(matches!(
                Command::set_threshold_amps(amps),
                Err(Um25cError::OutOfRange { .. })
            ));
        }
    }

    #[test]
    fn semantic_constructors_reject_out_of_range_values() {
        assert!(matches!(Command::set_backlight(6), Err(Um25cError::OutOfRange { .. })));
        assert!(matches!(Command::select_data_group(10), Err(Um25cError::OutOfRange { .. })));
        assert!(matches!(Command::set_screensaver(10), Err(Um25cError::OutOfRange { .. })));
        assert!(matches!(Command::set_threshold_centiamps(31), Err(Um25cError::OutOfRange { .. })));
    }

    #[test]
    fn hand_built_variants_outside_range_fail_to_encode() {
        assert!(matches!(
            encode_command(&Command::SetBacklight(6)),
            Err(Um25cError::InvalidCommand(0xD6))
        ));
        assert!(matches!(
            encode_command(&Command::SelectDataGroup(10)),
            Err(Um25cError::InvalidCommand(_))
        ));
        assert!(matches!(
            encode_command(&Command::SetThreshold(31)),
            Err(Um25cError::InvalidCommand(0xCF))
        ));
        assert!(matches!(
            encode_command(&Command::SetScreensaver(200)),
            Err(Um25cError::InvalidCommand(_))
        ));
    }

    #[test]
    fn fixed_commands_encode_to_their_bytes() {
        assert_eq!(encode_command(&Command::NextScreen).unwrap(), 0xF1);
        assert_eq!(encode_command(&Command::RotateScreen).unwrap(), 0xF2);
        assert_eq!(encode_command(&Command::PreviousScreen).unwrap(), 0xF3);
        assert_eq!(encode_command(&Command::ClearDataGroup).unwrap(), 0xF4);
        assert_eq!(encode_command(&Command::SelectDataGroup(5)).unwrap(), 0xA5);
        assert_eq!(encode_command(&Command::SetBacklight(3)).unwrap(), 0xD3);
        assert_eq!(encode_command(&Command::disable_screensaver()).unwrap(), 0xE0);
    }

    #[test]
    fn request_byte_and_unknown_bytes_are_not_commands() {
        for byte in [REQUEST_DATA, 0xAA, 0xCF, 0xD6, 0xEA, 0xF5, 0x00] {
            assert!(matches!(Command::try_from(byte), Err(Um25cError::InvalidCommand(b)) if b == byte));
        }
    }

    #[test]
    fn parses_command_text() {
        assert_eq!("backlight=3".parse::<Command>().unwrap(), Command::SetBacklight(3));
        assert_eq!("group=5".parse::<Command>().unwrap(), Command::SelectDataGroup(5));
        assert_eq!("screensaver=0".parse::<Command>().unwrap(), Command::SetScreensaver(0));
        assert_eq!("threshold=0.19".parse::<Command>().unwrap(), Command::SetThreshold(19));
        assert_eq!("prev".parse::<Command>().unwrap(), Command::PreviousScreen);
        assert_eq!("0xD3".parse::<Command>().unwrap(), Command::SetBacklight(3));
        assert!("backlight=6".parse::<Command>().is_err());
        assert!("0xF0".parse::<Command>().is_err());
        assert!("jump".parse::<Command>().is_err());
    }

    #[test]
    fn display_round_trips_through_parse() {
        for command in [Command::SetThreshold(16), Command::ClearDataGroup, Command::SetBacklight(0)] {
            assert_eq!(command.to_string().parse::<Command>().unwrap(), command);
        }
    }

    #[test]
    fn families() {
        assert_eq!(Command::RotateScreen.family(), CommandFamily::Navigation);
        assert_eq!(Command::SelectDataGroup(1).family(), CommandFamily::DataGroup);
        assert_eq!(Command::SetThreshold(1).family(), CommandFamily::Threshold);
        assert_eq!(Command::SetBacklight(1).family(), CommandFamily::Backlight);
        assert_eq!(Command::SetScreensaver(1).family(), CommandFamily::Screensaver);
    }
}

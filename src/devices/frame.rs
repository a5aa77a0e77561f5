//! Decoding of the 130-byte measurement dump sent in reply to `0xF0`.
//!
//! All fields are big-endian and unsigned. Offsets (inclusive):
//!
//! | Bytes     | Field                                   |
//! |-----------|-----------------------------------------|
//! | 0-1       | start marker / model id                 |
//! | 2-3       | voltage, mV                             |
//! | 4-5       | current, 0.1 mA                         |
//! | 6-9       | power, mW                               |
//! | 10-11     | temperature, C                          |
//! | 12-13     | temperature, F                          |
//! | 14-15     | selected data group                     |
//! | 16-95     | 10 x (mAh u32, mWh u32) data groups     |
//! | 96-97     | USB D+, cV                              |
//! | 98-99     | USB D-, cV                              |
//! | 100-101   | charging mode                           |
//! | 102-105   | threshold recording mAh                 |
//! | 106-109   | threshold recording mWh                 |
//! | 110-111   | threshold current setting, cA           |
//! | 112-115   | threshold recording duration, s         |
//! | 116-117   | threshold recording active              |
//! | 118-119   | screen timeout, minutes                 |
//! | 120-121   | backlight level                         |
//! | 122-125   | resistance, 0.1 ohm                     |
//! | 126-127   | active screen index                     |
//! | 128-129   | stop marker                             |

use std::fmt;

use serde::Serialize;
use tracing::debug;

use super::error::{Result, Um25cError};

pub const FRAME_LEN: usize = 130;
pub const DATA_GROUP_COUNT: usize = 10;

/// Stop marker seen on every UM24C/UM25C so far. Not checked.
pub const USUAL_STOP_MARKER: u16 = 0xFFF1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Model {
    UM24C,
    UM25C,
    UM34C,
    Unknown(u16),
}

impl From<u16> for Model {
    fn from(id: u16) -> Self {
        match id {
            0x0963 => Model::UM24C,
            0x09C9 => Model::UM25C,
            0x0D4C => Model::UM34C,
            other => Model::Unknown(other),
        }
    }
}

/// Fast-charge protocol detected on the USB data lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ChargingMode {
    Normal,
    Qc2,
    Qc3,
    Apple2_4A,
    Apple2_1A,
    Apple1_0A,
    Apple0_5A,
    Dcp1_5A,
    Samsung,
    Other(u16),
}

impl From<u16> for ChargingMode {
    fn from(code: u16) -> Self {
        match code {
            0 => ChargingMode::Normal,
            1 => ChargingMode::Qc2,
            2 => ChargingMode::Qc3,
            3 => ChargingMode::Apple2_4A,
            4 => ChargingMode::Apple2_1A,
            5 => ChargingMode::Apple1_0A,
            6 => ChargingMode::Apple0_5A,
            7 => ChargingMode::Dcp1_5A,
            8 => ChargingMode::Samsung,
            other => ChargingMode::Other(other),
        }
    }
}

impl fmt::Display for ChargingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChargingMode::Normal => write!(f, "UNKNOWN"),
            ChargingMode::Qc2 => write!(f, "QC2"),
            ChargingMode::Qc3 => write!(f, "QC3"),
            ChargingMode::Apple2_4A => write!(f, "APP2.4A"),
            ChargingMode::Apple2_1A => write!(f, "APP2.1A"),
            ChargingMode::Apple1_0A => write!(f, "APP1.0A"),
            ChargingMode::Apple0_5A => write!(f, "APP0.5A"),
            ChargingMode::Dcp1_5A => write!(f, "DCP1.5A"),
            ChargingMode::Samsung => write!(f, "SAMSUNG"),
            ChargingMode::Other(code) => write!(f, "mode {code}"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DataGroup {
    pub accumulated_mah: u32,
    pub accumulated_mwh: u32,
}

/// One decoded measurement dump. Group 0 is the ephemeral group.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MeasurementFrame {
    pub start_marker: u16,
    pub voltage_volts: f64,
    pub current_amps: f64,
    pub power_watts: f64,
    pub temperature_celsius: u16,
    pub temperature_fahrenheit: u16,
    pub selected_group: u16,
    pub groups: [DataGroup; DATA_GROUP_COUNT],
    pub usb_dp_volts: f64,
    pub usb_dn_volts: f64,
    pub charging_mode: u16,
    pub threshold_mah: u32,
    pub threshold_mwh: u32,
    pub threshold_current_setting_amps: f64,
    pub threshold_duration_seconds: u32,
    pub threshold_recording_active: bool,
    pub screen_timeout_minutes: u16,
    pub backlight_level: u16,
    pub resistance_ohms: f64,
    pub active_screen_index: u16,
    pub stop_marker: u16,
}

impl MeasurementFrame {
    pub fn model(&self) -> Model {
        Model::from(self.start_marker)
    }

    pub fn charging_mode_kind(&self) -> ChargingMode {
        ChargingMode::from(self.charging_mode)
    }

    pub fn selected(&self) -> Option<&DataGroup> {
        self.groups.get(usize::from(self.selected_group))
    }
}

struct FrameReader<'a> {
    bytes: &'a [u8],
}

impl FrameReader<'_> {
    fn array<const N: usize>(&self, offset: usize) -> Result<[u8; N]> {
        self.bytes
            .get(offset..offset + N)
            .and_then(|slice| slice.try_into().ok())
            .ok_or_else(|| {
                Um25cError::MalformedFrame(format!("no {N}-byte field at offset {offset}"))
            })
    }

    fn u16(&self, offset: usize) -> Result<u16> {
        self.array::<2>(offset).map(u16::from_be_bytes)
    }

    fn u32(&self, offset: usize) -> Result<u32> {
        self.array::<4>(offset).map(u32::from_be_bytes)
    }
}

pub fn decode_frame(bytes: &[u8]) -> Result<MeasurementFrame> {
    if bytes.len() < FRAME_LEN {
        return Err(Um25cError::TruncatedFrame {
            expected: FRAME_LEN,
            actual: bytes.len(),
        });
    }
    if bytes.len() > FRAME_LEN {
        return Err(Um25cError::MalformedFrame(format!(
            "expected {FRAME_LEN} bytes, got {}",
            bytes.len()
        )));
    }

    let r = FrameReader { bytes };

    let mut groups = [DataGroup::default(); DATA_GROUP_COUNT];
    for (i, group) in groups.iter_mut().enumerate() {
        let offset = 16 + i * 8;
        *group = DataGroup {
            accumulated_mah: r.u32(offset)?,
            accumulated_mwh: r.u32(offset + 4)?,
        };
    }

    let frame = MeasurementFrame {
        start_marker: r.u16(0)?,
        voltage_volts: f64::from(r.u16(2)?) / 1_000.0,
        current_amps: f64::from(r.u16(4)?) / 10_000.0,
        power_watts: f64::from(r.u32(6)?) / 1_000.0,
        temperature_celsius: r.u16(10)?,
        temperature_fahrenheit: r.u16(12)?,
        selected_group: r.u16(14)?,
        groups,
        usb_dp_volts: f64::from(r.u16(96)?) / 100.0,
        usb_dn_volts: f64::from(r.u16(98)?) / 100.0,
        charging_mode: r.u16(100)?,
        threshold_mah: r.u32(102)?,
        threshold_mwh: r.u32(106)?,
        threshold_current_setting_amps: f64::from(r.u16(110)?) / 100.0,
        threshold_duration_seconds: r.u32(112)?,
        threshold_recording_active: r.u16(116)? != 0,
        screen_timeout_minutes: r.u16(118)?,
        backlight_level: r.u16(120)?,
        resistance_ohms: f64::from(r.u32(122)?) / 10.0,
        active_screen_index: r.u16(126)?,
        stop_marker: r.u16(128)?,
    };

    if frame.stop_marker != USUAL_STOP_MARKER {
        debug!("Unexpected stop marker 0x{:04x}", frame.stop_marker);
    }

    Ok(frame)
}

//! Register catalog of Corsair Link controllers.
//!
//! Every addressable register has a fixed address, a declared byte width and a
//! writability flag. The table is static and only used to validate and build
//! operations.

/// Static metadata of one register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegisterInfo {
    pub address: u8,
    pub width: u8,
    pub writable: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Register {
    /// Product identifier.
    Id = 0x00,
    FirmwareId = 0x01,
    /// ASCII device name, NUL padded.
    Name = 0x02,
    /// 0 when the device is healthy.
    Status = 0x03,
    /// LED addressed by the LED registers below.
    SelectedLed = 0x04,
    LedsCount = 0x05,
    LedMode = 0x06,
    /// RGB colour currently shown by the selected LED.
    CurrentColor = 0x07,
    ReportedLedTemp = 0x08,
    /// Temperature curve of the selected LED, 3 x i16 (8.8 fixed point).
    TempVals = 0x09,
    /// Colours matching `TempVals`, 3 x RGB.
    TempColors = 0x0a,
    /// Static and multicolour table, always 4 x RGB.
    Colors = 0x0b,
    /// Sensor addressed by the sensor registers below.
    SelectedSensor = 0x0c,
    SensorsCount = 0x0d,
    CurrentTemp = 0x0e,
    TempLimit = 0x0f,
    /// Fan or pump addressed by the fan registers below.
    SelectedFan = 0x10,
    FansCount = 0x11,
    FanMode = 0x12,
    FanPwm = 0x13,
    /// Target RPM of the selected fan.
    Rpm = 0x14,
    /// Temperature reported to the selected fan's controller, usually write-only.
    ReportedFanTemp = 0x15,
    CurrentRpm = 0x16,
    /// Highest RPM seen on the selected fan since power-on.
    MaxEverRpm = 0x17,
    /// Underspeed threshold.
    FanUst = 0x18,
    /// 5 x u16 RPM points of the custom curve.
    FanRpmTable = 0x19,
    /// 5 x u16 temperature points of the custom curve.
    FanTempTable = 0x1a,
}

impl Register {
    pub const ALL: [Register; 27] = [
        Register::Id,
        Register::FirmwareId,
        Register::Name,
        Register::Status,
        Register::SelectedLed,
        Register::LedsCount,
        Register::LedMode,
        Register::CurrentColor,
        Register::ReportedLedTemp,
        Register::TempVals,
        Register::TempColors,
        Register::Colors,
        Register::SelectedSensor,
        Register::SensorsCount,
        Register::CurrentTemp,
        Register::TempLimit,
        Register::SelectedFan,
        Register::FansCount,
        Register::FanMode,
        Register::FanPwm,
        Register::Rpm,
        Register::ReportedFanTemp,
        Register::CurrentRpm,
        Register::MaxEverRpm,
        Register::FanUst,
        Register::FanRpmTable,
        Register::FanTempTable,
    ];

    pub const fn address(self) -> u8 {
        self as u8
    }

    pub const fn info(self) -> RegisterInfo {
        use Register::*;

        let (width, writable) = match self {
            Id => (1, false),
            FirmwareId => (2, false),
            Name => (8, false),
            Status => (1, false),
            SelectedLed => (1, true),
            LedsCount => (1, false),
            LedMode => (1, true),
            CurrentColor => (3, false),
            ReportedLedTemp => (2, true),
            TempVals => (6, true),
            TempColors => (9, true),
            Colors => (12, true),
            SelectedSensor => (1, true),
            SensorsCount => (1, false),
            CurrentTemp => (2, false),
            TempLimit => (2, true),
            SelectedFan => (1, true),
            FansCount => (1, false),
            FanMode => (1, true),
            FanPwm => (1, true),
            Rpm => (2, true),
            ReportedFanTemp => (2, true),
            CurrentRpm => (2, false),
            MaxEverRpm => (2, false),
            FanUst => (2, false),
            FanRpmTable => (10, true),
            FanTempTable => (10, true),
        };
        RegisterInfo {
            address: self as u8,
            width,
            writable,
        }
    }

    pub const fn width(self) -> u8 {
        self.info().width
    }

    pub const fn is_writable(self) -> bool {
        self.info().writable
    }
}

impl TryFrom<u8> for Register {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Register::ALL
            .get(value as usize)
            .copied()
            .ok_or(value)
    }
}

/// Operating mode of a fan or pump.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FanMode {
    FixedPwm = 0x02,
    FixedRpm = 0x04,
    Default = 0x06,
    Quiet = 0x08,
    Balanced = 0x0a,
    Performance = 0x0c,
    /// Uses the RPM/temperature curve stored on the device.
    Custom = 0x0e,
}

impl TryFrom<u8> for FanMode {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0x02 => FanMode::FixedPwm,
            0x04 => FanMode::FixedRpm,
            0x06 => FanMode::Default,
            0x08 => FanMode::Quiet,
            0x0a => FanMode::Balanced,
            0x0c => FanMode::Performance,
            0x0e => FanMode::Custom,
            other => return Err(other),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum LedMode {
    Static = 0x00,
    /// Cycles 2 colours.
    Multi2 = 0x4b,
    /// Cycles 4 colours.
    Multi4 = 0x8b,
    /// Colour follows the temperature curve (3 colours).
    Temperature = 0xc0,
}

impl TryFrom<u8> for LedMode {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0x00 => LedMode::Static,
            0x4b => LedMode::Multi2,
            0x8b => LedMode::Multi4,
            0xc0 => LedMode::Temperature,
            other => return Err(other),
        })
    }
}

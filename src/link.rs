//! Fans, sensors and LEDs of a connected controller.

use std::{fmt, str::FromStr};

use anyhow::Result;
use scroll::{LE, Pread};

use crate::driver::Driver;
use crate::protocol::Opcode;
use crate::queue::CommandQueue;
use crate::register::{FanMode, LedMode, Register};
use crate::transport::Transport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FirmwareVersion {
    pub major: u8,
    pub minor: u8,
    pub patch: u8,
}

impl FirmwareVersion {
    /// `[0xMm, patch]`, major and minor share the first byte.
    fn from_raw(raw: [u8; 2]) -> Self {
        FirmwareVersion {
            major: (raw[0] >> 4) & 0xf,
            minor: raw[0] & 0xf,
            patch: raw[1],
        }
    }
}

impl fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub id: u8,
    pub product_name: String,
    pub firmware: FirmwareVersion,
    pub fans: u8,
    pub leds: u8,
    pub sensors: u8,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Color { r, g, b }
    }

    fn from_slice(raw: &[u8]) -> Self {
        Color::new(raw[0], raw[1], raw[2])
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", hex::encode([self.r, self.g, self.b]))
    }
}

impl FromStr for Color {
    type Err = hex::FromHexError;

    /// `rrggbb`, optionally prefixed with `#`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut rgb = [0u8; 3];
        hex::decode_to_slice(s.trim_start_matches('#'), &mut rgb)?;
        Ok(Color::new(rgb[0], rgb[1], rgb[2]))
    }
}

/// A connected controller.
pub struct LinkDevice<T: Transport> {
    driver: Driver<T>,
    info: DeviceInfo,
}

impl<T: Transport> LinkDevice<T> {
    /// Run the self-test command and read the device description.
    pub fn connect(mut driver: Driver<T>) -> Result<Self> {
        driver.clear();
        let self_test = driver.queue().enqueue_direct(Opcode::SelfTest, &[])?;
        driver.flush()?;
        log::debug!("self-test #{}: {:?}", self_test, driver.last_frame().map(hex::encode));
        driver.clear();

        // The response frame barely fits all of these.
        let q = driver.queue();
        let id = q.read1(Register::Id)?;
        let name = q.read(Register::Name, Register::Name.width())?;
        let firmware = q.read2(Register::FirmwareId)?;
        let fans = q.read1(Register::FansCount)?;
        let leds = q.read1(Register::LedsCount)?;
        let sensors = q.read1(Register::SensorsCount)?;
        driver.flush()?;

        let raw_name = response(&driver, name)?;
        let end = raw_name.iter().position(|&c| c == 0).unwrap_or(raw_name.len());
        let firmware = response(&driver, firmware)?;
        anyhow::ensure!(firmware.len() == 2, "short firmware id response");

        let info = DeviceInfo {
            id: read_u8(&driver, id)?,
            product_name: String::from_utf8_lossy(&raw_name[..end]).into_owned(),
            firmware: FirmwareVersion::from_raw([firmware[0], firmware[1]]),
            fans: read_u8(&driver, fans)?,
            leds: read_u8(&driver, leds)?,
            sensors: read_u8(&driver, sensors)?,
        };
        driver.clear();

        if info.id == 0 {
            log::warn!(
                "{} reports product id 0, the device may need a reset",
                info.product_name
            );
        }
        Ok(LinkDevice { driver, info })
    }

    pub fn info(&self) -> &DeviceInfo {
        &self.info
    }

    /// Whether the status register reads 0.
    pub fn is_ok(&mut self) -> Result<bool> {
        self.driver.clear();
        let id = self.driver.queue().read1(Register::Status)?;
        self.driver.flush()?;
        Ok(read_u8(&self.driver, id)? == 0)
    }

    pub fn fan(&mut self, index: u8) -> Result<Fan<'_, T>> {
        anyhow::ensure!(index < self.info.fans, "no fan #{}", index);
        Ok(Fan {
            driver: &mut self.driver,
            index,
        })
    }

    pub fn sensor(&mut self, index: u8) -> Result<Sensor<'_, T>> {
        anyhow::ensure!(index < self.info.sensors, "no sensor #{}", index);
        Ok(Sensor {
            driver: &mut self.driver,
            index,
        })
    }

    pub fn led(&mut self, index: u8) -> Result<Led<'_, T>> {
        anyhow::ensure!(index < self.info.leds, "no LED #{}", index);
        Ok(Led {
            driver: &mut self.driver,
            index,
        })
    }

    pub fn driver_mut(&mut self) -> &mut Driver<T> {
        &mut self.driver
    }

    pub fn into_driver(self) -> Driver<T> {
        self.driver
    }
}

/// A fan or pump.
pub struct Fan<'a, T: Transport> {
    driver: &'a mut Driver<T>,
    index: u8,
}

impl<T: Transport> Fan<'_, T> {
    pub fn index(&self) -> u8 {
        self.index
    }

    pub fn mode(&mut self) -> Result<FanMode> {
        let raw = self.read_u8(Register::FanMode)?;
        FanMode::try_from(raw).map_err(|m| anyhow::format_err!("unknown fan mode 0x{:02x}", m))
    }

    pub fn set_mode(&mut self, mode: FanMode) -> Result<()> {
        self.write(|q| q.write1(Register::FanMode, mode as u8))
    }

    pub fn pwm(&mut self) -> Result<u8> {
        self.read_u8(Register::FanPwm)
    }

    pub fn set_pwm(&mut self, pwm: u8) -> Result<()> {
        self.write(|q| q.write1(Register::FanPwm, pwm))
    }

    /// Target RPM.
    pub fn rpm(&mut self) -> Result<u16> {
        self.read_u16(Register::Rpm)
    }

    pub fn set_rpm(&mut self, rpm: u16) -> Result<()> {
        self.write(|q| q.write2(Register::Rpm, rpm))
    }

    pub fn current_rpm(&mut self) -> Result<u16> {
        self.read_u16(Register::CurrentRpm)
    }

    pub fn max_rpm(&mut self) -> Result<u16> {
        self.read_u16(Register::MaxEverRpm)
    }

    pub fn underspeed_threshold(&mut self) -> Result<u16> {
        self.read_u16(Register::FanUst)
    }

    /// Temperature reported to the fan controller, in °C.
    pub fn reported_temp(&mut self) -> Result<f32> {
        Ok(from_fixed(self.read_u16(Register::ReportedFanTemp)?))
    }

    pub fn set_reported_temp(&mut self, celsius: f32) -> Result<()> {
        self.write(|q| q.write2(Register::ReportedFanTemp, to_fixed(celsius)))
    }

    fn read_u8(&mut self, register: Register) -> Result<u8> {
        let id = select_and(self.driver, Register::SelectedFan, self.index, |q| {
            q.read1(register)
        })?;
        read_u8(self.driver, id)
    }

    fn read_u16(&mut self, register: Register) -> Result<u16> {
        let id = select_and(self.driver, Register::SelectedFan, self.index, |q| {
            q.read2(register)
        })?;
        read_u16(self.driver, id)
    }

    fn write(&mut self, op: impl FnOnce(&mut CommandQueue) -> crate::Result<u8>) -> Result<()> {
        select_and(self.driver, Register::SelectedFan, self.index, op)?;
        Ok(())
    }
}

/// A temperature sensor.
pub struct Sensor<'a, T: Transport> {
    driver: &'a mut Driver<T>,
    index: u8,
}

impl<T: Transport> Sensor<'_, T> {
    pub fn index(&self) -> u8 {
        self.index
    }

    /// Current temperature in °C.
    pub fn current_temp(&mut self) -> Result<f32> {
        Ok(from_fixed(self.read_u16(Register::CurrentTemp)?))
    }

    pub fn temp_limit(&mut self) -> Result<f32> {
        Ok(from_fixed(self.read_u16(Register::TempLimit)?))
    }

    pub fn set_temp_limit(&mut self, celsius: f32) -> Result<()> {
        select_and(self.driver, Register::SelectedSensor, self.index, |q| {
            q.write2(Register::TempLimit, to_fixed(celsius))
        })?;
        Ok(())
    }

    fn read_u16(&mut self, register: Register) -> Result<u16> {
        let id = select_and(self.driver, Register::SelectedSensor, self.index, |q| {
            q.read2(register)
        })?;
        read_u16(self.driver, id)
    }
}

/// An addressable LED.
pub struct Led<'a, T: Transport> {
    driver: &'a mut Driver<T>,
    index: u8,
}

impl<T: Transport> Led<'_, T> {
    pub fn index(&self) -> u8 {
        self.index
    }

    pub fn current_color(&mut self) -> Result<Color> {
        let raw = self.read(Register::CurrentColor)?;
        Ok(Color::from_slice(&raw))
    }

    pub fn mode(&mut self) -> Result<LedMode> {
        let id = select_and(self.driver, Register::SelectedLed, self.index, |q| {
            q.read1(Register::LedMode)
        })?;
        let raw = read_u8(self.driver, id)?;
        LedMode::try_from(raw).map_err(|m| anyhow::format_err!("unknown LED mode 0x{:02x}", m))
    }

    pub fn set_mode(&mut self, mode: LedMode) -> Result<()> {
        self.write(|q| q.write1(Register::LedMode, mode as u8))
    }

    /// Colour table of the static and multicolour modes.
    pub fn colors(&mut self) -> Result<[Color; 4]> {
        let raw = self.read(Register::Colors)?;
        Ok(std::array::from_fn(|i| Color::from_slice(&raw[i * 3..])))
    }

    pub fn set_colors(&mut self, colors: &[Color; 4]) -> Result<()> {
        let raw = rgb_bytes(colors);
        self.write(|q| q.write(Register::Colors, &raw))
    }

    /// Low, medium and high temperature points in °C.
    pub fn temp_curve(&mut self) -> Result<[f32; 3]> {
        let raw = self.read(Register::TempVals)?;
        let mut curve = [0f32; 3];
        for (i, point) in curve.iter_mut().enumerate() {
            *point = raw.pread_with::<i16>(i * 2, LE)? as f32 / 256.0;
        }
        Ok(curve)
    }

    pub fn set_temp_curve(&mut self, curve: [f32; 3]) -> Result<()> {
        let raw: Vec<u8> = curve
            .iter()
            .flat_map(|&t| ((t * 256.0) as i16).to_le_bytes())
            .collect();
        self.write(|q| q.write(Register::TempVals, &raw))
    }

    /// Colours shown at the points of [`Led::temp_curve`].
    pub fn temp_colors(&mut self) -> Result<[Color; 3]> {
        let raw = self.read(Register::TempColors)?;
        Ok(std::array::from_fn(|i| Color::from_slice(&raw[i * 3..])))
    }

    pub fn set_temp_colors(&mut self, colors: &[Color; 3]) -> Result<()> {
        let raw = rgb_bytes(colors);
        self.write(|q| q.write(Register::TempColors, &raw))
    }

    pub fn reported_temp(&mut self) -> Result<f32> {
        let id = select_and(self.driver, Register::SelectedLed, self.index, |q| {
            q.read2(Register::ReportedLedTemp)
        })?;
        Ok(from_fixed(read_u16(self.driver, id)?))
    }

    pub fn set_reported_temp(&mut self, celsius: f32) -> Result<()> {
        self.write(|q| q.write2(Register::ReportedLedTemp, to_fixed(celsius)))
    }

    /// Read the full declared width of `register`.
    fn read(&mut self, register: Register) -> Result<Vec<u8>> {
        let width = register.width();
        let id = select_and(self.driver, Register::SelectedLed, self.index, |q| {
            q.read(register, width)
        })?;
        let raw = response(self.driver, id)?;
        anyhow::ensure!(
            raw.len() == width as usize,
            "{:?}: expected {} bytes, got {}",
            register,
            width,
            raw.len()
        );
        Ok(raw.to_vec())
    }

    fn write(&mut self, op: impl FnOnce(&mut CommandQueue) -> crate::Result<u8>) -> Result<()> {
        select_and(self.driver, Register::SelectedLed, self.index, op)?;
        Ok(())
    }
}

/// Select component `index` through `selector`, queue `op` behind it and
/// send both in one packet.
fn select_and<T: Transport>(
    driver: &mut Driver<T>,
    selector: Register,
    index: u8,
    op: impl FnOnce(&mut CommandQueue) -> crate::Result<u8>,
) -> Result<u8> {
    driver.clear();
    driver.queue().write1(selector, index)?;
    let id = op(driver.queue())?;
    driver.flush()?;
    Ok(id)
}

fn response<T: Transport>(driver: &Driver<T>, id: u8) -> Result<&[u8]> {
    driver
        .get(id)
        .ok_or_else(|| anyhow::format_err!("no response to operation #{}", id))
}

fn read_u8<T: Transport>(driver: &Driver<T>, id: u8) -> Result<u8> {
    Ok(response(driver, id)?.pread::<u8>(0)?)
}

fn read_u16<T: Transport>(driver: &Driver<T>, id: u8) -> Result<u16> {
    Ok(response(driver, id)?.pread_with::<u16>(0, LE)?)
}

fn rgb_bytes(colors: &[Color]) -> Vec<u8> {
    colors.iter().flat_map(|c| [c.r, c.g, c.b]).collect()
}

/// 8.8 fixed point to °C.
fn from_fixed(raw: u16) -> f32 {
    raw as f32 / 256.0
}

fn to_fixed(celsius: f32) -> u16 {
    (celsius * 256.0) as u16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn firmware_version_nibbles() {
        let version = FirmwareVersion::from_raw([0x1a, 0x05]);
        assert_eq!(version.to_string(), "1.10.5");
    }

    #[test]
    fn color_parsing() {
        assert_eq!("#ff8000".parse::<Color>().unwrap(), Color::new(0xff, 0x80, 0));
        assert_eq!("00ff00".parse::<Color>().unwrap(), Color::new(0, 0xff, 0));
        assert!("fff".parse::<Color>().is_err());
        assert_eq!(Color::new(1, 2, 3).to_string(), "#010203");
    }

    #[test]
    fn fixed_point() {
        assert_eq!(from_fixed(0x2880), 40.5);
        assert_eq!(to_fixed(40.5), 0x2880);
    }
}

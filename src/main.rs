use std::{path::PathBuf, time::Duration};

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};

use corsairlink::constants::RESPONSE_FRAME_SIZE;
use corsairlink::link::Color;
use corsairlink::register::{FanMode, LedMode};
use corsairlink::transport::{HidrawTransport, UsbTransport};
use corsairlink::{Driver, DriverConfig, LinkDevice, Transport};

#[derive(Parser)]
#[command(
    name = "corsairlink",
    about = "Command-line tool for Corsair Link cooling controllers",
    version
)]
struct Cli {
    /// hidraw node of the controller, skips scanning
    #[arg(short, long, global = true)]
    device: Option<PathBuf>,
    /// Talk to the controller through libusb instead of hidraw
    #[arg(long, global = true)]
    usb: bool,
    /// Use the nth matching controller
    #[arg(long, default_value_t = 0, global = true)]
    index: usize,
    /// How long to wait for each response frame
    #[arg(long, default_value_t = 500, global = true)]
    timeout_ms: u64,
    /// Send 2-byte writes with the opcode byte of the vendor software
    #[arg(long, global = true)]
    legacy_write2: bool,
    /// -v for debug output, -vv to trace packets
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// List connected controllers
    List,
    /// Get info about the connected controller
    Info,
    /// Show fan and pump state
    Fans,
    /// Show temperature sensors
    Sensors,
    /// Show LED state
    Leds,
    /// Configure a fan or pump
    Fan {
        index: u8,
        #[arg(long)]
        mode: Option<FanModeArg>,
        #[arg(long)]
        pwm: Option<u8>,
        #[arg(long)]
        rpm: Option<u16>,
    },
    /// Configure an LED
    Led {
        index: u8,
        #[arg(long)]
        mode: Option<LedModeArg>,
        /// Up to 4 colours as rrggbb, unset entries keep their value
        #[arg(long, num_args = 1..=4)]
        color: Vec<Color>,
    },
    /// Send a raw operation and dump the response
    Direct {
        #[arg(value_parser = parse_byte)]
        opcode: u8,
        #[arg(value_parser = parse_byte)]
        args: Vec<u8>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum FanModeArg {
    FixedPwm,
    FixedRpm,
    Default,
    Quiet,
    Balanced,
    Performance,
    Custom,
}

impl From<FanModeArg> for FanMode {
    fn from(value: FanModeArg) -> Self {
        match value {
            FanModeArg::FixedPwm => FanMode::FixedPwm,
            FanModeArg::FixedRpm => FanMode::FixedRpm,
            FanModeArg::Default => FanMode::Default,
            FanModeArg::Quiet => FanMode::Quiet,
            FanModeArg::Balanced => FanMode::Balanced,
            FanModeArg::Performance => FanMode::Performance,
            FanModeArg::Custom => FanMode::Custom,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum LedModeArg {
    Static,
    Multi2,
    Multi4,
    Temperature,
}

impl From<LedModeArg> for LedMode {
    fn from(value: LedModeArg) -> Self {
        match value {
            LedModeArg::Static => LedMode::Static,
            LedModeArg::Multi2 => LedMode::Multi2,
            LedModeArg::Multi4 => LedMode::Multi4,
            LedModeArg::Temperature => LedMode::Temperature,
        }
    }
}

fn parse_byte(s: &str) -> Result<u8, std::num::ParseIntError> {
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => s.parse(),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => simplelog::LevelFilter::Info,
        1 => simplelog::LevelFilter::Debug,
        _ => simplelog::LevelFilter::Trace,
    };
    let _ = simplelog::TermLogger::init(
        level,
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    );

    if let Cmd::List = cli.command {
        return list();
    }

    let config = DriverConfig {
        read_timeout: Duration::from_millis(cli.timeout_ms),
        legacy_write2_opcode: cli.legacy_write2,
    };
    if cli.usb {
        let transport = UsbTransport::open_nth(cli.index)?;
        run(Driver::with_config(transport, config), cli.command)
    } else {
        let transport = match cli.device {
            Some(path) => HidrawTransport::new(path, RESPONSE_FRAME_SIZE),
            None => HidrawTransport::open_nth(cli.index)?,
        };
        run(Driver::with_config(transport, config), cli.command)
    }
}

fn list() -> Result<()> {
    let devices = HidrawTransport::scan_devices()?;
    for (i, found) in devices.iter().enumerate() {
        log::info!("#{}: {} at {}", i, found.device, found.path.display());
    }
    match UsbTransport::scan_devices() {
        Ok(n) => log::info!("{} controller(s) visible through libusb", n),
        Err(e) => log::warn!("libusb scan failed: {}", e),
    }
    if devices.is_empty() {
        log::warn!("No Corsair Link hidraw device found");
    }
    Ok(())
}

fn run<T: Transport>(mut driver: Driver<T>, command: Cmd) -> Result<()> {
    if let Cmd::Direct { opcode, args } = command {
        let mut raw = vec![opcode];
        raw.extend(args);
        let id = driver.queue().enqueue_raw(&raw)?;
        driver.flush()?;
        log::info!("#{}: {:?}", id, driver.get(id).map(hex::encode));
        log::info!("frame: {:?}", driver.last_frame().map(hex::encode));
        return Ok(());
    }

    let mut device = LinkDevice::connect(driver)?;
    let info = device.info().clone();

    match command {
        Cmd::Info => {
            log::info!("Device: {} (id 0x{:02x})", info.product_name, info.id);
            log::info!("Firmware: {}", info.firmware);
            log::info!(
                "Fans: {}, LEDs: {}, Sensors: {}",
                info.fans,
                info.leds,
                info.sensors
            );
            log::info!("Status OK: {}", device.is_ok()?);
        }
        Cmd::Fans => {
            for i in 0..info.fans {
                let mut fan = device.fan(i)?;
                log::info!(
                    "Fan #{}: {:?}, PWM {}, {} RPM (target {}, max {})",
                    i,
                    fan.mode()?,
                    fan.pwm()?,
                    fan.current_rpm()?,
                    fan.rpm()?,
                    fan.max_rpm()?
                );
            }
        }
        Cmd::Sensors => {
            for i in 0..info.sensors {
                let mut sensor = device.sensor(i)?;
                log::info!(
                    "Sensor #{}: {:.1}°C (limit {:.1}°C)",
                    i,
                    sensor.current_temp()?,
                    sensor.temp_limit()?
                );
            }
        }
        Cmd::Leds => {
            for i in 0..info.leds {
                let mut led = device.led(i)?;
                let colors = led.colors()?.map(|c| c.to_string());
                log::info!(
                    "LED #{}: {:?}, showing {}, colors {}",
                    i,
                    led.mode()?,
                    led.current_color()?,
                    colors.join(" ")
                );
            }
        }
        Cmd::Fan {
            index,
            mode,
            pwm,
            rpm,
        } => {
            let mut fan = device.fan(index)?;
            if let Some(mode) = mode {
                fan.set_mode(mode.into())?;
            }
            if let Some(pwm) = pwm {
                fan.set_pwm(pwm)?;
            }
            if let Some(rpm) = rpm {
                fan.set_rpm(rpm)?;
            }
            log::info!("Fan #{}: {:?}", index, fan.mode()?);
        }
        Cmd::Led { index, mode, color } => {
            let mut led = device.led(index)?;
            if !color.is_empty() {
                let mut colors = led.colors()?;
                colors[..color.len()].copy_from_slice(&color);
                led.set_colors(&colors)?;
            }
            if let Some(mode) = mode {
                led.set_mode(mode.into())?;
            }
            log::info!("LED #{}: {:?}", index, led.mode()?);
        }
        Cmd::List | Cmd::Direct { .. } => unreachable!(),
    }

    Ok(())
}

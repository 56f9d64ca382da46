//! Linux hidraw transportation.
use std::{
    fs::{self, File, OpenOptions},
    io::{self, Read, Write},
    path::{Path, PathBuf},
    time::Duration,
};

use crate::device::{DeviceDB, KnownDevice};
use crate::error::{Result, TransportError};

use super::{PendingRead, Transport};

const SYSFS_HIDRAW: &str = "/sys/class/hidraw";

/// A hidraw node backed by a known device.
#[derive(Debug, Clone)]
pub struct HidrawDevice {
    pub path: PathBuf,
    pub device: KnownDevice,
}

/// Raw HID channel through `/dev/hidrawN`, opened once per transaction.
pub struct HidrawTransport {
    path: PathBuf,
    frame_size: usize,
    file: Option<File>,
}

impl HidrawTransport {
    pub fn scan_devices() -> anyhow::Result<Vec<HidrawDevice>> {
        let db = DeviceDB::load()?;
        let mut found = vec![];

        for entry in fs::read_dir(SYSFS_HIDRAW)? {
            let entry = entry?;
            // device -> ../../../0003:1B1C:0C04.0001
            let Ok(link) = fs::read_link(entry.path().join("device")) else {
                continue;
            };
            let Some((vendor_id, product_id)) = link
                .file_name()
                .and_then(|name| name.to_str())
                .and_then(parse_hid_id)
            else {
                continue;
            };
            if let Some(device) = db.find(vendor_id, product_id) {
                let path = Path::new("/dev").join(entry.file_name());
                log::debug!("Found {} at {}", device, path.display());
                found.push(HidrawDevice {
                    path,
                    device: device.clone(),
                });
            }
        }
        found.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(found)
    }

    pub fn new(path: impl Into<PathBuf>, frame_size: usize) -> Self {
        HidrawTransport {
            path: path.into(),
            frame_size,
            file: None,
        }
    }

    pub fn open_nth(nth: usize) -> anyhow::Result<Self> {
        let devices = Self::scan_devices()?;
        let found = devices.into_iter().nth(nth).ok_or_else(|| {
            anyhow::format_err!("No Corsair Link hidraw device found at index #{}", nth)
        })?;
        log::info!("Using {} at {}", found.device, found.path.display());
        Ok(Self::new(found.path, found.device.frame_size))
    }

    pub fn open_any() -> anyhow::Result<Self> {
        Self::open_nth(0)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Transport for HidrawTransport {
    fn open(&mut self) -> Result<()> {
        if self.file.is_none() {
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .open(&self.path)
                .map_err(TransportError::OpenFailed)?;
            self.file = Some(file);
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.file.take();
        Ok(())
    }

    fn listen(&mut self, timeout: Duration) -> Result<PendingRead> {
        let file = self.file.as_ref().ok_or(TransportError::NotOpen)?;
        // Reports are queued per open file, so anything the device sends after
        // `open` reaches this clone.
        let mut reader = file.try_clone().map_err(TransportError::ReadFailed)?;
        let frame_size = self.frame_size;
        PendingRead::spawn(move || read_report(&mut reader, frame_size, timeout))
    }

    fn send_raw(&mut self, raw: &[u8]) -> Result<()> {
        let file = self.file.as_mut().ok_or(TransportError::NotOpen)?;
        file.write_all(raw).map_err(TransportError::WriteFailed)?;
        Ok(())
    }
}

/// Read one input report, zero padded to `frame_size`.
///
/// Fails with `TimedOut` when nothing arrives within `timeout`, so the
/// listener thread and its descriptor never outlive the transaction by much.
#[cfg(unix)]
fn read_report<R>(reader: &mut R, frame_size: usize, timeout: Duration) -> io::Result<Vec<u8>>
where
    R: Read + std::os::fd::AsRawFd,
{
    let mut pollfd = libc::pollfd {
        fd: reader.as_raw_fd(),
        events: libc::POLLIN,
        revents: 0,
    };
    let timeout_ms = timeout.as_millis().min(libc::c_int::MAX as u128) as libc::c_int;
    loop {
        // SAFETY: `pollfd` is a valid, writable pollfd for one descriptor
        // owned by `reader`, which outlives the call.
        let rc = unsafe { libc::poll(&mut pollfd, 1, timeout_ms) };
        match rc {
            0 => return Err(io::ErrorKind::TimedOut.into()),
            -1 => {
                let err = io::Error::last_os_error();
                if err.kind() != io::ErrorKind::Interrupted {
                    return Err(err);
                }
            }
            _ => break,
        }
    }
    finish_read(reader, frame_size)
}

#[cfg(not(unix))]
fn read_report<R: Read>(
    reader: &mut R,
    frame_size: usize,
    _timeout: Duration,
) -> io::Result<Vec<u8>> {
    finish_read(reader, frame_size)
}

fn finish_read<R: Read>(reader: &mut R, frame_size: usize) -> io::Result<Vec<u8>> {
    let mut frame = vec![0u8; frame_size];
    let n = reader.read(&mut frame)?;
    log::trace!("hidraw read {} bytes", n);
    if n == 0 {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "hidraw node returned no report",
        ));
    }
    Ok(frame)
}

/// Parse vendor and product id from a HID device name like `0003:1B1C:0C04.0001`.
fn parse_hid_id(name: &str) -> Option<(u16, u16)> {
    let mut parts = name.split(['.', ':']);
    let _bus = parts.next()?;
    let vendor_id = u16::from_str_radix(parts.next()?, 16).ok()?;
    let product_id = u16::from_str_radix(parts.next()?, 16).ok()?;
    Some((vendor_id, product_id))
}

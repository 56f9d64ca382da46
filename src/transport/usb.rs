//! USB Transportation.
use std::{io, sync::Arc, time::Duration};

use anyhow::Result;
use rusb::{
    Context, DeviceHandle, Direction, Recipient, RequestType, TransferType, UsbContext,
};

use crate::device::DeviceDB;
use crate::error::TransportError;

use super::{ListenerSlot, PendingRead, Transport};

const TIMEOUT_MS: u64 = 1000;

/// HID class request carrying an output report when there is no interrupt OUT endpoint.
const HID_SET_REPORT: u8 = 0x09;
const HID_OUTPUT_REPORT: u16 = 0x0200;

/// The same HID interface driven through libusb interrupt transfers.
///
/// The interface is claimed once, when the transport is created.
pub struct UsbTransport {
    device_handle: Arc<DeviceHandle<Context>>,
    interface: u8,
    endpoint_in: u8,
    endpoint_out: Option<u8>,
    in_packet_size: usize,
    frame_size: usize,
    listener: ListenerSlot,
}

impl UsbTransport {
    pub fn scan_devices() -> Result<usize> {
        let context = Context::new()?;
        let db = DeviceDB::load()?;

        let n = context
            .devices()?
            .iter()
            .filter_map(|device| {
                let desc = device.device_descriptor().ok()?;
                db.find(desc.vendor_id(), desc.product_id())
                    .map(|known| (device, known))
            })
            .enumerate()
            .map(|(i, (device, known))| {
                log::debug!("Found {} USB device #{}: [{:?}]", known, i, device);
            })
            .count();
        Ok(n)
    }

    pub fn open_nth(nth: usize) -> Result<UsbTransport> {
        let context = Context::new()?;
        let db = DeviceDB::load()?;

        let (device, known) = context
            .devices()?
            .iter()
            .filter_map(|device| {
                let desc = device.device_descriptor().ok()?;
                db.find(desc.vendor_id(), desc.product_id())
                    .cloned()
                    .map(|known| (device, known))
            })
            .nth(nth)
            .ok_or(anyhow::format_err!(
                "No Corsair Link USB device found at index #{}",
                nth
            ))?;
        log::debug!("Found USB Device {:?}: {}", device, known);

        let config = device.config_descriptor(0)?;

        let mut endpoints = None;
        'interfaces: for intf in config.interfaces() {
            for desc in intf.descriptors() {
                let mut endpoint_in = None;
                let mut endpoint_out = None;
                for endpoint in desc.endpoint_descriptors() {
                    if endpoint.transfer_type() != TransferType::Interrupt {
                        continue;
                    }
                    match endpoint.direction() {
                        Direction::In => {
                            endpoint_in = Some((endpoint.address(), endpoint.max_packet_size()))
                        }
                        Direction::Out => endpoint_out = Some(endpoint.address()),
                    }
                }
                if let Some(endpoint_in) = endpoint_in {
                    endpoints = Some((desc.interface_number(), endpoint_in, endpoint_out));
                    break 'interfaces;
                }
            }
        }

        let Some((interface, (endpoint_in, in_packet_size), endpoint_out)) = endpoints else {
            anyhow::bail!("USB interrupt endpoints not found");
        };
        log::debug!(
            "Interface {}: IN 0x{:02x}, OUT {:?}",
            interface,
            endpoint_in,
            endpoint_out
        );

        let mut device_handle = device.open()?;
        if let Err(e) = device_handle.set_auto_detach_kernel_driver(true) {
            log::debug!("Kernel driver auto-detach unavailable: {}", e);
        }
        device_handle.claim_interface(interface)?;

        Ok(UsbTransport {
            device_handle: Arc::new(device_handle),
            interface,
            endpoint_in,
            endpoint_out,
            in_packet_size: in_packet_size as usize,
            frame_size: known.frame_size,
            listener: ListenerSlot::new(),
        })
    }

    pub fn open_any() -> Result<UsbTransport> {
        Self::open_nth(0)
    }
}

impl Transport for UsbTransport {
    fn open(&mut self) -> crate::Result<()> {
        self.device_handle
            .active_configuration()
            .map_err(|e| TransportError::OpenFailed(usb_io(e)))?;
        Ok(())
    }

    fn close(&mut self) -> crate::Result<()> {
        Ok(())
    }

    fn listen(&mut self, timeout: Duration) -> crate::Result<PendingRead> {
        let device_handle = Arc::clone(&self.device_handle);
        let endpoint_in = self.endpoint_in;
        let frame_size = self.frame_size;
        let buf_size = self.in_packet_size.max(frame_size);
        // libusb treats a zero timeout as unlimited.
        let timeout = timeout.max(Duration::from_millis(1));
        // An interrupt IN transfer still pending would take the reply meant
        // for this read.
        self.listener.spawn(move || {
            let mut frame = vec![0u8; buf_size];
            let n = device_handle
                .read_interrupt(endpoint_in, &mut frame, timeout)
                .map_err(usb_io)?;
            frame.truncate(n.max(frame_size));
            Ok(frame)
        })
    }

    fn send_raw(&mut self, raw: &[u8]) -> crate::Result<()> {
        let timeout = Duration::from_millis(TIMEOUT_MS);
        let written = match self.endpoint_out {
            Some(endpoint_out) => self.device_handle.write_interrupt(endpoint_out, raw, timeout),
            None => self.device_handle.write_control(
                rusb::request_type(Direction::Out, RequestType::Class, Recipient::Interface),
                HID_SET_REPORT,
                HID_OUTPUT_REPORT,
                self.interface as u16,
                raw,
                timeout,
            ),
        }
        .map_err(|e| TransportError::WriteFailed(usb_io(e)))?;

        if written != raw.len() {
            return Err(TransportError::WriteFailed(io::Error::new(
                io::ErrorKind::WriteZero,
                format!("short write: {} of {} bytes", written, raw.len()),
            ))
            .into());
        }
        Ok(())
    }
}

fn usb_io(e: rusb::Error) -> io::Error {
    match e {
        rusb::Error::Timeout => io::Error::new(io::ErrorKind::TimedOut, e),
        rusb::Error::NoDevice => io::Error::new(io::ErrorKind::NotConnected, e),
        e => io::Error::other(e),
    }
}

//! The `Transport` capability consumed by the protocol engine, and a `rusb`
//! backend implementing it.
//!
//! The engine never sees USB details directly: it asks a `Transport` to do
//! bulk writes and vendor control transfers, and the transport worries
//! about endpoint addresses, max-packet sizes, and zero-length packets.
//! `rusb` wraps libusb across Linux, macOS, and Windows, so one
//! implementation covers every platform here.

use std::time::Duration;

use log::{debug, trace};
use rusb::{Direction as RusbDirection, GlobalContext, TransferType};
use thiserror::Error;

use crate::codec::{Direction, SetupFields};

const CONTROL_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_BULK_CHUNK: usize = 1024 * 1024;

const VENDOR_ID: u16 = 0x095D;
const INTERFACE_CLASS: u8 = 0xFF;
const INTERFACE_SUBCLASS: u8 = 0xF0;
const INTERFACE_PROTOCOL: u8 = 0x00;

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum TransportError {
    #[error("operation timed out")]
    Timeout,

    #[error("USB transport error: {0}")]
    Other(String),
}

impl From<rusb::Error> for TransportError {
    fn from(e: rusb::Error) -> Self {
        match e {
            rusb::Error::Timeout => TransportError::Timeout,
            other => TransportError::Other(other.to_string()),
        }
    }
}

/// Capability bundle the protocol engine depends on. Concrete backends
/// (only one is provided here, see module docs) implement this trait.
pub trait Transport {
    /// Write `data` to the bulk OUT endpoint, splitting into
    /// implementation-defined chunks, and appending a zero-length packet
    /// if `data`'s total length is a nonzero multiple of the endpoint's
    /// max-packet size. Returns the number of bytes from `data` accepted;
    /// on success this equals `data.len()`.
    fn bulk_write(&mut self, data: &[u8]) -> Result<usize, TransportError>;

    /// Read from the bulk IN endpoint. Part of the contract; unused by the
    /// engine, which never reads bulk data.
    fn bulk_read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError>;

    /// Issue a vendor-interface control transfer in the given direction.
    fn control_io(
        &mut self,
        dir: Direction,
        setup: &SetupFields,
        data: &mut [u8],
    ) -> Result<usize, TransportError>;

    /// Clear a stalled endpoint.
    fn clear_halt(&mut self, dir: Direction) -> Result<(), TransportError>;

    /// Blocking sleep, used for checkpoint backoff and the post-apply wait.
    fn sleep(&self, ms: u64);

    /// Block until the device disconnects, or `timeout_ms` elapses.
    fn wait_for_disconnect(&mut self, timeout_ms: u64) -> Result<(), TransportError>;

    fn close(&mut self) -> Result<(), TransportError>;
}

/// Everything needed to tell a WUP-capable interface apart from any other
/// interface on the bus (spec: VID 0x095D, class/subclass/protocol
/// 0xFF/0xF0/0x00, exactly one bulk OUT endpoint, no bulk IN endpoint).
pub fn matches_wup_interface(
    device_vendor: u16,
    class: u8,
    subclass: u8,
    protocol: u8,
    has_bulk_in: bool,
    has_bulk_out: bool,
) -> bool {
    device_vendor == VENDOR_ID
        && class == INTERFACE_CLASS
        && subclass == INTERFACE_SUBCLASS
        && protocol == INTERFACE_PROTOCOL
        && has_bulk_out
        && !has_bulk_in
}

/// A located WUP interface, ready to be opened.
pub struct WupDevice {
    pub device: rusb::Device<GlobalContext>,
    pub interface_number: u8,
    pub bulk_out_addr: u8,
    pub max_packet_size: u16,
    pub serial_number: Option<String>,
}

/// Enumerate all USB devices and return the WUP-matching interfaces found.
pub fn find_devices() -> Result<Vec<WupDevice>, TransportError> {
    let mut found = Vec::new();

    for device in rusb::devices()?.iter() {
        let device_desc = match device.device_descriptor() {
            Ok(d) => d,
            Err(_) => continue,
        };

        if device_desc.vendor_id() != VENDOR_ID {
            continue;
        }

        'configs: for n in 0..device_desc.num_configurations() {
            let config_desc = match device.config_descriptor(n) {
                Ok(c) => c,
                Err(_) => continue,
            };

            for interface in config_desc.interfaces() {
                for ifc_desc in interface.descriptors() {
                    let mut bulk_out_addr = None;
                    let mut has_bulk_in = false;

                    for ep in ifc_desc.endpoint_descriptors() {
                        if ep.transfer_type() != TransferType::Bulk {
                            continue;
                        }
                        match ep.direction() {
                            RusbDirection::Out => {
                                bulk_out_addr = Some((ep.address(), ep.max_packet_size()))
                            }
                            RusbDirection::In => has_bulk_in = true,
                        }
                    }

                    let Some((bulk_out_addr, max_packet_size)) = bulk_out_addr else {
                        continue;
                    };

                    if !matches_wup_interface(
                        device_desc.vendor_id(),
                        ifc_desc.class_code(),
                        ifc_desc.sub_class_code(),
                        ifc_desc.protocol_code(),
                        has_bulk_in,
                        true,
                    ) {
                        continue;
                    }

                    let serial_number = device
                        .open()
                        .ok()
                        .and_then(|h| h.read_serial_number_string_ascii(&device_desc).ok());

                    found.push(WupDevice {
                        device: device.clone(),
                        interface_number: ifc_desc.interface_number(),
                        bulk_out_addr,
                        max_packet_size,
                        serial_number,
                    });
                    continue 'configs;
                }
            }
        }
    }

    Ok(found)
}

/// `rusb`-backed `Transport` for one claimed WUP interface.
pub struct UsbTransport {
    handle: rusb::DeviceHandle<GlobalContext>,
    interface_number: u8,
    bulk_out_addr: u8,
    zero_mask: u16,
}

impl UsbTransport {
    pub fn open(dev: &WupDevice) -> Result<Self, TransportError> {
        let handle = dev.device.open()?;
        handle.claim_interface(dev.interface_number)?;

        Ok(Self {
            handle,
            interface_number: dev.interface_number,
            bulk_out_addr: dev.bulk_out_addr,
            zero_mask: dev.max_packet_size.saturating_sub(1),
        })
    }
}

impl Transport for UsbTransport {
    fn bulk_write(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        let orig_len = data.len();
        let mut sent = 0usize;

        while sent < data.len() {
            let end = (sent + MAX_BULK_CHUNK).min(data.len());
            let n =
                self.handle
                    .write_bulk(self.bulk_out_addr, &data[sent..end], CONTROL_TIMEOUT)?;
            trace!("bulk_write chunk: {} bytes", n);
            sent += n;
            if n == 0 {
                break;
            }
        }

        if self.zero_mask != 0 && orig_len != 0 && (orig_len as u64) & (self.zero_mask as u64) == 0
        {
            trace!("bulk_write: emitting ZLP (len={orig_len} is a multiple of max packet size)");
            self.handle
                .write_bulk(self.bulk_out_addr, &[], CONTROL_TIMEOUT)?;
        }

        Ok(sent)
    }

    fn bulk_read(&mut self, _buf: &mut [u8]) -> Result<usize, TransportError> {
        Err(TransportError::Other(
            "device exposes no bulk IN endpoint".into(),
        ))
    }

    fn control_io(
        &mut self,
        dir: Direction,
        setup: &SetupFields,
        data: &mut [u8],
    ) -> Result<usize, TransportError> {
        let bm_request_type = match dir {
            Direction::Out => rusb::request_type(
                RusbDirection::Out,
                rusb::RequestType::Vendor,
                rusb::Recipient::Interface,
            ),
            Direction::In => rusb::request_type(
                RusbDirection::In,
                rusb::RequestType::Vendor,
                rusb::Recipient::Interface,
            ),
        };

        let w_index = self.interface_number as u16 & 0x00FF;

        debug!(
            "control_io dir={:?} request={:#04x} value={:#06x} len={}",
            dir, setup.request, setup.value, setup.length
        );

        let n = match dir {
            Direction::Out => self.handle.write_control(
                bm_request_type,
                setup.request,
                setup.value,
                w_index,
                data,
                CONTROL_TIMEOUT,
            )?,
            Direction::In => self.handle.read_control(
                bm_request_type,
                setup.request,
                setup.value,
                w_index,
                data,
                CONTROL_TIMEOUT,
            )?,
        };

        Ok(n)
    }

    fn clear_halt(&mut self, dir: Direction) -> Result<(), TransportError> {
        let addr = match dir {
            Direction::Out => self.bulk_out_addr,
            Direction::In => return Ok(()),
        };
        self.handle.clear_halt(addr)?;
        Ok(())
    }

    fn sleep(&self, ms: u64) {
        std::thread::sleep(Duration::from_millis(ms));
    }

    fn wait_for_disconnect(&mut self, timeout_ms: u64) -> Result<(), TransportError> {
        let deadline = std::time::Instant::now() + Duration::from_millis(timeout_ms);
        while std::time::Instant::now() < deadline {
            if self.handle.device().device_descriptor().is_err() {
                return Ok(());
            }
            std::thread::sleep(Duration::from_millis(50));
        }
        Ok(())
    }

    fn close(&mut self) -> Result<(), TransportError> {
        self.handle.release_interface(self.interface_number).ok();
        Ok(())
    }
}

//! Bit-exact little-endian encode/decode for the WUP wire structures.
//!
//! The original source relies on compiler packing pragmas
//! (`#pragma pack(1)` / `__attribute__((packed))`) over native struct
//! layout. We don't depend on Rust struct layout at all: every field is
//! read and written explicitly as little-endian bytes, so the wire format
//! is the same regardless of target.

use byteorder::{ByteOrder, LE};

pub const DOWNLOAD_INFO_LEN: usize = 64;
pub const STATUS_LEN: usize = 8;
pub const SETUP_LEN: usize = 8;

const SW_VERSION_LEN: usize = 32;

/// `wup_dnload_info`: the payload of `SET_DNLOAD_INFO`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DownloadInfo {
    /// ASCII version string, NUL-padded to 32 bytes. Not required to be
    /// NUL-terminated if it fills the field exactly.
    pub sw_version: [u8; SW_VERSION_LEN],
    pub image_size: u32,
    pub sync_block_size: u32,
    pub forced: bool,
}

impl DownloadInfo {
    /// Build from a version string, truncating or NUL-padding it to fit.
    pub fn new(sw_version: &str, image_size: u32, sync_block_size: u32, forced: bool) -> Self {
        let mut field = [0u8; SW_VERSION_LEN];
        let bytes = sw_version.as_bytes();
        let n = bytes.len().min(SW_VERSION_LEN);
        field[..n].copy_from_slice(&bytes[..n]);

        Self {
            sw_version: field,
            image_size,
            sync_block_size,
            forced,
        }
    }

    pub fn to_bytes(&self) -> [u8; DOWNLOAD_INFO_LEN] {
        let mut buf = [0u8; DOWNLOAD_INFO_LEN];
        buf[0..32].copy_from_slice(&self.sw_version);
        LE::write_u32(&mut buf[32..36], self.image_size);
        LE::write_u32(&mut buf[36..40], self.sync_block_size);
        buf[40] = self.forced as u8;
        // buf[41..64] is the zero-filled reserved tail.
        buf
    }

    pub fn from_bytes(buf: &[u8; DOWNLOAD_INFO_LEN]) -> Self {
        let mut sw_version = [0u8; SW_VERSION_LEN];
        sw_version.copy_from_slice(&buf[0..32]);
        Self {
            sw_version,
            image_size: LE::read_u32(&buf[32..36]),
            sync_block_size: LE::read_u32(&buf[36..40]),
            forced: buf[40] != 0,
        }
    }
}

/// `wup_status`: the payload of `GET_STATUS` and `SYNC`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Status {
    pub status: u8,
    pub state: u8,
    pub written_bytes: u32,
}

impl Status {
    pub fn to_bytes(&self) -> [u8; STATUS_LEN] {
        let mut buf = [0u8; STATUS_LEN];
        buf[0] = self.status;
        buf[1] = self.state;
        LE::write_u32(&mut buf[2..6], self.written_bytes);
        // buf[6..8] is the reserved tail of the 6-byte union.
        buf
    }

    pub fn from_bytes(buf: &[u8; STATUS_LEN]) -> Self {
        Self {
            status: buf[0],
            state: buf[1],
            written_bytes: LE::read_u32(&buf[2..6]),
        }
    }
}

/// Direction of a control transfer, as seen by the host.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Direction {
    Out,
    In,
}

/// The 5 fields of a USB control transfer the engine cares about.
/// `bmRequestType` and the interface-number half of `wIndex` are filled in
/// by the `Transport`, not the engine (spec: "the Transport layer fills
/// bmRequestType ... and wIndex").
#[derive(Copy, Clone, Debug)]
pub struct SetupFields {
    pub request: u8,
    pub value: u16,
    pub length: u16,
}

/// `bRequest` values: `SET_INFORMATION` for OUT transfers, `GET_INFORMATION`
/// for IN transfers.
pub const REQUEST_SET_INFORMATION: u8 = 0x01;
pub const REQUEST_GET_INFORMATION: u8 = 0x81;

/// wValue selectors for each WUP vendor request.
pub mod selector {
    pub const SET_DNLOAD_INFO: u16 = 0x0001;
    pub const GET_STATUS: u16 = 0x0002;
    pub const CLR_STATUS: u16 = 0x0003;
    pub const GET_STATE: u16 = 0x0005;
    pub const ABORT: u16 = 0x0006;
    pub const SYNC: u16 = 0x0007;
    pub const INT_CHECK: u16 = 0x0008;
    pub const START_UPDATE: u16 = 0x0009;
}

/// Status codes reported by `GET_STATUS`/`SYNC`.
pub mod status {
    pub const OK: u8 = 0x00;
    pub const ERR_STATE: u8 = 0x01;
    pub const ERR_CHECK: u8 = 0x02;
    pub const ERR_TARGET: u8 = 0x03;
    pub const ERR_FILE: u8 = 0x04;
    pub const ERR_WRITE: u8 = 0x05;
    pub const ERR_VERIFY: u8 = 0x06;
    pub const ERR_NOTDONE: u8 = 0x07;
    pub const ERR_INVAL: u8 = 0x08;
    pub const ERR_TRANS: u8 = 0x09;
    pub const ERR_UNKNOWN: u8 = 0x0A;
}

/// DFU-derived state names the device reports.
pub mod state {
    pub const DETACHED: u8 = 0;
    pub const IDLE: u8 = 1;
    pub const DNLOAD_IDLE: u8 = 2;
    pub const DNLOAD_BUSY: u8 = 3;
    pub const DNLOAD_SYNC: u8 = 4;
    pub const DNLOAD_VERIFY: u8 = 5;
    pub const UPDATE_BUSY: u8 = 6;
    pub const ERROR: u8 = 7;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn download_info_round_trip() {
        let cases = [
            DownloadInfo::new("1.0.0", 0, 0, false),
            DownloadInfo::new("", u32::MAX, u32::MAX, true),
            DownloadInfo::new(&"x".repeat(40), 1000, 64 * 1024 * 1024, false),
        ];
        for info in cases {
            let bytes = info.to_bytes();
            assert_eq!(bytes.len(), DOWNLOAD_INFO_LEN);
            assert_eq!(DownloadInfo::from_bytes(&bytes), info);
        }
    }

    #[test]
    fn download_info_version_truncates_and_pads() {
        let info = DownloadInfo::new("v1.2.3", 10, 0, true);
        let bytes = info.to_bytes();
        assert_eq!(&bytes[0..6], b"v1.2.3");
        assert!(bytes[6..32].iter().all(|&b| b == 0));
    }

    #[test]
    fn status_round_trip() {
        let cases = [
            Status {
                status: status::OK,
                state: state::IDLE,
                written_bytes: 0,
            },
            Status {
                status: status::ERR_STATE,
                state: state::ERROR,
                written_bytes: u32::MAX,
            },
        ];
        for s in cases {
            let bytes = s.to_bytes();
            assert_eq!(bytes.len(), STATUS_LEN);
            assert_eq!(Status::from_bytes(&bytes), s);
        }
    }

    #[test]
    fn status_reserved_tail_is_zero() {
        let s = Status {
            status: 1,
            state: 2,
            written_bytes: 3,
        };
        assert_eq!(&s.to_bytes()[6..8], &[0, 0]);
    }
}

//! The WUP protocol engine: the per-file state machine that negotiates a
//! download session, streams a file body over bulk OUT with sync-block
//! checkpoints, verifies integrity with MD5, and optionally triggers the
//! device's update-apply phase.
//!
//! All state lives in function locals and the `Config`/`Transport` passed
//! in, so the engine carries nothing between files beyond what each call
//! returns or errors with.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use log::{info, trace, warn};

use crate::codec::{
    DOWNLOAD_INFO_LEN, Direction, DownloadInfo, REQUEST_GET_INFORMATION, REQUEST_SET_INFORMATION,
    STATUS_LEN, SetupFields, Status, selector, state, status,
};
use crate::error::EngineError;
use crate::md5sum::md5_hex_file;
use crate::transport::{Transport, TransportError};

/// Default sync-block size when syncing is enabled.
pub const DEFAULT_SYNC_BLOCK_SIZE: u32 = 64 * 1024 * 1024;

/// Default host bulk-write buffer, in KiB.
pub const DEFAULT_BUFFER_KIB: u32 = 16;

/// Hard cap on the configurable bulk-write buffer, in KiB.
pub const MAX_BUFFER_KIB: u32 = 1024;

const NEGOTIATE_ATTEMPTS: u32 = 2;
const CHECKPOINT_ATTEMPTS: u32 = 10;
const CHECKPOINT_SLEEP_MS: u64 = 1000;
const APPLY_SLEEP_MS: u64 = 5000;

/// Per-file transfer configuration, passed by value into each call so the
/// engine keeps no mutable state of its own between files.
#[derive(Clone, Debug)]
pub struct Config {
    pub sw_version: String,
    pub buffer_kib: u32,
    pub forced: bool,
    pub sync: bool,
    pub do_update: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sw_version: String::new(),
            buffer_kib: DEFAULT_BUFFER_KIB,
            forced: true,
            sync: true,
            do_update: false,
        }
    }
}

impl Config {
    fn buffer_bytes(&self) -> usize {
        self.buffer_kib.clamp(1, MAX_BUFFER_KIB) as usize * 1024
    }

    fn sync_block_size(&self) -> u32 {
        if self.sync {
            DEFAULT_SYNC_BLOCK_SIZE
        } else {
            0
        }
    }
}

/// Run the full WUP session for one file: negotiate, stream, checkpoint,
/// verify, and optionally apply. Returns the first error encountered; the
/// engine never continues streaming after a failure.
pub fn send_file(
    transport: &mut dyn Transport,
    path: &Path,
    config: &Config,
) -> Result<(), EngineError> {
    let mut file = File::open(path).map_err(EngineError::FileOpen)?;
    let image_size = file.metadata().map_err(EngineError::FileOpen)?.len();

    if image_size == 0 {
        return Err(EngineError::EmptyFile);
    }

    negotiate(transport, config, image_size)?;

    let cumulative = stream(transport, &mut file, config)?;
    drop(file);

    final_sync(transport, cumulative)?;
    integrity_check(transport, path)?;

    if config.do_update {
        apply(transport)?;
    }

    Ok(())
}

fn control_out(
    transport: &mut dyn Transport,
    value: u16,
    data: &mut [u8],
) -> Result<usize, TransportError> {
    let setup = SetupFields {
        request: REQUEST_SET_INFORMATION,
        value,
        length: data.len() as u16,
    };
    transport.control_io(Direction::Out, &setup, data)
}

fn control_in(
    transport: &mut dyn Transport,
    value: u16,
    data: &mut [u8],
) -> Result<usize, TransportError> {
    let setup = SetupFields {
        request: REQUEST_GET_INFORMATION,
        value,
        length: data.len() as u16,
    };
    transport.control_io(Direction::In, &setup, data)
}

fn get_status(transport: &mut dyn Transport) -> Result<Status, TransportError> {
    let mut buf = [0u8; STATUS_LEN];
    control_in(transport, selector::GET_STATUS, &mut buf)?;
    Ok(Status::from_bytes(&buf))
}

fn negotiate(
    transport: &mut dyn Transport,
    config: &Config,
    image_size: u64,
) -> Result<(), EngineError> {
    let mut last = Status {
        status: status::ERR_STATE,
        state: state::ERROR,
        written_bytes: 0,
    };

    for attempt in 0..NEGOTIATE_ATTEMPTS {
        let info = DownloadInfo::new(
            &config.sw_version,
            image_size as u32,
            config.sync_block_size(),
            config.forced,
        );
        let mut info_bytes = info.to_bytes();
        debug_assert_eq!(info_bytes.len(), DOWNLOAD_INFO_LEN);
        control_out(transport, selector::SET_DNLOAD_INFO, &mut info_bytes)?;

        last = get_status(transport)?;
        trace!(
            "negotiate attempt {attempt}: status={:#04x} state={:#04x}",
            last.status, last.state
        );

        if last.status != status::ERR_STATE {
            break;
        }

        info!("device in errSTATE during negotiate, sending ABORT (attempt {attempt})");
        control_out(transport, selector::ABORT, &mut [])?;
    }

    // Lenient by design: fail only when status != OK AND state !=
    // dfuDNLOAD_IDLE. A non-OK status with an idle-download state is
    // accepted, since some devices report a stale error status while
    // already sitting in the correct state to continue.
    if last.status != status::OK && last.state != state::DNLOAD_IDLE {
        return Err(EngineError::Negotiate {
            status: last.status,
            state: last.state,
        });
    }

    Ok(())
}

fn checkpoint(transport: &mut dyn Transport, cumulative: u64) -> Result<(), EngineError> {
    let mut last = Status {
        status: status::ERR_STATE,
        state: state::ERROR,
        written_bytes: 0,
    };

    for _ in 0..CHECKPOINT_ATTEMPTS {
        transport.sleep(CHECKPOINT_SLEEP_MS);

        let mut buf = [0u8; STATUS_LEN];
        match control_in(transport, selector::SYNC, &mut buf) {
            Ok(_) => {
                last = Status::from_bytes(&buf);
            }
            Err(TransportError::Timeout) => {
                warn!("checkpoint SYNC timed out, retrying");
                last.status = status::ERR_STATE;
                continue;
            }
            Err(e) => return Err(e.into()),
        }

        if last.status != status::ERR_STATE {
            break;
        }
    }

    if last.status == status::OK && last.written_bytes as u64 == cumulative {
        Ok(())
    } else {
        Err(EngineError::SyncMismatch {
            status: last.status,
            written_bytes: last.written_bytes as u64,
            cumulative,
        })
    }
}

fn stream(
    transport: &mut dyn Transport,
    file: &mut File,
    config: &Config,
) -> Result<u64, EngineError> {
    let buffer_bytes = config.buffer_bytes();
    let mut buf = vec![0u8; buffer_bytes];
    let mut cumulative = 0u64;

    // `None` means sync is disabled: no mid-stream checkpoint will ever
    // fire. Using `Option<u64>` here instead of a sentinel byte count
    // avoids any wraparound at the type's max value.
    let mut sync_remain: Option<u64> = if config.sync {
        Some(DEFAULT_SYNC_BLOCK_SIZE as u64)
    } else {
        None
    };

    loop {
        let want = sync_remain
            .map(|rem| rem.min(buffer_bytes as u64) as usize)
            .unwrap_or(buffer_bytes);

        let read = file
            .read(&mut buf[..want])
            .map_err(EngineError::ShortRead)?;
        if read == 0 {
            break;
        }

        let written = transport.bulk_write(&buf[..read])?;
        if written < read {
            return Err(EngineError::ShortWrite {
                expected: read,
                actual: written,
            });
        }

        cumulative += written as u64;

        if let Some(rem) = sync_remain.as_mut() {
            *rem -= written as u64;
            if *rem == 0 {
                checkpoint(transport, cumulative)?;
                *rem = DEFAULT_SYNC_BLOCK_SIZE as u64;
            }
        }
    }

    Ok(cumulative)
}

fn final_sync(transport: &mut dyn Transport, cumulative: u64) -> Result<(), EngineError> {
    checkpoint(transport, cumulative)
}

fn integrity_check(transport: &mut dyn Transport, path: &Path) -> Result<(), EngineError> {
    let hex = md5_hex_file(path).map_err(|_| EngineError::IntegrityCheck {
        status: status::ERR_CHECK,
        state: state::ERROR,
    })?;

    let mut payload = hex.into_bytes();
    payload.push(0); // NUL terminator, payload length 33 = 32 hex chars + NUL.
    debug_assert_eq!(payload.len(), 33);

    control_out(transport, selector::INT_CHECK, &mut payload)?;

    let result = get_status(transport)?;
    if result.status != status::OK {
        return Err(EngineError::IntegrityCheck {
            status: result.status,
            state: result.state,
        });
    }

    Ok(())
}

fn apply(transport: &mut dyn Transport) -> Result<(), EngineError> {
    control_out(transport, selector::START_UPDATE, &mut [])?;
    transport.sleep(APPLY_SLEEP_MS);

    let result = get_status(transport)?;
    if result.status != status::OK {
        return Err(EngineError::UpdateStart {
            status: result.status,
            state: result.state,
        });
    }

    Ok(())
}

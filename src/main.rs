use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use log::{error, info};
use wup_dfu::engine::{self, Config};
use wup_dfu::transport::{Transport, UsbTransport, WupDevice, find_devices};
use wup_dfu::walk::{Counters, iter_files};

#[derive(Parser, Debug)]
#[command(
    name = "wup-dfu",
    about = "Firmware update client for WUP-protocol USB peripherals"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Send one file, or every file under a directory, to the device.
    Update {
        /// File or directory to send. Defaults to the current directory.
        path: Option<PathBuf>,

        /// Host bulk-write buffer size, in KiB (capped at 1024).
        #[arg(long, default_value_t = engine::DEFAULT_BUFFER_KIB)]
        buffer_kib: u32,

        /// Instruct the device to accept the image even if its version matches.
        #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
        forced: bool,

        /// Trigger the device's update-apply phase after a successful transfer.
        #[arg(long)]
        update: bool,

        /// Use sync-block checkpoints during the transfer.
        #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
        sync: bool,

        /// Software version string reported to the device.
        #[arg(long, default_value = "")]
        version: String,
    },

    /// Query and print information about the first attached device, then exit.
    Info,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(
        env_logger::Env::new()
            .filter_or("WUP_DFU_LOG", "info")
            .write_style("WUP_DFU_LOG_STYLE"),
    )
    .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Info => info_cmd(),
        Command::Update {
            path,
            buffer_kib,
            forced,
            update,
            sync,
            version,
        } => update_cmd(path, buffer_kib, forced, update, sync, version),
    }
}

fn pick_device() -> Result<WupDevice> {
    let mut devices = find_devices().context("failed to enumerate USB devices")?;
    if devices.is_empty() {
        bail!("no WUP-capable device found");
    }
    Ok(devices.remove(0))
}

fn info_cmd() -> Result<()> {
    let dev = pick_device()?;
    println!("interface: {}", dev.interface_number);
    println!(
        "serial: {}",
        dev.serial_number.as_deref().unwrap_or("UNKNOWN")
    );
    println!("max packet size: {}", dev.max_packet_size);
    Ok(())
}

fn update_cmd(
    path: Option<PathBuf>,
    buffer_kib: u32,
    forced: bool,
    update: bool,
    sync: bool,
    version: String,
) -> Result<()> {
    let path = path.unwrap_or_else(|| PathBuf::from("."));
    let files = iter_files(&path).with_context(|| format!("failed to read {}", path.display()))?;

    let dev = pick_device()?;
    let mut transport = UsbTransport::open(&dev).context("failed to open device")?;

    let config = Config {
        sw_version: version,
        buffer_kib,
        forced,
        sync,
        do_update: update,
    };

    let mut counters = Counters::default();

    for file in &files {
        info!("sending {}", file.display());
        match engine::send_file(&mut transport, file, &config) {
            Ok(()) => {
                println!("{}: OK", file.display());
                counters.record(true);
            }
            Err(e) => {
                error!("{}: {} phase failed: {}", file.display(), e.phase(), e);
                println!("{}: FAILED ({}: {})", file.display(), e.phase(), e);
                counters.record(false);
            }
        }
    }

    transport.close().ok();

    println!(
        "passed: {}, failed: {}",
        counters.successfully_transferred,
        counters.failed()
    );

    if counters.failed() > 0 {
        bail!("{} file(s) failed to transfer", counters.failed());
    }

    Ok(())
}

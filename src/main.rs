use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use log::{error, info};

use ibus::gateway::{Config, Gateway};
use platform::{BusLog, PiPins, ShellClock, ShellPower, UinputKeyboard};

pub mod ibus;
pub mod platform;
#[cfg(test)]
mod testutil;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("startup bytes are not an even-length hex string")]
    InvalidStartupHex,
    #[error("io error")]
    Io(#[from] std::io::Error),
    #[error("serialport error")]
    SerialPort(#[from] serialport::Error),
    #[error("gpio error")]
    Gpio(#[from] rppal::gpio::Error),
}

/// I-BUS gateway daemon: reads the car's bus off a UART, emulates a CD
/// changer and turns steering wheel / board monitor buttons into key
/// presses.
#[derive(Parser)]
#[command(version)]
struct Cli {
    /// Car has bluetooth: leave the Phone and Speak buttons alone
    #[arg(short, long)]
    bluetooth: bool,

    /// Force a CDC info reply every SECS seconds (0 disables)
    #[arg(short, long = "cdc-interval", value_name = "SECS", default_value_t = 0)]
    cdc_interval: u64,

    /// GPIO line monitoring the bus for transmit arbitration
    /// (0 = transceiver arbitrates in hardware; default depends on
    /// the board revision)
    #[arg(short, long, value_name = "PIN")]
    gpio: Option<u8>,

    /// Skip the unsolicited MK3 "changer present" announcements
    #[arg(short = 'm', long = "no-mk3")]
    no_mk3: bool,

    /// Never switch the video to the reversing camera
    #[arg(short = 'r', long = "no-camera")]
    no_camera: bool,

    /// Hex bytes to transmit once after startup, e.g. 68031801
    #[arg(short, long, value_name = "HEX")]
    startup: Option<String>,

    /// PiBUS board revision
    #[arg(short = 'v', long, value_name = "N", default_value_t = 0)]
    hw_version: u32,

    /// Bus traffic log file
    #[arg(long, value_name = "PATH", default_value = "/storage/ibus.txt")]
    log_file: PathBuf,

    /// Serial device carrying the bus
    #[arg(default_value = "/dev/ttyAMA0")]
    port: String,
}

fn main() -> Result<(), Error> {
    env_logger::init();
    let cli = Cli::parse();

    // V4 boards route the monitor signal to GPIO 17, older ones to 18.
    let monitor_gpio = cli
        .gpio
        .unwrap_or(if cli.hw_version >= 4 { 17 } else { 18 });

    let config = Config {
        startup: cli.startup,
        bluetooth: cli.bluetooth,
        camera: !cli.no_camera,
        mk3_announce: !cli.no_mk3,
        cdc_info_interval: cli.cdc_interval,
        monitor_gpio,
        hw_version: cli.hw_version,
    };

    let port = serialport::new(&cli.port, 9600)
        .data_bits(serialport::DataBits::Eight)
        .parity(serialport::Parity::Even)
        .stop_bits(serialport::StopBits::One)
        .flow_control(serialport::FlowControl::None)
        .timeout(Duration::from_millis(5))
        .open_native()
        .inspect_err(|e| error!("cannot open {}: {e}", cli.port))?;

    let log = BusLog::open(&cli.log_file)?;
    let pins = PiPins::new(cli.hw_version)?;
    let keyboard = UinputKeyboard::new()?;

    info!("listening on {}", cli.port);

    let mut gateway = Gateway::new(
        config,
        Box::new(port),
        log,
        Box::new(keyboard),
        Box::new(pins),
        Box::new(ShellClock),
        Box::new(ShellPower),
    );

    gateway.start()?;
    gateway.run()
}

use std::io::{self, Write};
use std::path::Path;
use std::process::Command;
use std::time::{Duration, Instant};

use evdev::uinput::{VirtualDevice, VirtualDeviceBuilder};
use evdev::{AttributeSet, EventType, InputEvent, Key};
use log::warn;
use rppal::gpio::{Gpio, InputPin, OutputPin};

use crate::Error;
use crate::ibus::dispatch::KeyPress;

/// Serial line carrying the bus. Blanket-implemented for any serial
/// port so the gateway can also run against an in-memory fake.
pub trait BusIo: io::Read + io::Write {}

impl<T: serialport::SerialPort> BusIo for T {}

/// Synthetic keyboard the matched rules type on.
pub trait KeyEmitter {
    fn press(&mut self, press: KeyPress) -> io::Result<()>;
}

/// Digital control lines on the PiBUS board (V4 hardware).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlLine {
    TransceiverWake,
    VideoSelect,
    Led,
    Relay,
}

pub trait Pins {
    fn write(&mut self, line: ControlLine, high: bool) -> Result<(), Error>;
    /// Configure the bus-monitor line as an input, optionally pulled up.
    fn monitor_input(&mut self, line: u8, pull_up: bool) -> Result<(), Error>;
}

/// One-shot system clock set once both bus broadcasts are harvested.
pub trait ClockSetter {
    fn set(&mut self, yyyymmdd: &str, hhmm: &str) -> io::Result<()>;
}

/// Host power-off after prolonged bus silence.
pub trait PowerController {
    fn power_off(&mut self) -> io::Result<()>;
}

const EMITTED_KEYS: [Key; 14] = [
    Key::KEY_I,
    Key::KEY_ENTER,
    Key::KEY_TAB,
    Key::KEY_UP,
    Key::KEY_DOWN,
    Key::KEY_LEFT,
    Key::KEY_RIGHT,
    Key::KEY_ESC,
    Key::KEY_SPACE,
    Key::KEY_Z,
    Key::KEY_X,
    Key::KEY_COMMA,
    Key::KEY_DOT,
    Key::KEY_LEFTCTRL,
];

/// uinput-backed virtual keyboard.
pub struct UinputKeyboard {
    device: VirtualDevice,
}

impl UinputKeyboard {
    pub fn new() -> io::Result<Self> {
        let mut keys = AttributeSet::<Key>::new();
        for key in EMITTED_KEYS {
            keys.insert(key);
        }

        let device = VirtualDeviceBuilder::new()?
            .name("ibusd")
            .with_keys(&keys)?
            .build()?;

        Ok(UinputKeyboard { device })
    }
}

impl KeyEmitter for UinputKeyboard {
    fn press(&mut self, press: KeyPress) -> io::Result<()> {
        let mut events = Vec::with_capacity(4);
        if press.ctrl {
            events.push(InputEvent::new(EventType::KEY, Key::KEY_LEFTCTRL.code(), 1));
        }
        events.push(InputEvent::new(EventType::KEY, press.key.code(), 1));
        events.push(InputEvent::new(EventType::KEY, press.key.code(), 0));
        if press.ctrl {
            events.push(InputEvent::new(EventType::KEY, Key::KEY_LEFTCTRL.code(), 0));
        }
        self.device.emit(&events)
    }
}

/* PiBUS V4 control lines */
const GPIO_NSLP_CTL: u8 = 22;
const GPIO_PIN17_CTL: u8 = 23;
const GPIO_LED_CTL: u8 = 24;
const GPIO_RELAY_CTL: u8 = 27;

/// Raspberry Pi GPIO via the character device.
pub struct PiPins {
    gpio: Gpio,
    wake: Option<OutputPin>,
    select: Option<OutputPin>,
    led: Option<OutputPin>,
    relay: Option<OutputPin>,
    // Held so the pull configuration stays applied.
    monitor: Option<InputPin>,
}

impl PiPins {
    pub fn new(hw_version: u32) -> Result<Self, Error> {
        let gpio = Gpio::new()?;

        let mut pins = PiPins {
            gpio,
            wake: None,
            select: None,
            led: None,
            relay: None,
            monitor: None,
        };

        if hw_version >= 4 {
            pins.wake = Some(pins.gpio.get(GPIO_NSLP_CTL)?.into_output());
            pins.select = Some(pins.gpio.get(GPIO_PIN17_CTL)?.into_output());
            pins.led = Some(pins.gpio.get(GPIO_LED_CTL)?.into_output());
            pins.relay = Some(pins.gpio.get(GPIO_RELAY_CTL)?.into_output());
        }

        Ok(pins)
    }
}

impl Pins for PiPins {
    fn write(&mut self, line: ControlLine, high: bool) -> Result<(), Error> {
        let pin = match line {
            ControlLine::TransceiverWake => self.wake.as_mut(),
            ControlLine::VideoSelect => self.select.as_mut(),
            ControlLine::Led => self.led.as_mut(),
            ControlLine::Relay => self.relay.as_mut(),
        };

        if let Some(pin) = pin {
            if high {
                pin.set_high();
            } else {
                pin.set_low();
            }
        }
        Ok(())
    }

    fn monitor_input(&mut self, line: u8, pull_up: bool) -> Result<(), Error> {
        let pin = self.gpio.get(line)?;
        self.monitor = Some(if pull_up {
            pin.into_input_pullup()
        } else {
            pin.into_input()
        });
        Ok(())
    }
}

/// Sets the system clock by shelling out to date(1).
pub struct ShellClock;

impl ClockSetter for ShellClock {
    fn set(&mut self, yyyymmdd: &str, hhmm: &str) -> io::Result<()> {
        Command::new("date")
            .arg("-s")
            .arg(format!("{yyyymmdd} {hhmm}"))
            .status()
            .map(drop)
    }
}

/// Syncs filesystems and powers the host off.
pub struct ShellPower;

impl PowerController for ShellPower {
    fn power_off(&mut self) -> io::Result<()> {
        Command::new("/bin/sync").status()?;
        std::thread::sleep(Duration::from_secs(1));

        let poweroff = if Path::new("/usr/sbin/poweroff").exists() {
            "/usr/sbin/poweroff"
        } else {
            "/sbin/poweroff"
        };
        Command::new(poweroff).status().map(drop)
    }
}

/// Append-only diagnostic log of all bus traffic, every line prefixed
/// with monotonic seconds since startup.
pub struct BusLog {
    out: Box<dyn Write>,
    start: Instant,
}

impl BusLog {
    pub fn open(path: &Path) -> Result<Self, Error> {
        let file = std::fs::OpenOptions::new()
            .append(true)
            .create(true)
            .open(path)?;
        Ok(Self::writer(Box::new(io::BufWriter::new(file))))
    }

    pub fn writer(out: Box<dyn Write>) -> Self {
        BusLog {
            out,
            start: Instant::now(),
        }
    }

    pub fn line(&mut self, msg: &str) {
        let secs = self.start.elapsed().as_secs();
        if let Err(e) = writeln!(self.out, "{:06} {}", secs, msg) {
            warn!("bus log write failed: {e}");
        }
    }

    pub fn flush(&mut self) {
        if let Err(e) = self.out.flush() {
            warn!("bus log flush failed: {e}");
        }
    }
}

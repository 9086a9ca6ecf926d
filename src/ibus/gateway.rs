use std::io;
use std::process::Command;
use std::time::{Duration, Instant};

use evdev::Key;
use log::warn;

use crate::Error;
use crate::ibus::dispatch::{self, Action, KeyPress};
use crate::ibus::frame::{self, Frame, FrameAssembler};
use crate::ibus::send::TxQueue;
use crate::ibus::video::VideoSource;
use crate::ibus::RADIO;
use crate::platform::{BusIo, BusLog, ClockSetter, KeyEmitter, Pins, PowerController};

/// 50 ms periodic driver.
pub const TICK: Duration = Duration::from_millis(50);

/// Startup configuration, immutable once the gateway is constructed.
pub struct Config {
    /// Hex-pair-encoded bytes to transmit once after initialization.
    pub startup: Option<String>,
    /// Car has bluetooth: leave the Phone and Speak buttons alone.
    pub bluetooth: bool,
    /// Switch to the camera in reverse gear.
    pub camera: bool,
    /// MK3 head units need unsolicited "changer present" announcements.
    pub mk3_announce: bool,
    /// Force a CDC info reply every this many seconds (0 = disabled).
    pub cdc_info_interval: u64,
    /// GPIO line monitoring the bus for quiet-window arbitration
    /// (0 = the transceiver arbitrates in hardware).
    pub monitor_gpio: u8,
    /// PiBUS board revision; >= 4 has the relay/LED/video hardware.
    pub hw_version: u32,
}

/// Repeating CDC info reply timer. At most one is live; replacing the
/// `Option` cancels the previous one.
pub struct Reannounce {
    pub due: Instant,
    pub period: Duration,
}

/// All mutable run-time state, owned by the gateway and touched only
/// from its single-threaded callbacks.
pub struct RuntimeState {
    pub have_time: bool,
    pub have_date: bool,
    pub playing: bool,
    pub send_window_open: bool,
    pub keyboard_blocked: bool,
    pub cd_polled: bool,

    pub radio_msgs: u32,
    pub quiet_ticks: u32,
    pub led_tick: u32,
    pub slow_tick: u32,

    pub video_source: VideoSource,
    pub hhmm: String,
    pub yyyymmdd: String,
    pub reannounce: Option<Reannounce>,
}

impl RuntimeState {
    fn new() -> Self {
        RuntimeState {
            have_time: false,
            have_date: false,
            playing: false,
            send_window_open: false,
            keyboard_blocked: true,
            cd_polled: false,
            radio_msgs: 0,
            quiet_ticks: 0,
            led_tick: 0,
            slow_tick: 0,
            video_source: VideoSource::Bmw,
            hhmm: String::new(),
            yyyymmdd: String::new(),
            reannounce: None,
        }
    }
}

/// The protocol engine: assembles frames off the serial line, dispatches
/// them, emulates the CD changer and drives the periodic tick.
pub struct Gateway {
    pub(crate) config: Config,
    pub(crate) state: RuntimeState,
    pub(crate) assembler: FrameAssembler,
    pub(crate) queue: TxQueue,
    pub(crate) bus: Box<dyn BusIo>,
    pub(crate) log: BusLog,
    pub(crate) keyboard: Box<dyn KeyEmitter>,
    pub(crate) pins: Box<dyn Pins>,
    pub(crate) clock: Box<dyn ClockSetter>,
    pub(crate) power: Box<dyn PowerController>,
}

impl Gateway {
    pub fn new(
        config: Config,
        bus: Box<dyn BusIo>,
        log: BusLog,
        keyboard: Box<dyn KeyEmitter>,
        pins: Box<dyn Pins>,
        clock: Box<dyn ClockSetter>,
        power: Box<dyn PowerController>,
    ) -> Self {
        let arbitrate = config.monitor_gpio > 0;
        Gateway {
            config,
            state: RuntimeState::new(),
            assembler: FrameAssembler::new(Instant::now()),
            queue: TxQueue::new(arbitrate),
            bus,
            log,
            keyboard,
            pins,
            clock,
            power,
        }
    }

    /// One-time startup: monitor line, transceiver wake (hw >= 4) or the
    /// legacy companion-MCU configuration frame, optional startup bytes.
    pub fn start(&mut self) -> Result<(), Error> {
        self.log.line(&format!(
            "startup bt={} cam={} mk3={} cdci={} gpio={} hwv={}",
            self.config.bluetooth as u8,
            self.config.camera as u8,
            self.config.mk3_announce as u8,
            self.config.cdc_info_interval,
            self.config.monitor_gpio,
            self.config.hw_version,
        ));
        self.log.flush();

        // GPIO 15 is the UART RX itself; never reconfigure it.
        let monitor = self.config.monitor_gpio;
        if monitor != 0 && monitor != 15 {
            self.pins
                .monitor_input(monitor, self.config.hw_version >= 4)?;
        }

        if self.config.hw_version >= 4 {
            use crate::platform::ControlLine::*;
            self.pins.write(TransceiverWake, true)?;
            self.pins.write(VideoSelect, false)?;
            self.pins.write(Led, true)?;
            self.pins.write(Relay, false)?;
        } else if self.config.bluetooth || !self.config.camera {
            // Companion MCU config: bit0 = ignore phone button,
            // bit1 = ignore reverse gear, trailing XOR checksum.
            let mut cfg = [0xd7, 0x04, 0xd8, 0x70, 0x00, 0x00];
            if self.config.bluetooth {
                cfg[4] |= 1;
            }
            if !self.config.camera {
                cfg[4] |= 2;
            }
            cfg[5] = frame::checksum(&cfg[..5]);
            self.send(&cfg)?;
        }

        if let Some(hex) = self.config.startup.take() {
            let bytes = parse_hex_string(&hex)?;
            self.send(&bytes)?;
            self.log.flush();
        }

        Ok(())
    }

    /// Cooperative main loop: drain the serial line, fire the 50 ms tick
    /// and the CDC reannounce timer. Returns after the idle power-off.
    pub fn run(&mut self) -> Result<(), Error> {
        let mut next_tick = Instant::now() + TICK;

        loop {
            self.poll_bus()?;

            let now = Instant::now();
            while now >= next_tick {
                if self.tick()? {
                    return Ok(());
                }
                next_tick += TICK;
            }

            self.fire_reannounce(now)?;
        }
    }

    /// Read whatever is available. A timeout just ends the poll; any
    /// other error is fatal (a supervisor restart beats limping along).
    fn poll_bus(&mut self) -> Result<(), Error> {
        let mut buf = [0u8; frame::MAX_FRAME];
        match self.bus.read(&mut buf) {
            Ok(0) => Ok(()),
            Ok(n) => {
                let now = Instant::now();
                for &byte in &buf[..n] {
                    self.on_byte(byte, now)?;
                }
                Ok(())
            }
            Err(e)
                if e.kind() == io::ErrorKind::TimedOut
                    || e.kind() == io::ErrorKind::WouldBlock =>
            {
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Any received byte means the bus is busy: the transmit window
    /// closes before the byte even enters the assembler.
    pub(crate) fn on_byte(&mut self, byte: u8, now: Instant) -> Result<(), Error> {
        self.state.send_window_open = false;
        self.state.quiet_ticks = 0;

        if let Some(frame) = self.assembler.feed(byte, now) {
            self.handle_frame(frame)?;
        }
        Ok(())
    }

    /// Dispatch one complete frame: log it, run the CDC screen
    /// heuristic, count radio traffic, then the first matching rule
    /// wins. Unmatched frames go to the queue as echo bookkeeping.
    pub(crate) fn handle_frame(&mut self, frame: Frame) -> Result<(), Error> {
        let mut line = frame.hex();
        if !frame.checksum_ok() {
            line.push_str(" (corrupt)");
        }
        self.log.line(&line);

        if let Some(label) = dispatch::cdc_screen_shape(&frame) {
            self.log.line(&format!("ibus event: {label}"));
            self.cdc_mode()?;
        }

        if frame.source() == RADIO {
            self.state.radio_msgs += 1;
        }

        if let Some(rule) = dispatch::match_rule(&frame) {
            self.log.line(&format!("ibus event: {}", rule.tag));

            if let Some(key) = rule.key {
                if !self.state.keyboard_blocked {
                    self.emit_key(key);
                }
            }
            if let Some(command) = rule.command {
                self.run_command(command);
            }
            if let Some(action) = rule.action {
                self.run_action(action, &frame)?;
            }
            return Ok(());
        }

        self.queue.notify_received(&frame);
        Ok(())
    }

    fn run_action(&mut self, action: Action, msg: &[u8]) -> Result<(), Error> {
        match action {
            Action::Rotary => self.handle_rotary(msg),
            Action::OutsideKey => self.handle_outside_key()?,
            Action::ToneKey => self.handle_tone_key()?,
            Action::Screen => self.handle_screen(msg),
            Action::Speak => self.handle_speak(),
            Action::Immobilized => self.handle_immobilized(),
            Action::Phone => self.handle_phone()?,
            Action::IkeSensor => self.handle_ike_sensor(msg)?,
            Action::Time => self.handle_time(msg),
            Action::Date => self.handle_date(msg),
            Action::CdPoll => self.handle_poll()?,
            Action::CdInfoRequest => self.handle_info_request()?,
            Action::CdStop => self.handle_stop()?,
            Action::CdPause => self.handle_pause()?,
            Action::CdStart => self.handle_start()?,
            Action::CdDiskChange => self.handle_disk_change(msg)?,
        }
        Ok(())
    }

    /// Multifunction rotary encoder: direction in the high nibble of the
    /// trailing byte, tick count in the low nibble (no upper bound
    /// beyond its natural 4-bit range).
    fn handle_rotary(&mut self, msg: &[u8]) {
        if msg.len() < 5 || self.state.keyboard_blocked {
            return;
        }

        let key = match msg[4] & 0xf0 {
            0x80 => KeyPress::plain(Key::KEY_UP),
            0x00 => KeyPress::plain(Key::KEY_DOWN),
            _ => return,
        };

        for _ in 0..(msg[4] & 0x0f) {
            self.emit_key(key);
        }
    }

    fn handle_speak(&mut self) {
        if !self.state.keyboard_blocked && !self.config.bluetooth {
            self.emit_key(KeyPress::plain(Key::KEY_SPACE));
        }
    }

    fn handle_screen(&mut self, msg: &[u8]) {
        if msg.len() > 5 {
            self.log
                .line(&format!("unknown screen 0x{:02X}", msg[4]));
        }
    }

    pub(crate) fn emit_key(&mut self, press: KeyPress) {
        if let Err(e) = self.keyboard.press(press) {
            warn!("key emission failed: {e}");
        }
    }

    fn run_command(&mut self, command: &str) {
        if let Err(e) = Command::new("sh").arg("-c").arg(command).status() {
            warn!("command {command:?} failed: {e}");
        }
    }

    pub(crate) fn send(&mut self, frame: &[u8]) -> Result<(), Error> {
        self.queue.send(&mut self.bus, frame)
    }

    fn fire_reannounce(&mut self, now: Instant) -> Result<(), Error> {
        let due = self
            .state
            .reannounce
            .as_ref()
            .is_some_and(|timer| now >= timer.due);
        if !due {
            return Ok(());
        }

        if let Some(timer) = self.state.reannounce.as_mut() {
            timer.due = now + timer.period;
        }
        self.log.line(&format!(
            "cdc interval timeout ({} s)",
            self.config.cdc_info_interval
        ));
        self.send_info_reply()
    }
}

/// Decode a hex-pair string ("1805804101..." style) into bytes.
pub fn parse_hex_string(hex: &str) -> Result<Vec<u8>, Error> {
    let hex = hex.trim();
    if hex.len() % 2 != 0 {
        return Err(Error::InvalidStartupHex);
    }
    hex.as_bytes()
        .chunks(2)
        .map(|pair| {
            let text = std::str::from_utf8(pair).map_err(|_| Error::InvalidStartupHex)?;
            u8::from_str_radix(text, 16).map_err(|_| Error::InvalidStartupHex)
        })
        .collect()
}

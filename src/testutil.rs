//! Recording stand-ins for every hardware seam, shared by the unit
//! tests. All handles are `Rc<RefCell<..>>` clones; the gateway is
//! single-threaded so plain interior mutability is enough.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::rc::Rc;

use crate::ibus::dispatch::KeyPress;
use crate::ibus::gateway::{Config, Gateway};
use crate::platform::{
    BusIo, BusLog, ClockSetter, ControlLine, KeyEmitter, Pins, PowerController,
};

pub struct Handles {
    /// Everything written to the serial port.
    pub tx: Rc<RefCell<Vec<u8>>>,
    pub keys: Rc<RefCell<Vec<KeyPress>>>,
    pub pins: Rc<RefCell<Vec<(ControlLine, bool)>>>,
    pub clock: Rc<RefCell<Vec<(String, String)>>>,
    /// Number of power-off invocations.
    pub power: Rc<RefCell<u32>>,
}

pub struct MockBus {
    pub rx: VecDeque<u8>,
    tx: Rc<RefCell<Vec<u8>>>,
}

impl Read for MockBus {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.rx.is_empty() {
            return Err(io::ErrorKind::TimedOut.into());
        }
        let mut n = 0;
        while n < buf.len() {
            match self.rx.pop_front() {
                Some(byte) => {
                    buf[n] = byte;
                    n += 1;
                }
                None => break,
            }
        }
        Ok(n)
    }
}

impl Write for MockBus {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.tx.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl BusIo for MockBus {}

struct RecordingKeys(Rc<RefCell<Vec<KeyPress>>>);

impl KeyEmitter for RecordingKeys {
    fn press(&mut self, press: KeyPress) -> io::Result<()> {
        self.0.borrow_mut().push(press);
        Ok(())
    }
}

struct RecordingPins(Rc<RefCell<Vec<(ControlLine, bool)>>>);

impl Pins for RecordingPins {
    fn write(&mut self, line: ControlLine, high: bool) -> Result<(), crate::Error> {
        self.0.borrow_mut().push((line, high));
        Ok(())
    }

    fn monitor_input(&mut self, _line: u8, _pull_up: bool) -> Result<(), crate::Error> {
        Ok(())
    }
}

struct RecordingClock(Rc<RefCell<Vec<(String, String)>>>);

impl ClockSetter for RecordingClock {
    fn set(&mut self, yyyymmdd: &str, hhmm: &str) -> io::Result<()> {
        self.0
            .borrow_mut()
            .push((yyyymmdd.to_string(), hhmm.to_string()));
        Ok(())
    }
}

struct RecordingPower(Rc<RefCell<u32>>);

impl PowerController for RecordingPower {
    fn power_off(&mut self) -> io::Result<()> {
        *self.0.borrow_mut() += 1;
        Ok(())
    }
}

pub fn test_config() -> Config {
    Config {
        startup: None,
        bluetooth: false,
        camera: true,
        mk3_announce: true,
        cdc_info_interval: 0,
        monitor_gpio: 0,
        hw_version: 0,
    }
}

pub fn test_gateway(config: Config) -> (Gateway, Handles) {
    let handles = Handles {
        tx: Rc::new(RefCell::new(Vec::new())),
        keys: Rc::new(RefCell::new(Vec::new())),
        pins: Rc::new(RefCell::new(Vec::new())),
        clock: Rc::new(RefCell::new(Vec::new())),
        power: Rc::new(RefCell::new(0)),
    };

    let gateway = Gateway::new(
        config,
        Box::new(MockBus {
            rx: VecDeque::new(),
            tx: handles.tx.clone(),
        }),
        BusLog::writer(Box::new(io::sink())),
        Box::new(RecordingKeys(handles.keys.clone())),
        Box::new(RecordingPins(handles.pins.clone())),
        Box::new(RecordingClock(handles.clock.clone())),
        Box::new(RecordingPower(handles.power.clone())),
    );

    (gateway, handles)
}

use std::time::Duration;

use crate::Error;
use crate::ibus::clock::{REQUEST_DATE, REQUEST_TIME};
use crate::ibus::gateway::Gateway;
use crate::platform::ControlLine;

/// Power the host off after this much bus silence.
pub const IDLE_POWER_OFF: Duration = Duration::from_secs(300);

/// Ticks per second and per 30 s slow cycle.
const TICKS_PER_SECOND: u32 = 20;
const SLOW_CYCLE: u32 = 600;

impl Gateway {
    /// The 50 ms tick. Returns `true` when the idle power-off fired and
    /// the process should stop.
    pub(crate) fn tick(&mut self) -> Result<bool, Error> {
        self.state.led_tick += 1;
        if self.state.led_tick >= TICKS_PER_SECOND {
            self.state.led_tick = 0;
            if self.assembler.last_byte_at().elapsed() > IDLE_POWER_OFF {
                self.log.line("idle timeout");
                self.log.flush();
                self.power.power_off()?;
                return Ok(true);
            }
        }

        if self.config.hw_version >= 4 {
            // On for the first 100 ms of each second.
            self.pins
                .write(ControlLine::Led, self.state.led_tick < 2)?;
        }

        self.state.slow_tick += 1;
        if self.state.slow_tick >= SLOW_CYCLE {
            self.state.slow_tick = 0;
            self.log.flush();
            if self.config.mk3_announce {
                self.announce_cdc()?;
            }
        }

        // Twice per slow cycle, 15 s apart, until both are captured.
        if self.state.slow_tick == 0 || self.state.slow_tick == SLOW_CYCLE / 2 {
            if !self.state.have_time {
                self.send(&REQUEST_TIME)?;
            }
            if !self.state.have_date {
                self.send(&REQUEST_DATE)?;
            }
        }

        if self.config.monitor_gpio > 0 {
            let window_open = self.state.send_window_open;
            self.queue.service(&mut self.bus, window_open)?;

            // Two quiet ticks with nothing mid-assembly is the only
            // path that opens the window; any byte closes it again.
            self.state.quiet_ticks = self.state.quiet_ticks.saturating_add(1);
            if self.state.quiet_ticks >= 2
                && !self.state.send_window_open
                && !self.assembler.in_progress()
            {
                self.state.send_window_open = true;
            }
        }

        Ok(false)
    }
}

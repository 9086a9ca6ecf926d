use log::warn;

use crate::ibus::gateway::Gateway;
use crate::ibus::{CD_CHANGER, IKE};

/// CD changer asking the IKE for the current time / date. Sent until
/// both broadcasts have been harvested.
pub const REQUEST_TIME: [u8; 7] = [CD_CHANGER, 0x05, IKE, 0x41, 0x01, 0x01, 0xdc];
pub const REQUEST_DATE: [u8; 7] = [CD_CHANGER, 0x05, IKE, 0x41, 0x02, 0x01, 0xdf];

impl Gateway {
    /// IKE time display update, fixed text layout: hour ASCII at 6..8,
    /// minutes at 9..11, a 'P' at 11 marks PM. Latched on first capture
    /// for the rest of the process lifetime.
    pub(crate) fn handle_time(&mut self, msg: &[u8]) {
        if msg.len() <= 12 || self.state.have_time {
            return;
        }

        let mut hour: u32 = std::str::from_utf8(&msg[6..8])
            .ok()
            .and_then(|text| text.trim_start().parse().ok())
            .unwrap_or(0);
        if msg[11] == b'P' {
            hour += 12;
        }

        self.state.have_time = true;
        self.state.hhmm = format!("{:02}:{}{}", hour, msg[9] as char, msg[10] as char);
        self.maybe_set_clock();
    }

    /// Sibling date broadcast, DD/MM/YYYY text layout, stored as
    /// YYYY-MM-DD: month digits at 9..10, day digits at 6..7.
    pub(crate) fn handle_date(&mut self, msg: &[u8]) {
        if msg.len() <= 15 || self.state.have_date {
            return;
        }

        self.state.have_date = true;
        self.state.yyyymmdd = format!(
            "{}{}{}{}-{}{}-{}{}",
            msg[12] as char,
            msg[13] as char,
            msg[14] as char,
            msg[15] as char,
            msg[9] as char,
            msg[10] as char,
            msg[6] as char,
            msg[7] as char,
        );
        self.maybe_set_clock();
    }

    /// Fires exactly once, when the second of the two values lands.
    fn maybe_set_clock(&mut self) {
        if !(self.state.have_time && self.state.have_date) {
            return;
        }

        self.log.line(&format!(
            "setting clock: {} {}",
            self.state.yyyymmdd, self.state.hhmm
        ));
        if let Err(e) = self.clock.set(&self.state.yyyymmdd, &self.state.hhmm) {
            warn!("clock set failed: {e}");
        }
    }
}

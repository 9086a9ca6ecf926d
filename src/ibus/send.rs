use std::collections::VecDeque;
use std::io::Write;

use crate::Error;

/// Outbound frame queue with bus arbitration.
///
/// With a monitor GPIO configured, frames wait until the locally tracked
/// transmit window is open. A written frame stays at the head of the
/// queue until its own echo comes back on the receive side (the bus
/// loops transmissions back), which is the only confirmation the
/// hardware offers; an open window retransmits the head.
///
/// With monitoring disabled the TH3122 transceiver arbitrates in
/// hardware and frames are written immediately.
pub struct TxQueue {
    pending: VecDeque<Vec<u8>>,
    arbitrate: bool,
}

impl TxQueue {
    pub fn new(arbitrate: bool) -> Self {
        TxQueue {
            pending: VecDeque::new(),
            arbitrate,
        }
    }

    pub fn send(&mut self, port: &mut dyn Write, frame: &[u8]) -> Result<(), Error> {
        if self.arbitrate {
            self.pending.push_back(frame.to_vec());
        } else {
            port.write_all(frame)?;
        }
        Ok(())
    }

    /// Called from the periodic tick with the current window state.
    pub fn service(&mut self, port: &mut dyn Write, window_open: bool) -> Result<(), Error> {
        if window_open {
            if let Some(head) = self.pending.front() {
                port.write_all(head)?;
            }
        }
        Ok(())
    }

    /// Bookkeeping for frames nothing else recognized: our own
    /// transmissions echo back and confirm the head of the queue.
    pub fn notify_received(&mut self, frame: &[u8]) {
        if self.pending.front().is_some_and(|head| head == frame) {
            self.pending.pop_front();
        }
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const POLL_REPLY: [u8; 6] = [0x18, 0x04, 0xff, 0x02, 0x00, 0xe1];

    #[test]
    fn immediate_write_without_arbitration() {
        let mut out = Vec::new();
        let mut queue = TxQueue::new(false);
        queue.send(&mut out, &POLL_REPLY).unwrap();
        assert_eq!(out, POLL_REPLY);
        assert!(queue.is_empty());
    }

    #[test]
    fn queued_until_window_opens() {
        let mut out = Vec::new();
        let mut queue = TxQueue::new(true);
        queue.send(&mut out, &POLL_REPLY).unwrap();
        assert!(out.is_empty());

        queue.service(&mut out, false).unwrap();
        assert!(out.is_empty());

        queue.service(&mut out, true).unwrap();
        assert_eq!(out, POLL_REPLY);
    }

    #[test]
    fn echo_confirms_head() {
        let mut out = Vec::new();
        let mut queue = TxQueue::new(true);
        queue.send(&mut out, &POLL_REPLY).unwrap();
        queue.service(&mut out, true).unwrap();

        // Foreign traffic does not confirm anything.
        queue.notify_received(&[0x68, 0x03, 0x18, 0x01, 0x72]);
        assert!(!queue.is_empty());

        queue.notify_received(&POLL_REPLY);
        assert!(queue.is_empty());

        // Head gone, nothing further to write.
        out.clear();
        queue.service(&mut out, true).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn head_retransmits_until_confirmed() {
        let mut out = Vec::new();
        let mut queue = TxQueue::new(true);
        queue.send(&mut out, &POLL_REPLY).unwrap();

        queue.service(&mut out, true).unwrap();
        queue.service(&mut out, true).unwrap();
        assert_eq!(out.len(), POLL_REPLY.len() * 2);
    }
}

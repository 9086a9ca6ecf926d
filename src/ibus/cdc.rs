use std::time::{Duration, Instant};

use crate::Error;
use crate::ibus::gateway::{Gateway, Reannounce};
use crate::ibus::video::VideoSource;
use crate::ibus::{CD_CHANGER, RADIO};

/// CDC status frames, bit-exact as observed on the bus.
pub const NOT_PLAYING: [u8; 12] = [
    CD_CHANGER, 0x0a, RADIO, 0x39, 0x00, 0x02, 0x00, 0x01, 0x00, 0x01, 0x04, 0x45,
];
pub const START_PLAYING: [u8; 12] = [
    CD_CHANGER, 0x0a, RADIO, 0x39, 0x02, 0x09, 0x00, 0x01, 0x00, 0x01, 0x04, 0x4c,
];
pub const PAUSE_PLAYING: [u8; 12] = [
    CD_CHANGER, 0x0a, RADIO, 0x39, 0x01, 0x0c, 0x00, 0x01, 0x00, 0x01, 0x04, 0x4a,
];

/// Poll response and the unsolicited MK3-style announcement.
pub const CDC_PRESENT: [u8; 6] = [CD_CHANGER, 0x04, 0xff, 0x02, 0x00, 0xe1];
pub const CDC_ANNOUNCE: [u8; 6] = [CD_CHANGER, 0x04, 0xff, 0x02, 0x01, 0xe0];

impl Gateway {
    /// Radio polled for a changer: reply immediately and stop the
    /// periodic announcements.
    pub(crate) fn handle_poll(&mut self) -> Result<(), Error> {
        self.send(&CDC_PRESENT)?;
        self.state.cd_polled = true;
        Ok(())
    }

    /// Status request. The "now playing" reply doubles as the line-in
    /// un-mute, so it is re-sent on a forced interval when configured.
    pub(crate) fn handle_info_request(&mut self) -> Result<(), Error> {
        self.send_info_reply()?;

        let secs = self.config.cdc_info_interval;
        if secs > 0 {
            let period = Duration::from_secs(secs);
            // Replacing the handle cancels any previous timer.
            self.state.reannounce = Some(Reannounce {
                due: Instant::now() + period,
                period,
            });
        }
        Ok(())
    }

    pub(crate) fn send_info_reply(&mut self) -> Result<(), Error> {
        if self.state.playing {
            self.send(&START_PLAYING)?;
        } else {
            self.send(&NOT_PLAYING)?;
        }
        self.state.cd_polled = true;
        Ok(())
    }

    /// The head unit switched to the CD-changer screen: our input is
    /// live from here on.
    pub(crate) fn cdc_mode(&mut self) -> Result<(), Error> {
        self.state.keyboard_blocked = false;
        self.state.playing = true;

        if self.config.hw_version >= 4 {
            self.state.video_source = VideoSource::Pi;
            self.set_video(VideoSource::Pi)?;
        }
        Ok(())
    }

    pub(crate) fn handle_stop(&mut self) -> Result<(), Error> {
        self.send(&NOT_PLAYING)?;
        self.state.playing = false;
        Ok(())
    }

    pub(crate) fn handle_pause(&mut self) -> Result<(), Error> {
        self.send(&PAUSE_PLAYING)?;
        self.state.playing = false;
        Ok(())
    }

    pub(crate) fn handle_start(&mut self) -> Result<(), Error> {
        self.send(&START_PLAYING)?;
        self.state.playing = true;
        Ok(())
    }

    /// Disk change carries its own sanity check: the checksum position
    /// must equal 0x4B xor the disc byte. Anything else is ignored.
    pub(crate) fn handle_disk_change(&mut self, msg: &[u8]) -> Result<(), Error> {
        if msg.len() != 7 || msg[6] != (0x4b ^ msg[5]) {
            return Ok(());
        }
        self.send(&START_PLAYING)
    }

    /// Immobilizer says this session was never paired: stop the forced
    /// info replies.
    pub(crate) fn handle_immobilized(&mut self) {
        self.state.reannounce = None;
    }

    /// User left the CDC screen with one of the outside keys: block the
    /// keyboard again and give the video back to the car.
    pub(crate) fn handle_outside_key(&mut self) -> Result<(), Error> {
        self.state.keyboard_blocked = true;

        if self.config.hw_version >= 4 {
            self.state.video_source = VideoSource::Bmw;
            self.set_video(VideoSource::Bmw)?;
        }
        Ok(())
    }

    pub(crate) fn handle_tone_key(&mut self) -> Result<(), Error> {
        if self.config.hw_version >= 4 {
            self.handle_outside_key()?;
        }
        Ok(())
    }

    /// MK3-style announcement, every 30 s until the radio polls us. A
    /// silent radio means nobody is listening, so stay quiet too.
    pub(crate) fn announce_cdc(&mut self) -> Result<(), Error> {
        if self.state.cd_polled || self.state.radio_msgs == 0 {
            return Ok(());
        }

        self.send(&CDC_ANNOUNCE)?;
        self.state.radio_msgs = 0;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ibus::frame::{checksum_ok, Frame};
    use crate::testutil::{test_config, test_gateway};

    #[test]
    fn status_frames_are_well_formed() {
        for frame in [
            &NOT_PLAYING[..],
            &START_PLAYING[..],
            &PAUSE_PLAYING[..],
            &CDC_PRESENT[..],
            &CDC_ANNOUNCE[..],
        ] {
            assert!(checksum_ok(frame));
            assert_eq!(frame[1] as usize + 2, frame.len());
            assert_eq!(frame[0], CD_CHANGER);
        }
    }

    #[test]
    fn poll_gets_exactly_one_present_reply() {
        let (mut gw, handles) = test_gateway(test_config());
        assert!(!gw.state.cd_polled);

        gw.handle_frame(Frame::from_slice(&[0x68, 0x03, 0x18, 0x01, 0x72]))
            .unwrap();
        assert!(gw.state.cd_polled);
        assert_eq!(&handles.tx.borrow()[..], &CDC_PRESENT);
    }

    #[test]
    fn start_while_stopped_begins_playing() {
        let (mut gw, handles) = test_gateway(test_config());
        assert!(!gw.state.playing);

        gw.handle_frame(Frame::from_slice(&[0x68, 0x05, 0x18, 0x38, 0x03, 0x00, 0x4e]))
            .unwrap();
        assert!(gw.state.playing);
        assert_eq!(&handles.tx.borrow()[..], &START_PLAYING);
    }

    #[test]
    fn stop_while_playing_stops() {
        let (mut gw, handles) = test_gateway(test_config());
        gw.state.playing = true;

        gw.handle_frame(Frame::from_slice(&[0x68, 0x05, 0x18, 0x38, 0x01, 0x00, 0x4c]))
            .unwrap();
        assert!(!gw.state.playing);
        assert_eq!(&handles.tx.borrow()[..], &NOT_PLAYING);
    }

    #[test]
    fn pause_sends_pause_frame() {
        let (mut gw, handles) = test_gateway(test_config());
        gw.state.playing = true;

        gw.handle_frame(Frame::from_slice(&[0x68, 0x05, 0x18, 0x38, 0x02, 0x00, 0x4f]))
            .unwrap();
        assert!(!gw.state.playing);
        assert_eq!(&handles.tx.borrow()[..], &PAUSE_PLAYING);
    }

    #[test]
    fn info_request_replies_by_playing_state() {
        let inforeq = [0x68, 0x05, 0x18, 0x38, 0x00, 0x00, 0x4d];

        let (mut gw, handles) = test_gateway(test_config());
        gw.handle_frame(Frame::from_slice(&inforeq)).unwrap();
        assert_eq!(&handles.tx.borrow()[..], &NOT_PLAYING);
        assert!(gw.state.cd_polled);

        let (mut gw, handles) = test_gateway(test_config());
        gw.state.playing = true;
        gw.handle_frame(Frame::from_slice(&inforeq)).unwrap();
        assert_eq!(&handles.tx.borrow()[..], &START_PLAYING);
    }

    #[test]
    fn forced_interval_schedules_one_timer() {
        let mut cfg = test_config();
        cfg.cdc_info_interval = 5;
        let (mut gw, _handles) = test_gateway(cfg);

        gw.handle_info_request().unwrap();
        let first_due = gw.state.reannounce.as_ref().map(|t| t.due).unwrap();

        // A second request replaces, never double-schedules.
        gw.handle_info_request().unwrap();
        let second_due = gw.state.reannounce.as_ref().map(|t| t.due).unwrap();
        assert!(second_due >= first_due);
        assert_eq!(
            gw.state.reannounce.as_ref().map(|t| t.period),
            Some(Duration::from_secs(5))
        );
    }

    #[test]
    fn immobilizer_cancels_timer() {
        let mut cfg = test_config();
        cfg.cdc_info_interval = 5;
        let (mut gw, _handles) = test_gateway(cfg);
        gw.handle_info_request().unwrap();
        assert!(gw.state.reannounce.is_some());

        gw.handle_frame(Frame::from_slice(&[0x44, 0x05, 0xbf, 0x74, 0x00, 0xff, 0x75]))
            .unwrap();
        assert!(gw.state.reannounce.is_none());
    }

    #[test]
    fn disk_change_validates_payload() {
        let (mut gw, handles) = test_gateway(test_config());

        // 0x4a == 0x4b ^ 0x01: valid, replies as if a track started.
        gw.handle_frame(Frame::from_slice(&[0x68, 0x05, 0x18, 0x38, 0x06, 0x01, 0x4a]))
            .unwrap();
        assert_eq!(&handles.tx.borrow()[..], &START_PLAYING);

        handles.tx.borrow_mut().clear();
        gw.handle_frame(Frame::from_slice(&[0x68, 0x05, 0x18, 0x38, 0x06, 0x01, 0x00]))
            .unwrap();
        assert!(handles.tx.borrow().is_empty());
    }

    #[test]
    fn cdc_screen_unblocks_keyboard() {
        let (mut gw, _handles) = test_gateway(test_config());
        assert!(gw.state.keyboard_blocked);

        let cdc104 = [
            0x68, 0x12, 0x3b, 0x23, 0x62, 0x10, 0x43, 0x44, 0x43, 0x20, 0x31, 0x2d, 0x30, 0x34,
            0x20, 0x20, 0x20, 0x20, 0x20, 0x4c,
        ];
        gw.handle_frame(Frame::from_slice(&cdc104)).unwrap();
        assert!(!gw.state.keyboard_blocked);
        assert!(gw.state.playing);
    }

    #[test]
    fn outside_key_reblocks_keyboard() {
        let mut cfg = test_config();
        cfg.hw_version = 4;
        let (mut gw, handles) = test_gateway(cfg);
        gw.cdc_mode().unwrap();
        assert!(!gw.state.keyboard_blocked);

        gw.handle_outside_key().unwrap();
        assert!(gw.state.keyboard_blocked);
        assert_eq!(gw.state.video_source, VideoSource::Bmw);
        // Last pin writes encode BMW = (relay 0, select 0).
        let pins = handles.pins.borrow();
        assert!(pins.len() >= 2);
    }

    #[test]
    fn announce_needs_radio_activity() {
        let (mut gw, handles) = test_gateway(test_config());

        // Silent radio: no announcement.
        gw.announce_cdc().unwrap();
        assert!(handles.tx.borrow().is_empty());

        gw.state.radio_msgs = 3;
        gw.announce_cdc().unwrap();
        assert_eq!(&handles.tx.borrow()[..], &CDC_ANNOUNCE);
        assert_eq!(gw.state.radio_msgs, 0);

        // Once polled, announcements stop entirely.
        handles.tx.borrow_mut().clear();
        gw.state.cd_polled = true;
        gw.state.radio_msgs = 3;
        gw.announce_cdc().unwrap();
        assert!(handles.tx.borrow().is_empty());
    }
}

use strum::FromRepr;

use crate::Error;
use crate::ibus::gateway::Gateway;
use crate::platform::ControlLine;

/// What the car's screen is showing. Only meaningful on hardware
/// revision >= 4, which has the relay and select lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRepr)]
#[repr(u8)]
pub enum VideoSource {
    Bmw = 0,
    Pi = 1,
    Camera = 2,
}

impl VideoSource {
    /// Forward cycle with wraparound, for the repurposed phone button.
    pub fn next(self) -> Self {
        VideoSource::from_repr((self as u8 + 1) % 3).unwrap_or(VideoSource::Bmw)
    }
}

impl Gateway {
    /// Drive the two output lines whose combination selects the source:
    /// BMW = (0,0), PI = (0,1), CAMERA = (1,1).
    pub(crate) fn set_video(&mut self, source: VideoSource) -> Result<(), Error> {
        let (relay, select) = match source {
            VideoSource::Bmw => (false, false),
            VideoSource::Pi => (false, true),
            VideoSource::Camera => (true, true),
        };
        self.pins.write(ControlLine::Relay, relay)?;
        self.pins.write(ControlLine::VideoSelect, select)?;
        Ok(())
    }

    /// Phone button cycles through the sources, unless the car has real
    /// bluetooth phone hardware claiming the button.
    pub(crate) fn handle_phone(&mut self) -> Result<(), Error> {
        if self.config.hw_version >= 4 && !self.config.bluetooth {
            self.state.video_source = self.state.video_source.next();
            self.set_video(self.state.video_source)?;
        }
        Ok(())
    }

    /// IKE sensor broadcast: reverse gear (nibble 1) forces the camera
    /// without committing it; any other gear restores the committed
    /// source.
    pub(crate) fn handle_ike_sensor(&mut self, msg: &[u8]) -> Result<(), Error> {
        if self.config.hw_version < 4 || !self.config.camera {
            return Ok(());
        }
        let Some(&gear) = msg.get(5) else {
            return Ok(());
        };

        match gear >> 4 {
            1 => self.set_video(VideoSource::Camera),
            _ => self.set_video(self.state.video_source),
        }
    }
}

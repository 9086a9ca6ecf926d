use std::ops::Deref;
use std::time::{Duration, Instant};

/// Longest frame the accumulation buffer will hold. Anything longer is
/// truncated rather than allowed to run past the buffer.
pub const MAX_FRAME: usize = 64;

/// Inter-byte gap that forces the assembler to abandon a partial frame
/// and restart accumulation. The bus has no start-of-frame marker, so a
/// quiet gap is the only resynchronization signal.
pub const RESYNC_GAP: Duration = Duration::from_millis(64);

pub const OFFSET_SOURCE: usize = 0;
pub const OFFSET_LENGTH: usize = 1;

/// One complete frame, copied out of the accumulation buffer:
/// `[source][length][dest][payload...][checksum]` where the length byte
/// counts everything after itself and `total == length + 2`.
#[derive(Clone, Copy)]
pub struct Frame {
    bytes: [u8; MAX_FRAME],
    len: usize,
}

impl Frame {
    pub fn source(&self) -> u8 {
        self.bytes[OFFSET_SOURCE]
    }

    pub fn checksum_ok(&self) -> bool {
        checksum_ok(self)
    }

    pub fn hex(&self) -> String {
        let mut out = String::with_capacity(self.len * 3);
        for b in self.iter() {
            out.push_str(&format!("{:02x} ", b));
        }
        out.pop();
        out
    }

    #[cfg(test)]
    pub fn from_slice(bytes: &[u8]) -> Self {
        let mut buf = [0u8; MAX_FRAME];
        buf[..bytes.len()].copy_from_slice(bytes);
        Frame {
            bytes: buf,
            len: bytes.len(),
        }
    }
}

impl Deref for Frame {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.bytes[..self.len]
    }
}

/// XOR-fold of every byte except the last. The final byte of a valid
/// frame equals this fold of everything before it.
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0, |sum, b| sum ^ b)
}

pub fn checksum_ok(frame: &[u8]) -> bool {
    match frame.split_last() {
        Some((last, rest)) => checksum(rest) == *last,
        None => false,
    }
}

/// Reconstructs frames from the raw byte stream. The length byte is the
/// only framing signal: a corrupted length byte desynchronizes reception
/// until the next inter-byte gap, which is a property of the protocol,
/// not something this code tries to repair.
pub struct FrameAssembler {
    buf: [u8; MAX_FRAME],
    pos: usize,
    last_byte: Instant,
}

impl FrameAssembler {
    pub fn new(now: Instant) -> Self {
        FrameAssembler {
            buf: [0; MAX_FRAME],
            pos: 0,
            last_byte: now,
        }
    }

    /// Feed one received byte. Returns the completed frame once the
    /// running prefix satisfies `buf[1] + 2 == length`.
    pub fn feed(&mut self, byte: u8, now: Instant) -> Option<Frame> {
        if now.duration_since(self.last_byte) > RESYNC_GAP {
            self.pos = 0;
        }
        self.last_byte = now;

        // Saturating append: a pathologically long frame keeps landing in
        // the last slot instead of growing.
        self.buf[self.pos] = byte;
        if self.pos < MAX_FRAME - 1 {
            self.pos += 1;
        }

        if self.pos >= 4 && self.buf[OFFSET_LENGTH] as usize + 2 == self.pos {
            let frame = Frame {
                bytes: self.buf,
                len: self.pos,
            };
            self.pos = 0;
            return Some(frame);
        }

        None
    }

    /// A partial frame is sitting in the buffer.
    pub fn in_progress(&self) -> bool {
        self.pos != 0
    }

    pub fn last_byte_at(&self) -> Instant {
        self.last_byte
    }
}

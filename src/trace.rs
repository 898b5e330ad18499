//! Optional write-trace streamed during emulation (§4.C, §6): every SID and
//! CIA register write, interleaved with a frame-end marker, in either a
//! human-readable text form or a compact binary form. Presentation (where
//! the stream ends up — a file, a pipe) is a collaborator concern; this
//! module only defines the event shape and the two serializations named in
//! the spec.

use std::io::{self, Write};

/// One event observed during a driven emulation run, in the order the
/// driver produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceEvent {
    FrameEnd(u32),
    Sid(u16, u8),
    Cia(u16, u8),
}

/// Receives trace events as the driver produces them.
pub trait TraceSink {
    fn record(&mut self, event: TraceEvent);
}

/// One line per event: `frame N`, `sid addr value`, `cia addr value`.
pub struct TextTraceSink<W: Write> {
    writer: W,
}

impl<W: Write> TextTraceSink<W> {
    pub fn new(writer: W) -> TextTraceSink<W> {
        TextTraceSink { writer }
    }
}

impl<W: Write> TraceSink for TextTraceSink<W> {
    fn record(&mut self, event: TraceEvent) {
        let _ = match event {
            TraceEvent::FrameEnd(frame) => writeln!(self.writer, "frame {}", frame),
            TraceEvent::Sid(addr, value) => writeln!(self.writer, "sid {:04X} {:02X}", addr, value),
            TraceEvent::Cia(addr, value) => writeln!(self.writer, "cia {:04X} {:02X}", addr, value),
        };
    }
}

/// A byte tag (`0` = frame-end, `1` = sid, `2` = cia) followed by a 2-byte
/// little-endian address and a 1-byte value, omitted for frame-end records.
pub struct BinaryTraceSink<W: Write> {
    writer: W,
}

impl<W: Write> BinaryTraceSink<W> {
    pub fn new(writer: W) -> BinaryTraceSink<W> {
        BinaryTraceSink { writer }
    }
}

impl<W: Write> TraceSink for BinaryTraceSink<W> {
    fn record(&mut self, event: TraceEvent) {
        let result: io::Result<()> = match event {
            TraceEvent::FrameEnd(_) => self.writer.write_all(&[0]),
            TraceEvent::Sid(addr, value) => {
                let [lo, hi] = addr.to_le_bytes();
                self.writer.write_all(&[1, lo, hi, value])
            }
            TraceEvent::Cia(addr, value) => {
                let [lo, hi] = addr.to_le_bytes();
                self.writer.write_all(&[2, lo, hi, value])
            }
        };
        let _ = result;
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn text_sink_formats_each_event_kind() {
        let mut buf = Vec::new();
        {
            let mut sink = TextTraceSink::new(&mut buf);
            sink.record(TraceEvent::Sid(0xD400, 0x42));
            sink.record(TraceEvent::Cia(0xDC04, 0x01));
            sink.record(TraceEvent::FrameEnd(3));
        }
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(text, "sid D400 42\ncia DC04 01\nframe 3\n");
    }

    #[test]
    fn binary_sink_tags_each_record() {
        let mut buf = Vec::new();
        {
            let mut sink = BinaryTraceSink::new(&mut buf);
            sink.record(TraceEvent::Sid(0xD400, 0x42));
            sink.record(TraceEvent::FrameEnd(0));
        }
        assert_eq!(buf, vec![1, 0x00, 0xD4, 0x42, 0]);
    }
}

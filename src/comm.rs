/// Output side: renders delivered readings as a bracketed JSON report block.
///
/// The block is a header line, the reading as one JSON object, and a footer
/// line. The firmware logger writes log lines to serial, so the block goes
/// through the `log` facade.
use crate::protocol::{MsgBuffer, Reading, MAX_MSG_LEN};

/// First line of every report block
pub const REPORT_HEADER: &str = "===== BTHome Advertisement Decoded =====";

/// Last line of every report block
pub const REPORT_FOOTER: &str = "=========================================";

/// Receives each reading the consumer loop delivers.
pub trait ReadingSink {
    fn report(&mut self, reading: &Reading);
}

/// Serialize a reading to JSON bytes and write to the output buffer.
/// Returns the number of bytes written, or None if serialization failed.
pub fn serialize_reading(reading: &Reading, buf: &mut [u8]) -> Option<usize> {
    serde_json_core::to_slice(reading, buf).ok()
}

/// Serialize a reading into a fresh message buffer.
pub fn reading_json(reading: &Reading) -> Option<MsgBuffer> {
    let mut buf = MsgBuffer::new();
    buf.resize_default(MAX_MSG_LEN).ok();
    let len = serialize_reading(reading, &mut buf)?;
    buf.truncate(len);
    Some(buf)
}

/// Sink that writes the report block through `log::info!`.
#[derive(Debug, Default)]
pub struct LogSink {
    /// Readings written since startup
    pub delivered: u32,
}

impl LogSink {
    pub const fn new() -> Self {
        Self { delivered: 0 }
    }
}

impl ReadingSink for LogSink {
    fn report(&mut self, reading: &Reading) {
        let Some(json) = reading_json(reading) else {
            log::warn!(
                "Reading from {} too large to serialize, dropped",
                reading.device_id
            );
            return;
        };

        // serde-json-core only emits UTF-8
        let text = core::str::from_utf8(&json).unwrap_or("");
        log::info!("{}", REPORT_HEADER);
        log::info!("{}", text);
        log::info!("{}", REPORT_FOOTER);
        self.delivered = self.delivered.wrapping_add(1);
    }
}

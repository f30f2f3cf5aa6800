/// Compiled-in configuration for scanning, decoding and reporting.
///
/// Timing values match the classic NimBLE passive-scan setup for BTHome
/// sensors: short 5 s scan rounds that are restarted as soon as they end.

/// 16-bit service UUID assigned to BTHome (service data AD type 0x16).
pub const BTHOME_SERVICE_UUID16: u16 = 0xFCD2;

/// Length of one scan round in milliseconds. Zero scans until stopped.
pub const SCAN_DURATION_MS: u32 = 5_000;

/// How often the controller switches channels, in milliseconds.
pub const SCAN_INTERVAL_MS: u16 = 52;

/// How long the controller listens within each interval, in milliseconds.
pub const SCAN_WINDOW_MS: u16 = 30;

/// BTHome sensors only broadcast, so no scan requests are sent.
pub const SCAN_ACTIVE: bool = false;

/// Repeated advertisements carry fresh measurements and must not be dropped.
pub const SCAN_DUPLICATE_FILTER: bool = false;

/// Radio-side result limit (0 = unlimited).
pub const SCAN_MAX_RESULTS: u8 = 0;

/// Delay between consumer polls of the mailbox, in milliseconds.
pub const POLL_INTERVAL_MS: u64 = 500;

/// Period of the status log line, in seconds.
pub const STATUS_INTERVAL_SECS: u64 = 30;

/// Device name reported when the advertisement carries none.
pub const NO_NAME: &str = "NoName";

/// BTHome bind key (32 hex characters), taken from the build environment.
///
/// Passed to the decoder for encrypted payloads. The built-in
/// `BthomeDecoder` cannot decrypt, so with it setting the key has no effect.
pub const BIND_KEY_HEX: Option<&str> = option_env!("BTHOME_BIND_KEY");

/// Bit-exact wire encode/decode for the WUP download-info and status
/// structures, plus the vendor request selectors and status/state codes.
pub mod codec;

/// Tagged error kinds for the engine and the MD5 helper.
pub mod error;

/// The WUP protocol engine: the per-file download/checkpoint/verify state
/// machine.
pub mod engine;

/// Streaming MD5 over a file path.
pub mod md5sum;

/// The `Transport` capability contract and its `rusb`-backed implementation.
pub mod transport;

/// File iterator: single file or recursive directory walk.
pub mod walk;

pub mod admission;
pub mod codec;
pub mod detector;
pub mod dispatcher;
pub mod history;
pub mod monitor;
pub mod primitives;
pub mod protocol;
pub mod scaling;
pub mod viz;

use std::time::{SystemTime, UNIX_EPOCH};

pub fn version() -> String {
    env!("CARGO_PKG_VERSION").to_owned()
}

/// Wall-clock milliseconds since the epoch, as carried in wire messages.
pub fn systime_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("Time went backwards")
        .as_millis() as i64
}

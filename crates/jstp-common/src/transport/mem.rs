//! In-memory transport pair.
//!
//! Two transports joined back to back through an in-process duplex pipe,
//! going through the same framing as TCP. Used by the test suites; also
//! handy for embedding a server and client in one process.

use super::stream::{self, StreamOptions};
use super::Transport;

const PIPE_CAPACITY: usize = 64 * 1024;

/// Returns two connected transports.
pub fn pair() -> (Transport, Transport) {
    pair_with(StreamOptions::default())
}

pub fn pair_with(options: StreamOptions) -> (Transport, Transport) {
    let (left, right) = tokio::io::duplex(PIPE_CAPACITY);
    (
        stream::spawn(left, "mem:a".to_string(), options.clone()),
        stream::spawn(right, "mem:b".to_string(), options),
    )
}

//! Request loop of the knob server.
//!
//! Client threads read request lines and forward them as [`Incoming`] over a
//! crossbeam channel; [`serve_requests`] answers them one at a time against
//! the registry and feeds batch events into the Bevy app.

use std::io::{self, BufRead, Read};

use bevy::app::App;
use crossbeam_channel::{Receiver, Sender};
use knob_runtime::{KnobReply, ProtocolErrorKind};
use tracing::{info, warn};

use crate::protocol::{dispatch_line, encode_reply};
use crate::registry::KnobRegistry;
use crate::run_update;

/// Longest request line accepted from a client, newline included.
pub const MAX_REQUEST_BYTES: usize = 64 * 1024;

/// One request line plus the channel its reply goes back on.
pub struct Incoming {
    pub line: String,
    pub reply: Sender<String>,
}

/// Result of reading one request line from a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestLine {
    Line(String),
    /// The client sent more than [`MAX_REQUEST_BYTES`] without a newline.
    TooLong,
    Closed,
}

/// Read the next non-empty request line, never buffering more than `limit`
/// bytes.
pub fn read_request_line<R: BufRead>(reader: &mut R, limit: usize) -> io::Result<RequestLine> {
    let mut line = String::new();
    loop {
        line.clear();
        let read = reader
            .by_ref()
            .take(limit as u64 + 1)
            .read_line(&mut line)?;
        if read == 0 {
            return Ok(RequestLine::Closed);
        }
        if line.len() > limit {
            return Ok(RequestLine::TooLong);
        }
        let trimmed = line.trim();
        if !trimmed.is_empty() {
            return Ok(RequestLine::Line(trimmed.to_string()));
        }
    }
}

/// Reply sent to a client whose request line exceeded the limit.
pub fn oversized_request_reply(limit: usize) -> String {
    encode_reply(&KnobReply::failure(
        ProtocolErrorKind::MalformedRequest,
        format!("request line exceeds {limit} bytes"),
    ))
}

/// Answer requests until a `shutdown` request arrives or every sender is
/// gone. Returns the number of requests handled.
pub fn serve_requests(
    registry: &KnobRegistry,
    app: &mut App,
    requests: &Receiver<Incoming>,
) -> u64 {
    let mut handled = 0;
    while let Ok(Incoming { line, reply }) = requests.recv() {
        let dispatched = dispatch_line(registry, &line);
        if let Some(batch) = dispatched.batch {
            app.world.send_event(batch);
        }
        run_update(app);
        handled += 1;

        if reply.send(encode_reply(&dispatched.reply)).is_err() {
            warn!(target: "galactic::server", "reply.dropped=client_gone");
        }
        if dispatched.shutdown {
            info!(target: "galactic::server", handled, "knob_server.shutdown_requested");
            break;
        }
    }
    handled
}

//! Wanted/unwanted classification of raw replies.

use crate::protocol::response::{Frame, BAD_REQUEST, ERROR};

/// Why a reply was classified as unwanted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unwanted {
    /// Nothing arrived before the read timed out.
    Silence,
    /// The frame does not end on a terminator.
    Truncated,
    /// The device flagged the input as unrecognised.
    BadRequest,
    /// A bare `ERROR;` token.
    Error,
}

/// Classifies a reply.
///
/// `BUSY;` is a graceful answer to a write during a connection attempt and is
/// therefore wanted. `STATUS ERROR:<code>;` is a state report, not a protocol
/// rejection.
pub fn classify(frame: &Frame) -> Option<Unwanted> {
    if frame.is_empty() {
        Some(Unwanted::Silence)
    } else if frame.has_word(BAD_REQUEST) {
        Some(Unwanted::BadRequest)
    } else if frame.has_word(ERROR) {
        Some(Unwanted::Error)
    } else if !frame.is_terminated() {
        Some(Unwanted::Truncated)
    } else {
        None
    }
}

/// True when the line signals rejection, silence or a corrupted frame.
pub fn unwanted_response(line: &str) -> bool {
    classify(&Frame::parse(line)).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejections_are_unwanted() {
        assert!(unwanted_response("BAD_REQUEST;"));
        assert!(unwanted_response("PORT 8883;BAD_REQUEST;STATUS IDLE;"));
        assert!(unwanted_response("ERROR;"));
    }

    #[test]
    fn silence_and_truncation_are_unwanted() {
        assert_eq!(classify(&Frame::parse("")), Some(Unwanted::Silence));
        assert_eq!(
            classify(&Frame::parse("READINGS R:1514824768,T:2")),
            Some(Unwanted::Truncated)
        );
    }

    #[test]
    fn busy_and_status_reports_are_wanted() {
        assert!(!unwanted_response("BUSY;BUSY;"));
        assert!(!unwanted_response("STATUS ERROR:31A;"));
        assert!(!unwanted_response("DONE;STATUS CONNECTING_TO_AP;"));
        assert!(!unwanted_response("SIGNATURE ****;VERSION 4.3.6;"));
    }
}

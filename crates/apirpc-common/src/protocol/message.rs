//! ApiRpc Message Envelope
//!
//! A [`Message`] wraps one encoded payload together with the header fields the
//! transport needs to frame it and to correlate replies with requests.

use std::sync::atomic::{AtomicU32, Ordering};

/// Correlation identifier shared by a request and its reply
pub type Sequence = u32;

static SEQUENCE_COUNTER: AtomicU32 = AtomicU32::new(0);

fn next_sequence() -> Sequence {
    // Zero is reserved for header-less user packets
    loop {
        let seq = SEQUENCE_COUNTER.fetch_add(1, Ordering::Relaxed).wrapping_add(1);
        if seq != 0 {
            return seq;
        }
    }
}

/// A request or reply envelope.
///
/// # Fields
///
/// - `sequence`: correlation id; a reply carries its request's sequence
/// - `reply`: this message answers an earlier request
/// - `one_way`: the sender does not expect a reply
/// - `error`: the reply payload describes a failure
/// - `flag`: caller-defined flag byte, echoed on replies
/// - `payload`: encoder output
///
/// # Example
///
/// ```
/// use apirpc_common::protocol::Message;
///
/// let request = Message::new(b"ping".to_vec()).with_flag(3);
/// assert!(request.expects_reply());
///
/// let reply = request.create_reply(b"pong".to_vec());
/// assert!(reply.reply);
/// assert_eq!(reply.sequence, request.sequence);
/// assert_eq!(reply.flag, 3);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Message {
    pub sequence: Sequence,
    pub reply: bool,
    pub one_way: bool,
    pub error: bool,
    pub flag: u8,
    pub payload: Vec<u8>,
}

impl Message {
    /// Creates a request message with a fresh sequence.
    pub fn new(payload: Vec<u8>) -> Self {
        Message {
            sequence: next_sequence(),
            payload,
            ..Default::default()
        }
    }

    /// Sets the caller flag byte.
    pub fn with_flag(mut self, flag: u8) -> Self {
        self.flag = flag;
        self
    }

    /// Marks the request as not expecting a reply.
    pub fn into_one_way(mut self) -> Self {
        self.one_way = true;
        self
    }

    /// Creates the successful reply to this request.
    pub fn create_reply(&self, payload: Vec<u8>) -> Message {
        Message {
            sequence: self.sequence,
            reply: true,
            one_way: false,
            error: false,
            flag: self.flag,
            payload,
        }
    }

    /// Creates an error reply to this request.
    pub fn create_error_reply(&self, payload: Vec<u8>) -> Message {
        Message {
            error: true,
            ..self.create_reply(payload)
        }
    }

    /// Whether the receiver has to answer this message.
    pub fn expects_reply(&self) -> bool {
        !self.reply && !self.one_way
    }
}

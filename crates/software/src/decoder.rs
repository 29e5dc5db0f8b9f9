//! A byte-at-a-time decoder for serial MIDI streams which honors running status.
//!
//! The rules follow the MIDI 1.0 recommendations for running status:
//! - the running status is cleared at power up;
//! - it is set when a Voice Category status byte (0x80-0xEF) is received;
//! - it is cleared when a System Common status byte (0xF0-0xF7) is received;
//! - it is left alone when a System Realtime byte (0xF8-0xFF) is received;
//! - data bytes are ignored while there is no running status.
//!
//! Each input stream needs a decoder of its own: the running status of one port means nothing on another.

use crate::{
    event::{MidiEvent, StatusByte},
    handler::MidiHandler,
};

/// Data bytes collected so far for the message under the running status.
///
/// Tracked explicitly rather than inferred from the stored value, since 0 is a perfectly good data byte (e.g.
/// note 0 or program 0).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
enum Pending {
    #[default]
    Empty,
    /// The first of two data bytes.
    One(u8),
}

/// Converts a stream of bytes into [`MidiEvent`]s, one byte at a time.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MidiDecoder {
    running_status: Option<StatusByte>,
    pending: Pending,
}

impl MidiDecoder {
    /// Constructs an idle `MidiDecoder`.
    pub const fn new() -> Self {
        Self {
            running_status: None,
            pending: Pending::Empty,
        }
    }

    /// Consumes one byte, returning the event it completes, if any.
    ///
    /// Never fails: bytes which make no sense in the current state are dropped, and the decoder recovers at the next
    /// status byte.
    pub fn feed(&mut self, byte: u8) -> Option<MidiEvent> {
        match byte {
            0x00..=0x7F => self.data(byte),
            0x80..=0xEF => {
                self.running_status = StatusByte::new(byte);
                self.pending = Pending::Empty;
                None
            }
            0xF0..=0xF7 => {
                self.reset();
                Some(MidiEvent::SystemCommon { status: byte })
            }
            // realtime bytes may be interleaved anywhere, even between the data bytes of another message
            0xF8..=0xFF => Some(MidiEvent::SystemRealtime { status: byte }),
        }
    }

    fn data(&mut self, byte: u8) -> Option<MidiEvent> {
        let Some(status) = self.running_status else {
            trace!("Dropping data byte {} received without running status", byte);
            return None;
        };

        match (self.pending, status.data_len()) {
            (Pending::Empty, 1) => Some(MidiEvent::from_voice(status, &[byte])),
            (Pending::Empty, _) => {
                self.pending = Pending::One(byte);
                None
            }
            (Pending::One(first), _) => {
                self.pending = Pending::Empty;
                Some(MidiEvent::from_voice(status, &[first, byte]))
            }
        }
    }

    /// Consumes one byte and, if it completes an event, hands that event to `handler` before returning it.
    pub fn receive(&mut self, byte: u8, handler: &mut impl MidiHandler) -> Option<MidiEvent> {
        let event = self.feed(byte)?;
        event.dispatch(handler);
        Some(event)
    }

    /// Lazily decodes `bytes`.
    ///
    /// The returned [`Iterator`] borrows the decoder, so dropping it part way through and calling `decode` again with
    /// more bytes carries on exactly where the previous call left off.
    pub fn decode<I>(&mut self, bytes: I) -> Decode<'_, I::IntoIter>
    where
        I: IntoIterator<Item = u8>,
    {
        Decode {
            decoder: self,
            bytes: bytes.into_iter(),
        }
    }

    /// Forgets the running status and any partially received message.
    pub fn reset(&mut self) {
        self.running_status = None;
        self.pending = Pending::Empty;
    }

    /// The status byte currently applied to incoming data bytes.
    pub fn running_status(&self) -> Option<StatusByte> {
        self.running_status
    }

    /// Returns `true` if data bytes would currently be dropped.
    pub fn is_idle(&self) -> bool {
        self.running_status.is_none()
    }
}

/// [`Iterator`] over the events decoded from a byte iterator; see [`MidiDecoder::decode`].
pub struct Decode<'a, I> {
    decoder: &'a mut MidiDecoder,
    bytes: I,
}

impl<I: Iterator<Item = u8>> Iterator for Decode<'_, I> {
    type Item = MidiEvent;

    fn next(&mut self) -> Option<Self::Item> {
        self.bytes.by_ref().find_map(|byte| self.decoder.feed(byte))
    }
}

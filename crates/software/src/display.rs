//! Hand-off of the most recent event from the MIDI loop to a display refresh task.

use crate::event::MidiEvent;
use core::sync::atomic::{AtomicU16, Ordering};

/// Latest-value cell written by the MIDI loop and read by the display.
///
/// The reader may miss intermediate values but never sees a torn one. Can live in a `static`.
#[derive(Debug, Default)]
pub struct DisplayCell(AtomicU16);

impl DisplayCell {
    /// A cell holding 0, which no event encodes to.
    pub const fn new() -> Self {
        Self(AtomicU16::new(0))
    }

    /// Packs the status byte into the high byte and the first data byte, if any, into the low byte.
    pub fn encode(event: &MidiEvent) -> u16 {
        let bytes = event.to_bytes();
        let status = bytes.first().copied().unwrap_or_default();
        let data = bytes.get(1).copied().unwrap_or_default();
        (u16::from(status) << 8) | u16::from(data)
    }

    /// Stores a new value, replacing the previous one.
    pub fn publish(&self, value: u16) {
        self.0.store(value, Ordering::Release);
    }

    /// Encodes and stores `event`.
    pub fn show(&self, event: &MidiEvent) {
        self.publish(Self::encode(event));
    }

    /// The value most recently published.
    pub fn latest(&self) -> u16 {
        self.0.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_packs_status_and_first_data_byte() {
        assert_eq!(
            0x9C3C,
            DisplayCell::encode(&MidiEvent::from_message(&[0x9C, 0x3C, 0x40])),
            "Expected left but got right"
        );
        assert_eq!(
            0xF800,
            DisplayCell::encode(&MidiEvent::SystemRealtime { status: 0xF8 }),
            "Expected left but got right"
        );
    }

    #[test]
    fn latest_value_wins() {
        static CELL: DisplayCell = DisplayCell::new();
        assert_eq!(0, CELL.latest());
        CELL.publish(1);
        CELL.show(&MidiEvent::from_message(&[0xB0, 7, 100]));
        assert_eq!(0xB007, CELL.latest(), "Expected left but got right");
    }
}

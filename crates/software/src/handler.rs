//! Hooks which observe decoded events as they happen.
//!
//! A [`MidiHandler`] is invoked synchronously from within the call which supplied the byte completing a message.
//! Every method defaults to doing nothing, so implementors only override what they care about.

use crate::event::MidiEvent;
use wmidi::{Channel, Note, U7};

/// Receives decoded events: Note On and Note Off get methods of their own, everything else goes to
/// [`thru`][Self::thru].
pub trait MidiHandler {
    /// A key was struck (velocity is never 0).
    fn note_on(&mut self, _channel: Channel, _note: Note, _velocity: U7) {}

    /// A key was released, either by an explicit Note Off or a Note On with velocity 0.
    fn note_off(&mut self, _channel: Channel, _note: Note, _velocity: U7) {}

    /// Any event other than Note On or Note Off.
    fn thru(&mut self, _event: &MidiEvent) {}
}

/// A [`MidiHandler`] which ignores everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct Ignore;

impl MidiHandler for Ignore {}

impl<T: MidiHandler + ?Sized> MidiHandler for &mut T {
    fn note_on(&mut self, channel: Channel, note: Note, velocity: U7) {
        (**self).note_on(channel, note, velocity);
    }

    fn note_off(&mut self, channel: Channel, note: Note, velocity: U7) {
        (**self).note_off(channel, note, velocity);
    }

    fn thru(&mut self, event: &MidiEvent) {
        (**self).thru(event);
    }
}

/// Counts how many times each key is currently held, across all channels.
///
/// Suited to driving a note visualiser: a key stays lit until every Note On it received has been matched by a
/// Note Off. Counts never drop below zero, so stray Note Offs are harmless.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NoteActivity {
    counts: [u8; 128],
}

impl Default for NoteActivity {
    fn default() -> Self {
        Self::new()
    }
}

impl NoteActivity {
    /// Constructs a [`NoteActivity`] with nothing sounding.
    pub const fn new() -> Self {
        Self { counts: [0; 128] }
    }

    /// Returns `true` if the key has more Note Ons than Note Offs outstanding.
    pub fn is_sounding(&self, note: Note) -> bool {
        self.count(note) > 0
    }

    /// Number of outstanding Note Ons for a key.
    pub fn count(&self, note: Note) -> u8 {
        self.counts[usize::from(u8::from(note))]
    }

    /// Returns an [`Iterator`] over the sounding keys, lowest first.
    pub fn sounding(&self) -> impl Iterator<Item = Note> + '_ {
        self.counts
            .iter()
            .zip(0_u8..)
            .filter(|&(&count, _)| count > 0)
            .map(|(_, key)| Note::from(U7::from_u8_lossy(key)))
    }

    /// Forgets every held key.
    pub fn clear(&mut self) {
        self.counts = [0; 128];
    }
}

impl MidiHandler for NoteActivity {
    fn note_on(&mut self, _channel: Channel, note: Note, _velocity: U7) {
        let count = &mut self.counts[usize::from(u8::from(note))];
        *count = count.saturating_add(1);
    }

    fn note_off(&mut self, _channel: Channel, note: Note, _velocity: U7) {
        let count = &mut self.counts[usize::from(u8::from(note))];
        *count = count.saturating_sub(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VELOCITY: U7 = U7::from_u8_lossy(100);

    fn note(number: u8) -> Note {
        Note::from(U7::from_u8_lossy(number))
    }

    #[derive(Default)]
    struct Tally {
        on: usize,
        off: usize,
        thru: usize,
    }

    impl MidiHandler for Tally {
        fn note_on(&mut self, _: Channel, _: Note, _: U7) {
            self.on += 1;
        }

        fn note_off(&mut self, _: Channel, _: Note, _: U7) {
            self.off += 1;
        }

        fn thru(&mut self, _: &MidiEvent) {
            self.thru += 1;
        }
    }

    #[test]
    fn dispatch_picks_the_matching_method() {
        let mut tally = Tally::default();
        for bytes in [
            &[0x90, 60, 100][..],
            &[0x90, 60, 0][..],
            &[0x80, 60, 0][..],
            &[0xB0, 7, 100][..],
            &[0xF8][..],
        ] {
            MidiEvent::from_message(bytes).dispatch(&mut tally);
        }
        assert_eq!(1, tally.on);
        assert_eq!(2, tally.off);
        assert_eq!(2, tally.thru);
    }

    #[test]
    fn activity_counts_overlapping_notes() {
        let mut activity = NoteActivity::new();
        activity.note_on(Channel::Ch1, note(60), VELOCITY);
        activity.note_on(Channel::Ch2, note(60), VELOCITY);
        activity.note_off(Channel::Ch1, note(60), VELOCITY);
        assert!(activity.is_sounding(note(60)), "Should still be held once");

        activity.note_off(Channel::Ch2, note(60), VELOCITY);
        assert!(!activity.is_sounding(note(60)), "Should be released");
    }

    #[test]
    fn stray_note_off_does_not_underflow() {
        let mut activity = NoteActivity::new();
        activity.note_off(Channel::Ch1, note(0), VELOCITY);
        assert_eq!(0, activity.count(note(0)));
    }

    #[test]
    fn sounding_is_ordered_by_pitch() {
        let mut activity = NoteActivity::new();
        activity.note_on(Channel::Ch1, note(67), VELOCITY);
        activity.note_on(Channel::Ch1, note(0), VELOCITY);
        activity.note_on(Channel::Ch1, note(127), VELOCITY);
        let mut sounding = activity.sounding();
        assert_eq!(Some(note(0)), sounding.next());
        assert_eq!(Some(note(67)), sounding.next());
        assert_eq!(Some(note(127)), sounding.next());
        assert_eq!(None, sounding.next());
    }
}

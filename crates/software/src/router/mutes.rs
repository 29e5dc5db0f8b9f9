use crate::event::MidiEvent;
use wmidi::Channel;

/// One mute flag per MIDI channel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChannelMutes(u16);

impl ChannelMutes {
    /// Every channel audible.
    pub const fn new() -> Self {
        Self(0)
    }

    /// Returns `true` if events on `channel` are being dropped.
    pub fn is_muted(&self, channel: Channel) -> bool {
        self.0 & Self::bit(channel) != 0
    }

    /// Returns `true` if `event` should be dropped. Events without a channel are never muted.
    pub fn silences(&self, event: &MidiEvent) -> bool {
        event.channel().is_some_and(|channel| self.is_muted(channel))
    }

    /// Mutes `channel`.
    ///
    /// Returns the All Notes Off which must be sent downstream so notes already sounding on the channel don't hang,
    /// or `None` if the channel was already muted.
    pub fn mute(&mut self, channel: Channel) -> Option<MidiEvent> {
        if self.is_muted(channel) {
            return None;
        }
        self.0 |= Self::bit(channel);
        Some(MidiEvent::all_notes_off(channel))
    }

    /// Unmutes `channel`.
    pub fn unmute(&mut self, channel: Channel) {
        self.0 &= !Self::bit(channel);
    }

    /// Flips the mute flag of `channel`, returning the All Notes Off to send if it became muted.
    pub fn toggle(&mut self, channel: Channel) -> Option<MidiEvent> {
        if self.is_muted(channel) {
            self.unmute(channel);
            None
        } else {
            self.mute(channel)
        }
    }

    fn bit(channel: Channel) -> u16 {
        1 << channel.index()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wmidi::{Note, U7};

    #[test]
    fn muting_yields_all_notes_off() {
        let mut mutes = ChannelMutes::new();
        assert_eq!(
            Some(MidiEvent::all_notes_off(Channel::Ch10)),
            mutes.mute(Channel::Ch10),
            "Expected left but got right"
        );
        assert_eq!(None, mutes.mute(Channel::Ch10), "Already muted");
        assert!(mutes.is_muted(Channel::Ch10));
        assert!(!mutes.is_muted(Channel::Ch9));
    }

    #[test]
    fn toggle() {
        let mut mutes = ChannelMutes::new();
        assert!(mutes.toggle(Channel::Ch16).is_some());
        assert!(mutes.toggle(Channel::Ch16).is_none());
        assert_eq!(ChannelMutes::default(), mutes);
    }

    #[test]
    fn silences_only_muted_channels() {
        let mut mutes = ChannelMutes::new();
        mutes.mute(Channel::Ch1);
        let event = |channel| MidiEvent::NoteOn {
            channel,
            note: Note::C4,
            velocity: U7::from_u8_lossy(90),
        };
        assert!(mutes.silences(&event(Channel::Ch1)));
        assert!(!mutes.silences(&event(Channel::Ch2)));
        assert!(!mutes.silences(&MidiEvent::SystemRealtime { status: 0xF8 }));
    }
}

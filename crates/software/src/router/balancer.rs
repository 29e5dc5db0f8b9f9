//! Spreads the notes of one channel across several ports, so a chord played on one keyboard can drive several
//! monophonic or low-polyphony instruments.

use super::Match;
use crate::{Error, port::PortId};
use tinyvec::ArrayVec;
use wmidi::{Channel, Note};

/// How many source channels the balancer can spread.
pub const MAX_GROUPS: usize = 16;

/// How many destination ports a single channel can be spread over.
pub const PORTS_PER_GROUP: usize = 8;

/// The most notes a single destination port can be assigned at once.
pub const MAX_POLYPHONY: usize = 16;

/// A destination port and the notes it is currently playing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct VoicePort {
    port: PortId,
    slots: ArrayVec<[Option<Note>; MAX_POLYPHONY]>,
}

impl Default for VoicePort {
    fn default() -> Self {
        Self {
            port: PortId::default(),
            slots: ArrayVec::new(),
        }
    }
}

impl VoicePort {
    fn new(port: PortId, polyphony: usize) -> Self {
        let mut slots = ArrayVec::new();
        slots.extend(core::iter::repeat_n(None, polyphony));
        Self { port, slots }
    }

    fn claim(&mut self, note: Note) -> bool {
        match self.slots.iter_mut().find(|slot| slot.is_none()) {
            Some(slot) => {
                *slot = Some(note);
                true
            }
            None => false,
        }
    }

    fn release(&mut self, note: Note) -> bool {
        match self.slots.iter_mut().find(|slot| **slot == Some(note)) {
            Some(slot) => {
                *slot = None;
                true
            }
            None => false,
        }
    }

    fn clear(&mut self) {
        self.slots.iter_mut().for_each(|slot| *slot = None);
    }
}

/// The ports notes arriving on `channel` from `source` are spread over.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct ChannelGroup {
    source: Match<PortId>,
    channel: Channel,
    ports: ArrayVec<[VoicePort; PORTS_PER_GROUP]>,
}

impl Default for ChannelGroup {
    fn default() -> Self {
        Self {
            source: Match::Any,
            channel: Channel::Ch1,
            ports: ArrayVec::new(),
        }
    }
}

impl ChannelGroup {
    fn accepts(&self, source: PortId, channel: Channel) -> bool {
        self.channel == channel && self.source.accepts(Some(&source))
    }
}

/// Assigns each Note On to the first destination port with a free polyphony slot, and sends the matching Note Off
/// to whichever port took the note.
///
/// Notes are spread by the first group accepting both their channel and the port they arrived on. A Note On arriving
/// when every slot of that group is taken is dropped, as is a Note Off for a note no port is playing. Slots only free
/// up through a Note Off, [`all_notes_off`][Self::all_notes_off], or [`reset`][Self::reset]: a lost Note Off leaves
/// its slot taken.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct VoiceBalancer {
    groups: ArrayVec<[ChannelGroup; MAX_GROUPS]>,
}

impl VoiceBalancer {
    /// Constructs a balancer which spreads nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Spreads notes on `channel`, whichever port they arrive on, over `port` as well, allowing it up to `polyphony`
    /// simultaneous notes.
    ///
    /// Ports are tried in the order they were added.
    pub fn add_port(&mut self, channel: Channel, port: PortId, polyphony: usize) -> Result<(), Error> {
        self.add(Match::Any, channel, port, polyphony)
    }

    /// Like [`add_port`][Self::add_port], but only for notes arriving on `source`.
    ///
    /// Keeps a port's own notes from being balanced back out to it; notes from other ports fall through to the
    /// routing table.
    pub fn add_port_from(
        &mut self,
        source: PortId,
        channel: Channel,
        port: PortId,
        polyphony: usize,
    ) -> Result<(), Error> {
        self.add(Match::Exact(source), channel, port, polyphony)
    }

    fn add(&mut self, source: Match<PortId>, channel: Channel, port: PortId, polyphony: usize) -> Result<(), Error> {
        if polyphony == 0 || polyphony > MAX_POLYPHONY {
            return Err(Error::PolyphonyOutOfRange(polyphony));
        }

        let existing = self
            .groups
            .iter()
            .position(|group| group.channel == channel && group.source == source);
        let group = match existing {
            Some(index) => &mut self.groups[index],
            None => {
                if self.groups.len() == self.groups.capacity() {
                    warn!("Voice balancer has no room for channel {}", channel.number());
                    return Err(Error::TooManyGroups);
                }
                self.groups.push(ChannelGroup {
                    source,
                    channel,
                    ports: ArrayVec::new(),
                });
                let last = self.groups.len() - 1;
                &mut self.groups[last]
            }
        };

        if group.ports.try_push(VoicePort::new(port, polyphony)).is_some() {
            warn!("Channel {} is already spread over {} ports", channel.number(), PORTS_PER_GROUP);
            return Err(Error::TooManyPorts);
        }
        info!(
            "Channel {} now spread over port {} with {} voices",
            channel.number(),
            port.index(),
            polyphony
        );
        Ok(())
    }

    fn group_mut(&mut self, source: PortId, channel: Channel) -> Option<&mut ChannelGroup> {
        self.groups.iter_mut().find(|group| group.accepts(source, channel))
    }

    /// Returns `true` if notes on `channel` arriving on `source` are spread by the balancer.
    pub fn covers(&self, source: PortId, channel: Channel) -> bool {
        self.groups.iter().any(|group| group.accepts(source, channel))
    }

    /// Assigns `note`, received on `source`, to a free slot, returning the port which should play it.
    pub fn note_on(&mut self, source: PortId, channel: Channel, note: Note) -> Option<PortId> {
        let port = self
            .group_mut(source, channel)?
            .ports
            .iter_mut()
            .find_map(|voice| voice.claim(note).then_some(voice.port));
        if port.is_none() {
            trace!("No free voice for {} on channel {}", note.to_str(), channel.number());
        }
        port
    }

    /// Frees the slot playing `note`, returning the port which should receive the Note Off.
    pub fn note_off(&mut self, source: PortId, channel: Channel, note: Note) -> Option<PortId> {
        self.group_mut(source, channel)?
            .ports
            .iter_mut()
            .find_map(|voice| voice.release(note).then_some(voice.port))
    }

    /// Frees every slot of `channel`, whichever port its notes came from.
    pub fn all_notes_off(&mut self, channel: Channel) {
        self.groups
            .iter_mut()
            .filter(|group| group.channel == channel)
            .flat_map(|group| group.ports.iter_mut())
            .for_each(VoicePort::clear);
    }

    /// Frees every slot of every channel.
    pub fn reset(&mut self) {
        self.groups
            .iter_mut()
            .flat_map(|group| group.ports.iter_mut())
            .for_each(VoicePort::clear);
    }

    /// Number of notes `port` is currently assigned, across all channels.
    pub fn sounding(&self, port: PortId) -> usize {
        self.groups
            .iter()
            .flat_map(|group| group.ports.iter())
            .filter(|voice| voice.port == port)
            .map(|voice| voice.slots.iter().filter(|slot| slot.is_some()).count())
            .sum()
    }

    /// Number of notes which could still be started on `channel`.
    pub fn free_slots(&self, channel: Channel) -> usize {
        self.groups
            .iter()
            .filter(|group| group.channel == channel)
            .flat_map(|group| group.ports.iter())
            .map(|voice| voice.slots.iter().filter(|slot| slot.is_none()).count())
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCE: PortId = match PortId::new(9) {
        Ok(port) => port,
        Err(_) => panic!(),
    };

    fn port(index: u8) -> PortId {
        PortId::new(index).unwrap()
    }

    #[test]
    fn two_slot_port_drops_third_note_until_one_is_released() {
        let mut balancer = VoiceBalancer::new();
        balancer.add_port(Channel::Ch1, port(3), 2).unwrap();

        assert_eq!(Some(port(3)), balancer.note_on(SOURCE, Channel::Ch1, Note::A3));
        assert_eq!(Some(port(3)), balancer.note_on(SOURCE, Channel::Ch1, Note::B3));
        assert_eq!(None, balancer.note_on(SOURCE, Channel::Ch1, Note::C4), "Expected no free slot");

        assert_eq!(Some(port(3)), balancer.note_off(SOURCE, Channel::Ch1, Note::A3));
        assert_eq!(
            Some(port(3)),
            balancer.note_on(SOURCE, Channel::Ch1, Note::C4),
            "Expected the freed slot to be reused"
        );
    }

    #[test]
    fn notes_fill_ports_in_order() {
        let mut balancer = VoiceBalancer::new();
        balancer.add_port(Channel::Ch2, port(0), 1).unwrap();
        balancer.add_port(Channel::Ch2, port(1), 1).unwrap();
        balancer.add_port(Channel::Ch2, port(2), 1).unwrap();

        let assigned = [Note::C4, Note::E4, Note::G4].map(|note| balancer.note_on(SOURCE, Channel::Ch2, note));
        assert_eq!([Some(port(0)), Some(port(1)), Some(port(2))], assigned);

        assert_eq!(Some(port(1)), balancer.note_off(SOURCE, Channel::Ch2, Note::E4));
        assert_eq!(Some(port(1)), balancer.note_on(SOURCE, Channel::Ch2, Note::A4));
    }

    #[test]
    fn unknown_channel_and_note_are_dropped() {
        let mut balancer = VoiceBalancer::new();
        balancer.add_port(Channel::Ch1, port(0), 4).unwrap();
        assert_eq!(None, balancer.note_on(SOURCE, Channel::Ch2, Note::C4));
        assert_eq!(None, balancer.note_off(SOURCE, Channel::Ch1, Note::C4));
    }

    #[test]
    fn all_notes_off_only_clears_its_channel() {
        let mut balancer = VoiceBalancer::new();
        balancer.add_port(Channel::Ch1, port(0), 2).unwrap();
        balancer.add_port(Channel::Ch2, port(0), 2).unwrap();
        balancer.note_on(SOURCE, Channel::Ch1, Note::C4);
        balancer.note_on(SOURCE, Channel::Ch2, Note::C4);
        assert_eq!(2, balancer.sounding(port(0)));

        balancer.all_notes_off(Channel::Ch1);
        assert_eq!(2, balancer.free_slots(Channel::Ch1));
        assert_eq!(1, balancer.free_slots(Channel::Ch2));

        balancer.reset();
        assert_eq!(0, balancer.sounding(port(0)));
    }

    #[test]
    fn add_port_validates_capacity() {
        let mut balancer = VoiceBalancer::new();
        assert_eq!(
            Err(Error::PolyphonyOutOfRange(0)),
            balancer.add_port(Channel::Ch1, port(0), 0)
        );
        assert_eq!(
            Err(Error::PolyphonyOutOfRange(MAX_POLYPHONY + 1)),
            balancer.add_port(Channel::Ch1, port(0), MAX_POLYPHONY + 1)
        );

        for index in 0..PORTS_PER_GROUP as u8 {
            balancer.add_port(Channel::Ch1, port(index), 1).unwrap();
        }
        assert_eq!(Err(Error::TooManyPorts), balancer.add_port(Channel::Ch1, port(9), 1));
    }

    #[test]
    fn source_restricted_group_ignores_other_ports() {
        let mut balancer = VoiceBalancer::new();
        balancer.add_port_from(port(0), Channel::Ch1, port(1), 1).unwrap();
        balancer.add_port_from(port(0), Channel::Ch1, port(2), 1).unwrap();

        assert!(balancer.covers(port(0), Channel::Ch1));
        assert!(!balancer.covers(port(1), Channel::Ch1), "Notes from an output port should not be balanced");
        assert!(!balancer.covers(port(0), Channel::Ch2));

        assert_eq!(None, balancer.note_on(port(1), Channel::Ch1, Note::C4));
        assert_eq!(Some(port(1)), balancer.note_on(port(0), Channel::Ch1, Note::C4));
        assert_eq!(None, balancer.note_off(port(1), Channel::Ch1, Note::C4));
        assert_eq!(Some(port(1)), balancer.note_off(port(0), Channel::Ch1, Note::C4));
    }

    #[test]
    fn groups_are_kept_apart_by_source() {
        let mut balancer = VoiceBalancer::new();
        balancer.add_port_from(port(0), Channel::Ch1, port(2), 1).unwrap();
        balancer.add_port_from(port(1), Channel::Ch1, port(3), 1).unwrap();

        assert_eq!(Some(port(2)), balancer.note_on(port(0), Channel::Ch1, Note::C4));
        assert_eq!(Some(port(3)), balancer.note_on(port(1), Channel::Ch1, Note::C4));

        balancer.all_notes_off(Channel::Ch1);
        assert_eq!(2, balancer.free_slots(Channel::Ch1));
    }
}

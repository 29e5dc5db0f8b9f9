//! Decides where each decoded event goes.
//!
//! A [`Router`] layers three policies: [`ChannelMutes`] drop events outright, then either the static
//! [`RoutingTable`] or, for notes the balancer covers in [`RoutingMode::Balance`], the [`VoiceBalancer`] picks the
//! destinations.

mod balancer;
pub use balancer::*;
mod mutes;
pub use mutes::*;
mod table;
pub use table::*;

use crate::{
    configuration::{RoutingMode, Unrouted},
    event::{ALL_NOTES_OFF, MidiEvent, SYSTEM_RESET, WireBytes},
    port::{PortId, PortSet},
};
use wmidi::Channel;

/// Routing state shared by every input port.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Router {
    table: RoutingTable,
    balancer: VoiceBalancer,
    mutes: ChannelMutes,
    mode: RoutingMode,
    unrouted: Unrouted,
}

impl Router {
    /// Constructs a [`Router`] driven by `table`, with no channel spread by the balancer.
    pub fn new(table: RoutingTable) -> Self {
        Self {
            table,
            ..Self::default()
        }
    }

    /// Replaces the balancer used in [`RoutingMode::Balance`].
    pub fn with_balancer(self, balancer: VoiceBalancer) -> Self {
        Self { balancer, ..self }
    }

    /// Replaces the policy for events no rule matched.
    pub fn with_unrouted(self, unrouted: Unrouted) -> Self {
        Self { unrouted, ..self }
    }

    /// Computes the destinations of `event`, which arrived on `source`.
    ///
    /// In [`RoutingMode::Balance`], notes are handed to the balancer only if it has a group for their channel and
    /// source port; every other note goes through the table as in [`RoutingMode::Table`]. Takes `&mut self` because
    /// the balancer tracks which notes each port is playing. An empty set means the event is dropped.
    pub fn route(&mut self, event: &MidiEvent, source: PortId) -> PortSet {
        if self.mutes.silences(event) {
            trace!("Dropping {} from muted channel", event);
            return PortSet::new();
        }
        self.release_on_panic(event);

        let balanced = self.mode == RoutingMode::Balance
            && event
                .channel()
                .is_some_and(|channel| self.balancer.covers(source, channel));
        let destinations = match *event {
            MidiEvent::NoteOn { channel, note, .. } if balanced => {
                self.balancer.note_on(source, channel, note).into_iter().collect()
            }
            MidiEvent::NoteOff { channel, note, .. } if balanced => {
                self.balancer.note_off(source, channel, note).into_iter().collect()
            }
            _ => self.route_by_table(event, source),
        };
        debug!("{} from port {} routed to {}", event, source.index(), destinations);
        destinations
    }

    fn route_by_table(&self, event: &MidiEvent, source: PortId) -> PortSet {
        let destinations = self.table.route(event, source);
        match self.unrouted {
            Unrouted::Echo if destinations.is_empty() => PortSet::from_iter([source]),
            _ => destinations,
        }
    }

    /// All Notes Off and System Reset release the balancer's slots no matter which mode is active.
    fn release_on_panic(&mut self, event: &MidiEvent) {
        match *event {
            MidiEvent::ControlChange {
                channel,
                controller,
                ..
            } if controller == ALL_NOTES_OFF => self.balancer.all_notes_off(channel),
            MidiEvent::SystemRealtime {
                status: SYSTEM_RESET,
            } => self.balancer.reset(),
            _ => {}
        }
    }

    /// The bytes to transmit for `event`.
    pub fn serialize(&self, event: &MidiEvent) -> WireBytes {
        event.to_bytes()
    }

    /// Mutes or unmutes `channel`, returning the All Notes Off to transmit if it became muted.
    ///
    /// The channel's balancer slots are released too, since the notes they held are being silenced.
    pub fn toggle_mute(&mut self, channel: Channel) -> Option<MidiEvent> {
        let all_notes_off = self.mutes.toggle(channel)?;
        self.balancer.all_notes_off(channel);
        info!("Channel {} muted", channel.number());
        Some(all_notes_off)
    }

    /// The active routing mode.
    pub fn mode(&self) -> RoutingMode {
        self.mode
    }

    /// Switches routing mode. Notes the balancer assigned stay assigned, so their Note Offs still find a port if the
    /// balancer is switched back on.
    pub fn set_mode(&mut self, mode: RoutingMode) {
        if self.mode != mode {
            info!("Routing mode changed to {}", mode);
        }
        self.mode = mode;
    }

    /// The policy for events no rule matched.
    pub fn unrouted(&self) -> Unrouted {
        self.unrouted
    }

    /// Changes the policy for events no rule matched.
    pub fn set_unrouted(&mut self, unrouted: Unrouted) {
        self.unrouted = unrouted;
    }

    /// The static routing rules.
    pub fn table(&self) -> &RoutingTable {
        &self.table
    }

    /// The static routing rules, for editing.
    pub fn table_mut(&mut self) -> &mut RoutingTable {
        &mut self.table
    }

    /// The voice balancer.
    pub fn balancer(&self) -> &VoiceBalancer {
        &self.balancer
    }

    /// The voice balancer, for editing.
    pub fn balancer_mut(&mut self) -> &mut VoiceBalancer {
        &mut self.balancer
    }

    /// Which channels are muted.
    pub fn mutes(&self) -> &ChannelMutes {
        &self.mutes
    }
}

//! The cooperative polling loop tying decoders, router and ports together.

use crate::{
    configuration::RoutingMode,
    decoder::MidiDecoder,
    event::MidiEvent,
    handler::MidiHandler,
    port::{ByteSink, ByteSource, MAX_PORTS, PortId},
    router::Router,
};
use wmidi::Channel;

/// Decodes bytes from `INPUTS` input ports and forwards each event to the ports its [`Router`] picks.
///
/// Input port `n` is the `n`th source handed to [`poll`][Self::poll]; output port `n` is the `n`th sink. A
/// destination without a sink is skipped.
#[derive(Clone, Debug)]
pub struct Switchboard<const INPUTS: usize> {
    decoders: [MidiDecoder; INPUTS],
    router: Router,
}

impl<const INPUTS: usize> Switchboard<INPUTS> {
    /// Constructs a [`Switchboard`] with idle decoders.
    pub fn new(router: Router) -> Self {
        const { assert!(INPUTS <= MAX_PORTS, "more inputs than addressable ports") };
        Self {
            decoders: [MidiDecoder::new(); INPUTS],
            router,
        }
    }

    /// Handles one byte received on `source`.
    ///
    /// If the byte completes an event, `handler` sees it first, then it is serialized once and written to every
    /// destination sink. Returns the event regardless of whether it went anywhere.
    pub fn process(
        &mut self,
        source: PortId,
        byte: u8,
        sinks: &mut [&mut dyn ByteSink],
        handler: &mut impl MidiHandler,
    ) -> Option<MidiEvent> {
        let Some(decoder) = self.decoders.get_mut(usize::from(source)) else {
            trace!("Dropping byte from port {} which has no decoder", source.index());
            return None;
        };
        let event = decoder.receive(byte, handler)?;

        let destinations = self.router.route(&event, source);
        if destinations.is_empty() {
            return Some(event);
        }
        let bytes = self.router.serialize(&event);
        for port in destinations.iter() {
            match sinks.get_mut(usize::from(port)) {
                Some(sink) => sink.write(&bytes),
                None => trace!("No sink for port {}", port.index()),
            }
        }
        Some(event)
    }

    /// Makes one pass over `sources`, taking at most one byte from each.
    ///
    /// Never waits on a source; returns how many bytes were consumed, so 0 means every source was idle.
    pub fn poll(
        &mut self,
        sources: &mut [&mut dyn ByteSource],
        sinks: &mut [&mut dyn ByteSink],
        handler: &mut impl MidiHandler,
    ) -> usize {
        let mut consumed = 0;
        for (source, index) in sources.iter_mut().zip(0..INPUTS as u8) {
            let Some(byte) = source.poll_byte() else {
                continue;
            };
            consumed += 1;
            if let Ok(port) = PortId::new(index) {
                self.process(port, byte, sinks, handler);
            }
        }
        consumed
    }

    /// Mutes or unmutes `channel`; when muting, the resulting All Notes Off is written to every sink.
    pub fn toggle_mute(&mut self, channel: Channel, sinks: &mut [&mut dyn ByteSink]) {
        if let Some(all_notes_off) = self.router.toggle_mute(channel) {
            let bytes = self.router.serialize(&all_notes_off);
            sinks.iter_mut().for_each(|sink| sink.write(&bytes));
        }
    }

    /// Switches the router between table routing and voice balancing.
    pub fn set_mode(&mut self, mode: RoutingMode) {
        self.router.set_mode(mode);
    }

    /// The decoder for input port `port`.
    pub fn decoder(&self, port: PortId) -> Option<&MidiDecoder> {
        self.decoders.get(usize::from(port))
    }

    /// The router.
    pub fn router(&self) -> &Router {
        &self.router
    }

    /// The router, for reconfiguration.
    pub fn router_mut(&mut self) -> &mut Router {
        &mut self.router
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        handler::{Ignore, NoteActivity},
        router::{RoutingRule, RoutingTable, VoiceBalancer},
    };
    use std::collections::VecDeque;
    use wmidi::Note;

    fn port(index: u8) -> PortId {
        PortId::new(index).unwrap()
    }

    #[derive(Default)]
    struct Script(VecDeque<u8>);

    impl Script {
        fn new(bytes: &[u8]) -> Self {
            Self(bytes.iter().copied().collect())
        }
    }

    impl ByteSource for Script {
        fn has_byte(&mut self) -> bool {
            !self.0.is_empty()
        }

        fn read_byte(&mut self) -> u8 {
            self.0.pop_front().unwrap()
        }
    }

    #[derive(Default)]
    struct Recorder(Vec<Vec<u8>>);

    impl ByteSink for Recorder {
        fn write(&mut self, bytes: &[u8]) {
            self.0.push(bytes.to_vec());
        }
    }

    fn fan_out() -> Router {
        Router::new(
            RoutingTable::with_rules([
                RoutingRule::to(port(1)).from_port(port(0)),
                RoutingRule::to(port(2)).from_port(port(0)),
                RoutingRule::to(port(2)).from_port(port(0)),
            ])
            .unwrap(),
        )
    }

    #[test]
    fn fan_out_writes_each_destination_once() {
        let mut switchboard = Switchboard::<1>::new(fan_out());
        let mut source = Script::new(&[0x90, 60, 127]);
        let (mut out0, mut out1, mut out2) = (Recorder::default(), Recorder::default(), Recorder::default());
        let mut sinks: [&mut dyn ByteSink; 3] = [&mut out0, &mut out1, &mut out2];

        while switchboard.poll(&mut [&mut source], &mut sinks, &mut Ignore) > 0 {}

        assert!(out0.0.is_empty(), "Source port should not hear its own event");
        assert_eq!(vec![vec![0x90, 60, 127]], out1.0, "Expected left but got right");
        assert_eq!(vec![vec![0x90, 60, 127]], out2.0, "Expected left but got right");
    }

    #[test]
    fn poll_takes_one_byte_per_source() {
        let mut switchboard = Switchboard::<2>::new(Router::default());
        let mut busy = Script::new(&[0x90, 60, 127]);
        let mut idle = Script::default();
        let mut sources: [&mut dyn ByteSource; 2] = [&mut busy, &mut idle];

        assert_eq!(1, switchboard.poll(&mut sources, &mut [], &mut Ignore));
        assert_eq!(1, switchboard.poll(&mut sources, &mut [], &mut Ignore));
        assert_eq!(1, switchboard.poll(&mut sources, &mut [], &mut Ignore));
        assert_eq!(0, switchboard.poll(&mut sources, &mut [], &mut Ignore), "Expected every source to be idle");
    }

    #[test]
    fn each_port_keeps_its_own_running_status() {
        let table = RoutingTable::with_rules([RoutingRule::to(port(2))]).unwrap();
        let mut switchboard = Switchboard::<2>::new(Router::new(table));
        let mut a = Script::new(&[0x90, 60, 100, 62, 100]);
        let mut b = Script::new(&[0xC3, 5, 6]);
        let (mut out0, mut out1, mut out) = (Recorder::default(), Recorder::default(), Recorder::default());
        let mut sinks: [&mut dyn ByteSink; 3] = [&mut out0, &mut out1, &mut out];

        while switchboard.poll(&mut [&mut a, &mut b], &mut sinks, &mut Ignore) > 0 {}

        let mut written = out.0;
        written.sort();
        assert_eq!(
            vec![vec![0x90, 60, 100], vec![0x90, 62, 100], vec![0xC3, 5], vec![0xC3, 6]],
            written,
            "Expected left but got right"
        );
    }

    #[test]
    fn handler_sees_events_even_when_unrouted() {
        let mut switchboard = Switchboard::<1>::new(Router::default());
        let mut activity = NoteActivity::new();
        for byte in [0x90, 64, 1] {
            switchboard.process(port(0), byte, &mut [], &mut activity);
        }
        assert!(activity.is_sounding(Note::E4));
    }

    #[test]
    fn missing_sink_is_skipped() {
        let table = RoutingTable::with_rules([RoutingRule::to(port(7)), RoutingRule::to(port(0))]).unwrap();
        let mut switchboard = Switchboard::<1>::new(Router::new(table));
        let mut out = Recorder::default();
        assert!(switchboard.process(port(0), 0xFA, &mut [&mut out], &mut Ignore).is_some());
        assert_eq!(vec![vec![0xFA]], out.0, "Expected left but got right");
    }

    #[test]
    fn byte_from_unknown_port_is_dropped() {
        let mut switchboard = Switchboard::<1>::new(Router::default());
        assert_eq!(None, switchboard.process(port(1), 0xF8, &mut [], &mut Ignore));
        assert!(switchboard.decoder(port(1)).is_none());
    }

    #[test]
    fn toggle_mute_silences_every_sink() {
        let mut switchboard = Switchboard::<1>::new(Router::default());
        let (mut a, mut b) = (Recorder::default(), Recorder::default());
        switchboard.toggle_mute(Channel::Ch2, &mut [&mut a, &mut b]);
        assert_eq!(vec![vec![0xB1, 123, 0]], a.0, "Expected left but got right");
        assert_eq!(a.0, b.0);

        switchboard.toggle_mute(Channel::Ch2, &mut [&mut a]);
        assert_eq!(1, a.0.len(), "Unmuting should send nothing");
    }

    #[test]
    fn balance_mode_spreads_a_chord() {
        let mut balancer = VoiceBalancer::new();
        for index in 0..3 {
            balancer.add_port(Channel::Ch1, port(index), 1).unwrap();
        }
        let mut switchboard = Switchboard::<1>::new(Router::default().with_balancer(balancer));
        switchboard.set_mode(RoutingMode::Balance);

        let mut source = Script::new(&[0x90, 60, 90, 64, 90, 67, 90, 64, 0]);
        let (mut a, mut b, mut c) = (Recorder::default(), Recorder::default(), Recorder::default());
        let mut sinks: [&mut dyn ByteSink; 3] = [&mut a, &mut b, &mut c];
        while switchboard.poll(&mut [&mut source], &mut sinks, &mut Ignore) > 0 {}

        assert_eq!(vec![vec![0x90, 60, 90]], a.0, "Expected left but got right");
        assert_eq!(vec![vec![0x90, 64, 90], vec![0x80, 64, 0]], b.0, "Expected left but got right");
        assert_eq!(vec![vec![0x90, 67, 90]], c.0, "Expected left but got right");
    }
}

//! Static, rule-based routing.

use crate::{
    Error,
    event::{MidiEvent, StatusClass},
    port::{PortId, PortSet},
};
use tinyvec::ArrayVec;
use wmidi::Channel;

/// How many rules a [`RoutingTable`] holds.
pub const RULE_CAPACITY: usize = 32;

/// One field of a [`RoutingRule`]: either a wildcard or a specific value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Match<T> {
    /// Accepts any value, including none at all (e.g. the channel of a system event).
    Any,
    /// Accepts only this value.
    Exact(T),
}

impl<T> Default for Match<T> {
    fn default() -> Self {
        Self::Any
    }
}

impl<T: PartialEq> Match<T> {
    /// Returns `true` if `value` satisfies this field.
    pub fn accepts(&self, value: Option<&T>) -> bool {
        match (self, value) {
            (Self::Any, _) => true,
            (Self::Exact(expected), Some(actual)) => expected == actual,
            (Self::Exact(_), None) => false,
        }
    }
}

/// Sends matching events to `destination`.
///
/// A rule matches when each of its three fields is [`Match::Any`] or equals the corresponding property of the event.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RoutingRule {
    /// Channel the event must be on.
    pub channel: Match<Channel>,
    /// Kind of message the event must be.
    pub command: Match<StatusClass>,
    /// Port the event must have arrived on.
    pub source: Match<PortId>,
    /// Port the event is sent to.
    pub destination: PortId,
}

impl RoutingRule {
    /// A rule sending everything to `destination`; narrow it down with the other constructors.
    pub fn to(destination: PortId) -> Self {
        Self {
            destination,
            ..Self::default()
        }
    }

    /// Restricts the rule to events received on `source`.
    pub fn from_port(self, source: PortId) -> Self {
        Self {
            source: Match::Exact(source),
            ..self
        }
    }

    /// Restricts the rule to events on `channel`.
    pub fn on_channel(self, channel: Channel) -> Self {
        Self {
            channel: Match::Exact(channel),
            ..self
        }
    }

    /// Restricts the rule to one kind of message.
    pub fn for_command(self, command: StatusClass) -> Self {
        Self {
            command: Match::Exact(command),
            ..self
        }
    }

    /// Returns `true` if the rule applies to `event` received on `source`.
    pub fn matches(&self, event: &MidiEvent, source: PortId) -> bool {
        self.channel.accepts(event.channel().as_ref())
            && self.command.accepts(Some(&event.class()))
            && self.source.accepts(Some(&source))
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for RoutingRule {
    fn format(&self, fmt: defmt::Formatter) {
        let channel = match self.channel {
            Match::Any => None,
            Match::Exact(channel) => Some(channel.number()),
        };
        let command = match self.command {
            Match::Any => None,
            Match::Exact(command) => Some(command),
        };
        let source = match self.source {
            Match::Any => None,
            Match::Exact(source) => Some(source.index()),
        };
        defmt::write!(
            fmt,
            "RoutingRule {{ channel: {}, command: {}, source: {}, destination: {} }}",
            channel,
            command,
            source,
            self.destination.index()
        );
    }
}

/// An ordered list of [`RoutingRule`]s.
///
/// Every matching rule fires; routing is not first-match-wins. Destinations are collected into a [`PortSet`], so
/// several rules naming the same port still deliver an event to it only once.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RoutingTable {
    rules: ArrayVec<[RoutingRule; RULE_CAPACITY]>,
}

impl RoutingTable {
    /// Constructs an empty table, which routes nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Constructs a table from a list of rules.
    pub fn with_rules(rules: impl IntoIterator<Item = RoutingRule>) -> Result<Self, Error> {
        let mut table = Self::new();
        for rule in rules {
            table.push(rule)?;
        }
        Ok(table)
    }

    /// Sends consecutive channels, starting at `first_channel`, to consecutive `ports`: the first port receives
    /// `first_channel`, the next port the channel after it, and so on. Ports beyond channel 16 are left unused.
    pub fn channel_per_port(
        first_channel: Channel,
        ports: impl IntoIterator<Item = PortId>,
    ) -> Result<Self, Error> {
        let channels = (first_channel.index()..16).filter_map(|i| Channel::from_index(i).ok());
        Self::with_rules(
            channels
                .zip(ports)
                .map(|(channel, port)| RoutingRule::to(port).on_channel(channel)),
        )
    }

    /// Merges everything arriving on `sources` into `destination`.
    pub fn merge(
        sources: impl IntoIterator<Item = PortId>,
        destination: PortId,
    ) -> Result<Self, Error> {
        Self::with_rules(
            sources
                .into_iter()
                .map(|source| RoutingRule::to(destination).from_port(source)),
        )
    }

    /// Appends a rule.
    pub fn push(&mut self, rule: RoutingRule) -> Result<(), Error> {
        match self.rules.try_push(rule) {
            None => Ok(()),
            Some(_) => {
                warn!("Routing table is full; rule refused");
                Err(Error::TableFull)
            }
        }
    }

    /// Removes and returns the rule at `index`, if there is one.
    pub fn remove(&mut self, index: usize) -> Option<RoutingRule> {
        (index < self.rules.len()).then(|| self.rules.remove(index))
    }

    /// Removes every rule.
    pub fn clear(&mut self) {
        self.rules.clear();
    }

    /// The rules in evaluation order.
    pub fn rules(&self) -> &[RoutingRule] {
        self.rules.as_slice()
    }

    /// Collects the destination of every rule matching `event` received on `source`.
    pub fn route(&self, event: &MidiEvent, source: PortId) -> PortSet {
        self.rules
            .iter()
            .filter(|rule| rule.matches(event, source))
            .map(|rule| rule.destination)
            .collect()
    }
}

use num_derive::{FromPrimitive, ToPrimitive};

/// Determines what happens to events which match no routing rule.
#[derive(Debug, Default, Copy, Clone, ToPrimitive, FromPrimitive, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Unrouted {
    /// Unmatched events are discarded. Required whenever routing is used to mute, remap or balance traffic.
    #[default]
    Drop,
    /// Unmatched events are retransmitted on the output port numbered like the input they came from, the way a
    /// hardware MIDI Thru would.
    Echo,
}
impl super::CycleConfig for Unrouted {}

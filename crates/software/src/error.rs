use core::fmt;

/// Errors returned when configuring the switchboard would exceed one of its fixed capacities.
///
/// Decoding and routing themselves never fail; bytes and events which can't be handled are dropped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// A port index at or beyond [`MAX_PORTS`](crate::port::MAX_PORTS).
    PortOutOfRange(u8),
    /// The routing table has no room for another rule.
    TableFull,
    /// The voice balancer has no room for another channel group.
    TooManyGroups,
    /// A channel group of the voice balancer has no room for another port.
    TooManyPorts,
    /// A port was given zero polyphony slots, or more than the balancer can track.
    PolyphonyOutOfRange(usize),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PortOutOfRange(index) => write!(f, "port {index} is out of range"),
            Self::TableFull => f.write_str("routing table is full"),
            Self::TooManyGroups => f.write_str("voice balancer has no room for another channel"),
            Self::TooManyPorts => f.write_str("channel group has no room for another port"),
            Self::PolyphonyOutOfRange(slots) => {
                write!(f, "{slots} polyphony slots is not a supported port polyphony")
            }
        }
    }
}

impl core::error::Error for Error {}

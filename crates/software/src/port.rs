//! Identifiers for logical MIDI endpoints and the traits through which bytes enter and leave the switchboard.
//!
//! A port may be a hardware UART, a USB-MIDI cable, or anything else which can produce or consume a raw MIDI byte
//! stream. The switchboard never owns the hardware behind a port; it only looks ports up by [`PortId`].

use crate::Error;

/// The number of distinct ports the switchboard can address.
pub const MAX_PORTS: usize = 32;

/// Opaque small integer identifying a logical MIDI endpoint.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PortId(u8);

impl PortId {
    /// Constructs a [`PortId`], rejecting indices the switchboard can't address.
    pub const fn new(index: u8) -> Result<Self, Error> {
        if (index as usize) < MAX_PORTS {
            Ok(Self(index))
        } else {
            Err(Error::PortOutOfRange(index))
        }
    }

    /// Zero-based index of the port.
    pub const fn index(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for PortId {
    type Error = Error;

    fn try_from(index: u8) -> Result<Self, Self::Error> {
        Self::new(index)
    }
}

impl From<PortId> for usize {
    fn from(port: PortId) -> Self {
        port.0 as usize
    }
}

/// A set of destination ports.
///
/// Inserting a port which is already present has no effect, which is what guarantees at-most-once delivery per
/// destination when several routing rules target the same port. Iteration is in ascending port order.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PortSet(u32);

impl PortSet {
    /// The empty set.
    pub const fn new() -> Self {
        Self(0)
    }

    /// Adds a port; returns `false` if it was already present.
    pub fn insert(&mut self, port: PortId) -> bool {
        let bit = 1 << port.0;
        let added = self.0 & bit == 0;
        self.0 |= bit;
        added
    }

    /// Removes a port if present.
    pub fn remove(&mut self, port: PortId) {
        self.0 &= !(1 << port.0);
    }

    /// Returns `true` if the port is in the set.
    pub fn contains(&self, port: PortId) -> bool {
        self.0 & (1 << port.0) != 0
    }

    /// Returns `true` if no ports are in the set.
    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Number of ports in the set.
    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    /// Returns an [`Iterator`] over the ports in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = PortId> + use<> {
        let bits = self.0;
        (0..MAX_PORTS as u8)
            .filter(move |&i| bits & (1 << i) != 0)
            .map(PortId)
    }
}

impl FromIterator<PortId> for PortSet {
    fn from_iter<I: IntoIterator<Item = PortId>>(iter: I) -> Self {
        let mut set = Self::new();
        for port in iter {
            set.insert(port);
        }
        set
    }
}

/// Something which produces raw MIDI bytes, e.g. the receive half of a UART.
///
/// Implementations must never block: a port with nothing to offer answers `false` from [`has_byte`][Self::has_byte]
/// immediately, since every port shares a single cooperative polling loop.
pub trait ByteSource {
    /// Returns `true` if a byte can be read right now.
    fn has_byte(&mut self) -> bool;

    /// Reads one byte. Only meaningful after [`has_byte`][Self::has_byte] returned `true`.
    fn read_byte(&mut self) -> u8;

    /// Convenience combining [`has_byte`][Self::has_byte] and [`read_byte`][Self::read_byte].
    fn poll_byte(&mut self) -> Option<u8> {
        if self.has_byte() {
            Some(self.read_byte())
        } else {
            None
        }
    }
}

/// Something which consumes raw MIDI bytes, e.g. the transmit half of a UART.
pub trait ByteSink {
    /// Writes one complete MIDI message.
    fn write(&mut self, bytes: &[u8]);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn port(index: u8) -> PortId {
        PortId::new(index).unwrap()
    }

    #[test]
    fn port_id_rejects_out_of_range() {
        assert_eq!(Err(Error::PortOutOfRange(32)), PortId::new(32));
        assert_eq!(Ok(31), PortId::new(31).map(PortId::index));
    }

    #[test]
    fn insert_collapses_duplicates() {
        let mut set = PortSet::new();
        assert!(set.insert(port(1)), "First insert should add the port");
        assert!(!set.insert(port(1)), "Second insert should be a no-op");
        assert_eq!(1, set.len());
    }

    #[test]
    fn iter_is_ascending() {
        let set: PortSet = [port(31), port(2), port(0), port(2)].into_iter().collect();
        let mut iter = set.iter();
        assert_eq!(Some(port(0)), iter.next());
        assert_eq!(Some(port(2)), iter.next());
        assert_eq!(Some(port(31)), iter.next());
        assert_eq!(None, iter.next());
    }

    #[test]
    fn remove() {
        let mut set: PortSet = [port(3), port(4)].into_iter().collect();
        set.remove(port(3));
        assert!(!set.contains(port(3)));
        assert!(set.contains(port(4)));
        set.remove(port(4));
        assert!(set.is_empty());
    }

    struct Script<'a>(&'a [u8]);

    impl ByteSource for Script<'_> {
        fn has_byte(&mut self) -> bool {
            !self.0.is_empty()
        }

        fn read_byte(&mut self) -> u8 {
            let (&first, rest) = self.0.split_first().unwrap();
            self.0 = rest;
            first
        }
    }

    #[test]
    fn poll_byte_returns_none_when_drained() {
        let mut source = Script(&[0x90]);
        assert_eq!(Some(0x90), source.poll_byte());
        assert_eq!(None, source.poll_byte());
    }
}

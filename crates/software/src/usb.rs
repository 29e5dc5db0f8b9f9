//! USB-MIDI 1.0 event packets.
//!
//! Every packet is 4 bytes: a header holding the cable number in its upper nibble and the Code Index Number (CIN)
//! in its lower nibble, followed by up to three MIDI bytes padded with zeros. The CIN says how many of those bytes
//! are meaningful.

use crate::event::MidiEvent;

/// Size of a USB-MIDI event packet.
pub const PACKET_LEN: usize = 4;

/// Number of meaningful MIDI bytes in a packet with the given Code Index Number.
fn payload_len(cin: u8) -> usize {
    match cin & 0x0F {
        // reserved for future extensions
        0x0 | 0x1 => 0,
        0x5 | 0xF => 1,
        0x2 | 0x6 | 0xC | 0xD => 2,
        _ => 3,
    }
}

/// The cable (virtual port) a packet belongs to.
pub fn cable(packet: &[u8; PACKET_LEN]) -> u8 {
    packet[0] >> 4
}

/// The MIDI bytes carried by `packet`.
pub fn packet_payload(packet: &[u8; PACKET_LEN]) -> &[u8] {
    &packet[1..1 + payload_len(packet[0])]
}

/// Splits the contents of a USB read into the MIDI bytes of each packet.
///
/// A trailing partial packet is dropped.
pub fn packets(data: &[u8]) -> impl Iterator<Item = &[u8]> {
    let chunks = data.chunks_exact(PACKET_LEN);
    if !chunks.remainder().is_empty() {
        warn!("Dropping {} bytes of a partial USB-MIDI packet", chunks.remainder().len());
    }
    chunks
        .filter_map(|chunk| <&[u8; PACKET_LEN]>::try_from(chunk).ok())
        .map(packet_payload)
}

/// Wraps `event` in a packet for `cable`.
pub fn to_packet(cable: u8, event: &MidiEvent) -> [u8; PACKET_LEN] {
    let bytes = event.to_bytes();
    let cin = match (event, bytes.len()) {
        (MidiEvent::SystemCommon { .. } | MidiEvent::SystemRealtime { .. }, _) => 0xF,
        (MidiEvent::Unknown(_), 0) => 0x0,
        (MidiEvent::Unknown(_), 1) => 0xF,
        (MidiEvent::Unknown(_), 2) => 0x2,
        (MidiEvent::Unknown(_), _) => 0x3,
        _ => bytes[0] >> 4,
    };

    let mut packet = [((cable & 0x0F) << 4) | cin, 0, 0, 0];
    packet[1..1 + bytes.len()].copy_from_slice(&bytes);
    packet
}

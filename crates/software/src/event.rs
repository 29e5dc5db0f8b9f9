//! Decoded MIDI events and the wire codec which turns them back into bytes.
//!
//! Channels are carried as [`Channel`], so consumers always see channels 1-16 through [`Channel::number`] and the
//! only place the zero-based wire nibble appears is in this module's encoding and decoding.

use crate::handler::MidiHandler;
use tinyvec::{ArrayVec, array_vec};
use wmidi::{Channel, Note, U7};

/// Raw bytes of a single MIDI message as it appears on the wire.
pub type WireBytes = ArrayVec<[u8; 3]>;

/// Control Change number of the channel mode message "All Notes Off".
pub const ALL_NOTES_OFF: U7 = U7::from_u8_lossy(123);

/// Status byte of the System Realtime "Reset" message.
pub const SYSTEM_RESET: u8 = 0xFF;

/// Category of a MIDI message, as determined by its status byte.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StatusClass {
    /// 0x80-0x8F
    NoteOff,
    /// 0x90-0x9F
    NoteOn,
    /// 0xA0-0xAF
    PolyPressure,
    /// 0xB0-0xBF
    ControlChange,
    /// 0xC0-0xCF
    ProgramChange,
    /// 0xD0-0xDF
    ChannelPressure,
    /// 0xE0-0xEF
    PitchBend,
    /// 0xF0-0xF7
    SystemCommon,
    /// 0xF8-0xFF
    SystemRealtime,
    /// Anything which couldn't be classified, i.e. a data byte where a status byte was expected.
    Unknown,
}

impl StatusClass {
    /// Classifies a status byte.
    pub fn from_status(status: u8) -> Self {
        match status {
            0x80..=0x8F => Self::NoteOff,
            0x90..=0x9F => Self::NoteOn,
            0xA0..=0xAF => Self::PolyPressure,
            0xB0..=0xBF => Self::ControlChange,
            0xC0..=0xCF => Self::ProgramChange,
            0xD0..=0xDF => Self::ChannelPressure,
            0xE0..=0xEF => Self::PitchBend,
            0xF0..=0xF7 => Self::SystemCommon,
            0xF8..=0xFF => Self::SystemRealtime,
            _ => Self::Unknown,
        }
    }

    /// Number of data bytes which follow the status byte of a Voice Category message.
    ///
    /// System messages are passed through as single bytes and therefore report zero.
    pub fn data_len(self) -> usize {
        match self {
            Self::ProgramChange | Self::ChannelPressure => 1,
            Self::NoteOff
            | Self::NoteOn
            | Self::PolyPressure
            | Self::ControlChange
            | Self::PitchBend => 2,
            Self::SystemCommon | Self::SystemRealtime | Self::Unknown => 0,
        }
    }

    /// The upper nibble of the status byte for Voice Category messages.
    fn command(self) -> Option<u8> {
        match self {
            Self::NoteOff => Some(0x80),
            Self::NoteOn => Some(0x90),
            Self::PolyPressure => Some(0xA0),
            Self::ControlChange => Some(0xB0),
            Self::ProgramChange => Some(0xC0),
            Self::ChannelPressure => Some(0xD0),
            Self::PitchBend => Some(0xE0),
            Self::SystemCommon | Self::SystemRealtime | Self::Unknown => None,
        }
    }
}

/// A Voice Category status byte (0x80-0xEF), i.e. one which may serve as running status.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StatusByte(u8);

impl StatusByte {
    /// Returns `None` for anything outside the Voice Category.
    pub fn new(byte: u8) -> Option<Self> {
        match byte {
            0x80..=0xEF => Some(Self(byte)),
            _ => None,
        }
    }

    /// Command portion of the status byte.
    pub fn class(self) -> StatusClass {
        StatusClass::from_status(self.0)
    }

    /// Channel portion of the status byte.
    pub fn channel(self) -> Channel {
        channel_from_nibble(self.0)
    }

    /// Number of data bytes a message with this status carries.
    pub fn data_len(self) -> usize {
        self.class().data_len()
    }
}

impl From<StatusByte> for u8 {
    fn from(status: StatusByte) -> Self {
        status.0
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for StatusByte {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "StatusByte({=u8:#x})", self.0);
    }
}

fn channel_from_nibble(status: u8) -> Channel {
    match Channel::from_index(status & 0x0F) {
        Ok(channel) => channel,
        // a nibble is always a valid channel index
        Err(_) => Channel::Ch1,
    }
}

/// A fully decoded MIDI message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MidiEvent {
    /// A key was released. Also produced for Note On messages with zero velocity.
    NoteOff {
        /// Channel 1-16
        channel: Channel,
        /// Key
        note: Note,
        /// Release velocity, usually 0
        velocity: U7,
    },
    /// A key was struck.
    NoteOn {
        /// Channel 1-16
        channel: Channel,
        /// Key
        note: Note,
        /// Strike velocity, never 0
        velocity: U7,
    },
    /// Polyphonic key pressure (aftertouch for a single key).
    PolyPressure {
        /// Channel 1-16
        channel: Channel,
        /// Key
        note: Note,
        /// Pressure
        pressure: U7,
    },
    /// A controller moved.
    ControlChange {
        /// Channel 1-16
        channel: Channel,
        /// Controller number
        controller: U7,
        /// New controller value
        value: U7,
    },
    /// A program (patch) was selected.
    ProgramChange {
        /// Channel 1-16
        channel: Channel,
        /// Program number
        program: U7,
    },
    /// Channel-wide pressure (aftertouch).
    ChannelPressure {
        /// Channel 1-16
        channel: Channel,
        /// Pressure
        pressure: U7,
    },
    /// Pitch wheel position.
    PitchBend {
        /// Channel 1-16
        channel: Channel,
        /// 14-bit value where 8192 is centered
        value: u16,
    },
    /// A System Common status byte, passed through without its data.
    SystemCommon {
        /// 0xF0-0xF7
        status: u8,
    },
    /// A System Realtime status byte.
    SystemRealtime {
        /// 0xF8-0xFF
        status: u8,
    },
    /// Malformed or unsupported bytes, kept verbatim so they can still be forwarded.
    Unknown(WireBytes),
}

impl MidiEvent {
    /// Builds the event for a completed Voice Category message.
    ///
    /// `data` must hold exactly [`StatusByte::data_len`] bytes. A Note On with zero velocity is delivered as a
    /// Note Off, per MIDI convention.
    pub fn from_voice(status: StatusByte, data: &[u8]) -> Self {
        let channel = status.channel();
        let u7 = |i: usize| U7::from_u8_lossy(data.get(i).copied().unwrap_or_default());
        match (status.class(), data.len() == status.data_len()) {
            (_, false) => {
                let mut raw = array_vec!([u8; 3] => status.0);
                raw.extend(data.iter().copied().take(2));
                Self::Unknown(raw)
            }
            (StatusClass::NoteOn, true) if u8::from(u7(1)) == 0 => Self::NoteOff {
                channel,
                note: Note::from(u7(0)),
                velocity: u7(1),
            },
            (StatusClass::NoteOn, true) => Self::NoteOn {
                channel,
                note: Note::from(u7(0)),
                velocity: u7(1),
            },
            (StatusClass::NoteOff, true) => Self::NoteOff {
                channel,
                note: Note::from(u7(0)),
                velocity: u7(1),
            },
            (StatusClass::PolyPressure, true) => Self::PolyPressure {
                channel,
                note: Note::from(u7(0)),
                pressure: u7(1),
            },
            (StatusClass::ControlChange, true) => Self::ControlChange {
                channel,
                controller: u7(0),
                value: u7(1),
            },
            (StatusClass::ProgramChange, true) => Self::ProgramChange {
                channel,
                program: u7(0),
            },
            (StatusClass::ChannelPressure, true) => Self::ChannelPressure {
                channel,
                pressure: u7(0),
            },
            (StatusClass::PitchBend, true) => Self::PitchBend {
                channel,
                // LSB first on the wire
                value: u16::from(u8::from(u7(0))) | (u16::from(u8::from(u7(1))) << 7),
            },
            // unreachable for a `StatusByte`, which is always Voice Category
            (_, true) => Self::Unknown(array_vec!([u8; 3] => status.0)),
        }
    }

    /// Parses one complete message, e.g. the payload of a USB-MIDI event packet.
    ///
    /// Unlike the [`MidiDecoder`](crate::decoder::MidiDecoder) there is no running status here: the message must
    /// start with its status byte. Anything malformed becomes [`MidiEvent::Unknown`].
    pub fn from_message(bytes: &[u8]) -> Self {
        let Some((&first, data)) = bytes.split_first() else {
            return Self::Unknown(ArrayVec::new());
        };
        match StatusClass::from_status(first) {
            StatusClass::SystemCommon => Self::SystemCommon { status: first },
            StatusClass::SystemRealtime => Self::SystemRealtime { status: first },
            StatusClass::Unknown => Self::Unknown(bytes.iter().copied().take(3).collect()),
            _ => match StatusByte::new(first) {
                Some(status) if data.iter().all(|&b| b < 0x80) => Self::from_voice(status, data),
                _ => Self::Unknown(bytes.iter().copied().take(3).collect()),
            },
        }
    }

    /// The [`StatusClass`] the event belongs to, as used by routing rules.
    pub fn class(&self) -> StatusClass {
        match self {
            Self::NoteOff { .. } => StatusClass::NoteOff,
            Self::NoteOn { .. } => StatusClass::NoteOn,
            Self::PolyPressure { .. } => StatusClass::PolyPressure,
            Self::ControlChange { .. } => StatusClass::ControlChange,
            Self::ProgramChange { .. } => StatusClass::ProgramChange,
            Self::ChannelPressure { .. } => StatusClass::ChannelPressure,
            Self::PitchBend { .. } => StatusClass::PitchBend,
            Self::SystemCommon { .. } => StatusClass::SystemCommon,
            Self::SystemRealtime { .. } => StatusClass::SystemRealtime,
            Self::Unknown(_) => StatusClass::Unknown,
        }
    }

    /// The channel of a Voice Category event; `None` for system and unknown events.
    pub fn channel(&self) -> Option<Channel> {
        match *self {
            Self::NoteOff { channel, .. }
            | Self::NoteOn { channel, .. }
            | Self::PolyPressure { channel, .. }
            | Self::ControlChange { channel, .. }
            | Self::ProgramChange { channel, .. }
            | Self::ChannelPressure { channel, .. }
            | Self::PitchBend { channel, .. } => Some(channel),
            Self::SystemCommon { .. } | Self::SystemRealtime { .. } | Self::Unknown(_) => None,
        }
    }

    /// Returns `true` for Note On and Note Off events.
    pub fn is_note_event(&self) -> bool {
        matches!(self, Self::NoteOn { .. } | Self::NoteOff { .. })
    }

    /// Serializes the event back into wire bytes, re-applying the zero-based channel to the status nibble.
    ///
    /// Voice messages take three bytes, except Program Change and Channel Pressure which take two. System events
    /// are their single status byte; unknown events are reproduced verbatim.
    pub fn to_bytes(&self) -> WireBytes {
        let status = |channel: Channel| {
            self.class().command().unwrap_or_default() | channel.index()
        };
        match *self {
            Self::NoteOff {
                channel,
                note,
                velocity,
            }
            | Self::NoteOn {
                channel,
                note,
                velocity,
            } => array_vec!([u8; 3] => status(channel), u8::from(note), u8::from(velocity)),
            Self::PolyPressure {
                channel,
                note,
                pressure,
            } => array_vec!([u8; 3] => status(channel), u8::from(note), u8::from(pressure)),
            Self::ControlChange {
                channel,
                controller,
                value,
            } => array_vec!([u8; 3] => status(channel), u8::from(controller), u8::from(value)),
            Self::ProgramChange { channel, program } => {
                array_vec!([u8; 3] => status(channel), u8::from(program))
            }
            Self::ChannelPressure { channel, pressure } => {
                array_vec!([u8; 3] => status(channel), u8::from(pressure))
            }
            Self::PitchBend { channel, value } => array_vec!([u8; 3] =>
                status(channel),
                (value & 0x7F) as u8,
                ((value >> 7) & 0x7F) as u8
            ),
            Self::SystemCommon { status } | Self::SystemRealtime { status } => {
                array_vec!([u8; 3] => status)
            }
            Self::Unknown(raw) => raw,
        }
    }

    /// Calls the [`MidiHandler`] method matching this event.
    pub fn dispatch(&self, handler: &mut impl MidiHandler) {
        match *self {
            Self::NoteOn {
                channel,
                note,
                velocity,
            } => handler.note_on(channel, note, velocity),
            Self::NoteOff {
                channel,
                note,
                velocity,
            } => handler.note_off(channel, note, velocity),
            _ => handler.thru(self),
        }
    }

    /// Convenience constructor for the "All Notes Off" channel mode message.
    pub fn all_notes_off(channel: Channel) -> Self {
        Self::ControlChange {
            channel,
            controller: ALL_NOTES_OFF,
            value: U7::from_u8_lossy(0),
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for MidiEvent {
    fn format(&self, fmt: defmt::Formatter) {
        match *self {
            Self::NoteOff {
                channel,
                note,
                velocity,
            } => defmt::write!(
                fmt,
                "NoteOff {{ channel: {}, note: {} ({}), velocity: {} }}",
                channel.number(),
                note.to_str(),
                u8::from(note),
                u8::from(velocity)
            ),
            Self::NoteOn {
                channel,
                note,
                velocity,
            } => defmt::write!(
                fmt,
                "NoteOn {{ channel: {}, note: {} ({}), velocity: {} }}",
                channel.number(),
                note.to_str(),
                u8::from(note),
                u8::from(velocity)
            ),
            Self::PolyPressure {
                channel,
                note,
                pressure,
            } => defmt::write!(
                fmt,
                "PolyPressure {{ channel: {}, note: {}, pressure: {} }}",
                channel.number(),
                u8::from(note),
                u8::from(pressure)
            ),
            Self::ControlChange {
                channel,
                controller,
                value,
            } => defmt::write!(
                fmt,
                "ControlChange {{ channel: {}, controller: {}, value: {} }}",
                channel.number(),
                u8::from(controller),
                u8::from(value)
            ),
            Self::ProgramChange { channel, program } => defmt::write!(
                fmt,
                "ProgramChange {{ channel: {}, program: {} }}",
                channel.number(),
                u8::from(program)
            ),
            Self::ChannelPressure { channel, pressure } => defmt::write!(
                fmt,
                "ChannelPressure {{ channel: {}, pressure: {} }}",
                channel.number(),
                u8::from(pressure)
            ),
            Self::PitchBend { channel, value } => defmt::write!(
                fmt,
                "PitchBend {{ channel: {}, value: {} }}",
                channel.number(),
                value
            ),
            Self::SystemCommon { status } => {
                defmt::write!(fmt, "SystemCommon {{ status: {=u8:#x} }}", status)
            }
            Self::SystemRealtime { status } => {
                defmt::write!(fmt, "SystemRealtime {{ status: {=u8:#x} }}", status)
            }
            Self::Unknown(raw) => defmt::write!(fmt, "Unknown({=[u8]:#x})", raw.as_slice()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(byte: u8) -> StatusByte {
        StatusByte::new(byte).unwrap()
    }

    fn note(number: u8) -> Note {
        Note::from(U7::from_u8_lossy(number))
    }

    #[test]
    fn classify_status_bytes() {
        assert_eq!(StatusClass::NoteOff, StatusClass::from_status(0x8F));
        assert_eq!(StatusClass::NoteOn, StatusClass::from_status(0x90));
        assert_eq!(StatusClass::PitchBend, StatusClass::from_status(0xEF));
        assert_eq!(StatusClass::SystemCommon, StatusClass::from_status(0xF7));
        assert_eq!(StatusClass::SystemRealtime, StatusClass::from_status(0xF8));
        assert_eq!(StatusClass::Unknown, StatusClass::from_status(0x7F));
    }

    #[test]
    fn status_byte_rejects_system_and_data_bytes() {
        assert_eq!(None, StatusByte::new(0x7F));
        assert_eq!(None, StatusByte::new(0xF0));
        assert_eq!(Some(StatusByte(0xEF)), StatusByte::new(0xEF));
    }

    #[test]
    fn channel_is_one_based() {
        assert_eq!(1, status(0x90).channel().number());
        assert_eq!(16, status(0x9F).channel().number());
    }

    #[test]
    fn note_on_with_zero_velocity_is_note_off() {
        let expected = MidiEvent::NoteOff {
            channel: Channel::Ch3,
            note: note(64),
            velocity: U7::from_u8_lossy(0),
        };
        assert_eq!(
            expected,
            MidiEvent::from_voice(status(0x92), &[64, 0]),
            "Expected left but got right"
        );
    }

    #[test]
    fn pitch_bend_is_lsb_first() {
        let event = MidiEvent::from_voice(status(0xE0), &[0x01, 0x40]);
        assert_eq!(
            MidiEvent::PitchBend {
                channel: Channel::Ch1,
                value: 0x2001,
            },
            event,
            "Expected left but got right"
        );
        assert_eq!(&[0xE0, 0x01, 0x40], event.to_bytes().as_slice());
    }

    #[test]
    fn note_on_round_trips() {
        let bytes = [0x9A, 60, 127];
        let event = MidiEvent::from_message(&bytes);
        assert_eq!(Some(11), event.channel().map(Channel::number));
        assert_eq!(&bytes, event.to_bytes().as_slice());
    }

    #[test]
    fn two_byte_messages_serialize_to_two_bytes() {
        let program = MidiEvent::ProgramChange {
            channel: Channel::Ch16,
            program: U7::from_u8_lossy(0),
        };
        assert_eq!(&[0xCF, 0], program.to_bytes().as_slice());

        let pressure = MidiEvent::ChannelPressure {
            channel: Channel::Ch2,
            pressure: U7::from_u8_lossy(99),
        };
        assert_eq!(&[0xD1, 99], pressure.to_bytes().as_slice());
    }

    #[test]
    fn system_events_serialize_to_their_status_byte() {
        assert_eq!(
            &[0xF8],
            MidiEvent::SystemRealtime { status: 0xF8 }.to_bytes().as_slice()
        );
        assert_eq!(
            &[0xF6],
            MidiEvent::SystemCommon { status: 0xF6 }.to_bytes().as_slice()
        );
    }

    #[test]
    fn truncated_message_is_unknown() {
        let event = MidiEvent::from_message(&[0x90, 60]);
        assert_eq!(StatusClass::Unknown, event.class());
        assert_eq!(&[0x90, 60], event.to_bytes().as_slice());
    }

    #[test]
    fn message_without_status_is_unknown() {
        let event = MidiEvent::from_message(&[60, 100]);
        assert_eq!(MidiEvent::Unknown(array_vec!([u8; 3] => 60, 100)), event);
        assert_eq!(
            MidiEvent::Unknown(ArrayVec::new()),
            MidiEvent::from_message(&[])
        );
    }

    #[test]
    fn all_notes_off() {
        assert_eq!(
            &[0xB4, 123, 0],
            MidiEvent::all_notes_off(Channel::Ch5).to_bytes().as_slice()
        );
    }
}

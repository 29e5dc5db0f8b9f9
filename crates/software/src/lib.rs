//! This crate contains architecture-agnostic logic for the MIDI Switchboard, a device which joins several
//! [MIDI](https://midi.org/midi-1-0) inputs and outputs: it decodes each incoming byte stream (honoring running
//! status), then forwards every event to the outputs picked by a configurable router.
//!
//! Nothing here touches hardware. Bytes come in through [`port::ByteSource`] and leave through [`port::ByteSink`],
//! so the same logic drives UARTs and USB-MIDI cables on the device and plain buffers in tests.

#![deny(missing_docs)]
#![cfg_attr(not(test), no_std)]

#[macro_use]
mod fmt;

mod error;
pub use error::Error;

pub mod configuration;
pub mod decoder;
pub mod display;
pub mod event;
pub mod handler;
pub mod port;
pub mod router;
pub mod switchboard;
pub mod usb;

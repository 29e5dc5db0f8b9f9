//! Activity indicator driven by the most recent event.

use defmt::debug;
use embassy_stm32::gpio::Output;
use embassy_time::Timer;
use switchboard_lib::{display::DisplayCell, event::MidiEvent, handler::MidiHandler};
use wmidi::{Channel, Note, U7};

/// Written by the switchboard loop, read by [`display_activity`].
pub static LAST_EVENT: DisplayCell = DisplayCell::new();

/// Publishes every decoded event to [`LAST_EVENT`].
pub struct Monitor;

impl MidiHandler for Monitor {
    fn note_on(&mut self, channel: Channel, note: Note, velocity: U7) {
        LAST_EVENT.show(&MidiEvent::NoteOn {
            channel,
            note,
            velocity,
        });
    }

    fn note_off(&mut self, channel: Channel, note: Note, velocity: U7) {
        LAST_EVENT.show(&MidiEvent::NoteOff {
            channel,
            note,
            velocity,
        });
    }

    fn thru(&mut self, event: &MidiEvent) {
        // clock and active sensing would keep the LED lit permanently
        if !matches!(event, MidiEvent::SystemRealtime { .. }) {
            LAST_EVENT.show(event);
        }
    }
}

/// Blinks the LED whenever the last event changes.
///
/// Repeating the exact same event (status and first data byte) goes unnoticed, which is good enough for an activity
/// light.
#[embassy_executor::task]
pub async fn display_activity(mut led: Output<'static>) -> ! {
    const REFRESH_MS: u64 = 30;

    let mut shown = LAST_EVENT.latest();
    loop {
        Timer::after_millis(REFRESH_MS).await;
        let latest = LAST_EVENT.latest();
        if latest == shown {
            led.set_low();
            continue;
        }
        debug!("Last event: {=u16:#06x}", latest);
        shown = latest;
        led.set_high();
    }
}

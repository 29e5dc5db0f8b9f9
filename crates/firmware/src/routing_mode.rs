//! Tasks and types for selecting how notes are routed.

use defmt::info;
use embassy_stm32::{exti::ExtiInput, gpio::Output};
use embassy_sync::{
    blocking_mutex::raw::CriticalSectionRawMutex,
    watch::{Receiver, Sender, Watch},
};
use switchboard_lib::configuration::{CycleConfig, RoutingMode};

const ROUTING_MODE_RECEIVER_CNT: usize = 2;
/// Syncs the routing mode across tasks.
pub static ROUTING_MODE_SYNC: Watch<CriticalSectionRawMutex, RoutingMode, ROUTING_MODE_RECEIVER_CNT> =
    Watch::new_with(RoutingMode::Table);
pub type RoutingModeSender<'a> = Sender<'a, CriticalSectionRawMutex, RoutingMode, ROUTING_MODE_RECEIVER_CNT>;
pub type RoutingModeReceiver<'a> = Receiver<'a, CriticalSectionRawMutex, RoutingMode, ROUTING_MODE_RECEIVER_CNT>;

/// Handles button presses, cycling through the [`RoutingMode`]s.
#[embassy_executor::task]
pub async fn select_routing_mode(mut button: ExtiInput<'static>, routing_mode: RoutingModeSender<'static>) -> ! {
    loop {
        button.wait_for_rising_edge().await;

        let new_mode = routing_mode
            .try_get()
            .expect("Routing mode should never be uninitialized")
            .cycle();
        info!("Routing mode selected: {}", new_mode);
        routing_mode.send(new_mode);
    }
}

/// Lights the LED while notes are being balanced across outputs.
#[embassy_executor::task]
pub async fn display_routing_mode(mut led: Output<'static>, mut routing_mode: RoutingModeReceiver<'static>) -> ! {
    loop {
        match routing_mode.changed().await {
            RoutingMode::Table => led.set_low(),
            RoutingMode::Balance => led.set_high(),
        }
    }
}

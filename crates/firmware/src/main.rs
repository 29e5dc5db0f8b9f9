//! MIDI Switchboard is [Embassy](https://embassy.dev)-based firmware for a small MIDI router running on the
//! [Nucleo-F767ZI development board](https://www.st.com/en/evaluation-tools/nucleo-f767zi.html), which is powered by
//! an F7-series STM32 microcontroller.
//!
//! The board joins a USB-MIDI connection to two pairs of 5-pin DIN jacks. Every incoming byte stream is decoded
//! separately and each event is forwarded according to the active routing mode:
//! - [`Table`](switchboard_lib::configuration::RoutingMode::Table): whatever the host sends goes to both DIN
//!   outputs, and both DIN inputs are merged into the host;
//! - [`Balance`](switchboard_lib::configuration::RoutingMode::Balance): notes the host sends on channel 1 are spread
//!   over the two DIN outputs, one voice each, so a pair of monophonic synthesizers can be played as one duophonic
//!   instrument. Everything else is routed as in table mode.
//!
//! The user button cycles the routing mode (the blue LED is lit while balancing); a button wired to PD1 mutes or
//! unmutes channel 1. The red LED flickers with MIDI activity.

#![no_std]
#![no_main]

mod din;
mod monitor;
mod queue;
mod routing_mode;
mod usb_midi;

use crate::{
    monitor::Monitor,
    queue::{ByteQueue, QueueSink, QueueSource},
    routing_mode::{ROUTING_MODE_SYNC, RoutingModeReceiver},
    usb_midi::{MAX_PACKET_SIZE, PacketQueue, UsbSink},
};
use defmt::*;
use embassy_executor::Spawner;
use embassy_futures::yield_now;
use embassy_stm32::{
    Config, bind_interrupts,
    exti::ExtiInput,
    gpio::{Level, Output, Pull, Speed},
    peripherals,
    time::Hertz,
    usart::{self, Uart},
    usb,
};
use embassy_sync::{blocking_mutex::raw::CriticalSectionRawMutex, channel, signal::Signal};
use embassy_usb::{Builder, class::midi::MidiClass};
use static_cell::StaticCell;
use switchboard_lib::{
    port::{ByteSink, ByteSource, PortId},
    router::{Router, RoutingRule, RoutingTable, VoiceBalancer},
    switchboard::Switchboard,
};
use wmidi::Channel;

#[cfg(feature = "defmt-rtt")]
use defmt_rtt as _;
#[cfg(not(feature = "panic-probe"))]
use panic_halt as _;
#[cfg(feature = "panic-probe")]
use panic_probe as _;

bind_interrupts!(
    #[doc(hidden)]
    struct Irqs {
        OTG_FS => usb::InterruptHandler<peripherals::USB_OTG_FS>;
        USART2 => usart::InterruptHandler<peripherals::USART2>;
        USART6 => usart::InterruptHandler<peripherals::USART6>;
    }
);

const fn port(index: u8) -> PortId {
    match PortId::new(index) {
        Ok(port) => port,
        Err(_) => core::panic!("port index out of range"),
    }
}

/// The USB-MIDI cable to and from the host.
const USB_PORT: PortId = port(0);
/// DIN jacks wired to USART2.
const DIN_A_PORT: PortId = port(1);
/// DIN jacks wired to USART6.
const DIN_B_PORT: PortId = port(2);
/// Every port both receives and transmits.
const PORT_CNT: usize = 3;

static USB_IN: ByteQueue = channel::Channel::new();
static USB_OUT: PacketQueue = channel::Channel::new();
static DIN_A_IN: ByteQueue = channel::Channel::new();
static DIN_A_OUT: ByteQueue = channel::Channel::new();
static DIN_B_IN: ByteQueue = channel::Channel::new();
static DIN_B_OUT: ByteQueue = channel::Channel::new();

/// The channel whose mute flag should be flipped.
static MUTE_REQUEST: Signal<CriticalSectionRawMutex, Channel> = Signal::new();

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    info!("Initializing MIDI Switchboard");

    let mut config = Config::default();
    {
        use embassy_stm32::rcc::*;
        // hse: high-speed external clock
        config.rcc.hse = Some(Hse {
            freq: Hertz(8_000_000),
            mode: HseMode::Bypass,
        });

        // pll: phase-locked loop, crucial for dividing clock
        config.rcc.pll_src = PllSource::HSE;
        config.rcc.pll = Some(Pll {
            prediv: PllPreDiv::DIV4,
            mul: PllMul::MUL216,
            divp: Some(PllPDiv::DIV2), // 8mhz / 4 * 216 / 2 = 216Mhz
            // per section 5.2 of RM0410: the 48MHz clock used for USB OTG FS is derived from the main PLL VCO
            divq: Some(PllQDiv::DIV9), // 8mhz / 4 * 216 / 9 = 48Mhz
            divr: None,
        });
        config.rcc.ahb_pre = AHBPrescaler::DIV1;
        config.rcc.apb1_pre = APBPrescaler::DIV4;
        config.rcc.apb2_pre = APBPrescaler::DIV2;
        config.rcc.sys = Sysclk::PLL1_P;
        config.rcc.mux.clk48sel = mux::Clk48sel::PLL1_Q;
    }
    let p = embassy_stm32::init(config);

    let button = ExtiInput::new(p.PC13, p.EXTI13, Pull::None);
    let routing_mode_sender = ROUTING_MODE_SYNC.sender();
    unwrap!(spawner.spawn(routing_mode::select_routing_mode(button, routing_mode_sender)));

    let blue_led = Output::new(p.PB7, Level::Low, Speed::Low);
    let routing_mode_receiver = unwrap!(
        ROUTING_MODE_SYNC.receiver(),
        "Routing mode synchronizer should have a receiver available"
    );
    unwrap!(spawner.spawn(routing_mode::display_routing_mode(blue_led, routing_mode_receiver)));

    let mute_button = ExtiInput::new(p.PD1, p.EXTI1, Pull::Up);
    unwrap!(spawner.spawn(mute_input_task(mute_button)));

    let red_led = Output::new(p.PB14, Level::Low, Speed::Low);
    unwrap!(spawner.spawn(monitor::display_activity(red_led)));

    // per the F767 reference manual's DMA request mapping: USART2 uses DMA1 streams 5 (RX) and 6 (TX), USART6 uses
    // DMA2 streams 1 (RX) and 6 (TX)
    let din_a = unwrap!(Uart::new(
        p.USART2,
        p.PD6,
        p.PD5,
        Irqs,
        p.DMA1_CH6,
        p.DMA1_CH5,
        din::uart_config()
    ));
    let (din_a_tx, din_a_rx) = din_a.split();
    unwrap!(spawner.spawn(din::din_reader(din_a_rx, DIN_A_IN.sender(), "DIN A")));
    unwrap!(spawner.spawn(din::din_writer(din_a_tx, DIN_A_OUT.receiver(), "DIN A")));

    let din_b = unwrap!(Uart::new(
        p.USART6,
        p.PG9,
        p.PG14,
        Irqs,
        p.DMA2_CH6,
        p.DMA2_CH1,
        din::uart_config()
    ));
    let (din_b_tx, din_b_rx) = din_b.split();
    unwrap!(spawner.spawn(din::din_reader(din_b_rx, DIN_B_IN.sender(), "DIN B")));
    unwrap!(spawner.spawn(din::din_writer(din_b_tx, DIN_B_OUT.receiver(), "DIN B")));

    // Create the driver, from the HAL.
    static ENDPOINT_OUT_BUFFER: StaticCell<[u8; 256]> = StaticCell::new();
    let mut config = embassy_stm32::usb::Config::default();

    // USB devices which are self-powered (i.e., that can stay powered on if unplugged from the host)
    // need to enable vbus_detection to comply with the USB standard. Per section 6.10 of the Nucleo board
    // manual (UM1974), CN13 (the USB port) cannot power the board; external power is necessary.
    config.vbus_detection = true;

    let driver = usb::Driver::new_fs(
        p.USB_OTG_FS,
        Irqs,
        p.PA12,
        p.PA11,
        ENDPOINT_OUT_BUFFER.init([0; 256]),
        config,
    );

    // per https://pid.codes, FOSS projects can apply to be listed under the vendor ID owned by InterBiometrics
    let vendor_id = 0x1209;
    let product_id = 0x5ba0;

    let mut config = embassy_usb::Config::new(vendor_id, product_id);
    config.manufacturer = Some("Pawpaw Works");
    config.product = Some("MIDI Switchboard");
    config.self_powered = true;
    config.max_power = 0;

    // It needs some buffers for building the descriptors.
    static CONFIG_DESCRIPTOR: StaticCell<[u8; 256]> = StaticCell::new();
    static BOS_DESCRIPTOR: StaticCell<[u8; 256]> = StaticCell::new();
    static CONTROL_BUFFER: StaticCell<[u8; 64]> = StaticCell::new();

    let mut builder = Builder::new(
        driver,
        config,
        CONFIG_DESCRIPTOR.init([0; 256]),
        BOS_DESCRIPTOR.init([0; 256]),
        &mut [], // no msos descriptors
        CONTROL_BUFFER.init([0; 64]),
    );

    // one cable in each direction
    let class = MidiClass::new(&mut builder, 1, 1, MAX_PACKET_SIZE);
    let usb = builder.build();
    unwrap!(spawner.spawn(usb_midi::usb_task(usb)));

    let (usb_sender, usb_receiver) = class.split();
    unwrap!(spawner.spawn(usb_midi::usb_reader(usb_receiver, USB_IN.sender())));
    unwrap!(spawner.spawn(usb_midi::usb_writer(usb_sender, USB_OUT.receiver())));

    let routing_mode_receiver = unwrap!(
        ROUTING_MODE_SYNC.receiver(),
        "Routing mode synchronizer should have a receiver available"
    );
    unwrap!(spawner.spawn(switchboard_task(
        Switchboard::new(default_router()),
        routing_mode_receiver
    )));
}

/// Builds the routing described in the crate docs.
fn default_router() -> Router {
    let mut table = unwrap!(RoutingTable::merge([DIN_A_PORT, DIN_B_PORT], USB_PORT));
    unwrap!(table.push(RoutingRule::to(DIN_A_PORT).from_port(USB_PORT)));
    unwrap!(table.push(RoutingRule::to(DIN_B_PORT).from_port(USB_PORT)));

    let mut balancer = VoiceBalancer::new();
    unwrap!(balancer.add_port_from(USB_PORT, Channel::Ch1, DIN_A_PORT, 1));
    unwrap!(balancer.add_port_from(USB_PORT, Channel::Ch1, DIN_B_PORT, 1));

    Router::new(table).with_balancer(balancer)
}

/// Handles button presses, muting or unmuting channel 1.
#[embassy_executor::task]
async fn mute_input_task(mut button: ExtiInput<'static>) -> ! {
    loop {
        button.wait_for_falling_edge().await;
        MUTE_REQUEST.signal(Channel::Ch1);
    }
}

/// Task which shuttles bytes from every input queue through the [`Switchboard`] to the output queues.
///
/// Never waits on a single port: when a pass finds every input idle, it yields so the peripheral tasks can run.
#[embassy_executor::task]
async fn switchboard_task(
    mut switchboard: Switchboard<PORT_CNT>,
    mut routing_mode: RoutingModeReceiver<'static>,
) -> ! {
    let mut usb_in = QueueSource::new(USB_IN.receiver());
    let mut din_a_in = QueueSource::new(DIN_A_IN.receiver());
    let mut din_b_in = QueueSource::new(DIN_B_IN.receiver());
    let mut sources: [&mut dyn ByteSource; PORT_CNT] = [&mut usb_in, &mut din_a_in, &mut din_b_in];

    let mut usb_out = UsbSink::new(USB_OUT.sender());
    let mut din_a_out = QueueSink::new(DIN_A_OUT.sender(), "DIN A");
    let mut din_b_out = QueueSink::new(DIN_B_OUT.sender(), "DIN B");
    let mut sinks: [&mut dyn ByteSink; PORT_CNT] = [&mut usb_out, &mut din_a_out, &mut din_b_out];

    let mut monitor = Monitor;
    loop {
        if let Some(mode) = routing_mode.try_changed() {
            switchboard.set_mode(mode);
        }
        if let Some(channel) = MUTE_REQUEST.try_take() {
            switchboard.toggle_mute(channel, &mut sinks);
            info!(
                "Channel {} is {}",
                channel.number(),
                if switchboard.router().mutes().is_muted(channel) {
                    "muted"
                } else {
                    "audible"
                }
            );
        }

        if switchboard.poll(&mut sources, &mut sinks, &mut monitor) == 0 {
            yield_now().await;
        }
    }
}

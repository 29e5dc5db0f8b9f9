//! USB-MIDI device tasks.
//!
//! The device exposes a single cable. Incoming packets are unpacked into the USB input queue as a plain byte stream;
//! outgoing messages are packed one per packet.

use defmt::{info, panic, trace, warn};
use embassy_stm32::{peripherals, usb};
use embassy_sync::{
    blocking_mutex::raw::CriticalSectionRawMutex,
    channel::{Channel, Receiver, Sender},
};
use embassy_usb::{
    UsbDevice,
    class::midi,
    driver::EndpointError,
};
use switchboard_lib::{
    event::MidiEvent,
    port::ByteSink,
    usb::{PACKET_LEN, packets, to_packet},
};

use crate::queue::ByteQueueSender;

pub type UsbDriver = usb::Driver<'static, peripherals::USB_OTG_FS>;

/// Largest packet the full-speed bulk endpoints carry.
pub const MAX_PACKET_SIZE: u16 = 64;

const PACKET_QUEUE_LEN: usize = 16;
type Packet = [u8; PACKET_LEN];
pub type PacketQueue = Channel<CriticalSectionRawMutex, Packet, PACKET_QUEUE_LEN>;
type PacketSender = Sender<'static, CriticalSectionRawMutex, Packet, PACKET_QUEUE_LEN>;
type PacketReceiver = Receiver<'static, CriticalSectionRawMutex, Packet, PACKET_QUEUE_LEN>;

/// Cable number used for everything the device sends.
const CABLE: u8 = 0;

#[embassy_executor::task]
pub async fn usb_task(mut usb: UsbDevice<'static, UsbDriver>) -> ! {
    usb.run().await
}

/// Unpacks packets from the host into `queue`.
///
/// Runs apart from [`usb_writer`] so a host which stops reading never stalls input.
#[embassy_executor::task]
pub async fn usb_reader(mut receiver: midi::Receiver<'static, UsbDriver>, queue: ByteQueueSender) -> ! {
    loop {
        receiver.wait_connection().await;
        info!("USB connected");
        let _ = read_packets(&mut receiver, &queue).await;
        info!("USB disconnected");
    }
}

#[embassy_executor::task]
pub async fn usb_writer(mut sender: midi::Sender<'static, UsbDriver>, queue: PacketReceiver) -> ! {
    loop {
        sender.wait_connection().await;
        let _ = write_packets(&mut sender, &queue).await;
    }
}

#[doc(hidden)]
struct Disconnected {}

impl From<EndpointError> for Disconnected {
    fn from(val: EndpointError) -> Self {
        match val {
            EndpointError::BufferOverflow => panic!("Buffer overflow"),
            EndpointError::Disabled => Disconnected {},
        }
    }
}

async fn read_packets(
    receiver: &mut midi::Receiver<'static, UsbDriver>,
    queue: &ByteQueueSender,
) -> Result<(), Disconnected> {
    let mut buf = [0; MAX_PACKET_SIZE as usize];
    loop {
        let n = receiver.read_packet(&mut buf).await?;
        for &byte in packets(&buf[..n]).flatten() {
            if queue.try_send(byte).is_err() {
                trace!("USB input queue full; dropping {=u8:#04x}", byte);
            }
        }
    }
}

async fn write_packets(
    sender: &mut midi::Sender<'static, UsbDriver>,
    queue: &PacketReceiver,
) -> Result<(), Disconnected> {
    loop {
        let packet = queue.receive().await;
        sender.write_packet(&packet).await?;
    }
}

/// Output port for the host: re-parses each complete message so it can be packed.
pub struct UsbSink {
    queue: PacketSender,
}

impl UsbSink {
    pub fn new(queue: PacketSender) -> Self {
        Self { queue }
    }
}

impl ByteSink for UsbSink {
    fn write(&mut self, bytes: &[u8]) {
        let packet = to_packet(CABLE, &MidiEvent::from_message(bytes));
        if self.queue.try_send(packet).is_err() {
            warn!("USB output queue full; dropping packet");
        }
    }
}

//! Tasks moving bytes between the 5-pin DIN jacks and their queues.
//!
//! Each jack pair is wired to a USART running at the MIDI baud rate of 31,250.

use crate::queue::{ByteQueueReceiver, ByteQueueSender, QUEUE_LEN};
use defmt::{trace, warn};
use embassy_stm32::{
    mode::Async,
    usart::{self, UartRx, UartTx},
};

/// The MIDI 1.0 serial rate.
pub const BAUD_RATE: u32 = 31_250;

/// 8-N-1 at [`BAUD_RATE`].
pub fn uart_config() -> usart::Config {
    let mut config = usart::Config::default();
    config.baudrate = BAUD_RATE;
    config
}

/// Forwards every byte received on a MIDI IN jack to `queue`.
///
/// Line errors (a framing error when a cable is plugged in, say) lose the byte in flight; the decoder resynchronizes
/// at the next status byte.
#[embassy_executor::task(pool_size = 2)]
pub async fn din_reader(
    mut rx: UartRx<'static, Async>,
    queue: ByteQueueSender,
    name: &'static str,
) -> ! {
    let mut byte = [0; 1];
    loop {
        if let Err(e) = rx.read(&mut byte).await {
            warn!("{} read error: {}", name, e);
            continue;
        }
        if queue.try_send(byte[0]).is_err() {
            trace!("{} input queue full; dropping {=u8:#04x}", name, byte[0]);
        }
    }
}

/// Transmits bytes queued for a MIDI OUT jack, batching whatever has piled up.
#[embassy_executor::task(pool_size = 2)]
pub async fn din_writer(
    mut tx: UartTx<'static, Async>,
    queue: ByteQueueReceiver,
    name: &'static str,
) -> ! {
    let mut buf = [0; QUEUE_LEN];
    loop {
        buf[0] = queue.receive().await;
        let mut len = 1;
        while let Ok(byte) = queue.try_receive() {
            buf[len] = byte;
            len += 1;
            if len == buf.len() {
                break;
            }
        }
        if let Err(e) = tx.write(&buf[..len]).await {
            warn!("{} write error: {}", name, e);
        }
    }
}

//! Byte queues bridging the async peripheral tasks and the synchronous switchboard loop.
//!
//! Peripheral tasks await on their hardware and push bytes into a queue; the switchboard polls the other end without
//! ever waiting. Outbound bytes flow the same way in reverse.

use defmt::warn;
use embassy_sync::{
    blocking_mutex::raw::CriticalSectionRawMutex,
    channel::{Channel, Receiver, Sender},
};
use switchboard_lib::port::{ByteSink, ByteSource};

/// Bytes each queue can hold; at 31,250 baud this is about 20ms of traffic.
pub const QUEUE_LEN: usize = 64;

pub type ByteQueue = Channel<CriticalSectionRawMutex, u8, QUEUE_LEN>;
pub type ByteQueueSender = Sender<'static, CriticalSectionRawMutex, u8, QUEUE_LEN>;
pub type ByteQueueReceiver = Receiver<'static, CriticalSectionRawMutex, u8, QUEUE_LEN>;

/// The switchboard's view of an inbound queue.
pub struct QueueSource {
    queue: ByteQueueReceiver,
    peeked: Option<u8>,
}

impl QueueSource {
    pub fn new(queue: ByteQueueReceiver) -> Self {
        Self {
            queue,
            peeked: None,
        }
    }
}

impl ByteSource for QueueSource {
    fn has_byte(&mut self) -> bool {
        if self.peeked.is_none() {
            self.peeked = self.queue.try_receive().ok();
        }
        self.peeked.is_some()
    }

    fn read_byte(&mut self) -> u8 {
        self.peeked
            .take()
            .or_else(|| self.queue.try_receive().ok())
            .unwrap_or_default()
    }
}

/// The switchboard's view of an outbound queue.
///
/// Messages which don't fit are dropped whole, so a slow output never receives half a message.
pub struct QueueSink {
    queue: ByteQueueSender,
    name: &'static str,
}

impl QueueSink {
    pub fn new(queue: ByteQueueSender, name: &'static str) -> Self {
        Self { queue, name }
    }
}

impl ByteSink for QueueSink {
    fn write(&mut self, bytes: &[u8]) {
        if self.queue.free_capacity() < bytes.len() {
            warn!("{} output queue full; dropping {} bytes", self.name, bytes.len());
            return;
        }
        for &byte in bytes {
            // only this sink sends, so the capacity checked above can't shrink
            let _ = self.queue.try_send(byte);
        }
    }
}

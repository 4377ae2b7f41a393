//! Packet buffer exchange between the delivery path and the dispatch loop.
//!
//! The producer (a driver callback or reader thread) borrows a
//! [`PacketBuffer`] with [`DataChannel::get_buffer`], fills it and hands it
//! back with [`DataChannel::write_buffer`]. The consumer drains the pending
//! queue on the control thread and returns every buffer to the free list.
//! Buffers are allocated lazily and recycled until the channel is dropped.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;

use crate::ts_analyzer::TS_PACKET_SIZE;

/// Number of TS packets a buffer holds.
pub const PACKETS_PER_BUFFER: usize = 87;

/// Capacity of a buffer in bytes.
pub const BUFFER_SIZE: usize = PACKETS_PER_BUFFER * TS_PACKET_SIZE;

/// A reusable block of concatenated TS packets.
pub struct PacketBuffer {
    data: Box<[u8]>,
    size: usize,
}

impl PacketBuffer {
    fn new() -> Self {
        Self {
            data: vec![0u8; BUFFER_SIZE].into_boxed_slice(),
            size: 0,
        }
    }

    /// Whole buffer, for the producer to fill.
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Number of valid bytes.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Set the number of valid bytes.
    ///
    /// The value is clamped to the capacity and rounded down to whole packets.
    pub fn set_size(&mut self, size: usize) {
        let size = size.min(BUFFER_SIZE);
        self.size = size - size % TS_PACKET_SIZE;
    }

    /// Iterate over the valid packets.
    pub fn packets(&self) -> std::slice::ChunksExact<'_, u8> {
        self.data[..self.size].chunks_exact(TS_PACKET_SIZE)
    }
}

#[derive(Default)]
struct Queues {
    free: Vec<PacketBuffer>,
    pending: VecDeque<PacketBuffer>,
    /// The consumer holds a buffer taken from `pending`.
    draining: bool,
}

struct Inner {
    queues: Mutex<Queues>,
    wake: Notify,
}

/// Shared handle to the free and pending buffer lists.
///
/// Clones refer to the same lists; the device keeps one and the backend
/// producer another.
#[derive(Clone)]
pub struct DataChannel {
    inner: Arc<Inner>,
}

impl DataChannel {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                queues: Mutex::new(Queues::default()),
                wake: Notify::new(),
            }),
        }
    }

    fn queues(&self) -> MutexGuard<'_, Queues> {
        self.inner
            .queues
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Take a buffer from the free list, allocating when it is empty.
    pub fn get_buffer(&self) -> PacketBuffer {
        let recycled = self.queues().free.pop();
        match recycled {
            Some(mut buffer) => {
                buffer.size = 0;
                buffer
            }
            None => PacketBuffer::new(),
        }
    }

    /// Hand a buffer back.
    ///
    /// A non-empty buffer is queued for the consumer; the consumer is woken
    /// only when the queue goes from idle to non-idle. An empty buffer goes
    /// straight back to the free list.
    pub fn write_buffer(&self, buffer: PacketBuffer) {
        let mut queues = self.queues();

        if buffer.size == 0 {
            queues.free.push(buffer);
            return;
        }

        let wake_up = queues.pending.is_empty() && !queues.draining;
        queues.pending.push_back(buffer);
        drop(queues);

        if wake_up {
            self.inner.wake.notify_one();
        }
    }

    /// Wait until the producer has queued data.
    pub async fn notified(&self) {
        self.inner.wake.notified().await;
    }

    /// Whether buffers are waiting for the consumer.
    pub fn has_pending(&self) -> bool {
        !self.queues().pending.is_empty()
    }

    /// Process every pending buffer, including ones queued while draining.
    ///
    /// `process` is called once per packet; each buffer is recycled as soon
    /// as all its packets were handled. Returns the number of packets seen.
    pub fn drain<F>(&self, mut process: F) -> usize
    where
        F: FnMut(&[u8]),
    {
        let mut current: Option<PacketBuffer> = None;
        let mut count = 0;

        loop {
            {
                let mut queues = self.queues();
                if let Some(done) = current.take() {
                    queues.free.push(done);
                }
                current = queues.pending.pop_front();
                queues.draining = current.is_some();
            }

            let Some(buffer) = current.as_ref() else {
                break;
            };

            for packet in buffer.packets() {
                process(packet);
                count += 1;
            }
        }

        count
    }

    /// Drop all queued data; used when the device retunes.
    pub fn discard(&self) {
        let mut queues = self.queues();
        let Queues { free, pending, .. } = &mut *queues;
        free.extend(pending.drain(..));
    }

    /// Number of buffers allocated so far (free plus pending).
    pub fn allocated(&self) -> usize {
        let queues = self.queues();
        queues.free.len() + queues.pending.len()
    }
}

impl Default for DataChannel {
    fn default() -> Self {
        Self::new()
    }
}

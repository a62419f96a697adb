//! Ports: directional endpoints with slot pools and the exchange protocol.
//!
//! A [`Port`] owns a fixed pool of slots and a blocking queue. Slots cycle
//! between the queue (pipeline side) and the component: an input port pops
//! a slot, fills it, and hands it to the component for consumption; an
//! output port receives filled slots back, converts them into pipeline
//! buffers, and returns the slot for refilling.
//!
//! Buffer sharing (zero-copy) re-points a slot's backing at pipeline-owned
//! memory instead of copying. There are only two cases: in shared mode the
//! port controls the offset and the slot holds the owning reference to the
//! backing pipeline buffer; otherwise the slot owns its storage and the
//! component's offset is respected.

use crate::buffer::{Buffer, StreamItem};
use crate::component::{AllocationMode, CommandKind, PortDefinition, PortDirection, SessionState};
use crate::core::SessionShared;
use crate::error::{Error, Result};
use crate::queue::SlotQueue;
use crate::slot::{Slot, pts_from_ticks, ticks_from_pts};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Allocator hook for pipeline-side backing buffers.
///
/// Lets the element adapter substitute downstream-negotiated allocations
/// (pad allocation) for plain heap buffers.
pub type BufferAllocFn = Box<dyn Fn(usize) -> Buffer + Send>;

struct PortState {
    direction: Option<PortDirection>,
    slot_count: usize,
    buffer_size: usize,
    allocation: AllocationMode,
    /// Slots staged between allocation and `start_buffers`.
    pool: Vec<Slot>,
    buffer_alloc: Option<BufferAllocFn>,
}

/// One directional endpoint of the component.
///
/// Created once per component port index, lives for the session's
/// lifetime. The buffer pool is rebuilt on every enable and freed on
/// disable; the pool size is fixed while any slot is outstanding at the
/// component.
pub struct Port {
    session: Arc<SessionShared>,
    index: u32,
    queue: SlotQueue,
    enabled: AtomicBool,
    state: Mutex<PortState>,
}

impl Port {
    pub(crate) fn new(session: Arc<SessionShared>, index: u32) -> Self {
        Self {
            session,
            index,
            queue: SlotQueue::new(),
            enabled: AtomicBool::new(true),
            state: Mutex::new(PortState {
                direction: None,
                slot_count: 0,
                buffer_size: 0,
                allocation: AllocationMode::default(),
                pool: Vec::new(),
                buffer_alloc: None,
            }),
        }
    }

    pub(crate) fn queue_handle(&self) -> SlotQueue {
        self.queue.clone()
    }

    /// Port index on the component.
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Whether the port is enabled.
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Configured direction, if the port has been set up.
    pub fn direction(&self) -> Option<PortDirection> {
        self.state.lock().unwrap().direction
    }

    /// Choose the slot allocation policy. Takes effect at the next
    /// buffer-pool allocation.
    pub fn set_allocation_mode(&self, mode: AllocationMode) {
        self.state.lock().unwrap().allocation = mode;
    }

    /// Install the pipeline-side buffer allocator hook.
    pub fn set_buffer_allocator(&self, alloc: BufferAllocFn) {
        self.state.lock().unwrap().buffer_alloc = Some(alloc);
    }

    /// Read this port's current definition from the component.
    pub fn definition(&self) -> Result<PortDefinition> {
        self.session.component()?.port_definition(self.index)
    }

    /// Write a definition for this port to the component.
    pub fn set_definition(&self, def: &PortDefinition) -> Result<()> {
        self.session.component()?.set_port_definition(def)
    }

    /// Configure the port from a negotiated definition.
    ///
    /// Resets the staging pool; the pool itself is built by
    /// `allocate_buffers`.
    pub fn setup(&self, def: &PortDefinition) -> Result<()> {
        if def.index != self.index {
            return Err(Error::InvalidDefinition(format!(
                "definition for port {} applied to port {}",
                def.index, self.index
            )));
        }
        if def.slot_count == 0 || def.buffer_size == 0 {
            return Err(Error::InvalidDefinition(format!(
                "port {} needs nonzero slot count and buffer size",
                def.index
            )));
        }
        let mut state = self.state.lock().unwrap();
        state.direction = Some(def.direction);
        state.slot_count = def.slot_count;
        state.buffer_size = def.buffer_size;
        state.pool.clear();
        tracing::debug!(
            port = self.index,
            direction = ?def.direction,
            slot_count = def.slot_count,
            buffer_size = def.buffer_size,
            "port configured"
        );
        Ok(())
    }

    /// Build the slot pool and register every slot with the component.
    pub fn allocate_buffers(&self) -> Result<()> {
        let component = self.session.component()?;
        let mut state = self.state.lock().unwrap();
        if state.direction.is_none() {
            return Err(Error::ProtocolViolation("port not configured".into()));
        }
        let (count, size) = (state.slot_count, state.buffer_size);
        state.pool.clear();
        for id in 0..count {
            let slot = match state.allocation {
                AllocationMode::Component => {
                    let storage = component.allocate_slot(self.index, id, size)?;
                    Slot::new_owned(id, self.index, storage)
                }
                AllocationMode::Shared => {
                    let backing = match &state.buffer_alloc {
                        Some(alloc) => alloc(size),
                        None => Buffer::alloc(size),
                    };
                    component.register_slot(self.index, id, size)?;
                    Slot::new_attached(id, self.index, backing)
                }
                AllocationMode::Copied => {
                    component.register_slot(self.index, id, size)?;
                    Slot::new_owned(id, self.index, vec![0; size].into_boxed_slice())
                }
            };
            state.pool.push(slot);
        }
        tracing::debug!(port = self.index, count, size, "buffers allocated");
        Ok(())
    }

    /// Drop every locally held slot and release all registrations. The
    /// component drops the slots it still holds.
    pub fn free_buffers(&self) -> Result<()> {
        let component = self.session.component()?;
        let mut state = self.state.lock().unwrap();
        state.pool.clear();
        while self.queue.pop_forced().is_some() {}
        for id in 0..state.slot_count {
            component.release_slot(self.index, id)?;
        }
        tracing::debug!(port = self.index, "buffers freed");
        Ok(())
    }

    /// Seed the exchange in the right direction: input slots are queued
    /// for the pipeline to fill, output slots go straight to the component
    /// for filling.
    pub fn start_buffers(&self) -> Result<()> {
        let component = self.session.component()?;
        let mut state = self.state.lock().unwrap();
        let direction = state
            .direction
            .ok_or_else(|| Error::ProtocolViolation("port not configured".into()))?;
        for slot in state.pool.drain(..) {
            match direction {
                PortDirection::Input => self.queue.push(slot),
                PortDirection::Output => component.fill_buffer(slot)?,
            }
        }
        Ok(())
    }

    /// Enable the port: issue the command, build the pool, prime it when
    /// the session is already past `Loaded`, and block until the component
    /// confirms. The caller checks `is_enabled` first; this call does not
    /// deduplicate.
    pub fn enable(&self) -> Result<()> {
        let component = self.session.component()?;
        tracing::debug!(port = self.index, "enabling");
        component.send_command(CommandKind::PortEnable, self.index)?;
        self.enabled.store(true, Ordering::SeqCst);
        self.allocate_buffers()?;
        if self.session.state() != SessionState::Loaded {
            self.start_buffers()?;
        }
        self.resume();
        self.session
            .port_signal
            .wait()
            .map_err(|e| self.session.fault_or(e))
    }

    /// Disable the port: issue the command, stop the queue (waking any
    /// blocked receiver), flush outstanding slots, free the pool, and
    /// block until the component confirms.
    pub fn disable(&self) -> Result<()> {
        let component = self.session.component()?;
        tracing::debug!(port = self.index, "disabling");
        component.send_command(CommandKind::PortDisable, self.index)?;
        self.enabled.store(false, Ordering::SeqCst);
        self.pause();
        self.flush()?;
        self.free_buffers()?;
        self.session
            .port_signal
            .wait()
            .map_err(|e| self.session.fault_or(e))
    }

    /// Recover undelivered output slots, hand them back empty, then issue
    /// the flush command and block until confirmed.
    pub fn flush(&self) -> Result<()> {
        let component = self.session.component()?;
        if self.direction() == Some(PortDirection::Output) {
            // Received but not yet processed by the receive loop.
            while let Some(mut slot) = self.queue.pop_forced() {
                slot.clear();
                component.fill_buffer(slot)?;
            }
        }
        component.send_command(CommandKind::Flush, self.index)?;
        self.session
            .flush_signal
            .wait()
            .map_err(|e| self.session.fault_or(e))
    }

    /// Stop the queue without touching the component.
    pub fn pause(&self) {
        self.queue.disable();
    }

    /// Resume the queue.
    pub fn resume(&self) {
        self.queue.enable();
    }

    /// Mark the port finished at end of stream: clears the enabled flag
    /// and stops the queue. No component interaction.
    pub fn finish(&self) {
        self.enabled.store(false, Ordering::SeqCst);
        self.queue.disable();
    }

    /// Send a stream item to the component (input ports).
    ///
    /// Classifies the item, takes one slot from the queue without waiting,
    /// fills it according to the classification, and releases it to the
    /// component. Returns the number of bytes accepted.
    pub fn send(&self, item: StreamItem) -> Result<usize> {
        if self.direction() != Some(PortDirection::Input) {
            return Err(Error::ProtocolViolation("send on a non-input port".into()));
        }
        let component = self.session.component()?;
        let mut slot = self.queue.try_pop().ok_or(Error::NoBufferAvailable)?;

        // The single point where a stale shared-mode attachment is
        // released. Doing it before classification keeps an EOS reuse of
        // the slot from extending the previous buffer's life.
        drop(slot.take_attached());
        slot.clear();

        let (shared, buffer_size) = {
            let state = self.state.lock().unwrap();
            (state.allocation == AllocationMode::Shared, state.buffer_size)
        };

        match item {
            StreamItem::Buffer(buffer) if buffer.is_config() => {
                // Config data is always copied, never aliased, even in
                // shared mode.
                if shared {
                    let scratch = buffer_size.max(buffer.len());
                    slot.back_with(vec![0; scratch].into_boxed_slice());
                }
                slot.fill_from(buffer.as_bytes());
                slot.flags.config = true;
            }
            StreamItem::Buffer(buffer) => {
                if self.session.use_timestamps() {
                    slot.ticks = buffer.pts().map(ticks_from_pts);
                }
                if shared {
                    let len = buffer.len();
                    slot.attach(buffer);
                    slot.set_filled(len);
                } else {
                    slot.fill_from(buffer.as_bytes());
                }
            }
            StreamItem::Eos => {
                slot.flags.eos = true;
            }
        }

        let accepted = slot.filled();
        tracing::trace!(
            port = self.index,
            slot = slot.id(),
            accepted,
            eos = slot.flags.eos,
            config = slot.flags.config,
            "sending slot"
        );
        component.empty_buffer(slot)?;
        Ok(accepted)
    }

    /// Receive stream items from the component (output ports).
    ///
    /// Returns a lazy blocking iterator: each step waits for the next
    /// filled slot, converts it into a pipeline item, and returns the slot
    /// for refilling. The sequence ends when the port is disabled or after
    /// yielding end-of-stream.
    pub fn receive(&self) -> Result<Receiver<'_>> {
        if self.direction() != Some(PortDirection::Output) {
            return Err(Error::ProtocolViolation(
                "receive on a non-output port".into(),
            ));
        }
        Ok(Receiver {
            port: self,
            done: false,
        })
    }

    fn alloc_backing(&self, len: usize) -> Buffer {
        match &self.state.lock().unwrap().buffer_alloc {
            Some(alloc) => alloc(len),
            None => Buffer::alloc(len),
        }
    }

    fn receive_one(&self) -> Option<StreamItem> {
        let component = self.session.component().ok()?;
        let (shared, buffer_size) = {
            let state = self.state.lock().unwrap();
            (state.allocation == AllocationMode::Shared, state.buffer_size)
        };

        while self.is_enabled() {
            let mut slot = self.queue.pop()?;
            tracing::trace!(
                port = self.index,
                slot = slot.id(),
                filled = slot.filled(),
                eos = slot.flags.eos,
                "received slot"
            );

            let item = if slot.flags.eos {
                Some(StreamItem::Eos)
            } else if slot.filled() > 0 {
                let config = slot.flags.config;
                // Config data blocks zero-copy reuse: it is always copied
                // out, so the attachment is only taken for plain data.
                let reusable = if config { None } else { slot.take_attached() };
                let mut buffer = match reusable {
                    Some(mut buf) => {
                        buf.truncate(slot.filled());
                        buf
                    }
                    None => {
                        let mut buf = self.alloc_backing(slot.filled());
                        let n = slot.filled().min(buf.len());
                        buf.as_mut_bytes()[..n].copy_from_slice(&slot.payload()[..n]);
                        buf.truncate(n);
                        drop(slot.take_attached());
                        buf
                    }
                };
                if self.session.use_timestamps() {
                    if let Some(ticks) = slot.ticks {
                        buffer.set_pts(Some(pts_from_ticks(ticks)));
                    }
                }
                if config {
                    buffer.set_config(true);
                }
                Some(StreamItem::Buffer(buffer))
            } else {
                // Zero-length slot: absorb it and keep looping.
                drop(slot.take_attached());
                None
            };

            slot.clear();
            if shared {
                // Fresh pipeline-owned backing so the component writes
                // into pipeline memory on the next cycle.
                slot.attach(self.alloc_backing(buffer_size));
            }
            if let Err(err) = component.fill_buffer(slot) {
                tracing::warn!(
                    port = self.index,
                    error = %err,
                    "failed to return slot to component"
                );
                return None;
            }

            if item.is_some() {
                return item;
            }
        }
        None
    }
}

/// Lazy blocking iterator over an output port's stream items.
///
/// Ends (and stays ended) after yielding [`StreamItem::Eos`] or when the
/// port is disabled while waiting.
pub struct Receiver<'a> {
    port: &'a Port,
    done: bool,
}

impl Iterator for Receiver<'_> {
    type Item = StreamItem;

    fn next(&mut self) -> Option<StreamItem> {
        if self.done {
            return None;
        }
        let item = self.port.receive_one();
        if !matches!(item, Some(StreamItem::Buffer(_))) {
            self.done = true;
        }
        item
    }
}

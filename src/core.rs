//! Component session: lifecycle state machine and notification routing.
//!
//! A [`Core`] owns one loaded component, tracks its confirmed lifecycle
//! state, and turns the component's asynchronous notifications into
//! completed rendezvous signals and queued slots. One `Core` serves one
//! element instance; ports are its children and share its lifetime.

use crate::component::{
    ALL_PORTS, CommandKind, Component, ComponentLoader, SessionEvents, SessionState,
};
use crate::error::{Error, Result};
use crate::port::Port;
use crate::queue::SlotQueue;
use crate::signal::Rendezvous;
use crate::slot::Slot;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

type SettingsCallback = Box<dyn Fn() + Send>;

struct Lifecycle {
    current: SessionState,
    /// Target of the committed-but-unconfirmed transition, at most one.
    pending: Option<SessionState>,
}

/// Session state shared between the pipeline thread, the ports, and the
/// component's notification thread.
pub(crate) struct SessionShared {
    component: RwLock<Option<Arc<dyn Component>>>,
    lifecycle: Mutex<Lifecycle>,
    fault: Mutex<Option<Error>>,
    pub(crate) state_signal: Rendezvous,
    pub(crate) port_signal: Rendezvous,
    pub(crate) flush_signal: Rendezvous,
    done_signal: Rendezvous,
    /// Queues to route returned slots into, by port index.
    queues: Mutex<HashMap<u32, SlotQueue>>,
    use_timestamps: AtomicBool,
    on_settings_changed: Mutex<Option<SettingsCallback>>,
}

impl SessionShared {
    fn new() -> Self {
        Self {
            component: RwLock::new(None),
            lifecycle: Mutex::new(Lifecycle {
                current: SessionState::Loaded,
                pending: None,
            }),
            fault: Mutex::new(None),
            state_signal: Rendezvous::new(),
            port_signal: Rendezvous::new(),
            flush_signal: Rendezvous::new(),
            done_signal: Rendezvous::new(),
            queues: Mutex::new(HashMap::new()),
            use_timestamps: AtomicBool::new(true),
            on_settings_changed: Mutex::new(None),
        }
    }

    /// The loaded component handle, or a protocol error before init.
    pub(crate) fn component(&self) -> Result<Arc<dyn Component>> {
        self.component
            .read()
            .unwrap()
            .clone()
            .ok_or_else(|| Error::ProtocolViolation("component not initialized".into()))
    }

    /// Last confirmed lifecycle state.
    pub(crate) fn state(&self) -> SessionState {
        self.lifecycle.lock().unwrap().current
    }

    /// Whether timestamps are propagated across the boundary.
    pub(crate) fn use_timestamps(&self) -> bool {
        self.use_timestamps.load(Ordering::Relaxed)
    }

    /// Map an aborted wait to the stored component fault, if any.
    pub(crate) fn fault_or(&self, err: Error) -> Error {
        self.fault.lock().unwrap().clone().unwrap_or(err)
    }

    fn register_queue(&self, port_index: u32, queue: SlotQueue) {
        self.queues.lock().unwrap().insert(port_index, queue);
    }

    /// Commit a state transition and issue the command. Fails if another
    /// transition is pending or the session has faulted.
    fn request_state(&self, target: SessionState) -> Result<()> {
        {
            let mut lifecycle = self.lifecycle.lock().unwrap();
            if let Some(fault) = self.fault.lock().unwrap().clone() {
                return Err(fault);
            }
            if let Some(pending) = lifecycle.pending {
                return Err(Error::ProtocolViolation(format!(
                    "state command while transition to {pending:?} is pending"
                )));
            }
            lifecycle.pending = Some(target);
        }
        tracing::debug!(?target, "requesting state transition");

        // The lifecycle lock is released before calling out: the component
        // may confirm from any thread, including this one.
        if let Err(err) = self
            .component()
            .and_then(|c| c.send_command(CommandKind::SetState(target), ALL_PORTS))
        {
            self.lifecycle.lock().unwrap().pending = None;
            return Err(err);
        }
        Ok(())
    }

    /// Block until the pending transition is confirmed.
    fn wait_for_state(&self) -> Result<SessionState> {
        self.state_signal
            .wait()
            .map_err(|e| self.fault_or(e))
            .map(|_| self.state())
    }
}

impl SessionEvents for SessionShared {
    fn state_reached(&self, state: SessionState) {
        tracing::debug!(?state, "state reached");
        let mut lifecycle = self.lifecycle.lock().unwrap();
        lifecycle.current = state;
        lifecycle.pending = None;
        drop(lifecycle);
        self.state_signal.complete();
    }

    fn port_command_complete(&self, port_index: u32) {
        tracing::debug!(port_index, "port command complete");
        self.port_signal.complete();
    }

    fn flush_complete(&self, port_index: u32) {
        tracing::debug!(port_index, "flush complete");
        self.flush_signal.complete();
    }

    fn buffer_returned(&self, slot: Slot) {
        let queues = self.queues.lock().unwrap();
        match queues.get(&slot.port_index()) {
            Some(queue) => queue.push(slot),
            None => {
                tracing::warn!(
                    port_index = slot.port_index(),
                    "slot returned for unknown port, dropping"
                );
            }
        }
    }

    fn settings_changed(&self) {
        tracing::debug!("settings changed notification");
        if let Some(cb) = self.on_settings_changed.lock().unwrap().as_ref() {
            cb();
        }
    }

    fn component_error(&self, code: u32, message: &str) {
        tracing::error!(code, reason = message, "component fault");
        *self.fault.lock().unwrap() = Some(Error::Component {
            code,
            message: message.to_string(),
        });
        {
            let mut lifecycle = self.lifecycle.lock().unwrap();
            lifecycle.current = SessionState::Error;
            lifecycle.pending = None;
        }
        // No waiter may be left blocked once the session is dead.
        self.state_signal.abort();
        self.port_signal.abort();
        self.flush_signal.abort();
        self.done_signal.abort();
    }
}

/// One component session: command primitives, state tracking, ports.
///
/// The lifecycle follows the command/confirm protocol: every command
/// commits exactly one transition, returns once the component accepted it,
/// and the matching `*wait*` (built into each method here) blocks on the
/// confirmation signal. A component fault aborts all waiters.
pub struct Core {
    shared: Arc<SessionShared>,
    loader: Box<dyn ComponentLoader>,
    ports: Mutex<HashMap<u32, Arc<Port>>>,
    prepared: AtomicBool,
}

impl Core {
    /// Create a session that will load its component via `loader`.
    pub fn new(loader: impl ComponentLoader + 'static) -> Self {
        Self {
            shared: Arc::new(SessionShared::new()),
            loader: Box::new(loader),
            ports: Mutex::new(HashMap::new()),
            prepared: AtomicBool::new(false),
        }
    }

    /// Load the component and wire its notification path. Must be called
    /// before any command or port operation.
    pub fn init(&self) -> Result<()> {
        let mut slot = self.shared.component.write().unwrap();
        if slot.is_some() {
            return Err(Error::ProtocolViolation("component already loaded".into()));
        }
        let events: Arc<dyn SessionEvents> = Arc::clone(&self.shared) as _;
        *slot = Some(self.loader.load(events)?);
        tracing::debug!("component loaded");
        Ok(())
    }

    /// Drop the component handle. Legal only from `Loaded` or after a
    /// fault.
    pub fn deinit(&self) -> Result<()> {
        match self.shared.state() {
            SessionState::Loaded | SessionState::Error => {
                *self.shared.component.write().unwrap() = None;
                Ok(())
            }
            state => Err(Error::ProtocolViolation(format!(
                "deinit in state {state:?}"
            ))),
        }
    }

    /// Last confirmed lifecycle state.
    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    /// Enable or disable timestamp propagation across the boundary.
    /// Defaults to enabled.
    pub fn set_use_timestamps(&self, enabled: bool) {
        self.shared.use_timestamps.store(enabled, Ordering::Relaxed);
    }

    /// Register the settings-changed callback. Invoked from the
    /// component's notification thread with no payload; the adapter
    /// re-reads current parameters itself.
    pub fn on_settings_changed(&self, cb: impl Fn() + Send + 'static) {
        *self.shared.on_settings_changed.lock().unwrap() = Some(Box::new(cb));
    }

    /// Get the port at `index`, creating it on first use. Ports live for
    /// the session's lifetime.
    pub fn get_port(&self, index: u32) -> Arc<Port> {
        let mut ports = self.ports.lock().unwrap();
        Arc::clone(ports.entry(index).or_insert_with(|| {
            let port = Arc::new(Port::new(Arc::clone(&self.shared), index));
            self.shared.register_queue(index, port.queue_handle());
            port
        }))
    }

    /// Move to `Idle`, allocating buffer pools on every enabled port.
    ///
    /// Must be invoked exactly once per session activation, after port
    /// definitions are finalized: buffer counts and sizes are only final
    /// at this point.
    pub fn prepare(&self) -> Result<()> {
        match self.shared.state() {
            SessionState::Loaded => {}
            SessionState::Error => return Err(self.shared.fault_or(Error::Aborted)),
            state => {
                return Err(Error::ProtocolViolation(format!("prepare in state {state:?}")));
            }
        }
        if self.prepared.swap(true, Ordering::SeqCst) {
            return Err(Error::ProtocolViolation("session already prepared".into()));
        }
        self.shared.request_state(SessionState::Idle)?;
        // The component completes the transition only once every enabled
        // port has its buffers in place.
        self.for_each_enabled_port(|port| port.allocate_buffers())?;
        self.shared.wait_for_state().map(|_| ())
    }

    /// Move to `Executing` and prime every enabled port's slots.
    pub fn start(&self) -> Result<()> {
        self.shared.request_state(SessionState::Executing)?;
        let reached = self.shared.wait_for_state()?;
        if reached == SessionState::Executing {
            self.for_each_enabled_port(|port| port.start_buffers())?;
        }
        Ok(())
    }

    /// Move back to `Idle` from `Executing` or `Paused`.
    pub fn stop(&self) -> Result<()> {
        match self.shared.state() {
            SessionState::Executing | SessionState::Paused => {
                self.shared.request_state(SessionState::Idle)?;
                self.shared.wait_for_state().map(|_| ())
            }
            _ => Ok(()),
        }
    }

    /// Suspend processing, retaining resources.
    pub fn pause(&self) -> Result<()> {
        self.shared.request_state(SessionState::Paused)?;
        self.shared.wait_for_state().map(|_| ())
    }

    /// Move to `Loaded`, freeing every port's buffer pool.
    pub fn unload(&self) -> Result<()> {
        let was_idle = self.shared.state() == SessionState::Idle;
        if was_idle {
            self.shared.request_state(SessionState::Loaded)?;
        }
        // Freeing between command and confirmation: the component finishes
        // the transition once all registrations are released.
        self.for_each_enabled_port(|port| port.free_buffers())?;
        if was_idle {
            self.shared.wait_for_state()?;
        }
        self.prepared.store(false, Ordering::SeqCst);
        Ok(())
    }

    /// Mark end-of-stream processing as finished, waking `wait_for_done`.
    pub fn set_done(&self) {
        self.shared.done_signal.complete();
    }

    /// Block until `set_done` is called or the session faults.
    pub fn wait_for_done(&self) -> Result<()> {
        self.shared
            .done_signal
            .wait()
            .map_err(|e| self.shared.fault_or(e))
    }

    fn for_each_enabled_port(&self, f: impl Fn(&Port) -> Result<()>) -> Result<()> {
        let ports = self.ports.lock().unwrap();
        for port in ports.values() {
            if port.is_enabled() {
                f(port)?;
            }
        }
        Ok(())
    }
}

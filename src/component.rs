//! The external component interface.
//!
//! The codec component is modeled only as a capability: it accepts
//! commands, answers parameter queries, registers buffer storage, and
//! exchanges slots. Concrete implementations (hardware codecs behind FFI,
//! software fallbacks, test doubles) implement [`Component`]; the bridge
//! never sees past this seam.
//!
//! All commands are asynchronous. A call returns as soon as the component
//! has accepted it; completion arrives later on the component's own
//! notification thread through the [`SessionEvents`] callbacks.

use crate::error::Result;
use crate::slot::Slot;
use std::sync::Arc;

/// Port index wildcard addressing every port of a component.
pub const ALL_PORTS: u32 = u32::MAX;

/// Lifecycle states a component session moves through.
///
/// `Loaded → Idle → Executing`, with `Paused` reachable from `Executing`.
/// `Error` is terminal. The transitional "committed but unconfirmed"
/// phases are tracked as the session's pending transition, not as extra
/// states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Component is loaded but holds no resources.
    Loaded,
    /// Resources allocated, not processing.
    Idle,
    /// Actively exchanging buffers.
    Executing,
    /// Processing suspended, resources retained.
    Paused,
    /// Terminal fault state.
    Error,
}

/// Commands accepted by a component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    /// Request a lifecycle state transition.
    SetState(SessionState),
    /// Enable the addressed port.
    PortEnable,
    /// Disable the addressed port.
    PortDisable,
    /// Flush in-flight buffers on the addressed port.
    Flush,
}

/// Direction of a port, from the component's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortDirection {
    /// The component consumes buffers on this port.
    Input,
    /// The component produces buffers on this port.
    Output,
}

/// How a port's slot storage is allocated and moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AllocationMode {
    /// The component allocates backing storage itself.
    Component,
    /// Pipeline-allocated, aliased into slots without copying.
    Shared,
    /// Pipeline side allocates raw storage; payloads are copied in and out.
    #[default]
    Copied,
}

/// Negotiated definition of one component port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortDefinition {
    /// Port index on the component.
    pub index: u32,
    /// Port direction.
    pub direction: PortDirection,
    /// Number of exchange slots the port operates with.
    pub slot_count: usize,
    /// Backing storage size of each slot, in bytes.
    pub buffer_size: usize,
}

/// The command/exchange surface of an external codec component.
///
/// Slots cross this boundary by value: `empty_buffer` and `fill_buffer`
/// move the slot into the component, and the component moves it back via
/// [`SessionEvents::buffer_returned`] once processed. Whoever holds the
/// slot owns its storage — there is never a moment both sides can write.
pub trait Component: Send + Sync {
    /// Issue an asynchronous command. `port_index` addresses port commands;
    /// state commands use [`ALL_PORTS`].
    fn send_command(&self, cmd: CommandKind, port_index: u32) -> Result<()>;

    /// Read the current definition of a port.
    fn port_definition(&self, port_index: u32) -> Result<PortDefinition>;

    /// Apply a port definition (buffer counts and sizes become final at
    /// prepare time).
    fn set_port_definition(&self, def: &PortDefinition) -> Result<()>;

    /// Read a codec-specific parameter blob by numeric index.
    fn get_parameter(&self, index: u32) -> Result<Vec<u8>>;

    /// Write a codec-specific parameter blob by numeric index.
    fn set_parameter(&self, index: u32, data: &[u8]) -> Result<()>;

    /// Ask the component to allocate backing storage for one slot and
    /// return it. Used in [`AllocationMode::Component`].
    fn allocate_slot(&self, port_index: u32, id: usize, size: usize) -> Result<Box<[u8]>>;

    /// Register pipeline-provided storage for one slot. Used in the shared
    /// and copied modes.
    fn register_slot(&self, port_index: u32, id: usize, size: usize) -> Result<()>;

    /// Release one slot registration. The component drops the slot if it
    /// still holds it; legal while a port disable is in progress.
    fn release_slot(&self, port_index: u32, id: usize) -> Result<()>;

    /// Hand a filled slot to the component for consumption (input ports).
    fn empty_buffer(&self, slot: Slot) -> Result<()>;

    /// Hand an empty slot to the component for refilling (output ports).
    fn fill_buffer(&self, slot: Slot) -> Result<()>;
}

/// Notifications a component delivers back to its session.
///
/// Called from the component's notification thread. Implementations must
/// be cheap and non-blocking: they complete signals and push queues, they
/// do not process data.
pub trait SessionEvents: Send + Sync {
    /// A requested state transition completed.
    fn state_reached(&self, state: SessionState);

    /// A port enable or disable command completed.
    fn port_command_complete(&self, port_index: u32);

    /// A flush command completed.
    fn flush_complete(&self, port_index: u32);

    /// The component returned a slot after consuming or filling it.
    fn buffer_returned(&self, slot: Slot);

    /// Output stream parameters were finalized and must be renegotiated.
    /// Carries no payload; the adapter re-reads current parameters itself.
    fn settings_changed(&self);

    /// The component faulted. The session becomes unusable.
    fn component_error(&self, code: u32, message: &str);
}

/// Locates and instantiates a component, wiring its notification path.
///
/// Models handle acquisition against a component library: the loader knows
/// which component to produce, `load` hands it the session's event sink
/// and returns the live handle.
pub trait ComponentLoader: Send + Sync {
    /// Instantiate the component with `events` as its notification sink.
    fn load(&self, events: Arc<dyn SessionEvents>) -> Result<Arc<dyn Component>>;
}

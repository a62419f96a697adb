//! # ilbridge
//!
//! A buffer-exchange bridge between streaming pipelines and external,
//! state-machine-driven codec components.
//!
//! The bridge moves timed data buffers across the component boundary with
//! minimal copying while preserving strict ownership: no buffer is ever
//! writable by both sides at once. Slots are handed across by value, so
//! the type system enforces the single-writer rule that buffer-exchange
//! APIs usually leave to discipline.
//!
//! ## Features
//!
//! - **Zero-copy mode**: slot storage aliases pipeline-owned buffers,
//!   with ownership transferred explicitly on attach/detach
//! - **Blocking exchange queues**: per-port FIFOs with disable-as-wakeup
//!   so teardown never leaves a thread stuck
//! - **Command/confirm lifecycle**: asynchronous component commands with
//!   rendezvous confirmation and abort-on-fault
//! - **Pluggable components**: the codec is a trait; hardware wrappers
//!   and test doubles slot in behind the same seam
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use ilbridge::prelude::*;
//!
//! let core = Core::new(MyComponentLoader::default());
//! core.init()?;
//!
//! let input = core.get_port(0);
//! let output = core.get_port(1);
//! input.setup(&input.definition()?)?;
//! output.setup(&output.definition()?)?;
//!
//! core.prepare()?;
//! core.start()?;
//!
//! input.send(StreamItem::Buffer(Buffer::new(packet)))?;
//! for item in output.receive()? {
//!     // decoded data, ends at EOS or port disable
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod buffer;
pub mod component;
pub mod core;
pub mod error;
pub mod port;
pub mod queue;
pub mod signal;
pub mod slot;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::buffer::{Buffer, StreamItem};
    pub use crate::component::{
        AllocationMode, CommandKind, Component, ComponentLoader, PortDefinition, PortDirection,
        SessionEvents, SessionState,
    };
    pub use crate::core::Core;
    pub use crate::error::{Error, Result};
    pub use crate::port::Port;
    pub use crate::slot::Slot;
}

pub use error::{Error, Result};

//! Integration tests for the session state machine and failure paths.
//!
//! These tests verify that:
//! - the command/confirm protocol walks Loaded → Idle → Executing and back
//! - at most one state transition is pending per session
//! - a component fault wakes blocked waiters with a failure instead of
//!   leaving them stuck

use ilbridge::buffer::{Buffer, StreamItem};
use ilbridge::component::{
    AllocationMode, CommandKind, Component, ComponentLoader, PortDefinition, PortDirection,
    SessionEvents, SessionState,
};
use ilbridge::core::Core;
use ilbridge::error::{Error, Result};
use ilbridge::slot::Slot;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

/// A component double whose confirmations are driven manually: commands
/// are recorded and left pending until the test confirms or faults them,
/// standing in for the component's own notification thread.
#[derive(Default)]
struct ManualComponent {
    events: Mutex<Option<Arc<dyn SessionEvents>>>,
    held: Mutex<VecDeque<Slot>>,
    pending: Mutex<VecDeque<(CommandKind, u32)>>,
    auto_confirm: AtomicBool,
}

impl ManualComponent {
    fn manual() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn auto() -> Arc<Self> {
        let mock = Self::default();
        mock.auto_confirm.store(true, Ordering::SeqCst);
        Arc::new(mock)
    }

    fn events(&self) -> Arc<dyn SessionEvents> {
        self.events
            .lock()
            .unwrap()
            .as_ref()
            .expect("component not loaded")
            .clone()
    }

    fn confirm(&self, cmd: CommandKind, port_index: u32) {
        let events = self.events();
        match cmd {
            CommandKind::SetState(state) => events.state_reached(state),
            CommandKind::PortEnable | CommandKind::PortDisable => {
                events.port_command_complete(port_index)
            }
            CommandKind::Flush => events.flush_complete(port_index),
        }
    }

    /// Confirm the oldest pending command.
    fn confirm_next(&self) {
        let next = self.pending.lock().unwrap().pop_front();
        let (cmd, port_index) = next.expect("a pending command");
        self.confirm(cmd, port_index);
    }

    fn fault(&self, code: u32, message: &str) {
        self.events().component_error(code, message);
    }

    fn notify_settings_changed(&self) {
        self.events().settings_changed();
    }

    fn held_count(&self) -> usize {
        self.held.lock().unwrap().len()
    }
}

impl Component for ManualComponent {
    fn send_command(&self, cmd: CommandKind, port_index: u32) -> Result<()> {
        if self.auto_confirm.load(Ordering::SeqCst) {
            self.confirm(cmd, port_index);
        } else {
            self.pending.lock().unwrap().push_back((cmd, port_index));
        }
        Ok(())
    }

    fn port_definition(&self, port_index: u32) -> Result<PortDefinition> {
        Ok(PortDefinition {
            index: port_index,
            direction: PortDirection::Input,
            slot_count: 2,
            buffer_size: 4096,
        })
    }

    fn set_port_definition(&self, _def: &PortDefinition) -> Result<()> {
        Ok(())
    }

    fn get_parameter(&self, index: u32) -> Result<Vec<u8>> {
        Ok(index.to_le_bytes().to_vec())
    }

    fn set_parameter(&self, _index: u32, _data: &[u8]) -> Result<()> {
        Ok(())
    }

    fn allocate_slot(&self, _port: u32, _id: usize, size: usize) -> Result<Box<[u8]>> {
        Ok(vec![0; size].into_boxed_slice())
    }

    fn register_slot(&self, _port: u32, _id: usize, _size: usize) -> Result<()> {
        Ok(())
    }

    fn release_slot(&self, port_index: u32, id: usize) -> Result<()> {
        self.held
            .lock()
            .unwrap()
            .retain(|s| !(s.port_index() == port_index && s.id() == id));
        Ok(())
    }

    fn empty_buffer(&self, slot: Slot) -> Result<()> {
        self.held.lock().unwrap().push_back(slot);
        Ok(())
    }

    fn fill_buffer(&self, slot: Slot) -> Result<()> {
        self.held.lock().unwrap().push_back(slot);
        Ok(())
    }
}

struct ManualLoader(Arc<ManualComponent>);

impl ComponentLoader for ManualLoader {
    fn load(&self, events: Arc<dyn SessionEvents>) -> Result<Arc<dyn Component>> {
        *self.0.events.lock().unwrap() = Some(events);
        Ok(Arc::clone(&self.0) as Arc<dyn Component>)
    }
}

fn session(mock: &Arc<ManualComponent>) -> Core {
    let core = Core::new(ManualLoader(Arc::clone(mock)));
    core.init().unwrap();
    core
}

#[test]
fn test_full_lifecycle_walk() {
    let mock = ManualComponent::auto();
    let core = session(&mock);

    let port = core.get_port(0);
    port.setup(&port.definition().unwrap()).unwrap();
    port.set_allocation_mode(AllocationMode::Copied);

    assert_eq!(core.state(), SessionState::Loaded);
    core.prepare().unwrap();
    assert_eq!(core.state(), SessionState::Idle);
    core.start().unwrap();
    assert_eq!(core.state(), SessionState::Executing);

    // Slot pool is live: the input port accepts data.
    port.send(StreamItem::Buffer(Buffer::new(vec![1; 64]))).unwrap();
    assert_eq!(mock.held_count(), 1);

    core.stop().unwrap();
    assert_eq!(core.state(), SessionState::Idle);
    core.unload().unwrap();
    assert_eq!(core.state(), SessionState::Loaded);
    assert_eq!(mock.held_count(), 0);
    core.deinit().unwrap();
}

#[test]
fn test_pause_and_resume_states() {
    let mock = ManualComponent::auto();
    let core = session(&mock);
    core.prepare().unwrap();
    core.start().unwrap();

    core.pause().unwrap();
    assert_eq!(core.state(), SessionState::Paused);

    core.stop().unwrap();
    assert_eq!(core.state(), SessionState::Idle);
}

#[test]
fn test_prepare_twice_is_a_protocol_violation() {
    let mock = ManualComponent::auto();
    let core = session(&mock);
    core.prepare().unwrap();
    assert!(matches!(core.prepare(), Err(Error::ProtocolViolation(_))));
}

#[test]
fn test_unload_allows_a_new_prepare() {
    let mock = ManualComponent::auto();
    let core = session(&mock);
    core.prepare().unwrap();
    core.unload().unwrap();
    core.prepare().unwrap();
    assert_eq!(core.state(), SessionState::Idle);
}

#[test]
fn test_deferred_confirmation_unblocks_waiter() {
    let mock = ManualComponent::manual();
    let core = Arc::new(session(&mock));

    let preparing = Arc::clone(&core);
    let waiter = thread::spawn(move || preparing.prepare());

    // Let the command land, then play the notification thread.
    thread::sleep(Duration::from_millis(50));
    mock.confirm_next();

    assert!(waiter.join().unwrap().is_ok());
    assert_eq!(core.state(), SessionState::Idle);
}

#[test]
fn test_component_error_wakes_blocked_state_waiter() {
    // A fault during a pending transition must wake the waiter with a
    // failure result, not leave it blocked.
    let mock = ManualComponent::manual();
    let core = Arc::new(session(&mock));

    let preparing = Arc::clone(&core);
    let waiter = thread::spawn(move || preparing.prepare());

    thread::sleep(Duration::from_millis(50));
    let started = Instant::now();
    mock.fault(0x8000_1001, "decode engine lockup");

    let result = waiter.join().unwrap();
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(
        result,
        Err(Error::Component {
            code: 0x8000_1001,
            message: "decode engine lockup".into(),
        })
    );
    assert_eq!(core.state(), SessionState::Error);
}

#[test]
fn test_component_error_wakes_done_waiter() {
    let mock = ManualComponent::auto();
    let core = Arc::new(session(&mock));

    let waiting = Arc::clone(&core);
    let waiter = thread::spawn(move || waiting.wait_for_done());

    thread::sleep(Duration::from_millis(50));
    mock.fault(1, "fault");

    assert!(waiter.join().unwrap().is_err());
}

#[test]
fn test_commands_after_fault_surface_the_stored_error() {
    let mock = ManualComponent::auto();
    let core = session(&mock);
    mock.fault(7, "bad state");

    assert!(matches!(core.prepare(), Err(Error::Component { code: 7, .. })));
}

#[test]
fn test_settings_changed_callback_fires_without_payload() {
    let mock = ManualComponent::auto();
    let core = session(&mock);

    let seen = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&seen);
    core.on_settings_changed(move || flag.store(true, Ordering::SeqCst));

    mock.notify_settings_changed();
    assert!(seen.load(Ordering::SeqCst));

    // The adapter re-reads parameters itself; the component answers by
    // numeric index.
    let component_view = core.get_port(0).definition().unwrap();
    assert_eq!(component_view.buffer_size, 4096);
}

#[test]
fn test_set_done_reaches_waiter_across_threads() {
    let mock = ManualComponent::auto();
    let core = Arc::new(session(&mock));

    let waiting = Arc::clone(&core);
    let waiter = thread::spawn(move || waiting.wait_for_done());

    thread::sleep(Duration::from_millis(50));
    core.set_done();

    assert!(waiter.join().unwrap().is_ok());
}

use std::sync::{Condvar, Mutex};

use cartbridge_shm::SharedWindow;

use crate::frame::Frame;

/// Single-slot handoff between the bus capture context and the main loop.
///
/// The capture side offers frames without blocking and drops them when a
/// frame is already pending; the main loop blocks until one arrives. This is
/// the only point where the two contexts meet, and it guarantees at most one
/// in-flight command.
pub struct Mailbox {
    slot: Mutex<Option<Frame>>,
    ready: Condvar,
}

impl Default for Mailbox {
    fn default() -> Self {
        Self::new()
    }
}

impl Mailbox {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
            ready: Condvar::new(),
        }
    }

    /// Non-blocking deposit from the capture context. Returns whether the
    /// frame was accepted; a pending frame wins and the newcomer is dropped.
    pub fn offer(&self, frame: &Frame) -> bool {
        let Ok(mut slot) = self.slot.try_lock() else {
            log::warn!(
                "command {:#06x} dropped: mailbox busy",
                frame.command_id
            );
            return false;
        };
        match &*slot {
            Some(pending) => {
                log::warn!(
                    "command {:#06x} already in progress, ignoring {:#06x}",
                    pending.command_id,
                    frame.command_id
                );
                false
            }
            None => {
                *slot = Some(frame.clone());
                self.ready.notify_one();
                true
            }
        }
    }

    /// Blocking take from the main loop.
    pub fn take(&self) -> Frame {
        let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        loop {
            if let Some(frame) = slot.take() {
                return frame;
            }
            slot = self.ready.wait(slot).unwrap_or_else(|e| e.into_inner());
        }
    }

    /// Non-blocking take, for loop drivers that poll.
    pub fn try_take(&self) -> Option<Frame> {
        self.slot.lock().unwrap_or_else(|e| e.into_inner()).take()
    }
}

/// A registered command handler. Handlers receive every frame and must
/// return quickly, without side effects, when the application tag is not
/// theirs.
pub type Handler<C> = Box<dyn FnMut(&Frame, &mut SharedWindow, &mut C) + Send>;

/// Fans accepted frames out to handlers and rotates the completion token.
pub struct Dispatcher<C> {
    handlers: Vec<Handler<C>>,
    command_count: u32,
}

impl<C> Default for Dispatcher<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> Dispatcher<C> {
    pub fn new() -> Self {
        Self {
            handlers: Vec::new(),
            command_count: 0,
        }
    }

    /// Appends a handler. Called during subsystem initialization only;
    /// handlers run in registration order for every frame.
    pub fn register(&mut self, handler: Handler<C>) {
        self.handlers.push(handler);
    }

    /// Runs one frame through every handler, then publishes the completion
    /// value: the incremented command counter in the upper half, the echoed
    /// random token in the lower. Result slots are written by the handlers
    /// before this rotation, which is the fence the target synchronizes on.
    pub fn run_frame(&mut self, frame: &Frame, window: &mut SharedWindow, ctx: &mut C) {
        let token = frame.token();
        log::debug!(
            "command {:#06x}, size {}, token {:#010x}",
            frame.command_id,
            frame.payload_size,
            token
        );
        for handler in &mut self.handlers {
            handler(frame, window, ctx);
        }
        self.command_count = self.command_count.wrapping_add(1);
        window.write_token64(((self.command_count as u64) << 32) | token as u64);
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }
}

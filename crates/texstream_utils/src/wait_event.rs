use parking_lot::{Condvar, Mutex};

/// Auto-reset event, the wait primitive fences notify once they reach a requested value.
///
/// [`WaitEvent::set`] wakes one waiter (or lets the next [`WaitEvent::wait`] call pass
/// immediately, if nobody is waiting yet). Waking consumes the signal.
///
/// ## Example
/// ```
/// # use texstream_utils::WaitEvent;
/// # use std::{sync::Arc, thread};
/// let event = Arc::new(WaitEvent::new());
/// let setter = event.clone();
/// thread::spawn(move || setter.set());
///
/// event.wait();
/// assert!(!event.is_set());
/// ```
#[derive(Debug, Default)]
pub struct WaitEvent {
    signaled: Mutex<bool>,
    condvar: Condvar,
}

impl WaitEvent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self) {
        *self.signaled.lock() = true;
        self.condvar.notify_one();
    }

    /// Blocks the calling thread until the event is set. There is no timeout.
    pub fn wait(&self) {
        let mut signaled = self.signaled.lock();
        while !*signaled {
            self.condvar.wait(&mut signaled);
        }
        *signaled = false;
    }

    pub fn is_set(&self) -> bool {
        *self.signaled.lock()
    }
}

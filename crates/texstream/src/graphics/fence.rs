use log::*;
use parking_lot::Mutex;
use std::sync::Arc;
use texstream_utils::WaitEvent;

/// Monotonic completion counter, advanced by whoever executes the work (a command queue or a
/// storage queue), and observed by the host.
#[derive(Debug, Default)]
pub struct Fence {
    state: Mutex<FenceState>,
}

#[derive(Debug, Default)]
struct FenceState {
    completed: u64,
    waiters: Vec<(u64, Arc<WaitEvent>)>,
}

impl Fence {
    pub fn new(initial_value: u64) -> Self {
        Self {
            state: Mutex::new(FenceState {
                completed: initial_value,
                waiters: vec![],
            }),
        }
    }

    pub fn completed_value(&self) -> u64 {
        self.state.lock().completed
    }

    /// Advances the fence and sets the events of all waiters that were waiting for a value
    /// less than or equal to `value`. Values lower than the current one are ignored.
    pub fn signal(&self, value: u64) {
        let mut state = self.state.lock();
        if value < state.completed {
            warn!(
                "Ignoring a fence signal going backwards ({} -> {value})",
                state.completed
            );
            return;
        }
        state.completed = value;
        state.waiters.retain(|(target, event)| {
            if *target <= value {
                event.set();
                false
            } else {
                true
            }
        });
    }

    /// Sets `event` once the fence reaches `value`. If it already has, the event is set
    /// immediately.
    pub fn set_event_on_completion(&self, value: u64, event: Arc<WaitEvent>) {
        let mut state = self.state.lock();
        if state.completed >= value {
            event.set();
        } else {
            state.waiters.push((value, event));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    pub fn events_fire_once_the_value_is_reached() {
        let fence = Fence::new(0);
        let early = Arc::new(WaitEvent::new());
        let late = Arc::new(WaitEvent::new());

        fence.set_event_on_completion(1, early.clone());
        fence.set_event_on_completion(3, late.clone());

        fence.signal(2);
        assert!(early.is_set());
        assert!(!late.is_set());

        fence.signal(3);
        assert!(late.is_set());
        assert_eq!(fence.completed_value(), 3);
    }

    #[test]
    pub fn completed_values_set_the_event_immediately() {
        let fence = Fence::new(5);
        let event = Arc::new(WaitEvent::new());
        fence.set_event_on_completion(4, event.clone());
        assert!(event.is_set());

        fence.signal(1);
        assert_eq!(fence.completed_value(), 5);
    }

    #[test]
    pub fn cross_thread_wait() {
        let fence = Arc::new(Fence::new(0));
        let event = Arc::new(WaitEvent::new());
        fence.set_event_on_completion(1, event.clone());

        let signaler = fence.clone();
        let handle = thread::spawn(move || signaler.signal(1));
        event.wait();
        handle.join().unwrap();
        assert_eq!(fence.completed_value(), 1);
    }
}

use super::simulation::{EventId, Scheduler};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

/// FIFO message queue between two processes. Sending fires the channel's
/// current event and rotates it, so a receiver waiting on `event()` wakes
/// up, drains with `try_recv`, and then waits on the new event.
pub struct Channel<T> {
    inner: Rc<RefCell<ChannelState<T>>>,
}

struct ChannelState<T> {
    queue: VecDeque<T>,
    event: EventId,
}

impl<T> Channel<T> {
    pub fn new(scheduler: &mut Scheduler) -> Channel<T> {
        let event = scheduler.new_event();
        Channel {
            inner: Rc::new(RefCell::new(ChannelState {
                queue: VecDeque::new(),
                event: event,
            })),
        }
    }

    pub fn send(&self, scheduler: &mut Scheduler, msg: T) {
        let mut state = self.inner.borrow_mut();
        state.queue.push_back(msg);
        scheduler.schedule(state.event, 0.0);
        state.event = scheduler.new_event();
    }

    pub fn try_recv(&self) -> Option<T> {
        self.inner.borrow_mut().queue.pop_front()
    }

    pub fn event(&self) -> EventId {
        self.inner.borrow().event
    }

    pub fn is_empty(&self) -> bool {
        self.inner.borrow().queue.is_empty()
    }
}

impl<T> Clone for Channel<T> {
    fn clone(&self) -> Channel<T> {
        Channel {
            inner: self.inner.clone(),
        }
    }
}

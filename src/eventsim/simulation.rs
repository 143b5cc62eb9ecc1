use ordered_float::OrderedFloat;
use smallvec::SmallVec;
use std::collections::BinaryHeap;
use std::mem;

pub type EventId = usize;
pub type ProcessId = usize;

pub enum ProcessState {
    Finished,
    Wait(SmallVec<[EventId; 4]>),
}

pub trait Process<T> {
    fn resume(&mut self, sim: &mut Simulation<T>) -> ProcessState;
}

pub enum EventState {
    Ready,
    Firing,
    Success,
}

#[derive(Eq, PartialEq, Debug)]
pub struct QueuedEvent {
    pub time: OrderedFloat<f64>,
    pub id: usize,
    pub event: EventId,
}

use std::cmp::Ordering;
impl Ord for QueuedEvent {
    fn cmp(&self, other: &QueuedEvent) -> Ordering {
        // Note that the order is flipped on purpose -- to turn
        // the (maximum) BinaryHeap into a minimum heap.
        other.time.cmp(&self.time).then_with(|| other.id.cmp(&self.id))
    }
}

impl PartialOrd for QueuedEvent {
    fn partial_cmp(&self, other: &QueuedEvent) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

pub struct Event {
    state: EventState,
    listeners: Vec<ProcessId>,
}

pub struct Simulation<T> {
    pub world: T,
    procs: Vec<Option<(EventId, Box<dyn Process<T>>)>>,
    pub scheduler: Scheduler,
}

#[derive(Default)]
pub struct Scheduler {
    pub time: OrderedFloat<f64>,
    events: Vec<Event>,
    pub queue: BinaryHeap<QueuedEvent>,
    id_counter: usize,
}

impl Scheduler {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn new_event(&mut self) -> EventId {
        let event_id = self.events.len();
        self.events.push(Event {
            state: EventState::Ready,
            listeners: vec![],
        });
        event_id
    }

    pub fn schedule(&mut self, id: EventId, dt: f64) {
        if dt < 0.0 {
            panic!("dt < 0");
        }
        if dt.is_infinite() {
            return; // Will never happen
        }
        let qe = QueuedEvent {
            time: OrderedFloat::from(*self.time + dt),
            id: self.id_counter,
            event: id,
        };
        self.id_counter += 1;
        self.queue.push(qe);
    }

    pub fn fire(&mut self, id: EventId) -> Vec<ProcessId> {
        self.events[id].state = EventState::Firing;
        mem::replace(&mut self.events[id].listeners, Vec::new())
    }

    pub fn finish(&mut self, id: EventId) {
        self.events[id].state = EventState::Success;
    }
}

impl<T> Simulation<T> {
    pub fn new(world: T) -> Self {
        Simulation::new_with_scheduler(world, Scheduler::new())
    }

    pub fn new_with_scheduler(world: T, scheduler: Scheduler) -> Self {
        Simulation {
            procs: Vec::new(),
            scheduler: scheduler,
            world: world,
        }
    }

    pub fn has_fired(&self, event: EventId) -> bool {
        if let EventState::Ready = self.scheduler.events[event].state {
            false
        } else {
            true
        }
    }

    pub fn time(&self) -> &f64 {
        &self.scheduler.time
    }

    pub fn create_timeout(&mut self, dt: f64) -> EventId {
        let id = self.scheduler.new_event();
        self.scheduler.schedule(id, dt);
        id
    }

    /// Starts a process and returns the event which fires when the
    /// process finishes.
    pub fn start_process(&mut self, p: Box<dyn Process<T>>) -> EventId {
        let eventid = self.scheduler.new_event();
        let process_id = self.procs.len();
        self.procs.push(Some((eventid, p)));
        self.resume(process_id);
        eventid
    }

    pub fn step(&mut self) -> bool {
        match self.scheduler.queue.pop() {
            Some(ev) => {
                self.scheduler.time = ev.time;
                self.fire(ev.event);
                true
            }
            None => false,
        }
    }

    pub fn run(&mut self) {
        while self.step() {}
    }

    pub fn fire(&mut self, event_id: EventId) {
        let proc_ids = self.scheduler.fire(event_id);
        for process_id in proc_ids {
            self.resume(process_id);
        }
        self.scheduler.finish(event_id);
    }

    fn resume(&mut self, process_id: ProcessId) {
        if let Some((event_id, mut process)) = {
            let a = &mut self.procs[process_id];
            // A process must either be running or waiting for an event,
            // not both, so it is taken out of the array while resumed.
            a.take()
        } {
            loop {
                match process.resume(self) {
                    ProcessState::Finished => {
                        self.scheduler.schedule(event_id, 0.0);
                        break;
                    }
                    ProcessState::Wait(evs) => {
                        let mut waiting = false;
                        for x in evs {
                            let already_listening =
                                self.scheduler.events[x].listeners.contains(&process_id);
                            let event_pending = !self.has_fired(x);
                            if event_pending {
                                waiting = true;
                                if !already_listening {
                                    self.scheduler.events[x].listeners.push(process_id);
                                }
                            }
                        }

                        if waiting {
                            self.procs[process_id] = Some((event_id, process));
                            break;
                        }

                        // If none of the events are pending, resume the
                        // process immediately.
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn queue_is_time_ordered() {
        let mut p = BinaryHeap::new();
        p.push(QueuedEvent {
            time: OrderedFloat::from(123.0),
            id: 0,
            event: 0,
        });
        p.push(QueuedEvent {
            time: OrderedFloat::from(0.0),
            id: 0,
            event: 0,
        });
        p.push(QueuedEvent {
            time: OrderedFloat::from(122.0),
            id: 0,
            event: 0,
        });
        assert_eq!(*p.pop().unwrap().time, 0.0);
        assert_eq!(*p.pop().unwrap().time, 122.0);
        assert_eq!(*p.pop().unwrap().time, 123.0);
    }

    #[test]
    fn equal_times_fire_in_insertion_order() {
        let mut p = BinaryHeap::new();
        p.push(QueuedEvent {
            time: OrderedFloat::from(1.0),
            id: 1,
            event: 10,
        });
        p.push(QueuedEvent {
            time: OrderedFloat::from(1.0),
            id: 0,
            event: 20,
        });
        assert_eq!(p.pop().unwrap().event, 20);
        assert_eq!(p.pop().unwrap().event, 10);
    }

    struct CountDown {
        remaining: usize,
        resumes: Rc<Cell<usize>>,
    }

    impl Process<()> for CountDown {
        fn resume(&mut self, sim: &mut Simulation<()>) -> ProcessState {
            self.resumes.set(self.resumes.get() + 1);
            if self.remaining == 0 {
                return ProcessState::Finished;
            }
            self.remaining -= 1;
            let ev = sim.create_timeout(1.0);
            ProcessState::Wait(SmallVec::from_slice(&[ev]))
        }
    }

    #[test]
    fn timeouts_drive_processes() {
        let mut sim = Simulation::new(());
        let resumes = Rc::new(Cell::new(0));
        sim.start_process(Box::new(CountDown {
            remaining: 3,
            resumes: resumes.clone(),
        }));
        sim.run();
        assert_eq!(resumes.get(), 4);
        assert_eq!(*sim.time(), 3.0);
    }
}

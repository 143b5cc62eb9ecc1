//! Central dispatch: multiplexes agent messages and arbitrates
//! exclusive track reservations with FIFO wait queues.

use crate::eventsim::{Channel, EventId, Observable, Process, ProcessState, Scheduler};
use crate::output::history::DispatchLogEvent;
use crate::track::graph::{EdgeId, NodeId, Track};
use crate::yard::{Sim, TrainId};
use failure::Fail;
use log::debug;
use smallvec::SmallVec;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

/// Messages from dispatch (or the outside world) to a train agent.
#[derive(Debug)]
pub enum AgentMsg {
    NavigateTo(NodeId),
    ReservationConfirmed(EdgeId),
}

/// Messages from a train agent to dispatch.
#[derive(Debug)]
pub enum TrainMsg {
    ReservationRequest(EdgeId),
    ReservationRelease(EdgeId),
    NavigationComplete(NodeId),
    Exception(failure::Error),
}

#[derive(Debug, Fail)]
pub enum DispatchError {
    #[fail(display = "train {} released \"{}\" which it does not hold", train, edge)]
    ReleaseNotOwner { train: TrainId, edge: String },
    #[fail(
        display = "train {} released \"{}\" out of acquisition order (head is {:?})",
        train, edge, head
    )]
    ReleaseOutOfOrder {
        train: TrainId,
        edge: String,
        head: Option<String>,
    },
    #[fail(display = "reservation deadlock between trains {:?}", trains)]
    Deadlock { trains: Vec<TrainId> },
}

/// Exclusive claim on one track segment (a directed edge and its
/// reverse). At most one holder; waiters are served strictly first
/// come, first served.
#[derive(Debug)]
pub struct ReservationRecord {
    pub reserved_by: Observable<Option<TrainId>>,
    holds: u32,
    wait_queue: VecDeque<(TrainId, EdgeId)>,
}

/// The reservation table plus per-train bookkeeping. Lives in the
/// world but is only ever touched from the dispatch process.
pub struct Arbiter {
    pub records: Vec<ReservationRecord>,
    held: Vec<VecDeque<EdgeId>>,
    waiting_for: Vec<Option<usize>>,
}

impl Arbiter {
    pub fn new(scheduler: &mut Scheduler, track: &Track) -> Arbiter {
        let records = (0..track.segment_count())
            .map(|_| ReservationRecord {
                reserved_by: Observable::new(scheduler, None),
                holds: 0,
                wait_queue: VecDeque::new(),
            })
            .collect();
        Arbiter {
            records: records,
            held: Vec::new(),
            waiting_for: Vec::new(),
        }
    }

    pub fn register_train(&mut self) -> TrainId {
        self.held.push(VecDeque::new());
        self.waiting_for.push(None);
        self.held.len() - 1
    }

    pub fn reserved_by(&self, segment: usize) -> Option<TrainId> {
        *self.records[segment].reserved_by.get()
    }

    /// Follows waiter-to-holder links from `start`. Any revisited train
    /// closes a hold-and-wait cycle.
    fn find_deadlock(&self, start: TrainId) -> Option<Vec<TrainId>> {
        let mut chain = vec![start];
        let mut at = start;
        loop {
            let segment = self.waiting_for[at]?;
            let holder = self.reserved_by(segment)?;
            if let Some(pos) = chain.iter().position(|&t| t == holder) {
                return Some(chain.split_off(pos));
            }
            chain.push(holder);
            at = holder;
        }
    }
}

/// One agent's endpoints as seen from dispatch.
pub struct AgentLink {
    pub to_agent: Channel<AgentMsg>,
    pub from_agent: Channel<TrainMsg>,
}

/// Shared between dispatch and the spawning side; the change event
/// fires when an agent is added so dispatch re-collects its wait set.
pub struct Roster {
    pub links: Vec<AgentLink>,
    pub change_event: EventId,
}

pub struct CentralDispatch {
    roster: Rc<RefCell<Roster>>,
    logger: Box<dyn Fn(DispatchLogEvent)>,
}

impl CentralDispatch {
    pub fn new(roster: Rc<RefCell<Roster>>, logger: Box<dyn Fn(DispatchLogEvent)>) -> CentralDispatch {
        CentralDispatch {
            roster: roster,
            logger: logger,
        }
    }

    fn confirm(&self, sim: &mut Sim, train: TrainId, edge: EdgeId) {
        let roster = self.roster.borrow();
        roster.links[train]
            .to_agent
            .send(&mut sim.scheduler, AgentMsg::ReservationConfirmed(edge));
    }

    fn make_reservation(&mut self, sim: &mut Sim, train: TrainId, edge: EdgeId) {
        let segment = sim.world.track.segment(edge);
        let holder = {
            let arbiter = &mut sim.world.arbiter;
            let scheduler = &mut sim.scheduler;
            let record = &mut arbiter.records[segment];
            match *record.reserved_by.get() {
                None => {
                    record.reserved_by.set(scheduler, Some(train));
                    record.holds = 1;
                    arbiter.held[train].push_back(edge);
                    None
                }
                Some(t) if t == train => {
                    // Re-entering a segment it already holds, e.g. a
                    // turnback over the same pair of edges.
                    record.holds += 1;
                    arbiter.held[train].push_back(edge);
                    None
                }
                Some(t) => {
                    record.wait_queue.push_back((train, edge));
                    arbiter.waiting_for[train] = Some(segment);
                    Some(t)
                }
            }
        };

        match holder {
            None => {
                debug!("dispatch: granted {} to train {}", sim.world.track.edge_label(edge), train);
                (self.logger)(DispatchLogEvent::Granted {
                    train: train,
                    edge: edge,
                });
                self.confirm(sim, train, edge);
            }
            Some(h) => {
                debug!(
                    "dispatch: train {} queued on {} behind train {}",
                    train,
                    sim.world.track.edge_label(edge),
                    h
                );
                (self.logger)(DispatchLogEvent::Queued {
                    train: train,
                    edge: edge,
                });
                if let Some(trains) = sim.world.arbiter.find_deadlock(train) {
                    (self.logger)(DispatchLogEvent::Deadlock {
                        trains: trains.clone(),
                    });
                    self.halt(sim, DispatchError::Deadlock { trains: trains }.into());
                }
            }
        }
    }

    fn release_reservation(&mut self, sim: &mut Sim, train: TrainId, edge: EdgeId) -> Result<(), DispatchError> {
        let segment = sim.world.track.segment(edge);
        let transferred = {
            let track = &sim.world.track;
            let arbiter = &mut sim.world.arbiter;
            let scheduler = &mut sim.scheduler;
            let record = &mut arbiter.records[segment];

            if *record.reserved_by.get() != Some(train) {
                return Err(DispatchError::ReleaseNotOwner {
                    train: train,
                    edge: track.edge_label(edge),
                });
            }
            match arbiter.held[train].pop_front() {
                Some(head) if head == edge => {}
                head => {
                    return Err(DispatchError::ReleaseOutOfOrder {
                        train: train,
                        edge: track.edge_label(edge),
                        head: head.map(|h| track.edge_label(h)),
                    });
                }
            }

            record.holds -= 1;
            if record.holds > 0 {
                None
            } else if let Some((next, next_edge)) = record.wait_queue.pop_front() {
                record.reserved_by.set(scheduler, Some(next));
                record.holds = 1;
                arbiter.held[next].push_back(next_edge);
                arbiter.waiting_for[next] = None;
                Some((next, next_edge))
            } else {
                record.reserved_by.set(scheduler, None);
                (self.logger)(DispatchLogEvent::Freed { edge: edge });
                None
            }
        };

        if let Some((next, next_edge)) = transferred {
            debug!(
                "dispatch: {} transferred to train {}",
                sim.world.track.edge_label(next_edge),
                next
            );
            (self.logger)(DispatchLogEvent::Transferred {
                train: next,
                edge: next_edge,
            });
            self.confirm(sim, next, next_edge);
        }
        Ok(())
    }

    fn halt(&mut self, sim: &mut Sim, fault: failure::Error) {
        (self.logger)(DispatchLogEvent::WorldStopped {
            reason: format!("{}", fault),
        });
        sim.world.halt(fault);
    }

    fn handle(&mut self, sim: &mut Sim, train: TrainId, msg: TrainMsg) {
        match msg {
            TrainMsg::ReservationRequest(edge) => self.make_reservation(sim, train, edge),
            TrainMsg::ReservationRelease(edge) => {
                if let Err(e) = self.release_reservation(sim, train, edge) {
                    self.halt(sim, e.into());
                }
            }
            TrainMsg::NavigationComplete(node) => {
                (self.logger)(DispatchLogEvent::NavigationComplete {
                    train: train,
                    node: node,
                });
            }
            TrainMsg::Exception(fault) => {
                debug!("dispatch: train {} raised: {}", train, fault);
                self.halt(sim, fault);
            }
        }
    }
}

impl Process<crate::yard::Yard> for CentralDispatch {
    fn resume(&mut self, sim: &mut Sim) -> ProcessState {
        loop {
            let mut inbound: Vec<(TrainId, TrainMsg)> = Vec::new();
            {
                let roster = self.roster.borrow();
                for (train, link) in roster.links.iter().enumerate() {
                    while let Some(msg) = link.from_agent.try_recv() {
                        inbound.push((train, msg));
                    }
                }
            }
            if inbound.is_empty() {
                break;
            }
            for (train, msg) in inbound {
                self.handle(sim, train, msg);
            }
        }

        let roster = self.roster.borrow();
        let mut events = SmallVec::new();
        events.push(roster.change_event);
        for link in roster.links.iter() {
            events.push(link.from_agent.event());
        }
        ProcessState::Wait(events)
    }
}

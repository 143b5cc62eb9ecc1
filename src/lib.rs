//! Multi-train simulation and dispatch. Autonomous train agents plan
//! paths over a shared switched rail graph, compile them into
//! navigation programs and execute them under exclusive track
//! reservations granted by a central arbiter.

pub mod eventsim;
pub mod track;
pub mod train;
pub mod dispatch;
pub mod output;
pub mod yard;

#[cfg(test)]
mod tests;

use crate::dispatch::{AgentLink, AgentMsg, CentralDispatch, Roster};
use crate::eventsim::simulation::QueuedEvent;
use crate::eventsim::{Channel, Observable};
use crate::output::history::History;
use crate::track::graph::{EdgeId, NodeId, Track};
use crate::train::agent::TrainAgent;
use crate::train::kinematics::{TrainDirection, TrainParams};
use crate::train::position::TrainPosition;
use crate::yard::{PositionUpdate, Sim, TrainId, Yard};
use failure::Fail;
use ordered_float::OrderedFloat;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

pub use crate::track::graph::TrackBuilder;

pub type AppResult<T> = Result<T, failure::Error>;

#[derive(Debug, Fail)]
pub enum SpawnError {
    #[fail(display = "a train named \"{}\" already exists", _0)]
    DuplicateName(String),
    #[fail(
        display = "asymmetric rates (acc {}, brk {}) break stop scheduling",
        acc, brk
    )]
    AsymmetricRates { acc: f64, brk: f64 },
}

/// Owns the simulation and wires trains to central dispatch. The
/// outside world spawns trains, issues navigation orders, advances the
/// clock and reads the observables.
pub struct Conductor {
    sim: Sim,
    roster: Rc<RefCell<Roster>>,
    history: Rc<RefCell<History>>,
    names: HashMap<String, TrainId>,
}

impl Conductor {
    pub fn new(track: Track) -> Conductor {
        let mut scheduler = eventsim::Scheduler::new();
        let yard = Yard::new(&mut scheduler, track);
        let mut sim = eventsim::Simulation::new_with_scheduler(yard, scheduler);

        let change_event = sim.scheduler.new_event();
        let roster = Rc::new(RefCell::new(Roster {
            links: Vec::new(),
            change_event: change_event,
        }));
        let history = Rc::new(RefCell::new(History::default()));

        let dispatch_log = {
            let history = history.clone();
            Box::new(move |ev| history.borrow_mut().dispatch.push(ev))
        };
        sim.start_process(Box::new(CentralDispatch::new(roster.clone(), dispatch_log)));

        Conductor {
            sim: sim,
            roster: roster,
            history: history,
            names: HashMap::new(),
        }
    }

    pub fn spawn_train(
        &mut self,
        name: &str,
        start: NodeId,
        direction: TrainDirection,
        params: TrainParams,
    ) -> AppResult<TrainId> {
        if self.names.contains_key(name) {
            return Err(SpawnError::DuplicateName(name.to_string()).into());
        }
        if !params.symmetric() {
            return Err(SpawnError::AsymmetricRates {
                acc: params.max_acc,
                brk: params.max_brk,
            }
            .into());
        }

        let id = self.sim.world.arbiter.register_train();
        let position = {
            let world = &self.sim.world;
            TrainPosition::at_node(&world.track, &world.switches, start, direction)
        };
        let initial = PositionUpdate {
            train: id,
            direction: direction,
            node: position.node,
            edge: position.edge,
            offset: 0.0,
            velocity: 0.0,
        };
        {
            let world = &mut self.sim.world;
            let scheduler = &mut self.sim.scheduler;
            world.trains.push(yard::TrainTelemetry {
                name: name.to_string(),
                position: Observable::new(scheduler, initial),
                destination: Observable::new(scheduler, None),
                reservations: Observable::new(scheduler, Vec::new()),
            });
        }

        let inbox: Channel<AgentMsg> = Channel::new(&mut self.sim.scheduler);
        let outbox = Channel::new(&mut self.sim.scheduler);
        {
            let mut roster = self.roster.borrow_mut();
            roster.links.push(AgentLink {
                to_agent: inbox.clone(),
                from_agent: outbox.clone(),
            });
            // Wake dispatch so it starts listening to the new agent.
            let old = roster.change_event;
            self.sim.scheduler.schedule(old, 0.0);
            roster.change_event = self.sim.scheduler.new_event();
        }

        self.history
            .borrow_mut()
            .trains
            .push((name.to_string(), Vec::new()));
        let train_log = {
            let history = self.history.clone();
            Box::new(move |ev| history.borrow_mut().trains[id].1.push(ev))
        };

        let now = *self.sim.time();
        let agent = TrainAgent::new(id, params, direction, position, inbox, outbox, train_log, now);
        self.sim.start_process(Box::new(agent));
        self.names.insert(name.to_string(), id);
        Ok(id)
    }

    pub fn navigate_to(&mut self, train: TrainId, destination: NodeId) {
        let roster = self.roster.borrow();
        roster.links[train]
            .to_agent
            .send(&mut self.sim.scheduler, AgentMsg::NavigateTo(destination));
    }

    /// Advances simulated time, stopping short if the world halts.
    pub fn advance_by(&mut self, dt: f64) {
        let target = OrderedFloat::from(*self.sim.time() + dt);
        while let Some(&QueuedEvent { time, .. }) = self.sim.scheduler.queue.peek() {
            if time > target || self.sim.world.halted {
                break;
            }
            self.sim.step();
        }
        if !self.sim.world.halted {
            self.sim.scheduler.time = target;
        }
    }

    /// Runs until every train is idle or the world halts.
    pub fn run(&mut self) {
        while !self.sim.world.halted && self.sim.step() {}
    }

    pub fn time(&self) -> f64 {
        *self.sim.time()
    }

    pub fn halted(&self) -> bool {
        self.sim.world.halted
    }

    pub fn fault(&self) -> Option<&failure::Error> {
        self.sim.world.fault.as_ref()
    }

    /// Lifts a stop-the-world pause. The fault stays on record.
    pub fn resume_the_world(&mut self) {
        self.sim.world.halted = false;
    }

    pub fn train_id(&self, name: &str) -> Option<TrainId> {
        self.names.get(name).cloned()
    }

    pub fn position(&self, train: TrainId) -> PositionUpdate {
        *self.sim.world.trains[train].position.get()
    }

    pub fn destination(&self, train: TrainId) -> Option<NodeId> {
        *self.sim.world.trains[train].destination.get()
    }

    pub fn reservations(&self, train: TrainId) -> Vec<EdgeId> {
        self.sim.world.trains[train].reservations.get().clone()
    }

    pub fn reserved_by(&self, edge: EdgeId) -> Option<TrainId> {
        let segment = self.sim.world.track.segment(edge);
        self.sim.world.arbiter.reserved_by(segment)
    }

    pub fn track(&self) -> &Track {
        &self.sim.world.track
    }

    /// Drains the collected telemetry log. Per-train slots stay in
    /// place so the agents keep logging into them afterwards.
    pub fn history(&mut self) -> History {
        let mut log = self.history.borrow_mut();
        History {
            dispatch: std::mem::replace(&mut log.dispatch, Vec::new()),
            trains: log
                .trains
                .iter_mut()
                .map(|(name, events)| (name.clone(), std::mem::replace(events, Vec::new())))
                .collect(),
        }
    }
}

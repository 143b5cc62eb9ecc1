use crate::dispatch::{AgentMsg, TrainMsg};
use crate::eventsim::{Channel, EventId, Process, ProcessState};
use crate::output::history::TrainLogEvent;
use crate::track::graph::{Branch, EdgeId, NodeId};
use crate::track::path::find_path;
use crate::train::compiler::{self, NavigationEvent, TrackElement};
use crate::train::executor::{ExecState, GuardState, StopTiming};
use crate::train::kinematics::{TrainDirection, TrainParams, TrainPhysics};
use crate::train::position::TrainPosition;
use crate::yard::{PositionUpdate, Sim, TrainId, Yard};
use failure::Fail;
use log::debug;
use smallvec::SmallVec;

/// Kinematic update cadence in seconds.
pub const TICK: f64 = 0.01;

/// Position telemetry goes out every this many ticks.
pub const TELEMETRY_TICKS: u32 = 10;

#[derive(Debug, Fail)]
pub enum SequencingError {
    #[fail(display = "start while moving at speed {}", speed)]
    StartWhileMoving { speed: f64 },
    #[fail(display = "direction change while moving at speed {}", speed)]
    DirectionChangeWhileMoving { speed: f64 },
    #[fail(display = "direction flip did not land on {:?}", target)]
    DirectionMismatch { target: TrainDirection },
    #[fail(display = "cannot set curve branch on non-branching node \"{}\"", node)]
    CurveOnPlainNode { node: String },
}

#[derive(Debug, Fail)]
pub enum ProtocolError {
    #[fail(display = "unexpected reservation confirmation for edge {}", edge)]
    UnexpectedConfirmation { edge: EdgeId },
    #[fail(display = "navigation request while a program is running")]
    AlreadyNavigating,
}

struct ProgramState {
    events: Vec<NavigationEvent>,
    /// Path distance at which each reserved edge begins, in request
    /// order.
    edge_starts: Vec<f64>,
    pc: usize,
    reserve_count: usize,
    destination: NodeId,
    exec: ExecState,
    /// Distance travelled since the program started.
    odometer: f64,
    /// Odometer value at the most recent start from rest.
    segment_anchor: f64,
}

/// A train: one cooperative process owning its physics, its position
/// and its compiled program, talking to dispatch over a channel pair.
pub struct TrainAgent {
    id: TrainId,
    physics: TrainPhysics,
    position: TrainPosition,
    program: Option<ProgramState>,
    inbox: Channel<AgentMsg>,
    outbox: Channel<TrainMsg>,
    held: Vec<EdgeId>,
    last_step: f64,
    tick_timer: Option<EventId>,
    next_telemetry: f64,
    logger: Box<dyn Fn(TrainLogEvent)>,
    dead: bool,
}

impl TrainAgent {
    pub fn new(
        id: TrainId,
        params: TrainParams,
        direction: TrainDirection,
        position: TrainPosition,
        inbox: Channel<AgentMsg>,
        outbox: Channel<TrainMsg>,
        logger: Box<dyn Fn(TrainLogEvent)>,
        now: f64,
    ) -> TrainAgent {
        TrainAgent {
            id: id,
            physics: TrainPhysics::new(params, direction),
            position: position,
            program: None,
            inbox: inbox,
            outbox: outbox,
            held: Vec::new(),
            last_step: now,
            tick_timer: None,
            next_telemetry: 0.0,
            logger: logger,
            dead: false,
        }
    }

    /// Advances the physics over the time since the last resume and
    /// projects the displacement onto the track. Edges the train has
    /// fully left are released behind it.
    fn integrate(&mut self, sim: &mut Sim) {
        let now = *sim.time();
        let dt = now - self.last_step;
        self.last_step = now;
        if dt <= 0.0 {
            return;
        }
        let delta = self.physics.update(dt);
        if delta <= 0.0 {
            return;
        }
        if let Some(ref mut prog) = self.program {
            prog.odometer += delta;
        }
        let departed = {
            let world = &sim.world;
            self.position
                .advance(&world.track, &world.switches, self.physics.direction, delta)
        };
        for e in departed {
            self.release_edge(sim, e);
        }
    }

    fn release_edge(&mut self, sim: &mut Sim, edge: EdgeId) {
        if let Some(i) = self.held.iter().position(|&e| e == edge) {
            self.held.remove(i);
        }
        self.outbox
            .send(&mut sim.scheduler, TrainMsg::ReservationRelease(edge));
        (self.logger)(TrainLogEvent::Released(edge));
        let world = &mut sim.world;
        let scheduler = &mut sim.scheduler;
        world.trains[self.id]
            .reservations
            .set(scheduler, self.held.clone());
    }

    fn handle_message(&mut self, sim: &mut Sim, msg: AgentMsg) -> Result<(), failure::Error> {
        match msg {
            AgentMsg::NavigateTo(dest) => self.begin_navigation(sim, dest),
            AgentMsg::ReservationConfirmed(edge) => self.confirm_reservation(sim, edge),
        }
    }

    fn begin_navigation(&mut self, sim: &mut Sim, dest: NodeId) -> Result<(), failure::Error> {
        if self.program.is_some() {
            return Err(ProtocolError::AlreadyNavigating.into());
        }
        let path = find_path(&sim.world.track, self.position.node, dest, true)?;
        let plan = compiler::compile(&sim.world.track, self.physics.direction, &path)?;
        debug!(
            "train {}: navigating to {} over {} nodes",
            self.id,
            sim.world.track.node_name(dest),
            path.len()
        );
        (self.logger)(TrainLogEvent::Departed {
            from: self.position.node,
            to: dest,
        });
        {
            let world = &mut sim.world;
            let scheduler = &mut sim.scheduler;
            world.trains[self.id].destination.set(scheduler, Some(dest));
        }
        if plan.events.is_empty() {
            self.finish_navigation(sim, dest);
            return Ok(());
        }
        let mut edge_starts = Vec::with_capacity(plan.reserved_edges.len());
        let mut at = 0.0;
        for &e in &plan.reserved_edges {
            edge_starts.push(at);
            at += sim.world.track.edges[e].length as f64;
        }
        self.program = Some(ProgramState {
            events: plan.events,
            edge_starts: edge_starts,
            pc: 0,
            reserve_count: 0,
            destination: dest,
            exec: ExecState::Idle,
            odometer: 0.0,
            segment_anchor: 0.0,
        });
        self.next_telemetry = *sim.time() + TICK * TELEMETRY_TICKS as f64;
        Ok(())
    }

    fn confirm_reservation(&mut self, sim: &mut Sim, edge: EdgeId) -> Result<(), failure::Error> {
        let guard = {
            let prog = match self.program {
                Some(ref mut p) => p,
                None => return Err(ProtocolError::UnexpectedConfirmation { edge: edge }.into()),
            };
            match prog.exec {
                ExecState::AwaitReservation { edge: pending, guard } if pending == edge => {
                    prog.exec = ExecState::Idle;
                    prog.pc += 1;
                    prog.reserve_count += 1;
                    guard
                }
                _ => return Err(ProtocolError::UnexpectedConfirmation { edge: edge }.into()),
            }
        };
        self.held.push(edge);
        (self.logger)(TrainLogEvent::Reserved(edge));
        {
            let world = &mut sim.world;
            let scheduler = &mut sim.scheduler;
            world.trains[self.id]
                .reservations
                .set(scheduler, self.held.clone());
        }
        if let GuardState::Triggered = guard {
            // The guard stop has already begun (or finished); the grant
            // lets the train roll again from wherever braking took it.
            self.physics.start();
            (self.logger)(TrainLogEvent::Resumed(edge));
        }
        Ok(())
    }

    fn execute(&mut self, sim: &mut Sim) -> Result<(), failure::Error> {
        loop {
            let exec = match self.program {
                Some(ref p) => p.exec,
                None => return Ok(()),
            };
            match exec {
                ExecState::Idle => {
                    let (pc, done, dest) = {
                        let p = self.program.as_ref().unwrap();
                        (p.pc, p.pc >= p.events.len(), p.destination)
                    };
                    if done {
                        self.finish_navigation(sim, dest);
                        return Ok(());
                    }
                    let ev = self.program.as_ref().unwrap().events[pc];
                    if !self.exec_event(sim, ev)? {
                        return Ok(());
                    }
                }
                ExecState::AwaitReservation { edge, guard } => {
                    if let GuardState::Armed { deadline } = guard {
                        if sim.has_fired(deadline) {
                            self.physics.stop();
                            (self.logger)(TrainLogEvent::GuardStop(edge));
                            if let Some(ref mut p) = self.program {
                                p.exec = ExecState::AwaitReservation {
                                    edge: edge,
                                    guard: GuardState::Triggered,
                                };
                            }
                        }
                    }
                    return Ok(());
                }
                ExecState::AwaitStopTrigger {
                    deadline,
                    destination,
                    total,
                } => {
                    if !sim.has_fired(deadline) {
                        return Ok(());
                    }
                    self.physics.stop();
                    let time_to_stop = self.physics.speed / self.physics.params.max_brk;
                    let stopped = sim.create_timeout(time_to_stop);
                    if let Some(ref mut p) = self.program {
                        p.exec = ExecState::AwaitStopped {
                            deadline: stopped,
                            destination: destination,
                            total: total,
                        };
                    }
                    return Ok(());
                }
                ExecState::AwaitStopped {
                    deadline,
                    destination,
                    total,
                } => {
                    if !sim.has_fired(deadline) {
                        return Ok(());
                    }
                    let departed = {
                        let world = &sim.world;
                        self.position.normalize_to_closest_node(
                            &world.track,
                            &world.switches,
                            self.physics.direction,
                        )?
                    };
                    if let Some(e) = departed {
                        self.release_edge(sim, e);
                    }
                    self.physics.force_stop()?;
                    if let Some(ref mut p) = self.program {
                        p.odometer = total;
                        p.exec = ExecState::Idle;
                        p.pc += 1;
                    }
                    (self.logger)(TrainLogEvent::StoppedAt(destination));
                }
            }
        }
    }

    /// Runs one program event. Returns false when the program has
    /// suspended on a reservation or a stop deadline.
    fn exec_event(&mut self, sim: &mut Sim, ev: NavigationEvent) -> Result<bool, failure::Error> {
        match ev {
            NavigationEvent::SetDirection(d) => {
                if self.physics.speed != 0.0 {
                    return Err(SequencingError::DirectionChangeWhileMoving {
                        speed: self.physics.speed,
                    }
                    .into());
                }
                self.physics.change_direction();
                if self.physics.direction != d {
                    return Err(SequencingError::DirectionMismatch { target: d }.into());
                }
                {
                    let world = &sim.world;
                    self.position.reorient(&world.track, &world.switches, d);
                }
                (self.logger)(TrainLogEvent::DirectionChanged(d));
                self.advance_pc();
                Ok(true)
            }
            NavigationEvent::SetSwitch(node, branch) => {
                if sim.world.track.nodes[node].edge_count() != 3 {
                    if branch == Branch::Curve {
                        return Err(SequencingError::CurveOnPlainNode {
                            node: sim.world.track.node_name(node).to_string(),
                        }
                        .into());
                    }
                    // Straight on a plain node has nothing to move.
                } else {
                    sim.world.switches[node] = branch;
                    let world = &sim.world;
                    self.position.switch_changed(
                        &world.track,
                        &world.switches,
                        self.physics.direction,
                        node,
                    );
                }
                self.advance_pc();
                Ok(true)
            }
            NavigationEvent::Start => {
                if self.physics.speed != 0.0 {
                    return Err(SequencingError::StartWhileMoving {
                        speed: self.physics.speed,
                    }
                    .into());
                }
                self.physics.start();
                if let Some(ref mut p) = self.program {
                    p.segment_anchor = p.odometer;
                }
                self.advance_pc();
                Ok(true)
            }
            NavigationEvent::Reserve(TrackElement::Node(_)) => {
                // Node reservations stay in the program for ordering
                // but are not arbitrated.
                self.advance_pc();
                Ok(true)
            }
            NavigationEvent::Reserve(TrackElement::Edge(edge)) => {
                self.outbox
                    .send(&mut sim.scheduler, TrainMsg::ReservationRequest(edge));
                let guard = if self.physics.at_rest() {
                    GuardState::Inactive
                } else {
                    // If the grant is late, brake to a halt just short
                    // of the unreserved edge.
                    let distance = {
                        let p = self.program.as_ref().unwrap();
                        (p.edge_starts[p.reserve_count] - p.odometer).max(0.0)
                    };
                    let timing = StopTiming::plan(self.physics.speed, distance, &self.physics.params);
                    let deadline = sim.create_timeout(timing.time_to_trigger);
                    GuardState::Armed { deadline: deadline }
                };
                if let Some(ref mut p) = self.program {
                    p.exec = ExecState::AwaitReservation {
                        edge: edge,
                        guard: guard,
                    };
                }
                Ok(false)
            }
            NavigationEvent::Stop {
                destination,
                distance,
                ..
            } => {
                let (anchor, odometer) = {
                    let p = self.program.as_ref().unwrap();
                    (p.segment_anchor, p.odometer)
                };
                let total = anchor + distance;
                let remaining = (total - odometer).max(0.0);
                let timing = StopTiming::plan(self.physics.speed, remaining, &self.physics.params);
                let deadline = sim.create_timeout(timing.time_to_trigger);
                if let Some(ref mut p) = self.program {
                    p.exec = ExecState::AwaitStopTrigger {
                        deadline: deadline,
                        destination: destination,
                        total: total,
                    };
                }
                Ok(false)
            }
        }
    }

    fn advance_pc(&mut self) {
        if let Some(ref mut p) = self.program {
            p.pc += 1;
        }
    }

    fn finish_navigation(&mut self, sim: &mut Sim, destination: NodeId) {
        while let Some(&edge) = self.held.first() {
            self.release_edge(sim, edge);
        }
        self.outbox
            .send(&mut sim.scheduler, TrainMsg::NavigationComplete(destination));
        (self.logger)(TrainLogEvent::NavigationCompleted(destination));
        self.publish_position(sim);
        {
            let world = &mut sim.world;
            let scheduler = &mut sim.scheduler;
            world.trains[self.id].destination.set(scheduler, None);
        }
        self.program = None;
        debug!("train {}: arrived at {}", self.id, sim.world.track.node_name(destination));
    }

    fn publish_position(&mut self, sim: &mut Sim) {
        let update = PositionUpdate {
            train: self.id,
            direction: self.physics.direction,
            node: self.position.node,
            edge: self.position.edge,
            offset: self.position.offset,
            velocity: self.physics.velocity(),
        };
        (self.logger)(TrainLogEvent::Position(update));
        let world = &mut sim.world;
        let scheduler = &mut sim.scheduler;
        world.trains[self.id].position.set(scheduler, update);
    }

    fn publish_telemetry(&mut self, sim: &mut Sim) {
        if self.program.is_none() {
            return;
        }
        let now = *sim.time();
        if now + 1e-9 < self.next_telemetry {
            return;
        }
        self.next_telemetry = now + TICK * TELEMETRY_TICKS as f64;
        self.publish_position(sim);
    }

    fn wait_set(&mut self, sim: &mut Sim) -> ProcessState {
        let mut events: SmallVec<[EventId; 4]> = SmallVec::new();
        events.push(self.inbox.event());
        if let Some(ref p) = self.program {
            match p.exec {
                ExecState::AwaitReservation {
                    guard: GuardState::Armed { deadline },
                    ..
                } => {
                    if !sim.has_fired(deadline) {
                        events.push(deadline);
                    }
                }
                ExecState::AwaitStopTrigger { deadline, .. }
                | ExecState::AwaitStopped { deadline, .. } => {
                    events.push(deadline);
                }
                _ => {}
            }
        }
        let ticking = self.program.is_some() && !self.physics.at_rest();
        if ticking {
            let timer = match self.tick_timer {
                Some(t) if !sim.has_fired(t) => t,
                _ => {
                    let t = sim.create_timeout(TICK);
                    self.tick_timer = Some(t);
                    t
                }
            };
            events.push(timer);
        }
        ProcessState::Wait(events)
    }

    fn fail(&mut self, sim: &mut Sim, fault: failure::Error) -> ProcessState {
        debug!("train {}: fatal: {}", self.id, fault);
        (self.logger)(TrainLogEvent::Exception(format!("{}", fault)));
        self.outbox.send(&mut sim.scheduler, TrainMsg::Exception(fault));
        self.dead = true;
        ProcessState::Finished
    }
}

impl Process<Yard> for TrainAgent {
    fn resume(&mut self, sim: &mut Sim) -> ProcessState {
        if self.dead {
            return ProcessState::Finished;
        }
        self.integrate(sim);
        while let Some(msg) = self.inbox.try_recv() {
            if let Err(e) = self.handle_message(sim, msg) {
                return self.fail(sim, e);
            }
        }
        if let Err(e) = self.execute(sim) {
            return self.fail(sim, e);
        }
        self.publish_telemetry(sim);
        self.wait_set(sim)
    }
}

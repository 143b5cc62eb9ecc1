use crate::output::history::{DispatchLogEvent, TrainLogEvent};
use crate::track::graph::{NodeId, Track, TrackBuilder};
use crate::track::path::find_path;
use crate::train::kinematics::TrainDirection;
use crate::Conductor;

// A -> B -> C -> D, 50 units each.
fn corridor(n: usize) -> (Track, Vec<NodeId>) {
    let names = ["A", "B", "C", "D"];
    let mut b = TrackBuilder::new();
    let ids: Vec<NodeId> = names[..n].iter().map(|x| b.add_node(x).unwrap()).collect();
    for w in ids.windows(2) {
        b.connect(w[0], w[1], 50).unwrap();
    }
    (b.build(), ids)
}

// A -> B (100), A ~> C (50), B -> C (50), C -> D (50), D -> A (50).
fn square() -> (Track, [NodeId; 4]) {
    let mut b = TrackBuilder::new();
    let a = b.add_node("A").unwrap();
    let bb = b.add_node("B").unwrap();
    let c = b.add_node("C").unwrap();
    let d = b.add_node("D").unwrap();
    b.connect_branch(a, bb, 100, c, 50).unwrap();
    b.connect(bb, c, 50).unwrap();
    b.connect(c, d, 50).unwrap();
    b.connect(d, a, 50).unwrap();
    (b.build(), [a, bb, c, d])
}

// P feeds a junction N which branches straight to M and curved to O.
// Reaching O from M means backing out to N and flipping forward.
fn turnback() -> (Track, [NodeId; 4]) {
    let mut b = TrackBuilder::new();
    let m = b.add_node("M").unwrap();
    let n = b.add_node("N").unwrap();
    let o = b.add_node("O").unwrap();
    let p = b.add_node("P").unwrap();
    b.connect(p, n, 60).unwrap();
    b.connect_branch(n, m, 50, o, 50).unwrap();
    (b.build(), [m, n, o, p])
}

fn dispatch_subsequence(log: &[DispatchLogEvent], expected: &[DispatchLogEvent]) -> bool {
    let mut it = log.iter();
    expected.iter().all(|want| it.any(|ev| ev == want))
}

#[test]
fn straight_line_run() {
    let (track, ids) = corridor(4);
    let (a, b, c, d) = (ids[0], ids[1], ids[2], ids[3]);
    let e_ab = track.nodes[a].forward.straight.unwrap();
    let e_bc = track.nodes[b].forward.straight.unwrap();
    let e_cd = track.nodes[c].forward.straight.unwrap();

    let mut conductor = Conductor::new(track);
    let t = conductor
        .spawn_train("local", a, TrainDirection::Forward, Default::default())
        .unwrap();
    conductor.navigate_to(t, c);

    conductor.advance_by(1.0);
    assert_eq!(conductor.reservations(t), vec![e_ab, e_bc]);
    assert_eq!(conductor.reserved_by(e_ab), Some(t));
    assert_eq!(conductor.destination(t), Some(c));

    conductor.run();
    assert!(!conductor.halted());

    // 5 s accelerating, 5 s cruising, 5 s braking.
    assert!((conductor.time() - 15.0).abs() < 0.1, "t = {}", conductor.time());

    let pos = conductor.position(t);
    assert_eq!(pos.node, c);
    assert_eq!(pos.offset, 0.0);
    assert_eq!(pos.velocity, 0.0);
    assert_eq!(pos.edge, Some(e_cd));
    assert_eq!(conductor.destination(t), None);

    // Everything was released behind the train, in acquisition order.
    assert!(conductor.reservations(t).is_empty());
    assert_eq!(conductor.reserved_by(e_ab), None);
    assert_eq!(conductor.reserved_by(e_bc), None);

    let history = conductor.history();
    let events = &history.trains[t].1;
    let reserved: Vec<_> = events
        .iter()
        .filter_map(|ev| match ev {
            TrainLogEvent::Reserved(e) => Some(*e),
            _ => None,
        })
        .collect();
    let released: Vec<_> = events
        .iter()
        .filter_map(|ev| match ev {
            TrainLogEvent::Released(e) => Some(*e),
            _ => None,
        })
        .collect();
    assert_eq!(reserved, vec![e_ab, e_bc]);
    assert_eq!(released, vec![e_ab, e_bc]);
    assert!(events.contains(&TrainLogEvent::StoppedAt(c)));
    assert!(events.contains(&TrainLogEvent::NavigationCompleted(c)));

    // 10 Hz position telemetry over a 15 s run.
    let positions: Vec<_> = events
        .iter()
        .filter_map(|ev| match ev {
            TrainLogEvent::Position(p) => Some(*p),
            _ => None,
        })
        .collect();
    assert!(
        positions.len() >= 140 && positions.len() <= 165,
        "{} position updates",
        positions.len()
    );
    assert!(positions.iter().all(|p| p.velocity.abs() <= 10.0 + 1e-9));
    let _ = d;
}

#[test]
fn navigating_to_the_current_node_completes_immediately() {
    let (track, ids) = corridor(3);
    let mut conductor = Conductor::new(track);
    let t = conductor
        .spawn_train("idle", ids[0], TrainDirection::Forward, Default::default())
        .unwrap();
    conductor.navigate_to(t, ids[0]);
    conductor.run();
    assert!(!conductor.halted());
    assert_eq!(conductor.time(), 0.0);
    assert!(conductor.reservations(t).is_empty());
    let history = conductor.history();
    assert!(history.trains[t]
        .1
        .contains(&TrainLogEvent::NavigationCompleted(ids[0])));
}

#[test]
fn square_shortcut_runs_in_reverse() {
    let (track, [a, _, _, d]) = square();
    assert_eq!(find_path(&track, a, d, true).unwrap(), vec![a, d]);

    let mut conductor = Conductor::new(track);
    let t = conductor
        .spawn_train("shunter", a, TrainDirection::Forward, Default::default())
        .unwrap();
    conductor.navigate_to(t, d);
    conductor.run();
    assert!(!conductor.halted());

    let pos = conductor.position(t);
    assert_eq!(pos.node, d);
    assert_eq!(pos.direction, TrainDirection::Backward);
    assert!((conductor.time() - 10.0).abs() < 0.1);

    let history = conductor.history();
    assert!(history.trains[t]
        .1
        .contains(&TrainLogEvent::DirectionChanged(TrainDirection::Backward)));
}

#[test]
fn turnback_reverses_out_and_takes_the_curve() {
    let (track, [m, n, o, _]) = turnback();
    let mut conductor = Conductor::new(track);
    let t = conductor
        .spawn_train("pilot", m, TrainDirection::Forward, Default::default())
        .unwrap();
    conductor.navigate_to(t, o);
    conductor.run();
    assert!(!conductor.halted(), "fault: {:?}", conductor.fault().map(|f| f.to_string()));

    let pos = conductor.position(t);
    assert_eq!(pos.node, o);
    assert_eq!(pos.direction, TrainDirection::Forward);
    assert!((conductor.time() - 20.0).abs() < 0.1, "t = {}", conductor.time());

    let history = conductor.history();
    let events = &history.trains[t].1;
    let flips: Vec<_> = events
        .iter()
        .filter_map(|ev| match ev {
            TrainLogEvent::DirectionChanged(d) => Some(*d),
            _ => None,
        })
        .collect();
    assert_eq!(
        flips,
        vec![TrainDirection::Backward, TrainDirection::Forward]
    );
    let stops: Vec<_> = events
        .iter()
        .filter_map(|ev| match ev {
            TrainLogEvent::StoppedAt(x) => Some(*x),
            _ => None,
        })
        .collect();
    assert_eq!(stops, vec![n, o]);
}

#[test]
fn late_grant_triggers_the_guard_stop_and_resumes() {
    let (track, ids) = corridor(4);
    let (a, b, c, d) = (ids[0], ids[1], ids[2], ids[3]);
    let e_bc = track.nodes[b].forward.straight.unwrap();

    let mut conductor = Conductor::new(track);
    let freight = conductor
        .spawn_train("freight", b, TrainDirection::Forward, Default::default())
        .unwrap();
    let express = conductor
        .spawn_train("express", a, TrainDirection::Forward, Default::default())
        .unwrap();
    conductor.navigate_to(freight, d);
    conductor.navigate_to(express, c);
    conductor.run();
    assert!(!conductor.halted());

    // The freight holds B->C until it rolls past C at t = 7.5; by then
    // the express has been braking since t = 5 and restarts mid-edge.
    assert_eq!(conductor.position(express).node, c);
    assert_eq!(conductor.position(freight).node, d);
    assert!((conductor.time() - 16.25).abs() < 0.1, "t = {}", conductor.time());

    let history = conductor.history();
    let express_events = &history.trains[express].1;
    assert!(express_events.contains(&TrainLogEvent::GuardStop(e_bc)));
    assert!(express_events.contains(&TrainLogEvent::Resumed(e_bc)));
    assert!(dispatch_subsequence(
        &history.dispatch,
        &[
            DispatchLogEvent::Granted {
                train: freight,
                edge: e_bc
            },
            DispatchLogEvent::Queued {
                train: express,
                edge: e_bc
            },
            DispatchLogEvent::Transferred {
                train: express,
                edge: e_bc
            },
        ]
    ));
}

#[test]
fn contended_edge_is_granted_in_request_order() {
    let (track, ids) = corridor(4);
    let (a, b, c) = (ids[0], ids[1], ids[2]);
    let e_ab = track.nodes[a].forward.straight.unwrap();

    let mut conductor = Conductor::new(track);
    // Spawn order is the opposite of request order.
    let second = conductor
        .spawn_train("second", a, TrainDirection::Forward, Default::default())
        .unwrap();
    let first = conductor
        .spawn_train("first", a, TrainDirection::Forward, Default::default())
        .unwrap();

    conductor.navigate_to(first, c);
    conductor.advance_by(0.1);
    conductor.navigate_to(second, b);

    conductor.advance_by(1.0);
    assert_eq!(conductor.reserved_by(e_ab), Some(first));

    conductor.advance_by(7.0); // "first" clears A->B at t = 7.5
    assert_eq!(conductor.reserved_by(e_ab), Some(second));

    conductor.run();
    assert!(!conductor.halted());
    assert_eq!(conductor.position(first).node, c);
    assert_eq!(conductor.position(second).node, b);
    assert_eq!(conductor.reserved_by(e_ab), None);

    let history = conductor.history();
    assert!(dispatch_subsequence(
        &history.dispatch,
        &[
            DispatchLogEvent::Granted {
                train: first,
                edge: e_ab
            },
            DispatchLogEvent::Queued {
                train: second,
                edge: e_ab
            },
            DispatchLogEvent::Transferred {
                train: second,
                edge: e_ab
            },
        ]
    ));
}

#[test]
fn head_on_collision_course_is_detected_as_deadlock() {
    let (track, ids) = corridor(3);
    let (a, _, c) = (ids[0], ids[1], ids[2]);

    let mut conductor = Conductor::new(track);
    let east = conductor
        .spawn_train("east", a, TrainDirection::Forward, Default::default())
        .unwrap();
    let west = conductor
        .spawn_train("west", c, TrainDirection::Forward, Default::default())
        .unwrap();
    conductor.navigate_to(east, c);
    conductor.navigate_to(west, a);
    conductor.run();

    assert!(conductor.halted());
    let fault = format!("{}", conductor.fault().unwrap());
    assert!(fault.contains("deadlock"), "fault: {}", fault);

    let deadlock = conductor
        .history()
        .dispatch
        .iter()
        .find_map(|ev| match ev {
            DispatchLogEvent::Deadlock { trains } => Some(trains.clone()),
            _ => None,
        })
        .unwrap();
    let mut trains = deadlock;
    trains.sort();
    assert_eq!(trains, vec![east, west]);

    // Lifting the pause lets both trains guard-stop at the midpoint
    // node; releasing behind themselves unblocks the queues and both
    // journeys finish.
    conductor.resume_the_world();
    conductor.run();
    assert!(!conductor.halted());
    assert_eq!(conductor.position(east).node, c);
    assert_eq!(conductor.position(west).node, a);
}

#[test]
fn unreachable_destination_is_fatal_and_stops_the_world() {
    let mut b = TrackBuilder::new();
    let a = b.add_node("A").unwrap();
    let x = b.add_node("X").unwrap();
    let island = b.add_node("ISLAND").unwrap();
    b.connect(a, x, 50).unwrap();
    let track = b.build();

    let mut conductor = Conductor::new(track);
    let t = conductor
        .spawn_train("lost", a, TrainDirection::Forward, Default::default())
        .unwrap();
    conductor.navigate_to(t, island);
    conductor.run();

    assert!(conductor.halted());
    let fault = format!("{}", conductor.fault().unwrap());
    assert!(fault.contains("no path"), "fault: {}", fault);
    let history = conductor.history();
    assert!(history.trains[t].1.iter().any(|ev| match ev {
        TrainLogEvent::Exception(_) => true,
        _ => false,
    }));
}

#[test]
fn spawn_validation() {
    let (track, ids) = corridor(3);
    let mut conductor = Conductor::new(track);
    conductor
        .spawn_train("solo", ids[0], TrainDirection::Forward, Default::default())
        .unwrap();
    assert!(conductor
        .spawn_train("solo", ids[1], TrainDirection::Forward, Default::default())
        .is_err());

    let lopsided = crate::train::kinematics::TrainParams {
        max_acc: 2.0,
        max_brk: 3.0,
        max_vel: 10.0,
    };
    assert!(conductor
        .spawn_train("lopsided", ids[1], TrainDirection::Forward, lopsided)
        .is_err());
    assert_eq!(conductor.train_id("solo"), Some(0));
    assert_eq!(conductor.train_id("lopsided"), None);
}

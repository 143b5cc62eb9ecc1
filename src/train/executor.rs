use crate::eventsim::EventId;
use crate::track::graph::{EdgeId, NodeId};
use crate::train::kinematics::TrainParams;

/// The two nested deadlines of a scheduled stop: when to start braking,
/// and how long the braking takes.
#[derive(Copy, Clone, Debug)]
pub struct StopTiming {
    pub time_to_trigger: f64,
    pub time_to_stop: f64,
}

impl StopTiming {
    /// Plans a stop after `distance` units, starting from the current
    /// velocity `v0`. The profile accelerates (capped at max speed),
    /// optionally cruises, and brakes to a standstill exactly at the
    /// target. Assumes symmetric acceleration and braking rates; from a
    /// standstill the short-distance case reduces to
    /// `sqrt(distance / a)` and the long-distance case to
    /// `time_to_max_speed + remainder / max_vel`.
    pub fn plan(v0: f64, distance: f64, params: &TrainParams) -> StopTiming {
        let a = params.max_acc;
        let b = params.max_brk;
        let vmax = params.max_vel;

        if distance <= 0.0 {
            return StopTiming {
                time_to_trigger: 0.0,
                time_to_stop: v0 / b,
            };
        }

        // Peak velocity if the train accelerates and then immediately
        // brakes, meeting the target exactly.
        let peak_sq = a * distance + v0 * v0 / 2.0;
        if peak_sq <= vmax * vmax {
            let peak = peak_sq.sqrt();
            if peak <= v0 {
                // Already too fast to do anything but brake.
                return StopTiming {
                    time_to_trigger: 0.0,
                    time_to_stop: v0 / b,
                };
            }
            StopTiming {
                time_to_trigger: (peak - v0) / a,
                time_to_stop: peak / b,
            }
        } else {
            let accel_distance = (vmax * vmax - v0 * v0) / (2.0 * a);
            let brake_distance = params.max_stopping_distance();
            let cruise = distance - accel_distance - brake_distance;
            StopTiming {
                time_to_trigger: (vmax - v0) / a + cruise / vmax,
                time_to_stop: vmax / b,
            }
        }
    }
}

/// Where the agent's program interpreter is suspended.
#[derive(Copy, Clone, Debug)]
pub enum ExecState {
    /// Ready to execute the next program event.
    Idle,
    /// A reservation request is outstanding at dispatch.
    AwaitReservation { edge: EdgeId, guard: GuardState },
    /// A stop is scheduled; waiting for the braking deadline.
    AwaitStopTrigger {
        deadline: EventId,
        destination: NodeId,
        total: f64,
    },
    /// Braking; waiting to come to a standstill.
    AwaitStopped {
        deadline: EventId,
        destination: NodeId,
        total: f64,
    },
}

/// The cancellable safety stop armed while a reservation is pending:
/// if the confirmation does not arrive in time, the train brakes to a
/// halt just short of the unreserved element.
#[derive(Copy, Clone, Debug)]
pub enum GuardState {
    Inactive,
    Armed { deadline: EventId },
    Triggered,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_stop_is_triangular() {
        let params: TrainParams = Default::default();
        let t = StopTiming::plan(0.0, 16.0, &params);
        let expected = (16.0f64 / 2.0).sqrt();
        assert!((t.time_to_trigger - expected).abs() < 1e-9);
        assert!((t.time_to_stop - expected).abs() < 1e-9);
    }

    #[test]
    fn long_stop_cruises_at_max_speed() {
        let params: TrainParams = Default::default();
        let t = StopTiming::plan(0.0, 100.0, &params);
        assert!((t.time_to_trigger - 10.0).abs() < 1e-9);
        assert!((t.time_to_stop - 5.0).abs() < 1e-9);
    }

    #[test]
    fn boundary_distance_agrees_between_profiles() {
        // Fifty units is exactly accelerate-then-brake with no cruise.
        let params: TrainParams = Default::default();
        let t = StopTiming::plan(0.0, 50.0, &params);
        assert!((t.time_to_trigger - 5.0).abs() < 1e-9);
        assert!((t.time_to_stop - 5.0).abs() < 1e-9);
    }

    #[test]
    fn at_full_speed_with_only_braking_room() {
        let params: TrainParams = Default::default();
        let t = StopTiming::plan(10.0, 25.0, &params);
        assert!(t.time_to_trigger.abs() < 1e-9);
        assert!((t.time_to_stop - 5.0).abs() < 1e-9);
    }

    #[test]
    fn replanning_mid_segment_matches_the_remaining_distance() {
        // Restarted from rest mid-segment: same laws, shorter distance.
        let params: TrainParams = Default::default();
        let full = StopTiming::plan(0.0, 56.25, &params);
        let accel_d = 25.0;
        let brake_d = 25.0;
        let cruise = 56.25 - accel_d - brake_d;
        assert!((full.time_to_trigger - (5.0 + cruise / 10.0)).abs() < 1e-9);
    }
}

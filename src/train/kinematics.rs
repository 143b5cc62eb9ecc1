use failure::Fail;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TrainDirection {
    Forward,
    Backward,
}

impl TrainDirection {
    pub fn coefficient(self) -> f64 {
        match self {
            TrainDirection::Forward => 1.0,
            TrainDirection::Backward => -1.0,
        }
    }

    pub fn inverted(self) -> TrainDirection {
        match self {
            TrainDirection::Forward => TrainDirection::Backward,
            TrainDirection::Backward => TrainDirection::Forward,
        }
    }
}

#[derive(Copy, Clone, Debug)]
pub struct TrainParams {
    pub max_acc: f64,
    pub max_brk: f64,
    pub max_vel: f64,
}

impl Default for TrainParams {
    fn default() -> TrainParams {
        TrainParams {
            max_acc: 2.0,
            max_brk: 2.0,
            max_vel: 10.0,
        }
    }
}

impl TrainParams {
    pub fn max_stopping_distance(&self) -> f64 {
        self.max_vel * self.max_vel / (2.0 * self.max_brk)
    }

    pub fn distance_accelerating_from_stop(&self) -> f64 {
        self.max_vel * self.max_vel / (2.0 * self.max_acc)
    }

    pub fn time_to_max_speed(&self) -> f64 {
        self.max_vel / self.max_acc
    }

    /// Stop scheduling assumes acceleration and braking rates agree.
    pub fn symmetric(&self) -> bool {
        (self.max_acc - self.max_brk).abs() < 1e-9
    }
}

#[derive(Debug, Fail)]
pub enum PhysicsError {
    #[fail(display = "force stop at speed {}", speed)]
    ForceStopWhileMoving { speed: f64 },
}

/// Scalar speed under bounded acceleration and deceleration. Speed is
/// nonnegative; the signed velocity is speed times the direction
/// coefficient. Direction flips only at speed zero.
#[derive(Copy, Clone, Debug)]
pub struct TrainPhysics {
    pub params: TrainParams,
    pub direction: TrainDirection,
    pub speed: f64,
    pub stopping: bool,
    pub changing_direction: bool,
}

impl TrainPhysics {
    pub fn new(params: TrainParams, direction: TrainDirection) -> TrainPhysics {
        TrainPhysics {
            params: params,
            direction: direction,
            speed: 0.0,
            stopping: true,
            changing_direction: false,
        }
    }

    /// Advances by `dt` seconds and returns the distance travelled.
    pub fn update(&mut self, dt: f64) -> f64 {
        if self.changing_direction && self.speed == 0.0 {
            self.direction = self.direction.inverted();
            self.changing_direction = false;
            self.stopping = false;
        }
        if self.stopping {
            self.decelerate(dt)
        } else {
            self.accelerate(dt)
        }
    }

    fn accelerate(&mut self, dt: f64) -> f64 {
        let v0 = self.speed;
        let a = self.params.max_acc;
        let vmax = self.params.max_vel;
        if v0 + a * dt <= vmax {
            self.speed = v0 + a * dt;
            v0 * dt + 0.5 * a * dt * dt
        } else {
            let t1 = (vmax - v0) / a;
            self.speed = vmax;
            v0 * t1 + 0.5 * a * t1 * t1 + vmax * (dt - t1)
        }
    }

    fn decelerate(&mut self, dt: f64) -> f64 {
        let v0 = self.speed;
        let b = self.params.max_brk;
        if v0 - b * dt >= 0.0 {
            self.speed = v0 - b * dt;
            v0 * dt - 0.5 * b * dt * dt
        } else {
            let t1 = v0 / b;
            self.speed = 0.0;
            v0 * t1 - 0.5 * b * t1 * t1
        }
    }

    pub fn velocity(&self) -> f64 {
        self.speed * self.direction.coefficient()
    }

    pub fn at_rest(&self) -> bool {
        self.speed == 0.0 && self.stopping && !self.changing_direction
    }

    pub fn start(&mut self) {
        self.stopping = false;
    }

    pub fn stop(&mut self) {
        self.stopping = true;
    }

    /// Flips immediately when stopped, otherwise brakes first and flips
    /// on the update that sees speed zero.
    pub fn change_direction(&mut self) {
        if self.speed == 0.0 {
            self.direction = self.direction.inverted();
        } else {
            self.stopping = true;
            self.changing_direction = true;
        }
    }

    /// Hard-zeroes the speed at the end of a scheduled stop. Anything
    /// but a residual crawl means the schedule and the physics diverged.
    pub fn force_stop(&mut self) -> Result<(), PhysicsError> {
        if self.speed >= 0.1 {
            return Err(PhysicsError::ForceStopWhileMoving { speed: self.speed });
        }
        self.speed = 0.0;
        self.stopping = true;
        Ok(())
    }
}

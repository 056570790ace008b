//! Telemetry sinks.
//!
//! The controller hands every sink one frame per tick. Nothing in the control
//! path reads telemetry back.

use parking_lot::RwLock;
use std::sync::Arc;

use swerve_kinematics::{ChassisSpeeds, ModuleState, Pose};

use crate::bus::Topic;

/// Everything published about the chassis for one tick.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TelemetryFrame {
    /// Controller time (s).
    pub timestamp: f64,
    /// Fused pose estimate.
    pub pose: Pose,
    /// Measured module states, FL, FR, BL, BR.
    pub module_states: [ModuleState; 4],
    /// Commanded module states, FL, FR, BL, BR.
    pub module_targets: [ModuleState; 4],
    /// Chassis velocity from forward kinematics on the measured states.
    pub chassis_speeds: ChassisSpeeds,
    /// Whether the modules are held in the X pattern.
    pub locked: bool,
}

/// Receives one frame per controller tick.
pub trait TelemetrySink: Send {
    fn publish(&mut self, frame: &TelemetryFrame);
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl TelemetrySink for NullSink {
    fn publish(&mut self, _frame: &TelemetryFrame) {}
}

/// Forwards frames onto a broadcast [`Topic`].
#[derive(Debug, Clone)]
pub struct TopicSink {
    topic: Topic<TelemetryFrame>,
}

impl TopicSink {
    pub fn new(topic: Topic<TelemetryFrame>) -> Self {
        Self { topic }
    }
}

impl TelemetrySink for TopicSink {
    fn publish(&mut self, frame: &TelemetryFrame) {
        self.topic.publish(*frame);
    }
}

/// Most recent frame, shared with readers on other threads.
pub type Blackboard = Arc<RwLock<TelemetryFrame>>;

/// Copy of the latest frame. Readers never see a half-written frame.
pub fn snapshot(bb: &Blackboard) -> TelemetryFrame {
    *bb.read()
}

/// Overwrites a [`Blackboard`] with every frame.
#[derive(Debug, Clone, Default)]
pub struct SnapshotSink {
    board: Blackboard,
}

impl SnapshotSink {
    pub fn new(board: Blackboard) -> Self {
        Self { board }
    }

    pub fn board(&self) -> Blackboard {
        Arc::clone(&self.board)
    }
}

impl TelemetrySink for SnapshotSink {
    fn publish(&mut self, frame: &TelemetryFrame) {
        *self.board.write() = *frame;
    }
}

/// Fans each frame out to several sinks.
impl TelemetrySink for Vec<Box<dyn TelemetrySink>> {
    fn publish(&mut self, frame: &TelemetryFrame) {
        for sink in self.iter_mut() {
            sink.publish(frame);
        }
    }
}

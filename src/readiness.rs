// ===============================
// src/readiness.rs
// ===============================
use serde::Serialize;
use tracing::info;

/// Independent readiness flags. Everything starts false and is reset to false
/// at the beginning of every (re)connection attempt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReadinessState {
    pub ws_connected: bool,
    pub snapshot_loaded: bool,
    pub depth_stream_ready: bool,
    pub account_stream_ready: bool,
    pub position_stream_ready: bool,
    pub circuit_broken: bool,
    pub heartbeat_lost: bool,
}

impl ReadinessState {
    /// All required streams are up.
    pub fn streams_ready(&self) -> bool {
        self.ws_connected
            && self.snapshot_loaded
            && self.depth_stream_ready
            && self.account_stream_ready
            && self.position_stream_ready
    }

    pub fn ready(&self) -> bool {
        self.streams_ready() && !self.circuit_broken && !self.heartbeat_lost
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flag {
    WsConnected,
    SnapshotLoaded,
    DepthStream,
    AccountStream,
    PositionStream,
    CircuitBroken,
    HeartbeatLost,
}

/// Aggregates the flags into the single trading gate.
#[derive(Debug, Default)]
pub struct ReadinessTracker {
    state: ReadinessState,
}

impl ReadinessTracker {
    pub fn new() -> Self { Self::default() }

    pub fn state(&self) -> ReadinessState { self.state }

    pub fn ready(&self) -> bool { self.state.ready() }

    pub fn not_ready(&self) -> bool { !self.state.ready() }

    /// Every flag back to false, breaker included.
    pub fn reset(&mut self) {
        self.state = ReadinessState::default();
    }

    /// Returns true when this write flipped the aggregate gate.
    pub fn set(&mut self, flag: Flag, value: bool) -> bool {
        let before = self.state.ready();
        let s = &mut self.state;
        match flag {
            Flag::WsConnected => s.ws_connected = value,
            Flag::SnapshotLoaded => s.snapshot_loaded = value,
            Flag::DepthStream => s.depth_stream_ready = value,
            Flag::AccountStream => s.account_stream_ready = value,
            Flag::PositionStream => s.position_stream_ready = value,
            Flag::CircuitBroken => s.circuit_broken = value,
            Flag::HeartbeatLost => s.heartbeat_lost = value,
        }
        let after = self.state.ready();
        if before != after {
            info!(ready = after, ?flag, "readiness changed");
        }
        before != after
    }
}

//! Translation of remote control outcomes into client events.

use serde::Deserialize;

use crate::protocol::Event;

/// The single thread of execution the engine models.
pub const THREAD_ID: i64 = 1;

/// Why execution stopped, as reported by the engine. Reasons outside the
/// known set land in `Other` so translation can normalize them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StopReason {
    Entry,
    Step,
    Breakpoint,
    Pause,
    Terminated,
    #[serde(other)]
    Other,
}

impl StopReason {
    /// Clients only understand the fixed stopped-reason set; anything else
    /// is presented as a pause.
    fn normalized(self) -> &'static str {
        match self {
            StopReason::Entry => "entry",
            StopReason::Step => "step",
            StopReason::Breakpoint => "breakpoint",
            StopReason::Pause | StopReason::Terminated | StopReason::Other => "pause",
        }
    }
}

/// Result shape of every stepping/continuation call.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlOutcome {
    pub line: i64,
    pub stop_reason: StopReason,
    pub terminated: bool,
}

/// Map a control outcome to the single event it produces: `terminated` when
/// execution is over, otherwise `stopped` with a normalized reason.
pub fn translate(outcome: &ControlOutcome) -> Event {
    if outcome.terminated || outcome.stop_reason == StopReason::Terminated {
        Event::Terminated
    } else {
        Event::Stopped {
            reason: outcome.stop_reason.normalized(),
            thread_id: THREAD_ID,
        }
    }
}

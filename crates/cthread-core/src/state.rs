//! Controller state, cycle-wait mode and yield-point result types

use core::fmt;
use core::str::FromStr;

/// Lifecycle state of a managed thread
///
/// The machine is monotone toward termination: once `Exiting` has been
/// observed, only `Exiting` and `Exited` can follow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum State {
    /// Controller constructed, thread not started
    Invalid = 0,

    /// Thread spawned, first yield point not reached yet
    Init = 1,

    /// Parked inside the yield point, waiting to be told to run
    Idle = 2,

    /// Actively cycling
    Go = 3,

    /// Stop has been signalled, the user function is unwinding
    Exiting = 4,

    /// User function returned
    Exited = 5,
}

impl State {
    /// Number of state values, including `Invalid`
    pub const COUNT: usize = 6;

    /// All states in declaration order
    pub const ALL: [State; State::COUNT] = [
        State::Invalid,
        State::Init,
        State::Idle,
        State::Go,
        State::Exiting,
        State::Exited,
    ];

    /// Dense index, usable for per-state tables
    #[inline]
    pub const fn as_index(&self) -> usize {
        *self as usize
    }

    /// `Exiting` or `Exited`
    #[inline]
    pub const fn is_terminating(&self) -> bool {
        matches!(self, State::Exiting | State::Exited)
    }

    /// Whether the state may be passed to a state request
    #[inline]
    pub const fn is_requestable(&self) -> bool {
        matches!(self, State::Idle | State::Go | State::Exiting)
    }

    /// Human readable name used in diagnostics
    pub const fn name(&self) -> &'static str {
        match self {
            State::Invalid => "Invalid",
            State::Init => "Initializing",
            State::Idle => "Idle",
            State::Go => "Run",
            State::Exiting => "Exiting",
            State::Exited => "Exited",
        }
    }
}

impl Default for State {
    fn default() -> Self {
        State::Invalid
    }
}

impl From<u8> for State {
    fn from(v: u8) -> Self {
        match v {
            1 => State::Init,
            2 => State::Idle,
            3 => State::Go,
            4 => State::Exiting,
            5 => State::Exited,
            _ => State::Invalid,
        }
    }
}

impl From<State> for u8 {
    fn from(state: State) -> u8 {
        state as u8
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How the yield point sleeps between cycles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CycleWaitMode {
    /// Period measured from the start of the previous cycle body (fixed cadence)
    #[default]
    Absolute,

    /// Flat sleep of one period after every cycle
    Relative,

    /// Never times out; a cycle only advances when the thread is woken
    Indefinite,
}

impl CycleWaitMode {
    pub const fn name(&self) -> &'static str {
        match self {
            CycleWaitMode::Absolute => "Absolute",
            CycleWaitMode::Relative => "Relative",
            CycleWaitMode::Indefinite => "Indefinite",
        }
    }
}

impl fmt::Display for CycleWaitMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error returned when a cycle-wait mode string is not recognised
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseCycleWaitModeError(pub String);

impl fmt::Display for ParseCycleWaitModeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown cycle wait mode '{}'", self.0)
    }
}

impl std::error::Error for ParseCycleWaitModeError {}

impl FromStr for CycleWaitMode {
    type Err = ParseCycleWaitModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "absolute" | "abs" => Ok(CycleWaitMode::Absolute),
            "relative" | "rel" => Ok(CycleWaitMode::Relative),
            "indefinite" | "none" => Ok(CycleWaitMode::Indefinite),
            _ => Err(ParseCycleWaitModeError(s.to_string())),
        }
    }
}

/// Verdict of a yield point
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcStateResult {
    /// Run the cycle body and call the yield point again
    Continue,

    /// Return from the thread function now
    Stop,
}

impl ProcStateResult {
    #[inline]
    pub const fn is_continue(&self) -> bool {
        matches!(self, ProcStateResult::Continue)
    }
}

/// A state change as seen by listeners
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateTransition {
    pub from: State,
    pub to: State,
}

impl fmt::Display for StateTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.from, self.to)
    }
}

//! Transfer sequence state machine.
//!
//! A plan is downloaded and uploaded one section at a time, always in the
//! order mission, geofence, rally points. A [`Sequence`] tracks which
//! section's completion it is waiting for and decides what happens when a
//! completion arrives.

use std::fmt;

use crate::section::SectionKind;
use crate::vehicle::TransferDirection;

/// Section whose completion a sequence is waiting for.
///
/// Valid transition graph:
///
/// ```text
/// idle         -> mission       (sequence started)
/// mission      -> geofence
/// geofence     -> rally_points
/// rally_points -> idle          (sequence finished)
/// *            -> idle          (reset on vehicle change)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Stage {
    #[default]
    Idle,
    Mission,
    GeoFence,
    RallyPoints,
}

impl Stage {
    /// The stage waiting on `section`.
    pub fn awaiting(section: SectionKind) -> Self {
        match section {
            SectionKind::Mission => Self::Mission,
            SectionKind::GeoFence => Self::GeoFence,
            SectionKind::RallyPoints => Self::RallyPoints,
        }
    }

    /// The section this stage is waiting on, `None` when idle.
    pub fn section(self) -> Option<SectionKind> {
        match self {
            Self::Idle => None,
            Self::Mission => Some(SectionKind::Mission),
            Self::GeoFence => Some(SectionKind::GeoFence),
            Self::RallyPoints => Some(SectionKind::RallyPoints),
        }
    }

    pub fn is_idle(self) -> bool {
        self == Self::Idle
    }

    /// Check whether `from -> to` is an edge of the stage graph.
    pub fn is_valid_transition(from: Stage, to: Stage) -> bool {
        matches!(
            (from, to),
            (Stage::Idle, Stage::Mission)
                | (Stage::Mission, Stage::GeoFence)
                | (Stage::GeoFence, Stage::RallyPoints)
                | (_, Stage::Idle)
        )
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Mission => "mission",
            Self::GeoFence => "geofence",
            Self::RallyPoints => "rally_points",
        };
        f.write_str(s)
    }
}

/// What the caller must do after reporting a completion to a [`Sequence`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageStep {
    /// Start the transfer of this section.
    Request(SectionKind),
    /// The vehicle does not offer this section: handle it locally and report
    /// its completion straight away.
    Skip(SectionKind),
    /// The last section completed; the sequence is idle again.
    Finished,
    /// The completion did not match the awaited stage.
    Ignored,
}

/// One ordered download or upload sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sequence {
    direction: TransferDirection,
    stage: Stage,
}

impl Sequence {
    pub fn new(direction: TransferDirection) -> Self {
        Self {
            direction,
            stage: Stage::Idle,
        }
    }

    pub fn direction(&self) -> TransferDirection {
        self.direction
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn is_active(&self) -> bool {
        !self.stage.is_idle()
    }

    /// Start the sequence. Returns the first section to transfer.
    pub fn begin(&mut self) -> SectionKind {
        self.stage = Stage::Mission;
        SectionKind::Mission
    }

    /// Abandon any sequence in flight.
    pub fn reset(&mut self) {
        self.stage = Stage::Idle;
    }

    /// Report that `completed` finished transferring.
    ///
    /// `supported` is asked whether the vehicle offers the next section.
    /// Completions that do not match the awaited stage leave the sequence
    /// untouched.
    pub fn complete(
        &mut self,
        completed: SectionKind,
        supported: impl FnOnce(SectionKind) -> bool,
    ) -> StageStep {
        if self.stage.section() != Some(completed) {
            return StageStep::Ignored;
        }

        match completed.next() {
            Some(next) => {
                self.stage = Stage::awaiting(next);
                if supported(next) {
                    StageStep::Request(next)
                } else {
                    StageStep::Skip(next)
                }
            }
            None => {
                self.stage = Stage::Idle;
                StageStep::Finished
            }
        }
    }
}

//! Failure injection
//!
//! The two global switches mirror the classic simulator flags: refusing to
//! prepare applies to every participant, stalling after a `Yes` applies only
//! to the sentinel participant. Per-participant overrides take precedence.

use crate::error::{Result, TwoPcError};
use crate::two_phase_commit::ParticipantId;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Participant singled out by `fail_after_one_commit`.
pub const SENTINEL_PARTICIPANT: ParticipantId = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FaultBehavior {
    #[default]
    None,
    /// Vote `No` unconditionally.
    RefuseBeforePrepare,
    /// Vote normally, but block for longer than the coordinator's vote
    /// timeout after a `Yes`.
    StallAfterYes,
}

impl fmt::Display for FaultBehavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FaultBehavior::None => write!(f, "none"),
            FaultBehavior::RefuseBeforePrepare => write!(f, "refuse-before-prepare"),
            FaultBehavior::StallAfterYes => write!(f, "stall-after-yes"),
        }
    }
}

impl FromStr for FaultBehavior {
    type Err = TwoPcError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(FaultBehavior::None),
            "refuse-before-prepare" | "refuse" => Ok(FaultBehavior::RefuseBeforePrepare),
            "stall-after-yes" | "stall" => Ok(FaultBehavior::StallAfterYes),
            other => Err(TwoPcError::InvalidFault(format!(
                "unknown behavior `{}` (expected none, refuse-before-prepare or stall-after-yes)",
                other
            ))),
        }
    }
}

/// One `ID=BEHAVIOR` override as given on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaultOverride {
    pub participant_id: ParticipantId,
    pub behavior: FaultBehavior,
}

impl FromStr for FaultOverride {
    type Err = TwoPcError;

    fn from_str(s: &str) -> Result<Self> {
        let (id, behavior) = s
            .split_once('=')
            .ok_or_else(|| TwoPcError::InvalidFault(format!("`{}` is not ID=BEHAVIOR", s)))?;
        let participant_id = id
            .trim()
            .parse::<ParticipantId>()
            .map_err(|e| TwoPcError::InvalidFault(format!("bad participant id `{}`: {}", id, e)))?;
        Ok(FaultOverride {
            participant_id,
            behavior: behavior.parse()?,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FaultPlan {
    pub fail_before_prepare: bool,
    pub fail_after_one_commit: bool,
    overrides: BTreeMap<ParticipantId, FaultBehavior>,
}

impl FaultPlan {
    pub fn new(fail_before_prepare: bool, fail_after_one_commit: bool) -> Self {
        Self {
            fail_before_prepare,
            fail_after_one_commit,
            overrides: BTreeMap::new(),
        }
    }

    pub fn with_override(mut self, participant_id: ParticipantId, behavior: FaultBehavior) -> Self {
        self.overrides.insert(participant_id, behavior);
        self
    }

    pub fn overrides(&self) -> impl Iterator<Item = (ParticipantId, FaultBehavior)> + '_ {
        self.overrides.iter().map(|(id, b)| (*id, *b))
    }

    pub fn behavior_for(&self, participant_id: ParticipantId) -> FaultBehavior {
        if let Some(behavior) = self.overrides.get(&participant_id) {
            return *behavior;
        }
        if self.fail_before_prepare {
            FaultBehavior::RefuseBeforePrepare
        } else if self.fail_after_one_commit && participant_id == SENTINEL_PARTICIPANT {
            FaultBehavior::StallAfterYes
        } else {
            FaultBehavior::None
        }
    }
}

impl Extend<FaultOverride> for FaultPlan {
    fn extend<T: IntoIterator<Item = FaultOverride>>(&mut self, iter: T) {
        for o in iter {
            self.overrides.insert(o.participant_id, o.behavior);
        }
    }
}

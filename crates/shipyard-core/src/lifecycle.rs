use crate::CoreError;
use serde::Serialize;
use std::fmt;

/// Pipeline stages in the order a release passes through them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReleaseStage {
    Idle,
    CheckingEnvironment,
    ReadingVersion,
    AwaitingConfirmation,
    WritingVersion,
    Cleaning,
    Building,
    ValidatingCredentials,
    Uploading,
    Done,
}

impl ReleaseStage {
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Idle => Some(Self::CheckingEnvironment),
            Self::CheckingEnvironment => Some(Self::ReadingVersion),
            Self::ReadingVersion => Some(Self::AwaitingConfirmation),
            Self::AwaitingConfirmation => Some(Self::WritingVersion),
            Self::WritingVersion => Some(Self::Cleaning),
            Self::Cleaning => Some(Self::Building),
            Self::Building => Some(Self::ValidatingCredentials),
            Self::ValidatingCredentials => Some(Self::Uploading),
            Self::Uploading => Some(Self::Done),
            Self::Done => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::CheckingEnvironment => "checking environment",
            Self::ReadingVersion => "reading version",
            Self::AwaitingConfirmation => "awaiting confirmation",
            Self::WritingVersion => "writing version",
            Self::Cleaning => "cleaning",
            Self::Building => "building",
            Self::ValidatingCredentials => "validating credentials",
            Self::Uploading => "uploading",
            Self::Done => "done",
        }
    }
}

impl fmt::Display for ReleaseStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Only forward moves to the next stage are allowed, plus skipping the
/// confirmation stage.
pub fn validate_transition(from: ReleaseStage, to: ReleaseStage) -> Result<(), CoreError> {
    let valid = from.next() == Some(to)
        || (from, to) == (ReleaseStage::ReadingVersion, ReleaseStage::WritingVersion);

    if valid {
        Ok(())
    } else {
        Err(CoreError::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}

use crate::build::BuildPhase;
use crate::upload::UploadLineKind;

/// Displayable output from a running stage. Noise and unclassified lines never
/// reach a sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressEvent<'a> {
    BuildPhase(BuildPhase),
    BuildOutput(&'a str),
    UploadOutput { kind: UploadLineKind, line: &'a str },
}

pub trait ProgressSink {
    fn event(&mut self, event: ProgressEvent<'_>);
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl ProgressSink for NullSink {
    fn event(&mut self, _event: ProgressEvent<'_>) {}
}

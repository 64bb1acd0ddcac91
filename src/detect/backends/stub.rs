use std::collections::HashMap;

use anyhow::Result;

use crate::detect::backend::DetectorBackend;
use crate::detect::labels::LabelTable;
use crate::detect::result::RawDetection;
use crate::frame::Frame;

/// Scripted backend for tests and dry runs.
///
/// Detections are keyed by call index (the Nth frame handed to `detect`).
/// Calls without a script entry return nothing.
pub struct StubBackend {
    labels: LabelTable,
    script: HashMap<u64, Vec<RawDetection>>,
    calls: u64,
}

impl StubBackend {
    pub fn new() -> Self {
        Self {
            labels: LabelTable::coco(),
            script: HashMap::new(),
            calls: 0,
        }
    }

    pub fn with_labels(mut self, labels: LabelTable) -> Self {
        self.labels = labels;
        self
    }

    /// Return `detections` on the `call`-th invocation (zero-based).
    pub fn on_call(mut self, call: u64, detections: Vec<RawDetection>) -> Self {
        self.script.insert(call, detections);
        self
    }

    /// Number of `detect` invocations so far.
    pub fn calls(&self) -> u64 {
        self.calls
    }
}

impl Default for StubBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl DetectorBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn labels(&self) -> &LabelTable {
        &self.labels
    }

    fn detect(&mut self, _frame: &Frame) -> Result<Vec<RawDetection>> {
        let call = self.calls;
        self.calls += 1;
        Ok(self.script.get(&call).cloned().unwrap_or_default())
    }
}

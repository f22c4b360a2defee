//! Leveled, structured diagnostic events for per-node merge outcomes.
//!
//! The pipeline does not own a global logger. It emits structured events
//! into an injected [`DiagnosticSink`]; how those events reach an operator
//! (a `tracing` subscriber, a test buffer, nothing at all) is the caller's
//! choice. Process-wide subscriber configuration belongs to the binary, not
//! to this crate.

use std::sync::Mutex;

use crate::types::NodeId;

/// Severity of a diagnostic event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Routine per-node detail.
    Debug,
    /// Notable but non-fatal.
    Info,
}

/// Per-node merge outcome. Exactly one of these is produced for every node
/// in the skeleton during a merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    /// A mask was converted and assigned to the node.
    Applied {
        /// Maximum label value found in the mask; useful for sanity-checking
        /// segmentation labels.
        max_label: u8,
    },
    /// The result mapping had no entry for the node.
    Missing,
    /// The entry was the explicit no-data marker.
    Empty,
    /// The payload was present but not convertible to a 3D mask.
    ShapeMismatch {
        /// The offending payload shape.
        shape: Vec<usize>,
    },
}

/// One diagnostic event: which node, which outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosticEvent {
    /// The node the outcome applies to.
    pub node: NodeId,
    /// What happened while merging this node.
    pub outcome: MergeOutcome,
}

impl DiagnosticEvent {
    /// Severity is fixed per outcome: an explicit no-data marker surfaces at
    /// info, everything else at debug.
    #[must_use]
    pub const fn severity(&self) -> Severity {
        match self.outcome {
            MergeOutcome::Empty => Severity::Info,
            MergeOutcome::Applied { .. }
            | MergeOutcome::Missing
            | MergeOutcome::ShapeMismatch { .. } => Severity::Debug,
        }
    }
}

/// Sink accepting leveled, structured events.
///
/// Injected into [`merge_results`](crate::merge::merge_results) and the
/// pipeline runner.
pub trait DiagnosticSink {
    /// Accept one event.
    fn emit(&self, event: DiagnosticEvent);
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl DiagnosticSink for NullSink {
    fn emit(&self, _event: DiagnosticEvent) {}
}

/// Forwards events to the active `tracing` subscriber as human-readable log
/// lines at the event's severity.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn emit(&self, event: DiagnosticEvent) {
        match event.outcome {
            MergeOutcome::Applied { max_label } => {
                tracing::debug!(node = %event.node, max_label, "mask merged onto node");
            }
            MergeOutcome::Missing => {
                tracing::debug!(node = %event.node, "no result entry for node");
            }
            MergeOutcome::Empty => {
                tracing::info!(node = %event.node, "node result was explicitly empty");
            }
            MergeOutcome::ShapeMismatch { ref shape } => {
                tracing::debug!(node = %event.node, ?shape, "node payload was not a 3D mask");
            }
        }
    }
}

/// Records every event in memory.
///
/// Lets tests assert the one-event-per-node-outcome contract; also usable
/// as a capture buffer by embedding callers.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<DiagnosticEvent>>,
}

impl RecordingSink {
    /// Create an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the recorded events, in emission order.
    #[must_use]
    pub fn events(&self) -> Vec<DiagnosticEvent> {
        self.events.lock().map(|guard| guard.clone()).unwrap_or_default()
    }
}

impl DiagnosticSink for RecordingSink {
    fn emit(&self, event: DiagnosticEvent) {
        if let Ok(mut guard) = self.events.lock() {
            guard.push(event);
        }
    }
}

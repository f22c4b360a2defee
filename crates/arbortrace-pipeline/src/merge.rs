//! Merge segmentation results back onto the skeleton.
//!
//! Every node is resolved to exactly one of four outcomes (applied, missing,
//! explicitly empty, shape mismatch), each emitting one diagnostic event.
//! Per-node problems are never fatal: a single bad or missing result must
//! not abort processing of the remaining nodes. Only the counts and the
//! node masks change; the node set itself is untouched.

use crate::diagnostics::{DiagnosticEvent, DiagnosticSink, MergeOutcome};
use crate::skeleton::Skeleton;
use crate::source::SegmentationResults;
use crate::types::{LabelMask, NodeId};

/// Counts of the four per-node merge outcomes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeSummary {
    /// Nodes that received a mask.
    pub applied: usize,
    /// Nodes with no entry in the result mapping.
    pub missing: usize,
    /// Nodes whose entry was the explicit no-data marker.
    pub empty: usize,
    /// Nodes whose payload was not convertible to a 3D mask.
    pub mismatched: usize,
}

impl MergeSummary {
    /// Total nodes processed.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.applied + self.missing + self.empty + self.mismatched
    }

    /// Format the summary as a short human-readable report.
    #[must_use]
    pub fn report(&self) -> String {
        format!(
            "Merged {} nodes: {} masks applied, {} without results, {} explicitly empty, {} shape mismatches",
            self.total(),
            self.applied,
            self.missing,
            self.empty,
            self.mismatched,
        )
    }
}

/// Merge per-node segmentation results into the skeleton.
///
/// Consumes the result mapping (payloads are moved onto the nodes, not
/// copied). For every node currently in the skeleton, in any order — each
/// node's mutation is independent, so order does not affect the result:
///
/// - no entry: the node keeps an unset mask, a debug-severity event is
///   emitted;
/// - entry present but empty: the node keeps an unset mask, an
///   info-severity event is emitted (a distinct kind from the missing-entry
///   case);
/// - entry convertible to a 3D mask: the mask is assigned, a debug event
///   carries the node key and the mask's maximum label;
/// - entry of the wrong dimensionality: downgraded to a debug event, never
///   an error.
///
/// No node is ever added or removed. Entries for ids the skeleton does not
/// contain are ignored.
pub fn merge_results(
    skeleton: &mut Skeleton,
    mut results: SegmentationResults,
    sink: &dyn DiagnosticSink,
) -> MergeSummary {
    let mut summary = MergeSummary::default();
    let ids: Vec<NodeId> = skeleton.node_ids().collect();

    for id in ids {
        let outcome = match results.remove(id) {
            None => {
                summary.missing += 1;
                MergeOutcome::Missing
            }
            Some(None) => {
                summary.empty += 1;
                MergeOutcome::Empty
            }
            Some(Some(payload)) => match LabelMask::from_dyn(payload) {
                Ok(mask) => {
                    let max_label = mask.max_label();
                    skeleton.fill(id, mask);
                    summary.applied += 1;
                    MergeOutcome::Applied { max_label }
                }
                Err(err) => {
                    summary.mismatched += 1;
                    MergeOutcome::ShapeMismatch { shape: err.shape }
                }
            },
        };
        sink.emit(DiagnosticEvent { node: id, outcome });
    }

    summary
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use ndarray::{Array2, Array3};

    use super::*;
    use crate::diagnostics::{NullSink, RecordingSink, Severity};
    use crate::types::NodeRow;

    fn skeleton() -> Skeleton {
        Skeleton::from_rows(&[
            NodeRow::new(NodeId(1), None, 0.0, 0.0, 0.0),
            NodeRow::new(NodeId(2), Some(NodeId(1)), 1.0, 0.0, 0.0),
            NodeRow::new(NodeId(3), Some(NodeId(1)), 0.0, 1.0, 0.0),
        ])
        .unwrap()
    }

    #[test]
    fn all_four_outcomes_resolve_independently() {
        let mut skeleton = Skeleton::from_rows(&[
            NodeRow::new(NodeId(1), None, 0.0, 0.0, 0.0),
            NodeRow::new(NodeId(2), Some(NodeId(1)), 1.0, 0.0, 0.0),
            NodeRow::new(NodeId(3), Some(NodeId(1)), 0.0, 1.0, 0.0),
            NodeRow::new(NodeId(4), Some(NodeId(1)), 0.0, 0.0, 1.0),
        ])
        .unwrap();

        let mut results = SegmentationResults::new();
        results.insert(NodeId(1), Some(Array3::from_elem((1, 1, 1), 5).into_dyn()));
        results.insert(NodeId(2), None);
        results.insert(NodeId(4), Some(Array2::<u8>::zeros((2, 2)).into_dyn()));
        // Node 3 gets no entry at all.

        let sink = RecordingSink::new();
        let summary = merge_results(&mut skeleton, results, &sink);

        assert_eq!(summary.applied, 1);
        assert_eq!(summary.empty, 1);
        assert_eq!(summary.missing, 1);
        assert_eq!(summary.mismatched, 1);
        assert_eq!(summary.total(), 4);

        assert!(skeleton.get(NodeId(1)).unwrap().has_mask());
        assert!(!skeleton.get(NodeId(2)).unwrap().has_mask());
        assert!(!skeleton.get(NodeId(3)).unwrap().has_mask());
        assert!(!skeleton.get(NodeId(4)).unwrap().has_mask());
    }

    #[test]
    fn exactly_one_event_per_node() {
        let mut skeleton = skeleton();
        let mut results = SegmentationResults::new();
        results.insert(NodeId(1), Some(Array3::from_elem((1, 1, 1), 5).into_dyn()));
        results.insert(NodeId(2), None);

        let sink = RecordingSink::new();
        merge_results(&mut skeleton, results, &sink);

        let events = sink.events();
        assert_eq!(events.len(), 3);
        for id in [1, 2, 3] {
            assert_eq!(
                events.iter().filter(|e| e.node == NodeId(id)).count(),
                1,
                "expected one event for node {id}",
            );
        }
    }

    #[test]
    fn applied_event_carries_max_label() {
        let mut skeleton = skeleton();
        let mut payload = Array3::<u8>::zeros((2, 2, 2));
        payload[[1, 0, 1]] = 9;
        let mut results = SegmentationResults::new();
        results.insert(NodeId(1), Some(payload.into_dyn()));

        let sink = RecordingSink::new();
        merge_results(&mut skeleton, results, &sink);

        let event = sink
            .events()
            .into_iter()
            .find(|e| e.node == NodeId(1))
            .unwrap();
        assert_eq!(event.outcome, MergeOutcome::Applied { max_label: 9 });
        assert_eq!(event.severity(), Severity::Debug);
    }

    #[test]
    fn empty_and_missing_are_distinct_kinds() {
        let mut skeleton = skeleton();
        let mut results = SegmentationResults::new();
        results.insert(NodeId(2), None);

        let sink = RecordingSink::new();
        merge_results(&mut skeleton, results, &sink);

        let events = sink.events();
        let empty = events.iter().find(|e| e.node == NodeId(2)).unwrap();
        let missing = events.iter().find(|e| e.node == NodeId(3)).unwrap();
        assert_eq!(empty.outcome, MergeOutcome::Empty);
        assert_eq!(empty.severity(), Severity::Info);
        assert_eq!(missing.outcome, MergeOutcome::Missing);
        assert_eq!(missing.severity(), Severity::Debug);
        assert_ne!(empty.outcome, missing.outcome);
    }

    #[test]
    fn merge_preserves_node_count() {
        let mut skeleton = skeleton();
        let before = skeleton.len();

        let mut results = SegmentationResults::new();
        // An entry for an id the skeleton does not contain must not add it.
        results.insert(NodeId(50), Some(Array3::<u8>::zeros((1, 1, 1)).into_dyn()));
        merge_results(&mut skeleton, results, &RecordingSink::new());

        assert_eq!(skeleton.len(), before);
        assert!(!skeleton.contains(NodeId(50)));
    }

    #[test]
    fn merge_is_idempotent_for_uncovered_nodes() {
        let mut skeleton = skeleton();
        merge_results(&mut skeleton, SegmentationResults::new(), &NullSink);
        for node in skeleton.nodes() {
            assert!(!node.has_mask());
        }
    }

    #[test]
    fn merge_on_empty_skeleton_is_a_no_op() {
        let mut skeleton = Skeleton::from_rows(&[]).unwrap();
        let mut results = SegmentationResults::new();
        results.insert(NodeId(1), Some(Array3::<u8>::zeros((1, 1, 1)).into_dyn()));

        let sink = RecordingSink::new();
        let summary = merge_results(&mut skeleton, results, &sink);

        assert_eq!(summary.total(), 0);
        assert!(sink.events().is_empty());
        assert!(skeleton.is_empty());
    }

    #[test]
    fn mask_equals_converted_payload() {
        let mut skeleton = skeleton();
        let payload = Array3::from_shape_fn((2, 2, 2), |(x, y, z)| {
            u8::try_from(x + 2 * y + 4 * z).unwrap_or(0)
        });
        let mut results = SegmentationResults::new();
        results.insert(NodeId(1), Some(payload.clone().into_dyn()));

        merge_results(&mut skeleton, results, &RecordingSink::new());

        let mask = skeleton.get(NodeId(1)).unwrap().mask().unwrap();
        assert_eq!(mask.data(), &payload);
    }

    #[test]
    fn summary_report_mentions_all_counts() {
        let summary = MergeSummary {
            applied: 4,
            missing: 3,
            empty: 2,
            mismatched: 1,
        };
        let report = summary.report();
        assert!(report.contains("10 nodes"));
        assert!(report.contains("4 masks applied"));
        assert!(report.contains("3 without results"));
        assert!(report.contains("2 explicitly empty"));
        assert!(report.contains("1 shape mismatches"));
    }
}

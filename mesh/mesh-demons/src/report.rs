//! Evaluation results, diagnostics and per-iteration reporting.
//!
//! The metric returns everything as plain values. Callers that want to log
//! or record optimizer progress hand each [`Evaluation`] to an
//! [`IterationReporter`] themselves; the metric never calls one.

use mesh_types::Vector3;
use tracing::info;

/// The three energy terms of one evaluation, already weighted.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EnergyTerms {
    /// Confidence- and feature-weighted squared correspondence distance.
    pub mismatch: f64,
    /// Edge stretch.
    pub stretch: f64,
    /// Hinge bending.
    pub bend: f64,
}

impl EnergyTerms {
    /// Sum of all terms.
    #[inline]
    #[must_use]
    pub fn total(&self) -> f64 {
        self.mismatch + self.stretch + self.bend
    }
}

/// Non-fatal conditions met while evaluating.
///
/// Degenerate elements contribute nothing to the value or gradient; they are
/// counted here so a caller can decide whether the registration is still
/// trustworthy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Diagnostics {
    /// Edges skipped because their rest or current length is degenerate.
    pub degenerate_edges: usize,
    /// Hinges skipped because their rest or current geometry is degenerate.
    pub degenerate_hinges: usize,
    /// Input cells skipped for repeating a vertex index.
    pub skipped_cells: usize,
    /// Edges shared by more than two cells (no bending term).
    pub non_manifold_edges: usize,
    /// Transformed moving points outside the virtual domain.
    pub points_outside_domain: usize,
}

impl Diagnostics {
    /// `true` when nothing was skipped or out of bounds.
    #[must_use]
    pub const fn is_clean(&self) -> bool {
        self.degenerate_edges == 0
            && self.degenerate_hinges == 0
            && self.skipped_cells == 0
            && self.non_manifold_edges == 0
            && self.points_outside_domain == 0
    }
}

/// Result of one metric evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    /// Total energy, the sum of [`terms`](Self::terms).
    pub value: f64,
    /// `∂value/∂x_i` for every moving point.
    pub gradient: Vec<Vector3<f64>>,
    /// Individual energy terms.
    pub terms: EnergyTerms,
    /// Non-fatal conditions.
    pub diagnostics: Diagnostics,
    /// Largest correspondence distance.
    pub max_distance: f64,
    /// Mean correspondence distance.
    pub mean_distance: f64,
}

/// Receives evaluations after each optimizer step.
pub trait IterationReporter {
    /// Called by the optimizer driver with the evaluation of step `iteration`.
    fn report(&mut self, iteration: usize, evaluation: &Evaluation);
}

impl<F> IterationReporter for F
where
    F: FnMut(usize, &Evaluation),
{
    fn report(&mut self, iteration: usize, evaluation: &Evaluation) {
        self(iteration, evaluation);
    }
}

/// Logs each evaluation at `info` level.
///
/// # Example
///
/// ```
/// use mesh_demons::{Evaluation, IterationReporter, TracingReporter};
///
/// let evaluation = Evaluation {
///     value: 1.0,
///     gradient: Vec::new(),
///     terms: Default::default(),
///     diagnostics: Default::default(),
///     max_distance: 0.0,
///     mean_distance: 0.0,
/// };
///
/// let mut reporter = TracingReporter::default();
/// reporter.report(0, &evaluation);
/// assert_eq!(reporter.reported(), 1);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter {
    reported: usize,
}

impl TracingReporter {
    /// Number of evaluations logged so far.
    #[must_use]
    pub const fn reported(&self) -> usize {
        self.reported
    }
}

impl IterationReporter for TracingReporter {
    fn report(&mut self, iteration: usize, evaluation: &Evaluation) {
        self.reported += 1;
        info!(
            iteration,
            value = evaluation.value,
            mismatch = evaluation.terms.mismatch,
            stretch = evaluation.terms.stretch,
            bend = evaluation.terms.bend,
            max_distance = evaluation.max_distance,
            degenerate_edges = evaluation.diagnostics.degenerate_edges,
            degenerate_hinges = evaluation.diagnostics.degenerate_hinges,
            "Thin-shell iteration"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn evaluation(value: f64) -> Evaluation {
        Evaluation {
            value,
            gradient: vec![Vector3::zeros()],
            terms: EnergyTerms {
                mismatch: value,
                stretch: 0.0,
                bend: 0.0,
            },
            diagnostics: Diagnostics::default(),
            max_distance: 0.0,
            mean_distance: 0.0,
        }
    }

    #[test]
    fn closures_are_reporters() {
        let mut values = Vec::new();
        {
            let mut record = |_: usize, e: &Evaluation| values.push(e.value);
            for (i, v) in [3.0, 2.0, 1.5].into_iter().enumerate() {
                record.report(i, &evaluation(v));
            }
        }
        assert_eq!(values, vec![3.0, 2.0, 1.5]);
    }

    #[test]
    fn energy_total() {
        let terms = EnergyTerms {
            mismatch: 1.0,
            stretch: 2.0,
            bend: 0.5,
        };
        assert!((terms.total() - 3.5).abs() < 1e-15);
    }

    #[test]
    fn diagnostics_clean_by_default() {
        assert!(Diagnostics::default().is_clean());
        let d = Diagnostics {
            degenerate_hinges: 1,
            ..Diagnostics::default()
        };
        assert!(!d.is_clean());
    }
}

//! Golden-data verification suite
//!
//! A case directory holds `<layer>.input.dat` and `<layer>.output.dat` for
//! each layer: raw int8 activations recorded from the reference datapath.
//! Every layer is run on its recorded input and compared against its recorded
//! output; layers are independent, so one failing layer does not stop the rest.

use std::path::{Path, PathBuf};

use fixsim_model::{load_activation_binary, Layer, LayerSet};
use rayon::prelude::*;
use serde::Serialize;
use tracing::{info, warn};

use crate::compare::{compare, Comparison, Outcome};
use crate::error::{HarnessError, Result};

/// Result of one layer in one case
#[derive(Debug, Clone, Serialize)]
pub struct LayerReport {
    pub layer: String,
    /// Absent when the layer could not be run
    pub outcome: Option<Outcome>,
    pub comparison: Option<Comparison>,
    pub error: Option<String>,
}

impl LayerReport {
    pub fn passed(&self) -> bool {
        matches!(self.outcome, Some(Outcome::Exact | Outcome::WithinTolerance))
    }
}

/// Results of every layer in one case
#[derive(Debug, Clone, Serialize)]
pub struct CaseReport {
    pub case: String,
    pub layers: Vec<LayerReport>,
}

impl CaseReport {
    pub fn passed(&self) -> bool {
        self.layers.iter().all(LayerReport::passed)
    }
}

/// Counts over all layer runs
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SuiteSummary {
    pub cases: usize,
    pub layer_runs: usize,
    pub exact: usize,
    pub within_tolerance: usize,
    pub mismatched: usize,
    pub errors: usize,
}

/// Results of a full suite run
#[derive(Debug, Clone, Serialize)]
pub struct SuiteReport {
    pub cases: Vec<CaseReport>,
    pub summary: SuiteSummary,
}

impl SuiteReport {
    fn new(cases: Vec<CaseReport>) -> Self {
        let mut summary = SuiteSummary {
            cases: cases.len(),
            ..Default::default()
        };
        for layer in cases.iter().flat_map(|c| &c.layers) {
            summary.layer_runs += 1;
            match layer.outcome {
                Some(Outcome::Exact) => summary.exact += 1,
                Some(Outcome::WithinTolerance) => summary.within_tolerance += 1,
                Some(Outcome::Mismatch) => summary.mismatched += 1,
                None => summary.errors += 1,
            }
        }
        Self { cases, summary }
    }

    pub fn passed(&self) -> bool {
        self.summary.mismatched == 0 && self.summary.errors == 0
    }

    /// Turn a failing report into an error
    pub fn ensure_passed(&self) -> Result<()> {
        if self.passed() {
            return Ok(());
        }
        let failing: Vec<String> = self
            .cases
            .iter()
            .flat_map(|c| {
                c.layers
                    .iter()
                    .filter(|l| !l.passed())
                    .map(move |l| format!("{}/{}", c.case, l.layer))
            })
            .collect();
        Err(HarnessError::VerificationFailed {
            message: format!(
                "{} mismatched, {} errors: {}",
                self.summary.mismatched,
                self.summary.errors,
                failing.join(", ")
            ),
        })
    }
}

/// Runs loaded layers against golden case directories
pub struct GoldenSuite<'a> {
    layers: &'a LayerSet,
    data_dir: PathBuf,
    cases: Vec<String>,
}

impl<'a> GoldenSuite<'a> {
    pub fn new<P: Into<PathBuf>>(layers: &'a LayerSet, data_dir: P, cases: Vec<String>) -> Self {
        Self {
            layers,
            data_dir: data_dir.into(),
            cases,
        }
    }

    /// Path of a layer's recorded input within a case
    pub fn input_path(&self, case: &str, layer: &str) -> PathBuf {
        case_file(&self.data_dir, case, layer, "input")
    }

    /// Path of a layer's recorded output within a case
    pub fn output_path(&self, case: &str, layer: &str) -> PathBuf {
        case_file(&self.data_dir, case, layer, "output")
    }

    /// Run one layer on its recorded input and compare with its recorded output
    pub fn run_layer(&self, case: &str, layer: &Layer) -> Result<Comparison> {
        let spec = layer.spec();
        let input = load_activation_binary(
            self.input_path(case, layer.name()),
            spec.input_shape,
            spec.input_q,
        )?;
        let actual = layer.forward(&input)?;

        let expected = load_activation_binary(
            self.output_path(case, layer.name()),
            spec.output_shape()?,
            spec.output_q,
        )?;
        // Dense outputs are recorded as [features, 1, 1]
        let expected = if expected.shape() != actual.shape() && expected.len() == actual.len() {
            expected.reshape(actual.shape().clone())?
        } else {
            expected
        };
        Ok(compare(&actual, &expected))
    }

    /// Run every layer of one case
    pub fn run_case(&self, case: &str) -> CaseReport {
        let layers = self
            .layers
            .iter()
            .map(|layer| match self.run_layer(case, layer) {
                Ok(comparison) => {
                    let outcome = comparison.outcome();
                    match (&outcome, &comparison.max_diff) {
                        (Outcome::Mismatch, Some(max)) => warn!(
                            case,
                            layer = layer.name(),
                            index = ?max.index,
                            actual = max.actual,
                            expected = max.expected,
                            mean_abs_diff = ?comparison.mean_abs_diff,
                            "layer differs from golden output"
                        ),
                        (Outcome::Mismatch, None) => warn!(
                            case,
                            layer = layer.name(),
                            actual_shape = ?comparison.actual_shape,
                            expected_shape = ?comparison.expected_shape,
                            "layer output size differs from golden output"
                        ),
                        _ => {
                            info!(case, layer = layer.name(), outcome = ?outcome, "layer verified")
                        }
                    }
                    LayerReport {
                        layer: layer.name().to_string(),
                        outcome: Some(outcome),
                        comparison: Some(comparison),
                        error: None,
                    }
                }
                Err(e) => {
                    warn!(case, layer = layer.name(), error = %e, "layer could not be verified");
                    LayerReport {
                        layer: layer.name().to_string(),
                        outcome: None,
                        comparison: None,
                        error: Some(e.to_string()),
                    }
                }
            })
            .collect();
        CaseReport {
            case: case.to_string(),
            layers,
        }
    }

    /// Run all cases in parallel
    pub fn run(&self) -> SuiteReport {
        let cases: Vec<CaseReport> =
            self.cases.par_iter().map(|case| self.run_case(case)).collect();
        let report = SuiteReport::new(cases);
        info!(
            cases = report.summary.cases,
            layer_runs = report.summary.layer_runs,
            exact = report.summary.exact,
            within_tolerance = report.summary.within_tolerance,
            mismatched = report.summary.mismatched,
            errors = report.summary.errors,
            "golden suite finished"
        );
        report
    }
}

fn case_file(data_dir: &Path, case: &str, layer: &str, kind: &str) -> PathBuf {
    data_dir.join(case).join(format!("{layer}.{kind}.dat"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(outcomes: &[Option<Outcome>]) -> SuiteReport {
        let layers = outcomes
            .iter()
            .enumerate()
            .map(|(i, &outcome)| LayerReport {
                layer: format!("l{i}"),
                outcome,
                comparison: None,
                error: outcome.is_none().then(|| "missing".to_string()),
            })
            .collect();
        SuiteReport::new(vec![CaseReport {
            case: "im1".into(),
            layers,
        }])
    }

    #[test]
    fn test_summary_counts() {
        let r = report(&[
            Some(Outcome::Exact),
            Some(Outcome::WithinTolerance),
            Some(Outcome::Mismatch),
            None,
        ]);
        assert_eq!(
            r.summary,
            SuiteSummary {
                cases: 1,
                layer_runs: 4,
                exact: 1,
                within_tolerance: 1,
                mismatched: 1,
                errors: 1,
            }
        );
        assert!(!r.passed());
        match r.ensure_passed() {
            Err(HarnessError::VerificationFailed { message }) => {
                assert!(message.contains("im1/l2"));
                assert!(message.contains("im1/l3"));
                assert!(!message.contains("im1/l0"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_passing_report() {
        let r = report(&[Some(Outcome::Exact), Some(Outcome::WithinTolerance)]);
        assert!(r.passed());
        assert!(r.cases[0].passed());
        r.ensure_passed().unwrap();
    }

    #[test]
    fn test_case_file_layout() {
        let path = case_file(Path::new("data"), "im3", "conv2", "output");
        assert_eq!(path, PathBuf::from("data/im3/conv2.output.dat"));
    }
}

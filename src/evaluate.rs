use std::collections::BTreeSet;
use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub class: String,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AveragedMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

/// Per-class precision/recall/F1 on held-out rows. Undefined ratios count as 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationReport {
    pub classes: Vec<ClassMetrics>,
    pub accuracy: f64,
    pub macro_avg: AveragedMetrics,
    pub weighted_avg: AveragedMetrics,
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 { 0.0 } else { num as f64 / den as f64 }
}

fn f1(precision: f64, recall: f64) -> f64 {
    if precision + recall == 0.0 {
        0.0
    } else {
        2.0 * precision * recall / (precision + recall)
    }
}

impl ClassificationReport {
    /// `class_names` is indexed by class code. Classes that appear in neither `truth` nor
    /// `predicted` are left out.
    pub fn from_codes(truth: &[usize], predicted: &[usize], class_names: &[String]) -> Self {
        let seen: BTreeSet<usize> = truth.iter().chain(predicted).copied().collect();
        let mut classes: Vec<ClassMetrics> = seen
            .into_iter()
            .map(|code| {
                let tp = truth
                    .iter()
                    .zip(predicted)
                    .filter(|(t, p)| **t == code && **p == code)
                    .count();
                let support = truth.iter().filter(|&&t| t == code).count();
                let predicted_n = predicted.iter().filter(|&&p| p == code).count();
                let precision = ratio(tp, predicted_n);
                let recall = ratio(tp, support);
                ClassMetrics {
                    class: class_names
                        .get(code)
                        .cloned()
                        .unwrap_or_else(|| format!("#{code}")),
                    precision,
                    recall,
                    f1: f1(precision, recall),
                    support,
                }
            })
            .collect();
        classes.sort_by(|a, b| a.class.cmp(&b.class));

        let total = truth.len();
        let correct = truth.iter().zip(predicted).filter(|(t, p)| t == p).count();
        let k = classes.len().max(1) as f64;
        let macro_avg = AveragedMetrics {
            precision: classes.iter().map(|c| c.precision).sum::<f64>() / k,
            recall: classes.iter().map(|c| c.recall).sum::<f64>() / k,
            f1: classes.iter().map(|c| c.f1).sum::<f64>() / k,
            support: total,
        };
        let weight = |pick: fn(&ClassMetrics) -> f64| {
            if total == 0 {
                0.0
            } else {
                classes
                    .iter()
                    .map(|c| pick(c) * c.support as f64)
                    .sum::<f64>()
                    / total as f64
            }
        };
        let weighted_avg = AveragedMetrics {
            precision: weight(|c| c.precision),
            recall: weight(|c| c.recall),
            f1: weight(|c| c.f1),
            support: total,
        };

        Self {
            accuracy: ratio(correct, total),
            classes,
            macro_avg,
            weighted_avg,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn render_text(&self) -> String {
        let width = self
            .classes
            .iter()
            .map(|c| c.class.len())
            .chain(["weighted avg".len()])
            .max()
            .unwrap_or(12);
        let mut out = String::new();
        let _ = writeln!(
            out,
            "{:>width$} {:>9} {:>9} {:>9} {:>9}",
            "", "precision", "recall", "f1-score", "support"
        );
        out.push('\n');
        for c in &self.classes {
            let _ = writeln!(
                out,
                "{:>width$} {:>9.2} {:>9.2} {:>9.2} {:>9}",
                c.class, c.precision, c.recall, c.f1, c.support
            );
        }
        out.push('\n');
        let _ = writeln!(
            out,
            "{:>width$} {:>9} {:>9} {:>9.2} {:>9}",
            "accuracy", "", "", self.accuracy, self.macro_avg.support
        );
        for (label, avg) in [("macro avg", &self.macro_avg), ("weighted avg", &self.weighted_avg)] {
            let _ = writeln!(
                out,
                "{:>width$} {:>9.2} {:>9.2} {:>9.2} {:>9}",
                label, avg.precision, avg.recall, avg.f1, avg.support
            );
        }
        out
    }
}

use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use rust_xlsxwriter::{Workbook, Worksheet};
use serde::{Deserialize, Serialize};

use crate::cluster::ClusterProfile;
use crate::evaluate::ClassificationReport;
use crate::pipeline::BalanceSummary;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelReport {
    pub model: String,
    pub generated_at: String,
    pub dataset: String,
    pub rows_loaded: usize,
    pub rows_used: usize,
    pub train_rows: usize,
    pub test_rows: usize,
    pub dropped_rows: Vec<String>,
    pub dropped_classes: Vec<String>,
    pub warnings: Vec<String>,
    pub balance: BalanceSummary,
    pub feature_importances: Vec<(String, f64)>,
    pub clusters: Vec<ClusterProfile>,
    pub metrics: ClassificationReport,
}

pub fn timestamp_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

impl ModelReport {
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{} model on {}", self.model, self.dataset);
        let _ = writeln!(out, "generated {}", self.generated_at);
        let _ = writeln!(
            out,
            "rows: {} loaded, {} used, {} train / {} test",
            self.rows_loaded, self.rows_used, self.train_rows, self.test_rows
        );
        let _ = writeln!(
            out,
            "balancing: {} real + {} synthetic rows, k={}, {} per class",
            self.balance.real_rows,
            self.balance.synthetic_rows,
            self.balance.k_neighbors,
            self.balance.rows_per_class
        );
        for class in &self.dropped_classes {
            let _ = writeln!(out, "dropped class: {class}");
        }
        if !self.dropped_rows.is_empty() {
            let _ = writeln!(out, "dropped rows: {}", self.dropped_rows.len());
        }
        if !self.warnings.is_empty() {
            let _ = writeln!(out, "warnings: {}", self.warnings.len());
        }
        if !self.clusters.is_empty() {
            out.push('\n');
            for c in &self.clusters {
                let _ = writeln!(out, "cluster {} {:<20} {:>5} rows", c.cluster, c.archetype, c.members);
            }
        }
        out.push('\n');
        out.push_str(&self.metrics.render_text());
        out
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        let body = serde_json::to_string_pretty(self).context("serialize report")?;
        fs::write(path, body).with_context(|| format!("write {}", path.display()))?;
        Ok(())
    }
}

pub struct ExportSummary {
    pub sheets: usize,
    pub metric_rows: usize,
}

pub fn export_report_xlsx(report: &ModelReport, path: &Path) -> Result<ExportSummary> {
    let summary_rows = vec![
        vec!["Field".to_string(), "Value".to_string()],
        vec!["Model".to_string(), report.model.clone()],
        vec!["Dataset".to_string(), report.dataset.clone()],
        vec!["Generated".to_string(), report.generated_at.clone()],
        vec!["Rows loaded".to_string(), report.rows_loaded.to_string()],
        vec!["Rows used".to_string(), report.rows_used.to_string()],
        vec!["Train rows".to_string(), report.train_rows.to_string()],
        vec!["Test rows".to_string(), report.test_rows.to_string()],
        vec![
            "Synthetic rows".to_string(),
            report.balance.synthetic_rows.to_string(),
        ],
        vec!["Accuracy".to_string(), fmt2(report.metrics.accuracy)],
    ];

    let mut metric_rows = vec![vec![
        "Class".to_string(),
        "Precision".to_string(),
        "Recall".to_string(),
        "F1".to_string(),
        "Support".to_string(),
    ]];
    for c in &report.metrics.classes {
        metric_rows.push(vec![
            c.class.clone(),
            fmt2(c.precision),
            fmt2(c.recall),
            fmt2(c.f1),
            c.support.to_string(),
        ]);
    }
    for (label, avg) in [
        ("macro avg", &report.metrics.macro_avg),
        ("weighted avg", &report.metrics.weighted_avg),
    ] {
        metric_rows.push(vec![
            label.to_string(),
            fmt2(avg.precision),
            fmt2(avg.recall),
            fmt2(avg.f1),
            avg.support.to_string(),
        ]);
    }

    let mut importance_rows = vec![vec!["Feature".to_string(), "Importance".to_string()]];
    for (name, value) in &report.feature_importances {
        importance_rows.push(vec![name.clone(), format!("{value:.4}")]);
    }

    let mut dropped_rows = vec![vec!["Kind".to_string(), "Detail".to_string()]];
    for row in &report.dropped_rows {
        dropped_rows.push(vec!["row".to_string(), row.clone()]);
    }
    for class in &report.dropped_classes {
        dropped_rows.push(vec!["class".to_string(), class.clone()]);
    }
    for warning in &report.warnings {
        dropped_rows.push(vec!["warning".to_string(), warning.clone()]);
    }

    let mut workbook = Workbook::new();
    let mut sheets = 0usize;
    for (name, rows) in [
        ("Summary", &summary_rows),
        ("Metrics", &metric_rows),
        ("Importances", &importance_rows),
        ("Dropped", &dropped_rows),
    ] {
        let sheet = workbook.add_worksheet();
        sheet.set_name(name)?;
        write_rows(sheet, rows)?;
        sheets += 1;
    }
    if !report.clusters.is_empty() {
        let mut header = vec![
            "Cluster".to_string(),
            "Archetype".to_string(),
            "Members".to_string(),
        ];
        if let Some(first) = report.clusters.first() {
            header.extend(first.centroid.iter().map(|(name, _)| name.clone()));
        }
        let mut cluster_rows = vec![header];
        for c in &report.clusters {
            let mut row = vec![c.cluster.to_string(), c.archetype.clone(), c.members.to_string()];
            row.extend(c.centroid.iter().map(|(_, v)| fmt2(*v)));
            cluster_rows.push(row);
        }
        let sheet = workbook.add_worksheet();
        sheet.set_name("Clusters")?;
        write_rows(sheet, &cluster_rows)?;
        sheets += 1;
    }

    workbook
        .save(path)
        .with_context(|| format!("failed writing workbook to {}", path.display()))?;

    Ok(ExportSummary {
        sheets,
        metric_rows: metric_rows.len().saturating_sub(1),
    })
}

fn fmt2(value: f64) -> String {
    format!("{value:.2}")
}

fn write_rows(worksheet: &mut Worksheet, rows: &[Vec<String>]) -> Result<()> {
    for (row_idx, row) in rows.iter().enumerate() {
        for (col_idx, value) in row.iter().enumerate() {
            worksheet
                .write_string(row_idx as u32, col_idx as u16, value)
                .with_context(|| format!("write cell ({row_idx},{col_idx})"))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{ModelReport, export_report_xlsx, timestamp_now};
    use crate::evaluate::ClassificationReport;
    use crate::pipeline::BalanceSummary;

    fn report() -> ModelReport {
        let names = vec!["4-3-3".to_string(), "4-4-2".to_string()];
        ModelReport {
            model: "formation counter".to_string(),
            generated_at: timestamp_now(),
            dataset: "fixture.csv".to_string(),
            rows_loaded: 10,
            rows_used: 9,
            train_rows: 8,
            test_rows: 1,
            dropped_rows: Vec::new(),
            dropped_classes: vec!["3-5-2 (1 row)".to_string()],
            warnings: Vec::new(),
            balance: BalanceSummary {
                real_rows: 8,
                synthetic_rows: 0,
                k_neighbors: 1,
                rows_per_class: 4,
            },
            feature_importances: vec![("goal_diff".to_string(), 0.5)],
            clusters: Vec::new(),
            metrics: ClassificationReport::from_codes(&[1], &[1], &names),
        }
    }

    #[test]
    fn text_report_mentions_dropped_class() {
        let text = report().render_text();
        assert!(text.contains("dropped class: 3-5-2 (1 row)"));
        assert!(text.contains("precision"));
    }

    #[test]
    fn exports_json_and_xlsx() {
        let dir = tempfile::tempdir().unwrap();
        let json = dir.path().join("report.json");
        report().write_json(&json).unwrap();
        let back: ModelReport =
            serde_json::from_str(&std::fs::read_to_string(&json).unwrap()).unwrap();
        assert_eq!(back.rows_used, 9);

        let xlsx = dir.path().join("report.xlsx");
        let summary = export_report_xlsx(&report(), &xlsx).unwrap();
        assert_eq!(summary.sheets, 4);
        assert_eq!(summary.metric_rows, 3);
        assert!(xlsx.exists());
    }
}

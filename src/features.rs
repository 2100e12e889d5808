use std::collections::BTreeMap;

use crate::error::{DivisionGuardWarning, EngineResult};
use crate::schema::{formation as fcol, tactical as tcol};
use crate::table::Table;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FormationFeatures {
    pub goal_diff: f64,
    pub xg_diff: f64,
    pub close_game: f64,
    pub total_goals: f64,
}

pub fn formation_features(
    winning_goals: f64,
    losing_goals: f64,
    winning_xg: f64,
    losing_xg: f64,
) -> FormationFeatures {
    let goal_diff = winning_goals - losing_goals;
    FormationFeatures {
        goal_diff,
        xg_diff: winning_xg - losing_xg,
        close_game: if goal_diff.abs() <= 1.0 { 1.0 } else { 0.0 },
        total_goals: winning_goals + losing_goals,
    }
}

pub fn derive_formation_columns(table: &Table) -> EngineResult<Table> {
    table.require_columns(&[
        fcol::WINNING_GOALS,
        fcol::LOSING_GOALS,
        fcol::WINNING_XG,
        fcol::LOSING_XG,
    ])?;

    let n = table.n_rows();
    let mut goal_diff = Vec::with_capacity(n);
    let mut xg_diff = Vec::with_capacity(n);
    let mut close_game = Vec::with_capacity(n);
    let mut total_goals = Vec::with_capacity(n);
    for row in 0..n {
        let f = formation_features(
            table.num(row, fcol::WINNING_GOALS).unwrap_or(0.0),
            table.num(row, fcol::LOSING_GOALS).unwrap_or(0.0),
            table.num(row, fcol::WINNING_XG).unwrap_or(0.0),
            table.num(row, fcol::LOSING_XG).unwrap_or(0.0),
        );
        goal_diff.push(f.goal_diff);
        xg_diff.push(f.xg_diff);
        close_game.push(f.close_game);
        total_goals.push(f.total_goals);
    }

    let mut out = table.clone();
    out.set_numeric_column(fcol::GOAL_DIFF, &goal_diff);
    out.set_numeric_column(fcol::XG_DIFF, &xg_diff);
    out.set_numeric_column(fcol::CLOSE_GAME, &close_game);
    out.set_numeric_column(fcol::TOTAL_GOALS, &total_goals);
    Ok(out)
}

pub fn guarded_percentage(
    numerator: f64,
    denominator: f64,
    feature: &'static str,
    denominator_name: &'static str,
) -> (f64, Option<DivisionGuardWarning>) {
    if denominator == 0.0 {
        let warning = DivisionGuardWarning {
            feature,
            denominator: denominator_name,
            row: None,
        };
        return (0.0, Some(warning));
    }
    (numerator / denominator * 100.0, None)
}

pub fn long_passes_percentage(
    long_passes: f64,
    total_passes: f64,
) -> (f64, Option<DivisionGuardWarning>) {
    guarded_percentage(
        long_passes,
        total_passes,
        tcol::LONG_PASSES_PERCENTAGE,
        tcol::TOTAL_PASSES,
    )
}

pub fn shot_accuracy(
    shots_on_target: f64,
    total_shots: f64,
) -> (f64, Option<DivisionGuardWarning>) {
    guarded_percentage(
        shots_on_target,
        total_shots,
        tcol::SHOT_ACCURACY,
        tcol::TOTAL_SHOTS,
    )
}

/// Fills in `long_passes_percentage` and `shot_accuracy` for tables that do not carry
/// them. Columns already present in the source are left alone.
pub fn derive_tactical_columns(table: &Table) -> (Table, Vec<DivisionGuardWarning>) {
    let mut out = table.clone();
    let mut warnings = Vec::new();

    let specs: [(&str, &str, &str, RatioFn); 2] = [
        (
            tcol::LONG_PASSES_PERCENTAGE,
            tcol::LONG_PASSES,
            tcol::TOTAL_PASSES,
            long_passes_percentage,
        ),
        (
            tcol::SHOT_ACCURACY,
            tcol::SHOTS_ON_TARGET,
            tcol::TOTAL_SHOTS,
            shot_accuracy,
        ),
    ];

    for (target, num_col, den_col, ratio) in specs {
        if table.has_column(target) || !table.has_column(num_col) || !table.has_column(den_col) {
            continue;
        }
        let mut values = Vec::with_capacity(table.n_rows());
        for row in 0..table.n_rows() {
            let (v, warning) = ratio(
                table.num(row, num_col).unwrap_or(0.0),
                table.num(row, den_col).unwrap_or(0.0),
            );
            if let Some(mut w) = warning {
                w.row = Some(row);
                log::warn!("{}: {}", table.source_id(), w);
                warnings.push(w);
            }
            values.push(v);
        }
        out.set_numeric_column(target, &values);
    }

    (out, warnings)
}

type RatioFn = fn(f64, f64) -> (f64, Option<DivisionGuardWarning>);

/// Recomputes both derived ratios in a named-feature input. Ratios whose source columns
/// are absent are left untouched.
pub fn apply_derived_ratios(input: &mut BTreeMap<String, f64>) -> Vec<DivisionGuardWarning> {
    let mut warnings = Vec::new();
    if let (Some(&long), Some(&total)) = (
        input.get(tcol::LONG_PASSES),
        input.get(tcol::TOTAL_PASSES),
    ) {
        let (v, w) = long_passes_percentage(long, total);
        input.insert(tcol::LONG_PASSES_PERCENTAGE.to_string(), v);
        warnings.extend(w);
    }
    if let (Some(&on_target), Some(&total)) = (
        input.get(tcol::SHOTS_ON_TARGET),
        input.get(tcol::TOTAL_SHOTS),
    ) {
        let (v, w) = shot_accuracy(on_target, total);
        input.insert(tcol::SHOT_ACCURACY.to_string(), v);
        warnings.extend(w);
    }
    for w in &warnings {
        log::warn!("tactic input: {w}");
    }
    warnings
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::{
        apply_derived_ratios, derive_tactical_columns, formation_features,
        long_passes_percentage, shot_accuracy,
    };
    use crate::table::{Cell, Table};

    #[test]
    fn close_game_iff_goal_diff_at_most_one() {
        for (w, l) in [(1.0, 0.0), (2.0, 1.0), (3.0, 1.0), (4.0, 0.0), (2.0, 2.0)] {
            let f = formation_features(w, l, 1.0, 0.5);
            assert_eq!(f.close_game == 1.0, f.goal_diff.abs() <= 1.0);
            assert_eq!(f.total_goals, w + l);
        }
        let f = formation_features(3.0, 1.0, 2.1, 0.6);
        assert_eq!(f.goal_diff, 2.0);
        assert!((f.xg_diff - 1.5).abs() < 1e-12);
        assert_eq!(f.close_game, 0.0);
    }

    #[test]
    fn ratios_guard_zero_denominators() {
        let (v, w) = long_passes_percentage(12.0, 0.0);
        assert_eq!(v, 0.0);
        assert_eq!(w.unwrap().feature, "long_passes_percentage");

        let (v, w) = shot_accuracy(4.0, 10.0);
        assert!((v - 40.0).abs() < 1e-12);
        assert!(w.is_none());
    }

    #[test]
    fn derived_columns_are_added_with_row_warnings() {
        let mut t = Table::new(
            "tactics",
            vec![
                "long_passes".to_string(),
                "total_passes".to_string(),
                "shots_on_target".to_string(),
                "total_shots".to_string(),
            ],
        );
        t.push_row(vec![Cell::Num(50.0), Cell::Num(400.0), Cell::Num(3.0), Cell::Num(0.0)])
            .unwrap();
        let (out, warnings) = derive_tactical_columns(&t);
        assert_eq!(out.num(0, "long_passes_percentage"), Some(12.5));
        assert_eq!(out.num(0, "shot_accuracy"), Some(0.0));
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].row, Some(0));
    }

    #[test]
    fn named_input_ratios_are_recomputed() {
        let mut input = BTreeMap::new();
        input.insert("total_passes".to_string(), 0.0);
        input.insert("long_passes".to_string(), 30.0);
        input.insert("long_passes_percentage".to_string(), 99.0);
        let warnings = apply_derived_ratios(&mut input);
        assert_eq!(input["long_passes_percentage"], 0.0);
        assert_eq!(warnings.len(), 1);
        assert!(!input.contains_key("shot_accuracy"));
    }
}

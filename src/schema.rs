//! Canonical column names for the two datasets.
//!
//! Source files name the same concept differently ("Winning Team Formation",
//! `winning_formation`, ...). Each dataset has one mapping table, resolved once when the
//! table is loaded; everything downstream only sees canonical names.

use std::collections::HashMap;

use once_cell::sync::Lazy;

use crate::error::{EngineError, EngineResult};
use crate::table::Table;

pub mod formation {
    pub const WINNING_FORMATION: &str = "winning_formation";
    pub const LOSING_FORMATION: &str = "losing_formation";
    pub const WINNING_GOALS: &str = "winning_goals";
    pub const LOSING_GOALS: &str = "losing_goals";
    pub const WINNING_XG: &str = "winning_xg";
    pub const LOSING_XG: &str = "losing_xg";
    pub const OPPONENT: &str = "opponent";
    pub const RESULT: &str = "result";
    pub const WINNING_TEAM: &str = "winning_team";

    pub const GOAL_DIFF: &str = "goal_diff";
    pub const XG_DIFF: &str = "xg_diff";
    pub const CLOSE_GAME: &str = "close_game";
    pub const TOTAL_GOALS: &str = "total_goals";
}

pub mod tactical {
    pub const MATCH_ID: &str = "match_id";
    pub const COMPETITION: &str = "competition";
    pub const SEASON: &str = "season";
    pub const TEAM: &str = "team";
    pub const COUNTER_ATTACKS: &str = "counter_attacks";
    pub const SUCCESSFUL_PASSES: &str = "successful_passes";

    pub const POSSESSION: &str = "possession";
    pub const PASS_ACCURACY: &str = "pass_accuracy";
    pub const TOTAL_PASSES: &str = "total_passes";
    pub const LONG_PASSES: &str = "long_passes";
    pub const LONG_PASSES_PERCENTAGE: &str = "long_passes_percentage";
    pub const TOTAL_SHOTS: &str = "total_shots";
    pub const SHOTS_ON_TARGET: &str = "shots_on_target";
    pub const SHOT_ACCURACY: &str = "shot_accuracy";
}

#[derive(Debug, Clone, Copy)]
pub struct ColumnSpec {
    pub canonical: &'static str,
    pub aliases: &'static [&'static str],
    pub required: bool,
}

#[derive(Debug)]
pub struct SchemaMap {
    name: &'static str,
    specs: Vec<ColumnSpec>,
    by_key: HashMap<String, &'static str>,
}

impl SchemaMap {
    pub fn new(name: &'static str, specs: Vec<ColumnSpec>) -> Self {
        let mut by_key = HashMap::new();
        for spec in &specs {
            by_key.insert(column_key(spec.canonical), spec.canonical);
            for alias in spec.aliases {
                by_key.insert(column_key(alias), spec.canonical);
            }
        }
        Self {
            name,
            specs,
            by_key,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn canonical_for(&self, column: &str) -> Option<&'static str> {
        self.by_key.get(&column_key(column)).copied()
    }

    pub fn required(&self) -> Vec<&'static str> {
        self.specs
            .iter()
            .filter(|s| s.required)
            .map(|s| s.canonical)
            .collect()
    }

    /// Rename every recognised column to its canonical name and check required columns.
    /// Unrecognised columns pass through untouched.
    pub fn resolve(&self, table: &Table) -> EngineResult<Table> {
        let mut seen: HashMap<&'static str, &str> = HashMap::new();
        for column in table.columns() {
            if let Some(canonical) = self.canonical_for(column)
                && let Some(previous) = seen.insert(canonical, column.as_str())
            {
                return Err(EngineError::data_load(
                    table.source_id(),
                    format!(
                        "columns `{previous}` and `{column}` both map to `{canonical}` in the {} schema",
                        self.name
                    ),
                ));
            }
        }

        let resolved = table.renamed(|c| self.canonical_for(c).map(str::to_string));
        resolved.require_columns(&self.required())?;
        Ok(resolved)
    }
}

pub static FORMATION_SCHEMA: Lazy<SchemaMap> = Lazy::new(|| {
    use formation::*;
    SchemaMap::new(
        "formation",
        vec![
            ColumnSpec {
                canonical: WINNING_FORMATION,
                aliases: &["Winning Team Formation", "Winning Formation", "winner_formation"],
                required: true,
            },
            ColumnSpec {
                canonical: LOSING_FORMATION,
                aliases: &["Losing Team Formation", "Losing Formation", "loser_formation"],
                required: true,
            },
            ColumnSpec {
                canonical: WINNING_GOALS,
                aliases: &["Winning Team Goals", "winner_goals"],
                required: true,
            },
            ColumnSpec {
                canonical: LOSING_GOALS,
                aliases: &["Losing Team Goals", "loser_goals"],
                required: true,
            },
            ColumnSpec {
                canonical: WINNING_XG,
                aliases: &["Winning Team xG", "winner_xg", "winning_team_expected_goals"],
                required: true,
            },
            ColumnSpec {
                canonical: LOSING_XG,
                aliases: &["Losing Team xG", "loser_xg", "losing_team_expected_goals"],
                required: true,
            },
            ColumnSpec {
                canonical: OPPONENT,
                aliases: &["Opponent"],
                required: false,
            },
            ColumnSpec {
                canonical: RESULT,
                aliases: &["Result"],
                required: false,
            },
            ColumnSpec {
                canonical: WINNING_TEAM,
                aliases: &["Winning Team", "winner"],
                required: false,
            },
        ],
    )
});

pub static TACTICAL_SCHEMA: Lazy<SchemaMap> = Lazy::new(|| {
    use tactical::*;
    SchemaMap::new(
        "tactical",
        vec![
            ColumnSpec {
                canonical: POSSESSION,
                aliases: &["possession_pct", "ball_possession", "possession_percentage"],
                required: true,
            },
            ColumnSpec {
                canonical: PASS_ACCURACY,
                aliases: &["passing_accuracy", "pass_completion", "pass_accuracy_pct"],
                required: true,
            },
            ColumnSpec {
                canonical: TOTAL_PASSES,
                aliases: &["passes", "passes_total"],
                required: true,
            },
            ColumnSpec {
                canonical: LONG_PASSES,
                aliases: &["long_balls", "long_passes_total"],
                required: true,
            },
            ColumnSpec {
                canonical: LONG_PASSES_PERCENTAGE,
                aliases: &["long_ball_percentage", "long_ball_pct", "long_pass_pct"],
                required: false,
            },
            ColumnSpec {
                canonical: TOTAL_SHOTS,
                aliases: &["shots", "shots_total"],
                required: true,
            },
            ColumnSpec {
                canonical: SHOTS_ON_TARGET,
                aliases: &["on_target", "shots_on_goal"],
                required: true,
            },
            ColumnSpec {
                canonical: SHOT_ACCURACY,
                aliases: &["shot_accuracy_pct", "shooting_accuracy"],
                required: false,
            },
            ColumnSpec {
                canonical: MATCH_ID,
                aliases: &["game_id", "fixture_id"],
                required: false,
            },
            ColumnSpec {
                canonical: COMPETITION,
                aliases: &["competition_name", "league"],
                required: false,
            },
            ColumnSpec {
                canonical: SEASON,
                aliases: &["season_name"],
                required: false,
            },
            ColumnSpec {
                canonical: TEAM,
                aliases: &["team_name"],
                required: false,
            },
            ColumnSpec {
                canonical: COUNTER_ATTACKS,
                aliases: &["counters"],
                required: false,
            },
            ColumnSpec {
                canonical: SUCCESSFUL_PASSES,
                aliases: &["completed_passes", "passes_completed"],
                required: false,
            },
        ],
    )
});

/// Case- and punctuation-insensitive key: "Winning Team xG" and `winning_team_xg` match.
fn column_key(input: &str) -> String {
    let lower = input.trim().to_ascii_lowercase();
    let mut out = String::with_capacity(lower.len());
    let mut prev_us = false;
    for ch in lower.chars() {
        if ch.is_ascii_alphanumeric() {
            out.push(ch);
            prev_us = false;
        } else if !prev_us && !out.is_empty() {
            out.push('_');
            prev_us = true;
        }
    }
    while out.ends_with('_') {
        out.pop();
    }
    out
}

use crate::table::{Cell, Table};

#[derive(Debug, Clone, Copy)]
pub struct NormalizeSpec<'a> {
    pub drop_columns: &'a [&'a str],
    pub text_columns: &'a [&'a str],
    /// Columns like "2 (a.e.t.)" that hold a count followed by annotation.
    pub leading_int_columns: &'a [&'a str],
    /// Columns that must hold numbers; text that does not parse drops the row.
    pub numeric_columns: &'a [&'a str],
    pub numeric_fill: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    NoLeadingDigits,
    NotNumeric,
    EmptyLabel,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DroppedRow {
    pub row: usize,
    pub column: String,
    pub raw: String,
    pub reason: DropReason,
}

#[derive(Debug, Clone)]
pub struct Normalized {
    pub table: Table,
    pub dropped_rows: Vec<DroppedRow>,
}

pub fn normalize(raw: &Table, spec: &NormalizeSpec<'_>) -> Normalized {
    let table = raw.without_columns(spec.drop_columns);
    let text_idx: Vec<usize> = spec
        .text_columns
        .iter()
        .filter_map(|c| table.column_index(c))
        .collect();
    let int_idx: Vec<usize> = spec
        .leading_int_columns
        .iter()
        .filter_map(|c| table.column_index(c))
        .collect();
    let num_idx: Vec<usize> = spec
        .numeric_columns
        .iter()
        .filter_map(|c| table.column_index(c))
        .collect();

    let mut cleaned_rows = Vec::with_capacity(table.n_rows());
    let mut dropped_rows = Vec::new();

    for (row_idx, row) in table.rows().iter().enumerate() {
        let mut cleaned = Vec::with_capacity(row.len());
        let mut dropped: Option<DroppedRow> = None;

        for (col_idx, cell) in row.iter().enumerate() {
            let column = &table.columns()[col_idx];
            let out = if text_idx.contains(&col_idx) {
                let label = cell.to_text().map(|s| sanitize_label(&s)).unwrap_or_default();
                if label.is_empty() {
                    dropped.get_or_insert(DroppedRow {
                        row: row_idx,
                        column: column.clone(),
                        raw: cell.to_text().unwrap_or_default(),
                        reason: DropReason::EmptyLabel,
                    });
                }
                Cell::Text(label)
            } else if int_idx.contains(&col_idx) {
                match cell {
                    Cell::Missing => Cell::Num(spec.numeric_fill),
                    other => {
                        let raw_text = other.to_text().unwrap_or_default();
                        match leading_int(&raw_text) {
                            Some(v) => Cell::Num(v as f64),
                            None => {
                                dropped.get_or_insert(DroppedRow {
                                    row: row_idx,
                                    column: column.clone(),
                                    raw: raw_text,
                                    reason: DropReason::NoLeadingDigits,
                                });
                                Cell::Missing
                            }
                        }
                    }
                }
            } else if num_idx.contains(&col_idx) && matches!(cell, Cell::Text(_)) {
                dropped.get_or_insert(DroppedRow {
                    row: row_idx,
                    column: column.clone(),
                    raw: cell.to_text().unwrap_or_default(),
                    reason: DropReason::NotNumeric,
                });
                Cell::Missing
            } else if cell.is_missing() {
                Cell::Num(spec.numeric_fill)
            } else {
                cell.clone()
            };
            cleaned.push(out);
        }

        match dropped {
            Some(d) => {
                log::warn!(
                    "{}: dropping row {} ({} = {:?})",
                    table.source_id(),
                    d.row,
                    d.column,
                    d.raw
                );
                dropped_rows.push(d);
            }
            None => cleaned_rows.push(cleaned),
        }
    }

    let mut out = Table::new(table.source_id(), table.columns().to_vec());
    for row in cleaned_rows {
        // Same width as the source table, so this cannot fail.
        let _ = out.push_row(row);
    }

    Normalized {
        table: out,
        dropped_rows,
    }
}

pub fn sanitize_label(raw: &str) -> String {
    raw.chars()
        .filter(char::is_ascii)
        .collect::<String>()
        .trim()
        .to_string()
}

/// Longest leading run of ASCII digits, after leading whitespace.
pub fn leading_int(raw: &str) -> Option<u64> {
    let digits: String = raw
        .trim_start()
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    if digits.is_empty() {
        return None;
    }
    digits.parse::<u64>().ok()
}

#[cfg(test)]
mod tests {
    use super::{DropReason, NormalizeSpec, leading_int, normalize, sanitize_label};
    use crate::table::{Cell, Table};

    fn spec() -> NormalizeSpec<'static> {
        NormalizeSpec {
            drop_columns: &["opponent"],
            text_columns: &["formation"],
            leading_int_columns: &["goals"],
            numeric_columns: &["xg"],
            numeric_fill: 0.0,
        }
    }

    fn raw() -> Table {
        let mut t = Table::new(
            "raw",
            vec![
                "opponent".to_string(),
                "formation".to_string(),
                "goals".to_string(),
                "xg".to_string(),
            ],
        );
        t.push_row(vec![
            Cell::parse("Spain"),
            Cell::parse("4-4-2 "),
            Cell::parse("2 (pen)"),
            Cell::Missing,
        ])
        .unwrap();
        t.push_row(vec![
            Cell::parse("Peru"),
            Cell::parse("\u{a0}4-4-2"),
            Cell::Num(1.0),
            Cell::Num(0.7),
        ])
        .unwrap();
        t.push_row(vec![
            Cell::parse("Chile"),
            Cell::parse("4-3-3"),
            Cell::parse("abandoned"),
            Cell::Num(0.2),
        ])
        .unwrap();
        t
    }

    #[test]
    fn leading_int_takes_digit_prefix() {
        assert_eq!(leading_int("3"), Some(3));
        assert_eq!(leading_int("2 (a.e.t.)"), Some(2));
        assert_eq!(leading_int(" 10x"), Some(10));
        assert_eq!(leading_int("x10"), None);
        assert_eq!(leading_int(""), None);
    }

    #[test]
    fn labels_collapse_after_sanitizing() {
        assert_eq!(sanitize_label("4-4-2 "), "4-4-2");
        assert_eq!(sanitize_label("\u{a0}4-4-2\u{2009}"), "4-4-2");
    }

    #[test]
    fn normalize_drops_unparseable_rows_and_reports_them() {
        let input = raw();
        let out = normalize(&input, &spec());

        assert_eq!(out.table.n_rows(), 2);
        assert!(!out.table.has_column("opponent"));
        assert_eq!(out.table.text(0, "formation").as_deref(), Some("4-4-2"));
        assert_eq!(out.table.text(1, "formation").as_deref(), Some("4-4-2"));
        assert_eq!(out.table.num(0, "goals"), Some(2.0));
        assert_eq!(out.table.num(0, "xg"), Some(0.0));

        assert_eq!(out.dropped_rows.len(), 1);
        assert_eq!(out.dropped_rows[0].row, 2);
        assert_eq!(out.dropped_rows[0].reason, DropReason::NoLeadingDigits);

        // Caller's table untouched.
        assert_eq!(input.n_rows(), 3);
        assert!(input.has_column("opponent"));
    }

    #[test]
    fn text_in_a_numeric_column_drops_the_row() {
        let mut input = raw();
        input
            .push_row(vec![
                Cell::parse("Ghana"),
                Cell::parse("5-3-2"),
                Cell::Num(1.0),
                Cell::parse("n/a"),
            ])
            .unwrap();
        let out = normalize(&input, &spec());

        assert_eq!(out.table.n_rows(), 2);
        assert_eq!(out.dropped_rows.len(), 2);
        assert_eq!(out.dropped_rows[1].row, 3);
        assert_eq!(out.dropped_rows[1].column, "xg");
        assert_eq!(out.dropped_rows[1].raw, "n/a");
        assert_eq!(out.dropped_rows[1].reason, DropReason::NotNumeric);
        // Missing still fills.
        assert_eq!(out.table.num(0, "xg"), Some(0.0));
    }
}

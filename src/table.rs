use std::collections::HashMap;

use crate::error::{EngineError, EngineResult};

#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Missing,
    Num(f64),
    Text(String),
}

impl Cell {
    /// Empty strings become `Missing`, anything that parses as a float becomes `Num`.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Cell::Missing;
        }
        match trimmed.parse::<f64>() {
            Ok(v) if v.is_finite() => Cell::Num(v),
            _ => Cell::Text(raw.to_string()),
        }
    }

    pub fn as_num(&self) -> Option<f64> {
        match self {
            Cell::Num(v) => Some(*v),
            _ => None,
        }
    }

    /// Textual form of the cell; integral numbers print without a fraction so a
    /// formation stored as `442` reads back as "442".
    pub fn to_text(&self) -> Option<String> {
        match self {
            Cell::Missing => None,
            Cell::Text(s) => Some(s.clone()),
            Cell::Num(v) if v.fract() == 0.0 && v.abs() < 1e15 => Some(format!("{}", *v as i64)),
            Cell::Num(v) => Some(v.to_string()),
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Cell::Missing)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    source_id: String,
    columns: Vec<String>,
    index: HashMap<String, usize>,
    rows: Vec<Vec<Cell>>,
}

impl Table {
    pub fn new(source_id: impl Into<String>, columns: Vec<String>) -> Self {
        let index = columns
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i))
            .collect();
        Self {
            source_id: source_id.into(),
            columns,
            index,
            rows: Vec::new(),
        }
    }

    pub fn push_row(&mut self, row: Vec<Cell>) -> EngineResult<()> {
        if row.len() != self.columns.len() {
            return Err(EngineError::data_load(
                self.source_id.clone(),
                format!(
                    "row {} has {} cells, expected {}",
                    self.rows.len(),
                    row.len(),
                    self.columns.len()
                ),
            ));
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn cell(&self, row: usize, column: &str) -> Option<&Cell> {
        let col = self.column_index(column)?;
        self.rows.get(row).and_then(|r| r.get(col))
    }

    pub fn num(&self, row: usize, column: &str) -> Option<f64> {
        self.cell(row, column).and_then(Cell::as_num)
    }

    pub fn text(&self, row: usize, column: &str) -> Option<String> {
        self.cell(row, column).and_then(Cell::to_text)
    }

    pub fn require_columns(&self, required: &[&str]) -> EngineResult<()> {
        for name in required {
            if !self.has_column(name) {
                return Err(EngineError::MissingColumn {
                    source_id: self.source_id.clone(),
                    column: (*name).to_string(),
                });
            }
        }
        Ok(())
    }

    pub fn renamed(&self, rename: impl Fn(&str) -> Option<String>) -> Table {
        let columns = self
            .columns
            .iter()
            .map(|c| rename(c).unwrap_or_else(|| c.clone()))
            .collect();
        let mut out = Table::new(self.source_id.clone(), columns);
        out.rows = self.rows.clone();
        out
    }

    pub fn without_columns(&self, drop: &[&str]) -> Table {
        let keep: Vec<usize> = self
            .columns
            .iter()
            .enumerate()
            .filter(|(_, c)| !drop.contains(&c.as_str()))
            .map(|(i, _)| i)
            .collect();
        let columns = keep.iter().map(|&i| self.columns[i].clone()).collect();
        let mut out = Table::new(self.source_id.clone(), columns);
        out.rows = self
            .rows
            .iter()
            .map(|r| keep.iter().map(|&i| r[i].clone()).collect())
            .collect();
        out
    }

    pub fn set_numeric_column(&mut self, column: &str, values: &[f64]) {
        debug_assert_eq!(values.len(), self.rows.len());
        match self.column_index(column) {
            Some(col) => {
                for (row, v) in self.rows.iter_mut().zip(values) {
                    row[col] = Cell::Num(*v);
                }
            }
            None => {
                self.index.insert(column.to_string(), self.columns.len());
                self.columns.push(column.to_string());
                for (row, v) in self.rows.iter_mut().zip(values) {
                    row.push(Cell::Num(*v));
                }
            }
        }
    }
}

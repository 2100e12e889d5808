use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use parquet::file::reader::{FileReader, SerializedFileReader};
use parquet::record::Field;

use crate::error::{EngineError, EngineResult};
use crate::table::{Cell, Table};

/// Anything that can hand the engine a raw table. The engine never looks past this trait,
/// so upstream providers only need to produce rows.
pub trait DataSource {
    fn source_id(&self) -> String;

    fn load(&self) -> EngineResult<Table>;
}

impl DataSource for Table {
    fn source_id(&self) -> String {
        Table::source_id(self).to_string()
    }

    fn load(&self) -> EngineResult<Table> {
        Ok(self.clone())
    }
}

#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl DataSource for FileSource {
    fn source_id(&self) -> String {
        self.path.display().to_string()
    }

    fn load(&self) -> EngineResult<Table> {
        let ext = self
            .path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        let table = match ext.as_str() {
            "parquet" | "pq" => read_parquet(&self.path)?,
            _ => read_csv(&self.path)?,
        };
        log::info!(
            "loaded {} rows x {} columns from {}",
            table.n_rows(),
            table.columns().len(),
            self.path.display()
        );
        Ok(table)
    }
}

pub fn read_csv(path: &Path) -> EngineResult<Table> {
    let source_id = path.display().to_string();
    let file = fs::File::open(path).map_err(|err| EngineError::data_load(&source_id, err))?;
    parse_csv(&source_id, file)
}

pub fn parse_csv(source_id: &str, input: impl std::io::Read) -> EngineResult<Table> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(false)
        .trim(csv::Trim::Headers)
        .from_reader(input);
    let headers = reader
        .headers()
        .map_err(|err| EngineError::data_load(source_id, err))?
        .iter()
        .map(str::to_string)
        .collect::<Vec<_>>();

    let mut table = Table::new(source_id, headers);
    for record in reader.records() {
        let record = record.map_err(|err| EngineError::data_load(source_id, err))?;
        table.push_row(record.iter().map(Cell::parse).collect())?;
    }
    Ok(table)
}

pub fn read_parquet(path: &Path) -> EngineResult<Table> {
    let source_id = path.display().to_string();
    let file = fs::File::open(path).map_err(|err| EngineError::data_load(&source_id, err))?;
    let reader =
        SerializedFileReader::new(file).map_err(|err| EngineError::data_load(&source_id, err))?;

    let columns = reader
        .metadata()
        .file_metadata()
        .schema()
        .get_fields()
        .iter()
        .map(|f| f.name().to_string())
        .collect::<Vec<_>>();
    let index: HashMap<String, usize> = columns
        .iter()
        .enumerate()
        .map(|(i, c)| (c.clone(), i))
        .collect();

    let mut table = Table::new(source_id.clone(), columns.clone());
    let iter = reader
        .get_row_iter(None)
        .map_err(|err| EngineError::data_load(&source_id, err))?;
    for row in iter {
        let row = row.map_err(|err| EngineError::data_load(&source_id, err))?;
        let mut cells = vec![Cell::Missing; columns.len()];
        for (name, field) in row.get_column_iter() {
            if let Some(&i) = index.get(name) {
                cells[i] = field_to_cell(field);
            }
        }
        table.push_row(cells)?;
    }
    Ok(table)
}

fn field_to_cell(field: &Field) -> Cell {
    match field {
        Field::Null => Cell::Missing,
        Field::Bool(b) => Cell::Num(if *b { 1.0 } else { 0.0 }),
        Field::Byte(v) => Cell::Num(*v as f64),
        Field::Short(v) => Cell::Num(*v as f64),
        Field::Int(v) => Cell::Num(*v as f64),
        Field::Long(v) => Cell::Num(*v as f64),
        Field::UByte(v) => Cell::Num(*v as f64),
        Field::UShort(v) => Cell::Num(*v as f64),
        Field::UInt(v) => Cell::Num(*v as f64),
        Field::ULong(v) => Cell::Num(*v as f64),
        Field::Float(v) if v.is_finite() => Cell::Num(*v as f64),
        Field::Double(v) if v.is_finite() => Cell::Num(*v),
        Field::Float(_) | Field::Double(_) => Cell::Missing,
        Field::Str(s) => Cell::parse(s),
        other => Cell::Text(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::{DataSource, FileSource, parse_csv};
    use crate::table::Cell;

    #[test]
    fn parse_csv_reads_mixed_cells() {
        let raw = "Winning Team Formation,Winning Team Goals,Winning Team xG\n4-4-2 ,2 (a.e.t.),1.4\n4-3-3,,0.8\n";
        let table = parse_csv("inline", raw.as_bytes()).unwrap();
        assert_eq!(table.n_rows(), 2);
        assert_eq!(
            table.cell(0, "Winning Team Formation"),
            Some(&Cell::Text("4-4-2 ".to_string()))
        );
        assert_eq!(
            table.cell(0, "Winning Team Goals"),
            Some(&Cell::Text("2 (a.e.t.)".to_string()))
        );
        assert_eq!(table.cell(1, "Winning Team Goals"), Some(&Cell::Missing));
        assert_eq!(table.num(1, "Winning Team xG"), Some(0.8));
    }

    #[test]
    fn missing_file_is_a_load_error() {
        let err = FileSource::new("/definitely/not/here.csv").load().unwrap_err();
        assert!(!err.is_structural());
    }

    #[test]
    fn ragged_csv_is_a_load_error() {
        let raw = "a,b\n1,2\n3\n";
        assert!(parse_csv("inline", raw.as_bytes()).is_err());
    }
}

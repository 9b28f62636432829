// src/io/table.rs

use std::io::Read;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use csv::StringRecord;

use crate::error::{HatError, Result};
use crate::model::classifier::{ClassifierPattern, Classifiers};

/// A CSV table addressed by column name, remembering where each row came from.
#[derive(Debug, Clone)]
pub struct Table {
    path: PathBuf,
    headers: StringRecord,
    rows: Vec<(u64, StringRecord)>,
}

impl Table {
    pub fn read(path: &Path) -> Result<Self> {
        let reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_path(path)?;
        Self::collect(path.to_path_buf(), reader)
    }

    /// Parses in-memory CSV text; `label` stands in for the file name.
    pub fn parse_str(label: &str, text: &str) -> Result<Self> {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(text.as_bytes());
        Self::collect(PathBuf::from(label), reader)
    }

    fn collect<R: Read>(path: PathBuf, mut reader: csv::Reader<R>) -> Result<Self> {
        let headers = reader.headers()?.clone();
        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            let line = record.position().map_or(0, |p| p.line());
            rows.push((line, record));
        }
        Ok(Self { path, headers, rows })
    }

    pub fn name(&self) -> String {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn headers(&self) -> impl Iterator<Item = &str> {
        self.headers.iter()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    pub fn require_columns<'a>(&self, names: impl IntoIterator<Item = &'a str>) -> Result<()> {
        for name in names {
            if !self.has_column(name) {
                return Err(HatError::InvalidInput {
                    path: self.path.clone(),
                    line: 1,
                    message: format!("missing column '{name}'"),
                });
            }
        }
        Ok(())
    }

    /// Keeps the rows of one scenario; tables without a `scenario` column are shared.
    pub fn filter_scenario(mut self, scenario: &str) -> Self {
        if let Some(col) = self.column("scenario") {
            self.rows
                .retain(|(_, r)| r.get(col).is_some_and(|v| v == scenario));
        }
        self
    }

    pub fn rows(&self) -> impl Iterator<Item = Row<'_>> {
        self.rows.iter().map(move |(line, record)| Row {
            table: self,
            line: *line,
            record,
        })
    }
}

/// One record of a [`Table`].
#[derive(Debug, Clone, Copy)]
pub struct Row<'a> {
    table: &'a Table,
    line: u64,
    record: &'a StringRecord,
}

impl<'a> Row<'a> {
    pub fn line(&self) -> u64 {
        self.line
    }

    pub fn error(&self, message: impl Into<String>) -> HatError {
        HatError::InvalidInput {
            path: self.table.path.clone(),
            line: self.line,
            message: message.into(),
        }
    }

    pub fn str(&self, column: &str) -> Result<&'a str> {
        self.table
            .column(column)
            .and_then(|i| self.record.get(i))
            .ok_or_else(|| self.error(format!("missing column '{column}'")))
    }

    /// `None` for an empty cell or an absent column.
    pub fn optional(&self, column: &str) -> Option<&'a str> {
        self.table
            .column(column)
            .and_then(|i| self.record.get(i))
            .filter(|v| !v.is_empty())
    }

    pub fn parse<T>(&self, column: &str) -> Result<T>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        let raw = self.str(column)?;
        raw.parse()
            .map_err(|e| self.error(format!("column '{column}': cannot parse '{raw}': {e}")))
    }

    pub fn pattern(&self, classifiers: &Classifiers) -> Result<ClassifierPattern> {
        let cells = classifiers
            .names()
            .iter()
            .map(|name| self.str(name))
            .collect::<Result<Vec<_>>>()?;
        Ok(ClassifierPattern::parse(&cells))
    }
}

// src/model/classifier.rs

use std::collections::BTreeSet;
use std::fmt;

use crate::error::{HatError, Result};

/// Spelling of "any value" in the input tables.
pub const WILDCARD: &str = "?";

/// Ordered classifier names shared by every table of a scenario.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classifiers {
    names: Vec<String>,
}

impl Classifiers {
    pub fn new<S: Into<String>>(names: impl IntoIterator<Item = S>) -> Self {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }
}

/// A match predicate per classifier column: `None` accepts any value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClassifierPattern(Vec<Option<String>>);

impl ClassifierPattern {
    pub fn new(values: Vec<Option<String>>) -> Self {
        Self(values)
    }

    /// Builds a pattern from raw table cells, turning the wildcard spelling into `None`.
    pub fn parse<S: AsRef<str>>(cells: &[S]) -> Self {
        Self(
            cells
                .iter()
                .map(|c| {
                    let c = c.as_ref().trim();
                    if c == WILDCARD {
                        None
                    } else {
                        Some(c.to_string())
                    }
                })
                .collect(),
        )
    }

    pub fn values(&self) -> &[Option<String>] {
        &self.0
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.0.get(index).and_then(|v| v.as_deref())
    }

    pub fn matches(&self, values: &[String]) -> bool {
        self.0.len() == values.len()
            && self
                .0
                .iter()
                .zip(values)
                .all(|(want, have)| want.as_ref().map_or(true, |w| w == have))
    }

    /// Cells as they are written back to tables.
    pub fn cells(&self) -> Vec<String> {
        self.0
            .iter()
            .map(|v| v.clone().unwrap_or_else(|| WILDCARD.to_string()))
            .collect()
    }
}

impl fmt::Display for ClassifierPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.cells().join(" "))
    }
}

/// Rejects tables where one classifier column mixes wildcards and values.
pub fn check_wildcard_columns<'a>(
    table: &str,
    classifiers: &Classifiers,
    patterns: impl IntoIterator<Item = &'a ClassifierPattern> + Clone,
) -> Result<()> {
    for (i, name) in classifiers.names().iter().enumerate() {
        let mut wild = false;
        let mut explicit = false;
        for pattern in patterns.clone() {
            match pattern.values().get(i) {
                Some(Some(_)) => explicit = true,
                _ => wild = true,
            }
        }
        if wild && explicit {
            return Err(HatError::MixedWildcards {
                table: table.to_string(),
                classifier: name.clone(),
            });
        }
    }
    Ok(())
}

/// Classifier values that exist in the simulated inventory.
#[derive(Debug, Clone)]
pub struct ClassifierCatalog {
    classifiers: Classifiers,
    known: Vec<BTreeSet<String>>,
}

impl ClassifierCatalog {
    pub fn from_rows<'a>(
        classifiers: &Classifiers,
        rows: impl IntoIterator<Item = &'a [String]>,
    ) -> Self {
        let mut known = vec![BTreeSet::new(); classifiers.len()];
        for row in rows {
            for (set, value) in known.iter_mut().zip(row) {
                set.insert(value.clone());
            }
        }
        Self {
            classifiers: classifiers.clone(),
            known,
        }
    }

    pub fn contains(&self, index: usize, value: &str) -> bool {
        self.known.get(index).is_some_and(|s| s.contains(value))
    }

    /// Every explicit value of `pattern` must be known, never silently dropped.
    pub fn check_pattern(&self, table: &str, pattern: &ClassifierPattern) -> Result<()> {
        for (i, value) in pattern.values().iter().enumerate() {
            if let Some(value) = value {
                if !self.contains(i, value) {
                    return Err(HatError::UnknownClassifierValue {
                        table: table.to_string(),
                        classifier: self.classifiers.names()[i].clone(),
                        value: value.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}

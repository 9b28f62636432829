// src/model/skew.rs

use std::collections::{BTreeMap, HashMap};

use crate::error::{HatError, Result};
use crate::model::classifier::{ClassifierCatalog, ClassifierPattern, WILDCARD};
use crate::model::template::ProductCreated;

/// Where a grouping column of the harvest factor table reads its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkewColumn {
    /// Index into the scenario classifiers.
    Classifier(usize),
    Disturbance,
}

/// One row of the harvest factor table.
#[derive(Debug, Clone, PartialEq)]
pub struct SkewFactor {
    /// Aligned with [`SkewTable::columns`]; `None` is an empty cell.
    pub keys: Vec<Option<String>>,
    pub product_created: ProductCreated,
    pub values: BTreeMap<i32, f64>,
}

/// Harvest skew factors used to reshuffle silviculture shares between groups.
#[derive(Debug, Clone, Default)]
pub struct SkewTable {
    columns: Vec<(String, SkewColumn)>,
    rows: Vec<SkewFactor>,
}

impl SkewTable {
    /// A grouping column is either filled on every row of a product or on none.
    pub fn new(columns: Vec<(String, SkewColumn)>, rows: Vec<SkewFactor>) -> Result<Self> {
        let table = Self { columns, rows };
        for product in [ProductCreated::IrwAndFw, ProductCreated::FwOnly] {
            for (i, (name, _)) in table.columns.iter().enumerate() {
                let mut filled = table
                    .rows_for(product)
                    .map(|r| r.keys.get(i).is_some_and(Option::is_some));
                if let Some(first) = filled.next() {
                    if filled.any(|f| f != first) {
                        return Err(HatError::Config(format!(
                            "harvest factors for {}: join column '{name}' cannot be incomplete, \
                             it must be either completely empty or completely filled",
                            product.as_str()
                        )));
                    }
                }
            }
        }
        Ok(table)
    }

    pub fn columns(&self) -> &[(String, SkewColumn)] {
        &self.columns
    }

    fn rows_for(&self, product: ProductCreated) -> impl Iterator<Item = &SkewFactor> {
        self.rows
            .iter()
            .filter(move |r| r.product_created == product)
    }

    /// Grouping values must name classifiers present in the inventory.
    pub fn check_classifiers(&self, catalog: &ClassifierCatalog) -> Result<()> {
        for row in &self.rows {
            for ((name, column), key) in self.columns.iter().zip(&row.keys) {
                let (SkewColumn::Classifier(index), Some(value)) = (column, key) else {
                    continue;
                };
                if value != WILDCARD && !catalog.contains(*index, value) {
                    return Err(HatError::UnknownClassifierValue {
                        table: "harvest_factors".to_string(),
                        classifier: name.clone(),
                        value: value.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    pub fn has_product(&self, product: ProductCreated) -> bool {
        self.rows_for(product).next().is_some()
    }

    /// Columns filled for `product`, used as join key.
    pub fn join_columns(&self, product: ProductCreated) -> Vec<usize> {
        let Some(first) = self.rows_for(product).next() else {
            return Vec::new();
        };
        (0..self.columns.len())
            .filter(|&i| first.keys.get(i).is_some_and(Option::is_some))
            .collect()
    }

    /// Sums of factors per (product, year) that are not one.
    pub fn unnormalized_sums(&self, tolerance: f64) -> Vec<(ProductCreated, i32, f64)> {
        let mut sums: BTreeMap<(ProductCreated, i32), f64> = BTreeMap::new();
        for row in &self.rows {
            for (&year, &value) in &row.values {
                *sums.entry((row.product_created, year)).or_default() += value;
            }
        }
        sums.into_iter()
            .filter(|(_, sum)| (sum - 1.0).abs() > tolerance)
            .map(|((product, year), sum)| (product, year, sum))
            .collect()
    }

    /// Factors of one product for one year, keyed by the join columns.
    pub fn for_year(&self, year: i32, product: ProductCreated) -> Result<YearSkew> {
        let join = self.join_columns(product);
        let mut factors = HashMap::new();
        for row in self.rows_for(product) {
            let key: Vec<String> = join
                .iter()
                .map(|&i| row.keys[i].clone().unwrap_or_default())
                .collect();
            let value = row
                .values
                .get(&year)
                .copied()
                .ok_or_else(|| HatError::MissingSkewFactor {
                    year,
                    group: key.clone(),
                })?;
            factors.insert(key, value);
        }
        Ok(YearSkew {
            year,
            columns: join.iter().map(|&i| self.columns[i].1).collect(),
            factors,
        })
    }
}

/// Skew factors resolved for one year and product.
#[derive(Debug, Clone)]
pub struct YearSkew {
    year: i32,
    columns: Vec<SkewColumn>,
    factors: HashMap<Vec<String>, f64>,
}

impl YearSkew {
    /// A single group with a neutral factor.
    pub fn neutral(year: i32) -> Self {
        Self {
            year,
            columns: Vec::new(),
            factors: HashMap::from([(Vec::new(), 1.0)]),
        }
    }

    /// Group key of a candidate; wildcard classifiers yield `None`.
    pub fn group_key(&self, pattern: &ClassifierPattern, disturbance_id: u32) -> Vec<Option<String>> {
        self.columns
            .iter()
            .map(|column| match column {
                SkewColumn::Classifier(i) => pattern.get(*i).map(str::to_string),
                SkewColumn::Disturbance => Some(disturbance_id.to_string()),
            })
            .collect()
    }

    pub fn factor(&self, key: &[Option<String>]) -> Result<f64> {
        let group: Option<Vec<String>> = key.iter().cloned().collect();
        group
            .as_ref()
            .and_then(|g| self.factors.get(g))
            .copied()
            .ok_or_else(|| HatError::MissingSkewFactor {
                year: self.year,
                group: key
                    .iter()
                    .map(|k| k.clone().unwrap_or_else(|| "?".to_string()))
                    .collect(),
            })
    }
}

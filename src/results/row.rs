use std::collections::HashMap;
use std::sync::Arc;

use crate::types::Value;

/// A row that keeps its column names alongside the values.
///
/// Column names and the name-to-index cache are shared by every row of a
/// result set, so building many rows only clones two `Arc`s each.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedRow {
    /// The column names for this row (shared across all rows in a result set)
    pub column_names: Arc<Vec<String>>,
    /// The values for this row
    pub values: Vec<Value>,
    #[doc(hidden)]
    pub(crate) column_index_cache: Arc<HashMap<String, usize>>,
}

impl NamedRow {
    #[must_use]
    pub fn new(column_names: Arc<Vec<String>>, values: Vec<Value>) -> Self {
        let cache = Arc::new(index_cache(&column_names));
        Self {
            column_names,
            values,
            column_index_cache: cache,
        }
    }

    pub(crate) fn with_cache(
        column_names: Arc<Vec<String>>,
        column_index_cache: Arc<HashMap<String, usize>>,
        values: Vec<Value>,
    ) -> Self {
        Self {
            column_names,
            values,
            column_index_cache,
        }
    }

    /// Get the index of a column by name
    #[must_use]
    pub fn get_column_index(&self, column_name: &str) -> Option<usize> {
        if let Some(&idx) = self.column_index_cache.get(column_name) {
            return Some(idx);
        }
        self.column_names.iter().position(|col| col == column_name)
    }

    /// Get a value from the row by column name
    #[must_use]
    pub fn get(&self, column_name: &str) -> Option<&Value> {
        self.get_column_index(column_name)
            .and_then(|idx| self.values.get(idx))
    }

    #[must_use]
    pub fn get_by_index(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }
}

/// Map each column name to its index. With duplicate names the first column wins.
pub(crate) fn index_cache(column_names: &[String]) -> HashMap<String, usize> {
    let mut cache = HashMap::with_capacity(column_names.len());
    for (i, name) in column_names.iter().enumerate() {
        cache.entry(name.clone()).or_insert(i);
    }
    cache
}

/// One fetched row, in the shape the cursor's result format asks for.
#[derive(Debug, Clone, PartialEq)]
pub enum Row {
    Tuple(Vec<Value>),
    Named(NamedRow),
    Dict(HashMap<String, Value>),
}

impl Row {
    /// Value at a column position. `Dict` rows have no order and return `None`.
    #[must_use]
    pub fn get_by_index(&self, index: usize) -> Option<&Value> {
        match self {
            Row::Tuple(values) => values.get(index),
            Row::Named(row) => row.get_by_index(index),
            Row::Dict(_) => None,
        }
    }

    /// Value by column name. `Tuple` rows carry no names and return `None`.
    #[must_use]
    pub fn get(&self, column_name: &str) -> Option<&Value> {
        match self {
            Row::Tuple(_) => None,
            Row::Named(row) => row.get(column_name),
            Row::Dict(map) => map.get(column_name),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Row::Tuple(values) => values.len(),
            Row::Named(row) => row.values.len(),
            Row::Dict(map) => map.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn as_tuple(&self) -> Option<&[Value]> {
        match self {
            Row::Tuple(values) => Some(values),
            Row::Named(row) => Some(&row.values),
            Row::Dict(_) => None,
        }
    }

    /// Consume the row into its ordered values, if it has an order.
    #[must_use]
    pub fn into_values(self) -> Option<Vec<Value>> {
        match self {
            Row::Tuple(values) => Some(values),
            Row::Named(row) => Some(row.values),
            Row::Dict(_) => None,
        }
    }
}

//! Rendering decoded rows into the caller's chosen shape.

mod description;
mod row;

use std::collections::HashMap;
use std::sync::Arc;

pub use description::Description;
pub use row::{NamedRow, Row};

use crate::error::DbError;
use crate::types::Value;

/// Shape of the rows returned by fetch operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum ResultFormat {
    /// Plain ordered values.
    #[default]
    Tuple,
    /// Ordered values with column-name lookup.
    #[value(alias = "namedtuple")]
    NamedTuple,
    /// Column name to value mapping.
    Dict,
}

impl std::str::FromStr for ResultFormat {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        <ResultFormat as clap::ValueEnum>::from_str(s, true)
            .map_err(|_| DbError::programming(format!("Unrecognized results format: {s}")))
    }
}

/// Render already-converted rows. Values are moved, never re-decoded.
#[must_use]
pub fn format_results(
    format: ResultFormat,
    description: &[Description],
    rows: Vec<Vec<Value>>,
) -> Vec<Row> {
    match format {
        ResultFormat::Tuple => rows.into_iter().map(Row::Tuple).collect(),
        ResultFormat::NamedTuple => {
            let names = Arc::new(column_names(description));
            let cache = Arc::new(row::index_cache(&names));
            rows.into_iter()
                .map(|values| Row::Named(NamedRow::with_cache(names.clone(), cache.clone(), values)))
                .collect()
        }
        ResultFormat::Dict => {
            let names = column_names(description);
            rows.into_iter()
                .map(|values| Row::Dict(to_dict(&names, values)))
                .collect()
        }
    }
}

/// Render a single row.
#[must_use]
pub fn format_row(format: ResultFormat, description: &[Description], values: Vec<Value>) -> Row {
    match format {
        ResultFormat::Tuple => Row::Tuple(values),
        ResultFormat::NamedTuple => {
            Row::Named(NamedRow::new(Arc::new(column_names(description)), values))
        }
        ResultFormat::Dict => Row::Dict(to_dict(&column_names(description), values)),
    }
}

fn column_names(description: &[Description]) -> Vec<String> {
    description.iter().map(|d| d.name.clone()).collect()
}

/// Extra values without a described column are keyed by position.
fn to_dict(names: &[String], values: Vec<Value>) -> HashMap<String, Value> {
    values
        .into_iter()
        .enumerate()
        .map(|(i, v)| {
            let key = names.get(i).cloned().unwrap_or_else(|| i.to_string());
            (key, v)
        })
        .collect()
}

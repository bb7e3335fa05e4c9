use std::collections::VecDeque;

use super::{BackendError, NextSet, RawColumn, ScrollMode};
use crate::types::Value;

/// One fully read result set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSetData {
    /// `None` for statements that produce no rows (DDL, DML).
    pub columns: Option<Vec<RawColumn>>,
    pub rows: Vec<Vec<Value>>,
    /// Affected rows for DML, row count for queries; `-1` when unknown.
    pub rowcount: i64,
    pub lastrowid: Option<u64>,
}

impl ResultSetData {
    #[must_use]
    pub fn rows(columns: Vec<RawColumn>, rows: Vec<Vec<Value>>) -> Self {
        let rowcount = i64::try_from(rows.len()).unwrap_or(i64::MAX);
        Self {
            columns: Some(columns),
            rows,
            rowcount,
            lastrowid: None,
        }
    }

    #[must_use]
    pub fn affected(rowcount: i64, lastrowid: Option<u64>) -> Self {
        Self {
            columns: None,
            rows: Vec::new(),
            rowcount,
            lastrowid,
        }
    }
}

/// Result sets of one execution, read ahead and served from memory.
///
/// Backends that read every result eagerly share this for fetching, scrolling and
/// result-set iteration.
#[derive(Debug, Default)]
pub struct BufferedResults {
    current: Option<ResultSetData>,
    pending: VecDeque<ResultSetData>,
    /// Raised where the next set would have been, once `pending` runs out.
    deferred: Option<BackendError>,
    pos: usize,
}

impl BufferedResults {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace whatever was buffered with a new execution's result sets.
    pub fn load(&mut self, sets: Vec<ResultSetData>) {
        let mut sets: VecDeque<_> = sets.into();
        self.current = sets.pop_front();
        self.pending = sets;
        self.deferred = None;
        self.pos = 0;
    }

    /// Like [`BufferedResults::load`], for a statement batch that failed after
    /// producing `sets`; `nextset` reports `err` after the last of them.
    pub fn load_until_error(&mut self, sets: Vec<ResultSetData>, err: BackendError) {
        self.load(sets);
        self.deferred = Some(err);
    }

    pub fn clear(&mut self) {
        self.current = None;
        self.pending.clear();
        self.deferred = None;
        self.pos = 0;
    }

    #[must_use]
    pub fn description(&self) -> Option<&[RawColumn]> {
        self.current.as_ref().and_then(|set| set.columns.as_deref())
    }

    fn remaining(&self) -> &[Vec<Value>] {
        match &self.current {
            Some(set) if set.columns.is_some() => set.rows.get(self.pos..).unwrap_or_default(),
            _ => &[],
        }
    }

    pub fn fetchone(&mut self) -> Option<Vec<Value>> {
        let row = self.remaining().first().cloned();
        if row.is_some() {
            self.pos += 1;
        }
        row
    }

    pub fn fetchmany(&mut self, size: usize) -> Vec<Vec<Value>> {
        let rows: Vec<_> = self.remaining().iter().take(size).cloned().collect();
        self.pos += rows.len();
        rows
    }

    pub fn fetchall(&mut self) -> Vec<Vec<Value>> {
        let rows = self.remaining().to_vec();
        self.pos += rows.len();
        rows
    }

    pub fn nextset(&mut self) -> NextSet {
        match self.pending.pop_front() {
            Some(next) => {
                self.current = Some(next);
                self.pos = 0;
                NextSet::HasMore
            }
            None => {
                self.current = None;
                self.pos = 0;
                match self.deferred.take() {
                    Some(err) => NextSet::Error(err),
                    None => NextSet::Exhausted,
                }
            }
        }
    }

    #[must_use]
    pub fn rowcount(&self) -> i64 {
        self.current.as_ref().map_or(-1, |set| set.rowcount)
    }

    #[must_use]
    pub fn lastrowid(&self) -> Option<u64> {
        self.current.as_ref().and_then(|set| set.lastrowid)
    }

    /// Move the read position.
    ///
    /// # Errors
    ///
    /// Returns `BackendError::OutOfRange` when the target lies outside the result set.
    pub fn scroll(&mut self, value: i64, mode: ScrollMode) -> Result<(), BackendError> {
        let len = self
            .current
            .as_ref()
            .filter(|set| set.columns.is_some())
            .map(|set| set.rows.len())
            .ok_or_else(|| BackendError::OutOfRange("No result set to scroll".to_string()))?;
        let base = match mode {
            ScrollMode::Relative => i64::try_from(self.pos).unwrap_or(i64::MAX),
            ScrollMode::Absolute => 0,
        };
        let target = base.saturating_add(value);
        match usize::try_from(target) {
            Ok(target) if target <= len => {
                self.pos = target;
                Ok(())
            }
            _ => Err(BackendError::OutOfRange(format!(
                "Scroll target {target} is out of range"
            ))),
        }
    }
}

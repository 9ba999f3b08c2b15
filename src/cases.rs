//! Case dataset and the per-participant rating cursor.
//!
//! The dataset is loaded once at startup and read-only afterwards. Each
//! participant gets their own [`CaseCursor`] holding a shuffled case order,
//! a position into it, and the labels recorded so far.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

use rand::seq::SliceRandom;

use crate::{AppError, Result};

/// Read-only collection of cases, addressable by index.
///
/// Loaded from a CSV file: one case per row, one feature per column. The
/// study case files are plain value tables, so fields are split on commas
/// without quote handling.
#[derive(Debug, Clone)]
pub struct CaseSet {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl CaseSet {
    /// Load a case file.
    ///
    /// When `columns` is `None` the first row is taken as the header.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the file cannot be read, or
    /// `AppError::Config` if a row's width does not match the columns.
    pub fn load(path: &Path, columns: Option<&[String]>) -> Result<Self> {
        let text = fs::read_to_string(path)
            .map_err(|err| AppError::Io(format!("cannot read case file {}: {err}", path.display())))?;
        Self::parse(&text, columns)
    }

    /// Parse CSV text; split out of [`CaseSet::load`] for testability.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` on malformed input.
    pub fn parse(text: &str, columns: Option<&[String]>) -> Result<Self> {
        let mut lines = text.lines().filter(|line| !line.trim().is_empty());

        let columns: Vec<String> = match columns {
            Some(names) => names.to_vec(),
            None => lines
                .next()
                .ok_or_else(|| AppError::Config("case file is empty".into()))?
                .split(',')
                .map(|field| field.trim().to_owned())
                .collect(),
        };

        let mut rows = Vec::new();
        for (line_no, line) in lines.enumerate() {
            let row: Vec<String> = line.split(',').map(|field| field.trim().to_owned()).collect();
            if row.len() != columns.len() {
                return Err(AppError::Config(format!(
                    "case row {} has {} fields, expected {}",
                    line_no + 1,
                    row.len(),
                    columns.len()
                )));
            }
            rows.push(row);
        }

        if rows.is_empty() {
            return Err(AppError::Config("case file has no data rows".into()));
        }

        Ok(Self { columns, rows })
    }

    /// Number of cases in the dataset.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the dataset holds no cases.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Feature name → value map for the case at `index`.
    #[must_use]
    pub fn features(&self, index: usize) -> Option<BTreeMap<String, String>> {
        let row = self.rows.get(index)?;
        Some(
            self.columns
                .iter()
                .cloned()
                .zip(row.iter().cloned())
                .collect(),
        )
    }
}

/// Per-participant cursor over a shuffled case order, with label memoization.
#[derive(Debug, Clone)]
pub struct CaseCursor {
    /// Permutation of dataset indices, fixed at session start.
    order: Vec<usize>,
    /// 0-based position into `order`; always `< limit`.
    position: usize,
    /// Authoritative exhaustion bound, clamped to the order length.
    limit: usize,
    /// Stage name → (case index → label).
    ratings: HashMap<String, HashMap<usize, String>>,
}

impl CaseCursor {
    /// Create a cursor with a fresh random permutation of `0..case_count`.
    #[must_use]
    pub fn new(case_count: usize, limit: usize) -> Self {
        let mut order: Vec<usize> = (0..case_count).collect();
        order.shuffle(&mut rand::thread_rng());
        Self::with_order(order, limit)
    }

    /// Create a cursor over a fixed order (deterministic, used by tests).
    #[must_use]
    pub fn with_order(order: Vec<usize>, limit: usize) -> Self {
        let limit = limit.min(order.len());
        Self {
            order,
            position: 0,
            limit,
            ratings: HashMap::new(),
        }
    }

    /// Rewind to the first case, keeping the order and recorded labels.
    pub fn reset(&mut self) {
        self.position = 0;
    }

    /// Move the cursor by `step` (may be negative), clamping at the start.
    ///
    /// Returns `true` without mutating when the move would reach or exceed
    /// the configured limit; the caller then advances the outer stage
    /// instead of moving the cursor.
    pub fn advance(&mut self, step: i64) -> bool {
        let position = i64::try_from(self.position).unwrap_or(i64::MAX);
        let limit = i64::try_from(self.limit).unwrap_or(i64::MAX);
        let target = position.saturating_add(step);
        if target >= limit {
            return true;
        }
        self.position = usize::try_from(target.max(0)).unwrap_or(0);
        false
    }

    /// Current 0-based cursor position.
    #[must_use]
    pub fn position(&self) -> usize {
        self.position
    }

    /// Dataset index of the case under the cursor.
    #[must_use]
    pub fn current_case(&self) -> usize {
        self.order[self.position]
    }

    /// Record a label for a case; re-rating replaces the prior label.
    pub fn record_label(&mut self, stage: &str, index: usize, label: impl Into<String>) {
        self.ratings
            .entry(stage.to_owned())
            .or_default()
            .insert(index, label.into());
    }

    /// Label previously recorded for a case in a stage, if any.
    #[must_use]
    pub fn label_for(&self, stage: &str, index: usize) -> Option<&str> {
        self.ratings
            .get(stage)?
            .get(&index)
            .map(String::as_str)
    }
}

//! Job grids: full-factorial sweeps rendered into batch files.
//!
//! A [`JobGrid`] is an ordered list of named axes. Combinations are enumerated
//! in lexicographic product order: the first axis varies slowest, the last
//! fastest. Each combination renders to one command line; the generator never
//! executes anything.

use crate::error::{CoreError, GridError};
use crate::format::{format_int, format_sci};
use crate::persistence;
use chrono::{DateTime, TimeZone};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

/// File extension of batch files.
pub const BATCH_EXTENSION: &str = "job";

/// Upper bound on `-<n>` suffixes tried when a batch name is taken.
const MAX_NAME_ATTEMPTS: usize = 1000;

/// One candidate value on an axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AxisValue {
    Int(i64),
    Float(f64),
    Text(String),
}

impl fmt::Display for AxisValue {
    /// Integers as `%d`, floats as `%e`, text verbatim.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AxisValue::Int(v) => f.write_str(&format_int(*v)),
            AxisValue::Float(v) => f.write_str(&format_sci(*v)),
            AxisValue::Text(v) => f.write_str(v),
        }
    }
}

impl From<i64> for AxisValue {
    fn from(v: i64) -> Self {
        AxisValue::Int(v)
    }
}

impl From<f64> for AxisValue {
    fn from(v: f64) -> Self {
        AxisValue::Float(v)
    }
}

impl From<&str> for AxisValue {
    fn from(v: &str) -> Self {
        AxisValue::Text(v.to_string())
    }
}

/// A named parameter axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Axis {
    pub name: String,
    pub values: Vec<AxisValue>,
}

impl Axis {
    pub fn new(name: &str, values: Vec<AxisValue>) -> Self {
        Self {
            name: name.to_string(),
            values,
        }
    }

    pub fn ints(name: &str, values: &[i64]) -> Self {
        Self::new(name, values.iter().copied().map(AxisValue::Int).collect())
    }

    pub fn floats(name: &str, values: &[f64]) -> Self {
        Self::new(name, values.iter().copied().map(AxisValue::Float).collect())
    }

    pub fn texts(name: &str, values: &[&str]) -> Self {
        Self::new(name, values.iter().map(|v| AxisValue::from(*v)).collect())
    }

    /// `num` values spaced evenly on a log scale from `start` to `stop`,
    /// both endpoints included exactly.
    pub fn geomspace(name: &str, start: f64, stop: f64, num: usize) -> Result<Self, GridError> {
        let invalid = |reason: &str| GridError::InvalidSequence {
            name: name.to_string(),
            reason: reason.to_string(),
        };
        if !(start.is_finite() && stop.is_finite()) || start <= 0.0 || stop <= 0.0 {
            return Err(invalid("geomspace endpoints must be positive and finite"));
        }
        if num == 0 {
            return Err(invalid("geomspace needs at least one value"));
        }
        let (log_start, log_stop) = (start.log10(), stop.log10());
        let values = (0..num)
            .map(|i| {
                if i == 0 {
                    start
                } else if i == num - 1 {
                    stop
                } else {
                    let frac = i as f64 / (num - 1) as f64;
                    10f64.powf(log_start + frac * (log_stop - log_start))
                }
            })
            .collect::<Vec<_>>();
        Ok(Self::floats(name, &values))
    }

    /// `num` evenly spaced values from `start` to `stop`, both included.
    pub fn linspace(name: &str, start: f64, stop: f64, num: usize) -> Result<Self, GridError> {
        if !(start.is_finite() && stop.is_finite()) || num == 0 {
            return Err(GridError::InvalidSequence {
                name: name.to_string(),
                reason: "linspace needs finite endpoints and at least one value".to_string(),
            });
        }
        let values = (0..num)
            .map(|i| {
                if num == 1 {
                    start
                } else if i == num - 1 {
                    stop
                } else {
                    start + (stop - start) * i as f64 / (num - 1) as f64
                }
            })
            .collect::<Vec<_>>();
        Ok(Self::floats(name, &values))
    }

    /// Append extra values after the generated ones.
    pub fn with_appended(mut self, extra: impl IntoIterator<Item = AxisValue>) -> Self {
        self.values.extend(extra);
        self
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// A full-factorial sweep over named axes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobGrid {
    pub label: String,
    /// Everything before the flags, e.g. `neuralgc run standardized-var-mlp`.
    pub base_command: String,
    pub axes: Vec<Axis>,
    /// Order in which flags appear on each line; defaults to axis order.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flag_order: Option<Vec<String>>,
}

impl JobGrid {
    pub fn new(label: &str, base_command: &str) -> Self {
        Self {
            label: label.to_string(),
            base_command: base_command.to_string(),
            axes: Vec::new(),
            flag_order: None,
        }
    }

    pub fn axis(mut self, axis: Axis) -> Self {
        self.axes.push(axis);
        self
    }

    pub fn with_flag_order(mut self, order: &[&str]) -> Self {
        self.flag_order = Some(order.iter().map(|s| s.to_string()).collect());
        self
    }

    /// Check axes, labels and flag order before anything is rendered.
    pub fn validate(&self) -> Result<(), GridError> {
        if self.label.is_empty()
            || !self
                .label
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(GridError::InvalidLabel {
                label: self.label.clone(),
                reason: "use ASCII letters, digits, '_' or '-'".to_string(),
            });
        }
        if self.axes.is_empty() {
            return Err(GridError::NoAxes {
                label: self.label.clone(),
            });
        }
        let mut seen = HashSet::new();
        for axis in &self.axes {
            if axis.is_empty() {
                return Err(GridError::EmptyAxis {
                    name: axis.name.clone(),
                });
            }
            if !seen.insert(axis.name.as_str()) {
                return Err(GridError::DuplicateAxis {
                    name: axis.name.clone(),
                });
            }
        }
        if let Some(order) = &self.flag_order {
            let ordered: HashSet<&str> = order.iter().map(String::as_str).collect();
            if ordered.len() != order.len() {
                return Err(GridError::FlagOrder {
                    reason: "a flag is listed twice".to_string(),
                });
            }
            if ordered != seen {
                return Err(GridError::FlagOrder {
                    reason: "flag order must list every axis exactly once".to_string(),
                });
            }
        }
        Ok(())
    }

    /// Number of combinations (product of axis sizes).
    pub fn len(&self) -> usize {
        if self.axes.is_empty() {
            return 0;
        }
        self.axes.iter().map(Axis::len).product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterate combinations in lexicographic product order.
    pub fn combinations(&self) -> Combinations<'_> {
        Combinations {
            axes: &self.axes,
            indices: vec![0; self.axes.len()],
            done: self.is_empty(),
        }
    }

    /// Render every combination into an invocation line.
    pub fn render_lines(&self) -> Result<Vec<String>, GridError> {
        self.validate()?;
        let positions = self.flag_positions();
        Ok(self
            .combinations()
            .map(|combo| {
                let mut line = self.base_command.clone();
                for &i in &positions {
                    line.push_str(&format!(" --{}={}", self.axes[i].name, combo[i]));
                }
                line
            })
            .collect())
    }

    /// Write the batch file under `dir`, named `<label>_<YYYYMMDD>_<HHMMSS>.job`.
    ///
    /// The file is created exclusively; if the name is taken (two generations
    /// in the same second) a `-<n>` suffix is added.
    pub fn write_batch<Tz>(&self, dir: &Path, now: &DateTime<Tz>) -> Result<PathBuf, CoreError>
    where
        Tz: TimeZone,
        Tz::Offset: fmt::Display,
    {
        let lines = self.render_lines()?;
        let mut body = String::with_capacity(lines.iter().map(|l| l.len() + 1).sum());
        for line in &lines {
            body.push_str(line);
            body.push('\n');
        }

        std::fs::create_dir_all(dir)?;
        let stem = batch_stem(&self.label, now);
        for attempt in 0..MAX_NAME_ATTEMPTS {
            let name = if attempt == 0 {
                format!("{stem}.{BATCH_EXTENSION}")
            } else {
                format!("{stem}-{attempt}.{BATCH_EXTENSION}")
            };
            let path = dir.join(name);
            match persistence::create_exclusive(&path, body.as_bytes()) {
                Ok(()) => {
                    tracing::info!(
                        path = %path.display(),
                        lines = lines.len(),
                        "Wrote batch file"
                    );
                    return Ok(path);
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Err(GridError::BatchNameExhausted {
            dir: dir.to_path_buf(),
        }
        .into())
    }

    fn flag_positions(&self) -> Vec<usize> {
        match &self.flag_order {
            Some(order) => order
                .iter()
                .filter_map(|name| self.axes.iter().position(|a| &a.name == name))
                .collect(),
            None => (0..self.axes.len()).collect(),
        }
    }
}

/// `<label>_<YYYYMMDD>_<HHMMSS>`.
pub fn batch_stem<Tz>(label: &str, now: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    format!("{label}_{}_{}", now.format("%Y%m%d"), now.format("%H%M%S"))
}

/// Odometer over axis indices; the last axis turns fastest.
pub struct Combinations<'a> {
    axes: &'a [Axis],
    indices: Vec<usize>,
    done: bool,
}

impl<'a> Iterator for Combinations<'a> {
    type Item = Vec<&'a AxisValue>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let combo = self
            .axes
            .iter()
            .zip(&self.indices)
            .map(|(axis, &i)| &axis.values[i])
            .collect();

        // Advance the odometer.
        self.done = true;
        for pos in (0..self.axes.len()).rev() {
            self.indices[pos] += 1;
            if self.indices[pos] < self.axes[pos].len() {
                self.done = false;
                break;
            }
            self.indices[pos] = 0;
        }
        Some(combo)
    }
}

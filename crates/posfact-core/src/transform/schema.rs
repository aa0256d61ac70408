use polars::prelude::*;

use super::local_time::{local_keys, parse_instant};
use super::TransformError;

/// Semantic type of a clean column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    /// Required, non-null `i64` key.
    Identifier,
    NullableInteger,
    /// Monetary amount as `f64`.
    Money,
    Text,
    /// Expands into `<target>_date_key` and `<target>_time_key` in the
    /// reporting timezone.
    Timestamp,
}

#[derive(Debug, Clone, Copy)]
pub struct ColumnMapping {
    pub source: &'static str,
    pub target: &'static str,
    pub kind: ColumnKind,
}

impl ColumnMapping {
    pub const fn new(source: &'static str, target: &'static str, kind: ColumnKind) -> Self {
        Self {
            source,
            target,
            kind,
        }
    }
}

/// Columns computed from already-mapped targets.
#[derive(Debug, Clone, Copy)]
pub enum DerivedColumn {
    Constant {
        target: &'static str,
        value: i64,
    },
    /// `numerator / denominator`, null when either side is null or the
    /// denominator is zero.
    Ratio {
        target: &'static str,
        numerator: &'static str,
        denominator: &'static str,
    },
}

#[derive(Debug)]
pub struct FactSchema {
    pub fact_name: &'static str,
    pub code: &'static str,
    pub columns: &'static [ColumnMapping],
    pub derived: &'static [DerivedColumn],
}

impl FactSchema {
    /// Output column names, in output order.
    pub fn output_columns(&self) -> Vec<String> {
        let mut names = Vec::new();
        for mapping in self.columns {
            match mapping.kind {
                ColumnKind::Timestamp => {
                    names.push(format!("{}_date_key", mapping.target));
                    names.push(format!("{}_time_key", mapping.target));
                }
                _ => names.push(mapping.target.to_string()),
            }
        }
        for derived in self.derived {
            match derived {
                DerivedColumn::Constant { target, .. } | DerivedColumn::Ratio { target, .. } => {
                    names.push(target.to_string())
                }
            }
        }
        names
    }
}

/// Renames and coerces `raw` into the shape `schema` describes. Unmapped raw
/// columns are dropped.
pub fn apply_schema(raw: &DataFrame, schema: &FactSchema) -> Result<DataFrame, TransformError> {
    let height = raw.height();
    let mut columns: Vec<Column> = Vec::with_capacity(schema.columns.len() + schema.derived.len());

    for mapping in schema.columns {
        let values = text_values(raw, mapping.source)?;
        let values = values.as_ref();

        match mapping.kind {
            ColumnKind::Identifier => {
                let mut ids: Vec<i64> = Vec::with_capacity(height);
                match values {
                    Some(values) => {
                        for (row, value) in values.iter().enumerate() {
                            let value = value.ok_or_else(|| TransformError::NullIdentifier {
                                column: mapping.source.into(),
                                row,
                            })?;
                            ids.push(parse_integer(value).ok_or_else(|| {
                                invalid(mapping.source, row, value, "identifier")
                            })?);
                        }
                    }
                    // A table without rows has no identifiers to check.
                    None if height == 0 => {}
                    None => return Err(TransformError::MissingColumn(mapping.source.into())),
                }
                columns.push(Series::new(mapping.target.into(), ids).into());
            }
            ColumnKind::NullableInteger => {
                let parsed = coerce(values, height, mapping.source, "integer", parse_integer)?;
                columns.push(Series::new(mapping.target.into(), parsed).into());
            }
            ColumnKind::Money => {
                let parsed = coerce(values, height, mapping.source, "amount", parse_amount)?;
                columns.push(Series::new(mapping.target.into(), parsed).into());
            }
            ColumnKind::Text => {
                let text: Vec<Option<&str>> = match values {
                    Some(values) => values
                        .iter()
                        .map(|value| value.filter(|value| !value.is_empty()))
                        .collect(),
                    None => vec![None; height],
                };
                columns.push(Series::new(mapping.target.into(), text).into());
            }
            ColumnKind::Timestamp => {
                let keys: Vec<Option<(i64, i64)>> = match values {
                    Some(values) => values
                        .iter()
                        .map(|value| value.and_then(parse_instant).map(local_keys))
                        .collect(),
                    None => vec![None; height],
                };
                let date_keys: Vec<Option<i64>> =
                    keys.iter().map(|key| key.map(|(date, _)| date)).collect();
                let time_keys: Vec<Option<i64>> =
                    keys.iter().map(|key| key.map(|(_, time)| time)).collect();
                columns.push(
                    Series::new(format!("{}_date_key", mapping.target).into(), date_keys).into(),
                );
                columns.push(
                    Series::new(format!("{}_time_key", mapping.target).into(), time_keys).into(),
                );
            }
        }
    }

    let mut df = DataFrame::new(columns)?;

    for derived in schema.derived {
        let column: Column = match *derived {
            DerivedColumn::Constant { target, value } => {
                Series::new(target.into(), vec![value; height]).into()
            }
            DerivedColumn::Ratio {
                target,
                numerator,
                denominator,
            } => {
                let numerator = df.column(numerator)?.cast(&DataType::Float64)?;
                let denominator = df.column(denominator)?.cast(&DataType::Float64)?;
                let ratio: Vec<Option<f64>> = numerator
                    .f64()?
                    .iter()
                    .zip(denominator.f64()?.iter())
                    .map(|(n, d)| match (n, d) {
                        (Some(n), Some(d)) if d != 0.0 => Some(n / d),
                        _ => None,
                    })
                    .collect();
                Series::new(target.into(), ratio).into()
            }
        };
        df.with_column(column)?;
    }

    Ok(df)
}

/// The source column as text, or `None` when the raw table lacks it.
fn text_values(raw: &DataFrame, name: &str) -> Result<Option<StringChunked>, TransformError> {
    let Ok(column) = raw.column(name) else {
        return Ok(None);
    };
    let text = column.cast(&DataType::String)?;
    Ok(Some(text.str()?.clone()))
}

fn coerce<T>(
    values: Option<&StringChunked>,
    height: usize,
    column: &str,
    expected: &'static str,
    parse: fn(&str) -> Option<T>,
) -> Result<Vec<Option<T>>, TransformError>
where
    T: Clone,
{
    let Some(values) = values else {
        return Ok(vec![None; height]);
    };

    values
        .iter()
        .enumerate()
        .map(|(row, value)| match value.map(str::trim) {
            None | Some("") => Ok(None),
            Some(text) => parse(text)
                .map(Some)
                .ok_or_else(|| invalid(column, row, text, expected)),
        })
        .collect()
}

fn invalid(column: &str, row: usize, value: &str, expected: &'static str) -> TransformError {
    TransformError::InvalidValue {
        column: column.to_string(),
        row,
        value: value.to_string(),
        expected,
    }
}

/// Integers, including integral floats such as `"12.0"` that spreadsheet
/// exports produce for nullable integer columns.
fn parse_integer(raw: &str) -> Option<i64> {
    let trimmed = raw.trim();
    if let Ok(value) = trimmed.parse::<i64>() {
        return Some(value);
    }
    let value = trimmed.parse::<f64>().ok()?;
    let integral = value.is_finite() && value.fract() == 0.0 && value.abs() < 9.0e15;
    integral.then_some(value as i64)
}

fn parse_amount(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|value| value.is_finite())
}

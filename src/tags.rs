//! Tag extraction: derives the controlled vocabulary from categorical
//! columns of the raw record set.
//!
//! For most columns the tag list is the sorted set of distinct values
//! across all records. `Tasks` is split into individual comma-separated
//! tokens, and `Dialect` values have their parenthesized country name
//! extracted (`"Modern Standard Arabic"` is normalized to `"MSA"`).
//! The literal string `"nan"` is dropped from every tag list.

use serde_json::Value;

use crate::error::CatalogError;
use crate::models::{Record, TagIndex, DIALECT_COLUMN, TASKS_COLUMN};

/// Placeholder value emitted by the upstream export for missing cells.
const NAN_LITERAL: &str = "nan";

/// Normalization target for the long-form Modern Standard Arabic label.
const MSA_SHORT: &str = "MSA";
const MSA_LONG: &str = "Modern Standard Arabic";

/// Build the tag index from the full raw record set.
///
/// Column order follows the first record. Columns absent from some
/// records simply contribute the values they do have; absence of the
/// tracked `Tasks` or `Dialect` columns is tolerated.
pub fn extract_tags(records: &[Record]) -> Result<TagIndex, CatalogError> {
    let mut tags = TagIndex::new();

    let Some(first) = records.first() else {
        return Ok(tags);
    };

    for column in first.columns() {
        let values = match column.as_str() {
            TASKS_COLUMN => tokenize_column(records, &column, split_tasks)?,
            DIALECT_COLUMN => tokenize_column(records, &column, split_dialects)?,
            _ => distinct_scalars(records, &column)?,
        };
        tags.insert(column, Value::Array(values));
    }

    Ok(tags)
}

/// Distinct scalar values for one column, sorted and deduplicated.
fn distinct_scalars(records: &[Record], column: &str) -> Result<Vec<Value>, CatalogError> {
    let values: Vec<&Value> = records.iter().filter_map(|rec| rec.get(column)).collect();
    sorted_unique(column, values)
}

/// Collect string tokens for one column with a per-value splitter.
fn tokenize_column(
    records: &[Record],
    column: &str,
    split: fn(&str) -> Result<Vec<String>, CatalogError>,
) -> Result<Vec<Value>, CatalogError> {
    let mut tokens: Vec<String> = Vec::new();

    for rec in records {
        // Null or missing cells contribute nothing.
        let Some(raw) = rec.get(column).and_then(Value::as_str) else {
            continue;
        };
        tokens.extend(split(raw)?);
    }

    tokens.sort();
    tokens.dedup();
    tokens.retain(|t| t != NAN_LITERAL);

    Ok(tokens.into_iter().map(Value::String).collect())
}

/// Split a `Tasks` cell on commas, trimming whitespace and dropping
/// empty tokens.
fn split_tasks(raw: &str) -> Result<Vec<String>, CatalogError> {
    Ok(raw
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect())
}

/// Split a `Dialect` cell on commas and extract the country name from
/// each token: the substring between the last `(` and the following `)`.
///
/// A token without parentheses indicates upstream schema drift and is
/// surfaced as [`CatalogError::MalformedFeature`].
fn split_dialects(raw: &str) -> Result<Vec<String>, CatalogError> {
    let mut countries = Vec::new();

    for token in raw.split(',') {
        let token = token.trim();
        if token.is_empty() {
            continue;
        }

        let country = token
            .rsplit_once('(')
            .and_then(|(_, rest)| rest.split_once(')'))
            .map(|(country, _)| country)
            .ok_or_else(|| CatalogError::MalformedFeature {
                column: DIALECT_COLUMN.to_string(),
                value: token.to_string(),
            })?;

        countries.push(if country == MSA_LONG {
            MSA_SHORT.to_string()
        } else {
            country.to_string()
        });
    }

    Ok(countries)
}

/// Sort and deduplicate a column's values.
///
/// Strings sort lexicographically and numbers numerically; a column
/// mixing the two cannot be ordered and is reported as malformed.
/// Nulls are skipped, and the literal `"nan"` is removed afterwards.
fn sorted_unique(column: &str, values: Vec<&Value>) -> Result<Vec<Value>, CatalogError> {
    let mut strings: Vec<&str> = Vec::new();
    let mut numbers: Vec<&Value> = Vec::new();

    for value in values {
        match value {
            Value::String(s) => strings.push(s),
            Value::Number(_) => numbers.push(value),
            Value::Null => {}
            other => {
                return Err(CatalogError::MalformedFeature {
                    column: column.to_string(),
                    value: other.to_string(),
                })
            }
        }
    }

    if !strings.is_empty() && !numbers.is_empty() {
        return Err(CatalogError::MalformedFeature {
            column: column.to_string(),
            value: "mixed string and numeric values".to_string(),
        });
    }

    if !numbers.is_empty() {
        numbers.sort_by(|a, b| {
            a.as_f64()
                .unwrap_or(f64::NAN)
                .total_cmp(&b.as_f64().unwrap_or(f64::NAN))
        });
        numbers.dedup_by(|a, b| a.as_f64() == b.as_f64());
        return Ok(numbers.into_iter().cloned().collect());
    }

    strings.sort_unstable();
    strings.dedup();
    strings.retain(|s| *s != NAN_LITERAL);

    Ok(strings.into_iter().map(|s| Value::String(s.to_string())).collect())
}

//! DataFrame column helpers with validation
//!
//! SISAL tables are loosely typed CSVs: ids may be inferred as strings, numeric
//! columns may contain junk, optional columns may be absent in older snapshots.
//! These helpers turn that into typed vectors with explicit error context.

use polars::prelude::*;
use anyhow::{Context, Result, anyhow};
use std::collections::HashSet;

/// Names of all columns in a DataFrame
pub fn column_names(df: &DataFrame) -> HashSet<String> {
    df.get_column_names()
        .into_iter()
        .map(|s| s.to_string())
        .collect()
}

/// Fail with a readable message unless every `required` column is present
pub fn require_columns(df: &DataFrame, required: &[&str], context: &str) -> Result<()> {
    let actual = column_names(df);
    let missing: Vec<&str> = required.iter()
        .copied()
        .filter(|c| !actual.contains(*c))
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(anyhow!(
            "{}: Missing required column(s) {:?}. Available columns: {:?}",
            context, missing, actual
        ))
    }
}

/// Integer id column, coerced to Int64. Unparsable cells become `None`.
pub fn i64_values(df: &DataFrame, name: &str, context: &str) -> Result<Vec<Option<i64>>> {
    let cast = df.column(name)
        .with_context(|| format!("{}: Missing {} column", context, name))?
        .cast(&DataType::Int64)
        .with_context(|| format!("{}: Column '{}' is not integer-like", context, name))?;

    Ok(cast.i64()?.into_iter().collect())
}

/// Numeric column, coerced to Float64. Absent column → all `None`.
///
/// Malformed cells are nulled by the non-strict cast rather than reported.
pub fn f64_values(df: &DataFrame, name: &str, context: &str) -> Result<Vec<Option<f64>>> {
    if !column_names(df).contains(name) {
        return Ok(vec![None; df.height()]);
    }

    let cast = df.column(name)?
        .cast(&DataType::Float64)
        .with_context(|| format!("{}: Column '{}' cannot be read as numeric", context, name))?;

    Ok(cast.f64()?
        .into_iter()
        .map(|v| v.filter(|x| x.is_finite()))
        .collect())
}

/// Text column. Absent column → all `None`.
pub fn str_values(df: &DataFrame, name: &str, context: &str) -> Result<Vec<Option<String>>> {
    if !column_names(df).contains(name) {
        return Ok(vec![None; df.height()]);
    }

    let cast = df.column(name)?
        .cast(&DataType::String)
        .with_context(|| format!("{}: Column '{}' cannot be read as text", context, name))?;

    Ok(cast.str()?
        .into_iter()
        .map(|v| v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()))
        .collect())
}

/// First of `candidates` present in the DataFrame
pub fn first_present<'a>(df: &DataFrame, candidates: &[&'a str]) -> Option<&'a str> {
    let actual = column_names(df);
    candidates.iter().copied().find(|c| actual.contains(*c))
}

//! Reader for NOAA / published speleothem text files
//!
//! These files open with a free-text block (often `#`-prefixed metadata of
//! variable length) followed by a tab-delimited table. The table starts at the
//! first non-comment line that has at least two tab-separated fields and is not
//! purely numeric; that line names the columns.

use std::path::Path;

use anyhow::{anyhow, Context, Result};

use crate::utils::age::bp_to_ce;

#[derive(Debug, Clone, PartialEq)]
pub struct NoaaTable {
    /// Free-text lines preceding the column header
    pub header: Vec<String>,
    pub columns: Vec<String>,
    /// One entry per data line; cells that do not parse are `None`
    pub rows: Vec<Vec<Option<f64>>>,
}

/// How the age column of a published file is expressed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgeScale {
    /// Years before 1950
    BeforePresent,
    /// Calendar years
    CommonEra,
}

impl NoaaTable {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("Failed to parse {}", path.display()))
    }

    /// Parse a published record
    ///
    /// Every data row must have exactly as many tab-separated fields as the
    /// column header line.
    ///
    /// # Errors
    /// Returns error if no column header line is found or a row is ragged.
    pub fn parse(text: &str) -> Result<Self> {
        let lines: Vec<&str> = text.lines().collect();
        let header_len = lines.iter()
            .position(|l| is_column_header(l))
            .ok_or_else(|| anyhow!("No tab-delimited column header line found"))?;
        let header = lines[..header_len].iter().map(|l| l.to_string()).collect();

        let body = lines[header_len..].join("\n");
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(true)
            .comment(Some(b'#'))
            .quoting(false)
            .trim(csv::Trim::All)
            .from_reader(body.as_bytes());

        let columns: Vec<String> = reader
            .headers()
            .context("reading column header")?
            .iter()
            .map(|h| h.to_string())
            .collect();

        let mut rows = Vec::new();
        for (row_no, record) in reader.records().enumerate() {
            let record = record.with_context(|| format!("data row {}", row_no + 1))?;
            rows.push(record.iter().map(parse_cell).collect());
        }

        Ok(Self { header, columns, rows })
    }

    /// Index of the first column whose name matches (case-insensitive)
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.eq_ignore_ascii_case(name))
    }

    /// Values of one column
    pub fn column(&self, name: &str) -> Result<Vec<Option<f64>>> {
        let idx = self.column_index(name)
            .ok_or_else(|| anyhow!("Column '{}' not found. Available columns: {:?}", name, self.columns))?;
        Ok(self.rows.iter().map(|r| r[idx]).collect())
    }

    /// (year CE, value) pairs sorted by year, rows missing either value dropped
    pub fn series(&self, age_column: &str, value_column: &str, scale: AgeScale) -> Result<Vec<(f64, f64)>> {
        let ages = self.column(age_column)?;
        let values = self.column(value_column)?;

        let mut pairs: Vec<(f64, f64)> = ages.into_iter()
            .zip(values)
            .filter_map(|(a, v)| {
                let year = match scale {
                    AgeScale::BeforePresent => bp_to_ce(a?),
                    AgeScale::CommonEra => a?,
                };
                Some((year, v?))
            })
            .collect();
        pairs.sort_by(|a, b| a.0.total_cmp(&b.0));
        Ok(pairs)
    }
}

fn parse_cell(cell: &str) -> Option<f64> {
    cell.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

fn is_column_header(line: &str) -> bool {
    if line.trim_start().starts_with('#') {
        return false;
    }
    let fields: Vec<&str> = line.split('\t').map(str::trim).collect();
    fields.len() >= 2
        && fields.iter().any(|f| !f.is_empty())
        && fields.iter().any(|f| !f.is_empty() && parse_cell(f).is_none())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
# Speleothem record, Sofular Cave
# Contributor: someone
#  Missing value: NaN
Data collected 2009, see paper
depth_mm\tage_BP\td18O
0.5\t-40\t-8.1
1.0\t10\t-7.9
1.5\t60\tNaN

2.0\t110\t-8.4
";

    #[test]
    fn test_header_ends_at_column_line() {
        let table = NoaaTable::parse(SAMPLE).unwrap();
        assert_eq!(table.columns, vec!["depth_mm", "age_BP", "d18O"]);
        assert_eq!(table.header.len(), 4);
        assert_eq!(table.rows.len(), 4);
        assert_eq!(table.rows[2], vec![Some(1.5), Some(60.0), None]);
    }

    #[test]
    fn test_series_extraction() {
        let text = "# meta\n# more meta\nage_BP\td18O\n100\t-5.0\n50\tbad\n0\t-4.0\n";
        let table = NoaaTable::parse(text).unwrap();
        assert_eq!(table.rows.len(), 3);

        let series = table.series("age_bp", "D18O", AgeScale::BeforePresent).unwrap();
        assert_eq!(series, vec![(1850.0, -5.0), (1950.0, -4.0)]);
    }

    #[test]
    fn test_ce_scale_and_empty_cells() {
        let text = "year\tvalue\textra\n1500\t1.5\t\n1400\t2.5\t9\n";
        let table = NoaaTable::parse(text).unwrap();
        assert_eq!(table.rows[0], vec![Some(1500.0), Some(1.5), None]);

        let series = table.series("year", "value", AgeScale::CommonEra).unwrap();
        assert_eq!(series, vec![(1400.0, 2.5), (1500.0, 1.5)]);
    }

    #[test]
    fn test_ragged_rows_are_rejected() {
        // Leading tab shifts 200 into the d18O column
        let shifted = "age_BP\td18O\n100\t-5.0\n\t200\t-6.0\n";
        let err = NoaaTable::parse(shifted).unwrap_err();
        assert!(format!("{:#}", err).contains("data row 2"));

        let short = "age_BP\td18O\textra\n100\t-5.0\t1\n200\t-6.0\n";
        assert!(NoaaTable::parse(short).is_err());
    }

    #[test]
    fn test_missing_header_and_column() {
        assert!(NoaaTable::parse("# only comments\n1\t2\n").is_err());
        let table = NoaaTable::parse("a\tb\n1\t2\n").unwrap();
        assert!(table.column("c").is_err());
    }
}

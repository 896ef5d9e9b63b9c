//! IONEX total-electron-content maps
//!
//! Parses the IONosphere map EXchange text format: an 80-column header whose
//! record label sits in columns 61-80, then TEC maps made of latitude rows
//! (`LAT/LON1/LON2/DLON/H`) each followed by I5 values, 16 per line.
//! Values are in units of 10^EXPONENT TECU; 9999 marks a missing value.
//! RMS and height maps are skipped.

use std::path::Path;

use anyhow::Context;
use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;
use thiserror::Error;

const MISSING: i64 = 9999;
const LABEL_COL: usize = 60;

#[derive(Debug, Error, PartialEq)]
pub enum IonexError {
    #[error("Missing header record: {0}")]
    MissingHeader(&'static str),

    #[error("Line {line}: cannot parse {what} from {text:?}")]
    BadField { line: usize, what: &'static str, text: String },

    #[error("Line {line}: TEC map {map} ended before all values were read")]
    TruncatedMap { line: usize, map: usize },
}

/// Evenly spaced grid axis, e.g. 87.5 → -87.5 step -2.5
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GridAxis {
    pub start: f64,
    pub end: f64,
    pub step: f64,
}

impl GridAxis {
    pub fn len(&self) -> usize {
        if self.step == 0.0 {
            return 1;
        }
        ((self.end - self.start) / self.step).round() as usize + 1
    }

    pub fn values(&self) -> Vec<f64> {
        (0..self.len()).map(|i| self.start + i as f64 * self.step).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IonexHeader {
    pub first_epoch: Option<NaiveDateTime>,
    pub interval_s: Option<u32>,
    pub n_maps: Option<usize>,
    pub lat: GridAxis,
    pub lon: GridAxis,
    pub exponent: i32,
}

/// Lat/lon bounding box, degrees (inclusive)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, serde::Deserialize)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl BoundingBox {
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        self.min_lat <= lat && lat <= self.max_lat && self.min_lon <= lon && lon <= self.max_lon
    }
}

/// One TEC map in TECU
#[derive(Debug, Clone, PartialEq)]
pub struct TecMap {
    pub index: usize,
    pub epoch: Option<NaiveDateTime>,
    /// Latitude of each row
    pub lats: Vec<f64>,
    /// Longitudes shared by every row
    pub lons: Vec<f64>,
    /// Row-major: values[row][col]
    pub values: Vec<Vec<Option<f64>>>,
}

impl TecMap {
    /// TEC at the grid node nearest to (lat, lon)
    pub fn tec_at(&self, lat: f64, lon: f64) -> Option<f64> {
        let row = nearest(&self.lats, lat)?;
        let col = nearest(&self.lons, lon)?;
        self.values.get(row)?.get(col).copied().flatten()
    }

    /// Mean TEC over grid nodes inside `bbox`; `None` when no valid node falls inside
    pub fn regional_mean(&self, bbox: &BoundingBox) -> Option<f64> {
        let mut inside = Vec::new();
        for (lat, row) in self.lats.iter().zip(&self.values) {
            for (lon, value) in self.lons.iter().zip(row) {
                if let Some(v) = value {
                    if bbox.contains(*lat, *lon) {
                        inside.push(*v);
                    }
                }
            }
        }
        crate::utils::stats::stable_mean(&inside)
    }
}

fn nearest(axis: &[f64], x: f64) -> Option<usize> {
    axis.iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| (*a - x).abs().total_cmp(&(*b - x).abs()))
        .map(|(i, _)| i)
}

#[derive(Debug, Clone, PartialEq)]
pub struct IonexFile {
    pub header: IonexHeader,
    pub maps: Vec<TecMap>,
}

impl IonexFile {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read IONEX file: {}", path.display()))?;
        let file = Self::parse(&text)
            .with_context(|| format!("Failed to parse IONEX file: {}", path.display()))?;
        tracing::info!("Loaded {} TEC maps from {}", file.maps.len(), path.display());
        Ok(file)
    }

    pub fn parse(text: &str) -> Result<Self, IonexError> {
        let lines: Vec<&str> = text.lines().collect();
        let (header, body_start) = parse_header(&lines)?;
        let maps = parse_maps(&lines, body_start, &header)?;
        Ok(Self { header, maps })
    }

    /// (epoch, regional mean TEC) per map
    pub fn regional_series(&self, bbox: &BoundingBox) -> Vec<(Option<NaiveDateTime>, Option<f64>)> {
        self.maps.iter().map(|m| (m.epoch, m.regional_mean(bbox))).collect()
    }
}

fn split_record(line: &str) -> (&str, &str) {
    if line.len() > LABEL_COL && line.is_char_boundary(LABEL_COL) {
        (&line[..LABEL_COL], line[LABEL_COL..].trim())
    } else {
        (line, "")
    }
}

fn parse_numbers<T: std::str::FromStr>(content: &str, line: usize, what: &'static str) -> Result<Vec<T>, IonexError> {
    content
        .split_whitespace()
        .map(|tok| {
            tok.parse::<T>().map_err(|_| IonexError::BadField {
                line,
                what,
                text: content.trim().to_string(),
            })
        })
        .collect()
}

/// `count` fixed-width float fields starting after `skip` chars
fn fixed_width_floats(content: &str, skip: usize, width: usize, count: usize, line: usize, what: &'static str) -> Result<Vec<f64>, IonexError> {
    (0..count)
        .map(|i| {
            let start = skip + i * width;
            let field = content.get(start..(start + width).min(content.len())).unwrap_or("").trim();
            field.parse::<f64>().map_err(|_| IonexError::BadField {
                line,
                what,
                text: content.trim().to_string(),
            })
        })
        .collect()
}

fn parse_epoch(content: &str, line: usize) -> Result<Option<NaiveDateTime>, IonexError> {
    let parts: Vec<u32> = parse_numbers(content, line, "epoch")?;
    if parts.len() < 6 {
        return Err(IonexError::BadField { line, what: "epoch", text: content.trim().to_string() });
    }
    Ok(NaiveDate::from_ymd_opt(parts[0] as i32, parts[1], parts[2])
        .and_then(|d| d.and_hms_opt(parts[3], parts[4], parts[5])))
}

fn parse_axis(content: &str, line: usize, what: &'static str) -> Result<GridAxis, IonexError> {
    let v = fixed_width_floats(content, 2, 6, 3, line, what)
        .or_else(|_| parse_numbers::<f64>(content, line, what))?;
    if v.len() < 3 {
        return Err(IonexError::BadField { line, what, text: content.trim().to_string() });
    }
    Ok(GridAxis { start: v[0], end: v[1], step: v[2] })
}

fn parse_header(lines: &[&str]) -> Result<(IonexHeader, usize), IonexError> {
    let mut first_epoch = None;
    let mut interval_s = None;
    let mut n_maps = None;
    let mut lat = None;
    let mut lon = None;
    let mut exponent = -1;

    for (i, raw) in lines.iter().enumerate() {
        let line_no = i + 1;
        let (content, label) = split_record(raw);
        match label {
            "EPOCH OF FIRST MAP" => first_epoch = parse_epoch(content, line_no)?,
            "INTERVAL" => interval_s = parse_numbers::<u32>(content, line_no, "interval")?.first().copied(),
            "# OF MAPS IN FILE" => n_maps = parse_numbers::<usize>(content, line_no, "map count")?.first().copied(),
            "LAT1 / LAT2 / DLAT" => lat = Some(parse_axis(content, line_no, "latitude axis")?),
            "LON1 / LON2 / DLON" => lon = Some(parse_axis(content, line_no, "longitude axis")?),
            "EXPONENT" => {
                exponent = parse_numbers::<i32>(content, line_no, "exponent")?.first().copied().unwrap_or(-1)
            }
            "END OF HEADER" => {
                let header = IonexHeader {
                    first_epoch,
                    interval_s,
                    n_maps,
                    lat: lat.ok_or(IonexError::MissingHeader("LAT1 / LAT2 / DLAT"))?,
                    lon: lon.ok_or(IonexError::MissingHeader("LON1 / LON2 / DLON"))?,
                    exponent,
                };
                return Ok((header, i + 1));
            }
            _ => {}
        }
    }

    Err(IonexError::MissingHeader("END OF HEADER"))
}

fn scale(raw: i64, exponent: i32) -> f64 {
    if exponent < 0 {
        raw as f64 / 10f64.powi(-exponent)
    } else {
        raw as f64 * 10f64.powi(exponent)
    }
}

fn parse_maps(lines: &[&str], start: usize, header: &IonexHeader) -> Result<Vec<TecMap>, IonexError> {
    let mut maps = Vec::new();
    let mut i = start;

    while i < lines.len() {
        let (content, label) = split_record(lines[i]);
        if label != "START OF TEC MAP" {
            i += 1;
            continue;
        }

        let map_index = parse_numbers::<usize>(content, i + 1, "map index")?.first().copied().unwrap_or(maps.len() + 1);
        let mut epoch = None;
        let mut lats = Vec::new();
        let mut lons = header.lon.values();
        let mut values = Vec::new();
        i += 1;

        loop {
            let Some(raw) = lines.get(i) else {
                return Err(IonexError::TruncatedMap { line: i, map: map_index });
            };
            let (content, label) = split_record(raw);
            match label {
                "END OF TEC MAP" => {
                    i += 1;
                    break;
                }
                "EPOCH OF CURRENT MAP" => {
                    epoch = parse_epoch(content, i + 1)?;
                    i += 1;
                }
                "LAT/LON1/LON2/DLON/H" => {
                    let row = fixed_width_floats(content, 2, 6, 5, i + 1, "latitude row")?;
                    let row_axis = GridAxis { start: row[1], end: row[2], step: row[3] };
                    let n = row_axis.len();
                    if lats.is_empty() {
                        lons = row_axis.values();
                    }
                    lats.push(row[0]);
                    i += 1;

                    let mut row_values = Vec::with_capacity(n);
                    while row_values.len() < n {
                        let Some(data) = lines.get(i) else {
                            return Err(IonexError::TruncatedMap { line: i, map: map_index });
                        };
                        if split_record(data).1.starts_with("END OF") {
                            return Err(IonexError::TruncatedMap { line: i + 1, map: map_index });
                        }
                        for chunk in data.as_bytes().chunks(5) {
                            if row_values.len() == n {
                                break;
                            }
                            let text = std::str::from_utf8(chunk).unwrap_or("").trim();
                            if text.is_empty() {
                                continue;
                            }
                            let raw_value: i64 = text.parse().map_err(|_| IonexError::BadField {
                                line: i + 1,
                                what: "TEC value",
                                text: text.to_string(),
                            })?;
                            row_values.push((raw_value != MISSING).then(|| scale(raw_value, header.exponent)));
                        }
                        i += 1;
                    }
                    values.push(row_values);
                }
                _ => i += 1,
            }
        }

        maps.push(TecMap { index: map_index, epoch, lats, lons, values });
    }

    if let Some(expected) = header.n_maps {
        if expected != maps.len() {
            tracing::warn!("IONEX header announces {} maps, found {}", expected, maps.len());
        }
    }

    Ok(maps)
}

//! Proxy catalogue
//!
//! SISAL v3 ships one CSV per proxy, named after the proxy stem, with the
//! value stored in `<stem>_measurement`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Proxy {
    #[serde(rename = "d18O")]
    D18O,
    #[serde(rename = "d13C")]
    D13C,
    #[serde(rename = "Mg_Ca")]
    MgCa,
    #[serde(rename = "Sr_Ca")]
    SrCa,
    #[serde(rename = "U_Ca")]
    UCa,
    #[serde(rename = "Ba_Ca")]
    BaCa,
    #[serde(rename = "P_Ca")]
    PCa,
}

impl Proxy {
    pub const ALL: [Proxy; 7] = [
        Proxy::D18O,
        Proxy::D13C,
        Proxy::MgCa,
        Proxy::SrCa,
        Proxy::UCa,
        Proxy::BaCa,
        Proxy::PCa,
    ];

    /// File stem, e.g. `Mg_Ca`
    pub fn stem(&self) -> &'static str {
        match self {
            Proxy::D18O => "d18O",
            Proxy::D13C => "d13C",
            Proxy::MgCa => "Mg_Ca",
            Proxy::SrCa => "Sr_Ca",
            Proxy::UCa => "U_Ca",
            Proxy::BaCa => "Ba_Ca",
            Proxy::PCa => "P_Ca",
        }
    }

    pub fn file_name(&self) -> String {
        format!("{}.csv", self.stem())
    }

    pub fn measurement_column(&self) -> String {
        format!("{}_measurement", self.stem())
    }
}

impl fmt::Display for Proxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.stem())
    }
}

impl FromStr for Proxy {
    type Err = anyhow::Error;

    /// Accepts the file stem (`Mg_Ca`) or the slash form (`Mg/Ca`), any case
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().replace('/', "_").to_ascii_lowercase();
        Proxy::ALL
            .iter()
            .copied()
            .find(|p| p.stem().to_ascii_lowercase() == key)
            .ok_or_else(|| anyhow::anyhow!("Unknown proxy: {}", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_variants() {
        assert_eq!("d18O".parse::<Proxy>().unwrap(), Proxy::D18O);
        assert_eq!("Mg/Ca".parse::<Proxy>().unwrap(), Proxy::MgCa);
        assert_eq!("sr_ca".parse::<Proxy>().unwrap(), Proxy::SrCa);
        assert!("Fe/Ca".parse::<Proxy>().is_err());
    }

    #[test]
    fn test_file_layout() {
        assert_eq!(Proxy::BaCa.file_name(), "Ba_Ca.csv");
        assert_eq!(Proxy::D13C.measurement_column(), "d13C_measurement");
    }

    #[test]
    fn test_serde_uses_stem() {
        let json = serde_json::to_string(&vec![Proxy::D18O, Proxy::UCa]).unwrap();
        assert_eq!(json, r#"["d18O","U_Ca"]"#);
    }
}

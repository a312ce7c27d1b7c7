//! Location model: geographic positions, coarse zones, and data locality.
//!
//! Placement reasons about *zones* (local, edge, fog, cloud, hpc) rather
//! than raw coordinates. Zones form a rough chain by network distance:
//! local ↔ edge ↔ fog ↔ cloud ↔ hpc. Data locality is scored against that
//! chain plus an optional region tag.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Geographic position advertised by an executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoLocation {
    pub longitude: f64,
    pub latitude: f64,
    pub description: String,
}

impl GeoLocation {
    pub fn new(longitude: f64, latitude: f64, description: impl Into<String>) -> Self {
        Self {
            longitude,
            latitude,
            description: description.into(),
        }
    }
}

/// Coarse network zone for executors and data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Zone {
    Local,
    Edge,
    Fog,
    Cloud,
    Hpc,
}

impl Zone {
    /// Position along the local→hpc distance chain.
    fn chain_index(self) -> i32 {
        match self {
            Zone::Local => 0,
            Zone::Edge => 1,
            Zone::Fog => 2,
            Zone::Cloud => 3,
            Zone::Hpc => 4,
        }
    }

    /// Whether two zones are direct neighbours on the chain.
    pub fn is_adjacent(self, other: Zone) -> bool {
        (self.chain_index() - other.chain_index()).abs() == 1
    }
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Zone::Local => "local",
            Zone::Edge => "edge",
            Zone::Fog => "fog",
            Zone::Cloud => "cloud",
            Zone::Hpc => "hpc",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for Zone {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "local" => Ok(Zone::Local),
            "edge" => Ok(Zone::Edge),
            "fog" => Ok(Zone::Fog),
            "cloud" => Ok(Zone::Cloud),
            "hpc" => Ok(Zone::Hpc),
            other => Err(format!("unknown zone tag: {}", other)),
        }
    }
}

/// Where a dataset currently lives.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DataLocation {
    pub zone: Zone,
    /// Region tag for cross-zone co-location (e.g. "eu-north").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
}

impl DataLocation {
    pub fn new(zone: Zone) -> Self {
        Self { zone, region: None }
    }

    pub fn in_region(zone: Zone, region: impl Into<String>) -> Self {
        Self {
            zone,
            region: Some(region.into()),
        }
    }
}

impl fmt::Display for DataLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.region {
            Some(region) => write!(f, "{}/{}", self.zone, region),
            None => write!(f, "{}", self.zone),
        }
    }
}

/// Locality score between a data location and an executor location.
///
/// 1.0 same zone, 0.7 different zone in the same region, 0.4 adjacent
/// zones, 0.1 otherwise.
pub fn locality_score(data: &DataLocation, executor: &DataLocation) -> f64 {
    if data.zone == executor.zone {
        return 1.0;
    }
    if let (Some(a), Some(b)) = (&data.region, &executor.region) {
        if a == b {
            return 0.7;
        }
    }
    if data.zone.is_adjacent(executor.zone) {
        return 0.4;
    }
    0.1
}

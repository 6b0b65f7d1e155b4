//! Database models

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::Error;

/// Coordinates are stored with 7 decimal places (~1cm)
pub const COORDINATE_DECIMALS: i32 = 7;

/// Round a latitude/longitude to the stored precision
pub fn round_coordinate(value: f64) -> f64 {
    let scale = 10f64.powi(COORDINATE_DECIMALS);
    (value * scale).round() / scale
}

/// Level of a node in the state → county → city → neighborhood forest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegionType {
    State,
    County,
    City,
    Neighborhood,
}

impl RegionType {
    pub const ALL: [RegionType; 4] = [
        RegionType::State,
        RegionType::County,
        RegionType::City,
        RegionType::Neighborhood,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RegionType::State => "state",
            RegionType::County => "county",
            RegionType::City => "city",
            RegionType::Neighborhood => "neighborhood",
        }
    }
}

impl fmt::Display for RegionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RegionType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "state" => Ok(RegionType::State),
            "county" => Ok(RegionType::County),
            "city" => Ok(RegionType::City),
            "neighborhood" => Ok(RegionType::Neighborhood),
            other => Err(Error::InvalidInput(format!("Unknown region type: {}", other))),
        }
    }
}

/// Node of the geographic taxonomy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    #[serde(rename = "type")]
    pub region_type: RegionType,
    pub parent_id: Option<Uuid>,
    pub description: Option<String>,
    pub is_active: bool,
    pub display_order: i64,
    pub metadata: Option<serde_json::Value>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl Region {
    /// New inactive region with a fresh id and no metadata
    pub fn new(name: String, slug: String, region_type: RegionType, parent_id: Option<Uuid>) -> Self {
        Self {
            id: crate::uuid_utils::generate(),
            name,
            slug,
            region_type,
            parent_id,
            description: None,
            is_active: false,
            display_order: 0,
            metadata: None,
            latitude: None,
            longitude: None,
        }
    }

    pub fn has_coordinates(&self) -> bool {
        self.latitude.is_some() && self.longitude.is_some()
    }
}

/// Lifecycle status of a business listing
///
/// Statuses this service does not know are carried through as `Other`
/// rather than rejected, so archives from newer stores still import.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum BusinessStatus {
    Active,
    Inactive,
    Pending,
    Suspended,
    Other(String),
}

impl BusinessStatus {
    pub fn as_str(&self) -> &str {
        match self {
            BusinessStatus::Active => "active",
            BusinessStatus::Inactive => "inactive",
            BusinessStatus::Pending => "pending",
            BusinessStatus::Suspended => "suspended",
            BusinessStatus::Other(status) => status,
        }
    }
}

impl fmt::Display for BusinessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BusinessStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "" => Err(Error::InvalidInput("Business status must not be empty".into())),
            "active" => Ok(BusinessStatus::Active),
            "inactive" => Ok(BusinessStatus::Inactive),
            "pending" => Ok(BusinessStatus::Pending),
            "suspended" => Ok(BusinessStatus::Suspended),
            other => Ok(BusinessStatus::Other(other.to_string())),
        }
    }
}

impl TryFrom<String> for BusinessStatus {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<BusinessStatus> for String {
    fn from(status: BusinessStatus) -> Self {
        match status {
            BusinessStatus::Other(status) => status,
            known => known.as_str().to_string(),
        }
    }
}

/// Business listing with its region associations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Business {
    pub id: Uuid,
    pub google_place_id: Option<String>,
    pub name: String,
    pub slug: String,
    pub status: BusinessStatus,
    pub city: Option<String>,
    pub state: Option<String>,
    pub workspace_id: Option<Uuid>,
    pub region_ids: Vec<Uuid>,
}

impl Business {
    pub fn new(name: String, slug: String, status: BusinessStatus) -> Self {
        Self {
            id: crate::uuid_utils::generate(),
            google_place_id: None,
            name,
            slug,
            status,
            city: None,
            state: None,
            workspace_id: None,
            region_ids: Vec::new(),
        }
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One aircraft state vector as reported by the upstream feed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateVector {
    pub icao24: String,
    pub callsign: Option<String>,
    pub origin_country: String,
    pub time_position: Option<i64>,
    pub last_contact: i64,
    pub longitude: Option<f64>,
    pub latitude: Option<f64>,
    pub baro_altitude: Option<f64>,
    pub on_ground: bool,
    pub velocity: Option<f64>,
    pub true_track: Option<f64>,
    pub vertical_rate: Option<f64>,
    pub sensors: Option<Vec<i32>>,
    pub geo_altitude: Option<f64>,
    pub squawk: Option<String>,
    pub spi: bool,
    pub position_source: i32,
    pub category: Option<i32>,
}

/// One departure/arrival pair from the flights endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Flight {
    pub icao24: String,
    pub first_seen: i64,
    pub est_departure_airport: Option<String>,
    pub last_seen: i64,
    pub est_arrival_airport: Option<String>,
    pub callsign: Option<String>,
    pub est_departure_airport_horiz_distance: Option<i64>,
    pub est_departure_airport_vert_distance: Option<i64>,
    pub est_arrival_airport_horiz_distance: Option<i64>,
    pub est_arrival_airport_vert_distance: Option<i64>,
    pub departure_airport_candidates_count: Option<i64>,
    pub arrival_airport_candidates_count: Option<i64>,
}

/// Which upstream dataset a run ingests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataKind {
    #[default]
    States,
    Flights,
}

impl DataKind {
    /// Path segment and config value.
    pub fn as_str(&self) -> &'static str {
        match self {
            DataKind::States => "states",
            DataKind::Flights => "flights",
        }
    }
}

impl std::fmt::Display for DataKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DataKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "states" => Ok(DataKind::States),
            "flights" => Ok(DataKind::Flights),
            other => Err(format!("unknown data type {other:?}")),
        }
    }
}

/// Rows of a batch, all of one kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Records {
    States(Vec<StateVector>),
    Flights(Vec<Flight>),
}

/// A batch of records captured at one instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub capture_time: DateTime<Utc>,
    pub records: Records,
}

impl Snapshot {
    pub fn new(capture_time: DateTime<Utc>, states: Vec<StateVector>) -> Self {
        Self {
            capture_time,
            records: Records::States(states),
        }
    }

    pub fn flights(capture_time: DateTime<Utc>, flights: Vec<Flight>) -> Self {
        Self {
            capture_time,
            records: Records::Flights(flights),
        }
    }

    pub fn empty(capture_time: DateTime<Utc>) -> Self {
        Self::new(capture_time, Vec::new())
    }

    pub fn kind(&self) -> DataKind {
        match self.records {
            Records::States(_) => DataKind::States,
            Records::Flights(_) => DataKind::Flights,
        }
    }

    /// State vectors; empty for a flights batch.
    pub fn states(&self) -> &[StateVector] {
        match &self.records {
            Records::States(states) => states,
            Records::Flights(_) => &[],
        }
    }

    /// Flights; empty for a states batch.
    pub fn flight_records(&self) -> &[Flight] {
        match &self.records {
            Records::Flights(flights) => flights,
            Records::States(_) => &[],
        }
    }

    pub fn len(&self) -> usize {
        match &self.records {
            Records::States(states) => states.len(),
            Records::Flights(flights) => flights.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

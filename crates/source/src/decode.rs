//! Decoding of `/states/all` and `/flights/all` responses.
//!
//! The states endpoint returns each state vector as a positional JSON array
//! rather than an object; see the field table at
//! <https://openskynetwork.github.io/opensky-api/rest.html#all-state-vectors>.
//! Flights are plain objects.

use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use serde_json::Value;

use skytrack_core::{FetchError, Flight, Snapshot, StateVector};

/// Rows shorter than this are malformed. Index 17 (`category`) is optional.
const MIN_FIELDS: usize = 17;

#[derive(Debug, Deserialize)]
pub struct StatesResponse {
    pub time: i64,
    /// `null` when no aircraft are in the requested area.
    pub states: Option<Vec<Vec<Value>>>,
}

impl StatesResponse {
    pub fn into_snapshot(self) -> Result<Snapshot, FetchError> {
        let capture_time = capture_time(self.time)?;
        let states = self
            .states
            .unwrap_or_default()
            .iter()
            .enumerate()
            .map(|(i, row)| decode_row(row).map_err(|e| FetchError::Decode(format!("state {i}: {e}"))))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Snapshot::new(capture_time, states))
    }
}

/// Parse a raw response body into a snapshot.
pub fn decode_states(body: &str) -> Result<Snapshot, FetchError> {
    let response: StatesResponse =
        serde_json::from_str(body).map_err(|e| FetchError::Decode(e.to_string()))?;
    response.into_snapshot()
}

/// Parse a `/flights/all` body. The batch is stamped with `capture_time`,
/// normally the end of the requested window.
pub fn decode_flights(body: &str, capture_time: DateTime<Utc>) -> Result<Snapshot, FetchError> {
    let flights: Option<Vec<Flight>> =
        serde_json::from_str(body).map_err(|e| FetchError::Decode(e.to_string()))?;
    let flights = flights
        .unwrap_or_default()
        .into_iter()
        .map(|mut f| {
            f.callsign = f.callsign.map(|c| c.trim().to_string()).filter(|c| !c.is_empty());
            f
        })
        .collect();
    Ok(Snapshot::flights(capture_time, flights))
}

fn capture_time(secs: i64) -> Result<DateTime<Utc>, FetchError> {
    Utc.timestamp_opt(secs, 0)
        .single()
        .ok_or_else(|| FetchError::Decode(format!("invalid capture time {secs}")))
}

fn decode_row(row: &[Value]) -> Result<StateVector, String> {
    if row.len() < MIN_FIELDS {
        return Err(format!("expected at least {MIN_FIELDS} fields, got {}", row.len()));
    }

    let icao24 = row[0]
        .as_str()
        .filter(|s| !s.is_empty())
        .ok_or("missing icao24")?
        .to_string();

    Ok(StateVector {
        icao24,
        callsign: row[1].as_str().map(|s| s.trim().to_string()).filter(|s| !s.is_empty()),
        origin_country: row[2].as_str().unwrap_or_default().to_string(),
        time_position: row[3].as_i64(),
        last_contact: row[4].as_i64().ok_or("missing last_contact")?,
        longitude: row[5].as_f64(),
        latitude: row[6].as_f64(),
        baro_altitude: row[7].as_f64(),
        on_ground: row[8].as_bool().unwrap_or(false),
        velocity: row[9].as_f64(),
        true_track: row[10].as_f64(),
        vertical_rate: row[11].as_f64(),
        sensors: row[12].as_array().map(|ids| {
            ids.iter()
                .filter_map(|v| v.as_i64())
                .filter_map(|v| i32::try_from(v).ok())
                .collect()
        }),
        geo_altitude: row[13].as_f64(),
        squawk: row[14].as_str().map(str::to_string),
        spi: row[15].as_bool().unwrap_or(false),
        position_source: row[16].as_i64().and_then(|v| i32::try_from(v).ok()).unwrap_or(0),
        category: row.get(17).and_then(Value::as_i64).and_then(|v| i32::try_from(v).ok()),
    })
}

//! Encode a [`Snapshot`] as a typed, Zstd-compressed Parquet file.
//!
//! Every record becomes one row. State vectors and flights each have their
//! own schema; flight columns keep the upstream camelCase names. The
//! snapshot's capture time is repeated on each row as `capture_time` so
//! files can be concatenated downstream without losing it.

use std::sync::Arc;

use arrow::array::{
    ArrayRef, BooleanArray, Float64Array, Int32Array, Int32Builder, Int64Array, ListBuilder,
    StringArray, TimestampMillisecondArray,
};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef, TimeUnit};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use parquet::format::KeyValue;
use tracing::debug;

use skytrack_core::{DataKind, Flight, Records, Snapshot, StateVector};

use crate::error::ParquetError;

/// Arrow schema for state-vector rows.
pub fn state_schema() -> SchemaRef {
    let f64_col = |name: &str| Field::new(name, DataType::Float64, true);
    Arc::new(Schema::new(vec![
        Field::new("icao24", DataType::Utf8, false),
        Field::new("callsign", DataType::Utf8, true),
        Field::new("origin_country", DataType::Utf8, false),
        Field::new("time_position", DataType::Int64, true),
        Field::new("last_contact", DataType::Int64, false),
        f64_col("longitude"),
        f64_col("latitude"),
        f64_col("baro_altitude"),
        Field::new("on_ground", DataType::Boolean, false),
        f64_col("velocity"),
        f64_col("true_track"),
        f64_col("vertical_rate"),
        Field::new(
            "sensors",
            DataType::List(Arc::new(Field::new("item", DataType::Int32, true))),
            true,
        ),
        f64_col("geo_altitude"),
        Field::new("squawk", DataType::Utf8, true),
        Field::new("spi", DataType::Boolean, false),
        Field::new("position_source", DataType::Int32, false),
        Field::new("category", DataType::Int32, true),
        capture_time_field(),
    ]))
}

fn capture_time_field() -> Field {
    Field::new(
        "capture_time",
        DataType::Timestamp(TimeUnit::Millisecond, Some("UTC".into())),
        false,
    )
}

/// Arrow schema for flight rows.
pub fn flight_schema() -> SchemaRef {
    let i64_col = |name: &str| Field::new(name, DataType::Int64, true);
    Arc::new(Schema::new(vec![
        Field::new("icao24", DataType::Utf8, false),
        Field::new("firstSeen", DataType::Int64, false),
        Field::new("estDepartureAirport", DataType::Utf8, true),
        Field::new("lastSeen", DataType::Int64, false),
        Field::new("estArrivalAirport", DataType::Utf8, true),
        Field::new("callsign", DataType::Utf8, true),
        i64_col("estDepartureAirportHorizDistance"),
        i64_col("estDepartureAirportVertDistance"),
        i64_col("estArrivalAirportHorizDistance"),
        i64_col("estArrivalAirportVertDistance"),
        i64_col("departureAirportCandidatesCount"),
        i64_col("arrivalAirportCandidatesCount"),
        capture_time_field(),
    ]))
}

pub fn schema_for(kind: DataKind) -> SchemaRef {
    match kind {
        DataKind::States => state_schema(),
        DataKind::Flights => flight_schema(),
    }
}

fn floats(states: &[StateVector], get: impl Fn(&StateVector) -> Option<f64>) -> ArrayRef {
    Arc::new(states.iter().map(get).collect::<Float64Array>())
}

fn sensors(states: &[StateVector]) -> ArrayRef {
    let mut builder = ListBuilder::new(Int32Builder::new());
    for state in states {
        match &state.sensors {
            Some(ids) => {
                builder.values().append_slice(ids);
                builder.append(true);
            }
            None => builder.append(false),
        }
    }
    Arc::new(builder.finish())
}

fn capture_times(rows: usize, capture_ms: i64) -> ArrayRef {
    Arc::new(
        TimestampMillisecondArray::from_iter_values(std::iter::repeat(capture_ms).take(rows))
            .with_timezone("UTC"),
    )
}

/// Convert a snapshot into a single Arrow [`RecordBatch`].
pub fn snapshot_to_record_batch(snapshot: &Snapshot) -> Result<RecordBatch, ParquetError> {
    let capture_ms = snapshot.capture_time.timestamp_millis();
    match &snapshot.records {
        Records::States(states) => states_batch(states, capture_ms),
        Records::Flights(flights) => flights_batch(flights, capture_ms),
    }
}

fn flights_batch(flights: &[Flight], capture_ms: i64) -> Result<RecordBatch, ParquetError> {
    let ints = |get: fn(&Flight) -> Option<i64>| -> ArrayRef {
        Arc::new(flights.iter().map(get).collect::<Int64Array>())
    };

    let columns: Vec<ArrayRef> = vec![
        Arc::new(StringArray::from_iter_values(flights.iter().map(|f| f.icao24.as_str()))),
        Arc::new(Int64Array::from_iter_values(flights.iter().map(|f| f.first_seen))),
        Arc::new(flights.iter().map(|f| f.est_departure_airport.as_deref()).collect::<StringArray>()),
        Arc::new(Int64Array::from_iter_values(flights.iter().map(|f| f.last_seen))),
        Arc::new(flights.iter().map(|f| f.est_arrival_airport.as_deref()).collect::<StringArray>()),
        Arc::new(flights.iter().map(|f| f.callsign.as_deref()).collect::<StringArray>()),
        ints(|f| f.est_departure_airport_horiz_distance),
        ints(|f| f.est_departure_airport_vert_distance),
        ints(|f| f.est_arrival_airport_horiz_distance),
        ints(|f| f.est_arrival_airport_vert_distance),
        ints(|f| f.departure_airport_candidates_count),
        ints(|f| f.arrival_airport_candidates_count),
        capture_times(flights.len(), capture_ms),
    ];

    Ok(RecordBatch::try_new(flight_schema(), columns)?)
}

fn states_batch(states: &[StateVector], capture_ms: i64) -> Result<RecordBatch, ParquetError> {
    let columns: Vec<ArrayRef> = vec![
        Arc::new(StringArray::from_iter_values(states.iter().map(|s| s.icao24.as_str()))),
        Arc::new(states.iter().map(|s| s.callsign.as_deref()).collect::<StringArray>()),
        Arc::new(StringArray::from_iter_values(
            states.iter().map(|s| s.origin_country.as_str()),
        )),
        Arc::new(states.iter().map(|s| s.time_position).collect::<Int64Array>()),
        Arc::new(Int64Array::from_iter_values(states.iter().map(|s| s.last_contact))),
        floats(states, |s| s.longitude),
        floats(states, |s| s.latitude),
        floats(states, |s| s.baro_altitude),
        Arc::new(states.iter().map(|s| Some(s.on_ground)).collect::<BooleanArray>()),
        floats(states, |s| s.velocity),
        floats(states, |s| s.true_track),
        floats(states, |s| s.vertical_rate),
        sensors(states),
        floats(states, |s| s.geo_altitude),
        Arc::new(states.iter().map(|s| s.squawk.as_deref()).collect::<StringArray>()),
        Arc::new(states.iter().map(|s| Some(s.spi)).collect::<BooleanArray>()),
        Arc::new(Int32Array::from_iter_values(states.iter().map(|s| s.position_source))),
        Arc::new(states.iter().map(|s| s.category).collect::<Int32Array>()),
        capture_times(states.len(), capture_ms),
    ];

    Ok(RecordBatch::try_new(state_schema(), columns)?)
}

/// Encode a snapshot to an in-memory Parquet file.
///
/// Capture time and row count are also stored as footer key-value metadata.
pub fn encode_snapshot(snapshot: &Snapshot) -> Result<Vec<u8>, ParquetError> {
    let batch = snapshot_to_record_batch(snapshot)?;

    let props = WriterProperties::builder()
        .set_compression(Compression::ZSTD(Default::default()))
        .set_key_value_metadata(Some(vec![
            KeyValue::new(
                "skytrack.capture_time".to_string(),
                Some(snapshot.capture_time.to_rfc3339()),
            ),
            KeyValue::new("skytrack.data_type".to_string(), Some(snapshot.kind().to_string())),
            KeyValue::new(
                "skytrack.record_count".to_string(),
                Some(batch.num_rows().to_string()),
            ),
        ]))
        .build();

    let mut buf = Vec::new();
    let mut writer = ArrowWriter::try_new(&mut buf, batch.schema(), Some(props))?;
    writer.write(&batch)?;
    writer.close()?;

    debug!(rows = batch.num_rows(), bytes = buf.len(), "Encoded snapshot as Parquet");
    Ok(buf)
}

//! Shared fixtures for server tests: deterministic readings and the raw JSON
//! bodies devices actually send (numeric and stringly-typed forms).

use aeris_protocol::SensorReading;

/// A reading with metric values derived from the timestamp, so assertions can
/// reconstruct the expected values from `ts` alone.
pub fn reading(ts: i64) -> SensorReading {
    let base = (ts % 1000) as f64;
    SensorReading {
        timestamp: ts,
        temperature: 20.0 + base / 100.0,
        pressure: 101_325.0 + base,
        humidity: 40.0 + base / 50.0,
        oxidised: 1.0 + base / 1000.0,
        reduced: 0.9 + base / 1000.0,
        nh3: 0.5 + base / 1000.0,
        pm1: 2.0 + base / 10.0,
        pm2: 3.0 + base / 10.0,
        pm10: 4.0 + base / 10.0,
    }
}

/// Serialize a reading the way a well-behaved device would POST it.
pub fn reading_json(ts: i64) -> String {
    serde_json::to_string(&reading(ts)).expect("reading serializes")
}

/// The same reading with every field as a decimal string -- the lenient form
/// older firmware sends.
pub fn stringly_reading_json(ts: i64) -> String {
    let r = reading(ts);
    format!(
        concat!(
            r#"{{"timestamp":"{}","temperature":"{}","pressure":"{}","humidity":"{}","#,
            r#""oxidised":"{}","reduced":"{}","nh3":"{}","pm1":"{}","pm2":"{}","pm10":"{}"}}"#
        ),
        r.timestamp, r.temperature, r.pressure, r.humidity, r.oxidised, r.reduced, r.nh3, r.pm1,
        r.pm2, r.pm10
    )
}

/// A JSON array body for batch ingest over `timestamps`.
pub fn batch_json(timestamps: &[i64]) -> String {
    let items: Vec<String> = timestamps.iter().map(|&ts| reading_json(ts)).collect();
    format!("[{}]", items.join(","))
}

//! Journal record codec.
//!
//! One reading is one line:
//!
//! ```text
//! 2024/03/01 10:00:00,0.279400,3.450000,157.500000,21.200001,64.500000,101230.000000
//! ```
//!
//! Local timestamp first, then rain fall, wind speed, wind direction,
//! temperature, humidity and pressure rendered with six decimals. Both
//! directions are pure so they can be hammered with malformed input without
//! touching a medium.

use crate::clock::LocalZone;
use crate::error::DecodeError;
use crate::reading::SensorReading;

/// Number of comma-separated fields in a record line.
pub const FIELD_COUNT: usize = 7;

const NUMERIC_FIELDS: [&str; FIELD_COUNT - 1] = [
    "rain_fall",
    "wind_speed",
    "wind_direction",
    "temperature",
    "humidity",
    "pressure",
];

/// Render `reading` as a newline-terminated record line.
///
/// Returns `None` when the timestamp cannot be expressed as a calendar time.
pub fn encode(reading: &SensorReading, zone: LocalZone) -> Option<String> {
    let stamp = zone.format(reading.timestamp)?;
    Some(format!(
        "{},{:.6},{:.6},{:.6},{:.6},{:.6},{:.6}\n",
        stamp,
        reading.rain_fall,
        reading.wind_speed,
        reading.wind_direction,
        reading.temperature,
        reading.humidity,
        reading.pressure,
    ))
}

/// Decode a record line, reporting why it was rejected.
pub fn try_decode(line: &str, zone: LocalZone) -> Result<SensorReading, DecodeError> {
    let line = line.trim_end_matches(['\r', '\n']);
    let fields: Vec<&str> = line.split(',').collect();
    if fields.len() != FIELD_COUNT {
        return Err(DecodeError::FieldCount(fields.len()));
    }

    let timestamp = zone.parse(fields[0])?;

    let mut values = [0.0_f32; FIELD_COUNT - 1];
    for ((slot, raw), name) in values.iter_mut().zip(&fields[1..]).zip(NUMERIC_FIELDS) {
        let raw = raw.trim();
        *slot = raw.parse::<f32>().map_err(|_| DecodeError::Number {
            field: name,
            value: raw.to_string(),
        })?;
    }
    let [rain_fall, wind_speed, wind_direction, temperature, humidity, pressure] = values;

    Ok(SensorReading {
        timestamp,
        rain_fall,
        wind_speed,
        wind_direction,
        temperature,
        humidity,
        pressure,
        valid: true,
    })
}

/// Decode a record line. Any defect yields a reading with `valid == false`.
pub fn decode(line: &str, zone: LocalZone) -> SensorReading {
    try_decode(line, zone).unwrap_or(SensorReading::INVALID)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zone() -> LocalZone {
        LocalZone::from_offset_minutes(-4 * 60).unwrap()
    }

    fn sample(timestamp: i64) -> SensorReading {
        SensorReading {
            timestamp,
            rain_fall: 0.2794,
            wind_speed: 3.45,
            wind_direction: 157.5,
            temperature: 21.2,
            humidity: 64.5,
            pressure: 101_230.0,
            valid: true,
        }
    }

    #[test]
    fn encodes_local_timestamp_and_six_decimals() {
        let ts = zone().parse("2024/03/01 10:00:00").unwrap();
        let line = encode(&sample(ts), zone()).unwrap();
        assert!(line.starts_with("2024/03/01 10:00:00,0.279400,3.450000,157.500000,"));
        assert!(line.ends_with(",101230.000000\n"));
        assert_eq!(line.matches(',').count(), FIELD_COUNT - 1);
    }

    #[test]
    fn decode_reverses_encode() {
        let ts = zone().parse("2023/12/31 23:59:59").unwrap();
        let original = sample(ts);
        let decoded = decode(&encode(&original, zone()).unwrap(), zone());

        assert!(decoded.valid);
        assert_eq!(decoded.timestamp, original.timestamp);
        let pairs = [
            (decoded.rain_fall, original.rain_fall),
            (decoded.wind_speed, original.wind_speed),
            (decoded.wind_direction, original.wind_direction),
            (decoded.temperature, original.temperature),
            (decoded.humidity, original.humidity),
            (decoded.pressure, original.pressure),
        ];
        for (got, want) in pairs {
            assert!((got - want).abs() <= 1e-5 * want.abs().max(1.0), "{got} vs {want}");
        }
    }

    #[test]
    fn too_few_fields_is_invalid() {
        let line = "2024/03/01 10:00:00,1.0,2.0,3.0,4.0,5.0";
        assert_eq!(try_decode(line, zone()), Err(DecodeError::FieldCount(6)));
        assert!(!decode(line, zone()).valid);
    }

    #[test]
    fn too_many_fields_is_invalid() {
        let line = "2024/03/01 10:00:00,1,2,3,4,5,6,7";
        assert_eq!(try_decode(line, zone()), Err(DecodeError::FieldCount(8)));
    }

    #[test]
    fn malformed_timestamp_is_invalid() {
        for stamp in ["2024-03-01 10:00:00", "yesterday", "", "2024/02/30 10:00:00"] {
            let line = format!("{stamp},1,2,3,4,5,6");
            assert!(
                matches!(try_decode(&line, zone()), Err(DecodeError::Timestamp(_))),
                "{line}"
            );
            assert!(!decode(&line, zone()).valid);
        }
    }

    #[test]
    fn non_numeric_field_is_invalid() {
        let line = "2024/03/01 10:00:00,1,2,north,4,5,6";
        assert_eq!(
            try_decode(line, zone()),
            Err(DecodeError::Number {
                field: "wind_direction",
                value: "north".to_string()
            })
        );
    }

    #[test]
    fn empty_and_garbage_lines_are_invalid() {
        assert!(!decode("", zone()).valid);
        assert!(!decode("\n", zone()).valid);
        assert!(!decode(",,,,,,", zone()).valid);
    }

    #[test]
    fn tolerates_crlf_terminators() {
        let reading = decode("2024/03/01 10:00:00,1,2,3,4,5,6\r\n", zone());
        assert!(reading.valid);
        assert_eq!(reading.pressure, 6.0);
    }

    #[test]
    fn nan_survives_the_journal() {
        let mut reading = sample(zone().parse("2024/03/01 10:00:00").unwrap());
        reading.humidity = f32::NAN;
        let decoded = decode(&encode(&reading, zone()).unwrap(), zone());
        assert!(decoded.valid);
        assert!(decoded.humidity.is_nan());
    }
}

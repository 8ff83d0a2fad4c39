//! Upload payload in InfluxDB line protocol.
//!
//! One reading becomes two records, one per sensor group, sharing the same
//! second-precision timestamp:
//!
//! ```text
//! weather,sensor_id=SFEWeatherMeterKit,location=test rain_fall=..,wind_speed=..,wind_direction=.. <ts> \n       weather,sensor_id=bme280,location=test temperature=..,humidity=..,pressure=.. <ts>
//! ```
//!
//! The separator between the records (a space, a newline, then seven spaces)
//! is what deployed stations have always sent; the server side is tuned to it,
//! so it is reproduced byte for byte.

use crate::reading::SensorReading;

/// Measurement name of both records.
pub const MEASUREMENT: &str = "weather";
/// Tag identifying the wind/rain group.
pub const WEATHER_KIT_SENSOR_ID: &str = "SFEWeatherMeterKit";
/// Tag identifying the temperature/humidity/pressure group.
pub const BME280_SENSOR_ID: &str = "bme280";
/// Location tag used when none is configured.
pub const DEFAULT_LOCATION: &str = "test";

const RECORD_SEPARATOR: &str = " \n       ";

/// Build the request body for one reading.
///
/// NaN channels are written as zero: a sensor edge case must not poison the
/// whole write request.
pub fn encode_payload(reading: &SensorReading, location: &str) -> String {
    let r = reading.sanitized();
    format!(
        "{MEASUREMENT},sensor_id={WEATHER_KIT_SENSOR_ID},location={location} \
         rain_fall={:.6},wind_speed={:.6},wind_direction={:.6} {}\
         {RECORD_SEPARATOR}\
         {MEASUREMENT},sensor_id={BME280_SENSOR_ID},location={location} \
         temperature={:.6},humidity={:.6},pressure={:.6} {}",
        r.rain_fall,
        r.wind_speed,
        r.wind_direction,
        r.timestamp,
        r.temperature,
        r.humidity,
        r.pressure,
        r.timestamp,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading() -> SensorReading {
        SensorReading {
            timestamp: 1_709_301_600,
            rain_fall: 0.5,
            wind_speed: 12.25,
            wind_direction: 270.0,
            temperature: 18.5,
            humidity: 55.0,
            pressure: 101_000.0,
            valid: true,
        }
    }

    #[test]
    fn payload_is_byte_exact() {
        assert_eq!(
            encode_payload(&reading(), DEFAULT_LOCATION),
            "weather,sensor_id=SFEWeatherMeterKit,location=test \
             rain_fall=0.500000,wind_speed=12.250000,wind_direction=270.000000 1709301600 \n       \
             weather,sensor_id=bme280,location=test \
             temperature=18.500000,humidity=55.000000,pressure=101000.000000 1709301600"
        );
    }

    #[test]
    fn nan_humidity_is_sent_as_zero() {
        let mut r = reading();
        r.humidity = f32::NAN;
        let payload = encode_payload(&r, DEFAULT_LOCATION);
        assert!(payload.contains("humidity=0.000000"));
        assert!(!payload.to_lowercase().contains("nan"));
    }

    #[test]
    fn location_tag_is_applied_to_both_records() {
        let payload = encode_payload(&reading(), "rooftop");
        assert_eq!(payload.matches("location=rooftop ").count(), 2);
        assert_eq!(payload.lines().count(), 2);
    }
}

// Wall-clock times travel as "HH:MM"; "HH:MM:SS" is accepted on input.
use chrono::NaiveTime;
use serde::{de::Error, Deserialize, Deserializer, Serializer};

pub fn parse_clock_time(raw: &str) -> Option<NaiveTime> {
    let value = raw.trim();
    NaiveTime::parse_from_str(value, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M:%S"))
        .ok()
}

pub fn serialize<S>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&time.format("%H:%M").to_string())
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveTime, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_clock_time(&raw).ok_or_else(|| D::Error::custom(format!("invalid time '{}', expected HH:MM", raw)))
}

use drill_core::model::{Difficulty, SessionId, TopicId};

use crate::repository::StorageError;

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(crate) fn u32_from_i64(field: &'static str, v: i64) -> Result<u32, StorageError> {
    u32::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}

pub(crate) fn u64_from_i64(field: &'static str, v: i64) -> Result<u64, StorageError> {
    u64::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}

pub(crate) fn i64_from_u64(field: &'static str, v: u64) -> Result<i64, StorageError> {
    i64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} overflow")))
}

pub(crate) fn bool_from_i64(field: &'static str, v: i64) -> Result<bool, StorageError> {
    match v {
        0 => Ok(false),
        1 => Ok(true),
        _ => Err(StorageError::Serialization(format!("invalid {field}: {v}"))),
    }
}

pub(crate) fn difficulty_from_i64(field: &'static str, v: i64) -> Result<Difficulty, StorageError> {
    let level = u8::try_from(v)
        .map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))?;
    Difficulty::new(level).map_err(ser)
}

pub(crate) fn session_id_from_str(raw: &str) -> Result<SessionId, StorageError> {
    raw.parse::<SessionId>().map_err(ser)
}

pub(crate) fn topic_from_str(raw: String) -> Result<TopicId, StorageError> {
    TopicId::new(raw).map_err(ser)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_out_of_range_columns() {
        assert!(u32_from_i64("correct", -1).is_err());
        assert!(bool_from_i64("compensation", 2).is_err());
        assert!(difficulty_from_i64("end_difficulty", 0).is_err());
        assert_eq!(difficulty_from_i64("end_difficulty", 3).unwrap().level(), 3);
        assert!(topic_from_str("Not A Topic".into()).is_err());
        assert!(session_id_from_str("nope").is_err());
    }
}

//! Record-separator framing.
//!
//! A WebSocket text message carries one or more records, each terminated by
//! [`RECORD_SEPARATOR`].

use crate::constants::RECORD_SEPARATOR;
use crate::error::ProtocolError;

/// Appends the record terminator to a JSON document.
pub fn write_record(json: &str) -> String {
    let mut record = String::with_capacity(json.len() + 1);
    record.push_str(json);
    record.push(RECORD_SEPARATOR);
    record
}

/// Splits a text message into its records (terminators stripped).
///
/// Fails with [`ProtocolError::IncompleteRecord`] if the message does not
/// end with a terminator.
pub fn split_records(text: &str) -> Result<Vec<&str>, ProtocolError> {
    if text.is_empty() {
        return Ok(Vec::new());
    }
    let Some(body) = text.strip_suffix(RECORD_SEPARATOR) else {
        return Err(ProtocolError::IncompleteRecord);
    };
    Ok(body.split(RECORD_SEPARATOR).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_record_appends_separator() {
        assert_eq!(write_record("{}"), "{}\u{1e}");
    }

    #[test]
    fn split_single_and_batched_records() {
        assert_eq!(split_records("{\"type\":6}\u{1e}").unwrap(), vec!["{\"type\":6}"]);
        assert_eq!(
            split_records("{\"a\":1}\u{1e}{\"b\":2}\u{1e}").unwrap(),
            vec!["{\"a\":1}", "{\"b\":2}"]
        );
    }

    #[test]
    fn split_empty_message() {
        assert!(split_records("").unwrap().is_empty());
    }

    #[test]
    fn split_rejects_unterminated_tail() {
        assert!(matches!(
            split_records("{\"a\":1}\u{1e}{\"b\""),
            Err(ProtocolError::IncompleteRecord)
        ));
    }
}

use crate::error::DecodeError;
use serde_json::Value as JsonValue;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecodedResponse {
    pub status: i32,
    /// Compact re-serialization of the `payload` value; object keys come out
    /// sorted, so this need not match the device's original bytes.
    pub payload: String,
}

/// Parses `{"status": <number>, "payload": <any>}`.
pub fn decode_response(raw: &[u8]) -> Result<DecodedResponse, DecodeError> {
    let text = std::str::from_utf8(raw).map_err(|_| DecodeError::NotUtf8)?;
    let root: JsonValue =
        serde_json::from_str(text).map_err(|err| DecodeError::Malformed(err.to_string()))?;
    let object = root.as_object().ok_or(DecodeError::NotAnObject)?;

    let status = object.get("status").ok_or(DecodeError::MissingField("status"))?;
    let status = parse_status(status)?;
    let payload = object.get("payload").ok_or(DecodeError::MissingField("payload"))?;
    let payload =
        serde_json::to_string(payload).map_err(|err| DecodeError::Serialize(err.to_string()))?;

    Ok(DecodedResponse { status, payload })
}

// Fractional statuses are truncated toward zero.
fn parse_status(value: &JsonValue) -> Result<i32, DecodeError> {
    if let Some(integer) = value.as_i64() {
        return i32::try_from(integer).map_err(|_| DecodeError::StatusOutOfRange);
    }
    if value.is_u64() {
        return Err(DecodeError::StatusOutOfRange);
    }
    let float = value.as_f64().ok_or(DecodeError::NonNumericStatus)?;
    let truncated = float.trunc();
    if truncated < f64::from(i32::MIN) || truncated > f64::from(i32::MAX) {
        return Err(DecodeError::StatusOutOfRange);
    }
    Ok(truncated as i32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_status_and_canonical_payload() {
        let decoded = decode_response(br#"{"status":200,"payload":{"ok":true}}"#).expect("decode");
        assert_eq!(decoded.status, 200);
        assert_eq!(decoded.payload, r#"{"ok":true}"#);
    }

    #[test]
    fn payload_is_normalized_not_copied() {
        let raw = br#"{ "payload" : { "z" : 1, "a" : [ 1, 2 ] }, "status" : 404 }"#;
        let decoded = decode_response(raw).expect("decode");
        assert_eq!(decoded.status, 404);
        assert_eq!(decoded.payload, r#"{"a":[1,2],"z":1}"#);
    }

    #[test]
    fn scalar_and_null_payloads_are_serialized_as_json_text() {
        let cases: [(&[u8], &str); 4] = [
            (br#"{"status":0,"payload":"done"}"#, r#""done""#),
            (br#"{"status":0,"payload":null}"#, "null"),
            (br#"{"status":0,"payload":12.5}"#, "12.5"),
            (br#"{"status":0,"payload":[]}"#, "[]"),
        ];
        for (raw, expected) in cases {
            assert_eq!(decode_response(raw).expect("decode").payload, expected);
        }
    }

    #[test]
    fn negative_and_fractional_statuses_are_accepted() {
        assert_eq!(decode_response(br#"{"status":-1,"payload":{}}"#).expect("decode").status, -1);
        let fractional = decode_response(br#"{"status":201.9,"payload":{}}"#).expect("decode");
        assert_eq!(fractional.status, 201);
    }

    #[test]
    fn missing_fields_are_decode_errors() {
        assert_eq!(
            decode_response(br#"{"status":200}"#),
            Err(DecodeError::MissingField("payload"))
        );
        assert_eq!(
            decode_response(br#"{"payload":{}}"#),
            Err(DecodeError::MissingField("status"))
        );
    }

    #[test]
    fn malformed_bodies_never_yield_partial_results() {
        assert_eq!(decode_response(&[0xff, 0xfe]), Err(DecodeError::NotUtf8));
        assert!(matches!(decode_response(b"{\"status\":200,"), Err(DecodeError::Malformed(_))));
        assert!(matches!(decode_response(b""), Err(DecodeError::Malformed(_))));
        assert_eq!(decode_response(b"[200, {}]"), Err(DecodeError::NotAnObject));
        assert_eq!(
            decode_response(br#"{"status":"200","payload":{}}"#),
            Err(DecodeError::NonNumericStatus)
        );
        assert_eq!(
            decode_response(br#"{"status":4294967296,"payload":{}}"#),
            Err(DecodeError::StatusOutOfRange)
        );
        assert_eq!(
            decode_response(br#"{"status":18446744073709551615,"payload":{}}"#),
            Err(DecodeError::StatusOutOfRange)
        );
    }
}

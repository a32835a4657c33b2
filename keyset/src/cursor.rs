//! Opaque cursor tokens.
//!
//! A cursor captures the sort-key values of one record. Column names are
//! never carried in the token; decoding zips the values with the columns of
//! the active sort specification, so untrusted input cannot introduce new
//! column names.

use std::collections::BTreeMap;
use std::fmt::Debug;

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{PaginationError, PaginationResult, Record, SortSpec, Value};

/// Substitute values for nullable sort columns, keyed by column name
pub type NullCoalesceMap = BTreeMap<String, Value>;

/// Number of sha256 bytes kept in front of the payload
const DIGEST_LEN: usize = 8;

/// Separates the digest from the payload
const MARKER: &[u8] = b"ks";

// Bound on untrusted token input.
const MAX_CURSOR_TOKEN_LEN: usize = 8 * 1024;

const CURSOR_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Sort-key values of one record, in sort order.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyTuple {
    entries: Vec<(String, Value)>,
}

impl KeyTuple {
    pub fn new(entries: Vec<(String, Value)>) -> Self {
        Self { entries }
    }

    /// Captures the cursor columns of `record`, substituting coalesce values
    /// for nulls. A null without a coalesce entry is kept as `Value::Null`.
    pub fn from_record<R: Record + ?Sized>(
        record: &R,
        spec: &SortSpec,
        coalesce: &NullCoalesceMap,
    ) -> PaginationResult<Self> {
        let entries = spec
            .iter()
            .map(|entry| {
                let value = record
                    .value(&entry.column)
                    .ok_or_else(|| PaginationError::MissingColumn {
                        column: entry.column.clone(),
                    })?;
                let value = match value {
                    Value::Null => coalesce.get(&entry.column).cloned().unwrap_or(Value::Null),
                    value => value,
                };
                Ok((entry.column.clone(), value))
            })
            .collect::<PaginationResult<Vec<_>>>()?;

        Ok(Self { entries })
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.entries.iter().map(|(_, value)| value)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Strategy for turning key tuples into opaque cursor strings and back.
///
/// Codecs are selected through configuration; the type tag names the codec
/// when a config is loaded from JSON.
#[typetag::serde(tag = "type")]
pub trait CursorCodec: dyn_clone::DynClone + Debug + Send + Sync {
    fn encode(&self, key: &KeyTuple) -> PaginationResult<String>;

    /// Decodes `cursor` against the columns of the active sort spec. Any
    /// malformed input yields `PaginationError::InvalidCursor`.
    fn decode(&self, cursor: &str, expected_columns: &[&str]) -> PaginationResult<KeyTuple>;
}

dyn_clone::clone_trait_object!(CursorCodec);

/// Default codec: base64 of `sha256(payload)[..8] ++ "ks" ++ payload`, where
/// the payload is a JSON array of kind-tagged values.
///
/// The digest detects casual tampering; it is not a secret.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DigestCursorCodec;

#[typetag::serde(name = "digest")]
impl CursorCodec for DigestCursorCodec {
    fn encode(&self, key: &KeyTuple) -> PaginationResult<String> {
        let payload = encode_payload(key)?;

        let mut buf = Vec::with_capacity(DIGEST_LEN + MARKER.len() + payload.len());
        buf.extend_from_slice(&digest(&payload));
        buf.extend_from_slice(MARKER);
        buf.extend_from_slice(&payload);

        Ok(CURSOR_ENGINE.encode(buf))
    }

    fn decode(&self, cursor: &str, expected_columns: &[&str]) -> PaginationResult<KeyTuple> {
        let raw = decode_token(cursor)?;

        if raw.len() < DIGEST_LEN + MARKER.len() {
            return Err(PaginationError::invalid_cursor("token is truncated"));
        }

        let (expected_digest, rest) = raw.split_at(DIGEST_LEN);
        let (marker, payload) = rest.split_at(MARKER.len());

        if marker != MARKER {
            return Err(PaginationError::invalid_cursor("token is malformed"));
        }

        if digest(payload) != expected_digest {
            return Err(PaginationError::invalid_cursor("digest mismatch"));
        }

        decode_payload(payload, expected_columns)
    }
}

/// Codec without the digest prefix, for debugging and interop with clients
/// that build cursors themselves. Shape and arity are still validated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlainCursorCodec;

#[typetag::serde(name = "plain")]
impl CursorCodec for PlainCursorCodec {
    fn encode(&self, key: &KeyTuple) -> PaginationResult<String> {
        Ok(CURSOR_ENGINE.encode(encode_payload(key)?))
    }

    fn decode(&self, cursor: &str, expected_columns: &[&str]) -> PaginationResult<KeyTuple> {
        let raw = decode_token(cursor)?;
        decode_payload(&raw, expected_columns)
    }
}

fn digest(payload: &[u8]) -> [u8; DIGEST_LEN] {
    let hash = Sha256::digest(payload);
    let mut out = [0u8; DIGEST_LEN];
    out.copy_from_slice(&hash[..DIGEST_LEN]);
    out
}

fn encode_payload(key: &KeyTuple) -> PaginationResult<Vec<u8>> {
    // JSON has no representation for NaN or infinities.
    if let Some((column, _)) = key
        .entries
        .iter()
        .find(|(_, value)| matches!(value, Value::Float(f) if !f.is_finite()))
    {
        return Err(PaginationError::Encode {
            reason: format!("column `{column}` holds a non-finite float"),
        });
    }

    let values: Vec<&Value> = key.values().collect();
    serde_json::to_vec(&values).map_err(|e| PaginationError::Encode {
        reason: e.to_string(),
    })
}

fn decode_token(cursor: &str) -> PaginationResult<Vec<u8>> {
    let token = cursor.trim();

    if token.is_empty() {
        return Err(PaginationError::invalid_cursor("token is empty"));
    }

    if token.len() > MAX_CURSOR_TOKEN_LEN {
        return Err(PaginationError::invalid_cursor("token is too long"));
    }

    CURSOR_ENGINE
        .decode(token)
        .map_err(|_| PaginationError::invalid_cursor("token is not valid base64"))
}

fn decode_payload(payload: &[u8], expected_columns: &[&str]) -> PaginationResult<KeyTuple> {
    let values: Vec<Value> = serde_json::from_slice(payload)
        .map_err(|_| PaginationError::invalid_cursor("payload is malformed"))?;

    if values.len() != expected_columns.len() {
        return Err(PaginationError::invalid_cursor(
            "cursor does not match the sort columns",
        ));
    }

    let entries = expected_columns
        .iter()
        .map(|column| column.to_string())
        .zip(values)
        .collect();

    Ok(KeyTuple::new(entries))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Row, SortInput};
    use chrono::{NaiveDate, TimeZone, Utc};
    use proptest::prelude::*;

    fn key(pairs: &[(&str, Value)]) -> KeyTuple {
        KeyTuple::new(
            pairs
                .iter()
                .map(|(c, v)| (c.to_string(), v.clone()))
                .collect(),
        )
    }

    fn sample_key() -> KeyTuple {
        key(&[
            ("first_name", Value::from("Bea")),
            ("born", Value::Date(NaiveDate::from_ymd_opt(1990, 4, 1).unwrap())),
            ("id", Value::Int(4)),
        ])
    }

    #[test]
    fn test_round_trip_keeps_temporal_types() {
        let codec = DigestCursorCodec;
        let at = Utc.with_ymd_and_hms(2021, 7, 3, 12, 30, 5).unwrap()
            + chrono::Duration::nanoseconds(123_456_789);
        let original = key(&[
            ("updated_at", Value::DateTime(at)),
            ("local", Value::NaiveDateTime(at.naive_utc())),
            ("id", Value::Int(-7)),
        ]);

        let token = codec.encode(&original).unwrap();
        let decoded = codec.decode(&token, &["updated_at", "local", "id"]).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn test_float_keys_decode_to_the_same_bits() {
        let codec = DigestCursorCodec;
        for f in [
            5.2578981863911145e-55,
            1.0715660391465826e-75,
            -1.81996730402717e-179,
            -1.603964615428183e143,
            f64::MIN_POSITIVE,
            -0.0,
        ] {
            let token = codec.encode(&key(&[("score", Value::Float(f))])).unwrap();
            let decoded = codec.decode(&token, &["score"]).unwrap();
            match decoded.get("score") {
                Some(Value::Float(back)) => assert_eq!(back.to_bits(), f.to_bits(), "{f:e}"),
                other => panic!("expected a float for {f:e}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_token_is_url_safe() {
        let token = DigestCursorCodec.encode(&sample_key()).unwrap();
        assert!(token
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_'));
    }

    #[test]
    fn test_wrong_column_count_is_rejected() {
        let codec = DigestCursorCodec;
        let token = codec.encode(&sample_key()).unwrap();

        let err = codec.decode(&token, &["first_name", "id"]).unwrap_err();
        assert!(matches!(err, PaginationError::InvalidCursor { .. }));

        let err = codec
            .decode(&token, &["first_name", "born", "id", "extra"])
            .unwrap_err();
        assert!(matches!(err, PaginationError::InvalidCursor { .. }));
    }

    #[test]
    fn test_garbage_is_rejected() {
        let codec = DigestCursorCodec;
        for token in ["", "   ", "x", "not base64!!", "AAAA", "a2s"] {
            let err = codec.decode(token, &["id"]).unwrap_err();
            assert!(
                matches!(err, PaginationError::InvalidCursor { .. }),
                "token {token:?} should be rejected"
            );
        }

        let long = "A".repeat(MAX_CURSOR_TOKEN_LEN + 4);
        assert!(matches!(
            codec.decode(&long, &["id"]),
            Err(PaginationError::InvalidCursor { .. })
        ));
    }

    #[test]
    fn test_payload_swap_fails_digest_check() {
        let codec = DigestCursorCodec;
        let token = codec.encode(&key(&[("id", Value::Int(1))])).unwrap();
        let mut raw = CURSOR_ENGINE.decode(&token).unwrap();
        let forged = br#"[{"t":"int","v":2}]"#;
        raw.truncate(DIGEST_LEN + MARKER.len());
        raw.extend_from_slice(forged);

        let err = codec.decode(&CURSOR_ENGINE.encode(raw), &["id"]).unwrap_err();
        assert!(matches!(
            err,
            PaginationError::InvalidCursor {
                reason: "digest mismatch"
            }
        ));
    }

    #[test]
    fn test_error_does_not_echo_payload() {
        let err = DigestCursorCodec
            .decode("c2VjcmV0LXZhbHVlLWluLXRoZS10b2tlbg", &["id"])
            .unwrap_err();
        assert!(!err.to_string().contains("secret"));
    }

    #[test]
    fn test_plain_codec_round_trip() {
        let codec = PlainCursorCodec;
        let token = codec.encode(&sample_key()).unwrap();
        let decoded = codec.decode(&token, &["first_name", "born", "id"]).unwrap();
        assert_eq!(decoded, sample_key());
    }

    #[test]
    fn test_non_finite_float_cannot_be_encoded() {
        let err = DigestCursorCodec
            .encode(&key(&[("score", Value::Float(f64::NAN))]))
            .unwrap_err();
        assert!(matches!(err, PaginationError::Encode { .. }));
    }

    #[test]
    fn test_from_record_coalesces_nulls() {
        let spec = SortSpec::normalize(&[SortInput::asc("nickname")], Some("id")).unwrap();
        let mut row = Row::new();
        row.insert("nickname".to_string(), Value::Null);
        row.insert("id".to_string(), Value::Int(3));

        let coalesce = NullCoalesceMap::from([("nickname".to_string(), Value::from(""))]);
        let key = KeyTuple::from_record(&row, &spec, &coalesce).unwrap();
        assert_eq!(key.get("nickname"), Some(&Value::from("")));

        let key = KeyTuple::from_record(&row, &spec, &NullCoalesceMap::new()).unwrap();
        assert_eq!(key.get("nickname"), Some(&Value::Null));
    }

    #[test]
    fn test_from_record_requires_every_column() {
        let spec = SortSpec::normalize(&[SortInput::asc("nickname")], Some("id")).unwrap();
        let row = Row::from([("id".to_string(), Value::Int(1))]);
        let err = KeyTuple::from_record(&row, &spec, &NullCoalesceMap::new()).unwrap_err();
        assert!(matches!(err, PaginationError::MissingColumn { column } if column == "nickname"));
    }

    #[test]
    fn test_codec_is_selected_by_type_tag() {
        let codec: Box<dyn CursorCodec> = serde_json::from_str(r#"{"type": "plain"}"#).unwrap();
        let token = codec.encode(&sample_key()).unwrap();
        assert!(DigestCursorCodec
            .decode(&token, &["first_name", "born", "id"])
            .is_err());
    }

    fn arb_value() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(Value::Int),
            any::<f64>()
                .prop_filter("finite", |f| f.is_finite())
                .prop_map(Value::Float),
            ".*".prop_map(Value::Text),
            proptest::collection::vec(any::<u8>(), 0..16).prop_map(Value::Bytes),
            (-100_000i32..100_000).prop_map(|days| {
                Value::Date(NaiveDate::from_ymd_opt(2000, 1, 1).unwrap() + chrono::Duration::days(days.into()))
            }),
            (0i64..4_000_000_000, 0u32..1_000_000_000).prop_map(|(secs, nanos)| {
                Value::DateTime(Utc.timestamp_opt(secs, nanos).unwrap())
            }),
        ]
    }

    proptest! {
        #[test]
        fn prop_round_trip(values in proptest::collection::vec(arb_value(), 1..6)) {
            let columns: Vec<String> = (0..values.len()).map(|i| format!("c{i}")).collect();
            let column_refs: Vec<&str> = columns.iter().map(String::as_str).collect();
            let original = KeyTuple::new(columns.iter().cloned().zip(values).collect());

            let token = DigestCursorCodec.encode(&original).unwrap();
            let decoded = DigestCursorCodec.decode(&token, &column_refs).unwrap();
            prop_assert_eq!(decoded, original);
        }

        #[test]
        fn prop_truncation_is_rejected(cut in 1usize..20) {
            let token = DigestCursorCodec.encode(&sample_key()).unwrap();
            let cut = cut.min(token.len() - 1);
            let truncated = &token[..token.len() - cut];
            prop_assert!(DigestCursorCodec
                .decode(truncated, &["first_name", "born", "id"])
                .is_err());
        }

        #[test]
        fn prop_payload_byte_flip_is_rejected(index in 0usize..64, mask in 1u8..=255) {
            let token = DigestCursorCodec.encode(&sample_key()).unwrap();
            let mut raw = CURSOR_ENGINE.decode(&token).unwrap();
            let index = DIGEST_LEN + MARKER.len() + index % (raw.len() - DIGEST_LEN - MARKER.len());
            raw[index] ^= mask;

            let tampered = CURSOR_ENGINE.encode(raw);
            prop_assert!(DigestCursorCodec
                .decode(&tampered, &["first_name", "born", "id"])
                .is_err());
        }
    }
}

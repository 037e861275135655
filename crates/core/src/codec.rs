//! Canonical JSON codec.
//!
//! Payloads routinely carry 256-bit integers that JSON numbers cannot hold.
//! Every `uint256` field is written as a decimal string and parsed back
//! exactly; encode and decode are mutual inverses for every type in
//! [`crate::types`]. All serialization boundaries (transaction store,
//! CLI files, verifier transport) go through [`CanonicalCodec`].

use alloy_primitives::U256;
use serde::de::DeserializeOwned;
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// A `uint256` field was not a canonical decimal string.
    #[error("invalid uint256 '{value}': {reason}")]
    InvalidInteger { value: String, reason: String },

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Parse a canonical decimal `uint256` string.
///
/// Canonical means ASCII digits only, no sign, no `0x`, and no leading
/// zeros except for `"0"` itself, so every value has exactly one spelling.
pub fn parse_u256(text: &str) -> Result<U256, CodecError> {
    let invalid = |reason: &str| CodecError::InvalidInteger {
        value: text.to_string(),
        reason: reason.to_string(),
    };
    if text.is_empty() {
        return Err(invalid("empty string"));
    }
    if !text.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid("expected decimal digits"));
    }
    if text.len() > 1 && text.starts_with('0') {
        return Err(invalid("leading zero"));
    }
    U256::from_str_radix(text, 10).map_err(|e| invalid(&e.to_string()))
}

/// `#[serde(with = "u256_dec")]` adapter: `U256` as a decimal string.
pub mod u256_dec {
    use alloy_primitives::U256;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &U256, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<U256, D::Error> {
        let text = String::deserialize(deserializer)?;
        super::parse_u256(&text).map_err(de::Error::custom)
    }
}

/// The one codec used at every serialization boundary.
pub struct CanonicalCodec;

impl CanonicalCodec {
    pub fn encode<T: Serialize>(value: &T) -> Result<String, CodecError> {
        Ok(serde_json::to_string(value)?)
    }

    pub fn encode_pretty<T: Serialize>(value: &T) -> Result<String, CodecError> {
        Ok(serde_json::to_string_pretty(value)?)
    }

    pub fn to_value<T: Serialize>(value: &T) -> Result<serde_json::Value, CodecError> {
        Ok(serde_json::to_value(value)?)
    }

    pub fn decode<T: DeserializeOwned>(text: &str) -> Result<T, CodecError> {
        Ok(serde_json::from_str(text)?)
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::*;
    use alloy_primitives::{Address, Bytes, Selector, B256};
    use proptest::prelude::*;

    fn sample_signed(big: U256) -> SignedMetaTransaction {
        let params = TxParams {
            requester: Address::repeat_byte(0x01),
            target: Address::repeat_byte(0x02),
            value: big,
            gas_limit: U256::from(300_000u64),
            operation_type: B256::repeat_byte(0xab),
            execution_type: ExecutionType::Standard,
            execution_options: Bytes::from(vec![0xde, 0xad, 0xbe, 0xef]),
        };
        let record = TxRecord {
            tx_id: big,
            release_time: U256::from(1_700_000_000u64),
            status: TxStatus::Pending,
            params,
            message: B256::ZERO,
            result: Bytes::new(),
            payment: PaymentDetails {
                recipient: Address::repeat_byte(0x03),
                native_token_amount: big,
                erc20_token_address: Address::ZERO,
                erc20_token_amount: U256::ZERO,
            },
        };
        let meta = MetaTxParams {
            chain_id: U256::from(31337u64),
            nonce: big,
            handler_contract: Address::repeat_byte(0x04),
            handler_selector: Selector::from([0x12, 0x34, 0x56, 0x78]),
            deadline: U256::from(1_700_003_600u64),
            max_gas_price: big,
            signer: Address::repeat_byte(0x05),
        };
        let unsigned = UnsignedMetaTransaction {
            tx_record: record,
            params: meta,
            message: B256::repeat_byte(0x77),
            data: Bytes::new(),
        };
        SignedMetaTransaction::new(unsigned, Bytes::from(vec![0x1b; 65]))
    }

    #[test]
    fn u256_boundaries_encode_as_decimal_strings() {
        let zero = CanonicalCodec::encode(&sample_signed(U256::ZERO)).unwrap();
        assert!(zero.contains("\"txId\":\"0\""));

        let max = CanonicalCodec::encode(&sample_signed(U256::MAX)).unwrap();
        assert!(max.contains(
            "\"txId\":\"115792089237316195423570985008687907853269984665640564039457584007913129639935\""
        ));
    }

    #[test]
    fn signed_payload_round_trips_at_boundaries() {
        for big in [U256::ZERO, U256::from(1u64), U256::MAX] {
            let original = sample_signed(big);
            let text = CanonicalCodec::encode(&original).unwrap();
            let decoded: SignedMetaTransaction = CanonicalCodec::decode(&text).unwrap();
            assert_eq!(decoded, original);
            assert_eq!(CanonicalCodec::encode(&decoded).unwrap(), text);
        }
    }

    #[test]
    fn signed_payload_is_flat_with_signature() {
        let value = CanonicalCodec::to_value(&sample_signed(U256::from(7u64))).unwrap();
        assert!(value.get("txRecord").is_some());
        assert!(value.get("params").is_some());
        assert!(value.get("signature").is_some());
        assert_eq!(value["params"]["chainId"], "31337");
    }

    #[test]
    fn parse_rejects_non_canonical_text() {
        assert!(parse_u256("").is_err());
        assert!(parse_u256("0x10").is_err());
        assert!(parse_u256("-1").is_err());
        assert!(parse_u256("007").is_err());
        assert!(parse_u256("1e3").is_err());
        // 2^256 does not fit
        assert!(parse_u256(
            "115792089237316195423570985008687907853269984665640564039457584007913129639936"
        )
        .is_err());
        assert_eq!(parse_u256("0").unwrap(), U256::ZERO);
    }

    #[test]
    fn decode_reports_bad_integer_field() {
        let mut value = CanonicalCodec::to_value(&sample_signed(U256::from(1u64))).unwrap();
        value["params"]["nonce"] = serde_json::json!(12);
        let err = CanonicalCodec::decode::<SignedMetaTransaction>(&value.to_string());
        assert!(err.is_err());
    }

    proptest! {
        #[test]
        fn any_u256_round_trips(limbs in any::<[u64; 4]>()) {
            let big = U256::from_limbs(limbs);
            let original = sample_signed(big);
            let text = CanonicalCodec::encode(&original).unwrap();
            let decoded: SignedMetaTransaction = CanonicalCodec::decode(&text).unwrap();
            prop_assert_eq!(decoded, original);
        }
    }
}

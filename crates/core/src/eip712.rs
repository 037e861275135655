//! EIP-712 structured-data hashing for meta-transactions.
//!
//! The verifier recomputes this digest on-chain from the same domain and
//! type schema. Client and verifier must agree byte for byte, so the type
//! strings below are the single source of truth for both sides.

use std::sync::OnceLock;

use alloy_primitives::{keccak256, Address, Selector, B256, U256};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::codec::{u256_dec, CanonicalCodec, CodecError};
use crate::types::{MetaTxParams, PaymentDetails, TxParams, TxRecord, UnsignedMetaTransaction};

pub const DOMAIN_TYPE: &str =
    "EIP712Domain(string name,string version,uint256 chainId,address verifyingContract)";

pub const META_TRANSACTION_TYPE: &str =
    "MetaTransaction(TxRecord txRecord,MetaTxParams params,bytes data)";

pub const META_TX_PARAMS_TYPE: &str = "MetaTxParams(uint256 chainId,uint256 nonce,address handlerContract,bytes4 handlerSelector,uint256 deadline,uint256 maxGasPrice,address signer)";

pub const PAYMENT_DETAILS_TYPE: &str = "PaymentDetails(address recipient,uint256 nativeTokenAmount,address erc20TokenAddress,uint256 erc20TokenAmount)";

pub const TX_PARAMS_TYPE: &str = "TxParams(address requester,address target,uint256 value,uint256 gasLimit,bytes32 operationType,uint8 executionType,bytes executionOptions)";

pub const TX_RECORD_TYPE: &str =
    "TxRecord(uint256 txId,uint256 releaseTime,uint8 status,TxParams params,PaymentDetails payment)";

/// Full `encodeType` of the primary type: referenced structs follow the
/// primary type sorted by name.
pub fn meta_transaction_encode_type() -> String {
    [
        META_TRANSACTION_TYPE,
        META_TX_PARAMS_TYPE,
        PAYMENT_DETAILS_TYPE,
        TX_PARAMS_TYPE,
        TX_RECORD_TYPE,
    ]
    .concat()
}

fn tx_record_encode_type() -> String {
    [TX_RECORD_TYPE, PAYMENT_DETAILS_TYPE, TX_PARAMS_TYPE].concat()
}

struct TypeHashes {
    domain: B256,
    meta_transaction: B256,
    meta_tx_params: B256,
    payment_details: B256,
    tx_params: B256,
    tx_record: B256,
}

fn type_hashes() -> &'static TypeHashes {
    static HASHES: OnceLock<TypeHashes> = OnceLock::new();
    HASHES.get_or_init(|| TypeHashes {
        domain: keccak256(DOMAIN_TYPE),
        meta_transaction: keccak256(meta_transaction_encode_type()),
        meta_tx_params: keccak256(META_TX_PARAMS_TYPE),
        payment_details: keccak256(PAYMENT_DETAILS_TYPE),
        tx_params: keccak256(TX_PARAMS_TYPE),
        tx_record: keccak256(tx_record_encode_type()),
    })
}

// ──────────────────────────────────────────────
// Domain
// ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Eip712Domain {
    pub name: String,
    pub version: String,
    #[serde(with = "u256_dec")]
    pub chain_id: U256,
    pub verifying_contract: Address,
}

impl Eip712Domain {
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        chain_id: u64,
        verifying_contract: Address,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            chain_id: U256::from(chain_id),
            verifying_contract,
        }
    }

    pub fn separator(&self) -> B256 {
        let mut enc = WordEncoder::default();
        enc.word(type_hashes().domain);
        enc.dynamic(self.name.as_bytes());
        enc.dynamic(self.version.as_bytes());
        enc.uint(self.chain_id);
        enc.address(self.verifying_contract);
        enc.finish()
    }
}

// ──────────────────────────────────────────────
// hashStruct
// ──────────────────────────────────────────────

/// Accumulates 32-byte `encodeData` words and hashes them.
#[derive(Default)]
struct WordEncoder {
    buf: Vec<u8>,
}

impl WordEncoder {
    fn word(&mut self, word: B256) {
        self.buf.extend_from_slice(word.as_slice());
    }

    fn uint(&mut self, value: U256) {
        self.buf.extend_from_slice(&value.to_be_bytes::<32>());
    }

    fn small(&mut self, value: u8) {
        self.uint(U256::from(value));
    }

    fn address(&mut self, address: Address) {
        self.word(address.into_word());
    }

    /// `bytes4` is atomic: right-padded to a full word.
    fn selector(&mut self, selector: Selector) {
        let mut word = [0u8; 32];
        word[..4].copy_from_slice(selector.as_slice());
        self.buf.extend_from_slice(&word);
    }

    /// `bytes` and `string` are encoded as the hash of their contents.
    fn dynamic(&mut self, data: &[u8]) {
        self.word(keccak256(data));
    }

    fn finish(self) -> B256 {
        keccak256(&self.buf)
    }
}

pub fn hash_tx_params(params: &TxParams) -> B256 {
    let mut enc = WordEncoder::default();
    enc.word(type_hashes().tx_params);
    enc.address(params.requester);
    enc.address(params.target);
    enc.uint(params.value);
    enc.uint(params.gas_limit);
    enc.word(params.operation_type);
    enc.small(params.execution_type.into());
    enc.dynamic(&params.execution_options);
    enc.finish()
}

pub fn hash_payment_details(payment: &PaymentDetails) -> B256 {
    let mut enc = WordEncoder::default();
    enc.word(type_hashes().payment_details);
    enc.address(payment.recipient);
    enc.uint(payment.native_token_amount);
    enc.address(payment.erc20_token_address);
    enc.uint(payment.erc20_token_amount);
    enc.finish()
}

/// `message` and `result` are excluded: the first is this digest itself,
/// the second is only written after execution.
pub fn hash_tx_record(record: &TxRecord) -> B256 {
    let mut enc = WordEncoder::default();
    enc.word(type_hashes().tx_record);
    enc.uint(record.tx_id);
    enc.uint(record.release_time);
    enc.small(record.status.into());
    enc.word(hash_tx_params(&record.params));
    enc.word(hash_payment_details(&record.payment));
    enc.finish()
}

pub fn hash_meta_tx_params(params: &MetaTxParams) -> B256 {
    let mut enc = WordEncoder::default();
    enc.word(type_hashes().meta_tx_params);
    enc.uint(params.chain_id);
    enc.uint(params.nonce);
    enc.address(params.handler_contract);
    enc.selector(params.handler_selector);
    enc.uint(params.deadline);
    enc.uint(params.max_gas_price);
    enc.address(params.signer);
    enc.finish()
}

pub fn hash_meta_transaction(meta_tx: &UnsignedMetaTransaction) -> B256 {
    let mut enc = WordEncoder::default();
    enc.word(type_hashes().meta_transaction);
    enc.word(hash_tx_record(&meta_tx.tx_record));
    enc.word(hash_meta_tx_params(&meta_tx.params));
    enc.dynamic(&meta_tx.data);
    enc.finish()
}

/// `keccak256(0x1901 || domainSeparator || hashStruct(metaTx))`.
pub fn meta_tx_digest(domain: &Eip712Domain, meta_tx: &UnsignedMetaTransaction) -> B256 {
    let mut buf = Vec::with_capacity(66);
    buf.extend_from_slice(&[0x19, 0x01]);
    buf.extend_from_slice(domain.separator().as_slice());
    buf.extend_from_slice(hash_meta_transaction(meta_tx).as_slice());
    keccak256(&buf)
}

// ──────────────────────────────────────────────
// TypedData
// ──────────────────────────────────────────────

/// A meta-transaction presented as EIP-712 typed data.
///
/// Wallet-style signers render [`TypedData::to_json`] for the user and sign
/// [`TypedData::digest`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypedData {
    pub domain: Eip712Domain,
    pub message: UnsignedMetaTransaction,
}

impl TypedData {
    pub fn new(domain: Eip712Domain, message: UnsignedMetaTransaction) -> Self {
        Self { domain, message }
    }

    pub fn digest(&self) -> B256 {
        meta_tx_digest(&self.domain, &self.message)
    }

    /// `eth_signTypedData_v4` request body.
    pub fn to_json(&self) -> Result<serde_json::Value, CodecError> {
        let record = CanonicalCodec::to_value(&self.message.tx_record)?;
        let params = CanonicalCodec::to_value(&self.message.params)?;
        Ok(json!({
            "types": {
                "EIP712Domain": [
                    { "name": "name", "type": "string" },
                    { "name": "version", "type": "string" },
                    { "name": "chainId", "type": "uint256" },
                    { "name": "verifyingContract", "type": "address" }
                ],
                "MetaTransaction": [
                    { "name": "txRecord", "type": "TxRecord" },
                    { "name": "params", "type": "MetaTxParams" },
                    { "name": "data", "type": "bytes" }
                ],
                "TxRecord": [
                    { "name": "txId", "type": "uint256" },
                    { "name": "releaseTime", "type": "uint256" },
                    { "name": "status", "type": "uint8" },
                    { "name": "params", "type": "TxParams" },
                    { "name": "payment", "type": "PaymentDetails" }
                ],
                "TxParams": [
                    { "name": "requester", "type": "address" },
                    { "name": "target", "type": "address" },
                    { "name": "value", "type": "uint256" },
                    { "name": "gasLimit", "type": "uint256" },
                    { "name": "operationType", "type": "bytes32" },
                    { "name": "executionType", "type": "uint8" },
                    { "name": "executionOptions", "type": "bytes" }
                ],
                "PaymentDetails": [
                    { "name": "recipient", "type": "address" },
                    { "name": "nativeTokenAmount", "type": "uint256" },
                    { "name": "erc20TokenAddress", "type": "address" },
                    { "name": "erc20TokenAmount", "type": "uint256" }
                ],
                "MetaTxParams": [
                    { "name": "chainId", "type": "uint256" },
                    { "name": "nonce", "type": "uint256" },
                    { "name": "handlerContract", "type": "address" },
                    { "name": "handlerSelector", "type": "bytes4" },
                    { "name": "deadline", "type": "uint256" },
                    { "name": "maxGasPrice", "type": "uint256" },
                    { "name": "signer", "type": "address" }
                ]
            },
            "primaryType": "MetaTransaction",
            "domain": CanonicalCodec::to_value(&self.domain)?,
            "message": {
                "txRecord": {
                    "txId": record["txId"],
                    "releaseTime": record["releaseTime"],
                    "status": record["status"],
                    "params": record["params"],
                    "payment": record["payment"]
                },
                "params": params,
                "data": self.message.data.to_string()
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ExecutionType, TxStatus};
    use alloy_primitives::{hex, Bytes};

    fn unsigned() -> UnsignedMetaTransaction {
        UnsignedMetaTransaction {
            tx_record: TxRecord {
                tx_id: U256::from(7u64),
                release_time: U256::from(1_700_086_400u64),
                status: TxStatus::Pending,
                params: TxParams {
                    requester: Address::repeat_byte(0x11),
                    target: Address::repeat_byte(0xcc),
                    value: U256::ZERO,
                    gas_limit: U256::from(100_000u64),
                    operation_type: keccak256("OWNERSHIP_TRANSFER"),
                    execution_type: ExecutionType::Standard,
                    execution_options: Bytes::from(vec![1, 2, 3]),
                },
                message: B256::ZERO,
                result: Bytes::new(),
                payment: PaymentDetails::default(),
            },
            params: MetaTxParams {
                chain_id: U256::from(1u64),
                nonce: U256::from(3u64),
                handler_contract: Address::repeat_byte(0xcc),
                handler_selector: Selector::from([0xaa, 0xbb, 0xcc, 0xdd]),
                deadline: U256::from(1_700_003_600u64),
                max_gas_price: U256::from(1_000_000_000u64),
                signer: Address::repeat_byte(0x11),
            },
            message: B256::ZERO,
            data: Bytes::new(),
        }
    }

    fn domain() -> Eip712Domain {
        Eip712Domain::new("Warden", "1", 1, Address::repeat_byte(0xcc))
    }

    #[test]
    fn encode_type_sorts_referenced_structs() {
        let encoded = meta_transaction_encode_type();
        let meta = encoded.find("MetaTxParams(").unwrap();
        let payment = encoded.find("PaymentDetails(").unwrap();
        let params = encoded.find("TxParams(").unwrap();
        let record = encoded.find("TxRecord(uint256").unwrap();
        assert!(encoded.starts_with("MetaTransaction("));
        assert!(meta < payment && payment < params && params < record);
    }

    #[test]
    fn domain_separator_matches_manual_encoding() {
        let d = domain();
        let mut buf = Vec::new();
        buf.extend_from_slice(keccak256(DOMAIN_TYPE).as_slice());
        buf.extend_from_slice(keccak256("Warden").as_slice());
        buf.extend_from_slice(keccak256("1").as_slice());
        buf.extend_from_slice(&U256::from(1u64).to_be_bytes::<32>());
        buf.extend_from_slice(&hex!(
            "000000000000000000000000cccccccccccccccccccccccccccccccccccccccc"
        ));
        assert_eq!(d.separator(), keccak256(&buf));
    }

    #[test]
    fn digest_ignores_message_and_result() {
        let base = unsigned();
        let mut with_message = base.clone();
        with_message.message = B256::repeat_byte(0x55);
        with_message.tx_record.message = B256::repeat_byte(0x66);
        with_message.tx_record.result = Bytes::from(vec![9, 9]);
        assert_eq!(
            meta_tx_digest(&domain(), &base),
            meta_tx_digest(&domain(), &with_message)
        );
    }

    #[test]
    fn digest_changes_with_any_signed_field() {
        let base = meta_tx_digest(&domain(), &unsigned());

        let mut nonce = unsigned();
        nonce.params.nonce = U256::from(4u64);
        assert_ne!(base, meta_tx_digest(&domain(), &nonce));

        let mut deadline = unsigned();
        deadline.params.deadline += U256::from(1u64);
        assert_ne!(base, meta_tx_digest(&domain(), &deadline));

        let mut options = unsigned();
        options.tx_record.params.execution_options = Bytes::from(vec![1, 2, 4]);
        assert_ne!(base, meta_tx_digest(&domain(), &options));

        let other_domain = Eip712Domain::new("Warden", "2", 1, Address::repeat_byte(0xcc));
        assert_ne!(base, meta_tx_digest(&other_domain, &unsigned()));
    }

    #[test]
    fn typed_data_json_carries_decimal_integers() {
        let typed = TypedData::new(domain(), unsigned());
        let json = typed.to_json().unwrap();
        assert_eq!(json["primaryType"], "MetaTransaction");
        assert_eq!(json["message"]["txRecord"]["txId"], "7");
        assert_eq!(json["message"]["params"]["nonce"], "3");
        assert_eq!(json["domain"]["chainId"], "1");
        assert_eq!(typed.digest(), meta_tx_digest(&domain(), &unsigned()));
    }
}

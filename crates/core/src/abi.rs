//! Minimal static ABI encoding for execution calldata.
//!
//! Core operations only pass static arguments (addresses and integers), so
//! calldata is the selector followed by one left-padded word per argument.

use alloy_primitives::{keccak256, Address, Bytes, Selector, B256, U256};

/// First four bytes of `keccak256(signature)`.
pub fn selector(signature: &str) -> Selector {
    let hash = keccak256(signature.as_bytes());
    Selector::from_slice(&hash[..4])
}

/// A static ABI value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbiValue {
    Address(Address),
    Uint(U256),
    Bytes32(B256),
}

impl AbiValue {
    fn word(&self) -> [u8; 32] {
        match self {
            AbiValue::Address(address) => address.into_word().0,
            AbiValue::Uint(value) => value.to_be_bytes::<32>(),
            AbiValue::Bytes32(word) => word.0,
        }
    }
}

pub fn encode_args(args: &[AbiValue]) -> Vec<u8> {
    let mut out = Vec::with_capacity(args.len() * 32);
    for arg in args {
        out.extend_from_slice(&arg.word());
    }
    out
}

pub fn encode_call(selector: Selector, args: &[AbiValue]) -> Bytes {
    let mut out = Vec::with_capacity(4 + args.len() * 32);
    out.extend_from_slice(selector.as_slice());
    out.extend_from_slice(&encode_args(args));
    Bytes::from(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selector_matches_known_erc20_transfer() {
        assert_eq!(
            selector("transfer(address,uint256)"),
            Selector::from([0xa9, 0x05, 0x9c, 0xbb])
        );
    }

    #[test]
    fn call_is_selector_plus_padded_words() {
        let to = Address::repeat_byte(0x42);
        let call = encode_call(
            selector("transfer(address,uint256)"),
            &[AbiValue::Address(to), AbiValue::Uint(U256::from(1000u64))],
        );
        assert_eq!(call.len(), 4 + 64);
        assert_eq!(&call[4..16], &[0u8; 12]);
        assert_eq!(&call[16..36], to.as_slice());
        assert_eq!(call[67], 0xe8);
        assert_eq!(call[66], 0x03);
    }
}

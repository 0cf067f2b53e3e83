//! Helper functions for EVM log decoding and value rendering.
//!
//! Provides hash/address string conversions, token formatting of decoded
//! values, and the scaled-amount arithmetic behind `value_formatted` and the
//! large-transfer flag.

use ethabi::Token;
use web3::types::{H160, H256, U256};

/// Converts an H256 hash to its 0x-prefixed hexadecimal representation.
pub fn h256_to_string(hash: H256) -> String {
	format!("0x{}", hex::encode(hash.as_bytes()))
}

/// Converts a hexadecimal string (with or without 0x prefix) to an H256.
pub fn string_to_h256(hash_string: &str) -> Result<H256, Box<dyn std::error::Error>> {
	let stripped = hash_string.strip_prefix("0x").unwrap_or(hash_string);
	let bytes = hex::decode(stripped)?;
	if bytes.len() != 32 {
		return Err(format!("Expected 32 bytes, got {}", bytes.len()).into());
	}
	Ok(H256::from_slice(&bytes))
}

/// Converts an H160 address to its 0x-prefixed hexadecimal representation.
pub fn h160_to_string(address: H160) -> String {
	format!("0x{}", hex::encode(address.as_bytes()))
}

/// Formats an ethabi token into a consistent string representation.
pub fn format_token_value(token: &Token) -> String {
	match token {
		Token::Address(addr) => format!("0x{:x}", addr),
		Token::FixedBytes(bytes) | Token::Bytes(bytes) => format!("0x{}", hex::encode(bytes)),
		Token::Int(num) | Token::Uint(num) => num.to_string(),
		Token::Bool(b) => b.to_string(),
		Token::String(s) => s.clone(),
		Token::Array(arr) | Token::FixedArray(arr) => format!(
			"[{}]",
			arr.iter()
				.map(format_token_value)
				.collect::<Vec<String>>()
				.join(",")
		),
		Token::Tuple(tuple) => format!(
			"({})",
			tuple
				.iter()
				.map(format_token_value)
				.collect::<Vec<String>>()
				.join(",")
		),
	}
}

/// Scales a raw token amount to six fixed fractional digits of precision.
///
/// The amount is multiplied by 10^6 before the integer division by
/// 10^decimals, so everything beyond six fractional digits is truncated.
/// This precision cap is part of the persisted-record contract and must not
/// change. Values whose scaled form exceeds u128 saturate.
pub fn scale_to_micro_units(value: U256, decimals: u8) -> u128 {
	// 10^78 overflows U256; nothing real uses more than 36 decimals.
	let divisor = U256::exp10((decimals as usize).min(77));
	let micro = match value.checked_mul(U256::exp10(6)) {
		Some(scaled) => scaled / divisor,
		// value * 10^6 overflows U256: divide first. The sub-unit remainder
		// lost here is far below the u128 saturation point anyway.
		None => match (value / divisor).checked_mul(U256::from(1_000_000u64)) {
			Some(micro) => micro,
			None => return u128::MAX,
		},
	};
	if micro > U256::from(u128::MAX) {
		u128::MAX
	} else {
		micro.as_u128()
	}
}

/// Renders a raw token amount as an en-US decimal string with comma-grouped
/// integer digits and exactly six fractional digits, e.g. `250,000.000000`.
pub fn format_token_amount(value: U256, decimals: u8) -> String {
	let micro = scale_to_micro_units(value, decimals);
	let whole = micro / 1_000_000;
	let frac = micro % 1_000_000;
	format!("{}.{:06}", group_thousands(whole), frac)
}

fn group_thousands(mut value: u128) -> String {
	if value == 0 {
		return "0".to_string();
	}
	let mut groups = Vec::new();
	while value > 0 {
		groups.push((value % 1_000) as u16);
		value /= 1_000;
	}
	let mut out = groups.pop().map(|g| g.to_string()).unwrap_or_default();
	while let Some(group) = groups.pop() {
		out.push_str(&format!(",{:03}", group));
	}
	out
}

/// Whether a transfer of `value` counts as large: the scaled amount must
/// reach 100,000 for stablecoins or 1,000,000 otherwise. The boundary value
/// itself is large.
pub fn is_large_transfer(value: U256, decimals: u8, is_stablecoin: bool) -> bool {
	let threshold: u64 = if is_stablecoin { 100_000 } else { 1_000_000 };
	let unit = U256::exp10((decimals as usize).min(77));
	match unit.checked_mul(U256::from(threshold)) {
		Some(cutoff) => value >= cutoff,
		// Threshold overflows U256; no representable value can reach it.
		None => false,
	}
}

//! ABI-driven log decoding.
//!
//! Each contract's configured `abi` is a list of human-readable event
//! fragments ("Transfer(address indexed from, address indexed to, uint256
//! value)"). The registry precompiles those fragments into `ethabi::Event`s,
//! indexes them by topic-0, and rejects contracts whose monitored topics are
//! missing or ambiguous. Decoding yields a tagged union: typed records for
//! the canonical ERC-20 `Transfer`/`Approval` events, generic argument maps
//! for everything else.

mod error;
pub mod helpers;

pub use error::DecoderError;

use ethabi::{Event, EventParam, ParamType, RawLog};
use lazy_static::lazy_static;
use std::collections::HashMap;
use web3::types::{H256, Log};

use crate::models::{
	ApprovalEvent, ContractConfig, ContractMetadata, DecodedEvent, TransferEvent,
};
use helpers::{
	format_token_amount, format_token_value, h160_to_string, h256_to_string, is_large_transfer,
};

pub const TRANSFER_SIGNATURE: &str = "Transfer(address,address,uint256)";
pub const APPROVAL_SIGNATURE: &str = "Approval(address,address,uint256)";

lazy_static! {
	/// keccak-256 of `Transfer(address,address,uint256)`.
	pub static ref TRANSFER_TOPIC: H256 = ethabi::long_signature(
		"Transfer",
		&[ParamType::Address, ParamType::Address, ParamType::Uint(256)],
	);
	/// keccak-256 of `Approval(address,address,uint256)`.
	pub static ref APPROVAL_TOPIC: H256 = ethabi::long_signature(
		"Approval",
		&[ParamType::Address, ParamType::Address, ParamType::Uint(256)],
	);
}

/// Parses one human-readable event fragment into an `ethabi::Event`.
///
/// Accepted shape: `Name(type [indexed] [name], ...)`, optionally prefixed
/// with the `event` keyword. Tuple parameter types are not supported; the
/// contracts this indexer monitors do not emit them.
pub fn parse_event_fragment(fragment: &str) -> Result<Event, DecoderError> {
	let trimmed = fragment.trim();
	let trimmed = trimmed.strip_prefix("event ").unwrap_or(trimmed).trim();

	let open = trimmed
		.find('(')
		.ok_or_else(|| DecoderError::fragment_parse(format!("Missing '(' in {:?}", fragment)))?;
	let close = trimmed
		.rfind(')')
		.ok_or_else(|| DecoderError::fragment_parse(format!("Missing ')' in {:?}", fragment)))?;
	if close < open {
		return Err(DecoderError::fragment_parse(format!(
			"Malformed fragment {:?}",
			fragment
		)));
	}

	let name = trimmed[..open].trim();
	if name.is_empty() {
		return Err(DecoderError::fragment_parse(format!(
			"Missing event name in {:?}",
			fragment
		)));
	}

	let mut inputs = Vec::new();
	let params = trimmed[open + 1..close].trim();
	if !params.is_empty() {
		for (position, param) in params.split(',').enumerate() {
			let tokens: Vec<&str> = param.split_whitespace().collect();
			if tokens.is_empty() {
				return Err(DecoderError::fragment_parse(format!(
					"Empty parameter in {:?}",
					fragment
				)));
			}
			let kind = ethabi::param_type::Reader::read(tokens[0]).map_err(|e| {
				DecoderError::fragment_parse(format!(
					"Bad parameter type {:?} in {:?}: {}",
					tokens[0], fragment, e
				))
			})?;
			let indexed = tokens.get(1) == Some(&"indexed");
			let name_token = if indexed { tokens.get(2) } else { tokens.get(1) };
			inputs.push(EventParam {
				name: name_token
					.map(|s| s.to_string())
					.unwrap_or_else(|| format!("arg{}", position)),
				kind,
				indexed,
			});
		}
	}

	Ok(Event {
		name: name.to_string(),
		inputs,
		anonymous: false,
	})
}

/// A precompiled event fragment with its canonical signature and topic hash.
#[derive(Debug, Clone)]
pub struct CompiledEvent {
	pub event: Event,
	pub signature: String,
	pub topic: H256,
}

fn canonical_signature(event: &Event) -> String {
	format!(
		"{}({})",
		event.name,
		event
			.inputs
			.iter()
			.map(|p| p.kind.to_string())
			.collect::<Vec<String>>()
			.join(",")
	)
}

/// A decoded log, ready to be wrapped into an event document.
#[derive(Debug, Clone)]
pub struct DecodedLog {
	pub name: String,
	pub signature: String,
	pub decoded: DecodedEvent,
}

/// Topic-0 → compiled fragment registry for one contract.
pub struct EventRegistry {
	by_topic: HashMap<H256, CompiledEvent>,
}

impl EventRegistry {
	/// Compiles a contract's ABI fragments and resolves every monitored
	/// topic hash against them. Fails when a fragment cannot be parsed, when
	/// two fragments share a signature, or when a monitored hash has no
	/// matching fragment.
	pub fn compile(contract: &ContractConfig) -> Result<Self, DecoderError> {
		let mut compiled: Vec<CompiledEvent> = Vec::with_capacity(contract.abi.len());
		for fragment in &contract.abi {
			let event = parse_event_fragment(fragment)?;
			let signature = canonical_signature(&event);
			if compiled.iter().any(|c| c.signature == signature) {
				return Err(DecoderError::ambiguous_abi(format!(
					"Duplicate signature {} in contract {}",
					signature, contract.address
				)));
			}
			let topic = event.signature();
			compiled.push(CompiledEvent {
				event,
				signature,
				topic,
			});
		}

		let mut by_topic = HashMap::new();
		for hash in &contract.events {
			let topic = helpers::string_to_h256(hash).map_err(|e| {
				DecoderError::unknown_topic(format!("Unparseable topic hash {}: {}", hash, e))
			})?;
			let entry = compiled.iter().find(|c| c.topic == topic).ok_or_else(|| {
				DecoderError::unknown_topic(format!(
					"Monitored topic {} has no ABI fragment in contract {}",
					hash, contract.address
				))
			})?;
			by_topic.insert(topic, entry.clone());
		}

		Ok(Self { by_topic })
	}

	pub fn event_for_topic(&self, topic: &H256) -> Option<&CompiledEvent> {
		self.by_topic.get(topic)
	}

	/// The monitored events, one per topic.
	pub fn monitored(&self) -> impl Iterator<Item = &CompiledEvent> {
		self.by_topic.values()
	}

	pub fn len(&self) -> usize {
		self.by_topic.len()
	}

	pub fn is_empty(&self) -> bool {
		self.by_topic.is_empty()
	}

	/// Decodes a raw log against the registry, producing typed records for
	/// the canonical ERC-20 events and a generic args map otherwise.
	pub fn decode_log(
		&self,
		log: &Log,
		metadata: &ContractMetadata,
	) -> Result<DecodedLog, DecoderError> {
		let topic0 = log
			.topics
			.first()
			.ok_or_else(|| DecoderError::decode_failed("Log has no topics"))?;
		let compiled = self.event_for_topic(topic0).ok_or_else(|| {
			DecoderError::decode_failed(format!(
				"No fragment for topic {}",
				h256_to_string(*topic0)
			))
		})?;

		let parsed = compiled
			.event
			.parse_log(RawLog {
				topics: log.topics.clone(),
				data: log.data.0.clone(),
			})
			.map_err(|e| {
				DecoderError::decode_failed(format!(
					"{} log at {:?}: {}",
					compiled.event.name, log.transaction_hash, e
				))
			})?;

		let decoded = match compiled.signature.as_str() {
			TRANSFER_SIGNATURE => {
				let (from, to, value) = three_address_uint_params(&parsed)?;
				DecodedEvent::Transfer(TransferEvent {
					from,
					to,
					value_raw: value,
					value_formatted: format_token_amount(value, metadata.decimals),
					is_large_transfer: is_large_transfer(
						value,
						metadata.decimals,
						metadata.is_stablecoin,
					),
				})
			}
			APPROVAL_SIGNATURE => {
				let (owner, spender, value) = three_address_uint_params(&parsed)?;
				DecodedEvent::Approval(ApprovalEvent {
					owner,
					spender,
					value_raw: value,
					value_formatted: format_token_amount(value, metadata.decimals),
				})
			}
			_ => {
				let mut args = serde_json::Map::new();
				for param in &parsed.params {
					args.insert(
						param.name.clone(),
						serde_json::Value::String(format_token_value(&param.value)),
					);
				}
				DecodedEvent::Raw {
					args: serde_json::Value::Object(args),
				}
			}
		};

		Ok(DecodedLog {
			name: compiled.event.name.clone(),
			signature: compiled.signature.clone(),
			decoded,
		})
	}
}

fn three_address_uint_params(
	parsed: &ethabi::Log,
) -> Result<(String, String, web3::types::U256), DecoderError> {
	if parsed.params.len() != 3 {
		return Err(DecoderError::decode_failed(format!(
			"Expected 3 parameters, got {}",
			parsed.params.len()
		)));
	}
	let first = parsed.params[0]
		.value
		.clone()
		.into_address()
		.ok_or_else(|| DecoderError::decode_failed("First parameter is not an address"))?;
	let second = parsed.params[1]
		.value
		.clone()
		.into_address()
		.ok_or_else(|| DecoderError::decode_failed("Second parameter is not an address"))?;
	let value = parsed.params[2]
		.value
		.clone()
		.into_uint()
		.ok_or_else(|| DecoderError::decode_failed("Third parameter is not a uint"))?;
	Ok((h160_to_string(first), h160_to_string(second), value))
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::models::ContractMetadata;
	use web3::types::{Bytes, H160, U256};

	const TRANSFER_FRAGMENT: &str =
		"Transfer(address indexed from, address indexed to, uint256 value)";

	fn usdc_contract() -> ContractConfig {
		ContractConfig {
			chain_id: 1,
			address: "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48".into(),
			name: "USD Coin".into(),
			symbol: "USDC".into(),
			contract_type: "erc20".into(),
			events: vec![h256_to_string(*TRANSFER_TOPIC)],
			abi: vec![TRANSFER_FRAGMENT.into()],
			enabled: true,
			metadata: ContractMetadata {
				decimals: 6,
				is_stablecoin: true,
				priority: None,
				extra: Default::default(),
			},
		}
	}

	fn transfer_log(from: H160, to: H160, value: U256) -> Log {
		let mut from_topic = [0u8; 32];
		from_topic[12..].copy_from_slice(from.as_bytes());
		let mut to_topic = [0u8; 32];
		to_topic[12..].copy_from_slice(to.as_bytes());
		let mut data = [0u8; 32];
		value.to_big_endian(&mut data);
		Log {
			address: H160::from_low_u64_be(0xaaaa),
			topics: vec![*TRANSFER_TOPIC, H256::from(from_topic), H256::from(to_topic)],
			data: Bytes(data.to_vec()),
			block_hash: None,
			block_number: Some(95.into()),
			transaction_hash: None,
			transaction_index: None,
			log_index: Some(0.into()),
			transaction_log_index: None,
			log_type: None,
			removed: None,
		}
	}

	#[test]
	fn fragment_topic_matches_canonical_hash() {
		let event = parse_event_fragment(TRANSFER_FRAGMENT).unwrap();
		assert_eq!(event.signature(), *TRANSFER_TOPIC);
		assert_eq!(canonical_signature(&event), TRANSFER_SIGNATURE);
		assert!(event.inputs[0].indexed);
		assert!(event.inputs[1].indexed);
		assert!(!event.inputs[2].indexed);
		assert_eq!(event.inputs[0].name, "from");
	}

	#[test]
	fn fragment_parser_tolerates_event_keyword_and_missing_names() {
		let event = parse_event_fragment("event Approval(address,address,uint256)").unwrap();
		assert_eq!(event.name, "Approval");
		assert_eq!(event.inputs[0].name, "arg0");
		assert_eq!(event.signature(), *APPROVAL_TOPIC);
	}

	#[test]
	fn fragment_parser_rejects_garbage() {
		assert!(parse_event_fragment("Transfer").is_err());
		assert!(parse_event_fragment("(address)").is_err());
		assert!(parse_event_fragment("Transfer(addresss from)").is_err());
	}

	#[test]
	fn registry_rejects_duplicate_signatures() {
		let mut contract = usdc_contract();
		contract.abi.push("Transfer(address,address,uint256)".into());
		assert!(matches!(
			EventRegistry::compile(&contract),
			Err(DecoderError::AmbiguousAbi(_))
		));
	}

	#[test]
	fn registry_rejects_unresolved_topics() {
		let mut contract = usdc_contract();
		contract.events = vec![h256_to_string(*APPROVAL_TOPIC)];
		assert!(matches!(
			EventRegistry::compile(&contract),
			Err(DecoderError::UnknownTopic(_))
		));
	}

	#[test]
	fn decodes_transfer_into_typed_record() {
		let contract = usdc_contract();
		let registry = EventRegistry::compile(&contract).unwrap();
		let log = transfer_log(
			H160::from_low_u64_be(1),
			H160::from_low_u64_be(2),
			U256::from(250_000_000_000u64),
		);

		let decoded = registry.decode_log(&log, &contract.metadata).unwrap();
		assert_eq!(decoded.name, "Transfer");
		assert_eq!(decoded.signature, TRANSFER_SIGNATURE);
		match decoded.decoded {
			DecodedEvent::Transfer(t) => {
				assert_eq!(t.from, h160_to_string(H160::from_low_u64_be(1)));
				assert_eq!(t.to, h160_to_string(H160::from_low_u64_be(2)));
				assert_eq!(t.value_raw, U256::from(250_000_000_000u64));
				assert_eq!(t.value_formatted, "250,000.000000");
				assert!(t.is_large_transfer);
			}
			other => panic!("expected Transfer, got {:?}", other),
		}
	}

	#[test]
	fn decode_failure_on_truncated_data() {
		let contract = usdc_contract();
		let registry = EventRegistry::compile(&contract).unwrap();
		let mut log = transfer_log(
			H160::from_low_u64_be(1),
			H160::from_low_u64_be(2),
			U256::from(1u64),
		);
		log.data = Bytes(vec![0u8; 5]);

		assert!(matches!(
			registry.decode_log(&log, &contract.metadata),
			Err(DecoderError::DecodeFailed(_))
		));
	}

	#[test]
	fn non_builtin_events_decode_as_raw_args() {
		let deposit_fragment = "Deposit(address indexed dst, uint256 wad)";
		let deposit_event = parse_event_fragment(deposit_fragment).unwrap();
		let mut contract = usdc_contract();
		contract.events = vec![h256_to_string(deposit_event.signature())];
		contract.abi = vec![deposit_fragment.into()];
		let registry = EventRegistry::compile(&contract).unwrap();

		let mut dst_topic = [0u8; 32];
		dst_topic[12..].copy_from_slice(H160::from_low_u64_be(7).as_bytes());
		let mut data = [0u8; 32];
		U256::from(55u64).to_big_endian(&mut data);
		let log = Log {
			address: H160::from_low_u64_be(0xaaaa),
			topics: vec![deposit_event.signature(), H256::from(dst_topic)],
			data: Bytes(data.to_vec()),
			block_hash: None,
			block_number: Some(1.into()),
			transaction_hash: None,
			transaction_index: None,
			log_index: Some(0.into()),
			transaction_log_index: None,
			log_type: None,
			removed: None,
		};

		let decoded = registry.decode_log(&log, &contract.metadata).unwrap();
		match decoded.decoded {
			DecodedEvent::Raw { args } => {
				assert_eq!(args["wad"], "55");
				assert_eq!(args["dst"], format!("0x{:x}", H160::from_low_u64_be(7)));
			}
			other => panic!("expected Raw, got {:?}", other),
		}
	}
}

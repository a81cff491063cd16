use std::time::Duration;

use color_eyre::{Result, eyre};
use reqwest::Client;
use serde_json::Value;

/// An entity span reported by the external named-entity classifier. Offsets
/// are byte offsets into the analyzed text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NerSpan {
	pub entity_type: String,
	pub start: usize,
	pub end: usize,
}

pub async fn analyze(cfg: &parapet_config::ProviderConfig, text: &str) -> Result<Vec<NerSpan>> {
	let client = Client::builder().timeout(Duration::from_millis(cfg.timeout_ms)).build()?;
	let url = format!("{}{}", cfg.api_base, cfg.path);
	let body = serde_json::json!({ "model": cfg.model, "text": text });
	let res = client
		.post(url)
		.headers(crate::auth_headers(&cfg.api_key, &cfg.default_headers)?)
		.json(&body)
		.send()
		.await?;
	let json: Value = res.error_for_status()?.json().await?;

	parse_ner_response(json)
}

fn parse_ner_response(json: Value) -> Result<Vec<NerSpan>> {
	let entities = json
		.get("entities")
		.or_else(|| json.get("results"))
		.and_then(|v| v.as_array())
		.ok_or_else(|| eyre::eyre!("NER response is missing entities array."))?;

	let mut spans = Vec::with_capacity(entities.len());

	for item in entities {
		let entity_type = item
			.get("entity_type")
			.or_else(|| item.get("type"))
			.and_then(|v| v.as_str())
			.ok_or_else(|| eyre::eyre!("NER entity missing entity_type."))?;
		let start = item
			.get("start")
			.and_then(|v| v.as_u64())
			.ok_or_else(|| eyre::eyre!("NER entity missing start offset."))? as usize;
		let end = item
			.get("end")
			.and_then(|v| v.as_u64())
			.ok_or_else(|| eyre::eyre!("NER entity missing end offset."))? as usize;

		if start >= end {
			continue;
		}

		spans.push(NerSpan { entity_type: entity_type.to_string(), start, end });
	}

	spans.sort_by(|a, b| a.start.cmp(&b.start).then(a.end.cmp(&b.end)));

	Ok(spans)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_entities_sorted_by_offset() {
		let json = serde_json::json!({
			"entities": [
				{ "entity_type": "LOCATION", "start": 20, "end": 26 },
				{ "entity_type": "PERSON", "start": 0, "end": 9 }
			]
		});
		let spans = parse_ner_response(json).expect("parse failed");

		assert_eq!(spans.len(), 2);
		assert_eq!(spans[0].entity_type, "PERSON");
		assert_eq!(spans[1].entity_type, "LOCATION");
	}

	#[test]
	fn accepts_the_type_field_spelling_and_drops_empty_spans() {
		let json = serde_json::json!({
			"results": [
				{ "type": "PERSON", "start": 3, "end": 3 },
				{ "type": "PERSON", "start": 4, "end": 10 }
			]
		});
		let spans = parse_ner_response(json).expect("parse failed");

		assert_eq!(spans.len(), 1);
		assert_eq!(spans[0].start, 4);
	}
}

use std::time::Duration;

use color_eyre::{Result, eyre};
use reqwest::Client;
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeneratedCitation {
	pub chunk_id: Uuid,
	pub start_offset: u32,
	pub end_offset: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationOutput {
	pub text: String,
	pub citations: Vec<GeneratedCitation>,
}

/// One generation call. The model is instructed (by the caller's messages)
/// to emit strict JSON; a response whose content fails to parse is asked
/// again up to three times inside the same call before giving up.
pub async fn generate(
	cfg: &parapet_config::GenerationProviderConfig,
	messages: &[Value],
) -> Result<GenerationOutput> {
	let client = Client::builder().timeout(Duration::from_millis(cfg.timeout_ms)).build()?;
	let url = format!("{}{}", cfg.api_base, cfg.path);

	for _ in 0..3 {
		let body = serde_json::json!({
			"model": cfg.model,
			"temperature": cfg.temperature,
			"max_tokens": cfg.max_output_tokens,
			"messages": messages,
		});
		let res = client
			.post(&url)
			.headers(crate::auth_headers(&cfg.api_key, &cfg.default_headers)?)
			.json(&body)
			.send()
			.await?;
		let json: Value = res.error_for_status()?.json().await?;

		if let Ok(parsed) = parse_generation_response(json) {
			return Ok(parsed);
		}
	}

	Err(eyre::eyre!("Generation response is not valid answer JSON."))
}

fn parse_generation_response(json: Value) -> Result<GenerationOutput> {
	let content = json
		.get("choices")
		.and_then(|v| v.as_array())
		.and_then(|arr| arr.first())
		.and_then(|choice| choice.get("message"))
		.and_then(|msg| msg.get("content"))
		.and_then(|c| c.as_str())
		.ok_or_else(|| eyre::eyre!("Generation response is missing message content."))?;
	let parsed: Value = serde_json::from_str(content)
		.map_err(|_| eyre::eyre!("Generation content is not valid JSON."))?;

	parse_answer_json(parsed)
}

fn parse_answer_json(json: Value) -> Result<GenerationOutput> {
	let text = json
		.get("answer")
		.or_else(|| json.get("text"))
		.and_then(|v| v.as_str())
		.ok_or_else(|| eyre::eyre!("Answer JSON is missing the answer field."))?
		.to_string();
	let mut citations = Vec::new();

	if let Some(raw) = json.get("citations").and_then(|v| v.as_array()) {
		for item in raw {
			let chunk_id = item
				.get("chunk_id")
				.and_then(|v| v.as_str())
				.and_then(|v| Uuid::parse_str(v).ok())
				.ok_or_else(|| eyre::eyre!("Citation is missing a valid chunk_id."))?;
			let start_offset = item
				.get("start_offset")
				.and_then(|v| v.as_u64())
				.ok_or_else(|| eyre::eyre!("Citation is missing start_offset."))? as u32;
			let end_offset = item
				.get("end_offset")
				.and_then(|v| v.as_u64())
				.ok_or_else(|| eyre::eyre!("Citation is missing end_offset."))? as u32;

			citations.push(GeneratedCitation { chunk_id, start_offset, end_offset });
		}
	}

	Ok(GenerationOutput { text, citations })
}

use regex::Regex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMethod {
	Pattern,
	NamedEntity,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct PiiFinding {
	pub entity_type: String,
	pub start: usize,
	pub end: usize,
	pub method: DetectionMethod,
}

/// The deterministic first pass: structured identifiers matched by the
/// configured regex set. Compiled once at service construction.
pub struct PatternSet {
	patterns: Vec<(String, Regex)>,
}

impl PatternSet {
	pub fn compile(patterns: &[parapet_config::PiiPattern]) -> Result<Self, regex::Error> {
		let mut compiled = Vec::with_capacity(patterns.len());

		for pattern in patterns {
			compiled.push((pattern.entity_type.clone(), Regex::new(&pattern.pattern)?));
		}

		Ok(Self { patterns: compiled })
	}

	pub fn scan(&self, text: &str) -> Vec<PiiFinding> {
		let mut findings = Vec::new();

		for (entity_type, regex) in &self.patterns {
			for found in regex.find_iter(text) {
				findings.push(PiiFinding {
					entity_type: entity_type.clone(),
					start: found.start(),
					end: found.end(),
					method: DetectionMethod::Pattern,
				});
			}
		}

		findings.sort_by(|a, b| a.start.cmp(&b.start).then(b.end.cmp(&a.end)));

		findings
	}
}

/// Merges the pattern and named-entity passes into one offset-ordered,
/// non-overlapping sequence. When both passes flag the same span the pattern
/// finding wins: patterns are exact on structured data while the classifier
/// is probabilistic.
pub fn merge_findings(pattern: Vec<PiiFinding>, entity: Vec<PiiFinding>) -> Vec<PiiFinding> {
	let mut kept: Vec<PiiFinding> = Vec::with_capacity(pattern.len() + entity.len());

	let mut pattern = pattern;
	pattern.sort_by(|a, b| a.start.cmp(&b.start).then(b.end.cmp(&a.end)));
	for finding in pattern {
		if !kept.iter().any(|existing| overlaps(existing, &finding)) {
			kept.push(finding);
		}
	}

	let mut entity = entity;
	entity.sort_by(|a, b| a.start.cmp(&b.start).then(b.end.cmp(&a.end)));
	for finding in entity {
		if !kept.iter().any(|existing| overlaps(existing, &finding)) {
			kept.push(finding);
		}
	}

	kept.sort_by(|a, b| a.start.cmp(&b.start).then(a.end.cmp(&b.end)));

	kept
}

pub fn first_blocking<'a>(
	findings: &'a [PiiFinding],
	blocking_entity_types: &[String],
) -> Option<&'a PiiFinding> {
	findings.iter().find(|finding| {
		blocking_entity_types.iter().any(|entity| entity == &finding.entity_type)
	})
}

/// Replaces every finding's span with a type-tagged placeholder, e.g.
/// `[EMAIL_ADDRESS]`. Findings must be offset-ordered and non-overlapping
/// (the shape `merge_findings` produces); spans that do not land on character
/// boundaries of `text` are skipped rather than corrupting the output.
pub fn redact(text: &str, findings: &[PiiFinding]) -> String {
	let mut out = String::with_capacity(text.len());
	let mut cursor = 0usize;

	for finding in findings {
		if finding.start < cursor || finding.end > text.len() || finding.start >= finding.end {
			continue;
		}
		if !text.is_char_boundary(finding.start) || !text.is_char_boundary(finding.end) {
			continue;
		}

		out.push_str(&text[cursor..finding.start]);
		out.push('[');
		out.push_str(&finding.entity_type);
		out.push(']');

		cursor = finding.end;
	}

	out.push_str(&text[cursor..]);

	out
}

fn overlaps(a: &PiiFinding, b: &PiiFinding) -> bool {
	a.start < b.end && b.start < a.end
}

#[cfg(test)]
mod tests {
	use super::*;

	fn pattern_set() -> PatternSet {
		PatternSet::compile(&[
			parapet_config::PiiPattern {
				entity_type: "EMAIL_ADDRESS".to_string(),
				pattern: r"[\w.+-]+@[\w-]+\.[A-Za-z]{2,}".to_string(),
			},
			parapet_config::PiiPattern {
				entity_type: "NATIONAL_ID".to_string(),
				pattern: r"\b\d{3}-\d{2}-\d{4}\b".to_string(),
			},
		])
		.expect("patterns must compile")
	}

	#[test]
	fn pattern_pass_finds_structured_identifiers() {
		let findings = pattern_set().scan("Contact ana@example.com or 123-45-6789.");

		assert_eq!(findings.len(), 2);
		assert_eq!(findings[0].entity_type, "EMAIL_ADDRESS");
		assert_eq!(findings[0].method, DetectionMethod::Pattern);
		assert_eq!(findings[1].entity_type, "NATIONAL_ID");
	}

	#[test]
	fn overlapping_findings_keep_the_pattern_side() {
		let text = "Mail bob@example.com today.";
		let pattern = pattern_set().scan(text);
		let entity = vec![PiiFinding {
			entity_type: "PERSON".to_string(),
			start: 5,
			end: 20,
			method: DetectionMethod::NamedEntity,
		}];
		let merged = merge_findings(pattern, entity);

		assert_eq!(merged.len(), 1);
		assert_eq!(merged[0].method, DetectionMethod::Pattern);
		assert_eq!(merged[0].entity_type, "EMAIL_ADDRESS");
	}

	#[test]
	fn non_overlapping_findings_from_both_passes_are_kept_in_offset_order() {
		let text = "Ask Maria Lopez at lopez@example.com.";
		let pattern = pattern_set().scan(text);
		let entity = vec![PiiFinding {
			entity_type: "PERSON".to_string(),
			start: 4,
			end: 15,
			method: DetectionMethod::NamedEntity,
		}];
		let merged = merge_findings(pattern, entity);

		assert_eq!(merged.len(), 2);
		assert_eq!(merged[0].entity_type, "PERSON");
		assert_eq!(merged[1].entity_type, "EMAIL_ADDRESS");
	}

	#[test]
	fn redaction_is_type_tagged() {
		let text = "Write to kim@example.com now.";
		let findings = pattern_set().scan(text);
		let redacted = redact(text, &findings);

		assert_eq!(redacted, "Write to [EMAIL_ADDRESS] now.");
	}

	#[test]
	fn redaction_skips_out_of_bounds_spans() {
		let text = "short";
		let findings = vec![PiiFinding {
			entity_type: "PERSON".to_string(),
			start: 2,
			end: 40,
			method: DetectionMethod::NamedEntity,
		}];

		assert_eq!(redact(text, &findings), "short");
	}

	#[test]
	fn blocking_lookup_matches_configured_types() {
		let findings = pattern_set().scan("id 123-45-6789");
		let blocking = vec!["NATIONAL_ID".to_string()];

		assert!(first_blocking(&findings, &blocking).is_some());
		assert!(first_blocking(&findings, &["CREDIT_CARD".to_string()]).is_none());
	}
}

//! Response shapes for structured generation, written as JSON Schema.
//!
//! The REST backend embeds these in the prompt; Gemini receives them as
//! `responseSchema` after `to_gemini` rewrites them into its OpenAPI subset.

use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::models::results::{Evaluation, Level, ResourceKind, RoadmapDraft};
use crate::provider::ProviderError;

pub const ROADMAP_MIN_ITEMS: usize = 5;
pub const ROADMAP_MAX_ITEMS: usize = 7;
pub const KEY_CONCEPTS_RANGE: (usize, usize) = (3, 5);
pub const RESOURCES_RANGE: (usize, usize) = (2, 3);

pub fn evaluation() -> Value {
    json!({
        "type": "object",
        "properties": {
            "summary": { "type": "string", "description": "Two to three sentence overview of the performance." },
            "knowledgeAssessment": { "type": "string" },
            "skillsAssessment": { "type": "string" },
            "confidenceAssessment": { "type": "string", "description": "Use the candidate's frames as evidence of composure, eye contact and posture." },
            "communicationAssessment": { "type": "string" },
            "level": { "type": "string", "enum": Level::ALL }
        },
        "required": [
            "summary",
            "knowledgeAssessment",
            "skillsAssessment",
            "confidenceAssessment",
            "communicationAssessment",
            "level"
        ],
        "additionalProperties": false
    })
}

pub fn roadmap() -> Value {
    json!({
        "type": "object",
        "properties": {
            "items": {
                "type": "array",
                "minItems": ROADMAP_MIN_ITEMS,
                "maxItems": ROADMAP_MAX_ITEMS,
                "items": {
                    "type": "object",
                    "properties": {
                        "title": { "type": "string" },
                        "description": { "type": "string" },
                        "keyConcepts": {
                            "type": "array",
                            "minItems": KEY_CONCEPTS_RANGE.0,
                            "maxItems": KEY_CONCEPTS_RANGE.1,
                            "items": { "type": "string" }
                        },
                        "projectSuggestion": { "type": "string" },
                        "resources": {
                            "type": "array",
                            "minItems": RESOURCES_RANGE.0,
                            "maxItems": RESOURCES_RANGE.1,
                            "items": {
                                "type": "object",
                                "properties": {
                                    "title": { "type": "string" },
                                    "url": { "type": "string" },
                                    "type": { "type": "string", "enum": ResourceKind::ALL }
                                },
                                "required": ["title", "url", "type"],
                                "additionalProperties": false
                            }
                        }
                    },
                    "required": ["title", "description", "keyConcepts", "projectSuggestion", "resources"],
                    "additionalProperties": false
                }
            }
        },
        "required": ["items"],
        "additionalProperties": false
    })
}

pub fn resume_match() -> Value {
    json!({
        "type": "object",
        "properties": {
            "score": { "type": "integer", "description": "Match score from 0 to 100." },
            "strengths": { "type": "string" },
            "weaknesses": { "type": "string" }
        },
        "required": ["score", "strengths", "weaknesses"],
        "additionalProperties": false
    })
}

/// Rewrites a JSON Schema into Gemini's dialect: upper-case `type` names and
/// no `additionalProperties`. Array bounds are passed through as strings.
pub fn to_gemini(schema: &Value) -> Value {
    match schema {
        Value::Object(map) => {
            let mut out = Map::new();
            for (key, value) in map {
                match key.as_str() {
                    "additionalProperties" => {}
                    "type" if value.is_string() => {
                        let upper = value.as_str().unwrap_or_default().to_uppercase();
                        out.insert(key.clone(), Value::String(upper));
                    }
                    "minItems" | "maxItems" => {
                        out.insert(key.clone(), Value::String(value.to_string()));
                    }
                    _ => {
                        out.insert(key.clone(), to_gemini(value));
                    }
                }
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(to_gemini).collect()),
        other => other.clone(),
    }
}

/// Top-level wrapper the roadmap schema asks for.
#[derive(Debug, Deserialize)]
pub struct RoadmapEnvelope {
    pub items: Vec<RoadmapDraft>,
}

/// Rejects evaluations with blank text fields.
pub fn check_evaluation(evaluation: Evaluation) -> Result<Evaluation, ProviderError> {
    let blank = evaluation.blank_fields();
    if !blank.is_empty() {
        return Err(ProviderError::MalformedResponse(format!(
            "evaluation has empty fields: {}",
            blank.join(", ")
        )));
    }
    Ok(evaluation)
}

/// Enforces the roadmap bounds that serde alone cannot express.
pub fn check_roadmap(items: Vec<RoadmapDraft>) -> Result<Vec<RoadmapDraft>, ProviderError> {
    let malformed = |msg: String| Err(ProviderError::MalformedResponse(msg));

    if !(ROADMAP_MIN_ITEMS..=ROADMAP_MAX_ITEMS).contains(&items.len()) {
        return malformed(format!(
            "roadmap has {} items, expected {ROADMAP_MIN_ITEMS}-{ROADMAP_MAX_ITEMS}",
            items.len()
        ));
    }
    for (i, item) in items.iter().enumerate() {
        if item.title.trim().is_empty() {
            return malformed(format!("roadmap item {} has no title", i + 1));
        }
        let concepts = item.key_concepts.len();
        if !(KEY_CONCEPTS_RANGE.0..=KEY_CONCEPTS_RANGE.1).contains(&concepts) {
            return malformed(format!(
                "roadmap item {} has {concepts} key concepts",
                i + 1
            ));
        }
        let resources = item.resources.len();
        if !(RESOURCES_RANGE.0..=RESOURCES_RANGE.1).contains(&resources) {
            return malformed(format!("roadmap item {} has {resources} resources", i + 1));
        }
    }
    Ok(items)
}

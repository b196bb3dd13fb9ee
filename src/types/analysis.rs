//! Stage outputs and the terminal artifact of one invocation.

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// One request/response exchange with the inference service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Description,
    Materials,
    Geocoding,
}

impl Stage {
    /// Stages in execution order.
    pub const ALL: [Stage; 3] = [Stage::Description, Stage::Materials, Stage::Geocoding];
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Description => write!(f, "description"),
            Stage::Materials => write!(f, "materials"),
            Stage::Geocoding => write!(f, "geocoding"),
        }
    }
}

/// A material and the place it was most likely produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterialEntry {
    pub material: String,
    pub origin: String,
}

/// A place with decimal-degree coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinateEntry {
    pub place: String,
    pub latitude: f64,
    pub longitude: f64,
}

/// Successful pipeline output.
///
/// `raw` is the geocoding stage's text exactly as the model returned it;
/// the parsed vectors are derived from it and from the materials stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisOutcome {
    pub raw: String,
    pub coordinates: Vec<CoordinateEntry>,
    pub materials: Vec<MaterialEntry>,
    pub materials_raw: String,
    pub description: String,
}

/// Total success or total failure of one invocation.
pub type PipelineResult = Result<AnalysisOutcome, PipelineError>;

/// Text a caller renders for a result: the raw coordinates literal, or
/// `Error: <message>`.
pub fn display_text(result: &PipelineResult) -> String {
    match result {
        Ok(outcome) => outcome.raw.clone(),
        Err(e) => e.display_text(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::UpstreamError;

    #[test]
    fn display_text_passes_raw_through() {
        let result: PipelineResult = Ok(AnalysisOutcome {
            raw: "[[\"Vermont\",44.26,-72.58]]".to_string(),
            coordinates: vec![CoordinateEntry {
                place: "Vermont".to_string(),
                latitude: 44.26,
                longitude: -72.58,
            }],
            materials: Vec::new(),
            materials_raw: String::new(),
            description: String::new(),
        });
        assert_eq!(display_text(&result), "[[\"Vermont\",44.26,-72.58]]");
    }

    #[test]
    fn display_text_prefixes_errors() {
        let result: PipelineResult = Err(UpstreamError::Decode("eof".to_string()).into());
        assert!(display_text(&result).starts_with("Error: "));
    }

    #[test]
    fn stage_serializes_snake_case() {
        assert_eq!(serde_json::to_string(&Stage::Geocoding).unwrap(), "\"geocoding\"");
        assert_eq!(Stage::ALL[1].to_string(), "materials");
    }
}

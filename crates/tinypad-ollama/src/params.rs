//! Sampling parameters and the generation request body.

use serde::Serialize;

use crate::error::ValidationError;

/// Parsed sampling knobs, passed through unmodified to the daemon.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SamplingParams {
    pub temperature: f64,
    pub top_p: f64,
    pub top_k: i64,
    pub repeat_penalty: f64,
    pub presence_penalty: f64,
    pub frequency_penalty: f64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub stop: Vec<String>,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            top_p: 0.9,
            top_k: 40,
            repeat_penalty: 1.0,
            presence_penalty: 0.0,
            frequency_penalty: 0.0,
            stop: Vec::new(),
        }
    }
}

/// Raw user-entered sampling fields, as a form or command line holds them.
#[derive(Debug, Clone, PartialEq)]
pub struct SamplingInput {
    pub temperature: String,
    pub top_p: String,
    pub top_k: String,
    pub repeat_penalty: String,
    pub presence_penalty: String,
    pub frequency_penalty: String,
    /// Comma-separated stop sequences.
    pub stop: String,
}

impl Default for SamplingInput {
    fn default() -> Self {
        let defaults = SamplingParams::default();
        Self {
            temperature: defaults.temperature.to_string(),
            top_p: defaults.top_p.to_string(),
            top_k: defaults.top_k.to_string(),
            repeat_penalty: defaults.repeat_penalty.to_string(),
            presence_penalty: defaults.presence_penalty.to_string(),
            frequency_penalty: defaults.frequency_penalty.to_string(),
            stop: String::new(),
        }
    }
}

/// Field names accepted by [`SamplingInput::set`].
pub const SAMPLING_FIELDS: &[&str] = &[
    "temperature",
    "top_p",
    "top_k",
    "repeat_penalty",
    "presence_penalty",
    "frequency_penalty",
    "stop",
];

impl SamplingInput {
    /// Parse every field. The first field that fails aborts the whole parse.
    pub fn parse(&self) -> Result<SamplingParams, ValidationError> {
        Ok(SamplingParams {
            temperature: parse_float("temperature", &self.temperature)?,
            top_p: parse_float("top_p", &self.top_p)?,
            top_k: parse_int("top_k", &self.top_k)?,
            repeat_penalty: parse_float("repeat_penalty", &self.repeat_penalty)?,
            presence_penalty: parse_float("presence_penalty", &self.presence_penalty)?,
            frequency_penalty: parse_float("frequency_penalty", &self.frequency_penalty)?,
            stop: parse_stop_sequences(&self.stop),
        })
    }

    /// Update one field by name (`top-p` and `top_p` are both accepted).
    /// Returns `false` for unknown field names.
    pub fn set(&mut self, field: &str, value: impl Into<String>) -> bool {
        let slot = match field.replace('-', "_").as_str() {
            "temperature" => &mut self.temperature,
            "top_p" => &mut self.top_p,
            "top_k" => &mut self.top_k,
            "repeat_penalty" => &mut self.repeat_penalty,
            "presence_penalty" => &mut self.presence_penalty,
            "frequency_penalty" => &mut self.frequency_penalty,
            "stop" => &mut self.stop,
            _ => return false,
        };
        *slot = value.into();
        true
    }

    /// Field name and raw value pairs, in display order.
    pub fn fields(&self) -> [(&'static str, &str); 7] {
        [
            ("temperature", &self.temperature),
            ("top_p", &self.top_p),
            ("top_k", &self.top_k),
            ("repeat_penalty", &self.repeat_penalty),
            ("presence_penalty", &self.presence_penalty),
            ("frequency_penalty", &self.frequency_penalty),
            ("stop", &self.stop),
        ]
    }
}

fn parse_float(field: &'static str, raw: &str) -> Result<f64, ValidationError> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| ValidationError::InvalidParameter {
            field,
            value: raw.to_string(),
            expected: "number",
        })
}

fn parse_int(field: &'static str, raw: &str) -> Result<i64, ValidationError> {
    raw.trim()
        .parse::<i64>()
        .map_err(|_| ValidationError::InvalidParameter {
            field,
            value: raw.to_string(),
            expected: "integer",
        })
}

/// Split a comma-separated stop list. Entries are trimmed and blank entries
/// dropped, so `""` and `","` both mean "no stop sequences".
pub fn parse_stop_sequences(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// One generation request, ready to send.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub model: String,
    pub prompt: String,
    pub params: SamplingParams,
}

impl GenerationRequest {
    pub fn new(model: impl Into<String>, prompt: impl Into<String>, params: SamplingParams) -> Self {
        Self {
            model: model.into(),
            prompt: prompt.into(),
            params,
        }
    }

    /// Local checks that must pass before any network I/O.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.model.trim().is_empty() {
            return Err(ValidationError::MissingModel);
        }
        if self.prompt.trim().is_empty() {
            return Err(ValidationError::BlankPrompt);
        }
        Ok(())
    }

    pub(crate) fn body(&self) -> GenerateBody<'_> {
        GenerateBody {
            model: &self.model,
            prompt: &self.prompt,
            stream: true,
            params: &self.params,
        }
    }
}

/// Wire shape of `POST /api/generate`.
#[derive(Debug, Serialize)]
pub(crate) struct GenerateBody<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    #[serde(flatten)]
    params: &'a SamplingParams,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_input_parses_to_defaults() {
        let params = SamplingInput::default().parse().unwrap();
        assert_eq!(params, SamplingParams::default());
    }

    #[test]
    fn test_invalid_float_names_field() {
        let mut input = SamplingInput::default();
        input.top_p = "lots".to_string();
        let err = input.parse().unwrap_err();
        assert_eq!(
            err,
            ValidationError::InvalidParameter {
                field: "top_p",
                value: "lots".to_string(),
                expected: "number",
            }
        );
    }

    #[test]
    fn test_top_k_rejects_fraction() {
        let mut input = SamplingInput::default();
        input.top_k = "40.5".to_string();
        assert!(matches!(
            input.parse(),
            Err(ValidationError::InvalidParameter { field: "top_k", .. })
        ));
    }

    #[test]
    fn test_non_finite_rejected() {
        let mut input = SamplingInput::default();
        input.temperature = "NaN".to_string();
        assert!(input.parse().is_err());
    }

    #[test]
    fn test_whitespace_around_numbers_is_fine() {
        let mut input = SamplingInput::default();
        input.temperature = " 1.2 ".to_string();
        assert_eq!(input.parse().unwrap().temperature, 1.2);
    }

    #[test]
    fn test_stop_sequences_drop_blanks() {
        assert!(parse_stop_sequences("").is_empty());
        assert!(parse_stop_sequences(",").is_empty());
        assert!(parse_stop_sequences(" , ,").is_empty());
        assert_eq!(
            parse_stop_sequences("User:, ###,,END "),
            vec!["User:", "###", "END"]
        );
    }

    #[test]
    fn test_set_by_name() {
        let mut input = SamplingInput::default();
        assert!(input.set("top-k", "10"));
        assert!(input.set("stop", "a,b"));
        assert!(!input.set("seed", "1"));
        let params = input.parse().unwrap();
        assert_eq!(params.top_k, 10);
        assert_eq!(params.stop, vec!["a", "b"]);
    }

    #[test]
    fn test_validate() {
        let params = SamplingParams::default();
        assert_eq!(
            GenerationRequest::new("m1", "  \n", params.clone()).validate(),
            Err(ValidationError::BlankPrompt)
        );
        assert_eq!(
            GenerationRequest::new("", "hi", params.clone()).validate(),
            Err(ValidationError::MissingModel)
        );
        assert!(GenerationRequest::new("m1", "hi", params).validate().is_ok());
    }

    #[test]
    fn test_body_without_stop() {
        let request = GenerationRequest::new("m1", "hello", SamplingParams::default());
        let body = serde_json::to_value(request.body()).unwrap();
        assert_eq!(
            body,
            json!({
                "model": "m1",
                "prompt": "hello",
                "stream": true,
                "temperature": 0.7,
                "top_p": 0.9,
                "top_k": 40,
                "repeat_penalty": 1.0,
                "presence_penalty": 0.0,
                "frequency_penalty": 0.0,
            })
        );
        assert!(body.get("stop").is_none());
    }

    #[test]
    fn test_body_with_stop() {
        let params = SamplingParams {
            stop: vec!["\n\n".to_string(), "User:".to_string()],
            ..SamplingParams::default()
        };
        let request = GenerationRequest::new("m1", "hello", params);
        let body = serde_json::to_value(request.body()).unwrap();
        assert_eq!(body["stop"], json!(["\n\n", "User:"]));
    }
}

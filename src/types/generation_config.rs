use serde::{Deserialize, Serialize};

/// Sampling options sent with every generation request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    /// Controls the randomness of the output.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Nucleus sampling cutoff.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,

    /// Top-k sampling cutoff.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,

    /// Upper bound on tokens in a single reply.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
}

impl GenerationConfig {
    /// Returns true when no option is set and the field can be omitted.
    pub fn is_empty(&self) -> bool {
        self.temperature.is_none()
            && self.top_p.is_none()
            && self.top_k.is_none()
            && self.max_output_tokens.is_none()
    }

    /// Set the temperature.
    pub fn with_temperature(mut self, temperature: Option<f32>) -> Self {
        self.temperature = temperature;
        self
    }

    /// Set the maximum number of output tokens.
    pub fn with_max_output_tokens(mut self, max_output_tokens: Option<u32>) -> Self {
        self.max_output_tokens = max_output_tokens;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, to_value};

    #[test]
    fn empty_config() {
        let config = GenerationConfig::default();
        assert!(config.is_empty());
        assert_eq!(to_value(&config).unwrap(), json!({}));
    }

    #[test]
    fn camel_case_fields() {
        let config = GenerationConfig::default()
            .with_temperature(Some(0.5))
            .with_max_output_tokens(Some(1024));
        assert!(!config.is_empty());
        assert_eq!(
            to_value(&config).unwrap(),
            json!({"temperature": 0.5, "maxOutputTokens": 1024})
        );
    }
}

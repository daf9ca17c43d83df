//! Configuração da decodificação e da avaliação.
//!
//! Os hosts (CLI e servidor web) carregam um [`EvalConfig`] de JSON, se houver,
//! e sobrepõem os campos vindos de flags ou da requisição.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Convenção para razões com denominador zero (classe sem predições ou sem gold).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ZeroDivision {
    /// Reporta `NaN` (indefinido).
    #[default]
    Nan,
    /// Reporta `0.0`.
    Zero,
}

impl ZeroDivision {
    pub fn value(&self) -> f64 {
        match self {
            ZeroDivision::Nan => f64::NAN,
            ZeroDivision::Zero => 0.0,
        }
    }
}

/// Parâmetros repassados ao decodificador a cada sentença.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DecodeConfig {
    /// Candidatos com score abaixo disso são descartados
    pub threshold: f64,
    /// Emite uma linha de diagnóstico por candidato relevante
    pub verbose: bool,
    /// Valida a ordenação da entrada antes de decodificar
    pub check_order: bool,
}

impl DecodeConfig {
    /// Com threshold NaN a comparação `score < threshold` nunca vale e o filtro some.
    pub fn validate(self) -> Result<Self, ConfigError> {
        if !self.threshold.is_finite() {
            return Err(ConfigError::InvalidThreshold(self.threshold));
        }
        Ok(self)
    }
}

impl Default for DecodeConfig {
    fn default() -> Self {
        Self {
            threshold: EvalConfig::DEFAULT_THRESHOLD,
            verbose: false,
            check_order: true,
        }
    }
}

/// Configuração completa de uma sessão de avaliação.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvalConfig {
    pub threshold: f64,
    pub verbose: bool,
    pub check_order: bool,
    pub zero_division: ZeroDivision,
    /// Limite de tamanho de span na construção do corpus gold
    pub max_span_len: Option<usize>,
    /// Limite de tamanho de sentença na construção do corpus gold
    pub max_text_len: Option<usize>,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            threshold: Self::DEFAULT_THRESHOLD,
            verbose: false,
            check_order: true,
            zero_division: ZeroDivision::Nan,
            max_span_len: None,
            max_text_len: None,
        }
    }
}

impl EvalConfig {
    /// Scores nos logs são log-probabilidades (negativas).
    pub const DEFAULT_THRESHOLD: f64 = -4.0;

    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: EvalConfig = serde_json::from_str(json)?;
        config.validate()
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    pub fn validate(self) -> Result<Self, ConfigError> {
        self.decode_config().validate()?;
        Ok(self)
    }

    pub fn decode_config(&self) -> DecodeConfig {
        DecodeConfig {
            threshold: self.threshold,
            verbose: self.verbose,
            check_order: self.check_order,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EvalConfig::default();
        assert_eq!(config.threshold, -4.0);
        assert!(config.check_order);
        assert!(!config.verbose);
        assert_eq!(config.zero_division, ZeroDivision::Nan);
    }

    #[test]
    fn test_partial_json_falls_back_to_defaults() {
        let config = EvalConfig::from_json_str(r#"{"threshold": -10.0, "zero_division": "zero"}"#).unwrap();
        assert_eq!(config.threshold, -10.0);
        assert_eq!(config.zero_division, ZeroDivision::Zero);
        assert!(config.check_order);
        assert_eq!(config.decode_config().threshold, -10.0);
    }

    #[test]
    fn test_invalid_json_is_rejected() {
        assert!(matches!(
            EvalConfig::from_json_str(r#"{"threshold": "alto"}"#),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_non_finite_threshold_is_rejected() {
        let nan = DecodeConfig { threshold: f64::NAN, ..DecodeConfig::default() };
        assert!(matches!(nan.validate(), Err(ConfigError::InvalidThreshold(_))));

        let config = EvalConfig { threshold: f64::NEG_INFINITY, ..EvalConfig::default() };
        assert!(matches!(config.validate(), Err(ConfigError::InvalidThreshold(_))));
        assert!(DecodeConfig::default().validate().is_ok());
    }

    #[test]
    fn test_missing_file_is_reported_with_path() {
        let err = EvalConfig::from_path("/caminho/que/nao/existe.json").unwrap_err();
        assert!(err.to_string().contains("/caminho/que/nao/existe.json"));
    }
}

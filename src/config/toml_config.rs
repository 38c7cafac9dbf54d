use crate::core::ConfigProvider;
use crate::domain::model::EnrichmentSettings;
use crate::utils::error::{EtlError, Result};
use crate::utils::validation::{self, Validate};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TomlConfig {
    pub pipeline: PipelineConfig,
    pub source: SourceConfig,
    pub processing: Option<ProcessingConfig>,
    pub load: LoadConfig,
    pub monitoring: Option<MonitoringConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub name: String,
    pub description: Option<String>,
    pub version: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub input_file: String,
    pub reference_file: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessingConfig {
    pub batch_size: Option<usize>,
    pub concurrent_lookups: Option<usize>,
    pub lookup_timeout_ms: Option<u64>,
    pub civility_field: Option<String>,
    pub error_marker: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadConfig {
    pub output_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringConfig {
    pub enabled: bool,
}

impl TomlConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(EtlError::IoError)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| EtlError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// 替換環境變數 (例如 ${CONTACTS_DIR})，未設定的變數保留原文
    fn substitute_env_vars(content: &str) -> Result<String> {
        let re = regex::Regex::new(r"\$\{([^}]+)\}").map_err(|e| EtlError::ConfigError {
            message: format!("Invalid substitution pattern: {}", e),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    fn processing(&self) -> ProcessingConfig {
        self.processing.clone().unwrap_or_default()
    }

    /// 驗證配置的合理性
    pub fn validate_config(&self) -> Result<()> {
        validation::validate_non_empty_string("pipeline.name", &self.pipeline.name)?;

        validation::validate_path("source.input_file", &self.source.input_file)?;
        validation::validate_file_extensions("source.input_file", &[self.source.input_file.as_str()], &["csv", "txt"])?;
        if let Some(reference) = &self.source.reference_file {
            validation::validate_path("source.reference_file", reference)?;
            validation::validate_file_extensions("source.reference_file", &[reference.as_str()], &["csv", "txt"])?;
        }

        validation::validate_path("load.output_path", &self.load.output_path)?;

        let settings = self.settings();
        validation::validate_positive_number("processing.batch_size", settings.batch_size, 1)?;
        validation::validate_range("processing.concurrent_lookups", settings.concurrent_lookups, 1, 64)?;
        validation::validate_non_empty_string("processing.civility_field", &settings.civility_field)?;
        if settings.lookup_timeout == Some(Duration::ZERO) {
            return Err(EtlError::InvalidConfigValueError {
                field: "processing.lookup_timeout_ms".to_string(),
                value: "0".to_string(),
                reason: "Timeout must be greater than zero".to_string(),
            });
        }

        Ok(())
    }

    pub fn monitoring_enabled(&self) -> bool {
        self.monitoring.as_ref().map(|m| m.enabled).unwrap_or(false)
    }
}

impl ConfigProvider for TomlConfig {
    fn input_file(&self) -> &str {
        &self.source.input_file
    }

    fn reference_file(&self) -> Option<&str> {
        self.source.reference_file.as_deref()
    }

    fn output_path(&self) -> &str {
        &self.load.output_path
    }

    fn settings(&self) -> EnrichmentSettings {
        let processing = self.processing();
        let defaults = EnrichmentSettings::default();

        EnrichmentSettings {
            batch_size: processing.batch_size.unwrap_or(defaults.batch_size),
            concurrent_lookups: processing.concurrent_lookups.unwrap_or(defaults.concurrent_lookups),
            lookup_timeout: processing.lookup_timeout_ms.map(Duration::from_millis),
            civility_field: processing.civility_field.unwrap_or(defaults.civility_field),
            error_marker: processing.error_marker.unwrap_or(defaults.error_marker),
        }
    }
}

impl Validate for TomlConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}

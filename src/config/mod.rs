pub mod cli;
pub mod toml_config;

#[cfg(feature = "cli")]
use crate::core::ConfigProvider;
#[cfg(feature = "cli")]
use crate::domain::model::EnrichmentSettings;
#[cfg(feature = "cli")]
use crate::utils::error::Result;
#[cfg(feature = "cli")]
use crate::utils::validation::{self, Validate};
#[cfg(feature = "cli")]
use clap::Parser;
#[cfg(feature = "cli")]
use serde::{Deserialize, Serialize};

#[cfg(feature = "cli")]
#[derive(Debug, Clone, Serialize, Deserialize, Parser)]
#[command(name = "contact-etl")]
#[command(about = "Enrich contact files with a civility title and fix swapped first/last names")]
pub struct CliConfig {
    #[arg(long, help = "Contact CSV file to process")]
    pub input: String,

    #[arg(long, help = "Reference first-name file (prenom;civilite)")]
    pub reference: Option<String>,

    #[arg(long, default_value = "./output")]
    pub output_path: String,

    #[arg(long, default_value = "1000")]
    pub batch_size: usize,

    #[arg(long, default_value = "1")]
    pub concurrent_lookups: usize,

    #[arg(long, help = "Per-lookup deadline in milliseconds")]
    pub lookup_timeout_ms: Option<u64>,

    #[arg(long, default_value = "Civilité")]
    pub civility_field: String,

    #[arg(long, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, help = "Log CPU and memory usage per phase")]
    pub monitor: bool,

    #[arg(long, help = "Emit JSON logs")]
    pub log_json: bool,
}

#[cfg(feature = "cli")]
impl ConfigProvider for CliConfig {
    fn input_file(&self) -> &str {
        &self.input
    }

    fn reference_file(&self) -> Option<&str> {
        self.reference.as_deref()
    }

    fn output_path(&self) -> &str {
        &self.output_path
    }

    fn settings(&self) -> EnrichmentSettings {
        EnrichmentSettings {
            batch_size: self.batch_size,
            concurrent_lookups: self.concurrent_lookups,
            lookup_timeout: self.lookup_timeout_ms.map(std::time::Duration::from_millis),
            civility_field: self.civility_field.clone(),
            ..EnrichmentSettings::default()
        }
    }
}

#[cfg(feature = "cli")]
impl Validate for CliConfig {
    fn validate(&self) -> Result<()> {
        validation::validate_path("input", &self.input)?;
        validation::validate_file_extensions("input", &[self.input.as_str()], &["csv", "txt"])?;
        if let Some(reference) = &self.reference {
            validation::validate_path("reference", reference)?;
            validation::validate_file_extensions("reference", &[reference.as_str()], &["csv", "txt"])?;
        }
        validation::validate_path("output_path", &self.output_path)?;
        validation::validate_positive_number("batch_size", self.batch_size, 1)?;
        validation::validate_range("concurrent_lookups", self.concurrent_lookups, 1, 64)?;
        validation::validate_non_empty_string("civility_field", &self.civility_field)?;
        Ok(())
    }
}

#[cfg(all(test, feature = "cli"))]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        let config = CliConfig::parse_from(["contact-etl", "--input", "contacts.csv"]);

        assert!(config.validate().is_ok());
        let settings = config.settings();
        assert_eq!(settings.batch_size, 1000);
        assert_eq!(settings.concurrent_lookups, 1);
        assert_eq!(settings.lookup_timeout, None);
        assert_eq!(settings.civility_field, "Civilité");
        assert_eq!(config.reference_file(), None);
    }

    #[test]
    fn test_cli_rejects_bad_values() {
        let config = CliConfig::parse_from(["contact-etl", "--input", "contacts.xlsx"]);
        assert!(config.validate().is_err());

        let config = CliConfig::parse_from([
            "contact-etl",
            "--input",
            "contacts.csv",
            "--batch-size",
            "0",
        ]);
        assert!(config.validate().is_err());
    }
}

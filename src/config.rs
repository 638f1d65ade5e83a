//! Settings for the `sensewatch` binary.
//!
//! Settings come from an optional TOML file, overridden by `SENSEWATCH_*`
//! environment variables:
//!
//! ```toml
//! batch_limit = 500
//! output = "readings.jsonl"
//! log_filter = "sensewatch=debug"
//!
//! [[sources]]
//! group = "battery"
//!
//! [sources.waveforms.BATTERY_PERCENT]
//! shape = "sawtooth"
//! from = 100.0
//! to = 10.0
//! period_ms = 60000
//! ```
//!
//! Groups without a `[[sources]]` entry get a simulated source with default
//! waveforms.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use config::{Config, Environment, File};
use sensewatch_types::{Metric, MetricGroup};
use serde::Deserialize;

use crate::error::SettingsError;
use crate::hub::DEFAULT_BATCH_LIMIT;
use crate::source::{SimulatedSource, Waveform};

/// Top-level settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub batch_limit: usize,
    /// JSON-lines file for persisted batches; none means batches are dropped.
    pub output: Option<PathBuf>,
    pub log_filter: String,
    pub sources: Vec<SourceSettings>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            batch_limit: DEFAULT_BATCH_LIMIT,
            output: None,
            log_filter: "info".to_string(),
            sources: Vec::new(),
        }
    }
}

/// Simulated source of one group.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SourceSettings {
    pub group: MetricGroup,
    /// Waveform overrides keyed by metric name.
    #[serde(default)]
    pub waveforms: BTreeMap<String, Waveform>,
}

impl SourceSettings {
    fn build(&self) -> Result<SimulatedSource, SettingsError> {
        self.waveforms.iter().try_fold(
            SimulatedSource::with_defaults(self.group),
            |source, (name, waveform)| {
                let metric = Metric::lookup(name)
                    .ok_or_else(|| SettingsError::UnknownMetric(name.clone()))?;
                Ok(source.waveform(metric, waveform.clone()))
            },
        )
    }
}

impl Settings {
    /// Load from `path` (if any) and the environment.
    pub fn load(path: Option<&Path>) -> Result<Self, SettingsError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }
        let settings: Settings = builder
            .add_source(Environment::with_prefix("SENSEWATCH").try_parsing(true))
            .build()?
            .try_deserialize()?;
        Ok(settings)
    }

    /// One simulated source per group: configured ones first, defaults for
    /// the rest.
    pub fn build_sources(&self) -> Result<Vec<SimulatedSource>, SettingsError> {
        let mut seen = BTreeSet::new();
        let mut sources = Vec::new();
        for source in &self.sources {
            if !seen.insert(source.group) {
                return Err(SettingsError::DuplicateGroup(source.group));
            }
            sources.push(source.build()?);
        }
        sources.extend(
            MetricGroup::ALL
                .into_iter()
                .filter(|group| !seen.contains(group))
                .map(SimulatedSource::with_defaults),
        );
        Ok(sources)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::AcquisitionSource;
    use sensewatch_types::MetricValue;
    use std::io::Write;

    fn write_toml(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn defaults_without_file() {
        let settings = Settings::default();
        assert_eq!(settings.batch_limit, DEFAULT_BATCH_LIMIT);
        assert_eq!(settings.log_filter, "info");

        let sources = settings.build_sources().unwrap();
        assert_eq!(sources.len(), MetricGroup::ALL.len());
    }

    #[test]
    fn file_overrides_defaults() {
        let file = write_toml(
            r#"
batch_limit = 10
output = "out.jsonl"

[[sources]]
group = "battery"

[sources.waveforms.BATTERY_PERCENT]
shape = "constant"
value = 42.0
"#,
        );
        let settings = Settings::load(Some(file.path())).unwrap();
        assert_eq!(settings.batch_limit, 10);
        assert_eq!(settings.output, Some(PathBuf::from("out.jsonl")));
        assert_eq!(settings.sources[0].group, MetricGroup::Battery);

        let mut sources = settings.build_sources().unwrap();
        assert_eq!(sources[0].group(), MetricGroup::Battery);
        let readings = sources[0].sample(0);
        assert!(readings.contains(&(Metric::BATTERY_PERCENT, MetricValue::Byte(42).into())));
    }

    #[test]
    fn unknown_metric_is_reported() {
        let settings = Settings {
            sources: vec![SourceSettings {
                group: MetricGroup::Cpu,
                waveforms: BTreeMap::from([(
                    "CPU_TURBO".to_string(),
                    Waveform::Constant { value: 1.0 },
                )]),
            }],
            ..Settings::default()
        };
        assert!(matches!(
            settings.build_sources(),
            Err(SettingsError::UnknownMetric(name)) if name == "CPU_TURBO"
        ));
    }

    #[test]
    fn duplicate_group_is_reported() {
        let source = SourceSettings {
            group: MetricGroup::Memory,
            waveforms: BTreeMap::new(),
        };
        let settings = Settings {
            sources: vec![source.clone(), source],
            ..Settings::default()
        };
        assert!(matches!(
            settings.build_sources(),
            Err(SettingsError::DuplicateGroup(MetricGroup::Memory))
        ));
    }
}

//! Run settings: the optional `--config` TOML file merged with command-line
//! flags into a [`ParserConfig`] and a set of loaded registries.

use std::path::{Path, PathBuf};

use clap::Args;
use formex_core::{
    InMemoryKpiRegistry, InMemoryScreeningRegistry, KpiRegistry, ParserConfig, Registries,
    ScreeningRegistry, TargetEncoding, VersionPolicy,
};
use serde::Deserialize;

// ── Types ─────────────────────────────────────────────────────────────────────

/// Contents of a `formex.toml` file. Every key is optional.
///
/// ```toml
/// start_phrase = "eNB Counter Method:"
/// release = "L21"
/// version = "latest"      # or "unversioned", or a pinned version
/// encoding = "latin1"     # or "ascii"
/// relaxed = false
/// kpis = "fixtures/kpis.json"
/// screenings = "fixtures/screenings.json"
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileSettings {
    pub start_phrase: Option<String>,
    pub relaxed: Option<bool>,
    pub encoding: Option<String>,
    pub release: Option<String>,
    pub version: Option<String>,
    pub kpis: Option<PathBuf>,
    pub screenings: Option<PathBuf>,
}

/// Flags shared by the commands that run the pipeline. Each one overrides
/// the matching `--config` key.
#[derive(Debug, Clone, Default, Args)]
pub struct RunOptions {
    /// Phrase that precedes the BEGIN/END block
    #[arg(long)]
    pub start_phrase: Option<String>,
    /// Skip unclassifiable characters instead of reporting them
    #[arg(long)]
    pub relaxed: bool,
    /// KPI registry JSON file (object keyed by KPI id)
    #[arg(long)]
    pub kpis: Option<PathBuf>,
    /// Counter-screening registry JSON file (array of rows)
    #[arg(long)]
    pub screenings: Option<PathBuf>,
    /// Release used for screening lookups
    #[arg(long)]
    pub release: Option<String>,
    /// Screening version: "latest", "unversioned", or a pinned version
    #[arg(long)]
    pub screening_version: Option<String>,
    /// Transliteration target for cleaning (latin1 or ascii)
    #[arg(long)]
    pub encoding: Option<String>,
}

/// Registries loaded from disk for one command.
#[derive(Debug, Default)]
pub struct LoadedRegistries {
    pub kpis: Option<InMemoryKpiRegistry>,
    pub screenings: Option<InMemoryScreeningRegistry>,
}

impl LoadedRegistries {
    pub fn as_registries(&self) -> Registries<'_> {
        Registries {
            kpis: self.kpis.as_ref().map(|k| k as &dyn KpiRegistry),
            screenings: self.screenings.as_ref().map(|s| s as &dyn ScreeningRegistry),
        }
    }
}

// ── Functions ─────────────────────────────────────────────────────────────────

/// Read and parse a settings TOML file from `path`.
pub fn read_settings(path: &Path) -> Result<FileSettings, String> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("could not read '{}': {}", path.display(), e))?;

    toml::from_str(&content).map_err(|e| format!("could not parse '{}': {}", path.display(), e))
}

impl RunOptions {
    /// Pipeline configuration from these flags over `file`.
    pub fn parser_config(&self, file: &FileSettings) -> Result<ParserConfig, String> {
        let mut config = match self.start_phrase.as_ref().or(file.start_phrase.as_ref()) {
            Some(phrase) => ParserConfig::new(phrase.clone()),
            None => ParserConfig::default(),
        };
        config.relaxed = self.relaxed || file.relaxed.unwrap_or(false);
        if let Some(encoding) = self.encoding.as_ref().or(file.encoding.as_ref()) {
            config.encoding = encoding.parse::<TargetEncoding>()?;
        }
        if let Some(release) = self.release.as_ref().or(file.release.as_ref()) {
            config.release = release.clone();
        }
        if let Some(version) = self.screening_version.as_ref().or(file.version.as_ref()) {
            config.version = match version.parse::<VersionPolicy>() {
                Ok(policy) => policy,
                Err(never) => match never {},
            };
        }
        Ok(config)
    }

    /// Load whichever registries the flags or `file` name.
    pub fn load_registries(&self, file: &FileSettings) -> Result<LoadedRegistries, String> {
        let kpis = match self.kpis.as_ref().or(file.kpis.as_ref()) {
            Some(path) => Some(InMemoryKpiRegistry::load(path).map_err(|e| e.to_string())?),
            None => None,
        };
        let screenings = match self.screenings.as_ref().or(file.screenings.as_ref()) {
            Some(path) => {
                Some(InMemoryScreeningRegistry::load(path).map_err(|e| e.to_string())?)
            }
            None => None,
        };
        if let Some(k) = &kpis {
            tracing::debug!(kpis = k.len(), "loaded KPI registry");
        }
        Ok(LoadedRegistries { kpis, screenings })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_settings_parse_all_keys() {
        let settings: FileSettings = toml::from_str(
            r#"
            start_phrase = "Method:"
            relaxed = true
            encoding = "ascii"
            release = "L21"
            version = "v3"
            kpis = "k.json"
            "#,
        )
        .unwrap();
        let config = RunOptions::default().parser_config(&settings).unwrap();
        assert_eq!(config.start_phrase, "Method:");
        assert!(config.relaxed);
        assert_eq!(config.encoding, TargetEncoding::Ascii);
        assert_eq!(config.release, "L21");
        assert_eq!(config.version, VersionPolicy::Pinned("v3".into()));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(toml::from_str::<FileSettings>("colour = \"blue\"").is_err());
    }

    #[test]
    fn flags_override_file() {
        let settings = FileSettings {
            release: Some("L20".into()),
            version: Some("v1".into()),
            ..FileSettings::default()
        };
        let flags = RunOptions {
            release: Some("L21".into()),
            screening_version: Some("unversioned".into()),
            ..RunOptions::default()
        };
        let config = flags.parser_config(&settings).unwrap();
        assert_eq!(config.release, "L21");
        assert_eq!(config.version, VersionPolicy::Unversioned);
    }

    #[test]
    fn bad_encoding_is_an_error() {
        let flags = RunOptions {
            encoding: Some("ebcdic".into()),
            ..RunOptions::default()
        };
        assert!(flags.parser_config(&FileSettings::default()).is_err());
    }

    #[test]
    fn missing_registry_file_is_reported() {
        let flags = RunOptions {
            kpis: Some(PathBuf::from("/nonexistent/kpis.json")),
            ..RunOptions::default()
        };
        let err = flags.load_registries(&FileSettings::default()).unwrap_err();
        assert!(err.contains("/nonexistent/kpis.json"));
    }
}

//! Run configuration for the formula pipeline.

use crate::observer::{NoopObserver, ParseObserver};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Start phrase used when a formula is pulled in through a `Formula://`
/// reference, and the default for top-level runs.
pub const COUNTER_METHOD_PHRASE: &str = "eNB Counter Method:";

/// Character repertoire `clean` transliterates the formula into.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetEncoding {
    /// Keep everything up to U+00FF; fold typographic punctuation.
    #[default]
    Latin1,
    /// Additionally fold Latin-1 symbols and spaces into ASCII.
    Ascii,
}

impl FromStr for TargetEncoding {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "latin1" | "latin-1" | "iso-8859-1" => Ok(TargetEncoding::Latin1),
            "ascii" => Ok(TargetEncoding::Ascii),
            other => Err(format!("unknown encoding '{}'", other)),
        }
    }
}

/// Which registry version summations are resolved against.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum VersionPolicy {
    /// The first version the registry lists for the release.
    #[default]
    Latest,
    Pinned(String),
    /// Do not narrow by version.
    Unversioned,
}

impl FromStr for VersionPolicy {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "latest" => VersionPolicy::Latest,
            "unversioned" | "any" => VersionPolicy::Unversioned,
            pinned => VersionPolicy::Pinned(pinned.to_string()),
        })
    }
}

#[derive(Clone)]
pub struct ParserConfig {
    pub start_phrase: String,
    pub relaxed: bool,
    pub encoding: TargetEncoding,
    pub release: String,
    pub version: VersionPolicy,
    pub observer: Arc<dyn ParseObserver>,
}

impl Default for ParserConfig {
    fn default() -> Self {
        ParserConfig {
            start_phrase: COUNTER_METHOD_PHRASE.to_string(),
            relaxed: false,
            encoding: TargetEncoding::default(),
            release: String::new(),
            version: VersionPolicy::default(),
            observer: Arc::new(NoopObserver),
        }
    }
}

impl fmt::Debug for ParserConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParserConfig")
            .field("start_phrase", &self.start_phrase)
            .field("relaxed", &self.relaxed)
            .field("encoding", &self.encoding)
            .field("release", &self.release)
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

impl ParserConfig {
    pub fn new(start_phrase: impl Into<String>) -> Self {
        ParserConfig {
            start_phrase: start_phrase.into(),
            ..Self::default()
        }
    }

    pub fn with_relaxed(mut self, relaxed: bool) -> Self {
        self.relaxed = relaxed;
        self
    }

    pub fn with_encoding(mut self, encoding: TargetEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn with_release(mut self, release: impl Into<String>) -> Self {
        self.release = release.into();
        self
    }

    pub fn with_version(mut self, version: VersionPolicy) -> Self {
        self.version = version;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn ParseObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Configuration for a nested run over a referenced KPI: same registry
    /// context and observer, fixed start phrase.
    pub fn nested(&self) -> Self {
        ParserConfig {
            start_phrase: COUNTER_METHOD_PHRASE.to_string(),
            ..self.clone()
        }
    }
}

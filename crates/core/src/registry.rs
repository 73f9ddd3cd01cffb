//! Read-only registries the pipeline consults.
//!
//! [`KpiRegistry`] supplies the raw formula text behind a `Formula://`
//! reference; [`ScreeningRegistry`] supplies the screening rows a summation
//! expands into. Both are traits so the pipeline works the same over a
//! database, a file, or the in-memory implementations here.

use crate::error::RegistryError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::path::Path;

/// A KPI definition as far as the pipeline cares: its raw formula document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KpiRecord {
    /// The KPI's measurement-method text, including start phrase and
    /// `BEGIN`/`END` block.
    pub raw_formula: String,
}

/// One screening of a counter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreeningRow {
    pub screening_id: i64,
    pub screening_suffix: String,
}

/// Lookup of KPI definitions by id.
pub trait KpiRegistry {
    fn lookup(&self, kpi_id: &str) -> Option<KpiRecord>;
}

/// Lookup of counter screenings.
pub trait ScreeningRegistry {
    /// Screenings of `counter_name` in `release`, narrowed to `version` when
    /// one is given.
    fn query(&self, counter_name: &str, release: &str, version: Option<&str>)
        -> Vec<ScreeningRow>;

    /// Distinct versions known for `release`, most recent first.
    fn list_versions(&self, release: &str) -> Vec<String>;
}

/// The registries a run reads from. Borrowed, read-only, and shared with any
/// nested runs started for `Formula://` references.
#[derive(Clone, Copy, Default)]
pub struct Registries<'a> {
    pub kpis: Option<&'a dyn KpiRegistry>,
    pub screenings: Option<&'a dyn ScreeningRegistry>,
}

impl<'a> Registries<'a> {
    pub fn new(kpis: &'a dyn KpiRegistry, screenings: &'a dyn ScreeningRegistry) -> Self {
        Registries {
            kpis: Some(kpis),
            screenings: Some(screenings),
        }
    }

    /// No registries: references and summations cannot be resolved.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn lookup_kpi(&self, kpi_id: &str) -> Option<KpiRecord> {
        self.kpis.and_then(|k| k.lookup(kpi_id))
    }
}

/// KPI registry backed by a map. Deserializes from a JSON object keyed by
/// KPI id.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InMemoryKpiRegistry {
    kpis: HashMap<String, KpiRecord>,
}

impl InMemoryKpiRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, kpi_id: impl Into<String>, raw_formula: impl Into<String>) {
        self.kpis.insert(
            kpi_id.into(),
            KpiRecord {
                raw_formula: raw_formula.into(),
            },
        );
    }

    pub fn len(&self) -> usize {
        self.kpis.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kpis.is_empty()
    }

    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn load(path: &Path) -> Result<Self, RegistryError> {
        let text = read(path)?;
        Self::from_json_str(&text).map_err(|source| RegistryError::Json {
            path: path.to_owned(),
            source,
        })
    }
}

impl KpiRegistry for InMemoryKpiRegistry {
    fn lookup(&self, kpi_id: &str) -> Option<KpiRecord> {
        self.kpis.get(kpi_id).cloned()
    }
}

/// A screening row together with the counter and release it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterScreening {
    pub counter_name: String,
    pub release: String,
    #[serde(default)]
    pub version: Option<String>,
    pub screening_id: i64,
    pub screening_suffix: String,
}

/// Screening registry backed by a flat row list. Deserializes from a JSON
/// array of [`CounterScreening`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InMemoryScreeningRegistry {
    rows: Vec<CounterScreening>,
}

impl InMemoryScreeningRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, row: CounterScreening) {
        self.rows.push(row);
    }

    /// Add screenings `(id, suffix)` of `counter_name` for `release`, with no
    /// version.
    pub fn add_counter(&mut self, counter_name: &str, release: &str, screenings: &[(i64, &str)]) {
        for (id, suffix) in screenings {
            self.rows.push(CounterScreening {
                counter_name: counter_name.to_string(),
                release: release.to_string(),
                version: None,
                screening_id: *id,
                screening_suffix: suffix.to_string(),
            });
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn load(path: &Path) -> Result<Self, RegistryError> {
        let text = read(path)?;
        Self::from_json_str(&text).map_err(|source| RegistryError::Json {
            path: path.to_owned(),
            source,
        })
    }
}

impl ScreeningRegistry for InMemoryScreeningRegistry {
    fn query(
        &self,
        counter_name: &str,
        release: &str,
        version: Option<&str>,
    ) -> Vec<ScreeningRow> {
        self.rows
            .iter()
            .filter(|r| r.counter_name == counter_name && r.release == release)
            .filter(|r| version.is_none() || r.version.as_deref() == version)
            .map(|r| ScreeningRow {
                screening_id: r.screening_id,
                screening_suffix: r.screening_suffix.clone(),
            })
            .collect()
    }

    fn list_versions(&self, release: &str) -> Vec<String> {
        let versions: BTreeSet<&str> = self
            .rows
            .iter()
            .filter(|r| r.release == release)
            .filter_map(|r| r.version.as_deref())
            .collect();
        versions.into_iter().rev().map(str::to_owned).collect()
    }
}

fn read(path: &Path) -> Result<String, RegistryError> {
    std::fs::read_to_string(path).map_err(|source| RegistryError::Io {
        path: path.to_owned(),
        source,
    })
}

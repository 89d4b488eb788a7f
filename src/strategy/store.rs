use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use super::predefined::{is_predefined, predefined_strategies};
use super::record::{self, StrategyRecord};
use super::StrategyDefinition;
use crate::error::{AppError, Result};
use crate::types::{Bias, Style};

/// Outcome of [`StrategyStore::import`].
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub imported: usize,
    pub failed: usize,
}

/// Keyed collection of strategies: the built-ins merged with one JSON file
/// per user strategy under `dir`. A file named after a built-in overrides it,
/// which is how built-in performance and enabled state persist.
pub struct StrategyStore {
    dir: PathBuf,
    strategies: BTreeMap<String, StrategyDefinition>,
}

impl StrategyStore {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;

        let mut strategies: BTreeMap<String, StrategyDefinition> = predefined_strategies()
            .into_iter()
            .map(|s| (s.name.clone(), s))
            .collect();

        let mut loaded = 0usize;
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match load_file(&path) {
                Ok(strategy) => {
                    strategies.insert(strategy.name.clone(), strategy);
                    loaded += 1;
                }
                Err(e) => warn!(path = %path.display(), "Skipping unreadable strategy file: {e}"),
            }
        }

        info!(
            dir = %dir.display(),
            "Strategy store ready: {} strategies ({} from disk)",
            strategies.len(),
            loaded,
        );
        Ok(Self { dir, strategies })
    }

    pub fn get(&self, name: &str) -> Option<&StrategyDefinition> {
        self.strategies.get(name)
    }

    /// Strategies in name order, optionally filtered.
    pub fn list(
        &self,
        bias: Option<Bias>,
        style: Option<Style>,
        enabled_only: bool,
    ) -> Vec<&StrategyDefinition> {
        self.strategies
            .values()
            .filter(|s| !enabled_only || s.enabled)
            .filter(|s| bias.map_or(true, |b| s.bias == b))
            .filter(|s| style.map_or(true, |st| s.style == st))
            .collect()
    }

    pub fn save(&mut self, strategy: StrategyDefinition, overwrite: bool) -> Result<()> {
        if !is_valid_name(&strategy.name) {
            return Err(AppError::InvalidName(strategy.name));
        }
        if self.strategies.contains_key(&strategy.name) && !overwrite {
            return Err(AppError::AlreadyExists(strategy.name));
        }
        fs::write(self.file_path(&strategy.name), record::encode(&strategy)?)?;
        self.strategies.insert(strategy.name.clone(), strategy);
        Ok(())
    }

    /// Persist changes to an existing strategy.
    pub fn update(&mut self, strategy: StrategyDefinition) -> Result<()> {
        if !self.strategies.contains_key(&strategy.name) {
            return Err(AppError::not_found("strategy", &strategy.name));
        }
        self.save(strategy, true)
    }

    pub fn delete(&mut self, name: &str) -> Result<()> {
        if is_predefined(name) {
            return Err(AppError::Protected(name.to_string()));
        }
        if self.strategies.remove(name).is_none() {
            return Err(AppError::not_found("strategy", name));
        }
        let path = self.file_path(name);
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }

    pub fn set_enabled(&mut self, name: &str, enabled: bool) -> Result<()> {
        let mut strategy = self
            .get(name)
            .cloned()
            .ok_or_else(|| AppError::not_found("strategy", name))?;
        strategy.enabled = enabled;
        strategy.touch();
        self.save(strategy, true)
    }

    pub fn tag_lookup(&self, tag: &str) -> Vec<&StrategyDefinition> {
        self.strategies.values().filter(|s| s.has_tag(tag)).collect()
    }

    /// Strategies with at least `min_runs` runs, best success rate first.
    pub fn top_performing(&self, limit: usize, min_runs: u32) -> Vec<&StrategyDefinition> {
        let mut eligible: Vec<&StrategyDefinition> = self
            .strategies
            .values()
            .filter(|s| s.performance.total_runs >= min_runs)
            .collect();
        eligible.sort_by(|a, b| {
            b.performance
                .success_rate()
                .total_cmp(&a.performance.success_rate())
        });
        eligible.truncate(limit);
        eligible
    }

    /// Write every user strategy to one JSON object keyed by name.
    /// Built-ins are left out. Returns the number exported.
    pub fn export(&self, path: &Path) -> Result<usize> {
        let records: BTreeMap<&str, StrategyRecord> = self
            .strategies
            .iter()
            .filter(|(name, _)| !is_predefined(name))
            .map(|(name, s)| (name.as_str(), StrategyRecord::from(s)))
            .collect();
        fs::write(path, serde_json::to_string_pretty(&records)?)?;
        Ok(records.len())
    }

    /// Load strategies from an export file. Entries that fail to parse or
    /// collide without `overwrite` are logged and counted, not fatal.
    pub fn import(&mut self, path: &Path, overwrite: bool) -> Result<ImportSummary> {
        let raw = fs::read_to_string(path)?;
        let entries: BTreeMap<String, serde_json::Value> = serde_json::from_str(&raw)?;

        let mut summary = ImportSummary::default();
        for (name, value) in entries {
            let outcome = serde_json::from_value::<StrategyRecord>(value)
                .map_err(AppError::from)
                .and_then(StrategyDefinition::try_from)
                .and_then(|s| self.save(s, overwrite));
            match outcome {
                Ok(()) => summary.imported += 1,
                Err(e) => {
                    warn!(strategy = %name, "Failed to import strategy: {e}");
                    summary.failed += 1;
                }
            }
        }
        Ok(summary)
    }

    pub fn is_predefined(&self, name: &str) -> bool {
        is_predefined(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.strategies.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    fn file_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.json"))
    }
}

/// Names become file stems under the strategy directory.
fn is_valid_name(name: &str) -> bool {
    !name.trim().is_empty()
        && name != "."
        && !name.contains("..")
        && !name.contains(['/', '\\', '\0'])
}

fn load_file(path: &Path) -> Result<StrategyDefinition> {
    record::decode(&fs::read_to_string(path)?)
}

//! Tuning reports and the best-schedule cache.

use anyhow::Result;
use looptune_ir::IrState;
use looptune_search::{SearchResult, SearchStats};
use looptune_transforms::TransformRecord;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

/// Outcome of one tuning run, in a shape suitable for JSON dumping.
///
/// `best_ms` is `None` when even the best node carried the sentinel score
/// (nothing executed successfully), which keeps unusable results
/// distinguishable from measured ones in any report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TuningReport {
    pub function: String,
    pub baseline_ms: Option<f64>,
    pub best_ms: Option<f64>,
    pub speedup: f64,
    pub schedule: Vec<TransformRecord>,
    pub stats: SearchStats,
    pub generated_at_unix_ms: u128,
}

impl TuningReport {
    pub fn from_result(result: &SearchResult) -> Self {
        let baseline_ms = result.baseline_score.is_finite().then_some(result.baseline_score);
        let best_ms = result.score.is_finite().then_some(result.score);
        let speedup = match (baseline_ms, best_ms) {
            (Some(baseline), Some(best)) if best > 0.0 => baseline / best,
            _ => 1.0,
        };
        let generated_at_unix_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis())
            .unwrap_or(0);
        Self {
            function: result.state.function().to_string(),
            baseline_ms,
            best_ms,
            speedup,
            schedule: result.history.clone(),
            stats: result.stats,
            generated_at_unix_ms,
        }
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let report = serde_json::from_str(&json)?;
        Ok(report)
    }
}

/// Cache key for a kernel: function name plus the nest shape.
pub fn kernel_signature(state: &IrState) -> String {
    let dims = state
        .nest()
        .dims()
        .iter()
        .map(|dim| format!("{}{}", dim.name, dim.trip_count))
        .collect::<Vec<_>>()
        .join("x");
    format!("{}:{}", state.function(), dims)
}

/// Best schedule seen so far per kernel signature.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScheduleCache {
    pub schedules: HashMap<String, CachedSchedule>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedSchedule {
    pub schedule: Vec<TransformRecord>,
    pub best_ms: f64,
    pub tuned_at_unix_ms: u128,
}

impl ScheduleCache {
    pub fn load_or_create(path: impl AsRef<Path>) -> Self {
        match std::fs::read_to_string(path) {
            Ok(json) => serde_json::from_str(&json).unwrap_or_default(),
            Err(_) => Self::default(),
        }
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Record the report's schedule when it beats the cached one. Unusable
    /// results never enter the cache.
    pub fn insert_if_better(&mut self, key: &str, report: &TuningReport) -> bool {
        let Some(best_ms) = report.best_ms else {
            return false;
        };
        if let Some(existing) = self.schedules.get(key) {
            if best_ms >= existing.best_ms {
                return false;
            }
        }
        self.schedules.insert(
            key.to_string(),
            CachedSchedule {
                schedule: report.schedule.clone(),
                best_ms,
                tuned_at_unix_ms: report.generated_at_unix_ms,
            },
        );
        true
    }

    pub fn get(&self, key: &str) -> Option<&CachedSchedule> {
        self.schedules.get(key)
    }
}

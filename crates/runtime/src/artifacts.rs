//! C4 — Artifact store: screenshots, evaluations, logs, reports, and raw
//! files saved under `ARTIFACTS_DIR`, indexed by a manifest that is
//! rewritten atomically after every save so a crash mid-write can never
//! leave a torn `artifacts.json` behind.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::RuntimeResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactCategory {
    Screenshots,
    Evaluations,
    Logs,
    Reports,
    Files,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactEntry {
    pub filename: String,
    pub absolute_path: PathBuf,
    pub created_at: String,
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArtifactManifest {
    pub categories: BTreeMap<ArtifactCategory, Vec<ArtifactEntry>>,
}

pub struct ArtifactStore {
    dir: PathBuf,
    manifest_path: PathBuf,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> RuntimeResult<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        let manifest_path = dir.join("artifacts.json");
        Ok(Self { dir, manifest_path })
    }

    /// `phase` is e.g. `desktop`, `mobile`, `step_3_before`, `step_3_after`.
    /// Lands at `screenshots/iter_<N>/<phase>.png` per the fixed naming
    /// scheme so the evaluator and the manifest agree on paths without a
    /// lookup.
    pub fn save_screenshot(
        &self,
        iteration: u32,
        phase: &str,
        bytes: &[u8],
    ) -> RuntimeResult<ArtifactEntry> {
        let filename = format!("iter_{iteration}/{phase}.png");
        self.save_bytes(
            ArtifactCategory::Screenshots,
            &filename,
            bytes,
            serde_json::json!({"iteration": iteration, "phase": phase}),
        )
    }

    pub fn save_evaluation(&self, iteration: u32, json: &str) -> RuntimeResult<ArtifactEntry> {
        let filename = format!("evaluation_iter_{iteration}.json");
        self.save_bytes(
            ArtifactCategory::Evaluations,
            &filename,
            json.as_bytes(),
            serde_json::json!({"iteration": iteration}),
        )
    }

    pub fn save_log(&self, name: &str, content: &str) -> RuntimeResult<ArtifactEntry> {
        self.save_bytes(ArtifactCategory::Logs, name, content.as_bytes(), serde_json::json!({}))
    }

    pub fn save_report(&self, name: &str, content: &str) -> RuntimeResult<ArtifactEntry> {
        self.save_bytes(ArtifactCategory::Reports, name, content.as_bytes(), serde_json::json!({}))
    }

    pub fn save_file(&self, name: &str, bytes: &[u8]) -> RuntimeResult<ArtifactEntry> {
        self.save_bytes(ArtifactCategory::Files, name, bytes, serde_json::json!({}))
    }

    fn save_bytes(
        &self,
        category: ArtifactCategory,
        filename: &str,
        bytes: &[u8],
        metadata: serde_json::Value,
    ) -> RuntimeResult<ArtifactEntry> {
        let absolute_path = self.dir.join(filename);
        atomic_write(&absolute_path, bytes)?;

        let entry = ArtifactEntry {
            filename: filename.to_string(),
            absolute_path,
            created_at: Utc::now().to_rfc3339(),
            metadata,
        };

        let mut manifest = self.load_manifest()?;
        manifest.categories.entry(category).or_default().push(entry.clone());
        self.write_manifest(&manifest)?;
        Ok(entry)
    }

    pub fn load_manifest(&self) -> RuntimeResult<ArtifactManifest> {
        if !self.manifest_path.exists() {
            return Ok(ArtifactManifest::default());
        }
        let raw = std::fs::read_to_string(&self.manifest_path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    fn write_manifest(&self, manifest: &ArtifactManifest) -> RuntimeResult<()> {
        let json = serde_json::to_string_pretty(manifest)?;
        atomic_write(&self.manifest_path, json.as_bytes())
    }
}

/// Write-temp-then-rename so readers never observe a partially written file.
fn atomic_write(path: &Path, bytes: &[u8]) -> RuntimeResult<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    std::io::Write::write_all(&mut tmp, bytes)?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_screenshot_updates_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path()).unwrap();
        store.save_screenshot(1, "desktop", b"fakepng").unwrap();
        store.save_screenshot(1, "mobile", b"fakepng2").unwrap();

        let manifest = store.load_manifest().unwrap();
        let screenshots = &manifest.categories[&ArtifactCategory::Screenshots];
        assert_eq!(screenshots.len(), 2);
        assert!(screenshots[0].absolute_path.exists());
    }

    #[test]
    fn manifest_survives_reload() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = ArtifactStore::new(dir.path()).unwrap();
            store.save_report("summary.md", "# Report").unwrap();
        }
        let store = ArtifactStore::new(dir.path()).unwrap();
        let manifest = store.load_manifest().unwrap();
        assert_eq!(manifest.categories[&ArtifactCategory::Reports].len(), 1);
    }

    #[test]
    fn categories_stay_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path()).unwrap();
        store.save_log("run.log", "hello").unwrap();
        store.save_evaluation(1, "{}").unwrap();
        let manifest = store.load_manifest().unwrap();
        assert!(!manifest.categories.contains_key(&ArtifactCategory::Screenshots));
        assert_eq!(manifest.categories[&ArtifactCategory::Logs].len(), 1);
        assert_eq!(manifest.categories[&ArtifactCategory::Evaluations].len(), 1);
    }
}

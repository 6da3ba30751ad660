use anyhow::{Context, Result};
use chrono::Utc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::models::{DiagramPreset, IndexStatus, RepoRecord, RepoRef};

#[derive(Debug, Default, Serialize, Deserialize)]
struct MetadataDoc {
    #[serde(default)]
    repos: Vec<RepoRecord>,
    #[serde(default)]
    presets: Vec<DiagramPreset>,
}

/// Repository records and diagram presets, kept in memory and written through
/// to one JSON document.
pub struct MetadataStore {
    doc: RwLock<MetadataDoc>,
    persist_path: PathBuf,
}

impl MetadataStore {
    pub fn open(path: &Path) -> Result<Self> {
        let doc = if path.exists() {
            let data = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            serde_json::from_str(&data)
                .with_context(|| format!("Failed to parse {}", path.display()))?
        } else {
            MetadataDoc::default()
        };
        Ok(Self {
            doc: RwLock::new(doc),
            persist_path: path.to_path_buf(),
        })
    }

    fn persist(&self, doc: &MetadataDoc) -> Result<()> {
        let data = serde_json::to_vec_pretty(doc)?;
        super::write_atomic(&self.persist_path, &data)
    }

    pub fn list_repos(&self) -> Vec<RepoRecord> {
        self.doc.read().repos.clone()
    }

    pub fn get_repo(&self, repo: &RepoRef) -> Option<RepoRecord> {
        self.doc
            .read()
            .repos
            .iter()
            .find(|r| r.owner == repo.owner && r.name == repo.name)
            .cloned()
    }

    /// Apply `update` to the record for `repo`, creating an idle record on the
    /// given branch first if none exists.
    pub fn update_repo<F>(&self, repo: &RepoRef, branch: &str, update: F) -> Result<RepoRecord>
    where
        F: FnOnce(&mut RepoRecord),
    {
        let mut doc = self.doc.write();
        let idx = match doc
            .repos
            .iter()
            .position(|r| r.owner == repo.owner && r.name == repo.name)
        {
            Some(idx) => idx,
            None => {
                doc.repos.push(RepoRecord {
                    owner: repo.owner.clone(),
                    name: repo.name.clone(),
                    branch: branch.to_string(),
                    status: IndexStatus::Idle,
                    added_at: Utc::now(),
                    indexed_at: None,
                    last_commit: None,
                    file_count: 0,
                    chunk_count: 0,
                    last_error: None,
                    root_path: None,
                    exclude: Vec::new(),
                });
                doc.repos.len() - 1
            }
        };
        update(&mut doc.repos[idx]);
        let updated = doc.repos[idx].clone();
        self.persist(&doc)?;
        Ok(updated)
    }

    pub fn list_presets(&self, repo: &RepoRef) -> Vec<DiagramPreset> {
        let key = repo.key();
        self.doc
            .read()
            .presets
            .iter()
            .filter(|p| p.repo == key)
            .cloned()
            .collect()
    }

    pub fn get_preset(&self, repo: &RepoRef, name: &str) -> Option<DiagramPreset> {
        let key = repo.key();
        self.doc
            .read()
            .presets
            .iter()
            .find(|p| p.repo == key && p.name == name)
            .cloned()
    }

    /// Insert or replace the preset keyed by (repository, name).
    pub fn upsert_preset(&self, preset: DiagramPreset) -> Result<()> {
        let mut doc = self.doc.write();
        match doc
            .presets
            .iter_mut()
            .find(|p| p.repo == preset.repo && p.name == preset.name)
        {
            Some(existing) => *existing = preset,
            None => doc.presets.push(preset),
        }
        self.persist(&doc)
    }

    /// Returns whether a preset was removed.
    pub fn delete_preset(&self, repo: &RepoRef, name: &str) -> Result<bool> {
        let key = repo.key();
        let mut doc = self.doc.write();
        let before = doc.presets.len();
        doc.presets.retain(|p| !(p.repo == key && p.name == name));
        if doc.presets.len() == before {
            return Ok(false);
        }
        self.persist(&doc)?;
        Ok(true)
    }
}

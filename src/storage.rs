use std::path::{Path, PathBuf};

use tracing::instrument;

use crate::pack::{AnswerOption, Pack, Question};

const STORAGE_DIR_NAME: &str = "quiz-configurator";
const STORAGE_FILE_NAME: &str = "packs.json";

/// Durable pack store. Loading never fails (it falls back to the seed pack);
/// saving is best-effort and swallows errors.
#[allow(async_fn_in_trait)]
pub trait PackStorage {
    async fn load_all(&self) -> Vec<Pack>;
    async fn save_all(&self, packs: &[Pack]);
}

pub struct JsonStorage {
    directory: PathBuf,
    file_path: PathBuf,
}

impl JsonStorage {
    pub fn new(base_directory: Option<PathBuf>, file_name: Option<&str>) -> Self {
        let directory = base_directory.unwrap_or_else(default_data_dir);
        let file_path = directory.join(file_name.unwrap_or(STORAGE_FILE_NAME));
        Self {
            directory,
            file_path,
        }
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    /// Reads a single pack from an arbitrary path, for importing a shared
    /// pack file. Returns `None` on any failure.
    #[instrument(level = "info", skip(self))]
    pub async fn load_pack_from(&self, path: &Path) -> Option<Pack> {
        let json = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| log::warn!("Failed to read pack file {}: {}", path.display(), e))
            .ok()?;
        serde_json::from_str(&json)
            .map_err(|e| log::warn!("Failed to parse pack file {}: {}", path.display(), e))
            .ok()
    }

    /// Writes a single pack to an arbitrary path, for sharing. Best-effort.
    #[instrument(level = "info", skip(self, pack))]
    pub async fn save_pack_to(&self, path: &Path, pack: &Pack) {
        if let Some(parent) = path.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                log::warn!("Failed to create {}: {}", parent.display(), e);
                return;
            }
        }
        match serde_json::to_string_pretty(pack) {
            Ok(json) => {
                if let Err(e) = tokio::fs::write(path, json).await {
                    log::warn!("Failed to write pack file {}: {}", path.display(), e);
                }
            }
            Err(e) => log::warn!("Failed to serialize pack '{}': {}", pack.name(), e),
        }
    }
}

impl PackStorage for JsonStorage {
    #[instrument(level = "info", skip(self))]
    async fn load_all(&self) -> Vec<Pack> {
        match tokio::fs::read_to_string(&self.file_path).await {
            Ok(json) => match serde_json::from_str::<Vec<Pack>>(&json) {
                Ok(packs) => {
                    log::info!(
                        "Loaded {} packs from {}",
                        packs.len(),
                        self.file_path.display()
                    );
                    packs
                }
                Err(e) => {
                    log::warn!(
                        "Pack store {} is unreadable, using the seed pack: {}",
                        self.file_path.display(),
                        e
                    );
                    seed_packs()
                }
            },
            Err(e) => {
                log::info!(
                    "No pack store at {} ({}), using the seed pack",
                    self.file_path.display(),
                    e
                );
                seed_packs()
            }
        }
    }

    #[instrument(level = "info", skip(self, packs))]
    async fn save_all(&self, packs: &[Pack]) {
        if let Err(e) = tokio::fs::create_dir_all(&self.directory).await {
            log::warn!("Failed to create {}: {}", self.directory.display(), e);
            return;
        }
        match serde_json::to_string_pretty(packs) {
            Ok(json) => {
                if let Err(e) = tokio::fs::write(&self.file_path, json).await {
                    log::warn!(
                        "Failed to save packs to {}: {}",
                        self.file_path.display(),
                        e
                    );
                }
            }
            Err(e) => log::warn!("Failed to serialize packs: {}", e),
        }
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(STORAGE_DIR_NAME)
}

/// The single built-in pack handed out when nothing can be loaded.
pub fn seed_packs() -> Vec<Pack> {
    let mut pack = Pack::new("Default Question Pack");
    pack.push_question(Question::new(
        "What is 1 + 1?",
        vec![
            AnswerOption::new("2", true),
            AnswerOption::new("1", false),
            AnswerOption::new("3", false),
            AnswerOption::new("4", false),
        ],
    ));
    vec![pack]
}

use std::path::{Path, PathBuf};

use serde_json::{Map, Value, json};
use tokio::fs;
use uuid::Uuid;

use crate::{
    errors::Result,
    models::StoryRun,
    util::{local_rfc3339, now_local},
};

/// Saves finished stories as plain text with a JSON sidecar describing the run.
pub struct StoryWriter {
    root: PathBuf,
}

impl StoryWriter {
    pub async fn new(root: PathBuf) -> Result<Self> {
        fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    /// Resolve `target` against the writer's root unless it is absolute.
    pub fn resolve(&self, target: &Path) -> PathBuf {
        if target.is_absolute() {
            target.to_path_buf()
        } else {
            self.root.join(target)
        }
    }

    /// Writes the story to `target` and `<target stem>.meta.json` beside it.
    /// Returns the path of the story file.
    pub async fn export(&self, run: &StoryRun, target: &Path) -> Result<PathBuf> {
        let story_path = self.resolve(target);
        if let Some(parent) = story_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        fs::write(&story_path, run.story.to_text_blob()).await?;

        let meta_path = story_path.with_extension("meta.json");
        let meta = Self::metadata(run, &story_path);
        fs::write(&meta_path, serde_json::to_vec_pretty(&meta)?).await?;

        Ok(story_path)
    }

    fn metadata(run: &StoryRun, story_path: &Path) -> Value {
        let mut meta = Map::new();
        meta.insert("id".to_string(), json!(Uuid::new_v4().to_string()));
        meta.insert(
            "story_file".to_string(),
            json!(
                story_path
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
            ),
        );
        meta.insert("created_at".to_string(), json!(local_rfc3339(&now_local())));
        meta.insert("parameters".to_string(), json!(run.parameters));
        meta.insert("captions".to_string(), json!(run.captions));
        meta.insert("outline".to_string(), json!(run.outline));
        Value::Object(meta)
    }
}

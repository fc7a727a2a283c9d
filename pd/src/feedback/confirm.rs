//! Confirmation surfaces for reviewing changes before they happen

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::error::DepsError;

/// Shows an editable document and hands back what the user saved
#[async_trait]
pub trait Confirm: Send + Sync {
    /// `Ok(None)` means the user cancelled
    async fn confirm(&mut self, title: &str, document: &str) -> Result<Option<String>, DepsError>;
}

/// Opens the document in `$VISUAL` / `$EDITOR` (falling back to `vi`)
#[derive(Debug, Clone)]
pub struct EditorConfirm {
    dir: PathBuf,
    editor: Option<String>,
}

impl EditorConfirm {
    /// Scratch files go to `dir`
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            editor: None,
        }
    }

    pub fn with_editor(mut self, editor: impl Into<String>) -> Self {
        self.editor = Some(editor.into());
        self
    }

    fn editor(&self) -> String {
        self.editor
            .clone()
            .or_else(|| std::env::var("VISUAL").ok())
            .or_else(|| std::env::var("EDITOR").ok())
            .filter(|e| !e.trim().is_empty())
            .unwrap_or_else(|| "vi".to_string())
    }
}

#[async_trait]
impl Confirm for EditorConfirm {
    async fn confirm(&mut self, title: &str, document: &str) -> Result<Option<String>, DepsError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        // Removed on drop, whatever the editor did with it
        let scratch = tempfile::Builder::new()
            .prefix(&format!("plugdeps-{}-", title.to_lowercase()))
            .suffix(".txt")
            .tempfile_in(&self.dir)?;
        let path = scratch.path().to_path_buf();
        debug!(?path, "EditorConfirm::confirm: called");
        tokio::fs::write(&path, document).await?;

        let editor = self.editor();
        let status = Command::new("sh")
            .arg("-c")
            .arg(format!("{} \"$1\"", editor))
            .arg("sh")
            .arg(&path)
            .status()
            .await
            .map_err(|e| DepsError::Confirm(format!("failed to start `{}`: {}", editor, e)))?;

        if !status.success() {
            debug!(?status, "EditorConfirm::confirm: editor exited with error, cancelling");
            return Ok(None);
        }

        match tokio::fs::read_to_string(&path).await {
            Ok(saved) => Ok(Some(saved)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// Accepts every document unchanged
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

#[async_trait]
impl Confirm for AcceptAll {
    async fn confirm(&mut self, _title: &str, document: &str) -> Result<Option<String>, DepsError> {
        Ok(Some(document.to_string()))
    }
}

type EditFn = dyn FnMut(&str) -> Option<String> + Send;

/// Closure-backed surface; records every document it was shown
#[derive(Clone)]
pub struct FnConfirm {
    edit: Arc<Mutex<Box<EditFn>>>,
    shown: Arc<Mutex<Vec<String>>>,
}

impl FnConfirm {
    pub fn new<F>(edit: F) -> Self
    where
        F: FnMut(&str) -> Option<String> + Send + 'static,
    {
        Self {
            edit: Arc::new(Mutex::new(Box::new(edit))),
            shown: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// A surface that always cancels
    pub fn decline() -> Self {
        Self::new(|_| None)
    }

    pub fn shown(&self) -> Vec<String> {
        self.shown.lock().map(|v| v.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Confirm for FnConfirm {
    async fn confirm(&mut self, _title: &str, document: &str) -> Result<Option<String>, DepsError> {
        if let Ok(mut shown) = self.shown.lock() {
            shown.push(document.to_string());
        }
        let mut edit = self
            .edit
            .lock()
            .map_err(|_| DepsError::Confirm("confirmation callback poisoned".into()))?;
        Ok(edit(document))
    }
}

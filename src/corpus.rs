use crate::error_sink::{ErrorRecord, Stage};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub id: String,
    pub path: PathBuf,
}

impl Document {
    pub fn from_path(path: &Path) -> Option<Self> {
        let id = path.file_stem()?.to_string_lossy().into_owned();
        if id.is_empty() {
            return None;
        }
        Some(Self {
            id,
            path: path.to_path_buf(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct Corpus {
    root: PathBuf,
    extensions: Vec<String>,
}

impl Corpus {
    pub fn new(root: impl Into<PathBuf>, extensions: &[String]) -> Self {
        Self {
            root: root.into(),
            extensions: extensions.iter().map(|e| e.to_ascii_lowercase()).collect(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Documents in lexicographic id order. Each call rescans the directory,
    /// so a later pass sees files added since the last one. A file whose id
    /// was already taken by an earlier file comes back as an error record.
    pub fn documents(
        &self,
    ) -> Result<impl Iterator<Item = Result<Document, ErrorRecord>> + Send + use<>> {
        let mut docs = Vec::new();
        let entries = std::fs::read_dir(&self.root)
            .with_context(|| format!("listing corpus: {}", self.root.display()))?;
        for entry in entries {
            let path = entry
                .with_context(|| format!("listing corpus: {}", self.root.display()))?
                .path();
            if path.is_file() && self.accepts(&path) {
                docs.extend(Document::from_path(&path));
            }
        }
        docs.sort_by(|a, b| a.id.cmp(&b.id).then_with(|| a.path.cmp(&b.path)));

        let mut listed = Vec::with_capacity(docs.len());
        let mut owner: Option<Document> = None;
        for doc in docs {
            match &owner {
                Some(first) if first.id == doc.id => {
                    listed.push(Err(ErrorRecord::document(
                        &doc.id,
                        Stage::Corpus,
                        format!(
                            "{} maps to the same id as {}; not processed",
                            doc.path.display(),
                            first.path.display()
                        ),
                    )));
                }
                _ => {
                    owner = Some(doc.clone());
                    listed.push(Ok(doc));
                }
            }
        }
        Ok(listed.into_iter())
    }

    fn accepts(&self, path: &Path) -> bool {
        if self.extensions.is_empty() {
            return true;
        }
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| self.extensions.iter().any(|x| x.eq_ignore_ascii_case(e)))
            .unwrap_or(false)
    }
}

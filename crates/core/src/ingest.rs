use crate::chunking::normalize_whitespace;
use crate::error::IngestError;
use crate::extractor::{extract_page_texts, DocumentKind};
use crate::models::SourceDocument;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;

/// Supported files directly inside `folder`, sorted by file name. A missing
/// folder is treated like an empty one.
pub fn discover_documents(folder: &Path) -> Vec<PathBuf> {
    if !folder.is_dir() {
        return Vec::new();
    }

    WalkDir::new(folder)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|item| item.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| DocumentKind::from_path(entry.path()).is_some())
        .map(|entry| entry.into_path())
        .collect()
}

pub fn load_documents(folder: &Path) -> Result<Vec<SourceDocument>, IngestError> {
    let files = discover_documents(folder);
    if files.is_empty() {
        warn!(folder = %folder.display(), "no documents found");
        return Ok(Vec::new());
    }

    let mut documents = Vec::new();
    for path in &files {
        info!(path = %path.display(), "loading document");
        let source_path = path.to_string_lossy().to_string();

        for page in extract_page_texts(path)? {
            let text = normalize_whitespace(&page.text);
            if text.is_empty() {
                continue;
            }
            documents.push(SourceDocument {
                text,
                source_path: source_path.clone(),
                page_number: page.number,
            });
        }
    }

    info!(
        pages = documents.len(),
        files = files.len(),
        folder = %folder.display(),
        "loaded documents"
    );
    Ok(documents)
}

//! PDF loading for the trainer: one [`Document`] per non-blank page.

use std::path::{Path, PathBuf};

use crate::core::errors::ApiError;
use crate::rag::Document;

pub fn is_pdf(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
}

/// PDF files directly inside `dir`, sorted by path. Other entries are
/// skipped with a warning.
pub fn list_pdf_files(dir: &Path) -> Result<Vec<PathBuf>, ApiError> {
    let entries = std::fs::read_dir(dir).map_err(|e| {
        ApiError::NotFound(format!("Cannot read sources folder {}: {}", dir.display(), e))
    })?;

    let mut files = Vec::new();
    for entry in entries {
        let path = entry.map_err(ApiError::internal)?.path();
        if path.is_file() && is_pdf(&path) {
            files.push(path);
        } else {
            tracing::warn!("Skipping non-PDF entry {}", path.display());
        }
    }
    files.sort();
    Ok(files)
}

pub fn pages_to_documents(source: &str, pages: Vec<String>) -> Vec<Document> {
    pages
        .into_iter()
        .enumerate()
        .filter(|(_, text)| !text.trim().is_empty())
        .map(|(page, text)| Document::new(text, source, Some(page as u32)))
        .collect()
}

/// Extracts every page of one PDF. Blocking.
pub fn load_pdf(path: &Path) -> Result<Vec<Document>, ApiError> {
    // pdf-extract panics on some malformed inputs
    let pages_result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        pdf_extract::extract_text_by_pages(path)
    }));

    let pages = match pages_result {
        Ok(Ok(pages)) => pages,
        Ok(Err(e)) => {
            return Err(ApiError::BadRequest(format!(
                "Cannot read PDF {}: {}",
                path.display(),
                e
            )));
        }
        Err(panic_payload) => {
            let panic_msg = if let Some(s) = panic_payload.downcast_ref::<&str>() {
                s.to_string()
            } else if let Some(s) = panic_payload.downcast_ref::<String>() {
                s.clone()
            } else {
                "Unknown panic".to_string()
            };
            return Err(ApiError::BadRequest(format!(
                "Cannot read PDF {}: parser panicked: {}",
                path.display(),
                panic_msg
            )));
        }
    };

    let source = path.to_string_lossy().to_string();
    let documents = pages_to_documents(&source, pages);
    tracing::info!("Loaded {} ({} pages with text)", path.display(), documents.len());
    Ok(documents)
}

/// Loads the given PDFs in order, off the async runtime.
pub async fn load_pdf_files(files: &[PathBuf]) -> Result<Vec<Document>, ApiError> {
    let mut documents = Vec::new();
    for file in files {
        let file = file.clone();
        let docs = tokio::task::spawn_blocking(move || load_pdf(&file))
            .await
            .map_err(ApiError::internal)??;
        documents.extend(docs);
    }
    Ok(documents)
}

/// Every PDF directly inside `dir`, in name order.
pub async fn load_pdf_folder(dir: &Path) -> Result<Vec<Document>, ApiError> {
    let files = list_pdf_files(dir)?;
    load_pdf_files(&files).await
}

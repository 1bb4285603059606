//! Reference ingestion collaborator: splits `.txt` files into ordered
//! chunks. Real deployments feed `build_index` from their own extraction
//! pipeline; this one exists so the CLI and tests have a document source.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::types::Chunk;

#[derive(Debug, Clone)]
pub struct ChunkingConfig {
    /// Soft cap on words per chunk; longer paragraphs are windowed.
    pub max_words: usize,
    /// Fraction of the window carried over between adjacent sub-chunks.
    pub overlap_percent: f32,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self { max_words: 300, overlap_percent: 0.2 }
    }
}

#[derive(Default)]
pub struct Chunker {
    config: ChunkingConfig,
}

impl Chunker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: ChunkingConfig) -> Self {
        Self { config }
    }

    /// Chunk every `.txt` file under `dir`, in sorted path order so ids are
    /// stable across runs.
    pub fn process_directory(&self, dir: &Path) -> Result<Vec<Chunk>> {
        let files = list_txt_files(dir);
        let mut all = Vec::new();
        for path in &files {
            let content = read_file_content(path)?;
            let doc_id = doc_id_for(path);
            let section = path
                .file_stem()
                .map(|s| s.to_string_lossy().to_string());
            let start = all.len();
            all.extend(self.process_text(&doc_id, &content, section.as_deref(), start));
        }
        Ok(all)
    }

    /// Split one document's text into chunks: paragraph-per-chunk, with a
    /// word-window split for paragraphs beyond `max_words`.
    pub fn process_text(
        &self,
        doc_id: &str,
        content: &str,
        section: Option<&str>,
        ordinal_base: usize,
    ) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        for paragraph in content.split("\n\n") {
            let paragraph = paragraph.trim();
            if paragraph.is_empty() {
                continue;
            }
            if paragraph.split_whitespace().count() <= self.config.max_words {
                self.push_chunk(&mut chunks, doc_id, section, ordinal_base, paragraph.to_string());
            } else {
                for window in self.split_with_overlap(paragraph) {
                    self.push_chunk(&mut chunks, doc_id, section, ordinal_base, window);
                }
            }
        }
        chunks
    }

    fn push_chunk(
        &self,
        chunks: &mut Vec<Chunk>,
        doc_id: &str,
        section: Option<&str>,
        ordinal_base: usize,
        text: String,
    ) {
        let ordinal = ordinal_base + chunks.len();
        chunks.push(Chunk {
            id: format!("{doc_id}:{ordinal}"),
            ordinal,
            text,
            page: None,
            section: section.map(str::to_string),
            embedding: None,
        });
    }

    fn split_with_overlap(&self, paragraph: &str) -> Vec<String> {
        let words: Vec<&str> = paragraph.split_whitespace().collect();
        let window = self.config.max_words;
        let overlap = (window as f32 * self.config.overlap_percent) as usize;
        let mut out = Vec::new();
        let mut start = 0;
        while start < words.len() {
            let end = (start + window).min(words.len());
            out.push(words[start..end].join(" "));
            if end >= words.len() {
                break;
            }
            start = end - overlap;
        }
        out
    }
}

fn read_file_content(path: &Path) -> Result<String> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(content),
        Err(_) => Ok(String::from_utf8_lossy(&fs::read(path)?).to_string()),
    }
}

fn doc_id_for(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "doc".to_string())
}

fn list_txt_files(root: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for entry in walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
    {
        if entry.path().extension().and_then(|s| s.to_str()) == Some("txt") {
            files.push(entry.path().to_path_buf());
        }
    }
    files.sort();
    files
}

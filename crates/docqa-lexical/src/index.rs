use std::path::{Path, PathBuf};

use tantivy::collector::TopDocs;
use tantivy::query::{AllQuery, QueryParser};
use tantivy::schema::Value;
use tantivy::{Index, TantivyDocument};
use tracing::debug;

use docqa_core::error::{Error, Result};
use docqa_core::traits::LexicalIndex;
use docqa_core::types::{Chunk, RetrievalMethod, SearchHit};

use crate::tantivy_utils::{build_schema, register_tokenizer};

const WRITER_HEAP_BYTES: usize = 50_000_000;

pub struct LexicalIndexer {
    index: Index,
    id_field: tantivy::schema::Field,
    ordinal_field: tantivy::schema::Field,
    text_field: tantivy::schema::Field,
    page_field: tantivy::schema::Field,
    section_field: tantivy::schema::Field,
}

fn tv_err(e: impl std::fmt::Display) -> Error {
    Error::Internal(format!("lexical index: {e}"))
}

impl LexicalIndexer {
    /// Create a fresh index directory, wiping any previous contents.
    pub fn create(index_dir: PathBuf) -> Result<Self> {
        if index_dir.exists() {
            std::fs::remove_dir_all(&index_dir)?;
        }
        std::fs::create_dir_all(&index_dir)?;
        let schema = build_schema();
        let index = Index::create_in_dir(&index_dir, schema).map_err(tv_err)?;
        Self::from_index(index)
    }

    /// Reopen a persisted index directory. The stored chunk text lets the
    /// corpus be reconstructed without re-running ingestion.
    pub fn open(index_dir: &Path) -> Result<Self> {
        let index = Index::open_in_dir(index_dir).map_err(tv_err)?;
        Self::from_index(index)
    }

    fn from_index(index: Index) -> Result<Self> {
        register_tokenizer(&index);
        let schema = index.schema();
        let id_field = schema.get_field("id").map_err(tv_err)?;
        let ordinal_field = schema.get_field("ordinal").map_err(tv_err)?;
        let text_field = schema.get_field("text").map_err(tv_err)?;
        let page_field = schema.get_field("page").map_err(tv_err)?;
        let section_field = schema.get_field("section").map_err(tv_err)?;
        Ok(Self { index, id_field, ordinal_field, text_field, page_field, section_field })
    }

    /// Reconstruct the indexed corpus from stored fields, in ordinal order.
    pub fn all_chunks(&self) -> Result<Vec<Chunk>> {
        let reader = self.index.reader().map_err(tv_err)?;
        let searcher = reader.searcher();
        let n = searcher.num_docs() as usize;
        if n == 0 {
            return Ok(Vec::new());
        }
        let top = searcher
            .search(&AllQuery, &TopDocs::with_limit(n))
            .map_err(tv_err)?;
        let mut chunks = Vec::with_capacity(n);
        for (_score, addr) in top {
            let doc: TantivyDocument = searcher.doc(addr).map_err(tv_err)?;
            chunks.push(self.chunk_from_doc(&doc)?);
        }
        chunks.sort_by_key(|c| c.ordinal);
        Ok(chunks)
    }

    fn chunk_from_doc(&self, doc: &TantivyDocument) -> Result<Chunk> {
        let id = doc
            .get_first(self.id_field)
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::Internal("indexed document missing id field".into()))?
            .to_string();
        let ordinal = doc
            .get_first(self.ordinal_field)
            .and_then(|v| v.as_u64())
            .ok_or_else(|| Error::Internal(format!("indexed document {id} missing ordinal")))?
            as usize;
        let text = doc
            .get_first(self.text_field)
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string();
        let page = doc
            .get_first(self.page_field)
            .and_then(|v| v.as_u64())
            .map(|p| p as u32);
        let section = doc
            .get_first(self.section_field)
            .and_then(|v| v.as_str())
            .map(str::to_string);
        Ok(Chunk { id, ordinal, text, page, section, embedding: None })
    }
}

impl LexicalIndex for LexicalIndexer {
    fn index(&self, chunks: &[Chunk]) -> Result<()> {
        let mut writer = self.index.writer(WRITER_HEAP_BYTES).map_err(tv_err)?;
        writer.delete_all_documents().map_err(tv_err)?;
        for c in chunks {
            let mut doc = TantivyDocument::default();
            doc.add_text(self.id_field, &c.id);
            doc.add_u64(self.ordinal_field, c.ordinal as u64);
            doc.add_text(self.text_field, &c.text);
            if let Some(page) = c.page {
                doc.add_u64(self.page_field, u64::from(page));
            }
            if let Some(section) = &c.section {
                doc.add_text(self.section_field, section);
            }
            writer.add_document(doc).map_err(tv_err)?;
        }
        writer.commit().map_err(tv_err)?;
        Ok(())
    }

    fn query(&self, text: &str, k: usize) -> Result<Vec<SearchHit>> {
        let reader = self.index.reader().map_err(tv_err)?;
        let searcher = reader.searcher();
        if searcher.num_docs() == 0 {
            return Err(Error::EmptyIndex);
        }
        // Queries are natural-language questions; lenient parsing keeps
        // punctuation and reserved syntax from failing the request.
        let parser = QueryParser::for_index(&self.index, vec![self.text_field]);
        let (query, parse_errors) = parser.parse_query_lenient(text);
        if !parse_errors.is_empty() {
            debug!(?parse_errors, "lenient query parse dropped fragments");
        }
        let top_docs = searcher
            .search(&query, &TopDocs::with_limit(k))
            .map_err(tv_err)?;
        let mut hits = Vec::with_capacity(top_docs.len());
        for (score, addr) in top_docs {
            let doc: TantivyDocument = searcher.doc(addr).map_err(tv_err)?;
            let id = doc
                .get_first(self.id_field)
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string();
            hits.push(SearchHit { id, score, method: RetrievalMethod::Lexical });
        }
        Ok(hits)
    }
}

use anyhow::{Context, Result};
use parking_lot::Mutex;
use std::path::Path;
use tantivy::collector::DocSetCollector;
use tantivy::query::{BooleanQuery, Query, TermQuery};
use tantivy::schema::{
    Field, IndexRecordOption, NumericOptions, Schema, TantivyDocument, Value, STORED, STRING, TEXT,
};
use tantivy::{doc, Index, IndexReader, IndexWriter, ReloadPolicy, Term};

use crate::chunking::SymbolKind;
use crate::models::{ChunkMetadata, ChunkRecord};

/// Content-addressed chunk id. Any edit to the file changes `content_hash` and
/// therefore every id derived from it.
pub fn chunk_id(
    repo: &str,
    branch: &str,
    path: &str,
    start_line: usize,
    end_line: usize,
    content_hash: &str,
) -> String {
    format!("{repo}@{branch}:{path}#L{start_line}-L{end_line}:{content_hash}")
}

/// Storage contract the ingestion pipeline needs. Similarity search over the
/// stored chunks is somebody else's concern.
pub trait ChunkStore: Send + Sync {
    /// Insert or replace chunks by id.
    fn upsert(&self, chunks: &[ChunkRecord]) -> Result<()>;

    /// Remove every chunk of one file.
    fn delete_file(&self, repo: &str, path: &str) -> Result<()>;

    /// Remove every chunk of a repository.
    fn delete_repo(&self, repo: &str) -> Result<()>;

    /// Ids stored for a repository, optionally restricted to one file.
    fn ids(&self, repo: &str, path: Option<&str>) -> Result<Vec<String>>;

    fn get(&self, id: &str) -> Result<Option<ChunkRecord>>;
}

/// Chunk store persisted in a tantivy index.
pub struct TantivyChunkStore {
    reader: IndexReader,
    writer: Mutex<IndexWriter>,
    f_id: Field,
    f_repo: Field,
    f_branch: Field,
    f_path: Field,
    f_language: Field,
    f_text: Field,
    f_start_line: Field,
    f_end_line: Field,
    f_content_hash: Field,
    f_symbol_name: Field,
    f_symbol_kind: Field,
}

impl TantivyChunkStore {
    /// Create or open a chunk index at the given directory.
    pub fn open_or_create(index_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(index_dir)?;

        let mut schema_builder = Schema::builder();
        let f_id = schema_builder.add_text_field("id", STRING | STORED);
        let f_repo = schema_builder.add_text_field("repo", STRING | STORED);
        let f_branch = schema_builder.add_text_field("branch", STRING | STORED);
        let f_path = schema_builder.add_text_field("path", STRING | STORED);
        let f_language = schema_builder.add_text_field("language", STRING | STORED);
        let f_text = schema_builder.add_text_field("text", TEXT | STORED);
        let f_start_line =
            schema_builder.add_u64_field("start_line", NumericOptions::default() | STORED);
        let f_end_line =
            schema_builder.add_u64_field("end_line", NumericOptions::default() | STORED);
        let f_content_hash = schema_builder.add_text_field("content_hash", STRING | STORED);
        let f_symbol_name = schema_builder.add_text_field("symbol_name", STRING | STORED);
        let f_symbol_kind = schema_builder.add_text_field("symbol_kind", STRING | STORED);
        let schema = schema_builder.build();

        let index = if index_dir.join("meta.json").exists() {
            Index::open_in_dir(index_dir).context("Failed to open existing tantivy index")?
        } else {
            Index::create_in_dir(index_dir, schema).context("Failed to create tantivy index")?
        };

        let writer: IndexWriter = index
            .writer(50_000_000)
            .context("Failed to create index writer")?;
        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()
            .context("Failed to create reader")?;

        Ok(Self {
            reader,
            writer: Mutex::new(writer),
            f_id,
            f_repo,
            f_branch,
            f_path,
            f_language,
            f_text,
            f_start_line,
            f_end_line,
            f_content_hash,
            f_symbol_name,
            f_symbol_kind,
        })
    }

    fn term_query(&self, field: Field, value: &str) -> Box<dyn Query> {
        Box::new(TermQuery::new(
            Term::from_field_text(field, value),
            IndexRecordOption::Basic,
        ))
    }

    fn file_query(&self, repo: &str, path: Option<&str>) -> Box<dyn Query> {
        match path {
            Some(path) => Box::new(BooleanQuery::intersection(vec![
                self.term_query(self.f_repo, repo),
                self.term_query(self.f_path, path),
            ])),
            None => self.term_query(self.f_repo, repo),
        }
    }

    /// Commit pending operations and make them visible to readers.
    fn commit(&self, writer: &mut IndexWriter) -> Result<()> {
        writer.commit().context("Failed to commit chunk index")?;
        self.reader.reload().context("Failed to reload chunk reader")?;
        Ok(())
    }

    fn text(&self, doc: &TantivyDocument, field: Field) -> String {
        doc.get_first(field)
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string()
    }

    fn number(&self, doc: &TantivyDocument, field: Field) -> usize {
        doc.get_first(field).and_then(|v| v.as_u64()).unwrap_or(0) as usize
    }

    fn to_record(&self, doc: &TantivyDocument) -> ChunkRecord {
        let symbol_name = Some(self.text(doc, self.f_symbol_name)).filter(|s| !s.is_empty());
        let symbol_kind = SymbolKind::parse(&self.text(doc, self.f_symbol_kind));
        ChunkRecord {
            id: self.text(doc, self.f_id),
            text: self.text(doc, self.f_text),
            metadata: ChunkMetadata {
                repo: self.text(doc, self.f_repo),
                branch: self.text(doc, self.f_branch),
                path: self.text(doc, self.f_path),
                language: self.text(doc, self.f_language),
                start_line: self.number(doc, self.f_start_line),
                end_line: self.number(doc, self.f_end_line),
                content_hash: self.text(doc, self.f_content_hash),
                symbol_name,
                symbol_kind,
            },
        }
    }

    fn search_all(&self, query: &dyn Query) -> Result<Vec<TantivyDocument>> {
        let searcher = self.reader.searcher();
        let addresses = searcher
            .search(query, &DocSetCollector)
            .context("Chunk lookup failed")?;
        addresses
            .into_iter()
            .map(|addr| searcher.doc(addr).context("Failed to retrieve chunk"))
            .collect()
    }
}

impl ChunkStore for TantivyChunkStore {
    fn upsert(&self, chunks: &[ChunkRecord]) -> Result<()> {
        if chunks.is_empty() {
            return Ok(());
        }
        let mut writer = self.writer.lock();
        for chunk in chunks {
            let meta = &chunk.metadata;
            writer.delete_term(Term::from_field_text(self.f_id, &chunk.id));
            writer.add_document(doc!(
                self.f_id => chunk.id.clone(),
                self.f_repo => meta.repo.clone(),
                self.f_branch => meta.branch.clone(),
                self.f_path => meta.path.clone(),
                self.f_language => meta.language.clone(),
                self.f_text => chunk.text.clone(),
                self.f_start_line => meta.start_line as u64,
                self.f_end_line => meta.end_line as u64,
                self.f_content_hash => meta.content_hash.clone(),
                self.f_symbol_name => meta.symbol_name.clone().unwrap_or_default(),
                self.f_symbol_kind => meta.symbol_kind.map(|k| k.as_str().to_string()).unwrap_or_default(),
            ))?;
        }
        self.commit(&mut writer)
    }

    fn delete_file(&self, repo: &str, path: &str) -> Result<()> {
        let mut writer = self.writer.lock();
        writer
            .delete_query(self.file_query(repo, Some(path)))
            .context("Failed to delete file chunks")?;
        self.commit(&mut writer)
    }

    fn delete_repo(&self, repo: &str) -> Result<()> {
        let mut writer = self.writer.lock();
        writer.delete_term(Term::from_field_text(self.f_repo, repo));
        self.commit(&mut writer)
    }

    fn ids(&self, repo: &str, path: Option<&str>) -> Result<Vec<String>> {
        let query = self.file_query(repo, path);
        let mut ids: Vec<String> = self
            .search_all(query.as_ref())?
            .iter()
            .map(|doc| self.text(doc, self.f_id))
            .collect();
        ids.sort();
        Ok(ids)
    }

    fn get(&self, id: &str) -> Result<Option<ChunkRecord>> {
        let query = self.term_query(self.f_id, id);
        Ok(self
            .search_all(query.as_ref())?
            .first()
            .map(|doc| self.to_record(doc)))
    }
}

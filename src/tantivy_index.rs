use tantivy::{
    Index,
    IndexReader,
    IndexWriter,
    ReloadPolicy,
    TantivyDocument,
    Term,
    collector::TopDocs,
    doc,
    query::{BooleanQuery, BoostQuery, FuzzyTermQuery, Occur, Query, TermQuery},
    schema::*,
    tokenizer::{
        AsciiFoldingFilter,
        LowerCaser,
        RemoveLongFilter,
        SimpleTokenizer,
        TextAnalyzer,
        TokenStream,
    },
};

use crate::{document::VaultFile, error::Result};

/// Field names used in the schema.
pub mod fields {
    pub const PATH: &str = "path";
    pub const TITLE: &str = "title";
    pub const CONTENT: &str = "content";
    pub const TAGS: &str = "tags";
    pub const FRONTMATTER: &str = "frontmatter";
}

const TOKENIZER: &str = "vault";

/// Writer heap shared across indexing threads.
const WRITER_MEMORY_BUDGET: usize = 15_000_000;

/// Query terms shorter than this only match whole words.
const MIN_PREFIX_LEN: usize = 3;

/// Prefix hits score below exact hits on the same field.
const PREFIX_DISCOUNT: f32 = 0.5;

const TITLE_BOOST: f32 = 3.0;
const TAGS_BOOST: f32 = 2.0;
const CONTENT_BOOST: f32 = 1.0;
const FRONTMATTER_BOOST: f32 = 0.5;

/// The searchable projection of a [`VaultFile`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexedDocument {
    pub path: String,
    pub title: String,
    pub content: String,
    /// Tags joined with spaces.
    pub tags: String,
    /// Frontmatter flattened to `key value` text.
    pub frontmatter: String,
}

impl From<&VaultFile> for IndexedDocument {
    fn from(file: &VaultFile) -> Self {
        let mut title = file.title.clone();
        for alias in file.frontmatter.aliases() {
            title.push(' ');
            title.push_str(&alias);
        }
        Self {
            path: file.path.to_string_lossy().into_owned(),
            title,
            content: file.content.clone(),
            tags: file.tags.join(" "),
            frontmatter: file.frontmatter.to_search_text(),
        }
    }
}

/// An in-memory Tantivy index over vault notes, keyed by path.
pub struct SearchIndex {
    index: Index,
    reader: IndexReader,
    writer: IndexWriter,
    fields: SchemaFields,
}

/// Resolved field handles for the schema.
#[derive(Clone, Copy)]
struct SchemaFields {
    path: Field,
    title: Field,
    content: Field,
    tags: Field,
    frontmatter: Field,
}

impl SchemaFields {
    fn weighted(&self) -> [(Field, f32); 4] {
        [
            (self.title, TITLE_BOOST),
            (self.tags, TAGS_BOOST),
            (self.content, CONTENT_BOOST),
            (self.frontmatter, FRONTMATTER_BOOST),
        ]
    }
}

/// A search hit: the note's path and its merged BM25 weight.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub score: f32,
    pub path: String,
}

fn build_schema() -> (Schema, SchemaFields) {
    let mut builder = Schema::builder();

    let path = builder.add_text_field(fields::PATH, STRING | STORED);

    let text_opts = TextOptions::default().set_indexing_options(
        TextFieldIndexing::default()
            .set_tokenizer(TOKENIZER)
            .set_index_option(IndexRecordOption::WithFreqsAndPositions),
    );
    let title = builder.add_text_field(fields::TITLE, text_opts.clone());
    let content = builder.add_text_field(fields::CONTENT, text_opts.clone());
    let tags = builder.add_text_field(fields::TAGS, text_opts.clone());
    let frontmatter = builder.add_text_field(fields::FRONTMATTER, text_opts);

    let schema = builder.build();
    let fields = SchemaFields {
        path,
        title,
        content,
        tags,
        frontmatter,
    };

    (schema, fields)
}

// No stemming: prefix matching runs against the surface form of each word.
fn register_tokenizers(index: &Index) {
    let analyzer = TextAnalyzer::builder(SimpleTokenizer::default())
        .filter(RemoveLongFilter::limit(40))
        .filter(LowerCaser)
        .filter(AsciiFoldingFilter)
        .build();
    index.tokenizers().register(TOKENIZER, analyzer);
}

impl SearchIndex {
    /// Create an empty in-memory index.
    pub fn open_in_ram() -> Result<Self> {
        let (schema, fields) = build_schema();
        let index = Index::create_in_ram(schema);
        register_tokenizers(&index);
        // Reloaded explicitly after every commit.
        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()?;
        let writer = index.writer(WRITER_MEMORY_BUDGET)?;

        Ok(Self {
            index,
            reader,
            writer,
            fields,
        })
    }

    /// Stage a document, replacing any existing one with the same path.
    /// Invisible to searches until [`SearchIndex::commit`].
    pub fn add_document(&mut self, document: &IndexedDocument) -> Result<()> {
        let f = self.fields;

        self.writer
            .delete_term(Term::from_field_text(f.path, &document.path));
        self.writer.add_document(doc!(
            f.path => document.path.as_str(),
            f.title => document.title.as_str(),
            f.content => document.content.as_str(),
            f.tags => document.tags.as_str(),
            f.frontmatter => document.frontmatter.as_str(),
        ))?;

        Ok(())
    }

    /// Stage the removal of a document by path.
    pub fn delete_document(&mut self, path: &str) {
        self.writer
            .delete_term(Term::from_field_text(self.fields.path, path));
    }

    /// Stage the removal of every document.
    pub fn delete_all(&mut self) -> Result<()> {
        self.writer.delete_all_documents()?;
        Ok(())
    }

    /// Commit staged changes and make them visible to searches.
    pub fn commit(&mut self) -> Result<()> {
        self.writer.commit()?;
        self.reader.reload()?;
        Ok(())
    }

    /// Drop staged changes that have not been committed.
    pub fn rollback(&mut self) -> Result<()> {
        self.writer.rollback()?;
        Ok(())
    }

    pub fn num_docs(&self) -> u64 {
        self.reader.searcher().num_docs()
    }

    /// Search title, tags, content and frontmatter at once.
    ///
    /// Every query word is matched exactly and, when at least three
    /// characters long, as a word prefix, so partial words still hit.
    /// Field boosts favor title over tags over content over frontmatter.
    pub fn search(&self, query_str: &str, limit: usize) -> Result<Vec<SearchResult>> {
        let terms = self.query_terms(query_str)?;
        if terms.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let mut clauses: Vec<(Occur, Box<dyn Query>)> = Vec::new();
        for text in &terms {
            for (field, boost) in self.fields.weighted() {
                let term = Term::from_field_text(field, text);
                let exact =
                    TermQuery::new(term.clone(), IndexRecordOption::WithFreqs);
                clauses.push((
                    Occur::Should,
                    Box::new(BoostQuery::new(Box::new(exact), boost)),
                ));

                if text.chars().count() >= MIN_PREFIX_LEN {
                    let prefix = FuzzyTermQuery::new_prefix(term, 0, true);
                    clauses.push((
                        Occur::Should,
                        Box::new(BoostQuery::new(
                            Box::new(prefix),
                            boost * PREFIX_DISCOUNT,
                        )),
                    ));
                }
            }
        }
        let query = BooleanQuery::new(clauses);

        let searcher = self.reader.searcher();
        let top_docs = searcher.search(&query, &TopDocs::with_limit(limit))?;

        let mut results = Vec::with_capacity(top_docs.len());
        for (score, doc_address) in top_docs {
            let doc: TantivyDocument = searcher.doc(doc_address)?;
            results.push(SearchResult {
                score,
                path: extract_text(&doc, self.fields.path),
            });
        }

        Ok(results)
    }

    /// Run the query text through the index analyzer, deduplicated.
    fn query_terms(&self, query_str: &str) -> Result<Vec<String>> {
        let mut analyzer = self.index.tokenizer_for_field(self.fields.content)?;
        let mut terms: Vec<String> = Vec::new();
        let mut stream = analyzer.token_stream(query_str);
        while stream.advance() {
            let text = &stream.token().text;
            if !terms.iter().any(|t| t == text) {
                terms.push(text.clone());
            }
        }
        Ok(terms)
    }
}

impl std::fmt::Debug for SearchIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchIndex").finish_non_exhaustive()
    }
}

fn extract_text(doc: &TantivyDocument, field: Field) -> String {
    doc.get_first(field)
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn indexed(path: &str, title: &str, content: &str, tags: &str) -> IndexedDocument {
        IndexedDocument {
            path: path.to_string(),
            title: title.to_string(),
            content: content.to_string(),
            tags: tags.to_string(),
            frontmatter: String::new(),
        }
    }

    #[test]
    fn create_and_search() {
        let mut idx = SearchIndex::open_in_ram().unwrap();
        idx.add_document(&indexed(
            "/v/hello.md",
            "Hello World",
            "This is a test document about hello world",
            "",
        ))
        .unwrap();
        idx.add_document(&indexed(
            "/v/rust.md",
            "Rust Programming",
            "Rust is a systems programming language",
            "",
        ))
        .unwrap();
        idx.commit().unwrap();

        let results = idx.search("hello world", 10).unwrap();
        assert!(!results.is_empty());
        assert_eq!(results[0].path, "/v/hello.md");
    }

    #[test]
    fn uncommitted_changes_are_invisible() {
        let mut idx = SearchIndex::open_in_ram().unwrap();
        idx.add_document(&indexed("/v/a.md", "Draft", "pending", "")).unwrap();
        assert!(idx.search("pending", 10).unwrap().is_empty());

        idx.commit().unwrap();
        assert_eq!(idx.search("pending", 10).unwrap().len(), 1);
    }

    #[test]
    fn prefix_matching() {
        let mut idx = SearchIndex::open_in_ram().unwrap();
        idx.add_document(&indexed(
            "/v/a.md",
            "Quarterly planning",
            "budget forecasting",
            "",
        ))
        .unwrap();
        idx.commit().unwrap();

        assert_eq!(idx.search("quart", 10).unwrap().len(), 1);
        assert_eq!(idx.search("forec", 10).unwrap().len(), 1);
        assert!(idx.search("qu", 10).unwrap().is_empty());
    }

    #[test]
    fn searches_tags_and_frontmatter() {
        let mut idx = SearchIndex::open_in_ram().unwrap();
        let mut doc = indexed("/v/a.md", "Notes", "nothing here", "acme kickoff");
        doc.frontmatter = "project apollo".to_string();
        idx.add_document(&doc).unwrap();
        idx.commit().unwrap();

        assert_eq!(idx.search("kickoff", 10).unwrap().len(), 1);
        assert_eq!(idx.search("apollo", 10).unwrap().len(), 1);
    }

    #[test]
    fn delete_document() {
        let mut idx = SearchIndex::open_in_ram().unwrap();
        idx.add_document(&indexed("/v/a.md", "Test", "hello world", ""))
            .unwrap();
        idx.commit().unwrap();
        assert_eq!(idx.search("hello", 10).unwrap().len(), 1);

        idx.delete_document("/v/a.md");
        idx.commit().unwrap();
        assert!(idx.search("hello", 10).unwrap().is_empty());
    }

    #[test]
    fn delete_all() {
        let mut idx = SearchIndex::open_in_ram().unwrap();
        idx.add_document(&indexed("/v/a.md", "A", "hello", "")).unwrap();
        idx.add_document(&indexed("/v/b.md", "B", "hello", "")).unwrap();
        idx.commit().unwrap();
        assert_eq!(idx.num_docs(), 2);

        idx.delete_all().unwrap();
        idx.commit().unwrap();
        assert_eq!(idx.num_docs(), 0);
    }

    #[test]
    fn update_document_replaces() {
        let mut idx = SearchIndex::open_in_ram().unwrap();
        idx.add_document(&indexed("/v/a.md", "Old Title", "old content", ""))
            .unwrap();
        idx.commit().unwrap();

        idx.add_document(&indexed("/v/a.md", "New Title", "new content", ""))
            .unwrap();
        idx.commit().unwrap();

        let results = idx.search("content", 10).unwrap();
        assert_eq!(results.len(), 1, "should have exactly one doc for the path");
        assert!(idx.search("old", 10).unwrap().is_empty());
        assert_eq!(idx.num_docs(), 1);
    }

    #[test]
    fn rollback_keeps_the_committed_version() {
        let mut idx = SearchIndex::open_in_ram().unwrap();
        idx.add_document(&indexed("/v/a.md", "Old Title", "old content", ""))
            .unwrap();
        idx.commit().unwrap();

        // Stages a delete of the committed document plus the new one.
        idx.add_document(&indexed("/v/a.md", "New Title", "new content", ""))
            .unwrap();
        idx.rollback().unwrap();
        idx.commit().unwrap();

        assert_eq!(idx.num_docs(), 1);
        assert_eq!(idx.search("old", 10).unwrap().len(), 1);
        assert!(idx.search("new", 10).unwrap().is_empty());
    }

    #[test]
    fn title_boost() {
        let mut idx = SearchIndex::open_in_ram().unwrap();
        idx.add_document(&indexed(
            "/v/a.md",
            "Rust Guide",
            "programming language guide",
            "",
        ))
        .unwrap();
        idx.add_document(&indexed(
            "/v/b.md",
            "Language Guide",
            "rust is a programming language",
            "",
        ))
        .unwrap();
        idx.commit().unwrap();

        let results = idx.search("rust", 10).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].path, "/v/a.md");
    }

    #[test]
    fn case_and_accents_are_folded() {
        let mut idx = SearchIndex::open_in_ram().unwrap();
        idx.add_document(&indexed("/v/a.md", "Café Review", "", "")).unwrap();
        idx.commit().unwrap();

        assert_eq!(idx.search("CAFE", 10).unwrap().len(), 1);
    }

    #[test]
    fn punctuation_only_query_is_empty() {
        let mut idx = SearchIndex::open_in_ram().unwrap();
        idx.add_document(&indexed("/v/a.md", "A", "hello", "")).unwrap();
        idx.commit().unwrap();

        assert!(idx.search("?! --", 10).unwrap().is_empty());
    }

    #[test]
    fn aliases_are_searchable_as_title() {
        let raw = "---\naliases: [Apollo]\n---\nbody";
        let file = crate::document::parse_note(
            std::path::Path::new("/v/project.md"),
            raw,
            crate::document::FileTimes {
                created: chrono::Utc::now(),
                modified: chrono::Utc::now(),
                size: raw.len() as u64,
            },
        )
        .unwrap();
        let doc = IndexedDocument::from(&file);
        assert_eq!(doc.title, "project Apollo");
    }
}

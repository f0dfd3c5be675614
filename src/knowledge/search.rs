//! Full-text index over subject documents

use tantivy::collector::TopDocs;
use tantivy::query::QueryParser;
use tantivy::schema::{
    Field, IndexRecordOption, Schema, TextFieldIndexing, TextOptions, Value,
};
use tantivy::{Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument};

const STEMMER: &str = "en_stem";
const WRITER_MEMORY: usize = 20_000_000;

/// Text of one searchable document
pub struct SearchDocument<'a> {
    pub key: &'a str,
    pub name: &'a str,
    pub description: &'a str,
    pub keywords: &'a str,
}

/// In-memory index returning document keys by relevance
pub struct SearchIndex {
    index: Index,
    reader: IndexReader,
    key: Field,
    name: Field,
    description: Field,
    keywords: Field,
}

impl SearchIndex {
    pub fn build<'a>(
        documents: impl IntoIterator<Item = SearchDocument<'a>>,
    ) -> tantivy::Result<Self> {
        let indexing = TextFieldIndexing::default()
            .set_tokenizer(STEMMER)
            .set_index_option(IndexRecordOption::WithFreqsAndPositions);
        let text = TextOptions::default().set_indexing_options(indexing);

        let mut builder = Schema::builder();
        let key = builder.add_text_field("key", text.clone().set_stored());
        let name = builder.add_text_field("name", text.clone());
        let description = builder.add_text_field("description", text.clone());
        let keywords = builder.add_text_field("keywords", text);
        let index = Index::create_in_ram(builder.build());

        let mut writer: IndexWriter = index.writer_with_num_threads(1, WRITER_MEMORY)?;
        for document in documents {
            let mut doc = TantivyDocument::new();
            doc.add_text(key, document.key);
            doc.add_text(name, document.name);
            doc.add_text(description, document.description);
            doc.add_text(keywords, document.keywords);
            writer.add_document(doc)?;
        }
        writer.commit()?;

        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()?;

        Ok(Self {
            index,
            reader,
            key,
            name,
            description,
            keywords,
        })
    }

    /// Keys of matching documents, best first
    ///
    /// Queries the parser rejects yield no results.
    pub fn search(&self, query: &str, limit: usize) -> Vec<(String, f32)> {
        let mut parser = QueryParser::for_index(
            &self.index,
            vec![self.key, self.name, self.description, self.keywords],
        );
        parser.set_field_boost(self.name, 10.0);
        parser.set_field_boost(self.keywords, 7.0);
        parser.set_field_boost(self.key, 5.0);
        parser.set_field_boost(self.description, 1.0);

        let parsed = match parser.parse_query(query) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::debug!(query, error = %e, "Unparseable search query");
                return Vec::new();
            }
        };

        let searcher = self.reader.searcher();
        let top_docs = match searcher.search(&parsed, &TopDocs::with_limit(limit.max(1))) {
            Ok(docs) => docs,
            Err(e) => {
                tracing::error!(query, error = %e, "Search failed");
                return Vec::new();
            }
        };

        top_docs
            .into_iter()
            .filter_map(|(score, address)| {
                let doc = match searcher.doc::<TantivyDocument>(address) {
                    Ok(doc) => doc,
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to retrieve document");
                        return None;
                    }
                };
                let key = doc.get_first(self.key).and_then(|v| v.as_str())?;
                Some((key.to_string(), score))
            })
            .collect()
    }
}

//! Keyword search benchmark: linear page scan over a synthetic index.

use casefile_search::config::SearchEngineConfig;
use casefile_search::index::{IndexMetadata, ProjectIndex};
use casefile_search::search::{KeywordSearchEngine, SearchOptions};
use casefile_search::{Document, FileType, Page};
use criterion::{criterion_group, criterion_main, Criterion};

fn synthetic_index(docs: usize, pages_per_doc: usize) -> ProjectIndex {
    let filler = "The claimant was employed as a lagger at the shipyard between \
                  1965 and 1979 and reports prolonged exposure to insulation dust. \
                  Occupational health records and correspondence follow. ";
    let documents = (0..docs)
        .map(|d| Document {
            filename: format!("bundle-{:04}.pdf", d),
            path: format!("bundle-{:04}.pdf", d),
            file_type: FileType::Pdf,
            pages: (0..pages_per_doc)
                .map(|p| Page {
                    page_num: p as u32 + 1,
                    text: if p % 7 == 0 {
                        format!("{} asbestos exposure confirmed on inspection.", filler)
                    } else {
                        filler.repeat(3)
                    },
                    sheet_name: None,
                })
                .collect(),
        })
        .collect();

    ProjectIndex {
        documents,
        metadata: IndexMetadata::default(),
    }
}

fn bench_keyword_search(c: &mut Criterion) {
    let engine = KeywordSearchEngine::new(SearchEngineConfig::default());
    let index = synthetic_index(200, 25);
    let options = SearchOptions::default();

    c.bench_function("keyword_single_term", |b| {
        b.iter(|| engine.search(&index, "asbestos", &options).unwrap())
    });

    c.bench_function("keyword_and_terms", |b| {
        b.iter(|| {
            engine
                .search(&index, "asbestos exposure shipyard", &options)
                .unwrap()
        })
    });

    c.bench_function("keyword_quoted_phrase", |b| {
        b.iter(|| {
            engine
                .search(&index, "\"asbestos exposure\"", &options)
                .unwrap()
        })
    });
}

criterion_group!(benches, bench_keyword_search);
criterion_main!(benches);

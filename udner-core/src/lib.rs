//! # udner-core — Fusão UDPipe + NameTag e Agregação de Entidades
//!
//! Este crate junta dois fluxos de anotação produzidos independentemente
//! para o mesmo documento OCR:
//!
//! - a análise linguística do **UDPipe** (CoNLL-U: lema, morfologia, posição);
//! - as tags de entidades nomeadas do **NameTag** (BIO, códigos CNEC 2.0).
//!
//! E produz (a) um CoNLL-U fundido com `NER=<tag>` na coluna MISC e (b) um
//! relatório por página com as entidades distintas mais frequentes.
//!
//! ## Arquitetura
//!
//! 1.  **Leitura** ([`conllu`], [`tag_stream`]): registros de token e pares (texto, tag).
//! 2.  **Fusão** ([`merge`]): alinhamento posicional dos dois fluxos.
//! 3.  **Páginas** ([`page`]): fronteiras inferidas de `# newdoc` ou `# sent_id = 1`.
//! 4.  **Decodificação** ([`tagger`], [`span`], [`tagset`]): BIO → spans com tipo canônico.
//! 5.  **Saída** ([`aggregate`], [`page_table`], [`splitter`]): relatório, CSVs e TSVs por página.
//! 6.  **Orquestração** ([`pipeline`], [`batch`]): um documento, ou um lote em paralelo.
//!
//! ## Exemplo de Uso
//!
//! ```rust
//! use udner_core::{aggregate_page, decode_spans, StreamMerger, TagRecord};
//!
//! let conllu = "1\tPraha\tPraha\tPROPN\t_\t_\t0\troot\t_\t_\n";
//! let tags = vec![TagRecord::new("Praha", "B-gu")];
//!
//! // 1. Fusão: a tag crua vai para a coluna MISC
//! let (merged, stats) = StreamMerger::default().merge_str(conllu, &tags, "kniha").unwrap();
//! assert!(merged.ends_with("\tNER=B-gu\n"));
//! assert!(stats.is_aligned());
//!
//! // 2. Decodificação e agregação
//! let spans = decode_spans(&[("Praha", "B-gu")]);
//! let row = aggregate_page("kniha", 1, &spans, 2).unwrap();
//! assert_eq!(row.slots[0].entity_type, "Settlement name (City/Town)");
//! ```

pub mod aggregate;
pub mod batch;
pub mod config;
pub mod conllu;
pub mod error;
pub mod merge;
pub mod page;
pub mod page_table;
pub mod pipeline;
pub mod span;
pub mod splitter;
pub mod tag_stream;
pub mod tagger;
pub mod tagset;

pub use aggregate::{aggregate_page, AggregateRow, EntityCount, ReportWriter};
pub use batch::{discover_documents, BatchRunner, BatchSummary, DocumentJob, TagSource};
pub use config::PipelineConfig;
pub use error::{Error, Result};
pub use merge::{MergeStats, StreamMerger};
pub use page::PageMarker;
pub use pipeline::{Pipeline, PipelineEvent};
pub use span::{decode_spans, EntitySpan, SpanDecoder};
pub use tag_stream::TagRecord;
pub use tagger::Tag;

//! # Pipeline por Documento — Fusão, Tabelas e Agregação
//!
//! Coordena os módulos sobre **um** documento:
//!
//! 1. Fusão do CoNLL-U com o fluxo de tags ([`merge`](crate::merge)).
//! 2. Divisão em páginas e escrita das tabelas ([`page_table`](crate::page_table)).
//! 3. Decodificação BIO e agregação por página ([`span`](crate::span),
//!    [`aggregate`](crate::aggregate)).
//!
//! O processamento em lote ([`batch`](crate::batch)) chama estas operações
//! para cada documento e publica o progresso como [`PipelineEvent`]s num
//! canal `mpsc`.

use std::fs;
use std::io::{BufRead, BufReader, BufWriter};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::aggregate::{aggregate_document, AggregateRow};
use crate::batch::BatchSummary;
use crate::config::PipelineConfig;
use crate::conllu::{is_true_token_id, Line, TokenRecord, CONLLU_COLUMNS, MISC_COLUMN};
use crate::error::{Error, Result};
use crate::merge::{MergeStats, StreamMerger};
use crate::page::{PageMarker, PageSegmenter};
use crate::page_table::{split_pages, write_page_tables};
use crate::span::{EntitySpan, SpanDecoder};
use crate::splitter::{split_tags_by_page, write_tag_pages};
use crate::tag_stream::{is_header, tagger_result, TagRecord};
use crate::tagger::{tag_from_features, Tag};

/// Eventos emitidos durante o processamento em lote.
///
/// Cada documento produz `DocumentStarted` seguido de eventos de etapa e,
/// em caso de erro, `DocumentFailed`. O lote termina sempre com `Done`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum PipelineEvent {
    DocumentStarted {
        document: String,
    },
    /// Fusão concluída, com os contadores de alinhamento.
    Merged {
        document: String,
        stats: MergeStats,
    },
    /// Tabelas por página gravadas.
    PagesWritten {
        document: String,
        pages: usize,
    },
    /// Linhas de relatório produzidas para o documento.
    Aggregated {
        document: String,
        rows: usize,
    },
    /// Documento pulado (saída já completa, com `resume`).
    DocumentSkipped {
        document: String,
        reason: String,
    },
    /// Falha isolada: o lote continua com o próximo documento.
    DocumentFailed {
        document: String,
        message: String,
    },
    /// **Conclusão**: contagem final do lote.
    Done {
        summary: BatchSummary,
    },
}

/// Resultado do `summarize` de um documento.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentSummary {
    pub document: String,
    pub stats: MergeStats,
    /// CSVs por página gravados
    pub pages: Vec<PathBuf>,
    /// Caminho do CoNLL-U fundido, se mantido
    pub merged: Option<PathBuf>,
    pub rows: Vec<AggregateRow>,
}

/// O pipeline, parametrizado por uma [`PipelineConfig`] validada.
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn merger(&self) -> StreamMerger {
        StreamMerger::new(self.config.merge_key.clone())
    }

    /// Funde `conllu` com `tags` e grava em `out`.
    pub fn merge_file(&self, conllu: &Path, tags: &[TagRecord], out: &Path, document: &str) -> Result<MergeStats> {
        let input = fs::File::open(conllu).map_err(|e| Error::open(conllu, e))?;
        let output = fs::File::create(out).map_err(|e| Error::io(out, e))?;
        let stats = self
            .merger()
            .merge(BufReader::new(input), tags, BufWriter::new(output), document)
            .map_err(|e| with_path(e, out))?;
        debug!("{}: fusão gravada em {}", document, out.display());
        Ok(stats)
    }

    /// Fusão + tabelas por página + agregação de um documento.
    ///
    /// Tudo é gravado em `out_dir`, exclusivo do documento.
    pub fn summarize(&self, conllu: &Path, tags: &[TagRecord], out_dir: &Path, document: &str) -> Result<DocumentSummary> {
        let primary = fs::read_to_string(conllu).map_err(|e| Error::open(conllu, e))?;
        let (merged, stats) = self.merger().merge_str(&primary, tags, document)?;

        fs::create_dir_all(out_dir).map_err(|e| Error::io(out_dir, e))?;
        let merged_path = if self.config.keep_merged {
            let path = out_dir.join(format!("{document}_merged.conllu"));
            fs::write(&path, &merged).map_err(|e| Error::io(&path, e))?;
            Some(path)
        } else {
            None
        };

        let key = &self.config.merge_key;
        let pages = split_pages(merged.as_bytes(), self.config.page_marker, key)?;
        let written = write_page_tables(out_dir, document, &pages, key)?;

        let spans = extract_entities(merged.as_bytes(), self.config.page_marker, key)?;
        let rows = aggregate_document(document, &spans, self.config.top_n);

        info!(
            "{}: {} tokens, {} páginas, {} entidades",
            document,
            stats.true_tokens,
            written.len(),
            spans.len()
        );
        Ok(DocumentSummary {
            document: document.to_string(),
            stats,
            pages: written,
            merged: merged_path,
            rows,
        })
    }

    /// Decodifica e agrega um arquivo (CoNLL-U fundido ou TSV de tags).
    pub fn aggregate_file(&self, path: &Path) -> Result<Vec<AggregateRow>> {
        self.aggregate_document_file(path, &document_id(path))
    }

    /// Como [`aggregate_file`](Self::aggregate_file), com o nome do documento explícito.
    pub fn aggregate_document_file(&self, path: &Path, document: &str) -> Result<Vec<AggregateRow>> {
        let file = fs::File::open(path).map_err(|e| Error::open(path, e))?;
        let spans = extract_entities(BufReader::new(file), self.config.page_marker, &self.config.merge_key)
            .map_err(|e| with_path(e, path))?;
        Ok(aggregate_document(document, &spans, self.config.top_n))
    }

    /// Divide a resposta do serviço de tagging em `<base>-<página>.tsv`.
    pub fn split_tags(
        &self,
        conllu: &Path,
        response: &Path,
        out_dir: &Path,
        base: &str,
        marker: PageMarker,
        entities: bool,
    ) -> Result<Vec<PathBuf>> {
        let original = fs::read_to_string(conllu).map_err(|e| Error::open(conllu, e))?;
        let content = fs::read_to_string(response).map_err(|e| Error::open(response, e))?;
        let pages = split_tags_by_page(&original, &tagger_result(&content), marker)?;
        write_tag_pages(out_dir, base, &pages, entities)
    }
}

/// Identificador do documento no relatório: nome do arquivo até o primeiro `.`.
pub fn document_id(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    match name.split_once('.') {
        Some((stem, _)) => stem.to_string(),
        None => name,
    }
}

/// Extrai os spans de entidade de um fluxo, já atribuídos às páginas.
///
/// Aceita dois formatos de linha:
/// - CoNLL-U (10+ colunas): forma na coluna 2, tag em `<tag_key>=` (ou
///   `NER=`/`NE=`) na MISC. Artefatos `1-2`/`3.1` são ignorados.
/// - TSV de tags: texto na coluna 1, tag crua na coluna 2.
///
/// Linhas com menos de duas colunas são puladas. Um cabeçalho na primeira
/// linha de dados é ignorado. Uma linha com `#` seguido de tabulação é um
/// token `#`, não um comentário.
pub fn extract_entities<R: BufRead>(reader: R, marker: PageMarker, tag_key: &str) -> Result<Vec<EntitySpan>> {
    let mut segmenter = PageSegmenter::new(marker);
    let mut decoder = SpanDecoder::new();
    let mut seen_data = false;

    for line in reader.lines() {
        let line = line?;
        let cols = match Line::classify(&line) {
            Line::Blank => continue,
            Line::Comment(comment) => {
                segmenter.observe_comment(comment);
                continue;
            }
            Line::Data(cols) => cols,
        };

        let first_data = !seen_data;
        seen_data = true;
        if cols.len() < 2 || (first_data && is_header(&line)) {
            continue;
        }

        let page = segmenter.page_for_data();
        if cols.len() >= CONLLU_COLUMNS {
            if !is_true_token_id(cols[0]) {
                continue;
            }
            let tag = match TokenRecord::from_columns(&cols, tag_key).and_then(|r| r.misc_value(tag_key).map(Tag::parse)) {
                Some(tag) => tag,
                // sem a chave: só `NER=`/`NE=` contam, flags nuas não são tags
                None => tag_from_features(cols[MISC_COLUMN]).map_or(Tag::Outside, Tag::parse),
            };
            decoder.push(page, cols[1], &tag);
        } else {
            decoder.push_raw(page, cols[0], cols[1]);
        }
    }
    Ok(decoder.finish())
}

fn with_path(err: Error, path: &Path) -> Error {
    match err {
        Error::Stream(source) => Error::io(path, source),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const PRAHA: &str = "# sent_id = 1\n# text = Praha je hlavní město\n\
1\tPraha\tPraha\tPROPN\t_\t_\t0\troot\t_\t_\n\
2\tje\tbýt\tAUX\t_\t_\t1\tcop\t_\t_\n\
3\thlavní\thlavní\tADJ\t_\t_\t4\tamod\t_\t_\n\
4\tměsto\tměsto\tNOUN\t_\t_\t1\tnsubj\t_\tSpaceAfter=No\n\n";

    fn praha_tags() -> Vec<TagRecord> {
        [("Praha", "B-gu"), ("je", "O"), ("hlavní", "O"), ("město", "O")]
            .iter()
            .map(|(t, g)| TagRecord::new(*t, *g))
            .collect()
    }

    #[test]
    fn test_extract_from_merged_conllu() {
        let (merged, _) = StreamMerger::default().merge_str(PRAHA, &praha_tags(), "doc").unwrap();
        let spans = extract_entities(Cursor::new(merged), PageMarker::SentenceReset, "NER").unwrap();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].text, "Praha");
        assert_eq!(spans[0].type_name(), "Settlement name (City/Town)");
        assert_eq!(spans[0].page, 1);
    }

    #[test]
    fn test_extract_from_tsv_with_header() {
        let tsv = "Word\tTag\tNE\nJan\tB-ps\tps\nNovák\tI-ps\tps\npřišel\tO\t\n";
        let spans = extract_entities(Cursor::new(tsv), PageMarker::SentenceReset, "NER").unwrap();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].text, "Jan Novák");
    }

    #[test]
    fn test_extract_skips_multiword_and_short_lines() {
        let input = "# sent_id = 1\n\
1-2\tdo\t_\t_\t_\t_\t_\t_\t_\tNER=B-gu\n\
1\tdo\tdo\tADP\t_\t_\t2\tcase\t_\tNER=O\n\
2\tPrahy\tPraha\tPROPN\t_\t_\t0\troot\t_\tNER=B-gu\n\
osamocený\n";
        let spans = extract_entities(Cursor::new(input), PageMarker::SentenceReset, "NER").unwrap();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].text, "Prahy");
    }

    #[test]
    fn test_extract_splits_pages_on_sentence_reset() {
        let input = "# sent_id = 1\n1\tJan\t_\t_\t_\t_\t_\t_\t_\tNER=B-ps\n\n\
# sent_id = 1\n1\tNovák\t_\t_\t_\t_\t_\t_\t_\tNER=I-ps\n\
2\tBrno\t_\t_\t_\t_\t_\t_\t_\tSpaceAfter=No|NER=B-gu\n";
        let spans = extract_entities(Cursor::new(input), PageMarker::SentenceReset, "NER").unwrap();
        let found: Vec<(&str, usize)> = spans.iter().map(|s| (s.text.as_str(), s.page)).collect();
        assert_eq!(found, vec![("Jan", 1), ("Brno", 2)]);
    }

    #[test]
    fn test_extract_with_custom_key() {
        let input = "1\tPraha\t_\t_\t_\t_\t_\t_\t_\tTAG=B-gu\n";
        let spans = extract_entities(Cursor::new(input), PageMarker::NewDoc, "TAG").unwrap();
        assert_eq!(spans.len(), 1);
    }

    #[test]
    fn test_extract_keeps_hash_token_in_tsv() {
        let tsv = "strana\tO\n#\tO\n5\tO\nPraha\tB-gu\n";
        let spans = extract_entities(Cursor::new(tsv), PageMarker::SentenceReset, "NER").unwrap();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].text, "Praha");
        assert_eq!((spans[0].start_token, spans[0].end_token), (3, 3));
    }

    #[test]
    fn test_bare_misc_flag_is_outside() {
        let input = "# sent_id = 1\n\
1\tPraha\t_\t_\t_\t_\t_\t_\t_\tNER=B-gu\n\
2\tpodle\t_\t_\t_\t_\t_\t_\t_\tFlag\n\
3\tBrno\t_\t_\t_\t_\t_\t_\t_\tSpaceAfter=No\n\
4\tOlomouc\t_\t_\t_\t_\t_\t_\t_\tNE=B-gu\n";
        let spans = extract_entities(Cursor::new(input), PageMarker::SentenceReset, "TAG").unwrap();
        let texts: Vec<&str> = spans.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(texts, vec!["Praha", "Olomouc"]);
    }

    #[test]
    fn test_aggregate_document_file_uses_given_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kniha_merged.conllu");
        fs::write(&path, "# sent_id = 1\n1\tPraha\t_\t_\t_\t_\t_\t_\t_\tNER=B-gu\n").unwrap();
        let pipeline = Pipeline::default();
        assert_eq!(pipeline.aggregate_file(&path).unwrap()[0].document, "kniha_merged");
        assert_eq!(pipeline.aggregate_document_file(&path, "kniha").unwrap()[0].document, "kniha");
    }

    #[test]
    fn test_document_id() {
        assert_eq!(document_id(Path::new("/x/kniha.merged.conllu")), "kniha");
        assert_eq!(document_id(Path::new("kniha")), "kniha");
    }

    #[test]
    fn test_summarize_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let conllu = dir.path().join("kniha.conllu");
        fs::write(&conllu, PRAHA).unwrap();
        let out_dir = dir.path().join("out").join("kniha");

        let pipeline = Pipeline::default();
        let summary = pipeline.summarize(&conllu, &praha_tags(), &out_dir, "kniha").unwrap();

        assert!(summary.stats.is_aligned());
        assert_eq!(summary.pages, vec![out_dir.join("kniha-1.csv")]);
        let merged = fs::read_to_string(out_dir.join("kniha_merged.conllu")).unwrap();
        assert!(merged.contains("\tNER=B-gu\n"));

        assert_eq!(summary.rows.len(), 1);
        let record = summary.rows[0].to_record();
        assert_eq!(record.len(), 3 * 20 + 2);
        assert_eq!(&record[..5], &["kniha", "1", "Praha", "Settlement name (City/Town)", "1"]);
        assert_eq!(&record[5..8], &["", "", "0"]);
    }

    #[test]
    fn test_summarize_without_keeping_merged() {
        let dir = tempfile::tempdir().unwrap();
        let conllu = dir.path().join("kniha.conllu");
        fs::write(&conllu, PRAHA).unwrap();
        let config = PipelineConfig {
            keep_merged: false,
            ..Default::default()
        };
        let summary = Pipeline::new(config)
            .unwrap()
            .summarize(&conllu, &praha_tags(), dir.path(), "kniha")
            .unwrap();
        assert!(summary.merged.is_none());
        assert!(!dir.path().join("kniha_merged.conllu").exists());
    }

    #[test]
    fn test_short_tag_stream_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let conllu = dir.path().join("kniha.conllu");
        fs::write(&conllu, PRAHA).unwrap();
        let out = dir.path().join("kniha_merged.conllu");
        let stats = Pipeline::default()
            .merge_file(&conllu, &praha_tags()[..1], &out, "kniha")
            .unwrap();
        assert_eq!(stats.augmented, 1);
        assert_eq!(stats.unaugmented, 3);
        assert_eq!(fs::read_to_string(&out).unwrap().matches("NER=").count(), 1);
    }

    #[test]
    fn test_missing_conllu_is_missing_input() {
        let dir = tempfile::tempdir().unwrap();
        let err = Pipeline::default()
            .merge_file(&dir.path().join("nic.conllu"), &[], &dir.path().join("o"), "nic")
            .unwrap_err();
        assert!(matches!(err, Error::MissingInput(_)));
    }

    #[test]
    fn test_split_tags_reads_json_response() {
        let dir = tempfile::tempdir().unwrap();
        let conllu = dir.path().join("kniha.conllu");
        fs::write(&conllu, "# newdoc\n# sent_id = 1\n1\tPraha\n\n# newdoc\n# sent_id = 2\n1\tBrno\n").unwrap();
        let response = dir.path().join("kniha.json");
        fs::write(&response, r#"{"result": "Praha\tB-gu\n\nBrno\tB-gu\n"}"#).unwrap();

        let written = Pipeline::default()
            .split_tags(&conllu, &response, &dir.path().join("tsv"), "kniha", PageMarker::NewDoc, true)
            .unwrap();
        assert_eq!(written.len(), 2);
        let second = fs::read_to_string(dir.path().join("tsv").join("kniha-2.tsv")).unwrap();
        assert_eq!(second, "Entity\tType\nBrno\tSettlement name (City/Town)\n");
    }
}

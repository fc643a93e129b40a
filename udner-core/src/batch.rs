//! # Processamento em Lote
//!
//! Descobre os pares (CoNLL-U, tags) de um diretório e processa cada
//! documento de forma independente num pool `rayon`.
//!
//! - A falha de um documento é isolada: vira [`PipelineEvent::DocumentFailed`]
//!   e entra na contagem final, sem interromper os outros.
//! - Cada documento grava apenas em caminhos próprios (`<out>/<doc>/...`).
//! - O relatório agregado tem um único escritor, acionado depois que todos os
//!   documentos terminam, sempre na ordem de descoberta.
//!
//! As variantes `*_streaming` publicam eventos num `mpsc::Sender`; as
//! variantes síncronas consomem o canal e devolvem o [`BatchSummary`].

use std::fs;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::mpsc;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::aggregate::{AggregateRow, ReportWriter};
use crate::error::{Error, Result};
use crate::pipeline::{Pipeline, PipelineEvent};
use crate::tag_stream::{page_files, read_tag_dir, read_tag_file, TagRecord};

/// Origem do fluxo de tags de um documento.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TagSource {
    /// Um único `<doc>.tsv`
    File(PathBuf),
    /// Diretório `<doc>/` com `<doc>-<página>.tsv`
    PageDir(PathBuf),
}

impl TagSource {
    pub fn path(&self) -> &Path {
        match self {
            TagSource::File(path) | TagSource::PageDir(path) => path,
        }
    }

    pub fn load(&self) -> Result<Vec<TagRecord>> {
        match self {
            TagSource::File(path) => read_tag_file(path),
            TagSource::PageDir(dir) => read_tag_dir(dir),
        }
    }

    /// Número de páginas de entrada, quando conhecido.
    pub fn page_count(&self) -> Option<usize> {
        match self {
            TagSource::File(_) => None,
            TagSource::PageDir(dir) => page_files(dir).ok().map(|files| files.len()),
        }
    }
}

/// Um documento a processar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentJob {
    /// Nome base do `.conllu` (sem extensão)
    pub document: String,
    pub conllu: PathBuf,
    pub tags: TagSource,
}

/// Documento que falhou e o motivo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedDocument {
    pub document: String,
    pub message: String,
}

/// Contagem final de um lote.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub processed: usize,
    pub skipped: usize,
    pub failed: Vec<FailedDocument>,
}

impl BatchSummary {
    pub fn total(&self) -> usize {
        self.processed + self.skipped + self.failed.len()
    }

    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

enum Outcome {
    Done(Vec<AggregateRow>),
    /// Saída já completa; `rows` vem do CoNLL-U fundido existente.
    Skipped { reason: String, rows: Vec<AggregateRow> },
    Failed(String),
}

impl Outcome {
    fn skipped(reason: String) -> Self {
        Outcome::Skipped { reason, rows: Vec::new() }
    }

    fn rows(&self) -> Option<&[AggregateRow]> {
        match self {
            Outcome::Done(rows) | Outcome::Skipped { rows, .. } => Some(rows),
            Outcome::Failed(_) => None,
        }
    }
}

/// Lista os arquivos de `dir` com a extensão dada, em ordem de nome.
pub fn discover_files(dir: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(dir).map_err(|e| Error::open(dir, e))?;
    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == extension))
        .collect();
    files.sort();
    Ok(files)
}

/// Pareia cada `<doc>.conllu` de `conllu_dir` com suas tags em `tsv_dir`.
///
/// Preferência: diretório `<doc>/`, depois `<doc>.tsv`. Sem nenhum dos dois,
/// o job aponta para `<doc>.tsv` e falha ao carregar (falha só daquele
/// documento).
pub fn discover_documents(conllu_dir: &Path, tsv_dir: &Path) -> Result<Vec<DocumentJob>> {
    let jobs = discover_files(conllu_dir, "conllu")?
        .into_iter()
        .map(|conllu| {
            let document = conllu
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            let dir = tsv_dir.join(&document);
            let tags = if dir.is_dir() {
                TagSource::PageDir(dir)
            } else {
                TagSource::File(tsv_dir.join(format!("{document}.tsv")))
            };
            DocumentJob { document, conllu, tags }
        })
        .collect();
    Ok(jobs)
}

/// Executor de lotes sobre um [`Pipeline`].
#[derive(Debug, Clone, Default)]
pub struct BatchRunner {
    pipeline: Pipeline,
}

impl BatchRunner {
    pub fn new(pipeline: Pipeline) -> Self {
        Self { pipeline }
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Grava `<out_dir>/<doc>_merged.conllu` para cada documento.
    pub fn run_merge(&self, jobs: &[DocumentJob], out_dir: &Path) -> Result<BatchSummary> {
        let (tx, rx) = mpsc::channel();
        self.run_merge_streaming(jobs, out_dir, tx)?;
        final_summary(rx)
    }

    pub fn run_merge_streaming(
        &self,
        jobs: &[DocumentJob],
        out_dir: &Path,
        tx: mpsc::Sender<PipelineEvent>,
    ) -> Result<()> {
        fs::create_dir_all(out_dir).map_err(|e| Error::io(out_dir, e))?;
        let resume = self.pipeline.config().resume;

        let outcomes = self.run_parallel(jobs, &tx, |job, tx| {
            let out = out_dir.join(format!("{}_merged.conllu", job.document));
            if resume && out.exists() {
                return Ok(Outcome::skipped(format!("{} já existe", out.display())));
            }
            let tags = job.tags.load()?;
            let stats = self.pipeline.merge_file(&job.conllu, &tags, &out, &job.document)?;
            let _ = tx.send(PipelineEvent::Merged {
                document: job.document.clone(),
                stats,
            });
            Ok(Outcome::Done(Vec::new()))
        })?;

        let summary = tally(&outcomes);
        let _ = tx.send(PipelineEvent::Done { summary });
        Ok(())
    }

    /// Fusão + tabelas por página em `<out_root>/<doc>/`.
    ///
    /// Com `report`, grava também o relatório agregado de todos os documentos.
    /// Um documento pulado por `resume` entra no relatório a partir do
    /// `<doc>_merged.conllu` já gravado; sem esse arquivo, é reprocessado.
    pub fn run_summarize(&self, jobs: &[DocumentJob], out_root: &Path, report: Option<&Path>) -> Result<BatchSummary> {
        let (tx, rx) = mpsc::channel();
        self.run_summarize_streaming(jobs, out_root, report, tx)?;
        final_summary(rx)
    }

    pub fn run_summarize_streaming(
        &self,
        jobs: &[DocumentJob],
        out_root: &Path,
        report: Option<&Path>,
        tx: mpsc::Sender<PipelineEvent>,
    ) -> Result<()> {
        fs::create_dir_all(out_root).map_err(|e| Error::io(out_root, e))?;
        let resume = self.pipeline.config().resume;

        let outcomes = self.run_parallel(jobs, &tx, |job, tx| {
            let out_dir = out_root.join(&job.document);
            if resume {
                if let Some(reason) = completed_output(&out_dir, &job.tags) {
                    if report.is_none() {
                        return Ok(Outcome::skipped(reason));
                    }
                    let merged = out_dir.join(format!("{}_merged.conllu", job.document));
                    if merged.is_file() {
                        let rows = self.pipeline.aggregate_document_file(&merged, &job.document)?;
                        return Ok(Outcome::Skipped { reason, rows });
                    }
                    info!(
                        "[Reprocessando] {}: {} ausente, necessário para o relatório",
                        job.document,
                        merged.display()
                    );
                }
            }
            let tags = job.tags.load()?;
            let summary = self.pipeline.summarize(&job.conllu, &tags, &out_dir, &job.document)?;
            let _ = tx.send(PipelineEvent::Merged {
                document: job.document.clone(),
                stats: summary.stats,
            });
            let _ = tx.send(PipelineEvent::PagesWritten {
                document: job.document.clone(),
                pages: summary.pages.len(),
            });
            Ok(Outcome::Done(summary.rows))
        })?;

        if let Some(report) = report {
            self.write_report(report, &outcomes, &tx)?;
        }
        let summary = tally(&outcomes);
        let _ = tx.send(PipelineEvent::Done { summary });
        Ok(())
    }

    /// Agrega todo `.conllu` de `input_dir` num único relatório.
    pub fn run_aggregate(&self, input_dir: &Path, report: &Path) -> Result<BatchSummary> {
        let (tx, rx) = mpsc::channel();
        self.run_aggregate_streaming(input_dir, report, tx)?;
        final_summary(rx)
    }

    pub fn run_aggregate_streaming(
        &self,
        input_dir: &Path,
        report: &Path,
        tx: mpsc::Sender<PipelineEvent>,
    ) -> Result<()> {
        let files = discover_files(input_dir, "conllu")?;
        info!("Agregando {} arquivos de {}", files.len(), input_dir.display());

        let jobs: Vec<(String, PathBuf)> = files
            .into_iter()
            .map(|path| (crate::pipeline::document_id(&path), path))
            .collect();
        let outcomes = self.run_parallel(&jobs, &tx, |(_, path), _| {
            Ok(Outcome::Done(self.pipeline.aggregate_file(path)?))
        })?;

        self.write_report(report, &outcomes, &tx)?;
        let summary = tally(&outcomes);
        let _ = tx.send(PipelineEvent::Done { summary });
        Ok(())
    }

    /// Roda `process` para cada item no pool, preservando a ordem de entrada.
    fn run_parallel<T, F>(
        &self,
        items: &[T],
        tx: &mpsc::Sender<PipelineEvent>,
        process: F,
    ) -> Result<Vec<(String, Outcome)>>
    where
        T: Named + Sync,
        F: Fn(&T, &mpsc::Sender<PipelineEvent>) -> Result<Outcome> + Sync,
    {
        let run = || {
            items
                .par_iter()
                .map_with(tx.clone(), |tx, item| {
                    let document = item.name().to_string();
                    let _ = tx.send(PipelineEvent::DocumentStarted {
                        document: document.clone(),
                    });
                    let outcome = match process(item, tx) {
                        Ok(outcome) => outcome,
                        Err(e) => Outcome::Failed(e.to_string()),
                    };
                    match &outcome {
                        Outcome::Done(_) => {}
                        Outcome::Skipped { reason, .. } => {
                            info!("[Pulado] {}: {}", document, reason);
                            let _ = tx.send(PipelineEvent::DocumentSkipped {
                                document: document.clone(),
                                reason: reason.clone(),
                            });
                        }
                        Outcome::Failed(message) => {
                            error!("[Falha] {}: {}", document, message);
                            let _ = tx.send(PipelineEvent::DocumentFailed {
                                document: document.clone(),
                                message: message.clone(),
                            });
                        }
                    }
                    (document, outcome)
                })
                .collect::<Vec<_>>()
        };

        match self.pipeline.config().workers {
            Some(workers) => {
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(workers)
                    .build()
                    .map_err(|e| Error::config(e.to_string()))?;
                Ok(pool.install(run))
            }
            None => Ok(run()),
        }
    }

    fn write_report(
        &self,
        report: &Path,
        outcomes: &[(String, Outcome)],
        tx: &mpsc::Sender<PipelineEvent>,
    ) -> Result<()> {
        if let Some(parent) = report.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }
        let file = fs::File::create(report).map_err(|e| Error::io(report, e))?;
        let mut writer = ReportWriter::new(BufWriter::new(file), self.pipeline.config().top_n)?;

        let mut total = 0;
        for (document, outcome) in outcomes {
            if let Some(rows) = outcome.rows() {
                for row in rows {
                    writer.write_row(row)?;
                }
                total += rows.len();
                let _ = tx.send(PipelineEvent::Aggregated {
                    document: document.clone(),
                    rows: rows.len(),
                });
            }
        }
        writer.finish()?;
        info!("Relatório com {} linhas gravado em {}", total, report.display());
        Ok(())
    }
}

/// Itens de lote identificáveis por nome de documento.
trait Named {
    fn name(&self) -> &str;
}

impl Named for DocumentJob {
    fn name(&self) -> &str {
        &self.document
    }
}

impl Named for (String, PathBuf) {
    fn name(&self) -> &str {
        &self.0
    }
}

/// Saída já completa? Devolve o motivo do pulo.
///
/// Com diretório de páginas, exige tantos CSVs quanto TSVs de entrada; com
/// arquivo único, basta existir algum CSV.
fn completed_output(out_dir: &Path, tags: &TagSource) -> Option<String> {
    let written = discover_files(out_dir, "csv").ok()?.len();
    match tags.page_count() {
        Some(expected) if expected > 0 && expected == written => {
            Some(format!("saída completa ({written} CSVs para {expected} TSVs)"))
        }
        Some(expected) => {
            if written > 0 {
                info!(
                    "[Reprocessando] {}: {} CSVs para {} TSVs",
                    out_dir.display(),
                    written,
                    expected
                );
            }
            None
        }
        None => (written > 0).then(|| format!("{written} CSVs já gravados")),
    }
}

fn tally(outcomes: &[(String, Outcome)]) -> BatchSummary {
    let mut summary = BatchSummary::default();
    for (document, outcome) in outcomes {
        match outcome {
            Outcome::Done(_) => summary.processed += 1,
            Outcome::Skipped { .. } => summary.skipped += 1,
            Outcome::Failed(message) => summary.failed.push(FailedDocument {
                document: document.clone(),
                message: message.clone(),
            }),
        }
    }
    summary
}

fn final_summary(rx: mpsc::Receiver<PipelineEvent>) -> Result<BatchSummary> {
    rx.into_iter()
        .find_map(|event| match event {
            PipelineEvent::Done { summary } => Some(summary),
            _ => None,
        })
        .ok_or_else(|| Error::parse("lote terminou sem evento Done"))
}

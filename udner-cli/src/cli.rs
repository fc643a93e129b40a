//! Definição dos subcomandos e execução.

use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::thread;

use anyhow::{anyhow, bail, Context};
use clap::{Parser, Subcommand};
use tracing::{debug, info, warn};
use udner_core::{
    discover_documents, BatchRunner, BatchSummary, PageMarker, Pipeline, PipelineConfig, PipelineEvent,
    TagSource,
};

#[derive(Parser, Debug)]
#[command(name = "udner")]
#[command(about = "Funde UDPipe (CoNLL-U) com NameTag (BIO) e agrega entidades por página")]
#[command(version)]
pub struct Cli {
    /// Arquivo JSON com a configuração do pipeline
    #[arg(long, global = true, env = "UDNER_CONFIG")]
    config: Option<PathBuf>,

    /// Tamanho do pool de threads
    #[arg(long, global = true)]
    workers: Option<usize>,

    /// Log em nível debug
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Injeta as tags do NameTag na coluna MISC do CoNLL-U
    Merge {
        /// CoNLL-U de um único documento
        #[arg(long, requires = "tsv_file")]
        conllu_file: Option<PathBuf>,
        /// TSV de tags do documento
        #[arg(long)]
        tsv_file: Option<PathBuf>,
        /// Diretório com `<doc>.conllu`
        #[arg(long, env = "CONLLU_INPUT_DIR")]
        conllu_dir: Option<PathBuf>,
        /// Diretório com `<doc>.tsv` ou `<doc>/<doc>-<página>.tsv`
        #[arg(long, env = "TSV_INPUT_DIR")]
        tsv_dir: Option<PathBuf>,
        /// Arquivo de saída (modo único) ou diretório (modo lote)
        #[arg(short, long)]
        out: PathBuf,
        /// Pula documentos já fundidos
        #[arg(long)]
        resume: bool,
    },

    /// Fusão + um CSV por página para cada documento
    Summarize {
        #[arg(long, env = "CONLLU_INPUT_DIR")]
        conllu_dir: PathBuf,
        #[arg(long, env = "TSV_INPUT_DIR")]
        tsv_dir: PathBuf,
        #[arg(long, env = "SUMMARY_OUTPUT_DIR")]
        out_dir: PathBuf,
        /// Também grava o relatório agregado neste arquivo
        #[arg(long)]
        stats_file: Option<PathBuf>,
        /// Pula documentos cuja saída já está completa
        #[arg(long)]
        resume: bool,
        /// Não mantém `<doc>_merged.conllu`
        #[arg(long)]
        discard_merged: bool,
        #[arg(long, value_parser = parse_marker)]
        page_marker: Option<PageMarker>,
        #[arg(long)]
        top_n: Option<usize>,
    },

    /// Agrega as entidades de todo `.conllu` de um diretório num CSV
    Aggregate {
        input_dir: PathBuf,
        stats_file: PathBuf,
        #[arg(long)]
        top_n: Option<usize>,
        #[arg(long, value_parser = parse_marker)]
        page_marker: Option<PageMarker>,
    },

    /// Divide a resposta do NameTag em `<basename>-<página>.tsv`
    SplitTags {
        /// CoNLL-U original (fonte das fronteiras de página)
        orig_conllu: PathBuf,
        /// Resposta do serviço (JSON `{"result": ...}` ou TSV cru)
        response: PathBuf,
        out_dir: PathBuf,
        basename: String,
        /// Grava `Entity\tType` em vez dos tokens
        #[arg(long)]
        entities: bool,
        #[arg(long, value_parser = parse_marker, default_value = "new_doc")]
        page_marker: PageMarker,
    },
}

fn parse_marker(s: &str) -> Result<PageMarker, String> {
    PageMarker::from_str(s).ok_or_else(|| format!("marcador desconhecido '{s}' (use new_doc ou sentence_reset)"))
}

pub fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = match &cli.config {
        Some(path) => PipelineConfig::from_json_file(path)
            .with_context(|| format!("lendo configuração {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    if cli.workers.is_some() {
        config.workers = cli.workers;
    }

    match cli.command {
        Commands::Merge {
            conllu_file,
            tsv_file,
            conllu_dir,
            tsv_dir,
            out,
            resume,
        } => {
            config.resume |= resume;
            let pipeline = Pipeline::new(config)?;
            if let (Some(conllu), Some(tsv)) = (conllu_file, tsv_file) {
                return merge_single(&pipeline, &conllu, &tsv, &out);
            }
            let (Some(conllu_dir), Some(tsv_dir)) = (conllu_dir, tsv_dir) else {
                bail!("informe --conllu-file/--tsv-file ou --conllu-dir/--tsv-dir");
            };
            let jobs = discover_documents(&conllu_dir, &tsv_dir)?;
            info!("{} documentos em {}", jobs.len(), conllu_dir.display());
            let runner = BatchRunner::new(pipeline);
            let summary = run_with_events(|tx| runner.run_merge_streaming(&jobs, &out, tx))?;
            report(&summary);
        }

        Commands::Summarize {
            conllu_dir,
            tsv_dir,
            out_dir,
            stats_file,
            resume,
            discard_merged,
            page_marker,
            top_n,
        } => {
            config.resume |= resume;
            config.keep_merged &= !discard_merged;
            if let Some(marker) = page_marker {
                config.page_marker = marker;
            }
            if let Some(top_n) = top_n {
                config.top_n = top_n;
            }
            let runner = BatchRunner::new(Pipeline::new(config)?);
            let jobs = discover_documents(&conllu_dir, &tsv_dir)?;
            info!("{} documentos em {}", jobs.len(), conllu_dir.display());
            let summary = run_with_events(|tx| {
                runner.run_summarize_streaming(&jobs, &out_dir, stats_file.as_deref(), tx)
            })?;
            report(&summary);
        }

        Commands::Aggregate {
            input_dir,
            stats_file,
            top_n,
            page_marker,
        } => {
            if let Some(marker) = page_marker {
                config.page_marker = marker;
            }
            if let Some(top_n) = top_n {
                config.top_n = top_n;
            }
            let runner = BatchRunner::new(Pipeline::new(config)?);
            let summary = run_with_events(|tx| runner.run_aggregate_streaming(&input_dir, &stats_file, tx))?;
            report(&summary);
        }

        Commands::SplitTags {
            orig_conllu,
            response,
            out_dir,
            basename,
            entities,
            page_marker,
        } => {
            let pipeline = Pipeline::new(config)?;
            let written = pipeline.split_tags(&orig_conllu, &response, &out_dir, &basename, page_marker, entities)?;
            info!("{} páginas gravadas em {}", written.len(), out_dir.display());
        }
    }
    Ok(())
}

fn merge_single(pipeline: &Pipeline, conllu: &Path, tsv: &Path, out: &Path) -> anyhow::Result<()> {
    let tags = TagSource::File(tsv.to_path_buf()).load()?;
    let document = conllu
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stats = pipeline.merge_file(conllu, &tags, out, &document)?;
    info!(
        "{}: {} de {} tokens anotados → {}",
        document,
        stats.augmented,
        stats.true_tokens,
        out.display()
    );
    Ok(())
}

/// Executa um lote consumindo os eventos numa thread de log.
fn run_with_events<F>(batch: F) -> anyhow::Result<BatchSummary>
where
    F: FnOnce(mpsc::Sender<PipelineEvent>) -> udner_core::Result<()>,
{
    let (tx, rx) = mpsc::channel();
    let logger = thread::spawn(move || log_events(rx));
    let result = batch(tx);
    let summary = logger.join().map_err(|_| anyhow!("thread de log encerrou com pânico"))?;
    result?;
    summary.ok_or_else(|| anyhow!("lote terminou sem resumo"))
}

fn log_events(rx: mpsc::Receiver<PipelineEvent>) -> Option<BatchSummary> {
    let mut summary = None;
    for event in rx {
        match event {
            PipelineEvent::DocumentStarted { document } => debug!("[Processando] {}", document),
            PipelineEvent::Merged { document, stats } => info!(
                "{}: {} de {} tokens anotados",
                document, stats.augmented, stats.true_tokens
            ),
            PipelineEvent::PagesWritten { document, pages } => debug!("{}: {} páginas", document, pages),
            PipelineEvent::Aggregated { document, rows } => debug!("{}: {} linhas no relatório", document, rows),
            // pulos e falhas já são registrados pelo lote
            PipelineEvent::DocumentSkipped { .. } | PipelineEvent::DocumentFailed { .. } => {}
            PipelineEvent::Done { summary: done } => summary = Some(done),
        }
    }
    summary
}

fn report(summary: &BatchSummary) {
    info!(
        "Concluído: {} processados, {} pulados, {} falhas",
        summary.processed,
        summary.skipped,
        summary.failed.len()
    );
    for failed in &summary.failed {
        warn!("  {}: {}", failed.document, failed.message);
    }
}

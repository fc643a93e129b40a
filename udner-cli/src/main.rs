//! `udner` — linha de comando para fundir UDPipe + NameTag, gerar as tabelas
//! por página e agregar as entidades.

mod cli;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Arquivo com os diretórios padrão (`CONLLU_INPUT_DIR`, `TSV_INPUT_DIR`,
/// `SUMMARY_OUTPUT_DIR`).
const ENV_FILE: &str = "api_config.env";

fn main() -> anyhow::Result<()> {
    // Variáveis já definidas no shell prevalecem sobre os arquivos
    let _ = dotenvy::from_filename(ENV_FILE);
    let _ = dotenvy::dotenv();

    let args = cli::Cli::parse();

    let default_filter = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    cli::run(args)
}

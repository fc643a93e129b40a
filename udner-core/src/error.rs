//! Tipos de erro do `udner-core`.
//!
//! Apenas falhas que invalidam um documento inteiro viram [`Error`]. Linhas
//! malformadas, fluxos de tamanhos diferentes e códigos de tipo desconhecidos
//! são tratados localmente (pulados, repassados ou normalizados) e nunca sobem.

use std::path::PathBuf;

use thiserror::Error;

/// Resultado padrão das operações do crate.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Arquivo ou diretório de entrada obrigatório não existe.
    #[error("Entrada ausente: {}", .0.display())]
    MissingInput(PathBuf),

    /// Falha de E/S associada a um caminho concreto.
    #[error("Erro de E/S em {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Falha de E/S sem caminho conhecido (ex: escrita em buffer).
    #[error("Erro de E/S: {0}")]
    Stream(#[from] std::io::Error),

    #[error("Erro de CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("Erro de JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Conteúdo estruturado inválido (ex: relatório com largura errada).
    #[error("Erro de leitura: {0}")]
    Parse(String),

    /// Configuração inconsistente (ex: `top_n = 0`).
    #[error("Configuração inválida: {0}")]
    Config(String),
}

impl Error {
    /// Atalho para anexar o caminho a um `std::io::Error`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    /// Converte `NotFound` em [`Error::MissingInput`], o resto em [`Error::Io`].
    pub fn open(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::NotFound {
            Error::MissingInput(path)
        } else {
            Error::Io { path, source }
        }
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        Error::Parse(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }
}

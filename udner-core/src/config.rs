//! Configuração do pipeline.
//!
//! Todos os campos têm padrão; um arquivo JSON pode sobrescrever qualquer
//! subconjunto deles.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::aggregate::DEFAULT_TOP_N;
use crate::error::{Error, Result};
use crate::merge::DEFAULT_MERGE_KEY;
use crate::page::PageMarker;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Entidades por linha do relatório agregado
    pub top_n: usize,
    /// Estratégia de fronteira de página
    pub page_marker: PageMarker,
    /// Chave do atributo MISC que recebe a tag
    pub merge_key: String,
    /// Mantém `<doc>_merged.conllu` após gerar as tabelas por página
    pub keep_merged: bool,
    /// Pula documentos cuja saída já está completa
    pub resume: bool,
    /// Tamanho do pool de threads (`None` = padrão do rayon)
    pub workers: Option<usize>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            top_n: DEFAULT_TOP_N,
            page_marker: PageMarker::default(),
            merge_key: DEFAULT_MERGE_KEY.to_string(),
            keep_merged: true,
            resume: false,
            workers: None,
        }
    }
}

impl PipelineConfig {
    /// Carrega de um arquivo JSON e valida.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::open(path, e))?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.top_n == 0 {
            return Err(Error::config("top_n deve ser maior que zero"));
        }
        if self.merge_key.is_empty() || self.merge_key.contains(['=', '|', '\t']) {
            return Err(Error::config(format!("merge_key inválida: {:?}", self.merge_key)));
        }
        if self.workers == Some(0) {
            return Err(Error::config("workers deve ser maior que zero"));
        }
        Ok(())
    }
}

//! # Fluxo de Tags do NameTag
//!
//! A saída do NameTag é um TSV plano, alinhado por posição aos tokens do UDPipe:
//!
//! ```text
//! Word    Tag     NE
//! Praha   B-gu    gu
//! je      O
//! ```
//!
//! - 2 ou 3 colunas (texto, tag crua, sufixo NE opcional).
//! - Uma linha de cabeçalho opcional é detectada e pulada.
//! - Linhas vazias separam sentenças; comentários `#` sem tabulação são
//!   ignorados. `#\tO` é o token `#` e é mantido.
//! - Linhas com uma única coluna são mantidas com tag `_`, para não deslocar
//!   o alinhamento posicional com o fluxo primário.
//!
//! Um documento pode vir num único `<doc>.tsv` ou num diretório de páginas
//! `<doc>/<doc>-<página>.tsv`, concatenadas em ordem numérica de página.

use std::fs;
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::conllu::{is_comment, EMPTY_FIELD};
use crate::error::{Error, Result};

static PAGE_FILE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-(\d+)\.tsv$").expect("regex página"));

const HEADER_FIRST: [&str; 4] = ["word", "token", "entity", "form"];
const HEADER_SECOND: [&str; 3] = ["tag", "type", "ne"];

/// Um par (texto, tag crua) do NameTag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagRecord {
    pub text: String,
    /// Tag exatamente como recebida (ex: `"B-P|B-pf"`)
    pub raw_tag: String,
    /// Coluna NE pré-normalizada, quando presente
    pub ne: Option<String>,
}

impl TagRecord {
    pub fn new(text: impl Into<String>, raw_tag: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            raw_tag: raw_tag.into(),
            ne: None,
        }
    }

    /// Lê uma linha de dados. Linhas vazias ou comentários devolvem `None`.
    pub fn parse(line: &str) -> Option<Self> {
        if line.trim().is_empty() || is_comment(line) {
            return None;
        }
        let mut parts = line.trim().split('\t');
        let text = parts.next()?.to_string();
        let raw_tag = parts.next().unwrap_or(EMPTY_FIELD).to_string();
        let ne = parts.next().map(str::to_string);
        Some(Self { text, raw_tag, ne })
    }
}

/// Verifica se a linha é um cabeçalho conhecido (`Word\tTag\tNE`, `Entity\tType`...).
pub fn is_header(line: &str) -> bool {
    let mut parts = line.trim().split('\t');
    let first = parts.next().map(str::to_lowercase);
    let second = parts.next().map(str::to_lowercase);
    match (first, second) {
        (Some(a), Some(b)) => {
            HEADER_FIRST.contains(&a.as_str()) && HEADER_SECOND.contains(&b.as_str())
        }
        _ => false,
    }
}

/// Lê o fluxo preservando as sentenças (blocos separados por linha vazia).
pub fn read_tag_sentences<R: BufRead>(reader: R) -> Result<Vec<Vec<TagRecord>>> {
    let mut sentences = Vec::new();
    let mut current = Vec::new();
    let mut seen_data = false;

    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            if !current.is_empty() {
                sentences.push(std::mem::take(&mut current));
            }
            continue;
        }
        if !seen_data && !is_comment(&line) {
            seen_data = true;
            if is_header(&line) {
                continue;
            }
        }
        if let Some(record) = TagRecord::parse(&line) {
            current.push(record);
        }
    }
    if !current.is_empty() {
        sentences.push(current);
    }
    Ok(sentences)
}

/// Lê o fluxo como uma sequência plana de registros.
pub fn read_tag_records<R: BufRead>(reader: R) -> Result<Vec<TagRecord>> {
    Ok(read_tag_sentences(reader)?.into_iter().flatten().collect())
}

/// Lê um arquivo TSV de tags.
pub fn read_tag_file(path: &Path) -> Result<Vec<TagRecord>> {
    let file = fs::File::open(path).map_err(|e| Error::open(path, e))?;
    read_tag_records(std::io::BufReader::new(file)).map_err(|e| match e {
        Error::Stream(source) => Error::io(path, source),
        other => other,
    })
}

/// Número de página de um arquivo `<doc>-<n>.tsv` (0 quando ausente).
pub fn page_file_number(name: &str) -> usize {
    PAGE_FILE_RE
        .captures(name)
        .and_then(|caps| caps[1].parse().ok())
        .unwrap_or(0)
}

/// Lista os `.tsv` de um diretório de páginas, em ordem numérica de página.
pub fn page_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(dir).map_err(|e| Error::open(dir, e))?;
    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|ext| ext == "tsv"))
        .collect();
    // desempate pelo nome para manter a ordem determinística
    files.sort_by_cached_key(|p| {
        let name = file_name(p);
        (page_file_number(&name), name)
    });
    Ok(files)
}

/// Concatena todas as páginas de um diretório num único fluxo.
pub fn read_tag_dir(dir: &Path) -> Result<Vec<TagRecord>> {
    let mut records = Vec::new();
    for path in page_files(dir)? {
        records.extend(read_tag_file(&path)?);
    }
    Ok(records)
}

/// Extrai o texto tagueado da resposta do serviço (`{"result": "..."}`).
///
/// Se o conteúdo não for JSON, assume que já é o TSV cru.
pub fn tagger_result(content: &str) -> String {
    #[derive(Deserialize)]
    struct Response {
        #[serde(default)]
        result: String,
    }

    match serde_json::from_str::<Response>(content) {
        Ok(response) => response.result,
        Err(_) => content.to_string(),
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

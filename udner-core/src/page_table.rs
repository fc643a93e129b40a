//! # Tabelas de Tokens por Página
//!
//! Divide um CoNLL-U já fundido em páginas e gera um CSV por página, com uma
//! linha por token verdadeiro:
//!
//! ```text
//! page_id,token,lemma,position,nameTag,udpipe.feats.Case,...,udpipe.misc.SpaceAfter
//! ```
//!
//! As colunas dinâmicas (`udpipe.feats.*`, `udpipe.misc.*`) são a união, em
//! ordem alfabética, das chaves vistas na página.

use std::collections::{BTreeMap, BTreeSet};
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::conllu::{Line, TokenRecord};
use crate::error::{Error, Result};
use crate::page::{PageMarker, PageSegmenter};

static UNSAFE_FILE_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[\\/*?:"<>|]"#).expect("regex nome de arquivo"));

const BASE_COLUMNS: [&str; 5] = ["page_id", "token", "lemma", "position", "nameTag"];
const FEATS_PREFIX: &str = "udpipe.feats.";
const MISC_PREFIX: &str = "udpipe.misc.";

/// Tokens de uma página.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRows {
    /// Índice da página (base 1)
    pub page: usize,
    /// Rótulo `# newdoc id = ...`, se houver
    pub label: Option<String>,
    pub tokens: Vec<TokenRecord>,
}

impl PageRows {
    /// Identificador exibido na coluna `page_id` e usado no nome do arquivo.
    pub fn page_id(&self) -> String {
        self.label.clone().unwrap_or_else(|| self.page.to_string())
    }
}

/// Divide o fluxo fundido em páginas.
///
/// Só entram tokens verdadeiros com as 10 colunas; linhas curtas e
/// multipalavras são puladas. Páginas sem tokens não aparecem.
pub fn split_pages<R: BufRead>(reader: R, marker: PageMarker, tag_key: &str) -> Result<Vec<PageRows>> {
    let mut segmenter = PageSegmenter::new(marker);
    let mut pages: Vec<PageRows> = Vec::new();

    for line in reader.lines() {
        let line = line?;
        match Line::classify(&line) {
            Line::Blank => {}
            Line::Comment(comment) => {
                segmenter.observe_comment(comment);
            }
            Line::Data(cols) => {
                let Some(record) = TokenRecord::from_columns(&cols, tag_key) else {
                    continue;
                };
                if !record.id.is_word() {
                    continue;
                }
                let page = segmenter.page_for_data();
                match pages.last_mut() {
                    Some(current) if current.page == page => current.tokens.push(record),
                    _ => pages.push(PageRows {
                        page,
                        label: segmenter.label().map(str::to_string),
                        tokens: vec![record],
                    }),
                }
            }
        }
    }
    Ok(pages)
}

/// Troca caracteres proibidos em nomes de arquivo por `_`.
pub fn sanitize_file_name(name: &str) -> String {
    UNSAFE_FILE_CHARS.replace_all(name, "_").into_owned()
}

/// Nome do CSV de uma página: `<doc>-<page_id>.csv`.
pub fn page_file_name(document: &str, page: &PageRows) -> String {
    format!("{}-{}.csv", document, sanitize_file_name(&page.page_id()))
}

/// Escreve o CSV de uma página.
pub fn write_page_table<W: Write>(out: W, page: &PageRows, tag_key: &str) -> Result<()> {
    let mut feat_keys = BTreeSet::new();
    let mut misc_keys = BTreeSet::new();
    for token in &page.tokens {
        feat_keys.extend(token.feats.keys().map(String::as_str));
        misc_keys.extend(token.misc.keys().map(String::as_str).filter(|k| *k != tag_key));
    }

    let mut writer = csv::Writer::from_writer(out);
    let header: Vec<String> = BASE_COLUMNS
        .iter()
        .map(|c| c.to_string())
        .chain(feat_keys.iter().map(|k| format!("{FEATS_PREFIX}{k}")))
        .chain(misc_keys.iter().map(|k| format!("{MISC_PREFIX}{k}")))
        .collect();
    writer.write_record(&header)?;

    let page_id = page.page_id();
    for token in &page.tokens {
        let position = token.id.to_string();
        let mut row: Vec<&str> = vec![
            page_id.as_str(),
            token.form.as_str(),
            token.lemma.as_deref().unwrap_or("_"),
            position.as_str(),
            token.misc_value(tag_key).unwrap_or(""),
        ];
        row.extend(feat_keys.iter().map(|k| field(&token.feats, k)));
        row.extend(misc_keys.iter().map(|k| field(&token.misc, k)));
        writer.write_record(&row)?;
    }
    writer.flush()?;
    Ok(())
}

fn field<'a>(map: &'a BTreeMap<String, String>, key: &str) -> &'a str {
    map.get(key).map(String::as_str).unwrap_or("")
}

/// Escreve um CSV por página em `dir`. Devolve os caminhos criados.
pub fn write_page_tables(dir: &Path, document: &str, pages: &[PageRows], tag_key: &str) -> Result<Vec<PathBuf>> {
    let mut written = Vec::with_capacity(pages.len());
    for page in pages.iter().filter(|p| !p.tokens.is_empty()) {
        let path = dir.join(page_file_name(document, page));
        let file = std::fs::File::create(&path).map_err(|e| Error::io(&path, e))?;
        write_page_table(std::io::BufWriter::new(file), page, tag_key)?;
        written.push(path);
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const MERGED: &str = "# newdoc id = kniha:7\n# sent_id = 1\n\
1\tPraha\tPraha\tPROPN\t_\tGender=Fem\t0\troot\t_\tNER=B-gu\n\
2-3\tdo\t_\t_\t_\t_\t_\t_\t_\t_\n\
2\tje\tbýt\tAUX\t_\tMood=Ind\t1\tcop\t_\tSpaceAfter=No|NER=O\n\
3\tkrátký\n\
# newdoc\n# sent_id = 1\n\
1\tBrno\tBrno\tPROPN\t_\t_\t0\troot\t_\tNER=B-P|B-gu\n";

    #[test]
    fn test_split_pages_newdoc() {
        let pages = split_pages(Cursor::new(MERGED), PageMarker::NewDoc, "NER").unwrap();
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].label.as_deref(), Some("kniha:7"));
        assert_eq!(pages[0].tokens.len(), 2);
        assert_eq!(pages[1].page, 2);
        assert_eq!(pages[1].page_id(), "2");
        assert_eq!(pages[1].tokens[0].misc_value("NER"), Some("B-P|B-gu"));
    }

    #[test]
    fn test_split_pages_sentence_reset() {
        let pages = split_pages(Cursor::new(MERGED), PageMarker::SentenceReset, "NER").unwrap();
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].label, None);
        assert_eq!(pages[0].page_id(), "1");
    }

    #[test]
    fn test_file_name_is_sanitized() {
        let pages = split_pages(Cursor::new(MERGED), PageMarker::NewDoc, "NER").unwrap();
        assert_eq!(page_file_name("doc", &pages[0]), "doc-kniha_7.csv");
        assert_eq!(sanitize_file_name(r#"a/b\c*d?e"f<g>h|i"#), "a_b_c_d_e_f_g_h_i");
    }

    #[test]
    fn test_page_table_columns() {
        let pages = split_pages(Cursor::new(MERGED), PageMarker::NewDoc, "NER").unwrap();
        let mut out = Vec::new();
        write_page_table(&mut out, &pages[0], "NER").unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines[0],
            "page_id,token,lemma,position,nameTag,udpipe.feats.Gender,udpipe.feats.Mood,udpipe.misc.SpaceAfter"
        );
        assert_eq!(lines[1], "kniha:7,Praha,Praha,1,B-gu,Fem,,");
        assert_eq!(lines[2], "kniha:7,je,být,2,O,,Ind,No");
    }

    #[test]
    fn test_write_page_tables_creates_files() {
        let dir = tempfile::tempdir().unwrap();
        let pages = split_pages(Cursor::new(MERGED), PageMarker::SentenceReset, "NER").unwrap();
        let written = write_page_tables(dir.path(), "doc", &pages, "NER").unwrap();
        assert_eq!(written.len(), 2);
        assert!(dir.path().join("doc-1.csv").exists());
        assert!(dir.path().join("doc-2.csv").exists());
    }
}

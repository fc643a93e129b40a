//! # Divisão da Resposta do NameTag em Páginas
//!
//! O serviço de tagging recebe o documento inteiro e devolve sentenças, sem
//! noção de página. Para reconstruir `<base>-<página>.tsv`, as sentenças são
//! casadas, pela ordem dos `# sent_id`, com as páginas do CoNLL-U original.
//! Sentenças excedentes (resposta mais longa que o mapa) vão para a última
//! página conhecida.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::page::{sentence_pages, PageMarker};
use crate::span::{EntitySpan, SpanDecoder};
use crate::tag_stream::{read_tag_sentences, TagRecord};
use crate::tagger::ne_suffix;

/// Tokens tagueados de uma página.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagPage {
    pub page: usize,
    pub records: Vec<TagRecord>,
}

impl TagPage {
    /// Decodifica as entidades da página.
    pub fn entities(&self) -> Vec<EntitySpan> {
        let mut decoder = SpanDecoder::new();
        for record in &self.records {
            decoder.push_raw(self.page, &record.text, &record.raw_tag);
        }
        decoder.finish()
    }
}

/// Distribui as sentenças de `tagged` pelas páginas de `conllu`.
pub fn split_tags_by_page(conllu: &str, tagged: &str, marker: PageMarker) -> Result<Vec<TagPage>> {
    let map = sentence_pages(conllu, marker);
    let last = map.last().copied().unwrap_or(1);

    let sentences = read_tag_sentences(tagged.as_bytes())?;
    if !map.is_empty() && sentences.len() > map.len() {
        debug!(
            "{} sentenças tagueadas para {} no CoNLL-U; excedentes vão para a página {}",
            sentences.len(),
            map.len(),
            last
        );
    }

    let mut pages: BTreeMap<usize, Vec<TagRecord>> = BTreeMap::new();
    for (i, sentence) in sentences.into_iter().enumerate() {
        let page = map.get(i).copied().unwrap_or(last);
        pages.entry(page).or_default().extend(sentence);
    }

    Ok(pages
        .into_iter()
        .map(|(page, records)| TagPage { page, records })
        .collect())
}

/// TSV de tokens: `Word\tTag\tNE`.
pub fn write_tag_page<W: Write>(mut out: W, page: &TagPage) -> Result<()> {
    writeln!(out, "Word\tTag\tNE")?;
    for record in &page.records {
        writeln!(out, "{}\t{}\t{}", record.text, record.raw_tag, ne_suffix(&record.raw_tag))?;
    }
    out.flush()?;
    Ok(())
}

/// TSV de entidades: `Entity\tType`, com o tipo canônico.
pub fn write_entity_page<W: Write>(mut out: W, page: &TagPage) -> Result<()> {
    writeln!(out, "Entity\tType")?;
    for span in page.entities() {
        writeln!(out, "{}\t{}", span.text, span.type_name())?;
    }
    out.flush()?;
    Ok(())
}

/// Escreve `<base>-<página>.tsv` para cada página em `dir`.
///
/// Com `entities = true`, cada arquivo lista as entidades decodificadas em
/// vez dos tokens.
pub fn write_tag_pages(dir: &Path, base: &str, pages: &[TagPage], entities: bool) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir).map_err(|e| Error::io(dir, e))?;
    let mut written = Vec::with_capacity(pages.len());
    for page in pages {
        let path = dir.join(format!("{}-{}.tsv", base, page.page));
        let file = std::fs::File::create(&path).map_err(|e| Error::io(&path, e))?;
        let out = std::io::BufWriter::new(file);
        if entities {
            write_entity_page(out, page)?;
        } else {
            write_tag_page(out, page)?;
        }
        written.push(path);
    }
    Ok(written)
}

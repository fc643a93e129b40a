//! # Alinhamento e Fusão UDPipe + NameTag
//!
//! Percorre o fluxo CoNLL-U (primário) e o fluxo de tags (secundário) em
//! passo síncrono, por posição:
//!
//! 1. Comentários, linhas vazias e artefatos (`1-2`, `3.1`) são repassados
//!    intactos e **não** consomem o cursor.
//! 2. Cada token verdadeiro consome um elemento do fluxo de tags e recebe
//!    `NER=<tag crua>` na coluna MISC.
//! 3. Se o fluxo de tags acabar antes, as linhas restantes saem sem alteração.
//!    Não é erro: é um caso degenerado esperado.
//!
//! Divergência de texto entre os dois fluxos (tokenizações diferentes) não
//! interrompe a fusão, mas é reportada via `tracing`, porque corrompe todas
//! as anotações seguintes daquele documento.

use std::io::{BufRead, Write};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::conllu::{is_true_token_id, CONLLU_COLUMNS, EMPTY_FIELD, MISC_COLUMN};
use crate::error::Result;
use crate::tag_stream::TagRecord;

/// Chave padrão do atributo injetado.
pub const DEFAULT_MERGE_KEY: &str = "NER";

/// Contadores de uma fusão.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeStats {
    /// Linhas de token verdadeiro vistas no fluxo primário
    pub true_tokens: usize,
    /// Tokens que receberam a tag
    pub augmented: usize,
    /// Tokens repassados sem tag (fluxo de tags esgotado)
    pub unaugmented: usize,
    /// Comentários, vazios e artefatos repassados
    pub passthrough: usize,
    /// Posições onde o texto do token diverge do texto da tag
    pub mismatches: usize,
    /// Posição (cursor) da primeira divergência
    pub first_mismatch: Option<usize>,
    /// Tags que sobraram no fluxo secundário
    pub unused_tags: usize,
}

impl MergeStats {
    pub fn is_aligned(&self) -> bool {
        self.mismatches == 0 && self.unaugmented == 0 && self.unused_tags == 0
    }
}

/// Fusor configurável pela chave do atributo.
#[derive(Debug, Clone)]
pub struct StreamMerger {
    key: String,
}

impl Default for StreamMerger {
    fn default() -> Self {
        Self::new(DEFAULT_MERGE_KEY)
    }
}

impl StreamMerger {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }

    /// Funde `primary` com `tags`, escrevendo o resultado em `out`.
    ///
    /// `document` só é usado nas mensagens de diagnóstico.
    pub fn merge<R: BufRead, W: Write>(
        &self,
        mut primary: R,
        tags: &[TagRecord],
        mut out: W,
        document: &str,
    ) -> Result<MergeStats> {
        let mut stats = MergeStats::default();
        let mut cursor = 0usize;
        let mut line = String::new();

        loop {
            line.clear();
            if primary.read_line(&mut line)? == 0 {
                break;
            }

            let stripped = line.trim();
            if stripped.is_empty() || stripped.starts_with('#') {
                stats.passthrough += 1;
                out.write_all(line.as_bytes())?;
                continue;
            }

            let mut cols: Vec<&str> = stripped.split('\t').collect();
            if cols.len() < 2 || !is_true_token_id(cols[0]) {
                stats.passthrough += 1;
                out.write_all(line.as_bytes())?;
                continue;
            }

            stats.true_tokens += 1;
            let Some(tag) = tags.get(cursor) else {
                stats.unaugmented += 1;
                out.write_all(line.as_bytes())?;
                continue;
            };

            if cols[1] != tag.text {
                stats.mismatches += 1;
                if stats.first_mismatch.is_none() {
                    stats.first_mismatch = Some(cursor);
                    warn!(
                        "Divergência de token em {}: CoNLL-U '{}' vs TSV '{}' (posição {})",
                        document, cols[1], tag.text, cursor
                    );
                } else {
                    debug!(
                        "Divergência de token em {}: '{}' vs '{}' (posição {})",
                        document, cols[1], tag.text, cursor
                    );
                }
            }

            let attr = format!("{}={}", self.key, tag.raw_tag);
            let misc = augment_misc(cols.get(MISC_COLUMN).copied(), &attr);
            pad_columns(&mut cols);
            let mut fields: Vec<&str> = cols;
            fields.truncate(MISC_COLUMN);
            fields.push(&misc);
            // colunas além da MISC (linhas fora do padrão) são preservadas
            let tail: Vec<&str> = stripped.split('\t').skip(CONLLU_COLUMNS).collect();
            fields.extend(tail);

            out.write_all(fields.join("\t").as_bytes())?;
            out.write_all(b"\n")?;
            stats.augmented += 1;
            cursor += 1;
        }

        stats.unused_tags = tags.len().saturating_sub(cursor);
        if stats.mismatches > 0 {
            warn!(
                "{}: {} divergências de token (primeira na posição {})",
                document,
                stats.mismatches,
                stats.first_mismatch.unwrap_or_default()
            );
        }
        if stats.unaugmented > 0 {
            debug!("{}: fluxo de tags esgotado, {} tokens sem tag", document, stats.unaugmented);
        }
        if stats.unused_tags > 0 {
            debug!("{}: {} tags sem token correspondente", document, stats.unused_tags);
        }
        out.flush()?;
        Ok(stats)
    }

    /// Conveniência para fundir strings em memória.
    pub fn merge_str(&self, primary: &str, tags: &[TagRecord], document: &str) -> Result<(String, MergeStats)> {
        let mut out = Vec::new();
        let stats = self.merge(primary.as_bytes(), tags, &mut out, document)?;
        Ok((String::from_utf8_lossy(&out).into_owned(), stats))
    }
}

/// Acrescenta `attr` (`CHAVE=valor`) à coluna MISC existente.
///
/// `_` ou ausente → o atributo vira o conteúdo; caso contrário é anexado com `|`.
pub fn augment_misc(existing: Option<&str>, attr: &str) -> String {
    match existing {
        None | Some("") | Some(EMPTY_FIELD) => attr.to_string(),
        Some(misc) => format!("{misc}|{attr}"),
    }
}

/// Completa linhas malformadas com `_` até a coluna anterior à MISC.
fn pad_columns(cols: &mut Vec<&str>) {
    while cols.len() < MISC_COLUMN {
        cols.push(EMPTY_FIELD);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(pairs: &[(&str, &str)]) -> Vec<TagRecord> {
        pairs.iter().map(|(t, g)| TagRecord::new(*t, *g)).collect()
    }

    const DOC: &str = "# newdoc id = strana-1\n# sent_id = 1\n# text = Praha je hlavní město\n\
1\tPraha\tPraha\tPROPN\t_\t_\t0\troot\t_\t_\n\
2\tje\tbýt\tAUX\t_\t_\t1\tcop\t_\t_\n\
3\thlavní\thlavní\tADJ\t_\t_\t4\tamod\t_\t_\n\
4\tměsto\tměsto\tNOUN\t_\t_\t1\tnsubj\t_\tSpaceAfter=No\n\n";

    #[test]
    fn test_merge_injects_raw_tags() {
        let merger = StreamMerger::default();
        let (out, stats) = merger
            .merge_str(DOC, &tags(&[("Praha", "B-gu"), ("je", "O"), ("hlavní", "O"), ("město", "O")]), "doc")
            .unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "# newdoc id = strana-1");
        assert!(lines[3].ends_with("\t_\tNER=B-gu"));
        assert!(lines[6].ends_with("\tSpaceAfter=No|NER=O"));
        assert_eq!(lines.len(), 8);
        assert_eq!(stats.augmented, 4);
        assert_eq!(stats.passthrough, 4);
        assert!(stats.is_aligned());
    }

    #[test]
    fn test_merge_keeps_multi_layer_tag_verbatim() {
        let merger = StreamMerger::default();
        let (out, _) = merger
            .merge_str("1\tJan\tJan\tPROPN\t_\t_\t0\troot\t_\t_\n", &tags(&[("Jan", "B-P|B-pf")]), "doc")
            .unwrap();
        assert_eq!(out, "1\tJan\tJan\tPROPN\t_\t_\t0\troot\t_\tNER=B-P|B-pf\n");
    }

    #[test]
    fn test_multiword_tokens_do_not_consume_cursor() {
        let input = "1-2\tdo\t_\t_\t_\t_\t_\t_\t_\t_\n\
1\tdo\tdo\tADP\t_\t_\t2\tcase\t_\t_\n\
2\tPrahy\tPraha\tPROPN\t_\t_\t0\troot\t_\t_\n\
2.1\tx\t_\t_\t_\t_\t_\t_\t_\t_\n";
        let (out, stats) = StreamMerger::default()
            .merge_str(input, &tags(&[("do", "O"), ("Prahy", "B-gu")]), "doc")
            .unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert!(lines[0].ends_with("\t_"));
        assert!(lines[2].ends_with("NER=B-gu"));
        assert!(!lines[3].contains("NER="));
        assert_eq!(stats.augmented, 2);
        assert_eq!(stats.passthrough, 2);
    }

    #[test]
    fn test_short_tag_stream_passes_through() {
        let (out, stats) = StreamMerger::default()
            .merge_str(DOC, &tags(&[("Praha", "B-gu"), ("je", "O")]), "doc")
            .unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert!(lines[4].ends_with("NER=O"));
        assert!(!lines[5].contains("NER="));
        assert!(lines[6].ends_with("\tSpaceAfter=No"));
        assert_eq!(stats.unaugmented, 2);
        assert_eq!(stats.augmented, 2);
    }

    #[test]
    fn test_long_tag_stream_counts_unused() {
        let (_, stats) = StreamMerger::default()
            .merge_str(
                "1\ta\ta\tX\t_\t_\t0\troot\t_\t_\n",
                &tags(&[("a", "O"), ("b", "O"), ("c", "O")]),
                "doc",
            )
            .unwrap();
        assert_eq!(stats.unused_tags, 2);
    }

    #[test]
    fn test_mismatch_is_reported_not_fatal() {
        let (out, stats) = StreamMerger::default()
            .merge_str(DOC, &tags(&[("Praha", "B-gu"), ("jest", "O"), ("hlavní", "O"), ("město", "O")]), "doc")
            .unwrap();
        assert_eq!(stats.mismatches, 1);
        assert_eq!(stats.first_mismatch, Some(1));
        assert_eq!(out.matches("NER=").count(), 4);
    }

    #[test]
    fn test_short_columns_are_padded() {
        let (out, _) = StreamMerger::default()
            .merge_str("1\tPraha\n", &tags(&[("Praha", "B-gu")]), "doc")
            .unwrap();
        assert_eq!(out, "1\tPraha\t_\t_\t_\t_\t_\t_\t_\tNER=B-gu\n");
    }

    #[test]
    fn test_custom_key() {
        let (out, _) = StreamMerger::new("NE")
            .merge_str("1\tPraha\tPraha\tPROPN\t_\t_\t0\troot\t_\t_\n", &tags(&[("Praha", "B-gu")]), "doc")
            .unwrap();
        assert!(out.trim_end().ends_with("NE=B-gu"));
    }

    #[test]
    fn test_augment_misc() {
        assert_eq!(augment_misc(None, "NER=O"), "NER=O");
        assert_eq!(augment_misc(Some("_"), "NER=O"), "NER=O");
        assert_eq!(augment_misc(Some("SpaceAfter=No"), "NER=O"), "SpaceAfter=No|NER=O");
    }
}

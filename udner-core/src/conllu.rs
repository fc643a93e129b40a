//! # Leitor de Registros CoNLL-U (UDPipe)
//!
//! O UDPipe produz um arquivo orientado a linhas com 10 colunas separadas por tab:
//!
//! ```text
//! ID  FORM  LEMMA  UPOS  XPOS  FEATS  HEAD  DEPREL  DEPS  MISC
//! ```
//!
//! - Linhas `#` são comentários (`# newdoc`, `# sent_id = 3`, `# text = ...`).
//! - Linhas vazias separam sentenças.
//! - IDs inteiros são tokens verdadeiros; `1-2` (multipalavra) e `3.1` (nó vazio)
//!   são artefatos de agrupamento e não contam para o alinhamento.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Índice da coluna MISC (atributos extensíveis).
pub const MISC_COLUMN: usize = 9;
/// Número de colunas de uma linha CoNLL-U completa.
pub const CONLLU_COLUMNS: usize = 10;
/// Marcador de campo vazio.
pub const EMPTY_FIELD: &str = "_";

/// Identificador posicional da primeira coluna.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenId {
    /// Token verdadeiro (`7`).
    Word(usize),
    /// Token multipalavra (`7-8`).
    Range(String),
    /// Nó vazio ou sub-numeração (`7.1`).
    Empty(String),
}

impl TokenId {
    /// Classifica o identificador. IDs com `-` ou `.` são artefatos;
    /// qualquer outro texto que não seja inteiro também é tratado como artefato.
    pub fn parse(raw: &str) -> Self {
        if raw.contains('-') {
            TokenId::Range(raw.to_string())
        } else if raw.contains('.') {
            TokenId::Empty(raw.to_string())
        } else {
            match raw.parse::<usize>() {
                Ok(n) => TokenId::Word(n),
                Err(_) => TokenId::Empty(raw.to_string()),
            }
        }
    }

    pub fn is_word(&self) -> bool {
        matches!(self, TokenId::Word(_))
    }
}

impl std::fmt::Display for TokenId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenId::Word(n) => write!(f, "{n}"),
            TokenId::Range(s) | TokenId::Empty(s) => f.write_str(s),
        }
    }
}

/// Verifica se o campo de ID denota um token verdadeiro para fins de alinhamento.
///
/// Segue a regra do fluxo primário: sem `-` nem `.`.
pub fn is_true_token_id(raw: &str) -> bool {
    !raw.contains('-') && !raw.contains('.')
}

/// Comentário: começa com `#` e não tem tabulação.
///
/// `#` seguido de tabulação é um token `#` (texto OCR), não um comentário.
pub fn is_comment(line: &str) -> bool {
    line.trim_start().starts_with('#') && !line.contains('\t')
}

/// Classificação de uma linha do fluxo estrutural.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line<'a> {
    /// Linha vazia (separador de sentença).
    Blank,
    /// Comentário, já sem espaços nas bordas.
    Comment(&'a str),
    /// Linha de dados dividida em colunas.
    Data(Vec<&'a str>),
}

impl<'a> Line<'a> {
    pub fn classify(line: &'a str) -> Self {
        let stripped = line.trim();
        if stripped.is_empty() {
            Line::Blank
        } else if is_comment(line) {
            Line::Comment(stripped)
        } else {
            Line::Data(stripped.split('\t').collect())
        }
    }
}

/// Um registro de token do UDPipe. Imutável depois de lido.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
    pub id: TokenId,
    pub form: String,
    pub lemma: Option<String>,
    pub upos: Option<String>,
    /// Traços morfológicos (FEATS), chaves únicas
    pub feats: BTreeMap<String, String>,
    /// Atributos diversos (MISC)
    pub misc: BTreeMap<String, String>,
}

impl TokenRecord {
    /// Lê uma linha de dados com as 10 colunas. Linhas incompletas devolvem `None`.
    ///
    /// `tag_key` é a chave cujo valor pode conter camadas extras separadas por `|`
    /// (ver [`parse_misc`]).
    pub fn from_columns(cols: &[&str], tag_key: &str) -> Option<Self> {
        if cols.len() < CONLLU_COLUMNS {
            return None;
        }
        Some(Self {
            id: TokenId::parse(cols[0]),
            form: cols[1].to_string(),
            lemma: optional_field(cols[2]),
            upos: optional_field(cols[3]),
            feats: parse_features(cols[5]),
            misc: parse_misc(cols[MISC_COLUMN], tag_key),
        })
    }

    /// Valor de um atributo MISC (ex: `"NER"`).
    pub fn misc_value(&self, key: &str) -> Option<&str> {
        self.misc.get(key).map(String::as_str)
    }
}

fn optional_field(raw: &str) -> Option<String> {
    (!raw.is_empty() && raw != EMPTY_FIELD).then(|| raw.to_string())
}

/// Lê a coluna FEATS (`Case=Nom|Gender=Masc`). Itens sem `=` são ignorados.
pub fn parse_features(raw: &str) -> BTreeMap<String, String> {
    if raw.is_empty() || raw == EMPTY_FIELD {
        return BTreeMap::new();
    }
    raw.split('|')
        .filter_map(|item| item.split_once('='))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Lê a coluna MISC (`SpaceAfter=No|NER=B-gu`).
///
/// - Itens `k=v` viram entradas do mapa.
/// - Itens nus viram flags com valor `Yes`...
/// - ...exceto quando seguem diretamente `tag_key`: nesse caso são camadas
///   extras da tag (`NER=B-P|B-pf` continua sendo `"B-P|B-pf"`).
pub fn parse_misc(raw: &str, tag_key: &str) -> BTreeMap<String, String> {
    let mut misc = BTreeMap::new();
    if raw.is_empty() || raw == EMPTY_FIELD {
        return misc;
    }

    let mut continuing_tag = false;
    for item in raw.split('|') {
        match item.split_once('=') {
            Some((k, v)) => {
                continuing_tag = k == tag_key;
                misc.insert(k.to_string(), v.to_string());
            }
            None if continuing_tag => {
                if let Some(value) = misc.get_mut(tag_key) {
                    value.push('|');
                    value.push_str(item);
                }
            }
            None => {
                misc.insert(item.to_string(), "Yes".to_string());
            }
        }
    }
    misc
}

#[cfg(test)]
mod tests {
    use super::*;

    const LINE: &str = "1\tPraha\tPraha\tPROPN\tNNFS1-----A----\tGender=Fem|Number=Sing\t0\troot\t_\tSpaceAfter=No|NER=B-gu";

    #[test]
    fn test_token_id_classification() {
        assert_eq!(TokenId::parse("7"), TokenId::Word(7));
        assert_eq!(TokenId::parse("7-8"), TokenId::Range("7-8".into()));
        assert_eq!(TokenId::parse("7.1"), TokenId::Empty("7.1".into()));
        assert!(!TokenId::parse("x").is_word());
        assert!(is_true_token_id("12"));
        assert!(!is_true_token_id("1-2"));
        assert!(!is_true_token_id("3.1"));
    }

    #[test]
    fn test_line_classification() {
        assert_eq!(Line::classify("\n"), Line::Blank);
        assert_eq!(Line::classify("# sent_id = 1\n"), Line::Comment("# sent_id = 1"));
        assert_eq!(Line::classify("#\tO\n"), Line::Data(vec!["#", "O"]));
        match Line::classify(LINE) {
            Line::Data(cols) => assert_eq!(cols.len(), 10),
            other => panic!("esperava dados, veio {other:?}"),
        }
    }

    #[test]
    fn test_record_from_columns() {
        let cols: Vec<&str> = LINE.split('\t').collect();
        let rec = TokenRecord::from_columns(&cols, "NER").unwrap();
        assert_eq!(rec.id, TokenId::Word(1));
        assert_eq!(rec.form, "Praha");
        assert_eq!(rec.lemma.as_deref(), Some("Praha"));
        assert_eq!(rec.feats.get("Gender").map(String::as_str), Some("Fem"));
        assert_eq!(rec.misc_value("NER"), Some("B-gu"));
        assert_eq!(rec.misc_value("SpaceAfter"), Some("No"));
    }

    #[test]
    fn test_short_line_is_rejected() {
        assert!(TokenRecord::from_columns(&["1", "Praha"], "NER").is_none());
    }

    #[test]
    fn test_empty_lemma_is_none() {
        let cols = ["2", "je", "_", "AUX", "_", "_", "1", "cop", "_", "_"];
        let rec = TokenRecord::from_columns(&cols, "NER").unwrap();
        assert_eq!(rec.lemma, None);
        assert!(rec.feats.is_empty());
        assert!(rec.misc.is_empty());
    }

    #[test]
    fn test_parse_misc_flags_and_layers() {
        let misc = parse_misc("NER=B-P|B-pf|SpaceAfter=No|Flag", "NER");
        assert_eq!(misc.get("NER").map(String::as_str), Some("B-P|B-pf"));
        assert_eq!(misc.get("SpaceAfter").map(String::as_str), Some("No"));
        assert_eq!(misc.get("Flag").map(String::as_str), Some("Yes"));
    }

    #[test]
    fn test_parse_features_ignores_bare_items() {
        let feats = parse_features("Case=Nom|weird|Number=Plur");
        assert_eq!(feats.len(), 2);
        assert!(parse_features("_").is_empty());
    }
}

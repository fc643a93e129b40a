//! # Esquema de Tags BIO do NameTag
//!
//! O NameTag devolve, para cada token, uma tag no esquema **BIO**:
//!
//! - `B-XX`: Begin — primeiro token de uma entidade do tipo `XX`
//! - `I-XX`: Inside — tokens subsequentes da mesma entidade
//! - `O`: Outside — não é parte de nenhuma entidade
//!
//! ## Tags multi-camada
//!
//! Entidades aninhadas chegam como várias camadas separadas por `|`
//! (ex: `B-P|B-pf` = "nome de pessoa complexo" contendo "primeiro nome").
//! Apenas a **primeira camada** é autoritativa; as demais são ignoradas.
//!
//! ## Tags embutidas em atributos
//!
//! Depois da fusão, a tag vive na coluna MISC do CoNLL-U como
//! `SpaceAfter=No|NER=B-gu`. [`Tag::parse`] reconhece esse formato `chave=valor`
//! e extrai o valor das chaves `NER` ou `NE`.

use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use crate::tagset::canonical_type;

/// Chaves de atributo que carregam a tag NER dentro de uma lista `k=v`.
pub const TAG_FEATURE_KEYS: [&str; 2] = ["NER", "NE"];

/// Tag BIO reduzida, com o código de tipo ainda cru (ex: `"gu"`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Tag {
    /// **Begin**: abre uma entidade. O código pode ser vazio (`"B-"`).
    Begin(String),
    /// **Inside**: continua a entidade aberta.
    Inside(String),
    /// **Outside**: fora de entidade. Também cobre `_` e tags ausentes.
    Outside,
    /// Tag não vazia sem prefixo `B-`/`I-` reconhecível (ex: `"X"`).
    Malformed(String),
}

impl Tag {
    /// Reduz uma tag crua a uma das formas {B, I, O}.
    ///
    /// # Exemplo
    /// `"B-P|B-pf"` → `Begin("P")`, `"SpaceAfter=No|NER=I-gu"` → `Inside("gu")`
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        let value = if raw.contains('=') {
            match tag_from_features(raw) {
                Some(v) => v,
                None => return Tag::Outside,
            }
        } else {
            raw
        };

        let primary = primary_layer(value);
        match primary {
            "" | "O" | "_" => Tag::Outside,
            _ => {
                if let Some(code) = primary.strip_prefix("B-") {
                    Tag::Begin(code.to_string())
                } else if let Some(code) = primary.strip_prefix("I-") {
                    Tag::Inside(code.to_string())
                } else {
                    Tag::Malformed(primary.to_string())
                }
            }
        }
    }

    /// Representação textual (ex: "B-gu", "I-ps", "O")
    pub fn label(&self) -> String {
        match self {
            Tag::Begin(code) => format!("B-{code}"),
            Tag::Inside(code) => format!("I-{code}"),
            Tag::Outside => "O".to_string(),
            Tag::Malformed(raw) => raw.clone(),
        }
    }

    /// Código curto do tipo, se a tag for B- ou I-.
    pub fn code(&self) -> Option<&str> {
        match self {
            Tag::Begin(code) | Tag::Inside(code) => Some(code),
            _ => None,
        }
    }

    /// Categoria canônica do tipo (já normalizada pela tabela CNEC).
    pub fn canonical_type(&self) -> Option<Cow<'static, str>> {
        self.code().map(canonical_type)
    }

    pub fn is_outside(&self) -> bool {
        matches!(self, Tag::Outside)
    }
}

impl std::fmt::Display for Tag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Primeira camada de uma tag multi-camada (`"B-P|B-pf"` → `"B-P"`).
pub fn primary_layer(raw: &str) -> &str {
    raw.split('|').next().unwrap_or("").trim()
}

/// Extrai o valor de `NER=`/`NE=` de uma lista de atributos `k=v|k=v`.
///
/// Itens sem `=` não têm chave; como a lista é separada pelo mesmo `|` das
/// camadas, um item nu logo após `NER=` é uma camada extra e é ignorado aqui.
pub fn tag_from_features(raw: &str) -> Option<&str> {
    raw.split('|').find_map(|item| {
        let (key, value) = item.split_once('=')?;
        TAG_FEATURE_KEYS
            .contains(&key.trim())
            .then_some(value.trim())
    })
}

/// Coluna "NE" do TSV por página: o sufixo de tipo de cada camada.
///
/// `"B-C|B-ic"` → `"C|ic"`, `"O"` → `""`, `"B-per|O"` → `"per|"`.
pub fn ne_suffix(raw: &str) -> String {
    if raw.is_empty() {
        return String::new();
    }
    raw.split('|')
        .map(|layer| {
            layer
                .strip_prefix("B-")
                .or_else(|| layer.strip_prefix("I-"))
                .unwrap_or("")
        })
        .collect::<Vec<_>>()
        .join("|")
}

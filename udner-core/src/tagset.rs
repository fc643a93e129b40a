//! # Tabela de Tipos CNEC 2.0
//!
//! O NameTag rotula entidades com códigos curtos da hierarquia do
//! *Czech Named Entity Corpus* 2.0 (`gu`, `ps`, `if`...). Este módulo traduz
//! esses códigos para categorias canônicas legíveis.
//!
//! | Código | Categoria canônica                |
//! |--------|-----------------------------------|
//! | gu     | Settlement name (City/Town)       |
//! | ps     | Surname                           |
//! | if     | Company/Firm                      |
//! | ty     | Year                              |
//!
//! A tabela é estática e imutável: construída uma única vez no primeiro uso
//! e compartilhada por todas as threads.

use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::LazyLock;

/// Código usado quando a tag não traz tipo (ex: `"B-"`).
pub const UNKNOWN_CODE: &str = "unk";

/// Pares (código, categoria canônica) da hierarquia CNEC 2.0.
const CNEC_TYPES: &[(&str, &str)] = &[
    // a: números, endereços, tempo
    ("a", "Address/Number/Time (General)"),
    ("A", "Complex Address/Number/Time"),
    ("ah", "Street address"),
    ("at", "Phone/Fax number"),
    ("az", "Zip code"),
    // g: nomes geográficos
    ("g", "Geographical name (General)"),
    ("G", "Geographical name (General)"),
    ("g_", "Geographical name (General)"),
    ("gu", "Settlement name (City/Town)"),
    ("gl", "Nature/Landscape name (Mountain/River)"),
    ("gq", "Urban geographical name (Street/Square)"),
    ("gr", "Territorial name (State/Region)"),
    ("gs", "Super-terrestrial name (Star/Planet)"),
    ("gc", "States/Provinces/Regions"),
    ("gt", "Continents"),
    ("gh", "Hydronym (Bodies of water)"),
    // i: instituições
    ("i", "Institution name (General)"),
    ("i_", "Institution name (General)"),
    ("I", "Institution name (General)"),
    ("ia", "Conference/Contest"),
    ("if", "Company/Firm"),
    ("io", "Organization/Society"),
    ("ic", "Cult/Educational institution"),
    // m: mídia
    ("m", "Media name (General)"),
    ("mn", "Periodical name (Newspaper/Magazine)"),
    ("ms", "Radio/TV station"),
    ("mi", "Internet links"),
    // o: artefatos
    ("o", "Artifact name (General)"),
    ("o_", "Artifact name (General)"),
    ("oa", "Cultural artifact (Book/Painting)"),
    ("oe", "Measure unit"),
    ("om", "Currency"),
    ("or", "Directives, norms"),
    ("op", "Product (General)"),
    // p: nomes de pessoas
    ("p", "Personal name (General)"),
    ("p_", "Personal name (General)"),
    ("P", "Complex personal names"),
    ("pf", "First name"),
    ("ps", "Surname"),
    ("pm", "Second name"),
    ("ph", "Nickname/Pseudonym"),
    ("pc", "Inhabitant name"),
    ("pd", "Academic titles"),
    ("pp", "Relig./myth persons"),
    ("me", "Email address"),
    // t: expressões de tempo
    ("t", "Time expression (General)"),
    ("T", "Complex time expressions"),
    ("td", "Day"),
    ("th", "Hour"),
    ("tm", "Month"),
    ("ty", "Year"),
    ("tf", "Holiday/Feast"),
    ("tt", "Time block"),
    // n: expressões numéricas
    ("n", "Number expression (General)"),
    ("N", "Complex number expressions"),
    ("n_", "Number expression (General)"),
    ("na", "Age"),
    ("nb", "Volu-metric number"),
    ("nc", "Cardinal number"),
    ("ni", "Itemizer (1.)"),
    ("no", "Ordinal number"),
    ("ns", "Sport score"),
    // fallback
    (UNKNOWN_CODE, "Unknown Type"),
    ("O", "None"),
    ("C", "Complex bibliographic expression"),
];

static TYPE_TABLE: LazyLock<HashMap<&'static str, &'static str>> =
    LazyLock::new(|| CNEC_TYPES.iter().copied().collect());

/// Resolve um código curto para sua categoria canônica.
///
/// - Código presente na tabela → nome canônico (sem alocação).
/// - Código vazio → tratado como `"unk"` → `"Unknown Type"`.
/// - Código desconhecido → `"Unknown Code (<código>)"`, preservando o original.
///
/// Função total: nunca falha e nunca devolve string vazia.
pub fn canonical_type(code: &str) -> Cow<'static, str> {
    let code = if code.is_empty() { UNKNOWN_CODE } else { code };
    match TYPE_TABLE.get(code) {
        Some(name) => Cow::Borrowed(name),
        None => Cow::Owned(format!("Unknown Code ({code})")),
    }
}

/// Verifica se um nome é uma categoria canônica da tabela ou um fallback sintetizado.
pub fn is_canonical(name: &str) -> bool {
    TYPE_TABLE.values().any(|v| *v == name)
        || (name.starts_with("Unknown Code (") && name.ends_with(')'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_known_codes() {
        assert_eq!(canonical_type("gu"), "Settlement name (City/Town)");
        assert_eq!(canonical_type("ps"), "Surname");
        assert_eq!(canonical_type("P"), "Complex personal names");
        assert_eq!(canonical_type("if"), "Company/Firm");
    }

    #[test]
    fn test_codes_are_case_sensitive() {
        assert_eq!(canonical_type("p"), "Personal name (General)");
        assert_eq!(canonical_type("PS"), "Unknown Code (PS)");
    }

    #[test]
    fn test_empty_code_is_unknown_type() {
        assert_eq!(canonical_type(""), "Unknown Type");
        assert_eq!(canonical_type(UNKNOWN_CODE), "Unknown Type");
    }

    #[test]
    fn test_unknown_code_preserves_original() {
        assert_eq!(canonical_type("zz"), "Unknown Code (zz)");
        assert!(is_canonical(&canonical_type("zz")));
    }

    #[test]
    fn test_table_codes_are_unique() {
        assert_eq!(TYPE_TABLE.len(), CNEC_TYPES.len());
    }

    proptest! {
        #[test]
        fn test_normalizer_is_total(code in ".*") {
            let name = canonical_type(&code);
            prop_assert!(!name.is_empty());
            prop_assert!(is_canonical(&name));
        }
    }
}

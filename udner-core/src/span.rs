//! # Decodificador BIO → Spans de Entidade
//!
//! Reconstrói entidades de múltiplos tokens a partir da sequência de tags BIO.
//! O estado é explícito ([`SpanState`]) e cada passo é uma função pura
//! ([`step`]), testável isoladamente.
//!
//! ## Transições
//!
//! | Estado   | Tag recebida      | Ação                                          |
//! |----------|-------------------|-----------------------------------------------|
//! | qualquer | `B-X`             | fecha o span aberto; abre novo com tipo X     |
//! | Idle     | malformada        | `B` implícito: abre span sem tipo             |
//! | Open     | malformada        | tratada como `O`                              |
//! | Open     | `I-Y`             | anexa o token; o tipo do `B` prevalece        |
//! | Idle     | `I-Y`             | tratada como `O` (um `I` não abre span)       |
//! | qualquer | `O`               | fecha o span aberto                           |
//!
//! Spans nunca cruzam páginas: se o token chega numa página diferente da do
//! span aberto, o span é fechado antes de a tag ser aplicada.

use serde::{Deserialize, Serialize};

use crate::tagger::Tag;

/// Uma entidade reconstruída: tokens contíguos unidos por espaço simples.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntitySpan {
    /// Texto da entidade (ex: "Jan Novák")
    pub text: String,
    /// Categoria canônica; `None` para spans abertos por tag malformada
    pub entity_type: Option<String>,
    /// Página (base 1) onde o span está
    pub page: usize,
    /// Índice do primeiro token no fluxo decodificado
    pub start_token: usize,
    /// Índice do último token (inclusivo)
    pub end_token: usize,
}

impl EntitySpan {
    /// Número de tokens do span.
    pub fn token_count(&self) -> usize {
        self.end_token - self.start_token + 1
    }

    /// Tipo como texto, vazio quando ausente.
    pub fn type_name(&self) -> &str {
        self.entity_type.as_deref().unwrap_or("")
    }
}

/// Estado do decodificador.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SpanState {
    /// Nenhum span aberto.
    #[default]
    Idle,
    /// Span em construção.
    Open {
        tokens: Vec<String>,
        entity_type: Option<String>,
        page: usize,
        start_token: usize,
    },
}

impl SpanState {
    /// Fecha o estado, devolvendo o span se houver um aberto.
    pub fn close(self) -> Option<EntitySpan> {
        match self {
            SpanState::Idle => None,
            SpanState::Open {
                tokens,
                entity_type,
                page,
                start_token,
            } => Some(EntitySpan {
                end_token: start_token + tokens.len() - 1,
                text: tokens.join(" "),
                entity_type,
                page,
                start_token,
            }),
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self, SpanState::Open { .. })
    }
}

/// Uma transição do autômato: aplica `(token, tag)` ao estado atual.
///
/// Devolve o novo estado e os spans completados neste passo.
pub fn step(
    state: SpanState,
    index: usize,
    page: usize,
    token: &str,
    tag: &Tag,
) -> (SpanState, Vec<EntitySpan>) {
    let mut emitted = Vec::new();

    // Fronteira de página força o fechamento
    let state = match state {
        SpanState::Open { page: open_page, .. } if open_page != page => {
            emitted.extend(state.close());
            SpanState::Idle
        }
        other => other,
    };

    let open = |entity_type: Option<String>| SpanState::Open {
        tokens: vec![token.to_string()],
        entity_type,
        page,
        start_token: index,
    };

    let next = match (state, tag) {
        (state, Tag::Begin(_)) => {
            emitted.extend(state.close());
            open(tag.canonical_type().map(|t| t.into_owned()))
        }
        (SpanState::Idle, Tag::Malformed(_)) => open(None),
        (
            SpanState::Open {
                mut tokens,
                entity_type,
                page,
                start_token,
            },
            Tag::Inside(_),
        ) => {
            tokens.push(token.to_string());
            SpanState::Open {
                tokens,
                entity_type,
                page,
                start_token,
            }
        }
        (SpanState::Idle, Tag::Inside(_)) => SpanState::Idle,
        (state, Tag::Outside | Tag::Malformed(_)) => {
            emitted.extend(state.close());
            SpanState::Idle
        }
    };

    (next, emitted)
}

/// Decodificador incremental: acumula spans enquanto recebe tokens.
#[derive(Debug, Default)]
pub struct SpanDecoder {
    state: SpanState,
    spans: Vec<EntitySpan>,
    next_index: usize,
}

impl SpanDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Alimenta um token já com a tag reduzida.
    pub fn push(&mut self, page: usize, token: &str, tag: &Tag) {
        let state = std::mem::take(&mut self.state);
        let (next, emitted) = step(state, self.next_index, page, token, tag);
        self.state = next;
        self.spans.extend(emitted);
        self.next_index += 1;
    }

    /// Alimenta um token com a tag crua (multi-camada ou `k=v`).
    pub fn push_raw(&mut self, page: usize, token: &str, raw_tag: &str) {
        self.push(page, token, &Tag::parse(raw_tag));
    }

    /// Fecha o span aberto, se houver (ex: fim de sentença).
    pub fn flush(&mut self) {
        let state = std::mem::take(&mut self.state);
        self.spans.extend(state.close());
    }

    /// Quantidade de tokens recebidos até agora.
    pub fn tokens_seen(&self) -> usize {
        self.next_index
    }

    /// Encerra o fluxo e devolve os spans na ordem de encontro.
    pub fn finish(mut self) -> Vec<EntitySpan> {
        self.flush();
        self.spans
    }
}

/// Helper para decodificar pares (token, tag crua) de uma única página.
pub fn decode_spans(pairs: &[(&str, &str)]) -> Vec<EntitySpan> {
    let mut decoder = SpanDecoder::new();
    for (token, raw) in pairs {
        decoder.push_raw(1, token, raw);
    }
    decoder.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_single_entity() {
        let spans = decode_spans(&[("Praha", "B-gu"), ("je", "O"), ("hlavní", "O"), ("město", "O")]);
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].text, "Praha");
        assert_eq!(spans[0].type_name(), "Settlement name (City/Town)");
        assert_eq!((spans[0].start_token, spans[0].end_token), (0, 0));
    }

    #[test]
    fn test_inside_continues_span() {
        let spans = decode_spans(&[("Jan", "B-ps"), ("Novák", "I-ps"), ("přišel", "O")]);
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].text, "Jan Novák");
        assert_eq!(spans[0].token_count(), 2);
    }

    #[test]
    fn test_begin_after_begin_splits() {
        let spans = decode_spans(&[("Jan", "B-pf"), ("Novák", "B-ps")]);
        assert_eq!(spans.len(), 2);
        assert_eq!(spans[0].text, "Jan");
        assert_eq!(spans[1].text, "Novák");
    }

    #[test]
    fn test_begin_of_other_type_after_inside_starts_new_span() {
        let spans = decode_spans(&[("Jan", "B-ps"), ("Novák", "I-ps"), ("Praha", "B-gu")]);
        assert_eq!(spans.len(), 2);
        assert_eq!(spans[0].text, "Jan Novák");
        assert_eq!(spans[1].text, "Praha");
        assert_eq!(spans[1].type_name(), "Settlement name (City/Town)");
    }

    #[test]
    fn test_inside_type_mismatch_keeps_first_type() {
        let spans = decode_spans(&[("Karlova", "B-if"), ("univerzita", "I-ic")]);
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].text, "Karlova univerzita");
        assert_eq!(spans[0].type_name(), "Company/Firm");
    }

    #[test]
    fn test_orphan_inside_is_outside() {
        let spans = decode_spans(&[("a", "O"), ("Novák", "I-ps"), ("b", "O")]);
        assert!(spans.is_empty());
    }

    #[test]
    fn test_malformed_opens_untyped_span_when_idle() {
        let spans = decode_spans(&[("X", "weird"), ("Y", "I-ps")]);
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].text, "X Y");
        assert_eq!(spans[0].entity_type, None);
    }

    #[test]
    fn test_malformed_closes_open_span() {
        let spans = decode_spans(&[("Jan", "B-ps"), ("X", "weird"), ("Y", "I-ps")]);
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].text, "Jan");
    }

    #[test]
    fn test_end_of_stream_flushes() {
        let spans = decode_spans(&[("v", "O"), ("Brně", "B-gu")]);
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].text, "Brně");
    }

    #[test]
    fn test_multi_layer_tags_use_first_layer() {
        let spans = decode_spans(&[("Jan", "B-P|B-pf"), ("Novák", "I-P|B-ps")]);
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].text, "Jan Novák");
        assert_eq!(spans[0].type_name(), "Complex personal names");
    }

    #[test]
    fn test_page_change_flushes_span() {
        let mut decoder = SpanDecoder::new();
        decoder.push_raw(1, "Jan", "B-ps");
        decoder.push_raw(2, "Novák", "I-ps");
        decoder.push_raw(2, "Brno", "B-gu");
        let spans = decoder.finish();
        assert_eq!(spans.len(), 2);
        assert_eq!((spans[0].text.as_str(), spans[0].page), ("Jan", 1));
        assert_eq!((spans[1].text.as_str(), spans[1].page), ("Brno", 2));
    }

    #[test]
    fn test_step_is_pure() {
        let (state, emitted) = step(SpanState::Idle, 0, 1, "Praha", &Tag::Begin("gu".into()));
        assert!(state.is_open());
        assert!(emitted.is_empty());
        let (state, emitted) = step(state, 1, 1, "je", &Tag::Outside);
        assert_eq!(state, SpanState::Idle);
        assert_eq!(emitted.len(), 1);
    }

    fn tag_strategy() -> impl Strategy<Value = String> {
        prop_oneof![
            Just("O".to_string()),
            Just("_".to_string()),
            Just("B-".to_string()),
            Just("weird".to_string()),
            "[BI]-(gu|ps|pf|if|zz)",
            "[BI]-(P|T)\\|[BI]-(pf|td)",
        ]
    }

    proptest! {
        #[test]
        fn test_spans_are_disjoint_and_complete(
            input in prop::collection::vec(("[a-z]{1,6}", tag_strategy(), 1usize..4), 0..60)
        ) {
            // páginas monotônicas
            let mut page = 1;
            let mut pages = Vec::new();
            let mut decoder = SpanDecoder::new();
            for (token, raw, bump) in &input {
                if *bump == 3 {
                    page += 1;
                }
                pages.push(page);
                decoder.push_raw(page, token, raw);
            }
            let spans = decoder.finish();

            let mut covered = vec![false; input.len()];
            for span in &spans {
                prop_assert!(span.end_token < input.len());
                prop_assert_eq!(span.text.split(' ').count(), span.token_count());
                for i in span.start_token..=span.end_token {
                    prop_assert!(!covered[i], "token {} em dois spans", i);
                    covered[i] = true;
                    prop_assert_eq!(pages[i], span.page);
                }
            }
            let in_spans: usize = spans.iter().map(EntitySpan::token_count).sum();
            let outside = covered.iter().filter(|c| !**c).count();
            prop_assert_eq!(in_spans + outside, input.len());

            // todo B abre um span
            for (i, (_, raw, _)) in input.iter().enumerate() {
                if matches!(Tag::parse(raw), Tag::Begin(_)) {
                    prop_assert!(spans.iter().any(|s| s.start_token == i));
                }
            }
        }
    }
}

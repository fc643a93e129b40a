//! # Segmentação em Páginas
//!
//! Os documentos chegam como um único fluxo CoNLL-U, mas cada página OCR
//! original precisa ser recuperada. As fronteiras **não** são explícitas por
//! registro: são inferidas de comentários, e cada versão da ferramenta a
//! montante usa uma convenção diferente:
//!
//! - [`PageMarker::NewDoc`]: cada página começa com `# newdoc` (opcionalmente
//!   `# newdoc id = <rótulo>`).
//! - [`PageMarker::SentenceReset`]: a numeração de sentenças recomeça em
//!   `# sent_id = 1` a cada página.
//!
//! As duas estratégias são mantidas separadas: um corpus pode carregar só um
//! tipo de marcador, e aplicar a regra errada colapsaria tudo numa página.
//!
//! Dados antes de qualquer marcador pertencem à página 1 (nunca 0), e o
//! contador de página nunca retrocede.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

static NEWDOC_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^#\s*newdoc\b(?:.*?\bid\s*=\s*(.*))?$").expect("regex newdoc"));

static SENT_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^#\s*sent_id\s*=\s*(.*)$").expect("regex sent_id"));

/// Estratégia de detecção de fronteira de página.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageMarker {
    /// `# newdoc` abre uma nova página.
    NewDoc,
    /// `# sent_id = 1` abre uma nova página.
    #[default]
    SentenceReset,
}

impl PageMarker {
    pub fn name(&self) -> &'static str {
        match self {
            PageMarker::NewDoc => "new_doc",
            PageMarker::SentenceReset => "sentence_reset",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "new_doc" | "newdoc" => Some(PageMarker::NewDoc),
            "sentence_reset" | "sent_id" => Some(PageMarker::SentenceReset),
            _ => None,
        }
    }

    /// Verifica se o comentário sinaliza início de página nesta estratégia.
    ///
    /// Devolve `Some(rótulo)` em caso positivo; o rótulo só existe para
    /// `# newdoc id = ...`.
    pub fn detect(&self, comment: &str) -> Option<Option<String>> {
        let comment = comment.trim();
        match self {
            PageMarker::NewDoc => NEWDOC_RE.captures(comment).map(|caps| {
                caps.get(1)
                    .map(|m| m.as_str().trim().to_string())
                    .filter(|id| !id.is_empty())
            }),
            PageMarker::SentenceReset => SENT_ID_RE
                .captures(comment)
                .filter(|caps| caps.get(1).is_some_and(|m| m.as_str().trim() == "1"))
                .map(|_| None),
        }
    }
}

impl std::fmt::Display for PageMarker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Verifica se o comentário é um `# sent_id` (qualquer valor).
pub fn is_sentence_id(comment: &str) -> bool {
    SENT_ID_RE.is_match(comment.trim())
}

/// Contador de páginas monotônico.
#[derive(Debug, Clone)]
pub struct PageSegmenter {
    marker: PageMarker,
    current: usize,
    label: Option<String>,
}

impl PageSegmenter {
    pub fn new(marker: PageMarker) -> Self {
        Self {
            marker,
            current: 0,
            label: None,
        }
    }

    pub fn marker(&self) -> PageMarker {
        self.marker
    }

    /// Processa uma linha de comentário. Devolve `true` se a página avançou.
    pub fn observe_comment(&mut self, comment: &str) -> bool {
        match self.marker.detect(comment) {
            Some(label) => {
                self.current += 1;
                self.label = label;
                true
            }
            None => false,
        }
    }

    /// Página de um registro de dados lido agora (mínimo 1).
    pub fn page_for_data(&mut self) -> usize {
        if self.current == 0 {
            self.current = 1;
        }
        self.current
    }

    /// Valor atual do contador (0 antes de qualquer marcador ou dado).
    pub fn current(&self) -> usize {
        self.current
    }

    /// Rótulo da página corrente (`# newdoc id = ...`), se houver.
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }
}

/// Mapeia cada sentença (na ordem dos `# sent_id`) para sua página.
///
/// Usado para distribuir a saída do NameTag, que só conhece sentenças,
/// pelas páginas do documento original.
pub fn sentence_pages(conllu: &str, marker: PageMarker) -> Vec<usize> {
    let mut segmenter = PageSegmenter::new(marker);
    let mut pages = Vec::new();
    for line in conllu.lines() {
        let line = line.trim();
        if !line.starts_with('#') {
            continue;
        }
        segmenter.observe_comment(line);
        if is_sentence_id(line) {
            pages.push(segmenter.page_for_data());
        }
    }
    pages
}

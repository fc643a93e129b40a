//! # Agregação de Entidades por Página
//!
//! Para cada par (documento, página), conta as entidades distintas por
//! identidade (texto, tipo canônico) e mantém as `N` mais frequentes.
//!
//! O relatório tem largura fixa: `file, page` seguidos de exatamente `N`
//! triplas `(neK, typeK, cnt-K)`. Páginas com menos de `N` entidades são
//! completadas com `("", "", 0)`; páginas sem entidade nenhuma não geram linha.
//!
//! O relatório é escrito com o crate `csv`, que aplica aspas quando um campo
//! contém o delimitador, aspas ou quebra de linha, mantendo-o relível.

use std::collections::{BTreeMap, HashMap};
use std::io::{Read, Write};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::span::EntitySpan;

/// Quantidade padrão de entidades por linha do relatório.
pub const DEFAULT_TOP_N: usize = 20;

/// Uma posição do relatório: entidade, tipo e contagem.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityCount {
    pub text: String,
    pub entity_type: String,
    pub count: usize,
}

impl EntityCount {
    /// Posição de preenchimento (`"", "", 0`).
    pub fn padding() -> Self {
        Self::default()
    }

    pub fn is_padding(&self) -> bool {
        self.count == 0 && self.text.is_empty() && self.entity_type.is_empty()
    }
}

/// Uma linha do relatório agregado.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateRow {
    pub document: String,
    pub page: usize,
    /// Exatamente `N` posições
    pub slots: Vec<EntityCount>,
}

impl AggregateRow {
    /// Campos na ordem do CSV (`3N + 2` campos).
    pub fn to_record(&self) -> Vec<String> {
        let mut record = Vec::with_capacity(self.slots.len() * 3 + 2);
        record.push(self.document.clone());
        record.push(self.page.to_string());
        for slot in &self.slots {
            record.push(slot.text.clone());
            record.push(slot.entity_type.clone());
            record.push(slot.count.to_string());
        }
        record
    }

    /// Entidades reais (sem o preenchimento).
    pub fn entities(&self) -> impl Iterator<Item = &EntityCount> {
        self.slots.iter().filter(|s| !s.is_padding())
    }
}

/// Conta pares (texto, tipo) em ordem decrescente de frequência.
///
/// Empates preservam a ordem do primeiro encontro (ordenação estável).
pub fn rank_entities(spans: &[EntitySpan]) -> Vec<EntityCount> {
    let mut index: HashMap<(&str, &str), usize> = HashMap::new();
    let mut counts: Vec<EntityCount> = Vec::new();

    for span in spans {
        let key = (span.text.as_str(), span.type_name());
        match index.get(&key) {
            Some(&i) => counts[i].count += 1,
            None => {
                index.insert(key, counts.len());
                counts.push(EntityCount {
                    text: span.text.clone(),
                    entity_type: span.type_name().to_string(),
                    count: 1,
                });
            }
        }
    }

    counts.sort_by(|a, b| b.count.cmp(&a.count));
    counts
}

/// Agrega os spans de uma página. Sem spans → `None` (página omitida).
pub fn aggregate_page(document: &str, page: usize, spans: &[EntitySpan], top_n: usize) -> Option<AggregateRow> {
    if spans.is_empty() {
        return None;
    }
    let mut slots = rank_entities(spans);
    slots.truncate(top_n);
    slots.resize_with(top_n, EntityCount::padding);
    Some(AggregateRow {
        document: document.to_string(),
        page,
        slots,
    })
}

/// Agrupa os spans de um documento por página e agrega cada uma, em ordem de página.
pub fn aggregate_document(document: &str, spans: &[EntitySpan], top_n: usize) -> Vec<AggregateRow> {
    let mut by_page: BTreeMap<usize, Vec<EntitySpan>> = BTreeMap::new();
    for span in spans {
        by_page.entry(span.page).or_default().push(span.clone());
    }
    by_page
        .iter()
        .filter_map(|(page, spans)| aggregate_page(document, *page, spans, top_n))
        .collect()
}

/// Cabeçalho do relatório: `file, page, ne1, type1, cnt-1, ...`.
pub fn report_header(top_n: usize) -> Vec<String> {
    let mut header = vec!["file".to_string(), "page".to_string()];
    for i in 1..=top_n {
        header.push(format!("ne{i}"));
        header.push(format!("type{i}"));
        header.push(format!("cnt-{i}"));
    }
    header
}

/// Escritor do relatório agregado.
pub struct ReportWriter<W: Write> {
    writer: csv::Writer<W>,
    top_n: usize,
}

impl<W: Write> ReportWriter<W> {
    /// Cria o escritor e já emite o cabeçalho.
    pub fn new(inner: W, top_n: usize) -> Result<Self> {
        let mut writer = csv::WriterBuilder::new().flexible(false).from_writer(inner);
        writer.write_record(report_header(top_n))?;
        Ok(Self { writer, top_n })
    }

    pub fn write_row(&mut self, row: &AggregateRow) -> Result<()> {
        if row.slots.len() != self.top_n {
            return Err(Error::parse(format!(
                "linha com {} posições, esperado {}",
                row.slots.len(),
                self.top_n
            )));
        }
        self.writer.write_record(row.to_record())?;
        Ok(())
    }

    pub fn finish(mut self) -> Result<W> {
        self.writer.flush()?;
        self.writer
            .into_inner()
            .map_err(|e| Error::Stream(e.into_error()))
    }
}

/// Lê de volta um relatório escrito por [`ReportWriter`].
pub fn read_report<R: Read>(reader: R) -> Result<Vec<AggregateRow>> {
    let mut reader = csv::ReaderBuilder::new().has_headers(true).from_reader(reader);
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        if record.len() < 2 || (record.len() - 2) % 3 != 0 {
            return Err(Error::parse(format!("linha de relatório com {} campos", record.len())));
        }
        let page = record[1]
            .parse()
            .map_err(|_| Error::parse(format!("página inválida: {}", &record[1])))?;
        let slots = (2..record.len())
            .step_by(3)
            .map(|i| EntityCount {
                text: record[i].to_string(),
                entity_type: record[i + 1].to_string(),
                count: record[i + 2].parse().unwrap_or(0),
            })
            .collect();
        rows.push(AggregateRow {
            document: record[0].to_string(),
            page,
            slots,
        });
    }
    Ok(rows)
}

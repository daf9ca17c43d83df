//! # Extração de Spans Gold a partir de Tags BMES
//!
//! Converte a sequência de tags de uma sentença em spans `[b, e]` inclusivos.
//! Spans acima do tamanho máximo configurado **não são emitidos**, mas continuam
//! sendo contados no histograma de tamanhos, para que as estatísticas do corpus
//! reflitam os dados reais enquanto treino e avaliação respeitam o limite.
//!
//! ```text
//! 中 国 人 民 银 行
//! B-ORG M-ORG M-ORG M-ORG M-ORG E-ORG  →  GoldSpan { start: 0, end: 5, ORG }
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::bmes::{BmesTag, SegTag, TokenRecord};
use crate::config::EvalConfig;
use crate::error::SpanError;
use crate::label::EntityCategory;

/// Entidade de referência (gold) de uma sentença.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GoldSpan {
    /// Índice do token inicial (inclusivo)
    pub start: usize,
    /// Índice do token final (inclusivo)
    pub end: usize,
    pub category: EntityCategory,
}

impl GoldSpan {
    pub fn len(&self) -> usize {
        self.end - self.start + 1
    }
}

/// Histograma ordenado de tamanhos (de spans ou de sentenças).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LengthHistogram {
    counts: BTreeMap<usize, usize>,
}

impl LengthHistogram {
    /// Razões acumuladas usadas no resumo do corpus.
    pub const PIVOTS: [f64; 7] = [0.8, 0.9, 0.95, 0.97, 0.98, 0.99, 1.01];

    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, len: usize) {
        *self.counts.entry(len).or_insert(0) += 1;
    }

    pub fn count(&self, len: usize) -> usize {
        self.counts.get(&len).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }

    pub fn longest(&self) -> Option<usize> {
        self.counts.keys().next_back().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.counts.iter().map(|(len, count)| (*len, *count))
    }

    /// Para cada pivô, o maior tamanho cuja razão acumulada ainda fica abaixo dele.
    ///
    /// `None` quando nem o menor tamanho fica abaixo do pivô (ou o histograma está vazio).
    pub fn pivots(&self) -> Vec<(f64, Option<usize>)> {
        let total = self.total();
        if total == 0 {
            return Self::PIVOTS.iter().map(|p| (*p, None)).collect();
        }

        let mut acc = 0usize;
        let cumulative: Vec<(usize, f64)> = self
            .iter()
            .map(|(len, count)| {
                acc += count;
                (len, acc as f64 / total as f64)
            })
            .collect();

        Self::PIVOTS
            .iter()
            .map(|&pivot| {
                let below = cumulative
                    .iter()
                    .take_while(|(_, ratio)| *ratio < pivot)
                    .last()
                    .map(|(len, _)| *len);
                (pivot, below)
            })
            .collect()
    }

    /// Linhas do resumo: contagens, total e pivôs.
    pub fn summary_lines(&self, title: &str) -> Vec<String> {
        let counts: Vec<String> = self.iter().map(|(len, c)| format!("({len}, {c})")).collect();
        let mut lines = vec![
            format!("{title}: Count: {}", counts.join(" ")),
            format!("{title}: Total num: {}", self.total()),
        ];
        for (pivot, len) in self.pivots() {
            match len {
                Some(len) => lines.push(format!("{title}:  {pivot} : {len}")),
                None => lines.push(format!("{title}:  {pivot} : -")),
            }
        }
        lines
    }
}

/// Conversor de tags BMES em spans gold.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpanExtractor {
    /// Spans maiores que isso são contados, mas não emitidos. `None` = sem limite.
    pub max_span_len: Option<usize>,
}

impl SpanExtractor {
    pub fn new(max_span_len: Option<usize>) -> Self {
        Self { max_span_len }
    }

    /// Extrai os spans gold de uma sentença.
    ///
    /// Varre da esquerda para a direita:
    /// - `S-X` gera `(i, i, X)`;
    /// - `B-X` abre um span, consome `M-` até o `E-` que o fecha; a classe vem do `B-`;
    /// - `O` não gera nada.
    ///
    /// Um `B-` sem `E-` antes do fim, uma tag estranha dentro do span aberto ou um
    /// `M-`/`E-` solto indicam dados corrompidos e viram erro.
    pub fn extract(
        &self,
        tokens: &[TokenRecord],
        span_lengths: &mut LengthHistogram,
    ) -> Result<Vec<GoldSpan>, SpanError> {
        let mut spans = Vec::new();
        let mut i = 0;

        while i < tokens.len() {
            match parse_tag(tokens, i)? {
                BmesTag::Outside => {
                    i += 1;
                }
                BmesTag::Single(category) => {
                    self.emit(GoldSpan { start: i, end: i, category }, &mut spans, span_lengths);
                    i += 1;
                }
                BmesTag::Begin(category) => {
                    let start = i;
                    let mut j = i + 1;
                    loop {
                        if j >= tokens.len() {
                            return Err(SpanError::UnclosedSpan { start });
                        }
                        match parse_tag(tokens, j)? {
                            BmesTag::Middle(_) => j += 1,
                            BmesTag::End(_) => break,
                            _ => {
                                return Err(SpanError::UnexpectedTag {
                                    position: j,
                                    tag: tokens[j].ner_tag.clone(),
                                })
                            }
                        }
                    }
                    self.emit(GoldSpan { start, end: j, category }, &mut spans, span_lengths);
                    i = j + 1;
                }
                BmesTag::Middle(_) | BmesTag::End(_) => {
                    return Err(SpanError::OrphanContinuation {
                        position: i,
                        tag: tokens[i].ner_tag.clone(),
                    });
                }
            }
        }

        Ok(spans)
    }

    fn emit(&self, span: GoldSpan, spans: &mut Vec<GoldSpan>, span_lengths: &mut LengthHistogram) {
        span_lengths.record(span.len());
        match self.max_span_len {
            Some(max) if span.len() > max => {
                debug!(start = span.start, end = span.end, len = span.len(), "span acima do limite descartado");
            }
            _ => spans.push(span),
        }
    }
}

fn parse_tag(tokens: &[TokenRecord], position: usize) -> Result<BmesTag, SpanError> {
    let raw = &tokens[position].ner_tag;
    BmesTag::from_label(raw).ok_or_else(|| SpanError::InvalidTag {
        position,
        tag: raw.clone(),
    })
}

/// Uma sentença pronta para treino/avaliação.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Datum {
    pub chars: Vec<String>,
    pub segs: Vec<SegTag>,
    pub spans: Vec<GoldSpan>,
}

/// Conjunto de sentenças com as estatísticas coletadas na construção.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Corpus {
    pub data: Vec<Datum>,
    /// Maior sentença mantida (0 se vazio)
    pub longest_text_len: usize,
    /// Maior span emitido (0 se nenhum)
    pub longest_span_len: usize,
    /// Tamanhos de todas as sentenças lidas, inclusive as descartadas
    pub sentence_lengths: LengthHistogram,
    /// Tamanhos de todos os spans encontrados, inclusive os descartados
    pub span_lengths: LengthHistogram,
}

impl Corpus {
    /// Resumo dos histogramas de sentenças e de spans.
    pub fn statistics(&self) -> Vec<String> {
        let mut lines = vec![format!("{} sentenças mantidas", self.data.len())];
        lines.extend(self.sentence_lengths.summary_lines("Sentence"));
        lines.extend(self.span_lengths.summary_lines("Span"));
        lines
    }
}

/// Monta um [`Corpus`] a partir de sentenças já lidas.
#[derive(Debug, Clone, Default)]
pub struct CorpusBuilder {
    pub extractor: SpanExtractor,
    /// Sentenças com tamanho >= limite são descartadas
    pub max_text_len: Option<usize>,
    /// Ordena por tamanho decrescente
    pub sort_by_length: bool,
}

impl CorpusBuilder {
    pub fn new(extractor: SpanExtractor) -> Self {
        Self {
            extractor,
            ..Self::default()
        }
    }

    /// Usa os limites de tamanho da configuração de avaliação.
    pub fn from_config(config: &EvalConfig) -> Self {
        Self::new(SpanExtractor::new(config.max_span_len)).max_text_len(config.max_text_len)
    }

    pub fn max_text_len(mut self, max: Option<usize>) -> Self {
        self.max_text_len = max;
        self
    }

    pub fn sort_by_length(mut self, sort: bool) -> Self {
        self.sort_by_length = sort;
        self
    }

    pub fn build<I>(&self, sentences: I) -> Result<Corpus, SpanError>
    where
        I: IntoIterator<Item = Vec<TokenRecord>>,
    {
        let mut corpus = Corpus::default();

        for (sid, sentence) in sentences.into_iter().enumerate() {
            corpus.sentence_lengths.record(sentence.len());

            let spans = self
                .extractor
                .extract(&sentence, &mut corpus.span_lengths)
                .map_err(|e| SpanError::InSentence {
                    sentence: sid,
                    source: Box::new(e),
                })?;

            if let Some(max) = self.max_text_len {
                if sentence.len() >= max {
                    continue;
                }
            }

            if let Some(longest) = spans.iter().map(GoldSpan::len).max() {
                corpus.longest_span_len = corpus.longest_span_len.max(longest);
            }
            corpus.longest_text_len = corpus.longest_text_len.max(sentence.len());

            let (chars, segs) = sentence.into_iter().map(|t| (t.ch, t.seg_tag)).unzip();
            corpus.data.push(Datum { chars, segs, spans });
        }

        if self.sort_by_length {
            corpus.data.sort_by(|a, b| b.chars.len().cmp(&a.chars.len()));
        }
        for line in corpus.statistics() {
            info!("{line}");
        }
        Ok(corpus)
    }
}

//! # Leitor de Logs de Predição
//!
//! Adaptador entre o log textual produzido na avaliação do modelo e o
//! decodificador. O log tem duas gramáticas de linha:
//!
//! ```text
//! [12] 新华社北京电                       ← início de sentença (índice entre colchetes)
//!    0~2   3/-0.0213  ORG/ORG  新华社      ← candidato: begin~end  label_id/score  PRED/GOLD  fragmento
//! ```
//!
//! Linhas que não casam com nenhuma das duas são ignoradas. O leitor é
//! preguiçoso: produz um [`SentenceBlock`] por sentença conforme lê.

use std::io::BufRead;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::decoder::SpanPred;
use crate::error::LogError;
use crate::label::Label;

/// Candidatos de uma sentença, na ordem do log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentenceBlock {
    /// Índice do cabeçalho; `None` para candidatos antes do primeiro cabeçalho
    pub id: Option<u64>,
    /// Linha de cabeçalho completa
    pub header: Option<String>,
    pub predictions: Vec<SpanPred>,
}

fn header_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\[[^\d]*(\d+)\].*").expect("regex de cabeçalho válida"))
}

fn result_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\s+(\d+)~(\d+)\s+(\d+)/(-\d*\.\d*)\s*([A-Z]+)/([A-Z]+)\s*([^\s]*)")
            .expect("regex de candidato válida")
    })
}

/// Tenta extrair o índice de uma linha de cabeçalho.
pub fn parse_header(line: &str) -> Option<u64> {
    let caps = header_regex().captures(line)?;
    caps[1].parse().ok()
}

/// Tenta extrair um candidato de uma linha de resultado.
///
/// Rótulos fora do conjunto conhecido ou números que não cabem no tipo
/// fazem a linha ser ignorada.
pub fn parse_result(line: &str) -> Option<SpanPred> {
    let caps = result_regex().captures(line)?;
    let pred = (|| {
        Some(SpanPred {
            begin: caps[1].parse().ok()?,
            end: caps[2].parse().ok()?,
            label_id: caps[3].parse().ok()?,
            score: caps[4].parse().ok()?,
            predicted: Label::from_str(&caps[5])?,
            gold: Label::from_str(&caps[6])?,
            fragment: caps[7].to_string(),
        })
    })();
    if pred.is_none() {
        warn!("linha de candidato ignorada: {}", line.trim());
    }
    pred
}

/// Iterador de sentenças sobre um log.
pub struct LogReader<R> {
    lines: std::io::Lines<R>,
    line_no: usize,
    current: Option<SentenceBlock>,
    finished: bool,
}

impl<R: BufRead> LogReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            line_no: 0,
            current: None,
            finished: false,
        }
    }

    /// Fecha o bloco corrente, descartando sentenças sem candidatos.
    fn flush(&mut self) -> Option<SentenceBlock> {
        self.current.take().filter(|block| !block.predictions.is_empty())
    }
}

impl<R: BufRead> Iterator for LogReader<R> {
    type Item = Result<SentenceBlock, LogError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        loop {
            let line = match self.lines.next() {
                Some(Ok(line)) => line,
                Some(Err(source)) => {
                    self.finished = true;
                    return Some(Err(LogError::Io {
                        line: self.line_no + 1,
                        source,
                    }));
                }
                None => {
                    self.finished = true;
                    return self.flush().map(Ok);
                }
            };
            self.line_no += 1;

            let mut ready = None;
            if let Some(id) = parse_header(&line) {
                ready = self.flush();
                debug!("{}", line);
                self.current = Some(SentenceBlock {
                    id: Some(id),
                    header: Some(line.clone()),
                    predictions: Vec::new(),
                });
            }

            if let Some(pred) = parse_result(&line) {
                self.current
                    .get_or_insert_with(|| SentenceBlock {
                        id: None,
                        header: None,
                        predictions: Vec::new(),
                    })
                    .predictions
                    .push(pred);
            }

            if ready.is_some() {
                return ready.map(Ok);
            }
        }
    }
}

/// Lê todas as sentenças de um texto já carregado em memória.
pub fn parse_log_str(text: &str) -> Result<Vec<SentenceBlock>, LogError> {
    LogReader::new(text.as_bytes()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::label::EntityCategory;

    const LOG: &str = "\
loss: 0.123
[0] 新华社北京电
   0~2   3/-0.0213  ORG/ORG  新华社
   0~3   1/-3.5000  PER/NONE  新华社北
   3~4   2/-0.5000  GPE/GPE  北京
[1] 空句子
[2] 邓小平
   0~2   4/-1.2  PER/PER  邓小平
   1~1   4/-7.0  MISC/NONE  小
";

    #[test]
    fn test_header_and_result_grammars() {
        assert_eq!(parse_header("[12] 某句"), Some(12));
        assert_eq!(parse_header("[dev 7]"), Some(7));
        assert_eq!(parse_header("  [3] indentado"), None);

        let pred = parse_result("   0~2   3/-0.0213  ORG/NONE  新华社").unwrap();
        assert_eq!((pred.begin, pred.end, pred.label_id), (0, 2, 3));
        assert_eq!(pred.score, -0.0213);
        assert_eq!(pred.predicted, Label::Entity(EntityCategory::Org));
        assert_eq!(pred.gold, Label::None);
        assert_eq!(pred.fragment, "新华社");
    }

    #[test]
    fn test_positive_scores_do_not_match() {
        assert!(parse_result("   0~2   3/0.5  ORG/ORG  x").is_none());
    }

    #[test]
    fn test_reader_groups_by_sentence() {
        let blocks = parse_log_str(LOG).unwrap();
        assert_eq!(blocks.len(), 2);

        assert_eq!(blocks[0].id, Some(0));
        assert_eq!(blocks[0].predictions.len(), 3);
        assert_eq!(blocks[0].header.as_deref(), Some("[0] 新华社北京电"));

        // sentença 1 não tem candidatos; na 2 o rótulo MISC é ignorado
        assert_eq!(blocks[1].id, Some(2));
        assert_eq!(blocks[1].predictions.len(), 1);
        assert_eq!(blocks[1].predictions[0].fragment, "邓小平");
    }

    #[test]
    fn test_results_before_first_header() {
        let blocks = parse_log_str("   0~0   1/-1.0  PER/PER  甲\n[5] x\n   1~1   1/-1.0  LOC/LOC  乙\n").unwrap();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].id, None);
        assert_eq!(blocks[1].id, Some(5));
    }

    #[test]
    fn test_last_sentence_is_emitted() {
        let blocks = parse_log_str("[9] fim\n   0~0   1/-1.0  PER/PER  甲").unwrap();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].id, Some(9));
    }

    #[test]
    fn test_empty_log() {
        assert!(parse_log_str("").unwrap().is_empty());
        assert!(parse_log_str("nada aqui\n").unwrap().is_empty());
    }
}

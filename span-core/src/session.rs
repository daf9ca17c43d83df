//! # Sessão de Avaliação — Orquestrador com Eventos Observáveis
//!
//! A sessão liga o leitor de logs, o decodificador e o acumulador. Há três
//! formas de rodar uma avaliação:
//!
//! - **Sequencial** ([`EvaluationSession`], [`evaluate_log`]): uma sentença por vez,
//!   num único acumulador.
//! - **Paralela** ([`evaluate_parallel`]): cada worker do Rayon acumula num
//!   acumulador privado e os parciais são somados no final.
//! - **Streaming** ([`run_streaming`]): emite um [`SessionEvent`] por sentença
//!   via canal (`mpsc`), para hosts que mostram o progresso em tempo real.
//!
//! Uma sentença rejeitada pelo decodificador (entrada fora de ordem) é
//! reportada e pulada; a avaliação do corpus continua.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::mpsc;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::EvalConfig;
use crate::decoder::{diagnostic_line, SpanDecoder};
use crate::error::{DecodeError, SessionError};
use crate::log_adapter::{LogReader, SentenceBlock};
use crate::metrics::{log_report, ConfusionAccumulator, EvaluationReport, Evaluator};

/// Eventos emitidos durante uma avaliação em streaming.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum SessionEvent {
    /// Uma sentença foi decodificada e contabilizada.
    SentenceDecoded {
        id: Option<u64>,
        kept: usize,
        dropped: usize,
        /// Linhas de diagnóstico (`+`/`-`) para candidatos mantidos ou com gold
        lines: Vec<String>,
    },
    /// A sentença foi rejeitada e não entrou nas contagens.
    SentenceFailed { id: Option<u64>, message: String },
    /// Fim da avaliação com o relatório consolidado.
    Done {
        report: EvaluationReport,
        sentences: usize,
        failed: usize,
    },
    /// Falha irrecuperável (ex: erro de leitura).
    Error { message: String },
}

/// Estado de uma avaliação sequencial.
#[derive(Debug, Clone)]
pub struct EvaluationSession {
    config: EvalConfig,
    decoder: SpanDecoder,
    accumulator: ConfusionAccumulator,
    sentences: usize,
    failed: usize,
}

impl EvaluationSession {
    pub fn new(config: EvalConfig) -> Self {
        Self {
            decoder: SpanDecoder::new(config.decode_config()),
            config,
            accumulator: ConfusionAccumulator::new(),
            sentences: 0,
            failed: 0,
        }
    }

    /// Decodifica uma sentença no acumulador da sessão.
    pub fn decode_sentence(&mut self, block: &SentenceBlock) -> Result<Vec<bool>, DecodeError> {
        if self.config.verbose {
            if let Some(header) = &block.header {
                info!("{header}");
            }
        }
        match self.decoder.decode(&block.predictions, &mut self.accumulator) {
            Ok(keep) => {
                self.sentences += 1;
                Ok(keep)
            }
            Err(e) => {
                self.failed += 1;
                warn!(id = ?block.id, "sentença ignorada: {e}");
                Err(e)
            }
        }
    }

    /// Consome todas as sentenças; erros de ordenação só são contados.
    pub fn run_blocks<I>(&mut self, blocks: I) -> Result<(), SessionError>
    where
        I: IntoIterator<Item = Result<SentenceBlock, crate::error::LogError>>,
    {
        for block in blocks {
            let block = block?;
            // Falha de ordenação já foi logada e contada em `decode_sentence`
            if self.decode_sentence(&block).is_err() {
                continue;
            }
        }
        Ok(())
    }

    pub fn accumulator(&self) -> &ConfusionAccumulator {
        &self.accumulator
    }

    pub fn into_accumulator(self) -> ConfusionAccumulator {
        self.accumulator
    }

    /// Sentenças contabilizadas e rejeitadas até aqui.
    pub fn progress(&self) -> (usize, usize) {
        (self.sentences, self.failed)
    }

    pub fn evaluator(&self) -> Evaluator<'_> {
        Evaluator::new(&self.accumulator, self.config.zero_division)
    }

    /// Relatório atual; com `verbose` na configuração, também vai para o log.
    pub fn report(&self) -> EvaluationReport {
        let report = self.evaluator().report();
        if self.config.verbose {
            log_report(&report);
        }
        report
    }
}

/// Avalia um log inteiro, sequencialmente.
pub fn evaluate_log<R: BufRead>(reader: R, config: &EvalConfig) -> Result<EvaluationReport, SessionError> {
    let mut session = EvaluationSession::new(config.clone());
    session.run_blocks(LogReader::new(reader))?;
    let (sentences, failed) = session.progress();
    info!(sentences, failed, "avaliação concluída");
    Ok(session.report())
}

/// Abre e avalia um arquivo de log.
pub fn evaluate_log_file(path: impl AsRef<Path>, config: &EvalConfig) -> Result<EvaluationReport, SessionError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| SessionError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    evaluate_log(BufReader::new(file), config)
}

/// Acumula as sentenças em paralelo, um acumulador privado por worker.
///
/// O resultado é idêntico ao da avaliação sequencial das mesmas sentenças.
pub fn accumulate_parallel(blocks: &[SentenceBlock], config: &EvalConfig) -> ConfusionAccumulator {
    let decoder = SpanDecoder::new(config.decode_config());
    blocks
        .par_iter()
        .fold(ConfusionAccumulator::new, |mut acc, block| {
            if let Err(e) = decoder.decode(&block.predictions, &mut acc) {
                warn!(id = ?block.id, "sentença ignorada: {e}");
            }
            acc
        })
        .reduce(ConfusionAccumulator::new, |mut a, b| {
            a.merge(&b);
            a
        })
}

pub fn evaluate_parallel(blocks: &[SentenceBlock], config: &EvalConfig) -> EvaluationReport {
    let acc = accumulate_parallel(blocks, config);
    let report = Evaluator::new(&acc, config.zero_division).report();
    if config.verbose {
        log_report(&report);
    }
    report
}

/// Avalia enviando eventos de progresso pelo canal `tx`.
///
/// Não retorna valores diretamente: o último evento é `Done` (ou `Error`).
/// Um receptor desconectado interrompe a avaliação.
pub fn run_streaming<I>(blocks: I, config: &EvalConfig, tx: mpsc::Sender<SessionEvent>)
where
    I: IntoIterator<Item = Result<SentenceBlock, crate::error::LogError>>,
{
    let mut session = EvaluationSession::new(config.clone());

    for block in blocks {
        let block = match block {
            Ok(block) => block,
            Err(e) => {
                let _ = tx.send(SessionEvent::Error { message: e.to_string() });
                return;
            }
        };

        let event = match session.decode_sentence(&block) {
            Ok(keep) => {
                let kept = keep.iter().filter(|k| **k).count();
                let lines = block
                    .predictions
                    .iter()
                    .zip(&keep)
                    .filter(|(pred, kept)| **kept || pred.gold.is_entity())
                    .map(|(pred, kept)| diagnostic_line(pred, *kept))
                    .collect();
                SessionEvent::SentenceDecoded {
                    id: block.id,
                    kept,
                    dropped: keep.len() - kept,
                    lines,
                }
            }
            Err(e) => SessionEvent::SentenceFailed {
                id: block.id,
                message: e.to_string(),
            },
        };

        if tx.send(event).is_err() {
            return;
        }
    }

    let (sentences, failed) = session.progress();
    let _ = tx.send(SessionEvent::Done {
        report: session.report(),
        sentences,
        failed,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log_adapter::parse_log_str;

    const LOG: &str = "\
[0] a
   0~0   1/-0.9  PER/PER  甲
   0~1   1/-0.5  PER/NONE  甲乙
   2~2   0/-9.0  NONE/NONE  丙
[1] b
   0~1   2/-1.0  ORG/ORG  中国
   1~2   3/-2.0  GPE/GPE  国人
   3~3   4/-6.0  LOC/LOC  河
[2] c
   0~0   3/-0.1  GPE/LOC  京
   1~2   2/-3.0  ORG/NONE  银行
[3] fora de ordem
   2~2   1/-1.0  PER/PER  乙
   0~0   1/-1.0  PER/PER  甲
";

    fn config() -> EvalConfig {
        EvalConfig {
            threshold: -4.0,
            ..EvalConfig::default()
        }
    }

    #[test]
    fn test_sequential_session_counts() {
        let report = evaluate_log(LOG.as_bytes(), &config()).unwrap();
        // sentença 0: PER FN (dedup) + PER FP
        // sentença 1: ORG TP, GPE FN (sobreposição), LOC FN (limiar)
        // sentença 2: GPE FP + LOC FN, ORG FP
        // sentença 3: rejeitada
        assert_eq!(report.corr_num, 1);
        assert_eq!(report.pred_num, 4);
        assert_eq!(report.gold_num, 5);
    }

    #[test]
    fn test_unsorted_sentence_is_skipped() {
        let mut session = EvaluationSession::new(config());
        session.run_blocks(parse_log_str(LOG).unwrap().into_iter().map(Ok)).unwrap();
        assert_eq!(session.progress(), (3, 1));
        assert!(session.accumulator().is_consistent());
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let blocks = parse_log_str(LOG).unwrap();
        let mut session = EvaluationSession::new(config());
        for block in &blocks {
            let _ = session.decode_sentence(block);
        }
        let sequential = session.into_accumulator();
        let parallel = accumulate_parallel(&blocks, &config());
        assert_eq!(parallel, sequential);
    }

    #[test]
    fn test_merging_disjoint_partials_equals_single_session() {
        let blocks = parse_log_str(LOG).unwrap();
        let (left, right) = blocks.split_at(2);

        let run = |part: &[SentenceBlock]| {
            let mut session = EvaluationSession::new(config());
            session.run_blocks(part.iter().cloned().map(Ok)).unwrap();
            session.into_accumulator()
        };

        let mut merged = run(left);
        merged.merge(&run(right));
        assert_eq!(merged, run(&blocks[..]));
    }

    #[test]
    fn test_streaming_emits_one_event_per_sentence_and_done() {
        let (tx, rx) = mpsc::channel();
        run_streaming(LogReader::new(LOG.as_bytes()), &config(), tx);
        let events: Vec<SessionEvent> = rx.try_iter().collect();

        assert_eq!(events.len(), 5);
        assert!(matches!(events[0], SessionEvent::SentenceDecoded { id: Some(0), kept: 1, dropped: 2, .. }));
        assert!(matches!(events[3], SessionEvent::SentenceFailed { id: Some(3), .. }));
        match &events[4] {
            SessionEvent::Done { report, sentences, failed } => {
                assert_eq!((*sentences, *failed), (3, 1));
                assert_eq!(report.pred_num, 4);
            }
            other => panic!("evento inesperado: {other:?}"),
        }
    }

    #[test]
    fn test_report_is_idempotent() {
        let mut session = EvaluationSession::new(config());
        session.run_blocks(LogReader::new(LOG.as_bytes())).unwrap();
        let first = session.evaluator().evaluate(false);
        let second = session.evaluator().evaluate(false);
        assert_eq!(first.0.to_bits(), second.0.to_bits());
        assert_eq!(first.2.to_bits(), second.2.to_bits());
    }
}

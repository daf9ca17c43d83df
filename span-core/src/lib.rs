//! # span-core — Decodificação e Avaliação de NER baseado em Spans
//!
//! Este crate transforma as saídas de um modelo de NER por spans em métricas de
//! corpus. Ele cobre três estágios, consumidos nesta ordem por quem itera as
//! sentenças de um corpus:
//!
//! 1.  **Extração gold** ([`extractor`]): tags BMES por caractere viram spans `[b, e]`.
//! 2.  **Decodificação** ([`decoder`]): os candidatos pontuados de uma sentença,
//!     possivelmente sobrepostos, são reduzidos a um conjunto sem conflitos.
//! 3.  **Avaliação** ([`metrics`]): as decisões de cada sentença alimentam um
//!     acumulador de confusão; no fim, precisão/recall/F1 por classe, micro,
//!     macro e por fronteira ("ignore-class").
//!
//! A entrada do decodificador vem de um adaptador externo; o [`log_adapter`]
//! lê o formato textual de log gerado na avaliação do modelo.
//!
//! ## Exemplo de Uso
//!
//! ```rust
//! use span_core::{EvalConfig, evaluate_log};
//!
//! let log = "\
//! [0] 邓小平
//!    0~2   4/-0.01  PER/PER  邓小平
//! ";
//!
//! let report = evaluate_log(log.as_bytes(), &EvalConfig::default()).unwrap();
//! assert_eq!(report.micro.f1, 1.0);
//! ```
//!
//! ## Módulos Principais
//!
//! - [`session`]: orquestra leitura, decodificação e acumulação (sequencial, paralela ou streaming).
//! - [`decoder`]: resolução gulosa de conflitos entre spans.
//! - [`metrics`]: acumulador de confusão e agregações.
//! - [`extractor`]: spans gold e estatísticas de tamanho do corpus.

pub mod bmes;
pub mod config;
pub mod decoder;
pub mod error;
pub mod extractor;
pub mod label;
pub mod log_adapter;
pub mod metrics;
pub mod session;

pub use config::{DecodeConfig, EvalConfig, ZeroDivision};
pub use decoder::{SpanDecoder, SpanPred};
pub use error::{ConfigError, DecodeError, LogError, SessionError, SpanError};
pub use extractor::{CorpusBuilder, GoldSpan, LengthHistogram, SpanExtractor};
pub use label::{EntityCategory, Label};
pub use log_adapter::{LogReader, SentenceBlock};
pub use metrics::{ConfusionAccumulator, EvaluationReport, Evaluator, Prf};
pub use session::{evaluate_log, evaluate_log_file, evaluate_parallel, EvaluationSession, SessionEvent};

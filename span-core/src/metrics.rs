//! # Métricas de Avaliação — Precisão, Recall e F1
//!
//! O [`ConfusionAccumulator`] guarda, para cada classe real, os contadores
//! `TP`, `FP` e `FN`, além de três escalares usados na métrica que ignora a
//! classe (só fronteiras): `corr_num`, `pred_num` e `gold_num`.
//!
//! ## Agregações
//!
//! ```text
//! por classe:  P = TP / (TP + FP)      R = TP / (TP + FN)      F1 = 2PR / (P + R)
//! micro:       soma TP, TP+FP e TP+FN de todas as classes, depois divide
//! macro:       média aritmética de P e de R por classe, depois combina em F1
//! fronteira:   P = corr / pred         R = corr / gold
//! ```
//!
//! Denominador zero segue a convenção de [`ZeroDivision`] (NaN por padrão), para
//! que um relatório sobre o corpus inteiro nunca aborte no meio.

use std::iter::Sum;
use std::ops::AddAssign;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::ZeroDivision;
use crate::decoder::SpanPred;
use crate::label::{EntityCategory, Label};

/// Contadores de uma classe.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassCounts {
    /// Presente no gold e na predição
    pub tp: u64,
    /// Predito, mas ausente no gold
    pub fp: u64,
    /// Presente no gold, mas não predito
    #[serde(rename = "fn")]
    pub fn_: u64,
}

impl AddAssign for ClassCounts {
    fn add_assign(&mut self, rhs: Self) {
        self.tp += rhs.tp;
        self.fp += rhs.fp;
        self.fn_ += rhs.fn_;
    }
}

/// Contagens acumuladas de uma sessão de avaliação.
///
/// Cresce monotonicamente a cada sentença decodificada. Para paralelizar, cada
/// worker acumula em uma instância própria e os parciais são somados com
/// [`ConfusionAccumulator::merge`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionAccumulator {
    classes: [ClassCounts; EntityCategory::COUNT],
    pub corr_num: u64,
    pub pred_num: u64,
    pub gold_num: u64,
}

impl ConfusionAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn counts(&self, category: EntityCategory) -> ClassCounts {
        self.classes[category.index()]
    }

    fn counts_mut(&mut self, category: EntityCategory) -> &mut ClassCounts {
        &mut self.classes[category.index()]
    }

    /// Registra a decisão final sobre um candidato.
    ///
    /// `NONE` nunca conta como entidade verdadeira: um candidato mantido com gold
    /// `NONE` é só falso positivo, e um descartado com gold `NONE` não tem efeito.
    pub fn record(&mut self, pred: &SpanPred, keep: bool) {
        let keep = keep && pred.predicted.is_entity();
        match (keep, pred.predicted, pred.gold) {
            (true, Label::Entity(p), Label::Entity(g)) if p == g => {
                self.counts_mut(g).tp += 1;
                self.corr_num += 1;
                self.pred_num += 1;
                self.gold_num += 1;
            }
            (true, Label::Entity(p), gold) => {
                self.counts_mut(p).fp += 1;
                self.pred_num += 1;
                if let Some(g) = gold.category() {
                    self.counts_mut(g).fn_ += 1;
                    self.gold_num += 1;
                }
            }
            (_, _, Label::Entity(g)) => {
                self.counts_mut(g).fn_ += 1;
                self.gold_num += 1;
            }
            _ => {}
        }
    }

    /// Soma campo a campo as contagens de outro acumulador.
    pub fn merge(&mut self, other: &ConfusionAccumulator) {
        for (mine, theirs) in self.classes.iter_mut().zip(other.classes.iter()) {
            *mine += *theirs;
        }
        self.corr_num += other.corr_num;
        self.pred_num += other.pred_num;
        self.gold_num += other.gold_num;
    }

    /// `pred_num = Σ TP+FP` e `gold_num = Σ TP+FN` sobre as classes reais.
    pub fn is_consistent(&self) -> bool {
        let predicted: u64 = self.classes.iter().map(|c| c.tp + c.fp).sum();
        let gold: u64 = self.classes.iter().map(|c| c.tp + c.fn_).sum();
        let correct: u64 = self.classes.iter().map(|c| c.tp).sum();
        predicted == self.pred_num && gold == self.gold_num && correct == self.corr_num
    }
}

impl AddAssign<&ConfusionAccumulator> for ConfusionAccumulator {
    fn add_assign(&mut self, rhs: &ConfusionAccumulator) {
        self.merge(rhs);
    }
}

impl Sum for ConfusionAccumulator {
    fn sum<I: Iterator<Item = ConfusionAccumulator>>(iter: I) -> Self {
        iter.fold(ConfusionAccumulator::new(), |mut acc, part| {
            acc.merge(&part);
            acc
        })
    }
}

/// Precisão, recall e F1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prf {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

impl Prf {
    fn from_ratios(precision: f64, recall: f64) -> Self {
        Self {
            precision,
            recall,
            f1: harmonic(precision, recall),
        }
    }
}

/// Métricas de uma classe, com as contagens que as originaram.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub category: EntityCategory,
    pub counts: ClassCounts,
    pub scores: Prf,
}

/// Relatório completo de uma sessão.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub per_class: Vec<ClassMetrics>,
    pub micro: Prf,
    pub macro_avg: Prf,
    /// Métrica que ignora a classe ("ignore-class"): só a fronteira do span conta
    pub boundary: Prf,
    pub corr_num: u64,
    pub pred_num: u64,
    pub gold_num: u64,
}

/// Leitura (nunca escrita) de um acumulador.
#[derive(Debug, Clone, Copy)]
pub struct Evaluator<'a> {
    accumulator: &'a ConfusionAccumulator,
    zero_division: ZeroDivision,
}

impl<'a> Evaluator<'a> {
    pub fn new(accumulator: &'a ConfusionAccumulator, zero_division: ZeroDivision) -> Self {
        Self {
            accumulator,
            zero_division,
        }
    }

    fn ratio(&self, num: u64, den: u64) -> f64 {
        if den == 0 {
            self.zero_division.value()
        } else {
            num as f64 / den as f64
        }
    }

    /// Calcula todas as agregações.
    pub fn report(&self) -> EvaluationReport {
        let acc = self.accumulator;
        let mut per_class = Vec::with_capacity(EntityCategory::COUNT);
        let (mut tp_sum, mut pred_sum, mut gold_sum) = (0u64, 0u64, 0u64);
        let (mut macro_p, mut macro_r) = (0.0, 0.0);

        for category in EntityCategory::ALL {
            let counts = acc.counts(category);
            let precision = self.ratio(counts.tp, counts.tp + counts.fp);
            let recall = self.ratio(counts.tp, counts.tp + counts.fn_);
            macro_p += precision;
            macro_r += recall;
            tp_sum += counts.tp;
            pred_sum += counts.tp + counts.fp;
            gold_sum += counts.tp + counts.fn_;
            per_class.push(ClassMetrics {
                category,
                counts,
                scores: Prf::from_ratios(precision, recall),
            });
        }

        let n = EntityCategory::COUNT as f64;
        EvaluationReport {
            per_class,
            micro: Prf::from_ratios(self.ratio(tp_sum, pred_sum), self.ratio(tp_sum, gold_sum)),
            macro_avg: Prf::from_ratios(macro_p / n, macro_r / n),
            boundary: Prf::from_ratios(
                self.ratio(acc.corr_num, acc.pred_num),
                self.ratio(acc.corr_num, acc.gold_num),
            ),
            corr_num: acc.corr_num,
            pred_num: acc.pred_num,
            gold_num: acc.gold_num,
        }
    }

    /// Retorna `(precisão, recall, F1)` micro; com `verbose`, escreve o relatório no log.
    ///
    /// Idempotente: o acumulador não é alterado.
    pub fn evaluate(&self, verbose: bool) -> (f64, f64, f64) {
        let report = self.report();
        if verbose {
            log_report(&report);
        }
        (report.micro.precision, report.micro.recall, report.micro.f1)
    }
}

/// Média harmônica; `NaN` se algum lado for indefinido, `0` se ambos forem zero.
fn harmonic(precision: f64, recall: f64) -> f64 {
    if precision.is_nan() || recall.is_nan() {
        return f64::NAN;
    }
    if precision + recall == 0.0 {
        return 0.0;
    }
    2.0 * precision * recall / (precision + recall)
}

/// Escreve tabelas de contagem e as métricas no formato de relatório.
pub fn log_report(report: &EvaluationReport) {
    let table = |pick: fn(&ClassCounts) -> u64| -> String {
        report
            .per_class
            .iter()
            .map(|m| format!("{}: {}", m.category, pick(&m.counts)))
            .collect::<Vec<_>>()
            .join(", ")
    };
    info!("TP {{{}}}", table(|c: &ClassCounts| c.tp));
    info!("FP {{{}}}", table(|c: &ClassCounts| c.fp));
    info!("FN {{{}}}", table(|c: &ClassCounts| c.fn_));

    for m in &report.per_class {
        info!("{} {}", m.category, format_prf(&m.scores));
    }
    info!("micro {}", format_prf(&report.micro));
    info!("macro {}", format_prf(&report.macro_avg));
    info!("ignore-class {}", format_prf(&report.boundary));
}

fn format_prf(prf: &Prf) -> String {
    format!("pre: {:.4} rec: {:.4} f1:  {:.4}", prf.precision, prf.recall, prf.f1)
}

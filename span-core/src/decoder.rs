//! # Decodificador de Spans — Resolução Gulosa de Conflitos
//!
//! Recebe os candidatos pontuados de **uma** sentença e escolhe um subconjunto
//! sem sobreposição. A decisão é uma sequência de flags `keep`, inicializadas
//! como `true` onde o rótulo predito não é `NONE`, e refinadas em três fases:
//!
//! 1. **Limiar**: score abaixo do threshold → descartado.
//! 2. **Mesmo início**: entre candidatos vizinhos com o mesmo `begin`, só o último
//!    (o de maior score, pela ordenação da entrada) sobrevive.
//! 3. **Sobreposição (ponto fixo)**: para cada mantido `i`, olha o próximo mantido `j`;
//!    se `j` começa antes do fim de `i`, descarta o de menor score (empate mantém `i`).
//!    Qualquer descarte reinicia a varredura do topo, até uma passada sem mudanças.
//!
//! A fase 3 **não** é um escalonamento ótimo de intervalos ponderados: é um ponto
//! fixo local e determinístico. Trocar por uma varredura linear única muda o
//! desempate em cadeias de 3+ spans sobrepostos.
//!
//! ## Pré-condição
//!
//! Candidatos ordenados por `begin` crescente e, com o mesmo `begin`, por score
//! crescente. Com `check_order` ligado, a violação é rejeitada antes de qualquer
//! contagem.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::DecodeConfig;
use crate::error::DecodeError;
use crate::label::Label;
use crate::metrics::ConfusionAccumulator;

/// Um candidato pontuado emitido pelo modelo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpanPred {
    /// Token inicial (inclusivo)
    pub begin: usize,
    /// Token final (inclusivo)
    pub end: usize,
    /// Id do rótulo no vocabulário do modelo
    pub label_id: usize,
    /// Log-probabilidade; maior = mais confiante
    pub score: f64,
    pub predicted: Label,
    pub gold: Label,
    /// Texto do trecho, só para diagnóstico
    pub fragment: String,
}

impl SpanPred {
    pub fn new(
        begin: usize,
        end: usize,
        label_id: usize,
        score: f64,
        predicted: Label,
        gold: Label,
        fragment: impl Into<String>,
    ) -> Self {
        Self {
            begin,
            end,
            label_id,
            score,
            predicted,
            gold,
            fragment: fragment.into(),
        }
    }

    pub fn overlaps(&self, other: &SpanPred) -> bool {
        (other.begin >= self.begin && other.begin <= self.end)
            || (self.begin >= other.begin && self.begin <= other.end)
    }
}

/// Aplica a resolução de conflitos e registra o resultado no acumulador.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpanDecoder {
    config: DecodeConfig,
}

impl SpanDecoder {
    /// `config` deve ter passado por [`DecodeConfig::validate`] (ou
    /// [`EvalConfig::validate`](crate::config::EvalConfig::validate)): um
    /// threshold NaN desligaria o filtro de limiar sem erro algum.
    pub fn new(config: DecodeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DecodeConfig {
        &self.config
    }

    /// Verifica a ordenação exigida da entrada.
    pub fn check_order(preds: &[SpanPred]) -> Result<(), DecodeError> {
        for (index, pair) in preds.windows(2).enumerate() {
            let (cur, next) = (&pair[0], &pair[1]);
            if next.begin < cur.begin || (next.begin == cur.begin && next.score < cur.score) {
                return Err(DecodeError::Unsorted { index: index + 1 });
            }
        }
        Ok(())
    }

    /// Calcula as flags `keep` sem tocar em nenhum contador.
    pub fn resolve(&self, preds: &[SpanPred]) -> Result<Vec<bool>, DecodeError> {
        if self.config.check_order {
            Self::check_order(preds)?;
        }

        let mut keep: Vec<bool> = preds.iter().map(|p| p.predicted.is_entity()).collect();

        // Limiar
        for (flag, pred) in keep.iter_mut().zip(preds) {
            if pred.score < self.config.threshold {
                *flag = false;
            }
        }

        // Mesmo início: o último do grupo tem o maior score
        for i in 1..preds.len() {
            if preds[i].begin == preds[i - 1].begin {
                keep[i - 1] = false;
            }
        }

        // Sobreposição até o ponto fixo
        loop {
            let mut no_conflict = true;
            for i in 0..preds.len() {
                if !keep[i] {
                    continue;
                }
                let Some(j) = (i + 1..preds.len()).find(|&j| keep[j]) else {
                    continue;
                };
                if preds[j].begin <= preds[i].end {
                    if preds[j].score > preds[i].score {
                        keep[i] = false;
                    } else {
                        keep[j] = false;
                    }
                    no_conflict = false;
                }
            }
            if no_conflict {
                break;
            }
        }

        Ok(keep)
    }

    /// Decodifica uma sentença e atualiza `acc` com a tabela de regras.
    ///
    /// Retorna as flags finais. Em erro de ordenação nada é contado.
    pub fn decode(
        &self,
        preds: &[SpanPred],
        acc: &mut ConfusionAccumulator,
    ) -> Result<Vec<bool>, DecodeError> {
        let keep = self.resolve(preds)?;

        if self.config.verbose {
            for (pred, &kept) in preds.iter().zip(&keep) {
                if kept || pred.gold.is_entity() {
                    info!("{}", diagnostic_line(pred, kept));
                }
            }
        }

        for (pred, &kept) in preds.iter().zip(&keep) {
            acc.record(pred, kept);
        }
        Ok(keep)
    }
}

/// Linha de diagnóstico: `+`/`-`, rótulo predito/gold e o fragmento.
pub fn diagnostic_line(pred: &SpanPred, kept: bool) -> String {
    format!(
        "{} {:>4}/{:4} {}",
        if kept { "+" } else { "-" },
        pred.predicted.name(),
        pred.gold.name(),
        pred.fragment
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::label::EntityCategory;

    const PER: Label = Label::Entity(EntityCategory::Per);
    const ORG: Label = Label::Entity(EntityCategory::Org);
    const NONE: Label = Label::None;

    fn p(begin: usize, end: usize, score: f64, predicted: Label, gold: Label) -> SpanPred {
        SpanPred::new(begin, end, 0, score, predicted, gold, format!("{begin}~{end}"))
    }

    fn decoder(threshold: f64) -> SpanDecoder {
        SpanDecoder::new(DecodeConfig {
            threshold,
            verbose: false,
            check_order: true,
        })
    }

    fn assert_disjoint(preds: &[SpanPred], keep: &[bool]) {
        let kept: Vec<&SpanPred> = preds.iter().zip(keep).filter(|(_, k)| **k).map(|(p, _)| p).collect();
        for (a, x) in kept.iter().enumerate() {
            for y in kept.iter().skip(a + 1) {
                assert!(!x.overlaps(y), "{x:?} sobrepõe {y:?}");
            }
        }
    }

    /// Gerador determinístico simples para os testes de propriedade.
    struct Lcg(u64);

    impl Lcg {
        fn next(&mut self) -> u64 {
            self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            self.0 >> 33
        }
    }

    fn random_sentence(rng: &mut Lcg) -> Vec<SpanPred> {
        let labels = [PER, ORG, NONE];
        let mut preds = Vec::new();
        for begin in 0..8 {
            let n = rng.next() % 4;
            let mut scores: Vec<f64> = (0..n).map(|_| -((rng.next() % 80) as f64) / 10.0).collect();
            scores.sort_by(|a, b| a.partial_cmp(b).unwrap());
            for score in scores {
                let end = begin + (rng.next() % 3) as usize;
                let predicted = labels[(rng.next() % 3) as usize];
                let gold = labels[(rng.next() % 3) as usize];
                preds.push(p(begin, end, score, predicted, gold));
            }
        }
        preds
    }

    #[test]
    fn test_concrete_scenario_same_begin_dedup() {
        let preds = vec![
            p(0, 0, 0.9, PER, PER),
            p(0, 1, 0.95, PER, NONE),
            p(2, 2, 0.1, NONE, NONE),
        ];
        let mut acc = ConfusionAccumulator::new();
        let keep = decoder(-10.0).decode(&preds, &mut acc).unwrap();

        assert_eq!(keep, vec![false, true, false]);
        let per = acc.counts(EntityCategory::Per);
        assert_eq!(per.fp, 1);
        // o primeiro tinha gold PER e foi descartado
        assert_eq!(per.fn_, 1);
        assert_eq!(per.tp, 0);
        assert_eq!((acc.corr_num, acc.pred_num, acc.gold_num), (0, 1, 1));
    }

    #[test]
    fn test_gold_entity_dropped_by_threshold_counts_as_false_negative() {
        let preds = vec![p(0, 1, -6.0, ORG, ORG)];
        let mut acc = ConfusionAccumulator::new();
        let keep = decoder(-4.0).decode(&preds, &mut acc).unwrap();
        assert_eq!(keep, vec![false]);
        assert_eq!(acc.counts(EntityCategory::Org).fn_, 1);
        assert_eq!(acc.gold_num, 1);
        assert_eq!(acc.pred_num, 0);
    }

    #[test]
    fn test_overlap_keeps_higher_score() {
        let preds = vec![p(0, 2, -3.0, PER, PER), p(1, 3, -1.0, ORG, NONE)];
        let keep = decoder(-10.0).resolve(&preds).unwrap();
        assert_eq!(keep, vec![false, true]);
    }

    #[test]
    fn test_overlap_tie_keeps_earlier_span() {
        let preds = vec![p(0, 2, -2.0, PER, PER), p(2, 3, -2.0, ORG, ORG)];
        let keep = decoder(-10.0).resolve(&preds).unwrap();
        assert_eq!(keep, vec![true, false]);
    }

    #[test]
    fn test_adjacent_spans_do_not_conflict() {
        let preds = vec![p(0, 1, -2.0, PER, PER), p(2, 3, -1.0, ORG, ORG)];
        let keep = decoder(-10.0).resolve(&preds).unwrap();
        assert_eq!(keep, vec![true, true]);
    }

    #[test]
    fn test_chain_of_three_is_resolved_by_fixed_point() {
        // A=[0,4] -1.0, B=[2,5] -2.0, C=[5,6] -0.5
        // passada 1: A vs B → B cai; A vs C sem conflito (5 > 4)
        let preds = vec![
            p(0, 4, -1.0, PER, PER),
            p(2, 5, -2.0, ORG, NONE),
            p(5, 6, -0.5, ORG, ORG),
        ];
        let keep = decoder(-10.0).resolve(&preds).unwrap();
        assert_eq!(keep, vec![true, false, true]);
        assert_disjoint(&preds, &keep);
    }

    #[test]
    fn test_removal_exposes_new_conflict() {
        // A=[0,3] -3, B=[1,1] -1, C=[2,4] -2
        // passada 1: A vs B → A cai; B vs C sem conflito.
        // passada 2: nada muda. Resultado: B e C.
        let preds = vec![
            p(0, 3, -3.0, PER, PER),
            p(1, 1, -1.0, PER, NONE),
            p(2, 4, -2.0, ORG, ORG),
        ];
        let keep = decoder(-10.0).resolve(&preds).unwrap();
        assert_eq!(keep, vec![false, true, true]);

        // A=[0,1] -1, B=[1,3] -2, C=[3,3] -3: B cai por A, depois A e C não conflitam
        let preds = vec![
            p(0, 1, -1.0, PER, PER),
            p(1, 3, -2.0, ORG, NONE),
            p(3, 3, -3.0, ORG, ORG),
        ];
        let keep = decoder(-10.0).resolve(&preds).unwrap();
        assert_eq!(keep, vec![true, false, true]);
    }

    #[test]
    fn test_none_predictions_are_never_kept() {
        let preds = vec![p(0, 0, 0.0, NONE, PER)];
        let mut acc = ConfusionAccumulator::new();
        let keep = decoder(-10.0).decode(&preds, &mut acc).unwrap();
        assert_eq!(keep, vec![false]);
        assert_eq!(acc.counts(EntityCategory::Per).fn_, 1);
    }

    #[test]
    fn test_unsorted_input_is_rejected_without_counting() {
        let preds = vec![p(2, 2, -1.0, PER, PER), p(0, 0, -1.0, PER, PER)];
        let mut acc = ConfusionAccumulator::new();
        let err = decoder(-10.0).decode(&preds, &mut acc).unwrap_err();
        assert_eq!(err, DecodeError::Unsorted { index: 1 });
        assert_eq!(acc, ConfusionAccumulator::new());

        let preds = vec![p(0, 0, -1.0, PER, PER), p(0, 1, -2.0, PER, PER)];
        assert!(SpanDecoder::check_order(&preds).is_err());
    }

    #[test]
    fn test_trusted_input_skips_order_check() {
        let preds = vec![p(0, 0, -1.0, PER, PER), p(0, 1, -2.0, ORG, NONE)];
        let trusting = SpanDecoder::new(DecodeConfig {
            threshold: -10.0,
            verbose: false,
            check_order: false,
        });
        // sem validação o último do grupo vence, mesmo com score menor
        assert_eq!(trusting.resolve(&preds).unwrap(), vec![false, true]);
    }

    #[test]
    fn test_empty_sentence() {
        let mut acc = ConfusionAccumulator::new();
        let keep = decoder(-4.0).decode(&[], &mut acc).unwrap();
        assert!(keep.is_empty());
        assert_eq!(acc, ConfusionAccumulator::new());
    }

    #[test]
    fn test_properties_on_generated_sentences() {
        let mut rng = Lcg(42);
        let thresholds = [-10.0, -6.0, -4.0, -2.0, -0.5, 0.0];
        let mut acc = ConfusionAccumulator::new();

        for _ in 0..200 {
            let preds = random_sentence(&mut rng);

            for &threshold in &thresholds {
                let keep = decoder(threshold).resolve(&preds).unwrap();
                assert_eq!(keep.len(), preds.len());
                assert_disjoint(&preds, &keep);

                // no máximo um sobrevivente por begin
                for (i, a) in preds.iter().enumerate() {
                    for (j, b) in preds.iter().enumerate().skip(i + 1) {
                        if a.begin == b.begin {
                            assert!(!(keep[i] && keep[j]));
                        }
                    }
                }

                // nada abaixo do limiar sobrevive
                for (pred, kept) in preds.iter().zip(&keep) {
                    if *kept {
                        assert!(pred.score >= threshold);
                        assert!(pred.predicted.is_entity());
                    }
                }
            }

            decoder(-4.0).decode(&preds, &mut acc).unwrap();
            assert!(acc.is_consistent());
        }
    }

    #[test]
    fn test_raising_threshold_can_keep_more_spans() {
        // Com W presente, X e W são comparados primeiro e Y vs Z acontece na mesma
        // passada, derrubando Z; sem W, X derruba Y antes e Z sobrevive.
        let preds = vec![
            p(0, 3, -1.0, PER, PER),
            p(1, 1, -5.0, ORG, NONE),
            p(3, 5, -2.0, ORG, ORG),
            p(5, 6, -3.0, PER, PER),
        ];
        let low = decoder(-10.0).resolve(&preds).unwrap();
        let high = decoder(-4.0).resolve(&preds).unwrap();
        assert_eq!(low, vec![true, false, false, false]);
        assert_eq!(high, vec![true, false, false, true]);
    }

    #[test]
    fn test_diagnostic_line_format() {
        let line = diagnostic_line(&p(0, 1, -1.0, PER, NONE), true);
        assert_eq!(line, "+  PER/NONE 0~1");
        let line = diagnostic_line(&p(0, 1, -1.0, NONE, ORG), false);
        assert_eq!(line, "- NONE/ORG  0~1");
    }
}

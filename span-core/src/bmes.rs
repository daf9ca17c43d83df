//! # Esquema de Tags BMES
//!
//! Convenção de anotação por caractere usada nos corpora de NER em chinês
//! (ex: OntoNotes 4). Cada token carrega seu papel dentro do span:
//!
//! - `B-TAG`: Begin — primeiro token de uma entidade de vários tokens
//! - `M-TAG`: Middle — tokens internos
//! - `E-TAG`: End — último token
//! - `S-TAG`: Single — entidade de um único token
//! - `O`: Outside — não é parte de nenhuma entidade (tag vazia equivale a `O`)
//!
//! A segmentação de palavras usa o mesmo alfabeto sem sufixo (`B`, `M`, `E`, `S`).

use serde::{Deserialize, Serialize};

use crate::label::EntityCategory;

/// Tag BMES de NER aplicada a um token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BmesTag {
    Begin(EntityCategory),
    Middle(EntityCategory),
    End(EntityCategory),
    Single(EntityCategory),
    Outside,
}

impl BmesTag {
    /// Representação textual (ex: "B-PER", "E-GPE", "O")
    pub fn label(&self) -> String {
        match self {
            BmesTag::Begin(cat) => format!("B-{}", cat.name()),
            BmesTag::Middle(cat) => format!("M-{}", cat.name()),
            BmesTag::End(cat) => format!("E-{}", cat.name()),
            BmesTag::Single(cat) => format!("S-{}", cat.name()),
            BmesTag::Outside => "O".to_string(),
        }
    }

    /// Parseia uma tag a partir de string (ex: "M-ORG" → Middle(Org)).
    ///
    /// Token sem anotação (tag vazia) conta como `O`.
    pub fn from_label(s: &str) -> Option<Self> {
        let s = s.trim();
        if s.is_empty() || s == "O" {
            return Some(BmesTag::Outside);
        }
        let (state, label) = s.split_once('-')?;
        let cat = EntityCategory::from_str(label)?;
        match state {
            "B" => Some(BmesTag::Begin(cat)),
            "M" => Some(BmesTag::Middle(cat)),
            "E" => Some(BmesTag::End(cat)),
            "S" => Some(BmesTag::Single(cat)),
            _ => None,
        }
    }
}

impl std::fmt::Display for BmesTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Tag de segmentação de palavras.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SegTag {
    B,
    M,
    E,
    S,
}

impl SegTag {
    /// Índice no vocabulário de segmentação (`<PAD>` ocupa o 0).
    pub fn vocab_id(&self) -> usize {
        match self {
            SegTag::B => 1,
            SegTag::M => 2,
            SegTag::E => 3,
            SegTag::S => 4,
        }
    }

    pub fn from_label(s: &str) -> Option<Self> {
        match s {
            "B" => Some(SegTag::B),
            "M" => Some(SegTag::M),
            "E" => Some(SegTag::E),
            "S" => Some(SegTag::S),
            _ => None,
        }
    }
}

/// Um caractere da sentença com suas anotações de NER e de segmentação.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
    pub ch: String,
    pub ner_tag: String,
    pub seg_tag: SegTag,
}

impl TokenRecord {
    pub fn new(ch: impl Into<String>, ner_tag: impl Into<String>, seg_tag: SegTag) -> Self {
        Self {
            ch: ch.into(),
            ner_tag: ner_tag.into(),
            seg_tag,
        }
    }
}

//! # Rótulos de Entidade
//!
//! Define o conjunto **fechado** de classes de entidade avaliadas e o rótulo
//! tipado que substitui o sentinela textual `"NONE"` dos logs de predição.
//!
//! | Nome | Significado                  | Exemplos               |
//! |------|------------------------------|------------------------|
//! | GPE  | Entidade geopolítica         | China, Pequim          |
//! | LOC  | Local geográfico             | Rio Yangtzé, Himalaia  |
//! | ORG  | Organização                  | Xinhua, ONU            |
//! | PER  | Pessoa                       | Deng Xiaoping          |
//! | NONE | Ausência de entidade no span | (qualquer outro trecho)|

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Classes de entidade reconhecidas pelo avaliador.
///
/// A ordem das variantes é a ordem de avaliação e de impressão dos relatórios.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EntityCategory {
    /// **Entidade geopolítica**: países, cidades, estados.
    Gpe,
    /// **Local**: rios, montanhas, regiões sem estatuto político.
    Loc,
    /// **Organização**: empresas, instituições, órgãos públicos.
    Org,
    /// **Pessoa**: nomes de pessoas reais ou fictícias.
    Per,
}

impl EntityCategory {
    /// Número de classes reais (exclui `NONE`).
    pub const COUNT: usize = 4;

    /// Todas as classes na ordem de avaliação.
    pub const ALL: [EntityCategory; 4] = [
        EntityCategory::Gpe,
        EntityCategory::Loc,
        EntityCategory::Org,
        EntityCategory::Per,
    ];

    /// Nome da classe como aparece nos logs e nos arquivos BMES
    pub fn name(&self) -> &'static str {
        match self {
            EntityCategory::Gpe => "GPE",
            EntityCategory::Loc => "LOC",
            EntityCategory::Org => "ORG",
            EntityCategory::Per => "PER",
        }
    }

    /// Índice estável usado pelas tabelas de contagem (0..COUNT)
    pub fn index(&self) -> usize {
        match self {
            EntityCategory::Gpe => 0,
            EntityCategory::Loc => 1,
            EntityCategory::Org => 2,
            EntityCategory::Per => 3,
        }
    }

    /// Tenta parsear a partir de string (ex: "PER" → Some(Per))
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "GPE" => Some(EntityCategory::Gpe),
            "LOC" => Some(EntityCategory::Loc),
            "ORG" => Some(EntityCategory::Org),
            "PER" => Some(EntityCategory::Per),
            _ => None,
        }
    }
}

impl std::fmt::Display for EntityCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Rótulo de um span candidato: entidade de uma classe ou "nenhuma entidade".
///
/// Serializa como o próprio nome (`"PER"`, `"NONE"`), igual ao texto dos logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Label {
    /// O span é uma entidade da classe indicada.
    Entity(EntityCategory),
    /// O span não é entidade (`NONE` nos logs).
    None,
}

impl Label {
    /// Texto usado nos logs: o nome da classe ou `"NONE"`.
    pub fn name(&self) -> &'static str {
        match self {
            Label::Entity(cat) => cat.name(),
            Label::None => "NONE",
        }
    }

    /// Classe da entidade, se houver
    pub fn category(&self) -> Option<EntityCategory> {
        match self {
            Label::Entity(cat) => Some(*cat),
            Label::None => None,
        }
    }

    pub fn is_entity(&self) -> bool {
        matches!(self, Label::Entity(_))
    }

    /// Parseia `"NONE"` ou o nome de uma classe conhecida.
    pub fn from_str(s: &str) -> Option<Self> {
        if s == "NONE" {
            return Some(Label::None);
        }
        EntityCategory::from_str(s).map(Label::Entity)
    }
}

impl std::fmt::Display for Label {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for Label {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for Label {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Label::from_str(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("rótulo desconhecido: {raw}")))
    }
}

//! Erros do núcleo de decodificação e avaliação.
//!
//! Cada estágio tem seu próprio tipo: falhas de integridade dos dados anotados
//! ([`SpanError`]), violação da ordenação de entrada do decodificador
//! ([`DecodeError`]), leitura de logs ([`LogError`]) e configuração
//! ([`ConfigError`]). [`SessionError`] agrega os que podem abortar uma sessão.

use std::path::PathBuf;

use thiserror::Error;

/// Falha de integridade em uma sequência de tags BMES.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpanError {
    #[error("tag inválida `{tag}` na posição {position}")]
    InvalidTag { position: usize, tag: String },

    #[error("span aberto na posição {start} nunca foi fechado por uma tag E-")]
    UnclosedSpan { start: usize },

    #[error("tag `{tag}` na posição {position} dentro de um span aberto (esperado M- ou E-)")]
    UnexpectedTag { position: usize, tag: String },

    #[error("tag `{tag}` na posição {position} não pertence a nenhum span aberto")]
    OrphanContinuation { position: usize, tag: String },

    #[error("sentença {sentence}: {source}")]
    InSentence {
        sentence: usize,
        #[source]
        source: Box<SpanError>,
    },
}

/// A lista de candidatos de uma sentença não respeita a ordenação exigida.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("predições fora de ordem no índice {index}: esperado begin crescente e score crescente por begin")]
    Unsorted { index: usize },
}

#[derive(Debug, Error)]
pub enum LogError {
    #[error("falha de leitura do log na linha {line}: {source}")]
    Io {
        line: usize,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("não foi possível ler {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("configuração inválida: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("threshold deve ser um número finito, recebido {0}")]
    InvalidThreshold(f64),
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Log(#[from] LogError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("não foi possível abrir {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

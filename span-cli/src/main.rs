//! Linha de comando para avaliar logs de predição de spans NER.
//!
//! Imprime uma linha `"{idx} {precisão} {recall} {f1}"` (micro) por arquivo.
//! Um arquivo que falha gera `-1 -1 -1` e a execução segue para o próximo.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use span_core::{
    evaluate_parallel, log_adapter::parse_log_str, session::evaluate_log_file, EvalConfig,
    EvaluationReport, ZeroDivision,
};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(
    name = "span-cli",
    version,
    about = "Decodifica logs de spans NER e calcula precisão/recall/F1."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Decodifica um ou mais logs e imprime as métricas micro de cada um
    Decode(DecodeArgs),
}

#[derive(clap::Args, Debug)]
struct DecodeArgs {
    /// Arquivos de log a avaliar
    files: Vec<PathBuf>,

    /// Diretório com logs; entram os arquivos cujo nome contém `--pattern`
    #[arg(long)]
    dir: Option<PathBuf>,

    /// Trecho que o nome do arquivo precisa conter quando `--dir` é usado
    #[arg(long, default_value = "last")]
    pattern: String,

    /// Configuração JSON (os flags abaixo têm precedência)
    #[arg(long, env = "SPAN_EVAL_CONFIG")]
    config: Option<PathBuf>,

    /// Score mínimo para manter um candidato
    #[arg(long, allow_hyphen_values = true)]
    threshold: Option<f64>,

    /// Emite as linhas de diagnóstico e o relatório completo
    #[arg(long)]
    verbose: bool,

    /// Confia na ordenação da entrada (não valida)
    #[arg(long)]
    trust_order: bool,

    /// Reporta 0 em vez de NaN para divisões por zero
    #[arg(long)]
    zero_division_as_zero: bool,

    /// Decodifica as sentenças em paralelo
    #[arg(long)]
    parallel: bool,
}

impl DecodeArgs {
    fn eval_config(&self) -> Result<EvalConfig> {
        let mut config = match &self.config {
            Some(path) => EvalConfig::from_path(path)?,
            None => EvalConfig::default(),
        };
        if let Some(t) = self.threshold {
            config.threshold = t;
        }
        config.verbose |= self.verbose;
        if self.trust_order {
            config.check_order = false;
        }
        if self.zero_division_as_zero {
            config.zero_division = ZeroDivision::Zero;
        }
        Ok(config.validate()?)
    }

    fn inputs(&self) -> Result<Vec<PathBuf>> {
        let mut files = self.files.clone();
        if let Some(dir) = &self.dir {
            let mut found: Vec<PathBuf> = std::fs::read_dir(dir)
                .with_context(|| format!("não foi possível listar {}", dir.display()))?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|path| {
                    path.file_name()
                        .and_then(|n| n.to_str())
                        .is_some_and(|n| n.contains(&self.pattern))
                })
                .collect();
            found.sort();
            files.extend(found);
        }
        if files.is_empty() {
            bail!("nenhum arquivo de log informado (use FILES ou --dir)");
        }
        Ok(files)
    }
}

fn evaluate_file(path: &Path, config: &EvalConfig, parallel: bool) -> Result<EvaluationReport> {
    if parallel {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("não foi possível ler {}", path.display()))?;
        let blocks = parse_log_str(&text)?;
        return Ok(evaluate_parallel(&blocks, config));
    }
    Ok(evaluate_log_file(path, config)?)
}

fn run_decode(args: DecodeArgs) -> Result<()> {
    let config = args.eval_config()?;
    let files = args.inputs()?;
    info!(files = files.len(), threshold = config.threshold, "avaliando logs");

    for (idx, path) in files.iter().enumerate() {
        match evaluate_file(path, &config, args.parallel) {
            Ok(report) => {
                println!("{} {} {} {}", idx, report.micro.precision, report.micro.recall, report.micro.f1);
            }
            Err(e) => {
                error!("{}: {e:#}", path.display());
                println!("{idx} -1 -1 -1");
            }
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Decode(args) => run_decode(args),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negative_threshold_is_accepted() {
        let cli = Cli::try_parse_from(["span-cli", "decode", "a.txt", "--threshold", "-10"]).unwrap();
        let Commands::Decode(args) = cli.command;
        assert_eq!(args.threshold, Some(-10.0));
        assert_eq!(args.files, vec![PathBuf::from("a.txt")]);
        assert_eq!(args.eval_config().unwrap().threshold, -10.0);
    }

    #[test]
    fn test_flags_override_defaults() {
        let cli = Cli::try_parse_from([
            "span-cli",
            "decode",
            "a.txt",
            "--trust-order",
            "--zero-division-as-zero",
        ])
        .unwrap();
        let Commands::Decode(args) = cli.command;
        let config = args.eval_config().unwrap();
        assert!(!config.check_order);
        assert_eq!(config.zero_division, ZeroDivision::Zero);
        assert_eq!(config.threshold, EvalConfig::DEFAULT_THRESHOLD);
    }

    #[test]
    fn test_missing_inputs_is_an_error() {
        let cli = Cli::try_parse_from(["span-cli", "decode"]).unwrap();
        let Commands::Decode(args) = cli.command;
        assert!(args.inputs().is_err());
    }
}

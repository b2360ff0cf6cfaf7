//! CLI adapter for the tender-analysis core.
//!
//! Exit codes: 0 success, 2 usage error (clap), 3 configuration error,
//! 4 analysis failed, 5 dependency unavailable.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};

use licitar::api::{self, AppState};
use licitar::config::AnalysisConfig;
use licitar::models::{AnalysisLevel, DocType, OverallStatus};
use licitar::pipeline::context::AnalysisContext;
use licitar::pipeline::embedding::EmbeddingError;
use licitar::pipeline::orchestrator::{AnalysisRunner, RunError, RunRequest};
use licitar::pipeline::report::ReportBundle;

const EXIT_CONFIG: u8 = 3;
const EXIT_ANALYSIS: u8 = 4;
const EXIT_DEPENDENCY: u8 = 5;

#[derive(Parser)]
#[command(name = "licitar", version, about = "Análisis de documentos de licitación")]
struct Cli {
    /// Path to a JSON configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum CliDocType {
    Rfp,
    Proposal,
    Contract,
}

impl From<CliDocType> for DocType {
    fn from(value: CliDocType) -> Self {
        match value {
            CliDocType::Rfp => DocType::Rfp,
            CliDocType::Proposal => DocType::Proposal,
            CliDocType::Contract => DocType::Contract,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum CliLevel {
    Basic,
    Comprehensive,
}

impl From<CliLevel> for AnalysisLevel {
    fn from(value: CliLevel) -> Self {
        match value {
            CliLevel::Basic => AnalysisLevel::Basic,
            CliLevel::Comprehensive => AnalysisLevel::Comprehensive,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Analyze one document and print the artifact as JSON.
    Analyze {
        path: PathBuf,
        #[arg(long, value_enum)]
        doc_type: Option<CliDocType>,
        #[arg(long, value_enum, default_value = "comprehensive")]
        level: CliLevel,
        #[arg(long)]
        force_rebuild: bool,
    },
    /// Analyze several documents and print the comparison as JSON.
    Compare {
        paths: Vec<PathBuf>,
        #[arg(long, value_enum, default_value = "comprehensive")]
        level: CliLevel,
    },
    /// Render a stored artifact or comparison as a report.
    Report {
        id: String,
        #[arg(long, default_value = "analysis")]
        report_type: String,
        #[arg(long, default_value = "json")]
        format: String,
    },
    /// Poll the status of a run.
    Status { run_id: String },
    /// Serve the HTTP API.
    Serve {
        #[arg(long, default_value = "127.0.0.1:8085")]
        addr: String,
    },
}

fn main() -> ExitCode {
    licitar::init_tracing();
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error de configuración: {e}");
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    let ctx = match AnalysisContext::from_config(config) {
        Ok(ctx) => ctx,
        Err(e) => {
            eprintln!("no se pudo inicializar el contexto: {e}");
            return ExitCode::from(dependency_or_config(&e));
        }
    };
    let runner = AnalysisRunner::new(ctx);

    match cli.command {
        Command::Analyze {
            path,
            doc_type,
            level,
            force_rebuild,
        } => {
            let request = RunRequest {
                path,
                declared_type: doc_type.map(Into::into),
                level: level.into(),
                force_rebuild,
            };
            match runner.run(&request) {
                Ok(artifact) => {
                    print_json(&artifact);
                    if artifact.overall_status == OverallStatus::Failed {
                        ExitCode::from(EXIT_ANALYSIS)
                    } else {
                        ExitCode::SUCCESS
                    }
                }
                Err(e) => run_error_exit(e),
            }
        }
        Command::Compare { paths, level } => {
            if paths.len() < 2 {
                eprintln!("la comparación requiere al menos dos documentos");
                return ExitCode::from(2);
            }
            let requests: Vec<RunRequest> = paths
                .into_iter()
                .map(|path| RunRequest {
                    path,
                    declared_type: None,
                    level: level.into(),
                    force_rebuild: false,
                })
                .collect();
            match runner.compare(&requests) {
                Ok(comparison) => {
                    print_json(&comparison);
                    ExitCode::SUCCESS
                }
                Err(e) => run_error_exit(e),
            }
        }
        Command::Report {
            id,
            report_type,
            format,
        } => report_command(&runner, &id, &report_type, &format),
        Command::Status { run_id } => match runner.status(&run_id) {
            Ok(status) => {
                print_json(&status);
                ExitCode::SUCCESS
            }
            Err(e) => run_error_exit(e),
        },
        Command::Serve { addr } => {
            let state = Arc::new(AppState::new(Arc::new(runner)));
            let runtime = match tokio::runtime::Runtime::new() {
                Ok(runtime) => runtime,
                Err(e) => {
                    eprintln!("no se pudo crear el runtime: {e}");
                    return ExitCode::from(EXIT_DEPENDENCY);
                }
            };
            match runtime.block_on(api::serve(state, &addr)) {
                Ok(()) => ExitCode::SUCCESS,
                Err(e) => {
                    eprintln!("el servidor terminó con error: {e}");
                    ExitCode::from(EXIT_DEPENDENCY)
                }
            }
        }
    }
}

fn load_config(path: Option<&std::path::Path>) -> Result<AnalysisConfig, licitar::config::ConfigError> {
    match path {
        Some(path) => AnalysisConfig::load(path),
        None => {
            let config = AnalysisConfig::default();
            config.validate()?;
            Ok(config)
        }
    }
}

fn report_command(runner: &AnalysisRunner, id: &str, report_type: &str, format: &str) -> ExitCode {
    let bundle = match report_type {
        "analysis" => match runner.store().load_artifact(id) {
            Ok(Some(artifact)) => ReportBundle::from_artifact(&artifact),
            Ok(None) => {
                eprintln!("no existe el artefacto {id}");
                return ExitCode::from(EXIT_ANALYSIS);
            }
            Err(e) => {
                eprintln!("error leyendo el artefacto: {e}");
                return ExitCode::from(EXIT_ANALYSIS);
            }
        },
        "comparison" => match runner.store().load_comparison(id) {
            Ok(Some(comparison)) => ReportBundle::from_comparison(&comparison),
            Ok(None) => {
                eprintln!("no existe la comparación {id}");
                return ExitCode::from(EXIT_ANALYSIS);
            }
            Err(e) => {
                eprintln!("error leyendo la comparación: {e}");
                return ExitCode::from(EXIT_ANALYSIS);
            }
        },
        other => {
            eprintln!("tipo de reporte no reconocido: {other}");
            return ExitCode::from(2);
        }
    };

    match format {
        "json" => match bundle.to_json() {
            Ok(json) => {
                println!("{json}");
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("error serializando el reporte: {e}");
                ExitCode::from(EXIT_ANALYSIS)
            }
        },
        "html" => {
            println!("{}", bundle.to_html());
            ExitCode::SUCCESS
        }
        "pdf" => {
            eprintln!("la generación de PDF corre en un renderizador externo");
            ExitCode::from(2)
        }
        other => {
            eprintln!("formato no reconocido: {other}");
            ExitCode::from(2)
        }
    }
}

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{json}"),
        Err(e) => eprintln!("error serializando la salida: {e}"),
    }
}

fn run_error_exit(error: RunError) -> ExitCode {
    eprintln!("análisis fallido: {error}");
    match error {
        RunError::Embedding(EmbeddingError::Unavailable)
        | RunError::VectorStore(licitar::pipeline::vectorstore::VectorStoreError::Unavailable(_)) => {
            ExitCode::from(EXIT_DEPENDENCY)
        }
        _ => ExitCode::from(EXIT_ANALYSIS),
    }
}

fn dependency_or_config(error: &licitar::pipeline::context::ContextError) -> u8 {
    match error {
        licitar::pipeline::context::ContextError::Config(_) => EXIT_CONFIG,
        _ => EXIT_DEPENDENCY,
    }
}

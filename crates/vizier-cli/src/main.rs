use anyhow::{bail, Context, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use serde_json::Value as Json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use vizier_core::{InMemoryRegistry, Orchestrator, PipelineConfig, PipelineRequest, VisualizationArtifact};
use vizier_knowledge::{JsonFileStore, KnowledgeBase, MergePolicy};
use vizier_llm::OllamaModel;
use vizier_plan::{Dataset, VegaLiteRenderer};

fn cli() -> Command {
    let config_arg = Arg::new("config")
        .long("config")
        .value_parser(value_parser!(PathBuf))
        .global(true)
        .help("TOML configuration file");
    let kb_arg = Arg::new("kb")
        .long("kb")
        .value_parser(value_parser!(PathBuf))
        .global(true)
        .help("Knowledge base file (overrides the configuration)");

    Command::new("vizier")
        .version(vizier_core::VERSION)
        .about("Turn a dataset and a plain-language request into a chart")
        .arg_required_else_help(true)
        .arg(config_arg)
        .arg(kb_arg)
        .subcommand(
            Command::new("run")
                .about("Run one visualization request")
                .arg(
                    Arg::new("data")
                        .long("data")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("JSON array of row objects"),
                )
                .arg(
                    Arg::new("requirement")
                        .long("requirement")
                        .short('r')
                        .required(true)
                        .help("What to show, in plain language"),
                )
                .arg(
                    Arg::new("label")
                        .long("label")
                        .action(ArgAction::Append)
                        .value_name("COLUMN=LABEL")
                        .help("Assert a business label for a column"),
                )
                .arg(
                    Arg::new("output")
                        .long("output")
                        .short('o')
                        .value_parser(value_parser!(PathBuf))
                        .help("Write the Vega-Lite document here"),
                )
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Print the full artifact or failure as JSON"),
                ),
        )
        .subcommand(
            Command::new("kb")
                .about("Inspect or correct the knowledge base")
                .subcommand_required(true)
                .subcommand(
                    Command::new("show")
                        .about("Show the entry for a technical column name")
                        .arg(Arg::new("column").required(true)),
                )
                .subcommand(
                    Command::new("override")
                        .about("Set a label with full confidence")
                        .arg(Arg::new("column").required(true))
                        .arg(Arg::new("label").required(true)),
                )
                .subcommand(
                    Command::new("feedback")
                        .about("Confirm or reject a label")
                        .arg(Arg::new("column").required(true))
                        .arg(Arg::new("label").required(true))
                        .arg(
                            Arg::new("negative")
                                .long("negative")
                                .action(ArgAction::SetTrue)
                                .help("The label is wrong"),
                        ),
                ),
        )
        .subcommand(Command::new("config").about("Print the effective configuration"))
}

#[tokio::main]
async fn main() {
    init_tracing();

    let matches = cli().get_matches();
    match dispatch(&matches).await {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            tracing::error!(error = %err, "command failed");
            for cause in err.chain().skip(1) {
                tracing::error!(cause = %cause, "caused by");
            }
            std::process::exit(1);
        }
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn dispatch(matches: &ArgMatches) -> Result<i32> {
    let config = load_config(matches)?;

    match matches.subcommand() {
        Some(("run", args)) => run(config, args).await,
        Some(("kb", args)) => {
            knowledge(&config, args)?;
            Ok(0)
        }
        Some(("config", _)) => {
            print!("{}", config.to_toml_string()?);
            Ok(0)
        }
        _ => Ok(0),
    }
}

fn load_config(matches: &ArgMatches) -> Result<PipelineConfig> {
    let mut config = match matches.get_one::<PathBuf>("config") {
        Some(path) => PipelineConfig::load(path).with_context(|| format!("loading {}", path.display()))?,
        None => PipelineConfig::default(),
    }
    .apply_env_overrides()?;

    if let Some(path) = matches.get_one::<PathBuf>("kb") {
        config = config.with_knowledge_base_path(path);
    }
    config.validate()?;
    Ok(config)
}

fn open_knowledge_base(config: &PipelineConfig) -> Result<Arc<KnowledgeBase>> {
    let store = JsonFileStore::open(&config.knowledge_base_path)
        .with_context(|| format!("opening knowledge base {}", config.knowledge_base_path.display()))?;
    let policy = MergePolicy::default().with_min_confidence(config.acceptance_threshold);
    Ok(Arc::new(KnowledgeBase::new(Arc::new(store), policy)))
}

fn load_dataset(path: &Path) -> Result<Dataset> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let records: Vec<Json> =
        serde_json::from_str(&raw).with_context(|| format!("{} is not a JSON array of rows", path.display()))?;
    Dataset::from_records(&records).with_context(|| format!("loading rows from {}", path.display()))
}

fn parse_label(pair: &str) -> Result<(String, String)> {
    let Some((column, label)) = pair.split_once('=') else {
        bail!("expected COLUMN=LABEL, got '{pair}'");
    };
    let (column, label) = (column.trim(), label.trim());
    if column.is_empty() || label.is_empty() {
        bail!("expected COLUMN=LABEL, got '{pair}'");
    }
    Ok((column.to_string(), label.to_string()))
}

async fn run(config: PipelineConfig, args: &ArgMatches) -> Result<i32> {
    let Some(data) = args.get_one::<PathBuf>("data") else {
        bail!("--data is required");
    };
    let Some(requirement) = args.get_one::<String>("requirement") else {
        bail!("--requirement is required");
    };
    let json = args.get_flag("json");

    let dataset = load_dataset(data)?;
    tracing::info!(rows = dataset.row_count(), path = %data.display(), "dataset loaded");

    let registry = Arc::new(InMemoryRegistry::new());
    let file_id = registry.register(dataset);

    let mut request = PipelineRequest::new(file_id, requirement.as_str());
    for pair in args.get_many::<String>("label").into_iter().flatten() {
        let (column, label) = parse_label(pair)?;
        request = request.with_override(column, label);
    }

    let knowledge = open_knowledge_base(&config)?;
    let model = Arc::new(OllamaModel::new(config.model.ollama()));
    let orchestrator =
        Orchestrator::new(config, knowledge, model, registry).with_renderer(Arc::new(VegaLiteRenderer));

    let report = orchestrator.execute(request).await;
    match report.outcome {
        Ok(artifact) => {
            if let Some(path) = args.get_one::<PathBuf>("output") {
                write_document(&artifact, path)?;
            }
            if json {
                println!("{}", serde_json::to_string_pretty(artifact.as_ref())?);
            } else {
                print_artifact(&artifact);
            }
            Ok(0)
        }
        Err(failure) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&failure)?);
            } else {
                eprintln!("error: {failure}");
            }
            Ok(1)
        }
    }
}

fn write_document(artifact: &VisualizationArtifact, path: &Path) -> Result<()> {
    let Some(rendered) = &artifact.rendered else {
        bail!("no rendered document for {}", artifact.viz_id);
    };
    let text = serde_json::to_string_pretty(&rendered.document)?;
    std::fs::write(path, text).with_context(|| format!("writing {}", path.display()))?;
    tracing::info!(path = %path.display(), "chart written");
    Ok(())
}

fn print_artifact(artifact: &VisualizationArtifact) {
    println!("{}", artifact.chart_spec.title);
    println!("{}", "=".repeat(artifact.chart_spec.title.chars().count()));
    println!();
    println!("{}", artifact.explanation);
    println!();
    println!("Columns:");
    for (column, mapping) in artifact.schema_mapping.iter() {
        println!(
            "  {column:<20} {:<28} {:.2} ({})",
            mapping.business_label,
            mapping.confidence,
            mapping.source.as_str()
        );
    }
    println!();
    println!(
        "Quality: {:.1}/10 ({} attempt{})",
        artifact.qa.quality_score,
        artifact.attempts,
        if artifact.attempts == 1 { "" } else { "s" }
    );
}

fn knowledge(config: &PipelineConfig, args: &ArgMatches) -> Result<()> {
    let kb = open_knowledge_base(config)?;
    let text = |args: &ArgMatches, name: &str| -> Result<String> {
        args.get_one::<String>(name)
            .cloned()
            .with_context(|| format!("missing <{name}>"))
    };

    match args.subcommand() {
        Some(("show", args)) => {
            let column = text(args, "column")?;
            match kb.lookup(&column)? {
                Some(entry) => println!("{}", serde_json::to_string_pretty(&entry)?),
                None => {
                    println!("no entry for '{column}' (key '{}')", KnowledgeBase::normalize(&column).as_str());
                }
            }
        }
        Some(("override", args)) => {
            let (column, label) = (text(args, "column")?, text(args, "label")?);
            let outcome = kb.upsert(&column, &label, 1.0, vizier_knowledge::MappingSource::UserOverride)?;
            println!("{column}: {} ({})", label, outcome.kind());
        }
        Some(("feedback", args)) => {
            let (column, label) = (text(args, "column")?, text(args, "label")?);
            let outcome = kb.feedback(&column, &label, !args.get_flag("negative"))?;
            match outcome.entry() {
                Some(entry) => println!(
                    "{column}: {} at {:.2} ({})",
                    entry.business_label,
                    entry.confidence,
                    outcome.kind()
                ),
                None => println!("{column}: {}", outcome.kind()),
            }
        }
        _ => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_consistent() {
        cli().debug_assert();
    }

    #[test]
    fn test_parse_label() {
        assert_eq!(
            parse_label("cust_id = Customer ID").unwrap(),
            ("cust_id".to_string(), "Customer ID".to_string())
        );
        assert!(parse_label("cust_id").is_err());
        assert!(parse_label("=Customer").is_err());
    }

    #[test]
    fn test_load_dataset_from_json_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rows.json");
        std::fs::write(&path, r#"[{"region": "West", "amt": 10}, {"region": "East", "amt": 2.5}]"#).unwrap();

        let dataset = load_dataset(&path).unwrap();
        assert_eq!(dataset.row_count(), 2);
        assert!(dataset.has_column("amt"));

        std::fs::write(&path, r#"{"not": "rows"}"#).unwrap();
        assert!(load_dataset(&path).is_err());
    }

    #[test]
    fn test_kb_flag_overrides_config_path() {
        let matches = cli().get_matches_from(["vizier", "--kb", "/tmp/kb.json", "config"]);
        let config = load_config(&matches).unwrap();
        assert_eq!(config.knowledge_base_path, PathBuf::from("/tmp/kb.json"));
    }
}

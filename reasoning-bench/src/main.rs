//! Reasoning benchmark CLI

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use reasoning_bench::{
    analysis::{AnswerScorer, HttpEmbedder},
    config::Config,
    generation::ItemGenerator,
    providers::{create_providers, ModelCatalog, ProviderRegistry},
    query::QueryClient,
    reporting::{print_console_report, ScoreTable},
    results::ScoreCollection,
    runner::{ConsoleProgress, Executor, ExecutorConfig},
    tasks::{load_item_set, save_item_set, Variant},
};

#[derive(Parser)]
#[command(name = "reasoning-bench")]
#[command(about = "Self-validating reasoning benchmarks across LLM providers")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Model catalog (JSON, provider -> models) to merge into the registry
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate and self-validate a test item set
    Generate {
        /// Test variant (sequence_logic_puzzle, spatial_reasoning, contextual_dissonance)
        #[arg(short, long)]
        test: Variant,

        /// Number of items to generate
        #[arg(short = 'n', long, default_value = "10")]
        count: usize,

        /// Output path for the item set
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Put an item set to models under test and record their scores
    Evaluate {
        /// Test variant
        #[arg(short, long)]
        test: Variant,

        /// Item set to evaluate (default: <output_dir>/items/<test>.json)
        #[arg(short, long)]
        items: Option<PathBuf>,

        /// Comma-separated model list (default: every registered model)
        #[arg(short, long)]
        models: Option<String>,

        /// Score file to update
        #[arg(short, long)]
        scores: Option<PathBuf>,
    },

    /// Remove every recorded score for a model on a test
    DeleteScore {
        /// Model name
        #[arg(short, long)]
        model: String,

        /// Test variant
        #[arg(short, long)]
        test: Variant,

        /// Score file to update
        #[arg(short, long)]
        scores: Option<PathBuf>,
    },

    /// Print score tables
    Summary {
        /// Restrict to one test variant
        #[arg(short, long)]
        test: Option<Variant>,

        /// Comma-separated models to leave out of the tables
        #[arg(long)]
        exclude: Option<String>,

        /// Score file to read
        #[arg(short, long)]
        scores: Option<PathBuf>,

        /// Write the tables as JSON into this directory
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List registered models and their providers
    ListModels,

    /// Generate sample configuration
    InitConfig {
        /// Output path for configuration file
        #[arg(short, long, default_value = "config/bench.toml")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("reasoning_bench=debug,info")
    } else {
        EnvFilter::new("reasoning_bench=info,warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .init();

    let config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::load_or_default(),
    };

    match cli.command {
        Commands::Generate { test, count, output } => {
            let registry = build_registry(&config, cli.catalog.as_deref())?;
            generate(&config, registry, test, count, output).await?;
        }

        Commands::Evaluate {
            test,
            items,
            models,
            scores,
        } => {
            let registry = build_registry(&config, cli.catalog.as_deref())?;
            evaluate(&config, registry, test, items, models, scores).await?;
        }

        Commands::DeleteScore {
            model,
            test,
            scores,
        } => {
            delete_score(&config, &model, test, scores)?;
        }

        Commands::Summary {
            test,
            exclude,
            scores,
            output,
        } => {
            let registry = build_registry(&config, cli.catalog.as_deref())?;
            summary(&config, &registry, test, exclude, scores, output)?;
        }

        Commands::ListModels => {
            let registry = build_registry(&config, cli.catalog.as_deref())?;
            list_models(&registry);
        }

        Commands::InitConfig { output } => {
            init_config(output)?;
        }
    }

    Ok(())
}

fn build_registry(
    config: &Config,
    catalog_path: Option<&Path>,
) -> Result<Arc<ProviderRegistry>, Box<dyn std::error::Error>> {
    let catalog = catalog_path.map(ModelCatalog::from_file).transpose()?;
    let registry = ProviderRegistry::from_config(config, catalog.as_ref())?;
    Ok(Arc::new(registry))
}

fn build_client(
    config: &Config,
    registry: Arc<ProviderRegistry>,
) -> Result<QueryClient, Box<dyn std::error::Error>> {
    let providers = create_providers(&registry, config)?;
    if providers.is_empty() {
        return Err("no providers configured; run init-config and enable at least one".into());
    }
    Ok(QueryClient::new(registry, providers))
}

fn split_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn default_items_path(config: &Config, test: Variant) -> PathBuf {
    PathBuf::from(&config.benchmark.output_dir)
        .join("items")
        .join(format!("{}.json", test.as_str()))
}

fn default_scores_path(config: &Config) -> PathBuf {
    PathBuf::from(&config.benchmark.output_dir).join("scores.json")
}

async fn generate(
    config: &Config,
    registry: Arc<ProviderRegistry>,
    test: Variant,
    count: usize,
    output: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let client = build_client(config, registry)?;
    let generator = ItemGenerator::new(client, &config.generation);

    println!("=== Generating {} ===", test.title());
    println!("Generator: {}", generator.generator_model());
    println!("Validator: {}", generator.validator_model());
    println!("Items:     {}", count);
    println!();

    let set = generator.generate_set(test, count).await?;
    let path = output.unwrap_or_else(|| default_items_path(config, test));
    save_item_set(&set, &path)?;

    println!(
        "Accepted {} of {} items ({} questions)",
        set.items.len(),
        count,
        set.question_count()
    );
    println!("Item set written to: {}", path.display());
    Ok(())
}

async fn evaluate(
    config: &Config,
    registry: Arc<ProviderRegistry>,
    test: Variant,
    items: Option<PathBuf>,
    models: Option<String>,
    scores: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let items_path = items.unwrap_or_else(|| default_items_path(config, test));
    let set = load_item_set(&items_path)?;
    if set.variant != test {
        return Err(format!(
            "{} holds {} items, not {}",
            items_path.display(),
            set.variant,
            test
        )
        .into());
    }

    let models = match models {
        Some(list) => split_list(&list),
        None => registry.models().map(|(name, _)| name.to_string()).collect(),
    };
    if models.is_empty() {
        return Err("no models to evaluate".into());
    }

    let sizes = registry.model_sizes();
    let client = build_client(config, registry)?;
    let scorer = build_scorer(config, client.clone())?;
    let executor = Executor::new(client, scorer, ExecutorConfig::from(&config.benchmark))
        .with_progress(Arc::new(ConsoleProgress));

    println!("=== Evaluating {} ===", test.title());
    println!("Items:     {} ({} questions)", set.items.len(), set.question_count());
    println!("Models:    {}", models.join(", "));
    println!();

    let results = executor.evaluate_models(Arc::new(set), &models).await;

    let scores_path = scores.unwrap_or_else(|| default_scores_path(config));
    let mut collection = ScoreCollection::load(&scores_path)?;
    let mut failures = 0;

    for (_, result) in results {
        match result {
            Ok(score) => {
                collection = collection.record_score(score);
            }
            Err(_) => failures += 1,
        }
    }

    if let Some(parent) = scores_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    collection.save(&scores_path)?;

    let table = ScoreTable::build(&collection, test, &sizes, &[]);
    print_console_report(&table);

    println!("Scores written to: {}", scores_path.display());
    if failures > 0 {
        println!("{} model(s) failed; see log for details", failures);
    }
    Ok(())
}

fn build_scorer(config: &Config, client: QueryClient) -> Result<AnswerScorer, Box<dyn std::error::Error>> {
    let scoring = &config.scoring;
    let embedder = HttpEmbedder::new(
        &scoring.embedding_endpoint,
        &scoring.embedding_model,
        Duration::from_millis(config.benchmark.timeout_ms),
    )?;

    let judge = scoring
        .judge_model
        .clone()
        .unwrap_or_else(|| config.generation.validator_model.clone());

    Ok(AnswerScorer::new(scoring.clone())
        .with_embedder(Arc::new(embedder))
        .with_judge(client, judge))
}

fn delete_score(
    config: &Config,
    model: &str,
    test: Variant,
    scores: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let scores_path = scores.unwrap_or_else(|| default_scores_path(config));
    let collection = ScoreCollection::load(&scores_path)?;
    let (collection, removed) = collection.delete_score(model, test);

    if removed == 0 {
        println!("No {} scores recorded for {}", test, model);
        return Ok(());
    }

    collection.save(&scores_path)?;
    println!("Removed {} record(s) for {} on {}", removed, model, test);
    Ok(())
}

fn summary(
    config: &Config,
    registry: &ProviderRegistry,
    test: Option<Variant>,
    exclude: Option<String>,
    scores: Option<PathBuf>,
    output: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let scores_path = scores.unwrap_or_else(|| default_scores_path(config));
    let collection = ScoreCollection::load(&scores_path)?;
    let bad_models = exclude.as_deref().map(split_list).unwrap_or_default();
    let sizes = registry.model_sizes();

    let tests = match test {
        Some(t) => vec![t],
        None => Variant::all().to_vec(),
    };

    if let Some(dir) = &output {
        std::fs::create_dir_all(dir)?;
    }

    for test in tests {
        let table = ScoreTable::build(&collection, test, &sizes, &bad_models);
        print_console_report(&table);

        if let Some(dir) = &output {
            let path = dir.join(format!("{}-summary.json", test.as_str()));
            table.write_to_file(&path)?;
            println!("Summary written to: {}", path.display());
        }
    }

    Ok(())
}

fn list_models(registry: &ProviderRegistry) {
    println!("=== Registered Models ===\n");

    let mut models: Vec<_> = registry.models().collect();
    models.sort_by(|a, b| (a.1.provider.as_str(), a.0).cmp(&(b.1.provider.as_str(), b.0)));

    for (name, entry) in models {
        let size = entry
            .size_billions
            .map(|s| format!("{}B", s))
            .unwrap_or_else(|| "?".to_string());
        println!("  {:<10} {:<45} {:>8}", entry.provider.as_str(), name, size);
    }

    println!("\nProviders: {}", registry.configured_providers().len());
}

fn init_config(output: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::default();

    // Ensure parent directory exists
    if let Some(parent) = output.parent() {
        std::fs::create_dir_all(parent)?;
    }

    config.save_toml(&output)?;
    println!("Configuration written to: {}", output.display());
    Ok(())
}

//! 程序入口：初始化日志，解析命令行并分派到 extract / convert / reshape

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::fmt::SubscriberBuilder;

use wbs_hierarchy::model::builder::{build_levels, insert_subtree, BuildStats};
use wbs_hierarchy::model::data_core::{export_tree, load_tree, reshape_file, save_tree, OutputType};
use wbs_hierarchy::model::reshape::ReshapeOptions;
use wbs_hierarchy::model::rooted_tree::{NodeId, RootedTree};
use wbs_hierarchy::source::airtable::AirtableClient;
use wbs_hierarchy::source::betterworks::BetterWorksClient;
use wbs_hierarchy::source::SourceConfig;

#[derive(Parser)]
#[command(name = "wbs_hierarchy")]
#[command(about = "Build work breakdown trees from Airtable / BetterWorks and export them")]
struct Cli {
    /// Show additional logging
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Retrieve hierarchical data and save it as a tree file
    Extract(ExtractArgs),
    /// Load a tree file and print it as json, csv, text or graphviz
    Convert(ConvertArgs),
    /// Convert label-keyed tree json into d3 hierarchy json
    Reshape(ReshapeArgs),
}

#[derive(Clone, Copy, ValueEnum)]
enum SourceKind {
    #[value(name = "airtable")]
    Airtable,
    #[value(name = "bw_goal", alias = "bw-goal")]
    BwGoal,
    #[value(name = "bw_user", alias = "bw-user")]
    BwUser,
}

#[derive(clap::Args)]
struct ExtractArgs {
    /// What type of data should be retrieved?
    #[arg(value_enum)]
    source: SourceKind,

    /// Airtable base ID, BetterWorks goal IDs, or BetterWorks user emails / IDs
    #[arg(required = true)]
    identifier: Vec<String>,

    /// BetterWorks API token
    #[arg(long = "betterworks_api_token", env = "BETTERWORKS_API_TOKEN", hide_env_values = true)]
    betterworks_api_token: Option<String>,

    /// Airtable API key
    #[arg(long = "airtable_api_key", env = "AIRTABLE_API_KEY", hide_env_values = true)]
    airtable_api_key: Option<String>,

    /// File name for output
    #[arg(long = "output_file", default_value = "pickle.json")]
    output_file: PathBuf,

    /// Do not prefix Airtable node names with their type
    #[arg(long = "no_type_in_name")]
    no_type_in_name: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputArg {
    Text,
    Json,
    Csv,
    Graphviz,
}

impl From<OutputArg> for OutputType {
    fn from(arg: OutputArg) -> Self {
        match arg {
            OutputArg::Text => OutputType::Text,
            OutputArg::Json => OutputType::Json,
            OutputArg::Csv => OutputType::Csv,
            OutputArg::Graphviz => OutputType::Graphviz,
        }
    }
}

#[derive(clap::Args)]
struct ConvertArgs {
    /// Tree file written by extract
    input_file: PathBuf,

    /// Output format, printed to stdout
    #[arg(long = "output_type", value_enum, default_value = "json")]
    output_type: OutputArg,
}

#[derive(clap::Args)]
struct ReshapeArgs {
    input_filename: PathBuf,
    output_filename: PathBuf,

    /// Limit the node title length to this many characters (0 disables)
    #[arg(long, default_value_t = 30)]
    trim: usize,

    /// Put node type and owner into the name field
    #[arg(long = "overload_name")]
    overload_name: bool,

    /// Truncate the tree after this many levels
    #[arg(long = "max_depth")]
    max_depth: Option<usize>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    let _ = SubscriberBuilder::default()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .try_init();

    match cli.command {
        Command::Extract(args) => run_extract(args),
        Command::Convert(args) => run_convert(args),
        Command::Reshape(args) => run_reshape(args),
    }
}

fn run_extract(args: ExtractArgs) -> Result<()> {
    let config = SourceConfig {
        airtable_api_key: args.airtable_api_key,
        betterworks_api_token: args.betterworks_api_token,
        ..Default::default()
    };
    let Some(first) = args.identifier.first() else {
        bail!("An identifier must be specified in the command line");
    };
    let single = args.identifier.len() == 1;

    let mut tree = RootedTree::default();
    let stats = match args.source {
        SourceKind::Airtable => {
            let client = AirtableClient::new(&config, first.as_str())?;
            match client.fetch_base_name() {
                Ok(name) => tree.set_root_label(name),
                Err(e) => {
                    tracing::warn!("无法获取 base 名称，使用 base id: {}", e);
                    tree.set_root_label(client.base_id());
                }
            }
            let levels = client
                .fetch_levels(!args.no_type_in_name)
                .context("Airtable table retrieval failed")?;
            build_levels(&mut tree, levels)
        }
        SourceKind::BwGoal => {
            let client = BetterWorksClient::new(&config)?;
            let mut stats = BuildStats::default();
            for goal_id in &args.identifier {
                stats.merge(insert_subtree(&mut tree, &client, &NodeId::parse(goal_id)));
            }
            if single {
                tree.set_root_label(first.as_str());
            }
            stats
        }
        SourceKind::BwUser => {
            let client = BetterWorksClient::new(&config)?;
            let mut stats = BuildStats::default();
            for user in &args.identifier {
                let (user_id, user_name) = client
                    .lookup_user(user)
                    .with_context(|| format!("User search failed for {}", user))?;
                let goals = client
                    .goals_for_user(&user_id)
                    .with_context(|| format!("Goals search failed for {}", user))?;
                for goal_id in &goals {
                    stats.merge(insert_subtree(&mut tree, &client, goal_id));
                }
                if single {
                    tree.set_root_label(user_name);
                }
            }
            stats
        }
    };

    tracing::info!(
        "构建完成：{} 个节点，孤儿 {}，重复 {}，跳过 {}",
        tree.len(),
        stats.orphaned,
        stats.duplicates,
        stats.skipped
    );
    save_tree(&tree, &args.output_file)
        .with_context(|| format!("Could not write {}", args.output_file.display()))?;
    Ok(())
}

fn run_convert(args: ConvertArgs) -> Result<()> {
    let tree = load_tree(&args.input_file)
        .with_context(|| format!("Could not load anything from {}", args.input_file.display()))?;
    let stdout = std::io::stdout();
    export_tree(&tree, args.output_type.into(), stdout.lock())?;
    Ok(())
}

fn run_reshape(args: ReshapeArgs) -> Result<()> {
    let options = ReshapeOptions {
        trim_length: Some(args.trim),
        max_depth: args.max_depth,
        overload_name: args.overload_name,
    };
    reshape_file(&args.input_filename, &args.output_filename, &options).with_context(|| {
        format!(
            "Could not reshape {} into {}",
            args.input_filename.display(),
            args.output_filename.display()
        )
    })?;
    Ok(())
}

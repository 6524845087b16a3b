use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{debug, info, info_span, warn};
use tracing_subscriber::EnvFilter;

use repo_dashboard::codec::{self, ImportReport};
use repo_dashboard::config::Config;
use repo_dashboard::dashboard::Dashboard;
use repo_dashboard::fetch::{RemoteFetcher, ReqwestTransport};
use repo_dashboard::report;
use repo_dashboard::store::FileStore;
use repo_dashboard::view::{
    Column, Filters, QueryState, SortDirection, SortKey, TypeFilter, ValueFilter,
};

/// Repo Dashboard: fetch your GitHub repositories, annotate them locally
/// and browse them as a filterable, sortable table.
#[derive(Parser, Debug)]
#[command(name = "repo-dashboard", version, about)]
struct Cli {
    /// Directory holding the persisted layers (overrides config)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch all repositories and replace the stored snapshot
    Fetch {
        /// List a user's public repositories instead of using a token
        #[arg(long)]
        user: Option<String>,
    },
    /// Show one page of the repository table
    List(ListArgs),
    /// Show per-language, owner, type and class counts
    Counts,
    /// Mark a repository (owner/name) as enabled
    Enable { key: String },
    /// Mark a repository (owner/name) as disabled
    Disable { key: String },
    /// Assign a class label; an empty label clears it
    Classify { key: String, label: String },
    /// Override the description; empty text clears the override
    Describe { key: String, text: String },
    /// Manage custom URLs of a repository
    Url {
        #[command(subcommand)]
        action: UrlAction,
    },
    /// Manage the class taxonomy
    Class {
        #[command(subcommand)]
        action: ClassAction,
    },
    /// Export annotations (or enabled projects) as JSON
    Export {
        /// Export enabled projects as flattened records
        #[arg(long)]
        enabled: bool,
        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Import an annotation JSON document
    Import { file: PathBuf },
    /// Manage deployment URLs produced by infrastructure tooling
    Infra {
        #[command(subcommand)]
        action: InfraAction,
    },
}

#[derive(clap::Args, Debug)]
struct ListArgs {
    /// Substring of the repository name (case-insensitive)
    #[arg(long)]
    name: Option<String>,
    #[arg(long)]
    owner: Option<String>,
    /// Primary language, or "(none)"
    #[arg(long)]
    language: Option<ValueFilter>,
    /// Public, Private, Fork or Sources
    #[arg(long = "type", default_value = "Sources")]
    type_category: TypeFilter,
    /// Show every type, including forks
    #[arg(long, conflicts_with = "type_category")]
    all_types: bool,
    /// Class label, or "(none)"
    #[arg(long)]
    class: Option<ValueFilter>,
    #[arg(long, default_value = "name")]
    sort: SortKey,
    #[arg(long)]
    desc: bool,
    /// One-based page number
    #[arg(long, default_value_t = 1)]
    page: usize,
    /// Hide a column (repeatable)
    #[arg(long)]
    hide: Vec<Column>,
    /// Write a markdown table to this file instead of the terminal
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum UrlAction {
    Add { key: String, url: String },
    /// Remove the URL at a zero-based position
    Remove { key: String, index: usize },
    Clear { key: String },
}

#[derive(Subcommand, Debug)]
enum ClassAction {
    Add { label: String },
    Remove { label: String },
    List,
}

#[derive(Subcommand, Debug)]
enum InfraAction {
    /// Load a name→URL map or an infrastructure output file
    Load { file: PathBuf },
    List,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    info!("loading configuration");
    let config = Config::load()?;
    let data_dir = cli.data_dir.clone().unwrap_or_else(|| config.storage.dir.clone());
    debug!(data_dir = %data_dir.display(), "opening store");
    let mut dashboard = Dashboard::open(Box::new(FileStore::new(&data_dir)))?;

    match cli.command {
        Command::Fetch { user } => {
            let credential = config.credential(user.as_deref()).ok_or(
                "no GitHub token or username. Set GITHUB_TOKEN, configure github.username, or pass --user",
            )?;
            let _span = info_span!("fetch").entered();
            let fetcher = RemoteFetcher::new(
                ReqwestTransport::new(config.github.user_agent.clone()),
                config.endpoints(),
            );
            info!("fetching repositories from GitHub");
            let count = dashboard.refresh(&fetcher, &credential).await?;
            println!("Fetched {count} repositories");
        }
        Command::List(args) => {
            let mut state = dashboard.query(config.view.page_size);
            apply_list_args(&mut state, &args);
            let table = report::build_table(&state);
            report::output(&table, args.output.as_deref())?;
        }
        Command::Counts => {
            let state = dashboard.query(config.view.page_size);
            let counts = report::build_counts(&state, dashboard.annotations());
            report::print_counts(&counts);
        }
        Command::Enable { key } => {
            dashboard.set_enabled(&key, true)?;
            println!("Enabled {key}");
        }
        Command::Disable { key } => {
            dashboard.set_enabled(&key, false)?;
            println!("Disabled {key}");
        }
        Command::Classify { key, label } => {
            dashboard.set_class(&key, &label)?;
            if !label.is_empty() && !dashboard.annotations().classes.contains(&label) {
                warn!(label = %label, "label is not in the class taxonomy");
            }
        }
        Command::Describe { key, text } => dashboard.set_description(&key, &text)?,
        Command::Url { action } => match action {
            UrlAction::Add { key, url } => dashboard.add_url(&key, &url)?,
            UrlAction::Remove { key, index } => match dashboard.remove_url(&key, index)? {
                Some(url) => println!("Removed {url}"),
                None => println!("{key} has no URL at position {index}"),
            },
            UrlAction::Clear { key } => dashboard.clear_urls(&key)?,
        },
        Command::Class { action } => match action {
            ClassAction::Add { label } => {
                if !dashboard.add_class(&label)? {
                    println!("Class '{label}' already exists");
                }
            }
            ClassAction::Remove { label } => {
                if !dashboard.remove_class(&label)? {
                    println!("Class '{label}' not found");
                }
            }
            ClassAction::List => {
                for class in &dashboard.annotations().classes {
                    println!("{class}");
                }
            }
        },
        Command::Export { enabled, output } => {
            let json = if enabled {
                dashboard.export_enabled()?
            } else {
                dashboard.export_annotations()?
            };
            match output {
                Some(path) => std::fs::write(path, json)?,
                None => println!("{json}"),
            }
        }
        Command::Import { file } => {
            let text = std::fs::read_to_string(&file)?;
            match dashboard.import_annotations(&text)? {
                ImportReport::Applied { fields } => {
                    println!("Imported {}", fields.join(", "));
                }
                ImportReport::Ignored { reason } => {
                    println!("Nothing imported: {reason}");
                }
            }
        }
        Command::Infra { action } => match action {
            InfraAction::Load { file } => {
                let text = std::fs::read_to_string(&file)?;
                let urls = codec::parse_infra_outputs(&text)?;
                let count = urls.len();
                dashboard.set_infra_urls(urls)?;
                println!("Loaded {count} infrastructure URLs");
            }
            InfraAction::List => {
                for (name, url) in dashboard.infra_urls() {
                    println!("{name}\t{url}");
                }
            }
        },
    }

    Ok(())
}

fn apply_list_args(state: &mut QueryState, args: &ListArgs) {
    state.set_filters(Filters {
        name: args.name.clone(),
        owner: args.owner.clone(),
        language: args.language.clone(),
        type_category: (!args.all_types).then_some(args.type_category),
        class: args.class.clone(),
    });
    let direction = if args.desc {
        SortDirection::Descending
    } else {
        SortDirection::Ascending
    };
    state.set_sort(args.sort, direction);
    for column in &args.hide {
        state.hide_column(*column);
    }
    state.set_page(args.page.saturating_sub(1));
}

//! pagetree CLI entry point

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use pagetree::{
    commands::{
        cmd_ask, cmd_index, cmd_init, cmd_list_documents, cmd_remove_document, cmd_search,
        cmd_status, print_answer, print_document_completions, print_documents,
        print_index_report, print_init, print_search_result, print_status, IndexRequest,
    },
    config::{Config, YesNo},
    error::Result,
    llm::CompletionProvider,
    meta::MetaDb,
    progress::LogWriterFactory,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::error;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "pagetree")]
#[command(version, about = "Reasoning-based PDF indexing and tree search over a local LLM", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize pagetree configuration and database
    Init {
        /// Force overwrite existing config
        #[arg(long)]
        force: bool,
    },

    /// Index a PDF into a section tree
    Index {
        /// Path to the PDF
        pdf: PathBuf,

        /// Skip per-section summaries
        #[arg(long)]
        no_summary: bool,

        /// Store each section's text in the index
        #[arg(long)]
        node_text: bool,

        /// Generate a one-sentence document description
        #[arg(long)]
        description: bool,

        /// Pages scanned for a table of contents
        #[arg(long)]
        toc_pages: Option<usize>,

        /// Maximum pages in a leaf section
        #[arg(long)]
        max_pages: Option<usize>,

        /// Maximum tokens in a leaf section
        #[arg(long)]
        max_tokens: Option<usize>,

        /// Index again even if an identical file is already indexed
        #[arg(long)]
        force: bool,
    },

    /// Find the sections of a document relevant to a query
    Search {
        /// Document ID or path to an index JSON file
        document: String,

        /// The search query
        query: String,

        /// Maximum number of sections
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Answer a question from a document
    Ask {
        /// Document ID or path to an index JSON file
        document: String,

        /// The question
        question: String,
    },

    /// List registered documents
    Documents {
        /// Output only document IDs (one per line, for scripting)
        #[arg(long)]
        ids_only: bool,

        /// Output document IDs with descriptions for shell completions
        #[arg(long, value_enum, hide = true)]
        completion: Option<Shell>,
    },

    /// Remove a document and its index
    ///
    /// Use 'pagetree documents --ids-only' to list available document IDs
    Remove {
        /// Document ID to remove
        document_id: String,
    },

    /// Show system status
    Status,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(LogWriterFactory::default()))
        .with(filter)
        .init();

    if let Commands::Init { force } = cli.command {
        let config_path = cli.config.unwrap_or_else(Config::default_config_path);
        let info = cmd_init(&config_path, force).await?;
        if cli.json {
            println!("{}", serde_json::to_string_pretty(&info)?);
        } else {
            print_init(&info);
        }
        return Ok(());
    }

    if let Commands::Completions { shell } = cli.command {
        let mut cmd = Cli::command();
        generate(shell, &mut cmd, "pagetree", &mut std::io::stdout());
        print_completion_extras(shell);
        return Ok(());
    }

    let config = load_config(cli.config.as_deref())?;
    let db = MetaDb::connect(&config).await?;

    match cli.command {
        Commands::Init { .. } | Commands::Completions { .. } => unreachable!(),

        Commands::Index {
            pdf,
            no_summary,
            node_text,
            description,
            toc_pages,
            max_pages,
            max_tokens,
            force,
        } => {
            let mut options = config.index_options();
            if no_summary {
                options.add_node_summary = YesNo::No;
            }
            if node_text {
                options.add_node_text = YesNo::Yes;
            }
            if description {
                options.add_doc_description = YesNo::Yes;
            }
            if let Some(n) = toc_pages {
                options.toc_check_page_num = n;
            }
            if let Some(n) = max_pages {
                options.max_page_num_each_node = n;
            }
            if let Some(n) = max_tokens {
                options.max_token_num_each_node = n;
            }

            let provider = Arc::new(CompletionProvider::from_config(&config.completion)?);
            let request = IndexRequest {
                options,
                force,
                show_progress: !cli.json,
            };
            let report = cmd_index(&config, &db, provider, &pdf, request).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_index_report(&report);
            }
        }

        Commands::Search {
            document,
            query,
            limit,
        } => {
            let provider = CompletionProvider::from_config(&config.completion)?;
            let result = cmd_search(&config, &db, &provider, &document, &query, limit).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                print_search_result(&result);
            }
        }

        Commands::Ask { document, question } => {
            let provider = CompletionProvider::from_config(&config.completion)?;
            let answer = cmd_ask(&config, &db, &provider, &document, &question).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&answer)?);
            } else {
                print_answer(&answer);
            }
        }

        Commands::Documents {
            ids_only,
            completion,
        } => {
            let docs = cmd_list_documents(&db).await?;
            if let Some(shell) = completion {
                print_document_completions(&docs, shell);
            } else if ids_only {
                for doc in &docs {
                    println!("{}", doc.id);
                }
            } else if cli.json {
                println!("{}", serde_json::to_string_pretty(&docs)?);
            } else {
                print_documents(&docs);
            }
        }

        Commands::Remove { document_id } => {
            let report = cmd_remove_document(&config, &db, &document_id).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("✓ Document '{}' removed ({})", report.document_id, report.filename);
                if report.index_removed {
                    println!("  Index files deleted");
                }
            }
        }

        Commands::Status => {
            let status = cmd_status(&config, &db).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                print_status(&status);
            }
        }
    }

    Ok(())
}

/// Dynamic document-id completion for commands taking a document
fn print_completion_extras(shell: Shell) {
    match shell {
        Shell::Bash => {
            println!();
            println!("{}", r#"# Dynamic completion for document IDs"#);
            println!("{}", r#"_pagetree_dynamic() {"#);
            println!("{}", r#"    local cur="${COMP_WORDS[COMP_CWORD]}""#);
            println!("{}", r#"    local prev="${COMP_WORDS[COMP_CWORD-1]}""#);
            println!("{}", r#"    case "$prev" in"#);
            println!("{}", r#"        remove|search|ask)"#);
            println!(
                "{}",
                r#"            COMPREPLY=( $(compgen -W "$(pagetree documents --completion bash 2>/dev/null)" -- "$cur") )"#
            );
            println!("{}", r#"            return 0 ;;"#);
            println!("{}", r#"    esac"#);
            println!("{}", r#"    _pagetree "$@""#);
            println!("{}", r#"}"#);
            println!(
                "{}",
                r#"complete -F _pagetree_dynamic -o bashdefault -o default pagetree"#
            );
        }
        Shell::Zsh => {
            println!();
            println!("{}", r#"# Dynamic completion for document IDs"#);
            println!("{}", r#"_pagetree_document_ids() {"#);
            println!("{}", r#"    local -a entries"#);
            println!(
                "{}",
                r#"    entries=("${(@f)$(pagetree documents --completion zsh 2>/dev/null)}")"#
            );
            println!("{}", r#"    _describe -t documents 'document ids' entries"#);
            println!("{}", r#"}"#);
            println!("{}", r#"compdef _pagetree_document_ids 'pagetree remove'"#);
        }
        Shell::Fish => {
            println!();
            println!("{}", r#"# Dynamic completion for document IDs"#);
            println!(
                "{}",
                r#"complete -c pagetree -n '__fish_seen_subcommand_from remove search ask' -a '(pagetree documents --completion fish 2>/dev/null)'"#
            );
        }
        _ => {}
    }
}

fn load_config(path: Option<&std::path::Path>) -> Result<Config> {
    let config_path = path
        .map(PathBuf::from)
        .unwrap_or_else(Config::default_config_path);

    if !config_path.exists() {
        eprintln!(
            "Config file not found: {}\nRun 'pagetree init' first.",
            config_path.display()
        );
        std::process::exit(1);
    }

    Config::load(&config_path)
}

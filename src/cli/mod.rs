use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::config::Config;
use crate::engine::{SearchEngine, UpdateOutcome};
use crate::search::{SearchMode, SearchRequest, SearchResult};
use crate::symbols::ReadRequest;

/// Incremental code indexing with semantic, symbol and text search
#[derive(Parser, Debug)]
#[command(name = "codescope")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Project root (defaults to current directory)
    #[arg(long, global = true)]
    pub path: Option<PathBuf>,

    /// Output JSON instead of formatted text
    #[arg(long, global = true)]
    pub json: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Index the project (only changed files unless --force)
    Index {
        /// Clear the index and rebuild everything
        #[arg(short, long)]
        force: bool,
    },

    /// Re-index specific files if their content changed
    Update {
        /// Files relative to the project root
        #[arg(required = true)]
        files: Vec<String>,
    },

    /// Search the project
    Search {
        query: String,

        /// semantic, fuzzy_symbol, text or symbol_exact
        #[arg(long, default_value = "semantic", value_parser = parse_mode)]
        mode: SearchMode,

        /// Maximum results to return [default: search.default_max_results]
        #[arg(short = 'm', long)]
        max_results: Option<usize>,

        /// Path substring, or file-name glob in text mode
        #[arg(long)]
        file_pattern: Option<String>,

        /// Restrict symbol modes to one chunk type (function, class, interface)
        #[arg(long)]
        symbol_type: Option<String>,

        /// Treat the query as a regular expression (text mode)
        #[arg(long)]
        regex: bool,

        /// Case-sensitive matching (text mode)
        #[arg(long)]
        case_sensitive: bool,

        /// Require exact names in fuzzy_symbol mode
        #[arg(long)]
        exact: bool,

        /// Minimum fuzzy score [default: search.default_min_score]
        #[arg(long)]
        min_score: Option<f32>,
    },

    /// List the symbols declared in a file
    Symbols { file: String },

    /// Print a symbol, a line range or a whole file
    Read {
        file: String,

        /// Symbol to extract
        #[arg(short, long, conflicts_with_all = ["start", "end"])]
        symbol: Option<String>,

        /// Which occurrence of the symbol (1-based)
        #[arg(long, default_value = "1")]
        occurrence: usize,

        /// First line of the range (1-based)
        #[arg(long, requires = "end")]
        start: Option<usize>,

        /// Last line of the range (inclusive)
        #[arg(long, requires = "start")]
        end: Option<usize>,

        /// Omit line numbers
        #[arg(long)]
        no_line_numbers: bool,
    },

    /// Show index statistics
    Stats,

    /// Show indexing status and recently indexed files
    Status,

    /// Remove chunks of files deleted from disk
    Cleanup,

    /// Rebuild the vector index without orphaned vectors
    Compact,
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    let root = cli.path.clone().unwrap_or_else(|| PathBuf::from("."));
    let config = Config::load(&root)?;
    let engine = SearchEngine::new(&root, config)?;
    let json = cli.json;

    match cli.command {
        Commands::Index { force } => {
            let spinner = spinner("Indexing project...")?;
            engine.initialize().await?;
            let report = engine.index_codebase(force).await?;
            spinner.finish_and_clear();

            if json {
                return print_json(&report);
            }
            println!("{}", "Indexing complete".bright_green().bold());
            println!("   Files seen:      {}", report.files_seen);
            println!("   Files indexed:   {}", report.files_indexed);
            println!("   Files unchanged: {}", report.files_unchanged);
            if report.files_failed > 0 {
                println!("   Files failed:    {}", report.files_failed.to_string().yellow());
            }
            if report.files_removed > 0 {
                println!(
                    "   Removed:         {} files ({} chunks)",
                    report.files_removed, report.chunks_removed
                );
            }
            println!("   Chunks indexed:  {}", report.chunks_indexed);
            println!("   Took:            {} ms", report.duration_ms);
        }

        Commands::Update { files } => {
            engine.initialize().await?;
            if files.len() == 1 {
                let outcome = engine.update_file(&files[0]).await?;
                if json {
                    return print_json(&outcome);
                }
                match outcome {
                    UpdateOutcome::Removed { chunks_removed } => println!(
                        "{} {} ({} chunks removed)",
                        "Removed".yellow(),
                        files[0],
                        chunks_removed
                    ),
                    UpdateOutcome::Unchanged => {
                        println!("{} {}", "Unchanged".dimmed(), files[0])
                    }
                    UpdateOutcome::Updated { chunks, file_hash } => println!(
                        "{} {} ({} chunks, SHA1 {})",
                        "Updated".bright_green(),
                        files[0],
                        chunks,
                        file_hash.get(..8).unwrap_or(&file_hash)
                    ),
                }
            } else {
                let report = engine.batch_update_files(&files).await?;
                if json {
                    return print_json(&report);
                }
                println!(
                    "Updated {} files with {} chunks ({} unchanged, {} removed)",
                    report.updated_files.to_string().bright_green(),
                    report.total_chunks,
                    report.skipped_files,
                    report.removed_files
                );
                for failed in &report.failed_files {
                    println!("   {} {}", "failed:".red(), failed);
                }
            }
        }

        Commands::Search {
            query,
            mode,
            max_results,
            file_pattern,
            symbol_type,
            regex,
            case_sensitive,
            exact,
            min_score,
        } => {
            let mut request = SearchRequest::from_config(query, mode, &engine.config().search)
                .with_regex(regex)
                .with_case_sensitive(case_sensitive)
                .with_fuzzy(!exact);
            if let Some(max_results) = max_results {
                request = request.with_max_results(max_results);
            }
            if let Some(min_score) = min_score {
                request = request.with_min_score(min_score);
            }
            request.file_pattern = file_pattern;
            request.symbol_type = symbol_type;

            if mode == SearchMode::Semantic {
                engine.initialize().await?;
            }
            let results = engine.search(&request).await?;

            if json {
                return print_json(&results);
            }
            if results.is_empty() {
                println!("{}", "No results".yellow());
                return Ok(());
            }
            for (idx, result) in results.iter().enumerate() {
                print_result(idx + 1, result);
            }
        }

        Commands::Symbols { file } => {
            let listing = engine.list_symbols_in_file(&file).await?;
            if json {
                return print_json(&listing);
            }
            println!(
                "{} ({} lines, {} bytes, SHA1 {})",
                listing.file.bright_cyan().bold(),
                listing.total_lines,
                listing.file_size,
                listing.file_hash.get(..8).unwrap_or(&listing.file_hash)
            );
            for symbol in &listing.symbols {
                println!(
                    "   {:>5}  {:<9} {}",
                    symbol.line,
                    symbol.kind.as_str().dimmed(),
                    symbol.name.bright_green()
                );
            }
        }

        Commands::Read {
            file,
            symbol,
            occurrence,
            start,
            end,
            no_line_numbers,
        } => {
            let request = ReadRequest {
                path: file,
                symbol_name: symbol,
                occurrence,
                start_line: start,
                end_line: end,
                with_line_numbers: !no_line_numbers,
            };
            let content = engine.read_symbol_content(&request).await?;
            if json {
                return print_json(&content);
            }
            println!(
                "{} lines {}-{} ({})",
                content.file_path.bright_cyan().bold(),
                content.line_range.start,
                content.line_range.end,
                content.mode.dimmed()
            );
            println!("{}", content.content);
        }

        Commands::Stats => {
            let stats = engine.get_stats()?;
            if json {
                return print_json(&stats);
            }
            println!("{}", "Index Statistics".bright_cyan().bold());
            println!("{}", "=".repeat(60));
            println!("   Root:            {}", stats.working_directory);
            println!("   Model:           {} ({} dims)", stats.model, stats.store.dimensions);
            println!("   Chunks:          {}", stats.store.total_chunks);
            println!("   Files:           {}", stats.store.total_files);
            println!("   Tracked files:   {}", stats.store.tracked_files);
            println!("   Vectors:         {}", stats.store.vector_count);
            let orphaned = stats.store.orphaned_vectors();
            if orphaned > 0 {
                println!(
                    "   Orphaned:        {} (run {} to reclaim)",
                    orphaned.to_string().yellow(),
                    "codescope compact".bright_cyan()
                );
            }
        }

        Commands::Status => {
            let status = engine.get_indexing_status()?;
            if json {
                return print_json(&status);
            }
            println!(
                "{} files indexed, {} chunks",
                status.indexed_files.to_string().bright_green(),
                status.stats.store.total_chunks
            );
            for file in &status.indexed_file_details {
                println!("   {}...  {:>4} chunks  {}", file.hash.dimmed(), file.chunks, file.file);
            }
        }

        Commands::Cleanup => {
            let report = engine.cleanup_index().await?;
            if json {
                return print_json(&report);
            }
            println!(
                "Cleaned up {} chunks from {} deleted files ({} files present)",
                report.removed_chunks,
                report.removed_files.len(),
                report.existing_files
            );
            for file in &report.removed_files {
                println!("   {} {}", "-".red(), file);
            }
        }

        Commands::Compact => {
            let spinner = spinner("Compacting vector index...")?;
            let report = engine.compact_index().await?;
            spinner.finish_and_clear();
            if json {
                return print_json(&report);
            }
            println!(
                "Vector index compacted: {} -> {} rows",
                report.vectors_before,
                report.vectors_after.to_string().bright_green()
            );
        }
    }

    Ok(())
}

fn parse_mode(value: &str) -> std::result::Result<SearchMode, String> {
    value.parse::<SearchMode>().map_err(|e| e.to_string())
}

fn spinner(message: &str) -> Result<ProgressBar> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.cyan} {msg} [{elapsed}]")?);
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    Ok(pb)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_result(rank: usize, result: &SearchResult) {
    let location = format!(
        "{}:{}-{}",
        result.file_path, result.line_start, result.line_end
    );
    println!(
        "{}. {} {} {}",
        rank,
        location.bright_cyan(),
        format!("[{}]", result.chunk_type).dimmed(),
        format!("{:.3}", result.relevance_score).bright_yellow()
    );
    if let Some(name) = &result.symbol_name {
        println!("   {}", name.bright_green());
    }
    if let Some(signature) = &result.signature {
        println!("   {}", signature);
    }
    if let Some(snippet) = &result.snippet {
        println!("   {}", snippet);
    }
}

//! spanlink - Link requirement-document selections to code ranges
//!
//! spanlink renders Markdown requirement documents and code files into
//! display trees that remember where every node came from, resolves
//! selections made on the rendered text back to exact source ranges, and
//! keeps annotations linking document ranges to code ranges in an exchange
//! JSON file (the "store").

mod output;
mod store;

use clap::{Args as ClapArgs, Parser, Subcommand};
use eyre::{Result, WrapErr};
use output::OutputFormat;
use owo_colors::OwoColorize;
use spanlink_config::{Loader, SpanlinkConfig};
use spanlink_core::suggest::{SuggestRequest, SuggestResponse, SuggestionTracker};
use spanlink_core::{
    AnchoredRange, DEFAULT_CATEGORY, DisplayTree, HighlightState, NavigationIndex, ProjectFile,
    ProvenanceRenderer, RangeResolver, RemoveOutcome, RenderMode, SourceIndex, SourceKind,
    SourceOffset, SuggestError, coalesce_lines,
};
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::time::Instant;
use store::Store;
use tracing_subscriber::EnvFilter;

/// CLI arguments
#[derive(Debug, Parser)]
#[command(name = "spanlink", version, about, arg_required_else_help = true)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Path to config file (default: .config/spanlink/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Provenance mode: structural or substring-search
    #[arg(long, global = true, value_parser = parse_mode)]
    mode: Option<RenderMode>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Render a document or code file and print its display tree
    Render {
        file: PathBuf,

        /// Treat the file as code regardless of its extension
        #[arg(long)]
        code: bool,

        #[arg(short, long, value_enum, default_value_t)]
        format: OutputFormat,
    },

    /// Print the line index of a file
    Lines {
        file: PathBuf,

        #[arg(long)]
        code: bool,
    },

    /// Map a selection over the rendered text back to a source range
    Resolve {
        file: PathBuf,

        /// Rendered-text offset where the selection starts
        #[arg(long)]
        from: usize,

        /// Rendered-text offset where the selection ends
        #[arg(long)]
        to: usize,

        #[arg(long)]
        code: bool,
    },

    /// Find the display nodes for a source offset or a line range
    Locate {
        file: PathBuf,

        #[command(flatten)]
        target: LocateTarget,

        #[arg(long)]
        code: bool,
    },

    /// Manage the files registered in a store
    Files {
        #[command(subcommand)]
        command: FilesCommand,
    },

    /// Manage annotations in a store
    Annotations {
        #[command(subcommand)]
        command: AnnotationsCommand,
    },

    /// Fold a related-code answer into an annotation's code ranges
    Fold {
        store: PathBuf,

        #[arg(long)]
        annotation: String,

        /// JSON file holding a `{"relatedCode": [...]}` answer
        #[arg(long)]
        response: PathBuf,
    },
}

#[derive(Debug, ClapArgs)]
#[group(required = true, multiple = false)]
struct LocateTarget {
    /// Source offset (codepoints into the normalized text)
    #[arg(long)]
    offset: Option<usize>,

    /// 1-based inclusive line range, e.g. `3:7`
    #[arg(long, value_parser = parse_lines)]
    lines: Option<RangeInclusive<usize>>,
}

#[derive(Debug, Subcommand)]
enum FilesCommand {
    /// Register a file, creating the store if needed
    Add {
        store: PathBuf,
        path: PathBuf,

        /// doc or code (default: by extension)
        #[arg(long, value_parser = parse_kind)]
        kind: Option<SourceKind>,

        /// Name to register under (default: the file name)
        #[arg(long)]
        name: Option<String>,
    },

    /// List registered files
    List { store: PathBuf },
}

#[derive(Debug, Subcommand)]
enum AnnotationsCommand {
    /// List annotations and their ranges
    List { store: PathBuf },

    /// Create an annotation, or append a range to an existing one
    Add {
        store: PathBuf,

        /// Registered file the selection was made in
        file: String,

        #[command(flatten)]
        selection: Selection,

        #[arg(long, default_value = DEFAULT_CATEGORY)]
        category: String,

        /// Append to this annotation instead of creating one
        #[arg(long)]
        annotation: Option<String>,
    },

    /// Remove one range; removing the last range deletes the annotation
    Remove {
        store: PathBuf,
        id: String,

        #[arg(long, value_parser = parse_kind)]
        kind: SourceKind,

        #[arg(long)]
        index: usize,
    },

    /// Change an annotation's category
    Rename {
        store: PathBuf,
        id: String,
        category: String,
    },

    /// Delete an annotation with all its ranges
    Delete { store: PathBuf, id: String },

    /// Show a code file with an annotation's lines highlighted
    Show {
        store: PathBuf,
        id: String,

        /// Registered code file to show
        #[arg(long)]
        file: String,
    },
}

#[derive(Debug, ClapArgs)]
#[group(required = true, multiple = true)]
struct Selection {
    /// Rendered-text offset where the selection starts
    #[arg(long, requires = "to", conflicts_with = "lines")]
    from: Option<usize>,

    /// Rendered-text offset where the selection ends
    #[arg(long, requires = "from")]
    to: Option<usize>,

    /// 1-based inclusive line range, e.g. `3:7`
    #[arg(long, value_parser = parse_lines)]
    lines: Option<RangeInclusive<usize>>,
}

fn parse_lines(raw: &str) -> Result<RangeInclusive<usize>, String> {
    let (first, last) = raw.split_once(':').unwrap_or((raw, raw));
    let first: usize = first
        .trim()
        .parse()
        .map_err(|_| format!("invalid line number `{first}`"))?;
    let last: usize = last
        .trim()
        .parse()
        .map_err(|_| format!("invalid line number `{last}`"))?;
    if first == 0 || last < first {
        return Err(format!("invalid line range `{raw}`"));
    }
    Ok(first..=last)
}

fn parse_kind(raw: &str) -> Result<SourceKind, String> {
    SourceKind::parse(raw).ok_or_else(|| format!("expected `doc` or `code`, got `{raw}`"))
}

fn parse_mode(raw: &str) -> Result<RenderMode, String> {
    RenderMode::parse(raw)
        .ok_or_else(|| format!("expected `structural` or `substring-search`, got `{raw}`"))
}

/// Everything a command needs besides its own arguments.
struct Context {
    config: SpanlinkConfig,
    renderer: ProvenanceRenderer,
}

impl Context {
    fn new(config: SpanlinkConfig) -> Self {
        let renderer = ProvenanceRenderer::new(config.render_options());
        Self { config, renderer }
    }

    /// Read a file from disk and index it for `kind`.
    fn read_source(&self, path: &Path, force_code: bool) -> Result<(SourceIndex, SourceKind)> {
        let bytes =
            std::fs::read(path).wrap_err_with(|| format!("Failed to read {}", path.display()))?;
        let kind = if force_code {
            SourceKind::Code
        } else {
            SourceKind::from_path(path).unwrap_or(SourceKind::Doc)
        };
        let raw = spanlink_core::decode(&bytes);
        Ok((self.renderer.prepare(&raw, kind), kind))
    }

    fn render(&self, source: &SourceIndex, kind: SourceKind) -> Result<DisplayTree> {
        self.renderer
            .render(source, kind)
            .wrap_err("Failed to render")
    }

    fn index(&self, file: &ProjectFile) -> SourceIndex {
        file.index(self.config.render.split_adjacent_math)
    }

    fn save(&self, store: &Store) -> Result<()> {
        store.save(self.config.exchange.pretty)
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;
    init_logging(&config);

    let ctx = Context::new(config);
    match args.command {
        Command::Render { file, code, format } => run_render(&ctx, &file, code, format),
        Command::Lines { file, code } => run_lines(&ctx, &file, code),
        Command::Resolve {
            file,
            from,
            to,
            code,
        } => run_resolve(&ctx, &file, from, to, code),
        Command::Locate { file, target, code } => run_locate(&ctx, &file, target, code),
        Command::Files { command } => run_files(&ctx, command),
        Command::Annotations { command } => run_annotations(&ctx, command),
        Command::Fold {
            store,
            annotation,
            response,
        } => run_fold(&ctx, &store, &annotation, &response),
    }
}

fn load_config(args: &Args) -> Result<SpanlinkConfig> {
    let loader = match &args.config {
        Some(path) => Loader::file(path),
        None => {
            let cwd = std::env::current_dir().wrap_err("Failed to get current directory")?;
            Loader::project(cwd)
        }
    };
    let loader = match args.mode {
        Some(mode) => loader.render_mode(mode),
        None => loader,
    };
    loader.load().wrap_err("Failed to load configuration")
}

/// Log to stderr, filtered by `SPANLINK_LOG` or else `logging.filter`.
fn init_logging(config: &SpanlinkConfig) {
    let filter = EnvFilter::try_from_env("SPANLINK_LOG")
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.filter));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn run_render(ctx: &Context, file: &Path, code: bool, format: OutputFormat) -> Result<()> {
    let (source, kind) = ctx.read_source(file, code)?;
    let tree = ctx.renderer.render_or_placeholder(&source, kind);
    print!("{}", output::render_tree(&tree, format)?);
    if format == OutputFormat::Html {
        println!();
    }
    Ok(())
}

fn run_lines(ctx: &Context, file: &Path, code: bool) -> Result<()> {
    let (source, _) = ctx.read_source(file, code)?;
    print!("{}", output::render_lines(&source));
    Ok(())
}

fn run_resolve(ctx: &Context, file: &Path, from: usize, to: usize, code: bool) -> Result<()> {
    let (source, kind) = ctx.read_source(file, code)?;
    let tree = ctx.render(&source, kind)?;

    match RangeResolver::new(&tree)
        .resolve_text_range(from, to)
        .filter(|range| !range.is_empty())
    {
        Some(range) => println!("{range}\t{:?}", source.slice(range)),
        None => eprintln!(
            "{} Selection {from}..{to} does not map to any source text",
            "!!".yellow().bold()
        ),
    }
    Ok(())
}

fn run_locate(ctx: &Context, file: &Path, target: LocateTarget, code: bool) -> Result<()> {
    let (source, kind) = ctx.read_source(file, code)?;
    let tree = ctx.render(&source, kind)?;
    let index = NavigationIndex::new(&tree);

    if let Some(lines) = target.lines {
        let Some(block) = index.locate_lines(lines.clone()) else {
            eyre::bail!(
                "Lines {}..={} are not in {}",
                lines.start(),
                lines.end(),
                file.display()
            );
        };
        println!(
            "lines {}..={} {}",
            block.first_line, block.last_line, block.span
        );
        println!("{}", source.slice(block.span));
        return Ok(());
    }

    let offset = target.offset.unwrap_or_default();
    let range = SourceOffset::at(offset, 0);
    let Some(node) = index.locate(range) else {
        eyre::bail!("Offset {offset} is not inside any rendered node");
    };
    let found = tree.node(node);
    println!(
        "{} {} depth {}",
        output::tag_label(&found.tag),
        found
            .provenance
            .map(|p| p.to_string())
            .unwrap_or_else(|| "-".to_owned()),
        tree.depth(node)
    );

    let mut highlight = HighlightState::new(ctx.config.highlight_duration());
    let now = Instant::now();
    highlight.apply(index.locate_all(range), now);
    eprintln!(
        "{} Highlighting {} nodes for {}ms",
        "->".blue().bold(),
        highlight.active(now).count().to_string().green(),
        highlight.lifetime().as_millis()
    );
    Ok(())
}

fn run_files(ctx: &Context, command: FilesCommand) -> Result<()> {
    match command {
        FilesCommand::Add {
            store,
            path,
            kind,
            name,
        } => {
            let mut target = Store::open_or_create(&store)?;
            let kind = match kind.or_else(|| SourceKind::from_path(&path)) {
                Some(kind) => kind,
                None => eyre::bail!(
                    "Cannot tell whether {} is a document or code; pass --kind",
                    path.display()
                ),
            };
            let name = match name {
                Some(name) => name,
                None => path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .ok_or_else(|| eyre::eyre!("{} has no file name", path.display()))?,
            };
            let bytes = std::fs::read(&path)
                .wrap_err_with(|| format!("Failed to read {}", path.display()))?;
            let file = ProjectFile::from_bytes(name.clone(), &bytes, kind)
                .with_local_path(path.display().to_string());

            eprintln!("{} Adding {} as {kind}...", "->".blue().bold(), name);
            target
                .registry_mut()
                .add_file(file)
                .wrap_err_with(|| format!("Failed to add {}", path.display()))?;
            ctx.save(&target)?;
            eprintln!("{} Registered {}", "OK".green().bold(), name);
        }
        FilesCommand::List { store } => {
            let target = Store::open(&store)?;
            for kind in [SourceKind::Doc, SourceKind::Code] {
                for file in target.registry().files(kind) {
                    println!("{:<4} {} {}", kind.as_str(), file.name, file.local_path);
                }
            }
        }
    }
    Ok(())
}

fn run_annotations(ctx: &Context, command: AnnotationsCommand) -> Result<()> {
    match command {
        AnnotationsCommand::List { store } => {
            let target = Store::open(&store)?;
            if target.registry().is_empty() {
                eprintln!("No annotations in {}", store.display());
            }
            for annotation in target.registry().iter() {
                print!("{}", output::render_annotation(annotation));
            }
        }
        AnnotationsCommand::Add {
            store,
            file,
            selection,
            category,
            annotation,
        } => {
            let mut target = Store::open(&store)?;
            let (range, kind) = select(ctx, &target, &file, &selection)?;
            let id = match annotation {
                Some(raw) => {
                    let id = Store::parse_id(&raw)?;
                    target
                        .registry_mut()
                        .append_range(id, range, kind)
                        .wrap_err("Failed to append range")?;
                    id
                }
                None => {
                    target
                        .registry_mut()
                        .create(category, range, kind)
                        .wrap_err("Failed to create annotation")?
                        .id
                }
            };
            ctx.save(&target)?;
            println!("{id}");
        }
        AnnotationsCommand::Remove {
            store,
            id,
            kind,
            index,
        } => {
            let mut target = Store::open(&store)?;
            let id = Store::parse_id(&id)?;
            let outcome = target
                .registry_mut()
                .remove_range(id, kind, index)
                .wrap_err("Failed to remove range")?;
            ctx.save(&target)?;
            match outcome {
                RemoveOutcome::RangeRemoved(range) => eprintln!(
                    "{} Removed {} [{}, {})",
                    "OK".green().bold(),
                    range.document_id,
                    range.start,
                    range.end
                ),
                RemoveOutcome::AnnotationDeleted(annotation) => eprintln!(
                    "{} Removed the last range; deleted {}",
                    "OK".green().bold(),
                    annotation.id
                ),
            }
        }
        AnnotationsCommand::Rename {
            store,
            id,
            category,
        } => {
            let mut target = Store::open(&store)?;
            let id = Store::parse_id(&id)?;
            target
                .registry_mut()
                .rename(id, category)
                .wrap_err("Failed to rename annotation")?;
            ctx.save(&target)?;
        }
        AnnotationsCommand::Delete { store, id } => {
            let mut target = Store::open(&store)?;
            let id = Store::parse_id(&id)?;
            let deleted = target
                .registry_mut()
                .delete(id)
                .wrap_err("Failed to delete annotation")?;
            ctx.save(&target)?;
            eprintln!(
                "{} Deleted {} ({} ranges)",
                "OK".green().bold(),
                deleted.category,
                deleted.range_count()
            );
        }
        AnnotationsCommand::Show { store, id, file } => {
            let target = Store::open(&store)?;
            let id = Store::parse_id(&id)?;
            run_show(ctx, &target, id, &file)?;
        }
    }
    Ok(())
}

/// Turn a command-line selection into a range over a registered file.
fn select(
    ctx: &Context,
    store: &Store,
    name: &str,
    selection: &Selection,
) -> Result<(AnchoredRange, SourceKind)> {
    let file = store.file(name)?;
    let source = ctx.index(file);

    let span = match (&selection.lines, selection.from, selection.to) {
        (Some(lines), _, _) => source
            .lines_span(*lines.start(), *lines.end())
            .ok_or_else(|| eyre::eyre!("Lines {lines:?} are not in `{name}`"))?,
        (None, Some(from), Some(to)) => {
            let tree = ctx.render(&source, file.kind)?;
            RangeResolver::new(&tree)
                .resolve_text_range(from, to)
                .filter(|range| !range.is_empty())
                .ok_or_else(|| {
                    eyre::eyre!("Selection {from}..{to} does not map to any text in `{name}`")
                })?
        }
        _ => eyre::bail!("Pass either --from/--to or --lines"),
    };
    Ok((AnchoredRange::capture(name, &source, span), file.kind))
}

fn run_show(ctx: &Context, store: &Store, id: spanlink_core::AnnotationId, name: &str) -> Result<()> {
    let registry = store.registry();
    let Some(annotation) = registry.get(id) else {
        eyre::bail!("No annotation {id}");
    };
    let file = store.file(name)?;
    if file.kind != SourceKind::Code {
        eyre::bail!("`{name}` is not a code file");
    }
    let source = ctx.index(file);
    let tree = ctx.renderer.render_code(&source);

    let lines_of = |range: &AnchoredRange| {
        range
            .offset()
            .and_then(|offset| source.line_range_of(offset))
            .map(|(first, last)| first..=last)
    };
    let current: Vec<_> = annotation
        .code_ranges
        .iter()
        .filter(|r| r.document_id == name)
        .filter_map(lines_of)
        .collect();
    let others: Vec<_> = registry
        .iter()
        .filter(|a| a.id != id)
        .flat_map(|a| a.code_ranges.iter())
        .filter(|r| r.document_id == name)
        .filter_map(lines_of)
        .collect();

    let blocks = coalesce_lines(&tree, &current, &others);
    print!("{}", output::render_line_blocks(&tree, &blocks));
    Ok(())
}

fn run_fold(ctx: &Context, store: &Path, annotation: &str, response: &Path) -> Result<()> {
    let mut target = Store::open(store)?;
    let id = Store::parse_id(annotation)?;
    let Some(existing) = target.registry().get(id) else {
        eyre::bail!("No annotation {id} in {}", store.display());
    };
    let requirement = existing
        .doc_ranges
        .first()
        .map(|r| r.content.clone())
        .unwrap_or_else(|| existing.category.clone());

    let json = std::fs::read_to_string(response)
        .wrap_err_with(|| format!("Failed to read {}", response.display()))?;
    let answer: SuggestResponse = serde_json::from_str(&json)
        .wrap_err_with(|| format!("Invalid suggestion response {}", response.display()))?;

    eprintln!(
        "{} Folding {} related spans into {}...",
        "->".blue().bold(),
        answer.related_code.len(),
        id
    );
    let suggester = move |_: &SuggestRequest| Ok::<_, SuggestError>(answer.clone());
    let added = SuggestionTracker::new()
        .run(&suggester, id, &requirement, target.registry_mut())
        .wrap_err("Failed to fold suggestion")?;
    ctx.save(&target)?;
    eprintln!(
        "{} Added {} code ranges",
        "OK".green().bold(),
        added.to_string().green()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_line_ranges() {
        assert_eq!(parse_lines("3:7"), Ok(3..=7));
        assert_eq!(parse_lines("4"), Ok(4..=4));
        assert!(parse_lines("0:2").is_err());
        assert!(parse_lines("5:2").is_err());
        assert!(parse_lines("a:b").is_err());
    }

    #[test]
    fn parses_kinds() {
        assert_eq!(parse_kind("code"), Ok(SourceKind::Code));
        assert!(parse_kind("binary").is_err());
    }

    #[test]
    fn parses_modes() {
        assert_eq!(parse_mode("substring-search"), Ok(RenderMode::SubstringSearch));
        assert!(parse_mode("Structural").is_err());
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Args::command().debug_assert();
    }
}

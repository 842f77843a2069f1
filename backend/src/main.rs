//! Bulkport CLI - Bulk import and export of repository resources
//!
//! # Main Commands
//!
//! ```bash
//! bulkport import books.csv --store store.json      # Import a file (automapped)
//! bulkport export --store store.json -o out.ods     # Export resources
//! bulkport mapping list                             # Manage stored mappings
//! ```
//!
//! # Inspection Commands
//!
//! ```bash
//! bulkport fields books.csv                # Source fields and automap suggestions
//! bulkport automap books.csv -o map.json   # Write an editable mapping
//! bulkport resolve --store store.json A B  # Resolve identifiers
//! bulkport formats                         # Supported input and output formats
//! ```
//!
//! Logs go to stderr; set `RUST_LOG` for library diagnostics.

use bulkport::job::LogEntry;
use bulkport::processor::UnidentifiedPolicy;
use bulkport::{
    Action, Automap, AutomapDictionary, AutomapOptions, CancellationToken, ExportConfig, ExportJob,
    FieldMapping, FormatterRegistry, IdentifierResolver, ImportJob, ImportOptions, Job, JobLogger,
    JobStatus, LogLevel, MappingRegistry, MemoryStore, ReaderOptions, ReaderRegistry,
    ResourceStore, ResourceType,
};
use clap::{Parser, Subcommand};
use serde::{de::DeserializeOwned, Deserialize};
use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

type CliResult<T = ()> = Result<T, Box<dyn Error>>;

#[derive(Parser)]
#[command(name = "bulkport")]
#[command(about = "Bulk import and export of repository resources", long_about = None)]
struct Cli {
    /// Print info-level job messages
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Source options shared by commands reading a file.
#[derive(clap::Args)]
struct SourceArgs {
    /// Input file
    input: PathBuf,

    /// Reader format (default: from the file extension)
    #[arg(short, long)]
    format: Option<String>,

    /// Cell delimiter (auto-detect if not specified)
    #[arg(short, long)]
    delimiter: Option<char>,

    /// Multi-value separator inside cells
    #[arg(short, long)]
    separator: Option<String>,
}

impl SourceArgs {
    fn reader_options(&self, base: ReaderOptions) -> ReaderOptions {
        ReaderOptions {
            delimiter: self.delimiter.or(base.delimiter),
            separator: self.separator.clone().or(base.separator),
            ..base
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// List the fields of a source with automap suggestions
    Fields {
        #[command(flatten)]
        source: SourceArgs,

        /// Extra automap dictionary (JSON)
        #[arg(long)]
        dictionary: Option<PathBuf>,
    },

    /// Automap a source and write the mapping as JSON
    Automap {
        #[command(flatten)]
        source: SourceArgs,

        /// Extra automap dictionary (JSON)
        #[arg(long)]
        dictionary: Option<PathBuf>,

        /// Do not match bare local names and labels
        #[arg(long)]
        no_names: bool,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Also save the mapping in the registry under this name
        #[arg(long)]
        save_as: Option<String>,
    },

    /// Resolve identifiers against a store
    Resolve {
        /// Store snapshot
        #[arg(long)]
        store: PathBuf,

        /// Identifier kind (o:id, a property term, media_source:url...)
        #[arg(short, long, default_value = "dcterms:identifier")]
        kind: String,

        /// Restrict to a resource type
        #[arg(short = 't', long = "type")]
        resource_type: Option<String>,

        /// Leave ambiguous identifiers unresolved
        #[arg(long)]
        unique: bool,

        /// Identifiers
        #[arg(required = true)]
        identifiers: Vec<String>,
    },

    /// Import a source into a store
    Import {
        #[command(flatten)]
        source: SourceArgs,

        /// Store snapshot (created when missing)
        #[arg(long)]
        store: PathBuf,

        /// Job configuration (JSON: {"reader": {...}, "import": {...}})
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Mapping file (default: stored mapping or automap)
        #[arg(short, long)]
        mapping: Option<PathBuf>,

        /// Stored mapping id
        #[arg(long, conflicts_with = "mapping")]
        use_mapping: Option<String>,

        /// Action: create, append, revise, update, replace, delete, skip
        #[arg(short, long)]
        action: Option<Action>,

        /// Resource type of the rows
        #[arg(short = 't', long = "type")]
        resource_type: Option<String>,

        /// Rows per batch
        #[arg(long)]
        batch_size: Option<usize>,

        /// Unidentified rows of update actions: skip or create
        #[arg(long)]
        unidentified: Option<UnidentifiedPolicy>,

        /// Proceed with duplicate identifiers
        #[arg(long)]
        allow_duplicates: bool,

        /// Validate only, store nothing
        #[arg(long)]
        dry_run: bool,
    },

    /// Export resources from a store
    Export {
        /// Store snapshot
        #[arg(long)]
        store: PathBuf,

        /// Output file
        #[arg(short, long)]
        output: PathBuf,

        /// Export configuration (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Output format (default: from the output extension)
        #[arg(short, long)]
        format: Option<String>,

        /// Resource types
        #[arg(short = 't', long = "type")]
        resource_types: Vec<String>,

        /// Fields to keep (`dcterms:*` for a vocabulary)
        #[arg(short, long)]
        include: Vec<String>,

        /// Fields to drop
        #[arg(short = 'x', long)]
        exclude: Vec<String>,

        /// Multi-value separator
        #[arg(short, long)]
        separator: Option<String>,

        /// Handlebars template file (txt format)
        #[arg(long)]
        template: Option<PathBuf>,
    },

    /// Manage stored mappings
    Mapping {
        #[command(subcommand)]
        action: MappingAction,
    },

    /// Show supported input and output formats
    Formats,
}

#[derive(Subcommand)]
enum MappingAction {
    /// List all stored mappings
    List,

    /// Import a mapping JSON file
    Import {
        /// Mapping JSON file to import
        file: PathBuf,
        /// Name for the mapping
        #[arg(short, long)]
        name: Option<String>,
    },

    /// Show details of a mapping
    Show {
        /// Mapping ID
        id: String,
    },

    /// Delete a mapping
    Delete {
        /// Mapping ID
        id: String,
    },
}

/// Import job file.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ImportFile {
    reader: ReaderOptions,
    import: ImportOptions,
}

#[tokio::main]
async fn main() {
    // Load .env file (if present)
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with_writer(std::io::stderr)
        .without_time()
        .init();

    let cli = Cli::parse();
    let verbose = cli.verbose;

    let result = match cli.command {
        Commands::Fields { source, dictionary } => cmd_fields(&source, dictionary.as_deref()),

        Commands::Automap {
            source,
            dictionary,
            no_names,
            output,
            save_as,
        } => cmd_automap(&source, dictionary.as_deref(), no_names, output.as_deref(), save_as),

        Commands::Resolve {
            store,
            kind,
            resource_type,
            unique,
            identifiers,
        } => cmd_resolve(&store, &kind, resource_type.as_deref(), unique, &identifiers),

        Commands::Import {
            source,
            store,
            config,
            mapping,
            use_mapping,
            action,
            resource_type,
            batch_size,
            unidentified,
            allow_duplicates,
            dry_run,
        } => {
            let overrides = ImportOverrides {
                action: if dry_run { Some(Action::Skip) } else { action },
                resource_type,
                batch_size,
                unidentified,
                allow_duplicates,
            };
            cmd_import(
                source,
                &store,
                config.as_deref(),
                mapping.as_deref(),
                use_mapping,
                overrides,
                verbose,
            )
            .await
        }

        Commands::Export {
            store,
            output,
            config,
            format,
            resource_types,
            include,
            exclude,
            separator,
            template,
        } => {
            let overrides = ExportOverrides {
                format,
                resource_types,
                include,
                exclude,
                separator,
                template,
            };
            cmd_export(&store, output, config.as_deref(), overrides, verbose).await
        }

        Commands::Mapping { action } => cmd_mapping(action),

        Commands::Formats => cmd_formats(),
    };

    if let Err(e) = result {
        eprintln!("❌ Error: {}", e);
        std::process::exit(1);
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn read_json<T: DeserializeOwned>(path: &Path) -> CliResult<T> {
    let content = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

fn parse_type(name: &str) -> CliResult<ResourceType> {
    ResourceType::parse(name).ok_or_else(|| format!("unknown resource type: {}", name).into())
}

fn write_output(content: &str, path: Option<&Path>) -> CliResult {
    match path {
        Some(p) => {
            fs::write(p, content)?;
            eprintln!("💾 Output written to: {}", p.display());
        }
        None => {
            println!("{}", content);
        }
    }
    Ok(())
}

fn load_automap(vocabulary: &bulkport::VocabularySet, dictionary: Option<&Path>, no_names: bool) -> CliResult<Automap> {
    let dictionary = match dictionary {
        Some(path) => AutomapDictionary::builtin().merged(&AutomapDictionary::from_file(path)?),
        None => AutomapDictionary::builtin().clone(),
    };
    let options = AutomapOptions {
        check_names_alone: !no_names,
        ..AutomapOptions::default()
    };
    Ok(Automap::new(vocabulary, &dictionary, options)?)
}

fn source_fields(source: &SourceArgs) -> CliResult<Vec<String>> {
    let registry = ReaderRegistry::default();
    let options = source.reader_options(ReaderOptions::default());
    let reader = match source.format {
        Some(ref format) => registry.open(format, &source.input, &options)?,
        None => registry.open_path(&source.input, &options)?,
    };
    if !reader.is_valid() {
        return Err(reader.last_error().unwrap_or("unreadable source").to_string().into());
    }
    Ok(reader.fields().to_vec())
}

fn print_entry(entry: &LogEntry) {
    let icon = match entry.level {
        LogLevel::Error => "❌",
        LogLevel::Warning => "⚠️ ",
        _ => "  ",
    };
    match entry.row {
        Some(row) => eprintln!("{} row {}: {}", icon, row, entry.message),
        None => eprintln!("{} {}", icon, entry.message),
    }
}

/// Run a job on a blocking thread; Ctrl-C requests a stop.
async fn run_job<J: Job + 'static>(mut job: J, verbose: bool) -> CliResult<(J, JobStatus)> {
    let cancel = CancellationToken::new();
    let logger = Arc::new(JobLogger::new());
    let min_level = if verbose { LogLevel::Info } else { LogLevel::Notice };

    let mut receiver = logger.subscribe();
    let printer = tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(entry) if entry.level >= min_level => print_entry(&entry),
                Ok(_) | Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            }
        }
    });

    let watcher = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("⏹️  Stopping after the current batch...");
                cancel.cancel();
            }
        })
    };

    let task_logger = logger.clone();
    let kind = job.kind();
    let (job, status) = tokio::task::spawn_blocking(move || {
        let status = job.perform(&cancel, &task_logger);
        (job, status)
    })
    .await?;

    watcher.abort();
    drop(logger);
    printer.await?;

    eprintln!("📋 {} {}", kind, status);
    Ok((job, status))
}

// =============================================================================
// Commands
// =============================================================================

fn cmd_fields(source: &SourceArgs, dictionary: Option<&Path>) -> CliResult {
    eprintln!("📄 Reading: {}", source.input.display());
    let fields = source_fields(source)?;
    let automap = load_automap(&bulkport::VocabularySet::builtin(), dictionary, false)?;

    for (field, target) in fields.iter().zip(automap.resolve(&fields)) {
        match target {
            Some(target) => println!("  {} → {}", field, target),
            None => println!("  {} (unmapped)", field),
        }
    }

    let registry = MappingRegistry::new();
    let compatible = registry.find_compatible(&fields);
    if !compatible.is_empty() {
        eprintln!("\n📋 Stored mappings for this header:");
        for (stored, score) in compatible.iter().take(3) {
            eprintln!(
                "   {} ({}), {:.0}% match, {:.0}% success",
                stored.name,
                stored.id,
                score * 100.0,
                stored.success_rate * 100.0
            );
        }
    }
    Ok(())
}

fn cmd_automap(
    source: &SourceArgs,
    dictionary: Option<&Path>,
    no_names: bool,
    output: Option<&Path>,
    save_as: Option<String>,
) -> CliResult {
    let fields = source_fields(source)?;
    let automap = load_automap(&bulkport::VocabularySet::builtin(), dictionary, no_names)?;
    let mapping = FieldMapping::from_automap(&automap, &fields);
    eprintln!("⚙️  Mapped {} of {} fields", mapping.fields.len(), fields.len());

    if let Some(name) = save_as {
        let id = MappingRegistry::new().save(mapping.clone(), &name, fields)?;
        eprintln!("✅ Mapping saved with ID: {}", id);
    }
    write_output(&mapping.to_json()?, output)
}

fn cmd_resolve(
    store: &Path,
    kind: &str,
    resource_type: Option<&str>,
    unique: bool,
    identifiers: &[String],
) -> CliResult {
    let store = MemoryStore::open(store)?;
    let scope = resource_type.map(parse_type).transpose()?;
    let resolver = IdentifierResolver::new(&store)?;
    let kind = resolver
        .kind(kind)
        .ok_or_else(|| format!("invalid identifier kind: {}", kind))?;

    let result = resolver.resolve(identifiers, &kind, scope, unique)?;
    for (identifier, id) in &result.ids {
        let count = result.count(identifier);
        match id {
            Some(id) if count > 1 => println!("  {} → {} ({} matches)", identifier, id, count),
            Some(id) => println!("  {} → {}", identifier, id),
            None if count > 1 => println!("  {} ambiguous ({} matches)", identifier, count),
            None => println!("  {} not found", identifier),
        }
    }
    Ok(())
}

struct ImportOverrides {
    action: Option<Action>,
    resource_type: Option<String>,
    batch_size: Option<usize>,
    unidentified: Option<UnidentifiedPolicy>,
    allow_duplicates: bool,
}

async fn cmd_import(
    source: SourceArgs,
    store_path: &Path,
    config: Option<&Path>,
    mapping: Option<&Path>,
    use_mapping: Option<String>,
    overrides: ImportOverrides,
    verbose: bool,
) -> CliResult {
    eprintln!("📄 Importing: {}", source.input.display());

    let file: ImportFile = match config {
        Some(path) => read_json(path)?,
        None => ImportFile::default(),
    };
    let reader_options = source.reader_options(file.reader);
    let mut options = file.import;
    if let Some(action) = overrides.action {
        options.action = action;
    }
    if let Some(ref name) = overrides.resource_type {
        options.resource_type = parse_type(name)?;
    }
    if let Some(size) = overrides.batch_size {
        options.batch_size = size;
    }
    if let Some(policy) = overrides.unidentified {
        options.unidentified = policy;
    }
    options.allow_duplicates |= overrides.allow_duplicates;

    // Mapping: explicit file, stored id, best stored match, else automap.
    let mut registry = MappingRegistry::new();
    let (field_mapping, stored_id) = match (mapping, use_mapping) {
        (Some(path), _) => (Some(FieldMapping::from_json(&fs::read_to_string(path)?)?), None),
        (None, Some(id)) => (Some(registry.get(&id)?.mapping.clone()), Some(id)),
        (None, None) => {
            let fields = source_fields(&source)?;
            match registry.find_compatible(&fields).first() {
                Some((stored, _)) => {
                    eprintln!("   Using stored mapping: {} ({})", stored.name, stored.id);
                    (Some(stored.mapping.clone()), Some(stored.id.clone()))
                }
                None => (None, None),
            }
        }
    };

    let store = Arc::new(MemoryStore::open(store_path)?);
    let mut job = ImportJob::new(store.clone() as Arc<dyn ResourceStore>, &source.input, options)
        .with_reader_options(reader_options);
    if let Some(format) = source.format {
        job = job.with_format(format);
    }
    if let Some(mapping) = field_mapping {
        job = job.with_mapping(mapping);
    }

    let (job, status) = run_job(job, verbose).await?;

    if let Some(summary) = job.summary() {
        eprintln!(
            "📊 {} rows: {} created, {} updated, {} deleted, {} skipped, {} rejected",
            summary.rows, summary.created, summary.updated, summary.deleted, summary.skipped, summary.rejected
        );
        for (category, count) in summary.issue_counts() {
            eprintln!("   {}: {}", category.as_str(), count);
        }
        // Committed batches are kept even when the run stopped or failed.
        if summary.batches > 0 {
            store.save()?;
            eprintln!("💾 Store saved: {}", store_path.display());
        }
        if let Some(ref id) = stored_id {
            registry.update_stats(id, status == JobStatus::Completed && summary.rejected == 0)?;
        }
    }

    match status {
        JobStatus::Failed => Err("import failed".into()),
        _ => Ok(()),
    }
}

struct ExportOverrides {
    format: Option<String>,
    resource_types: Vec<String>,
    include: Vec<String>,
    exclude: Vec<String>,
    separator: Option<String>,
    template: Option<PathBuf>,
}

async fn cmd_export(
    store_path: &Path,
    output: PathBuf,
    config: Option<&Path>,
    overrides: ExportOverrides,
    verbose: bool,
) -> CliResult {
    let mut config: ExportConfig = match config {
        Some(path) => read_json(path)?,
        None => ExportConfig::default(),
    };

    let formats = FormatterRegistry::default();
    let extension_format = output
        .extension()
        .and_then(|e| e.to_str())
        .and_then(|e| formats.format_for_extension(e));
    match (overrides.format, extension_format) {
        (Some(format), _) => config.format = format,
        (None, Some(format)) => config.format = format.to_string(),
        (None, None) => {}
    }
    if !overrides.resource_types.is_empty() {
        config.resource_types = overrides
            .resource_types
            .iter()
            .map(|t| parse_type(t))
            .collect::<CliResult<_>>()?;
    }
    config.include.extend(overrides.include);
    config.exclude.extend(overrides.exclude);
    if let Some(separator) = overrides.separator {
        config.separator = separator;
    }
    if let Some(path) = overrides.template {
        config.template = Some(fs::read_to_string(path)?);
    }

    if !store_path.exists() {
        return Err(format!("store not found: {}", store_path.display()).into());
    }
    let store: Arc<dyn ResourceStore> = Arc::new(MemoryStore::open(store_path)?);
    eprintln!("📤 Exporting as {} to: {}", config.format, output.display());

    let (job, status) = run_job(ExportJob::new(store, config, &output), verbose).await?;
    match status {
        JobStatus::Completed => {
            eprintln!("✅ {} resources written", job.written());
            Ok(())
        }
        JobStatus::Stopped => Ok(()),
        JobStatus::Failed => Err("export failed".into()),
    }
}

fn cmd_mapping(action: MappingAction) -> CliResult {
    let mut registry = MappingRegistry::new();

    match action {
        MappingAction::List => {
            let mappings = registry.list();
            if mappings.is_empty() {
                eprintln!("📋 No mappings stored yet in {}.", registry.dir().display());
                eprintln!("   Use 'bulkport mapping import <file>' to add one.");
                return Ok(());
            }

            eprintln!("📋 Stored mappings ({}):\n", mappings.len());
            for m in mappings {
                println!("  📄 {} ({})", m.name, m.id);
                println!("     Columns: {}", m.columns.join(", "));
                println!("     Success rate: {:.0}%", m.success_rate * 100.0);
                println!("     Uses: {}", m.use_count);
                if let Some(ref last) = m.last_used {
                    println!("     Last used: {}", last);
                }
                println!();
            }
        }

        MappingAction::Import { file, name } => {
            eprintln!("📥 Importing mapping from: {}", file.display());
            let id = registry.import(&file, name.as_deref())?;
            eprintln!("✅ Mapping saved with ID: {}", id);
        }

        MappingAction::Show { id } => {
            let m = registry.get(&id)?;
            println!("📄 Mapping: {} ({})\n", m.name, m.id);
            println!("Columns: {}", m.columns.join(", "));
            println!("Created: {}", m.created_at);
            println!("Success rate: {:.0}%", m.success_rate * 100.0);
            println!("Uses: {}", m.use_count);
            println!("\nMapping:");
            println!("{}", m.mapping.to_json()?);
        }

        MappingAction::Delete { id } => {
            registry.delete(&id)?;
            eprintln!("🗑️  Mapping deleted: {}", id);
        }
    }

    Ok(())
}

fn cmd_formats() -> CliResult {
    println!("Input formats:");
    for format in ReaderRegistry::default().formats() {
        println!("  {}", format);
    }
    println!("Output formats:");
    let registry = FormatterRegistry::default();
    for format in registry.formats() {
        let formatter = registry.get(format)?;
        println!("  {:<8} .{:<8} {}", format, formatter.extension(), formatter.media_type());
    }
    println!("Actions:");
    for action in Action::ALL {
        println!("  {}", action);
    }
    Ok(())
}

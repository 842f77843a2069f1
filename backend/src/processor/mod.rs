//! Import orchestration.
//!
//! The [`Processor`] reads entries, identifies the resources they describe,
//! applies the row action and commits changes in batches:
//!
//! ```text
//! pending → validating → running    → completed | failed | stopped
//!                      → failed-validation
//! ```
//!
//! - [`draft`] - turns an entry into a [`draft::ResourceDraft`]
//! - [`actions`] - what each [`Action`] does to a resource
//!
//! Row-level problems are recorded as [`RowIssue`]s and the run goes on.
//! Anything else (unreadable source, storage failure) stops the run, and
//! batches committed before it are kept.

pub mod actions;
pub mod draft;

use crate::entry::Entry;
use crate::error::{ProcessError, ProcessResult, ReaderError};
use crate::job::{CancellationToken, JobLogger, LogLevel};
use crate::mapping::{FieldMapping, StructuralField, Target};
use crate::models::{Resource, ResourceType};
use crate::reader::Reader;
use crate::resolver::{IdentifierKind, IdentifierResolver, IdentifierResult};
use crate::store::{Mutation, ResourceStore};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

pub use actions::{apply_action, Action};
pub use draft::{DraftBuilder, Patch, ResourceDraft};

/// Default number of entries per commit.
pub const DEFAULT_BATCH_SIZE: usize = 20;

// =============================================================================
// Options
// =============================================================================

/// What to do when an update action finds no resource.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnidentifiedPolicy {
    /// Skip the row.
    #[default]
    Skip,
    /// Create a new resource instead.
    Create,
}

impl FromStr for UnidentifiedPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "skip" => Ok(Self::Skip),
            "create" => Ok(Self::Create),
            other => Err(format!("unknown policy '{}' (expected skip or create)", other)),
        }
    }
}

/// Options for an import run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportOptions {
    /// Action applied to every row.
    pub action: Action,
    /// Type of the imported resources, unless a `resource_type` field says
    /// otherwise.
    pub resource_type: ResourceType,
    /// How rows identify existing resources, tried in order.
    pub identifier_kinds: Vec<String>,
    /// How linked values (item sets, parent items, `^^resource` values)
    /// are looked up, tried in order.
    pub link_kinds: Vec<String>,
    /// What to do with rows of an update action that match nothing.
    pub unidentified: UnidentifiedPolicy,
    /// Proceed with duplicate identifiers, using the first match.
    pub allow_duplicates: bool,
    /// Entries per commit.
    pub batch_size: usize,
    /// Source field overriding the action per row.
    pub action_field: Option<String>,
    /// Language of literal values without `@lang` qualifier.
    pub default_language: Option<String>,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            action: Action::Create,
            resource_type: ResourceType::Items,
            identifier_kinds: vec!["o:id".to_string(), "dcterms:identifier".to_string()],
            link_kinds: vec![
                "o:id".to_string(),
                "dcterms:identifier".to_string(),
                "dcterms:title".to_string(),
            ],
            unidentified: UnidentifiedPolicy::Skip,
            allow_duplicates: false,
            batch_size: DEFAULT_BATCH_SIZE,
            action_field: None,
            default_language: None,
        }
    }
}

// =============================================================================
// State & Summary
// =============================================================================

/// Lifecycle of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProcessState {
    Pending,
    Validating,
    Running,
    FailedValidation,
    Completed,
    Failed,
    Stopped,
}

impl ProcessState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessState::Pending => "pending",
            ProcessState::Validating => "validating",
            ProcessState::Running => "running",
            ProcessState::FailedValidation => "failed-validation",
            ProcessState::Completed => "completed",
            ProcessState::Failed => "failed",
            ProcessState::Stopped => "stopped",
        }
    }

    /// Whether the run is over.
    pub fn is_final(&self) -> bool {
        matches!(
            self,
            ProcessState::FailedValidation
                | ProcessState::Completed
                | ProcessState::Failed
                | ProcessState::Stopped
        )
    }
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of row-level problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueCategory {
    /// The row asks for an action that does not exist.
    UnknownAction,
    /// The row needs an identifier and has none.
    MissingIdentifier,
    /// The identifier matches no resource.
    Unidentified,
    /// The identifier is already used, in the source or in storage.
    DuplicateIdentifier,
    /// The identifier matches several resources.
    AmbiguousIdentifier,
    /// A linked resource could not be found.
    UnresolvedReference,
    /// A value cannot be used for its target.
    InvalidValue,
}

impl IssueCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueCategory::UnknownAction => "unknown_action",
            IssueCategory::MissingIdentifier => "missing_identifier",
            IssueCategory::Unidentified => "unidentified",
            IssueCategory::DuplicateIdentifier => "duplicate_identifier",
            IssueCategory::AmbiguousIdentifier => "ambiguous_identifier",
            IssueCategory::UnresolvedReference => "unresolved_reference",
            IssueCategory::InvalidValue => "invalid_value",
        }
    }
}

impl fmt::Display for IssueCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A problem found on one row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowIssue {
    pub row: usize,
    pub level: LogLevel,
    pub category: IssueCategory,
    pub message: String,
}

impl RowIssue {
    pub fn error(row: usize, category: IssueCategory, message: impl Into<String>) -> Self {
        Self {
            row,
            level: LogLevel::Error,
            category,
            message: message.into(),
        }
    }

    pub fn warning(row: usize, category: IssueCategory, message: impl Into<String>) -> Self {
        Self {
            row,
            level: LogLevel::Warning,
            category,
            message: message.into(),
        }
    }

    pub fn notice(row: usize, category: IssueCategory, message: impl Into<String>) -> Self {
        Self {
            row,
            level: LogLevel::Notice,
            category,
            message: message.into(),
        }
    }
}

/// Result of an import run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportSummary {
    pub state: ProcessState,
    /// Entries read.
    pub rows: usize,
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    /// Rows left untouched (dry run, unidentified, nothing to delete).
    pub skipped: usize,
    /// Rows refused because of an error.
    pub rejected: usize,
    /// Batches committed.
    pub batches: usize,
    pub issues: Vec<RowIssue>,
}

impl ImportSummary {
    fn new() -> Self {
        Self {
            state: ProcessState::Running,
            rows: 0,
            created: 0,
            updated: 0,
            deleted: 0,
            skipped: 0,
            rejected: 0,
            batches: 0,
            issues: Vec::new(),
        }
    }

    /// Number of issues per category.
    pub fn issue_counts(&self) -> BTreeMap<IssueCategory, usize> {
        let mut counts = BTreeMap::new();
        for issue in &self.issues {
            *counts.entry(issue.category).or_insert(0) += 1;
        }
        counts
    }

    /// Issues of error level.
    pub fn errors(&self) -> impl Iterator<Item = &RowIssue> {
        self.issues.iter().filter(|i| i.level == LogLevel::Error)
    }
}

// =============================================================================
// Processor
// =============================================================================

/// Everything validation derives from the configuration.
#[derive(Debug, Clone)]
struct Plan {
    identifier_kinds: Vec<IdentifierKind>,
    link_kinds: Vec<IdentifierKind>,
    identifier_sources: Vec<String>,
    type_sources: Vec<String>,
}

/// What one row will do.
#[derive(Debug)]
struct RowPlan {
    action: Action,
    resource_type: ResourceType,
    identifier: Option<String>,
}

/// Import state carried across batches.
struct RunState {
    summary: ImportSummary,
    seen: HashSet<(ResourceType, String)>,
}

impl RunState {
    fn record(&mut self, logger: &JobLogger, issue: RowIssue) {
        logger.log_row(
            issue.row,
            issue.level,
            "{category}: {message}",
            json!({ "category": issue.category.as_str(), "message": issue.message }),
        );
        self.summary.issues.push(issue);
    }

    fn reject(&mut self, logger: &JobLogger, issue: RowIssue) {
        self.summary.rejected += 1;
        self.record(logger, issue);
    }
}

/// Runs one import.
pub struct Processor<'a> {
    store: &'a dyn ResourceStore,
    mapping: FieldMapping,
    options: ImportOptions,
    state: ProcessState,
    plan: Option<Plan>,
}

impl<'a> Processor<'a> {
    pub fn new(store: &'a dyn ResourceStore, mapping: FieldMapping, options: ImportOptions) -> Self {
        Self {
            store,
            mapping,
            options,
            state: ProcessState::Pending,
            plan: None,
        }
    }

    pub fn state(&self) -> ProcessState {
        self.state
    }

    pub fn options(&self) -> &ImportOptions {
        &self.options
    }

    pub fn mapping(&self) -> &FieldMapping {
        &self.mapping
    }

    /// Check the configuration against the source fields.
    ///
    /// Moves to `validating` on success and `failed-validation` otherwise.
    pub fn validate(&mut self, fields: &[String]) -> ProcessResult<()> {
        self.state = ProcessState::Validating;
        match self.check(fields) {
            Ok(plan) => {
                self.plan = Some(plan);
                Ok(())
            }
            Err(e) => {
                self.state = ProcessState::FailedValidation;
                Err(e)
            }
        }
    }

    fn check(&self, fields: &[String]) -> ProcessResult<Plan> {
        if self.options.batch_size == 0 {
            return Err(ProcessError::InvalidConfig("batch size must be at least 1".into()));
        }
        if self.mapping.is_empty() {
            return Err(ProcessError::InvalidConfig("no source field is mapped".into()));
        }
        if let Err(missing) = self.mapping.validate_headers(fields) {
            return Err(ProcessError::InvalidConfig(format!(
                "mapped fields missing from the source: {}",
                missing.join(", ")
            )));
        }
        if let Some(ref field) = self.options.action_field {
            if !fields.contains(field) {
                return Err(ProcessError::InvalidConfig(format!(
                    "action field '{}' is not in the source",
                    field
                )));
            }
        }

        let vocabulary = self.store.vocabulary()?;
        self.mapping.validate(&vocabulary)?;

        let parse_kinds = |descriptors: &[String]| -> ProcessResult<Vec<IdentifierKind>> {
            descriptors
                .iter()
                .map(|d| {
                    IdentifierKind::parse(d, &vocabulary).ok_or_else(|| {
                        ProcessError::InvalidConfig(format!("invalid identifier kind '{}'", d))
                    })
                })
                .collect()
        };
        let identifier_kinds = parse_kinds(&self.options.identifier_kinds)?;
        let link_kinds = parse_kinds(&self.options.link_kinds)?;

        let mut identifier_sources: Vec<String> = Vec::new();
        for kind in &identifier_kinds {
            let targets = match kind {
                IdentifierKind::InternalId => vec![Target::InternalId],
                IdentifierKind::Properties(terms) => {
                    terms.iter().cloned().map(Target::Property).collect()
                }
                IdentifierKind::MediaSource { ingester, .. } => {
                    let mut targets = vec![Target::Nested {
                        parent: "o:media".to_string(),
                        child: ingester.clone(),
                    }];
                    if ingester == "url" {
                        targets.push(Target::Structural(StructuralField::Media));
                    }
                    targets
                }
            };
            for target in &targets {
                for source in self.mapping.sources_of(target) {
                    if !identifier_sources.iter().any(|s| s == source) {
                        identifier_sources.push(source.to_string());
                    }
                }
            }
        }

        if self.options.action.needs_identifier()
            && identifier_sources.is_empty()
            && self.options.action_field.is_none()
        {
            return Err(ProcessError::InvalidConfig(format!(
                "action '{}' needs a mapped identifier field ({})",
                self.options.action,
                self.options.identifier_kinds.join(", ")
            )));
        }

        let type_sources = self
            .mapping
            .sources_of(&Target::Structural(StructuralField::ResourceType))
            .into_iter()
            .map(String::from)
            .collect();

        Ok(Plan {
            identifier_kinds,
            link_kinds,
            identifier_sources,
            type_sources,
        })
    }

    /// Run the import to the end of the source, a stop request or a fatal
    /// error.
    pub fn run(
        &mut self,
        reader: &mut dyn Reader,
        cancel: &CancellationToken,
        logger: &JobLogger,
    ) -> ProcessResult<ImportSummary> {
        if !reader.is_valid() {
            self.state = ProcessState::Failed;
            let message = reader.last_error().unwrap_or("unreadable source").to_string();
            logger.error("Source cannot be read: {error}", json!({ "error": message }));
            return Err(ReaderError::InvalidSource(message).into());
        }
        if self.state == ProcessState::Pending {
            if let Err(e) = self.validate(reader.fields()) {
                logger.error("Invalid import configuration: {error}", json!({ "error": e.to_string() }));
                return Err(e);
            }
        }
        let plan = match (self.state, self.plan.clone()) {
            (ProcessState::Validating, Some(plan)) => plan,
            (state, _) => {
                return Err(ProcessError::InvalidConfig(format!(
                    "cannot run an import in state {}",
                    state
                )))
            }
        };

        self.state = ProcessState::Running;
        logger.info(
            "Import started: action {action}, {resource_type}, batches of {batch_size}",
            json!({
                "action": self.options.action.as_str(),
                "resource_type": self.options.resource_type.api_name(),
                "batch_size": self.options.batch_size,
            }),
        );

        let mut run = RunState {
            summary: ImportSummary::new(),
            seen: HashSet::new(),
        };
        let outcome = self.run_batches(&plan, reader, cancel, logger, &mut run);
        let mut summary = run.summary;

        self.state = match outcome {
            Ok(true) => ProcessState::Stopped,
            Ok(false) => ProcessState::Completed,
            Err(_) => ProcessState::Failed,
        };
        summary.state = self.state;

        let params = json!({
            "rows": summary.rows,
            "created": summary.created,
            "updated": summary.updated,
            "deleted": summary.deleted,
            "skipped": summary.skipped,
            "rejected": summary.rejected,
            "batches": summary.batches,
        });
        match outcome {
            Err(e) => {
                logger.error(
                    "Import failed after {batches} committed batches: {error}",
                    json!({ "batches": summary.batches, "error": e.to_string() }),
                );
                Err(e)
            }
            Ok(stopped) => {
                let template = if stopped {
                    "Import stopped after {rows} rows: {created} created, {updated} updated, {deleted} deleted, {skipped} skipped, {rejected} rejected"
                } else {
                    "Import completed, {rows} rows: {created} created, {updated} updated, {deleted} deleted, {skipped} skipped, {rejected} rejected"
                };
                logger.notice(template, params);
                for (category, count) in summary.issue_counts() {
                    logger.info(
                        "{count} rows with {category}",
                        json!({ "count": count, "category": category.as_str() }),
                    );
                }
                Ok(summary)
            }
        }
    }

    /// Returns whether the run was stopped.
    fn run_batches(
        &self,
        plan: &Plan,
        reader: &mut dyn Reader,
        cancel: &CancellationToken,
        logger: &JobLogger,
        run: &mut RunState,
    ) -> ProcessResult<bool> {
        let resolver = IdentifierResolver::new(self.store)?;
        loop {
            if cancel.is_cancelled() {
                return Ok(true);
            }
            let batch = read_batch(reader, self.options.batch_size)?;
            if batch.is_empty() {
                return Ok(false);
            }
            run.summary.rows += batch.len();

            let mutations = self.process_batch(plan, &resolver, &batch, logger, run)?;
            if !mutations.is_empty() {
                let changes = mutations.len();
                self.store.commit(mutations)?;
                logger.log(
                    LogLevel::Debug,
                    "Batch {batch} committed: {changes} changes",
                    json!({ "batch": run.summary.batches + 1, "changes": changes }),
                );
            }
            run.summary.batches += 1;
        }
    }

    fn plan_row(&self, plan: &Plan, entry: &Entry) -> Result<RowPlan, RowIssue> {
        let row = entry.row();
        let action = match self.options.action_field.as_deref().and_then(|f| entry.first(f)) {
            Some(raw) => raw
                .parse::<Action>()
                .map_err(|e| RowIssue::error(row, IssueCategory::UnknownAction, e))?,
            None => self.options.action,
        };
        let resource_type = match plan.type_sources.iter().find_map(|s| entry.first(s)) {
            Some(raw) => ResourceType::parse(raw).ok_or_else(|| {
                RowIssue::error(row, IssueCategory::InvalidValue, format!("unknown resource type '{}'", raw))
            })?,
            None => self.options.resource_type,
        };
        let identifier = plan
            .identifier_sources
            .iter()
            .find_map(|s| entry.first(s))
            .map(str::trim)
            .filter(|i| !i.is_empty())
            .map(String::from);

        if identifier.is_none() && action.needs_identifier() {
            return Err(RowIssue::error(
                row,
                IssueCategory::MissingIdentifier,
                format!("action '{}' needs an identifier", action),
            ));
        }
        Ok(RowPlan {
            action,
            resource_type,
            identifier,
        })
    }

    fn process_batch(
        &self,
        plan: &Plan,
        resolver: &IdentifierResolver,
        entries: &[Entry],
        logger: &JobLogger,
        run: &mut RunState,
    ) -> ProcessResult<Vec<Mutation>> {
        let allow_duplicates = self.options.allow_duplicates;

        let mut rows = Vec::with_capacity(entries.len());
        for entry in entries {
            match self.plan_row(plan, entry) {
                Ok(row_plan) => rows.push((entry, row_plan)),
                Err(issue) => run.reject(logger, issue),
            }
        }

        // One lookup per resource type for the whole batch.
        let mut identifiers: IndexMap<ResourceType, Vec<String>> = IndexMap::new();
        for (_, row_plan) in &rows {
            if let Some(ref identifier) = row_plan.identifier {
                identifiers
                    .entry(row_plan.resource_type)
                    .or_default()
                    .push(identifier.clone());
            }
        }
        let mut results: HashMap<ResourceType, IdentifierResult> = HashMap::new();
        for (resource_type, values) in identifiers {
            let result = resolver.resolve_any(
                &values,
                &plan.identifier_kinds,
                Some(resource_type),
                !allow_duplicates,
            )?;
            results.insert(resource_type, result);
        }

        let mut builder = DraftBuilder::new(
            resolver,
            plan.link_kinds.clone(),
            self.options.default_language.clone(),
        );
        // Resources changed earlier in this batch; `None` once deleted.
        let mut staged: HashMap<u64, Option<Resource>> = HashMap::new();
        let mut mutations = Vec::new();

        for (entry, row_plan) in rows {
            let row = entry.row();
            let RowPlan {
                action,
                resource_type,
                identifier,
            } = row_plan;

            let mut resolved = None;
            if let Some(ref identifier) = identifier {
                if !run.seen.insert((resource_type, identifier.to_lowercase())) {
                    let issue = format!("identifier '{}' appears more than once in the source", identifier);
                    if !allow_duplicates {
                        run.reject(logger, RowIssue::error(row, IssueCategory::DuplicateIdentifier, issue));
                        continue;
                    }
                    run.record(logger, RowIssue::warning(row, IssueCategory::DuplicateIdentifier, issue));
                }

                let result = results.get(&resource_type);
                let count = result.map_or(0, |r| r.count(identifier));
                resolved = result.and_then(|r| r.get(identifier));
                if count > 1 {
                    if !allow_duplicates {
                        run.reject(
                            logger,
                            RowIssue::error(
                                row,
                                IssueCategory::AmbiguousIdentifier,
                                format!("identifier '{}' matches {} resources", identifier, count),
                            ),
                        );
                        continue;
                    }
                    run.record(
                        logger,
                        RowIssue::warning(
                            row,
                            IssueCategory::AmbiguousIdentifier,
                            format!(
                                "identifier '{}' matches {} resources, using #{}",
                                identifier,
                                count,
                                resolved.unwrap_or_default()
                            ),
                        ),
                    );
                }
                if resolved.is_some_and(|id| matches!(staged.get(&id), Some(None))) {
                    resolved = None;
                }
            }
            let identifier = identifier.unwrap_or_default();

            if action == Action::Delete {
                match resolved {
                    Some(id) => {
                        mutations.push(Mutation::Delete(id));
                        staged.insert(id, None);
                        run.summary.deleted += 1;
                    }
                    None => {
                        run.summary.skipped += 1;
                        run.record(
                            logger,
                            RowIssue::notice(
                                row,
                                IssueCategory::Unidentified,
                                format!("nothing to delete for '{}'", identifier),
                            ),
                        );
                    }
                }
                continue;
            }

            let mut issues = Vec::new();
            let draft = builder.build(entry, &self.mapping, resource_type, &mut issues)?;
            for issue in issues {
                run.record(logger, issue);
            }

            if action == Action::Skip {
                run.summary.skipped += 1;
                continue;
            }

            if action.is_update() {
                let base = match resolved {
                    Some(id) => match staged.get(&id) {
                        Some(staged) => staged.clone(),
                        None => self.store.get(id)?,
                    },
                    None => None,
                };
                match base {
                    Some(base) => {
                        let id = base.id;
                        let media = self.new_media(resolver, id, draft.media.clone())?;
                        let resource = apply_action(action, base, &draft);
                        staged.insert(id, Some(resource.clone()));
                        mutations.push(Mutation::Update {
                            resource: Box::new(resource),
                            media,
                        });
                        run.summary.updated += 1;
                        continue;
                    }
                    None if self.options.unidentified == UnidentifiedPolicy::Skip => {
                        run.summary.skipped += 1;
                        run.record(
                            logger,
                            RowIssue::error(
                                row,
                                IssueCategory::Unidentified,
                                format!("no {} found for '{}'", resource_type, identifier),
                            ),
                        );
                        continue;
                    }
                    None => {}
                }
            } else if let Some(id) = resolved.filter(|_| !allow_duplicates) {
                run.reject(
                    logger,
                    RowIssue::error(
                        row,
                        IssueCategory::DuplicateIdentifier,
                        format!("identifier '{}' is already used by #{}", identifier, id),
                    ),
                );
                continue;
            }

            if resource_type == ResourceType::Media && draft.item.as_set().is_none() {
                run.reject(
                    logger,
                    RowIssue::error(
                        row,
                        IssueCategory::UnresolvedReference,
                        "a media needs a parent item (o:item)",
                    ),
                );
                continue;
            }
            if resource_type == ResourceType::Media && draft.media_source.as_set().is_none() {
                run.reject(
                    logger,
                    RowIssue::error(row, IssueCategory::InvalidValue, "a media needs a source (o:media)"),
                );
                continue;
            }

            let resource = apply_action(Action::Create, Resource::new(resource_type), &draft);
            let media = if resource_type == ResourceType::Items {
                draft.media
            } else {
                Vec::new()
            };
            mutations.push(Mutation::Create {
                resource: Box::new(resource),
                media,
            });
            run.summary.created += 1;
        }

        Ok(mutations)
    }

    /// Drop media whose source is already attached to the item.
    fn new_media(
        &self,
        resolver: &IdentifierResolver,
        item: u64,
        media: Vec<Resource>,
    ) -> ProcessResult<Vec<Resource>> {
        let mut fresh = Vec::with_capacity(media.len());
        for m in media {
            let Some(ref source) = m.media_source else {
                continue;
            };
            let kind = IdentifierKind::MediaSource {
                ingester: source.ingester.clone(),
                item: Some(item),
            };
            if resolver.resolve_one(&source.source, &kind, None, false)?.is_none() {
                fresh.push(m);
            }
        }
        Ok(fresh)
    }
}

fn read_batch(reader: &mut dyn Reader, size: usize) -> ProcessResult<Vec<Entry>> {
    let mut batch = Vec::with_capacity(size);
    while batch.len() < size {
        match reader.next_entry()? {
            Some(entry) => batch.push(entry),
            None => break,
        }
    }
    Ok(batch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::FieldTarget;
    use crate::models::{PropertyValue, VocabularySet};
    use crate::reader::{csv::CsvReader, ReaderOptions};
    use crate::store::MemoryStore;

    fn mapping(pairs: &[(&str, &str)]) -> FieldMapping {
        let mut mapping = FieldMapping::new();
        for (source, target) in pairs {
            mapping.push(source, FieldTarget::parse(target).unwrap());
        }
        mapping
    }

    fn csv(content: &str) -> CsvReader {
        CsvReader::from_bytes(
            "test.csv",
            content.as_bytes(),
            ReaderOptions::default().with_separator("|"),
        )
    }

    fn import(
        store: &MemoryStore,
        mapping: FieldMapping,
        options: ImportOptions,
        content: &str,
    ) -> ImportSummary {
        let mut processor = Processor::new(store, mapping, options);
        let mut reader = csv(content);
        processor
            .run(&mut reader, &CancellationToken::new(), &JobLogger::new())
            .unwrap()
    }

    fn titles(store: &MemoryStore) -> Vec<String> {
        store
            .ids(Some(ResourceType::Items))
            .unwrap()
            .into_iter()
            .filter_map(|id| store.get(id).unwrap())
            .map(|r| r.display_title())
            .collect()
    }

    #[test]
    fn test_create_items_with_media_and_item_sets() {
        let store = MemoryStore::new(VocabularySet::builtin());
        let mut set = Resource::new(ResourceType::ItemSets);
        set.add_value("dcterms:title", PropertyValue::literal("Posters"));
        let set_id = store.insert(set).unwrap();

        let summary = import(
            &store,
            mapping(&[
                ("title", "dcterms:title"),
                ("tags", "dcterms:subject"),
                ("set", "o:item_set"),
                ("file", "o:media{file}"),
            ]),
            ImportOptions::default(),
            "title,tags,set,file\nA,x|y,Posters,a.jpg|b.jpg\nB,,Posters,\n",
        );

        assert_eq!(summary.state, ProcessState::Completed);
        assert_eq!(summary.created, 2);
        assert_eq!(titles(&store), vec!["A", "B"]);
        let first = store.ids(Some(ResourceType::Items)).unwrap()[0];
        let item = store.get(first).unwrap().unwrap();
        assert_eq!(item.item_sets, vec![set_id]);
        assert_eq!(item.media.len(), 2);
        assert_eq!(item.values_of("dcterms:subject").len(), 2);
    }

    #[test]
    fn test_create_rejects_duplicate_identifiers() {
        let store = MemoryStore::new(VocabularySet::builtin());
        let mapping = mapping(&[("id", "dcterms:identifier"), ("title", "dcterms:title")]);
        import(&store, mapping.clone(), ImportOptions::default(), "id,title\nA1,First\n");

        let summary = import(
            &store,
            mapping,
            ImportOptions::default(),
            "id,title\nA1,Again\nB1,Second\nb1,Third\n",
        );
        assert_eq!(summary.created, 1);
        assert_eq!(summary.rejected, 2);
        assert_eq!(summary.issue_counts()[&IssueCategory::DuplicateIdentifier], 2);
        assert_eq!(titles(&store), vec!["First", "Second"]);
    }

    #[test]
    fn test_allow_duplicates_proceeds_with_warning() {
        let store = MemoryStore::new(VocabularySet::builtin());
        let options = ImportOptions {
            allow_duplicates: true,
            ..ImportOptions::default()
        };
        let summary = import(
            &store,
            mapping(&[("id", "dcterms:identifier"), ("title", "dcterms:title")]),
            options,
            "id,title\nA1,First\nA1,Second\n",
        );
        assert_eq!(summary.created, 2);
        assert_eq!(summary.errors().count(), 0);
        assert_eq!(summary.issues[0].level, LogLevel::Warning);
    }

    #[test]
    fn test_update_actions_and_unidentified_policy() {
        let store = MemoryStore::new(VocabularySet::builtin());
        let mapping = mapping(&[("id", "dcterms:identifier"), ("title", "dcterms:title"), ("date", "dcterms:date")]);
        import(&store, mapping.clone(), ImportOptions::default(), "id,title,date\nA1,First,1900\n");

        let revise = ImportOptions {
            action: Action::Revise,
            ..ImportOptions::default()
        };
        let summary = import(&store, mapping.clone(), revise.clone(), "id,title,date\nA1,Renamed,\nZ9,Ghost,\n");
        assert_eq!(summary.updated, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.issue_counts()[&IssueCategory::Unidentified], 1);
        let id = store.ids(None).unwrap()[0];
        let item = store.get(id).unwrap().unwrap();
        assert_eq!(item.first_value("dcterms:title").as_deref(), Some("Renamed"));
        assert_eq!(item.first_value("dcterms:date").as_deref(), Some("1900"));

        let update_or_create = ImportOptions {
            action: Action::Update,
            unidentified: UnidentifiedPolicy::Create,
            ..ImportOptions::default()
        };
        let summary = import(&store, mapping, update_or_create, "id,title,date\nA1,Final,\nZ9,Ghost,\n");
        assert_eq!((summary.updated, summary.created), (1, 1));
        let item = store.get(id).unwrap().unwrap();
        assert!(item.values_of("dcterms:date").is_empty());
        assert_eq!(titles(&store), vec!["Final", "Ghost"]);
    }

    #[test]
    fn test_ambiguous_identifier_not_created_by_kind_fallback() {
        let store = MemoryStore::new(VocabularySet::builtin());
        for title in ["One", "Two"] {
            let mut item = Resource::new(ResourceType::Items);
            item.add_value("dcterms:identifier", PropertyValue::literal("X1"));
            item.add_value("dcterms:title", PropertyValue::literal(title));
            store.insert(item).unwrap();
        }
        let mapping = mapping(&[("id", "dcterms:identifier"), ("title", "dcterms:title")]);

        for unidentified in [UnidentifiedPolicy::Create, UnidentifiedPolicy::Skip] {
            let options = ImportOptions {
                action: Action::Update,
                unidentified,
                identifier_kinds: vec!["dcterms:identifier".into(), "dcterms:title".into()],
                ..ImportOptions::default()
            };
            let summary = import(&store, mapping.clone(), options, "id,title\nX1,Three\n");
            assert_eq!((summary.created, summary.updated, summary.rejected), (0, 0, 1));
            assert_eq!(summary.issue_counts()[&IssueCategory::AmbiguousIdentifier], 1);
            assert!(!summary.issue_counts().contains_key(&IssueCategory::Unidentified));
            assert_eq!(store.len(), 2);
        }
    }

    #[test]
    fn test_delete_and_dry_run() {
        let store = MemoryStore::new(VocabularySet::builtin());
        let mapping = mapping(&[("id", "dcterms:identifier"), ("title", "dcterms:title")]);
        import(&store, mapping.clone(), ImportOptions::default(), "id,title\nA1,First\nA2,Second\n");

        let dry = ImportOptions {
            action: Action::Skip,
            ..ImportOptions::default()
        };
        let summary = import(&store, mapping.clone(), dry, "id,title\nA3,Third\n");
        assert_eq!(summary.skipped, 1);
        assert_eq!(store.len(), 2);

        let delete = ImportOptions {
            action: Action::Delete,
            ..ImportOptions::default()
        };
        let summary = import(&store, mapping, delete, "id,title\nA1,\nA7,\n");
        assert_eq!((summary.deleted, summary.skipped), (1, 1));
        assert_eq!(titles(&store), vec!["Second"]);
    }

    #[test]
    fn test_row_action_field() {
        let store = MemoryStore::new(VocabularySet::builtin());
        let options = ImportOptions {
            action_field: Some("action".into()),
            ..ImportOptions::default()
        };
        let summary = import(
            &store,
            mapping(&[("id", "dcterms:identifier"), ("title", "dcterms:title")]),
            options,
            "action,id,title\ncreate,A1,First\nexplode,A2,Second\nupdate,,Third\n",
        );
        assert_eq!(summary.created, 1);
        assert_eq!(summary.rejected, 2);
        let counts = summary.issue_counts();
        assert_eq!(counts[&IssueCategory::UnknownAction], 1);
        assert_eq!(counts[&IssueCategory::MissingIdentifier], 1);
    }

    #[test]
    fn test_validation_failures() {
        let store = MemoryStore::new(VocabularySet::builtin());
        let fields = vec!["title".to_string()];

        let mut processor = Processor::new(&store, mapping(&[("nope", "dcterms:title")]), ImportOptions::default());
        assert!(processor.validate(&fields).is_err());
        assert_eq!(processor.state(), ProcessState::FailedValidation);

        let update = ImportOptions {
            action: Action::Update,
            ..ImportOptions::default()
        };
        let mut processor = Processor::new(&store, mapping(&[("title", "dcterms:title")]), update);
        assert!(processor.validate(&fields).is_err());

        let bad_kind = ImportOptions {
            identifier_kinds: vec!["nothing:here".into()],
            ..ImportOptions::default()
        };
        let mut processor = Processor::new(&store, mapping(&[("title", "dcterms:title")]), bad_kind);
        assert!(processor.validate(&fields).is_err());

        let mut processor = Processor::new(&store, mapping(&[("title", "dcterms:title")]), ImportOptions::default());
        processor.validate(&fields).unwrap();
        assert_eq!(processor.state(), ProcessState::Validating);
    }

    #[test]
    fn test_batches_and_cancellation() {
        let store = MemoryStore::new(VocabularySet::builtin());
        let options = ImportOptions {
            batch_size: 2,
            ..ImportOptions::default()
        };
        let content = "title\nA\nB\nC\nD\nE\n";
        let summary = import(&store, mapping(&[("title", "dcterms:title")]), options.clone(), content);
        assert_eq!(summary.batches, 3);
        assert_eq!(summary.created, 5);

        let store = MemoryStore::new(VocabularySet::builtin());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut processor = Processor::new(&store, mapping(&[("title", "dcterms:title")]), options);
        let summary = processor
            .run(&mut csv(content), &cancel, &JobLogger::new())
            .unwrap();
        assert_eq!(summary.state, ProcessState::Stopped);
        assert_eq!(processor.state(), ProcessState::Stopped);
        assert!(store.is_empty());
    }

    #[test]
    fn test_invalid_source_fails_before_any_row() {
        let store = MemoryStore::new(VocabularySet::builtin());
        let mut reader = CsvReader::open(std::path::Path::new("/definitely/missing.csv"), ReaderOptions::default());
        let mut processor = Processor::new(&store, mapping(&[("title", "dcterms:title")]), ImportOptions::default());
        let logger = JobLogger::new();
        assert!(processor.run(&mut reader, &CancellationToken::new(), &logger).is_err());
        assert_eq!(processor.state(), ProcessState::Failed);
        assert_eq!(logger.entries_at_least(LogLevel::Error).len(), 1);
    }

    #[test]
    fn test_media_rows_need_a_parent() {
        let store = MemoryStore::new(VocabularySet::builtin());
        let mut item = Resource::new(ResourceType::Items);
        item.add_value("dcterms:identifier", PropertyValue::literal("I-1"));
        let item_id = store.insert(item).unwrap();

        let options = ImportOptions {
            resource_type: ResourceType::Media,
            ..ImportOptions::default()
        };
        let summary = import(
            &store,
            mapping(&[("parent", "o:item"), ("url", "o:media{url}"), ("title", "dcterms:title")]),
            options,
            "parent,url,title\nI-1,https://example.org/a.jpg,Front\nI-404,https://example.org/b.jpg,Back\n",
        );
        assert_eq!(summary.created, 1);
        assert_eq!(summary.rejected, 1);
        let item = store.get(item_id).unwrap().unwrap();
        assert_eq!(item.media.len(), 1);
    }
}

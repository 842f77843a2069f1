//! Row actions.
//!
//! [`apply_action`] is the pure part of the processor: given a resource (a
//! fresh one for creation) and a draft, it returns the resource as the
//! action leaves it. Storage, identification and logging happen around it.

use super::draft::{Patch, ResourceDraft};
use crate::models::{PropertyValue, Resource};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// What to do with the resource an entry describes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// Create a new resource.
    #[default]
    Create,
    /// Add values not already present; never removes anything.
    Append,
    /// Replace fields the entry fills; empty and unmapped fields are kept.
    Revise,
    /// Replace every mapped field, clearing those the entry leaves empty.
    Update,
    /// Rebuild the resource from the entry alone.
    Replace,
    /// Remove the resource.
    Delete,
    /// Read and validate only.
    Skip,
}

impl Action {
    pub const ALL: [Action; 7] = [
        Action::Create,
        Action::Append,
        Action::Revise,
        Action::Update,
        Action::Replace,
        Action::Delete,
        Action::Skip,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Create => "create",
            Action::Append => "append",
            Action::Revise => "revise",
            Action::Update => "update",
            Action::Replace => "replace",
            Action::Delete => "delete",
            Action::Skip => "skip",
        }
    }

    /// Whether the action modifies an existing resource.
    pub fn is_update(&self) -> bool {
        matches!(self, Action::Append | Action::Revise | Action::Update | Action::Replace)
    }

    /// Whether the action needs to identify an existing resource.
    pub fn needs_identifier(&self) -> bool {
        self.is_update() || *self == Action::Delete
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase();
        Action::ALL
            .into_iter()
            .find(|a| a.as_str() == normalized)
            .or(match normalized.as_str() {
                "dry-run" | "dry_run" | "validate" => Some(Action::Skip),
                "remove" => Some(Action::Delete),
                _ => None,
            })
            .ok_or_else(|| format!("unknown action '{}'", s.trim()))
    }
}

/// How draft values meet existing ones.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Merge {
    Append,
    Revise,
    Update,
}

/// Apply an action to a resource.
///
/// `base` is the stored resource for update actions and a new, empty
/// resource for `create`. `delete` and `skip` return it unchanged.
pub fn apply_action(action: Action, base: Resource, draft: &ResourceDraft) -> Resource {
    match action {
        Action::Create | Action::Replace => {
            let mut fresh = Resource::new(base.resource_type);
            fresh.id = base.id;
            fresh.media = base.media;
            fresh.item = base.item;
            fresh.media_source = base.media_source;
            merge(Merge::Update, fresh, draft)
        }
        Action::Append => merge(Merge::Append, base, draft),
        Action::Revise => merge(Merge::Revise, base, draft),
        Action::Update => merge(Merge::Update, base, draft),
        Action::Delete | Action::Skip => base,
    }
}

fn merge(mode: Merge, mut resource: Resource, draft: &ResourceDraft) -> Resource {
    for (term, patch) in &draft.values {
        match (patch, mode) {
            (Patch::Set(values), Merge::Append) => {
                let existing = resource.values.entry(term.clone()).or_default();
                for value in values {
                    if !existing.iter().any(|e| same_value(e, value)) {
                        existing.push(value.clone());
                    }
                }
            }
            (Patch::Set(values), _) => {
                resource.values.insert(term.clone(), values.clone());
            }
            (Patch::Clear, Merge::Update) => {
                resource.values.shift_remove(term);
            }
            _ => {}
        }
    }

    merge_option(mode, &mut resource.owner, &draft.owner);
    merge_option(mode, &mut resource.resource_template, &draft.resource_template);
    merge_option(mode, &mut resource.resource_class, &draft.resource_class);
    merge_option(mode, &mut resource.item, &draft.item);
    merge_option(mode, &mut resource.media_source, &draft.media_source);
    merge_flag(mode, &mut resource.is_public, &draft.is_public, true);
    merge_flag(mode, &mut resource.is_open, &draft.is_open, false);

    match (&draft.item_sets, mode) {
        (Patch::Set(ids), Merge::Append) => {
            for id in ids {
                if !resource.item_sets.contains(id) {
                    resource.item_sets.push(*id);
                }
            }
        }
        (Patch::Set(ids), _) => resource.item_sets = ids.clone(),
        (Patch::Clear, Merge::Update) => resource.item_sets.clear(),
        _ => {}
    }

    resource
}

fn merge_option<T: Clone>(mode: Merge, slot: &mut Option<T>, patch: &Patch<T>) {
    match patch {
        Patch::Set(value) if mode != Merge::Append || slot.is_none() => *slot = Some(value.clone()),
        Patch::Clear if mode == Merge::Update => *slot = None,
        _ => {}
    }
}

fn merge_flag(mode: Merge, slot: &mut bool, patch: &Patch<bool>, default: bool) {
    match patch {
        Patch::Set(value) if mode != Merge::Append => *slot = *value,
        Patch::Clear if mode == Merge::Update => *slot = default,
        _ => {}
    }
}

/// Value equality for append, ignoring visibility.
fn same_value(a: &PropertyValue, b: &PropertyValue) -> bool {
    a.data_type == b.data_type
        && a.value == b.value
        && a.uri == b.uri
        && a.resource_id == b.resource_id
        && a.lang == b.lang
}

// ── Change-set planning ──
//
// Compares desired and observed configuration attribute by attribute and
// classifies each difference. Records are compared through their serde
// JSON form so one planner serves every resource kind: a key missing from
// the desired form is unmanaged and never diffed.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::Display;

use crate::error::CoreError;
use crate::resource::ManagedResource;
use crate::store::ObservedState;

// ── Vocabulary ─────────────────────────────────────────────────────

/// Remote sub-resource a change is applied through.
///
/// Declaration order is application order: each group gets its own
/// update call and its own wait, and a version upgrade must settle
/// before anything is scaled or re-attached.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SubResource {
    VersionUpgrade,
    Attributes,
    AuditLog,
    Oidc,
    AccessControl,
    AccessEntries,
    Labels,
    Taints,
    Scaling,
    Autoscaling,
    NetworkAttachment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    InPlacePatchable,
    ForcesReplace,
    /// Server-owned; never diffed.
    ComputedIgnore,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    Scalar,
    /// Ordered list compared as a set of elements. Reordering is not a
    /// change; dropping an element replaces the resource when
    /// `removal_forces_replace` is set.
    Sequence { removal_forces_replace: bool },
    /// Hash-identified `RecordSet`.
    Set,
}

/// How one attribute of a resource kind is diffed and applied.
#[derive(Debug, Clone, Copy)]
pub struct AttributeRule {
    /// Dotted path into the serialized record, e.g. `acl.entries`.
    pub path: &'static str,
    pub policy: Policy,
    pub shape: Shape,
    pub group: SubResource,
}

impl AttributeRule {
    pub const fn scalar(path: &'static str, policy: Policy, group: SubResource) -> Self {
        Self {
            path,
            policy,
            shape: Shape::Scalar,
            group,
        }
    }

    pub const fn sequence(
        path: &'static str,
        removal_forces_replace: bool,
        group: SubResource,
    ) -> Self {
        Self {
            path,
            policy: Policy::InPlacePatchable,
            shape: Shape::Sequence {
                removal_forces_replace,
            },
            group,
        }
    }

    pub const fn set(path: &'static str, group: SubResource) -> Self {
        Self {
            path,
            policy: Policy::InPlacePatchable,
            shape: Shape::Set,
            group,
        }
    }

    pub const fn replace(path: &'static str) -> Self {
        Self::scalar(path, Policy::ForcesReplace, SubResource::Attributes)
    }

    pub const fn computed(path: &'static str) -> Self {
        Self::scalar(path, Policy::ComputedIgnore, SubResource::Attributes)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum MutationKind {
    Patchable,
    ForceReplace,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Change {
    pub path: String,
    pub old: Option<Value>,
    pub new: Option<Value>,
    pub kind: MutationKind,
    pub group: SubResource,
}

// ── Change set ─────────────────────────────────────────────────────

/// Ordered differences for one apply. Sorted by sub-resource group, then
/// by rule order within a group.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    changes: Vec<Change>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Change> {
        self.changes.iter()
    }

    pub fn requires_replace(&self) -> bool {
        self.changes
            .iter()
            .any(|c| c.kind == MutationKind::ForceReplace)
    }

    /// Paths of the changes that force replacement.
    pub fn replace_causes(&self) -> Vec<&str> {
        self.changes
            .iter()
            .filter(|c| c.kind == MutationKind::ForceReplace)
            .map(|c| c.path.as_str())
            .collect()
    }

    /// Distinct groups touched, in application order.
    pub fn groups(&self) -> Vec<SubResource> {
        let mut groups: Vec<SubResource> = self.changes.iter().map(|c| c.group).collect();
        groups.dedup();
        groups
    }

    pub fn in_group(&self, group: SubResource) -> impl Iterator<Item = &Change> {
        self.changes.iter().filter(move |c| c.group == group)
    }
}

// ── Sequence diff ──────────────────────────────────────────────────

/// Element-level difference between two ordered lists, ignoring position.
/// Duplicates are counted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SequenceDiff {
    pub added: Vec<Value>,
    pub removed: Vec<Value>,
    pub retained: Vec<Value>,
}

pub fn diff_sequence(old: &[Value], new: &[Value]) -> SequenceDiff {
    let mut remaining: Vec<&Value> = old.iter().collect();
    let mut diff = SequenceDiff::default();

    for item in new {
        if let Some(pos) = remaining.iter().position(|o| *o == item) {
            remaining.swap_remove(pos);
            diff.retained.push(item.clone());
        } else {
            diff.added.push(item.clone());
        }
    }
    diff.removed = remaining.into_iter().cloned().collect();
    diff
}

// ── Planner ────────────────────────────────────────────────────────

fn lookup<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(root, |node, key| node.get(key))
}

fn as_items(value: Option<&Value>) -> &[Value] {
    match value {
        Some(Value::Array(items)) => items,
        _ => &[],
    }
}

/// Same multiset of elements, regardless of order.
fn same_elements(old: &[Value], new: &[Value]) -> bool {
    old.len() == new.len() && {
        let d = diff_sequence(old, new);
        d.added.is_empty() && d.removed.is_empty()
    }
}

fn classify(policy: Policy) -> MutationKind {
    match policy {
        Policy::ForcesReplace => MutationKind::ForceReplace,
        Policy::InPlacePatchable | Policy::ComputedIgnore => MutationKind::Patchable,
    }
}

/// Plan the changes turning `observed` into `desired`.
///
/// `auto_selected` names sequence attributes whose observed contents the
/// server picked because the desired value was an explicit empty list;
/// those are left alone instead of being read as a removal every time.
pub fn plan(
    desired: &Value,
    observed: &Value,
    rules: &[AttributeRule],
    auto_selected: &BTreeSet<String>,
) -> ChangeSet {
    let mut changes = Vec::new();

    for rule in rules {
        if rule.policy == Policy::ComputedIgnore {
            continue;
        }
        let Some(new) = lookup(desired, rule.path) else {
            continue;
        };
        let old = lookup(observed, rule.path);

        let kind = match rule.shape {
            Shape::Scalar => {
                if old.unwrap_or(&Value::Null) == new {
                    continue;
                }
                classify(rule.policy)
            }
            Shape::Set => {
                if same_elements(as_items(old), as_items(Some(new))) {
                    continue;
                }
                classify(rule.policy)
            }
            Shape::Sequence {
                removal_forces_replace,
            } => {
                let new_items = as_items(Some(new));
                if new_items.is_empty() && auto_selected.contains(rule.path) {
                    continue;
                }
                let diff = diff_sequence(as_items(old), new_items);
                if diff.added.is_empty() && diff.removed.is_empty() {
                    continue;
                }
                if removal_forces_replace && !diff.removed.is_empty() {
                    MutationKind::ForceReplace
                } else {
                    classify(rule.policy)
                }
            }
        };

        changes.push(Change {
            path: rule.path.to_owned(),
            old: old.cloned(),
            new: Some(new.clone()),
            kind,
            group: rule.group,
        });
    }

    changes.sort_by_key(|c| c.group);
    ChangeSet { changes }
}

/// Sequence attributes the desired record leaves to the server by
/// declaring them empty.
pub fn auto_selected(desired: &Value, rules: &[AttributeRule]) -> BTreeSet<String> {
    rules
        .iter()
        .filter(|r| matches!(r.shape, Shape::Sequence { .. }))
        .filter(|r| matches!(lookup(desired, r.path), Some(Value::Array(items)) if items.is_empty()))
        .map(|r| r.path.to_owned())
        .collect()
}

/// Plan a typed record against its last observed state.
pub fn plan_for<R: ManagedResource>(
    desired: &R,
    observed: &ObservedState<R>,
) -> Result<ChangeSet, CoreError> {
    let desired = serde_json::to_value(desired)?;
    let current = serde_json::to_value(&observed.config)?;
    Ok(plan(&desired, &current, R::RULES, &observed.auto_selected))
}

//! Resource descriptors: the runtime contract describing how a CR class is
//! reconciled against a remote REST API.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::alt;
use crate::{Error, Result};

/// Logical reconcile operations a descriptor may bind verbs to.
/// Matching against the persisted document is case-insensitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Get,
    Create,
    Update,
    Delete,
    FindBy,
    List,
    Patch,
}

impl Action {
    pub const ALL: [Action; 7] = [
        Action::Get,
        Action::Create,
        Action::Update,
        Action::Delete,
        Action::FindBy,
        Action::List,
        Action::Patch,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Action::Get => "Get",
            Action::Create => "Create",
            Action::Update => "Update",
            Action::Delete => "Delete",
            Action::FindBy => "FindBy",
            Action::List => "List",
            Action::Patch => "Patch",
        }
    }

    pub fn parse(s: &str) -> Option<Action> {
        Action::ALL
            .into_iter()
            .find(|a| a.as_str().eq_ignore_ascii_case(s))
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// HTTP methods a verb may declare. Case-sensitive uppercase in the document.
pub const METHODS: [&str; 5] = ["GET", "POST", "PUT", "PATCH", "DELETE"];

/// Group/version/kind of a referenced CR class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Gvk {
    #[serde(default)]
    pub group: String,
    pub version: String,
    pub kind: String,
}

impl fmt::Display for Gvk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.group.is_empty() {
            write!(f, "{}/{}", self.version, self.kind)
        } else {
            write!(f, "{}/{}/{}", self.group, self.version, self.kind)
        }
    }
}

/// Cross-CR owner reference: `spec.<field>` of the owning CR must match a
/// scalar leaf of exactly one sibling CR of the referenced kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceInfo {
    pub group_version_kind: Gvk,
    pub field: String,
}

/// One verb: a logical action bound to an HTTP method and path template.
///
/// `alt_field_mapping` maps a source field path in the CR (the mini-DSL
/// `segment(.segment|[])*`) to the flat field name the API consumes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerbDescriptor {
    pub action: String,
    pub method: String,
    pub path: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub alt_field_mapping: BTreeMap<String, String>,
}

impl VerbDescriptor {
    pub fn matches(&self, action: Action) -> bool {
        self.action.eq_ignore_ascii_case(action.as_str())
    }
}

/// The full descriptor for a CR class. Loaded once per reconcile, never
/// mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ResourceDescriptor {
    /// Field names that uniquely identify the remote object; mirrored into
    /// CR status by the status writer.
    #[serde(default)]
    pub identifiers: Vec<String>,
    pub verbs_description: Vec<VerbDescriptor>,
    /// Spec fields defining equality with the response; empty means full
    /// structural comparison.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub compare_list: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub references: Vec<ReferenceInfo>,
}

impl ResourceDescriptor {
    /// First verb matching the action, if the descriptor declares one.
    pub fn verb(&self, action: Action) -> Option<&VerbDescriptor> {
        self.verbs_description.iter().find(|v| v.matches(action))
    }

    /// Reject malformed descriptors at load time: unknown actions or
    /// methods, duplicate actions, and alt-field paths the grammar does
    /// not cover.
    pub fn validate(&self) -> Result<()> {
        let mut seen: BTreeSet<String> = BTreeSet::new();
        for verb in &self.verbs_description {
            let action = Action::parse(&verb.action).ok_or_else(|| {
                Error::Descriptor(format!("unrecognized action {:?}", verb.action))
            })?;
            if !seen.insert(action.as_str().to_ascii_lowercase()) {
                return Err(Error::Descriptor(format!(
                    "duplicate action {:?}",
                    action.as_str()
                )));
            }
            if !METHODS.contains(&verb.method.as_str()) {
                return Err(Error::Descriptor(format!(
                    "unknown method {:?} for action {:?}",
                    verb.method, verb.action
                )));
            }
            if verb.path.is_empty() {
                return Err(Error::Descriptor(format!(
                    "empty path for action {:?}",
                    verb.action
                )));
            }
            for (source, target) in &verb.alt_field_mapping {
                alt::parse(source)?;
                if target.is_empty() {
                    return Err(Error::Descriptor(format!(
                        "empty target for alt field {:?}",
                        source
                    )));
                }
            }
        }
        for reference in &self.references {
            if reference.field.is_empty() || reference.group_version_kind.kind.is_empty() {
                return Err(Error::Descriptor(
                    "reference requires a kind and a field".into(),
                ));
            }
        }
        Ok(())
    }
}

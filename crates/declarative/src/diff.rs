//! Diff computation between declared resources and stored state
//!
//! Deltas are keyed by instance name only: an instance whose parameters
//! changed keeps its name and is therefore neither inserted nor removed.

use crate::catalog::{Catalog, KindLookup, Section};
use crate::error::Error;
use crate::types::{DeclaredSet, Delta, KindMap, StateSet};
use std::fmt;

/// Names declared but not stored, carrying the declared parameters
pub fn plan_insert<T>(declared: &DeclaredSet, state: &KindMap<T>) -> Delta {
    let mut delta = Delta::new();
    for (kind, names) in declared {
        let stored = state.get(kind);
        for (name, params) in names {
            if !stored.is_some_and(|s| s.contains_key(name)) {
                delta.insert(kind, name, params.clone());
            }
        }
    }
    delta
}

/// Names stored but no longer declared, carrying the stored parameters
pub fn plan_remove(declared: &DeclaredSet, state: &StateSet) -> Delta {
    let mut delta = Delta::new();
    for (kind, names) in state {
        let wanted = declared.get(kind);
        for (name, entry) in names {
            if !wanted.is_some_and(|d| d.contains_key(name)) {
                delta.insert(kind, name, entry.params.clone());
            }
        }
    }
    delta
}

/// Total number of name entries in a delta
pub fn count(delta: &Delta) -> usize {
    delta.count()
}

/// Something worth telling the operator about a plan
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// Kind not registered in the table its section uses; it is skipped
    UnknownKind {
        section: Section,
        kind: String,
        /// Set when the kind exists in the other table (e.g. a probe under `mods`)
        registered_as: Option<Section>,
    },
    /// An entry's template references a parameter the entry does not supply
    UnresolvedParameter {
        kind: String,
        name: String,
        placeholder: String,
    },
}

impl Diagnostic {
    pub fn level(&self) -> log::Level {
        match self {
            Self::UnknownKind { .. } => log::Level::Warn,
            Self::UnresolvedParameter { .. } => log::Level::Error,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownKind {
                section,
                kind,
                registered_as,
            } => {
                write!(f, "unknown kind '{kind}' in {section}, skipped")?;
                if let Some(other) = registered_as {
                    write!(f, " (it belongs under {other})")?;
                }
                Ok(())
            }
            Self::UnresolvedParameter {
                kind,
                name,
                placeholder,
            } => write!(
                f,
                "{kind}.{name} does not supply '{placeholder}' required by its template"
            ),
        }
    }
}

/// Insert and remove deltas for one reconciliation pass
#[derive(Debug, Clone, Default)]
pub struct Plan {
    pub insert: Delta,
    pub remove: Delta,
    pub diagnostics: Vec<Diagnostic>,
}

impl Plan {
    /// Compute the plan for the mutable resources.
    ///
    /// Kinds the catalog does not know are reported and left out of both
    /// deltas; stored entries of such kinds are therefore never removed.
    pub fn compute(catalog: &Catalog, declared: &DeclaredSet, state: &StateSet) -> Self {
        let plan = Self::build(catalog, declared, state);
        for diagnostic in &plan.diagnostics {
            log::log!(diagnostic.level(), component = "plan", op = "compute"; "{diagnostic}");
        }
        plan
    }

    /// Same as [`Plan::compute`] without logging the diagnostics
    pub fn build(catalog: &Catalog, declared: &DeclaredSet, state: &StateSet) -> Self {
        let mut diagnostics = Vec::new();
        unknown_kind_diagnostics(catalog, declared, &mut diagnostics);
        unknown_kind_diagnostics(catalog, state, &mut diagnostics);

        let declared = known_only(catalog, declared);
        let state = known_only(catalog, state);
        let insert = plan_insert(&declared, &state);
        let remove = plan_remove(&declared, &state);

        validate(catalog, &insert, true, &mut diagnostics);
        validate(catalog, &remove, false, &mut diagnostics);

        Self {
            insert,
            remove,
            diagnostics,
        }
    }

    pub fn count_insert(&self) -> usize {
        self.insert.count()
    }

    pub fn count_remove(&self) -> usize {
        self.remove.count()
    }

    pub fn has_changes(&self) -> bool {
        !self.insert.is_empty() || !self.remove.is_empty()
    }
}

fn unknown_kind_diagnostics<T>(
    catalog: &Catalog,
    set: &KindMap<T>,
    diagnostics: &mut Vec<Diagnostic>,
) {
    for kind in catalog.unknown_kinds(Section::Resources, set) {
        let diagnostic = Diagnostic::UnknownKind {
            section: Section::Resources,
            kind: kind.to_string(),
            registered_as: catalog
                .is_known(Section::Probes, kind)
                .then_some(Section::Probes),
        };
        if !diagnostics.contains(&diagnostic) {
            diagnostics.push(diagnostic);
        }
    }
}

fn known_only<T: Clone>(catalog: &Catalog, set: &KindMap<T>) -> KindMap<T> {
    set.iter()
        .filter(|(kind, _)| catalog.resource(kind).is_known())
        .map(|(kind, names)| (kind.clone(), names.clone()))
        .collect()
}

fn validate(catalog: &Catalog, delta: &Delta, inserting: bool, diagnostics: &mut Vec<Diagnostic>) {
    for (kind, name, params) in delta.iter() {
        let KindLookup::Known(spec) = catalog.resource(kind) else {
            continue;
        };
        let template = if inserting { spec.insert } else { spec.remove };
        if let Err(Error::MissingParameter { placeholder }) = template.render(params, None) {
            diagnostics.push(Diagnostic::UnresolvedParameter {
                kind: kind.to_string(),
                name: name.to_string(),
                placeholder,
            });
        }
    }
}

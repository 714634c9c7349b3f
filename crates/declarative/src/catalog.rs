//! Resource catalog - the registry of kinds viki knows how to manage
//!
//! Two tables: mutable resources (insert/remove templates) and read-only
//! probes (a single fetch template). Every lookup goes through
//! [`KindLookup`], so "is this kind known?" and "give me its templates" are
//! the same question.

use crate::error::{Error, Result};
use crate::template::CommandTemplate;
use crate::types::KindMap;
use std::collections::{BTreeMap, BTreeSet};

/// Which catalog table a lookup was made against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    /// Read-only probe kinds (`data`)
    Probes,
    /// Mutable resource kinds (`mods`)
    Resources,
}

impl Section {
    /// Configuration section name for this table
    pub fn name(&self) -> &'static str {
        match self {
            Self::Probes => "data",
            Self::Resources => "mods",
        }
    }
}

impl std::fmt::Display for Section {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Templates for a mutable resource kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceSpec {
    pub insert: CommandTemplate,
    pub remove: CommandTemplate,
    /// Remote binary the templates depend on
    pub tool: &'static str,
}

/// Template for a read-only probe kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeSpec {
    pub fetch: CommandTemplate,
    /// Remote binary the template depends on
    pub tool: &'static str,
}

/// Result of looking a kind up in one catalog table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KindLookup<'a, T> {
    Known(&'a T),
    Unknown,
}

impl<'a, T> KindLookup<'a, T> {
    pub fn is_known(&self) -> bool {
        matches!(self, Self::Known(_))
    }

    /// Escalate an unknown kind to a fatal error
    pub fn require(self, section: Section, kind: &str) -> Result<&'a T> {
        match self {
            Self::Known(spec) => Ok(spec),
            Self::Unknown => Err(Error::UnknownKind {
                section,
                kind: kind.to_string(),
            }),
        }
    }
}

/// Static registry of resource and probe kinds
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    resources: BTreeMap<&'static str, ResourceSpec>,
    probes: BTreeMap<&'static str, ProbeSpec>,
}

impl Catalog {
    /// An empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// The kinds shipped with viki
    pub fn builtin() -> Self {
        Self::new()
            .with_resource(
                "cloudflared",
                ResourceSpec {
                    insert: CommandTemplate::elevated(
                        "docker run -d --rm --name ${name} cloudflare/cloudflared:latest tunnel --no-autoupdate run --token ${token}",
                    ),
                    remove: CommandTemplate::elevated("docker container stop ${name}"),
                    tool: "docker",
                },
            )
            .with_resource(
                "compose",
                ResourceSpec {
                    insert: CommandTemplate::elevated("docker-compose -f ${path} up -d"),
                    remove: CommandTemplate::elevated("docker-compose -f ${path} down"),
                    tool: "docker-compose",
                },
            )
            .with_resource(
                "mkdir",
                ResourceSpec {
                    insert: CommandTemplate::plain("mkdir -p ${path}"),
                    remove: CommandTemplate::plain("rmdir ${path}"),
                    tool: "mkdir",
                },
            )
            .with_resource(
                "wget",
                ResourceSpec {
                    insert: CommandTemplate::plain("wget -O ${path}/${output} ${url}"),
                    remove: CommandTemplate::plain("rm ${path}/${output}"),
                    tool: "wget",
                },
            )
            .with_probe(
                "df",
                ProbeSpec {
                    fetch: CommandTemplate::plain("df -h"),
                    tool: "df",
                },
            )
            .with_probe(
                "docker",
                ProbeSpec {
                    fetch: CommandTemplate::elevated("docker ps"),
                    tool: "docker",
                },
            )
            .with_probe(
                "ls",
                ProbeSpec {
                    fetch: CommandTemplate::plain("ls ${path}"),
                    tool: "ls",
                },
            )
            .with_probe(
                "lsl",
                ProbeSpec {
                    fetch: CommandTemplate::plain("ls -lAG ${path}"),
                    tool: "ls",
                },
            )
    }

    /// Register (or replace) a mutable resource kind
    pub fn with_resource(mut self, kind: &'static str, spec: ResourceSpec) -> Self {
        self.resources.insert(kind, spec);
        self
    }

    /// Register (or replace) a probe kind
    pub fn with_probe(mut self, kind: &'static str, spec: ProbeSpec) -> Self {
        self.probes.insert(kind, spec);
        self
    }

    pub fn resource(&self, kind: &str) -> KindLookup<'_, ResourceSpec> {
        self.resources
            .get(kind)
            .map_or(KindLookup::Unknown, KindLookup::Known)
    }

    pub fn probe(&self, kind: &str) -> KindLookup<'_, ProbeSpec> {
        self.probes
            .get(kind)
            .map_or(KindLookup::Unknown, KindLookup::Known)
    }

    /// Whether a kind is registered in the given table
    pub fn is_known(&self, section: Section, kind: &str) -> bool {
        match section {
            Section::Resources => self.resource(kind).is_known(),
            Section::Probes => self.probe(kind).is_known(),
        }
    }

    /// Kinds of `set` that the given table does not know, in map order
    pub fn unknown_kinds<'s, T>(&self, section: Section, set: &'s KindMap<T>) -> Vec<&'s str> {
        set.keys()
            .map(String::as_str)
            .filter(|kind| !self.is_known(section, kind))
            .collect()
    }

    /// Distinct remote tools needed by the known kinds of `set`
    pub fn tools_for<T>(&self, section: Section, set: &KindMap<T>) -> BTreeSet<&'static str> {
        set.keys()
            .filter_map(|kind| match section {
                Section::Resources => self.resources.get(kind.as_str()).map(|s| s.tool),
                Section::Probes => self.probes.get(kind.as_str()).map(|s| s.tool),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ParamMap;

    #[test]
    fn test_builtin_kinds() {
        let catalog = Catalog::builtin();
        for kind in ["cloudflared", "compose", "mkdir", "wget"] {
            assert!(catalog.is_known(Section::Resources, kind), "{kind}");
            assert!(!catalog.is_known(Section::Probes, kind), "{kind}");
        }
        for kind in ["df", "docker", "ls", "lsl"] {
            assert!(catalog.is_known(Section::Probes, kind), "{kind}");
        }
    }

    #[test]
    fn test_lookup_known_and_unknown() {
        let catalog = Catalog::builtin();
        assert!(catalog.resource("mkdir").is_known());
        assert_eq!(catalog.resource("apt"), KindLookup::Unknown);
        // Probes and resources are separate tables
        assert_eq!(catalog.resource("ls"), KindLookup::Unknown);
        assert!(catalog.probe("ls").is_known());
    }

    #[test]
    fn test_require_unknown_is_error() {
        let catalog = Catalog::builtin();
        let err = catalog
            .resource("apt")
            .require(Section::Resources, "apt")
            .unwrap_err();
        assert!(matches!(err, Error::UnknownKind { section: Section::Resources, ref kind } if kind == "apt"));

        let spec = catalog
            .resource("mkdir")
            .require(Section::Resources, "mkdir")
            .unwrap();
        assert_eq!(spec.tool, "mkdir");
    }

    #[test]
    fn test_elevation_is_a_catalog_flag() {
        let catalog = Catalog::builtin();
        let KindLookup::Known(compose) = catalog.resource("compose") else {
            panic!("compose should be registered");
        };
        assert!(compose.insert.elevated);
        assert!(!compose.insert.text.starts_with("sudo"));

        let KindLookup::Known(mkdir) = catalog.resource("mkdir") else {
            panic!("mkdir should be registered");
        };
        assert!(!mkdir.remove.elevated);
    }

    #[test]
    fn test_unknown_kinds_and_tools() {
        let catalog = Catalog::builtin();
        let mut set: KindMap<ParamMap> = KindMap::new();
        set.entry("mkdir".into()).or_default();
        set.entry("compose".into()).or_default();
        set.entry("cloudflared".into()).or_default();
        set.entry("ls".into()).or_default();

        assert_eq!(catalog.unknown_kinds(Section::Resources, &set), vec!["ls"]);
        let tools: Vec<_> = catalog
            .tools_for(Section::Resources, &set)
            .into_iter()
            .collect();
        assert_eq!(tools, vec!["docker", "docker-compose", "mkdir"]);
    }
}

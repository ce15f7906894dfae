//! `osgi.contract` capabilities found on the class path.
//!
//! A contract names a set of packages (its `uses:` directive) that evolve
//! together. Imports of a contracted package drop their version and the
//! bundle requires the contract instead.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use thiserror::Error;
use tracing::debug;

use crate::graph::ClasspathEntry;
use crate::header::{strip_duplicate_marker, Attrs, Parameters, Version};
use crate::instruction::Instructions;

pub const CONTRACT_NAMESPACE: &str = "osgi.contract";

/// Two or more selected contracts claim the same package.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConsistencyError {
    #[error(
        "Contracts [{}] declare the same packages in their uses: directive: [{}]. Contracts are found in declaring bundles (see their 'from' field), it is possible to control the finding with the -contract instruction",
        .contracts.join(", "),
        .packages.join(", ")
    )]
    Overlap {
        contracts: Vec<String>,
        packages: Vec<String>,
    },
}

pub type ConsistencyResult<T> = Result<T, ConsistencyError>;

/// One selected contract capability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contract {
    pub name: String,
    pub version: Version,
    /// Dotted names from the `uses:` directive.
    pub uses: Vec<String>,
    /// Class-path entry declaring the capability.
    pub from: String,
    /// Overlay from the selecting `-contract` instruction.
    pub decorators: Attrs,
}

impl fmt::Display for Contract {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Contract [name={};version={};from={}]",
            self.name, self.version, self.from
        )
    }
}

/// Contracts selected for one run and the packages they cover.
#[derive(Debug, Clone, Default)]
pub struct Contracts {
    contracts: Vec<Contract>,
    by_package: BTreeMap<String, Vec<usize>>,
    used: BTreeSet<usize>,
    warnings: Vec<String>,
}

impl Contracts {
    /// Selects contract capabilities of the class path with the `-contract`
    /// instructions.
    ///
    /// A capability is selected by the first instruction matching its name,
    /// if that instruction is not negated and every attribute it carries has
    /// the same value on the capability.
    pub fn collect(instructions: &Instructions, classpath: &[ClasspathEntry]) -> Self {
        let mut contracts = Contracts::default();
        for entry in classpath {
            for (namespace, capability) in entry.capabilities.iter() {
                if strip_duplicate_marker(namespace) != CONTRACT_NAMESPACE {
                    continue;
                }
                let Some(name) = capability.get(CONTRACT_NAMESPACE) else {
                    continue;
                };
                let Some((instruction, overlay)) = instructions.matcher(name) else {
                    continue;
                };
                if instruction.is_negated() || !attributes_match(overlay, capability) {
                    continue;
                }
                contracts.add(name, capability, overlay, &entry.name);
            }
        }
        contracts
    }

    fn add(&mut self, name: &str, capability: &Attrs, overlay: &Attrs, from: &str) {
        let mut contract = Contract {
            name: name.to_string(),
            version: Version::LOWEST,
            uses: capability.get_list("uses:"),
            from: from.to_string(),
            decorators: overlay.clone(),
        };

        let versions = capability.get_versions("version");
        match versions.into_iter().max() {
            Some(version) => contract.version = version,
            None => self
                .warnings
                .push(format!("{} does not declare a version, assumed 0.0.0.", contract)),
        }
        if contract.uses.is_empty() {
            self.warnings
                .push(format!("Contract {} has no uses: directive in {}.", name, from));
        }

        debug!(contract = %contract, "selected contract");
        let index = self.contracts.len();
        for package in &contract.uses {
            self.by_package.entry(package.clone()).or_default().push(index);
        }
        self.contracts.push(contract);
    }

    pub fn is_empty(&self) -> bool {
        self.contracts.is_empty()
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Contracts covering `package`: none or exactly one.
    pub fn contracts_for(&self, package: &str) -> ConsistencyResult<Vec<&Contract>> {
        let Some(indices) = self.by_package.get(package) else {
            return Ok(Vec::new());
        };
        if indices.len() > 1 {
            return Err(ConsistencyError::Overlap {
                contracts: indices.iter().map(|&i| self.contracts[i].to_string()).collect(),
                packages: vec![package.to_string()],
            });
        }
        Ok(indices.iter().map(|&i| &self.contracts[i]).collect())
    }

    /// True if a single contract covers `package`; that contract is then
    /// required.
    pub fn is_contracted(&mut self, package: &str) -> ConsistencyResult<bool> {
        let found = self.contracts_for(package)?.len() == 1;
        if found {
            if let Some(indices) = self.by_package.get(package) {
                self.used.extend(indices.iter().copied());
            }
        }
        Ok(found)
    }

    /// `Require-Capability` clauses for the contracts in use.
    pub fn requirements(&self) -> Parameters {
        let mut requirements = Parameters::new();
        for &index in &self.used {
            let contract = &self.contracts[index];
            let mut attrs = contract.decorators.clone();
            attrs.put(
                "filter:",
                format!(
                    "(&({}={})(version={}))",
                    CONTRACT_NAMESPACE, contract.name, contract.version
                ),
            );
            requirements.insert(CONTRACT_NAMESPACE, attrs);
        }
        requirements
    }
}

/// True if every plain attribute of `overlay` has the same value on `capability`.
fn attributes_match(overlay: &Attrs, capability: &Attrs) -> bool {
    overlay
        .iter()
        .filter(|(key, _)| !Attrs::is_directive(key))
        .all(|(key, value)| capability.get(key) == Some(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exporter(name: &str, capabilities: &str) -> ClasspathEntry {
        let mut entry = ClasspathEntry::new(name);
        entry.capabilities = Parameters::parse(capabilities).unwrap();
        entry
    }

    fn instructions(text: &str) -> Instructions {
        Instructions::parse(text).unwrap()
    }

    #[test]
    fn test_simple_contract() {
        let classpath = [exporter(
            "dep",
            "osgi.contract;osgi.contract=JavaServlet;version:Version=3.1;uses:=\"javax.servlet,javax.servlet.http\"",
        )];
        let mut contracts = Contracts::collect(&instructions("*"), &classpath);
        assert!(contracts.warnings().is_empty());
        assert!(contracts.is_contracted("javax.servlet").unwrap());
        assert!(!contracts.is_contracted("javax.other").unwrap());

        let requirements = contracts.requirements();
        assert_eq!(requirements.len(), 1);
        assert_eq!(
            requirements.get("osgi.contract").unwrap().get("filter:"),
            Some("(&(osgi.contract=JavaServlet)(version=3.1.0))")
        );
    }

    #[test]
    fn test_highest_version_and_directives_copied() {
        let classpath = [exporter(
            "dep",
            "osgi.contract;osgi.contract=abc;version:List<Version>=\"2.5,3.1,3.0\";uses:=p",
        )];
        let mut contracts = Contracts::collect(&instructions("abc;resolution:=optional"), &classpath);
        assert!(contracts.is_contracted("p").unwrap());
        let requirements = contracts.requirements();
        let attrs = requirements.get("osgi.contract").unwrap();
        assert_eq!(attrs.get("filter:"), Some("(&(osgi.contract=abc)(version=3.1.0))"));
        assert_eq!(attrs.get("resolution:"), Some("optional"));
    }

    #[test]
    fn test_select_by_attribute() {
        let classpath = [
            exporter("a", "osgi.contract;osgi.contract=atest;alpha=1;version:Version=2.5;uses:=p"),
            exporter("b", "osgi.contract;osgi.contract=atest;alpha=2;version:Version=2.6;uses:=p"),
        ];
        let mut contracts = Contracts::collect(&instructions("atest;alpha=1"), &classpath);
        assert!(contracts.is_contracted("p").unwrap());
        let requirements = contracts.requirements();
        let attrs = requirements.get("osgi.contract").unwrap();
        assert_eq!(attrs.get("alpha"), Some("1"));
        assert_eq!(attrs.get("filter:"), Some("(&(osgi.contract=atest)(version=2.5.0))"));
    }

    #[test]
    fn test_overlap_is_consistency_error() {
        let capability = "osgi.contract;osgi.contract=test;version:Version=2.5;uses:=p";
        let classpath = [exporter("one", capability), exporter("two", capability)];
        let mut contracts = Contracts::collect(&instructions("*"), &classpath);
        let error = contracts.is_contracted("p").unwrap_err();
        assert!(error
            .to_string()
            .starts_with("Contracts [Contract [name=test;version=2.5.0;from=one], Contract [name=test;version=2.5.0;from=two]]"));
        assert!(contracts.requirements().is_empty());
    }

    #[test]
    fn test_missing_version_and_uses_warn() {
        let classpath = [exporter("dep", "osgi.contract;osgi.contract=abc")];
        let contracts = Contracts::collect(&instructions("*"), &classpath);
        assert_eq!(
            contracts.warnings(),
            &[
                "Contract [name=abc;version=0.0.0;from=dep] does not declare a version, assumed 0.0.0.".to_string(),
                "Contract abc has no uses: directive in dep.".to_string(),
            ]
        );
        assert!(!contracts.is_empty());
    }

    #[test]
    fn test_negated_instruction_skips() {
        let classpath = [exporter("dep", "osgi.contract;osgi.contract=abc;uses:=p")];
        let contracts = Contracts::collect(&instructions("!abc, *"), &classpath);
        assert!(contracts.is_empty());
    }
}

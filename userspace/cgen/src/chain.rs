use std::{collections::BTreeSet, fmt};

use cgen_common::Verdict;
use ipnet::IpNet;
use serde::{Deserialize, Serialize};

use crate::{
    marsh::{self, Marsh, Marshal, Tag},
    AttachPoint, Error, Kernel, Result, Rule,
};

/// Kernel hook a chain is enforced on.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, strum::Display,
)]
#[strum(serialize_all = "snake_case")]
pub enum Hook {
    Xdp,
    TcIngress,
    TcEgress,
}

/// Named set of networks rules can refer to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Set {
    pub name: String,
    pub elems: Vec<IpNet>,
}

impl Set {
    pub fn new(name: impl Into<String>, elems: impl IntoIterator<Item = IpNet>) -> Self {
        Self {
            name: name.into(),
            elems: elems.into_iter().collect(),
        }
    }
}

/// Ordered rules, sets and default policy, enforced on a hook.
///
/// The chain is the input of the bytecode generator, the codegen core only
/// cares about its hook, its scope and its number of rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chain {
    name: String,
    hook: Hook,
    interfaces: Vec<String>,
    policy: Verdict,
    rules: Vec<Rule>,
    sets: Vec<Set>,
}

impl Chain {
    /// Creates an empty chain. Without explicit interfaces, the chain is
    /// enforced on every interface the kernel reports.
    pub fn new(name: impl Into<String>, hook: Hook, policy: Verdict) -> Self {
        Self {
            name: name.into(),
            hook,
            interfaces: Vec::new(),
            policy,
            rules: Vec::new(),
            sets: Vec::new(),
        }
    }

    /// Restricts the chain to `iface`, can be called multiple times.
    pub fn with_interface(mut self, iface: impl Into<String>) -> Self {
        self.interfaces.push(iface.into());
        self
    }

    pub fn with_set(mut self, set: Set) -> Self {
        self.sets.push(set);
        self
    }

    /// Appends a [Rule] to the chain.
    ///
    /// # Example
    /// ```
    /// # use cgen::{Chain, Hook, Protocol, Rule, Verdict};
    /// let mut chain = Chain::new("input", Hook::Xdp, Verdict::Drop);
    /// let rule = Rule::new(Verdict::Accept).with_range(22..=22, Protocol::TCP);
    /// chain.add_rule(rule).unwrap();
    /// assert_eq!(chain.rule_count(), 1);
    /// ```
    pub fn add_rule(&mut self, rule: Rule) -> Result<()> {
        if !rule.valid() {
            return Err(Error::InvalidPort);
        }
        self.rules.push(rule);
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn hook(&self) -> Hook {
        self.hook
    }

    pub fn policy(&self) -> Verdict {
        self.policy
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn sets(&self) -> &[Set] {
        &self.sets
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Interfaces listed by the chain, empty if it applies to every interface.
    pub fn interfaces(&self) -> &[String] {
        &self.interfaces
    }

    /// Fails unless `other` is enforced on the same hook and interfaces.
    pub(crate) fn check_same_scope(&self, other: &Chain) -> Result<()> {
        let reason = if self.hook != other.hook {
            format!("hook {} instead of {}", other.hook, self.hook)
        } else if self.listed() != other.listed() {
            format!(
                "interfaces [{}] instead of [{}]",
                other.interfaces.join(","),
                self.interfaces.join(",")
            )
        } else {
            return Ok(());
        };

        Err(Error::ScopeChanged {
            chain: other.name.clone(),
            reason,
        })
    }

    fn listed(&self) -> BTreeSet<&str> {
        self.interfaces.iter().map(String::as_str).collect()
    }

    /// Attachment points the chain must be enforced on, sorted and deduplicated.
    pub(crate) fn scope(&self, kernel: &impl Kernel) -> Result<Vec<AttachPoint>> {
        let ifaces: BTreeSet<String> = if self.interfaces.is_empty() {
            kernel.interfaces()?.into_iter().collect()
        } else {
            self.interfaces.iter().cloned().collect()
        };

        Ok(ifaces
            .into_iter()
            .map(|ifname| AttachPoint::new(self.hook, ifname))
            .collect())
    }
}

impl Marshal for Chain {
    fn marsh(&self) -> Result<Marsh> {
        marsh::json_leaf(Tag::Chain, self)
    }

    fn unmarsh(marsh: Marsh) -> Result<Self> {
        marsh::from_json_leaf(marsh, Tag::Chain)
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (hook {}, policy {}, {} rules, {} sets",
            self.name,
            self.hook,
            self.policy,
            self.rules.len(),
            self.sets.len()
        )?;
        if !self.interfaces.is_empty() {
            write!(f, ", on {}", self.interfaces.join(","))?;
        }
        f.write_str(")")
    }
}

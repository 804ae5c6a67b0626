use cgen_common::Verdict;
use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;

/// Rule of a [Chain](crate::Chain).
///
/// A rule matches on any combination of source, destination and port range.
/// A rule without matchers matches every packet.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct Rule {
    pub(crate) source: Option<IpNet>,
    pub(crate) dest: Option<IpNet>,
    pub(crate) ports: Option<PortRange>,
    pub(crate) verdict: Verdict,
    pub(crate) counters: bool,
}

impl Rule {
    /// Creates a new `Rule` matching every packet.
    pub fn new(verdict: Verdict) -> Self {
        Self {
            source: None,
            dest: None,
            ports: None,
            verdict,
            counters: false,
        }
    }

    /// Restricts the `Rule` to packets coming from `source`.
    pub fn with_source(self, source: IpNet) -> Self {
        Self {
            source: Some(source),
            ..self
        }
    }

    /// Restricts the `Rule` to packets going to `dest`.
    pub fn with_dest(self, dest: IpNet) -> Self {
        Self {
            dest: Some(dest),
            ..self
        }
    }

    /// Sets a destination port range for the `Rule`.
    pub fn with_range(self, range: RangeInclusive<u16>, proto: Protocol) -> Self {
        Self {
            ports: Some(PortRange {
                ports: range,
                proto,
            }),
            ..self
        }
    }

    /// Enables the packets and bytes counter of the `Rule`.
    pub fn with_counters(self) -> Self {
        Self {
            counters: true,
            ..self
        }
    }

    pub fn verdict(&self) -> Verdict {
        self.verdict
    }

    pub fn has_counters(&self) -> bool {
        self.counters
    }

    pub(crate) fn valid(&self) -> bool {
        self.ports.as_ref().map_or(true, PortRange::valid_range)
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Hash, Serialize, Deserialize)]
pub struct PortRange {
    pub(crate) ports: RangeInclusive<u16>,
    pub(crate) proto: Protocol,
}

impl Default for PortRange {
    fn default() -> Self {
        Self {
            ports: 0..=0,
            proto: Protocol::Generic,
        }
    }
}

impl PortRange {
    // Port 0 means "any port" and can't be part of a wider range
    pub(crate) fn valid_range(&self) -> bool {
        !self.ports.is_empty() && (self.ports.len() <= 1 || !self.ports.contains(&0))
    }
}

/// Protocol numbers for [Rule]s port-ranges.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Protocol {
    /// TCP Protocol port range.
    TCP = 0x06u8,
    /// UDP Protocol port range.
    UDP = 0x11u8,
    /// Generic protocol, represents a port range that involves both UDP and TCP.
    Generic = 0xFFu8,
}

impl Default for Protocol {
    fn default() -> Self {
        Self::Generic
    }
}

#[cfg(test)]
mod test {
    use super::{Protocol, Rule};
    use cgen_common::Verdict;
    use test_case::test_case;

    #[test_case(0..=0, true)]
    #[test_case(80..=80, true)]
    #[test_case(1000..=2000, true)]
    #[test_case(0..=10, false)]
    #[test_case(20..=10, false)]
    fn port_ranges_are_validated(range: std::ops::RangeInclusive<u16>, valid: bool) {
        let rule = Rule::new(Verdict::Accept).with_range(range, Protocol::TCP);
        assert_eq!(rule.valid(), valid);
    }

    #[test]
    fn rule_without_ports_is_valid() {
        let rule = Rule::new(Verdict::Drop).with_source("10.0.0.0/8".parse().unwrap());
        assert!(rule.valid());
        assert!(!rule.has_counters());
        assert!(rule.with_counters().has_counters());
    }
}

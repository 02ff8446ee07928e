//! Rule-based connection of instance pins to nets.
//!
//! A rule names an instance pattern, a pin pattern, a target net and
//! optionally a region. Rules without a region run before rules with one;
//! within each group rules run in the order they were added. The first rule
//! to match a pin claims it: later rules leave it alone, even when the
//! claiming rule does not connect.

use std::collections::HashSet;

use arcstr::ArcStr;
use regex::Regex;

use super::{Block, ITermId, InstId, NetId};
use crate::error::Result;
use crate::geom::Rect;
use crate::log::Log;

#[derive(Debug, Clone)]
pub struct GlobalConnectRule {
    region: Option<Rect>,
    inst_pattern: Regex,
    pin_pattern: Regex,
    net: NetId,
    do_connect: bool,
}

impl GlobalConnectRule {
    #[inline]
    pub fn region(&self) -> Option<Rect> {
        self.region
    }

    /// The instance pattern as given, without the anchors added around it.
    pub fn inst_pattern(&self) -> &str {
        strip_anchors(self.inst_pattern.as_str())
    }

    pub fn pin_pattern(&self) -> &str {
        strip_anchors(self.pin_pattern.as_str())
    }

    #[inline]
    pub fn net(&self) -> NetId {
        self.net
    }

    #[inline]
    pub fn do_connect(&self) -> bool {
        self.do_connect
    }
}

fn anchored(pattern: &str) -> Result<Regex> {
    Ok(Regex::new(&format!("^(?:{pattern})$"))?)
}

fn strip_anchors(pattern: &str) -> &str {
    pattern
        .strip_prefix("^(?:")
        .and_then(|p| p.strip_suffix(")$"))
        .unwrap_or(pattern)
}

/// Rules of one block plus the instances each rule resolved to.
#[derive(Debug, Clone, Default)]
pub(crate) struct GlobalConnect {
    rules: Vec<GlobalConnectRule>,
    resolved: Vec<Option<Vec<InstId>>>,
}

impl GlobalConnect {
    /// Forgets every resolved instance set.
    pub(crate) fn invalidate(&mut self) {
        for set in self.resolved.iter_mut() {
            *set = None;
        }
    }

    /// Rule indices in application order.
    fn order(&self) -> Vec<usize> {
        let (plain, regional): (Vec<usize>, Vec<usize>) =
            (0..self.rules.len()).partition(|i| self.rules[*i].region.is_none());
        plain.into_iter().chain(regional).collect()
    }
}

/// One pin connected by [`Block::global_connect`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalConnection {
    pub inst: ArcStr,
    pub pin: ArcStr,
    pub net: ArcStr,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GlobalConnectReport {
    pub connected: Vec<GlobalConnection>,
    /// Pins that already sat on the rule's net.
    pub unchanged: usize,
    /// Do-not-touch instances a rule matched.
    pub skipped_dont_touch: Vec<ArcStr>,
}

impl Log for GlobalConnectReport {
    fn summary(&self) -> String {
        format!(
            "global connect: {} pins connected, {} already connected",
            self.connected.len(),
            self.unchanged
        )
    }

    fn warnings(&self) -> Vec<String> {
        self.skipped_dont_touch
            .iter()
            .map(|inst| format!("global connect skipped do-not-touch instance {inst}"))
            .collect()
    }
}

impl Block {
    /// Adds a rule connecting pins matching `pin_pattern` on instances
    /// matching `inst_pattern` to `net`.
    ///
    /// Patterns are regular expressions that must match the whole name. With
    /// `do_connect` unset the rule only claims the pins it matches.
    pub fn add_global_connect(
        &mut self,
        region: Option<Rect>,
        inst_pattern: &str,
        pin_pattern: &str,
        net: NetId,
        do_connect: bool,
    ) -> Result<()> {
        self.nets.get(net)?;
        let rule = GlobalConnectRule {
            region,
            inst_pattern: anchored(inst_pattern)?,
            pin_pattern: anchored(pin_pattern)?,
            net,
            do_connect,
        };
        self.global_connect.rules.push(rule);
        self.global_connect.resolved.push(None);
        Ok(())
    }

    pub fn global_connect_rules(&self) -> &[GlobalConnectRule] {
        &self.global_connect.rules
    }

    pub fn clear_global_connects(&mut self) {
        self.global_connect = GlobalConnect::default();
    }

    /// Applies every rule.
    pub fn global_connect(&mut self) -> Result<GlobalConnectReport> {
        let mut report = GlobalConnectReport::default();
        let mut claimed: HashSet<ITermId> = HashSet::new();
        let mut skipped: HashSet<InstId> = HashSet::new();
        for index in self.global_connect.order() {
            let rule = self.global_connect.rules[index].clone();
            let net_name = self.nets.get(rule.net)?.name().clone();
            for inst in self.resolve_rule(index)? {
                let record = self.insts.get(inst)?;
                if record.is_dont_touch() {
                    if skipped.insert(inst) {
                        report.skipped_dont_touch.push(record.name().clone());
                    }
                    continue;
                }
                let inst_name = record.name().clone();
                let master = self.master(record.master_name())?.clone();
                let iterms = record.iterms().to_vec();
                for (mterm, iterm) in master.mterms().iter().zip(iterms) {
                    if !rule.pin_pattern.is_match(&mterm.name) || !claimed.insert(iterm) {
                        continue;
                    }
                    if !rule.do_connect {
                        continue;
                    }
                    if self.iterms.get(iterm)?.net() == Some(rule.net) {
                        report.unchanged += 1;
                        continue;
                    }
                    self.connect_iterm(iterm, rule.net)?;
                    report.connected.push(GlobalConnection {
                        inst: inst_name.clone(),
                        pin: mterm.name.clone(),
                        net: net_name.clone(),
                    });
                }
            }
        }
        report.log();
        Ok(report)
    }

    /// The instances matched by rule `index`, resolved once and cached.
    fn resolve_rule(&mut self, index: usize) -> Result<Vec<InstId>> {
        if let Some(Some(insts)) = self.global_connect.resolved.get(index) {
            return Ok(insts.clone());
        }
        let rule = &self.global_connect.rules[index];
        let insts: Vec<InstId> = self
            .insts
            .iter()
            .filter(|(_, inst)| rule.inst_pattern.is_match(inst.name()))
            .filter(|(_, inst)| rule.region.map_or(true, |r| r.contains(inst.location())))
            .map(|(id, _)| id)
            .collect();
        self.global_connect.resolved[index] = Some(insts.clone());
        Ok(insts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patterns_match_whole_names() {
        let re = anchored("VDD.*").unwrap();
        assert!(re.is_match("VDDA"));
        assert!(!re.is_match("XVDD"));
        assert_eq!(strip_anchors(re.as_str()), "VDD.*");
    }

    #[test]
    fn report_warns_once_per_skipped_instance() {
        let report = GlobalConnectReport {
            connected: Vec::new(),
            unchanged: 2,
            skipped_dont_touch: vec![ArcStr::from("dt1"), ArcStr::from("dt2")],
        };
        assert_eq!(
            report.summary(),
            "global connect: 0 pins connected, 2 already connected"
        );
        let warnings = report.warnings();
        assert_eq!(warnings.len(), 2);
        assert!(warnings[1].ends_with("dt2"));
    }

    #[test]
    fn bad_patterns_are_errors() {
        assert!(anchored("(").is_err());
    }
}

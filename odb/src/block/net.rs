use arcstr::ArcStr;
use dbtable::{Id, Record};

use super::{BTermId, Block, ITermId};
use crate::error::{ErrorSource, InvariantError, Result};
use crate::journal::JournalEntry;
use crate::parasitics::{CapNodeId, CcAdjustment, RSegId};
use crate::tech::SigType;

pub type NetId = Id<Net>;

#[derive(Debug, Clone, PartialEq)]
pub struct Net {
    pub(crate) name: ArcStr,
    pub(crate) sig_type: SigType,
    pub(crate) special: bool,
    pub(crate) dont_touch: bool,
    pub(crate) weight: u32,
    pub(crate) gndc_calibration: f64,
    pub(crate) cc_calibration: f64,
    pub(crate) non_default_rule: Option<ArcStr>,
    pub(crate) first_cap_node: Option<CapNodeId>,
    pub(crate) first_rseg: Option<RSegId>,
    pub(crate) iterms: Vec<ITermId>,
    pub(crate) bterms: Vec<BTermId>,
    pub(crate) cc_adjustments: Vec<CcAdjustment>,
}

impl Record for Net {
    const KIND: &'static str = "net";

    fn clear_links(&mut self) {
        self.first_cap_node = None;
        self.first_rseg = None;
        self.iterms.clear();
        self.bterms.clear();
        self.cc_adjustments.clear();
    }
}

impl Net {
    pub(crate) fn new(name: ArcStr) -> Self {
        Self {
            name,
            sig_type: SigType::Signal,
            special: false,
            dont_touch: false,
            weight: 1,
            gndc_calibration: 1.0,
            cc_calibration: 1.0,
            non_default_rule: None,
            first_cap_node: None,
            first_rseg: None,
            iterms: Vec::new(),
            bterms: Vec::new(),
            cc_adjustments: Vec::new(),
        }
    }

    #[inline]
    pub fn name(&self) -> &ArcStr {
        &self.name
    }

    #[inline]
    pub fn sig_type(&self) -> SigType {
        self.sig_type
    }

    #[inline]
    pub fn is_special(&self) -> bool {
        self.special
    }

    #[inline]
    pub fn is_dont_touch(&self) -> bool {
        self.dont_touch
    }

    #[inline]
    pub fn weight(&self) -> u32 {
        self.weight
    }

    #[inline]
    pub fn gndc_calibration(&self) -> f64 {
        self.gndc_calibration
    }

    #[inline]
    pub fn cc_calibration(&self) -> f64 {
        self.cc_calibration
    }

    #[inline]
    pub fn non_default_rule(&self) -> Option<&ArcStr> {
        self.non_default_rule.as_ref()
    }

    #[inline]
    pub fn first_cap_node(&self) -> Option<CapNodeId> {
        self.first_cap_node
    }

    #[inline]
    pub fn first_rseg(&self) -> Option<RSegId> {
        self.first_rseg
    }

    #[inline]
    pub fn iterms(&self) -> &[ITermId] {
        &self.iterms
    }

    #[inline]
    pub fn bterms(&self) -> &[BTermId] {
        &self.bterms
    }

    /// Whether the net has any extracted parasitics.
    #[inline]
    pub fn has_parasitics(&self) -> bool {
        self.first_cap_node.is_some() || self.first_rseg.is_some()
    }

    /// Coupling adjustments in effect, oldest first.
    #[inline]
    pub fn cc_adjustments(&self) -> &[CcAdjustment] {
        &self.cc_adjustments
    }

    /// Order of the most recent coupling adjustment in effect.
    pub fn cc_adjust_order(&self) -> Option<u32> {
        self.cc_adjustments.last().map(|a| a.order())
    }

    /// Product of the factors of every coupling adjustment in effect.
    pub fn cc_adjust_factor(&self) -> Option<f64> {
        if self.cc_adjustments.is_empty() {
            return None;
        }
        Some(self.cc_adjustments.iter().map(|a| a.factor()).product())
    }

    fn field(&self, like: &NetValue) -> NetValue {
        match like {
            NetValue::Name(_) => NetValue::Name(self.name.clone()),
            NetValue::SigType(_) => NetValue::SigType(self.sig_type),
            NetValue::Special(_) => NetValue::Special(self.special),
            NetValue::DontTouch(_) => NetValue::DontTouch(self.dont_touch),
            NetValue::Weight(_) => NetValue::Weight(self.weight),
            NetValue::GndcCalibration(_) => NetValue::GndcCalibration(self.gndc_calibration),
            NetValue::CcCalibration(_) => NetValue::CcCalibration(self.cc_calibration),
            NetValue::NonDefaultRule(_) => NetValue::NonDefaultRule(self.non_default_rule.clone()),
        }
    }

    fn set_field(&mut self, value: NetValue) {
        match value {
            NetValue::Name(name) => self.name = name,
            NetValue::SigType(sig_type) => self.sig_type = sig_type,
            NetValue::Special(special) => self.special = special,
            NetValue::DontTouch(dont_touch) => self.dont_touch = dont_touch,
            NetValue::Weight(weight) => self.weight = weight,
            NetValue::GndcCalibration(value) => self.gndc_calibration = value,
            NetValue::CcCalibration(value) => self.cc_calibration = value,
            NetValue::NonDefaultRule(rule) => self.non_default_rule = rule,
        }
    }
}

/// A journaled net attribute.
#[derive(Debug, Clone, PartialEq)]
pub enum NetValue {
    Name(ArcStr),
    SigType(SigType),
    Special(bool),
    DontTouch(bool),
    Weight(u32),
    GndcCalibration(f64),
    CcCalibration(f64),
    NonDefaultRule(Option<ArcStr>),
}

impl Block {
    pub fn create_net(&mut self, name: impl Into<ArcStr>) -> Result<NetId> {
        let record = Net::new(name.into());
        let net = self.insert_net(None, record.clone())?;
        self.record(|| JournalEntry::CreateNet { net, record })?;
        Ok(net)
    }

    /// Creates a net with the scalar attributes of `net` under a new name.
    pub fn duplicate_net(&mut self, net: NetId, name: impl Into<ArcStr>) -> Result<NetId> {
        let mut record = self.nets.detached_copy(net)?;
        record.name = name.into();
        let dup = self.insert_net(None, record.clone())?;
        self.record(|| JournalEntry::CreateNet { net: dup, record })?;
        Ok(dup)
    }

    pub(crate) fn insert_net(&mut self, id: Option<NetId>, record: Net) -> Result<NetId> {
        if self.net_names.contains(&record.name) {
            return Err(ErrorSource::NameConflict {
                kind: Net::KIND,
                name: record.name,
            }
            .into());
        }
        let name = record.name.clone();
        let net = match id {
            Some(id) => {
                self.nets.create_at(id, record)?;
                id
            }
            None => self.nets.create(record)?,
        };
        self.net_names
            .insert(name.clone(), net)
            .map_err(|_| ErrorSource::NameConflict { kind: Net::KIND, name })?;
        Ok(net)
    }

    /// Disconnects every terminal of `net`, destroys its parasitics, then
    /// destroys the net.
    pub fn destroy_net(&mut self, net: NetId) -> Result<()> {
        let record = self.nets.get(net)?;
        let iterms = record.iterms.clone();
        let bterms = record.bterms.clone();
        for iterm in iterms {
            self.disconnect_iterm(iterm)?;
        }
        for bterm in bterms {
            self.disconnect_bterm(bterm)?;
        }
        self.destroy_parasitics(net)?;
        let record = self.remove_net(net)?;
        self.record(|| JournalEntry::DestroyNet { net, record })
    }

    pub(crate) fn remove_net(&mut self, net: NetId) -> Result<Net> {
        let record = self.nets.get(net)?;
        let by = if !record.iterms.is_empty() || !record.bterms.is_empty() {
            Some("terminals")
        } else if record.has_parasitics() {
            Some("parasitics")
        } else {
            None
        };
        if let Some(by) = by {
            return Err(InvariantError::StillReferenced {
                kind: Net::KIND,
                id: net.raw(),
                by,
            }
            .into());
        }
        self.net_names.remove(&record.name, net);
        let mut record = self.nets.destroy(net)?;
        record.clear_links();
        Ok(record)
    }

    #[inline]
    pub fn net(&self, net: NetId) -> Result<&Net> {
        Ok(self.nets.get(net)?)
    }

    #[inline]
    pub fn find_net(&self, name: &str) -> Option<NetId> {
        self.net_names.get(name)
    }

    /// Nets in handle order.
    pub fn nets(&self) -> impl Iterator<Item = (NetId, &Net)> + '_ {
        self.nets.iter()
    }

    #[inline]
    pub fn net_count(&self) -> usize {
        self.nets.len()
    }

    pub fn rename_net(&mut self, net: NetId, name: impl Into<ArcStr>) -> Result<()> {
        self.update_net(net, NetValue::Name(name.into()))
    }

    pub fn set_net_sig_type(&mut self, net: NetId, sig_type: SigType) -> Result<()> {
        self.update_net(net, NetValue::SigType(sig_type))
    }

    pub fn set_net_special(&mut self, net: NetId, special: bool) -> Result<()> {
        self.update_net(net, NetValue::Special(special))
    }

    pub fn set_net_dont_touch(&mut self, net: NetId, dont_touch: bool) -> Result<()> {
        self.update_net(net, NetValue::DontTouch(dont_touch))
    }

    pub fn set_net_weight(&mut self, net: NetId, weight: u32) -> Result<()> {
        self.update_net(net, NetValue::Weight(weight))
    }

    pub fn set_net_gndc_calibration(&mut self, net: NetId, factor: f64) -> Result<()> {
        self.update_net(net, NetValue::GndcCalibration(factor))
    }

    pub fn set_net_cc_calibration(&mut self, net: NetId, factor: f64) -> Result<()> {
        self.update_net(net, NetValue::CcCalibration(factor))
    }

    pub fn set_net_non_default_rule(&mut self, net: NetId, rule: Option<ArcStr>) -> Result<()> {
        self.update_net(net, NetValue::NonDefaultRule(rule))
    }

    fn update_net(&mut self, net: NetId, value: NetValue) -> Result<()> {
        let new = value.clone();
        let old = self.apply_net_value(net, value)?;
        self.record(|| JournalEntry::UpdateNet { net, old, new })
    }

    /// Stores `value` and returns the value it replaced.
    pub(crate) fn apply_net_value(&mut self, net: NetId, value: NetValue) -> Result<NetValue> {
        let record = self.nets.get(net)?;
        let old = record.field(&value);
        if let NetValue::Name(name) = &value {
            self.net_names
                .rename(&record.name, name.clone(), net)
                .map_err(|_| ErrorSource::NameConflict {
                    kind: Net::KIND,
                    name: name.clone(),
                })?;
        }
        self.nets.get_mut(net)?.set_field(value);
        Ok(old)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_copy_drops_links() {
        let mut net = Net::new("a".into());
        net.weight = 4;
        net.first_cap_node = Id::from_raw(3);
        net.iterms.push(Id::from_raw(1).unwrap());
        net.clear_links();
        assert_eq!(net.weight(), 4);
        assert!(!net.has_parasitics());
        assert!(net.iterms().is_empty());
    }

    #[test]
    fn field_snapshots_match_the_requested_kind() {
        let net = Net::new("n".into());
        assert_eq!(
            net.field(&NetValue::Weight(9)),
            NetValue::Weight(1)
        );
        assert_eq!(
            net.field(&NetValue::NonDefaultRule(Some("ndr".into()))),
            NetValue::NonDefaultRule(None)
        );
    }
}

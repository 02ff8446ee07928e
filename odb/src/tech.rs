//! Technology and cell-library definitions.
//!
//! These are read-only from the database core's point of view: a
//! [`Database`](crate::database::Database) holds them behind [`Arc`]s and every
//! block, including per-corner child blocks, shares them.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::sync::Arc;

use arcstr::ArcStr;
use dbtable::{DbReader, DbWriter, Persist, StreamError};
use derive_builder::Builder;
use serde::{Deserialize, Serialize};

use crate::error::{ErrorSource, Result};

/// Process technology.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tech {
    name: ArcStr,
    dbu_per_micron: u32,
}

impl Tech {
    pub fn new(name: impl Into<ArcStr>, dbu_per_micron: u32) -> Self {
        Self {
            name: name.into(),
            dbu_per_micron,
        }
    }

    #[inline]
    pub fn name(&self) -> &ArcStr {
        &self.name
    }

    #[inline]
    pub fn dbu_per_micron(&self) -> u32 {
        self.dbu_per_micron
    }
}

/// The electrical role of a net or terminal.
#[derive(Debug, Copy, Clone, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum SigType {
    #[default]
    Signal,
    Power,
    Ground,
    Clock,
    Analog,
    Reset,
    Scan,
    Tieoff,
}

impl SigType {
    const ALL: [SigType; 8] = [
        Self::Signal,
        Self::Power,
        Self::Ground,
        Self::Clock,
        Self::Analog,
        Self::Reset,
        Self::Scan,
        Self::Tieoff,
    ];

    #[inline]
    pub(crate) fn code(self) -> u8 {
        self as u8
    }

    pub(crate) fn from_code(code: u8) -> Option<Self> {
        Self::ALL.get(code as usize).copied()
    }

    /// Whether nets of this type are supply nets.
    #[inline]
    pub fn is_supply(self) -> bool {
        matches!(self, Self::Power | Self::Ground)
    }
}

/// Direction of a terminal.
#[derive(Debug, Copy, Clone, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum IoType {
    Input,
    Output,
    #[default]
    InOut,
    Feedthru,
}

impl IoType {
    const ALL: [IoType; 4] = [Self::Input, Self::Output, Self::InOut, Self::Feedthru];

    #[inline]
    pub(crate) fn code(self) -> u8 {
        self as u8
    }

    pub(crate) fn from_code(code: u8) -> Option<Self> {
        Self::ALL.get(code as usize).copied()
    }
}

/// A pin of a library cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MTerm {
    pub name: ArcStr,
    #[serde(default)]
    pub sig_type: SigType,
    #[serde(default)]
    pub io_type: IoType,
}

impl MTerm {
    pub fn new(name: impl Into<ArcStr>, io_type: IoType) -> Self {
        Self {
            name: name.into(),
            sig_type: SigType::Signal,
            io_type,
        }
    }

    pub fn with_sig_type(mut self, sig_type: SigType) -> Self {
        self.sig_type = sig_type;
        self
    }
}

/// A library cell that instances refer to.
#[derive(Debug, Clone, PartialEq, Eq, Builder, Serialize, Deserialize)]
pub struct Master {
    #[builder(setter(into))]
    name: ArcStr,
    #[builder(default)]
    width: i64,
    #[builder(default)]
    height: i64,
    #[builder(default, setter(each(name = "mterm")))]
    mterms: Vec<MTerm>,
}

impl Master {
    #[inline]
    pub fn builder() -> MasterBuilder {
        MasterBuilder::default()
    }

    #[inline]
    pub fn name(&self) -> &ArcStr {
        &self.name
    }

    #[inline]
    pub fn width(&self) -> i64 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> i64 {
        self.height
    }

    #[inline]
    pub fn mterms(&self) -> &[MTerm] {
        &self.mterms
    }

    pub fn mterm_index(&self, name: &str) -> Option<usize> {
        self.mterms.iter().position(|m| m.name == name)
    }
}

/// A named collection of [`Master`]s.
#[derive(Debug, Clone, Default)]
pub struct Library {
    name: ArcStr,
    masters: Vec<Arc<Master>>,
    index: HashMap<ArcStr, usize>,
}

impl Library {
    pub fn new(name: impl Into<ArcStr>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    #[inline]
    pub fn name(&self) -> &ArcStr {
        &self.name
    }

    pub fn add_master(&mut self, master: Master) -> Result<Arc<Master>> {
        if self.index.contains_key(master.name()) {
            return Err(ErrorSource::NameConflict {
                kind: "master",
                name: master.name().clone(),
            }
            .into());
        }
        let master = Arc::new(master);
        self.index.insert(master.name().clone(), self.masters.len());
        self.masters.push(master.clone());
        Ok(master)
    }

    pub fn find_master(&self, name: &str) -> Option<&Arc<Master>> {
        self.index.get(name).map(|i| &self.masters[*i])
    }

    #[inline]
    pub fn masters(&self) -> impl Iterator<Item = &Arc<Master>> + '_ {
        self.masters.iter()
    }
}

/// Reads a one-byte enum code.
pub(crate) fn read_code<T>(
    r: &mut DbReader<impl Read>,
    what: &'static str,
    decode: impl FnOnce(u8) -> Option<T>,
) -> std::result::Result<T, StreamError> {
    let tag = r.read_u8()?;
    decode(tag).ok_or(StreamError::InvalidTag { what, tag })
}

impl Persist for Tech {
    fn write<W: Write>(&self, w: &mut DbWriter<W>) -> std::result::Result<(), StreamError> {
        w.write_str(&self.name)?;
        w.write_u32(self.dbu_per_micron)
    }

    fn read<R: Read>(r: &mut DbReader<R>) -> std::result::Result<Self, StreamError> {
        Ok(Self {
            name: r.read_arcstr()?,
            dbu_per_micron: r.read_u32()?,
        })
    }
}

impl Persist for MTerm {
    fn write<W: Write>(&self, w: &mut DbWriter<W>) -> std::result::Result<(), StreamError> {
        w.write_str(&self.name)?;
        w.write_u8(self.sig_type.code())?;
        w.write_u8(self.io_type.code())
    }

    fn read<R: Read>(r: &mut DbReader<R>) -> std::result::Result<Self, StreamError> {
        Ok(Self {
            name: r.read_arcstr()?,
            sig_type: read_code(r, "signal type", SigType::from_code)?,
            io_type: read_code(r, "io type", IoType::from_code)?,
        })
    }
}

impl Persist for Master {
    fn write<W: Write>(&self, w: &mut DbWriter<W>) -> std::result::Result<(), StreamError> {
        w.write_str(&self.name)?;
        w.write_i64(self.width)?;
        w.write_i64(self.height)?;
        self.mterms.write(w)
    }

    fn read<R: Read>(r: &mut DbReader<R>) -> std::result::Result<Self, StreamError> {
        Ok(Self {
            name: r.read_arcstr()?,
            width: r.read_i64()?,
            height: r.read_i64()?,
            mterms: r.read()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn library_rejects_duplicate_masters() {
        let mut lib = Library::new("stdcells");
        let inv = Master::builder()
            .name("INV")
            .mterm(MTerm::new("A", IoType::Input))
            .mterm(MTerm::new("Y", IoType::Output))
            .build()
            .unwrap();
        lib.add_master(inv.clone()).unwrap();
        assert!(lib.add_master(inv).is_err());
        let found = lib.find_master("INV").unwrap();
        assert_eq!(found.mterm_index("Y"), Some(1));
    }

    #[test]
    fn type_codes_round_trip() {
        for s in SigType::ALL {
            assert_eq!(SigType::from_code(s.code()), Some(s));
        }
        for t in IoType::ALL {
            assert_eq!(IoType::from_code(t.code()), Some(t));
        }
    }
}

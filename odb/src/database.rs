//! The top-level container of blocks, technology and libraries.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::path::Path;
use std::sync::Arc;

use arcstr::ArcStr;
use dbtable::{DbReader, DbWriter, Persist};
use slotmap::{new_key_type, SlotMap};

use crate::block::{Block, CornerInfo, NetId, SUPPORTED_SCHEMAS};
use crate::config::DbConfig;
use crate::error::{with_err_context, ErrorContext, ErrorSource, Result};
use crate::io::{create_file, open_file};
use crate::journal::{Journal, JournalEntry, ReplaySummary};
use crate::log::{debug, info};
use crate::tech::{Library, Master, Tech};

new_key_type! {
    /// A unique identifier for [blocks](Block) within a [`Database`].
    pub struct BlockKey;
}

pub struct Database {
    config: DbConfig,
    tech: Arc<Tech>,
    libs: Vec<Arc<Library>>,
    blocks: SlotMap<BlockKey, Block>,
    /// Blocks without a parent, in creation order.
    roots: Vec<BlockKey>,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("tech", &self.tech.name())
            .field("libs", &self.libs.len())
            .field("blocks", &self.blocks.len())
            .finish()
    }
}

fn block_not_found() -> crate::error::OdbError {
    ErrorSource::BlockNotFound.into()
}

impl Database {
    pub fn new(tech: Tech, config: DbConfig) -> Self {
        Self {
            config,
            tech: Arc::new(tech),
            libs: Vec::new(),
            blocks: SlotMap::with_key(),
            roots: Vec::new(),
        }
    }

    #[inline]
    pub fn config(&self) -> &DbConfig {
        &self.config
    }

    #[inline]
    pub fn tech(&self) -> &Arc<Tech> {
        &self.tech
    }

    pub fn add_library(&mut self, lib: Library) -> Result<Arc<Library>> {
        if self.libs.iter().any(|l| l.name() == lib.name()) {
            return Err(ErrorSource::NameConflict {
                kind: "library",
                name: lib.name().clone(),
            }
            .into());
        }
        let lib = Arc::new(lib);
        self.libs.push(lib.clone());
        Ok(lib)
    }

    pub fn libraries(&self) -> &[Arc<Library>] {
        &self.libs
    }

    /// Finds a master by name, searching libraries in the order they were added.
    pub fn find_master(&self, name: &str) -> Option<Arc<Master>> {
        self.libs
            .iter()
            .find_map(|lib| lib.find_master(name))
            .cloned()
    }

    /// Creates a block, either at the top level or under `parent`.
    ///
    /// Fails if a sibling already has the same name.
    pub fn create_block(
        &mut self,
        name: impl Into<ArcStr>,
        parent: Option<BlockKey>,
    ) -> Result<BlockKey> {
        let name = name.into();
        if let Some(parent) = parent {
            self.blocks.get(parent).ok_or_else(block_not_found)?;
        }
        if self.find_child(parent, &name).is_some() {
            return Err(ErrorSource::NameConflict { kind: "block", name }.into());
        }
        let tech = self.tech.clone();
        let config = &self.config;
        let key = self
            .blocks
            .insert_with_key(|key| Block::new(key, name.clone(), parent, tech, config));
        self.link_child(parent, key);
        debug!("created block {name}");
        Ok(key)
    }

    fn link_child(&mut self, parent: Option<BlockKey>, key: BlockKey) {
        match parent.and_then(|p| self.blocks.get_mut(p)) {
            Some(parent) => parent.children.push(key),
            None => self.roots.push(key),
        }
    }

    /// Destroys a block and, first, all of its descendants.
    pub fn destroy_block(&mut self, key: BlockKey) -> Result<()> {
        let block = self.blocks.get(key).ok_or_else(block_not_found)?;
        let children = block.children.clone();
        let parent = block.parent();
        for child in children {
            self.destroy_block(child)?;
        }
        match parent.and_then(|p| self.blocks.get_mut(p)) {
            Some(parent) => parent.children.retain(|c| *c != key),
            None => self.roots.retain(|c| *c != key),
        }
        if let Some(block) = self.blocks.remove(key) {
            debug!("destroyed block {}", block.name());
        }
        Ok(())
    }

    pub fn block(&self, key: BlockKey) -> Result<&Block> {
        self.blocks.get(key).ok_or_else(block_not_found)
    }

    pub fn block_mut(&mut self, key: BlockKey) -> Result<&mut Block> {
        self.blocks.get_mut(key).ok_or_else(block_not_found)
    }

    /// Two distinct blocks borrowed mutably at once.
    pub fn block_pair_mut(&mut self, a: BlockKey, b: BlockKey) -> Result<[&mut Block; 2]> {
        if a == b {
            return Err(ErrorSource::InvalidArgs("the two blocks must differ".to_string()).into());
        }
        self.blocks.get_disjoint_mut([a, b]).ok_or_else(block_not_found)
    }

    /// The first top-level block.
    pub fn top_block(&self) -> Option<BlockKey> {
        self.roots.first().copied()
    }

    pub fn top_blocks(&self) -> &[BlockKey] {
        &self.roots
    }

    /// Finds the child of `parent` called `name`; `None` looks among top-level blocks.
    pub fn find_child(&self, parent: Option<BlockKey>, name: &str) -> Option<BlockKey> {
        let siblings = match parent {
            Some(parent) => &self.blocks.get(parent)?.children,
            None => &self.roots,
        };
        siblings
            .iter()
            .copied()
            .find(|key| self.blocks.get(*key).map_or(false, |b| b.name() == name))
    }

    pub fn blocks(&self) -> impl Iterator<Item = (BlockKey, &Block)> + '_ {
        self.blocks.iter()
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Creates one child block per corner after the first.
    ///
    /// Each child carries a single corner and a copy of every net of `key`
    /// under the same handle, so that per-corner RC data can be built
    /// independently.
    pub fn create_ext_corner_blocks(&mut self, key: BlockKey) -> Result<Vec<BlockKey>> {
        let block = self.block(key)?;
        if block.ext_corner().is_some() {
            return Err(ErrorSource::InvalidArgs(format!(
                "block {} is itself a corner block",
                block.name()
            ))
            .into());
        }
        let count = block.corner_count();
        (1..count)
            .map(|corner| self.create_ext_corner_block(key, corner))
            .collect()
    }

    /// Creates the child block holding values for `corner`.
    pub fn create_ext_corner_block(&mut self, key: BlockKey, corner: usize) -> Result<BlockKey> {
        let block = self.block(key)?;
        block.check_corner(corner)?;
        if corner == 0 {
            return Err(ErrorSource::InvalidArgs(
                "corner 0 lives in the block itself".to_string(),
            )
            .into());
        }
        if self.find_ext_corner_child(key, corner)?.is_some() {
            return Err(ErrorSource::InvalidArgs(format!(
                "block {} already has a block for corner {corner}",
                block.name()
            ))
            .into());
        }
        let names = block
            .corners()
            .names()
            .get(corner)
            .map(|n| vec![n.clone()])
            .unwrap_or_default();
        let info = CornerInfo::new(1, 1, names)?;
        let nets = block
            .nets()
            .map(|(id, _)| Ok((id, block.nets.detached_copy(id)?)))
            .collect::<Result<Vec<_>>>()?;
        let name = ArcStr::from(format!("{}_ext_corner_{corner}", block.name()));

        let child = self.create_block(name, Some(key))?;
        let child_block = self.block_mut(child)?;
        child_block.journal = None;
        child_block.ext_corner = Some(corner);
        child_block.apply_corners(info)?;
        for (id, net) in nets {
            child_block.insert_net(Some(id), net)?;
        }
        info!(
            "created corner {corner} block {} with {} nets",
            child_block.name(),
            child_block.net_count()
        );
        Ok(child)
    }

    fn find_ext_corner_child(&self, key: BlockKey, corner: usize) -> Result<Option<BlockKey>> {
        Ok(self
            .block(key)?
            .children()
            .iter()
            .copied()
            .find(|c| self.blocks.get(*c).and_then(|b| b.ext_corner()) == Some(corner)))
    }

    /// The block that holds values for `corner` of `key`: the block itself
    /// for corner 0, its corner child otherwise.
    pub fn ext_corner_block(&self, key: BlockKey, corner: usize) -> Result<BlockKey> {
        self.block(key)?.check_corner(corner)?;
        if corner == 0 {
            return Ok(key);
        }
        self.find_ext_corner_child(key, corner)?.ok_or_else(|| {
            ErrorSource::NotFound {
                kind: "corner block",
                name: arcstr::format!("{corner}"),
            }
            .into()
        })
    }

    /// The net of a corner block that mirrors `net` of its parent.
    pub fn ext_corner_net(&self, key: BlockKey, corner: usize, net: NetId) -> Result<NetId> {
        let block = self.block(self.ext_corner_block(key, corner)?)?;
        block.net(net)?;
        Ok(net)
    }

    /// Replays `journal` onto the block `key`.
    ///
    /// Masters of instances the journal creates are looked up in this
    /// database's libraries first, so the target block need not have used
    /// them before.
    pub fn apply_eco(&mut self, key: BlockKey, journal: &Journal) -> Result<ReplaySummary> {
        let mut masters = Vec::new();
        for entry in journal.entries() {
            if let (_, JournalEntry::CreateInst { record, .. }) = entry? {
                let name = record.master_name();
                let master = self.find_master(name).ok_or_else(|| ErrorSource::NotFound {
                    kind: "master",
                    name: name.clone(),
                })?;
                masters.push(master);
            }
        }
        let block = self.block_mut(key)?;
        for master in masters.iter() {
            block.register_master(master);
        }
        block
            .apply_eco(journal)
            .map_err(|err| err.with_context(ErrorContext::Block(block.name().clone())))
    }

    /// Writes the technology, libraries and every block to `out`.
    ///
    /// Uses the schema version from the configuration.
    pub fn write(&self, out: impl Write) -> Result<()> {
        let schema = self.config.schema;
        if !SUPPORTED_SCHEMAS.contains(&schema) {
            return Err(ErrorSource::InvalidArgs(format!(
                "cannot write schema version {schema}"
            ))
            .into());
        }
        let mut w = DbWriter::new(out, schema);
        w.write_header()?;
        self.tech.write(&mut w)?;
        w.write_len(self.libs.len())?;
        for lib in self.libs.iter() {
            w.write_str(lib.name())?;
            let masters: Vec<&Arc<Master>> = lib.masters().collect();
            w.write_len(masters.len())?;
            for master in masters {
                master.write(&mut w)?;
            }
        }

        let order = self.hierarchy_order();
        let position: HashMap<BlockKey, usize> =
            order.iter().enumerate().map(|(i, k)| (*k, i)).collect();
        w.write_len(order.len())?;
        for key in order.iter() {
            let block = &self.blocks[*key];
            let parent = block
                .parent()
                .and_then(|p| position.get(&p))
                .map_or(0, |i| *i as u32 + 1);
            w.write_u32(parent)?;
            block.write_body(&mut w)?;
        }
        info!(
            "wrote database with {} blocks at schema {schema}",
            order.len()
        );
        Ok(())
    }

    /// Every block, parents before children.
    fn hierarchy_order(&self) -> Vec<BlockKey> {
        let mut order = Vec::with_capacity(self.blocks.len());
        let mut stack: Vec<BlockKey> = self.roots.iter().rev().copied().collect();
        while let Some(key) = stack.pop() {
            order.push(key);
            if let Some(block) = self.blocks.get(key) {
                stack.extend(block.children.iter().rev().copied());
            }
        }
        order
    }

    /// Reads a database written by [`Database::write`].
    ///
    /// `config` applies to blocks created afterwards; blocks read from the
    /// stream keep their stored corner setup.
    pub fn read(input: impl Read, config: DbConfig) -> Result<Self> {
        let mut r = DbReader::open(input, SUPPORTED_SCHEMAS)?;
        let tech = Tech::read(&mut r)?;
        let mut db = Self::new(tech, config);

        let nlibs = r.read_len()?;
        for _ in 0..nlibs {
            let mut lib = Library::new(r.read_arcstr()?);
            let nmasters = r.read_len()?;
            for _ in 0..nmasters {
                lib.add_master(Master::read(&mut r)?)?;
            }
            db.add_library(lib)?;
        }

        let nblocks = r.read_len()?;
        let mut keys: Vec<BlockKey> = Vec::new();
        for _ in 0..nblocks {
            let parent = match r.read_u32()? as usize {
                0 => None,
                i => Some(*keys.get(i - 1).ok_or_else(|| {
                    ErrorSource::InvalidArgs(format!("block refers to unknown parent {i}"))
                })?),
            };
            let libs = db.libs.clone();
            let find = |name: &str| libs.iter().find_map(|lib| lib.find_master(name)).cloned();
            let block = Block::read_body(&mut r, BlockKey::default(), parent, db.tech.clone(), find)?;
            if db.find_child(parent, block.name()).is_some() {
                return Err(ErrorSource::NameConflict {
                    kind: "block",
                    name: block.name().clone(),
                }
                .into());
            }
            let key = db.blocks.insert(block);
            db.blocks[key].key = key;
            db.link_child(parent, key);
            keys.push(key);
        }
        info!(
            "read database with {} blocks at schema {}",
            nblocks,
            r.schema()
        );
        Ok(db)
    }

    pub fn write_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let mut out = create_file(path)?;
        self.write(&mut out)?;
        with_err_context(out.flush(), || ErrorContext::CreateFile(path.to_path_buf()))
    }

    pub fn read_file(path: impl AsRef<Path>, config: DbConfig) -> Result<Self> {
        let path = path.as_ref();
        let input = open_file(path)?;
        Self::read(input, config)
            .map_err(|err| err.with_context(ErrorContext::ReadFile(path.to_path_buf())))
    }
}

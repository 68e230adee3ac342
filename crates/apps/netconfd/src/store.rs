//! File-backed configuration store: one XML document per lockable target.

use std::path::{Path, PathBuf};

use log::debug;
use netconf_proto::{RpcError, Target};
use netconf_xml::{parse, serialize_document, XmlElement};

const SEED_DOCUMENT: &str = "<data>\
<components>\
<component><name>cpu0</name><type>CPU</type><state>ACTIVE</state></component>\
<component><name>fan0</name><type>FAN</type><state>ACTIVE</state></component>\
</components>\
</data>";

pub struct ConfigStore {
    root: PathBuf,
}

impl ConfigStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the store directory and seed missing target documents.
    pub fn ensure_seeded(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.root)?;
        for target in Target::ALL {
            let path = self.path_for(target);
            if !path.exists() {
                std::fs::write(&path, SEED_DOCUMENT)?;
            }
        }
        Ok(())
    }

    pub fn load(&self, target: Target) -> Result<XmlElement, RpcError> {
        let path = self.path_for(target);
        let raw = std::fs::read_to_string(&path)
            .map_err(|err| RpcError::internal(format!("read {}: {err}", path.display())))?;
        parse(&raw).map_err(|err| RpcError::internal(format!("parse {}: {err}", path.display())))
    }

    pub fn save(&self, target: Target, document: &XmlElement) -> Result<(), RpcError> {
        let path = self.path_for(target);
        std::fs::write(&path, serialize_document(document))
            .map_err(|err| RpcError::internal(format!("write {}: {err}", path.display())))
    }

    /// Merge an `edit-config` `<config>` payload into the stored document
    /// and persist the result.
    pub fn merge(&self, target: Target, config: &XmlElement) -> Result<(), RpcError> {
        let mut document = self.load(target)?;
        for incoming in &config.children {
            merge_child(&mut document, incoming);
        }
        debug!("merged edit-config into {}", target.name());
        self.save(target, &document)
    }

    fn path_for(&self, target: Target) -> PathBuf {
        self.root.join(format!("{}.xml", target.name()))
    }
}

fn merge_child(stored: &mut XmlElement, incoming: &XmlElement) {
    if incoming.children.is_empty() {
        // Leaf: overwrite the matching leaf's value, or append a new one.
        if let Some(existing) = stored
            .children
            .iter_mut()
            .find(|child| child.local_name() == incoming.local_name() && child.children.is_empty())
        {
            existing.text = incoming.text.clone();
        } else {
            stored.push(incoming.clone());
        }
        return;
    }

    match stored
        .children
        .iter_mut()
        .find(|candidate| corresponds(candidate, incoming))
    {
        Some(existing) => {
            for grandchild in &incoming.children {
                merge_child(existing, grandchild);
            }
        }
        None => stored.push(incoming.clone()),
    }
}

/// List-entry correspondence: same tag and an agreeing key leaf (or no
/// shared key leaf at all, as for plain containers).
fn corresponds(candidate: &XmlElement, incoming: &XmlElement) -> bool {
    if candidate.local_name() != incoming.local_name() {
        return false;
    }
    let mut shared_key = false;
    for leaf in incoming
        .children
        .iter()
        .filter(|child| child.children.is_empty() && child.has_text())
    {
        if let Some(existing) = candidate
            .children_named(leaf.local_name())
            .find(|child| child.children.is_empty())
        {
            shared_key = true;
            if existing.trimmed_text() == leaf.trimmed_text() {
                return true;
            }
        }
    }
    !shared_key
}

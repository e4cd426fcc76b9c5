//! Indexed storage for graph records.
//!
//! References on the wire are string names. The arena resolves every
//! reference to an integer index once, up front, so chain traversal during
//! reconstruction is array indexing rather than repeated map lookups.
//! Unnamed records get a synthetic identity (their index) and participate
//! in lookups like named ones.

use std::collections::HashMap;

use tracing::warn;

use super::archetype::{Archetype, classify};
use super::{LevelData, LevelDataEntity};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct RecordId(pub usize);

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Field {
    Value(f64),
    Ref(RecordId),
    /// Reference to a name absent from the document. Kept so only the code
    /// paths that actually follow it report an error.
    Dangling(String),
}

#[derive(Debug, Clone)]
pub(crate) struct Record {
    pub name: Option<String>,
    pub archetype: Archetype,
    fields: Vec<(String, Field)>,
}

impl Record {
    pub fn value(&self, key: &str) -> Option<f64> {
        self.fields.iter().find_map(|(name, field)| match field {
            Field::Value(v) if name == key => Some(*v),
            _ => None,
        })
    }

    pub fn reference(&self, key: &str) -> Option<RecordId> {
        self.fields.iter().find_map(|(name, field)| match field {
            Field::Ref(id) if name == key => Some(*id),
            _ => None,
        })
    }

    pub fn ref_name(&self, key: &str) -> Option<&str> {
        self.fields.iter().find_map(|(name, field)| match field {
            Field::Dangling(target) if name == key => Some(target.as_str()),
            _ => None,
        })
    }

    pub fn has(&self, key: &str) -> bool {
        self.fields.iter().any(|(name, _)| name == key)
    }
}

pub(crate) struct Arena {
    records: Vec<Record>,
    by_name: HashMap<String, RecordId>,
}

impl Arena {
    /// Indexes the document and resolves every reference field to an id.
    pub fn build(doc: &LevelData) -> Self {
        let mut by_name = HashMap::new();
        for (idx, entity) in doc.entities.iter().enumerate() {
            if let Some(name) = &entity.name
                && by_name.insert(name.clone(), RecordId(idx)).is_some()
            {
                warn!(name, "duplicate record name, later record wins");
            }
        }

        let records = doc
            .entities
            .iter()
            .map(|entity| Self::lower(entity, &by_name))
            .collect();

        Self { records, by_name }
    }

    fn lower(entity: &LevelDataEntity, by_name: &HashMap<String, RecordId>) -> Record {
        let fields = entity
            .data
            .iter()
            .filter_map(|field| {
                let value = match (&field.value, &field.reference) {
                    (Some(v), _) => Field::Value(*v),
                    (None, Some(target)) => by_name
                        .get(target)
                        .map(|id| Field::Ref(*id))
                        .unwrap_or_else(|| Field::Dangling(target.clone())),
                    (None, None) => return None,
                };
                Some((field.name.clone(), value))
            })
            .collect();
        Record {
            name: entity.name.clone(),
            archetype: classify(&entity.archetype),
            fields,
        }
    }

    pub fn get(&self, id: RecordId) -> &Record {
        &self.records[id.0]
    }

    pub fn lookup(&self, name: &str) -> Option<RecordId> {
        self.by_name.get(name).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (RecordId, &Record)> {
        self.records
            .iter()
            .enumerate()
            .map(|(idx, record)| (RecordId(idx), record))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Human-readable identity for error messages.
    pub fn display(&self, id: RecordId) -> String {
        match &self.get(id).name {
            Some(name) => name.clone(),
            None => format!("#{}", id.0),
        }
    }
}

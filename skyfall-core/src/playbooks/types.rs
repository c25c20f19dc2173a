use std::collections::BTreeMap;
use std::ops::Bound;

use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ModelError;

/// One technique invocation inside a playbook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybookStep {
    /// Technique id, resolved through the registry at run time.
    pub module: String,
    #[serde(default)]
    pub params: Option<Vec<Value>>,
    /// Seconds to pause after this step completes, before the next one starts.
    #[serde(default)]
    pub wait: u64,
}

impl PlaybookStep {
    pub fn new(module: impl Into<String>, params: Option<Vec<Value>>, wait: u64) -> Self {
        Self {
            module: module.into(),
            params,
            wait,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Playbook {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub author: String,
    pub creation_date: NaiveDate,
    #[serde(default)]
    pub references: Vec<String>,
    /// Keyed by step index. Iteration is always in ascending index order.
    #[serde(default)]
    pub sequence: BTreeMap<u32, PlaybookStep>,
}

impl Playbook {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        author: impl Into<String>,
        references: Vec<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            author: author.into(),
            creation_date: Local::now().date_naive(),
            references,
            sequence: BTreeMap::new(),
        }
    }

    /// Appends a step at the next free index and returns that index.
    ///
    /// Only the in-memory sequence changes; call `PlaybookStore::save` to persist.
    /// Fails when the highest existing index is already `u32::MAX`.
    pub fn add_step(
        &mut self,
        module: impl Into<String>,
        params: Option<Vec<Value>>,
        wait: u64,
    ) -> Result<u32, ModelError> {
        let index = self
            .next_index()
            .ok_or_else(|| ModelError::SequenceFull(self.name.clone()))?;
        self.sequence
            .insert(index, PlaybookStep::new(module, params, wait));
        Ok(index)
    }

    /// Removes the step at `index` and shifts later steps down so indices stay
    /// contiguous.
    pub fn remove_step(&mut self, index: u32) -> Option<PlaybookStep> {
        let removed = self.sequence.remove(&index)?;
        let later: Vec<u32> = self
            .sequence
            .range((Bound::Excluded(index), Bound::Unbounded))
            .map(|(i, _)| *i)
            .collect();
        for old in later {
            if let Some(step) = self.sequence.remove(&old) {
                self.sequence.insert(old - 1, step);
            }
        }
        Some(removed)
    }

    /// `None` once the sequence ends at `u32::MAX`.
    pub fn next_index(&self) -> Option<u32> {
        match self.sequence.keys().next_back() {
            Some(last) => last.checked_add(1),
            None => Some(1),
        }
    }

    pub fn steps(&self) -> impl Iterator<Item = (u32, &PlaybookStep)> {
        self.sequence.iter().map(|(index, step)| (*index, step))
    }

    pub fn step_count(&self) -> usize {
        self.sequence.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequence.is_empty()
    }
}

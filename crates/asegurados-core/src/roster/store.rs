use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use super::{DatasetClient, RosterError};
use crate::import::{self, ImportFormat, PersonDraft, UpsertOutcome, UpsertTarget};
use crate::models::Person;
use crate::storage::KeyValueStore;

/// Storage key holding the roster as a JSON array.
pub const STORAGE_KEY: &str = "aseguradosDataV1";

/// Ordered roster of people, persisted after every change.
///
/// Mutations build the next list, persist it, and only then swap it in, so a
/// failed write leaves both memory and storage as they were. Each mutator
/// returns the new snapshot for re-rendering.
pub struct RecordStore {
    records: Vec<Person>,
    storage: Arc<dyn KeyValueStore>,
    dataset: DatasetClient,
}

impl RecordStore {
    /// Load the roster from storage, or bootstrap it from the bundled dataset
    /// when storage holds no usable (non-empty) list.
    pub async fn load(storage: Arc<dyn KeyValueStore>, dataset: DatasetClient) -> Result<Self> {
        if let Some(records) = Self::read_persisted(storage.as_ref())? {
            info!(count = records.len(), "Loaded roster from local storage");
            return Ok(Self {
                records,
                storage,
                dataset,
            });
        }

        let records = dataset
            .fetch_bundled()
            .await
            .context("No local roster and the bundled dataset could not be loaded")?;
        let mut store = Self {
            records: Vec::new(),
            storage,
            dataset,
        };
        store.commit(records)?;
        info!(count = store.records.len(), "Bootstrapped roster from bundled dataset");
        Ok(store)
    }

    fn read_persisted(storage: &dyn KeyValueStore) -> Result<Option<Vec<Person>>> {
        let Some(raw) = storage.get(STORAGE_KEY)? else {
            return Ok(None);
        };
        match serde_json::from_str::<Vec<Person>>(&raw) {
            Ok(records) if !records.is_empty() => Ok(Some(records)),
            Ok(_) => Ok(None),
            Err(e) => {
                warn!(error = %e, "Ignoring unreadable stored roster");
                Ok(None)
            }
        }
    }

    pub fn records(&self) -> &[Person] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Person> {
        self.records.get(index)
    }

    /// Position of the record with this (already normalized) DNI.
    pub fn position_of(&self, id: &str) -> Option<usize> {
        self.records.iter().position(|p| p.id == id)
    }

    pub fn count_owing(&self) -> usize {
        self.records.iter().filter(|p| p.status.is_owing()).count()
    }

    /// Records matching `query` on DNI, first or last name, case-insensitively,
    /// paired with their position in the roster. A blank query matches everything.
    pub fn search(&self, query: &str) -> Vec<(usize, &Person)> {
        let query = query.trim().to_lowercase();
        self.records
            .iter()
            .enumerate()
            .filter(|(_, person)| query.is_empty() || person.matches(&query))
            .collect()
    }

    /// Write the current list to storage.
    pub fn save(&self) -> Result<()> {
        self.persist(&self.records)
    }

    fn persist(&self, records: &[Person]) -> Result<()> {
        let json = serde_json::to_string(records)?;
        self.storage
            .set(STORAGE_KEY, &json)
            .context("Failed to persist roster")
    }

    fn commit(&mut self, records: Vec<Person>) -> Result<&[Person]> {
        self.persist(&records)?;
        self.records = records;
        Ok(&self.records)
    }

    fn check_index(&self, index: usize) -> Result<()> {
        if index >= self.records.len() {
            return Err(RosterError::IndexOutOfRange {
                index,
                len: self.records.len(),
            }
            .into());
        }
        Ok(())
    }

    pub fn add(&mut self, person: Person) -> Result<&[Person]> {
        debug!(id = %person.id, "Adding record");
        let mut next = self.records.clone();
        next.push(person);
        self.commit(next)
    }

    pub fn replace_at(&mut self, index: usize, person: Person) -> Result<&[Person]> {
        self.check_index(index)?;
        debug!(index = index, id = %person.id, "Replacing record");
        let mut next = self.records.clone();
        next[index] = person;
        self.commit(next)
    }

    pub fn remove_at(&mut self, index: usize) -> Result<&[Person]> {
        self.check_index(index)?;
        debug!(index = index, "Removing record");
        let mut next = self.records.clone();
        next.remove(index);
        self.commit(next)
    }

    pub fn toggle_status(&mut self, index: usize) -> Result<&[Person]> {
        self.check_index(index)?;
        let mut next = self.records.clone();
        next[index].status = next[index].status.toggled();
        debug!(index = index, status = %next[index].status, "Toggled status");
        self.commit(next)
    }

    /// Bulk-replace the whole roster.
    pub fn replace_all(&mut self, records: Vec<Person>) -> Result<&[Person]> {
        self.commit(records)
    }

    /// Parse `payload` and replace the roster with it. On any error the roster
    /// and its stored copy are untouched.
    pub fn import(&mut self, payload: &str, format: ImportFormat) -> Result<&[Person]> {
        let records = import::parse(payload, format)?;
        info!(count = records.len(), format = ?format, "Importing roster");
        self.replace_all(records)
    }

    /// Replace the roster with a fresh copy of the bundled dataset.
    pub async fn reset_to_bundled(&mut self) -> Result<&[Person]> {
        let records = self
            .dataset
            .fetch_fresh()
            .await
            .context("Could not restore the bundled roster")?;
        info!(count = records.len(), "Restoring bundled roster");
        self.replace_all(records)
    }

    /// Add or edit a single record from form input.
    ///
    /// Adding a DNI that already exists calls `confirm_overwrite` with the
    /// existing record; declining returns [`UpsertOutcome::Declined`] and
    /// changes nothing. Edits never ask.
    pub fn upsert(
        &mut self,
        draft: &PersonDraft,
        target: UpsertTarget,
        confirm_overwrite: impl FnOnce(&Person) -> bool,
    ) -> Result<UpsertOutcome> {
        let person = draft.validate()?;

        match target {
            UpsertTarget::Existing(index) => {
                self.replace_at(index, person)?;
                Ok(UpsertOutcome::Updated(index))
            }
            UpsertTarget::New => match self.position_of(&person.id) {
                Some(index) => {
                    if !confirm_overwrite(&self.records[index]) {
                        debug!(id = %person.id, "Overwrite declined");
                        return Ok(UpsertOutcome::Declined);
                    }
                    self.replace_at(index, person)?;
                    Ok(UpsertOutcome::Replaced(index))
                }
                None => {
                    self.add(person)?;
                    Ok(UpsertOutcome::Added(self.records.len() - 1))
                }
            },
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

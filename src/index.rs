//! Index Manager.
//!
//! Maintains named secondary indices mapping a field value to the locator
//! (key or array index) within a configured collection path (spec.md
//! §4.8). Generalizes the teacher's `BTreeMap<String, CommandPos>` (mapping
//! a key to a byte-range locator in a log file, `engine/kvs.rs`) into a
//! mapping from an indexed field's value to a locator within a JSON
//! collection.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::document;
use crate::error::{Error, Result};
use crate::mutation::Mutation;
use crate::path::{self, Path};

#[derive(Debug, Clone)]
pub struct IndexDefinition {
    pub name: String,
    pub collection_path: Path,
    pub field: String,
    pub unique: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    Array(usize),
    Key(String),
}

impl Locator {
    /// Builds the locator for `key` inside `collection`: an array index when
    /// `collection` is an array, a bare key otherwise. A numeric-looking
    /// object key (e.g. a user id `"5"`) must stay a `Key`, not be guessed
    /// into an `Array` locator from its shape alone — the collection's
    /// actual type at this path is the only thing that can disambiguate.
    fn in_collection(collection: &Value, key: &str) -> Locator {
        match collection {
            Value::Array(_) => match key.parse::<usize>() {
                Ok(i) if i.to_string() == key => Locator::Array(i),
                _ => Locator::Key(key.to_string()),
            },
            _ => Locator::Key(key.to_string()),
        }
    }
}

/// Serializes a scalar field value into a canonical map key. Returns `None`
/// for absent or null values, which are skipped per spec.md §4.8.
fn field_key(value: Option<&Value>) -> Option<String> {
    match value {
        None | Some(Value::Null) => None,
        Some(v) => serde_json::to_string(v).ok(),
    }
}

#[derive(Debug, Default, Clone)]
struct IndexState {
    map: BTreeMap<String, Locator>,
}

#[derive(Clone)]
pub struct IndexManager {
    defs: Vec<IndexDefinition>,
    states: Vec<IndexState>,
}

/// What `on_mutation` intends to do to one index, computed against a
/// scratch copy before anything is committed (spec.md §4.11's two-phase
/// apply: validate intended updates on a scratch mapping, then commit
/// together).
pub enum Plan {
    Rebuild(IndexState),
    Update {
        remove: Option<String>,
        insert: Option<(String, Locator)>,
    },
    NoOp,
}

impl IndexManager {
    pub fn new(defs: Vec<IndexDefinition>) -> Self {
        let states = defs.iter().map(|_| IndexState::default()).collect();
        IndexManager { defs, states }
    }

    pub fn definitions(&self) -> &[IndexDefinition] {
        &self.defs
    }

    /// Rebuilds every configured index from `doc` (spec.md §4.9 step 4,
    /// §4.8 "Rebuild"). A duplicate value in a unique index during rebuild
    /// is a hard error.
    pub fn rebuild_all(&mut self, doc: &Value) -> Result<()> {
        let mut rebuilt = Vec::with_capacity(self.defs.len());
        for def in &self.defs {
            rebuilt.push(rebuild_one(def, doc)?);
        }
        self.states = rebuilt;
        Ok(())
    }

    /// Finds the element at `locator`'s stored position for index `name`.
    pub fn find_by_index<'a>(&self, doc: &'a Value, name: &str, value: &Value) -> Option<&'a Value> {
        let pos = self.defs.iter().position(|d| d.name == name)?;
        let key = field_key(Some(value))?;
        let locator = self.states[pos].map.get(&key)?;
        let def = &self.defs[pos];
        let collection = path::get(doc, &def.collection_path)?;
        locate(collection, locator)
    }

    /// Computes, without mutating any index, the plan each configured index
    /// would need in response to `mutation` being applied to `candidate_doc`
    /// (which already reflects the mutation). `old_doc` is the document
    /// before the mutation. Returns `Err(UniqueIndexViolation)` without
    /// mutating anything if a unique constraint would be broken.
    pub fn plan_update(
        &self,
        old_doc: &Value,
        candidate_doc: &Value,
        mutation: &Mutation,
    ) -> Result<Vec<Plan>> {
        let mutation_path = mutation.path();
        let mut plans = Vec::with_capacity(self.defs.len());
        for (def, state) in self.defs.iter().zip(self.states.iter()) {
            plans.push(self.plan_for(def, state, old_doc, candidate_doc, mutation, &mutation_path)?);
        }
        Ok(plans)
    }

    fn plan_for(
        &self,
        def: &IndexDefinition,
        state: &IndexState,
        old_doc: &Value,
        candidate_doc: &Value,
        mutation: &Mutation,
        mutation_path: &Path,
    ) -> Result<Plan> {
        let collection_segments = def.collection_path.segments();
        let mutation_segments = mutation_path.segments();

        if mutation_segments == collection_segments {
            return Ok(Plan::Rebuild(rebuild_one(def, candidate_doc)?));
        }

        if mutation_segments.len() <= collection_segments.len()
            || mutation_segments[..collection_segments.len()] != *collection_segments
        {
            return Ok(Plan::NoOp);
        }

        let element_key = mutation_segments[collection_segments.len()].clone();
        let element_path = def.collection_path.join(element_key.clone());
        // Whichever side of the mutation still has the collection tells us
        // whether it's an array or an object; both sides agree on the
        // collection's type except across a create/delete-of-collection
        // mutation, which is handled by the `Rebuild` branch above.
        let collection = path::get(old_doc, &def.collection_path)
            .or_else(|| path::get(candidate_doc, &def.collection_path));

        // Deleting a whole element out of an array collection shifts every
        // locator after it, not just the deleted entry's — a pointwise
        // remove/insert can't express that, so the index needs a full
        // rebuild. A delete deeper than the element itself (a sub-field) or
        // a delete from an object collection (keys don't shift) falls
        // through to the generic handling below.
        let is_direct_element_mutation = mutation_segments.len() == collection_segments.len() + 1;
        if let Mutation::Delete { .. } = mutation {
            if is_direct_element_mutation && matches!(collection, Some(Value::Array(_))) {
                return Ok(Plan::Rebuild(rebuild_one(def, candidate_doc)?));
            }

            let locator = match collection {
                Some(c) => Locator::in_collection(c, &element_key),
                None => Locator::Key(element_key.clone()),
            };
            let old_value = path::get(old_doc, &element_path)
                .and_then(|elem| elem.get(def.field.as_str()))
                .cloned();
            let old_key = field_key(old_value.as_ref());
            let remove = match &old_key {
                Some(k) if state.map.get(k) == Some(&locator) => Some(k.clone()),
                _ => None,
            };
            return Ok(match remove {
                Some(_) => Plan::Update { remove, insert: None },
                None => Plan::NoOp,
            });
        }

        let locator = match collection {
            Some(collection) => Locator::in_collection(collection, &element_key),
            None => Locator::Key(element_key.clone()),
        };

        let old_value = path::get(old_doc, &element_path)
            .and_then(|elem| elem.get(def.field.as_str()))
            .cloned();
        let new_value = path::get(candidate_doc, &element_path)
            .and_then(|elem| elem.get(def.field.as_str()))
            .cloned();

        let old_key = field_key(old_value.as_ref());
        let new_key = field_key(new_value.as_ref());

        let remove = match &old_key {
            Some(k) if state.map.get(k) == Some(&locator) => Some(k.clone()),
            _ => None,
        };

        if let Some(new_k) = &new_key {
            if def.unique {
                if let Some(existing) = state.map.get(new_k) {
                    if *existing != locator {
                        return Err(Error::UniqueIndexViolation {
                            index_name: def.name.clone(),
                            value: new_value.clone().unwrap_or(Value::Null),
                        });
                    }
                }
            }
        }

        let insert = new_key.map(|k| (k, locator));
        if remove.is_none() && insert.is_none() {
            Ok(Plan::NoOp)
        } else {
            Ok(Plan::Update { remove, insert })
        }
    }

    /// Commits a plan previously produced by `plan_update`. Must only be
    /// called after the document mutation itself has been committed.
    pub fn commit_plan(&mut self, plans: Vec<Plan>) {
        for (state, plan) in self.states.iter_mut().zip(plans.into_iter()) {
            match plan {
                Plan::Rebuild(new_state) => *state = new_state,
                Plan::Update { remove, insert } => {
                    if let Some(k) = remove {
                        state.map.remove(&k);
                    }
                    if let Some((k, locator)) = insert {
                        state.map.insert(k, locator);
                    }
                }
                Plan::NoOp => {}
            }
        }
    }
}

fn rebuild_one(def: &IndexDefinition, doc: &Value) -> Result<IndexState> {
    let mut state = IndexState::default();
    let Some(collection) = path::get(doc, &def.collection_path) else {
        return Ok(state);
    };
    for (locator_key, element) in document::iter_collection(collection) {
        let Some(value) = element.get(def.field.as_str()) else {
            continue;
        };
        let Some(key) = field_key(Some(value)) else {
            continue;
        };
        let locator = Locator::in_collection(collection, &locator_key);
        if def.unique {
            if let Some(existing) = state.map.get(&key) {
                if *existing != locator {
                    return Err(Error::UniqueIndexViolation {
                        index_name: def.name.clone(),
                        value: value.clone(),
                    });
                }
            }
        }
        state.map.insert(key, locator);
    }
    Ok(state)
}

fn locate<'a>(collection: &'a Value, locator: &Locator) -> Option<&'a Value> {
    match (collection, locator) {
        (Value::Array(items), Locator::Array(i)) => items.get(*i),
        (Value::Object(map), Locator::Key(k)) => map.get(k),
        _ => None,
    }
}

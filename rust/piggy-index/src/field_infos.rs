//! Field name to field number assignment shared by all writers.

use std::sync::atomic::{AtomicU32, Ordering};

use ahash::AHashMap;
use dashmap::DashMap;

/// Process-wide map of field names to stable numbers.
///
/// Numbers start at 1 and are never reassigned: once a name has a number, every
/// later lookup from any thread returns the same one.
#[derive(Default)]
pub struct FieldNumbers {
    by_name: DashMap<String, u32>,
    by_number: DashMap<u32, String>,
    last_number: AtomicU32,
}

impl FieldNumbers {
    pub fn new() -> FieldNumbers {
        Default::default()
    }

    /// Returns the number of `name`, assigning the next free one on first sight.
    pub fn add_or_get(&self, name: &str) -> u32 {
        if let Some(number) = self.by_name.get(name) {
            return *number;
        }
        *self.by_name.entry(name.to_string()).or_insert_with(|| {
            let number = self.last_number.fetch_add(1, Ordering::Relaxed) + 1;
            self.by_number.insert(number, name.to_string());
            tracing::debug!(field = name, number, "assigned field number");
            number
        })
    }

    pub fn get(&self, name: &str) -> Option<u32> {
        self.by_name.get(name).map(|number| *number)
    }

    pub fn name(&self, number: u32) -> Option<String> {
        self.by_number.get(&number).map(|name| name.clone())
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    /// All known fields, ordered by number.
    pub fn snapshot(&self) -> Vec<(u32, String)> {
        let mut fields = self
            .by_number
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect::<Vec<_>>();
        fields.sort_unstable_by_key(|(number, _)| *number);
        fields
    }
}

/// Writer-local memo of resolved field numbers.
#[derive(Default)]
pub struct FieldNumberCache {
    numbers: AHashMap<String, u32>,
}

impl FieldNumberCache {
    pub fn resolve(&mut self, name: &str, field_numbers: &FieldNumbers) -> u32 {
        if let Some(&number) = self.numbers.get(name) {
            return number;
        }
        let number = field_numbers.add_or_get(name);
        self.numbers.insert(name.to_string(), number);
        number
    }

    pub fn len(&self) -> usize {
        self.numbers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.numbers.is_empty()
    }
}

//! Process-wide category table.
//!
//! Categories are a second axis of classification next to levels: a logger
//! tagged with category `id` only emits events at or above that category's
//! level. The table has one slot per possible id, so an id can never be out
//! of range.

use std::sync::Arc;

use lazy_static::lazy_static;
use parking_lot::{RwLock, RwLockWriteGuard};

use crate::level::Level;

/// Number of category slots, one per `u8` value.
pub const CATEGORY_COUNT: usize = 256;

#[derive(Clone)]
struct Entry {
    name: Option<Arc<str>>,
    level: Level,
}

impl Default for Entry {
    fn default() -> Self {
        Entry {
            name: None,
            level: Level::Trace,
        }
    }
}

type Table = Vec<Entry>;

lazy_static! {
    static ref CATEGORIES: RwLock<Table> = RwLock::new(vec![Entry::default(); CATEGORY_COUNT]);
}

/// Names category `id` and sets its minimum level.
pub fn set_category(id: u8, name: &str, level: Level) {
    lock_categories().set(id, name, level);
}

/// Sets the minimum level of category `id`, keeping its name.
pub fn set_category_level(id: u8, level: Level) {
    lock_categories().set_level(id, level);
}

/// Level threshold and name of category `id`.
pub(crate) fn lookup(id: u8) -> (Level, Option<Arc<str>>) {
    let table = CATEGORIES.read();
    let entry = &table[usize::from(id)];
    (entry.level, entry.name.clone())
}

/// Minimum level of category `id`.
pub fn category_level(id: u8) -> Level {
    CATEGORIES.read()[usize::from(id)].level
}

/// Restores every category to unnamed with level `Trace`.
pub fn reset_categories() {
    let mut guard = lock_categories();
    for id in 0..=u8::MAX {
        guard.reset(id);
    }
}

/// Takes the table's write lock for a batch of updates.
///
/// Loggers checking a category block until the guard is dropped, so a batch
/// is observed all at once.
///
/// ```
/// use record_logger::{lock_categories, Level};
///
/// let mut categories = lock_categories();
/// categories.set(1, "db", Level::Warn);
/// categories.set(2, "http", Level::Info);
/// drop(categories);
/// ```
pub fn lock_categories() -> CategoryGuard<'static> {
    CategoryGuard {
        table: CATEGORIES.write(),
    }
}

/// Exclusive access to the category table. See [`lock_categories`].
pub struct CategoryGuard<'a> {
    table: RwLockWriteGuard<'a, Table>,
}

impl CategoryGuard<'_> {
    pub fn set(&mut self, id: u8, name: &str, level: Level) {
        tracing::debug!(id, name, %level, "category set");
        self.table[usize::from(id)] = Entry {
            name: Some(Arc::from(name)),
            level,
        };
    }

    pub fn set_level(&mut self, id: u8, level: Level) {
        tracing::debug!(id, %level, "category level set");
        self.table[usize::from(id)].level = level;
    }

    fn reset(&mut self, id: u8) {
        self.table[usize::from(id)] = Entry::default();
    }
}

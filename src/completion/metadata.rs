/*!
 * Keyword index
 *
 * Snapshot of everything the completer can offer, and the shared handle that
 * swaps in a fresh snapshot whenever the current database changes:
 * - language reserved words and shell keywords (built in)
 * - schema names
 * - table and column names of the current database
 * - qualified `table.column` names
 */

use crate::database::DataApi;
use parking_lot::RwLock;
use sqlparser::keywords::ALL_KEYWORDS;
use std::collections::BTreeSet;
use std::ops::Bound;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Words the shell itself understands, offered as the first token of a line.
/// Backslash forms (`\q`, `\h`) are left out since `\` lines are never completed.
const REPL_KEYWORDS: &[&str] = &["use", "begin", "commit", "rollback", "exit", "quit", "help"];

/// One immutable snapshot of completable words.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct KeywordIndex {
    pub language_keywords: BTreeSet<String>,
    pub repl_keywords: BTreeSet<String>,
    pub schema_names: BTreeSet<String>,
    pub object_names: BTreeSet<String>,
    pub object_dot_names: BTreeSet<String>,
}

impl KeywordIndex {
    /// Index holding only the built-in words.
    pub fn builtin() -> Self {
        let mut index = Self::default();

        for keyword in ALL_KEYWORDS {
            index.language_keywords.insert(keyword.to_lowercase());
            index.language_keywords.insert(keyword.to_uppercase());
        }

        for keyword in REPL_KEYWORDS {
            index.repl_keywords.insert(keyword.to_string());
            index.repl_keywords.insert(keyword.to_uppercase());
        }

        index
    }

    /// Every member of `set` starting with `prefix` (case-sensitive).
    pub fn prefixed<'a>(
        set: &'a BTreeSet<String>,
        prefix: &'a str,
    ) -> impl Iterator<Item = &'a String> + 'a {
        set.range::<str, _>((Bound::Included(prefix), Bound::Unbounded))
            .take_while(move |candidate| candidate.starts_with(prefix))
    }
}

/// Build a snapshot from backend metadata.
///
/// Never fails: every listing that errors is logged and skipped, which only
/// narrows what completion can offer.
pub async fn fetch_keywords(api: &dyn DataApi, database: Option<&str>) -> KeywordIndex {
    let mut index = KeywordIndex::builtin();

    match api.list_schemas().await {
        Ok(schemas) => index.schema_names.extend(schemas),
        Err(e) => warn!("Failed to query for schemas, autocomplete will be limited ({})", e),
    }

    let Some(database) = database else {
        return index;
    };

    let tables = match api.list_tables(database).await {
        Ok(tables) => tables,
        Err(e) => {
            warn!("Failed to query for tables, autocomplete will be limited ({})", e);
            Vec::new()
        }
    };

    for table in &tables {
        index.object_names.insert(table.clone());

        match api.list_columns(database, table).await {
            Ok(columns) => {
                for column in columns {
                    index.object_dot_names.insert(format!("{}.{}", table, column));
                    index.object_names.insert(column);
                }
            }
            Err(e) => warn!(
                "Failed to query for columns from table '{}', autocomplete will be limited ({})",
                table, e
            ),
        }
    }

    debug!(
        database,
        schemas = index.schema_names.len(),
        objects = index.object_names.len(),
        "keyword index built"
    );

    index
}

/// Shared handle to the latest keyword snapshot.
///
/// Readers clone the current `Arc` and never see a half-built index. A rebuild
/// only publishes if no newer rebuild was started after it.
#[derive(Clone)]
pub struct KeywordStore {
    current: Arc<RwLock<Arc<KeywordIndex>>>,
    generation: Arc<AtomicU64>,
}

impl KeywordStore {
    pub fn new() -> Self {
        Self::with_index(KeywordIndex::builtin())
    }

    pub fn with_index(index: KeywordIndex) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(index))),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn snapshot(&self) -> Arc<KeywordIndex> {
        self.current.read().clone()
    }

    /// Start a rebuild and return its generation.
    pub fn begin_refresh(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Swap in `index` unless a newer rebuild has started since `generation`.
    pub fn publish(&self, generation: u64, index: KeywordIndex) -> bool {
        let mut current = self.current.write();
        if self.generation.load(Ordering::SeqCst) != generation {
            debug!(generation, "discarding stale keyword index");
            return false;
        }
        *current = Arc::new(index);
        true
    }

    /// Rebuild for `database` and publish the result.
    pub async fn refresh(&self, api: Arc<dyn DataApi>, database: Option<String>) -> bool {
        let generation = self.begin_refresh();
        let index = fetch_keywords(api.as_ref(), database.as_deref()).await;
        self.publish(generation, index)
    }

    /// Rebuild in the background; callers do not wait for it.
    pub fn spawn_refresh(&self, api: Arc<dyn DataApi>, database: Option<String>) {
        let store = self.clone();
        let generation = self.begin_refresh();
        tokio::spawn(async move {
            let index = fetch_keywords(api.as_ref(), database.as_deref()).await;
            store.publish(generation, index);
        });
    }
}

impl Default for KeywordStore {
    fn default() -> Self {
        Self::new()
    }
}

/*!
 * adasql - Tab completion module
 *
 * Provides line completion that never waits on the backend:
 * - SQL reserved words and shell keywords
 * - Schema, table and column names of the current database
 * - Qualified `table.column` names and quoted identifiers
 */

pub mod engine;
pub mod helper;
pub mod metadata;

// Re-export main interfaces
pub use helper::AdaSqlHelper;
pub use metadata::KeywordStore;

/*!
 * Statement handling
 *
 * Raw input is cut into statements by the segmenter, queued, and run one at
 * a time by the executor, which owns the database and transaction state.
 */

pub mod format;
pub mod patterns;
pub mod query;
pub mod segmenter;
pub mod transaction;

pub use format::render_outcome;
pub use query::{FailurePolicy, QueryExecutor, QueryQueue, QueueExit};
pub use segmenter::Segmenter;
pub use transaction::SessionState;

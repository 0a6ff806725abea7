/*!
 * Data API access
 *
 * The backend seam used by the execution queue and the keyword index,
 * its RDS Data API implementation, and hydration of result values.
 */

pub mod connection;
pub mod error;
pub mod value;

#[cfg(test)]
pub mod testing;

pub use connection::{DataApi, ExecuteRequest, RdsDataClient};
pub use error::{DataApiError, HydrationError};
pub use value::{hydrate_records, HydratedRow};

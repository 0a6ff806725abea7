use super::error::{DataApiError, HydrationError};
use super::value::{ColumnDescriptor, Field};
use async_trait::async_trait;
use aws_sdk_rdsdata::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_rdsdata::types::Field as WireField;
use tracing::debug;

/// Parameters of one `ExecuteStatement` call.
#[derive(Clone, Copy, Debug, Default)]
pub struct ExecuteRequest<'a> {
    pub sql: &'a str,
    pub database: Option<&'a str>,
    pub transaction_id: Option<&'a str>,
    pub include_result_metadata: bool,
}

impl<'a> ExecuteRequest<'a> {
    pub fn new(sql: &'a str) -> Self {
        Self {
            sql,
            ..Default::default()
        }
    }

    pub fn database(mut self, database: Option<&'a str>) -> Self {
        self.database = database;
        self
    }

    pub fn transaction(mut self, transaction_id: Option<&'a str>) -> Self {
        self.transaction_id = transaction_id;
        self
    }

    pub fn with_metadata(mut self) -> Self {
        self.include_result_metadata = true;
        self
    }
}

/// Decoded `ExecuteStatement` response.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ExecuteOutput {
    /// Present when the statement produced a result set.
    pub records: Option<Vec<Vec<Field>>>,
    pub column_metadata: Vec<ColumnDescriptor>,
    pub number_of_records_updated: Option<i64>,
}

impl ExecuteOutput {
    /// String values of the first column, as returned by the `SHOW ...` listings.
    pub fn first_column(&self) -> Vec<String> {
        self.records
            .iter()
            .flatten()
            .filter_map(|record| match record.first() {
                Some(Field::String(s)) => Some(s.clone()),
                _ => None,
            })
            .collect()
    }
}

/// The request/response surface of the Data API, invoked once per statement.
#[async_trait]
pub trait DataApi: Send + Sync {
    async fn execute_statement(
        &self,
        request: ExecuteRequest<'_>,
    ) -> Result<ExecuteOutput, DataApiError>;

    async fn begin_transaction(&self, database: Option<&str>) -> Result<String, DataApiError>;

    async fn commit_transaction(&self, transaction_id: &str) -> Result<(), DataApiError>;

    async fn rollback_transaction(&self, transaction_id: &str) -> Result<(), DataApiError>;

    async fn list_schemas(&self) -> Result<Vec<String>, DataApiError> {
        let output = self
            .execute_statement(ExecuteRequest::new("show schemas"))
            .await?;
        Ok(output.first_column())
    }

    async fn list_tables(&self, database: &str) -> Result<Vec<String>, DataApiError> {
        let output = self
            .execute_statement(ExecuteRequest::new("show tables").database(Some(database)))
            .await?;
        Ok(output.first_column())
    }

    async fn list_columns(&self, database: &str, table: &str) -> Result<Vec<String>, DataApiError> {
        let sql = format!("show columns from `{}`", table.replace('`', "``"));
        let output = self
            .execute_statement(ExecuteRequest::new(&sql).database(Some(database)))
            .await?;
        Ok(output.first_column())
    }
}

/// Data API backend for one Aurora cluster, authenticated through a Secrets Manager secret.
pub struct RdsDataClient {
    client: aws_sdk_rdsdata::Client,
    resource_arn: String,
    secret_arn: String,
}

impl RdsDataClient {
    pub fn new(config: &aws_config::SdkConfig, resource_arn: String, secret_arn: String) -> Self {
        Self {
            client: aws_sdk_rdsdata::Client::new(config),
            resource_arn,
            secret_arn,
        }
    }
}

#[async_trait]
impl DataApi for RdsDataClient {
    async fn execute_statement(
        &self,
        request: ExecuteRequest<'_>,
    ) -> Result<ExecuteOutput, DataApiError> {
        debug!(sql = request.sql, database = ?request.database, "execute statement");

        let output = self
            .client
            .execute_statement()
            .resource_arn(&self.resource_arn)
            .secret_arn(&self.secret_arn)
            .sql(request.sql)
            .set_database(request.database.map(str::to_string))
            .set_transaction_id(request.transaction_id.map(str::to_string))
            .include_result_metadata(request.include_result_metadata)
            .send()
            .await
            .map_err(from_sdk)?;

        let records = match output.records {
            Some(records) => Some(
                records
                    .into_iter()
                    .map(|record| {
                        record
                            .into_iter()
                            .map(Field::try_from)
                            .collect::<Result<Vec<_>, _>>()
                    })
                    .collect::<Result<Vec<_>, _>>()?,
            ),
            None => None,
        };

        let column_metadata = output
            .column_metadata
            .unwrap_or_default()
            .iter()
            .map(|column| {
                ColumnDescriptor::new(
                    column.label().or(column.name()).unwrap_or_default(),
                    column.type_name().unwrap_or_default(),
                )
            })
            .collect();

        let number_of_records_updated = match records {
            Some(_) => None,
            None => Some(output.number_of_records_updated),
        };

        Ok(ExecuteOutput {
            records,
            column_metadata,
            number_of_records_updated,
        })
    }

    async fn begin_transaction(&self, database: Option<&str>) -> Result<String, DataApiError> {
        let output = self
            .client
            .begin_transaction()
            .resource_arn(&self.resource_arn)
            .secret_arn(&self.secret_arn)
            .set_database(database.map(str::to_string))
            .send()
            .await
            .map_err(from_sdk)?;

        output
            .transaction_id()
            .map(str::to_string)
            .ok_or(DataApiError::MissingTransactionId)
    }

    async fn commit_transaction(&self, transaction_id: &str) -> Result<(), DataApiError> {
        self.client
            .commit_transaction()
            .resource_arn(&self.resource_arn)
            .secret_arn(&self.secret_arn)
            .transaction_id(transaction_id)
            .send()
            .await
            .map_err(from_sdk)?;
        Ok(())
    }

    async fn rollback_transaction(&self, transaction_id: &str) -> Result<(), DataApiError> {
        self.client
            .rollback_transaction()
            .resource_arn(&self.resource_arn)
            .secret_arn(&self.secret_arn)
            .transaction_id(transaction_id)
            .send()
            .await
            .map_err(from_sdk)?;
        Ok(())
    }
}

impl TryFrom<WireField> for Field {
    type Error = HydrationError;

    fn try_from(field: WireField) -> Result<Self, Self::Error> {
        match field {
            WireField::BlobValue(blob) => Ok(Field::Blob(blob.into_inner())),
            WireField::DoubleValue(d) => Ok(Field::Double(d)),
            WireField::IsNull(_) => Ok(Field::Null),
            WireField::LongValue(l) => Ok(Field::Long(l)),
            WireField::StringValue(s) => Ok(Field::String(s)),
            WireField::BooleanValue(b) => Ok(Field::Boolean(b)),
            WireField::ArrayValue(_) => Err(HydrationError::UnknownValueType("arrayValue".into())),
            _ => Err(HydrationError::UnknownValueType("unknown".into())),
        }
    }
}

fn from_sdk<E, R>(err: SdkError<E, R>) -> DataApiError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    match err {
        SdkError::ServiceError(service) => {
            let err = service.err();
            DataApiError::Service {
                code: err.code().unwrap_or("Unknown").to_string(),
                message: err
                    .message()
                    .map(str::to_string)
                    .unwrap_or_else(|| DisplayErrorContext(err).to_string()),
            }
        }
        other => DataApiError::Transport(DisplayErrorContext(&other).to_string()),
    }
}

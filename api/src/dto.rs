//! Wire shapes for the REST surface. Field names are camelCase on the wire;
//! internal types stay snake_case.

use chrono::DateTime;
use chrono::Utc;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde::Serialize;
use txn_ledger::Page;
use txn_ledger::PageRequest;
use txn_ledger::SearchFilter;
use txn_ledger::SortDirection;
use txn_ledger::Transaction;
use txn_ledger::TransactionStatus;
use txn_ledger::TransactionType;
use uuid::Uuid;

use crate::error::ApiError;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SingleLegPayload {
    pub account_id: String,
    pub amount: Decimal,
    pub currency: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub reference: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferPayload {
    pub from_account_id: String,
    pub to_account_id: String,
    pub amount: Decimal,
    pub currency: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub reference: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReversePayload {
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionResponse {
    pub transaction_id: Uuid,
    pub from_account_id: String,
    pub to_account_id: String,
    pub amount: Decimal,
    pub currency: String,
    pub transaction_type: String,
    pub status: String,
    pub description: Option<String>,
    pub reference: Option<String>,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub reversed_at: Option<DateTime<Utc>>,
    pub created_by: String,
    pub processed_by: Option<String>,
    pub reversed_by: Option<String>,
    pub from_account_balance_before: Option<Decimal>,
    pub from_account_balance_after: Option<Decimal>,
    pub to_account_balance_before: Option<Decimal>,
    pub to_account_balance_after: Option<Decimal>,
    pub original_transaction_id: Option<Uuid>,
    pub reversal_transaction_id: Option<Uuid>,
    pub reversal_reason: Option<String>,
    pub failure_reason: Option<String>,
}

impl From<Transaction> for TransactionResponse {
    fn from(row: Transaction) -> Self {
        Self {
            transaction_id: row.transaction_id,
            from_account_id: row.from_account_id,
            to_account_id: row.to_account_id,
            amount: row.amount,
            currency: row.currency,
            transaction_type: row.transaction_type.to_string(),
            status: row.status.to_string(),
            description: row.description,
            reference: row.reference,
            created_at: row.created_at,
            processed_at: row.processed_at,
            reversed_at: row.reversed_at,
            created_by: row.created_by,
            processed_by: row.processed_by,
            reversed_by: row.reversed_by,
            from_account_balance_before: row.from_account_balance_before,
            from_account_balance_after: row.from_account_balance_after,
            to_account_balance_before: row.to_account_balance_before,
            to_account_balance_after: row.to_account_balance_after,
            original_transaction_id: row.original_transaction_id,
            reversal_transaction_id: row.reversal_transaction_id,
            reversal_reason: row.reversal_reason,
            failure_reason: row.failure_reason,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageResponse<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub size: u32,
    pub total_elements: u64,
}

pub fn transaction_page_response(page: Page<Transaction>) -> PageResponse<TransactionResponse> {
    PageResponse {
        items: page.items.into_iter().map(TransactionResponse::from).collect(),
        page: page.page,
        size: page.size,
        total_elements: page.total_elements,
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageQuery {
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub size: Option<u32>,
    #[serde(default)]
    pub sort: Option<String>,
}

impl PageQuery {
    pub fn into_page_request(self) -> Result<PageRequest, ApiError> {
        let default = PageRequest::default();
        Ok(PageRequest {
            page: self.page.unwrap_or(default.page),
            size: self.size.unwrap_or(default.size),
            sort: match self.sort.as_deref() {
                None => default.sort,
                Some("asc") | Some("ASC") => SortDirection::Ascending,
                Some("desc") | Some("DESC") => SortDirection::Descending,
                Some(other) => return Err(ApiError::Validation(format!("unknown sort direction: {other}"))),
            },
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchQuery {
    #[serde(default)]
    pub account_id: Option<String>,
    #[serde(default)]
    pub transaction_type: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub created_after: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created_before: Option<DateTime<Utc>>,
    #[serde(default)]
    pub min_amount: Option<Decimal>,
    #[serde(default)]
    pub max_amount: Option<Decimal>,
    #[serde(default)]
    pub description_contains: Option<String>,
    #[serde(default)]
    pub reference_contains: Option<String>,
    #[serde(default)]
    pub created_by: Option<String>,
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub size: Option<u32>,
    #[serde(default)]
    pub sort: Option<String>,
}

impl SearchQuery {
    pub fn into_filter_and_page(self) -> Result<(SearchFilter, PageRequest), ApiError> {
        let transaction_type = self
            .transaction_type
            .map(|raw| parse_transaction_type(&raw))
            .transpose()?;
        let status = self.status.map(|raw| parse_transaction_status(&raw)).transpose()?;
        let page = PageQuery {
            page: self.page,
            size: self.size,
            sort: self.sort,
        }
        .into_page_request()?;
        Ok((
            SearchFilter {
                account_id: self.account_id,
                transaction_type,
                status,
                created_after: self.created_after,
                created_before: self.created_before,
                min_amount: self.min_amount,
                max_amount: self.max_amount,
                description_contains: self.description_contains,
                reference_contains: self.reference_contains,
                created_by: self.created_by,
            },
            page,
        ))
    }
}

fn parse_transaction_type(raw: &str) -> Result<TransactionType, ApiError> {
    match raw.to_ascii_uppercase().as_str() {
        "DEPOSIT" => Ok(TransactionType::Deposit),
        "WITHDRAWAL" => Ok(TransactionType::Withdrawal),
        "TRANSFER" => Ok(TransactionType::Transfer),
        "REVERSAL" => Ok(TransactionType::Reversal),
        other => Err(ApiError::Validation(format!("unknown transaction type: {other}"))),
    }
}

fn parse_transaction_status(raw: &str) -> Result<TransactionStatus, ApiError> {
    match raw.to_ascii_uppercase().as_str() {
        "PROCESSING" => Ok(TransactionStatus::Processing),
        "COMPLETED" => Ok(TransactionStatus::Completed),
        "FAILED" => Ok(TransactionStatus::Failed),
        "REVERSED" => Ok(TransactionStatus::Reversed),
        other => Err(ApiError::Validation(format!("unknown transaction status: {other}"))),
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsQuery {
    #[serde(default)]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_date: Option<DateTime<Utc>>,
}

impl StatsQuery {
    /// Missing `startDate` defaults to 30 days before now; missing `endDate` defaults to now.
    pub fn into_range(self) -> (DateTime<Utc>, DateTime<Utc>) {
        let now = Utc::now();
        let start = self.start_date.unwrap_or_else(|| now - chrono::Duration::days(30));
        let end = self.end_date.unwrap_or(now);
        (start, end)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IsReversedResponse {
    pub is_reversed: bool,
}

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::lifecycle::Status;

/// Full document as returned by the document-fetch API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: String,
    #[serde(default)]
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
    #[serde(default, alias = "uploadDate", skip_serializing_if = "Option::is_none")]
    pub upload_date: Option<String>,
    #[serde(default, alias = "balanceDate", skip_serializing_if = "Option::is_none")]
    pub balance_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<Validation>,
    #[serde(default, alias = "aiReport", skip_serializing_if = "Option::is_none")]
    pub ai_report: Option<Value>,
    #[serde(default, alias = "errorMessage", skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, alias = "companyInfo", skip_serializing_if = "Option::is_none")]
    pub company_info: Option<CompanyInfo>,
    #[serde(default, alias = "pageCount", skip_serializing_if = "Option::is_none")]
    pub page_count: Option<u32>,
    #[serde(default, alias = "processingTime", skip_serializing_if = "Option::is_none")]
    pub processing_time: Option<ProcessingTime>,
    /// Fields the push protocol never carries (file name, owner, ...).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl DocumentRecord {
    pub fn new(id: impl Into<String>, status: impl Into<Status>) -> Self {
        DocumentRecord {
            id: id.into(),
            status: status.into(),
            progress: None,
            upload_date: None,
            balance_date: None,
            validation: None,
            ai_report: None,
            error_message: None,
            company_info: None,
            page_count: None,
            processing_time: None,
            extra: Map::new(),
        }
    }

    pub fn company_name(&self) -> Option<&str> {
        self.company_info.as_ref()?.company_name.as_deref()
    }

    pub fn file_name(&self) -> Option<&str> {
        self.extra.get("file_name").and_then(Value::as_str)
    }

    pub fn has_report(&self) -> bool {
        self.ai_report.is_some()
    }
}

/// Push-delivered record asserting a subset of [`DocumentRecord`] fields.
///
/// `None` means "not asserted". For fields the wire contract types as
/// `number|null`, a present `null` arrives as `Some(None)` and does clear.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PartialUpdate {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<Status>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub progress: Option<Option<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub balance_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<Validation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_report: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_info: Option<CompanyInfo>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub page_count: Option<Option<u32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_time: Option<ProcessingTimePatch>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PartialUpdate {
    pub fn new(id: impl Into<String>) -> Self {
        PartialUpdate {
            id: id.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validation {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub message: Vec<String>,
}

/// Populated progressively as extraction runs; every field is optional in
/// both snapshots and pushes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_cuit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_activity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_address: Option<String>,
}

/// Per-stage durations in seconds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessingTime {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload_convert: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recognize: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extract: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessingTimePatch {
    #[serde(default, deserialize_with = "double_option", skip_serializing_if = "Option::is_none")]
    pub upload_convert: Option<Option<f64>>,
    #[serde(default, deserialize_with = "double_option", skip_serializing_if = "Option::is_none")]
    pub recognize: Option<Option<f64>>,
    #[serde(default, deserialize_with = "double_option", skip_serializing_if = "Option::is_none")]
    pub extract: Option<Option<f64>>,
    #[serde(default, deserialize_with = "double_option", skip_serializing_if = "Option::is_none")]
    pub validation: Option<Option<f64>>,
    #[serde(default, deserialize_with = "double_option", skip_serializing_if = "Option::is_none")]
    pub total: Option<Option<f64>>,
}

/// One page of the document list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentPage {
    pub items: Vec<DocumentRecord>,
    #[serde(default)]
    pub total: u64,
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default)]
    pub page_size: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn as_str(self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }
}

/// List view query: pagination, filter and sort. Preserved across soft
/// refreshes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ListQuery {
    pub page: u32,
    pub page_size: u32,
    pub search: Option<String>,
    pub status: Option<String>,
    pub sort_by: Option<String>,
    pub sort_order: SortOrder,
}

impl Default for ListQuery {
    fn default() -> Self {
        ListQuery {
            page: 1,
            page_size: 10,
            search: None,
            status: None,
            sort_by: Some("upload_date".to_string()),
            sort_order: SortOrder::Desc,
        }
    }
}

impl ListQuery {
    pub fn to_params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("page", self.page.to_string()),
            ("page_size", self.page_size.to_string()),
        ];
        if let Some(search) = self.search.as_ref().filter(|s| !s.trim().is_empty()) {
            params.push(("search", search.trim().to_string()));
        }
        if let Some(status) = &self.status {
            params.push(("status", status.clone()));
        }
        if let Some(sort_by) = &self.sort_by {
            params.push(("sort_by", sort_by.clone()));
            params.push(("sort_order", self.sort_order.as_str().to_string()));
        }
        params
    }
}

fn default_page() -> u32 {
    1
}

/// Distinguishes an absent field (`None`) from an explicit `null`
/// (`Some(None)`).
fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::LifecycleState;

    #[test]
    fn record_accepts_camel_case_and_keeps_unknown_fields() {
        let json = r#"{
            "id": "doc1",
            "status": "Analizando",
            "companyInfo": {"company_name": "Acme"},
            "file_name": "balance_2023.pdf"
        }"#;
        let record: DocumentRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.status, Status::Known(LifecycleState::Analyzing));
        assert_eq!(record.company_name(), Some("Acme"));
        assert_eq!(record.file_name(), Some("balance_2023.pdf"));
        assert!(record.progress.is_none());
    }

    #[test]
    fn update_distinguishes_null_from_absent() {
        let cleared: PartialUpdate =
            serde_json::from_str(r#"{"id": "doc1", "progress": null}"#).unwrap();
        assert_eq!(cleared.progress, Some(None));

        let absent: PartialUpdate = serde_json::from_str(r#"{"id": "doc1"}"#).unwrap();
        assert_eq!(absent.progress, None);

        let set: PartialUpdate =
            serde_json::from_str(r#"{"id": "doc1", "progress": 40}"#).unwrap();
        assert_eq!(set.progress, Some(Some(40)));
    }

    #[test]
    fn null_on_plain_fields_is_not_asserted() {
        let update: PartialUpdate =
            serde_json::from_str(r#"{"id": "doc1", "error_message": null, "status": "Error"}"#)
                .unwrap();
        assert!(update.error_message.is_none());
        assert_eq!(update.status, Some(Status::Known(LifecycleState::Error)));
    }

    #[test]
    fn processing_time_patch_reads_nulls() {
        let update: PartialUpdate = serde_json::from_str(
            r#"{"id": "doc1", "processing_time": {"recognize": 12.5, "total": null}}"#,
        )
        .unwrap();
        let patch = update.processing_time.unwrap();
        assert_eq!(patch.recognize, Some(Some(12.5)));
        assert_eq!(patch.total, Some(None));
        assert_eq!(patch.extract, None);
    }

    #[test]
    fn list_query_params_skip_blank_search() {
        let query = ListQuery {
            search: Some("   ".into()),
            status: Some("Error".into()),
            ..ListQuery::default()
        };
        let params = query.to_params();
        assert!(params.iter().all(|(k, _)| *k != "search"));
        assert!(params.contains(&("status", "Error".to_string())));
        assert!(params.contains(&("sort_order", "desc".to_string())));
    }

    #[test]
    fn page_defaults() {
        let page: DocumentPage = serde_json::from_str(r#"{"items": []}"#).unwrap();
        assert_eq!(page.page, 1);
        assert_eq!(page.total, 0);
    }
}

//! Terminal views over a running synchronizer.

pub mod list;
pub mod watch;

use crate::models::DocumentRecord;
use crate::services::presentation::{present_record, present_validation, Presentation};
use crate::utils::{format_processing_time, normalize_timestamp};

fn badge(p: &Presentation) -> String {
    format!("{} [{}]", p.label, p.severity.as_str())
}

/// Detail block for one document.
pub fn render_detail(record: &DocumentRecord) -> Vec<String> {
    let status = present_record(record);
    let mut lines = vec![
        format!("documento  {}", record.id),
        format!("estado     {}", badge(&status)),
        format!("           {}", status.tooltip),
    ];
    if let Some(name) = record.file_name() {
        lines.push(format!("archivo    {}", name));
    }
    if let Some(company) = record.company_name() {
        lines.push(format!("empresa    {}", company));
    }
    if let Some(uploaded) = normalize_timestamp(record.upload_date.as_deref()) {
        lines.push(format!("subido     {}", uploaded));
    }
    if let Some(balance) = record.balance_date.as_deref() {
        lines.push(format!("balance    {}", balance));
    }
    if let Some(pages) = record.page_count {
        lines.push(format!("páginas    {}", pages));
    }
    if record.validation.is_some() {
        let validation = present_validation(record.validation.as_ref());
        lines.push(format!("validación {}", badge(&validation)));
        for message in validation.tooltip.lines() {
            lines.push(format!("           {}", message));
        }
    }
    if let Some(timing) = &record.processing_time {
        for stage in format_processing_time(timing) {
            lines.push(format!("tiempo     {}", stage));
        }
    }
    if record.has_report() {
        lines.push("reporte IA disponible".to_string());
    }
    lines
}

/// One list row: id, file, company, status badge.
pub fn render_row(record: &DocumentRecord) -> String {
    let status = present_record(record);
    format!(
        "{:<36}  {:<28}  {:<24}  {}",
        record.id,
        record.file_name().unwrap_or("-"),
        record.company_name().unwrap_or("-"),
        badge(&status)
    )
}

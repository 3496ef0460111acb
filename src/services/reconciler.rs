//! Field-wise merge of push updates into fetched snapshots.
//!
//! Every field present in the update wins, every absent field keeps the
//! existing value. `company_info` and `processing_time` merge one level deep;
//! `validation` and `ai_report` are replaced whole. The identifier always comes
//! from the existing record.

use crate::models::{CompanyInfo, DocumentRecord, PartialUpdate, ProcessingTime, ProcessingTimePatch};

pub fn merge(existing: &DocumentRecord, update: &PartialUpdate) -> DocumentRecord {
    let mut merged = existing.clone();

    if let Some(status) = &update.status {
        merged.status = status.clone();
    }
    if let Some(progress) = update.progress {
        merged.progress = progress;
    }
    assign(&mut merged.upload_date, &update.upload_date);
    assign(&mut merged.balance_date, &update.balance_date);
    assign(&mut merged.validation, &update.validation);
    assign(&mut merged.ai_report, &update.ai_report);
    assign(&mut merged.error_message, &update.error_message);
    if let Some(patch) = &update.company_info {
        apply_company(merged.company_info.get_or_insert_with(CompanyInfo::default), patch);
    }
    if let Some(page_count) = update.page_count {
        merged.page_count = page_count;
    }
    if let Some(patch) = &update.processing_time {
        apply_timing(merged.processing_time.get_or_insert_with(ProcessingTime::default), patch);
    }
    for (key, value) in &update.extra {
        merged.extra.insert(key.clone(), value.clone());
    }

    merged
}

/// Merge against a possibly missing base. Without a base there is nothing to
/// show: a partial update alone never becomes a record.
pub fn merge_into(existing: Option<&DocumentRecord>, update: &PartialUpdate) -> Option<DocumentRecord> {
    existing.map(|record| merge(record, update))
}

/// Fold a newer update over an older one for the same document, so that
/// updates buffered before a base record exists are not lost.
pub fn combine(older: &PartialUpdate, newer: &PartialUpdate) -> PartialUpdate {
    let mut combined = older.clone();

    if newer.status.is_some() {
        combined.status = newer.status.clone();
    }
    if newer.progress.is_some() {
        combined.progress = newer.progress;
    }
    assign(&mut combined.upload_date, &newer.upload_date);
    assign(&mut combined.balance_date, &newer.balance_date);
    assign(&mut combined.validation, &newer.validation);
    assign(&mut combined.ai_report, &newer.ai_report);
    assign(&mut combined.error_message, &newer.error_message);
    if let Some(patch) = &newer.company_info {
        apply_company(combined.company_info.get_or_insert_with(CompanyInfo::default), patch);
    }
    if newer.page_count.is_some() {
        combined.page_count = newer.page_count;
    }
    if let Some(patch) = &newer.processing_time {
        let target = combined
            .processing_time
            .get_or_insert_with(ProcessingTimePatch::default);
        overlay(&mut target.upload_convert, patch.upload_convert);
        overlay(&mut target.recognize, patch.recognize);
        overlay(&mut target.extract, patch.extract);
        overlay(&mut target.validation, patch.validation);
        overlay(&mut target.total, patch.total);
    }
    for (key, value) in &newer.extra {
        combined.extra.insert(key.clone(), value.clone());
    }

    combined
}

fn assign<T: Clone>(slot: &mut Option<T>, value: &Option<T>) {
    if let Some(value) = value {
        *slot = Some(value.clone());
    }
}

fn overlay<T: Copy>(slot: &mut Option<Option<T>>, value: Option<Option<T>>) {
    if value.is_some() {
        *slot = value;
    }
}

fn apply_company(base: &mut CompanyInfo, patch: &CompanyInfo) {
    assign(&mut base.company_cuit, &patch.company_cuit);
    assign(&mut base.company_name, &patch.company_name);
    assign(&mut base.company_activity, &patch.company_activity);
    assign(&mut base.company_address, &patch.company_address);
}

fn apply_timing(base: &mut ProcessingTime, patch: &ProcessingTimePatch) {
    let fields = [
        (&mut base.upload_convert, patch.upload_convert),
        (&mut base.recognize, patch.recognize),
        (&mut base.extract, patch.extract),
        (&mut base.validation, patch.validation),
        (&mut base.total, patch.total),
    ];
    for (slot, value) in fields {
        if let Some(value) = value {
            *slot = value;
        }
    }
}

use jsonschema::JSONSchema;
use serde_json::{json, Value};

use crate::error::{ChannelError, FrameError};
use crate::models::PartialUpdate;

/// Parses inbound push frames into [`PartialUpdate`]s.
///
/// A frame is checked against the update schema before typed
/// deserialization, so a frame with the right keys but wrong types is
/// rejected as a whole instead of being half-applied.
pub struct FrameParser {
    schema: JSONSchema,
}

impl FrameParser {
    pub fn new() -> Result<Self, ChannelError> {
        let schema = JSONSchema::compile(&update_schema())
            .map_err(|e| ChannelError::Schema(e.to_string()))?;
        Ok(FrameParser { schema })
    }

    pub fn parse(&self, raw: &str) -> Result<PartialUpdate, FrameError> {
        let value: Value = serde_json::from_str(raw)?;
        if value.get("id").map_or(true, Value::is_null) {
            return Err(FrameError::MissingId);
        }
        if !self.schema.is_valid(&value) {
            return Err(FrameError::Shape);
        }
        Ok(serde_json::from_value(value)?)
    }
}

fn update_schema() -> Value {
    json!({
        "type": "object",
        "required": ["id"],
        "properties": {
            "id": {"type": "string", "minLength": 1},
            "status": {"type": ["string", "null"]},
            "progress": {"type": ["integer", "null"], "minimum": 0, "maximum": 100},
            "upload_date": {"type": ["string", "null"]},
            "balance_date": {"type": ["string", "null"]},
            "validation": {
                "type": ["object", "null"],
                "properties": {
                    "status": {"type": "string"},
                    "message": {"type": "array", "items": {"type": "string"}}
                }
            },
            "ai_report": {"type": ["object", "null"]},
            "error_message": {"type": ["string", "null"]},
            "company_info": {
                "type": ["object", "null"],
                "properties": {
                    "company_cuit": {"type": ["string", "null"]},
                    "company_name": {"type": ["string", "null"]},
                    "company_activity": {"type": ["string", "null"]},
                    "company_address": {"type": ["string", "null"]}
                }
            },
            "page_count": {"type": ["integer", "null"], "minimum": 0},
            "processing_time": {
                "type": ["object", "null"],
                "properties": {
                    "upload_convert": {"type": ["number", "null"]},
                    "recognize": {"type": ["number", "null"]},
                    "extract": {"type": ["number", "null"]},
                    "validation": {"type": ["number", "null"]},
                    "total": {"type": ["number", "null"]}
                }
            }
        }
    })
}

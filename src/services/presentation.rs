//! Status presentation: (status, progress, validation, error) to the label,
//! severity and tooltip a view shows. Reads everything from the lifecycle
//! table.

use serde::Serialize;

use crate::lifecycle::{LifecycleState, Severity, Status, ValidationState};
use crate::models::{DocumentRecord, Validation};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Presentation {
    pub label: String,
    pub severity: Severity,
    pub tooltip: String,
}

pub fn present(
    status: &Status,
    progress: Option<u8>,
    validation_status: Option<&str>,
    error_message: Option<&str>,
) -> Presentation {
    let state = match status {
        Status::Known(state) => *state,
        Status::Unrecognized(raw) => {
            return Presentation {
                label: raw.clone(),
                severity: Severity::Default,
                tooltip: format!("Estado informado por el servidor: {}", raw),
            }
        }
    };
    let info = state.info();
    let progress = progress.filter(|_| info.shows_progress).map(|p| p.min(100));

    let label = match progress {
        Some(p) => format!("{} ({}%)", info.tag, p),
        None => info.tag.to_string(),
    };

    let mut tooltip = match state {
        LifecycleState::Error => error_message
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or(info.tooltip)
            .to_string(),
        _ => info.tooltip.to_string(),
    };
    if let Some(p) = progress {
        tooltip.push_str(&format!(" ({}% completado)", p));
    }
    if state.order() >= LifecycleState::Validating.order() && state != LifecycleState::Error {
        if let Some(validation) = validation_status.and_then(ValidationState::from_tag) {
            if validation != ValidationState::Unavailable {
                tooltip.push_str(&format!(". Validación: {}", validation.tag()));
            }
        }
    }

    Presentation {
        label,
        severity: info.severity,
        tooltip,
    }
}

pub fn present_record(record: &DocumentRecord) -> Presentation {
    present(
        &record.status,
        record.progress,
        record.validation.as_ref().map(|v| v.status.as_str()),
        record.error_message.as_deref(),
    )
}

/// Presentation of the validation sub-state. Messages, when present, replace
/// the generic tooltip one per line.
pub fn present_validation(validation: Option<&Validation>) -> Presentation {
    let raw = validation.map(|v| v.status.as_str()).unwrap_or("");
    let messages = validation.map(|v| v.message.as_slice()).unwrap_or(&[]);

    let Some(state) = ValidationState::from_tag(raw) else {
        return Presentation {
            label: raw.to_string(),
            severity: Severity::Default,
            tooltip: if messages.is_empty() {
                format!("Estado de validación informado por el servidor: {}", raw)
            } else {
                messages.join("\n")
            },
        };
    };

    Presentation {
        label: state.tag().to_string(),
        severity: state.severity(),
        tooltip: if messages.is_empty() {
            state.tooltip().to_string()
        } else {
            messages.join("\n")
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_known_state_has_a_label_and_tooltip() {
        for state in LifecycleState::ALL {
            let p = present(&Status::Known(state), None, None, None);
            assert_eq!(p.label, state.tag());
            assert_eq!(p.severity, state.info().severity);
            assert!(!p.tooltip.is_empty());
        }
    }

    #[test]
    fn in_progress_states_show_progress() {
        let p = present(&Status::from("Reconociendo"), Some(40), None, None);
        assert_eq!(p.label, "Reconociendo (40%)");
        assert_eq!(p.severity, Severity::Info);
        assert!(p.tooltip.ends_with("(40% completado)"));
    }

    #[test]
    fn progress_is_ignored_outside_progress_states() {
        let p = present(&Status::from("Analizado"), Some(100), None, None);
        assert_eq!(p.label, "Analizado");
        let queued = present(&Status::from("En cola"), Some(5), None, None);
        assert_eq!(queued.label, "En cola");
    }

    #[test]
    fn error_surfaces_message_verbatim() {
        let p = present(&Status::from("Error"), None, None, Some("parse failed"));
        assert_eq!(p.label, "Error");
        assert_eq!(p.severity, Severity::Error);
        assert_eq!(p.tooltip, "parse failed");

        let blank = present(&Status::from("Error"), None, None, Some("  "));
        assert_eq!(blank.tooltip, LifecycleState::Error.info().tooltip);
    }

    #[test]
    fn unrecognized_status_renders_literally() {
        let p = present(&Status::from("Desconocido"), Some(50), Some("Validado"), None);
        assert_eq!(p.label, "Desconocido");
        assert_eq!(p.severity, Severity::Default);
    }

    #[test]
    fn validation_is_mentioned_from_validating_on() {
        let p = present(&Status::from("Analizado"), None, Some("Advertencia"), None);
        assert!(p.tooltip.contains("Validación: Advertencia"));

        let early = present(&Status::from("Analizando"), None, Some("Advertencia"), None);
        assert!(!early.tooltip.contains("Validación"));

        let unavailable = present(&Status::from("Exportado"), None, Some("no disponible"), None);
        assert!(!unavailable.tooltip.contains("Validación"));
    }

    #[test]
    fn validation_sub_state_mapping() {
        let none = present_validation(None);
        assert_eq!(none.label, "no disponible");
        assert_eq!(none.severity, Severity::Default);

        let warning = Validation {
            status: "Advertencia".into(),
            message: vec!["Activo ≠ Pasivo + PN".into(), "Falta estado de resultados".into()],
        };
        let p = present_validation(Some(&warning));
        assert_eq!(p.severity, Severity::Warning);
        assert_eq!(p.tooltip, "Activo ≠ Pasivo + PN\nFalta estado de resultados");

        let ok = Validation {
            status: "Validado".into(),
            message: vec![],
        };
        assert_eq!(present_validation(Some(&ok)).severity, Severity::Success);
    }

    #[test]
    fn unknown_validation_status_is_literal() {
        let odd = Validation {
            status: "Revisión manual".into(),
            message: vec![],
        };
        let p = present_validation(Some(&odd));
        assert_eq!(p.label, "Revisión manual");
        assert_eq!(p.severity, Severity::Default);
    }
}

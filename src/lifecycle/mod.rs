//! Document lifecycle states.
//!
//! [`LifecycleState`] is the closed set of pipeline states. Everything that
//! needs to know about a state (its order, the refresh it demands from views,
//! its severity, label and tooltip) reads it from the single [`STATES`] table,
//! indexed by the enum discriminant.
//!
//! The backend is the only authority over legal transitions: the client reacts
//! to whatever status string arrives, and strings outside the table become
//! [`Status::Unrecognized`], which displays literally and triggers nothing.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// What a view must do when a document newly enters a state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefreshAction {
    None,
    /// Re-run the authoritative read, keeping pagination/filter/sort.
    Soft,
    /// Reconstruct the whole view from scratch.
    Hard,
}

/// Severity color shown next to a status label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Default,
    Info,
    Primary,
    Success,
    Warning,
    Error,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Default => "default",
            Severity::Info => "info",
            Severity::Primary => "primary",
            Severity::Success => "success",
            Severity::Warning => "warning",
            Severity::Error => "error",
        }
    }
}

/// Pipeline states in pipeline order. The discriminant is the position in
/// [`STATES`] and the total order used by [`LifecycleState::is_further_along`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LifecycleState {
    Queued = 0,
    Uploading = 1,
    Converting = 2,
    Recognizing = 3,
    Analyzing = 4,
    Validating = 5,
    Analyzed = 6,
    AiReport = 7,
    Exported = 8,
    Error = 9,
}

/// Row of the canonical state table.
#[derive(Debug)]
pub struct StateInfo {
    pub state: LifecycleState,
    /// Wire tag, also the display label.
    pub tag: &'static str,
    pub refresh: RefreshAction,
    pub severity: Severity,
    /// Whether `progress` is meaningful in this state.
    pub shows_progress: bool,
    pub terminal: bool,
    pub tooltip: &'static str,
}

pub static STATES: [StateInfo; 10] = [
    StateInfo {
        state: LifecycleState::Queued,
        tag: "En cola",
        refresh: RefreshAction::None,
        severity: Severity::Default,
        shows_progress: false,
        terminal: false,
        tooltip: "El documento espera su turno para ser procesado",
    },
    StateInfo {
        state: LifecycleState::Uploading,
        tag: "Cargando",
        refresh: RefreshAction::None,
        severity: Severity::Info,
        shows_progress: true,
        terminal: false,
        tooltip: "Subiendo el archivo al servidor",
    },
    StateInfo {
        state: LifecycleState::Converting,
        tag: "Convirtiendo",
        refresh: RefreshAction::Soft,
        severity: Severity::Info,
        shows_progress: true,
        terminal: false,
        tooltip: "Convirtiendo el archivo a un formato procesable",
    },
    StateInfo {
        state: LifecycleState::Recognizing,
        tag: "Reconociendo",
        refresh: RefreshAction::Soft,
        severity: Severity::Info,
        shows_progress: true,
        terminal: false,
        tooltip: "Reconociendo páginas y contenido del balance",
    },
    StateInfo {
        state: LifecycleState::Analyzing,
        tag: "Analizando",
        refresh: RefreshAction::Soft,
        severity: Severity::Info,
        shows_progress: true,
        terminal: false,
        tooltip: "Extrayendo los datos contables del balance",
    },
    StateInfo {
        state: LifecycleState::Validating,
        tag: "Validando",
        refresh: RefreshAction::None,
        severity: Severity::Info,
        shows_progress: true,
        terminal: false,
        tooltip: "Verificando la consistencia contable de los datos extraídos",
    },
    StateInfo {
        state: LifecycleState::Analyzed,
        tag: "Analizado",
        refresh: RefreshAction::Hard,
        severity: Severity::Success,
        shows_progress: false,
        terminal: false,
        tooltip: "Análisis completo, los datos están disponibles",
    },
    StateInfo {
        state: LifecycleState::AiReport,
        tag: "Reporte IA",
        refresh: RefreshAction::None,
        severity: Severity::Primary,
        shows_progress: true,
        terminal: false,
        tooltip: "Generando el reporte con IA",
    },
    StateInfo {
        state: LifecycleState::Exported,
        tag: "Exportado",
        refresh: RefreshAction::None,
        severity: Severity::Success,
        shows_progress: false,
        terminal: true,
        tooltip: "El documento fue exportado",
    },
    StateInfo {
        state: LifecycleState::Error,
        tag: "Error",
        refresh: RefreshAction::None,
        severity: Severity::Error,
        shows_progress: false,
        terminal: true,
        tooltip: "El procesamiento falló",
    },
];

impl LifecycleState {
    pub const ALL: [LifecycleState; 10] = [
        LifecycleState::Queued,
        LifecycleState::Uploading,
        LifecycleState::Converting,
        LifecycleState::Recognizing,
        LifecycleState::Analyzing,
        LifecycleState::Validating,
        LifecycleState::Analyzed,
        LifecycleState::AiReport,
        LifecycleState::Exported,
        LifecycleState::Error,
    ];

    pub fn info(self) -> &'static StateInfo {
        &STATES[self as usize]
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        STATES.iter().find(|info| info.tag == tag).map(|info| info.state)
    }

    pub fn tag(self) -> &'static str {
        self.info().tag
    }

    pub fn order(self) -> u8 {
        self as u8
    }

    pub fn refresh_action(self) -> RefreshAction {
        self.info().refresh
    }

    pub fn is_terminal(self) -> bool {
        self.info().terminal
    }

    pub fn is_in_progress(self) -> bool {
        self.info().shows_progress
    }

    pub fn is_further_along(self, other: LifecycleState) -> bool {
        self.order() > other.order()
    }
}

/// A status string as received from the backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Status {
    Known(LifecycleState),
    Unrecognized(String),
}

impl Status {
    pub fn lifecycle(&self) -> Option<LifecycleState> {
        match self {
            Status::Known(state) => Some(*state),
            Status::Unrecognized(_) => None,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Status::Known(state) => state.tag(),
            Status::Unrecognized(raw) => raw,
        }
    }

    /// Unrecognized statuses never demand a refresh.
    pub fn refresh_action(&self) -> RefreshAction {
        self.lifecycle()
            .map(LifecycleState::refresh_action)
            .unwrap_or(RefreshAction::None)
    }

    pub fn is(&self, state: LifecycleState) -> bool {
        self.lifecycle() == Some(state)
    }
}

impl Default for Status {
    fn default() -> Self {
        Status::Known(LifecycleState::Queued)
    }
}

impl From<LifecycleState> for Status {
    fn from(state: LifecycleState) -> Self {
        Status::Known(state)
    }
}

impl From<&str> for Status {
    fn from(raw: &str) -> Self {
        match LifecycleState::from_tag(raw) {
            Some(state) => Status::Known(state),
            None => Status::Unrecognized(raw.to_string()),
        }
    }
}

impl From<String> for Status {
    fn from(raw: String) -> Self {
        match LifecycleState::from_tag(&raw) {
            Some(state) => Status::Known(state),
            None => Status::Unrecognized(raw),
        }
    }
}

impl From<Status> for String {
    fn from(status: Status) -> Self {
        match status {
            Status::Known(state) => state.tag().to_string(),
            Status::Unrecognized(raw) => raw,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validation sub-state, independent of the primary lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValidationState {
    Unavailable,
    Validating,
    Validated,
    Warning,
    NoData,
}

impl ValidationState {
    pub const ALL: [ValidationState; 5] = [
        ValidationState::Unavailable,
        ValidationState::Validating,
        ValidationState::Validated,
        ValidationState::Warning,
        ValidationState::NoData,
    ];

    pub fn tag(self) -> &'static str {
        match self {
            ValidationState::Unavailable => "no disponible",
            ValidationState::Validating => "Validando",
            ValidationState::Validated => "Validado",
            ValidationState::Warning => "Advertencia",
            ValidationState::NoData => "Sin datos",
        }
    }

    pub fn severity(self) -> Severity {
        match self {
            ValidationState::Unavailable => Severity::Default,
            ValidationState::Validating => Severity::Info,
            ValidationState::Validated => Severity::Success,
            ValidationState::Warning => Severity::Warning,
            ValidationState::NoData => Severity::Default,
        }
    }

    pub fn tooltip(self) -> &'static str {
        match self {
            ValidationState::Unavailable => "La validación todavía no está disponible",
            ValidationState::Validating => "Validando la consistencia contable",
            ValidationState::Validated => "Los datos pasaron la validación contable",
            ValidationState::Warning => "La validación encontró inconsistencias",
            ValidationState::NoData => "No hay datos suficientes para validar",
        }
    }

    /// An empty tag means the backend has not reported validation yet.
    pub fn from_tag(tag: &str) -> Option<Self> {
        if tag.trim().is_empty() {
            return Some(ValidationState::Unavailable);
        }
        Self::ALL.into_iter().find(|state| state.tag() == tag)
    }
}

/// A status change observed for one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub id: String,
    pub from: Status,
    pub to: Status,
    pub action: RefreshAction,
}

/// Edge-triggered transition detector.
///
/// Remembers the last status seen per document. The first observation of a
/// document only seeds the baseline; afterwards a transition is reported only
/// when the status value actually changes, so repeated snapshots or pushes
/// carrying the same status never re-fire an action.
#[derive(Debug, Default)]
pub struct TransitionTracker {
    last: HashMap<String, Status>,
}

impl TransitionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, id: &str, status: &Status) -> Option<Transition> {
        match self.last.get_mut(id) {
            None => {
                self.last.insert(id.to_string(), status.clone());
                None
            }
            Some(previous) if previous == status => None,
            Some(previous) => {
                let from = std::mem::replace(previous, status.clone());
                Some(Transition {
                    id: id.to_string(),
                    from,
                    to: status.clone(),
                    action: status.refresh_action(),
                })
            }
        }
    }

    /// Set the baseline for a document not seen yet; a known document keeps
    /// its baseline.
    pub fn seed(&mut self, id: &str, status: &Status) {
        if !self.last.contains_key(id) {
            self.last.insert(id.to_string(), status.clone());
        }
    }

    pub fn forget(&mut self, id: &str) {
        self.last.remove(id);
    }

    pub fn last_seen(&self, id: &str) -> Option<&Status> {
        self.last.get(id)
    }
}

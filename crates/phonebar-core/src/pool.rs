//! Line pool: the set of concurrently tracked call legs.
//!
//! At most one line is "current" at a time; only the current line's
//! transitions drive presence and the externally visible call notifications.
//! Lines are created when the server first reports a call leg and removed
//! when that leg is released. Insertion order is the only ordering
//! guarantee.

use crate::line::{CallInfo, CallType, Line, LineState};

#[derive(Debug, Default)]
pub struct LinePool {
    lines: Vec<Line>,
    current_id: Option<String>,
}

impl LinePool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch the line for a call id, creating it (idle) on first sight.
    /// The first line created becomes current.
    pub fn line_for_call(&mut self, info: &CallInfo) -> &mut Line {
        if let Some(idx) = self.lines.iter().position(|l| l.id() == info.call_id) {
            return &mut self.lines[idx];
        }
        let line = Line::new(info.clone());
        if self.current_id.is_none() {
            self.current_id = Some(line.id().to_string());
        }
        self.lines.push(line);
        self.lines.last_mut().expect("just pushed")
    }

    pub fn get(&self, line_id: &str) -> Option<&Line> {
        self.lines.iter().find(|l| l.id() == line_id)
    }

    pub fn get_mut(&mut self, line_id: &str) -> Option<&mut Line> {
        self.lines.iter_mut().find(|l| l.id() == line_id)
    }

    /// Remove a released line. If it was current, the next remaining line
    /// (insertion order) becomes current.
    pub fn remove(&mut self, line_id: &str) {
        self.lines.retain(|l| l.id() != line_id);
        if self.current_id.as_deref() == Some(line_id) {
            self.current_id = self.lines.first().map(|l| l.id().to_string());
        }
    }

    pub fn current_line(&self) -> Option<&Line> {
        self.current_id.as_deref().and_then(|id| self.get(id))
    }

    pub fn current_line_id(&self) -> Option<&str> {
        self.current_id.as_deref()
    }

    /// Reassign the current pointer (e.g. promoting a consult line after the
    /// customer hangs up). Ignored for unknown ids.
    pub fn set_current_line(&mut self, line_id: &str) {
        if self.get(line_id).is_some() {
            self.current_id = Some(line_id.to_string());
        }
    }

    /// Count of non-idle lines.
    pub fn working_line_count(&self) -> usize {
        self.lines
            .iter()
            .filter(|l| l.state() != LineState::Idle)
            .count()
    }

    pub fn line_by_call_type(&self, call_type: CallType) -> Option<&Line> {
        self.lines
            .iter()
            .find(|l| l.call_info().call_type == call_type)
    }

    pub fn has_line_of_type(&self, call_type: CallType) -> bool {
        self.line_by_call_type(call_type).is_some()
    }

    pub fn consult_line(&self) -> Option<&Line> {
        self.line_by_call_type(CallType::Consult)
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

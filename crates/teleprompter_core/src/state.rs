//! Shared teleprompter state.
//!
//! One [`SharedState`] exists per context. It is seeded from
//! [`SharedState::default`], then overlaid by persisted settings and by
//! inbound full-state messages. Consumers read it; only the sync engine
//! writes it.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TeleprompterError};

/// Presenter identifier, unique within a presenter list.
pub type PresenterId = i64;

const SAMPLE_SCRIPT: &str = "Welcome to the teleprompter!\n\n\
This is where your script text will appear.\n\n\
You can scroll through it smoothly, adjust the speed, and control playback with the buttons below.\n\n\
Add your own presenters and scripts using the menu on the left.";

/// A presenter and their script.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Presenter {
    /// Unique id within the list.
    pub id: PresenterId,
    /// Display name.
    pub name: String,
    /// Script text shown on the prompter.
    #[serde(default)]
    pub script: String,
}

impl Presenter {
    /// Create a presenter.
    pub fn new(id: PresenterId, name: impl Into<String>, script: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            script: script.into(),
        }
    }
}

/// Partial update for a presenter. The id is never patched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PresenterPatch {
    /// New display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// New script text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script: Option<String>,
}

impl PresenterPatch {
    /// Patch that only renames.
    pub fn name(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            script: None,
        }
    }

    /// Patch that only replaces the script.
    pub fn script(script: impl Into<String>) -> Self {
        Self {
            name: None,
            script: Some(script.into()),
        }
    }

    fn apply_to(&self, presenter: &mut Presenter) {
        if let Some(name) = &self.name {
            presenter.name = name.clone();
        }
        if let Some(script) = &self.script {
            presenter.script = script.clone();
        }
    }
}

/// Direction of the timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimerMode {
    /// Count up from zero.
    #[default]
    Up,
    /// Count down from `durationMs`.
    Down,
}

/// What the display views show.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppMode {
    /// Timer only.
    Timer,
    /// Script only.
    Autocue,
    /// Timer and script together.
    #[default]
    Combined,
}

impl AppMode {
    /// Wire / storage representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            AppMode::Timer => "timer",
            AppMode::Autocue => "autocue",
            AppMode::Combined => "combined",
        }
    }
}

impl fmt::Display for AppMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AppMode {
    type Err = TeleprompterError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "timer" => Ok(AppMode::Timer),
            "autocue" => Ok(AppMode::Autocue),
            "combined" => Ok(AppMode::Combined),
            other => Err(TeleprompterError::InvalidState(format!(
                "unknown mode: {other}"
            ))),
        }
    }
}

/// Severity of a live message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LiveMessageType {
    /// Neutral cue.
    #[default]
    Info,
    /// Highlighted cue (e.g. "wrap up").
    Warning,
}

/// Message pushed from control to the displays.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LiveMessage {
    /// Message text.
    pub text: String,
    /// Severity.
    #[serde(rename = "type", default)]
    pub kind: LiveMessageType,
    /// Id of the push that produced this message, if any.
    pub id: Option<String>,
    /// Whether the displays currently show it.
    pub visible: bool,
}

/// The synchronized application state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SharedState {
    /// Ordered presenter list.
    pub presenters: Vec<Presenter>,
    /// Selected presenter; `None` only when `presenters` is empty.
    pub selected_presenter_id: Option<PresenterId>,

    /// Whether the script is scrolling.
    pub is_playing: bool,
    /// Scroll speed.
    pub speed: f64,
    /// Script font size.
    pub font_size: f64,
    /// Last reported scroll offset.
    pub scroll_position: Option<f64>,

    /// Timer direction.
    pub timer_mode: TimerMode,
    /// Countdown length (only meaningful for [`TimerMode::Down`]).
    pub duration_ms: u64,
    /// Elapsed time frozen at the last pause.
    pub elapsed_ms: u64,
    /// Whether the timer is running.
    pub is_timer_running: bool,
    /// `now - elapsed` at the last start; set iff the timer is running.
    pub timer_start_time: Option<i64>,

    /// What the displays show.
    pub mode: AppMode,

    /// Current live message.
    pub current_message: LiveMessage,
}

impl Default for SharedState {
    fn default() -> Self {
        Self {
            presenters: vec![Presenter::new(1, "Sample Presenter", SAMPLE_SCRIPT)],
            selected_presenter_id: Some(1),
            is_playing: false,
            speed: 2.0,
            font_size: 48.0,
            scroll_position: None,
            timer_mode: TimerMode::Up,
            duration_ms: 300_000,
            elapsed_ms: 0,
            is_timer_running: false,
            timer_start_time: None,
            mode: AppMode::Combined,
            current_message: LiveMessage::default(),
        }
    }
}

impl SharedState {
    /// Look up a presenter by id.
    pub fn presenter(&self, id: PresenterId) -> Option<&Presenter> {
        self.presenters.iter().find(|p| p.id == id)
    }

    /// The currently selected presenter.
    pub fn selected_presenter(&self) -> Option<&Presenter> {
        self.selected_presenter_id.and_then(|id| self.presenter(id))
    }

    /// Repoint the selection at the first presenter if it no longer resolves.
    ///
    /// Clears the selection when the list is empty. Returns whether the
    /// selection changed.
    pub fn ensure_selection(&mut self) -> bool {
        if self.selected_presenter().is_some() {
            return false;
        }
        let next = self.presenters.first().map(|p| p.id);
        let changed = next != self.selected_presenter_id;
        self.selected_presenter_id = next;
        changed
    }

    /// Elapsed timer time at `now_ms`.
    ///
    /// Live while running, frozen otherwise. Never negative.
    pub fn elapsed_at(&self, now_ms: i64) -> u64 {
        match (self.is_timer_running, self.timer_start_time) {
            (true, Some(start)) => u64::try_from(now_ms.saturating_sub(start)).unwrap_or(0),
            _ => self.elapsed_ms,
        }
    }

    /// Countdown time left at `now_ms`, saturating at zero.
    pub fn remaining_at(&self, now_ms: i64) -> u64 {
        self.duration_ms.saturating_sub(self.elapsed_at(now_ms))
    }

    /// Whether a countdown has run past its duration at `now_ms`.
    pub fn is_overtime_at(&self, now_ms: i64) -> bool {
        self.timer_mode == TimerMode::Down && self.elapsed_at(now_ms) > self.duration_ms
    }

    pub(crate) fn apply_presenter_patch(&mut self, id: PresenterId, patch: &PresenterPatch) -> bool {
        match self.presenters.iter_mut().find(|p| p.id == id) {
            Some(presenter) => {
                patch.apply_to(presenter);
                true
            }
            None => false,
        }
    }
}

/// Speeds and font sizes must be finite and positive.
pub(crate) fn is_positive_finite(value: f64) -> bool {
    value.is_finite() && value > 0.0
}

/// Check that every presenter id in the list is unique.
pub fn validate_presenters(presenters: &[Presenter]) -> Result<()> {
    let mut seen = HashSet::with_capacity(presenters.len());
    for presenter in presenters {
        if !seen.insert(presenter.id) {
            return Err(TeleprompterError::InvalidState(format!(
                "duplicate presenter id {}",
                presenter.id
            )));
        }
    }
    Ok(())
}

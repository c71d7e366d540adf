//! Session orchestration
//!
//! [`FlowSession`] is the context object every host trigger goes through. It
//! owns the classifier, metrics, scorer, nudge machine and logs, and reaches
//! the outside world only through the injected clock, jitter source and
//! key-value store.
//!
//! Pipeline: edit → classify → accumulate → (coalesced tick) → score →
//! status + nudge → queued decision → event log

use chrono::{DateTime, Duration, Utc};
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::classifier::EditClassifier;
use crate::clock::{Clock, SystemClock};
use crate::config::FlowConfig;
use crate::dashboard::{DashboardHandshake, DashboardSnapshot};
use crate::error::VibeflowError;
use crate::export::{render_bundle, ExportSink, FileExportSink, DEFAULT_EXPORT_NAME};
use crate::history::{FlowLogs, LogBundle};
use crate::metrics::MetricsAccumulator;
use crate::nudge::{NudgeState, NudgeStateMachine};
use crate::prompt::{Decision, DecisionQueue, PendingPrompt, PromptKind, ResolvedDecision};
use crate::schema::{Command, EventKind, HostEvent, Payload};
use crate::scorer::{FlowScorer, Jitter, ScoreBreakdown, UniformJitter};
use crate::store::{self, KeyValueStore, MemoryStore, ASSIST_MODE_KEY};
use crate::types::{
    ChangeEvent, ClassifiedEvent, EventType, FlowBand, FlowSample, Metrics, Mood, MoodEntry,
};

/// Status shown after an evaluated tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowStatus {
    pub timestamp: DateTime<Utc>,
    pub score: u8,
    pub band: FlowBand,
    pub state: NudgeState,
    pub consecutive_low: u32,
    pub assist_enabled: bool,
}

/// Everything a tick produced
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TickReport {
    /// None when the tick was coalesced into the previous evaluation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<FlowStatus>,
    /// Nudge to present, when one fired
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<PendingPrompt>,
    /// Fallback dashboard push, when due
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dashboard: Option<DashboardSnapshot>,
    /// Events recorded from decisions drained on this tick
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub applied: Vec<ClassifiedEvent>,
}

/// Reply to one host event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HostResponse {
    Edits { events: Vec<ClassifiedEvent> },
    Tick(TickReport),
    Prompt { prompt: PendingPrompt },
    Mood { entry: MoodEntry },
    Assist { enabled: bool },
    Rejected { ai_rejections: u64 },
    Snapshot { snapshot: DashboardSnapshot },
    Exported { location: String },
    Ack,
    Error { message: String },
}

/// The flow pipeline for one editor installation
pub struct FlowSession {
    config: FlowConfig,
    clock: Box<dyn Clock>,
    jitter: Box<dyn Jitter>,
    store: Box<dyn KeyValueStore>,
    classifier: EditClassifier,
    accumulator: MetricsAccumulator,
    scorer: FlowScorer,
    nudge: NudgeStateMachine,
    logs: FlowLogs,
    prompts: DecisionQueue,
    dashboard: DashboardHandshake,
    assist_enabled: bool,
    last_evaluation: Option<DateTime<Utc>>,
    last_status: Option<FlowStatus>,
    /// Timestamp of the host event being dispatched; overrides the clock
    event_time: Option<DateTime<Utc>>,
    dirty: DirtyLogs,
}

/// Logs changed since the last write to the store
#[derive(Debug, Clone, Copy, Default)]
struct DirtyLogs {
    history: bool,
    events: bool,
    moods: bool,
}

impl FlowSession {
    /// Session on the wall clock with random jitter and an in-memory store
    pub fn new(config: FlowConfig) -> Result<Self, VibeflowError> {
        Self::with_parts(
            config,
            Box::new(SystemClock),
            Box::new(UniformJitter::new()),
            Box::new(MemoryStore::new()),
        )
    }

    /// Session with explicit collaborators. Assist mode and the logs are
    /// restored from `store`.
    pub fn with_parts(
        config: FlowConfig,
        clock: Box<dyn Clock>,
        jitter: Box<dyn Jitter>,
        store: Box<dyn KeyValueStore>,
    ) -> Result<Self, VibeflowError> {
        config.validate()?;

        let now = clock.now();
        let assist_enabled = match store::load::<bool>(store.as_ref(), ASSIST_MODE_KEY) {
            Ok(value) => value.unwrap_or(false),
            Err(e) => {
                warn!("Ignoring stored assist mode: {}", e);
                false
            }
        };
        let logs = FlowLogs::restore(&config, store.as_ref());
        debug!(
            "Session restored: {} samples, {} events, {} moods, assist={}",
            logs.history.len(),
            logs.events.len(),
            logs.moods.len(),
            assist_enabled
        );

        Ok(Self {
            classifier: EditClassifier::new(config.ai_insert_threshold),
            accumulator: MetricsAccumulator::new(now, config.activity_window_ms),
            scorer: FlowScorer::new(config.scorer.clone()),
            nudge: NudgeStateMachine::new(config.nudge.clone()),
            dashboard: DashboardHandshake::new(config.dashboard_fallback_ms),
            prompts: DecisionQueue::new(),
            logs,
            assist_enabled,
            last_evaluation: None,
            last_status: None,
            event_time: None,
            dirty: DirtyLogs::default(),
            config,
            clock,
            jitter,
            store,
        })
    }

    pub fn config(&self) -> &FlowConfig {
        &self.config
    }

    pub fn metrics(&self) -> &Metrics {
        self.accumulator.metrics()
    }

    pub fn assist_enabled(&self) -> bool {
        self.assist_enabled
    }

    pub fn last_status(&self) -> Option<&FlowStatus> {
        self.last_status.as_ref()
    }

    pub fn logs(&self) -> &FlowLogs {
        &self.logs
    }

    pub fn pending_prompts(&self) -> usize {
        self.prompts.pending_count()
    }

    /// Host event time while dispatching, the injected clock otherwise
    fn now(&self) -> DateTime<Utc> {
        self.event_time.unwrap_or_else(|| self.clock.now())
    }

    /// Write every log changed since the last flush. Called once per
    /// evaluated tick and when the session is dropped.
    pub fn flush(&mut self) {
        let dirty = std::mem::take(&mut self.dirty);
        let store = self.store.as_mut();
        if dirty.history {
            self.logs.persist_history(store);
        }
        if dirty.events {
            self.logs.persist_events(store);
        }
        if dirty.moods {
            self.logs.persist_moods(store);
        }
    }

    // ------------------------------------------------------------------
    // Host triggers
    // ------------------------------------------------------------------

    /// Classify and record a text-change notification
    pub fn on_text_change(&mut self, change: &ChangeEvent) -> Vec<ClassifiedEvent> {
        self.process_decisions();

        let edits = self.classifier.classify_all(change);
        if edits.is_empty() {
            return Vec::new();
        }

        let mut emitted = Vec::with_capacity(edits.len());
        for edit in &edits {
            self.accumulator.apply(edit, change.timestamp);
            debug!("Classified {} (+{} -{})", edit.kind, edit.inserted, edit.removed);

            let event = ClassifiedEvent::new(edit.kind, change.timestamp, edit.payload());
            self.logs.events.push(event.clone());
            emitted.push(event);
        }
        self.dirty.events = true;

        emitted
    }

    /// Losing focus marks the session as already idle
    pub fn on_focus_change(&mut self, focused: bool) {
        if focused {
            return;
        }
        let since = self.now() - Duration::milliseconds(self.config.focus_loss_idle_ms);
        self.accumulator.note_idle(since);
        debug!("Focus lost, idle mark moved to {}", since);
    }

    /// Periodic tick. Evaluates the score at most once per tick interval.
    pub fn tick(&mut self) -> TickReport {
        let now = self.now();
        let mut report = TickReport {
            applied: self.process_decisions(),
            ..TickReport::default()
        };

        if self.dashboard.poll_fallback(now) {
            debug!("Sending fallback dashboard snapshot");
            report.dashboard = Some(self.snapshot());
        }

        if let Some(last) = self.last_evaluation {
            if now - last < Duration::milliseconds(self.config.tick_interval_ms) {
                debug!("Tick coalesced");
                return report;
            }
        }
        self.last_evaluation = Some(now);

        self.accumulator.prune(now);
        let breakdown = self.scorer.score(
            self.accumulator.metrics(),
            self.accumulator.activity(),
            now,
            self.jitter.as_mut(),
        );

        self.logs.history.push(FlowSample {
            timestamp: now,
            score: breakdown.score,
        });
        self.dirty.history = true;

        let transition = self.nudge.observe(breakdown.score, self.assist_enabled);
        self.accumulator.set_consecutive_low(transition.consecutive_low);

        if transition.fired {
            let prompt = self.prompts.issue(PromptKind::Nudge, now);
            info!("Low flow for {} ticks, nudging ({})", self.config.nudge.streak, prompt.token);
            report.prompt = Some(prompt);
        }

        let status = FlowStatus {
            timestamp: now,
            score: breakdown.score,
            band: transition.band,
            state: transition.state,
            consecutive_low: transition.consecutive_low,
            assist_enabled: self.assist_enabled,
        };
        self.last_status = Some(status.clone());
        report.status = Some(status);

        self.flush();
        report
    }

    /// Current score terms without jitter and without recording anything
    pub fn preview_score(&self) -> ScoreBreakdown {
        self.scorer.breakdown(
            self.accumulator.metrics(),
            self.accumulator.activity(),
            self.now(),
            0.0,
        )
    }

    // ------------------------------------------------------------------
    // Decisions
    // ------------------------------------------------------------------

    /// Queue an answer to a pending prompt. It is applied on the next trigger.
    pub fn submit_decision(&mut self, token: Uuid, choice: Option<String>) {
        self.prompts.submit(Decision {
            token,
            choice,
            received_at: self.now(),
        });
    }

    /// Apply every queued answer and return the events they produced
    pub fn process_decisions(&mut self) -> Vec<ClassifiedEvent> {
        let mut applied = Vec::new();

        for decision in self.prompts.drain() {
            match decision {
                ResolvedDecision::Nudge { choice, received_at } => {
                    info!("Nudge answered: {}", choice.as_str());
                    let event = ClassifiedEvent::new(
                        EventType::Nudge,
                        received_at,
                        serde_json::json!({ "choice": choice.as_str() }),
                    );
                    self.logs.events.push(event.clone());
                    applied.push(event);
                }
                ResolvedDecision::Mood {
                    mood: Some(mood),
                    received_at,
                } => {
                    applied.push(self.push_mood(mood, received_at).1);
                }
                ResolvedDecision::Mood { mood: None, .. } => {
                    debug!("Mood prompt dismissed");
                }
            }
        }

        if !applied.is_empty() {
            self.dirty.events = true;
        }
        applied
    }

    // ------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------

    /// Ask the user for a mood; the answer arrives as a decision
    pub fn request_mood(&mut self) -> PendingPrompt {
        self.process_decisions();
        self.prompts.issue(PromptKind::Mood, self.now())
    }

    /// Record a mood the user already picked
    pub fn record_mood(&mut self, mood: Mood) -> MoodEntry {
        self.process_decisions();
        let (entry, _) = self.push_mood(mood, self.now());
        entry
    }

    fn push_mood(&mut self, mood: Mood, at: DateTime<Utc>) -> (MoodEntry, ClassifiedEvent) {
        info!("Mood reported: {}", mood.as_str());
        let entry = MoodEntry { timestamp: at, mood };
        self.logs.moods.push(entry);
        self.dirty.moods = true;

        let event = ClassifiedEvent::new(
            EventType::MoodReport,
            at,
            serde_json::json!({ "mood": mood.as_str() }),
        );
        self.logs.events.push(event.clone());
        self.dirty.events = true;
        (entry, event)
    }

    /// Flip assist mode and persist it
    pub fn toggle_assist(&mut self) -> bool {
        self.process_decisions();
        self.assist_enabled = !self.assist_enabled;
        info!("Assist mode {}", if self.assist_enabled { "enabled" } else { "disabled" });

        if let Err(e) = store::save(self.store.as_mut(), ASSIST_MODE_KEY, &self.assist_enabled) {
            warn!("Failed to persist assist mode: {}", e);
        }
        self.append_event(
            EventType::AssistToggle,
            serde_json::json!({ "enabled": self.assist_enabled }),
        );
        self.assist_enabled
    }

    /// Record that the user rejected an AI suggestion
    pub fn log_ai_reject(&mut self) -> u64 {
        self.process_decisions();
        self.accumulator.record_ai_rejection();
        let total = self.accumulator.metrics().ai_rejections;
        self.append_event(EventType::AiReject, serde_json::json!({ "total": total }));
        total
    }

    /// Export `{history, moods, events}` through the host's save capability
    pub fn export_logs(&mut self, sink: &mut dyn ExportSink) -> Result<String, VibeflowError> {
        self.process_decisions();
        let rendered = render_bundle(&self.logs.bundle())?;

        match sink.save(DEFAULT_EXPORT_NAME, &rendered) {
            Ok(location) => {
                info!("Exported logs to {}", location);
                self.append_event(EventType::Export, serde_json::json!({ "location": location }));
                Ok(location)
            }
            Err(e) => {
                error!("Export failed: {}", e);
                Err(e)
            }
        }
    }

    /// Snapshot for a freshly opened dashboard; arms the fallback push
    pub fn open_dashboard(&mut self) -> DashboardSnapshot {
        self.process_decisions();
        self.dashboard.opened(self.now());
        self.snapshot()
    }

    pub fn acknowledge_dashboard(&mut self) {
        self.dashboard.acknowledge();
    }

    pub fn snapshot(&self) -> DashboardSnapshot {
        DashboardSnapshot {
            history: self.logs.history.latest(self.config.dashboard_history_len),
            moods: self.logs.moods.to_vec(),
            events: self.logs.events.to_vec(),
            metrics: self.accumulator.metrics().clone(),
        }
    }

    pub fn bundle(&self) -> LogBundle {
        self.logs.bundle()
    }

    fn append_event(&mut self, event_type: EventType, payload: serde_json::Value) {
        let event = ClassifiedEvent::new(event_type, self.now(), payload);
        self.logs.events.push(event);
        self.dirty.events = true;
    }

    // ------------------------------------------------------------------
    // Host event dispatch
    // ------------------------------------------------------------------

    /// Validate and dispatch one host event. The event timestamp is "now"
    /// for every trigger it causes.
    pub fn handle(&mut self, event: &HostEvent) -> Result<HostResponse, VibeflowError> {
        event
            .validate()
            .map_err(|e| VibeflowError::InvalidEvent(e.to_string()))?;

        self.event_time = Some(event.timestamp);
        let response = self.dispatch(event);
        self.event_time = None;
        response
    }

    fn dispatch(&mut self, event: &HostEvent) -> Result<HostResponse, VibeflowError> {
        match (event.kind, &event.payload) {
            (EventKind::TextChange, Some(Payload::TextChange { changes })) => {
                let change = ChangeEvent {
                    timestamp: event.timestamp,
                    changes: changes.clone(),
                };
                Ok(HostResponse::Edits {
                    events: self.on_text_change(&change),
                })
            }
            (EventKind::Focus, Some(Payload::Focus { focused })) => {
                self.on_focus_change(*focused);
                Ok(HostResponse::Ack)
            }
            (EventKind::Tick, _) => Ok(HostResponse::Tick(self.tick())),
            (EventKind::DashboardAck, _) => {
                self.acknowledge_dashboard();
                Ok(HostResponse::Ack)
            }
            (EventKind::Decision, Some(Payload::Decision { token, choice })) => {
                self.submit_decision(*token, choice.clone());
                Ok(HostResponse::Ack)
            }
            (EventKind::Command, Some(Payload::Command { command, mood, path })) => {
                self.run_command(*command, mood.as_deref(), path.as_deref())
            }
            (kind, _) => Err(VibeflowError::InvalidEvent(format!(
                "payload does not match kind {:?}",
                kind
            ))),
        }
    }

    fn run_command(
        &mut self,
        command: Command,
        mood: Option<&str>,
        path: Option<&str>,
    ) -> Result<HostResponse, VibeflowError> {
        match command {
            Command::ReportMood => match mood {
                Some(raw) => {
                    let mood: Mood = raw.parse().map_err(VibeflowError::InvalidEvent)?;
                    Ok(HostResponse::Mood {
                        entry: self.record_mood(mood),
                    })
                }
                None => Ok(HostResponse::Prompt {
                    prompt: self.request_mood(),
                }),
            },
            Command::ToggleAssist => Ok(HostResponse::Assist {
                enabled: self.toggle_assist(),
            }),
            Command::LogAiReject => Ok(HostResponse::Rejected {
                ai_rejections: self.log_ai_reject(),
            }),
            Command::ExportLogs => {
                let path = path.ok_or_else(|| VibeflowError::InvalidEvent("export_logs needs a path".to_string()))?;
                let mut sink = FileExportSink::new(path);
                Ok(HostResponse::Exported {
                    location: self.export_logs(&mut sink)?,
                })
            }
            Command::OpenDashboard => Ok(HostResponse::Snapshot {
                snapshot: self.open_dashboard(),
            }),
        }
    }
}

impl Drop for FlowSession {
    fn drop(&mut self) {
        self.flush();
    }
}

//! Structured lifecycle events for liberation runs.
//!
//! `PipelineSpan` tags everything logged during a run with its
//! `pipeline_id`; the `emit_*` functions log one event per lifecycle step.
//! Secrets never pass through here: only names, counts and statuses.

use tracing::{info, warn};

/// RAII guard for a pipeline-scoped span.
///
/// Holds a plain span rather than an entered one so it can live across
/// `.await` points; use [`PipelineSpan::span`] with `Instrument`.
pub struct PipelineSpan {
    span: tracing::Span,
}

impl PipelineSpan {
    pub fn new(pipeline_id: &str, project_name: &str) -> Self {
        let span = tracing::info_span!(
            "liberator.pipeline",
            pipeline_id = %pipeline_id,
            project = %project_name
        );
        Self { span }
    }

    pub fn span(&self) -> tracing::Span {
        self.span.clone()
    }
}

pub fn emit_pipeline_started(pipeline_id: &str, phases: &[&str], files: usize) {
    info!(
        event = "pipeline.started",
        pipeline_id = %pipeline_id,
        phases = ?phases,
        files = files,
    );
}

pub fn emit_phase_started(pipeline_id: &str, phase: &str) {
    info!(event = "phase.started", pipeline_id = %pipeline_id, phase = %phase);
}

/// Failed phases log at `warn`.
pub fn emit_phase_finished(
    pipeline_id: &str,
    phase: &str,
    success: bool,
    http_status: u16,
    duration_ms: u64,
) {
    if success {
        info!(
            event = "phase.finished",
            pipeline_id = %pipeline_id,
            phase = %phase,
            success = success,
            http_status = http_status,
            duration_ms = duration_ms,
        );
    } else {
        warn!(
            event = "phase.finished",
            pipeline_id = %pipeline_id,
            phase = %phase,
            success = success,
            http_status = http_status,
            duration_ms = duration_ms,
        );
    }
}

pub fn emit_rollback(pipeline_id: &str, project_uuid: &str, clean: bool) {
    warn!(
        event = "deploy.rollback",
        pipeline_id = %pipeline_id,
        project_uuid = %project_uuid,
        clean = clean,
    );
}

pub fn emit_cleanup_scheduled(pipeline_id: &str, application_uuid: &str, delay_secs: u64) {
    info!(
        event = "cleanup.scheduled",
        pipeline_id = %pipeline_id,
        application_uuid = %application_uuid,
        delay_secs = delay_secs,
    );
}

pub fn emit_pipeline_finished(pipeline_id: &str, success: bool, phases_run: usize, duration_ms: u64) {
    info!(
        event = "pipeline.finished",
        pipeline_id = %pipeline_id,
        success = success,
        phases_run = phases_run,
        duration_ms = duration_ms,
    );
}

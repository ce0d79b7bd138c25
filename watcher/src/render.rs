//! Plain-text rendering of a pipeline view

use std::fmt::Write;

use colored::{ColoredString, Colorize};

use crate::models::status::{Status, StatusCategory};
use crate::observe::view::{LogPanel, PipelineView, Selection, ViewStatus};
use crate::utils::format_relative;

/// Render a view as terminal text, showing at most `log_tail_lines` log lines
pub fn render(view: &PipelineView, log_tail_lines: usize) -> String {
    let mut out = String::new();

    let pipeline = match (&view.status, &view.pipeline) {
        (ViewStatus::NotFound, _) => {
            let _ = writeln!(out, "Pipeline #{} not found", view.pipeline_id);
            return out;
        }
        (ViewStatus::Unavailable(reason), _) => {
            let _ = writeln!(
                out,
                "Pipeline #{} unavailable: {}",
                view.pipeline_id,
                reason.red()
            );
            return out;
        }
        (_, Some(pipeline)) => pipeline,
        (_, None) => {
            let _ = writeln!(out, "Loading pipeline #{}...", view.pipeline_id);
            return out;
        }
    };

    let commit = pipeline.short_commit().unwrap_or("manual");
    let _ = write!(
        out,
        "{} {} @ {}  {}  created {}",
        format!("Pipeline #{}", pipeline.id).bold(),
        pipeline.branch,
        commit,
        status_badge(&pipeline.status),
        format_relative(pipeline.created_at)
    );
    if view.stale.pipeline {
        let _ = write!(out, " {}", "(stale)".dimmed());
    }
    out.push('\n');

    if view.jobs_loading {
        let _ = writeln!(out, "  Loading jobs...");
    } else if view.stages.is_empty() {
        let _ = writeln!(out, "  No jobs");
    }

    for stage in &view.stages {
        let _ = writeln!(out, "{}  {}", stage.name.bold(), status_badge(&stage.status()));
        for job in &stage.jobs {
            let marker = if view.selection == Selection::Job(job.id) {
                ">"
            } else {
                " "
            };
            let _ = write!(
                out,
                " {} #{:<5} {:<24} {}",
                marker,
                job.id,
                job.name,
                status_badge(&job.status)
            );
            if let Some(code) = job.exit_code {
                let _ = write!(out, " exit {}", code);
            }
            out.push('\n');
        }
    }
    if view.stale.jobs {
        let _ = writeln!(out, "  {}", "(jobs stale)".dimmed());
    }

    if let Some(deployment) = &view.deployment {
        let _ = write!(
            out,
            "{}  {}",
            "Deployment".bold(),
            status_badge(&deployment.status)
        );
        if view.stale.deployment {
            let _ = write!(out, " {}", "(stale)".dimmed());
        }
        out.push('\n');
    }

    if let Some(log) = &view.log {
        render_log(&mut out, log, view.stale.log, log_tail_lines);
    }

    out
}

fn render_log(out: &mut String, log: &LogPanel, stale: bool, max_lines: usize) {
    let mut header = format!("--- {} ", log.title);
    if log.missing {
        header.push_str("(unavailable) ");
    } else if log.settled {
        header.push_str("(complete) ");
    } else if log.following {
        header.push_str("(following) ");
    }
    if stale {
        header.push_str("(stale) ");
    }
    let _ = writeln!(out, "{}", header.bold());

    if log.missing {
        let _ = writeln!(out, "  No logs for this target");
        return;
    }
    if log.loading {
        let _ = writeln!(out, "  Loading logs...");
        return;
    }
    if log.lines.is_empty() {
        let _ = writeln!(out, "  No log output yet");
        return;
    }

    let start = log.lines.len().saturating_sub(max_lines);
    for (index, line) in log.lines.iter().enumerate().skip(start) {
        let number = format!("{:>5}", index + 1);
        let _ = writeln!(out, "{} | {}", number.dimmed(), line);
    }
}

fn status_badge(status: &Status) -> ColoredString {
    let text = status.as_str().to_uppercase();
    match status.category() {
        StatusCategory::Waiting => text.yellow(),
        StatusCategory::Active => text.blue(),
        StatusCategory::Succeeded => text.green(),
        StatusCategory::Failed => text.red(),
        StatusCategory::RolledBack => text.magenta(),
    }
}

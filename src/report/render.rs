// Report renderer: one self-contained HTML document per report run.
//
// Sections: header, metric cards, burndown chart, daily table, assignee
// rollup, and the three task lists. No external resources are referenced
// so the document renders the same in a browser and in a headless PDF
// exporter.

#![allow(clippy::cast_precision_loss)]

use std::fmt::Write as _;

use chrono::{DateTime, FixedOffset, SecondsFormat, Utc};

use super::types::{ReportData, TaskLine};
use crate::error::Result;

/// Render the report document. `generated_at` is the only input that may
/// differ between two runs over the same data.
pub fn render_html(data: &ReportData, offset: FixedOffset, generated_at: DateTime<Utc>) -> Result<String> {
    let mut h = String::with_capacity(16 * 1024);
    let title = escape_html(&data.sprint.name);

    writeln!(h, "<!DOCTYPE html>")?;
    writeln!(h, "<html lang=\"en\">")?;
    writeln!(h, "<head>")?;
    writeln!(h, "<meta charset=\"utf-8\">")?;
    writeln!(h, "<title>Sprint Report: {title}</title>")?;
    writeln!(h, "<style>{REPORT_CSS}</style>")?;
    writeln!(h, "</head>")?;
    writeln!(h, "<body>")?;

    render_header(&mut h, data, offset)?;
    render_metric_cards(&mut h, data)?;
    render_burndown_chart(&mut h, data)?;
    render_daily_table(&mut h, data)?;
    render_assignees(&mut h, data)?;
    render_task_list(&mut h, "Completed", &data.completed, offset)?;
    render_task_list(&mut h, "In Progress", &data.in_progress, offset)?;
    render_task_list(&mut h, "Not Done", &data.not_done, offset)?;

    writeln!(
        h,
        "<footer>Generated {}</footer>",
        generated_at.to_rfc3339_opts(SecondsFormat::Secs, true)
    )?;
    writeln!(h, "</body>")?;
    writeln!(h, "</html>")?;

    Ok(h)
}

fn render_header(h: &mut String, data: &ReportData, offset: FixedOffset) -> Result<()> {
    let s = &data.sprint;
    writeln!(h, "<header>")?;
    writeln!(h, "<h1>{}</h1>", escape_html(&s.name))?;
    if let Some(goal) = s.goal.as_deref().filter(|g| !g.trim().is_empty()) {
        writeln!(h, "<p class=\"goal\">{}</p>", escape_html(goal))?;
    }
    writeln!(
        h,
        "<p class=\"meta\"><span class=\"badge\">{}</span> {} to {} (UTC{})</p>",
        s.status.as_str(),
        s.start.with_timezone(&offset).format("%Y-%m-%d"),
        s.end.with_timezone(&offset).format("%Y-%m-%d"),
        escape_html(&s.utc_offset)
    )?;
    writeln!(h, "</header>")?;
    Ok(())
}

fn render_metric_cards(h: &mut String, data: &ReportData) -> Result<()> {
    let m = &data.metrics;
    writeln!(h, "<section>")?;
    writeln!(h, "<h2>Summary</h2>")?;
    writeln!(h, "<div class=\"metrics\">")?;

    emit_metric(h, "Velocity", &m.velocity.to_string())?;
    emit_metric(h, "Total Points", &m.total_points.to_string())?;
    emit_metric(h, "Completion", &format!("{}%", m.completion_pct))?;
    emit_metric(
        h,
        "Tasks Done",
        &format!("{}/{}", m.tasks_completed, m.tasks_total),
    )?;
    emit_metric(h, "Scoped In", &m.scoped_in.to_string())?;
    emit_metric(h, "Carried Over", &m.carried_over.to_string())?;
    emit_metric(h, "Reopened", &m.reopened.to_string())?;
    let cycle = m
        .cycle_time
        .avg_days
        .map_or_else(|| "n/a".to_string(), |d| format!("{d:.1}d"));
    emit_metric(h, "Avg Cycle Time", &cycle)?;

    writeln!(h, "</div>")?;
    writeln!(h, "</section>")?;
    Ok(())
}

fn emit_metric(h: &mut String, label: &str, value: &str) -> Result<()> {
    writeln!(
        h,
        "<div class=\"metric\"><span class=\"value\">{value}</span>\
         <span class=\"label\">{label}</span></div>"
    )?;
    Ok(())
}

fn render_burndown_chart(h: &mut String, data: &ReportData) -> Result<()> {
    let remaining: Vec<u64> = data.metrics.burndown.iter().map(|d| d.points).collect();

    writeln!(h, "<section>")?;
    writeln!(h, "<h2>Burndown</h2>")?;
    writeln!(
        h,
        "<svg class=\"chart\" width=\"720\" height=\"240\" viewBox=\"0 0 100 100\" \
         preserveAspectRatio=\"none\" xmlns=\"http://www.w3.org/2000/svg\" role=\"img\" \
         aria-label=\"Burndown chart\">"
    )?;
    writeln!(
        h,
        "<line x1=\"0\" y1=\"0\" x2=\"100\" y2=\"100\" stroke=\"#b0b7c3\" stroke-width=\"1\" \
         stroke-dasharray=\"4 3\" vector-effect=\"non-scaling-stroke\"/>"
    )?;
    writeln!(
        h,
        "<polyline fill=\"none\" stroke=\"#2563eb\" stroke-width=\"2\" \
         vector-effect=\"non-scaling-stroke\" points=\"{}\"/>",
        burndown_points(&remaining)
    )?;
    writeln!(h, "</svg>")?;
    writeln!(h, "</section>")?;
    Ok(())
}

/// Polyline coordinates for the burndown series on a 100x100 viewport.
///
/// Values are scaled against the series maximum (1 when every value is zero)
/// and spread evenly across the x axis.
pub fn burndown_points(values: &[u64]) -> String {
    let max = values.iter().copied().max().filter(|&m| m > 0).unwrap_or(1) as f64;
    let step = if values.len() <= 1 {
        100.0
    } else {
        100.0 / (values.len() - 1) as f64
    };

    values
        .iter()
        .enumerate()
        .map(|(i, &v)| {
            let x = i as f64 * step;
            let y = 100.0 - (v as f64 / max) * 100.0;
            format!("{x:.2},{y:.2}")
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn render_daily_table(h: &mut String, data: &ReportData) -> Result<()> {
    let m = &data.metrics;
    writeln!(h, "<section>")?;
    writeln!(h, "<h2>Daily Progress</h2>")?;
    writeln!(
        h,
        "<table><thead><tr><th>Date</th><th class=\"num\">Completed</th>\
         <th class=\"num\">Remaining</th></tr></thead><tbody>"
    )?;
    for (done, left) in m.throughput.iter().zip(&m.burndown) {
        writeln!(
            h,
            "<tr><td>{}</td><td class=\"num\">{}</td><td class=\"num\">{}</td></tr>",
            done.date.format("%Y-%m-%d"),
            done.points,
            left.points
        )?;
    }
    writeln!(h, "</tbody></table>")?;
    writeln!(h, "</section>")?;
    Ok(())
}

fn render_assignees(h: &mut String, data: &ReportData) -> Result<()> {
    writeln!(h, "<section>")?;
    writeln!(h, "<h2>By Assignee</h2>")?;
    if data.assignees.is_empty() {
        writeln!(h, "<p class=\"empty\">No completed work.</p>")?;
        writeln!(h, "</section>")?;
        return Ok(());
    }
    writeln!(
        h,
        "<table><thead><tr><th>Name</th><th>Email</th><th class=\"num\">Points</th>\
         <th class=\"num\">Tasks</th></tr></thead><tbody>"
    )?;
    for a in &data.assignees {
        writeln!(
            h,
            "<tr><td>{}</td><td>{}</td><td class=\"num\">{}</td><td class=\"num\">{}</td></tr>",
            escape_html(&a.name),
            escape_html(&a.email),
            a.points_done,
            a.tasks_done
        )?;
    }
    writeln!(h, "</tbody></table>")?;
    writeln!(h, "</section>")?;
    Ok(())
}

fn render_task_list(h: &mut String, heading: &str, tasks: &[TaskLine], offset: FixedOffset) -> Result<()> {
    writeln!(h, "<section>")?;
    writeln!(h, "<h2>{heading} ({})</h2>", tasks.len())?;
    if tasks.is_empty() {
        writeln!(h, "<p class=\"empty\">None.</p>")?;
        writeln!(h, "</section>")?;
        return Ok(());
    }
    writeln!(
        h,
        "<table><thead><tr><th>Task</th><th class=\"num\">Points</th><th>Status</th>\
         <th>Type</th><th>Priority</th><th>Done</th></tr></thead><tbody>"
    )?;
    for t in tasks {
        let done = t
            .done_at
            .map(|d| d.with_timezone(&offset).format("%Y-%m-%d").to_string())
            .unwrap_or_default();
        let reopened = if t.reopened {
            " <span class=\"tag\">reopened</span>"
        } else {
            ""
        };
        writeln!(
            h,
            "<tr><td>{}{reopened}</td><td class=\"num\">{}</td><td>{}</td><td>{}</td>\
             <td>{}</td><td>{done}</td></tr>",
            escape_html(&t.title),
            t.points,
            escape_html(t.status.as_deref().unwrap_or("BACKLOG")),
            escape_html(&t.task_type),
            escape_html(&t.priority)
        )?;
    }
    writeln!(h, "</tbody></table>")?;
    writeln!(h, "</section>")?;
    Ok(())
}

/// Escape text for interpolation into HTML element content or attributes.
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

const REPORT_CSS: &str = "\
body{font-family:-apple-system,\"Segoe UI\",Helvetica,Arial,sans-serif;\
width:760px;margin:0 auto;padding:24px;color:#1f2937;background:#fff;font-size:14px}\
header{border-bottom:2px solid #1f2937;padding-bottom:12px}\
h1{margin:0 0 8px 0;font-size:26px}\
h2{margin:28px 0 10px 0;font-size:18px;color:#111827}\
.goal{margin:0 0 6px 0;color:#374151}\
.meta{margin:0;color:#6b7280}\
.badge{display:inline-block;padding:2px 8px;border-radius:4px;background:#e5e7eb;\
font-size:12px;font-weight:600;color:#374151}\
.metrics{display:flex;flex-wrap:wrap;gap:12px}\
.metric{width:160px;text-align:center;padding:12px 0;background:#f3f4f6;border-radius:6px}\
.metric .value{display:block;font-size:24px;font-weight:bold;color:#111827}\
.metric .label{font-size:12px;color:#6b7280}\
.chart{display:block;border:1px solid #e5e7eb;border-radius:6px;background:#fafafa}\
table{border-collapse:collapse;width:100%;margin:8px 0}\
th,td{padding:6px 10px;text-align:left;border-bottom:1px solid #e5e7eb}\
th{background:#f9fafb;font-weight:600}\
.num{text-align:right}\
.tag{font-size:11px;padding:1px 6px;border-radius:3px;background:#fef3c7;color:#92400e}\
.empty{color:#9ca3af}\
section{margin-bottom:20px;page-break-inside:avoid}\
footer{margin-top:32px;text-align:center;color:#9ca3af;font-size:12px}";

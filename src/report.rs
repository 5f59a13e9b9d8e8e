use std::fmt::Write;

use serde::Serialize;

use crate::config::Policy;
use crate::models::{Analysis, Measurement, Outcome, Projection, SourceInfo, Status, Totals};

const RULE_WIDTH: usize = 70;

#[derive(Debug, Default)]
pub struct Summary<'a> {
    pub critical: Vec<(&'a Analysis, &'a Measurement)>,
    pub watch: Vec<(&'a Analysis, &'a Measurement)>,
    pub comfortable: Vec<(&'a Analysis, &'a Measurement)>,
    pub no_data: Vec<&'a Analysis>,
    pub totals: Totals,
}

impl<'a> Summary<'a> {
    /// Comfortable subjects with room to skip, most room first; ties keep input order.
    pub fn bunkable(&self) -> Vec<(&'a Analysis, &'a Measurement)> {
        let mut bunkable: Vec<_> = self
            .comfortable
            .iter()
            .copied()
            .filter(|(_, measurement)| measurement.skippable > 0)
            .collect();
        bunkable.sort_by(|a, b| b.1.skippable.cmp(&a.1.skippable));
        bunkable
    }
}

pub fn summarize(analyses: &[Analysis]) -> Summary<'_> {
    let mut summary = Summary::default();
    for analysis in analyses {
        let totals = &mut summary.totals;
        totals.subjects += 1;
        totals.attended = totals.attended.saturating_add(analysis.attended);
        totals.held = totals.held.saturating_add(analysis.held);
        match analysis.measurement().map(|m| m.status) {
            Some(Status::Safe) => totals.safe += 1,
            Some(Status::Danger) => totals.danger += 1,
            None => totals.no_data += 1,
        }

        match &analysis.outcome {
            Outcome::NoData => summary.no_data.push(analysis),
            Outcome::Measured(m) if m.status == Status::Danger => summary.critical.push((analysis, m)),
            Outcome::Measured(m) if !m.in_safe_zone => summary.watch.push((analysis, m)),
            Outcome::Measured(m) => summary.comfortable.push((analysis, m)),
        }
    }
    summary
}

pub fn status_marker(measurement: &Measurement) -> &'static str {
    match (measurement.status, measurement.in_safe_zone) {
        (Status::Safe, true) => "✓ SAFE",
        (Status::Safe, false) => "⚠ SAFE (below safe zone)",
        (Status::Danger, _) => "✗ DANGER",
    }
}

pub fn recommendation(measurement: &Measurement) -> String {
    match measurement.status {
        Status::Safe if measurement.skippable > 0 => {
            format!("You can safely bunk {} more classes", measurement.skippable)
        }
        Status::Safe => "No classes can be safely bunked right now".to_string(),
        Status::Danger => format!(
            "You need to attend {} more classes to be safe!",
            measurement.needed
        ),
    }
}

pub fn projection_note(projection: &Projection) -> String {
    match projection.max_skips {
        Some(skips) => format!(
            "Of the next {} classes you can miss up to {}",
            projection.remaining, skips
        ),
        None => format!(
            "Even attending all of the next {} classes leaves you below target",
            projection.remaining
        ),
    }
}

pub fn totals_line(totals: &Totals) -> String {
    let overall = totals
        .percentage()
        .map_or_else(|| "N/A".to_string(), |percentage| format!("{percentage:.1}%"));
    format!(
        "Overall: {}/{} classes attended ({}) across {} subject(s): {} safe, {} danger, {} no data",
        totals.attended,
        totals.held,
        overall,
        totals.subjects,
        totals.safe,
        totals.danger,
        totals.no_data
    )
}

fn rule(output: &mut String) {
    let _ = writeln!(output, "{}", "=".repeat(RULE_WIDTH));
}

fn policy_line(policy: &Policy) -> String {
    format!(
        "Target: {} (Safe Zone: {})",
        policy.threshold(),
        policy.safe_zone()
    )
}

fn source_line(info: &SourceInfo) -> Option<String> {
    match (&info.source, &info.captured) {
        (Some(source), Some(captured)) => Some(format!("Source: {source} (captured {captured})")),
        (Some(source), None) => Some(format!("Source: {source}")),
        (None, Some(captured)) => Some(format!("Captured: {captured}")),
        (None, None) => None,
    }
}

pub fn render_text(
    analyses: &[Analysis],
    policy: &Policy,
    info: &SourceInfo,
    remaining: Option<u64>,
) -> String {
    let mut output = String::new();

    rule(&mut output);
    let _ = writeln!(output, "ATTENDANCE ANALYSIS & BUNK STRATEGY");
    rule(&mut output);
    let _ = writeln!(output, "{}", policy_line(policy));
    if let Some(line) = source_line(info) {
        let _ = writeln!(output, "{line}");
    }
    if let Some(remaining) = remaining {
        let _ = writeln!(output, "Assuming {remaining} more classes per subject this semester");
    }
    let _ = writeln!(output);

    if analyses.is_empty() {
        let _ = writeln!(output, "No subjects found in the attendance data.");
        let _ = writeln!(output);
    }

    for analysis in analyses {
        let _ = writeln!(output, "{}", analysis.subject);
        match &analysis.outcome {
            Outcome::NoData => {
                let _ = writeln!(output, "  Current: 0/0 (N/A) NO DATA");
                let _ = writeln!(output, "  → No classes held yet; nothing to compute");
            }
            Outcome::Measured(measurement) => {
                let _ = writeln!(
                    output,
                    "  Current: {}/{} ({:.1}%) {}",
                    analysis.attended,
                    analysis.held,
                    measurement.percentage,
                    status_marker(measurement)
                );
                let _ = writeln!(output, "  Buffer: {:+.1}% from minimum", measurement.buffer);
                let _ = writeln!(output, "  → {}", recommendation(measurement));
                if let Some(projection) = &measurement.projection {
                    let _ = writeln!(output, "  → {}", projection_note(projection));
                }
            }
        }
        let _ = writeln!(output);
    }

    let summary = summarize(analyses);
    let threshold = policy.threshold();

    rule(&mut output);
    let _ = writeln!(output, "OVERALL RECOMMENDATION");
    rule(&mut output);
    let _ = writeln!(output, "{}", totals_line(&summary.totals));
    let _ = writeln!(output);

    if !summary.critical.is_empty() {
        let _ = writeln!(
            output,
            "✗ CRITICAL: You're below {} in {} subject(s)!",
            threshold,
            summary.critical.len()
        );
        let _ = writeln!(output, "Priority: Attend ALL classes for:");
        for (analysis, measurement) in &summary.critical {
            let _ = writeln!(
                output,
                "  • {}: Need {} more classes",
                analysis.subject, measurement.needed
            );
        }
        let _ = writeln!(output);
    }

    if !summary.watch.is_empty() {
        let _ = writeln!(
            output,
            "⚠ WARNING: {} subject(s) need attention",
            summary.watch.len()
        );
        let _ = writeln!(output, "Be careful with:");
        for (analysis, measurement) in &summary.watch {
            let _ = writeln!(
                output,
                "  • {}: Only {:+.1}% buffer",
                analysis.subject, measurement.buffer
            );
        }
        let _ = writeln!(output);
    }

    if !summary.comfortable.is_empty() {
        let _ = writeln!(
            output,
            "✓ SAFE to bunk in {} subject(s):",
            summary.comfortable.len()
        );
        let bunkable = summary.bunkable();
        for (analysis, measurement) in &bunkable {
            let _ = writeln!(
                output,
                "  • {}: Up to {} classes",
                analysis.subject, measurement.skippable
            );
        }
        if bunkable.is_empty() {
            let _ = writeln!(output, "  (But recommended to attend all to maintain buffer)");
        }
        let _ = writeln!(output);
    }

    if !summary.no_data.is_empty() {
        let _ = writeln!(
            output,
            "NO DATA: {} subject(s) have no classes held yet:",
            summary.no_data.len()
        );
        for analysis in &summary.no_data {
            let _ = writeln!(output, "  • {}", analysis.subject);
        }
        let _ = writeln!(output);
    }

    output
}

#[derive(Serialize)]
struct JsonReport<'a> {
    threshold: f64,
    safe_zone: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    source: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    captured: Option<&'a str>,
    stats: JsonStats,
    subjects: &'a [Analysis],
}

#[derive(Serialize)]
struct JsonStats {
    #[serde(flatten)]
    totals: Totals,
    overall_percentage: Option<f64>,
}

pub fn render_json(
    analyses: &[Analysis],
    policy: &Policy,
    info: &SourceInfo,
) -> serde_json::Result<String> {
    let totals = summarize(analyses).totals;
    let report = JsonReport {
        threshold: policy.threshold().as_f64(),
        safe_zone: policy.safe_zone().as_f64(),
        source: info.source.as_deref(),
        captured: info.captured.as_deref(),
        stats: JsonStats {
            totals,
            overall_percentage: totals.percentage(),
        },
        subjects: analyses,
    };
    serde_json::to_string_pretty(&report).map(|body| body + "\n")
}

pub fn render_markdown(
    analyses: &[Analysis],
    policy: &Policy,
    info: &SourceInfo,
    remaining: Option<u64>,
) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Attendance Bunk Report");
    let _ = writeln!(output, "{}", policy_line(policy));
    if let Some(line) = source_line(info) {
        let _ = writeln!(output);
        let _ = writeln!(output, "{line}");
    }
    let _ = writeln!(output);
    let _ = writeln!(output, "## Subjects");

    if analyses.is_empty() {
        let _ = writeln!(output, "No subjects found in the attendance data.");
    } else {
        let _ = writeln!(output, "| Subject | Attended | Percentage | Status | Buffer | Recommendation |");
        let _ = writeln!(output, "| --- | --- | --- | --- | --- | --- |");
        for analysis in analyses {
            match analysis.measurement() {
                None => {
                    let _ = writeln!(
                        output,
                        "| {} | 0/0 | N/A | NO DATA | N/A | No classes held yet |",
                        analysis.subject
                    );
                }
                Some(measurement) => {
                    let mut advice = recommendation(measurement);
                    if let Some(projection) = &measurement.projection {
                        advice = format!("{advice}. {}", projection_note(projection));
                    }
                    let _ = writeln!(
                        output,
                        "| {} | {}/{} | {:.1}% | {} | {:+.1}% | {} |",
                        analysis.subject,
                        analysis.attended,
                        analysis.held,
                        measurement.percentage,
                        status_marker(measurement),
                        measurement.buffer,
                        advice
                    );
                }
            }
        }
    }

    let summary = summarize(analyses);
    let _ = writeln!(output);
    let _ = writeln!(output, "## Overall");
    let _ = writeln!(output, "{}", totals_line(&summary.totals));

    let _ = writeln!(output);
    let _ = writeln!(output, "## Attend Everything");
    if summary.critical.is_empty() {
        let _ = writeln!(output, "No subjects below {}.", policy.threshold());
    } else {
        for (analysis, measurement) in &summary.critical {
            let _ = writeln!(
                output,
                "- {}: attend {} more classes",
                analysis.subject, measurement.needed
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Room To Bunk");
    let bunkable = summary.bunkable();
    if bunkable.is_empty() {
        let _ = writeln!(output, "No subject has classes to spare.");
    } else {
        for (analysis, measurement) in &bunkable {
            let _ = writeln!(
                output,
                "- {}: up to {} classes",
                analysis.subject, measurement.skippable
            );
        }
    }

    if let Some(remaining) = remaining {
        let _ = writeln!(output);
        let _ = writeln!(output, "_Projection assumes {remaining} more classes per subject._");
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bunk::analyze_all;
    use crate::models::SubjectRecord;

    fn records() -> Vec<SubjectRecord> {
        [
            ("Operating Systems", 40, 33),
            ("Data Structures", 53, 23),
            ("Mathematics", 20, 15),
            ("Physics Lab", 10, 10),
            ("Open Elective", 0, 0),
        ]
        .into_iter()
        .map(|(name, held, attended)| SubjectRecord {
            name: name.to_string(),
            held,
            attended,
        })
        .collect()
    }

    fn sample_text(remaining: Option<u64>) -> String {
        let policy = Policy::default();
        let analyses = analyze_all(&records(), &policy, remaining).unwrap();
        render_text(&analyses, &policy, &SourceInfo::default(), remaining)
    }

    #[test]
    fn text_report_lists_subjects_in_input_order() {
        let text = sample_text(None);
        assert!(text.contains("Target: 75.0% (Safe Zone: 76.0%)"));
        let positions: Vec<_> = ["Operating Systems\n", "Data Structures\n", "Mathematics\n", "Physics Lab\n", "Open Elective\n"]
            .iter()
            .map(|name| text.find(name).unwrap())
            .collect();
        assert!(positions.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn text_report_carries_recommendations() {
        let text = sample_text(None);
        assert!(text.contains("  Current: 23/53 (43.4%) ✗ DANGER"));
        assert!(text.contains("  Buffer: -31.6% from minimum"));
        assert!(text.contains("You need to attend 67 more classes to be safe!"));
        assert!(text.contains("  Current: 10/10 (100.0%) ✓ SAFE"));
        assert!(text.contains("You can safely bunk 3 more classes"));
        assert!(text.contains("  Current: 15/20 (75.0%) ⚠ SAFE (below safe zone)"));
        assert!(text.contains("No classes can be safely bunked right now"));
        assert!(text.contains("  Current: 0/0 (N/A) NO DATA"));
    }

    #[test]
    fn overall_section_orders_bunkable_by_room() {
        let text = sample_text(None);
        let os = text.find("  • Operating Systems: Up to 4 classes").unwrap();
        let lab = text.find("  • Physics Lab: Up to 3 classes").unwrap();
        assert!(os < lab);
        assert!(text.contains("  • Data Structures: Need 67 more classes"));
        assert!(text.contains("  • Mathematics: Only +0.0% buffer"));
    }

    #[test]
    fn projection_lines_appear_when_requested() {
        let text = sample_text(Some(20));
        assert!(text.contains("Assuming 20 more classes per subject this semester"));
        assert!(text.contains("Of the next 20 classes you can miss up to 7"));
        assert!(text.contains("Even attending all of the next 20 classes leaves you below target"));
    }

    #[test]
    fn rendering_is_deterministic() {
        assert_eq!(sample_text(Some(5)), sample_text(Some(5)));
    }

    #[test]
    fn json_report_keeps_no_data_distinct() {
        let policy = Policy::default();
        let analyses = analyze_all(&records(), &policy, None).unwrap();
        let body = render_json(&analyses, &policy, &SourceInfo::default()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&body).unwrap();
        let subjects = value["subjects"].as_array().unwrap();
        assert_eq!(subjects[1]["status"], "DANGER");
        assert_eq!(subjects[1]["needed"], 67);
        assert_eq!(subjects[4]["outcome"], "no_data");
        assert!(subjects[4].get("percentage").is_none());
        assert_eq!(value["threshold"], 0.75);
        assert_eq!(value["stats"]["attended"], 81);
        assert_eq!(value["stats"]["held"], 123);
        assert_eq!(value["stats"]["danger"], 1);
    }

    #[test]
    fn totals_sum_counts_instead_of_averaging_percentages() {
        let policy = Policy::default();
        let analyses = analyze_all(&records(), &policy, None).unwrap();
        let totals = summarize(&analyses).totals;
        assert_eq!(
            totals,
            Totals {
                subjects: 5,
                safe: 3,
                danger: 1,
                no_data: 1,
                attended: 81,
                held: 123,
            }
        );
        assert!((totals.percentage().unwrap() - 100.0 * 81.0 / 123.0).abs() < 1e-9);

        let text = render_text(&analyses, &policy, &SourceInfo::default(), None);
        assert!(text.contains(
            "Overall: 81/123 classes attended (65.9%) across 5 subject(s): 3 safe, 1 danger, 1 no data"
        ));
    }

    #[test]
    fn totals_without_held_classes_are_not_available() {
        let analyses = analyze_all(
            &[SubjectRecord {
                name: "Open Elective".to_string(),
                held: 0,
                attended: 0,
            }],
            &Policy::default(),
            None,
        )
        .unwrap();
        let totals = summarize(&analyses).totals;
        assert_eq!(totals.percentage(), None);
        assert!(totals_line(&totals).starts_with("Overall: 0/0 classes attended (N/A)"));

        let body = render_json(&analyses, &Policy::default(), &SourceInfo::default()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(value["stats"]["overall_percentage"], serde_json::Value::Null);
        assert_eq!(value["stats"]["no_data"], 1);
    }

    #[test]
    fn markdown_report_has_table_and_lists() {
        let policy = Policy::default();
        let analyses = analyze_all(&records(), &policy, None).unwrap();
        let info = SourceInfo {
            source: Some("Acharya ERP".to_string()),
            captured: Some("2026-01-14 09:30:00".to_string()),
        };
        let markdown = render_markdown(&analyses, &policy, &info, None);
        assert!(markdown.starts_with("# Attendance Bunk Report\n"));
        assert!(markdown.contains("Source: Acharya ERP (captured 2026-01-14 09:30:00)"));
        assert!(markdown.contains("| Data Structures | 23/53 | 43.4% | ✗ DANGER | -31.6% |"));
        assert!(markdown.contains("- Data Structures: attend 67 more classes"));
        assert!(markdown.contains("- Operating Systems: up to 4 classes"));
    }
}

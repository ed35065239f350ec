//! Exporter — serializes one ranked group to comma-separated text.

use crate::matching::models::ResultGroup;

const DELIMITER: &str = ",";
const QUOTE: &str = "\"";

pub const HEADERS: [&str; 6] = [
    "Candidate",
    "ATS Score",
    "Skill Match",
    "Keyword Density",
    "Matched Skills",
    "Missing Skills",
];

/// Header row plus one row per ranked result, in rank order, `\n`-separated.
/// Output depends only on the group, so the same group always yields the same bytes.
pub fn to_delimited_text(group: &ResultGroup) -> String {
    let mut lines = Vec::with_capacity(group.rankings().len() + 1);
    lines.push(join_row(HEADERS.iter().map(|h| h.to_string())));

    for result in group.rankings() {
        lines.push(join_row([
            result.candidate_name.clone(),
            result.ats_score.to_string(),
            result.skill_match.to_string(),
            result.keyword_density.to_string(),
            result.matched_skills_display(),
            result.missing_skills_display(),
        ]));
    }

    lines.join("\n")
}

/// Download name derived from the group's display name, e.g. `ranking_backend_jd.pdf.csv`.
pub fn export_file_name(display_name: &str) -> String {
    let safe: String = display_name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("ranking_{safe}.csv")
}

fn join_row(fields: impl IntoIterator<Item = String>) -> String {
    fields
        .into_iter()
        .map(|f| quote_field(&f))
        .collect::<Vec<_>>()
        .join(DELIMITER)
}

fn quote_field(field: &str) -> String {
    let needs_quoting = [DELIMITER, QUOTE, "\n", "\r"]
        .iter()
        .any(|special| field.contains(special));
    if needs_quoting {
        format!("{QUOTE}{}{QUOTE}", field.replace(QUOTE, "\"\""))
    } else {
        field.to_string()
    }
}

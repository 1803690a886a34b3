//! Report post-processing.

use super::compiler_warnings::RULE_ID;
use super::Report;

/// Moves the compiler code of relayed warnings into the rule id, so
/// `svelte/compiler-warnings` + `"a11y-autofocus: ..."` becomes
/// `svelte/compiler-warnings/a11y-autofocus` + `"..."`.
pub fn postprocess(reports: Vec<Report>) -> Vec<Report> {
    reports
        .into_iter()
        .map(|report| {
            if report.rule_id != RULE_ID {
                return report;
            }
            match report.message.split_once(": ") {
                Some((code, message)) => Report {
                    rule_id: format!("{RULE_ID}/{code}"),
                    message: message.to_string(),
                    ..report
                },
                None => report,
            }
        })
        .collect()
}

//! Status command: policy summary and current shift membership.

use std::io::Write;

use anyhow::{Context, Result};
use chrono::{Local, NaiveDateTime};

use wt_core::policy::{CompiledPolicy, Policy};
use wt_core::shift::ShiftSchedule;

use crate::Config;

use super::build_client;

pub async fn run<W: Write>(writer: &mut W, config: &Config) -> Result<()> {
    let client = build_client(config)?;

    let policy = client
        .fetch_work_policy()
        .await
        .context("failed to fetch work policy")?;
    let schedule = match client.load_shift_schedule().await {
        Ok(schedule) => schedule,
        Err(error) => {
            tracing::warn!(%error, "shift schedule unavailable");
            ShiftSchedule::default()
        }
    };

    render(writer, policy.as_ref(), &schedule, Local::now().naive_local())
}

pub fn render<W: Write>(
    writer: &mut W,
    policy: Option<&Policy>,
    schedule: &ShiftSchedule,
    now: NaiveDateTime,
) -> Result<()> {
    writeln!(writer, "Activity tracker status")?;
    match policy {
        None => writeln!(writer, "No work policy configured; tracking will not start.")?,
        Some(policy) => {
            let compiled = CompiledPolicy::compile(policy);
            writeln!(
                writer,
                "Policy {}: {} of {} rules usable",
                policy.id,
                compiled.rule_count(),
                policy.work_urls.len()
            )?;
            writeln!(writer, "Monitor idle time: {}", policy.monitor_idle_time)?;
            writeln!(
                writer,
                "Monitor non-work time: {}",
                policy.monitor_non_work_time
            )?;
        }
    }
    writeln!(writer, "Shift assignments: {}", schedule.assignment_count())?;
    writeln!(
        writer,
        "In active shift: {}",
        if schedule.is_in_active_shift(now) {
            "yes"
        } else {
            "no"
        }
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, NaiveTime};

    use wt_core::policy::WorkUrlRule;
    use wt_core::shift::{ShiftAssignment, ShiftDefinition, all_working_days};

    use insta::assert_snapshot;

    use super::*;

    #[test]
    fn render_reports_policy_and_shift_membership() {
        let policy = Policy {
            id: 7,
            work_urls: vec![
                WorkUrlRule {
                    url_pattern: r"/work/(\d+)".to_string(),
                    work_id_extractor: r"/work/(\d+)".to_string(),
                },
                WorkUrlRule {
                    url_pattern: "[invalid".to_string(),
                    work_id_extractor: String::new(),
                },
            ],
            monitor_idle_time: true,
            monitor_non_work_time: false,
        };
        let schedule = ShiftSchedule::new(
            vec![ShiftAssignment {
                user_id: None,
                shift_id: 1,
                start_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                end_date: NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
            }],
            vec![ShiftDefinition {
                id: 1,
                working_days: all_working_days(),
                start_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
                end_time: NaiveTime::from_hms_opt(17, 0, 0).unwrap(),
                break_minutes: 0,
            }],
        );
        let now = NaiveDate::from_ymd_opt(2024, 1, 8)
            .unwrap()
            .and_time(NaiveTime::from_hms_opt(12, 0, 0).unwrap());

        let mut output = Vec::new();
        render(&mut output, Some(&policy), &schedule, now).unwrap();

        assert_snapshot!(String::from_utf8(output).unwrap(), @r"
        Activity tracker status
        Policy 7: 1 of 2 rules usable
        Monitor idle time: true
        Monitor non-work time: false
        Shift assignments: 1
        In active shift: yes
        ");
    }

    #[test]
    fn render_without_policy_explains_no_tracking() {
        let mut output = Vec::new();
        let now = NaiveDate::from_ymd_opt(2024, 1, 8)
            .unwrap()
            .and_time(NaiveTime::from_hms_opt(12, 0, 0).unwrap());
        render(&mut output, None, &ShiftSchedule::default(), now).unwrap();

        let output = String::from_utf8(output).unwrap();
        assert!(output.contains("No work policy configured"));
        assert!(output.contains("In active shift: no"));
    }
}

//! Classify one URL against the configured policy.

use std::io::Write;

use anyhow::{Context, Result};

use wt_core::policy::CompiledPolicy;

use crate::Config;

use super::build_client;

pub async fn run<W: Write>(writer: &mut W, config: &Config, url: &str) -> Result<()> {
    let client = build_client(config)?;
    let Some(policy) = client
        .fetch_work_policy()
        .await
        .context("failed to fetch work policy")?
    else {
        writeln!(writer, "no work policy configured")?;
        return Ok(());
    };

    render(writer, &CompiledPolicy::compile(&policy), url)
}

pub fn render<W: Write>(writer: &mut W, policy: &CompiledPolicy, url: &str) -> Result<()> {
    let classification = policy.classify(url);
    match classification.work_id {
        Some(work_id) => writeln!(writer, "{} (work id: {work_id})", classification.kind)?,
        None => writeln!(writer, "{}", classification.kind)?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use wt_core::policy::{Policy, WorkUrlRule};

    use super::*;

    fn compiled() -> CompiledPolicy {
        CompiledPolicy::compile(&Policy {
            id: 1,
            work_urls: vec![WorkUrlRule {
                url_pattern: r"/work/(\d+)".to_string(),
                work_id_extractor: r"/work/(\d+)".to_string(),
            }],
            monitor_idle_time: false,
            monitor_non_work_time: false,
        })
    }

    #[test]
    fn render_work_url_with_id() {
        let mut output = Vec::new();
        render(&mut output, &compiled(), "https://x/work/42").unwrap();
        assert_eq!(String::from_utf8(output).unwrap(), "work (work id: 42)\n");
    }

    #[test]
    fn render_non_work_url() {
        let mut output = Vec::new();
        render(&mut output, &compiled(), "https://news.example.com").unwrap();
        assert_eq!(String::from_utf8(output).unwrap(), "non_work\n");
    }
}

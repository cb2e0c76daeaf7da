use std::fmt::Write;
use std::process::ExitCode;

use bytes::Bytes;
use chrono::{Duration, SecondsFormat, Utc};
use gale_http_runner::prelude::*;

const FIXTURE: &str = "large.csv";
const ROWS: usize = 50_000;
const CURRENCIES: [&str; 5] = ["USD", "EUR", "GBP", "JPY", "CHF"];

/// Build an import file with `rows` valid deals, every deal id unique and every timestamp in the past.
fn large_csv(rows: usize) -> anyhow::Result<Bytes> {
    let base = Utc::now() - Duration::days(1);
    let mut csv = String::with_capacity(rows * 48);
    csv.push_str("dealId,fromCurrency,toCurrency,timestamp,amount\n");

    for i in 0..rows {
        let from = CURRENCIES[i % CURRENCIES.len()];
        let to = CURRENCIES[(i + 1) % CURRENCIES.len()];
        let timestamp = (base - Duration::seconds(i as i64)).to_rfc3339_opts(SecondsFormat::Secs, true);
        let amount = 100.0 + (i % 10_000) as f64 * 1.25;
        writeln!(csv, "L{i:07},{from},{to},{timestamp},{amount:.2}")?;
    }

    Ok(Bytes::from(csv))
}

fn setup(ctx: &mut RunnerContext<HttpRunnerContext>) -> HookResult {
    configure_http_pool(ctx)?;

    let data = large_csv(ROWS)?;
    log::info!("Generated {FIXTURE} with {ROWS} rows, {} bytes", data.len());
    ctx.get_mut().fixtures.insert(FIXTURE.to_string(), data);

    Ok(())
}

fn import_large_file(ctx: &mut VuContext<HttpRunnerContext, HttpVuContext>) -> HookResult {
    let url = target_url(ctx.runner_context(), "/api/v1/deals/import")?;
    let data = fixture(ctx, FIXTURE)?;

    http_request(
        ctx,
        RequestSpec::post(url)
            .file_field("file", FIXTURE, "text/csv", data)
            .name("import_large_file"),
        &[
            Check::status(200),
            Check::body_contains("results").named("response has results"),
        ],
    )?;

    Ok(())
}

fn main() -> ExitCode {
    let builder =
        ScenarioDefinitionBuilder::<HttpRunnerContext, HttpVuContext>::new_with_init(env!(
            "CARGO_PKG_NAME"
        ))
        .with_default_config(include_str!("../scenario.toml"))
        .use_setup(setup)
        .use_workload(import_large_file);

    run_main(builder)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn large_csv_has_unique_ids_and_past_timestamps() {
        let data = large_csv(100).unwrap();
        let text = std::str::from_utf8(&data).unwrap();
        let lines = text.lines().collect::<Vec<_>>();

        assert_eq!(101, lines.len());
        assert_eq!("dealId,fromCurrency,toCurrency,timestamp,amount", lines[0]);

        let mut ids = std::collections::HashSet::new();
        for line in &lines[1..] {
            let fields = line.split(',').collect::<Vec<_>>();
            assert_eq!(5, fields.len());
            assert!(ids.insert(fields[0]));
            assert_ne!(fields[1], fields[2]);
            let timestamp = chrono::DateTime::parse_from_rfc3339(fields[3]).unwrap();
            assert!(timestamp < Utc::now());
        }
    }
}

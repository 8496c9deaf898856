use bench_core::{available_cpus, Strategy};

use crate::config::{Effective, RunArgs, SuiteArgs};
use crate::error::AppError;

use super::{connector, execute, print_banner};

/// Классический прогон: single → pool → batch на одинаковом числе сообщений.
const SUITE: [Strategy; 3] = [Strategy::Single, Strategy::Pool, Strategy::Batch];

pub async fn run(eff: &Effective, args: &SuiteArgs) -> Result<(), AppError> {
    let messages = eff.suite_messages(args);
    let pause = eff.suite_pause(args);
    let cpus = available_cpus();
    let connector = connector(eff);

    print_banner(eff);

    let mut reports = Vec::with_capacity(SUITE.len());
    for (i, strategy) in SUITE.into_iter().enumerate() {
        if i > 0 && !pause.is_zero() {
            tracing::debug!(pause_ms = pause.as_millis() as u64, "pause between runs");
            tokio::time::sleep(pause).await;
        }

        let run_args = RunArgs { messages: Some(messages), ..RunArgs::default() };
        let params = eff.params(strategy, &run_args, cpus);
        reports.push(execute(eff, connector.clone(), strategy, &params).await?);
    }

    if eff.json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    } else {
        println!();
        println!("All tests completed!");
    }
    Ok(())
}

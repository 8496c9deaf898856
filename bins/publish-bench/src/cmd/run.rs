use bench_core::{available_cpus, Strategy};

use crate::config::{Effective, RunArgs};
use crate::error::AppError;

use super::{connector, execute, print_banner};

pub async fn run(eff: &Effective, strategy: Strategy, args: &RunArgs) -> Result<(), AppError> {
    let params = eff.params(strategy, args, available_cpus());

    print_banner(eff);
    let report = execute(eff, connector(eff), strategy, &params).await?;

    if eff.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }
    Ok(())
}

use uuid::Uuid;

use super::{print_json, Env};

/// Run the `chaos` subcommand: classify now and print the report.
pub async fn run(env: &Env, user: Uuid) -> anyhow::Result<()> {
    let report = env.chaos_service().current_level(user).await?;
    print_json(&report)
}

use uuid::Uuid;

use super::Env;

/// Run the `history` subcommand: one line per recorded chaos level.
pub async fn run(env: &Env, user: Uuid, limit: usize) -> anyhow::Result<()> {
    let records = env.chaos_service().history(user, limit).await?;
    if records.is_empty() {
        println!("No chaos history for {user}.");
        return Ok(());
    }
    for r in &records {
        let m = &r.metrics;
        println!(
            "{}  {:<11} velocity={} switches={} urgency={} completion={}%",
            r.created_at.format("%Y-%m-%d %H:%M:%S"),
            r.level.as_str(),
            m.capture_velocity,
            m.task_switches,
            m.urgency_keywords,
            m.completion_ratio,
        );
    }
    Ok(())
}

use uuid::Uuid;

use super::Env;

pub async fn run(env: &Env, user: Uuid) -> anyhow::Result<()> {
    let fired = env.chaos_service().check_patterns(user).await?;
    if fired.is_empty() {
        println!("No patterns detected.");
        return Ok(());
    }
    for suggestion in &fired {
        println!("[{}] {}", suggestion.trigger, suggestion.message);
    }
    Ok(())
}

use rq_core::types::{Idea, Task};
use uuid::Uuid;

use super::Env;

pub async fn run(env: &Env, user: Uuid, task: bool, mit: bool, title: &str) -> anyhow::Result<()> {
    if task {
        let mut t = Task::new(user, title);
        t.is_mit = mit;
        env.store.upsert_task(&t).await?;
        tracing::info!(%user, task_id = %t.id, mit, "task captured");
        println!("task {}", t.id);
    } else {
        let idea = Idea::new(user, title);
        env.store.upsert_idea(&idea).await?;
        tracing::info!(%user, idea_id = %idea.id, "idea captured");
        println!("idea {}", idea.id);
    }
    Ok(())
}

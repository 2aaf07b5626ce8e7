use anyhow::Context;
use rq_intelligence::Assistant;
use uuid::Uuid;

use super::Env;

/// Run the `ask` subcommand: route one message and print every reply.
pub async fn run(env: &Env, user: Uuid, thread: Option<Uuid>, message: &str) -> anyhow::Result<()> {
    let assistant = Assistant::from_config(env.store.clone(), &env.config)
        .context("configuring model backends")?;
    let result = assistant.process_message(user, message, thread).await?;

    for response in &result.responses {
        println!("--- {} ({}, {} tokens)", response.backend, response.model, response.tokens_used);
        println!("{}", response.content);
        println!();
    }
    for failure in &result.failures {
        eprintln!("!!! {} failed: {}", failure.backend, failure.error);
    }
    println!("thread: {}", result.thread_id);

    if result.responses.is_empty() {
        anyhow::bail!("no backend answered");
    }
    Ok(())
}

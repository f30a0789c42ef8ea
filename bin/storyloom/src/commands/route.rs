use storyloom_core::{Config, WorkflowRequest};

use crate::app;

/// One-shot routing: classify, dispatch, print the event stream, exit.
pub async fn run(config: &Config, session: &str, message: &str) -> anyhow::Result<()> {
    let app = app::build(config).await?;
    let mut rx = app
        .router
        .route(WorkflowRequest::new(session, message))
        .await;
    while let Some(event) = rx.recv().await {
        println!("{}", serde_json::to_string(&event)?);
    }
    Ok(())
}

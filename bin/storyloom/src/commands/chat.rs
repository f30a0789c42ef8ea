use std::io::{self, BufRead};

use uuid::Uuid;

use storyloom_bus::ContextBus;
use storyloom_core::{Config, ContinuationMarker, WorkflowRequest};

use crate::app;

/// Interactive loop. Each stdin line becomes a request; when the previous
/// turn left a chain paused, the next line is sent as that chain's
/// resume selection.
pub async fn run(config: &Config, session: &str) -> anyhow::Result<()> {
    let app = app::build(config).await?;

    eprintln!("storyloom chat — session '{session}'. Commands: /write /revise /check /character /outline /world /summary /chat. Empty line quits.");

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        let message = line.trim();
        if message.is_empty() {
            break;
        }

        let mut request = WorkflowRequest::new(session, message);
        if let Some(marker) = pending_continuation(app.bus.as_ref(), session).await {
            request = request.with_continuation(marker);
        }

        let mut rx = app.router.route(request).await;
        while let Some(event) = rx.recv().await {
            println!("{}", serde_json::to_string(&event)?);
        }
    }

    Ok(())
}

/// A paused chain leaves its record in session memory under `chain:{name}`.
async fn pending_continuation(bus: &dyn ContextBus, session: &str) -> Option<ContinuationMarker> {
    let context = bus.context(session).await;
    for (key, record) in &context.memory {
        let Some(workflow) = key.strip_prefix("chain:") else {
            continue;
        };
        let Some(id) = record.get("executionId").and_then(|v| v.as_str()) else {
            continue;
        };
        if let Ok(execution_id) = Uuid::parse_str(id) {
            return Some(ContinuationMarker {
                workflow: workflow.to_string(),
                execution_id,
            });
        }
    }
    None
}

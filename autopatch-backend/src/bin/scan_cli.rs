//! Scan CLI
//!
//! Runs one scan from the terminal and prints every classified line as it is
//! produced, without starting the HTTP server.
//!
//! Usage:
//!   OPENROUTER_API_KEY="your-api-key" cargo run --bin scan_cli -- http://localhost:8000/

use std::process::ExitCode;
use std::sync::Arc;

use autopatch_backend::ai::OpenAIClient;
use autopatch_backend::browser::create_launcher;
use autopatch_backend::config::Config;
use autopatch_backend::crew::{load_agent_presets, AgentFactory};
use autopatch_backend::gateway::{EventBroadcaster, GatewayEvent};
use autopatch_backend::scan::ScanManager;
use autopatch_backend::tools;

fn print_event(event: &GatewayEvent) {
    let field = |key: &str| event.data.get(key).and_then(|v| v.as_str()).unwrap_or("");
    match event.event.as_str() {
        "scan.log" => {
            let time = chrono::DateTime::parse_from_rfc3339(field("timestamp"))
                .map(|t| t.format("%H:%M:%S").to_string())
                .unwrap_or_default();
            println!("[{}] [{}] {}", time, field("agent_label"), field("line"));
        }
        "scan.failed" => eprintln!("Scan failed: {}", field("error")),
        "scan.cancelled" => eprintln!("Scan cancelled"),
        _ => {}
    }
}

async fn run(url: &str) -> Result<bool, String> {
    let config = Config::from_env()?;
    if config.llm.api_key.is_empty() {
        return Err("OPENROUTER_API_KEY is not set".to_string());
    }

    let factory = AgentFactory::new(
        Arc::new(OpenAIClient::from_config(&config.llm)?),
        Arc::new(tools::create_default_registry()),
        load_agent_presets(&config.config_dir),
        config.max_tool_iterations,
    );
    let broadcaster = Arc::new(EventBroadcaster::new());
    let manager = Arc::new(ScanManager::new(
        Arc::new(factory),
        create_launcher(&config)?,
        config.crawl,
        broadcaster.clone(),
        1,
    ));

    let (_client_id, mut events) = broadcaster.subscribe();
    let scan = manager.start_scan(url).map_err(|e| e.to_string())?;
    log::info!("Scan {} started", scan.id);

    let mut cancel_requested = false;
    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else {
                    return Err("Event stream closed".to_string());
                };
                print_event(&event);
                if event.is_terminal() && event.scan_id() == Some(scan.id.as_str()) {
                    return Ok(event.event == "scan.completed");
                }
            }
            _ = tokio::signal::ctrl_c(), if !cancel_requested => {
                cancel_requested = true;
                eprintln!("Cancelling scan...");
                if let Err(e) = manager.cancel_scan(&scan.id) {
                    log::warn!("Cancel failed: {}", e);
                }
            }
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();
    env_logger::init();

    let Some(url) = std::env::args().nth(1) else {
        eprintln!("Usage: scan_cli <url>");
        return ExitCode::from(2);
    };

    match run(&url).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

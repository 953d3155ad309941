use std::{process, time::Duration};

use bridge_core::{BridgeError, BridgeErrorCategory};
use bridge_platform::EventDropBox;
use bridge_session::{BridgeConfig, ExecutionLoop, LoopTimeouts, logging, respond_json};
use serde_json::json;
use tracing::{error, info};

fn main() {
    logging::init();

    let config = match BridgeConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Invalid configuration: {err}");
            process::exit(2);
        }
    };

    let executor = ExecutionLoop::new(LoopTimeouts {
        ready: config.loop_ready_timeout,
        call: config.call_timeout,
        drain: config.loop_drain_timeout,
    });
    let ran = executor.run(async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        Ok(std::thread::current().name().map(str::to_owned))
    });
    let stopped = executor.stop();
    info!(state = ?executor.state(), "execution loop round trip finished");

    let events_dir = config.events_dir_for(&config.work_dir);
    let probe = EventDropBox::new(&events_dir).probe().map_err(|err| {
        BridgeError::new(BridgeErrorCategory::Storage, "events_dir_unavailable", err.to_string())
    });

    let result = ran.and_then(|thread| {
        stopped?;
        probe?;
        Ok(json!({
            "loop_thread": thread,
            "events_dir": events_dir.display().to_string(),
        }))
    });
    let failed = result.is_err();
    if let Err(err) = &result {
        error!(error = %err, "smoke check failed");
    }
    println!("{}", respond_json(result));
    if failed {
        process::exit(1);
    }
}

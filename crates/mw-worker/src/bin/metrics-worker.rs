#![forbid(unsafe_code)]

use mw_runtime::Worker;
use mw_worker::{help_text, init_logging, parse_args, resolve_config};
use tracing::{info, warn};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let options = parse_args(std::env::args().skip(1))?;
    if options.help {
        println!("{}", help_text());
        return Ok(());
    }

    let config = resolve_config(&options, |key| std::env::var(key).ok())?;
    init_logging(&config)?;
    info!(
        storage_root = %config.storage_root.display(),
        queue_dir = %config.queue_dir.display(),
        events_path = %config.events_path.display(),
        log_format = %config.log_format,
        "worker_starting"
    );

    if !config.queue_enabled {
        warn!("queue_disabled");
        return Ok(());
    }

    let worker = Worker::from_config(&config)?;
    info!(
        poll_interval_ms = config.poll_interval_ms,
        heartbeat_interval_seconds = config.heartbeat_interval_seconds,
        drain = options.drain,
        "worker_ready"
    );

    let handled = if options.drain {
        worker.run_until_idle()?
    } else {
        let stop_file = options.stop_file.clone();
        worker.run_polling(config.poll_interval(), || {
            stop_file.as_deref().is_some_and(std::path::Path::exists)
        })
    };

    info!(handled, "worker_shutting_down");
    Ok(())
}

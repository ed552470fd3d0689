use std::env;
use std::error::Error;
use std::fs;
use std::sync::Arc;

use async_std::task;
use tracing::{error, info};

use execbot::config;
use execbot::event::Event;
use execbot::github::HubcapsRepositoryApi;
use execbot::handler::{self, Dispatcher};
use execbot::piston::PistonClient;

fn main() -> Result<(), Box<dyn Error>> {
    execbot::setup_log();

    let args: Vec<String> = env::args().collect();
    let [_, config_path, event_type, payload_path] = args.as_slice() else {
        error!("usage: execbot-replay <config> <event-type> <payload.json>");
        return Err("wrong number of arguments".into());
    };

    let cfg = config::load(config_path.as_ref())?;
    let payload = fs::read(payload_path)?;

    let Some(event) = Event::from_webhook(event_type, &payload)? else {
        info!("{event_type} deliveries of this kind are not handled, nothing to do");
        return Ok(());
    };

    let repos = Arc::new(HubcapsRepositoryApi::new(cfg.github_clients()?));
    let executor = Arc::new(PistonClient::new(&cfg.piston)?);
    let mut dispatcher = Dispatcher::default();
    handler::register(&mut dispatcher, repos, executor, cfg.failure_policy);

    let delivery = format!("replay-{}", payload_path);
    for handle in dispatcher.dispatch(&delivery, event) {
        let outcome = task::block_on(handle);
        info!(?outcome, "Replay finished");
    }
    Ok(())
}

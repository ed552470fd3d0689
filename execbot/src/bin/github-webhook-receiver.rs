use std::env;
use std::error::Error;
use std::io::Read as _;
use std::sync::Arc;
#[macro_use]
extern crate hyper;

use hyper::{
    server::{Request, Response, Server},
    status::StatusCode,
};
use tracing::{debug, error, info, warn};

use execbot::event::Event;
use execbot::github::HubcapsRepositoryApi;
use execbot::handler::{self, Dispatcher};
use execbot::piston::PistonClient;
use execbot::{config, webhook};

header! { (XHubSignature256, "X-Hub-Signature-256") => [String] }
header! { (XGithubEvent, "X-Github-Event") => [String] }
header! { (XGithubDelivery, "X-Github-Delivery") => [String] }

fn main() -> Result<(), Box<dyn Error>> {
    execbot::setup_log();

    let Some(arg) = env::args().nth(1) else {
        error!("usage: github-webhook-receiver <config>");
        return Err("missing configuration path".into());
    };
    let cfg = config::load(arg.as_ref())?;
    let Some(ref webhook_cfg) = cfg.webhook else {
        error!("No webhook configuration found!");
        return Err("missing webhook configuration".into());
    };

    let webhook_secret = Arc::new(webhook_cfg.webhook_secret()?);

    let repos = Arc::new(HubcapsRepositoryApi::new(cfg.github_clients()?));
    let executor = Arc::new(PistonClient::new(&cfg.piston)?);
    let mut dispatcher = Dispatcher::default();
    handler::register(&mut dispatcher, repos, executor, cfg.failure_policy);
    let dispatcher = Arc::new(dispatcher);

    let threads = std::thread::available_parallelism()
        .map(|x| x.get())
        .unwrap_or(1);
    info!("Will listen on {} with {threads} threads", webhook_cfg.listen);
    Server::http(&webhook_cfg.listen)?.handle_threads(
        move |mut req: Request, mut res: Response| {
            // HTTP 405
            if req.method != hyper::Post {
                *res.status_mut() = StatusCode::MethodNotAllowed;
                return;
            }
            let hdr = req.headers.clone();

            // Read body
            let mut raw = Vec::new();
            if req.read_to_end(&mut raw).is_err() {
                warn!("Failed to read body from client");
                *res.status_mut() = StatusCode::InternalServerError;
                return;
            }
            let raw = raw.as_slice();

            // Validate signature
            let signature = hdr.get::<XHubSignature256>().map(|s| s.as_str());
            if let Err(e) = webhook::verify_signature(&webhook_secret, signature, raw) {
                if e.is_internal() {
                    error!("Unable to create HMAC from secret");
                    *res.status_mut() = StatusCode::InternalServerError;
                    return;
                }
                *res.status_mut() = StatusCode::BadRequest;
                let _ = res.send(e.message());
                return;
            }

            let Some(event_type) = hdr.get::<XGithubEvent>().map(|e| e.as_str()) else {
                *res.status_mut() = StatusCode::BadRequest;
                let _ = res.send(b"Missing event type");
                return;
            };
            let delivery = hdr
                .get::<XGithubDelivery>()
                .map(|d| d.as_str().to_owned())
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

            // Parse body
            let event = match Event::from_webhook(event_type, raw) {
                Ok(Some(event)) => event,
                Ok(None) => {
                    debug!(%delivery, "Ignoring {event_type} delivery");
                    *res.status_mut() = StatusCode::NoContent;
                    return;
                }
                Err(e) => {
                    error!(%delivery, "Invalid {event_type} payload: {}", e);
                    *res.status_mut() = StatusCode::BadRequest;
                    let _ = res.send(e.to_string().as_bytes());
                    return;
                }
            };

            // Handled in the background, GitHub only waits for the acknowledgement
            let _handles = dispatcher.dispatch(&delivery, event);
            *res.status_mut() = StatusCode::NoContent;
        },
        threads,
    )?;
    Ok(())
}

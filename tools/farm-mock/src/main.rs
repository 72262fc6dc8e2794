#![deny(unsafe_code)]

//! This executable is meant to provide support for local development; it mirrors the http surface
//! of the real render farm master, leasing a bounded number of fake tabs and answering tab
//! commands with canned payloads so the runner and conductor can be exercised end to end without
//! any browser engines around.

use clap::Parser;
use serde::Deserialize;
use std::collections::HashSet;
use std::io;
use std::sync::Arc;

#[derive(Parser)]
struct CommandLineArguments {
  /// Address to bind, e.g. `0.0.0.0:6666`.
  #[clap(short, long, default_value = "0.0.0.0:6666")]
  addr: String,

  /// How many tabs may be leased at once before the master starts answering 503.
  #[clap(short, long, default_value = "1")]
  capacity: usize,
}

#[derive(Deserialize, Debug)]
struct SessionRequest {
  engine: String,
  adblock: bool,
}

#[derive(Clone)]
struct State {
  /// The externally visible address, baked into handed-out tab urls.
  addr: String,
  capacity: usize,
  tabs: Arc<async_std::sync::Mutex<HashSet<String>>>,
}

async fn create_session(mut request: tide::Request<State>) -> tide::Result {
  let payload = request.body_json::<SessionRequest>().await?;
  let state = request.state().clone();
  let mut tabs = state.tabs.lock().await;

  if tabs.len() >= state.capacity {
    log::info!("no capacity for '{}' session ({} leased)", payload.engine, tabs.len());

    return Ok(
      tide::Response::builder(503)
        .body(tide::Body::from_json(&serde_json::json!({ "message": "no capacity" }))?)
        .build(),
    );
  }

  let id = uuid::Uuid::new_v4().to_string();
  tabs.insert(id.clone());
  log::info!("leased tab '{id}' (engine '{}', adblock {})", payload.engine, payload.adblock);

  Ok(
    tide::Response::builder(200)
      .body(tide::Body::from_json(&serde_json::json!({
        "url": format!("http://{}/tabs/{id}", state.addr),
      }))?)
      .build(),
  )
}

/// Answers a tab command with a canned payload, or a 404 once the tab was destroyed.
async fn tab_command(request: tide::Request<State>) -> tide::Result {
  let id = request.param("id")?.to_string();
  let command = request.param("command")?.to_string();
  let state = request.state().clone();
  let mut tabs = state.tabs.lock().await;

  if !tabs.contains(&id) {
    log::warn!("command '{command}' for unknown tab '{id}'");
    return Ok(tide::Response::builder(404).build());
  }

  let payload = match command.as_str() {
    "setUserAgent" | "setScreenSize" | "open" => serde_json::json!({}),
    "getScreenshot" => serde_json::json!({ "data": "bW9jayBwbmc=" }),
    "getResources" => serde_json::json!({ "resources": [] }),
    "getConsoleLog" => serde_json::json!({ "consoleLog": [] }),
    "getErrorLog" => serde_json::json!({ "errorLog": [] }),
    "getPluginResults" => serde_json::json!({ "results": {} }),
    "getRedirects" => serde_json::json!({ "redirects": {} }),
    "destroy" => {
      tabs.remove(&id);
      log::info!("released tab '{id}'");
      serde_json::json!({})
    }
    other => {
      log::warn!("unrecognized tab command '{other}'");
      return Ok(tide::Response::builder(404).build());
    }
  };

  log::debug!("tab '{id}' answered '{command}'");

  Ok(tide::Response::builder(200).body(tide::Body::from_json(&payload)?).build())
}

async fn run(args: CommandLineArguments) -> io::Result<()> {
  let state = State {
    addr: args.addr.clone(),
    capacity: args.capacity,
    tabs: Arc::new(async_std::sync::Mutex::new(HashSet::new())),
  };

  let mut app = tide::with_state(state);
  app.at("/sessions").post(create_session);
  app.at("/tabs/:id/:command").post(tab_command);

  log::info!("farm mock listening on '{}' with capacity {}", args.addr, args.capacity);
  app.listen(args.addr).await
}

fn main() -> io::Result<()> {
  let load_env = std::fs::metadata(".env").map(|meta| meta.is_file()).unwrap_or(false);

  if load_env {
    let env_result = dotenv::dotenv();
    println!(".env loaded? {:?}", env_result.is_ok());
  }

  env_logger::init();
  let args = CommandLineArguments::parse();

  async_std::task::block_on(run(args))
}

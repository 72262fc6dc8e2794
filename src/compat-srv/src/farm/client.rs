use serde::{Deserialize, Serialize};
use std::io;

use super::{FarmError, RenderFarm, Tab};

/// Payload sent to the master when leasing a session.
#[derive(Serialize, Debug)]
struct SessionRequest<'a> {
  /// Which engine to boot the tab with.
  engine: &'a str,
  /// Whether the tab should run with adblock enabled.
  adblock: bool,
}

/// The master's answer to a successful allocation.
#[derive(Deserialize, Debug)]
struct SessionResponse {
  /// Base url of the allocated tab; all commands are posted underneath it.
  url: String,
}

/// Farm client speaking the master's http protocol.
pub struct HttpFarm {
  /// Base url of the farm master.
  master_url: String,
}

impl HttpFarm {
  /// Builds the client for a master url, tolerating a trailing slash.
  pub fn new<S>(master_url: S) -> Self
  where
    S: AsRef<str>,
  {
    Self {
      master_url: master_url.as_ref().trim_end_matches('/').to_string(),
    }
  }
}

#[async_trait::async_trait]
impl RenderFarm for HttpFarm {
  async fn acquire(&self, engine: &str, adblock: bool) -> Result<Box<dyn Tab>, FarmError> {
    log::debug!("requesting new '{engine}' session from '{}'", self.master_url);

    let request = surf::post(format!("{}/sessions", self.master_url))
      .body_json(&SessionRequest { engine, adblock })
      .map_err(|error| FarmError::message(format!("unable to serialize session request - {error}")))?;

    let mut response = request
      .await
      .map_err(|error| FarmError::message(format!("session request failed - {error}")))?;

    let status = u16::from(response.status());

    if !response.status().is_success() {
      return Err(FarmError {
        status: Some(status),
        message: format!("session could not be allocated (status {status})"),
      });
    }

    let session = response
      .body_json::<SessionResponse>()
      .await
      .map_err(|error| FarmError::message(format!("malformed session response - {error}")))?;

    log::debug!("session allocated at '{}'", session.url);

    Ok(Box::new(HttpTab {
      url: session.url.trim_end_matches('/').to_string(),
    }))
  }
}

/// A leased tab, driven over http at the url the master handed back.
struct HttpTab {
  /// Base url of the tab.
  url: String,
}

impl HttpTab {
  /// Posts one command to the tab. Errors are prefixed with the command name so job error
  /// histories read like a trace.
  async fn command<T>(&mut self, name: &str, body: &T) -> io::Result<serde_json::Value>
  where
    T: Serialize + Sync,
  {
    let request = surf::post(format!("{}/{name}", self.url)).body_json(body).map_err(|error| {
      log::warn!("unable to serialize '{name}' payload - {error}");
      io::Error::new(io::ErrorKind::Other, format!("{name}: {error}"))
    })?;

    let mut response = request
      .await
      .map_err(|error| io::Error::new(io::ErrorKind::Other, format!("{name}: {error}")))?;

    if !response.status().is_success() {
      return Err(io::Error::new(
        io::ErrorKind::Other,
        format!("{name}: tab failed and returned error status {}", u16::from(response.status())),
      ));
    }

    response
      .body_json::<serde_json::Value>()
      .await
      .map_err(|error| io::Error::new(io::ErrorKind::Other, format!("{name}: malformed response - {error}")))
  }

  /// Pulls a single field out of a command response, tolerating its absence with a null.
  fn field(mut payload: serde_json::Value, name: &str) -> serde_json::Value {
    match payload.get_mut(name) {
      Some(value) => value.take(),
      None => serde_json::Value::Null,
    }
  }
}

#[async_trait::async_trait]
impl Tab for HttpTab {
  async fn set_user_agent(&mut self, user_agent: &str) -> io::Result<()> {
    self
      .command("setUserAgent", &serde_json::json!({ "userAgent": user_agent }))
      .await
      .map(|_| ())
  }

  async fn set_screen_size(&mut self, size: &crate::types::ScreenSize) -> io::Result<()> {
    self
      .command("setScreenSize", &serde_json::json!({ "size": size }))
      .await
      .map(|_| ())
  }

  async fn open(&mut self, url: &str, wait_for_resources: bool) -> io::Result<serde_json::Value> {
    self
      .command("open", &serde_json::json!({ "url": url, "waitForResources": wait_for_resources }))
      .await
  }

  async fn screenshot(&mut self) -> io::Result<String> {
    let payload = self.command("getScreenshot", &serde_json::json!({})).await?;

    match Self::field(payload, "data") {
      serde_json::Value::String(data) => Ok(data),
      other => Err(io::Error::new(
        io::ErrorKind::Other,
        format!("getScreenshot: expected base64 data, found {other:?}"),
      )),
    }
  }

  async fn resources(&mut self) -> io::Result<serde_json::Value> {
    let payload = self.command("getResources", &serde_json::json!({})).await?;
    Ok(Self::field(payload, "resources"))
  }

  async fn console_log(&mut self) -> io::Result<serde_json::Value> {
    let payload = self.command("getConsoleLog", &serde_json::json!({})).await?;
    Ok(Self::field(payload, "consoleLog"))
  }

  async fn error_log(&mut self) -> io::Result<serde_json::Value> {
    let payload = self.command("getErrorLog", &serde_json::json!({})).await?;
    Ok(Self::field(payload, "errorLog"))
  }

  async fn plugin_results(&mut self) -> io::Result<serde_json::Value> {
    let payload = self.command("getPluginResults", &serde_json::json!({})).await?;
    Ok(Self::field(payload, "results"))
  }

  async fn redirects(&mut self) -> io::Result<serde_json::Value> {
    let payload = self.command("getRedirects", &serde_json::json!({})).await?;
    Ok(Self::field(payload, "redirects"))
  }

  async fn destroy(&mut self) -> io::Result<()> {
    self.command("destroy", &serde_json::json!({})).await.map(|_| ())
  }
}

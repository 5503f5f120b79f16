use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::{
  StatusCode,
  Url
};
use tack_shared::{
  ItemRecord,
  PersistMoveArgs
};
use tracing::{
  debug,
  warn
};

use super::{
  SyncAdapter,
  SyncError
};

/// Talks to the dashboard's REST
/// backend.
#[derive(Debug, Clone)]
pub struct HttpSyncAdapter {
  client:   reqwest::Client,
  endpoint: Url
}

impl HttpSyncAdapter {
  pub fn new(
    endpoint: &str,
    timeout: Duration
  ) -> anyhow::Result<Self> {
    let trimmed = endpoint.trim();
    if trimmed.is_empty() {
      anyhow::bail!(
        "sync endpoint URL is empty"
      );
    }
    let endpoint = Url::parse(trimmed)
      .with_context(|| {
        format!(
          "invalid sync endpoint \
           {trimmed:?}"
        )
      })?;
    if endpoint.cannot_be_a_base() {
      anyhow::bail!(
        "sync endpoint {endpoint} cannot \
         carry a path"
      );
    }

    let client =
      reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .context(
          "failed building HTTP client \
           for item sync"
        )?;

    Ok(Self { client, endpoint })
  }

  pub fn items_url(&self) -> Url {
    self.route(&["items"])
  }

  /// Ids are pushed as single path
  /// segments, so reserved characters
  /// arrive percent-encoded.
  pub fn item_url(
    &self,
    args: &PersistMoveArgs
  ) -> Url {
    let collection = format!(
      "{}s",
      args.variant.as_key()
    );
    self.route(&[
      collection.as_str(),
      args.id.as_str()
    ])
  }

  fn route(
    &self,
    segments: &[&str]
  ) -> Url {
    let mut url = self.endpoint.clone();
    // `new` rejects endpoints without
    // a path.
    if let Ok(mut path) =
      url.path_segments_mut()
    {
      path
        .pop_if_empty()
        .extend(segments);
    }
    url
  }
}

fn request_error(
  error: reqwest::Error
) -> SyncError {
  // Anything that never produced a
  // response may work next time.
  SyncError::Transient(error.to_string())
}

fn status_error(
  status: StatusCode,
  body: &str
) -> SyncError {
  let detail = if body.trim().is_empty()
  {
    format!("HTTP {status}")
  } else {
    format!(
      "HTTP {status}: {}",
      body.trim()
    )
  };
  if status.is_server_error()
    || status
      == StatusCode::TOO_MANY_REQUESTS
    || status
      == StatusCode::REQUEST_TIMEOUT
  {
    SyncError::Transient(detail)
  } else {
    SyncError::Permanent(detail)
  }
}

#[async_trait]
impl SyncAdapter for HttpSyncAdapter {
  #[tracing::instrument(skip(self))]
  async fn fetch_items(
    &self
  ) -> Result<Vec<ItemRecord>, SyncError>
  {
    let url = self.items_url();
    let response = self
      .client
      .get(url.clone())
      .send()
      .await
      .map_err(request_error)?;

    let status = response.status();
    if !status.is_success() {
      let body = response
        .text()
        .await
        .unwrap_or_default();
      warn!(
        url = %url,
        %status,
        "item feed request failed"
      );
      return Err(status_error(
        status, &body
      ));
    }

    let records = response
      .json::<Vec<ItemRecord>>()
      .await
      .map_err(|error| {
        SyncError::Permanent(format!(
          "malformed item feed: {error}"
        ))
      })?;
    debug!(
      count = records.len(),
      "fetched item feed"
    );
    Ok(records)
  }

  #[tracing::instrument(skip(self))]
  async fn persist_move(
    &self,
    args: &PersistMoveArgs
  ) -> Result<(), SyncError> {
    let url = self.item_url(args);
    let response = self
      .client
      .patch(url.clone())
      .json(&args.target)
      .send()
      .await
      .map_err(request_error)?;

    let status = response.status();
    if status.is_success() {
      debug!(url = %url, "persisted move");
      return Ok(());
    }

    let body = response
      .text()
      .await
      .unwrap_or_default();
    warn!(
      url = %url,
      %status,
      "persist request failed"
    );
    Err(status_error(status, &body))
  }
}

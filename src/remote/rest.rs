//! HTTP backend speaking PostgREST conventions.

use async_trait::async_trait;
use reqwest::{header, Method, RequestBuilder, Response};
use serde_json::Value;
use url::Url;

use super::{Filter, RemoteBackend, SelectQuery};
use crate::config::RemoteConfig;
use crate::error::{RemoteOp, Result, SyncError};

/// Remote store client over a PostgREST-style REST API.
#[derive(Clone)]
pub struct RestBackend {
  client: reqwest::Client,
  base: Url,
  api_key: String,
}

impl RestBackend {
  pub fn new(config: &RemoteConfig, api_key: String) -> Result<Self> {
    let base = Url::parse(&config.url)
      .and_then(|u| u.join(&format!("{}/", config.schema_path.trim_matches('/'))))
      .map_err(|e| SyncError::InvalidConfig(format!("invalid remote url {}: {}", config.url, e)))?;

    Ok(Self {
      client: reqwest::Client::new(),
      base,
      api_key,
    })
  }

  fn table_url(&self, op: RemoteOp, table: &str) -> Result<Url> {
    self
      .base
      .join(table)
      .map_err(|e| SyncError::remote(op, table, format!("invalid table url: {}", e)))
  }

  fn request(&self, method: Method, url: Url) -> RequestBuilder {
    self
      .client
      .request(method, url)
      .header("apikey", &self.api_key)
      .header(header::AUTHORIZATION, format!("Bearer {}", self.api_key))
  }

  /// Send a request, mapping transport errors and non-2xx statuses.
  async fn send(&self, op: RemoteOp, table: &str, request: RequestBuilder) -> Result<Response> {
    let response = request
      .send()
      .await
      .map_err(|e| SyncError::remote(op, table, e))?;

    let status = response.status();
    if !status.is_success() {
      let body = response.text().await.unwrap_or_default();
      return Err(SyncError::remote(op, table, format!("{}: {}", status, body)));
    }
    Ok(response)
  }

  async fn json_rows(op: RemoteOp, table: &str, response: Response) -> Result<Vec<Value>> {
    response
      .json::<Vec<Value>>()
      .await
      .map_err(|e| SyncError::remote(op, table, format!("bad response body: {}", e)))
  }
}

/// Query string pairs for a select.
fn select_params(query: &SelectQuery) -> Vec<(String, String)> {
  let mut params = vec![("select".to_string(), "*".to_string())];

  match &query.filter {
    Some(Filter::Eq { column, value }) => params.push((column.clone(), format!("eq.{}", value))),
    Some(Filter::Contains { column, value }) => {
      params.push((column.clone(), format!("ilike.*{}*", value)))
    }
    None => {}
  }

  if let Some(order) = &query.order {
    let direction = if order.ascending { "asc" } else { "desc" };
    params.push(("order".to_string(), format!("{}.{}", order.column, direction)));
  }

  if let Some(range) = query.range {
    params.push(("offset".to_string(), range.offset.to_string()));
    params.push(("limit".to_string(), range.limit.to_string()));
  }

  params
}

fn id_filter(url: &mut Url, id: &str) {
  url.query_pairs_mut().append_pair("id", &format!("eq.{}", id));
}

#[async_trait]
impl RemoteBackend for RestBackend {
  async fn select(&self, table: &str, query: &SelectQuery) -> Result<Vec<Value>> {
    let mut url = self.table_url(RemoteOp::Select, table)?;
    url.query_pairs_mut().extend_pairs(select_params(query));

    let response = self
      .send(RemoteOp::Select, table, self.request(Method::GET, url))
      .await?;
    Self::json_rows(RemoteOp::Select, table, response).await
  }

  async fn insert(&self, table: &str, row: Value) -> Result<Value> {
    let url = self.table_url(RemoteOp::Insert, table)?;
    let request = self
      .request(Method::POST, url)
      .header("Prefer", "return=representation")
      .json(&row);

    let response = self.send(RemoteOp::Insert, table, request).await?;
    Self::json_rows(RemoteOp::Insert, table, response)
      .await?
      .into_iter()
      .next()
      .ok_or_else(|| SyncError::remote(RemoteOp::Insert, table, "no row returned"))
  }

  async fn update(&self, table: &str, id: &str, patch: Value) -> Result<Value> {
    let mut url = self.table_url(RemoteOp::Update, table)?;
    id_filter(&mut url, id);
    let request = self
      .request(Method::PATCH, url)
      .header("Prefer", "return=representation")
      .json(&patch);

    let response = self.send(RemoteOp::Update, table, request).await?;
    Self::json_rows(RemoteOp::Update, table, response)
      .await?
      .into_iter()
      .next()
      .ok_or_else(|| SyncError::remote(RemoteOp::Update, table, format!("no row {}", id)))
  }

  async fn delete(&self, table: &str, id: &str) -> Result<()> {
    let mut url = self.table_url(RemoteOp::Delete, table)?;
    id_filter(&mut url, id);
    self
      .send(RemoteOp::Delete, table, self.request(Method::DELETE, url))
      .await?;
    Ok(())
  }

  async fn upsert(&self, table: &str, rows: Vec<Value>, conflict_key: &str) -> Result<()> {
    let mut url = self.table_url(RemoteOp::Upsert, table)?;
    url.query_pairs_mut().append_pair("on_conflict", conflict_key);
    let request = self
      .request(Method::POST, url)
      .header("Prefer", "resolution=merge-duplicates,return=minimal")
      .json(&rows);

    self.send(RemoteOp::Upsert, table, request).await?;
    Ok(())
  }
}

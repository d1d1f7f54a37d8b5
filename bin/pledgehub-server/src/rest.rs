//! Collection REST handlers.
//!
//! Follows json-server conventions so the frontend can talk to it
//! unchanged: plain CRUD per collection, `field=value` filters with the
//! `_ne`/`_like`/`_gte`/`_lte` operators, `q` full-text search,
//! `_sort`/`_order`, `_start`/`_end`/`_limit`/`_page` pagination with an
//! `X-Total-Count` header, and `/projects/{id}/donations` nesting.

use crate::error::ApiError;
use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use pledgehub_common::{Collection, Error, PROJECT_ID_FIELD, Record, UnknownCollection, key_string};
use pledgehub_store::{CollectionStore, SyncTrigger};
use serde_json::{Value, json};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;

type Result<T> = std::result::Result<T, ApiError>;

/// Header carrying the pre-pagination result count
pub const TOTAL_COUNT_HEADER: &str = "x-total-count";

const DEFAULT_PAGE_SIZE: usize = 10;

/// Shared state for REST handlers
pub struct AppState {
    pub store: CollectionStore,
    pub sync: Arc<dyn SyncTrigger>,
}

fn parse_collection(name: &str) -> Result<Collection> {
    name.parse::<Collection>()
        .map_err(|e| ApiError(Error::from(e)))
}

fn into_record(body: Value) -> Result<Record> {
    match body {
        Value::Object(record) => Ok(record),
        _ => Err(ApiError::invalid_request("request body must be a JSON object")),
    }
}

/// Field value as compared by filters and search
fn render(value: &Value) -> Option<String> {
    match value {
        Value::Bool(b) => Some(b.to_string()),
        other => key_string(other),
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
enum FilterOp {
    Eq,
    Ne,
    Like,
    Gte,
    Lte,
}

/// Parsed list query
#[derive(Debug, Default)]
struct ListQuery {
    /// (field, op) -> accepted values; repeated keys are OR-ed
    filters: BTreeMap<(String, FilterOp), Vec<String>>,
    search: Option<String>,
    sort: Option<String>,
    descending: bool,
    start: Option<usize>,
    end: Option<usize>,
    limit: Option<usize>,
    page: Option<usize>,
}

fn parse_index(key: &str, value: &str) -> Result<usize> {
    value
        .parse()
        .map_err(|_| ApiError::invalid_request(format!("{key} must be a non-negative integer")))
}

impl ListQuery {
    fn from_params(params: Vec<(String, String)>) -> Result<Self> {
        let mut query = Self::default();
        for (key, value) in params {
            match key.as_str() {
                "q" => query.search = Some(value.to_lowercase()),
                "_sort" => query.sort = Some(value),
                "_order" => query.descending = value.eq_ignore_ascii_case("desc"),
                "_start" => query.start = Some(parse_index(&key, &value)?),
                "_end" => query.end = Some(parse_index(&key, &value)?),
                "_limit" => query.limit = Some(parse_index(&key, &value)?),
                "_page" => query.page = Some(parse_index(&key, &value)?.max(1)),
                _ if key.starts_with('_') => {}
                _ => {
                    let (field, op) = split_operator(&key);
                    query
                        .filters
                        .entry((field.to_string(), op))
                        .or_default()
                        .push(value);
                }
            }
        }
        Ok(query)
    }

    fn matches(&self, record: &Record) -> bool {
        let filters_match = self.filters.iter().all(|((field, op), values)| {
            let actual = record.get(field).and_then(render);
            values
                .iter()
                .any(|expected| filter_matches(*op, actual.as_deref(), expected))
        });
        let search_matches = self.search.as_ref().is_none_or(|needle| {
            record.values().any(|v| match v {
                Value::String(s) => s.to_lowercase().contains(needle.as_str()),
                _ => false,
            })
        });
        filters_match && search_matches
    }

    fn apply(&self, records: Vec<Record>) -> (usize, Vec<Record>) {
        let mut records: Vec<Record> = records.into_iter().filter(|r| self.matches(r)).collect();

        if let Some(field) = &self.sort {
            records.sort_by(|a, b| compare_field(a.get(field), b.get(field)));
            if self.descending {
                records.reverse();
            }
        }

        let total = records.len();
        let (start, end) = if let Some(page) = self.page {
            let size = self.limit.unwrap_or(DEFAULT_PAGE_SIZE);
            let start = (page - 1).saturating_mul(size);
            (start, start.saturating_add(size))
        } else {
            let start = self.start.unwrap_or(0);
            let end = self
                .end
                .or_else(|| self.limit.map(|l| start.saturating_add(l)))
                .unwrap_or(total);
            (start, end)
        };
        let end = end.min(total);
        let page = if start < end {
            records.drain(start..end).collect()
        } else {
            Vec::new()
        };
        (total, page)
    }
}

fn split_operator(key: &str) -> (&str, FilterOp) {
    for (suffix, op) in [
        ("_ne", FilterOp::Ne),
        ("_like", FilterOp::Like),
        ("_gte", FilterOp::Gte),
        ("_lte", FilterOp::Lte),
    ] {
        if let Some(field) = key.strip_suffix(suffix) {
            return (field, op);
        }
    }
    (key, FilterOp::Eq)
}

fn filter_matches(op: FilterOp, actual: Option<&str>, expected: &str) -> bool {
    match op {
        FilterOp::Eq => actual == Some(expected),
        FilterOp::Ne => actual != Some(expected),
        FilterOp::Like => {
            actual.is_some_and(|a| a.to_lowercase().contains(&expected.to_lowercase()))
        }
        FilterOp::Gte | FilterOp::Lte => {
            let Some(actual) = actual else {
                return false;
            };
            let ordering = match (actual.parse::<f64>(), expected.parse::<f64>()) {
                (Ok(a), Ok(e)) => a.partial_cmp(&e),
                _ => Some(actual.cmp(expected)),
            };
            match op {
                FilterOp::Gte => matches!(ordering, Some(Ordering::Greater | Ordering::Equal)),
                _ => matches!(ordering, Some(Ordering::Less | Ordering::Equal)),
            }
        }
    }
}

/// Numbers compare numerically, everything else by rendered text. Missing
/// values sort after present ones, so they come first once reversed.
fn compare_field(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(x), Some(y)) => render(x).cmp(&render(y)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn list_response(total: usize, records: Vec<Record>) -> Response {
    let mut response = Json(records).into_response();
    response
        .headers_mut()
        .insert(TOTAL_COUNT_HEADER, HeaderValue::from(total));
    response
}

// ---- Collection routes ----

/// GET /{collection}
///
/// # Errors
/// 404 for an unknown collection, 400 for malformed pagination.
pub async fn list_records(
    State(state): State<Arc<AppState>>,
    Path(collection): Path<String>,
    Query(params): Query<Vec<(String, String)>>,
) -> Result<Response> {
    let collection = parse_collection(&collection)?;
    let query = ListQuery::from_params(params)?;
    let (total, records) = query.apply(state.store.list(collection));
    Ok(list_response(total, records))
}

/// POST /{collection}
///
/// # Errors
/// 400 if the body is not an object, 409 on a duplicate id.
pub async fn create_record(
    State(state): State<Arc<AppState>>,
    Path(collection): Path<String>,
    Json(body): Json<Value>,
) -> Result<impl IntoResponse> {
    let collection = parse_collection(&collection)?;
    let record = state.store.insert(collection, into_record(body)?)?;
    Ok((StatusCode::CREATED, Json(record)))
}

/// GET /{collection}/{id}
///
/// # Errors
/// 404 if the collection or record does not exist.
pub async fn get_record(
    State(state): State<Arc<AppState>>,
    Path((collection, id)): Path<(String, String)>,
) -> Result<Json<Record>> {
    let collection = parse_collection(&collection)?;
    state
        .store
        .get(collection, &id)
        .map(Json)
        .ok_or_else(|| ApiError(Error::NotFound { collection, id }))
}

/// PUT /{collection}/{id}
///
/// # Errors
/// 400 if the body is not an object, 404 if the record does not exist.
pub async fn replace_record(
    State(state): State<Arc<AppState>>,
    Path((collection, id)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> Result<Json<Record>> {
    let collection = parse_collection(&collection)?;
    let record = state.store.replace(collection, &id, into_record(body)?)?;
    Ok(Json(record))
}

/// PATCH /{collection}/{id}
///
/// # Errors
/// 400 if the body is not an object, 404 if the record does not exist.
pub async fn patch_record(
    State(state): State<Arc<AppState>>,
    Path((collection, id)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> Result<Json<Record>> {
    let collection = parse_collection(&collection)?;
    let record = state.store.merge(collection, &id, into_record(body)?)?;
    Ok(Json(record))
}

/// DELETE /{collection}/{id}
///
/// # Errors
/// 404 if the record does not exist.
pub async fn delete_record(
    State(state): State<Arc<AppState>>,
    Path((collection, id)): Path<(String, String)>,
) -> Result<Json<Value>> {
    let collection = parse_collection(&collection)?;
    state.store.remove(collection, &id)?;
    Ok(Json(json!({})))
}

// ---- Nested routes ----

/// Only `/projects/{id}/donations` is a nested resource
fn parse_nested(parent: &str, child: &str) -> Result<()> {
    match (parse_collection(parent)?, parse_collection(child)?) {
        (Collection::Projects, Collection::Donations) => Ok(()),
        _ => Err(ApiError(Error::from(UnknownCollection(format!(
            "{parent}/{{id}}/{child}"
        ))))),
    }
}

/// GET /projects/{id}/donations
///
/// # Errors
/// 404 for any other nesting, 400 for malformed pagination.
pub async fn list_nested(
    State(state): State<Arc<AppState>>,
    Path((parent, id, child)): Path<(String, String, String)>,
    Query(mut params): Query<Vec<(String, String)>>,
) -> Result<Response> {
    parse_nested(&parent, &child)?;
    // The path decides the project; a `projectId` filter would widen it.
    params.retain(|(key, _)| key != PROJECT_ID_FIELD);
    params.push((PROJECT_ID_FIELD.to_string(), id));
    let query = ListQuery::from_params(params)?;
    let (total, records) = query.apply(state.store.list(Collection::Donations));
    Ok(list_response(total, records))
}

/// POST /projects/{id}/donations
///
/// # Errors
/// 404 for any other nesting, 400 if the body is not an object, 409 on a
/// duplicate id.
pub async fn create_nested(
    State(state): State<Arc<AppState>>,
    Path((parent, id, child)): Path<(String, String, String)>,
    Json(body): Json<Value>,
) -> Result<impl IntoResponse> {
    parse_nested(&parent, &child)?;
    let mut record = into_record(body)?;
    record.insert(PROJECT_ID_FIELD.to_string(), Value::String(id));
    let record = state.store.insert(Collection::Donations, record)?;
    Ok((StatusCode::CREATED, Json(record)))
}

// ---- Service routes ----

/// GET /db
pub async fn dump_db(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.store.snapshot())
}

/// GET /health
pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let snapshot = state.store.snapshot();
    let records: BTreeMap<&str, usize> = Collection::ALL
        .iter()
        .map(|c| (c.as_str(), snapshot.collection(*c).len()))
        .collect();
    Json(json!({
        "status": "healthy",
        "records": records,
        "sync": state.sync.stats(),
    }))
}

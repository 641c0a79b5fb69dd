use std::{env, net::SocketAddr, path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use query_map::{
    Conversion, ConversionError, Converter, ConverterConfig, FieldType, JsonFileSource, Omission,
    QueryNode, Registry, UnmappedFieldPolicy, DEFAULT_BASE_TEMPLATE, DEFAULT_SCHEMA_PATH,
};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use tracing::{error, info, info_span};
use uuid::Uuid;

pub async fn run() -> Result<()> {
    let config = AppConfig::from_env()?;

    let registry = Registry::load(
        &JsonFileSource::new(&config.schema_path),
        &config.base_template,
    )
    .with_context(|| {
        format!(
            "failed to load schema registry from {}",
            config.schema_path.display()
        )
    })?;

    let converter = Converter::with_config(
        Arc::new(registry),
        ConverterConfig {
            unmapped_fields: config.unmapped_fields,
        },
    );
    let state = Arc::new(AppState { converter });

    let app = build_router(state).layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .context("failed to bind listen socket")?;

    info!(
        addr = %config.listen_addr,
        schema = %config.schema_path.display(),
        unmapped_fields = %config.unmapped_fields,
        "query-map-daemon listening"
    );
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server exited")?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        error!(%error, "failed to listen for shutdown signal");
    }
    info!("shutdown signal received");
}

fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/api/v1/schema", get(schema))
        .route("/api/v1/convert", post(convert))
        .with_state(state)
}

#[derive(Debug, Clone)]
struct AppState {
    converter: Converter,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub listen_addr: SocketAddr,
    pub schema_path: PathBuf,
    pub base_template: String,
    pub unmapped_fields: UnmappedFieldPolicy,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let listen_addr = lookup("QUERY_MAP_ADDR")
            .unwrap_or_else(|| "127.0.0.1:8080".to_string())
            .parse()
            .context("invalid QUERY_MAP_ADDR")?;

        let schema_path = lookup("QUERY_MAP_SCHEMA_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SCHEMA_PATH));

        let base_template = lookup("QUERY_MAP_BASE_TEMPLATE")
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_TEMPLATE.to_string());

        let unmapped_fields = match lookup("QUERY_MAP_UNMAPPED_FIELDS") {
            Some(value) => value
                .parse()
                .context("invalid QUERY_MAP_UNMAPPED_FIELDS")?,
            None => UnmappedFieldPolicy::default(),
        };

        Ok(Self {
            listen_addr,
            schema_path,
            base_template,
            unmapped_fields,
        })
    }
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

async fn schema(State(state): State<Arc<AppState>>) -> Json<SchemaResponse> {
    let registry = state.converter.registry();
    let tables = registry
        .templates()
        .iter()
        .map(|template| {
            let mut fields: Vec<FieldResponse> = template
                .fields()
                .map(|field| FieldResponse {
                    field_name: field.logical_name.clone(),
                    field_id: field.mapped_id.clone(),
                    field_type: field.field_type.clone(),
                })
                .collect();
            fields.sort_by(|a, b| a.field_name.cmp(&b.field_name));

            TableResponse {
                table_name: template.name.clone(),
                mapped_table_id: registry
                    .table(&template.name)
                    .map(|table| table.mapped_id.clone())
                    .unwrap_or_default(),
                template_id: template.id.clone(),
                template_type: template.template_type.clone(),
                fields,
            }
        })
        .collect();

    Json(SchemaResponse {
        fingerprint: registry.fingerprint().to_string(),
        base_template: registry.base_template_name().to_string(),
        tables,
    })
}

async fn convert(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ConvertBody>, JsonRejection>,
) -> Result<Json<ConvertResponse>, ApiError> {
    let Json(body) = payload.map_err(|rejection| ApiError::bad_request(rejection.body_text()))?;
    if body.sql_query.trim().is_empty() {
        return Err(ApiError::bad_request("sql_query must not be empty"));
    }

    let request_id = Uuid::new_v4();
    let span = info_span!("convert", %request_id);
    let conversion = span.in_scope(|| state.converter.convert(&body.sql_query))?;

    span.in_scope(|| {
        info!(
            table = %conversion.table,
            complete = conversion.is_complete(),
            "conversion served"
        )
    });
    Ok(Json(ConvertResponse::from(conversion)))
}

#[derive(Debug, Deserialize)]
struct ConvertBody {
    sql_query: String,
}

#[derive(Debug, Serialize)]
struct ConvertResponse {
    updated_query: String,
    query_data: QueryNode,
    omissions: Vec<Omission>,
    complete: bool,
}

impl From<Conversion> for ConvertResponse {
    fn from(conversion: Conversion) -> Self {
        let complete = conversion.is_complete();
        Self {
            updated_query: conversion.rewritten.into_string(),
            query_data: conversion.model,
            omissions: conversion.omissions,
            complete,
        }
    }
}

#[derive(Debug, Serialize)]
struct SchemaResponse {
    fingerprint: String,
    base_template: String,
    tables: Vec<TableResponse>,
}

#[derive(Debug, Serialize)]
struct TableResponse {
    table_name: String,
    mapped_table_id: String,
    template_id: String,
    template_type: String,
    fields: Vec<FieldResponse>,
}

#[derive(Debug, Serialize)]
struct FieldResponse {
    field_name: String,
    field_id: String,
    field_type: FieldType,
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    fn internal<E: std::fmt::Display>(err: E) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
    }
}

impl From<ConversionError> for ApiError {
    fn from(err: ConversionError) -> Self {
        match err {
            ConversionError::TableMappingNotFound(_) => {
                ApiError::new(StatusCode::NOT_FOUND, err.to_string())
            }
            ConversionError::Reparse(_) => ApiError::internal(err),
            ConversionError::Parse(_)
            | ConversionError::StatementCount(_)
            | ConversionError::NotASelect
            | ConversionError::MissingTable
            | ConversionError::MultipleTables(_)
            | ConversionError::UnsupportedTableSource(_)
            | ConversionError::UnmappedFields(_) => ApiError::bad_request(err.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        error!(status = %self.status, message = %self.message, "api error");
        let body = Json(ErrorBody {
            error: self.message,
        });
        (self.status, body).into_response()
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tempfile::TempDir;
    use tower::Service;

    const SCHEMA: &str = r#"[
      {
        "table_name": "lead",
        "mapped_table_id": "leads_tbl",
        "template_id": "tpl_lead",
        "template_type": "standard",
        "fields": [
          { "field_name": "status", "field_id": "f2", "field_type": "picklist" },
          { "field_name": "id", "field_id": "f1", "field_type": "number" }
        ]
      },
      {
        "Table Name": "session",
        "big_query_table_name": "sessions_tbl",
        "sales_template_id": "tpl_s",
        "fields": [
          { "field_name": "status", "bigquery_column_name": "s1", "field_type": "text" }
        ]
      }
    ]"#;

    fn setup_test_app(policy: UnmappedFieldPolicy) -> (Router, TempDir) {
        let temp = TempDir::new().expect("tempdir");
        let schema_path = temp.path().join("tables.json");
        std::fs::write(&schema_path, SCHEMA).expect("write schema");

        let registry = Registry::load(&JsonFileSource::new(&schema_path), DEFAULT_BASE_TEMPLATE)
            .expect("registry");
        let converter = Converter::with_config(
            Arc::new(registry),
            ConverterConfig {
                unmapped_fields: policy,
            },
        );
        let router = build_router(Arc::new(AppState { converter }));
        (router, temp)
    }

    fn convert_request(body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/v1/convert")
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .expect("request")
    }

    async fn json_body(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body bytes");
        serde_json::from_slice(&bytes).expect("json body")
    }

    #[tokio::test]
    async fn healthz_is_ok() {
        let (mut router, _tmp) = setup_test_app(UnmappedFieldPolicy::Drop);
        let request = Request::builder()
            .uri("/healthz")
            .body(Body::empty())
            .expect("request");
        let response = router.call(request).await.expect("response");
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn schema_lists_tables_in_load_order() {
        let (mut router, _tmp) = setup_test_app(UnmappedFieldPolicy::Drop);
        let request = Request::builder()
            .uri("/api/v1/schema")
            .body(Body::empty())
            .expect("request");
        let response = router.call(request).await.expect("response");
        assert_eq!(response.status(), StatusCode::OK);

        let schema = json_body(response).await;
        assert_eq!(schema["base_template"], "lead");
        assert_eq!(schema["fingerprint"].as_str().unwrap().len(), 64);
        assert_eq!(schema["tables"][0]["table_name"], "lead");
        assert_eq!(schema["tables"][0]["mapped_table_id"], "leads_tbl");
        assert_eq!(schema["tables"][0]["fields"][0]["field_name"], "id");
        assert_eq!(schema["tables"][0]["fields"][0]["field_type"], "number");
        assert_eq!(schema["tables"][1]["template_id"], "tpl_s");
    }

    #[tokio::test]
    async fn convert_returns_rewritten_query_and_model() {
        let (mut router, _tmp) = setup_test_app(UnmappedFieldPolicy::Drop);
        let request = convert_request(json!({
            "sql_query": "SELECT id, status FROM lead WHERE status = 'open';"
        }));
        let response = router.call(request).await.expect("response");
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        assert_eq!(
            body["updated_query"],
            "SELECT `f1`, `f2` FROM `leads_tbl` WHERE `f2` = 'open';"
        );
        assert_eq!(body["complete"], true);
        assert_eq!(body["omissions"], json!([]));
        assert_eq!(body["query_data"]["type"], "select");
        assert_eq!(body["query_data"]["columns"], json!(["f1", "f2"]));
        assert_eq!(body["query_data"]["conditions"]["type"], "comparison");
        assert_eq!(body["query_data"]["conditions"]["op"], "eq");
    }

    #[tokio::test]
    async fn convert_reports_unmapped_fields_as_omissions() {
        let (mut router, _tmp) = setup_test_app(UnmappedFieldPolicy::Drop);
        let request = convert_request(json!({ "sql_query": "SELECT ghost_field FROM lead" }));
        let response = router.call(request).await.expect("response");
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        assert_eq!(body["updated_query"], "SELECT ghost_field FROM `leads_tbl`");
        assert_eq!(body["complete"], false);
        assert_eq!(
            body["omissions"],
            json!([{ "kind": "unmapped_field", "token": "ghost_field" }])
        );
    }

    #[tokio::test]
    async fn convert_maps_errors_to_statuses() {
        let cases = [
            (
                UnmappedFieldPolicy::Drop,
                "SELECT id FROM nosuchtable",
                StatusCode::NOT_FOUND,
            ),
            (
                UnmappedFieldPolicy::Drop,
                "SELECT id FROM lead JOIN session ON lead.id = session.status",
                StatusCode::BAD_REQUEST,
            ),
            (
                UnmappedFieldPolicy::Drop,
                "DELETE FROM lead",
                StatusCode::BAD_REQUEST,
            ),
            (
                UnmappedFieldPolicy::Reject,
                "SELECT ghost_field FROM lead",
                StatusCode::BAD_REQUEST,
            ),
        ];

        for (policy, sql, expected) in cases {
            let (mut router, _tmp) = setup_test_app(policy);
            let response = router
                .call(convert_request(json!({ "sql_query": sql })))
                .await
                .expect("response");
            assert_eq!(response.status(), expected, "{sql}");
            let body = json_body(response).await;
            assert!(body["error"].is_string(), "{sql}");
        }
    }

    #[tokio::test]
    async fn convert_rejects_malformed_bodies() {
        let (mut router, _tmp) = setup_test_app(UnmappedFieldPolicy::Drop);

        let response = router
            .call(convert_request(json!({ "query": "SELECT id FROM lead" })))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = router
            .call(convert_request(json!({ "sql_query": "   " })))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["error"], "sql_query must not be empty");
    }

    #[test]
    fn config_defaults_and_overrides() {
        let config = AppConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config.listen_addr, "127.0.0.1:8080".parse().unwrap());
        assert_eq!(config.schema_path, PathBuf::from("tables.json"));
        assert_eq!(config.base_template, "lead");
        assert_eq!(config.unmapped_fields, UnmappedFieldPolicy::Drop);

        let vars: HashMap<&str, &str> = [
            ("QUERY_MAP_ADDR", "0.0.0.0:9000"),
            ("QUERY_MAP_SCHEMA_PATH", "/etc/query-map/tables.json"),
            ("QUERY_MAP_BASE_TEMPLATE", "account"),
            ("QUERY_MAP_UNMAPPED_FIELDS", "reject"),
        ]
        .into();
        let config = AppConfig::from_lookup(|key| vars.get(key).map(|v| v.to_string())).unwrap();
        assert_eq!(config.listen_addr.port(), 9000);
        assert_eq!(config.base_template, "account");
        assert_eq!(config.unmapped_fields, UnmappedFieldPolicy::Reject);
    }

    #[test]
    fn invalid_config_values_are_errors() {
        let err = AppConfig::from_lookup(|key| {
            (key == "QUERY_MAP_UNMAPPED_FIELDS").then(|| "ignore".to_string())
        })
        .unwrap_err();
        assert!(err.to_string().contains("QUERY_MAP_UNMAPPED_FIELDS"));

        let err =
            AppConfig::from_lookup(|key| (key == "QUERY_MAP_ADDR").then(|| "nope".to_string()))
                .unwrap_err();
        assert!(err.to_string().contains("QUERY_MAP_ADDR"));
    }
}

// HTTP layer - axum routes translating requests into core service calls.

use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::core::auth::AuthService;
use crate::core::shipment::RecordExtractor;
use crate::core::spreadsheet::SpreadsheetAppender;

#[path = "api_error.rs"]
pub mod api_error;

#[path = "routes/auth_routes.rs"]
pub mod auth_routes;

#[path = "routes/shipment_routes.rs"]
pub mod shipment_routes;

#[path = "routes/workbook_routes.rs"]
pub mod workbook_routes;

/// Label photos from phone cameras routinely exceed axum's 2 MB default.
const MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

/// Services shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<AuthService>,
    pub extractor: Arc<RecordExtractor>,
    pub appender: Arc<SpreadsheetAppender>,
    pub upload_dir: Arc<PathBuf>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(auth_routes::root))
        .route("/login", get(auth_routes::login))
        .route("/callback", get(auth_routes::callback))
        .route("/process-ocr/", post(shipment_routes::process_ocr))
        .route("/upload-test-image/", post(shipment_routes::upload_test_image))
        .route("/write-excel", post(workbook_routes::write_excel))
        .route("/excel-info", get(workbook_routes::excel_info))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use serde_json::Value;
    use tempfile::TempDir;
    use tower::ServiceExt;

    use crate::core::auth::{AuthError, AuthToken, TokenEndpoint, TokenGrant, TokenStore};
    use crate::core::shipment::{OcrEngine, OcrError};
    use crate::core::spreadsheet::{
        AppendError, AppendStrategy, UpstreamResponse, WorkbookClient,
    };

    const LABEL_TEXT: &str = "홍길동\n010-1234-5678\n서울시 강남구\n\n1234-5678-9012";
    const BOUNDARY: &str = "label-boundary";

    struct FakeEndpoint;

    #[async_trait]
    impl TokenEndpoint for FakeEndpoint {
        fn authorize_url(&self) -> String {
            "https://login.example/authorize?client_id=c".to_string()
        }

        async fn exchange_code(&self, code: &str) -> Result<TokenGrant, AuthError> {
            Ok(TokenGrant {
                access_token: format!("access-{code}"),
                refresh_token: Some("refresh".to_string()),
                expires_in: Some(3600),
            })
        }

        async fn refresh(&self, _: &str) -> Result<TokenGrant, AuthError> {
            Ok(TokenGrant {
                access_token: "refreshed".to_string(),
                refresh_token: None,
                expires_in: Some(3600),
            })
        }
    }

    #[derive(Default)]
    struct MemoryStore(Mutex<Option<AuthToken>>);

    #[async_trait]
    impl TokenStore for MemoryStore {
        async fn load(&self) -> Result<Option<AuthToken>, AuthError> {
            Ok(self.0.lock().unwrap().clone())
        }

        async fn save(&self, token: &AuthToken) -> Result<(), AuthError> {
            *self.0.lock().unwrap() = Some(token.clone());
            Ok(())
        }
    }

    /// Returns fixed text and remembers whether the staged image existed.
    #[derive(Default)]
    struct FakeOcr {
        seen: Mutex<Option<(std::path::PathBuf, bool)>>,
    }

    #[async_trait]
    impl OcrEngine for FakeOcr {
        async fn recognize(&self, image: &Path) -> Result<String, OcrError> {
            *self.seen.lock().unwrap() = Some((image.to_path_buf(), image.exists()));
            Ok(LABEL_TEXT.to_string())
        }
    }

    #[derive(Default)]
    struct FakeWorkbook {
        writes: Mutex<Vec<(String, String, Vec<String>)>>,
    }

    #[async_trait]
    impl WorkbookClient for FakeWorkbook {
        async fn used_range(&self, _: &str) -> Result<UpstreamResponse, AppendError> {
            Ok(UpstreamResponse {
                status: 200,
                body: r#"{"address":"유축기출고!A1:G23"}"#.to_string(),
            })
        }

        async fn write_range(
            &self,
            token: &str,
            address: &str,
            values: &[Vec<String>],
        ) -> Result<UpstreamResponse, AppendError> {
            self.writes.lock().unwrap().push((
                token.to_string(),
                address.to_string(),
                values[0].clone(),
            ));
            Ok(UpstreamResponse {
                status: 200,
                body: "{}".to_string(),
            })
        }

        async fn add_table_rows(
            &self,
            _: &str,
            _: &str,
            _: &[Vec<String>],
        ) -> Result<UpstreamResponse, AppendError> {
            unreachable!("range strategy only")
        }

        async fn read_range(&self, _: &str, _: &str) -> Result<UpstreamResponse, AppendError> {
            Ok(UpstreamResponse {
                status: 401,
                body: r#"{"error":{"code":"InvalidAuthenticationToken"}}"#.to_string(),
            })
        }
    }

    struct Harness {
        app: Router,
        store: Arc<MemoryStore>,
        ocr: Arc<FakeOcr>,
        workbook: Arc<FakeWorkbook>,
        _uploads: TempDir,
    }

    fn harness() -> Harness {
        let uploads = TempDir::new().unwrap();
        let store = Arc::new(MemoryStore::default());
        let ocr = Arc::new(FakeOcr::default());
        let workbook = Arc::new(FakeWorkbook::default());

        let auth = Arc::new(AuthService::new(Arc::new(FakeEndpoint), store.clone()));
        let state = AppState {
            auth: auth.clone(),
            extractor: Arc::new(RecordExtractor::new(ocr.clone())),
            appender: Arc::new(SpreadsheetAppender::new(
                workbook.clone(),
                auth,
                AppendStrategy::DirectRange,
            )),
            upload_dir: Arc::new(uploads.path().to_path_buf()),
        };

        Harness {
            app: router(state),
            store,
            ocr,
            workbook,
            _uploads: uploads,
        }
    }

    fn multipart_body(qr_text: Option<&str>, image: Option<&[u8]>) -> Body {
        let mut body = Vec::new();
        if let Some(qr) = qr_text {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"qr_text\"\r\n\r\n{qr}\r\n"
                )
                .as_bytes(),
            );
        }
        if let Some(bytes) = image {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"image\"; filename=\"label.jpg\"\r\nContent-Type: image/jpeg\r\n\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(bytes);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        Body::from(body)
    }

    fn multipart_request(uri: &str, body: Body) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(body)
            .unwrap()
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn log_in(harness: &Harness) {
        let response = harness
            .app
            .clone()
            .oneshot(
                Request::get("/callback?code=abc")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn login_redirects_to_identity_provider() {
        let response = harness()
            .app
            .oneshot(Request::get("/login").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(
            response.headers()[header::LOCATION],
            "https://login.example/authorize?client_id=c"
        );
    }

    #[tokio::test]
    async fn callback_without_code_is_a_bad_request() {
        let harness = harness();
        let response = harness
            .app
            .oneshot(Request::get("/callback").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error"], "AuthorizationMissing");
        assert!(harness.store.0.lock().unwrap().is_none());
    }

    #[tokio::test]
    async fn callback_stores_token_and_returns_access_token() {
        let harness = harness();
        let response = harness
            .app
            .clone()
            .oneshot(
                Request::get("/callback?code=xyz")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["access_token"], "access-xyz");
        assert_eq!(body["expires_in"], 3600);

        let stored = harness.store.0.lock().unwrap().clone().unwrap();
        assert_eq!(stored.refresh_token.as_deref(), Some("refresh"));
    }

    #[tokio::test]
    async fn process_ocr_extracts_and_appends_record() {
        let harness = harness();
        log_in(&harness).await;

        let response = harness
            .app
            .clone()
            .oneshot(multipart_request(
                "/process-ocr/",
                multipart_body(Some("SM000123"), Some(b"fake-jpeg")),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["status"], "success");
        assert_eq!(body["range"], "A24:G24");
        assert_eq!(body["data"]["deviceModel"], "심포니");
        assert_eq!(body["data"]["deviceId"], "000123");
        assert_eq!(body["data"]["renterName"], "홍길동");
        assert_eq!(body["data"]["phone"], "010-12345678");
        assert_eq!(body["data"]["address"], "서울시 강남구");
        assert_eq!(body["data"]["invoiceNumber"], "123456789012");

        let writes = harness.workbook.writes.lock().unwrap().clone();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].0, "access-abc");
        assert_eq!(writes[0].1, "A24:G24");
        assert_eq!(writes[0].2[4], "000123");

        // The staged image existed during OCR and is gone afterwards.
        let (path, existed) = harness.ocr.seen.lock().unwrap().clone().unwrap();
        assert!(existed);
        assert!(path.to_string_lossy().ends_with(".jpg"));
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn process_ocr_without_login_reports_missing_token() {
        let harness = harness();

        let response = harness
            .app
            .clone()
            .oneshot(multipart_request(
                "/process-ocr/",
                multipart_body(Some("SM1"), Some(b"fake-jpeg")),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(response).await["error"], "TokenCacheMissing");
        assert!(harness.workbook.writes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn process_ocr_requires_an_image() {
        let response = harness()
            .app
            .oneshot(multipart_request(
                "/process-ocr/",
                multipart_body(Some("SM1"), None),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error"], "BadRequest");
    }

    #[tokio::test]
    async fn test_upload_is_best_effort_without_token() {
        let harness = harness();

        let response = harness
            .app
            .clone()
            .oneshot(multipart_request(
                "/upload-test-image/",
                multipart_body(None, Some(b"fake-jpeg")),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["status"], "success");
        assert_eq!(body["range"], Value::Null);
        assert_eq!(body["data"]["deviceId"], "ST_QR");
        assert!(harness.workbook.writes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn write_excel_uses_the_callers_token() {
        let harness = harness();

        let response = harness
            .app
            .clone()
            .oneshot(
                Request::post("/write-excel")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(
                        r#"{"access_token":"caller-token","row":["2025-07-30","홍길동",null,7]}"#,
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["range"], "A24:D24");
        assert_eq!(body["row"], serde_json::json!(["2025-07-30", "홍길동", "", "7"]));

        let writes = harness.workbook.writes.lock().unwrap().clone();
        assert_eq!(writes[0].0, "caller-token");
    }

    #[tokio::test]
    async fn excel_info_surfaces_upstream_failure() {
        let response = harness()
            .app
            .oneshot(
                Request::get("/excel-info?access_token=stale")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let body = json_body(response).await;
        assert_eq!(body["error"], "ReadFailed");
        assert_eq!(body["status"], 401);
        assert_eq!(body["details"]["error"]["code"], "InvalidAuthenticationToken");
    }
}

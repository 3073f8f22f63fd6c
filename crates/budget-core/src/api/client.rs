//! API client for the budget REST API.
//!
//! Every request goes through the shared [`ApiHooks`]: the credential is
//! attached right before the request leaves, and a 401 response is reported
//! to `on_unauthorized` before the error is handed back to the caller.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};

use super::hooks::{ApiHooks, UnauthorizedSignalHandler};
use super::ApiError;
use crate::models::{
    AuthResponse, Budget, BudgetCreate, Category, CategoryCreate, LoginRequest, Month,
};

// ============================================================================
// Constants
// ============================================================================

/// HTTP request timeout in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Maximum number of retries for rate-limited (429) GET requests.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting.
const INITIAL_BACKOFF_MS: u64 = 1000;

/// API client for the budget service.
/// Clone is cheap - reqwest::Client and the hooks are both shared.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    hooks: Arc<ApiHooks>,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, hooks: Arc<ApiHooks>) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            hooks,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Build, authorize and send one request.
    async fn send(&self, builder: RequestBuilder) -> Result<Response, ApiError> {
        let mut request = builder.build()?;
        (self.hooks.attach_credential)(request.headers_mut());

        debug!(method = %request.method(), url = %request.url(), "Sending request");
        let response = self.client.execute(request).await?;
        self.check_response(response).await
    }

    /// Pass successes through; turn failures into `ApiError`, reporting a 401
    /// to the unauthorized hook exactly once first.
    async fn check_response(&self, response: Response) -> Result<Response, ApiError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        if UnauthorizedSignalHandler::is_unauthorized(status) {
            (self.hooks.on_unauthorized)(status);
        }

        let body = response.text().await.unwrap_or_default();
        Err(ApiError::from_status(status, &body))
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let url = self.url(path);
        let mut retries = 0;
        let mut backoff_ms = INITIAL_BACKOFF_MS;

        loop {
            match self.send(self.client.get(&url)).await {
                Ok(response) => {
                    return response
                        .json()
                        .await
                        .map_err(|e| ApiError::InvalidResponse(format!("{}: {}", url, e)));
                }
                Err(ApiError::RateLimited) if retries < MAX_RATE_LIMIT_RETRIES => {
                    retries += 1;
                    warn!(url = %url, retry = retries, backoff_ms = backoff_ms, "Rate limited, backing off");
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                    backoff_ms *= 2;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn post<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T, ApiError> {
        let url = self.url(path);
        let response = self.send(self.client.post(&url).json(body)).await?;
        response
            .json()
            .await
            .map_err(|e| ApiError::InvalidResponse(format!("{}: {}", url, e)))
    }

    // ===== Authentication =====

    /// Exchange username and password for a credential
    pub async fn login(&self, username: &str, password: &str) -> Result<String, ApiError> {
        let body = LoginRequest {
            username: username.to_string(),
            password: password.to_string(),
        };
        let response: AuthResponse = self.post("auth/login", &body).await?;
        response
            .token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ApiError::InvalidResponse("Login response carried no token".to_string()))
    }

    pub async fn register(&self, username: &str, password: &str) -> Result<String, ApiError> {
        let body = LoginRequest {
            username: username.to_string(),
            password: password.to_string(),
        };
        let response: AuthResponse = self.post("auth/register", &body).await?;
        Ok(response.message)
    }

    /// Fetch a credential for the demo account (only on demo deployments)
    pub async fn demo_token(&self) -> Result<String, ApiError> {
        let response = self.send(self.client.get(self.url("auth/demo-token"))).await?;
        let token = response.text().await?;
        let token = token.trim();
        if token.is_empty() {
            return Err(ApiError::InvalidResponse(
                "Demo token response was empty".to_string(),
            ));
        }
        Ok(token.to_string())
    }

    // ===== Budgets =====

    /// Months that have saved budgets, most recent first
    pub async fn fetch_months(&self) -> Result<Vec<Month>, ApiError> {
        self.get("budgets/months").await
    }

    pub async fn fetch_budgets_for_month(&self, month: &str) -> Result<Vec<Budget>, ApiError> {
        self.get(&format!("budgets/month/{}", month)).await
    }

    pub async fn create_budget(&self, budget: &BudgetCreate) -> Result<Budget, ApiError> {
        budget.validate().map_err(ApiError::Validation)?;
        self.post("budgets", budget).await
    }

    // ===== Categories =====

    pub async fn fetch_categories(&self) -> Result<Vec<Category>, ApiError> {
        self.get("categories").await
    }

    pub async fn create_category(&self, category: &CategoryCreate) -> Result<Category, ApiError> {
        category.validate().map_err(ApiError::Validation)?;
        self.post("categories", category).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    use super::*;
    use crate::auth::{MemoryStorage, Session, SessionStore};
    use crate::models::TransactionType;

    /// Requests seen by the canned server, one raw head per request
    type Seen = Arc<Mutex<Vec<String>>>;

    fn reason(status: u16) -> &'static str {
        match status {
            200 => "OK",
            201 => "Created",
            400 => "Bad Request",
            401 => "Unauthorized",
            429 => "Too Many Requests",
            _ => "Other",
        }
    }

    /// Serve the given responses, one connection each, in order
    async fn serve(responses: Vec<(u16, &'static str)>) -> (String, Seen) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let seen: Seen = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&seen);

        tokio::spawn(async move {
            for (status, body) in responses {
                let (mut socket, _) = listener.accept().await.unwrap();
                let head = read_request(&mut socket).await;
                log.lock().unwrap().push(head);

                let reply = format!(
                    "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    reason(status),
                    body.len(),
                    body
                );
                socket.write_all(reply.as_bytes()).await.unwrap();
                socket.shutdown().await.ok();
            }
        });

        (format!("http://{}/api/", addr), seen)
    }

    /// Read one request head plus its body, returning the head lowercased
    async fn read_request(socket: &mut tokio::net::TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        let head_end = loop {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                break buf.len();
            }
            buf.extend_from_slice(&chunk[..n]);
            if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos + 4;
            }
        };

        let head = String::from_utf8_lossy(&buf[..head_end]).to_ascii_lowercase();
        let content_length = head
            .lines()
            .find_map(|line| line.strip_prefix("content-length:"))
            .and_then(|v| v.trim().parse::<usize>().ok())
            .unwrap_or(0);

        while buf.len() < head_end + content_length {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
        }
        head
    }

    fn authorization(head: &str) -> Option<String> {
        head.lines()
            .find_map(|line| line.strip_prefix("authorization:"))
            .map(|v| v.trim().to_string())
    }

    fn session() -> Arc<SessionStore> {
        let store = Arc::new(SessionStore::new(MemoryStorage::new()));
        store.init_at(0);
        store
    }

    fn client_for(base_url: &str, store: &Arc<SessionStore>) -> ApiClient {
        let hooks = Arc::new(ApiHooks::for_session(Arc::clone(store)));
        ApiClient::new(base_url, hooks).unwrap()
    }

    fn count_logouts(store: &SessionStore) -> Arc<AtomicUsize> {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        store.subscribe(move |s: &Session| {
            if s.credential.is_none() {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });
        count
    }

    #[tokio::test]
    async fn test_logged_out_call_carries_no_authorization() {
        let (base, seen) = serve(vec![(200, "[]"), (200, "[]")]).await;
        let store = session();
        let api = client_for(&base, &store);

        store.login("abc.def.ghi");
        api.fetch_months().await.unwrap();
        store.logout();
        api.fetch_months().await.unwrap();

        let seen = seen.lock().unwrap();
        assert!(seen[0].starts_with("get /api/budgets/months "));
        assert_eq!(authorization(&seen[0]).as_deref(), Some("bearer abc.def.ghi"));
        assert_eq!(authorization(&seen[1]), None);
    }

    #[tokio::test]
    async fn test_unauthorized_logs_out_once_and_returns_error() {
        let (base, _seen) = serve(vec![(401, "Unauthorized")]).await;
        let store = session();
        store.login("abc.def.ghi");
        let logouts = count_logouts(&store);
        let api = client_for(&base, &store);

        let err = api.fetch_categories().await.unwrap_err();

        assert!(err.is_unauthorized());
        assert_eq!(logouts.load(Ordering::SeqCst), 1);
        assert_eq!(store.credential(), None);
    }

    #[tokio::test]
    async fn test_concurrent_unauthorized_responses_share_one_logout() {
        let (base, _seen) = serve(vec![(401, "Unauthorized"), (401, "Unauthorized")]).await;
        let store = session();
        store.login("abc.def.ghi");
        let logouts = count_logouts(&store);
        let api = client_for(&base, &store);

        let (first, second) = futures::join!(api.fetch_months(), api.fetch_categories());

        assert!(first.unwrap_err().is_unauthorized());
        assert!(second.unwrap_err().is_unauthorized());
        assert_eq!(logouts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_rate_limited_get_is_retried() {
        let (base, seen) = serve(vec![(429, ""), (200, "[]")]).await;
        let store = session();
        let api = client_for(&base, &store);

        let months = api.fetch_months().await.unwrap();

        assert!(months.is_empty());
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert!(seen.iter().all(|head| head.starts_with("get /api/budgets/months ")));
    }

    #[tokio::test]
    async fn test_unauthorized_get_is_not_retried() {
        // A second canned reply is left unserved if the client never retries
        let (base, seen) = serve(vec![(401, ""), (200, "[]")]).await;
        let store = session();
        store.login("abc.def.ghi");
        let api = client_for(&base, &store);

        let err = api.fetch_months().await.unwrap_err();

        assert!(err.is_unauthorized());
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_demo_token_is_trimmed() {
        let (base, seen) = serve(vec![(200, "eyJ.demo.sig\n")]).await;
        let store = session();
        let api = client_for(&base, &store);

        let token = api.demo_token().await.unwrap();

        assert_eq!(token, "eyJ.demo.sig");
        assert!(seen.lock().unwrap()[0].starts_with("get /api/auth/demo-token "));
    }

    #[tokio::test]
    async fn test_blank_demo_token_is_rejected() {
        let (base, _seen) = serve(vec![(200, "  ")]).await;
        let store = session();
        let api = client_for(&base, &store);

        assert!(matches!(
            api.demo_token().await,
            Err(ApiError::InvalidResponse(_))
        ));
        assert_eq!(store.credential(), None);
    }

    #[tokio::test]
    async fn test_login_returns_token() {
        let (base, seen) = serve(vec![(
            200,
            r#"{"message":"Login successful","token":"eyJ.abc.def"}"#,
        )])
        .await;
        let store = session();
        let api = client_for(&base, &store);

        let token = api.login("demo", "password").await.unwrap();

        assert_eq!(token, "eyJ.abc.def");
        assert!(seen.lock().unwrap()[0].starts_with("post /api/auth/login "));
        // The client hands the token back; storing it is the caller's call
        assert_eq!(store.credential(), None);
    }

    #[tokio::test]
    async fn test_failed_login_is_unauthorized() {
        let (base, _seen) = serve(vec![(401, "")]).await;
        let store = session();
        let api = client_for(&base, &store);

        let err = api.login("demo", "wrong").await.unwrap_err();
        assert!(err.is_unauthorized());
        assert!(store.is_ready());
    }

    #[tokio::test]
    async fn test_register_returns_message() {
        let (base, seen) = serve(vec![(
            201,
            r#"{"message":"User registered successfully","token":null}"#,
        )])
        .await;
        let store = session();
        let api = client_for(&base, &store);

        let message = api.register("newbie", "hunter2").await.unwrap();

        assert_eq!(message, "User registered successfully");
        assert!(seen.lock().unwrap()[0].starts_with("post /api/auth/register "));
    }

    #[tokio::test]
    async fn test_fetch_budgets_for_month() {
        let (base, seen) = serve(vec![(
            200,
            r#"[{"id":1,"value":500.0,"month":"2025-02","category":{"id":5,"name":"Groceries","type":"EXPENSE"}}]"#,
        )])
        .await;
        let store = session();
        let api = client_for(&base, &store);

        let budgets = api.fetch_budgets_for_month("2025-02").await.unwrap();

        assert_eq!(budgets.len(), 1);
        assert_eq!(budgets[0].category.kind, TransactionType::Expense);
        assert!(seen.lock().unwrap()[0].starts_with("get /api/budgets/month/2025-02 "));
    }

    #[tokio::test]
    async fn test_validation_error_surfaces_server_message() {
        let (base, _seen) = serve(vec![(400, r#"{"message":"Validation failed for request"}"#)]).await;
        let store = session();
        let api = client_for(&base, &store);

        let category = CategoryCreate {
            name: "Rent".to_string(),
            kind: TransactionType::Expense,
        };
        match api.create_category(&category).await {
            Err(ApiError::Validation(msg)) => assert_eq!(msg, "Validation failed for request"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_invalid_budget_never_leaves_the_client() {
        let store = session();
        // Nothing listens here; validation must fail first
        let api = client_for("http://127.0.0.1:9/api", &store);

        let draft = BudgetCreate {
            value: 10.0,
            month: "soon".to_string(),
            category_id: Some(1),
        };
        assert!(matches!(
            api.create_budget(&draft).await,
            Err(ApiError::Validation(_))
        ));
    }

    #[test]
    fn test_url_joining() {
        let api = ApiClient::new("http://localhost:8080/api/", Arc::new(ApiHooks::detached())).unwrap();
        assert_eq!(api.base_url(), "http://localhost:8080/api");
        assert_eq!(api.url("/budgets"), "http://localhost:8080/api/budgets");
        assert_eq!(api.url("categories"), "http://localhost:8080/api/categories");
    }
}

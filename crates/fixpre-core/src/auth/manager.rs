//! Account operations: login, registration, Google sign-in, password reset
//! and logout.
//!
//! Each network operation flips `loading` on, clears the previous error,
//! issues exactly one request and records the outcome in `AuthState`. There
//! is no retry; the caller re-invokes on failure.

use reqwest::StatusCode;
use serde_json::{json, Value};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::api::{ApiClient, ApiError, Failure, JsonBody, RawResponse};

// ============================================================================
// Endpoints and messages
// ============================================================================

const LOGIN_PATH: &str = "/users/auth";
const REGISTER_PATH: &str = "/users";
const GOOGLE_PATH: &str = "/auth/google";
const RESET_REQUEST_PATH: &str = "/users/password/request";
const RESET_CONFIRM_PATH: &str = "/users/password/reset";

/// Token field names each endpoint is known to return. The backend is not
/// consistent, so every endpoint gets its own list instead of a guess.
const LOGIN_TOKEN_FIELDS: &[&str] = &["accessToken"];
const REGISTER_TOKEN_FIELDS: &[&str] = &["token", "jwt"];
const GOOGLE_TOKEN_FIELDS: &[&str] = &["token"];

const LOGIN_FAILED: &str = "Login failed. Please check your credentials.";
const NO_TOKEN_RECEIVED: &str = "No token received from server.";
const REGISTER_FAILED: &str = "Registration failed.";
const GOOGLE_FAILED: &str = "Google login failed";
const RESET_REQUEST_FAILED: &str = "An error occurred.";
const RESET_FAILED: &str = "Password reset failed.";

/// Shown for both "sent" and "no such account" so the response does not
/// reveal whether an email is registered.
pub const RESET_REQUEST_NOTICE: &str = "If an account exists, a link has been sent";
pub const RESET_DONE_NOTICE: &str = "Your password has been reset.";

/// Observable state of the password reset flow
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResetState {
    pub loading: bool,
    pub success: Option<String>,
    pub error: Option<Failure>,
}

/// Observable state of the account operations
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuthState {
    pub loading: bool,
    pub error: Option<Failure>,
    pub reset: ResetState,
}

/// A bearer token as issued by any of the sign-in endpoints
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedToken(pub String);

impl IssuedToken {
    /// First non-empty string among `fields` in a JSON object.
    pub fn extract(body: &Value, fields: &[&str]) -> Option<Self> {
        fields.iter().find_map(|field| {
            body.get(*field)
                .and_then(Value::as_str)
                .filter(|token| !token.is_empty())
                .map(|token| IssuedToken(token.to_string()))
        })
    }
}

pub struct AuthManager {
    api: ApiClient,
    state: watch::Sender<AuthState>,
}

impl AuthManager {
    pub fn new(api: ApiClient) -> Self {
        let (state, _) = watch::channel(AuthState::default());
        Self { api, state }
    }

    /// Snapshot of the current state
    pub fn state(&self) -> AuthState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.state.subscribe()
    }

    pub fn is_logged_in(&self) -> bool {
        self.api.session().is_logged_in()
    }

    /// Sign in with email and password. The server must issue a token.
    pub async fn login(&self, email: &str, password: &str) -> Result<(), ApiError> {
        self.begin();
        let result = self.login_inner(email, password).await;
        self.finish(result.as_ref().err());
        if result.is_ok() {
            info!("Login successful");
        }
        result
    }

    async fn login_inner(&self, email: &str, password: &str) -> Result<(), ApiError> {
        let body = json!({ "email": email, "password": password });
        let response = self
            .api
            .post_json(LOGIN_PATH, JsonBody::LinkedData, &body)
            .await?;
        if !response.is_success() {
            return Err(ApiError::Status {
                status: response.status().as_u16(),
                message: LOGIN_FAILED.to_string(),
            });
        }
        let token = IssuedToken::extract(&response.json::<Value>()?, LOGIN_TOKEN_FIELDS)
            .ok_or_else(|| ApiError::InvalidResponse(NO_TOKEN_RECEIVED.to_string()))?;
        self.store(token)
    }

    /// Create an account. Returns whether the server also signed the user in
    /// by issuing a token.
    pub async fn register(&self, email: &str, password: &str) -> Result<bool, ApiError> {
        self.begin();
        let result = self.register_inner(email, password).await;
        self.finish(result.as_ref().err());
        if let Ok(signed_in) = result {
            info!(signed_in, "Registration successful");
        }
        result
    }

    async fn register_inner(&self, email: &str, password: &str) -> Result<bool, ApiError> {
        let body = json!({ "email": email, "password": password });
        let response = self
            .api
            .post_json(REGISTER_PATH, JsonBody::LinkedData, &body)
            .await?;
        if !response.is_success() {
            return Err(response.error_with_detail(&["message"], REGISTER_FAILED));
        }
        self.store_if_issued(&response, REGISTER_TOKEN_FIELDS)
    }

    /// Exchange a Google OAuth authorization code for a session.
    /// Returns whether a token was issued.
    pub async fn login_with_code(&self, code: &str) -> Result<bool, ApiError> {
        self.begin();
        let result = self.login_with_code_inner(code).await;
        self.finish(result.as_ref().err());
        if let Ok(signed_in) = result {
            info!(signed_in, "Google sign-in complete");
        }
        result
    }

    async fn login_with_code_inner(&self, code: &str) -> Result<bool, ApiError> {
        let body = json!({ "code": code });
        let response = self
            .api
            .post_json(GOOGLE_PATH, JsonBody::Plain, &body)
            .await?;
        if !response.is_success() {
            return Err(response.error_with_detail(&["error"], GOOGLE_FAILED));
        }
        self.store_if_issued(&response, GOOGLE_TOKEN_FIELDS)
    }

    /// Ask for a password reset email. A 404 is reported as success so the
    /// answer does not reveal whether the account exists. Returns the notice
    /// to show.
    pub async fn request_password_reset(&self, email: &str) -> Result<String, ApiError> {
        self.begin_reset();
        let result = self.request_password_reset_inner(email).await;
        self.finish_reset(&result);
        result
    }

    async fn request_password_reset_inner(&self, email: &str) -> Result<String, ApiError> {
        let body = json!({ "email": email });
        let response = self
            .api
            .post_json(RESET_REQUEST_PATH, JsonBody::LinkedData, &body)
            .await?;
        if response.is_success() || response.status() == StatusCode::NOT_FOUND {
            Ok(notice(&response, RESET_REQUEST_NOTICE))
        } else {
            Err(response.error_with_detail(&["detail"], RESET_REQUEST_FAILED))
        }
    }

    /// Set a new password using the token from the reset email.
    pub async fn reset_password(&self, token: &str, new_password: &str) -> Result<String, ApiError> {
        self.begin_reset();
        let result = self.reset_password_inner(token, new_password).await;
        self.finish_reset(&result);
        result
    }

    async fn reset_password_inner(&self, token: &str, new_password: &str) -> Result<String, ApiError> {
        let body = json!({ "token": token, "newPassword": new_password });
        let response = self
            .api
            .post_json(RESET_CONFIRM_PATH, JsonBody::LinkedData, &body)
            .await?;
        if !response.is_success() {
            return Err(response.error_with_detail(&["detail"], RESET_FAILED));
        }
        Ok(notice(&response, RESET_DONE_NOTICE))
    }

    /// Forget the token and the last error. No network call.
    ///
    /// The in-memory session is always cleared. An error means the stored
    /// token could not be removed and would be loaded again next time.
    pub fn logout(&self) -> Result<(), ApiError> {
        let result = self
            .api
            .session()
            .clear()
            .map_err(|e| ApiError::Storage(format!("{:#}", e)));
        match &result {
            Ok(()) => info!("Logged out"),
            Err(e) => warn!(error = %e, "Failed to clear stored token"),
        }
        self.state
            .send_modify(|state| state.error = result.as_ref().err().map(Failure::from));
        result
    }

    fn store(&self, token: IssuedToken) -> Result<(), ApiError> {
        self.api
            .session()
            .set_token(token.0)
            .map_err(|e| ApiError::Storage(format!("{:#}", e)))
    }

    fn store_if_issued(&self, response: &RawResponse, fields: &[&str]) -> Result<bool, ApiError> {
        match IssuedToken::extract(&response.json::<Value>()?, fields) {
            Some(token) => {
                self.store(token)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn begin(&self) {
        self.state.send_modify(|state| {
            state.loading = true;
            state.error = None;
        });
    }

    fn finish(&self, error: Option<&ApiError>) {
        if let Some(e) = error {
            warn!(error = %e, "Account operation failed");
        }
        self.state.send_modify(|state| {
            state.loading = false;
            state.error = error.map(Failure::from);
        });
    }

    fn begin_reset(&self) {
        self.state.send_modify(|state| {
            state.reset = ResetState {
                loading: true,
                ..ResetState::default()
            };
        });
    }

    fn finish_reset(&self, result: &Result<String, ApiError>) {
        self.state.send_modify(|state| {
            state.reset.loading = false;
            match result {
                Ok(message) => state.reset.success = Some(message.clone()),
                Err(e) => state.reset.error = Some(Failure::from(e)),
            }
        });
    }
}

/// The body's `message`, or `fallback` when the server sent none.
fn notice(response: &RawResponse, fallback: &str) -> String {
    response
        .json_value()
        .as_ref()
        .and_then(|body| body.get("message"))
        .and_then(Value::as_str)
        .filter(|message| !message.is_empty())
        .unwrap_or(fallback)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ErrorKind;
    use crate::auth::{FailingCredentials, Session};
    use crate::config::Config;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn manager_for(server: &MockServer) -> AuthManager {
        let api = ApiClient::new(&Config::for_base_url(&server.uri()), Session::in_memory())
            .expect("client builds");
        AuthManager::new(api)
    }

    async fn mount(server: &MockServer, route: &str, response: ResponseTemplate) {
        Mock::given(method("POST"))
            .and(path(route))
            .respond_with(response)
            .mount(server)
            .await;
    }

    #[test]
    fn test_issued_token_extract_prefers_listed_order() {
        let body = json!({"jwt": "second", "token": "first"});
        assert_eq!(
            IssuedToken::extract(&body, REGISTER_TOKEN_FIELDS),
            Some(IssuedToken("first".into()))
        );
        let body = json!({"jwt": "only-jwt", "token": ""});
        assert_eq!(
            IssuedToken::extract(&body, REGISTER_TOKEN_FIELDS),
            Some(IssuedToken("only-jwt".into()))
        );
        assert_eq!(IssuedToken::extract(&json!({"token": "t"}), LOGIN_TOKEN_FIELDS), None);
    }

    #[tokio::test]
    async fn test_login_stores_access_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(LOGIN_PATH))
            .and(header("content-type", "application/ld+json"))
            .and(body_json(json!({"email": "ada@example.com", "password": "hunter2"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"accessToken": "jwt-1"})))
            .expect(1)
            .mount(&server)
            .await;

        let auth = manager_for(&server);
        auth.login("ada@example.com", "hunter2").await.unwrap();

        assert!(auth.is_logged_in());
        assert_eq!(auth.api.session().token().as_deref(), Some("jwt-1"));
        let state = auth.state();
        assert!(!state.loading);
        assert_eq!(state.error, None);
    }

    #[tokio::test]
    async fn test_login_failure_for_every_error_status() {
        for status in [400, 401, 403, 404, 409, 422, 429, 500, 502, 503] {
            let server = MockServer::start().await;
            mount(
                &server,
                LOGIN_PATH,
                ResponseTemplate::new(status).set_body_json(json!({"detail": "ignored"})),
            )
            .await;

            let auth = manager_for(&server);
            let err = auth.login("a@b.c", "pw").await.unwrap_err();
            assert_eq!(err.status(), Some(status));

            let state = auth.state();
            assert!(!state.loading, "loading left on for {}", status);
            let failure = state.error.expect("error set");
            assert_eq!(failure.kind, ErrorKind::Status);
            assert_eq!(failure.message, LOGIN_FAILED);
            assert!(!auth.is_logged_in());
        }
    }

    #[tokio::test]
    async fn test_login_without_token_is_malformed() {
        let server = MockServer::start().await;
        mount(
            &server,
            LOGIN_PATH,
            ResponseTemplate::new(200).set_body_json(json!({"token": "wrong-field"})),
        )
        .await;

        let auth = manager_for(&server);
        let err = auth.login("a@b.c", "pw").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedResponse);
        assert!(err.to_string().contains(NO_TOKEN_RECEIVED));
        assert!(!auth.is_logged_in());
    }

    #[tokio::test]
    async fn test_login_clears_previous_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(LOGIN_PATH))
            .respond_with(ResponseTemplate::new(401))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        mount(
            &server,
            LOGIN_PATH,
            ResponseTemplate::new(200).set_body_json(json!({"accessToken": "ok"})),
        )
        .await;

        let auth = manager_for(&server);
        assert!(auth.login("a@b.c", "bad").await.is_err());
        assert!(auth.state().error.is_some());

        auth.login("a@b.c", "good").await.unwrap();
        assert_eq!(auth.state().error, None);
    }

    #[tokio::test]
    async fn test_transport_failure_sets_error() {
        // Nothing listens on the discard port
        let api = ApiClient::new(&Config::for_base_url("http://127.0.0.1:9"), Session::in_memory())
            .unwrap();
        let auth = AuthManager::new(api);

        let err = auth.login("a@b.c", "pw").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transport);
        let state = auth.state();
        assert!(!state.loading);
        assert_eq!(state.error.map(|f| f.kind), Some(ErrorKind::Transport));
    }

    #[tokio::test]
    async fn test_register_accepts_jwt_field() {
        let server = MockServer::start().await;
        mount(
            &server,
            REGISTER_PATH,
            ResponseTemplate::new(201).set_body_json(json!({"jwt": "fresh"})),
        )
        .await;

        let auth = manager_for(&server);
        assert!(auth.register("new@example.com", "pw").await.unwrap());
        assert_eq!(auth.api.session().token().as_deref(), Some("fresh"));
    }

    #[tokio::test]
    async fn test_register_without_token_succeeds_logged_out() {
        let server = MockServer::start().await;
        mount(
            &server,
            REGISTER_PATH,
            ResponseTemplate::new(201).set_body_json(json!({"id": 7})),
        )
        .await;

        let auth = manager_for(&server);
        assert!(!auth.register("new@example.com", "pw").await.unwrap());
        assert!(!auth.is_logged_in());
        assert_eq!(auth.state().error, None);
    }

    #[tokio::test]
    async fn test_register_error_uses_server_message() {
        let server = MockServer::start().await;
        mount(
            &server,
            REGISTER_PATH,
            ResponseTemplate::new(422).set_body_json(json!({"message": "Email already in use"})),
        )
        .await;

        let auth = manager_for(&server);
        let err = auth.register("dup@example.com", "pw").await.unwrap_err();
        assert_eq!(err.to_string(), "Email already in use");
        assert_eq!(
            auth.state().error.map(|f| f.message).as_deref(),
            Some("Email already in use")
        );
    }

    #[tokio::test]
    async fn test_register_error_fallback() {
        let server = MockServer::start().await;
        mount(&server, REGISTER_PATH, ResponseTemplate::new(500)).await;

        let auth = manager_for(&server);
        let err = auth.register("a@b.c", "pw").await.unwrap_err();
        assert_eq!(err.to_string(), REGISTER_FAILED);
        assert!(!auth.state().loading);
    }

    #[tokio::test]
    async fn test_google_code_exchange() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(GOOGLE_PATH))
            .and(header("content-type", "application/json"))
            .and(body_json(json!({"code": "4/0Ab"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"token": "g-jwt"})))
            .expect(1)
            .mount(&server)
            .await;

        let auth = manager_for(&server);
        assert!(auth.login_with_code("4/0Ab").await.unwrap());
        assert_eq!(auth.api.session().token().as_deref(), Some("g-jwt"));
    }

    #[tokio::test]
    async fn test_google_code_error_field() {
        let server = MockServer::start().await;
        mount(
            &server,
            GOOGLE_PATH,
            ResponseTemplate::new(400).set_body_json(json!({"error": "invalid_grant"})),
        )
        .await;

        let auth = manager_for(&server);
        let err = auth.login_with_code("stale").await.unwrap_err();
        assert_eq!(err.to_string(), "invalid_grant");
        assert!(!auth.is_logged_in());
    }

    #[tokio::test]
    async fn test_password_reset_request_404_is_success() {
        let server = MockServer::start().await;
        mount(
            &server,
            RESET_REQUEST_PATH,
            ResponseTemplate::new(404).set_body_json(json!({"detail": "User not found"})),
        )
        .await;

        let auth = manager_for(&server);
        let notice = auth.request_password_reset("ghost@example.com").await.unwrap();
        assert_eq!(notice, RESET_REQUEST_NOTICE);

        let reset = auth.state().reset;
        assert!(!reset.loading);
        assert_eq!(reset.success.as_deref(), Some(RESET_REQUEST_NOTICE));
        assert_eq!(reset.error, None);
    }

    #[tokio::test]
    async fn test_password_reset_request_404_with_message() {
        let server = MockServer::start().await;
        mount(
            &server,
            RESET_REQUEST_PATH,
            ResponseTemplate::new(404).set_body_json(json!({"message": "Check your inbox"})),
        )
        .await;

        let auth = manager_for(&server);
        assert_eq!(
            auth.request_password_reset("x@example.com").await.unwrap(),
            "Check your inbox"
        );
    }

    #[tokio::test]
    async fn test_password_reset_request_server_error() {
        let server = MockServer::start().await;
        mount(
            &server,
            RESET_REQUEST_PATH,
            ResponseTemplate::new(500).set_body_json(json!({"detail": "Mailer down"})),
        )
        .await;

        let auth = manager_for(&server);
        let err = auth.request_password_reset("x@example.com").await.unwrap_err();
        assert_eq!(err.to_string(), "Mailer down");

        let reset = auth.state().reset;
        assert!(!reset.loading);
        assert_eq!(reset.success, None);
        assert_eq!(reset.error.map(|f| f.message).as_deref(), Some("Mailer down"));
    }

    #[tokio::test]
    async fn test_reset_password() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(RESET_CONFIRM_PATH))
            .and(body_json(json!({"token": "reset-tok", "newPassword": "n3w"})))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"message": "Password updated"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let auth = manager_for(&server);
        let notice = auth.reset_password("reset-tok", "n3w").await.unwrap();
        assert_eq!(notice, "Password updated");
        // A reset never signs the user in
        assert!(!auth.is_logged_in());
    }

    #[tokio::test]
    async fn test_reset_password_failure_uses_detail() {
        let server = MockServer::start().await;
        mount(
            &server,
            RESET_CONFIRM_PATH,
            ResponseTemplate::new(400).set_body_json(json!({"detail": "Token expired"})),
        )
        .await;

        let auth = manager_for(&server);
        let err = auth.reset_password("old", "n3w").await.unwrap_err();
        assert_eq!(err.to_string(), "Token expired");
        assert!(!auth.state().reset.loading);
    }

    #[tokio::test]
    async fn test_logout_clears_token_and_error() {
        let server = MockServer::start().await;
        mount(&server, LOGIN_PATH, ResponseTemplate::new(401)).await;

        let auth = manager_for(&server);
        auth.api.session().set_token("existing").unwrap();
        let _ = auth.login("a@b.c", "bad").await;
        assert!(auth.state().error.is_some());

        auth.logout().unwrap();
        assert!(!auth.is_logged_in());
        assert_eq!(auth.state().error, None);
    }

    fn manager_with(server: &MockServer, backend: FailingCredentials) -> AuthManager {
        let api = ApiClient::new(&Config::for_base_url(&server.uri()), Session::open(backend))
            .expect("client builds");
        AuthManager::new(api)
    }

    #[tokio::test]
    async fn test_logout_reports_backend_failure() {
        let server = MockServer::start().await;
        let auth = manager_with(&server, FailingCredentials::failing_clear("tok"));
        assert!(auth.is_logged_in());

        let err = auth.logout().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Storage);
        assert!(err.to_string().contains("keychain locked"));
        assert!(!auth.is_logged_in());
        assert_eq!(auth.state().error.map(|f| f.kind), Some(ErrorKind::Storage));
    }

    #[tokio::test]
    async fn test_login_with_failing_store_stays_logged_out() {
        let server = MockServer::start().await;
        mount(
            &server,
            LOGIN_PATH,
            ResponseTemplate::new(200).set_body_json(json!({"accessToken": "jwt-1"})),
        )
        .await;

        let auth = manager_with(&server, FailingCredentials::failing_store());
        let err = auth.login("a@b.c", "pw").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Storage);
        assert!(!auth.is_logged_in());

        let state = auth.state();
        assert!(!state.loading);
        assert_eq!(state.error.map(|f| f.kind), Some(ErrorKind::Storage));

        let router = crate::guard::Router::new(auth.api.session().clone());
        assert_eq!(
            router.navigate_to(crate::guard::Page::History).decision,
            crate::guard::GuardDecision::RedirectToLogin
        );
    }

    #[tokio::test]
    async fn test_password_reset_request_2xx_uses_message() {
        let server = MockServer::start().await;
        mount(
            &server,
            RESET_REQUEST_PATH,
            ResponseTemplate::new(200).set_body_json(json!({"message": "Reset link sent"})),
        )
        .await;

        let auth = manager_for(&server);
        let notice = auth.request_password_reset("ada@example.com").await.unwrap();
        assert_eq!(notice, "Reset link sent");

        let reset = auth.state().reset;
        assert!(!reset.loading);
        assert_eq!(reset.success.as_deref(), Some("Reset link sent"));
        assert_eq!(reset.error, None);
    }

    #[tokio::test]
    async fn test_password_reset_request_2xx_empty_body_falls_back() {
        let server = MockServer::start().await;
        mount(&server, RESET_REQUEST_PATH, ResponseTemplate::new(204)).await;

        let auth = manager_for(&server);
        let notice = auth.request_password_reset("ada@example.com").await.unwrap();
        assert_eq!(notice, RESET_REQUEST_NOTICE);
        assert_eq!(auth.state().reset.success.as_deref(), Some(RESET_REQUEST_NOTICE));
    }

    #[tokio::test]
    async fn test_subscribers_see_loading_transitions() {
        let server = MockServer::start().await;
        mount(
            &server,
            LOGIN_PATH,
            ResponseTemplate::new(200)
                .set_body_json(json!({"accessToken": "t"}))
                .set_delay(std::time::Duration::from_millis(100)),
        )
        .await;

        let auth = manager_for(&server);
        let mut rx = auth.subscribe();
        let login = auth.login("a@b.c", "pw");
        let watcher = async {
            rx.wait_for(|state| state.loading).await.map(|_| ()).unwrap();
            rx.wait_for(|state| !state.loading).await.map(|_| ()).unwrap();
        };
        let (result, ()) = tokio::join!(login, watcher);
        assert!(result.is_ok());
    }
}

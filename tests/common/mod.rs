use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, ensure, Result};
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use doctrail::auth::jwt::JwtService;
use doctrail::auth::password::hash_password;
use doctrail::config::{AppConfig, StoreBackend};
use doctrail::db;
use doctrail::email::EmailSender;
use doctrail::models::{NewDepartment, NewUser, User, UserRole};
use doctrail::routes;
use doctrail::state::AppState;
use doctrail::storage::MemoryFileStore;
use doctrail::store::MemStore;
use doctrail::{default_handlers, Worker};
use http_body_util::BodyExt;
use serde::Serialize;
use tokio::sync::Mutex;
use tower::util::ServiceExt;
use uuid::Uuid;

#[allow(dead_code)]
#[derive(Debug, Clone)]
pub struct SentEmail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Email sender that records instead of delivering, so tests can assert on
/// what would have gone out.
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<SentEmail>>,
}

impl RecordingMailer {
    #[allow(dead_code)]
    pub async fn sent(&self) -> Vec<SentEmail> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl EmailSender for RecordingMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> bool {
        self.sent.lock().await.push(SentEmail {
            to: to.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
        });
        true
    }
}

pub struct TestApp {
    pub state: AppState,
    router: Router,
    storage: Arc<MemoryFileStore>,
    mailer: Arc<RecordingMailer>,
}

impl TestApp {
    pub fn new() -> Self {
        let config = AppConfig {
            store_backend: StoreBackend::Memory,
            database_url: None,
            database_max_pool_size: db::DEFAULT_MAX_POOL_SIZE,
            server_host: "127.0.0.1".to_string(),
            server_port: 0,
            jwt_secret: "test-secret".to_string(),
            jwt_issuer: "test-issuer".to_string(),
            jwt_audience: "test-audience".to_string(),
            jwt_expiry_minutes: 60,
            refresh_token_audience: "test-refresh".to_string(),
            refresh_token_expiry_days: 30,
            cors_allowed_origin: None,
            aws_endpoint_url: None,
            aws_access_key_id: None,
            aws_secret_access_key: None,
            aws_region: "us-east-1".to_string(),
            s3_bucket: None,
            s3_force_path_style: true,
            email_gateway_url: None,
            email_gateway_token: None,
            app_name: "doctrail-tests".to_string(),
        };

        let store = Arc::new(MemStore::new());
        let storage = Arc::new(MemoryFileStore::new());
        let mailer = Arc::new(RecordingMailer::default());
        let jwt = JwtService::from_config(&config);
        let state = AppState::new(store, storage.clone(), mailer.clone(), config, jwt);
        let router = routes::create_router(state.clone());

        Self {
            state,
            router,
            storage,
            mailer,
        }
    }

    #[allow(dead_code)]
    pub fn storage(&self) -> Arc<MemoryFileStore> {
        self.storage.clone()
    }

    #[allow(dead_code)]
    pub fn mailer(&self) -> Arc<RecordingMailer> {
        self.mailer.clone()
    }

    pub async fn insert_department(&self, name: &str, code: &str) -> Result<Uuid> {
        let department = self
            .state
            .store
            .insert_department(NewDepartment {
                name: name.to_string(),
                code: code.to_string(),
            })
            .await?;
        Ok(department.id)
    }

    pub async fn insert_user(
        &self,
        email: &str,
        full_name: &str,
        password: &str,
        role: UserRole,
        department_id: Uuid,
    ) -> Result<User> {
        let user = self
            .state
            .store
            .insert_user(NewUser {
                email: email.to_string(),
                full_name: full_name.to_string(),
                password_hash: hash_password(password)?,
                role,
                department_id,
                active: true,
            })
            .await?;
        Ok(user)
    }

    /// A directory row that can no longer act; useful for checking fan-out
    /// and login exclusions.
    #[allow(dead_code)]
    pub async fn insert_inactive_user(
        &self,
        email: &str,
        full_name: &str,
        department_id: Uuid,
    ) -> Result<User> {
        let user = self
            .state
            .store
            .insert_user(NewUser {
                email: email.to_string(),
                full_name: full_name.to_string(),
                password_hash: hash_password("irrelevant")?,
                role: UserRole::Employee,
                department_id,
                active: false,
            })
            .await?;
        Ok(user)
    }

    /// Mints an access token directly, bypassing the login endpoint.
    #[allow(dead_code)]
    pub fn token_for(&self, user: &User) -> Result<String> {
        self.state.jwt.generate_access_token(user)
    }

    pub async fn login_token(&self, email: &str, password: &str) -> Result<String> {
        #[derive(Serialize)]
        struct LoginPayload<'a> {
            email: &'a str,
            password: &'a str,
        }

        let response = self
            .post_json("/api/auth/login", &LoginPayload { email, password }, None)
            .await?;

        ensure!(
            response.status() == StatusCode::OK,
            "login failed with status {}",
            response.status()
        );

        let body = body_to_vec(response.into_body()).await?;
        #[derive(serde::Deserialize)]
        struct LoginResponse {
            access_token: String,
        }
        let parsed: LoginResponse = serde_json::from_slice(&body)?;
        Ok(parsed.access_token)
    }

    /// Runs the dispatch worker until the outbox is empty; returns how many
    /// jobs were executed.
    #[allow(dead_code)]
    pub async fn drain_outbox(&self) -> Result<usize> {
        let worker = Worker::new(
            Arc::new(self.state.clone()),
            default_handlers(),
            Duration::from_millis(5),
        );
        let mut processed = 0;
        while worker.process_next().await? {
            processed += 1;
        }
        Ok(processed)
    }

    pub async fn post_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        payload: &T,
        token: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        let body = serde_json::to_vec(payload)?;
        let mut builder = Request::builder()
            .method(Method::POST)
            .uri(path)
            .header("content-type", "application/json");
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let request = builder.body(Body::from(body))?;
        Ok(self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible response"))
    }

    #[allow(dead_code)]
    pub async fn patch_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        payload: &T,
        token: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        let body = serde_json::to_vec(payload)?;
        let mut builder = Request::builder()
            .method(Method::PATCH)
            .uri(path)
            .header("content-type", "application/json");
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let request = builder.body(Body::from(body))?;
        Ok(self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible response"))
    }

    pub async fn get(&self, path: &str, token: Option<&str>) -> Result<hyper::Response<Body>> {
        let mut builder = Request::builder().method(Method::GET).uri(path);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let request = builder.body(Body::empty())?;
        Ok(self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible response"))
    }

    #[allow(dead_code)]
    pub async fn delete(&self, path: &str, token: Option<&str>) -> Result<hyper::Response<Body>> {
        let builder = Request::builder().method(Method::DELETE).uri(path);
        let builder = if let Some(token) = token {
            builder.header("authorization", format!("Bearer {token}"))
        } else {
            builder
        };
        let request = builder.body(Body::empty())?;
        Ok(self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible response"))
    }

    #[allow(dead_code)]
    pub async fn upload_file(
        &self,
        path: &str,
        filename: &str,
        content_type: &str,
        data: &[u8],
        token: &str,
    ) -> Result<hyper::Response<Body>> {
        let boundary = format!("boundary-{}", Uuid::new_v4());
        let mut body = Vec::new();
        body.extend(format!("--{boundary}\r\n").as_bytes());
        body.extend(
            format!(
                "Content-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\n",
                filename
            )
            .as_bytes(),
        );
        body.extend(format!("Content-Type: {}\r\n\r\n", content_type).as_bytes());
        body.extend(data);
        body.extend(b"\r\n");
        body.extend(format!("--{boundary}--\r\n").as_bytes());

        let builder = Request::builder()
            .method(Method::POST)
            .uri(path)
            .header(
                "content-type",
                format!("multipart/form-data; boundary={boundary}"),
            )
            .header("authorization", format!("Bearer {token}"));

        let request = builder.body(Body::from(body))?;
        Ok(self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible response"))
    }
}

pub async fn body_to_vec(body: Body) -> Result<Vec<u8>> {
    let collected = body
        .collect()
        .await
        .map_err(|err| anyhow!("failed to read response body: {err}"))?;
    Ok(collected.to_bytes().to_vec())
}

use axum::{
	Json, Router,
	body::{Body, Bytes},
	extract::{DefaultBodyLimit, FromRequestParts, Path, Request, State, rejection::JsonRejection},
	http::{HeaderMap, HeaderValue, StatusCode, header, request::Parts},
	middleware::{self, Next},
	response::{IntoResponse, Response},
	routing::{get, post},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use grimoire_domain::access::Identity;
use grimoire_service::{
	Error as ServiceError, FavoriteSetRequest, FavoriteState, FavoriteToggleRequest, FilterOptions,
	IdentityUpdateRequest, IdentityUpdateResponse, ListResponse, ProvisionUserRequest,
	RebuildReport, SearchRequest, SearchResponse, TagUpdateRequest, TagUpdateResponse,
	UploadResponse, UserView,
};

use crate::state::AppState;

/// Caller id asserted by the authentication layer in front of this service.
pub const HEADER_USER_ID: &str = "x-grimoire-user";
/// Original client filename for raw-body uploads.
pub const HEADER_FILENAME: &str = "x-grimoire-filename";

pub fn router(state: AppState) -> Router {
	let upload_limit = usize::try_from(state.service.cfg.storage.files.max_upload_bytes)
		.unwrap_or(usize::MAX);
	let protected = Router::new()
		.route("/v1/search", post(search))
		.route("/v1/files", post(upload).layer(DefaultBodyLimit::max(upload_limit)))
		.route("/v1/files/{name}", get(open_file).delete(delete_file))
		.route("/v1/files/{name}/tags", post(update_tags))
		.route("/v1/files/{name}/identity", post(update_identity))
		.route("/v1/favorites", get(list_favorites).put(set_favorite))
		.route("/v1/favorites/toggle", post(toggle_favorite))
		.route("/v1/recent", get(list_recent))
		.route("/v1/filters", get(filter_options))
		.layer(middleware::from_fn_with_state(state.clone(), api_auth_middleware));

	Router::new().route("/health", get(health)).merge(protected).with_state(state)
}

pub fn admin_router(state: AppState) -> Router {
	Router::new()
		.route("/v1/admin/reconcile", post(reconcile))
		.route("/v1/admin/users", get(list_users).post(provision_user))
		.route("/v1/admin/users/{id}/department", post(set_user_department))
		.route("/v1/admin/users/{id}/admin", post(set_user_admin))
		.layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
		.with_state(state)
}

/// Resolved caller of a public route.
pub struct Caller(pub Identity);
impl FromRequestParts<AppState> for Caller {
	type Rejection = ApiError;

	async fn from_request_parts(
		parts: &mut Parts,
		state: &AppState,
	) -> Result<Self, Self::Rejection> {
		let user_id = read_user_id(&parts.headers)?;
		let identity = state.service.resolve_identity(user_id).await?;

		Ok(Self(identity))
	}
}

#[derive(Debug, Deserialize)]
struct DepartmentChange {
	department: String,
}

#[derive(Debug, Deserialize)]
struct AdminChange {
	is_admin: bool,
}

#[derive(Debug, Serialize)]
struct UserList {
	users: Vec<UserView>,
}

async fn health() -> StatusCode {
	StatusCode::OK
}

async fn search(
	State(state): State<AppState>,
	Caller(identity): Caller,
	payload: Result<Json<SearchRequest>, JsonRejection>,
) -> Result<Json<SearchResponse>, ApiError> {
	let Json(payload) = payload?;
	let response = state.service.search(payload, &identity).await?;

	Ok(Json(response))
}

async fn upload(
	State(state): State<AppState>,
	Caller(identity): Caller,
	headers: HeaderMap,
	body: Bytes,
) -> Result<(StatusCode, Json<UploadResponse>), ApiError> {
	let Some(filename) = headers.get(HEADER_FILENAME).and_then(|value| value.to_str().ok()) else {
		return Err(json_error(
			StatusCode::BAD_REQUEST,
			"INVALID_REQUEST",
			format!("{HEADER_FILENAME} header is required."),
			false,
		));
	};
	let response = state.service.upload(filename, &body, &identity).await?;

	Ok((StatusCode::CREATED, Json(response)))
}

async fn open_file(
	State(state): State<AppState>,
	Caller(identity): Caller,
	Path(name): Path<String>,
) -> Result<Response, ApiError> {
	let bytes = state.service.open_file(&name, &identity).await?;
	let disposition = HeaderValue::from_str(&format!("inline; filename=\"{name}\""))
		.unwrap_or_else(|_| HeaderValue::from_static("inline"));

	Ok((
		[
			(header::CONTENT_TYPE, HeaderValue::from_static("application/octet-stream")),
			(header::CONTENT_DISPOSITION, disposition),
		],
		Body::from(bytes),
	)
		.into_response())
}

async fn delete_file(
	State(state): State<AppState>,
	Caller(identity): Caller,
	Path(name): Path<String>,
) -> Result<StatusCode, ApiError> {
	state.service.delete_file(&name, &identity).await?;

	Ok(StatusCode::NO_CONTENT)
}

async fn update_tags(
	State(state): State<AppState>,
	Caller(identity): Caller,
	Path(name): Path<String>,
	payload: Result<Json<TagUpdateRequest>, JsonRejection>,
) -> Result<Json<TagUpdateResponse>, ApiError> {
	let Json(payload) = payload?;
	let response = state.service.update_tags(&name, payload, &identity).await?;

	Ok(Json(response))
}

async fn update_identity(
	State(state): State<AppState>,
	Caller(identity): Caller,
	Path(name): Path<String>,
	payload: Result<Json<IdentityUpdateRequest>, JsonRejection>,
) -> Result<Json<IdentityUpdateResponse>, ApiError> {
	let Json(payload) = payload?;
	let response = state.service.update_identity(&name, payload, &identity).await?;

	Ok(Json(response))
}

async fn toggle_favorite(
	State(state): State<AppState>,
	Caller(identity): Caller,
	payload: Result<Json<FavoriteToggleRequest>, JsonRejection>,
) -> Result<Json<FavoriteState>, ApiError> {
	let Json(payload) = payload?;
	let response = state.service.toggle_favorite(payload, &identity).await?;

	Ok(Json(response))
}

async fn set_favorite(
	State(state): State<AppState>,
	Caller(identity): Caller,
	payload: Result<Json<FavoriteSetRequest>, JsonRejection>,
) -> Result<Json<FavoriteState>, ApiError> {
	let Json(payload) = payload?;
	let response = state.service.set_favorite(payload, &identity).await?;

	Ok(Json(response))
}

async fn list_favorites(
	State(state): State<AppState>,
	Caller(identity): Caller,
) -> Result<Json<ListResponse>, ApiError> {
	let response = state.service.list_favorites(&identity).await?;

	Ok(Json(response))
}

async fn list_recent(
	State(state): State<AppState>,
	Caller(identity): Caller,
) -> Result<Json<ListResponse>, ApiError> {
	let response = state.service.list_recent(&identity).await?;

	Ok(Json(response))
}

async fn filter_options(
	State(state): State<AppState>,
	Caller(identity): Caller,
) -> Result<Json<FilterOptions>, ApiError> {
	let response = state.service.filter_options(&identity).await?;

	Ok(Json(response))
}

async fn reconcile(State(state): State<AppState>) -> Result<Json<RebuildReport>, ApiError> {
	let response = state.service.reconcile_all().await?;

	Ok(Json(response))
}

async fn provision_user(
	State(state): State<AppState>,
	payload: Result<Json<ProvisionUserRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<UserView>), ApiError> {
	let Json(payload) = payload?;
	let response = state.service.provision_user(payload).await?;

	Ok((StatusCode::CREATED, Json(response)))
}

async fn list_users(State(state): State<AppState>) -> Result<Json<UserList>, ApiError> {
	let users = state.service.list_users().await?;

	Ok(Json(UserList { users }))
}

async fn set_user_department(
	State(state): State<AppState>,
	Path(user_id): Path<Uuid>,
	payload: Result<Json<DepartmentChange>, JsonRejection>,
) -> Result<Json<UserView>, ApiError> {
	let Json(payload) = payload?;
	let response = state.service.set_user_department(user_id, &payload.department).await?;

	Ok(Json(response))
}

async fn set_user_admin(
	State(state): State<AppState>,
	Path(user_id): Path<Uuid>,
	payload: Result<Json<AdminChange>, JsonRejection>,
) -> Result<Json<UserView>, ApiError> {
	let Json(payload) = payload?;
	let response = state.service.set_user_admin(user_id, payload.is_admin).await?;

	Ok(Json(response))
}

async fn api_auth_middleware(State(state): State<AppState>, req: Request, next: Next) -> Response {
	if !is_authorized(req.headers(), state.api_token()) {
		return unauthorized().into_response();
	}

	next.run(req).await
}

async fn admin_auth_middleware(
	State(state): State<AppState>,
	req: Request,
	next: Next,
) -> Response {
	if !is_authorized(req.headers(), state.admin_token()) {
		return unauthorized().into_response();
	}

	next.run(req).await
}

fn is_authorized(headers: &HeaderMap, expected: Option<&str>) -> bool {
	match expected {
		None => true,
		Some(expected) => read_bearer_token(headers).is_some_and(|token| token == expected),
	}
}

fn read_bearer_token(headers: &HeaderMap) -> Option<&str> {
	let raw = headers.get(header::AUTHORIZATION)?;
	let value = raw.to_str().ok()?.trim();
	let token = value.strip_prefix("Bearer ")?.trim();

	if token.is_empty() { None } else { Some(token) }
}

fn read_user_id(headers: &HeaderMap) -> Result<Uuid, ApiError> {
	let raw = headers
		.get(HEADER_USER_ID)
		.and_then(|value| value.to_str().ok())
		.map(str::trim)
		.filter(|value| !value.is_empty())
		.ok_or_else(|| {
			json_error(
				StatusCode::UNAUTHORIZED,
				"MISSING_IDENTITY",
				format!("{HEADER_USER_ID} header is required."),
				false,
			)
		})?;

	Uuid::parse_str(raw).map_err(|_| {
		json_error(
			StatusCode::UNAUTHORIZED,
			"MISSING_IDENTITY",
			format!("{HEADER_USER_ID} must be a user id."),
			false,
		)
	})
}

fn unauthorized() -> ApiError {
	json_error(
		StatusCode::UNAUTHORIZED,
		"UNAUTHORIZED",
		"A valid Bearer token is required.",
		false,
	)
}

#[derive(Debug, Serialize)]
struct ErrorBody {
	error_code: String,
	message: String,
	retryable: bool,
}

#[derive(Debug)]
pub struct ApiError {
	status: StatusCode,
	error_code: String,
	message: String,
	retryable: bool,
}
impl ApiError {
	fn new(
		status: StatusCode,
		error_code: impl Into<String>,
		message: impl Into<String>,
		retryable: bool,
	) -> Self {
		Self { status, error_code: error_code.into(), message: message.into(), retryable }
	}

	pub fn status(&self) -> StatusCode {
		self.status
	}
}
impl From<ServiceError> for ApiError {
	fn from(err: ServiceError) -> Self {
		let retryable = err.is_retryable();

		match err {
			ServiceError::InvalidRequest { message } =>
				json_error(StatusCode::BAD_REQUEST, "INVALID_REQUEST", message, retryable),
			ServiceError::Forbidden { message } =>
				json_error(StatusCode::FORBIDDEN, "FORBIDDEN", message, retryable),
			ServiceError::NotFound { message } =>
				json_error(StatusCode::NOT_FOUND, "NOT_FOUND", message, retryable),
			ServiceError::EmbeddingFailure { message } =>
				json_error(StatusCode::SERVICE_UNAVAILABLE, "EMBEDDING_FAILURE", message, retryable),
			ServiceError::IndexUnavailable { message } =>
				json_error(StatusCode::SERVICE_UNAVAILABLE, "INDEX_UNAVAILABLE", message, retryable),
			ServiceError::MetadataWrite { message } => {
				tracing::error!(error = %message, "Metadata write failed.");

				json_error(
					StatusCode::INTERNAL_SERVER_ERROR,
					"METADATA_WRITE_FAILED",
					message,
					retryable,
				)
			},
			ServiceError::Storage { message } => {
				tracing::error!(error = %message, "Storage operation failed.");

				json_error(
					StatusCode::INTERNAL_SERVER_ERROR,
					"INTERNAL",
					"Storage operation failed.",
					retryable,
				)
			},
		}
	}
}
impl From<JsonRejection> for ApiError {
	fn from(rejection: JsonRejection) -> Self {
		json_error(StatusCode::BAD_REQUEST, "INVALID_REQUEST", rejection.body_text(), false)
	}
}
impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		let body =
			ErrorBody { error_code: self.error_code, message: self.message, retryable: self.retryable };

		(self.status, Json(body)).into_response()
	}
}

pub fn json_error(
	status: StatusCode,
	code: &str,
	message: impl Into<String>,
	retryable: bool,
) -> ApiError {
	ApiError::new(status, code, message, retryable)
}

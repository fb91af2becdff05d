use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header::AUTHORIZATION, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};
use cadet_core::{
    config::AuthConfig,
    models::{Capability, Principal, UserRole},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{error::ApiError, routes::AppState};

pub const BEARER_PREFIX: &str = "Bearer ";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: i64,
    pub iat: i64,
    pub role: UserRole,
    #[serde(default)]
    pub cadet_id: Option<Uuid>,
    #[serde(default)]
    pub permissions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("缺少认证令牌")]
    MissingToken,
    #[error("认证令牌无效")]
    InvalidToken,
    #[error("认证令牌已过期")]
    ExpiredToken,
    #[error("Authorization 请求头格式错误")]
    MalformedHeader,
}

pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    expiration_hours: i64,
}

impl JwtService {
    pub fn new(secret: &str, expiration_hours: i64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_ref()),
            decoding_key: DecodingKey::from_secret(secret.as_ref()),
            expiration_hours,
        }
    }

    pub fn from_config(config: &AuthConfig) -> Self {
        Self::new(&config.jwt_secret, config.jwt_expiration_hours)
    }

    pub fn generate_token(
        &self,
        principal: &Principal,
    ) -> Result<String, jsonwebtoken::errors::Error> {
        let now = Utc::now();
        let exp = now + Duration::hours(self.expiration_hours);

        let claims = Claims {
            sub: principal.user_id.to_string(),
            exp: exp.timestamp(),
            iat: now.timestamp(),
            role: principal.role,
            cadet_id: principal.cadet_id,
            permissions: principal
                .permissions
                .iter()
                .map(|p| p.as_str().to_string())
                .collect(),
        };

        encode(&Header::default(), &claims, &self.encoding_key)
    }

    pub fn validate_token(&self, token: &str) -> Result<Claims, AuthError> {
        let validation = Validation::new(Algorithm::HS256);
        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|err| {
                debug!("JWT validation failed: {}", err);
                match err.kind() {
                    jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::ExpiredToken,
                    _ => AuthError::InvalidToken,
                }
            })
    }

    /// 令牌解析为调用主体，未知的权限字符串直接忽略
    pub fn principal_from_token(&self, token: &str) -> Result<Principal, AuthError> {
        let claims = self.validate_token(token)?;
        let user_id = Uuid::parse_str(&claims.sub).map_err(|_| AuthError::InvalidToken)?;

        let permissions = claims
            .permissions
            .iter()
            .filter_map(|p| p.parse::<Capability>().ok())
            .collect();

        Ok(Principal {
            user_id,
            cadet_id: claims.cadet_id,
            role: claims.role,
            permissions,
        })
    }
}

/// 认证中间件
///
/// 启用认证时必须携带有效的 Bearer 令牌；关闭时以配置中的 `dev_principal` 身份执行。
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Response {
    if !state.auth_config.enabled {
        req.extensions_mut()
            .insert(state.auth_config.dev_principal.clone());
        return next.run(req).await;
    }

    match extract_principal(&req, &state.jwt) {
        Ok(principal) => {
            req.extensions_mut().insert(principal);
            next.run(req).await
        }
        Err(err) => {
            warn!("Authentication failed: {} {} - {}", req.method(), req.uri(), err);
            ApiError::from(err).into_response()
        }
    }
}

fn extract_principal(req: &Request, jwt: &JwtService) -> Result<Principal, AuthError> {
    let token = extract_bearer_token(req)?;
    jwt.principal_from_token(&token)
}

fn extract_bearer_token(req: &Request) -> Result<String, AuthError> {
    let header = req
        .headers()
        .get(AUTHORIZATION)
        .ok_or(AuthError::MissingToken)?
        .to_str()
        .map_err(|_| AuthError::MalformedHeader)?;

    header
        .strip_prefix(BEARER_PREFIX)
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
        .ok_or(AuthError::MalformedHeader)
}

/// 处理器中取出当前调用主体
#[derive(Debug, Clone)]
pub struct CurrentPrincipal(pub Principal);

impl<S> FromRequestParts<S> for CurrentPrincipal
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Principal>()
            .cloned()
            .map(CurrentPrincipal)
            .ok_or(ApiError::Authentication(AuthError::MissingToken))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadet_core::models::Category;

    const SECRET: &str = "test-secret-key-with-at-least-32-chars";

    #[test]
    fn test_token_round_trips_principal() {
        let jwt_service = JwtService::new(SECRET, 24);
        let staff = Principal::staff(
            Uuid::new_v4(),
            vec![
                Capability::ManageTasks,
                Capability::ManageScores(Category::Events),
            ],
        );

        let token = jwt_service.generate_token(&staff).unwrap();
        let principal = jwt_service.principal_from_token(&token).unwrap();

        assert_eq!(principal, staff);
    }

    #[test]
    fn test_cadet_token_keeps_cadet_id() {
        let jwt_service = JwtService::new(SECRET, 24);
        let cadet = Principal::cadet(Uuid::new_v4());

        let token = jwt_service.generate_token(&cadet).unwrap();
        let claims = jwt_service.validate_token(&token).unwrap();

        assert_eq!(claims.role, UserRole::Cadet);
        assert_eq!(claims.cadet_id, cadet.cadet_id);
        assert!(claims.permissions.is_empty());
    }

    #[test]
    fn test_expired_and_foreign_tokens_rejected() {
        let expired = JwtService::new(SECRET, -2);
        let token = expired
            .generate_token(&Principal::admin(Uuid::new_v4()))
            .unwrap();
        assert_eq!(
            JwtService::new(SECRET, 24).validate_token(&token).unwrap_err(),
            AuthError::ExpiredToken
        );

        let foreign = JwtService::new("another-secret-key-with-32-characters", 24)
            .generate_token(&Principal::admin(Uuid::new_v4()))
            .unwrap();
        assert_eq!(
            JwtService::new(SECRET, 24)
                .validate_token(&foreign)
                .unwrap_err(),
            AuthError::InvalidToken
        );
    }

    #[test]
    fn test_bearer_header_parsing() {
        let req = axum::http::Request::builder()
            .header(AUTHORIZATION, "Bearer abc.def")
            .body(axum::body::Body::empty())
            .unwrap();
        assert_eq!(extract_bearer_token(&req).unwrap(), "abc.def");

        let req = axum::http::Request::builder()
            .header(AUTHORIZATION, "Basic abc")
            .body(axum::body::Body::empty())
            .unwrap();
        assert_eq!(
            extract_bearer_token(&req).unwrap_err(),
            AuthError::MalformedHeader
        );

        let req = axum::http::Request::builder()
            .body(axum::body::Body::empty())
            .unwrap();
        assert_eq!(
            extract_bearer_token(&req).unwrap_err(),
            AuthError::MissingToken
        );
    }
}

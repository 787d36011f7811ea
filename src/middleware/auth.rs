// src/middleware/auth.rs

use axum::{
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::Response,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};

use crate::{
    common::error::AppError,
    config::AppState,
    middleware::policy::{Capability, Policy},
    models::auth::User,
};

// Resolves the bearer token (if any) into the request's actor.
// No header means an anonymous request; a bad token is refused right here.
pub async fn resolve_actor(
    State(app_state): State<AppState>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    if let Some(TypedHeader(Authorization(bearer))) = bearer {
        let user = app_state.auth_service.current_actor(bearer.token()).await?;
        request.extensions_mut().insert(user);
    }

    Ok(next.run(request).await)
}

// Extractor for handlers that need a logged-in user
pub struct AuthenticatedUser(pub User);

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user = parts
            .extensions
            .get::<User>()
            .cloned()
            .ok_or(AppError::Unauthenticated)?;

        Policy::check(&user, &Capability::Authenticated)?;

        Ok(AuthenticatedUser(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn parts_with(actor: Option<User>) -> Parts {
        let (mut parts, _) = axum::http::Request::new(()).into_parts();
        if let Some(user) = actor {
            parts.extensions.insert(user);
        }
        parts
    }

    fn member(is_active: bool) -> User {
        let now = Utc::now();
        User {
            id: Uuid::new_v4(),
            email: "member@example.com".into(),
            password_hash: String::new(),
            first_name: String::new(),
            last_name: String::new(),
            is_active,
            is_staff: false,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn anonymous_requests_are_unauthenticated() {
        let mut parts = parts_with(None);
        let result = AuthenticatedUser::from_request_parts(&mut parts, &()).await;
        assert!(matches!(result, Err(AppError::Unauthenticated)));
    }

    #[tokio::test]
    async fn resolved_actor_is_handed_to_the_handler() {
        let user = member(true);
        let mut parts = parts_with(Some(user.clone()));

        let AuthenticatedUser(actor) = AuthenticatedUser::from_request_parts(&mut parts, &())
            .await
            .ok()
            .unwrap();
        assert_eq!(actor.id, user.id);
    }

    #[tokio::test]
    async fn inactive_accounts_are_forbidden() {
        let mut parts = parts_with(Some(member(false)));
        let result = AuthenticatedUser::from_request_parts(&mut parts, &()).await;
        assert!(matches!(result, Err(AppError::Forbidden(_))));
    }
}

//! Auth state transitions.
//!
//! Every change in a visitor's auth state goes through here so the session,
//! the user data cache, the cart mirror, and the Sentry scope agree on who
//! is signed in.

use chrono::Utc;
use tower_sessions::Session;
use tracing::instrument;

use naxstore_core::{User, UserId, UserRole};

use crate::backend::conversions::{name_from_email, user_from_profile};
use crate::backend::rows::{NewProfile, PROFILE_SELECT, ProfileRow};
use crate::backend::{AuthUser, BackendClient, BackendError, Query};
use crate::error::{Result, clear_sentry_user, set_sentry_user};
use crate::models::session::{load_or_default, store_optional};
use crate::models::{AuthTokens, CartState, session_keys};
use crate::services::{Caller, cart};
use crate::state::AppState;

/// Auth state change being applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthEvent {
    /// An existing session restored on page load.
    InitialSession,
    /// Credentials were just accepted.
    SignedIn,
    /// The access token was replaced.
    TokenRefreshed,
    /// The session ended.
    SignedOut,
}

/// Outcome of a transition.
#[derive(Debug, Clone)]
pub struct Transition {
    pub user: Option<User>,
    pub message: Option<String>,
}

/// Load the user's profile, creating it if the user has none yet.
///
/// # Errors
///
/// Returns `BackendError` if the profile cannot be read or created.
#[instrument(skip(backend, caller, identity), fields(user_id = %caller.user_id))]
pub async fn load_profile(
    backend: &BackendClient,
    caller: Caller<'_>,
    identity: &AuthUser,
) -> std::result::Result<User, BackendError> {
    let email = identity.email.clone().unwrap_or_default();
    let query = Query::table("profiles")
        .select(PROFILE_SELECT)
        .eq("id", caller.user_id);

    if let Some(profile) = backend
        .select_one::<ProfileRow>(&query, caller.bearer())
        .await?
    {
        return Ok(user_from_profile(profile, &email));
    }

    tracing::info!("No profile found; creating one");
    let fallback_name = name_from_email(&email);
    let full_name = identity.metadata_full_name().unwrap_or(&fallback_name);
    backend
        .insert(
            &Query::table("profiles"),
            &NewProfile {
                id: caller.user_id,
                full_name,
                avatar_url: identity.metadata_avatar_url(),
                role: UserRole::User,
            },
            caller.bearer(),
        )
        .await?;

    backend
        .select_one::<ProfileRow>(&query, caller.bearer())
        .await?
        .map(|profile| user_from_profile(profile, &email))
        .ok_or_else(|| BackendError::NotFound(format!("profile {}", caller.user_id)))
}

/// Apply `SignedIn` or `InitialSession` for `identity` holding `tokens`.
///
/// Stores the tokens and user, refreshes cached user data, and merges the
/// guest cart. A profile that cannot be loaded signs the visitor out.
///
/// # Errors
///
/// Returns `AppError::Session` if the session store fails and the profile
/// error if the profile cannot be loaded.
#[instrument(skip_all, fields(user_id = %identity.id, ?event))]
pub async fn signed_in(
    state: &AppState,
    session: &Session,
    event: AuthEvent,
    tokens: AuthTokens,
    identity: &AuthUser,
) -> Result<Transition> {
    let caller = Caller::new(identity.id, &tokens.access_token);

    let user = match load_profile(state.backend(), caller, identity).await {
        Ok(user) => user,
        Err(e) => {
            tracing::error!(error = %e, "Profile load failed; signing out");
            if let Err(e) = state.auth().sign_out(&tokens.access_token).await {
                tracing::warn!(error = %e, "Sign-out after profile failure failed");
            }
            signed_out(state, session, Some(identity.id), false).await?;
            return Err(e.into());
        }
    };

    session.insert(session_keys::AUTH, &tokens).await?;
    session.insert(session_keys::CURRENT_USER, &user).await?;
    set_sentry_user(&user.id, Some(&user.email));

    state.user_data().refresh(caller).await;

    let catalog = state.catalog().ensure_loaded().await;
    let mut cart_state: CartState = load_or_default(session, session_keys::CART).await?;
    match cart::merge_and_load(state.backend(), caller, &catalog, &mut cart_state).await {
        Ok(()) => session.insert(session_keys::CART, &cart_state).await?,
        Err(e) => tracing::error!(error = %e, "Cart merge failed; keeping guest cart"),
    }

    let message = (event == AuthEvent::SignedIn).then(|| format!("Welcome back, {}!", user.name));
    Ok(Transition {
        user: Some(user),
        message,
    })
}

/// Apply `TokenRefreshed`: only the stored tokens change.
///
/// # Errors
///
/// Returns an error if the session store fails.
pub async fn token_refreshed(session: &Session, tokens: &AuthTokens) -> Result<()> {
    session.insert(session_keys::AUTH, tokens).await?;
    Ok(())
}

/// Apply `SignedOut`.
///
/// Clears the stored user and tokens, evicts cached user data (wishlist and
/// notifications with it), resets the cart mirror, and clears the Sentry
/// user. `explicit` marks a sign-out the visitor asked for.
///
/// # Errors
///
/// Returns an error if the session store fails.
#[instrument(skip(state, session))]
pub async fn signed_out(
    state: &AppState,
    session: &Session,
    user_id: Option<UserId>,
    explicit: bool,
) -> Result<Transition> {
    store_optional::<AuthTokens>(session, session_keys::AUTH, None).await?;
    store_optional::<User>(session, session_keys::CURRENT_USER, None).await?;

    if let Some(user_id) = user_id {
        state.user_data().evict(user_id).await;
    }

    let mut cart_state: CartState = load_or_default(session, session_keys::CART).await?;
    cart::reset_on_logout(&mut cart_state);
    session.insert(session_keys::CART, &cart_state).await?;

    clear_sentry_user();

    Ok(Transition {
        user: None,
        message: explicit.then(|| "Logged out.".to_string()),
    })
}

async fn stored_user_id(session: &Session) -> Result<Option<UserId>> {
    Ok(session
        .get::<User>(session_keys::CURRENT_USER)
        .await?
        .map(|u| u.id))
}

/// Apply `InitialSession`: restore whoever the session says is signed in.
///
/// Tokens near expiry are refreshed first. Invalid tokens sign the visitor
/// out.
///
/// # Errors
///
/// Returns an error if the session store fails.
#[instrument(skip_all)]
pub async fn restore(state: &AppState, session: &Session) -> Result<Transition> {
    let Some(mut tokens) = session.get::<AuthTokens>(session_keys::AUTH).await? else {
        let user_id = stored_user_id(session).await?;
        return signed_out(state, session, user_id, false).await;
    };

    let threshold = chrono::Duration::from_std(state.config().timers.token_refresh_threshold)
        .unwrap_or_else(|_| chrono::Duration::minutes(5));
    let now = Utc::now();
    if tokens.needs_refresh(now, threshold) {
        match state.auth().refresh_session(&tokens.refresh_token).await {
            Ok(fresh) => {
                tokens = AuthTokens::from_session(&fresh, now);
                token_refreshed(session, &tokens).await?;
            }
            Err(e) => {
                tracing::info!(error = %e, "Stored session could not be refreshed");
                let user_id = stored_user_id(session).await?;
                return signed_out(state, session, user_id, false).await;
            }
        }
    }

    let identity = match state.auth().get_user(&tokens.access_token).await {
        Ok(identity) => identity,
        Err(e) => {
            tracing::info!(error = %e, "Stored session is no longer valid");
            let user_id = stored_user_id(session).await?;
            return signed_out(state, session, user_id, false).await;
        }
    };

    signed_in(state, session, AuthEvent::InitialSession, tokens, &identity).await
}

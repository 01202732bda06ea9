//! Profile, saved addresses, and the seller upgrade.
//!
//! Functions that change the signed-in [`User`] update it in place once the
//! backend accepts the change; the caller writes it back to the session.

use serde::{Deserialize, Serialize};
use tracing::instrument;

use naxstore_core::{AddressId, ShippingAddress, User, UserRole};

use crate::backend::rows::NewAddress;
use crate::backend::{BackendClient, Query};
use crate::error::{AppError, BackendResultExt, Result};
use crate::services::Caller;
use crate::services::user_data::fetch_addresses;

#[derive(Serialize)]
struct NameUpdate<'a> {
    full_name: &'a str,
}

#[derive(Serialize)]
struct DefaultFlag {
    is_default: bool,
}

#[derive(Serialize)]
struct RoleUpdate {
    role: UserRole,
}

#[derive(Serialize)]
struct StoreNameUpdate<'a> {
    business_name: &'a str,
}

#[derive(Deserialize)]
struct NameRow {
    #[serde(default)]
    full_name: Option<String>,
}

/// Rename the user.
///
/// # Errors
///
/// Returns `AppError::BadRequest` for a blank name and `AppError::Backend`
/// if the update fails.
#[instrument(skip(backend, caller, user), fields(user_id = %user.id))]
pub async fn update_profile(
    backend: &BackendClient,
    caller: Caller<'_>,
    user: &mut User,
    name: &str,
) -> Result<&'static str> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::BadRequest("Name is required.".to_string()));
    }

    let rows: Vec<NameRow> = backend
        .update_returning(
            &Query::table("profiles").eq("id", user.id).select("full_name"),
            &NameUpdate { full_name: name },
            caller.bearer(),
        )
        .await
        .or_message("Failed to update profile.")?;

    user.name = rows
        .into_iter()
        .next()
        .and_then(|r| r.full_name)
        .unwrap_or_else(|| name.to_string());
    Ok("Profile updated successfully!")
}

/// Save a new address and return the user's refreshed address list.
///
/// # Errors
///
/// Returns `AppError::BadRequest` listing blank fields and
/// `AppError::Backend` if the insert fails.
#[instrument(skip(backend, caller, address), fields(user_id = %caller.user_id))]
pub async fn add_address(
    backend: &BackendClient,
    caller: Caller<'_>,
    address: &ShippingAddress,
) -> Result<Vec<ShippingAddress>> {
    let missing = address.missing_fields();
    if !missing.is_empty() {
        return Err(AppError::BadRequest(format!(
            "Please fill in all required fields: {}",
            missing.join(", ")
        )));
    }

    backend
        .insert(
            &Query::table("addresses"),
            &NewAddress {
                user_id: caller.user_id,
                full_name: address.full_name.trim(),
                address_line_1: address.address_line1.trim(),
                city: address.city.trim(),
                state: address.state.trim(),
                zip_code: address.zip_code.trim(),
                country: address.country.trim(),
                is_default: false,
            },
            caller.bearer(),
        )
        .await
        .or_message("Failed to add address.")?;

    reload(backend, caller).await
}

/// Delete one of the user's addresses and return the refreshed list.
///
/// # Errors
///
/// Returns `AppError::Backend` if the delete fails.
#[instrument(skip(backend, caller), fields(user_id = %caller.user_id))]
pub async fn remove_address(
    backend: &BackendClient,
    caller: Caller<'_>,
    address_id: AddressId,
) -> Result<Vec<ShippingAddress>> {
    backend
        .delete(
            &Query::table("addresses")
                .eq("id", address_id)
                .eq("user_id", caller.user_id),
            caller.bearer(),
        )
        .await
        .or_message("Failed to remove address.")?;

    reload(backend, caller).await
}

/// Make `address_id` the only default address.
///
/// # Errors
///
/// Returns `AppError::Backend` if either update fails. If only the second
/// one fails, the user is left without a default.
#[instrument(skip(backend, caller), fields(user_id = %caller.user_id))]
pub async fn set_default_address(
    backend: &BackendClient,
    caller: Caller<'_>,
    address_id: AddressId,
) -> Result<Vec<ShippingAddress>> {
    backend
        .update(
            &Query::table("addresses").eq("user_id", caller.user_id),
            &DefaultFlag { is_default: false },
            caller.bearer(),
        )
        .await
        .or_message("Failed to update default address.")?;

    backend
        .update(
            &Query::table("addresses")
                .eq("id", address_id)
                .eq("user_id", caller.user_id),
            &DefaultFlag { is_default: true },
            caller.bearer(),
        )
        .await
        .or_message("Failed to set new default address.")?;

    reload(backend, caller).await
}

async fn reload(backend: &BackendClient, caller: Caller<'_>) -> Result<Vec<ShippingAddress>> {
    fetch_addresses(backend, caller)
        .await
        .or_message("Failed to load addresses.")
}

/// Upgrade a regular user to seller. The backend creates the seller row.
///
/// # Errors
///
/// Returns `AppError::Forbidden` unless the user currently has role `user`
/// and `AppError::Backend` if the update fails.
#[instrument(skip(backend, caller, user), fields(user_id = %user.id))]
pub async fn become_seller(
    backend: &BackendClient,
    caller: Caller<'_>,
    user: &mut User,
) -> Result<&'static str> {
    if user.role != UserRole::User {
        return Err(AppError::Forbidden(
            "Only regular accounts can become sellers.".to_string(),
        ));
    }

    backend
        .update(
            &Query::table("profiles").eq("id", user.id),
            &RoleUpdate {
                role: UserRole::Seller,
            },
            caller.bearer(),
        )
        .await
        .or_message("Failed to upgrade account. Please try again.")?;

    user.role = UserRole::Seller;
    tracing::info!("Account upgraded to seller");
    Ok("Congratulations! You are now a seller.")
}

/// Rename the seller's store.
///
/// # Errors
///
/// Returns `AppError::Forbidden` for non-sellers, `AppError::BadRequest` for
/// a blank name, and `AppError::Backend` if the update fails.
#[instrument(skip(backend, caller, user), fields(user_id = %user.id))]
pub async fn update_store_settings(
    backend: &BackendClient,
    caller: Caller<'_>,
    user: &mut User,
    store_name: &str,
) -> Result<&'static str> {
    if !user.is_seller() {
        return Err(AppError::Forbidden(
            "Only sellers have store settings.".to_string(),
        ));
    }
    let store_name = store_name.trim();
    if store_name.is_empty() {
        return Err(AppError::BadRequest("Store name is required.".to_string()));
    }

    backend
        .update(
            &Query::table("sellers").eq("id", user.id),
            &StoreNameUpdate {
                business_name: store_name,
            },
            caller.bearer(),
        )
        .await
        .or_message("Failed to update store name.")?;

    user.store_name = Some(store_name.to_string());
    Ok("Store name updated!")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::services::fixtures::{offline_backend, user};

    #[tokio::test]
    async fn test_become_seller_only_from_user_role() {
        let backend = offline_backend();
        let mut seller = user(UserRole::Seller);
        let err = become_seller(&backend, Caller::new(seller.id, "t"), &mut seller)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let mut admin = user(UserRole::Admin);
        assert!(
            become_seller(&backend, Caller::new(admin.id, "t"), &mut admin)
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_failed_upgrade_keeps_role() {
        let backend = offline_backend();
        let mut shopper = user(UserRole::User);
        let err = become_seller(&backend, Caller::new(shopper.id, "t"), &mut shopper)
            .await
            .unwrap_err();
        assert_eq!(
            err.client_message(),
            "Failed to upgrade account. Please try again."
        );
        assert_eq!(shopper.role, UserRole::User);
    }

    #[tokio::test]
    async fn test_store_settings_require_seller() {
        let backend = offline_backend();
        let mut shopper = user(UserRole::User);
        let err = update_store_settings(&backend, Caller::new(shopper.id, "t"), &mut shopper, "Ana's")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
        assert!(shopper.store_name.is_none());
    }

    #[tokio::test]
    async fn test_add_address_requires_fields() {
        let backend = offline_backend();
        let u = user(UserRole::User);
        let err = add_address(&backend, Caller::new(u.id, "t"), &ShippingAddress::default())
            .await
            .unwrap_err();
        assert!(err.client_message().contains("fullName"));
    }

    #[tokio::test]
    async fn test_blank_name_rejected() {
        let backend = offline_backend();
        let mut u = user(UserRole::User);
        let err = update_profile(&backend, Caller::new(u.id, "t"), &mut u, "  ")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
        assert_eq!(u.name, "Ana");
    }
}

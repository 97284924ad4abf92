use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post, put},
    Json, Router,
};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    auth::extractors::AuthUser,
    contacts::dto::{BirthdayParams, ContactCreate, ContactUpdate, Pagination, SearchParams},
    contacts::repo::Contact,
    error::{AppError, AppResult},
    state::AppState,
};

pub fn contact_routes() -> Router<AppState> {
    Router::new()
        .route("/contacts", get(list_contacts))
        .route("/contacts", post(create_contact))
        .route("/contacts/search", get(search_contacts))
        .route("/contacts/birthdays", get(upcoming_birthdays))
        .route("/contacts/:id", get(get_contact))
        .route("/contacts/:id", put(update_contact))
        .route("/contacts/:id", delete(delete_contact))
}

#[instrument(skip(state, user))]
pub async fn list_contacts(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Query(p): Query<Pagination>,
) -> AppResult<Json<Vec<Contact>>> {
    let limit = p.limit.clamp(1, 100);
    let skip = p.skip.max(0);
    let contacts = Contact::list_by_user(&state.db, user.id, skip, limit).await?;
    Ok(Json(contacts))
}

#[instrument(skip(state, user))]
pub async fn get_contact(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Contact>> {
    let contact = Contact::find_by_id(&state.db, user.id, id)
        .await?
        .ok_or_else(|| AppError::NotFound("Contact not found".into()))?;
    Ok(Json(contact))
}

#[instrument(skip(state, user, payload))]
pub async fn create_contact(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(mut payload): Json<ContactCreate>,
) -> AppResult<(StatusCode, Json<Contact>)> {
    payload.email = payload.email.trim().to_lowercase();
    validate_contact_fields(&payload.name, &payload.surname, &payload.phone, &payload.email)?;

    let contact = Contact::create(&state.db, user.id, &payload).await?;
    info!(user_id = %user.id, contact_id = %contact.id, "contact created");
    Ok((StatusCode::CREATED, Json(contact)))
}

#[instrument(skip(state, user, payload))]
pub async fn update_contact(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<Uuid>,
    Json(mut payload): Json<ContactUpdate>,
) -> AppResult<Json<Contact>> {
    if let Some(email) = payload.email.as_mut() {
        *email = email.trim().to_lowercase();
        if !crate::auth::handlers::is_valid_email(email) {
            return Err(AppError::Validation("Invalid email".into()));
        }
    }
    if payload.name.as_deref().is_some_and(|s| s.trim().is_empty()) {
        return Err(AppError::Validation("Name must not be empty".into()));
    }

    let contact = Contact::update(&state.db, user.id, id, &payload)
        .await?
        .ok_or_else(|| AppError::NotFound("Contact not found".into()))?;
    Ok(Json(contact))
}

#[instrument(skip(state, user))]
pub async fn delete_contact(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Contact>> {
    let contact = Contact::delete(&state.db, user.id, id)
        .await?
        .ok_or_else(|| AppError::NotFound("Contact not found".into()))?;
    info!(user_id = %user.id, contact_id = %contact.id, "contact deleted");
    Ok(Json(contact))
}

#[instrument(skip(state, user))]
pub async fn search_contacts(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Query(p): Query<SearchParams>,
) -> AppResult<Json<Vec<Contact>>> {
    let term = p.q.trim();
    if term.is_empty() {
        return Err(AppError::Validation("Search term must not be empty".into()));
    }
    let contacts = Contact::search(&state.db, user.id, term).await?;
    Ok(Json(contacts))
}

#[instrument(skip(state, user))]
pub async fn upcoming_birthdays(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Query(p): Query<BirthdayParams>,
) -> AppResult<Json<Vec<Contact>>> {
    if !(1..=31).contains(&p.days) {
        return Err(AppError::Validation("days must be between 1 and 31".into()));
    }
    let contacts = Contact::upcoming_birthdays(&state.db, user.id, p.days).await?;
    Ok(Json(contacts))
}

fn validate_contact_fields(name: &str, surname: &str, phone: &str, email: &str) -> AppResult<()> {
    if name.trim().is_empty() || surname.trim().is_empty() {
        return Err(AppError::Validation("Name and surname are required".into()));
    }
    if phone.trim().is_empty() || phone.len() > 20 {
        return Err(AppError::Validation("Invalid phone number".into()));
    }
    if !crate::auth::handlers::is_valid_email(email) {
        return Err(AppError::Validation("Invalid email".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contact_field_validation() {
        assert!(validate_contact_fields("Ada", "Lovelace", "+123456", "ada@example.com").is_ok());
        assert!(validate_contact_fields("", "Lovelace", "+123456", "ada@example.com").is_err());
        assert!(validate_contact_fields("Ada", " ", "+123456", "ada@example.com").is_err());
        assert!(validate_contact_fields("Ada", "Lovelace", "", "ada@example.com").is_err());
        assert!(validate_contact_fields("Ada", "Lovelace", "+123456", "not-an-email").is_err());
        let long_phone = "1".repeat(21);
        assert!(validate_contact_fields("Ada", "Lovelace", &long_phone, "ada@example.com").is_err());
    }
}

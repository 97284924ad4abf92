use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use time::{Date, Duration, OffsetDateTime};
use uuid::Uuid;

use crate::contacts::dto::{ContactCreate, ContactUpdate};
use crate::error::AppResult;

/// Contact record, always owned by exactly one user.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Contact {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub surname: String,
    pub email: String,
    pub phone: String,
    pub birthday: Date,
    pub extra: Option<String>,
    pub created_at: OffsetDateTime,
}

/// Month/day window for an upcoming-birthday query. Spanning at most two
/// calendar months (the `days` parameter is capped at 31), so the
/// December-to-January wrap is just the two-month case.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BirthdayWindow {
    SameMonth {
        month: u8,
        from_day: u8,
        to_day: u8,
    },
    TwoMonths {
        first_month: u8,
        from_day: u8,
        second_month: u8,
        to_day: u8,
    },
}

pub(crate) fn birthday_window(today: Date, days: i64) -> BirthdayWindow {
    let end = today + Duration::days(days);
    if today.month() == end.month() {
        BirthdayWindow::SameMonth {
            month: u8::from(today.month()),
            from_day: today.day(),
            to_day: end.day(),
        }
    } else {
        BirthdayWindow::TwoMonths {
            first_month: u8::from(today.month()),
            from_day: today.day(),
            second_month: u8::from(end.month()),
            to_day: end.day(),
        }
    }
}

impl Contact {
    pub async fn list_by_user(
        db: &PgPool,
        user_id: Uuid,
        skip: i64,
        limit: i64,
    ) -> AppResult<Vec<Contact>> {
        let rows = sqlx::query_as::<_, Contact>(
            r#"
            SELECT id, user_id, name, surname, email, phone, birthday, extra, created_at
            FROM contacts
            WHERE user_id = $1
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .bind(skip)
        .fetch_all(db)
        .await?;
        Ok(rows)
    }

    pub async fn find_by_id(db: &PgPool, user_id: Uuid, id: Uuid) -> AppResult<Option<Contact>> {
        let contact = sqlx::query_as::<_, Contact>(
            r#"
            SELECT id, user_id, name, surname, email, phone, birthday, extra, created_at
            FROM contacts
            WHERE id = $1 AND user_id = $2
            "#,
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(db)
        .await?;
        Ok(contact)
    }

    pub async fn create(db: &PgPool, user_id: Uuid, body: &ContactCreate) -> AppResult<Contact> {
        let contact = sqlx::query_as::<_, Contact>(
            r#"
            INSERT INTO contacts (user_id, name, surname, email, phone, birthday, extra)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id, user_id, name, surname, email, phone, birthday, extra, created_at
            "#,
        )
        .bind(user_id)
        .bind(&body.name)
        .bind(&body.surname)
        .bind(&body.email)
        .bind(&body.phone)
        .bind(body.birthday)
        .bind(&body.extra)
        .fetch_one(db)
        .await?;
        Ok(contact)
    }

    pub async fn update(
        db: &PgPool,
        user_id: Uuid,
        id: Uuid,
        body: &ContactUpdate,
    ) -> AppResult<Option<Contact>> {
        let contact = sqlx::query_as::<_, Contact>(
            r#"
            UPDATE contacts SET
                name = COALESCE($3, name),
                surname = COALESCE($4, surname),
                email = COALESCE($5, email),
                phone = COALESCE($6, phone),
                birthday = COALESCE($7, birthday),
                extra = COALESCE($8, extra)
            WHERE id = $1 AND user_id = $2
            RETURNING id, user_id, name, surname, email, phone, birthday, extra, created_at
            "#,
        )
        .bind(id)
        .bind(user_id)
        .bind(&body.name)
        .bind(&body.surname)
        .bind(&body.email)
        .bind(&body.phone)
        .bind(body.birthday)
        .bind(&body.extra)
        .fetch_optional(db)
        .await?;
        Ok(contact)
    }

    pub async fn delete(db: &PgPool, user_id: Uuid, id: Uuid) -> AppResult<Option<Contact>> {
        let contact = sqlx::query_as::<_, Contact>(
            r#"
            DELETE FROM contacts
            WHERE id = $1 AND user_id = $2
            RETURNING id, user_id, name, surname, email, phone, birthday, extra, created_at
            "#,
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(db)
        .await?;
        Ok(contact)
    }

    /// Case-insensitive substring match over name, surname and email.
    pub async fn search(db: &PgPool, user_id: Uuid, term: &str) -> AppResult<Vec<Contact>> {
        let pattern = format!("%{}%", term);
        let rows = sqlx::query_as::<_, Contact>(
            r#"
            SELECT id, user_id, name, surname, email, phone, birthday, extra, created_at
            FROM contacts
            WHERE user_id = $1
              AND (name ILIKE $2 OR surname ILIKE $2 OR email ILIKE $2)
            ORDER BY surname, name
            "#,
        )
        .bind(user_id)
        .bind(pattern)
        .fetch_all(db)
        .await?;
        Ok(rows)
    }

    /// Contacts whose birthday (month/day, any year) falls within the next
    /// `days` days.
    pub async fn upcoming_birthdays(
        db: &PgPool,
        user_id: Uuid,
        days: i64,
    ) -> AppResult<Vec<Contact>> {
        let today = OffsetDateTime::now_utc().date();
        let rows = match birthday_window(today, days) {
            BirthdayWindow::SameMonth {
                month,
                from_day,
                to_day,
            } => {
                sqlx::query_as::<_, Contact>(
                    r#"
                    SELECT id, user_id, name, surname, email, phone, birthday, extra, created_at
                    FROM contacts
                    WHERE user_id = $1
                      AND EXTRACT(MONTH FROM birthday) = $2
                      AND EXTRACT(DAY FROM birthday) BETWEEN $3 AND $4
                    ORDER BY EXTRACT(MONTH FROM birthday), EXTRACT(DAY FROM birthday)
                    "#,
                )
                .bind(user_id)
                .bind(i32::from(month))
                .bind(i32::from(from_day))
                .bind(i32::from(to_day))
                .fetch_all(db)
                .await?
            }
            BirthdayWindow::TwoMonths {
                first_month,
                from_day,
                second_month,
                to_day,
            } => {
                sqlx::query_as::<_, Contact>(
                    r#"
                    SELECT id, user_id, name, surname, email, phone, birthday, extra, created_at
                    FROM contacts
                    WHERE user_id = $1
                      AND (
                        (EXTRACT(MONTH FROM birthday) = $2 AND EXTRACT(DAY FROM birthday) >= $3)
                        OR
                        (EXTRACT(MONTH FROM birthday) = $4 AND EXTRACT(DAY FROM birthday) <= $5)
                      )
                    ORDER BY EXTRACT(MONTH FROM birthday) = $4, EXTRACT(DAY FROM birthday)
                    "#,
                )
                .bind(user_id)
                .bind(i32::from(first_month))
                .bind(i32::from(from_day))
                .bind(i32::from(second_month))
                .bind(i32::from(to_day))
                .fetch_all(db)
                .await?
            }
        };
        Ok(rows)
    }
}

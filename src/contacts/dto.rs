use serde::Deserialize;
use time::Date;

/// Request body for contact creation.
#[derive(Debug, Deserialize)]
pub struct ContactCreate {
    pub name: String,
    pub surname: String,
    pub email: String,
    pub phone: String,
    pub birthday: Date,
    pub extra: Option<String>,
}

/// Partial update; omitted fields keep their stored values.
#[derive(Debug, Deserialize)]
pub struct ContactUpdate {
    pub name: Option<String>,
    pub surname: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub birthday: Option<Date>,
    pub extra: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Pagination {
    #[serde(default)]
    pub skip: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    20
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub q: String,
}

#[derive(Debug, Deserialize)]
pub struct BirthdayParams {
    #[serde(default = "default_days")]
    pub days: i64,
}

fn default_days() -> i64 {
    7
}

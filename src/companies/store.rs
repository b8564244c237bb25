use sqlx::SqlitePool;
use uuid::Uuid;

use crate::{db::unix_now, users};

use super::Company;

pub async fn create_company(db_pool: &SqlitePool, owner: Uuid, name: &str) -> Result<Company, sqlx::Error> {
    let company = Company { id: Uuid::now_v7(), name: name.to_owned(), created_by: owner };
    sqlx::query("INSERT INTO companies (id,name,created_by,created_at) VALUES (?,?,?,?)")
        .bind(company.id)
        .bind(&company.name)
        .bind(company.created_by)
        .bind(unix_now())
        .execute(db_pool)
        .await?;

    Ok(company)
}

pub async fn find_company(db_pool: &SqlitePool, id: Uuid) -> Result<Option<Company>, sqlx::Error> {
    sqlx::query_as("SELECT id,name,created_by FROM companies WHERE id=?")
        .bind(id)
        .fetch_optional(db_pool)
        .await
}

/// Adds `user_id` to the company's HR list and points the user at the company.
pub async fn add_hr(db_pool: &SqlitePool, company_id: Uuid, user_id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query("INSERT OR IGNORE INTO company_hr (company_id,user_id) VALUES (?,?)")
        .bind(company_id)
        .bind(user_id)
        .execute(db_pool)
        .await?;

    users::set_company(db_pool, user_id, company_id).await
}

/// True when the user is HR of some company, or created one.
pub async fn is_hr_or_owner(db_pool: &SqlitePool, user_id: Uuid) -> Result<bool, sqlx::Error> {
    let (found,): (bool,) = sqlx::query_as(
        "SELECT EXISTS (SELECT 1 FROM company_hr WHERE user_id=?) \
             OR EXISTS (SELECT 1 FROM companies WHERE created_by=?)",
    )
    .bind(user_id)
    .bind(user_id)
    .fetch_one(db_pool)
    .await?;

    Ok(found)
}

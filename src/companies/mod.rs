mod store;

use axum::{debug_handler, extract::{Path, State}, http::StatusCode, routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::{appresult::RequestError, auth::CurrentUser, users::{self, Role}, AppResult, AppState};

pub use store::{add_hr, create_company, find_company, is_hr_or_owner};

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Company {
    pub id: Uuid,
    pub name: String,
    pub created_by: Uuid,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/companies", post(new_company))
        .route("/companies/{id}/hr", post(new_hr))
}

#[derive(Deserialize)]
struct NewCompanyRequest {
    name: String,
}

#[derive(Deserialize)]
struct NewHrRequest {
    user_id: Uuid,
}

#[debug_handler(state = AppState)]
async fn new_company(
    State(db_pool): State<SqlitePool>,
    CurrentUser { identity, .. }: CurrentUser,
    Json(NewCompanyRequest { name }): Json<NewCompanyRequest>,
) -> AppResult<(StatusCode, Json<Company>)> {
    if identity.role != Role::Admin {
        return Err(RequestError::Forbidden("only admins may create companies".into()))?;
    }
    let name = name.trim();
    if name.is_empty() {
        return Err(RequestError::BadRequest("company name is required".into()))?;
    }

    let company = create_company(&db_pool, identity.id, name).await?;
    tracing::info!(company_id = %company.id, owner = %identity.id, "company created");
    Ok((StatusCode::CREATED, Json(company)))
}

#[debug_handler(state = AppState)]
async fn new_hr(
    Path(company_id): Path<Uuid>,
    State(db_pool): State<SqlitePool>,
    CurrentUser { identity, .. }: CurrentUser,
    Json(NewHrRequest { user_id }): Json<NewHrRequest>,
) -> AppResult<StatusCode> {
    let Some(company) = find_company(&db_pool, company_id).await? else {
        return Err(RequestError::NotFound("company not found".into()))?;
    };
    if company.created_by != identity.id {
        return Err(RequestError::Forbidden("only the company owner may add HR".into()))?;
    }
    if users::find_identity(&db_pool, user_id).await?.is_none() {
        return Err(RequestError::NotFound("user not found".into()))?;
    }

    add_hr(&db_pool, company_id, user_id).await?;
    tracing::info!(company_id = %company_id, hr = %user_id, "hr member added");
    Ok(StatusCode::NO_CONTENT)
}

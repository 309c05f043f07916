use crate::db;
use crate::hierarchy::store::{
    create_organization, update_organization, NewOrganization, Organization, OrganizationPatch,
};
use crate::hierarchy::HierarchyError;
use crate::state::SharedState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, patch, post},
    Json, Router,
};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateOrganizationPayload {
    name: String,
    leader_id: Option<Uuid>,
    parent_id: Option<Uuid>,
    company_id: Uuid,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateOrganizationPayload {
    company_id: Uuid,
    name: Option<String>,
    leader_id: Option<Uuid>,
    /// Absent = keep the current parent; explicit null = move to root.
    #[serde(default, deserialize_with = "double_option")]
    parent_id: Option<Option<Uuid>>,
    deleted: Option<bool>,
}

fn double_option<'de, D>(deserializer: D) -> Result<Option<Option<Uuid>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<Uuid>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListQuery {
    company_id: Uuid,
}

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/organizations", get(list))
        .route("/organizations", post(create))
        .route("/organizations/:id", patch(update))
        .with_state(state)
}

async fn list(
    Query(query): Query<ListQuery>,
    State(state): State<SharedState>,
) -> Result<Json<Vec<db::OrganizationNode>>, StatusCode> {
    let organizations = db::list_organizations(&state.pool, query.company_id)
        .await
        .map_err(|e| {
            tracing::error!("Failed to list organizations: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;
    Ok(Json(organizations))
}

async fn create(
    State(state): State<SharedState>,
    Json(payload): Json<CreateOrganizationPayload>,
) -> Result<Json<Organization>, (StatusCode, Json<ErrorBody>)> {
    let name = payload.name.trim();
    if name.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorBody {
                error: "name must not be empty".to_string(),
            }),
        ));
    }

    let organization = create_organization(
        &state.pool,
        payload.company_id,
        NewOrganization {
            name: name.to_string(),
            leader_id: payload.leader_id,
            parent_id: payload.parent_id,
        },
    )
    .await
    .map_err(|e| hierarchy_error_response("create_organization", e))?;

    Ok(Json(organization))
}

async fn update(
    Path(org_id): Path<Uuid>,
    State(state): State<SharedState>,
    Json(payload): Json<UpdateOrganizationPayload>,
) -> Result<Json<Organization>, (StatusCode, Json<ErrorBody>)> {
    let patch = OrganizationPatch {
        name: payload.name.map(|n| n.trim().to_string()),
        leader_id: payload.leader_id,
        parent_id: payload.parent_id,
        deleted: payload.deleted,
    };
    let organization = update_organization(&state.pool, payload.company_id, org_id, patch)
        .await
        .map_err(|e| hierarchy_error_response("update_organization", e))?;
    Ok(Json(organization))
}

/// Cycle rejections surface as 409 with the domain message so callers can
/// tell them apart from generic failures; raw database errors never leak.
fn hierarchy_error_response(context: &str, err: HierarchyError) -> (StatusCode, Json<ErrorBody>) {
    match err {
        HierarchyError::CycleDetected => (
            StatusCode::CONFLICT,
            Json(ErrorBody {
                error: err.to_string(),
            }),
        ),
        HierarchyError::NotFound => (
            StatusCode::NOT_FOUND,
            Json(ErrorBody {
                error: err.to_string(),
            }),
        ),
        HierarchyError::Db(e) => {
            tracing::error!("{}: {}", context, e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorBody {
                    error: "internal error".to_string(),
                }),
            )
        }
    }
}

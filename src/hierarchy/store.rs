use super::closure::{plan_move, seed_rows, ClosureRow};
use super::HierarchyError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Organization {
    pub id: Uuid,
    pub name: String,
    pub leader_id: Option<Uuid>,
    pub company_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct NewOrganization {
    pub name: String,
    pub leader_id: Option<Uuid>,
    pub parent_id: Option<Uuid>,
}

/// Partial update. `parent_id` distinguishes "not provided" (outer None) from
/// "move to root" (Some(None)); `deleted` toggles the soft-delete timestamp.
#[derive(Debug, Clone, Default)]
pub struct OrganizationPatch {
    pub name: Option<String>,
    pub leader_id: Option<Uuid>,
    pub parent_id: Option<Option<Uuid>>,
    pub deleted: Option<bool>,
}

/// Creates the organization and seeds its closure rows (self row plus the
/// parent's full ancestor chain shifted one level) in a single transaction.
pub async fn create_organization(
    pool: &PgPool,
    company_id: Uuid,
    new: NewOrganization,
) -> Result<Organization, HierarchyError> {
    let mut tx = pool.begin().await?;

    let org: Organization = sqlx::query_as(
        r#"
        INSERT INTO organizations (id, name, leader_id, company_id)
        VALUES ($1, $2, $3, $4)
        RETURNING id, name, leader_id, company_id, created_at, deleted_at
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(&new.name)
    .bind(new.leader_id)
    .bind(company_id)
    .fetch_one(&mut *tx)
    .await?;

    let parent_chain = match new.parent_id {
        Some(parent_id) => {
            let chain = fetch_ancestor_chain(&mut tx, parent_id, company_id).await?;
            if chain.is_empty() {
                return Err(HierarchyError::NotFound);
            }
            chain
        }
        None => Vec::new(),
    };

    insert_closure_rows(&mut tx, &seed_rows(org.id, &parent_chain), company_id).await?;
    tx.commit().await?;
    Ok(org)
}

/// Applies scalar updates, optional re-parenting and soft-delete toggling in
/// one transaction. The cycle check runs before any closure mutation; on any
/// error the whole transaction rolls back, so a failed call never leaves a
/// half-updated closure table.
pub async fn update_organization(
    pool: &PgPool,
    company_id: Uuid,
    org_id: Uuid,
    patch: OrganizationPatch,
) -> Result<Organization, HierarchyError> {
    let mut tx = pool.begin().await?;

    let existing: Option<Organization> = sqlx::query_as(
        r#"
        SELECT id, name, leader_id, company_id, created_at, deleted_at
        FROM organizations
        WHERE id = $1 AND company_id = $2
        "#,
    )
    .bind(org_id)
    .bind(company_id)
    .fetch_optional(&mut *tx)
    .await?;
    if existing.is_none() {
        return Err(HierarchyError::NotFound);
    }

    if let Some(name) = &patch.name {
        sqlx::query("UPDATE organizations SET name = $1 WHERE id = $2 AND company_id = $3")
            .bind(name)
            .bind(org_id)
            .bind(company_id)
            .execute(&mut *tx)
            .await?;
    }
    if let Some(leader_id) = patch.leader_id {
        sqlx::query("UPDATE organizations SET leader_id = $1 WHERE id = $2 AND company_id = $3")
            .bind(leader_id)
            .bind(org_id)
            .bind(company_id)
            .execute(&mut *tx)
            .await?;
    }

    if let Some(new_parent) = patch.parent_id {
        let current_parent: Option<Uuid> = sqlx::query_scalar(
            r#"
            SELECT ancestor_id
            FROM organization_relationships
            WHERE descendant_id = $1 AND depth = 1 AND company_id = $2 AND deleted_at IS NULL
            "#,
        )
        .bind(org_id)
        .bind(company_id)
        .fetch_optional(&mut *tx)
        .await?;

        if new_parent != current_parent {
            let subtree = fetch_subtree(&mut tx, org_id, company_id).await?;
            let parent_chain = match new_parent {
                Some(parent_id) => {
                    let chain = fetch_ancestor_chain(&mut tx, parent_id, company_id).await?;
                    // every live organization has at least its self row
                    if chain.is_empty() {
                        return Err(HierarchyError::NotFound);
                    }
                    chain
                }
                None => Vec::new(),
            };

            let plan = plan_move(org_id, new_parent, &subtree, &parent_chain)?;

            let subtree_ids: Vec<Uuid> = plan.subtree_ids.iter().copied().collect();
            sqlx::query(
                r#"
                DELETE FROM organization_relationships
                WHERE company_id = $1
                  AND descendant_id = ANY($2)
                  AND NOT (ancestor_id = ANY($2))
                "#,
            )
            .bind(company_id)
            .bind(&subtree_ids)
            .execute(&mut *tx)
            .await?;

            insert_closure_rows(&mut tx, &plan.inserts, company_id).await?;
        }
    }

    if let Some(deleted) = patch.deleted {
        let deleted_at: Option<DateTime<Utc>> = if deleted { Some(Utc::now()) } else { None };
        sqlx::query("UPDATE organizations SET deleted_at = $1 WHERE id = $2 AND company_id = $3")
            .bind(deleted_at)
            .bind(org_id)
            .bind(company_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            r#"
            UPDATE organization_relationships
            SET deleted_at = $1
            WHERE company_id = $2 AND (ancestor_id = $3 OR descendant_id = $3)
            "#,
        )
        .bind(deleted_at)
        .bind(company_id)
        .bind(org_id)
        .execute(&mut *tx)
        .await?;
    }

    let updated: Organization = sqlx::query_as(
        r#"
        SELECT id, name, leader_id, company_id, created_at, deleted_at
        FROM organizations
        WHERE id = $1 AND company_id = $2
        "#,
    )
    .bind(org_id)
    .bind(company_id)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(updated)
}

/// Full ancestor chain of a node: every row with it as descendant, including
/// its depth-0 self row.
async fn fetch_ancestor_chain(
    tx: &mut Transaction<'_, Postgres>,
    descendant_id: Uuid,
    company_id: Uuid,
) -> Result<Vec<ClosureRow>, HierarchyError> {
    let rows: Vec<(Uuid, Uuid, i32)> = sqlx::query_as(
        r#"
        SELECT ancestor_id, descendant_id, depth
        FROM organization_relationships
        WHERE descendant_id = $1 AND company_id = $2 AND deleted_at IS NULL
        "#,
    )
    .bind(descendant_id)
    .bind(company_id)
    .fetch_all(&mut **tx)
    .await?;
    Ok(rows
        .into_iter()
        .map(|(ancestor_id, descendant_id, depth)| ClosureRow::new(ancestor_id, descendant_id, depth))
        .collect())
}

/// Descendant set of a node with depths: every row with it as ancestor,
/// including its self row.
async fn fetch_subtree(
    tx: &mut Transaction<'_, Postgres>,
    ancestor_id: Uuid,
    company_id: Uuid,
) -> Result<Vec<ClosureRow>, HierarchyError> {
    let rows: Vec<(Uuid, Uuid, i32)> = sqlx::query_as(
        r#"
        SELECT ancestor_id, descendant_id, depth
        FROM organization_relationships
        WHERE ancestor_id = $1 AND company_id = $2 AND deleted_at IS NULL
        "#,
    )
    .bind(ancestor_id)
    .bind(company_id)
    .fetch_all(&mut **tx)
    .await?;
    Ok(rows
        .into_iter()
        .map(|(ancestor_id, descendant_id, depth)| ClosureRow::new(ancestor_id, descendant_id, depth))
        .collect())
}

/// Bulk insert with skip-duplicates semantics.
async fn insert_closure_rows(
    tx: &mut Transaction<'_, Postgres>,
    rows: &[ClosureRow],
    company_id: Uuid,
) -> Result<(), HierarchyError> {
    if rows.is_empty() {
        return Ok(());
    }
    let ancestors: Vec<Uuid> = rows.iter().map(|r| r.ancestor_id).collect();
    let descendants: Vec<Uuid> = rows.iter().map(|r| r.descendant_id).collect();
    let depths: Vec<i32> = rows.iter().map(|r| r.depth).collect();
    sqlx::query(
        r#"
        INSERT INTO organization_relationships (ancestor_id, descendant_id, depth, company_id)
        SELECT ancestor_id, descendant_id, depth, $4
        FROM UNNEST($1::uuid[], $2::uuid[], $3::int[]) AS t(ancestor_id, descendant_id, depth)
        ON CONFLICT (ancestor_id, descendant_id) DO NOTHING
        "#,
    )
    .bind(&ancestors)
    .bind(&descendants)
    .bind(&depths)
    .bind(company_id)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

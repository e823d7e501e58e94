use sqlx::{PgPool, postgres::PgPoolOptions};
use std::time::Duration;

pub async fn create_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await
}

pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    // Every stored version of every pipeline definition
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS pipeline_versions (
            id UUID NOT NULL,
            version INTEGER NOT NULL,
            name VARCHAR(255) NOT NULL,
            stages JSONB NOT NULL,
            created_at TIMESTAMPTZ NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL,
            PRIMARY KEY (id, version)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS executions (
            id UUID PRIMARY KEY,
            pipeline_id UUID NOT NULL,
            pipeline_version INTEGER NOT NULL,
            trigger JSONB NOT NULL,
            status VARCHAR(50) NOT NULL,
            current_stage_index INTEGER NOT NULL DEFAULT 0,
            started_at TIMESTAMPTZ NOT NULL,
            finished_at TIMESTAMPTZ,
            stages JSONB NOT NULL DEFAULT '[]',
            failure JSONB,
            FOREIGN KEY (pipeline_id, pipeline_version)
                REFERENCES pipeline_versions(id, version) ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS approvals (
            id UUID PRIMARY KEY,
            execution_id UUID NOT NULL REFERENCES executions(id) ON DELETE CASCADE,
            stage_index INTEGER NOT NULL,
            stage_name VARCHAR(255) NOT NULL,
            artifact_id UUID,
            notified_at TIMESTAMPTZ NOT NULL,
            decision VARCHAR(50) NOT NULL,
            decided_by VARCHAR(255),
            decided_at TIMESTAMPTZ
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_executions_pipeline_id ON executions(pipeline_id)")
        .execute(pool)
        .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_executions_status ON executions(status)")
        .execute(pool)
        .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_executions_started_at ON executions(started_at DESC)",
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_approvals_decision ON approvals(decision)")
        .execute(pool)
        .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_approvals_execution_id ON approvals(execution_id)",
    )
    .execute(pool)
    .await?;

    tracing::info!("Database migrations completed successfully");
    Ok(())
}

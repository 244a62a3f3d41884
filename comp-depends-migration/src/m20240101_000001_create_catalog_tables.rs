use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let sql = r#"
            CREATE TABLE "ts_id" (
                "ts_id" bigserial PRIMARY KEY,
                "unique_string" text NOT NULL,
                "parts" jsonb NOT NULL,
                "site_id" bigint,
                "storage_units" text
            );

            CREATE UNIQUE INDEX "ts_id_unique_string_lower_idx" ON "ts_id" (lower("unique_string"));

            CREATE TABLE "tsdb_group" (
                "group_id" bigserial PRIMARY KEY,
                "group_name" text NOT NULL UNIQUE,
                "definition" jsonb NOT NULL
            );

            CREATE TABLE "cp_computation" (
                "computation_id" bigserial PRIMARY KEY,
                "computation_name" text NOT NULL UNIQUE,
                "enabled" boolean NOT NULL DEFAULT false,
                "algorithm_name" text NOT NULL,
                "loading_application_id" bigint,
                "group_id" bigint,
                "properties" jsonb NOT NULL DEFAULT '{}'::jsonb,
                "parms" jsonb NOT NULL DEFAULT '[]'::jsonb,
                "date_time_loaded" timestamp NOT NULL DEFAULT (now() at time zone 'utc')
            );

            CREATE INDEX "cp_computation_enabled_idx" ON "cp_computation" ("enabled");

            COMMENT ON TABLE "ts_id" IS 'Time series catalog';

            COMMENT ON TABLE "tsdb_group" IS 'Time series groups; the definition holds members, filters and subgroup references';

            COMMENT ON TABLE "cp_computation" IS 'Computations with their input and output parameters';
        "#;
        crate::from_sql(manager, sql).await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let sql = r#"
            DROP TABLE "cp_computation";
            DROP TABLE "tsdb_group";
            DROP TABLE "ts_id";
        "#;

        crate::from_sql(manager, sql).await
    }
}

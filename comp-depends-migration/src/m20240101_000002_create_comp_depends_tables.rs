use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let sql = r#"
            CREATE TABLE "cp_comp_depends" (
                "ts_id" bigint NOT NULL,
                "computation_id" bigint NOT NULL,
                PRIMARY KEY ("ts_id", "computation_id")
            );

            CREATE INDEX "cp_comp_depends_computation_id_idx" ON "cp_comp_depends" ("computation_id");

            CREATE TABLE "cp_comp_depends_scratchpad" (
                "ts_id" bigint NOT NULL,
                "computation_id" bigint NOT NULL,
                PRIMARY KEY ("ts_id", "computation_id")
            );

            CREATE TABLE "cp_depends_notify" (
                "record_num" bigserial PRIMARY KEY,
                "event_type" char(1) NOT NULL CHECK ("event_type" IN ('T', 'D', 'M', 'C', 'G', 'F')),
                "key" bigint NOT NULL,
                "date_time_loaded" timestamp NOT NULL DEFAULT (now() at time zone 'utc')
            );

            CREATE TABLE "cp_comp_proc_lock" (
                "loading_application_name" text PRIMARY KEY,
                "pid" bigint NOT NULL,
                "hostname" text NOT NULL,
                "heartbeat" timestamp NOT NULL,
                "cur_status" text
            );

            COMMENT ON TABLE "cp_comp_depends" IS 'Dependency index: time series that trigger a computation';

            COMMENT ON TABLE "cp_comp_depends_scratchpad" IS 'Scratch copy of the dependency index used during full evaluation';

            COMMENT ON TABLE "cp_depends_notify" IS 'Queue of catalog changes consumed by the dependency maintainer';

            COMMENT ON TABLE "cp_comp_proc_lock" IS 'Single instance leases of computation processes';
        "#;
        crate::from_sql(manager, sql).await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let sql = r#"
            DROP TABLE "cp_comp_proc_lock";
            DROP TABLE "cp_depends_notify";
            DROP TABLE "cp_comp_depends_scratchpad";
            DROP TABLE "cp_comp_depends";
        "#;

        crate::from_sql(manager, sql).await
    }
}

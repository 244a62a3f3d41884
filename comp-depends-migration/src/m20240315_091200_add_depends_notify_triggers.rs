use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

// Function bodies contain semicolons, so the script is sent as a single
// unprepared statement instead of going through `from_sql`.
#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let sql = r#"
            CREATE FUNCTION "notify_ts_id_change"() RETURNS trigger AS $$
            BEGIN
                IF (TG_OP = 'INSERT') THEN
                    INSERT INTO "cp_depends_notify" ("event_type", "key") VALUES ('T', NEW."ts_id");
                ELSIF (TG_OP = 'DELETE') THEN
                    INSERT INTO "cp_depends_notify" ("event_type", "key") VALUES ('D', OLD."ts_id");
                ELSIF (NEW."unique_string" IS DISTINCT FROM OLD."unique_string"
                    OR NEW."parts" IS DISTINCT FROM OLD."parts"
                    OR NEW."site_id" IS DISTINCT FROM OLD."site_id") THEN
                    INSERT INTO "cp_depends_notify" ("event_type", "key") VALUES ('M', NEW."ts_id");
                END IF;
                RETURN NULL;
            END;
            $$ LANGUAGE plpgsql;

            CREATE TRIGGER "ts_id_depends_notify"
                AFTER INSERT OR UPDATE OR DELETE ON "ts_id"
                FOR EACH ROW EXECUTE FUNCTION "notify_ts_id_change"();

            CREATE FUNCTION "notify_computation_change"() RETURNS trigger AS $$
            BEGIN
                IF (TG_OP = 'DELETE') THEN
                    INSERT INTO "cp_depends_notify" ("event_type", "key") VALUES ('C', OLD."computation_id");
                ELSE
                    INSERT INTO "cp_depends_notify" ("event_type", "key") VALUES ('C', NEW."computation_id");
                END IF;
                RETURN NULL;
            END;
            $$ LANGUAGE plpgsql;

            CREATE TRIGGER "cp_computation_depends_notify"
                AFTER INSERT OR UPDATE OR DELETE ON "cp_computation"
                FOR EACH ROW EXECUTE FUNCTION "notify_computation_change"();

            CREATE FUNCTION "notify_group_change"() RETURNS trigger AS $$
            BEGIN
                IF (TG_OP = 'DELETE') THEN
                    INSERT INTO "cp_depends_notify" ("event_type", "key") VALUES ('G', OLD."group_id");
                ELSE
                    INSERT INTO "cp_depends_notify" ("event_type", "key") VALUES ('G', NEW."group_id");
                END IF;
                RETURN NULL;
            END;
            $$ LANGUAGE plpgsql;

            CREATE TRIGGER "tsdb_group_depends_notify"
                AFTER INSERT OR UPDATE OR DELETE ON "tsdb_group"
                FOR EACH ROW EXECUTE FUNCTION "notify_group_change"();
        "#;
        manager.get_connection().execute_unprepared(sql).await?;
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let sql = r#"
            DROP TRIGGER "tsdb_group_depends_notify" ON "tsdb_group";
            DROP FUNCTION "notify_group_change"();
            DROP TRIGGER "cp_computation_depends_notify" ON "cp_computation";
            DROP FUNCTION "notify_computation_change"();
            DROP TRIGGER "ts_id_depends_notify" ON "ts_id";
            DROP FUNCTION "notify_ts_id_change"();
        "#;
        manager.get_connection().execute_unprepared(sql).await?;
        Ok(())
    }
}

use std::collections::BTreeMap;
use std::sync::Arc;

use proprietary_scrub::SourceFile;
use schema_migrator::fakes::MemoryDatabase;
use schema_migrator::{
    select_migrations, split_statements, MigrationError, MigrationExecutor, MigrationFile,
};

fn file(path: &str, content: &str) -> MigrationFile {
    MigrationFile {
        path: path.to_string(),
        content: content.to_string(),
    }
}

fn executor(db: Arc<MemoryDatabase>) -> MigrationExecutor {
    MigrationExecutor::postgres(db).unwrap()
}

const SCHEMA: &str = r#"
-- Profiles
CREATE TYPE public.app_role AS ENUM ('admin', 'user');

CREATE TABLE public.profiles (
  id uuid PRIMARY KEY,
  display_name text DEFAULT 'anon;ymous'
);

CREATE POLICY "Users can view own profile" ON public.profiles
  FOR SELECT USING (auth.uid() = id);

CREATE OR REPLACE FUNCTION public.handle_new_user()
RETURNS trigger LANGUAGE plpgsql SECURITY DEFINER AS $$
BEGIN
  INSERT INTO public.profiles (id) VALUES (new.id);
  RETURN new;
END;
$$;

CREATE TRIGGER on_auth_user_created AFTER INSERT ON auth.users
  FOR EACH ROW EXECUTE FUNCTION public.handle_new_user();
"#;

#[tokio::test]
async fn duplicate_table_in_same_file_is_ignorable() {
    let db = Arc::new(MemoryDatabase::new());
    let exec = executor(db.clone());
    let files = [file(
        "supabase/migrations/001_t.sql",
        "CREATE TABLE t (id int); CREATE TABLE t (id int);",
    )];

    let first = exec.run(&files).await.unwrap();
    assert_eq!(first.executed, 1);
    assert_eq!(first.failed, 0);
    assert_eq!(first.statements_executed, 1);
    assert_eq!(first.statements_ignored, 1);
    assert_eq!(first.http_status(), 200);

    let second = exec.run(&files).await.unwrap();
    assert_eq!(second.executed, 1);
    assert_eq!(second.failed, 0);
    assert_eq!(second.statements_ignored, 2);
}

#[tokio::test]
async fn rerunning_a_full_schema_has_no_fatal_failures() {
    let db = Arc::new(MemoryDatabase::new());
    let exec = executor(db.clone());
    let files = [file("supabase/migrations/20240101000000_init.sql", SCHEMA)];

    let first = exec.run(&files).await.unwrap();
    assert_eq!(first.failed, 0);
    assert_eq!(first.statements_executed, 5);
    assert!(db.has_object("table", "profiles"));
    assert!(db.has_object("type", "app_role"));

    let second = exec.run(&files).await.unwrap();
    assert_eq!(second.failed, 0);
    assert!(second.failed_details.is_empty());
    // The OR REPLACE function is the only statement that re-executes cleanly.
    assert_eq!(second.statements_executed, 1);
    assert_eq!(second.statements_ignored, 4);
}

#[tokio::test]
async fn fatal_error_skips_rest_of_file_only() {
    let db = Arc::new(
        MemoryDatabase::new().failing_on("CREAT TABLE", "syntax error at or near \"CREAT\""),
    );
    let exec = executor(db.clone());
    let files = [
        file("supabase/migrations/001_a.sql", "CREATE TABLE a (id int);"),
        file(
            "supabase/migrations/002_b.sql",
            "CREATE TABLE b (id int); CREAT TABLE broken (id int); CREATE TABLE never (id int);",
        ),
        file("supabase/migrations/003_c.sql", "CREATE TABLE c (id int);"),
    ];

    let report = exec.run(&files).await.unwrap();

    assert_eq!(report.total_migrations, 3);
    assert_eq!(report.executed, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(report.failed_details[0].file, "supabase/migrations/002_b.sql");
    assert_eq!(report.failed_details[0].statement_index, 1);
    assert!(report.failed_details[0].error.contains("CREAT"));
    assert!(report.is_success());
    assert_eq!(report.http_status(), 207);
    assert_eq!(report.success_rate, 66.7);

    assert!(db.has_object("table", "c"));
    assert!(!db.has_object("table", "never"));
}

#[tokio::test]
async fn majority_failure_is_not_success() {
    let db = Arc::new(MemoryDatabase::new().failing_on("BROKEN", "boom"));
    let exec = executor(db);
    let files = [
        file("supabase/migrations/001.sql", "CREATE TABLE a (id int);"),
        file("supabase/migrations/002.sql", "BROKEN;"),
    ];

    let report = exec.run(&files).await.unwrap();
    assert_eq!(report.failed, 1);
    assert!(!report.is_success(), "1 of 2 is not strictly less than half");
    assert_eq!(report.http_status(), 500);
}

#[tokio::test]
async fn rejected_credentials_abort_the_run() {
    let db = Arc::new(MemoryDatabase::new().rejecting_auth());
    let exec = executor(db);
    let err = exec
        .run(&[file("supabase/migrations/001.sql", "SELECT 1;")])
        .await
        .unwrap_err();
    assert!(matches!(err, MigrationError::Unauthorized { status: 401, .. }));
}

#[tokio::test]
async fn files_execute_in_filename_order() {
    let db = Arc::new(MemoryDatabase::new());
    let exec = executor(db.clone());
    let sources = vec![
        SourceFile::new("supabase/migrations/20240301_third.sql", "SELECT 3;"),
        SourceFile::new("src/App.tsx", "export {}"),
        SourceFile::new("supabase/migrations/20240101_first.sql", "SELECT 1;"),
        SourceFile::new("supabase/migrations/20240201_second.sql", "SELECT 2;"),
    ];

    let report = exec.run(&select_migrations(&sources)).await.unwrap();
    assert_eq!(report.total_migrations, 3);
    assert_eq!(db.executed(), vec!["SELECT 1", "SELECT 2", "SELECT 3"]);
}

#[tokio::test]
async fn comment_only_file_is_skipped() {
    let db = Arc::new(MemoryDatabase::new());
    let exec = executor(db.clone());
    let report = exec
        .run(&[file(
            "supabase/migrations/000_notes.sql",
            "-- nothing to do;\n/* really; */\n",
        )])
        .await
        .unwrap();
    assert_eq!(report.skipped, 1);
    assert_eq!(report.executed, 0);
    assert!(report.is_success());
    assert!(db.executed().is_empty());
}

#[tokio::test]
async fn secret_sync_counts_failures_without_raising() {
    let db = Arc::new(MemoryDatabase::new().failing_secret("BROKEN_KEY"));
    let exec = executor(db.clone());
    let mut secrets = BTreeMap::new();
    secrets.insert("STRIPE_SECRET_KEY".to_string(), "sk_test".to_string());
    secrets.insert("BROKEN_KEY".to_string(), "x".to_string());
    secrets.insert("OPENAI_API_KEY".to_string(), "sk-o".to_string());

    let sync = exec.sync_secrets(&secrets).await;
    assert_eq!(sync.synced, 2);
    assert_eq!(sync.failed, 1);
    assert_eq!(sync.failed_names, vec!["BROKEN_KEY"]);
    assert_eq!(db.secrets().len(), 2);
}

#[test]
fn split_then_join_is_equivalent() {
    let normalize = |s: &str| s.split_whitespace().collect::<Vec<_>>().join(" ");
    let sql = "CREATE TABLE a (t text DEFAULT 'x;y');\nCREATE FUNCTION f() RETURNS int AS $fn$ SELECT 1; $fn$ LANGUAGE sql;\nINSERT INTO a VALUES ('$$;');";

    let statements = split_statements(sql);
    assert_eq!(statements.len(), 3);
    assert!(statements[1].contains("$fn$ SELECT 1; $fn$"));

    let rejoined = format!("{};", statements.join(";\n"));
    assert_eq!(normalize(&rejoined), normalize(sql));
    assert_eq!(split_statements(&rejoined), statements);
}
